// synth.rs — Synthesis helpers
//
// Lazily creates the hidden state the injected sequences depend on: one
// handle field (plus its initializer) per marker type, and one return-value
// local per target body. Both are cached in the session so repeated requests
// within a pass reuse the first result.
//
// Preconditions: IDs refer to the module being woven.
// Postconditions: the handle field exists on the marker type, the initializer
//   exists and is called at the start of every instance constructor of the
//   marker type; the return slot is a local of the target body, which is
//   marked `init_locals`.
// Failure modes: `UnknownType` / `UnknownMethod` for stale IDs.
// Side effects: mutates the module and the session caches.

use tracing::debug;

use crate::body::{Instruction, JumpPolicy, MethodBody};
use crate::config::HandleStorage;
use crate::error::WeaveError;
use crate::id::{MethodId, TypeId};
use crate::module::{Access, Attribute, FieldDef, FieldRef, MethodDef, Module, TypeRef};
use crate::session::{HiddenHandle, WeaveSession};

pub const HANDLE_FIELD_NAME: &str = "instance_field";
pub const INITIALIZER_NAME: &str = "hidden_instance";
pub const DEBUGGER_HIDDEN: &str = "System.Diagnostics.DebuggerHiddenAttribute";

/// Body of the initializer: assign the handle only while it is still null.
fn initializer_body(field: &FieldRef, storage: HandleStorage) -> MethodBody {
    use Instruction as I;
    let instructions = match storage {
        HandleStorage::PerInstance => vec![
            I::LdArg(0),
            I::LdFld(field.clone()),
            I::BrTrue(6),
            I::LdArg(0),
            I::LdArg(0),
            I::StFld(field.clone()),
            I::Ret,
        ],
        HandleStorage::Shared => vec![
            I::LdsFld(field.clone()),
            I::BrTrue(4),
            I::LdArg(0),
            I::StsFld(field.clone()),
            I::Ret,
        ],
    };
    MethodBody::new(instructions)
}

/// The hidden handle of `marker`, created on first request.
pub fn instance_field(
    session: &mut WeaveSession,
    module: &mut Module,
    marker: TypeId,
) -> Result<HiddenHandle, WeaveError> {
    if let Some(handle) = session.handle(marker) {
        return Ok(handle.clone());
    }
    let storage = session.options.handle_storage;
    let ty = module.ty_mut(marker).ok_or(WeaveError::UnknownType(marker))?;
    let self_ref = ty.self_ref();

    let field = match ty.field_by_name(HANDLE_FIELD_NAME) {
        Some(existing) => FieldRef {
            declaring: ty.name.clone(),
            name: existing.name.clone(),
            ty: existing.ty.clone(),
        },
        None => {
            ty.fields.push(FieldDef {
                name: HANDLE_FIELD_NAME.to_string(),
                ty: self_ref.clone(),
                access: Access::Public,
                is_static: storage == HandleStorage::Shared,
                attributes: Vec::new(),
            });
            FieldRef {
                declaring: ty.name.clone(),
                name: HANDLE_FIELD_NAME.to_string(),
                ty: self_ref,
            }
        }
    };

    let existing_init = ty.method_by_name(INITIALIZER_NAME).map(|m| m.to_ref(&ty.name));
    let initializer = match existing_init {
        Some(init) => init,
        None => {
            let mut init = MethodDef::new(INITIALIZER_NAME, TypeRef::Void);
            init.access = Access::Private;
            init.attributes.push(Attribute::new(DEBUGGER_HIDDEN));
            init.body = Some(initializer_body(&field, storage));
            let init_ref = init.to_ref(&ty.name);
            module
                .push_method(marker, init)
                .ok_or(WeaveError::UnknownType(marker))?;
            call_from_constructors(session, module, marker, &init_ref)?;
            init_ref
        }
    };

    debug!(marker = %field.declaring, ?storage, "synthesized hidden handle");
    let handle = HiddenHandle { field, initializer };
    session.handles.insert(marker, handle.clone());
    Ok(handle)
}

/// Insert `ldarg 0; call initializer` at the start of every instance
/// constructor of `marker`.
fn call_from_constructors(
    session: &mut WeaveSession,
    module: &mut Module,
    marker: TypeId,
    initializer: &crate::module::MethodRef,
) -> Result<(), WeaveError> {
    let ty = module.ty_mut(marker).ok_or(WeaveError::UnknownType(marker))?;
    for ctor in ty.methods.iter_mut().filter(|m| m.is_constructor()) {
        let Some(body) = ctor.body.as_mut() else {
            continue;
        };
        let seq = vec![Instruction::LdArg(0), Instruction::Call(initializer.clone())];
        let n = seq.len();
        body.insert(0, seq, JumpPolicy::Shift);
        // Later prologues go after the initializer call.
        *session.entry_cursors.entry(ctor.id).or_insert(0) += n;
    }
    Ok(())
}

/// The return-value local of `method`, allocated on first request.
pub fn return_slot(
    session: &mut WeaveSession,
    module: &mut Module,
    method: MethodId,
    ty: &TypeRef,
) -> Result<u16, WeaveError> {
    if let Some(slot) = session.return_slot(method) {
        return Ok(slot);
    }
    let body = module
        .method_mut(method)
        .and_then(|m| m.body.as_mut())
        .ok_or(WeaveError::UnknownMethod(method))?;
    let slot = body
        .add_local(ty.clone())
        .ok_or(WeaveError::LocalsExhausted(method))?;
    body.init_locals = true;
    session.return_slots.insert(method, slot);
    Ok(slot)
}
