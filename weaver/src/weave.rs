// weave.rs — Weaving engine
//
// Weaves one marker type into its targets. Every advice rule is checked
// against every target before the first instruction is inserted, so a marker
// type is woven completely or not at all.
//
// Preconditions: `def` was produced by `scan::scan_type` on this module.
// Postconditions: on `Ok(true)` every target runs each OnEntry advice after
//   its entry (after earlier prologues) and each OnExit advice before every
//   `ret`; on `Ok(false)` the module is unchanged apart from stripped markers
//   and one error diagnostic has been reported.
// Failure modes: stale IDs (`WeaveError::UnknownType` / `UnknownMethod`),
//   a target with no free local for the return slot (`LocalsExhausted`).
// Side effects: mutates target bodies and the marker type; updates session
//   caches, diagnostics and statistics.

use tracing::{debug, error, warn};

use crate::advice::{AdviceUnit, ArgSource, MarkerDefinition, Timing};
use crate::body::{Instruction, JumpPolicy};
use crate::config::HandleStorage;
use crate::diag::{codes, Diagnostic, Site};
use crate::error::{AdviceError, WeaveError};
use crate::id::MethodId;
use crate::module::{Module, TypeRef};
use crate::resolve::find_targets;
use crate::session::{HiddenHandle, WeaveSession};
use crate::synth;

/// Advice methods may bind the method name and the return value only.
pub const MAX_ADVICE_PARAMS: usize = 2;

// ── Validation ──────────────────────────────────────────────────────────────

/// Rules that concern the advice alone.
pub fn validate_advice(marker: &str, advice: &AdviceUnit) -> Result<(), AdviceError> {
    let ids = || (marker.to_string(), advice.name.clone());

    if advice.param_count() > MAX_ADVICE_PARAMS {
        let (marker, advice_name) = ids();
        return Err(AdviceError::ArityViolation {
            marker,
            advice: advice_name,
            count: advice.param_count(),
        });
    }
    if advice.timing == Timing::OnEntry && advice.binds(ArgSource::TargetReturnValue) {
        let (marker, advice) = ids();
        return Err(AdviceError::BindingConflict { marker, advice });
    }
    let mut return_bindings = 0;
    for binding in &advice.bindings {
        match binding.source {
            None => {
                let (marker, advice) = ids();
                return Err(AdviceError::UnboundParameter {
                    marker,
                    advice,
                    parameter: binding.parameter_name.clone(),
                });
            }
            Some(ArgSource::TargetName) if binding.declared_type != TypeRef::String => {
                let (marker, advice) = ids();
                return Err(AdviceError::NameTypeMismatch {
                    marker,
                    advice,
                    parameter: binding.parameter_name.clone(),
                    found: binding.declared_type.clone(),
                });
            }
            Some(ArgSource::TargetReturnValue) => return_bindings += 1,
            Some(ArgSource::TargetName) => {}
        }
    }
    if return_bindings > 1 {
        let (marker, advice) = ids();
        return Err(AdviceError::DuplicateReturnBinding { marker, advice });
    }
    Ok(())
}

/// Rules that concern one advice applied to one target.
pub fn validate_pair(
    marker: &str,
    advice: &AdviceUnit,
    target_name: &str,
    target_ret: &TypeRef,
) -> Result<(), AdviceError> {
    let binding = advice
        .bindings
        .iter()
        .find(|b| b.source == Some(ArgSource::TargetReturnValue));
    if let Some(binding) = binding {
        if target_ret.is_void() || *target_ret != binding.declared_type {
            return Err(AdviceError::ReturnTypeMismatch {
                marker: marker.to_string(),
                advice: advice.name.clone(),
                target: target_name.to_string(),
                expected: binding.declared_type.clone(),
                found: target_ret.clone(),
            });
        }
    }
    Ok(())
}

struct Target {
    id: MethodId,
    /// `Type::Method`, for diagnostics.
    qualified: String,
    owner: String,
    /// Value pushed for `TargetName` bindings.
    name: String,
    is_static: bool,
    ret: TypeRef,
}

fn describe_targets(module: &Module, ids: &[MethodId]) -> Result<Vec<Target>, WeaveError> {
    ids.iter()
        .map(|&id| {
            let (ty, method) = module.method(id).ok_or(WeaveError::UnknownMethod(id))?;
            Ok(Target {
                id,
                qualified: format!("{}::{}", ty.name, method.name),
                owner: ty.name.clone(),
                name: method.name.clone(),
                is_static: method.is_static,
                ret: method.ret.clone(),
            })
        })
        .collect()
}

/// Checks every rule for every target. A violation is reported against the
/// first target it was found on.
fn validate<'t>(
    def: &MarkerDefinition,
    targets: &'t [Target],
) -> Result<(), (AdviceError, &'t Target)> {
    for target in targets {
        let check = || -> Result<(), AdviceError> {
            for advice in &def.advice {
                validate_advice(&def.owner_name, advice)?;
            }
            for advice in &def.advice {
                validate_pair(&def.owner_name, advice, &target.qualified, &target.ret)?;
            }
            Ok(())
        };
        check().map_err(|violation| (violation, target))?;
    }
    Ok(())
}

// ── Emission ────────────────────────────────────────────────────────────────

/// Instructions that push the advice receiver.
fn load_handle(
    session: &WeaveSession,
    handle: Option<&HiddenHandle>,
    target: &Target,
) -> Vec<Instruction> {
    let Some(handle) = handle else {
        return Vec::new();
    };
    match session.options.handle_storage {
        HandleStorage::PerInstance => {
            let receiver = if target.is_static {
                Instruction::LdNull
            } else {
                Instruction::LdArg(0)
            };
            vec![receiver, Instruction::LdFld(handle.field.clone())]
        }
        HandleStorage::Shared => vec![Instruction::LdsFld(handle.field.clone())],
    }
}

fn call_advice(seq: &mut Vec<Instruction>, advice: &AdviceUnit) {
    seq.push(Instruction::Call(advice.call.clone()));
    seq.push(if advice.ret.is_void() {
        Instruction::Nop
    } else {
        Instruction::Pop
    });
}

fn emit_entry(
    session: &mut WeaveSession,
    module: &mut Module,
    advice: &AdviceUnit,
    handle: Option<&HiddenHandle>,
    target: &Target,
) -> Result<(), WeaveError> {
    let mut seq = load_handle(session, handle, target);
    for _ in &advice.bindings {
        seq.push(Instruction::LdStr(target.name.clone()));
    }
    call_advice(&mut seq, advice);

    let body = module
        .method_mut(target.id)
        .and_then(|m| m.body.as_mut())
        .ok_or(WeaveError::UnknownMethod(target.id))?;
    let cursor = session.entry_cursors.entry(target.id).or_insert(0);
    let n = seq.len();
    body.insert(*cursor, seq, JumpPolicy::Shift);
    *cursor += n;
    session.stats.entry_sites += 1;
    Ok(())
}

fn emit_exit(
    session: &mut WeaveSession,
    module: &mut Module,
    advice: &AdviceUnit,
    handle: Option<&HiddenHandle>,
    target: &Target,
) -> Result<(), WeaveError> {
    let slot = if advice.binds(ArgSource::TargetReturnValue) {
        Some(synth::return_slot(session, module, target.id, &target.ret)?)
    } else {
        None
    };

    let mut seq = Vec::new();
    if let Some(slot) = slot {
        seq.push(Instruction::StLoc(slot));
    }
    seq.extend(load_handle(session, handle, target));
    for binding in &advice.bindings {
        match (binding.source, slot) {
            (Some(ArgSource::TargetReturnValue), Some(slot)) => seq.push(Instruction::LdLoc(slot)),
            _ => seq.push(Instruction::LdStr(target.name.clone())),
        }
    }
    call_advice(&mut seq, advice);
    if let Some(slot) = slot {
        seq.push(Instruction::LdLoc(slot));
    }

    let body = module
        .method_mut(target.id)
        .and_then(|m| m.body.as_mut())
        .ok_or(WeaveError::UnknownMethod(target.id))?;
    let exits = body.insert_before_exits(|| seq.clone());
    if exits == 0 {
        warn!(method = %target.qualified, advice = %advice.name, "target has no return point");
    }
    session.stats.exit_sites += exits;
    Ok(())
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Weave one marker type. Returns `false` if the marker type was rejected.
pub fn weave_marker(
    session: &mut WeaveSession,
    module: &mut Module,
    def: &MarkerDefinition,
) -> Result<bool, WeaveError> {
    session.stats.marker_types += 1;
    let target_ids = find_targets(session, module, &def.owner_name);
    let targets = describe_targets(module, &target_ids)?;

    // Nothing to weave, so nothing to reject.
    if targets.is_empty() {
        session.report(
            Diagnostic::warning(Site::ty(def.owner_name.clone()), "marker type has no targets")
                .with_code(codes::W0203),
        );
        return Ok(true);
    }

    if let Err((violation, target)) = validate(def, &targets) {
        error!(
            marker = %def.owner_name,
            method = %target.qualified,
            code = %violation.code(),
            "{}",
            violation
        );
        session.report(violation.to_diagnostic(&target.qualified));
        session.stats.rejected_marker_types += 1;
        return Ok(false);
    }

    let needs_handle = def.advice.iter().any(|a| !a.is_static);
    let handle = if needs_handle {
        Some(synth::instance_field(session, module, def.owner)?)
    } else {
        None
    };
    if handle.is_some() && session.options.handle_storage == HandleStorage::PerInstance {
        for target in targets.iter().filter(|t| t.is_static) {
            warn!(marker = %def.owner_name, method = %target.qualified, "static target with per-instance handle");
            session.report(
                Diagnostic::warning(
                    Site::member(target.owner.clone(), target.name.clone()),
                    format!(
                        "static target loads the '{}' handle through a null receiver",
                        def.owner_name
                    ),
                )
                .with_code(codes::W0204)
                .with_hint("set handle-storage to shared, or make the advice static"),
            );
        }
    }

    for target in &targets {
        for advice in &def.advice {
            match advice.timing {
                Timing::OnEntry => emit_entry(session, module, advice, handle.as_ref(), target)?,
                Timing::OnExit => emit_exit(session, module, advice, handle.as_ref(), target)?,
            }
            debug!(
                marker = %def.owner_name,
                advice = %advice.name,
                method = %target.qualified,
                timing = ?advice.timing,
                "woven"
            );
        }
    }
    session.stats.targets += targets.len();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::ParameterBinding;
    use crate::module::MethodRef;

    fn advice(timing: Timing, bindings: &[(TypeRef, Option<ArgSource>)]) -> AdviceUnit {
        AdviceUnit {
            name: "Advice".into(),
            method: MethodId(0),
            timing,
            bindings: bindings
                .iter()
                .enumerate()
                .map(|(i, (ty, source))| ParameterBinding {
                    declared_type: ty.clone(),
                    parameter_name: format!("p{}", i),
                    source: *source,
                })
                .collect(),
            ret: TypeRef::Void,
            is_static: false,
            call: MethodRef {
                declaring: "Log".into(),
                name: "Advice".into(),
                has_this: true,
                params: bindings.iter().map(|(t, _)| t.clone()).collect(),
                ret: TypeRef::Void,
            },
        }
    }

    const NAME: (TypeRef, Option<ArgSource>) = (TypeRef::String, Some(ArgSource::TargetName));
    const VALUE: (TypeRef, Option<ArgSource>) =
        (TypeRef::Int32, Some(ArgSource::TargetReturnValue));

    #[test]
    fn return_value_on_entry_is_a_binding_conflict() {
        let err = validate_advice("Log", &advice(Timing::OnEntry, &[VALUE])).unwrap_err();
        assert!(matches!(err, AdviceError::BindingConflict { .. }));
    }

    #[test]
    fn arity_applies_to_both_timings() {
        for timing in [Timing::OnEntry, Timing::OnExit] {
            let err = validate_advice("Log", &advice(timing, &[NAME, NAME, NAME])).unwrap_err();
            assert!(matches!(err, AdviceError::ArityViolation { count: 3, .. }));
        }
    }

    #[test]
    fn unbound_and_duplicate_and_name_type() {
        let unbound = advice(Timing::OnExit, &[(TypeRef::Int32, None)]);
        assert!(matches!(
            validate_advice("Log", &unbound),
            Err(AdviceError::UnboundParameter { .. })
        ));
        let twice = advice(Timing::OnExit, &[VALUE, VALUE]);
        assert!(matches!(
            validate_advice("Log", &twice),
            Err(AdviceError::DuplicateReturnBinding { .. })
        ));
        let bad_name = advice(
            Timing::OnEntry,
            &[(TypeRef::Int32, Some(ArgSource::TargetName))],
        );
        assert!(matches!(
            validate_advice("Log", &bad_name),
            Err(AdviceError::NameTypeMismatch { .. })
        ));
    }

    #[test]
    fn valid_shapes_pass() {
        assert!(validate_advice("Log", &advice(Timing::OnEntry, &[])).is_ok());
        assert!(validate_advice("Log", &advice(Timing::OnEntry, &[NAME])).is_ok());
        assert!(validate_advice("Log", &advice(Timing::OnExit, &[NAME, VALUE])).is_ok());
    }

    #[test]
    fn return_type_rules() {
        let end = advice(Timing::OnExit, &[NAME, VALUE]);
        assert!(validate_pair("Log", &end, "W::F", &TypeRef::Int32).is_ok());
        for found in [TypeRef::Void, TypeRef::String] {
            match validate_pair("Log", &end, "W::F", &found) {
                Err(AdviceError::ReturnTypeMismatch {
                    expected,
                    found: reported,
                    ..
                }) => {
                    assert_eq!(expected, TypeRef::Int32);
                    assert_eq!(reported, found);
                }
                other => panic!("expected mismatch, got {:?}", other),
            }
        }
        // No return binding: any target return type is fine.
        let begin = advice(Timing::OnEntry, &[NAME]);
        assert!(validate_pair("Log", &begin, "W::F", &TypeRef::Void).is_ok());
    }
}
