// walker.rs — Module walker
//
// Drives the registered components over one module: every type, then within
// each type every method, field and property. Elements are visited in reverse
// index order so a component may remove the element it is visiting (or any
// later one) without disturbing the walk.
//
// Preconditions: the module has IDs assigned.
// Postconditions: each component saw `before_module_edited` once, every
//   surviving element once per component, and `module_edit_complete` once.
// Failure modes: the first component error aborts the walk.
// Side effects: whatever the components do to the module and session.

use std::time::Instant;

use tracing::debug;

use crate::config::WeaveOptions;
use crate::error::WeaveError;
use crate::id::{MethodId, TypeId};
use crate::module::Module;
use crate::session::WeaveSession;

/// A unit of weaving work invoked by the walker. All hooks default to no-ops.
pub trait WeaveComponent {
    fn name(&self) -> &'static str;

    fn before_module_edited(
        &mut self,
        _session: &mut WeaveSession,
        _module: &Module,
    ) -> Result<(), WeaveError> {
        Ok(())
    }

    fn visit_module(
        &mut self,
        _session: &mut WeaveSession,
        _module: &mut Module,
    ) -> Result<(), WeaveError> {
        Ok(())
    }

    fn visit_type(
        &mut self,
        _session: &mut WeaveSession,
        _module: &mut Module,
        _ty: TypeId,
    ) -> Result<(), WeaveError> {
        Ok(())
    }

    fn visit_method(
        &mut self,
        _session: &mut WeaveSession,
        _module: &mut Module,
        _method: MethodId,
    ) -> Result<(), WeaveError> {
        Ok(())
    }

    fn visit_field(
        &mut self,
        _session: &mut WeaveSession,
        _module: &mut Module,
        _ty: TypeId,
        _index: usize,
    ) -> Result<(), WeaveError> {
        Ok(())
    }

    fn visit_property(
        &mut self,
        _session: &mut WeaveSession,
        _module: &mut Module,
        _ty: TypeId,
        _index: usize,
    ) -> Result<(), WeaveError> {
        Ok(())
    }

    fn module_edit_complete(&mut self, _session: &mut WeaveSession) -> Result<(), WeaveError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ModuleWalker {
    components: Vec<Box<dyn WeaveComponent>>,
}

/// Member kinds walked inside a type.
#[derive(Clone, Copy)]
enum Member {
    Method,
    Field,
    Property,
}

fn member_count(module: &Module, ty: TypeId, kind: Member) -> usize {
    module.ty(ty).map_or(0, |t| match kind {
        Member::Method => t.methods.len(),
        Member::Field => t.fields.len(),
        Member::Property => t.properties.len(),
    })
}

impl ModuleWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a walker with the components named in `options`, in order.
    pub fn from_options(options: &WeaveOptions) -> Result<Self, WeaveError> {
        let mut walker = Self::new();
        for name in &options.components {
            walker.register(crate::component::build(name)?);
        }
        Ok(walker)
    }

    pub fn register(&mut self, component: Box<dyn WeaveComponent>) {
        self.components.push(component);
    }

    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn visit(&mut self, session: &mut WeaveSession, module: &mut Module) -> Result<(), WeaveError> {
        let start = Instant::now();
        for component in &mut self.components {
            component.before_module_edited(session, module)?;
        }
        for component in &mut self.components {
            component.visit_module(session, module)?;
        }

        let mut i = module.types.len();
        while i > 0 {
            i -= 1;
            // Earlier visits may have removed types.
            let Some(ty) = module.types.get(i).map(|t| t.id) else {
                continue;
            };
            for component in &mut self.components {
                component.visit_type(session, module, ty)?;
            }
            for kind in [Member::Method, Member::Field, Member::Property] {
                self.visit_members(session, module, ty, kind)?;
            }
        }

        for component in &mut self.components {
            component.module_edit_complete(session)?;
        }
        debug!(
            module = %module.name,
            components = ?self.component_names(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "walk complete"
        );
        Ok(())
    }

    fn visit_members(
        &mut self,
        session: &mut WeaveSession,
        module: &mut Module,
        ty: TypeId,
        kind: Member,
    ) -> Result<(), WeaveError> {
        let mut j = member_count(module, ty, kind);
        while j > 0 {
            j -= 1;
            if j >= member_count(module, ty, kind) {
                continue;
            }
            if let Member::Method = kind {
                let Some(method) = module.ty(ty).map(|t| t.methods[j].id) else {
                    continue;
                };
                for component in &mut self.components {
                    if module.method(method).is_none() {
                        break;
                    }
                    component.visit_method(session, module, method)?;
                }
                continue;
            }
            for component in &mut self.components {
                if j >= member_count(module, ty, kind) {
                    break;
                }
                match kind {
                    Member::Field => component.visit_field(session, module, ty, j)?,
                    _ => component.visit_property(session, module, ty, j)?,
                }
            }
        }
        Ok(())
    }
}
