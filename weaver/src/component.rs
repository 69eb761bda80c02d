// component.rs — Production walker components
//
// `InjectionWeaver` scans each type for the `Injection` marker and weaves the
// resulting advice into its targets. `OrphanSweep` removes `Rise` / `Argument`
// markers left on methods outside any marker type, so no marker reaches the
// output.

use tracing::{debug, warn};

use crate::diag::{codes, Diagnostic, Site};
use crate::error::WeaveError;
use crate::id::{MethodId, TypeId};
use crate::module::{strip_attributes, Module};
use crate::scan::scan_type;
use crate::session::WeaveSession;
use crate::walker::WeaveComponent;
use crate::weave::weave_marker;

pub const INJECTION_WEAVER: &str = "injection-weaver";
pub const ORPHAN_SWEEP: &str = "orphan-sweep";

/// Instantiate a component by its configuration name.
pub fn build(name: &str) -> Result<Box<dyn WeaveComponent>, WeaveError> {
    match name {
        INJECTION_WEAVER => Ok(Box::new(InjectionWeaver)),
        ORPHAN_SWEEP => Ok(Box::new(OrphanSweep)),
        other => Err(WeaveError::UnknownComponent(other.to_string())),
    }
}

// ── Injection weaver ────────────────────────────────────────────────────────

pub struct InjectionWeaver;

impl WeaveComponent for InjectionWeaver {
    fn name(&self) -> &'static str {
        INJECTION_WEAVER
    }

    fn visit_type(
        &mut self,
        session: &mut WeaveSession,
        module: &mut Module,
        ty: TypeId,
    ) -> Result<(), WeaveError> {
        let def = {
            let ty = module.ty_mut(ty).ok_or(WeaveError::UnknownType(ty))?;
            scan_type(session, ty)?
        };
        let Some(def) = def else {
            return Ok(());
        };
        let woven = weave_marker(session, module, &def)?;
        debug!(marker = %def.owner_name, advice = def.advice.len(), woven, "marker type done");
        session.definitions.push(def);
        Ok(())
    }
}

// ── Orphan sweep ────────────────────────────────────────────────────────────

pub struct OrphanSweep;

impl WeaveComponent for OrphanSweep {
    fn name(&self) -> &'static str {
        ORPHAN_SWEEP
    }

    fn visit_method(
        &mut self,
        session: &mut WeaveSession,
        module: &mut Module,
        method: MethodId,
    ) -> Result<(), WeaveError> {
        let rise = session.markers.rise.clone();
        let argument = session.markers.argument.clone();
        let owner = module
            .method(method)
            .map(|(ty, _)| ty.name.clone())
            .ok_or(WeaveError::UnknownMethod(method))?;
        let def = module
            .method_mut(method)
            .ok_or(WeaveError::UnknownMethod(method))?;

        let mut removed = strip_attributes(&mut def.attributes, &rise);
        for param in &mut def.params {
            removed += strip_attributes(&mut param.attributes, &argument);
        }
        if removed > 0 {
            warn!(method = %format!("{}::{}", owner, def.name), removed, "stray advice markers removed");
            session.stats.markers_stripped += removed;
            session.report(
                Diagnostic::warning(
                    Site::member(owner, def.name.clone()),
                    "advice marker outside an Injection type was removed",
                )
                .with_code(codes::W0202)
                .with_hint("mark the declaring type with Injection to weave this advice"),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{AttrArg, Attribute, MethodDef, ParamDef, TypeDef, TypeRef};

    #[test]
    fn unknown_component_name_is_an_error() {
        assert!(build(INJECTION_WEAVER).is_ok());
        assert!(matches!(
            build("optimizer"),
            Err(WeaveError::UnknownComponent(name)) if name == "optimizer"
        ));
    }

    #[test]
    fn orphan_markers_are_stripped_with_a_warning() {
        let mut session = WeaveSession::default();
        let mut module = Module::new("m");
        let mut ty = TypeDef::new("Plain");
        let mut m = MethodDef::new("Stray", TypeRef::Void);
        m.attributes
            .push(Attribute::new("AttributeInjector.Rise").with_arg(AttrArg::Int(1)));
        m.attributes.push(Attribute::new("Obsolete"));
        m.params.push(ParamDef {
            name: "n".into(),
            ty: TypeRef::String,
            attributes: vec![Attribute::new("AttributeInjector.Argument").with_arg(AttrArg::Int(1))],
        });
        ty.methods.push(m);
        module.push_type(ty);

        OrphanSweep
            .visit_method(&mut session, &mut module, MethodId(0))
            .unwrap();

        let m = &module.types[0].methods[0];
        assert_eq!(m.attributes, vec![Attribute::new("Obsolete")]);
        assert!(m.params[0].attributes.is_empty());
        assert_eq!(session.diagnostics.len(), 1);
        assert_eq!(session.diagnostics[0].code, Some(codes::W0202));
        assert_eq!(session.stats.markers_stripped, 2);
    }
}
