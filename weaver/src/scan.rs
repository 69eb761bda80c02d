// scan.rs — Marker scanner
//
// Recognises a type tagged with the `Injection` marker and extracts its
// advice model, stripping every marker it reads.
//
// Preconditions: `ty` is a type of the module being woven.
// Postconditions: on `Ok(Some(_))` the type carries no `Injection` marker and
//   none of its methods or parameters carry `Rise` or `Argument` markers.
//   On `Ok(None)` the type is untouched.
// Failure modes: a `Rise` / `Argument` marker with a missing or unknown value
//   is `WeaveError::MalformedMarker`.
// Side effects: counts stripped markers in the session statistics.

use tracing::debug;

use crate::advice::{AdviceUnit, ArgSource, MarkerDefinition, ParameterBinding, Timing};
use crate::diag::Site;
use crate::error::WeaveError;
use crate::module::{has_attribute, strip_attributes, AttrArg, Attribute, MethodDef, TypeDef};
use crate::session::WeaveSession;

fn first_arg<'a>(attrs: &'a [Attribute], ty: &str) -> Option<Option<&'a AttrArg>> {
    attrs.iter().find(|a| a.ty == ty).map(|a| a.args.first())
}

fn malformed(site: Site, message: String) -> WeaveError {
    WeaveError::MalformedMarker { site, message }
}

/// Extract one advice unit from a method carrying `Rise`, stripping the
/// method's `Rise` and its parameters' `Argument` markers.
fn scan_advice(
    session: &mut WeaveSession,
    owner: &str,
    method: &mut MethodDef,
) -> Result<AdviceUnit, WeaveError> {
    let names = &session.markers;
    let site = Site::member(owner, method.name.clone());

    let timing = match first_arg(&method.attributes, &names.rise) {
        Some(Some(arg)) => Timing::from_arg(arg)
            .ok_or_else(|| malformed(site.clone(), format!("unknown timing {}", arg)))?,
        _ => return Err(malformed(site, "Rise marker has no timing".into())),
    };

    let mut bindings = Vec::with_capacity(method.params.len());
    let mut stripped = strip_attributes(&mut method.attributes, &names.rise);
    for param in &mut method.params {
        let source = match first_arg(&param.attributes, &names.argument) {
            None => None,
            Some(Some(arg)) => Some(ArgSource::from_arg(arg).ok_or_else(|| {
                malformed(
                    site.clone(),
                    format!("unknown argument source {} on '{}'", arg, param.name),
                )
            })?),
            Some(None) => {
                return Err(malformed(
                    site,
                    format!("Argument marker on '{}' has no source", param.name),
                ))
            }
        };
        stripped += strip_attributes(&mut param.attributes, &names.argument);
        bindings.push(ParameterBinding {
            declared_type: param.ty.clone(),
            parameter_name: param.name.clone(),
            source,
        });
    }
    session.stats.markers_stripped += stripped;

    debug!(
        advice = %site,
        ?timing,
        params = bindings.len(),
        "found advice"
    );

    Ok(AdviceUnit {
        name: method.name.clone(),
        method: method.id,
        timing,
        bindings,
        ret: method.ret.clone(),
        is_static: method.is_static,
        call: method.to_ref(owner),
    })
}

/// Scan one type. Returns `None` if it is not a marker type.
pub fn scan_type(
    session: &mut WeaveSession,
    ty: &mut TypeDef,
) -> Result<Option<MarkerDefinition>, WeaveError> {
    let injection = session.markers.injection.clone();
    if !has_attribute(&ty.attributes, &injection) {
        return Ok(None);
    }
    session.stats.markers_stripped += strip_attributes(&mut ty.attributes, &injection);

    let rise = session.markers.rise.clone();
    let mut advice = Vec::new();
    for method in &mut ty.methods {
        if has_attribute(&method.attributes, &rise) {
            advice.push(scan_advice(session, &ty.name, method)?);
        }
    }

    Ok(Some(MarkerDefinition {
        owner: ty.id,
        owner_name: ty.name.clone(),
        advice,
    }))
}
