// resolve.rs — Target resolver
//
// Finds every method whose attribute list references a marker type.
//
// Preconditions: `marker` is the full name of a scanned marker type.
// Postconditions: returned IDs are in module order (types, then methods) and
//   all refer to methods with a body.
// Failure modes: none.
// Side effects: reports a warning for each bodyless target.

use tracing::warn;

use crate::diag::{codes, Diagnostic, Site};
use crate::id::MethodId;
use crate::module::{has_attribute, Module};
use crate::session::WeaveSession;

pub fn find_targets(session: &mut WeaveSession, module: &Module, marker: &str) -> Vec<MethodId> {
    let mut targets = Vec::new();
    for (ty, method) in module.methods() {
        if !has_attribute(&method.attributes, marker) {
            continue;
        }
        if method.body.is_none() {
            warn!(method = %format!("{}::{}", ty.name, method.name), marker, "target has no body, skipped");
            session.report(
                Diagnostic::warning(
                    Site::member(ty.name.clone(), method.name.clone()),
                    format!("'{}' is applied to a method without a body", marker),
                )
                .with_code(codes::W0201),
            );
            continue;
        }
        targets.push(method.id);
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Instruction, MethodBody};
    use crate::module::{Attribute, MethodDef, TypeDef, TypeRef};

    fn method(name: &str, marked: bool, body: bool) -> MethodDef {
        let mut m = MethodDef::new(name, TypeRef::Void);
        if marked {
            m.attributes.push(Attribute::new("Log"));
        }
        if body {
            m.body = Some(MethodBody::new(vec![Instruction::Ret]));
        }
        m
    }

    #[test]
    fn targets_in_module_order_without_bodyless() {
        let mut module = Module::new("m");
        let mut a = TypeDef::new("A");
        a.methods = vec![method("One", true, true), method("Two", false, true)];
        let mut b = TypeDef::new("B");
        b.methods = vec![method("Three", true, false), method("Four", true, true)];
        module.push_type(a);
        module.push_type(b);

        let mut session = WeaveSession::default();
        let targets = find_targets(&mut session, &module, "Log");
        assert_eq!(targets, vec![MethodId(0), MethodId(3)]);
        assert_eq!(session.diagnostics.len(), 1);
        assert_eq!(session.diagnostics[0].code, Some(codes::W0201));
        assert_eq!(session.diagnostics[0].site, Site::member("B", "Three"));
    }
}
