// verify.rs — Post-weave body verification
//
// Checks every method body of a woven module and records the outcome as a
// certificate of four obligations. A failing obligation means the weave (or
// the input) produced a body that a loader would reject.
//
// Preconditions: none.
// Postconditions: `VerifyResult.cert.all_pass()` iff no diagnostics were
//   produced.
// Failure modes: each violation produces an `E0300` error diagnostic naming
//   the method and instruction index.
// Side effects: none.

use serde::Serialize;

use crate::body::MethodBody;
use crate::diag::{codes, Diagnostic, Site};
use crate::module::{MethodDef, Module};

/// Machine-checkable evidence for the body obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleCert {
    /// Stack depth is consistent on every path, never underflows, and every
    /// `ret` leaves exactly the declared number of values.
    pub stack_balance: bool,
    /// Every branch target is an instruction of the same body.
    pub branch_range: bool,
    /// Every local index is declared.
    pub locals_range: bool,
    /// Every argument index exists (including the receiver).
    pub args_range: bool,
    pub methods_checked: usize,
}

impl Default for ModuleCert {
    fn default() -> Self {
        ModuleCert {
            stack_balance: true,
            branch_range: true,
            locals_range: true,
            args_range: true,
            methods_checked: 0,
        }
    }
}

impl ModuleCert {
    /// True if all obligations pass.
    pub fn all_pass(&self) -> bool {
        self.stack_balance && self.branch_range && self.locals_range && self.args_range
    }

    pub fn obligations(&self) -> [(&'static str, bool); 4] {
        [
            ("stack_balance", self.stack_balance),
            ("branch_range", self.branch_range),
            ("locals_range", self.locals_range),
            ("args_range", self.args_range),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub cert: ModuleCert,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Checks ──────────────────────────────────────────────────────────────────

struct Checker<'a> {
    site: Site,
    method: &'a MethodDef,
    body: &'a MethodBody,
    cert: &'a mut ModuleCert,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Checker<'_> {
    fn fail(&mut self, pc: usize, message: String) {
        self.diagnostics.push(
            Diagnostic::error(self.site.clone(), format!("{} at {}", message, crate::emit::label(pc)))
                .with_code(codes::E0300),
        );
    }

    fn check_operands(&mut self) {
        use crate::body::Instruction as I;
        let body = self.body;
        let len = body.len();
        let locals = body.locals.len();
        let args = self.method.params.len() + usize::from(!self.method.is_static);
        for (pc, instr) in body.instructions.iter().enumerate() {
            if let Some(target) = instr.branch_target() {
                if target >= len {
                    self.cert.branch_range = false;
                    self.fail(pc, format!("branch target {} is outside the body", target));
                }
            }
            match instr {
                I::LdLoc(i) | I::StLoc(i) if usize::from(*i) >= locals => {
                    self.cert.locals_range = false;
                    self.fail(pc, format!("local {} is not declared", i));
                }
                I::LdArg(i) | I::StArg(i) if usize::from(*i) >= args => {
                    self.cert.args_range = false;
                    self.fail(pc, format!("argument {} does not exist", i));
                }
                _ => {}
            }
        }
    }

    /// Abstract interpretation of stack depth over the control-flow graph.
    fn check_stack(&mut self) {
        let body = self.body;
        let len = body.len();
        let expected_at_ret = usize::from(!self.method.ret.is_void());
        let mut depth: Vec<Option<usize>> = vec![None; len];
        let mut work = Vec::new();
        if len == 0 {
            self.cert.stack_balance = false;
            self.fail(0, "body has no instructions".into());
            return;
        }
        depth[0] = Some(0);
        work.push(0);

        while let Some(pc) = work.pop() {
            let Some(d) = depth[pc] else { continue };
            let instr = &body.instructions[pc];
            let effect = instr.stack_effect();
            if effect.pops > d {
                self.cert.stack_balance = false;
                self.fail(pc, format!("stack underflow in '{}'", instr.mnemonic()));
                continue;
            }
            let after = d - effect.pops + effect.pushes;

            if instr.is_return() {
                if d != expected_at_ret {
                    self.cert.stack_balance = false;
                    self.fail(
                        pc,
                        format!("ret with {} values on the stack, expected {}", d, expected_at_ret),
                    );
                }
                continue;
            }

            let mut successors = Vec::with_capacity(2);
            if instr.falls_through() {
                if pc + 1 >= len {
                    self.cert.stack_balance = false;
                    self.fail(pc, "control falls off the end of the body".into());
                } else {
                    successors.push(pc + 1);
                }
            }
            if let Some(target) = instr.branch_target().filter(|&t| t < len) {
                successors.push(target);
            }
            for next in successors {
                match depth[next] {
                    None => {
                        depth[next] = Some(after);
                        work.push(next);
                    }
                    Some(seen) if seen != after => {
                        self.cert.stack_balance = false;
                        self.fail(
                            next,
                            format!("inconsistent stack depth ({} vs {})", seen, after),
                        );
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

/// Verify one method body. Bodyless methods trivially pass.
pub fn verify_method(type_name: &str, method: &MethodDef, cert: &mut ModuleCert, diagnostics: &mut Vec<Diagnostic>) {
    let Some(body) = &method.body else {
        return;
    };
    cert.methods_checked += 1;
    let mut checker = Checker {
        site: Site::member(type_name, method.name.clone()),
        method,
        body,
        cert,
        diagnostics,
    };
    checker.check_operands();
    checker.check_stack();
}

/// Verify every body of the module.
pub fn verify_module(module: &Module) -> VerifyResult {
    let mut cert = ModuleCert::default();
    let mut diagnostics = Vec::new();
    for (ty, method) in module.methods() {
        verify_method(&ty.name, method, &mut cert, &mut diagnostics);
    }
    VerifyResult { cert, diagnostics }
}
