// Property-based tests for weaving invariants.
//
// Two categories:
// 1. Body splicing: insertion keeps every original branch pointed at the
//    instruction it targeted, and exit instrumentation covers every `ret`
// 2. Whole-module weaving: generated targets with any number of return
//    points weave cleanly and still pass verification
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use aiw::body::{Instruction, JumpPolicy, MethodBody};
use aiw::config::{HandleStorage, WeaveOptions};
use aiw::pipeline::weave_module;
use proptest::prelude::*;

// ── Body generators ─────────────────────────────────────────────────────────

/// Bodies of `nop` / `ret` / `br*` with in-range branch targets. Branch
/// operands are drawn as fractions and scaled to the final length.
fn arb_body() -> impl Strategy<Value = MethodBody> {
    prop::collection::vec((0u8..4, any::<u16>()), 1..40).prop_map(|ops| {
        let len = ops.len();
        let instructions = ops
            .into_iter()
            .map(|(op, target)| {
                let target = usize::from(target) % len;
                match op {
                    0 => Instruction::Nop,
                    1 => Instruction::Ret,
                    2 => Instruction::Br(target),
                    _ => Instruction::BrTrue(target),
                }
            })
            .collect();
        MethodBody::new(instructions)
    })
}

fn marker_seq(n: usize) -> Vec<Instruction> {
    (0..n).map(|i| Instruction::LdcI4(1000 + i as i32)).collect()
}

// ── Property 1: splicing ────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    /// With `Shift`, every original branch reaches the same original
    /// instruction after the splice.
    #[test]
    fn shift_insertion_preserves_branch_destinations(
        body in arb_body(),
        pos_seed in any::<u16>(),
        n in 1usize..5,
    ) {
        let pos = usize::from(pos_seed) % (body.len() + 1);
        let mut spliced = body.clone();
        spliced.insert(pos, marker_seq(n), JumpPolicy::Shift);
        prop_assert_eq!(spliced.len(), body.len() + n);

        let relocate = |old: usize| if old >= pos { old + n } else { old };
        for (old_pc, instr) in body.instructions.iter().enumerate() {
            let moved = &spliced.instructions[relocate(old_pc)];
            prop_assert_eq!(moved.mnemonic(), instr.mnemonic());
            if let Some(target) = instr.branch_target() {
                prop_assert_eq!(moved.branch_target(), Some(relocate(target)));
            }
        }
    }

    /// Exit instrumentation leaves the `ret` count unchanged, puts the
    /// sequence in front of each one, and jumps that reached a `ret` now
    /// reach the start of its sequence.
    #[test]
    fn exits_are_all_instrumented(body in arb_body(), n in 1usize..4) {
        let rets_before = body.return_points().len();
        let mut woven = body.clone();
        let count = woven.insert_before_exits(|| marker_seq(n));
        prop_assert_eq!(count, rets_before);
        prop_assert_eq!(woven.return_points().len(), rets_before);
        prop_assert_eq!(woven.len(), body.len() + rets_before * n);

        for ret in woven.return_points() {
            prop_assert!(ret >= n);
            let expected = marker_seq(n);
            prop_assert_eq!(&woven.instructions[ret - n..ret], expected.as_slice());
        }
        for instr in &woven.instructions {
            if let Some(target) = instr.branch_target() {
                prop_assert!(target < woven.len());
                // A branch never lands inside an epilogue or directly on a ret.
                prop_assert!(!woven.instructions[target].is_return());
                if let Instruction::LdcI4(v) = woven.instructions[target] {
                    prop_assert_eq!(v, 1000);
                }
            }
        }
    }
}

// ── Property 2: whole-module weaving ────────────────────────────────────────

const MARKER: &str = r#"
module generated

[AttributeInjector.Injection]
class Trace {
    public method .ctor() -> void {
        ret
    }
    [AttributeInjector.Rise(When.OnEntry)]
    public method Enter([AttributeInjector.Argument(Method.Name)] name: string) -> void {
        ret
    }
    [AttributeInjector.Rise(When.OnExit)]
    public method Leave([AttributeInjector.Argument(Method.Name)] name: string,
                        [AttributeInjector.Argument(Method.ReturnValue)] value: int32) -> int32 {
        ldarg 2
        ret
    }
}
"#;

/// A target that compares its argument against `cases` constants and
/// returns from a separate `ret` for each, plus a fall-through return.
fn target_method(index: usize, cases: usize, is_static: bool) -> String {
    let arg = if is_static { 0 } else { 1 };
    let mut text = format!(
        "    [Trace]\n    public {}method Pick{}(x: int32) -> int32 {{\n",
        if is_static { "static " } else { "" },
        index
    );
    for case in 0..cases {
        text += &format!("        ldarg {}\n        ldc.i4 {}\n        beq case{}\n", arg, case, case);
    }
    text += "        ldc.i4 99\n        ret\n";
    for case in 0..cases {
        text += &format!("        case{}: ldc.i4 {}\n        ret\n", case, case * 10);
    }
    text += "    }\n";
    text
}

fn arb_module() -> impl Strategy<Value = (String, usize, usize)> {
    prop::collection::vec((0usize..5, any::<bool>()), 1..5).prop_map(|targets| {
        let mut text = String::from(MARKER);
        text += "\nclass Generated {\n";
        let mut exits = 0;
        for (i, (cases, is_static)) in targets.iter().enumerate() {
            text += &target_method(i, *cases, *is_static);
            exits += cases + 1;
        }
        text += "}\n";
        (text, targets.len(), exits)
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn woven_modules_verify(
        (source, targets, exits) in arb_module(),
        shared in any::<bool>(),
    ) {
        let parsed = aiw::parser::parse(&source);
        prop_assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let mut module = parsed.module.unwrap();

        let options = WeaveOptions {
            handle_storage: if shared { HandleStorage::Shared } else { HandleStorage::PerInstance },
            ..WeaveOptions::default()
        };
        let result = weave_module(&mut module, &options).unwrap();
        prop_assert!(!result.has_errors(), "{:?}", result.diagnostics);
        prop_assert_eq!(result.stats.targets, targets);
        prop_assert_eq!(result.stats.entry_sites, targets);
        prop_assert_eq!(result.stats.exit_sites, exits);
        prop_assert!(result.cert.unwrap().all_pass());

        // Nothing is left to weave.
        let again = weave_module(&mut module, &options).unwrap();
        prop_assert_eq!(again.stats.injected(), 0);
    }
}
