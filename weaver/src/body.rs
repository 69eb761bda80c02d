// body.rs — Method bodies: locals and the instruction list
//
// Branch operands are instruction indices. Every insertion goes through
// `MethodBody::insert`, which rebases branch targets so that code inserted at
// one point never perturbs jumps elsewhere in the body.
//
// Preconditions: branch targets of an existing body are within
//   `0..=instructions.len()`.
// Postconditions: after `insert`, every pre-existing branch still reaches the
//   same original instruction, except under `JumpPolicy::Capture` where jumps
//   to the insertion point land on the first inserted instruction.
// Failure modes: none (out-of-range positions are clamped to the end).
// Side effects: none.

use serde::{Deserialize, Serialize};

use crate::module::{FieldRef, MethodRef, TypeRef};

// ── Instructions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Instruction {
    Nop,
    Pop,
    Dup,
    Ret,
    LdNull,
    LdcI4(i32),
    LdcI8(i64),
    LdStr(String),
    LdArg(u16),
    StArg(u16),
    LdLoc(u16),
    StLoc(u16),
    LdFld(FieldRef),
    StFld(FieldRef),
    LdsFld(FieldRef),
    StsFld(FieldRef),
    Call(MethodRef),
    CallVirt(MethodRef),
    NewObj(MethodRef),
    Br(usize),
    BrTrue(usize),
    BrFalse(usize),
    Beq(usize),
    Add,
    Sub,
    Mul,
    Ceq,
    Clt,
    Cgt,
}

/// Operand shape expected after a mnemonic in the text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Int32,
    Int64,
    Str,
    Index,
    Field,
    Method,
    Label,
}

/// Operand value supplied when building an instruction from its mnemonic.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i64),
    Str(String),
    Field(FieldRef),
    Method(MethodRef),
    Label(usize),
}

/// Mnemonics grouped by operand kind. Order within a group is irrelevant.
pub const MNEMONICS: &[(&str, OperandKind)] = &[
    ("nop", OperandKind::None),
    ("pop", OperandKind::None),
    ("dup", OperandKind::None),
    ("ret", OperandKind::None),
    ("ldnull", OperandKind::None),
    ("add", OperandKind::None),
    ("sub", OperandKind::None),
    ("mul", OperandKind::None),
    ("ceq", OperandKind::None),
    ("clt", OperandKind::None),
    ("cgt", OperandKind::None),
    ("ldc.i4", OperandKind::Int32),
    ("ldc.i8", OperandKind::Int64),
    ("ldstr", OperandKind::Str),
    ("ldarg", OperandKind::Index),
    ("starg", OperandKind::Index),
    ("ldloc", OperandKind::Index),
    ("stloc", OperandKind::Index),
    ("ldfld", OperandKind::Field),
    ("stfld", OperandKind::Field),
    ("ldsfld", OperandKind::Field),
    ("stsfld", OperandKind::Field),
    ("call", OperandKind::Method),
    ("callvirt", OperandKind::Method),
    ("newobj", OperandKind::Method),
    ("br", OperandKind::Label),
    ("brtrue", OperandKind::Label),
    ("brfalse", OperandKind::Label),
    ("beq", OperandKind::Label),
];

pub fn operand_kind(mnemonic: &str) -> Option<OperandKind> {
    MNEMONICS
        .iter()
        .find(|(m, _)| *m == mnemonic)
        .map(|(_, kind)| *kind)
}

/// Stack behaviour of one instruction, ignoring `ret` (checked by the verifier
/// against the method signature).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

const fn effect(pops: usize, pushes: usize) -> StackEffect {
    StackEffect { pops, pushes }
}

impl Instruction {
    /// Build an instruction from its text mnemonic and operand.
    /// Returns `None` for unknown mnemonics or mismatched operands.
    pub fn build(mnemonic: &str, operand: Operand) -> Option<Instruction> {
        use Instruction as I;
        let instr = match (mnemonic, operand) {
            ("nop", Operand::None) => I::Nop,
            ("pop", Operand::None) => I::Pop,
            ("dup", Operand::None) => I::Dup,
            ("ret", Operand::None) => I::Ret,
            ("ldnull", Operand::None) => I::LdNull,
            ("add", Operand::None) => I::Add,
            ("sub", Operand::None) => I::Sub,
            ("mul", Operand::None) => I::Mul,
            ("ceq", Operand::None) => I::Ceq,
            ("clt", Operand::None) => I::Clt,
            ("cgt", Operand::None) => I::Cgt,
            ("ldc.i4", Operand::Int(v)) => I::LdcI4(i32::try_from(v).ok()?),
            ("ldc.i8", Operand::Int(v)) => I::LdcI8(v),
            ("ldstr", Operand::Str(s)) => I::LdStr(s),
            ("ldarg", Operand::Int(v)) => I::LdArg(u16::try_from(v).ok()?),
            ("starg", Operand::Int(v)) => I::StArg(u16::try_from(v).ok()?),
            ("ldloc", Operand::Int(v)) => I::LdLoc(u16::try_from(v).ok()?),
            ("stloc", Operand::Int(v)) => I::StLoc(u16::try_from(v).ok()?),
            ("ldfld", Operand::Field(f)) => I::LdFld(f),
            ("stfld", Operand::Field(f)) => I::StFld(f),
            ("ldsfld", Operand::Field(f)) => I::LdsFld(f),
            ("stsfld", Operand::Field(f)) => I::StsFld(f),
            ("call", Operand::Method(m)) => I::Call(m),
            ("callvirt", Operand::Method(m)) => I::CallVirt(m),
            ("newobj", Operand::Method(m)) => I::NewObj(m),
            ("br", Operand::Label(t)) => I::Br(t),
            ("brtrue", Operand::Label(t)) => I::BrTrue(t),
            ("brfalse", Operand::Label(t)) => I::BrFalse(t),
            ("beq", Operand::Label(t)) => I::Beq(t),
            _ => return None,
        };
        Some(instr)
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "nop",
            Instruction::Pop => "pop",
            Instruction::Dup => "dup",
            Instruction::Ret => "ret",
            Instruction::LdNull => "ldnull",
            Instruction::LdcI4(_) => "ldc.i4",
            Instruction::LdcI8(_) => "ldc.i8",
            Instruction::LdStr(_) => "ldstr",
            Instruction::LdArg(_) => "ldarg",
            Instruction::StArg(_) => "starg",
            Instruction::LdLoc(_) => "ldloc",
            Instruction::StLoc(_) => "stloc",
            Instruction::LdFld(_) => "ldfld",
            Instruction::StFld(_) => "stfld",
            Instruction::LdsFld(_) => "ldsfld",
            Instruction::StsFld(_) => "stsfld",
            Instruction::Call(_) => "call",
            Instruction::CallVirt(_) => "callvirt",
            Instruction::NewObj(_) => "newobj",
            Instruction::Br(_) => "br",
            Instruction::BrTrue(_) => "brtrue",
            Instruction::BrFalse(_) => "brfalse",
            Instruction::Beq(_) => "beq",
            Instruction::Add => "add",
            Instruction::Sub => "sub",
            Instruction::Mul => "mul",
            Instruction::Ceq => "ceq",
            Instruction::Clt => "clt",
            Instruction::Cgt => "cgt",
        }
    }

    pub fn branch_target(&self) -> Option<usize> {
        match self {
            Instruction::Br(t)
            | Instruction::BrTrue(t)
            | Instruction::BrFalse(t)
            | Instruction::Beq(t) => Some(*t),
            _ => None,
        }
    }

    pub fn branch_target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Instruction::Br(t)
            | Instruction::BrTrue(t)
            | Instruction::BrFalse(t)
            | Instruction::Beq(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Ret)
    }

    /// False for unconditional transfers (`br`, `ret`).
    pub fn falls_through(&self) -> bool {
        !matches!(self, Instruction::Br(_) | Instruction::Ret)
    }

    pub fn stack_effect(&self) -> StackEffect {
        use Instruction as I;
        match self {
            I::Nop | I::Br(_) | I::Ret => effect(0, 0),
            I::Pop | I::StArg(_) | I::StLoc(_) | I::StsFld(_) => effect(1, 0),
            I::BrTrue(_) | I::BrFalse(_) => effect(1, 0),
            I::Dup => effect(1, 2),
            I::LdNull | I::LdcI4(_) | I::LdcI8(_) | I::LdStr(_) => effect(0, 1),
            I::LdArg(_) | I::LdLoc(_) | I::LdsFld(_) => effect(0, 1),
            I::LdFld(_) => effect(1, 1),
            I::StFld(_) | I::Beq(_) => effect(2, 0),
            I::Add | I::Sub | I::Mul | I::Ceq | I::Clt | I::Cgt => effect(2, 1),
            I::Call(m) | I::CallVirt(m) => effect(
                m.params.len() + usize::from(m.has_this),
                usize::from(!m.ret.is_void()),
            ),
            I::NewObj(m) => effect(m.params.len(), 1),
        }
    }
}

// ── Method body ─────────────────────────────────────────────────────────────

/// How existing jumps to the insertion point are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpPolicy {
    /// Jumps to the insertion point keep reaching the original instruction.
    Shift,
    /// Jumps to the insertion point now reach the inserted code.
    Capture,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    #[serde(default)]
    pub locals: Vec<TypeRef>,
    #[serde(default)]
    pub init_locals: bool,
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        MethodBody {
            locals: Vec::new(),
            init_locals: false,
            instructions,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Declare a new local and return its index. `None` once every `u16`
    /// index is taken; the body is left unchanged.
    pub fn add_local(&mut self, ty: TypeRef) -> Option<u16> {
        let index = u16::try_from(self.locals.len()).ok()?;
        self.locals.push(ty);
        Some(index)
    }

    /// Indices of every `ret` instruction, in body order.
    pub fn return_points(&self) -> Vec<usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_return())
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Splice `seq` in before position `pos`.
    ///
    /// Branch targets inside `seq` are relative to the start of `seq` and are
    /// rebased onto `pos`. Existing branch targets past the insertion point are
    /// shifted by `seq.len()`; targets equal to `pos` follow `policy`.
    pub fn insert(&mut self, pos: usize, mut seq: Vec<Instruction>, policy: JumpPolicy) {
        let pos = pos.min(self.instructions.len());
        let n = seq.len();
        if n == 0 {
            return;
        }
        for instr in &mut self.instructions {
            if let Some(target) = instr.branch_target_mut() {
                if *target > pos || (*target == pos && policy == JumpPolicy::Shift) {
                    *target += n;
                }
            }
        }
        for instr in &mut seq {
            if let Some(target) = instr.branch_target_mut() {
                *target += pos;
            }
        }
        self.instructions.splice(pos..pos, seq);
    }

    /// Insert a copy of the sequence produced by `make` before every `ret`.
    /// Jumps that reached a `ret` now run the inserted code first.
    /// Returns the number of return points instrumented.
    pub fn insert_before_exits(&mut self, mut make: impl FnMut() -> Vec<Instruction>) -> usize {
        let exits = self.return_points();
        // Back to front so earlier return indices stay valid.
        for &pos in exits.iter().rev() {
            self.insert(pos, make(), JumpPolicy::Capture);
        }
        exits.len()
    }
}
