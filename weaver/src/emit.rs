// emit.rs — Printer for the .wil module text encoding
//
// Renders a module back to the text accepted by `parser::parse`. Every
// instruction is prefixed with an `IL_nnnn:` label so branch operands can be
// printed by index.
//
// Preconditions: branch targets are within the body (a target past the end
//   prints a label that the parser will reject).
// Postconditions: `parse(&print_module(m)).module == Some(m)` for well-formed m.
// Failure modes: none.
// Side effects: none.

use std::fmt::{self, Write};

use crate::body::{Instruction, MethodBody};
use crate::lexer::escape_string;
use crate::module::{AttrArg, Attribute, MethodDef, MethodRef, Module, TypeDef, TypeKind};

const INDENT: &str = "    ";

/// Label printed in front of instruction `index`.
pub fn label(index: usize) -> String {
    format!("IL_{:04x}", index)
}

// ── Instructions ────────────────────────────────────────────────────────────

fn write_method_ref(f: &mut fmt::Formatter<'_>, m: &MethodRef) -> fmt::Result {
    if m.has_this {
        write!(f, "instance ")?;
    }
    write!(f, "{}::{}(", m.declaring, m.name)?;
    for (i, p) in m.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", p)?;
    }
    write!(f, ") -> {}", m.ret)
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction as I;
        write!(f, "{}", self.mnemonic())?;
        match self {
            I::LdcI4(v) => write!(f, " {}", v),
            I::LdcI8(v) => write!(f, " {}", v),
            I::LdStr(s) => write!(f, " {}", escape_string(s)),
            I::LdArg(i) | I::StArg(i) | I::LdLoc(i) | I::StLoc(i) => write!(f, " {}", i),
            I::LdFld(r) | I::StFld(r) | I::LdsFld(r) | I::StsFld(r) => {
                write!(f, " {}::{}: {}", r.declaring, r.name, r.ty)
            }
            I::Call(m) | I::CallVirt(m) | I::NewObj(m) => {
                write!(f, " ")?;
                write_method_ref(f, m)
            }
            I::Br(t) | I::BrTrue(t) | I::BrFalse(t) | I::Beq(t) => write!(f, " {}", label(*t)),
            _ => Ok(()),
        }
    }
}

// ── Attributes ──────────────────────────────────────────────────────────────

impl fmt::Display for AttrArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrArg::Int(v) => write!(f, "{}", v),
            AttrArg::Str(s) => write!(f, "{}", escape_string(s)),
            AttrArg::Enum(path) => write!(f, "{}", path),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.ty)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ")")?;
        }
        write!(f, "]")
    }
}

// ── Bodies and members ──────────────────────────────────────────────────────

/// Print a body's lines (directives and labelled instructions) at `indent`.
pub fn print_body(out: &mut String, body: &MethodBody, indent: &str) -> fmt::Result {
    if !body.locals.is_empty() {
        let locals: Vec<String> = body.locals.iter().map(|t| t.to_string()).collect();
        writeln!(out, "{indent}.locals ({})", locals.join(", "))?;
    }
    if body.init_locals {
        writeln!(out, "{indent}.initlocals")?;
    }
    for (index, instr) in body.instructions.iter().enumerate() {
        writeln!(out, "{indent}{}: {}", label(index), instr)?;
    }
    Ok(())
}

fn print_method(out: &mut String, method: &MethodDef) -> fmt::Result {
    for attr in &method.attributes {
        writeln!(out, "{INDENT}{}", attr)?;
    }
    write!(out, "{INDENT}{} ", method.access)?;
    if method.is_static {
        write!(out, "static ")?;
    }
    write!(out, "method {}(", method.name)?;
    for (i, param) in method.params.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        for attr in &param.attributes {
            write!(out, "{} ", attr)?;
        }
        write!(out, "{}: {}", param.name, param.ty)?;
    }
    write!(out, ") -> {}", method.ret)?;
    match &method.body {
        None => writeln!(out, ";"),
        Some(body) => {
            writeln!(out, " {{")?;
            print_body(out, body, &INDENT.repeat(2))?;
            writeln!(out, "{INDENT}}}")
        }
    }
}

fn print_type(out: &mut String, ty: &TypeDef) -> fmt::Result {
    for attr in &ty.attributes {
        writeln!(out, "{}", attr)?;
    }
    let kind = match ty.kind {
        TypeKind::Class => "class",
        TypeKind::Interface => "interface",
    };
    write!(out, "{} {}", kind, ty.name)?;
    if let Some(base) = &ty.base {
        write!(out, " extends {}", base)?;
    }
    writeln!(out, " {{")?;
    for field in &ty.fields {
        for attr in &field.attributes {
            writeln!(out, "{INDENT}{}", attr)?;
        }
        write!(out, "{INDENT}{} ", field.access)?;
        if field.is_static {
            write!(out, "static ")?;
        }
        writeln!(out, "field {}: {}", field.name, field.ty)?;
    }
    for property in &ty.properties {
        for attr in &property.attributes {
            writeln!(out, "{INDENT}{}", attr)?;
        }
        writeln!(out, "{INDENT}property {}: {}", property.name, property.ty)?;
    }
    for method in &ty.methods {
        print_method(out, method)?;
    }
    writeln!(out, "}}")
}

/// Render a whole module in the text encoding.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut out, module);
    out
}

fn write_module(out: &mut String, module: &Module) -> fmt::Result {
    writeln!(out, "module {}", module.name)?;
    for ty in &module.types {
        writeln!(out)?;
        print_type(out, ty)?;
    }
    Ok(())
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_module(self))
    }
}
