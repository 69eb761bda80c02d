// aiw — Attribute Injection Weaver
//
// Library root. The walker drives the scanner, resolver and weaving engine
// over a module; `pipeline` wires them to module I/O.

pub mod advice;
pub mod body;
pub mod component;
pub mod config;
pub mod diag;
pub mod emit;
pub mod error;
pub mod id;
pub mod lexer;
pub mod manifest;
pub mod module;
pub mod parser;
pub mod pipeline;
pub mod resolve;
pub mod scan;
pub mod session;
pub mod synth;
pub mod verify;
pub mod walker;
pub mod weave;
