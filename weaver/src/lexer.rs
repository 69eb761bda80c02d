// Lexer for the .wil module text encoding.
//
// Uses the `logos` crate for DFA-based lexing. Whitespace (including
// newlines) and `//` comments are insignificant.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Module text tokens.
///
/// Keywords and symbols are matched as fixed strings. Paths are dotted
/// identifiers (`System.Attribute`, `ldc.i4`) and carry their text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("module")]
    Module,
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("extends")]
    Extends,
    #[token("field")]
    Field,
    #[token("property")]
    Property,
    #[token("method")]
    Method,
    #[token("public")]
    Public,
    #[token("private")]
    Private,
    #[token("static")]
    Static,
    #[token("instance")]
    Instance,

    // ── Directives ──
    #[token(".locals")]
    Locals,
    #[token(".initlocals")]
    InitLocals,
    /// `.ctor` or `.cctor`.
    #[regex(r"\.c?ctor", |lex| lex.slice().to_string())]
    CtorName(String),

    // ── Symbols ──
    #[token("::")]
    DoubleColon,
    #[token(":")]
    Colon,
    #[token("->")]
    Arrow,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    // ── Literals ──
    /// Integer literal (decimal, optionally negative).
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    /// String literal with `\"`, `\\`, `\n` and `\t` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    // ── Identifier ──
    //
    // Placed after keywords — logos prioritises fixed `#[token]` matches
    // over regex for the same length, so `class` matches Class, not Path.
    /// Dotted identifier: `[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*`
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice().to_string())]
    Path(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Module => write!(f, "module"),
            Token::Class => write!(f, "class"),
            Token::Interface => write!(f, "interface"),
            Token::Extends => write!(f, "extends"),
            Token::Field => write!(f, "field"),
            Token::Property => write!(f, "property"),
            Token::Method => write!(f, "method"),
            Token::Public => write!(f, "public"),
            Token::Private => write!(f, "private"),
            Token::Static => write!(f, "static"),
            Token::Instance => write!(f, "instance"),
            Token::Locals => write!(f, ".locals"),
            Token::InitLocals => write!(f, ".initlocals"),
            Token::CtorName(name) => write!(f, "{name}"),
            Token::DoubleColon => write!(f, "::"),
            Token::Colon => write!(f, ":"),
            Token::Arrow => write!(f, "->"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Path(p) => write!(f, "{p}"),
        }
    }
}

// ── Callbacks ──

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                'n' => result.push('\n'),
                't' => result.push('\t'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

/// Escape a string for the text encoding (inverse of the lexer's unescape).
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

// ── Public API ──

/// Lex a module text into tokens.
///
/// Lexing is non-fatal: errors for unrecognised input are collected and the
/// lexer continues past them.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
