// Parser for the .wil module text encoding.
//
// Parses a token stream (from the lexer) straight into the module object
// model. Uses chumsky combinators. Branch labels are resolved to instruction
// indices per body once the whole body has been read.
//
// Preconditions: input is a token stream from `lexer::lex()`.
// Postconditions: returns a module with IDs assigned, plus any parse errors.
// Failure modes: syntax errors, unknown mnemonics/labels and out-of-range
//   operands produce `Rich` diagnostics.
// Side effects: none.

use std::collections::HashMap;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::body::{operand_kind, Instruction, MethodBody, Operand, OperandKind};
use crate::lexer::Token;
use crate::module::{
    Access, AttrArg, Attribute, FieldDef, FieldRef, MethodDef, MethodRef, Module, ParamDef,
    PropertyDef, TypeDef, TypeKind, TypeRef,
};
use crate::id::{MethodId, TypeId};

/// Result of parsing: module plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub module: Option<Module>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a module text. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (module, parse_errors) = module_parser().parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        module,
        errors: all_errors,
    }
}

// ── Intermediate forms ──

enum RawOperand {
    Ready(Operand),
    Label(String),
}

struct RawInstr {
    label: Option<String>,
    mnemonic: String,
    operand: RawOperand,
}

enum Member {
    Field(FieldDef),
    Property(PropertyDef),
    Method(MethodDef),
}

/// Turn labelled lines into a body with index-based branch targets.
fn resolve_body(
    locals: Vec<TypeRef>,
    init_locals: bool,
    lines: Vec<RawInstr>,
) -> Result<MethodBody, String> {
    let mut labels = HashMap::new();
    for (index, line) in lines.iter().enumerate() {
        if let Some(label) = &line.label {
            if labels.insert(label.clone(), index).is_some() {
                return Err(format!("duplicate label '{}'", label));
            }
        }
    }

    let mut instructions = Vec::with_capacity(lines.len());
    for line in lines {
        let operand = match line.operand {
            RawOperand::Ready(op) => op,
            RawOperand::Label(name) => match labels.get(&name) {
                Some(&target) => Operand::Label(target),
                None => return Err(format!("unknown label '{}'", name)),
            },
        };
        let shown = format!("{:?}", operand);
        match Instruction::build(&line.mnemonic, operand) {
            Some(instr) => instructions.push(instr),
            None => {
                return Err(format!(
                    "invalid operand for '{}': {}",
                    line.mnemonic, shown
                ))
            }
        }
    }

    Ok(MethodBody {
        locals,
        init_locals,
        instructions,
    })
}

// ── Main parser builder ──

fn module_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Module, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Atoms ──

    let path = select! { Token::Path(p) => p }.labelled("identifier");
    let int = select! { Token::Int(v) => v }.labelled("integer");
    let string = select! { Token::StringLit(s) => s }.labelled("string");
    let member_name = path.or(select! { Token::CtorName(n) => n });

    let type_ref = path.map(|p| TypeRef::from_name(&p));
    let type_list = type_ref
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Attributes: '[' path ('(' arg, ... ')')? ']' ──

    let attr_arg = choice((
        int.map(AttrArg::Int),
        string.map(AttrArg::Str),
        path.map(AttrArg::Enum),
    ));

    let attribute = path
        .then(
            attr_arg
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or_not(),
        )
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .map(|(ty, args)| Attribute {
            ty,
            args: args.unwrap_or_default(),
        });
    let attributes = attribute.repeated().collect::<Vec<_>>();

    let access = choice((
        just(Token::Public).to(Access::Public),
        just(Token::Private).to(Access::Private),
    ))
    .or_not()
    .map(Option::unwrap_or_default);
    let is_static = just(Token::Static).or_not().map(|s| s.is_some());

    // ── Member references ──

    let field_ref = path
        .then_ignore(just(Token::DoubleColon))
        .then(member_name)
        .then_ignore(just(Token::Colon))
        .then(type_ref)
        .map(|((declaring, name), ty)| FieldRef {
            declaring,
            name,
            ty,
        });

    let method_ref = just(Token::Instance)
        .or_not()
        .then(path)
        .then_ignore(just(Token::DoubleColon))
        .then(member_name)
        .then(type_list.clone())
        .then_ignore(just(Token::Arrow))
        .then(type_ref)
        .map(|((((instance, declaring), name), params), ret)| MethodRef {
            declaring,
            name,
            has_this: instance.is_some(),
            params,
            ret,
        });

    // ── Instructions: (label ':')? mnemonic operand? ──
    // The mnemonic decides the operand shape, so `ret` never swallows the
    // label of the following line.

    let mnemonic = move |kinds: &'static [OperandKind]| {
        path.filter(move |m: &String| operand_kind(m).is_some_and(|k| kinds.contains(&k)))
    };

    let raw_instr = choice((
        mnemonic(&[OperandKind::None]).map(|m| (m, RawOperand::Ready(Operand::None))),
        mnemonic(&[OperandKind::Int32, OperandKind::Int64, OperandKind::Index])
            .then(int)
            .map(|(m, v)| (m, RawOperand::Ready(Operand::Int(v)))),
        mnemonic(&[OperandKind::Str])
            .then(string)
            .map(|(m, s)| (m, RawOperand::Ready(Operand::Str(s)))),
        mnemonic(&[OperandKind::Field])
            .then(field_ref)
            .map(|(m, f)| (m, RawOperand::Ready(Operand::Field(f)))),
        mnemonic(&[OperandKind::Method])
            .then(method_ref)
            .map(|(m, r)| (m, RawOperand::Ready(Operand::Method(r)))),
        mnemonic(&[OperandKind::Label])
            .then(path)
            .map(|(m, l)| (m, RawOperand::Label(l))),
    ));

    let instr_line = path
        .then_ignore(just(Token::Colon))
        .or_not()
        .then(raw_instr)
        .map(|(label, (mnemonic, operand))| RawInstr {
            label,
            mnemonic,
            operand,
        });

    let body = just(Token::Locals)
        .ignore_then(type_list.clone())
        .or_not()
        .map(Option::unwrap_or_default)
        .then(just(Token::InitLocals).or_not().map(|f| f.is_some()))
        .then(instr_line.repeated().collect::<Vec<_>>())
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .try_map(|((locals, init_locals), lines), span| {
            resolve_body(locals, init_locals, lines).map_err(|msg| Rich::custom(span, msg))
        })
        .boxed();

    // ── Members ──

    let param = attributes
        .clone()
        .then(path)
        .then_ignore(just(Token::Colon))
        .then(type_ref)
        .map(|((attributes, name), ty)| ParamDef {
            name,
            ty,
            attributes,
        });

    let method = access
        .clone()
        .then(is_static.clone())
        .then_ignore(just(Token::Method))
        .then(member_name)
        .then(
            param
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then_ignore(just(Token::Arrow))
        .then(type_ref)
        .then(just(Token::Semi).to(None).or(body.map(Some)))
        .map(|(((((access, is_static), name), params), ret), body)| MethodDef {
            id: MethodId::default(),
            name,
            access,
            is_static,
            params,
            ret,
            attributes: Vec::new(),
            body,
        });

    let field = access
        .clone()
        .then(is_static.clone())
        .then_ignore(just(Token::Field))
        .then(path)
        .then_ignore(just(Token::Colon))
        .then(type_ref)
        .map(|(((access, is_static), name), ty)| FieldDef {
            name,
            ty,
            access,
            is_static,
            attributes: Vec::new(),
        });

    let property = just(Token::Property)
        .ignore_then(path)
        .then_ignore(just(Token::Colon))
        .then(type_ref)
        .map(|(name, ty)| PropertyDef {
            name,
            ty,
            attributes: Vec::new(),
        });

    let member = attributes
        .clone()
        .then(choice((
            field.map(Member::Field),
            property.map(Member::Property),
            method.map(Member::Method),
        )))
        .map(|(attrs, member)| match member {
            Member::Field(f) => Member::Field(FieldDef {
                attributes: attrs,
                ..f
            }),
            Member::Property(p) => Member::Property(PropertyDef {
                attributes: attrs,
                ..p
            }),
            Member::Method(m) => Member::Method(MethodDef {
                attributes: attrs,
                ..m
            }),
        });

    // ── Types ──

    let kind = choice((
        just(Token::Class).to(TypeKind::Class),
        just(Token::Interface).to(TypeKind::Interface),
    ));

    let type_def = attributes
        .then(kind)
        .then(path)
        .then(just(Token::Extends).ignore_then(path).or_not())
        .then(
            member
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|((((attributes, kind), name), base), members)| {
            let mut ty = TypeDef {
                id: TypeId::default(),
                name,
                kind,
                base,
                attributes,
                fields: Vec::new(),
                properties: Vec::new(),
                methods: Vec::new(),
            };
            for member in members {
                match member {
                    Member::Field(f) => ty.fields.push(f),
                    Member::Property(p) => ty.properties.push(p),
                    Member::Method(m) => ty.methods.push(m),
                }
            }
            ty
        });

    // ── Module ──

    just(Token::Module)
        .ignore_then(path)
        .then(type_def.repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|(name, types)| {
            let mut module = Module::new(name);
            for ty in types {
                module.push_type(ty);
            }
            module
        })
}

// ── Tests ──
