//! Pipeline text → [`Pipeline`] tree → execution (§4.4), following
//! `original_source/scatha/lib/IR/PipelineParser.cc` closely in structure:
//! a small hand-rolled `Lexer`, a recursive-descent `Parser` over it that
//! resolves pass names against a [`PassRegistry`] as it goes (an unknown
//! name is a parse error here, same as `original_source` throwing from
//! inside `parseModulePass`/`parseFunctionPass`) — adapted to return
//! `Result` instead of `throw`.
//!
//! ```text
//! pipeline    := modulelist
//! modulelist  := module ("," module)*
//! module      := id ["[" arglist "]"] ["(" fnlist ")"] | implicit
//! implicit    := fn                                       ; lowered to `foreach(fn)`
//! fnlist      := fn ("," fn)*
//! fn          := id ["[" arglist "]"]
//! arglist     := arg ("," arg)*
//! arg         := id [":" value]
//! value       := id | number | string-literal
//! ```
//!
//! `implicit` resolves to a single bare `fn` rather than a whole `fnlist`:
//! `original_source`'s `parseImplicitForeach` grabs exactly one function
//! pass and wraps it in its own `foreach` node, so `"a, b"` at the top
//! level parses as two singleton `foreach(a)`, `foreach(b)` nodes rather
//! than one `foreach(a, b)`. Both run `a` then `b` over every function;
//! they only differ in whether `a` finishes over every function before
//! `b` starts anywhere, or each function sees `a` then `b` before moving
//! on — and since every built-in pass here is stateless across functions,
//! that interleaving is unobservable. Followed here rather than spec.md's
//! more literal-looking "implicit := fnlist" phrasing, which is a
//! simplification of this.

use crate::context::Context;
use crate::error::{Position, PipelineError, TextParseError};
use crate::ir::module::Module;
use crate::pass::args::ArgumentMatchResult;
use crate::pass::pass::{FunctionPass, FunctionRunner, ModulePass};
use crate::pass::registry::PassRegistry;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(String),
    Str(String),
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    pos: Position,
}

fn lex(src: &str) -> Result<Vec<Spanned>, TextParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut line = 1u32;
    let mut col = 1u32;

    macro_rules! advance {
        () => {{
            if chars[i] == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
            i += 1;
        }};
    }

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            advance!();
            continue;
        }
        let pos = Position { line, column: col };
        match c {
            ',' => {
                out.push(Spanned { tok: Tok::Comma, pos });
                advance!();
            }
            '(' => {
                out.push(Spanned { tok: Tok::LParen, pos });
                advance!();
            }
            ')' => {
                out.push(Spanned { tok: Tok::RParen, pos });
                advance!();
            }
            '[' => {
                out.push(Spanned { tok: Tok::LBracket, pos });
                advance!();
            }
            ']' => {
                out.push(Spanned { tok: Tok::RBracket, pos });
                advance!();
            }
            ':' => {
                out.push(Spanned { tok: Tok::Colon, pos });
                advance!();
            }
            '\'' | '"' => {
                let delim = c;
                advance!();
                let start = i;
                while i < chars.len() && chars[i] != delim {
                    if chars[i] == '\n' {
                        return Err(TextParseError::new(pos, "unterminated string literal"));
                    }
                    advance!();
                }
                if i == chars.len() {
                    return Err(TextParseError::new(pos, "unterminated string literal"));
                }
                let text: String = chars[start..i].iter().collect();
                advance!();
                out.push(Spanned { tok: Tok::Str(text), pos });
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    advance!();
                }
                out.push(Spanned { tok: Tok::Number(chars[start..i].iter().collect()), pos });
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-') {
                    advance!();
                }
                out.push(Spanned { tok: Tok::Ident(chars[start..i].iter().collect()), pos });
            }
            other => return Err(TextParseError::new(pos, format!("unexpected character '{other}'"))),
        }
    }
    out.push(Spanned { tok: Tok::Eof, pos: Position { line, column: col } });
    Ok(out)
}

/// A pass this parser can bind arguments onto, regardless of which of the
/// two kinds appearing in pipeline text (`ModulePass`/`FunctionPass`) it
/// wraps — `LoopPass` never appears here since the grammar has no
/// production for one (§4.4).
trait Parameterized {
    fn pass_name(&self) -> &str;
    fn bind(&mut self, key: &str, value: &str) -> ArgumentMatchResult;
}

impl Parameterized for ModulePass {
    fn pass_name(&self) -> &str {
        self.name()
    }
    fn bind(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        self.match_argument(key, value)
    }
}

impl Parameterized for FunctionPass {
    fn pass_name(&self) -> &str {
        self.name()
    }
    fn bind(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        self.match_argument(key, value)
    }
}

struct Parser<'a> {
    toks: Vec<Spanned>,
    pos: usize,
    registry: &'a PassRegistry,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn cur_pos(&self) -> Position {
        self.toks[self.pos].pos
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), TextParseError> {
        if self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(TextParseError::new(self.cur_pos(), format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }
}

/// A comma-separated list of `parse_one`, stopping as soon as `parse_one`
/// finds nothing (the list's own `("," x)*` BNF production).
fn parse_list<T>(
    p: &mut Parser,
    mut parse_one: impl FnMut(&mut Parser) -> Result<Option<T>, PipelineError>,
) -> Result<Vec<T>, PipelineError> {
    let mut out = Vec::new();
    let Some(first) = parse_one(p)? else { return Ok(out) };
    out.push(first);
    while p.peek() == &Tok::Comma {
        p.bump();
        let Some(next) = parse_one(p)? else {
            return Err(PipelineError::Parse(TextParseError::new(p.cur_pos(), "expected another pipeline entry after ','")));
        };
        out.push(next);
    }
    Ok(out)
}

fn parse_value(p: &mut Parser) -> Result<String, PipelineError> {
    match p.bump() {
        Tok::Ident(s) | Tok::Number(s) | Tok::Str(s) => Ok(s),
        other => Err(PipelineError::Parse(TextParseError::new(p.cur_pos(), format!("unexpected value token {other:?}")))),
    }
}

fn parse_argument(p: &mut Parser, pass: &mut impl Parameterized) -> Result<bool, PipelineError> {
    let Tok::Ident(key) = p.peek().clone() else { return Ok(false) };
    p.bump();
    // A bare flag key (no `:value`) binds the flag to true (§4.4).
    let value = if p.peek() == &Tok::Colon {
        p.bump();
        parse_value(p)?
    } else {
        "YES".to_string()
    };
    match pass.bind(&key, &value) {
        ArgumentMatchResult::Success => Ok(true),
        ArgumentMatchResult::UnknownArgument => {
            Err(PipelineError::BadArgument { pass: pass.pass_name().to_string(), arg: key, reason: "unknown argument".to_string() })
        }
        ArgumentMatchResult::BadValue => {
            Err(PipelineError::BadArgument { pass: pass.pass_name().to_string(), arg: key, reason: format!("bad value '{value}'") })
        }
    }
}

fn parse_arguments(p: &mut Parser, pass: &mut impl Parameterized) -> Result<(), PipelineError> {
    if p.peek() != &Tok::LBracket {
        return Ok(());
    }
    p.bump();
    parse_list(p, |p| parse_argument(p, pass).map(|found| found.then_some(())))?;
    p.expect(&Tok::RBracket).map_err(PipelineError::Parse)?;
    Ok(())
}

fn parse_function_pass(p: &mut Parser) -> Result<Option<FunctionPass>, PipelineError> {
    let Tok::Ident(name) = p.peek().clone() else { return Ok(None) };
    let Some(proto) = p.registry.function_pass(&name) else { return Ok(None) };
    p.bump();
    let mut pass = proto.instantiate();
    parse_arguments(p, &mut pass)?;
    if p.peek() == &Tok::LParen {
        return Err(PipelineError::UnexpectedNesting(name));
    }
    Ok(Some(pass))
}

fn parse_function_pass_list(p: &mut Parser) -> Result<Vec<FunctionPass>, PipelineError> {
    parse_list(p, parse_function_pass)
}

/// A parsed module-level pipeline node: the pass itself plus whatever
/// function passes it was configured to run, if any.
#[derive(Debug)]
pub struct PipelineModuleNode {
    pass: ModulePass,
    children: Vec<FunctionPass>,
}

impl PipelineModuleNode {
    fn run(&self, ctx: &mut Context, module: &mut Module) -> bool {
        if self.children.is_empty() {
            self.pass.run(ctx, module, None)
        } else {
            let runner: &dyn FunctionRunner = self.children.as_slice();
            self.pass.run(ctx, module, Some(runner))
        }
    }
}

fn parse_implicit_foreach(p: &mut Parser) -> Result<Option<PipelineModuleNode>, PipelineError> {
    let Some(fn_pass) = parse_function_pass(p)? else { return Ok(None) };
    let proto = p.registry.module_pass("foreach").expect("`foreach` must be registered for implicit module nodes");
    Ok(Some(PipelineModuleNode { pass: proto.instantiate(), children: vec![fn_pass] }))
}

fn parse_module_pass(p: &mut Parser) -> Result<Option<PipelineModuleNode>, PipelineError> {
    let Tok::Ident(name) = p.peek().clone() else { return Ok(None) };
    let Some(proto) = p.registry.module_pass(&name) else {
        return parse_implicit_foreach(p);
    };
    p.bump();
    let mut pass = proto.instantiate();
    parse_arguments(p, &mut pass)?;
    let children = if p.peek() == &Tok::LParen {
        p.bump();
        let list = parse_function_pass_list(p)?;
        p.expect(&Tok::RParen).map_err(PipelineError::Parse)?;
        list
    } else {
        Vec::new()
    };
    Ok(Some(PipelineModuleNode { pass, children }))
}

/// The parsed pipeline: a sequence of module-level nodes run top to bottom
/// (§4.4: "execution walks the tree top-down").
#[derive(Debug)]
pub struct Pipeline {
    modules: Vec<PipelineModuleNode>,
}

impl Pipeline {
    pub fn run(&self, ctx: &mut Context, module: &mut Module) -> bool {
        let mut modified = false;
        for node in &self.modules {
            modified |= node.run(ctx, module);
        }
        modified
    }
}

/// Parse a pipeline specification, resolving every pass name against
/// `registry` as it parses (an unresolvable name is
/// [`PipelineError::UnknownPass`] only when it can't be a function pass
/// either — see `parse_implicit_foreach`).
pub fn parse_pipeline(registry: &PassRegistry, src: &str) -> Result<Pipeline, PipelineError> {
    let toks = lex(src).map_err(PipelineError::Parse)?;
    let mut p = Parser { toks, pos: 0, registry };
    let modules = parse_list(&mut p, parse_module_pass)?;
    if p.peek() != &Tok::Eof {
        if let Tok::Ident(name) = p.peek().clone() {
            return Err(PipelineError::UnknownPass(name));
        }
        return Err(PipelineError::Parse(TextParseError::new(p.cur_pos(), format!("unexpected trailing token {:?}", p.peek()))));
    }
    Ok(Pipeline { modules })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::global::Callable;
    use crate::ir::value::ValueId;

    fn module_with_one_function() -> Module {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let sig = ctx.function_type(i32_ty, vec![i32_ty]);
        let mut module = Module::new("m");
        let fid = module.add_function("f", sig, &[i32_ty]);
        let Callable::Defined(f) = module.function_mut(fid) else { unreachable!() };
        let entry = f.append_block("entry");
        let (p0, _) = f.params().nth(0).unwrap();
        Builder::new(f, entry).ret(Some(ValueId::Param(p0)));
        module
    }

    #[test]
    fn parses_an_explicit_module_pass_with_nested_function_pass() {
        let registry = PassRegistry::with_defaults();
        let pipeline = parse_pipeline(&registry, "foreach(mem2reg)").expect("should parse");
        assert_eq!(pipeline.modules.len(), 1);
        assert_eq!(pipeline.modules[0].children.len(), 1);
    }

    #[test]
    fn lowers_a_bare_function_pass_to_an_implicit_foreach() {
        let registry = PassRegistry::with_defaults();
        let pipeline = parse_pipeline(&registry, "mem2reg").expect("should parse");
        assert_eq!(pipeline.modules.len(), 1);
        assert_eq!(pipeline.modules[0].pass.name(), "foreach");
        assert_eq!(pipeline.modules[0].children.len(), 1);
    }

    #[test]
    fn binds_a_bare_flag_argument_to_true() {
        let registry = PassRegistry::with_defaults();
        // `validate` takes no arguments; exercise argument binding through
        // a pass that declares one instead.
        let mut registry = registry;
        registry.register_module_pass(ModulePass::new(
            "tagged",
            crate::pass::pass::PassCategory::Other,
            crate::pass::args::PassArgumentMap::new().declare_flag("loud"),
            |_ctx, _m, _fp, args| args.flag("loud"),
        ));
        let pipeline = parse_pipeline(&registry, "tagged[loud]").expect("should parse");
        let mut ctx = Context::new();
        let mut module = module_with_one_function();
        assert!(pipeline.run(&mut ctx, &mut module));
    }

    #[test]
    fn rejects_an_unknown_pass_name() {
        let registry = PassRegistry::with_defaults();
        let err = parse_pipeline(&registry, "not-a-real-pass").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPass(_)));
    }

    #[test]
    fn rejects_nesting_under_a_function_pass() {
        let registry = PassRegistry::with_defaults();
        let err = parse_pipeline(&registry, "foreach(mem2reg(mem2reg))").unwrap_err();
        assert!(matches!(err, PipelineError::UnexpectedNesting(_)));
    }

    #[test]
    fn runs_the_parsed_pipeline_end_to_end() {
        let registry = PassRegistry::with_defaults();
        let pipeline = parse_pipeline(&registry, "foreach(mem2reg), validate").expect("should parse");
        let mut ctx = Context::new();
        let mut module = module_with_one_function();
        pipeline.run(&mut ctx, &mut module);
    }
}
