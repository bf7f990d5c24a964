//! Textual IR printer (§6.3): one `Module` in, one round-trippable string
//! out. `@name` for globals/functions, `%name` for locals, and the fixed
//! type grammar (`iN`, `fN`, `ptr`, `[T,N]`, `@Struct`).

use std::fmt::Write as _;

use crate::context::Context;
use crate::ir::function::{BlockId, Function};
use crate::ir::global::{Callable, Visibility};
use crate::ir::instruction::{CompareMode, CompareOp, ConversionKind, InstKind, UnaryOp};
use crate::ir::module::Module;
use crate::ir::value::ValueId;
use crate::types::{ArrayLen, Type, TypeId};

pub fn print_type(ctx: &Context, ty: TypeId) -> String {
    match ctx.get_type(ty) {
        Type::Void => "void".to_string(),
        Type::Integral(bits) => format!("i{bits}"),
        Type::Float(bits) => format!("f{bits}"),
        Type::Pointer => "ptr".to_string(),
        Type::Array(elem, len) => {
            let elem_s = print_type(ctx, *elem);
            match len {
                ArrayLen::Fixed(n) => format!("[{elem_s},{n}]"),
                ArrayLen::Dynamic => format!("[{elem_s},?]"),
            }
        }
        Type::Struct(s) => match &s.name {
            Some(name) => format!("@{name}"),
            None => {
                let members: Vec<String> = s.members.iter().map(|&m| print_type(ctx, m)).collect();
                format!("{{{}}}", members.join(", "))
            }
        },
        Type::Function(sig) => {
            let params: Vec<String> = sig.params.iter().map(|&p| print_type(ctx, p)).collect();
            format!("{}({})", print_type(ctx, sig.return_type), params.join(", "))
        }
    }
}

fn unary_mnemonic(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::BitNot => "bitnot",
        UnaryOp::LogicNot => "lnot",
    }
}

fn binary_mnemonic(op: crate::ir::instruction::BinaryOp) -> &'static str {
    use crate::ir::instruction::BinaryOp::*;
    match op {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        SDiv => "sdiv",
        UDiv => "udiv",
        SRem => "srem",
        URem => "urem",
        FAdd => "fadd",
        FSub => "fsub",
        FMul => "fmul",
        FDiv => "fdiv",
        And => "and",
        Or => "or",
        XOr => "xor",
        LShL => "lshl",
        LShR => "lshr",
        AShL => "ashl",
        AShR => "ashr",
    }
}

fn compare_mnemonic(mode: CompareMode, op: CompareOp) -> String {
    let mode = match mode {
        CompareMode::Signed => "s",
        CompareMode::Unsigned => "u",
        CompareMode::Float => "f",
    };
    let op = match op {
        CompareOp::Less => "lt",
        CompareOp::LessEq => "le",
        CompareOp::Greater => "gt",
        CompareOp::GreaterEq => "ge",
        CompareOp::Equal => "eq",
        CompareOp::NotEqual => "ne",
    };
    format!("{mode}cmp.{op}")
}

fn conversion_mnemonic(kind: ConversionKind) -> &'static str {
    match kind {
        ConversionKind::SExt => "sext",
        ConversionKind::ZExt => "zext",
        ConversionKind::Trunc => "trunc",
        ConversionKind::FExt => "fext",
        ConversionKind::FTrunc => "ftrunc",
        ConversionKind::StoI => "stoi",
        ConversionKind::UtoI => "utoi",
        ConversionKind::ItoS => "itos",
        ConversionKind::ItoU => "itou",
        ConversionKind::BitCast => "bitcast",
    }
}

struct Printer<'a> {
    ctx: &'a Context,
    module: &'a Module,
    out: String,
}

impl<'a> Printer<'a> {
    fn value(&self, func: &Function, v: ValueId) -> String {
        match v {
            ValueId::Param(p) => format!("%{}", func.param(p).name),
            ValueId::Block(b) => format!("%{}", func.block(b).name),
            ValueId::Inst(i) => format!("%{}", func.inst(i).name.clone().unwrap_or_else(|| format!("{}", i.index()))),
            ValueId::Global(g) => format!("@{}", self.module.global(g).name),
            ValueId::Const(c) => self.constant(c),
        }
    }

    fn constant(&self, c: crate::context::ConstId) -> String {
        use crate::context::ConstantData::*;
        match self.ctx.get_const(c) {
            Integral { ty, bits } => format!("{} {}", print_type(self.ctx, *ty), *bits as i64),
            Float { ty, bits } => {
                let v = if matches!(self.ctx.get_type(*ty), Type::Float(32)) {
                    f32::from_bits(*bits as u32) as f64
                } else {
                    f64::from_bits(*bits)
                };
                format!("{} {}", print_type(self.ctx, *ty), v)
            }
            NullPointer => "ptr null".to_string(),
            Undef(ty) => format!("{} undef", print_type(self.ctx, *ty)),
            Aggregate { ty, elements } => {
                let elems: Vec<String> = elements.iter().map(|&e| self.constant(e)).collect();
                format!("{} {{{}}}", print_type(self.ctx, *ty), elems.join(", "))
            }
        }
    }

    fn instruction(&mut self, func: &Function, inst: crate::ir::function::InstId) {
        let data = func.inst(inst);
        let name = data.name.clone().unwrap_or_default();
        let lhs = if data.result_ty.is_some() { format!("%{name} = ") } else { String::new() };
        let ty_suffix = data.result_ty.map(|t| format!(" {}", print_type(self.ctx, t))).unwrap_or_default();

        let rhs = match &data.kind {
            InstKind::Alloca { allocated_ty, count } => {
                format!("alloca {}, {}", print_type(self.ctx, *allocated_ty), self.value(func, *count))
            }
            InstKind::Load { address } => format!("load{ty_suffix}, {}", self.value(func, *address)),
            InstKind::Store { address, value } => {
                format!("store {}, {}", self.value(func, *address), self.value(func, *value))
            }
            InstKind::Unary { op, operand } => {
                format!("{}{ty_suffix}, {}", unary_mnemonic(*op), self.value(func, *operand))
            }
            InstKind::Binary { op, lhs: l, rhs: r } => {
                format!("{}{ty_suffix}, {}, {}", binary_mnemonic(*op), self.value(func, *l), self.value(func, *r))
            }
            InstKind::Compare { mode, op, lhs: l, rhs: r } => {
                format!("{}{ty_suffix}, {}, {}", compare_mnemonic(*mode, *op), self.value(func, *l), self.value(func, *r))
            }
            InstKind::Conversion { kind, operand, .. } => {
                format!("{}{ty_suffix}, {}", conversion_mnemonic(*kind), self.value(func, *operand))
            }
            InstKind::GetElementPointer { base_ty, base, indices, dynamic_index } => {
                let mut idx_strs: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                if let Some(d) = dynamic_index {
                    idx_strs.push(self.value(func, *d));
                }
                format!(
                    "gep {}, {}, [{}]",
                    print_type(self.ctx, *base_ty),
                    self.value(func, *base),
                    idx_strs.join(", ")
                )
            }
            InstKind::ExtractValue { agg, indices } => {
                let idx_strs: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                format!("extractvalue{ty_suffix}, {}, [{}]", self.value(func, *agg), idx_strs.join(", "))
            }
            InstKind::InsertValue { agg, value, indices } => {
                let idx_strs: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                format!(
                    "insertvalue{ty_suffix}, {}, {}, [{}]",
                    self.value(func, *agg),
                    self.value(func, *value),
                    idx_strs.join(", ")
                )
            }
            InstKind::Select { cond, if_true, if_false } => format!(
                "select{ty_suffix}, {}, {}, {}",
                self.value(func, *cond),
                self.value(func, *if_true),
                self.value(func, *if_false)
            ),
            InstKind::Call { callee, args } => {
                let arg_strs: Vec<String> = args.iter().map(|&a| self.value(func, a)).collect();
                format!("call{ty_suffix}, {}, ({})", self.value(func, *callee), arg_strs.join(", "))
            }
            InstKind::Phi { incoming } => {
                let pairs: Vec<String> = incoming
                    .iter()
                    .map(|e| format!("[{}, {}]", self.value(func, e.pred), self.value(func, e.value)))
                    .collect();
                format!("phi{ty_suffix}, {}", pairs.join(", "))
            }
            InstKind::Goto { target } => format!("goto {}", self.value(func, *target)),
            InstKind::Branch { cond, if_true, if_false } => {
                format!("branch {}, {}, {}", self.value(func, *cond), self.value(func, *if_true), self.value(func, *if_false))
            }
            InstKind::Return { value } => match value {
                Some(v) => format!("return {}", self.value(func, *v)),
                None => "return".to_string(),
            },
        };
        let _ = writeln!(self.out, "    {lhs}{rhs}");
    }

    fn block(&mut self, func: &Function, block: BlockId) {
        let _ = writeln!(self.out, "  %{}:", func.block(block).name);
        for inst in func.block_insts(block).collect::<Vec<_>>() {
            self.instruction(func, inst);
        }
    }

    fn function(&mut self, func: &Function) {
        let params: Vec<String> =
            func.params().map(|(_, p)| format!("%{} {}", p.name, print_type(self.ctx, p.ty))).collect();
        let _ = writeln!(
            self.out,
            "function @{}({}) -> {} {{",
            func.name,
            params.join(", "),
            print_type(self.ctx, {
                let Type::Function(sig) = self.ctx.get_type(func.sig) else {
                    panic!("function signature type must be Type::Function")
                };
                sig.return_type
            })
        );
        for block in func.blocks().collect::<Vec<_>>() {
            self.block(func, block);
        }
        let _ = writeln!(self.out, "}}");
    }
}

pub fn print_module(ctx: &Context, module: &Module) -> String {
    let mut printer = Printer { ctx, module, out: String::new() };
    for (_, global) in module.globals() {
        let vis = match global.visibility {
            Visibility::Internal => "internal",
            Visibility::External => "external",
        };
        let _ = writeln!(printer.out, "global @{} {} {}", global.name, vis, print_type(ctx, global.ty));
    }
    for (_, callable) in module.functions() {
        match callable {
            Callable::Defined(f) => printer.function(f),
            Callable::Foreign(f) => {
                let _ = writeln!(printer.out, "declare @{} {}", f.name, print_type(ctx, f.sig));
            }
        }
    }
    printer.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;

    #[test]
    fn prints_a_trivial_function() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let sig = ctx.function_type(i32_ty, vec![i32_ty]);
        let mut module = Module::new("m");
        let fid = module.add_function("identity", sig, &[i32_ty]);
        let crate::ir::global::Callable::Defined(f) = module.function_mut(fid) else { unreachable!() };
        let entry = f.append_block("entry");
        let (p0, _) = f.params().nth(0).unwrap();
        let mut b = Builder::new(f, entry);
        b.ret(Some(ValueId::Param(p0)));

        let text = print_module(&ctx, &module);
        assert!(text.contains("function @identity"));
        assert!(text.contains("return %arg0"));
    }
}
