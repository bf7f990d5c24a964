//! A small convenience layer for constructing IR, in the spirit of the
//! teacher's `Lowerer` (`ir/lowering/lowering.rs`): instead of calling
//! `Function::append_inst` with a fully-spelled `InstKind` at every call
//! site, a `Builder` tracks "where am I inserting" and exposes one method
//! per opcode. Used by tests and by anything (outside this crate) that
//! constructs IR programmatically rather than by parsing text.

use crate::context::{Context, TypeId};
use crate::ir::function::{BlockId, Function, InstId};
use crate::ir::instruction::{BinaryOp, CompareMode, CompareOp, ConversionKind, InstKind, PhiEdge, UnaryOp};
use crate::ir::value::ValueId;

pub struct Builder<'f> {
    func: &'f mut Function,
    block: BlockId,
}

impl<'f> Builder<'f> {
    pub fn new(func: &'f mut Function, block: BlockId) -> Self {
        Self { func, block }
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.block
    }

    fn insert(&mut self, hint: &str, ty: Option<TypeId>, kind: InstKind) -> InstId {
        self.func.append_inst(self.block, Some(hint), ty, kind)
    }

    pub fn alloca(&mut self, hint: &str, ptr_ty: TypeId, allocated_ty: TypeId, count: ValueId) -> InstId {
        self.insert(hint, Some(ptr_ty), InstKind::Alloca { allocated_ty, count })
    }

    pub fn load(&mut self, hint: &str, result_ty: TypeId, address: ValueId) -> InstId {
        self.insert(hint, Some(result_ty), InstKind::Load { address })
    }

    pub fn store(&mut self, address: ValueId, value: ValueId) -> InstId {
        self.func.append_inst(self.block, None, None, InstKind::Store { address, value })
    }

    pub fn unary(&mut self, hint: &str, ty: TypeId, op: UnaryOp, operand: ValueId) -> InstId {
        self.insert(hint, Some(ty), InstKind::Unary { op, operand })
    }

    pub fn binary(&mut self, hint: &str, ty: TypeId, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> InstId {
        self.insert(hint, Some(ty), InstKind::Binary { op, lhs, rhs })
    }

    pub fn compare(
        &mut self,
        hint: &str,
        i1_ty: TypeId,
        mode: CompareMode,
        op: CompareOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> InstId {
        self.insert(hint, Some(i1_ty), InstKind::Compare { mode, op, lhs, rhs })
    }

    pub fn convert(
        &mut self,
        hint: &str,
        to_ty: TypeId,
        kind: ConversionKind,
        operand: ValueId,
        from_bits: u32,
        to_bits: u32,
    ) -> InstId {
        self.insert(hint, Some(to_ty), InstKind::Conversion { kind, operand, from_bits, to_bits })
    }

    pub fn call(&mut self, hint: &str, result_ty: Option<TypeId>, callee: ValueId, args: Vec<ValueId>) -> InstId {
        self.insert(hint, result_ty, InstKind::Call { callee, args: args.into() })
    }

    pub fn phi(&mut self, hint: &str, ty: TypeId, incoming: Vec<PhiEdge>) -> InstId {
        self.insert(hint, Some(ty), InstKind::Phi { incoming: incoming.into() })
    }

    pub fn goto(&mut self, target: BlockId) -> InstId {
        self.func.append_inst(self.block, None, None, InstKind::Goto { target: ValueId::Block(target) })
    }

    pub fn branch(&mut self, cond: ValueId, if_true: BlockId, if_false: BlockId) -> InstId {
        self.func.append_inst(
            self.block,
            None,
            None,
            InstKind::Branch { cond, if_true: ValueId::Block(if_true), if_false: ValueId::Block(if_false) },
        )
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> InstId {
        self.func.append_inst(self.block, None, None, InstKind::Return { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_wires_a_diamond() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let i1_ty = ctx.integral_type(1);
        let mut f = Function::new("max", i32_ty, &[i32_ty, i32_ty]);

        let entry = f.append_block("entry");
        let then_blk = f.append_block("then");
        let join = f.append_block("join");

        let (p0, _) = f.params().nth(0).unwrap();
        let (p1, _) = f.params().nth(1).unwrap();

        let mut b = Builder::new(&mut f, entry);
        let cmp = b.compare(
            "cmp",
            i1_ty,
            CompareMode::Signed,
            CompareOp::Greater,
            ValueId::Param(p0),
            ValueId::Param(p1),
        );
        b.branch(ValueId::Inst(cmp), then_blk, join);

        b.position_at_end(then_blk);
        b.goto(join);

        b.position_at_end(join);
        let phi = b.phi(
            "result",
            i32_ty,
            vec![
                PhiEdge { pred: ValueId::Block(entry), value: ValueId::Param(p1) },
                PhiEdge { pred: ValueId::Block(then_blk), value: ValueId::Param(p0) },
            ],
        );
        b.ret(Some(ValueId::Inst(phi)));

        assert_eq!(f.predecessors(join).len(), 2);
        assert_eq!(f.blocks().count(), 3);
    }
}
