//! `Function`, its `BasicBlock`s, `Param`s and `Instruction`s (§3, §4.2).
//!
//! Blocks, instructions and parameters each live in their own tombstone
//! arena (`Vec<Option<T>>`): removal clears a slot to `None` rather than
//! shifting indices, so previously-minted ids stay valid (or become a
//! detectable dangling reference) across edits, the same tradeoff the
//! teacher's `ir/lowering/lowering.rs` makes with its `Value(u32)` counter.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::analysis::dominance::DominanceInfo;
use crate::analysis::loops::LoopNestingForest;
use crate::context::{Context, NameFactory, TypeId};
use crate::ir::instruction::InstKind;
use crate::ir::value::ValueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);
impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub(crate) u32);
impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub(crate) u32);
impl ParamId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
}

/// One instruction. `result_ty` is `None` for instructions with no result
/// (`Store`, `Goto`, `Branch`, `Return`) — checked against `kind` by
/// `validate` rather than encoded in the type, matching spec.md §3's note
/// that a result's presence is opcode-determined, not a separate field.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub name: Option<String>,
    pub result_ty: Option<TypeId>,
    pub kind: InstKind,
    pub(crate) block: BlockId,
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub name: String,
    /// Instructions in program order, including the terminator as the last
    /// element. Phis, if present, are a prefix of this list (§3 invariant 4).
    pub(crate) insts: Vec<InstId>,
}

/// One function body: a dominance-ordered-ish sequence of basic blocks plus
/// their instructions, all owned by arenas on `Function` itself (§4.2).
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub sig: TypeId,
    pub attrs: FunctionAttributes,

    params: Vec<Option<Param>>,
    blocks: Vec<Option<BasicBlock>>,
    insts: Vec<Option<Instruction>>,

    /// Order blocks were appended in; doubles as the "linear layout" used by
    /// the printer (§6.3) and as a stable default iteration order.
    block_order: Vec<BlockId>,

    /// `users[v]` is every instruction whose `InstKind::operands()` contains
    /// `v`, for every `v` this function refers to — not just locally-defined
    /// `ValueId::Inst`/`ValueId::Block` ids but also `Const`/`Global`/`Param`
    /// ids reached from inside this function. Keeping one map per function
    /// (rather than splitting users across `Context`/`Module`/`Function`)
    /// means every mutator that changes an operand has exactly one place to
    /// update, at the cost of `replace_all_uses_with` only ever being
    /// function-scoped — acceptable since no pass in this crate needs to
    /// replace a `Global`'s uses across more than one function at a time.
    users: HashMap<ValueId, SmallVec<[InstId; 2]>>,

    pub(crate) names: NameFactory,

    dominance: Option<DominanceInfo>,
    post_dominance: Option<DominanceInfo>,
    loop_forest: Option<LoopNestingForest>,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionAttributes: u8 {
        const NONE     = 0;
        const NO_RETURN = 1 << 0;
        const PURE      = 1 << 1;
    }
}

impl Default for FunctionAttributes {
    fn default() -> Self {
        FunctionAttributes::NONE
    }
}

impl Function {
    pub fn new(name: impl Into<String>, sig: TypeId, param_types: &[TypeId]) -> Self {
        let mut names = NameFactory::new();
        let params = param_types
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                Some(Param { name: names.fresh(&format!("arg{i}")), ty })
            })
            .collect();
        Self {
            name: name.into(),
            sig,
            attrs: FunctionAttributes::NONE,
            params,
            blocks: Vec::new(),
            insts: Vec::new(),
            block_order: Vec::new(),
            users: HashMap::new(),
            names,
            dominance: None,
            post_dominance: None,
            loop_forest: None,
        }
    }

    // -- parameters ---------------------------------------------------

    pub fn params(&self) -> impl Iterator<Item = (ParamId, &Param)> {
        self.params
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (ParamId(i as u32), p)))
    }

    pub fn param(&self, id: ParamId) -> &Param {
        self.params[id.index()].as_ref().expect("dangling ParamId")
    }

    /// Overwrite a parameter's name, releasing the minted default back to
    /// this function's `NameFactory` — for the textual parser (§6.3), which
    /// creates a `Function` with placeholder names before it knows the real
    /// ones from source text.
    pub fn set_param_name(&mut self, id: ParamId, name: String) {
        let param = self.params[id.index()].as_mut().expect("dangling ParamId");
        self.names.release(&param.name);
        self.names.reserve(&name);
        param.name = name;
    }

    // -- blocks ---------------------------------------------------------

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.block_order.iter().copied()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.index()].as_ref().expect("dangling BlockId")
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.index()].as_mut().expect("dangling BlockId")
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.block_order.first().copied()
    }

    pub fn append_block(&mut self, hint: &str) -> BlockId {
        let name = self.names.fresh(hint);
        self.push_block(name)
    }

    /// Like `append_block`, but uses `name` verbatim instead of minting a
    /// disambiguated one — for the textual parser (§6.3), where names
    /// already come from, and must roundtrip back to, source text.
    pub fn append_block_named(&mut self, name: &str) -> BlockId {
        self.names.reserve(name);
        self.push_block(name.to_string())
    }

    fn push_block(&mut self, name: String) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BasicBlock { name, insts: Vec::new() }));
        self.block_order.push(id);
        self.invalidate_analyses();
        id
    }

    /// Remove a block: erases its instructions (dropping their uses) first.
    /// Panics if any other block still branches to it — callers must first
    /// retarget or remove those edges.
    pub fn remove_block(&mut self, id: BlockId) {
        let inst_ids: Vec<InstId> = self.block(id).insts.clone();
        for inst in inst_ids {
            self.erase_instruction(inst);
        }
        assert!(
            self.users.get(&ValueId::Block(id)).map_or(true, |u| u.is_empty()),
            "cannot remove block {} with remaining predecessors",
            self.block(id).name
        );
        self.names.release(&self.blocks[id.index()].take().unwrap().name);
        self.block_order.retain(|&b| b != id);
        self.users.remove(&ValueId::Block(id));
        self.invalidate_analyses();
    }

    // -- instructions -----------------------------------------------------

    pub fn inst(&self, id: InstId) -> &Instruction {
        self.insts[id.index()].as_ref().expect("dangling InstId")
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        self.insts[id.index()].as_mut().expect("dangling InstId")
    }

    pub fn block_insts(&self, block: BlockId) -> impl Iterator<Item = InstId> + '_ {
        self.block(block).insts.iter().copied()
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.block(block).insts.last().copied()
    }

    /// Append a fully-formed instruction to the end of `block`'s instruction
    /// list (before any terminator is expected to exist yet), registering its
    /// operands in the use-list.
    pub fn append_inst(
        &mut self,
        block: BlockId,
        name_hint: Option<&str>,
        result_ty: Option<TypeId>,
        kind: InstKind,
    ) -> InstId {
        let name = name_hint.map(|h| self.names.fresh(h));
        self.push_inst(block, name, result_ty, kind)
    }

    /// Like `append_inst`, but uses `name` verbatim — for the textual
    /// parser, where the instruction's name already comes from source text.
    pub fn append_inst_named(
        &mut self,
        block: BlockId,
        name: Option<String>,
        result_ty: Option<TypeId>,
        kind: InstKind,
    ) -> InstId {
        if let Some(n) = &name {
            self.names.reserve(n);
        }
        self.push_inst(block, name, result_ty, kind)
    }

    fn push_inst(
        &mut self,
        block: BlockId,
        name: Option<String>,
        result_ty: Option<TypeId>,
        kind: InstKind,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        let operands: SmallVec<[ValueId; 4]> = kind.operands();
        self.insts.push(Some(Instruction { name, result_ty, kind, block }));
        for operand in operands {
            self.users.entry(operand).or_default().push(id);
        }
        self.block_mut(block).insts.push(id);
        self.invalidate_analyses();
        id
    }

    /// Insert `kind` immediately before `before` in its own block.
    pub fn insert_before(
        &mut self,
        before: InstId,
        name_hint: Option<&str>,
        result_ty: Option<TypeId>,
        kind: InstKind,
    ) -> InstId {
        let block = self.inst(before).block;
        let name = name_hint.map(|h| self.names.fresh(h));
        let id = InstId(self.insts.len() as u32);
        let operands: SmallVec<[ValueId; 4]> = kind.operands();
        self.insts.push(Some(Instruction { name, result_ty, kind, block }));
        for operand in operands {
            self.users.entry(operand).or_default().push(id);
        }
        let list = &mut self.block_mut(block).insts;
        let pos = list.iter().position(|&i| i == before).expect("`before` not in its own block");
        list.insert(pos, id);
        self.invalidate_analyses();
        id
    }

    /// Remove an instruction from its block and clear its operands' user
    /// entries. Panics if it still has users (callers must
    /// `replace_all_uses_with` first, matching §3 invariant 3).
    pub fn erase_instruction(&mut self, id: InstId) {
        assert!(
            self.users.get(&ValueId::Inst(id)).map_or(true, |u| u.is_empty()),
            "cannot erase instruction still referenced by other instructions"
        );
        let inst = self.insts[id.index()].take().expect("dangling InstId");
        for operand in inst.kind.operands() {
            self.remove_user(operand, id);
        }
        self.block_mut(inst.block).insts.retain(|&i| i != id);
        self.users.remove(&ValueId::Inst(id));
        if let Some(n) = &inst.name {
            self.names.release(n);
        }
        self.invalidate_analyses();
    }

    fn remove_user(&mut self, operand: ValueId, user: InstId) {
        if let Some(list) = self.users.get_mut(&operand) {
            if let Some(pos) = list.iter().position(|&i| i == user) {
                list.swap_remove(pos);
            }
        }
    }

    /// Overwrite one operand slot of `inst` (the `idx`-th value yielded by
    /// `InstKind::operands()`), updating both the old and new operand's
    /// user lists.
    pub fn set_operand(&mut self, inst: InstId, idx: usize, new_value: ValueId) {
        let old_value = {
            let instr = self.inst_mut(inst);
            let mut slots = instr.kind.operands_mut();
            let slot = slots.get_mut(idx).expect("operand index out of range");
            let old = **slot;
            **slot = new_value;
            old
        };
        if old_value != new_value {
            self.remove_user(old_value, inst);
            self.users.entry(new_value).or_default().push(inst);
        }
    }

    /// Redirect every use of `old` to `new` across this function (§3's
    /// "replace all uses" primitive mem2reg and CFG simplification build on).
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let users = self.users.remove(&old).unwrap_or_default();
        for user in &users {
            let instr = self.inst_mut(*user);
            for slot in instr.kind.operands_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
        }
        self.users.entry(new).or_default().extend(users);
    }

    pub fn users_of(&self, value: ValueId) -> &[InstId] {
        self.users.get(&value).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Blocks targeted by `block`'s terminator, in operand order (duplicates
    /// kept — a conditional branch with both arms equal yields two entries).
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        let Some(term) = self.terminator(block) else { return SmallVec::new() };
        self.inst(term)
            .kind
            .operands()
            .into_iter()
            .filter_map(ValueId::as_block)
            .collect()
    }

    /// Blocks whose terminator targets `block`, derived from its use-list —
    /// the payoff of modeling control edges as ordinary `ValueId::Block`
    /// operands instead of a parallel predecessor list to keep in sync.
    pub fn predecessors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        // A phi's incoming edge also references `block` via `ValueId::Block`,
        // but that reference lives in `block`'s successor, not an edge into
        // `block` — only a terminator actually targeting `block` counts.
        self.users_of(ValueId::Block(block))
            .iter()
            .filter(|&&inst| self.inst(inst).kind.is_terminator())
            .map(|&inst| self.inst(inst).block)
            .collect()
    }

    pub fn value_type(&self, ctx: &Context, value: ValueId) -> TypeId {
        match value {
            ValueId::Param(p) => self.param(p).ty,
            ValueId::Inst(i) => self.inst(i).result_ty.expect("instruction has no result"),
            ValueId::Const(c) => ctx.const_type(c),
            ValueId::Global(_) => ctx.ptr_type(),
            ValueId::Block(_) => panic!("a basic block has no value type"),
        }
    }

    // -- analysis caches --------------------------------------------------

    pub(crate) fn invalidate_analyses(&mut self) {
        self.dominance = None;
        self.post_dominance = None;
        self.loop_forest = None;
    }

    pub(crate) fn cached_dominance(&self) -> Option<&DominanceInfo> {
        self.dominance.as_ref()
    }

    pub(crate) fn set_cached_dominance(&mut self, info: DominanceInfo) {
        self.dominance = Some(info);
    }

    pub(crate) fn cached_post_dominance(&self) -> Option<&DominanceInfo> {
        self.post_dominance.as_ref()
    }

    pub(crate) fn set_cached_post_dominance(&mut self, info: DominanceInfo) {
        self.post_dominance = Some(info);
    }

    pub(crate) fn cached_loop_forest(&self) -> Option<&LoopNestingForest> {
        self.loop_forest.as_ref()
    }

    pub(crate) fn set_cached_loop_forest(&mut self, forest: LoopNestingForest) {
        self.loop_forest = Some(forest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::instruction::{BinaryOp, InstKind};

    fn setup() -> (Context, Function) {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let f = Function::new("add", i32_ty, &[i32_ty, i32_ty]);
        (ctx, f)
    }

    #[test]
    fn append_and_erase_instruction_updates_users() {
        let (mut ctx, mut f) = setup();
        let i32_ty = ctx.integral_type(32);
        let entry = f.append_block("entry");
        let (p0, _) = f.params().nth(0).unwrap();
        let (p1, _) = f.params().nth(1).unwrap();
        let add = f.append_inst(
            entry,
            Some("sum"),
            Some(i32_ty),
            InstKind::Binary { op: BinaryOp::Add, lhs: ValueId::Param(p0), rhs: ValueId::Param(p1) },
        );
        assert_eq!(f.users_of(ValueId::Param(p0)), &[add]);
        f.append_inst(entry, None, None, InstKind::Return { value: Some(ValueId::Inst(add)) });
        assert_eq!(f.users_of(ValueId::Inst(add)).len(), 1);
    }

    #[test]
    fn predecessors_follow_block_operands() {
        let (_ctx, mut f) = setup();
        let entry = f.append_block("entry");
        let exit = f.append_block("exit");
        f.append_inst(entry, None, None, InstKind::Goto { target: ValueId::Block(exit) });
        assert_eq!(f.predecessors(exit).as_slice(), &[entry]);
        assert_eq!(f.successors(entry).as_slice(), &[exit]);
    }

    #[test]
    #[should_panic]
    fn erase_instruction_with_users_panics() {
        let (mut ctx, mut f) = setup();
        let i32_ty = ctx.integral_type(32);
        let entry = f.append_block("entry");
        let (p0, _) = f.params().nth(0).unwrap();
        let v = f.append_inst(entry, None, Some(i32_ty), InstKind::Unary { op: crate::ir::instruction::UnaryOp::Neg, operand: ValueId::Param(p0) });
        f.append_inst(entry, None, None, InstKind::Return { value: Some(ValueId::Inst(v)) });
        f.erase_instruction(v);
    }
}
