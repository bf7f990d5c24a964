//! Alloca-to-SSA promotion ("mem2reg"), the transformation §4.5 names as
//! this crate's flagship pass: turn `alloca`+`load`+`store` traffic for a
//! variable into direct SSA values, inserting phis at the iterated
//! dominance frontier of its store sites and renaming loads/stores by a
//! preorder walk of the dominator tree. Mirrors
//! `original_source/lib/Opt/AllocaPromotion.cc`'s `VariableInfo` almost
//! one-to-one, except renaming here is an explicit-stack preorder walk
//! instead of recursion (spec.md §9 flags recursive renaming as something
//! to avoid in a reimplementation — deep dominator trees would otherwise
//! blow the native stack).

use hashbrown::{HashMap, HashSet};

use crate::analysis::dominance::DominanceInfo;
use crate::context::{Context, TypeId};
use crate::ir::function::{BlockId, Function, InstId};
use crate::ir::instruction::{InstKind, PhiEdge};
use crate::ir::value::ValueId;

struct Candidate {
    alloca: InstId,
    allocated_ty: TypeId,
    def_blocks: HashSet<BlockId>,
}

fn is_promotable(func: &Function, alloca: InstId) -> bool {
    let target = ValueId::Inst(alloca);
    func.users_of(target).iter().all(|&user| match &func.inst(user).kind {
        InstKind::Load { address } => *address == target,
        InstKind::Store { address, value } => *address == target && *value != target,
        _ => false,
    })
}

fn find_candidates(func: &Function) -> Vec<Candidate> {
    let mut out = Vec::new();
    for block in func.blocks() {
        for inst in func.block_insts(block) {
            let InstKind::Alloca { allocated_ty, .. } = func.inst(inst).kind else { continue };
            if !is_promotable(func, inst) {
                continue;
            }
            let target = ValueId::Inst(inst);
            let def_blocks = func
                .users_of(target)
                .iter()
                .filter(|&&u| matches!(func.inst(u).kind, InstKind::Store { .. }))
                .map(|&u| func.inst(u).block)
                .collect();
            out.push(Candidate { alloca: inst, allocated_ty, def_blocks });
        }
    }
    out
}

fn iterated_dominance_frontier(def_blocks: &HashSet<BlockId>, dom: &DominanceInfo) -> HashSet<BlockId> {
    let mut phi_blocks = HashSet::new();
    let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
    while let Some(b) = worklist.pop() {
        for d in dom.frontier(b) {
            if phi_blocks.insert(d) {
                worklist.push(d);
            }
        }
    }
    phi_blocks
}

enum Frame {
    Enter(BlockId),
    Exit(usize),
}

fn rename(
    func: &mut Function,
    ctx: &mut Context,
    candidate: &Candidate,
    dom: &DominanceInfo,
    phis: &HashMap<BlockId, InstId>,
) {
    let undef = ValueId::Const(ctx.undef(candidate.allocated_ty));

    let Some(root) = dom.root() else { return };
    let mut frames = vec![Frame::Enter(root)];
    let mut values = vec![undef];

    while let Some(frame) = frames.pop() {
        match frame {
            Frame::Exit(saved_len) => {
                values.truncate(saved_len);
            }
            Frame::Enter(block) => {
                let saved_len = values.len();
                frames.push(Frame::Exit(saved_len));

                if let Some(&phi) = phis.get(&block) {
                    values.push(ValueId::Inst(phi));
                }

                for inst in func.block_insts(block).collect::<Vec<_>>() {
                    match func.inst(inst).kind.clone() {
                        InstKind::Load { address } if address == ValueId::Inst(candidate.alloca) => {
                            let current = *values.last().unwrap();
                            func.replace_all_uses_with(ValueId::Inst(inst), current);
                            func.erase_instruction(inst);
                        }
                        InstKind::Store { address, value } if address == ValueId::Inst(candidate.alloca) => {
                            values.push(value);
                            func.erase_instruction(inst);
                        }
                        _ => {}
                    }
                }

                let current = *values.last().unwrap();
                for succ in func.successors(block) {
                    let Some(&phi) = phis.get(&succ) else { continue };
                    let InstKind::Phi { incoming } = &func.inst(phi).kind else { unreachable!() };
                    let idx = incoming
                        .iter()
                        .position(|e| e.pred == ValueId::Block(block))
                        .expect("phi missing incoming edge for predecessor");
                    func.set_operand(phi, 2 * idx + 1, current);
                }

                for &child in dom.children(block).iter().rev() {
                    frames.push(Frame::Enter(child));
                }
            }
        }
    }
}

/// Replace trivial phis — every non-self incoming value equal — with that
/// value, repeating until no more simplify (original_source's `clean()`
/// step; a phi can only become trivial after another phi it depended on was
/// simplified away).
fn clean_trivial_phis(func: &mut Function, inserted: &[InstId]) {
    let mut remaining: Vec<InstId> = inserted.to_vec();
    loop {
        let mut simplified_any = false;
        let mut still_remaining = Vec::new();
        for phi in remaining {
            if func.users_of(ValueId::Inst(phi)).is_empty() {
                // Nobody reads this phi (e.g. every branch to its block was
                // dead or the value never escapes this block) — erase it.
                func.erase_instruction(phi);
                simplified_any = true;
                continue;
            }
            let InstKind::Phi { incoming } = &func.inst(phi).kind else { unreachable!() };
            let mut unique: Option<ValueId> = None;
            let mut trivial = true;
            for edge in incoming {
                if edge.value == ValueId::Inst(phi) {
                    continue;
                }
                match unique {
                    None => unique = Some(edge.value),
                    Some(v) if v == edge.value => {}
                    Some(_) => {
                        trivial = false;
                        break;
                    }
                }
            }
            if trivial {
                let replacement = unique.unwrap_or(ValueId::Inst(phi));
                if replacement != ValueId::Inst(phi) {
                    func.replace_all_uses_with(ValueId::Inst(phi), replacement);
                    func.erase_instruction(phi);
                    simplified_any = true;
                    continue;
                }
            }
            still_remaining.push(phi);
        }
        remaining = still_remaining;
        if !simplified_any {
            break;
        }
    }
}

/// Promote every promotable `alloca` in `func` to SSA values. A candidate
/// is promotable when its only uses are whole-value `load`/`store`s of
/// itself (§4.5 — no address ever escapes via GEP, call argument, or a
/// second store of the pointer value). Non-promotable allocas (arrays,
/// address-taken locals) are left untouched.
pub fn promote_allocas(func: &mut Function, ctx: &mut Context) {
    let candidates = find_candidates(func);
    if candidates.is_empty() {
        return;
    }

    let dom = crate::analysis::dominance::compute_dominance(func);
    let mut inserted_all = Vec::new();

    for candidate in &candidates {
        let phi_blocks = iterated_dominance_frontier(&candidate.def_blocks, &dom);
        let mut phis = HashMap::new();
        for &block in &phi_blocks {
            let preds = func.predecessors(block);
            if preds.is_empty() {
                continue;
            }
            let undef = ValueId::Const(ctx.undef(candidate.allocated_ty));
            let incoming: Vec<PhiEdge> =
                preds.iter().map(|&p| PhiEdge { pred: ValueId::Block(p), value: undef }).collect();
            let phi = func.append_inst(
                block,
                Some("reg"),
                Some(candidate.allocated_ty),
                InstKind::Phi { incoming: incoming.into() },
            );
            {
                let blk = func.block_mut(block);
                blk.insts.retain(|&i| i != phi);
                blk.insts.insert(0, phi);
            }
            phis.insert(block, phi);
        }

        rename(func, ctx, candidate, &dom, &phis);

        inserted_all.extend(phis.values().copied());
    }

    clean_trivial_phis(func, &inserted_all);

    for candidate in &candidates {
        if func.users_of(ValueId::Inst(candidate.alloca)).is_empty() {
            func.erase_instruction(candidate.alloca);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::instruction::{CompareMode, CompareOp};

    #[test]
    fn straight_line_store_then_load_becomes_direct_use() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let ptr_ty = ctx.ptr_type();
        let mut f = Function::new("straight_line", i32_ty, &[i32_ty]);
        let entry = f.append_block("entry");
        let (p0, _) = f.params().nth(0).unwrap();
        let one = ctx.int_constant(i32_ty, 1);

        let mut b = Builder::new(&mut f, entry);
        let slot = b.alloca("slot", ptr_ty, i32_ty, ValueId::Const(one));
        b.store(ValueId::Inst(slot), ValueId::Param(p0));
        let loaded = b.load("v", i32_ty, ValueId::Inst(slot));
        b.ret(Some(ValueId::Inst(loaded)));

        promote_allocas(&mut f, &mut ctx);

        assert_eq!(f.blocks().count(), 1);
        let insts: Vec<_> = f.block_insts(entry).collect();
        // only the terminator should remain.
        assert_eq!(insts.len(), 1);
        let InstKind::Return { value } = &f.inst(insts[0]).kind else { panic!("expected return") };
        assert_eq!(*value, Some(ValueId::Param(p0)));
    }

    #[test]
    fn diamond_merge_inserts_phi() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let ptr_ty = ctx.ptr_type();
        let i1_ty = ctx.integral_type(1);
        let mut f = Function::new("diamond_store", i32_ty, &[i32_ty]);
        let entry = f.append_block("entry");
        let then_blk = f.append_block("then");
        let els = f.append_block("else");
        let join = f.append_block("join");

        let (p0, _) = f.params().nth(0).unwrap();
        let one = ctx.int_constant(i32_ty, 1);
        let ten = ctx.int_constant(i32_ty, 10);
        let twenty = ctx.int_constant(i32_ty, 20);
        let zero = ctx.int_constant(i32_ty, 0);

        let mut b = Builder::new(&mut f, entry);
        let slot = b.alloca("slot", ptr_ty, i32_ty, ValueId::Const(one));
        let cmp =
            b.compare("c", i1_ty, CompareMode::Signed, CompareOp::Greater, ValueId::Param(p0), ValueId::Const(zero));
        b.branch(ValueId::Inst(cmp), then_blk, els);

        b.position_at_end(then_blk);
        b.store(ValueId::Inst(slot), ValueId::Const(ten));
        b.goto(join);

        b.position_at_end(els);
        b.store(ValueId::Inst(slot), ValueId::Const(twenty));
        b.goto(join);

        b.position_at_end(join);
        let loaded = b.load("v", i32_ty, ValueId::Inst(slot));
        b.ret(Some(ValueId::Inst(loaded)));

        promote_allocas(&mut f, &mut ctx);

        let join_insts: Vec<_> = f.block_insts(join).collect();
        let InstKind::Phi { incoming } = &f.inst(join_insts[0]).kind else {
            panic!("expected join block to start with a phi")
        };
        assert_eq!(incoming.len(), 2);
        let InstKind::Return { value } = &f.inst(*join_insts.last().unwrap()).kind else {
            panic!("expected return")
        };
        assert_eq!(*value, Some(ValueId::Inst(join_insts[0])));
    }

    #[test]
    fn address_taken_alloca_is_not_promoted() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let ptr_ty = ctx.ptr_type();
        let mut f = Function::new("escapes", i32_ty, &[]);
        let entry = f.append_block("entry");
        let one = ctx.int_constant(i32_ty, 1);
        let mut b = Builder::new(&mut f, entry);
        let slot = b.alloca("slot", ptr_ty, i32_ty, ValueId::Const(one));
        // Pass the pointer itself to a call: this "escapes" the alloca, so
        // it must not be touched.
        let target = ctx.null_pointer();
        b.call("ignored", None, ValueId::Const(target), vec![ValueId::Inst(slot)]);
        b.ret(None);

        promote_allocas(&mut f, &mut ctx);
        assert!(f.blocks().any(|blk| f.block_insts(blk).any(|i| matches!(f.inst(i).kind, InstKind::Alloca { .. }))));
    }
}
