//! Natural loops and the loop nesting forest (§4.3), following
//! `original_source/lib/IR/Loop.h`'s `LoopInfo`/`LNFNode`/
//! `LoopNestingForest`: loops are found from back edges (`a -> b` where `b`
//! dominates `a`), one `LoopInfo` per loop header, nested by dominance.

use hashbrown::{HashMap, HashSet};

use crate::analysis::dominance::{compute_dominance, DominanceInfo};
use crate::context::Context;
use crate::ir::function::{BlockId, Function};
use crate::ir::instruction::PhiEdge;
use crate::ir::value::ValueId;

/// A single natural loop: `header` dominates every block in `body`, and
/// `body` is exactly the set of blocks that can reach a back edge into
/// `header` without leaving the loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub header: BlockId,
    pub body: HashSet<BlockId>,
    /// Blocks inside the loop with an edge to a block outside it.
    pub exiting_blocks: Vec<BlockId>,
    /// Blocks outside the loop targeted by an exiting edge.
    pub exit_blocks: Vec<BlockId>,
    pub parent: Option<BlockId>,
    pub children: Vec<BlockId>,
}

impl LoopInfo {
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }

    /// A loop is "proper" (original_source's term) when it has a single
    /// entry edge from outside — i.e. `header`'s only non-loop predecessor
    /// is unique. Passes that require a preheader check this first.
    pub fn is_proper(&self, func: &Function) -> bool {
        func.predecessors(self.header).iter().filter(|p| !self.body.contains(*p)).count() <= 1
    }
}

/// Keyed by loop header. Nesting is reconstructed from dominance: loop `A`
/// nests inside loop `B` iff `A`'s header is in `B`'s body.
#[derive(Debug, Clone, Default)]
pub struct LoopNestingForest {
    loops: HashMap<BlockId, LoopInfo>,
    roots: Vec<BlockId>,
}

impl LoopNestingForest {
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn loop_of(&self, block: BlockId) -> Option<&LoopInfo> {
        self.loops
            .values()
            .filter(|l| l.contains(block))
            .min_by_key(|l| l.body.len())
    }

    pub fn header_loop(&self, header: BlockId) -> Option<&LoopInfo> {
        self.loops.get(&header)
    }

    pub fn roots(&self) -> &[BlockId] {
        &self.roots
    }

    pub fn depth(&self, block: BlockId) -> u32 {
        let mut depth = 0;
        let mut cur = self.loop_of(block);
        while let Some(l) = cur {
            depth += 1;
            cur = l.parent.and_then(|p| self.loops.get(&p));
        }
        depth
    }
}

/// Find natural loops via back edges (`succ` dominates the block it's
/// branched from), then nest them by dominance over headers.
pub fn build_loop_nesting_forest(func: &Function, dom: &DominanceInfo) -> LoopNestingForest {
    let mut back_edges_by_header: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for b in func.blocks() {
        for s in func.successors(b) {
            if dom.dominates(s, b) {
                back_edges_by_header.entry(s).or_default().push(b);
            }
        }
    }

    let mut loops: HashMap<BlockId, LoopInfo> = HashMap::new();
    for (&header, latches) in &back_edges_by_header {
        let mut body = HashSet::new();
        body.insert(header);
        let mut worklist: Vec<BlockId> = latches.clone();
        while let Some(b) = worklist.pop() {
            if body.insert(b) {
                for p in func.predecessors(b) {
                    worklist.push(p);
                }
            }
        }

        let mut exiting_blocks = Vec::new();
        let mut exit_blocks = HashSet::new();
        for &b in &body {
            for s in func.successors(b) {
                if !body.contains(&s) {
                    exiting_blocks.push(b);
                    exit_blocks.insert(s);
                }
            }
        }
        exiting_blocks.sort_by_key(|b| b.index());
        exiting_blocks.dedup();
        let mut exit_blocks: Vec<BlockId> = exit_blocks.into_iter().collect();
        exit_blocks.sort_by_key(|b| b.index());

        loops.insert(
            header,
            LoopInfo { header, body, exiting_blocks, exit_blocks, parent: None, children: Vec::new() },
        );
    }

    // Nest by dominance over headers: the smallest enclosing loop (by body
    // size) whose body contains this header (but isn't itself) is the parent.
    let headers: Vec<BlockId> = loops.keys().copied().collect();
    for &h in &headers {
        let mut best: Option<BlockId> = None;
        for &other in &headers {
            if other == h {
                continue;
            }
            if loops[&other].body.contains(&h) {
                let better = match best {
                    None => true,
                    Some(cur) => loops[&other].body.len() < loops[&cur].body.len(),
                };
                if better {
                    best = Some(other);
                }
            }
        }
        loops.get_mut(&h).unwrap().parent = best;
        if let Some(parent) = best {
            loops.get_mut(&parent).unwrap().children.push(h);
        }
    }

    let roots = headers.iter().copied().filter(|h| loops[h].parent.is_none()).collect();
    LoopNestingForest { loops, roots }
}

/// Loop-closed SSA: for every value defined inside `loop_info` and used
/// outside it, insert a single-entry phi at each exit block and redirect
/// external uses through it (`original_source/lib/IR/Loop.h`'s
/// `makeLCSSA`). Idempotent: running it twice on an already-closed loop is
/// a no-op.
pub fn make_lcssa(func: &mut Function, ctx: &Context, loop_info: &LoopInfo) {
    let dom = compute_dominance(func);
    let body_insts: Vec<_> = loop_info
        .body
        .iter()
        .flat_map(|&b| func.block_insts(b).collect::<Vec<_>>())
        .collect();

    for def in body_insts {
        let def_value = ValueId::Inst(def);
        let external_users: Vec<_> = func
            .users_of(def_value)
            .iter()
            .copied()
            .filter(|&u| {
                let block = func.inst(u).block;
                !loop_info.body.contains(&block)
            })
            .collect();
        if external_users.is_empty() {
            continue;
        }

        let ty = func.value_type(ctx, def_value);
        // One phi per exit block; a user reached through only one of them
        // must pick up that exit's phi specifically, not whichever exit
        // happened to run first.
        let mut exit_phis: Vec<(BlockId, InstId)> = Vec::new();
        for &exit in &loop_info.exit_blocks {
            let preds = func.predecessors(exit);
            let incoming: Vec<PhiEdge> = preds
                .iter()
                .map(|&p| PhiEdge { pred: ValueId::Block(p), value: def_value })
                .collect();
            if incoming.is_empty() {
                continue;
            }
            let phi = func.append_inst(exit, Some("lcssa"), Some(ty), crate::ir::instruction::InstKind::Phi { incoming: incoming.into() });
            // Move the new phi to the front of `exit` to preserve §3
            // invariant 4 (phis lead their block).
            {
                let blk = func.block_mut(exit);
                blk.insts.retain(|&i| i != phi);
                blk.insts.insert(0, phi);
            }
            exit_phis.push((exit, phi));
        }

        for &user in &external_users {
            let user_block = func.inst(user).block;
            let Some(&(_, phi)) = exit_phis.iter().find(|&&(exit, _)| exit == user_block || dom.dominates(exit, user_block)) else {
                continue;
            };
            let operand_count = func.inst(user).kind.operands().len();
            for idx in 0..operand_count {
                if func.inst(user).kind.operands()[idx] == def_value {
                    func.set_operand(user, idx, ValueId::Inst(phi));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dominance::compute_dominance;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::instruction::{CompareMode, CompareOp};

    /// entry -> header -> {body -> header (back edge), exit}
    fn single_loop() -> Function {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let i1_ty = ctx.integral_type(1);
        let mut f = Function::new("loop", i32_ty, &[i32_ty]);
        let entry = f.append_block("entry");
        let header = f.append_block("header");
        let body = f.append_block("body");
        let exit = f.append_block("exit");

        let (p0, _) = f.params().nth(0).unwrap();
        let mut b = Builder::new(&mut f, entry);
        b.goto(header);

        b.position_at_end(header);
        let zero = ctx.int_constant(i32_ty, 0);
        let cmp = b.compare("c", i1_ty, CompareMode::Signed, CompareOp::Greater, ValueId::Param(p0), ValueId::Const(zero));
        b.branch(ValueId::Inst(cmp), body, exit);

        b.position_at_end(body);
        b.goto(header);

        b.position_at_end(exit);
        b.ret(Some(ValueId::Param(p0)));
        f
    }

    #[test]
    fn finds_single_natural_loop() {
        let f = single_loop();
        let dom = compute_dominance(&f);
        let forest = build_loop_nesting_forest(&f, &dom);
        assert_eq!(forest.roots().len(), 1);
        let blocks: Vec<BlockId> = f.blocks().collect();
        let header = blocks[1];
        let body = blocks[2];
        let linfo = forest.header_loop(header).unwrap();
        assert!(linfo.contains(header));
        assert!(linfo.contains(body));
        assert_eq!(linfo.exit_blocks, vec![blocks[3]]);
    }
}
