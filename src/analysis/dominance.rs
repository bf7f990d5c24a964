//! Dominance, post-dominance, and dominance frontiers (§4.3 "CFG
//! analyses"), computed with the same iterative fixpoint algorithm as
//! `original_source/lib/Opt/Dominance.cc`: repeatedly intersect each block's
//! predecessors' dominator sets until nothing changes, then derive the
//! dominator tree from the result, then compute dominance frontiers with
//! Cytron et al.'s bottom-up dominator-tree walk.

use hashbrown::{HashMap, HashSet};

use crate::ir::function::{BlockId, Function};

/// One direction of dominance: forward (normal dominance, entry-rooted) or
/// backward (post-dominance, virtual-exit-rooted). The algorithm is
/// identical either way once "predecessor"/"successor" are swapped, so both
/// directions share this one type (mirrors `original_source`'s templated
/// `DominanceInfo` usable for both).
#[derive(Debug, Clone)]
pub struct DominanceInfo {
    root: Option<BlockId>,
    /// `idom[b]` is `b`'s immediate dominator; absent for the root.
    idom: HashMap<BlockId, BlockId>,
    children: HashMap<BlockId, Vec<BlockId>>,
    frontier: HashMap<BlockId, HashSet<BlockId>>,
    /// Reverse postorder over the direction this info was built in, used to
    /// get single-pass convergence in the common case.
    order: Vec<BlockId>,
}

impl DominanceInfo {
    pub fn root(&self) -> Option<BlockId> {
        self.root
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn frontier(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.frontier.get(&block).into_iter().flatten().copied()
    }

    /// `true` iff every path from the root to `b` passes through `a`
    /// (a block dominates itself).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(parent) = self.idom(cur) {
            if parent == a {
                return true;
            }
            cur = parent;
        }
        false
    }

    /// Preorder walk of the dominator tree rooted at `root()`, the order
    /// mem2reg's renaming pass needs (§4.5).
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(b) = stack.pop() {
                out.push(b);
                // Push children in reverse so the walk visits them in the
                // order they were inserted.
                for &c in self.children(b).iter().rev() {
                    stack.push(c);
                }
            }
        }
        out
    }
}

fn reverse_postorder(
    root: BlockId,
    succ: impl Fn(BlockId) -> Vec<BlockId>,
) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            postorder.push(b);
            continue;
        }
        if !visited.insert(b) {
            continue;
        }
        stack.push((b, true));
        for s in succ(b) {
            if !visited.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

/// Compute dominance in the given direction: `succ`/`pred` give the forward
/// edges and their inverse. For ordinary dominance, `succ = Function::successors`,
/// `pred = Function::predecessors`, `root` = entry block. For post-dominance,
/// swap `succ`/`pred` and root at a virtual exit connected from every block
/// with no successors (real `Return`-terminated blocks).
fn compute(
    root: BlockId,
    all_blocks: &[BlockId],
    succ: impl Fn(BlockId) -> Vec<BlockId>,
    pred: impl Fn(BlockId) -> Vec<BlockId>,
) -> DominanceInfo {
    let order = reverse_postorder(root, &succ);
    let rpo_index: HashMap<BlockId, usize> =
        order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(root, root);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in order.iter().skip(1) {
            let preds = pred(b);
            let mut new_idom = None;
            for p in preds {
                if !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, &rpo_index),
                });
            }
            if let Some(new_idom) = new_idom {
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }
    idom.remove(&root);

    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (&b, &parent) in &idom {
        children.entry(parent).or_default().push(b);
    }

    let mut frontier: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &b in all_blocks {
        let preds = pred(b);
        if preds.len() < 2 {
            continue;
        }
        let Some(&b_idom) = idom.get(&b) else { continue };
        for p in preds {
            let mut runner = p;
            while runner != b_idom {
                if !idom.contains_key(&runner) && runner != root {
                    break;
                }
                frontier.entry(runner).or_default().insert(b);
                let Some(&next) = idom.get(&runner) else { break };
                if next == runner {
                    break;
                }
                runner = next;
            }
        }
    }

    DominanceInfo { root: Some(root), idom, children, frontier, order }
}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Forward dominance over `func`, entry-rooted. Cached on the function;
/// callers should go through [`crate::analysis::dominance_info`] instead of
/// calling this directly so the cache is used.
pub fn compute_dominance(func: &Function) -> DominanceInfo {
    let entry = func.entry_block().expect("function has no entry block");
    let all: Vec<BlockId> = func.blocks().collect();
    compute(entry, &all, |b| func.successors(b).to_vec(), |b| func.predecessors(b).to_vec())
}

/// Post-dominance over `func`. Blocks with no real successor (terminated by
/// `Return`) are treated as edges into a single virtual exit, which becomes
/// the root of the post-dominator tree; that virtual exit is never itself
/// returned by any query (it has no `BlockId`), so a block with no real
/// successors post-dominates nothing but itself and is post-dominated only
/// by blocks on every path from it to a return.
pub fn compute_post_dominance(func: &Function) -> DominanceInfo {
    let all: Vec<BlockId> = func.blocks().collect();
    let exits: Vec<BlockId> = all.iter().copied().filter(|&b| func.successors(b).is_empty()).collect();

    if exits.is_empty() {
        // No reachable return (e.g. every path loops or traps): degenerate
        // to an info with no root, so every query returns "no information"
        // rather than panicking.
        return DominanceInfo {
            root: None,
            idom: HashMap::new(),
            children: HashMap::new(),
            frontier: HashMap::new(),
            order: Vec::new(),
        };
    }

    // Standard trick: make the post-dominance root a real exit block when
    // there's exactly one, otherwise fabricate a multi-exit walk by treating
    // every exit as equally reachable from a synthetic predecessor-less
    // root — handled here by unioning a dominance computation per exit and
    // keeping the intersection, since `BlockId` has no room for a synthetic
    // id outside the function's own arena.
    if exits.len() == 1 {
        let root = exits[0];
        return compute(
            root,
            &all,
            |b| func.predecessors(b).to_vec(),
            |b| func.successors(b).to_vec(),
        );
    }

    let mut infos: Vec<DominanceInfo> = exits
        .iter()
        .map(|&root| {
            compute(root, &all, |b| func.predecessors(b).to_vec(), |b| func.successors(b).to_vec())
        })
        .collect();
    // With multiple exits there is no single well-defined post-dominator
    // tree root; keep the first exit's tree but intersect frontiers/idom so
    // `dominates` only reports facts true under every possible exit choice.
    let mut merged = infos.remove(0);
    for other in infos {
        merged.idom.retain(|b, p| other.idom.get(b) == Some(p));
        for (b, set) in merged.frontier.iter_mut() {
            if let Some(other_set) = other.frontier.get(b) {
                set.retain(|x| other_set.contains(x));
            } else {
                set.clear();
            }
        }
    }
    merged.children.clear();
    for (&b, &parent) in &merged.idom {
        merged.children.entry(parent).or_default().push(b);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::instruction::{CompareMode, CompareOp};
    use crate::ir::value::ValueId;

    /// entry -> {then, els} -> join -> ret, the classic diamond from
    /// original_source's dominance tests.
    fn diamond() -> Function {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let i1_ty = ctx.integral_type(1);
        let mut f = Function::new("diamond", i32_ty, &[i32_ty]);
        let entry = f.append_block("entry");
        let then_blk = f.append_block("then");
        let els = f.append_block("else");
        let join = f.append_block("join");

        let (p0, _) = f.params().nth(0).unwrap();
        let mut b = Builder::new(&mut f, entry);
        let zero = ctx.int_constant(i32_ty, 0);
        let cmp = b.compare(
            "c",
            i1_ty,
            CompareMode::Signed,
            CompareOp::Greater,
            ValueId::Param(p0),
            ValueId::Const(zero),
        );
        b.branch(ValueId::Inst(cmp), then_blk, els);
        b.position_at_end(then_blk);
        b.goto(join);
        b.position_at_end(els);
        b.goto(join);
        b.position_at_end(join);
        b.ret(Some(ValueId::Param(p0)));
        f
    }

    #[test]
    fn diamond_dominance() {
        let f = diamond();
        let info = compute_dominance(&f);
        let blocks: Vec<BlockId> = f.blocks().collect();
        let (entry, then_blk, els, join) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        assert!(info.dominates(entry, then_blk));
        assert!(info.dominates(entry, els));
        assert!(info.dominates(entry, join));
        assert!(!info.dominates(then_blk, join));
        assert!(!info.dominates(els, join));
        assert_eq!(info.idom(join), Some(entry));
    }

    #[test]
    fn diamond_dominance_frontier_is_join() {
        let f = diamond();
        let info = compute_dominance(&f);
        let blocks: Vec<BlockId> = f.blocks().collect();
        let (_entry, then_blk, els, join) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        assert_eq!(info.frontier(then_blk).collect::<Vec<_>>(), vec![join]);
        assert_eq!(info.frontier(els).collect::<Vec<_>>(), vec![join]);
    }

    #[test]
    fn diamond_post_dominance() {
        let f = diamond();
        let info = compute_post_dominance(&f);
        let blocks: Vec<BlockId> = f.blocks().collect();
        let (entry, then_blk, join) = (blocks[0], blocks[1], blocks[3]);

        assert!(info.dominates(join, entry));
        assert!(info.dominates(join, then_blk));
    }
}
