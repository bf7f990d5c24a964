//! CFG analyses (§4.3): dominance, post-dominance, loop nesting. Each is
//! computed lazily and cached on the owning [`Function`] until the next
//! mutation invalidates it (`Function::invalidate_analyses`).

pub mod dominance;
pub mod loops;

use tracing::debug;

use crate::ir::function::Function;
use dominance::DominanceInfo;
use loops::LoopNestingForest;

/// Forward dominance over `func`, computing and caching it on first use.
pub fn dominance_info<'f>(func: &'f mut Function) -> &'f DominanceInfo {
    if func.cached_dominance().is_none() {
        debug!(function = %func.name, "computing dominance");
        let info = dominance::compute_dominance(func);
        func.set_cached_dominance(info);
    }
    func.cached_dominance().unwrap()
}

pub fn post_dominance_info<'f>(func: &'f mut Function) -> &'f DominanceInfo {
    if func.cached_post_dominance().is_none() {
        debug!(function = %func.name, "computing post-dominance");
        let info = dominance::compute_post_dominance(func);
        func.set_cached_post_dominance(info);
    }
    func.cached_post_dominance().unwrap()
}

pub fn loop_nesting_forest<'f>(func: &'f mut Function) -> &'f LoopNestingForest {
    if func.cached_loop_forest().is_none() {
        debug!(function = %func.name, "computing loop nesting forest");
        let dom = dominance::compute_dominance(func);
        let forest = loops::build_loop_nesting_forest(func, &dom);
        func.set_cached_dominance(dom);
        func.set_cached_loop_forest(forest);
    }
    func.cached_loop_forest().unwrap()
}
