//! The three pass kinds (§4.4), each a name + category + declared arguments
//! plus the transformation itself as a shared closure — this crate's
//! analogue of `original_source/scatha/include/scatha/IR/Pass.h`'s
//! `PassMixin<Derived, bool(Args...)>` (a `std::function` body wrapped by a
//! `PassBase` carrying name/category/arguments). The closure is kept behind
//! `Rc` rather than `Box`: a `PassRegistry` holds one prototype per name and
//! [`Pipeline`](crate::pass::pipeline::Pipeline) parsing clones a fresh,
//! unbound-argument instance per occurrence in the pipeline text (exactly
//! what `PassManager::getModulePass` hands back in `original_source`'s
//! `PipelineParser.cc`) — cheap to share since §5 commits this crate to a
//! single-threaded cooperative model, so `Rc` (not `Arc`) is the right tool.

use std::rc::Rc;

use crate::analysis::loop_nesting_forest;
use crate::analysis::loops::LoopNestingForest;
use crate::context::Context;
use crate::ir::function::{BlockId, Function};
use crate::ir::module::Module;
use crate::pass::args::{ArgumentMatchResult, PassArgumentMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCategory {
    Analysis,
    Canonicalization,
    Simplification,
    Optimization,
    Experimental,
    /// Wrapper passes that exist only to schedule other passes (`foreach`).
    Schedule,
    /// Catch-all for passes outside the optimization pipeline proper
    /// (`print`) — named directly after `original_source`'s own comment on
    /// `PassCategory::Other`.
    Other,
}

#[derive(Clone)]
struct PassBase {
    name: String,
    category: PassCategory,
    args: PassArgumentMap,
}

impl PassBase {
    fn match_argument(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        self.args.match_argument(key, value)
    }
}

fn postorder_loop_headers(forest: &LoopNestingForest) -> Vec<BlockId> {
    fn visit(h: BlockId, forest: &LoopNestingForest, out: &mut Vec<BlockId>) {
        if let Some(info) = forest.header_loop(h) {
            for &child in &info.children {
                visit(child, forest, out);
            }
        }
        out.push(h);
    }
    let mut out = Vec::new();
    for &root in forest.roots() {
        visit(root, forest, &mut out);
    }
    out
}

/// Something a `ModulePass` can run once per defined function: either a
/// single `FunctionPass` or a sequence of them chained in order. The
/// pipeline grammar's `module(fn, fn, ...)` form needs the latter without
/// forcing pipeline nodes to fabricate a `'static` closure over borrowed
/// children — see `pipeline.rs`.
pub trait FunctionRunner {
    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool;
}

impl FunctionRunner for FunctionPass {
    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        FunctionPass::run(self, ctx, func, None)
    }
}

impl FunctionRunner for [FunctionPass] {
    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        self.iter().fold(false, |modified, pass| modified | FunctionPass::run(pass, ctx, func, None))
    }
}

/// Runs over every node of a function's loop nesting forest, innermost
/// first (§4.4: "runs per loop-nesting-forest node in post-order").
#[derive(Clone)]
pub struct LoopPass {
    base: PassBase,
    body: Rc<dyn Fn(&mut Context, &mut Function, BlockId, &PassArgumentMap) -> bool>,
}

impl std::fmt::Debug for LoopPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopPass").field("name", &self.base.name).field("category", &self.base.category).finish()
    }
}

impl LoopPass {
    pub fn new(
        name: impl Into<String>,
        category: PassCategory,
        args: PassArgumentMap,
        body: impl Fn(&mut Context, &mut Function, BlockId, &PassArgumentMap) -> bool + 'static,
    ) -> Self {
        Self { base: PassBase { name: name.into(), category, args }, body: Rc::new(body) }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn category(&self) -> PassCategory {
        self.base.category
    }

    pub fn match_argument(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        self.base.match_argument(key, value)
    }

    /// A fresh copy of this pass with its declared argument kinds but none
    /// of the bindings, sharing the same body — what a pipeline parse
    /// clones out of the registry per occurrence in pipeline text.
    pub fn instantiate(&self) -> Self {
        Self { base: PassBase { args: self.base.args.cleared(), ..self.base.clone() }, body: Rc::clone(&self.body) }
    }

    /// The loop nesting forest is snapshotted once before the walk starts;
    /// a pass erasing instructions invalidates `func`'s cache but the
    /// already-computed header order is unaffected, matching a single pass
    /// over a computed-once forest rather than a re-derived one per step.
    pub fn run_on_function(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let forest = loop_nesting_forest(func).clone();
        let mut modified = false;
        for header in postorder_loop_headers(&forest) {
            modified |= (self.body)(ctx, func, header, &self.base.args);
        }
        modified
    }
}

/// Runs once per function; may schedule a companion `LoopPass` internally.
#[derive(Clone)]
pub struct FunctionPass {
    base: PassBase,
    body: Rc<dyn Fn(&mut Context, &mut Function, Option<&LoopPass>, &PassArgumentMap) -> bool>,
}

impl std::fmt::Debug for FunctionPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionPass").field("name", &self.base.name).field("category", &self.base.category).finish()
    }
}

impl FunctionPass {
    pub fn new(
        name: impl Into<String>,
        category: PassCategory,
        args: PassArgumentMap,
        body: impl Fn(&mut Context, &mut Function, Option<&LoopPass>, &PassArgumentMap) -> bool + 'static,
    ) -> Self {
        Self { base: PassBase { name: name.into(), category, args }, body: Rc::new(body) }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn category(&self) -> PassCategory {
        self.base.category
    }

    pub fn match_argument(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        self.base.match_argument(key, value)
    }

    pub fn instantiate(&self) -> Self {
        Self { base: PassBase { args: self.base.args.cleared(), ..self.base.clone() }, body: Rc::clone(&self.body) }
    }

    pub fn run(&self, ctx: &mut Context, func: &mut Function, loop_pass: Option<&LoopPass>) -> bool {
        (self.body)(ctx, func, loop_pass, &self.base.args)
    }
}

/// Runs once per module; may schedule a companion function-pass run over
/// every defined function (`foreach` is exactly this with an identity
/// body).
#[derive(Clone)]
pub struct ModulePass {
    base: PassBase,
    body: Rc<dyn Fn(&mut Context, &mut Module, Option<&dyn FunctionRunner>, &PassArgumentMap) -> bool>,
}

impl std::fmt::Debug for ModulePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModulePass").field("name", &self.base.name).field("category", &self.base.category).finish()
    }
}

impl ModulePass {
    pub fn new(
        name: impl Into<String>,
        category: PassCategory,
        args: PassArgumentMap,
        body: impl Fn(&mut Context, &mut Module, Option<&dyn FunctionRunner>, &PassArgumentMap) -> bool + 'static,
    ) -> Self {
        Self { base: PassBase { name: name.into(), category, args }, body: Rc::new(body) }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn category(&self) -> PassCategory {
        self.base.category
    }

    pub fn match_argument(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        self.base.match_argument(key, value)
    }

    pub fn instantiate(&self) -> Self {
        Self { base: PassBase { args: self.base.args.cleared(), ..self.base.clone() }, body: Rc::clone(&self.body) }
    }

    pub fn run(&self, ctx: &mut Context, module: &mut Module, function_pass: Option<&dyn FunctionRunner>) -> bool {
        (self.body)(ctx, module, function_pass, &self.base.args)
    }
}
