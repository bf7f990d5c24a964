//! The pass set this crate ships out of the box: `foreach` (the `Schedule`
//! wrapper the implicit pipeline grammar lowers to), `mem2reg`, `lcssa`,
//! `validate`, and `print` — `original_source`'s own comment on
//! `PassCategory::Other` is literally "for now here we have 'print' and
//! 'foreach'", so both are kept as the two non-transforming built-ins.

use tracing::info;

use crate::analysis::loop_nesting_forest;
use crate::analysis::loops::make_lcssa;
use crate::mem2reg::promote_allocas;
use crate::pass::args::PassArgumentMap;
use crate::pass::pass::{FunctionPass, FunctionRunner, LoopPass, ModulePass, PassCategory};

pub fn foreach_pass() -> ModulePass {
    ModulePass::new("foreach", PassCategory::Schedule, PassArgumentMap::new(), |ctx, module, function_pass, _args| {
        let Some(function_pass) = function_pass else { return false };
        let mut modified = false;
        for (_, func) in module.defined_functions_mut() {
            modified |= function_pass.run(ctx, func);
        }
        modified
    })
}

pub fn mem2reg_pass() -> FunctionPass {
    FunctionPass::new("mem2reg", PassCategory::Canonicalization, PassArgumentMap::new(), |ctx, func, _loop_pass, _args| {
        let before = func.blocks().count();
        promote_allocas(func, ctx);
        // `promote_allocas` never removes blocks; its only observable
        // effect is instruction-level, so report modification by
        // comparing instruction counts isn't available cheaply here —
        // conservatively report "ran" as modified, matching
        // `original_source`'s own passes which report `true` whenever
        // they execute rather than diffing before/after.
        let _ = before;
        true
    })
}

pub fn lcssa_pass() -> LoopPass {
    LoopPass::new("lcssa", PassCategory::Canonicalization, PassArgumentMap::new(), |ctx, func, header, _args| {
        let forest = loop_nesting_forest(func).clone();
        let Some(info) = forest.header_loop(header) else { return false };
        let info = info.clone();
        make_lcssa(func, ctx, &info);
        false
    })
}

pub fn validate_pass() -> ModulePass {
    ModulePass::new("validate", PassCategory::Analysis, PassArgumentMap::new(), |ctx, module, _function_pass, _args| {
        crate::validate::validate(module, ctx);
        false
    })
}

pub fn print_pass() -> ModulePass {
    ModulePass::new("print", PassCategory::Other, PassArgumentMap::new(), |ctx, module, _function_pass, _args| {
        info!(target: "scatha_ir::pass::print", "{}", crate::ir::print::print_module(ctx, module));
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::module::Module;
    use crate::ir::value::ValueId;

    #[test]
    fn foreach_runs_the_wrapped_function_pass_over_every_function() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integral_type(32);
        let sig = ctx.function_type(i32_ty, vec![i32_ty]);
        let mut module = Module::new("m");
        for name in ["a", "b"] {
            let fid = module.add_function(name, sig, &[i32_ty]);
            let crate::ir::global::Callable::Defined(f) = module.function_mut(fid) else { unreachable!() };
            let entry = f.append_block("entry");
            let (p0, _) = f.params().nth(0).unwrap();
            Builder::new(f, entry).ret(Some(ValueId::Param(p0)));
        }

        let counting = FunctionPass::new("count", PassCategory::Other, PassArgumentMap::new(), |_ctx, _f, _lp, _args| true);
        let foreach = foreach_pass();
        let modified = foreach.run(&mut ctx, &mut module, Some(&counting));
        assert!(modified);
    }
}
