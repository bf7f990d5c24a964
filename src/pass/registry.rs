//! `PassRegistry`: an explicit name→pass map the host builds and owns,
//! resolving the "global mutable state" design note (DESIGN.md) against
//! `original_source`'s own `PassManager`, which is a set of static
//! registries populated by static-initializer registration macros —
//! deliberately not ported, since a process-wide singleton has no place in
//! a library a host embeds more than once in the same process.

use hashbrown::HashMap;

use crate::pass::builtins::{foreach_pass, lcssa_pass, mem2reg_pass, print_pass, validate_pass};
use crate::pass::pass::{FunctionPass, LoopPass, ModulePass};

#[derive(Default)]
pub struct PassRegistry {
    module_passes: HashMap<String, ModulePass>,
    function_passes: HashMap<String, FunctionPass>,
    /// Unlike module/function passes, no pipeline-grammar production ever
    /// names a loop pass (§4.4's BNF has no slot for one) — a `FunctionPass`
    /// body that wants to run one holds its own reference directly, so
    /// there's nothing to resolve here by string. Kept for a host building
    /// a pipeline programmatically rather than by parsing pipeline text.
    loop_passes: HashMap<String, LoopPass>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The passes this crate ships: `foreach`/`print`/`validate` at module
    /// scope, `mem2reg` at function scope, `lcssa` at loop scope.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register_module_pass(foreach_pass());
        reg.register_module_pass(print_pass());
        reg.register_module_pass(validate_pass());
        reg.register_function_pass(mem2reg_pass());
        reg.register_loop_pass(lcssa_pass());
        reg
    }

    pub fn register_module_pass(&mut self, pass: ModulePass) {
        self.module_passes.insert(pass.name().to_string(), pass);
    }

    pub fn register_function_pass(&mut self, pass: FunctionPass) {
        self.function_passes.insert(pass.name().to_string(), pass);
    }

    pub fn register_loop_pass(&mut self, pass: LoopPass) {
        self.loop_passes.insert(pass.name().to_string(), pass);
    }

    pub fn module_pass(&self, name: &str) -> Option<&ModulePass> {
        self.module_passes.get(name)
    }

    pub fn function_pass(&self, name: &str) -> Option<&FunctionPass> {
        self.function_passes.get(name)
    }

    pub fn loop_pass(&self, name: &str) -> Option<&LoopPass> {
        self.loop_passes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_registers_the_builtin_passes() {
        let reg = PassRegistry::with_defaults();
        assert!(reg.module_pass("foreach").is_some());
        assert!(reg.module_pass("validate").is_some());
        assert!(reg.function_pass("mem2reg").is_some());
        assert!(reg.loop_pass("lcssa").is_some());
        assert!(reg.function_pass("nonexistent").is_none());
    }
}
