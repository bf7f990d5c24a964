// Allow dead code and unused variables in scaffold code.
// These will be fixed as features are implemented.
#![allow(dead_code, unused_variables, unused_imports, unreachable_patterns)]

pub mod analysis;
pub mod context;
pub mod error;
pub mod ir;
pub mod mem2reg;
pub mod pass;
pub mod types;
pub mod validate;
