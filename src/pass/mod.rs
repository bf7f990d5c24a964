//! The pass framework (§4.4): `LoopPass`/`FunctionPass`/`ModulePass`, the
//! built-in passes, a registry to look them up by name, and a pipeline-text
//! parser/executor driving them from a single configuration string.

pub mod args;
pub mod builtins;
pub mod pass;
pub mod pipeline;
pub mod registry;

pub use args::{ArgValue, ArgumentMatchResult, PassArgumentMap};
pub use pass::{FunctionPass, FunctionRunner, LoopPass, ModulePass, PassCategory};
pub use pipeline::{parse_pipeline, Pipeline, PipelineModuleNode};
pub use registry::PassRegistry;
