//! Module-level values: global variables and callables (§3, §4.2).

use crate::context::{ConstId, TypeId};
use crate::ir::function::Function;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Only referenced from within this module; eligible for internal
    /// passes to reason about every use site.
    Internal,
    /// May be referenced from outside the module; passes must assume
    /// unknown external uses exist.
    External,
}

#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: TypeId,
    pub visibility: Visibility,
    pub initializer: Option<ConstId>,
}

/// A function declared but not defined in this module — an extern/import.
#[derive(Debug, Clone)]
pub struct ForeignFunction {
    pub name: String,
    pub sig: TypeId,
}

/// The module-level callable namespace: either a function with a body or a
/// foreign declaration, unified so call sites don't need to know which
/// (§3 "Callable").
#[derive(Debug)]
pub enum Callable {
    Defined(Function),
    Foreign(ForeignFunction),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Defined(f) => &f.name,
            Callable::Foreign(f) => &f.name,
        }
    }

    pub fn sig(&self) -> TypeId {
        match self {
            Callable::Defined(f) => f.sig,
            Callable::Foreign(f) => f.sig,
        }
    }

    pub fn as_defined(&self) -> Option<&Function> {
        match self {
            Callable::Defined(f) => Some(f),
            Callable::Foreign(_) => None,
        }
    }

    pub fn as_defined_mut(&mut self) -> Option<&mut Function> {
        match self {
            Callable::Defined(f) => Some(f),
            Callable::Foreign(_) => None,
        }
    }
}
