//! The `ValueId` tag unifying every kind of thing an instruction can take as
//! an operand (§3 "Values", §9 "Polymorphic IR hierarchy").

use crate::context::ConstId;
use crate::ir::function::{BlockId, InstId, ParamId};
use crate::ir::module::GlobalId;

/// A reference to any IR value usable as an operand. `Param`/`Block`/`Inst`
/// ids are only meaningful relative to the `Function` that owns them;
/// `Const` ids are relative to the owning `Context`; `Global` ids are
/// relative to the owning `Module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueId {
    Param(ParamId),
    Block(BlockId),
    Const(ConstId),
    Global(GlobalId),
    Inst(InstId),
}

impl ValueId {
    pub fn as_block(self) -> Option<BlockId> {
        match self {
            ValueId::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_inst(self) -> Option<InstId> {
        match self {
            ValueId::Inst(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_const(self) -> Option<ConstId> {
        match self {
            ValueId::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_global(self) -> Option<GlobalId> {
        match self {
            ValueId::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_param(self) -> Option<ParamId> {
        match self {
            ValueId::Param(p) => Some(p),
            _ => None,
        }
    }

    /// §3 invariant 1 exempts constants and parameters from the dominance
    /// requirement (they're available everywhere in the function, or — for
    /// constants — everywhere in the program).
    pub fn is_exempt_from_dominance(self) -> bool {
        matches!(self, ValueId::Const(_) | ValueId::Param(_) | ValueId::Global(_))
    }
}
