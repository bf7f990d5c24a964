//! `Module`: the top-level container of globals and functions (§4.2).

use crate::context::NameFactory;
use crate::ir::global::{Callable, ForeignFunction, GlobalVariable, Visibility};
use crate::ir::function::Function;
use crate::context::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub(crate) u32);
impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub(crate) u32);
impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    globals: Vec<Option<GlobalVariable>>,
    callables: Vec<Option<Callable>>,
    names: NameFactory,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), globals: Vec::new(), callables: Vec::new(), names: NameFactory::new() }
    }

    // -- globals ----------------------------------------------------------

    pub fn add_global(
        &mut self,
        hint: &str,
        ty: TypeId,
        visibility: Visibility,
        initializer: Option<crate::context::ConstId>,
    ) -> GlobalId {
        let name = self.names.fresh(hint);
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Some(GlobalVariable { name, ty, visibility, initializer }));
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        self.globals[id.index()].as_ref().expect("dangling GlobalId")
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalVariable {
        self.globals[id.index()].as_mut().expect("dangling GlobalId")
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVariable)> {
        self.globals
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GlobalId(i as u32), g)))
    }

    pub fn remove_global(&mut self, id: GlobalId) {
        let g = self.globals[id.index()].take().expect("dangling GlobalId");
        self.names.release(&g.name);
    }

    // -- callables ----------------------------------------------------------

    pub fn add_function(&mut self, name: &str, sig: TypeId, param_types: &[TypeId]) -> FunctionId {
        let fresh = self.names.fresh(name);
        let id = FunctionId(self.callables.len() as u32);
        self.callables.push(Some(Callable::Defined(Function::new(fresh, sig, param_types))));
        id
    }

    pub fn add_foreign_function(&mut self, name: &str, sig: TypeId) -> FunctionId {
        let fresh = self.names.fresh(name);
        let id = FunctionId(self.callables.len() as u32);
        self.callables.push(Some(Callable::Foreign(ForeignFunction { name: fresh, sig })));
        id
    }

    pub fn function(&self, id: FunctionId) -> &Callable {
        self.callables[id.index()].as_ref().expect("dangling FunctionId")
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Callable {
        self.callables[id.index()].as_mut().expect("dangling FunctionId")
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Callable)> {
        self.callables
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (FunctionId(i as u32), c)))
    }

    pub fn defined_functions_mut(&mut self) -> impl Iterator<Item = (FunctionId, &mut Function)> {
        self.callables.iter_mut().enumerate().filter_map(|(i, c)| {
            c.as_mut().and_then(Callable::as_defined_mut).map(|f| (FunctionId(i as u32), f))
        })
    }

    pub fn remove_function(&mut self, id: FunctionId) {
        let c = self.callables[id.index()].take().expect("dangling FunctionId");
        self.names.release(c.name());
    }

    pub fn find_function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions().find(|(_, c)| c.name() == name).map(|(id, _)| id)
    }
}
