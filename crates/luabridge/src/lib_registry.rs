// Library registration for native functions exposed to scripts
// A module named "_G" registers its functions as globals; any other module
// becomes a global table of functions.

use crate::closure;
use crate::lua_state::{CFunction, LuaError, LuaResult, LuaState, LuaType};

/// A named set of native functions.
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, CFunction)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

}

/// Builder for library modules
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push(($item_name, $item as $crate::lua_state::CFunction));
        )*
        module
    }};
}

pub struct LibraryRegistry {
    modules: Vec<LibraryModule>, // Vec keeps load order
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    pub fn load_all(&self, state: LuaState) -> LuaResult<()> {
        for module in &self.modules {
            load_module(state, module)?;
        }
        Ok(())
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Install `module` into the globals of `state`.
pub fn load_module(state: LuaState, module: &LibraryModule) -> LuaResult<()> {
    if !state.check_stack(4) {
        return Err(LuaError::Memory("stack overflow".to_string()));
    }

    if module.name == "_G" {
        for (name, func) in &module.entries {
            state.register(name, *func);
        }
        return Ok(());
    }

    state.create_table(0, module.entries.len() as i32);
    for (name, func) in &module.entries {
        state.push_c_function(*func);
        state.set_field(-2, name);
    }

    // Make the table reachable through require() as well
    if state.get_global("package") == LuaType::Table {
        if state.raw_get_field(-1, "loaded") == LuaType::Table {
            state.push_value(-3);
            state.raw_set_field(-2, module.name);
        }
        state.pop(1);
    }
    state.pop(1);

    state.set_global(module.name);
    Ok(())
}

/// Libraries every bridge instance gets from `open_bridge_libs`.
pub fn create_bridge_registry() -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    registry.register(closure::create_closure_lib());
    registry
}
