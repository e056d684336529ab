use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::ex_data::{self, StateKey};
use crate::host_arena::HostArena;
use crate::lua_state::LuaState;

/// Native context of one interpreter instance, stored in the handle
/// registry and recovered by every native callback.
#[derive(Default)]
pub struct HostContext {
    /// Owner of every native value scripts can reach.
    pub arena: Mutex<HostArena>,
    /// Field descriptor tables keyed by metatable name, built once when the
    /// host type is registered.
    field_tables: Mutex<AHashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context of the interpreter `state` belongs to.
    pub fn of(state: LuaState) -> Option<Arc<HostContext>> {
        ex_data::get_as::<HostContext>(StateKey::of(state))
    }

    pub fn set_field_table<F: Any + Send + Sync>(&self, metatable: &'static str, table: F) {
        self.field_tables.lock().insert(metatable, Arc::new(table));
    }

    pub fn field_table<F: Any + Send + Sync>(&self, metatable: &str) -> Option<Arc<F>> {
        let table = self.field_tables.lock().get(metatable).cloned()?;
        table.downcast::<F>().ok()
    }
}
