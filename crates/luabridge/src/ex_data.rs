//! Process-wide handle registry.
//!
//! The interpreter's state pointer has no spare field for native data, so
//! every native callback recovers its context from this table using the
//! identity of the interpreter it was called on. Entries are keyed by the
//! ROOT state: callbacks running on a coroutine resolve to the same entry
//! as callbacks on the main thread.
//!
//! Entries are not cleaned up automatically. [`LuaInstance`](crate::LuaInstance)
//! pairs `set` at creation with `delete` at close; code driving a raw state
//! must do the same or the entry lives for the rest of the process.

use std::any::Any;
use std::sync::{Arc, LazyLock};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::lua_state::LuaState;

/// Opaque native context stored per interpreter.
pub type ExData = Arc<dyn Any + Send + Sync>;

/// Identity of an interpreter instance: the address of its main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey(usize);

impl StateKey {
    /// Key of the interpreter `state` belongs to (any of its threads).
    pub fn of(state: LuaState) -> Self {
        StateKey(state.main_thread().as_ptr() as usize)
    }

    /// Key of a state known to be a main thread. Does not touch the
    /// interpreter, so it stays usable after the state is closed.
    pub fn of_main(state: LuaState) -> Self {
        StateKey(state.as_ptr() as usize)
    }
}

static EX_DATA: LazyLock<Mutex<AHashMap<StateKey, ExData>>> =
    LazyLock::new(|| Mutex::new(AHashMap::new()));

/// Associate `data` with an interpreter, replacing any previous entry.
pub fn set(key: StateKey, data: ExData) {
    EX_DATA.lock().insert(key, data);
}

/// Entry for `key`; `None` means "not found".
pub fn get(key: StateKey) -> Option<ExData> {
    EX_DATA.lock().get(&key).cloned()
}

/// Entry for `key`, downcast to its concrete type.
pub fn get_as<T: Any + Send + Sync>(key: StateKey) -> Option<Arc<T>> {
    get(key)?.downcast::<T>().ok()
}

pub fn contains(key: StateKey) -> bool {
    EX_DATA.lock().contains_key(&key)
}

/// Remove the entry; returns whether one existed.
pub fn delete(key: StateKey) -> bool {
    EX_DATA.lock().remove(&key).is_some()
}

impl LuaState {
    pub fn set_ex_data(&self, data: ExData) {
        set(StateKey::of(*self), data);
    }

    pub fn get_ex_data(&self) -> Option<ExData> {
        get(StateKey::of(*self))
    }

    pub fn delete_ex_data(&self) -> bool {
        delete(StateKey::of(*self))
    }
}
