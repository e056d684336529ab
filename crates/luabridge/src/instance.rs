//! Interpreter instance lifecycle.
//!
//! [`LuaInstance`] pairs the interpreter state with its [`HostContext`]:
//! creating an instance registers the context in the handle registry,
//! closing it (explicitly or on drop) removes the entry and then destroys
//! the state. Every value and handle derived from the instance is invalid
//! afterwards.

use std::ffi::c_int;
use std::sync::Arc;

use crate::context::HostContext;
use crate::ex_data::{self, StateKey};
use crate::host_arena::HostHandle;
use crate::lib_registry::{self, LibraryModule};
use crate::lua_state::{BridgeOption, LuaError, LuaResult, LuaState, LuaType};
use crate::marshal::{self, Value};
use crate::metatable::{self, HostType};
use crate::point::Point;

pub struct LuaInstance {
    state: Option<LuaState>,
    key: StateKey,
    context: Arc<HostContext>,
    option: BridgeOption,
}

impl LuaInstance {
    pub fn new() -> LuaResult<Self> {
        Self::with_option(BridgeOption::default())
    }

    pub fn with_option(option: BridgeOption) -> LuaResult<Self> {
        let state = LuaState::new_state()
            .ok_or_else(|| LuaError::Memory("cannot create interpreter state".to_string()))?;
        if option.open_libs {
            state.open_libs();
        }

        let key = StateKey::of_main(state);
        let context = Arc::new(HostContext::new());
        ex_data::set(key, context.clone());

        Ok(Self {
            state: Some(state),
            key,
            context,
            option,
        })
    }

    /// The main thread, or `Closed` once the instance is closed.
    pub fn state(&self) -> LuaResult<LuaState> {
        self.state.ok_or(LuaError::Closed)
    }

    pub fn key(&self) -> StateKey {
        self.key
    }

    pub fn option(&self) -> &BridgeOption {
        &self.option
    }

    pub fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }

    /// Install `Point` and the closure constructors.
    pub fn open_bridge_libs(&self) -> LuaResult<()> {
        let state = self.state()?;
        lib_registry::create_bridge_registry().load_all(state)?;
        self.register::<Point>()
    }

    pub fn register<T: HostType>(&self) -> LuaResult<()> {
        metatable::register_host_type::<T>(self.state()?)
    }

    pub fn register_library(&self, module: &LibraryModule) -> LuaResult<()> {
        lib_registry::load_module(self.state()?, module)
    }

    // ===== Execution =====

    pub fn exec(&self, source: &str) -> LuaResult<Vec<Value>> {
        self.exec_named(source, &self.option.chunk_name)
    }

    pub fn exec_named(&self, source: &str, chunk_name: &str) -> LuaResult<Vec<Value>> {
        let state = self.reserve(0)?;
        marshal::exec(state, source, chunk_name, &self.option)
    }

    pub fn exec_file(&self, filename: &str) -> LuaResult<Vec<Value>> {
        let state = self.reserve(0)?;
        marshal::exec_file(state, filename, &self.option)
    }

    /// Call the global function `name` with `args`.
    pub fn call_global(&self, name: &str, args: &[Value]) -> LuaResult<Vec<Value>> {
        let state = self.reserve(args.len() as c_int + 1)?;
        let base = state.get_top();
        if state.get_global(name) != LuaType::Function {
            let found = state.type_name(-1);
            state.set_top(base);
            return Err(LuaError::Runtime(format!(
                "global '{}' is not a function (a {} value)",
                name, found
            )));
        }
        for arg in args {
            if let Err(e) = marshal::push_value(state, arg) {
                state.set_top(base);
                return Err(e);
            }
        }
        marshal::call_function(state, args.len() as c_int, &self.option)
    }

    pub fn get_global(&self, name: &str) -> LuaResult<Value> {
        let state = self.reserve(1)?;
        state.get_global(name);
        let value = marshal::read_value(state, -1);
        state.pop(1);
        Ok(value)
    }

    pub fn set_global(&self, name: &str, value: &Value) -> LuaResult<()> {
        let state = self.reserve(1)?;
        marshal::push_value(state, value)?;
        state.set_global(name);
        Ok(())
    }

    fn reserve(&self, extra: c_int) -> LuaResult<LuaState> {
        let state = self.state()?;
        if !state.check_stack(extra + self.option.stack_reserve) {
            return Err(LuaError::Memory("stack overflow".to_string()));
        }
        Ok(state)
    }

    // ===== Host values =====

    /// Move `value` into the arena. `T` must be registered before the
    /// handle is passed to a script.
    pub fn insert_host<T: HostType>(&self, value: T) -> HostHandle {
        self.context.arena.lock().insert(value, T::METATABLE)
    }

    pub fn set_global_host<T: HostType>(&self, name: &str, value: T) -> LuaResult<HostHandle> {
        let state = self.reserve(1)?;
        let handle = metatable::push_host(state, value)?;
        state.set_global(name);
        Ok(handle)
    }

    /// Copy of the value behind `handle`; `None` if released or not a `T`.
    pub fn host<T: HostType + Clone>(&self, handle: HostHandle) -> Option<T> {
        self.context.arena.lock().get_cloned(handle).ok()
    }

    pub fn with_host_mut<T: HostType, R>(
        &self,
        handle: HostHandle,
        f: impl FnOnce(&mut T) -> R,
    ) -> LuaResult<R> {
        self.context
            .arena
            .lock()
            .with_mut(handle, f)
            .map_err(|e| LuaError::Runtime(e.to_string()))
    }

    /// Free the arena slot behind `handle`. Script references to it turn
    /// stale and raise an error when used.
    pub fn release(&self, handle: HostHandle) -> bool {
        self.context.arena.lock().release(handle)
    }

    // ===== Threads =====

    /// A secondary stack sharing this instance's globals.
    pub fn new_thread(&self) -> LuaResult<LuaThread<'_>> {
        let state = self.reserve(1)?;
        let thread = state.new_thread();
        let anchor = state.new_ref();
        Ok(LuaThread {
            instance: self,
            state: thread,
            anchor,
        })
    }

    /// Remove the handle registry entry and destroy the state. Idempotent.
    pub fn close(&mut self) {
        if let Some(state) = self.state.take() {
            ex_data::delete(self.key);
            // SAFETY: the state was created by this instance and every
            // borrow handed out (threads) has ended, since we hold `&mut self`.
            unsafe { state.close() };
        }
    }
}

impl Drop for LuaInstance {
    fn drop(&mut self) {
        self.close();
    }
}

/// A coroutine-style stack of a [`LuaInstance`], kept alive by a registry
/// reference until dropped.
pub struct LuaThread<'a> {
    instance: &'a LuaInstance,
    state: LuaState,
    anchor: c_int,
}

impl LuaThread<'_> {
    pub fn state(&self) -> LuaState {
        self.state
    }

    pub fn exec(&self, source: &str) -> LuaResult<Vec<Value>> {
        let option = self.instance.option();
        if !self.state.check_stack(option.stack_reserve) {
            return Err(LuaError::Memory("stack overflow".to_string()));
        }
        marshal::exec(self.state, source, &option.chunk_name, option)
    }
}

impl Drop for LuaThread<'_> {
    fn drop(&mut self) {
        if let Ok(main) = self.instance.state() {
            main.free_ref(self.anchor);
        }
    }
}
