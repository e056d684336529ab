//! Metatable binding protocol.
//!
//! A host type is exposed to scripts as a small userdata box holding its
//! arena handle, carrying the type's named registry metatable. The
//! metatable routes field access, assignment, stringification and any
//! extra metamethods back into native handlers.
//!
//! Field access does not reflect over the native struct. Each type
//! describes its scriptable fields once, in a [`FieldTable`] of typed
//! getter/setter pairs built when the type is registered; `__index` and
//! `__newindex` only look names up in that table.
//!
//! `__index` resolves a name in this order:
//! 1. a field of the descriptor table, whose current value is pushed;
//! 2. an entry of the type's global method table (e.g. `Point.move`), so
//!    `obj:method(...)` works;
//! 3. nothing, which the script sees as `nil`.
//!
//! `__newindex` writes through the field's setter. Unknown fields,
//! read-only fields and values of the wrong kind raise a script error and
//! leave the native value untouched.

use std::any::Any;
use std::ffi::c_int;
use std::mem;
use std::sync::Arc;

use ahash::AHashMap;
use mlua::ffi;

use crate::context::HostContext;
use crate::host_arena::{HandleError, HostHandle};
use crate::lib_registry::{self, LibraryModule};
use crate::lua_state::{CFunction, LuaError, LuaResult, LuaState, LuaType};
use crate::marshal::{self, HandlerResult};

/// Metatable key marking boxes created by this module.
const HOST_MARKER: &str = "__host";

/// A scalar value a host field can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Integer(_) | Scalar::Number(_) => "number",
            Scalar::Boolean(_) => "boolean",
            Scalar::Str(_) => "string",
        }
    }

    /// Read the value at `idx`; `None` for non-scalar values.
    pub fn read(state: LuaState, idx: c_int) -> Option<Scalar> {
        match state.type_of(idx) {
            LuaType::Number if state.is_integer(idx) => Some(Scalar::Integer(state.to_integer(idx))),
            LuaType::Number => Some(Scalar::Number(state.to_number(idx))),
            LuaType::Boolean => Some(Scalar::Boolean(state.to_boolean(idx))),
            LuaType::String => state.to_string(idx).map(Scalar::Str),
            _ => None,
        }
    }

    pub fn push(&self, state: LuaState) {
        match self {
            Scalar::Integer(n) => state.push_integer(*n),
            Scalar::Number(n) => state.push_number(*n),
            Scalar::Boolean(b) => state.push_boolean(*b),
            Scalar::Str(s) => state.push_string(s),
        }
    }

    pub fn as_integer(&self) -> Result<i64, String> {
        match self {
            Scalar::Integer(n) => Ok(*n),
            Scalar::Number(n) if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 => {
                Ok(*n as i64)
            }
            Scalar::Number(_) => Err("number has no integer representation".to_string()),
            other => Err(format!("number expected, got {}", other.kind())),
        }
    }

    pub fn as_number(&self) -> Result<f64, String> {
        match self {
            Scalar::Integer(n) => Ok(*n as f64),
            Scalar::Number(n) => Ok(*n),
            other => Err(format!("number expected, got {}", other.kind())),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, String> {
        match self {
            Scalar::Boolean(b) => Ok(*b),
            other => Err(format!("boolean expected, got {}", other.kind())),
        }
    }

    pub fn into_string(self) -> Result<String, String> {
        match self {
            Scalar::Str(s) => Ok(s),
            other => Err(format!("string expected, got {}", other.kind())),
        }
    }
}

pub type Getter<T> = fn(&T) -> Scalar;
pub type Setter<T> = fn(&mut T, Scalar) -> Result<(), String>;

pub struct FieldDescriptor<T> {
    pub get: Getter<T>,
    /// `None` for read-only fields.
    pub set: Option<Setter<T>>,
}

/// Scriptable fields of a host type, by name.
pub struct FieldTable<T> {
    fields: AHashMap<&'static str, FieldDescriptor<T>>,
}

impl<T> FieldTable<T> {
    pub fn new() -> Self {
        Self {
            fields: AHashMap::new(),
        }
    }

    pub fn field(&mut self, name: &'static str, get: Getter<T>, set: Setter<T>) -> &mut Self {
        self.fields.insert(name, FieldDescriptor { get, set: Some(set) });
        self
    }

    pub fn readonly(&mut self, name: &'static str, get: Getter<T>) -> &mut Self {
        self.fields.insert(name, FieldDescriptor { get, set: None });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.get(name)
    }

}

impl<T> Default for FieldTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A native type scripts can hold, construct and call into.
pub trait HostType: Any + Send + Sized {
    /// Global table holding the constructor and methods, e.g. `"Point"`.
    const TYPE_NAME: &'static str;
    /// Registry key of the metatable, e.g. `"PointMetaTable"`.
    const METATABLE: &'static str;

    fn describe(fields: &mut FieldTable<Self>);

    /// Constructor and methods, installed as the global `TYPE_NAME` table.
    fn library() -> LibraryModule {
        LibraryModule::new(Self::TYPE_NAME)
    }

    /// Metamethods beyond `__index`, `__newindex` and `__tostring`.
    fn metamethods() -> Vec<(&'static str, CFunction)> {
        Vec::new()
    }

    /// Text for `tostring`; `None` falls back to `"<TYPE_NAME>: #<slot>"`.
    fn display(&self) -> Option<String> {
        None
    }
}

// ===== Protocol primitives =====

/// Register the metatable `name`, or fetch it if it already exists. It is
/// left on the stack either way; returns whether it was created.
pub fn new_metatable(state: LuaState, name: &str) -> LuaResult<bool> {
    state.new_metatable(name)
}

/// Store `handler` under `name` in the metatable at `metatable`.
pub fn bind_metamethod(state: LuaState, metatable: c_int, name: &str, handler: CFunction) {
    let metatable = state.abs_index(metatable);
    state.push_c_function(handler);
    state.set_field(metatable, name);
}

/// Set the registry metatable `name` on the value on top of the stack.
pub fn attach_metatable(state: LuaState, name: &str) -> LuaResult<()> {
    if state.get_named_metatable(name) != LuaType::Table {
        state.pop(1);
        return Err(LuaError::Runtime(format!("no metatable named '{}'", name)));
    }
    state.set_metatable(-2);
    Ok(())
}

/// Build the field table, metatable and global method table of `T`.
/// Registering a type twice refreshes its handlers.
pub fn register_host_type<T: HostType>(state: LuaState) -> LuaResult<()> {
    let ctx = HostContext::of(state).ok_or(LuaError::MissingContext)?;
    let mut fields = FieldTable::<T>::new();
    T::describe(&mut fields);
    ctx.set_field_table(T::METATABLE, fields);

    new_metatable(state, T::METATABLE)?;
    bind_metamethod(state, -1, "__index", index_handler::<T>);
    bind_metamethod(state, -1, "__newindex", newindex_handler::<T>);
    bind_metamethod(state, -1, "__tostring", tostring_handler::<T>);
    for (name, handler) in T::metamethods() {
        bind_metamethod(state, -1, name, handler);
    }
    state.push_boolean(true);
    state.set_field(-2, HOST_MARKER);
    state.pop(1);

    lib_registry::load_module(state, &T::library())
}

/// Push the script-side box for `handle` with metatable `name` attached.
pub fn push_handle(state: LuaState, handle: HostHandle, name: &str) -> LuaResult<()> {
    let block = state.new_userdata(mem::size_of::<u64>()) as *mut u64;
    // Userdata blocks are aligned for any standard type.
    unsafe { block.write(handle.to_raw()) };
    if let Err(e) = attach_metatable(state, name) {
        state.pop(1);
        return Err(e);
    }
    Ok(())
}

/// Move `value` into the arena and push it: allocate, push the box, then
/// attach `T`'s metatable. The box on top of the stack is what the caller
/// returns to the script.
pub fn push_host<T: HostType>(state: LuaState, value: T) -> LuaResult<HostHandle> {
    let ctx = HostContext::of(state).ok_or(LuaError::MissingContext)?;
    let handle = ctx.arena.lock().insert(value, T::METATABLE);
    if let Err(e) = push_handle(state, handle, T::METATABLE) {
        ctx.arena.lock().release(handle);
        return Err(e);
    }
    Ok(handle)
}

/// Handle inside any box made by this module, whatever its type.
pub fn read_handle(state: LuaState, idx: c_int) -> Option<HostHandle> {
    if !state.is_userdata(idx) || !state.get_metatable(idx) {
        return None;
    }
    state.push_string(HOST_MARKER);
    let marked = state.raw_get(-2) == LuaType::Boolean;
    state.pop(2);
    if !marked {
        return None;
    }
    let block = state.to_userdata(idx) as *const u64;
    Some(HostHandle::from_raw(unsafe { block.read() }))
}

/// Handle of the `T` box at argument `arg`.
pub fn check_host<T: HostType>(state: LuaState, arg: c_int, fname: &str) -> Result<HostHandle, String> {
    let block = state.test_userdata(arg, T::METATABLE).map_err(|e| e.to_string())?;
    if block.is_null() {
        return Err(marshal::arg_error(state, arg, fname, T::TYPE_NAME));
    }
    Ok(HostHandle::from_raw(unsafe { (block as *const u64).read() }))
}

pub fn with_host<T: HostType, R>(
    state: LuaState,
    arg: c_int,
    fname: &str,
    f: impl FnOnce(&T) -> R,
) -> Result<R, String> {
    let handle = check_host::<T>(state, arg, fname)?;
    let ctx = context(state)?;
    let arena = ctx.arena.lock();
    arena.with(handle, f).map_err(|e| e.to_string())
}

pub fn with_host_mut<T: HostType, R>(
    state: LuaState,
    arg: c_int,
    fname: &str,
    f: impl FnOnce(&mut T) -> R,
) -> Result<R, String> {
    let handle = check_host::<T>(state, arg, fname)?;
    let ctx = context(state)?;
    let mut arena = ctx.arena.lock();
    arena.with_mut(handle, f).map_err(|e| e.to_string())
}

fn context(state: LuaState) -> Result<Arc<HostContext>, String> {
    HostContext::of(state).ok_or_else(|| LuaError::MissingContext.to_string())
}

fn field_table<T: HostType>(ctx: &HostContext) -> Result<Arc<FieldTable<T>>, String> {
    ctx.field_table::<FieldTable<T>>(T::METATABLE)
        .ok_or_else(|| format!("{} is not registered", T::TYPE_NAME))
}

// ===== Metamethod handlers =====

pub unsafe extern "C-unwind" fn index_handler<T: HostType>(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, resolve_index::<T>) }
}

pub unsafe extern "C-unwind" fn newindex_handler<T: HostType>(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, resolve_newindex::<T>) }
}

pub unsafe extern "C-unwind" fn tostring_handler<T: HostType>(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, render::<T>) }
}

fn resolve_index<T: HostType>(state: LuaState) -> HandlerResult {
    let handle = check_host::<T>(state, 1, "__index")?;
    ensure_live(state, handle)?;
    // Only string keys name fields or methods
    if state.type_of(2) != LuaType::String {
        return Ok(0);
    }

    let field = {
        let name = state.to_string(2).unwrap_or_default();
        let ctx = context(state)?;
        let fields = field_table::<T>(&ctx)?;
        match fields.get(&name) {
            Some(descriptor) => Some(
                ctx.arena
                    .lock()
                    .with(handle, |v: &T| (descriptor.get)(v))
                    .map_err(|e| e.to_string())?,
            ),
            None => None,
        }
    };
    if let Some(value) = field {
        value.push(state);
        return Ok(1);
    }

    // Methods live in the type's global table; the key is still at 2
    if state.get_global(T::TYPE_NAME) == LuaType::Table {
        state.push_value(2);
        if state.raw_get(-2) != LuaType::Nil {
            state.remove(-2);
            return Ok(1);
        }
        state.pop(1);
    }
    state.pop(1);
    Ok(0)
}

/// Fail with the stale-handle message before any key dispatch.
fn ensure_live(state: LuaState, handle: HostHandle) -> Result<(), String> {
    let ctx = context(state)?;
    if ctx.arena.lock().contains(handle) {
        Ok(())
    } else {
        Err(HandleError::Stale.to_string())
    }
}

fn resolve_newindex<T: HostType>(state: LuaState) -> HandlerResult {
    let handle = check_host::<T>(state, 1, "__newindex")?;
    ensure_live(state, handle)?;
    if state.type_of(2) != LuaType::String {
        return Err(format!(
            "cannot index {} with a {} key",
            T::TYPE_NAME,
            state.type_name(2)
        ));
    }
    let name = state.to_string(2).unwrap_or_default();

    let ctx = context(state)?;
    let fields = field_table::<T>(&ctx)?;
    let Some(descriptor) = fields.get(&name) else {
        return Err(format!("cannot set unknown field '{}' on {}", name, T::TYPE_NAME));
    };
    let Some(setter) = descriptor.set else {
        return Err(format!("field '{}' of {} is read-only", name, T::TYPE_NAME));
    };
    let Some(value) = Scalar::read(state, 3) else {
        return Err(format!(
            "cannot assign a {} value to field '{}' of {}",
            state.type_name(3),
            name,
            T::TYPE_NAME
        ));
    };

    ctx.arena
        .lock()
        .with_mut(handle, |v: &mut T| setter(v, value))
        .map_err(|e| e.to_string())?
        .map_err(|e| format!("bad value for field '{}' of {}: {}", name, T::TYPE_NAME, e))?;
    Ok(0)
}

fn render<T: HostType>(state: LuaState) -> HandlerResult {
    let handle = check_host::<T>(state, 1, "__tostring")?;
    let ctx = context(state)?;
    let text = ctx
        .arena
        .lock()
        .with(handle, |v: &T| v.display())
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| format!("{}: #{}", T::TYPE_NAME, handle.index()));
    state.push_string(&text);
    Ok(1)
}
