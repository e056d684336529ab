// Call boundary marshalling
// Native handlers see only the state pointer: arguments come off the stack,
// results go back on it, and the returned count is all the interpreter reads.
use std::any::Any;
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use mlua::ffi;

use crate::context::HostContext;
use crate::host_arena::HostHandle;
use crate::lua_state::{BridgeOption, LuaError, LuaResult, LuaState, LuaStatus, LuaType, MULTRET};
use crate::metatable;

/// What a handler body returns: the number of results it left on top of
/// the stack, or an error message to raise in the script.
pub type HandlerResult = Result<c_int, String>;

/// Run a handler body and translate its outcome for the interpreter.
///
/// `Err` and panics become a Lua error carrying the message, prefixed with
/// the script position. The error is raised only after the body and every
/// Rust value it produced have been dropped, since raising unwinds the
/// native frames without running destructors.
///
/// # Safety
/// `l` must be the state the interpreter passed to the calling handler.
pub unsafe fn protect<F>(l: *mut ffi::lua_State, body: F) -> c_int
where
    F: FnOnce(LuaState) -> HandlerResult,
{
    let state = unsafe { LuaState::from_ptr(l) };
    let message = match panic::catch_unwind(AssertUnwindSafe(|| body(state))) {
        Ok(Ok(nresults)) => return nresults,
        Ok(Err(message)) => message,
        Err(payload) => panic_message(payload),
    };
    state.where_(1);
    state.push_string(&message);
    drop(message);
    state.concat(2);
    state.raise_error()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("native handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("native handler panicked: {}", s)
    } else {
        "native handler panicked".to_string()
    }
}

// ===== Argument helpers =====

pub fn arg_error(state: LuaState, arg: c_int, fname: &str, expected: &str) -> String {
    format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        arg,
        fname,
        expected,
        state.type_name(arg)
    )
}

pub fn arg_integer(state: LuaState, arg: c_int, fname: &str) -> Result<i64, String> {
    match state.to_integer_opt(arg) {
        Some(n) => Ok(n),
        None if state.type_of(arg) == LuaType::Number => Err(format!(
            "bad argument #{} to '{}' (number has no integer representation)",
            arg, fname
        )),
        None => Err(arg_error(state, arg, fname, "number")),
    }
}

pub fn opt_integer(state: LuaState, arg: c_int, fname: &str, default: i64) -> Result<i64, String> {
    if state.is_none_or_nil(arg) {
        Ok(default)
    } else {
        arg_integer(state, arg, fname)
    }
}

pub fn arg_number(state: LuaState, arg: c_int, fname: &str) -> Result<f64, String> {
    state
        .to_number_opt(arg)
        .ok_or_else(|| arg_error(state, arg, fname, "number"))
}

pub fn arg_string(state: LuaState, arg: c_int, fname: &str) -> Result<String, String> {
    if state.type_of(arg) != LuaType::String {
        return Err(arg_error(state, arg, fname, "string"));
    }
    state
        .to_string(arg)
        .ok_or_else(|| arg_error(state, arg, fname, "string"))
}

// ===== Values crossing the boundary =====

/// A script value as seen from native code.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// A native value owned by the instance's host arena.
    Host(HostHandle),
    LightUserData(usize),
    /// Tables, functions, threads and foreign userdata, by type name.
    Other(String),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<HostHandle> {
        match self {
            Value::Host(h) => Some(*h),
            _ => None,
        }
    }
}

pub fn read_value(state: LuaState, idx: c_int) -> Value {
    match state.type_of(idx) {
        LuaType::None | LuaType::Nil => Value::Nil,
        LuaType::Boolean => Value::Boolean(state.to_boolean(idx)),
        LuaType::Number if state.is_integer(idx) => Value::Integer(state.to_integer(idx)),
        LuaType::Number => Value::Number(state.to_number(idx)),
        LuaType::String => Value::String(state.to_string(idx).unwrap_or_default()),
        LuaType::LightUserData => Value::LightUserData(state.to_userdata(idx) as usize),
        LuaType::UserData => match metatable::read_handle(state, idx) {
            Some(handle) => Value::Host(handle),
            None => Value::Other("userdata".to_string()),
        },
        other => Value::Other(other.name().to_string()),
    }
}

pub fn push_value(state: LuaState, value: &Value) -> LuaResult<()> {
    match value {
        Value::Nil => state.push_nil(),
        Value::Boolean(b) => state.push_boolean(*b),
        Value::Integer(n) => state.push_integer(*n),
        Value::Number(n) => state.push_number(*n),
        Value::String(s) => state.push_string(s),
        Value::LightUserData(p) => state.push_light_userdata(*p as *mut c_void),
        Value::Host(handle) => {
            let ctx = HostContext::of(state).ok_or(LuaError::MissingContext)?;
            let name = ctx
                .arena
                .lock()
                .metatable_of(*handle)
                .map_err(|e| LuaError::Runtime(e.to_string()))?;
            metatable::push_handle(state, *handle, name)?;
        }
        Value::Other(kind) => {
            return Err(LuaError::Runtime(format!(
                "cannot pass a {} value from native code",
                kind
            )));
        }
    }
    Ok(())
}

// ===== Protected execution =====

/// Message of the error object at `idx`.
pub fn error_message(state: LuaState, idx: c_int) -> String {
    match state.type_of(idx) {
        LuaType::String | LuaType::Number => state.to_string(idx).unwrap_or_default(),
        other => format!("(error object is a {} value)", other.name()),
    }
}

/// Pop the error left by a failed load or call and truncate to `base`.
fn pop_error(state: LuaState, status: LuaStatus, base: c_int) -> LuaError {
    let message = error_message(state, -1);
    state.set_top(base);
    LuaError::from_status(status, message)
}

/// Message handler installed below the called function when tracebacks
/// are on.
unsafe extern "C-unwind" fn message_handler(l: *mut ffi::lua_State) -> c_int {
    let state = unsafe { LuaState::from_ptr(l) };
    if !state.is_string(1) {
        let message = error_message(state, 1);
        state.push_string(&message);
        drop(message);
        state.replace(1);
    }
    state.traceback(state, 1);
    state.push_string("\n");
    state.insert(-2);
    state.concat(3);
    1
}

/// Call the function at `base + 1` with the `nargs` values above it and
/// collect every result. The stack is back at `base` afterwards, whatever
/// the outcome.
fn protected_call(
    state: LuaState,
    nargs: c_int,
    base: c_int,
    option: &BridgeOption,
) -> LuaResult<Vec<Value>> {
    let errfunc = if option.traceback {
        state.push_c_function(message_handler);
        state.insert(base + 1);
        base + 1
    } else {
        0
    };

    let status = state.pcall(nargs, MULTRET, errfunc);
    if !status.is_ok() {
        return Err(pop_error(state, status, base));
    }

    // Reading host values pushes scratch slots above the results
    if !state.check_stack(option.stack_reserve) {
        state.set_top(base);
        return Err(LuaError::Memory("stack overflow".to_string()));
    }

    let first = if option.traceback { base + 2 } else { base + 1 };
    let values = (first..=state.get_top())
        .map(|idx| read_value(state, idx))
        .collect();
    state.set_top(base);
    Ok(values)
}

/// Compile and run `source`, returning everything the chunk returns.
pub fn exec(
    state: LuaState,
    source: &str,
    chunk_name: &str,
    option: &BridgeOption,
) -> LuaResult<Vec<Value>> {
    let base = state.get_top();
    let status = state.load_buffer(source.as_bytes(), chunk_name)?;
    if !status.is_ok() {
        return Err(pop_error(state, status, base));
    }
    protected_call(state, 0, base, option)
}

pub fn exec_file(state: LuaState, filename: &str, option: &BridgeOption) -> LuaResult<Vec<Value>> {
    let base = state.get_top();
    let status = state.load_file(filename)?;
    if !status.is_ok() {
        return Err(pop_error(state, status, base));
    }
    protected_call(state, 0, base, option)
}

/// Call the function sitting below the `nargs` topmost values.
pub fn call_function(state: LuaState, nargs: c_int, option: &BridgeOption) -> LuaResult<Vec<Value>> {
    let base = state.get_top() - nargs - 1;
    protected_call(state, nargs, base, option)
}
