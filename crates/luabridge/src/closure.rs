// Native closures carrying private state in upvalues
// The state lives in the closure's own upvalue slots, addressed through
// LuaState::upvalue_index, never in Rust captures. Every closure value built
// by one of the push_* functions owns independent slots.

use std::ffi::c_int;

use mlua::ffi;

use crate::lib_registry::LibraryModule;
use crate::lua_state::{LuaState, LuaType};
use crate::marshal::{self, HandlerResult};

/// Push a counter closure whose first call returns `initial + 1`.
pub fn push_counter(state: LuaState, initial: i64) {
    state.push_integer(initial);
    state.push_c_closure(counter_step, 1);
}

/// Push an accumulator closure: each call adds its argument to a running
/// sum and returns the sum and the number of calls so far.
pub fn push_accumulator(state: LuaState, initial: i64) {
    state.push_integer(initial);
    state.push_integer(0);
    state.push_c_closure(accumulator_step, 2);
}

unsafe extern "C-unwind" fn counter_step(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, step_counter) }
}

fn step_counter(state: LuaState) -> HandlerResult {
    let slot = LuaState::upvalue_index(1);
    let next = state.to_integer(slot).wrapping_add(1);
    state.push_integer(next);
    state.push_value(-1);
    state.replace(slot);
    Ok(1)
}

unsafe extern "C-unwind" fn accumulator_step(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, step_accumulator) }
}

fn step_accumulator(state: LuaState) -> HandlerResult {
    let sum_slot = LuaState::upvalue_index(1);
    let count_slot = LuaState::upvalue_index(2);

    // Integer arithmetic while both sides are integers, float once either is not
    if state.is_integer(1) && state.is_integer(sum_slot) {
        let sum = state.to_integer(sum_slot).wrapping_add(state.to_integer(1));
        state.push_integer(sum);
    } else {
        let delta = marshal::arg_number(state, 1, "accumulator")?;
        state.push_number(state.to_number(sum_slot) + delta);
    }
    state.push_value(-1);
    state.replace(sum_slot);

    let count = state.to_integer(count_slot) + 1;
    state.push_integer(count);
    state.push_value(-1);
    state.replace(count_slot);
    Ok(2)
}

// ===== Script constructors =====

/// `NewCounter([initial])`
unsafe extern "C-unwind" fn new_counter(l: *mut ffi::lua_State) -> c_int {
    unsafe {
        marshal::protect(l, |state| {
            let initial = marshal::opt_integer(state, 1, "NewCounter", 0)?;
            push_counter(state, initial);
            Ok(1)
        })
    }
}

/// `NewAccumulator([initial])`
unsafe extern "C-unwind" fn new_accumulator(l: *mut ffi::lua_State) -> c_int {
    unsafe {
        marshal::protect(l, |state| {
            let initial = marshal::opt_integer(state, 1, "NewAccumulator", 0)?;
            push_accumulator(state, initial);
            Ok(1)
        })
    }
}

/// Read the integer state of the closure at `idx` without calling it.
pub fn peek_upvalue(state: LuaState, idx: c_int, n: c_int) -> Option<i64> {
    if !state.is_function(idx) {
        return None;
    }
    let value = state.get_upvalue(idx, n)?;
    let result = match value {
        LuaType::Number => state.to_integer_opt(-1),
        _ => None,
    };
    state.pop(1);
    result
}

pub fn create_closure_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "NewCounter" => new_counter,
        "NewAccumulator" => new_accumulator,
    })
}
