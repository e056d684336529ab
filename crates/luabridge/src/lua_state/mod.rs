// Stack accessor over the Lua C API
// Typed push/read/write against a state's value stack by index
mod bridge_option;
mod lua_error;
mod lua_status;

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;

use mlua::ffi;

pub use bridge_option::BridgeOption;
pub use lua_error::LuaError;
pub use lua_status::LuaStatus;

pub type LuaResult<T> = Result<T, LuaError>;

/// Native function signature understood by the interpreter.
pub type CFunction = ffi::lua_CFunction;
pub type LuaInteger = ffi::lua_Integer;
pub type LuaNumber = ffi::lua_Number;

/// Pass as `nresults` to keep every returned value.
pub const MULTRET: c_int = ffi::LUA_MULTRET;

/// Pseudo-index of the registry table.
pub const REGISTRY_INDEX: c_int = ffi::LUA_REGISTRYINDEX;

/// Value kinds as reported by `lua_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaType {
    None,
    Nil,
    Boolean,
    LightUserData,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
}

impl LuaType {
    pub fn from_code(code: c_int) -> Self {
        match code {
            ffi::LUA_TNIL => LuaType::Nil,
            ffi::LUA_TBOOLEAN => LuaType::Boolean,
            ffi::LUA_TLIGHTUSERDATA => LuaType::LightUserData,
            ffi::LUA_TNUMBER => LuaType::Number,
            ffi::LUA_TSTRING => LuaType::String,
            ffi::LUA_TTABLE => LuaType::Table,
            ffi::LUA_TFUNCTION => LuaType::Function,
            ffi::LUA_TUSERDATA => LuaType::UserData,
            ffi::LUA_TTHREAD => LuaType::Thread,
            _ => LuaType::None,
        }
    }

    /// Name as printed by Lua's `type()` (light and full userdata share one).
    pub fn name(self) -> &'static str {
        match self {
            LuaType::None => "no value",
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::LightUserData | LuaType::UserData => "userdata",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
            LuaType::Function => "function",
            LuaType::Thread => "thread",
        }
    }
}

/// A borrowed handle to a Lua state (main thread or coroutine).
///
/// This is a plain pointer copy: it neither owns nor closes the state.
/// Ownership lives in [`LuaInstance`](crate::LuaInstance). Every method
/// assumes the pointer is live, which [`LuaState::from_ptr`] makes the
/// caller promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LuaState {
    l: *mut ffi::lua_State,
}

impl LuaState {
    /// Wrap a raw state pointer.
    ///
    /// # Safety
    /// `l` must point to an open Lua state for as long as the returned value
    /// (or any copy of it) is used.
    pub unsafe fn from_ptr(l: *mut ffi::lua_State) -> Self {
        LuaState { l }
    }

    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.l
    }

    // ===== State manipulation =====

    /// Open a fresh interpreter; `None` when it cannot allocate.
    pub fn new_state() -> Option<LuaState> {
        let l = unsafe { ffi::luaL_newstate() };
        (!l.is_null()).then_some(LuaState { l })
    }

    /// Destroy the interpreter and everything created in it.
    ///
    /// # Safety
    /// Neither this value nor any copy of it, nor any thread created from
    /// it, may be used afterwards.
    pub unsafe fn close(self) {
        unsafe { ffi::lua_close(self.l) }
    }

    /// Create a coroutine sharing this state's globals. The new thread is
    /// pushed on this stack; it stays alive only while referenced.
    pub fn new_thread(&self) -> LuaState {
        let t = unsafe { ffi::lua_newthread(self.l) };
        LuaState { l: t }
    }

    /// The root state every thread of this interpreter hangs off.
    pub fn main_thread(&self) -> LuaState {
        unsafe {
            ffi::lua_rawgeti(
                self.l,
                REGISTRY_INDEX,
                ffi::LUA_RIDX_MAINTHREAD as LuaInteger,
            );
            let main = ffi::lua_tothread(self.l, -1);
            ffi::lua_settop(self.l, -2);
            LuaState { l: main }
        }
    }

    pub fn open_libs(&self) {
        unsafe { ffi::luaL_openlibs(self.l) }
    }

    /// Make sure `extra` more slots can be pushed.
    pub fn check_stack(&self, extra: c_int) -> bool {
        unsafe { ffi::lua_checkstack(self.l, extra) != 0 }
    }

    // ===== Basic stack manipulation =====

    pub fn get_top(&self) -> c_int {
        unsafe { ffi::lua_gettop(self.l) }
    }

    pub fn set_top(&self, idx: c_int) {
        unsafe { ffi::lua_settop(self.l, idx) }
    }

    pub fn abs_index(&self, idx: c_int) -> c_int {
        unsafe { ffi::lua_absindex(self.l, idx) }
    }

    pub fn push_value(&self, idx: c_int) {
        unsafe { ffi::lua_pushvalue(self.l, idx) }
    }

    pub fn remove(&self, idx: c_int) {
        unsafe { ffi::lua_remove(self.l, idx) }
    }

    /// Move the top value into position `idx`, shifting the rest up.
    pub fn insert(&self, idx: c_int) {
        unsafe { ffi::lua_insert(self.l, idx) }
    }

    /// Pop the top value and store it at `idx` (stack slot or upvalue).
    pub fn replace(&self, idx: c_int) {
        unsafe { ffi::lua_replace(self.l, idx) }
    }

    pub fn pop(&self, n: c_int) {
        self.set_top(-n - 1);
    }

    /// Pseudo-index of upvalue `n` (1-based) of the running C closure.
    ///
    /// These indices sit below the registry pseudo-index and are never valid
    /// as ordinary stack positions.
    pub fn upvalue_index(n: c_int) -> c_int {
        ffi::lua_upvalueindex(n)
    }

    // ===== Access functions (stack -> Rust) =====

    pub fn type_of(&self, idx: c_int) -> LuaType {
        LuaType::from_code(unsafe { ffi::lua_type(self.l, idx) })
    }

    pub fn type_name(&self, idx: c_int) -> &'static str {
        self.type_of(idx).name()
    }

    pub fn is_integer(&self, idx: c_int) -> bool {
        unsafe { ffi::lua_isinteger(self.l, idx) != 0 }
    }

    /// True for strings and numbers.
    pub fn is_string(&self, idx: c_int) -> bool {
        unsafe { ffi::lua_isstring(self.l, idx) != 0 }
    }

    pub fn is_function(&self, idx: c_int) -> bool {
        self.type_of(idx) == LuaType::Function
    }

    pub fn is_none_or_nil(&self, idx: c_int) -> bool {
        matches!(self.type_of(idx), LuaType::None | LuaType::Nil)
    }

    pub fn is_userdata(&self, idx: c_int) -> bool {
        self.type_of(idx) == LuaType::UserData
    }

    /// Numeric value at `idx`, 0 when not convertible.
    pub fn to_number(&self, idx: c_int) -> LuaNumber {
        self.to_number_opt(idx).unwrap_or(0.0)
    }

    pub fn to_number_opt(&self, idx: c_int) -> Option<LuaNumber> {
        let mut isnum: c_int = 0;
        let n = unsafe { ffi::lua_tonumberx(self.l, idx, &mut isnum) };
        (isnum != 0).then_some(n)
    }

    /// Integer value at `idx`, 0 when it has no exact integer representation.
    pub fn to_integer(&self, idx: c_int) -> LuaInteger {
        self.to_integer_opt(idx).unwrap_or(0)
    }

    pub fn to_integer_opt(&self, idx: c_int) -> Option<LuaInteger> {
        let mut isnum: c_int = 0;
        let n = unsafe { ffi::lua_tointegerx(self.l, idx, &mut isnum) };
        (isnum != 0).then_some(n)
    }

    pub fn to_boolean(&self, idx: c_int) -> bool {
        unsafe { ffi::lua_toboolean(self.l, idx) != 0 }
    }

    /// String (or number, converted in place like `lua_tolstring`) at `idx`.
    /// Invalid UTF-8 is replaced.
    pub fn to_string(&self, idx: c_int) -> Option<String> {
        if !self.is_string(idx) {
            return None;
        }
        let mut len: usize = 0;
        let s = unsafe { ffi::lua_tolstring(self.l, idx, &mut len) };
        if s.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(s as *const u8, len) };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Block address of a full userdata or the pointer of a light one.
    pub fn to_userdata(&self, idx: c_int) -> *mut c_void {
        unsafe { ffi::lua_touserdata(self.l, idx) }
    }

    // ===== Push functions (Rust -> stack) =====

    pub fn push_nil(&self) {
        unsafe { ffi::lua_pushnil(self.l) }
    }

    pub fn push_number(&self, n: LuaNumber) {
        unsafe { ffi::lua_pushnumber(self.l, n) }
    }

    pub fn push_integer(&self, n: LuaInteger) {
        unsafe { ffi::lua_pushinteger(self.l, n) }
    }

    pub fn push_boolean(&self, b: bool) {
        unsafe { ffi::lua_pushboolean(self.l, b as c_int) }
    }

    pub fn push_string(&self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    pub fn push_bytes(&self, b: &[u8]) {
        unsafe {
            ffi::lua_pushlstring(self.l, b.as_ptr() as *const c_char, b.len());
        }
    }

    pub fn push_light_userdata(&self, p: *mut c_void) {
        unsafe { ffi::lua_pushlightuserdata(self.l, p) }
    }

    /// Push `f` as a closure over the `n` values on top of the stack, which
    /// are popped and become its upvalues 1..=n.
    pub fn push_c_closure(&self, f: CFunction, n: c_int) {
        unsafe { ffi::lua_pushcclosure(self.l, f, n) }
    }

    pub fn push_c_function(&self, f: CFunction) {
        self.push_c_closure(f, 0);
    }

    /// Allocate a full userdata block of `size` bytes, pushed on the stack.
    pub fn new_userdata(&self, size: usize) -> *mut c_void {
        unsafe { ffi::lua_newuserdatauv(self.l, size, 0) }
    }

    // ===== Get functions (Lua -> stack) =====

    pub fn raw_get(&self, idx: c_int) -> LuaType {
        LuaType::from_code(unsafe { ffi::lua_rawget(self.l, idx) })
    }

    pub fn raw_geti(&self, idx: c_int, n: LuaInteger) -> LuaType {
        LuaType::from_code(unsafe { ffi::lua_rawgeti(self.l, idx, n) })
    }

    pub fn create_table(&self, narr: c_int, nrec: c_int) {
        unsafe { ffi::lua_createtable(self.l, narr, nrec) }
    }

    /// Push `t[k]` without metamethods, where `t` is at `idx`.
    pub fn raw_get_field(&self, idx: c_int, k: &str) -> LuaType {
        let idx = self.abs_index(idx);
        self.push_string(k);
        self.raw_get(idx)
    }

    /// Push the global `name`.
    ///
    /// Raw access: metamethods a script put on `_G` (strict mode, proxies)
    /// are not consulted, so native-side global access cannot raise.
    pub fn get_global(&self, name: &str) -> LuaType {
        self.push_globals();
        let ty = self.raw_get_field(-1, name);
        self.remove(-2);
        ty
    }

    /// Push the metatable of the value at `idx`, if any.
    pub fn get_metatable(&self, idx: c_int) -> bool {
        unsafe { ffi::lua_getmetatable(self.l, idx) != 0 }
    }

    fn push_globals(&self) {
        self.raw_geti(REGISTRY_INDEX, ffi::LUA_RIDX_GLOBALS as LuaInteger);
    }

    // ===== Set functions (stack -> Lua) =====

    /// `t[k] = v` where `t` is at `idx`, `v` on top and `k` just below it.
    pub fn set_table(&self, idx: c_int) {
        unsafe { ffi::lua_settable(self.l, idx) }
    }

    /// `t[k] = v` where `t` is at `idx` and `v` is popped from the top.
    pub fn set_field(&self, idx: c_int, k: &str) {
        let idx = self.abs_index(idx);
        self.push_string(k);
        self.insert(-2);
        self.set_table(idx);
    }

    pub fn raw_set(&self, idx: c_int) {
        unsafe { ffi::lua_rawset(self.l, idx) }
    }

    /// `t[k] = v` without metamethods, where `t` is at `idx` and `v` is
    /// popped from the top.
    pub fn raw_set_field(&self, idx: c_int, k: &str) {
        let idx = self.abs_index(idx);
        self.push_string(k);
        self.insert(-2);
        self.raw_set(idx);
    }

    pub fn raw_seti(&self, idx: c_int, n: LuaInteger) {
        unsafe { ffi::lua_rawseti(self.l, idx, n) }
    }

    /// Pop a table and make it the metatable of the value at `idx`.
    pub fn set_metatable(&self, idx: c_int) {
        unsafe {
            ffi::lua_setmetatable(self.l, idx);
        }
    }

    /// Pop the top value into the global `name`, raw like [`get_global`](Self::get_global).
    pub fn set_global(&self, name: &str) {
        self.push_globals();
        self.insert(-2);
        self.raw_set_field(-2, name);
        self.pop(1);
    }

    pub fn register(&self, name: &str, f: CFunction) {
        self.push_c_function(f);
        self.set_global(name);
    }

    // ===== Miscellaneous =====

    pub fn concat(&self, n: c_int) {
        unsafe { ffi::lua_concat(self.l, n) }
    }

    /// Push the `chunk:line:` prefix of the function at call level `level`.
    pub fn where_(&self, level: c_int) {
        unsafe { ffi::luaL_where(self.l, level) }
    }

    /// Push a traceback of `of`, starting at `level`.
    pub fn traceback(&self, of: LuaState, level: c_int) {
        unsafe { ffi::luaL_traceback(self.l, of.l, ptr::null(), level) }
    }

    /// Raise the value on top of the stack as a Lua error.
    ///
    /// Control does not come back: the interpreter unwinds to the nearest
    /// protected call. No Rust value with a destructor may be live in the
    /// calling frames.
    pub fn raise_error(&self) -> c_int {
        unsafe { ffi::lua_error(self.l) }
    }

    /// Push upvalue `n` of the function at `idx`; `None` (nothing pushed)
    /// when the function has no such upvalue.
    pub fn get_upvalue(&self, idx: c_int, n: c_int) -> Option<LuaType> {
        let name = unsafe { ffi::lua_getupvalue(self.l, idx, n) };
        (!name.is_null()).then(|| self.type_of(-1))
    }

    /// Pop the top value into the registry, returning its reference.
    pub fn new_ref(&self) -> c_int {
        unsafe { ffi::luaL_ref(self.l, REGISTRY_INDEX) }
    }

    pub fn free_ref(&self, r: c_int) {
        unsafe { ffi::luaL_unref(self.l, REGISTRY_INDEX, r) }
    }

    // ===== Auxiliary metatable access =====

    /// Create the registry metatable `name` unless it exists; either way it
    /// is left on the stack. Returns whether it was created.
    pub fn new_metatable(&self, name: &str) -> LuaResult<bool> {
        let name = c_name(name)?;
        Ok(unsafe { ffi::luaL_newmetatable(self.l, name.as_ptr()) } != 0)
    }

    /// Push the registry metatable `name` (nil when absent).
    pub fn get_named_metatable(&self, name: &str) -> LuaType {
        self.push_string(name);
        self.raw_get(REGISTRY_INDEX)
    }

    /// Block address of the userdata at `idx` if its metatable is the
    /// registry metatable `name`, null otherwise.
    pub fn test_userdata(&self, idx: c_int, name: &str) -> LuaResult<*mut c_void> {
        let name = c_name(name)?;
        Ok(unsafe { ffi::luaL_testudata(self.l, idx, name.as_ptr()) })
    }

    // ===== Load and call =====

    /// Compile `buf` into a function pushed on the stack. On failure the
    /// error message is pushed instead.
    pub fn load_buffer(&self, buf: &[u8], name: &str) -> LuaResult<LuaStatus> {
        let name = c_name(name)?;
        let status = unsafe {
            ffi::luaL_loadbufferx(
                self.l,
                buf.as_ptr() as *const c_char,
                buf.len(),
                name.as_ptr(),
                ptr::null(),
            )
        };
        Ok(LuaStatus::from_code(status))
    }

    pub fn load_file(&self, filename: &str) -> LuaResult<LuaStatus> {
        let filename = c_name(filename)?;
        let status = unsafe { ffi::luaL_loadfilex(self.l, filename.as_ptr(), ptr::null()) };
        Ok(LuaStatus::from_code(status))
    }

    pub fn pcall(&self, nargs: c_int, nresults: c_int, errfunc: c_int) -> LuaStatus {
        LuaStatus::from_code(unsafe { ffi::lua_pcall(self.l, nargs, nresults, errfunc) })
    }
}

fn c_name(name: &str) -> LuaResult<CString> {
    CString::new(name).map_err(|_| LuaError::InvalidName(name.to_owned()))
}
