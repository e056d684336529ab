use std::ffi::c_int;

use mlua::ffi;

/// `luaL_loadfilex` reports unreadable files one past the core codes.
const LUA_ERRFILE: c_int = ffi::LUA_ERRERR + 1;

/// Status returned by the load and call entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaStatus {
    Ok,
    /// Coroutine suspension; the bridge never drives coroutines itself.
    Yield,
    RuntimeError,
    SyntaxError,
    MemoryError,
    /// Error while running the message handler.
    HandlerError,
    FileError,
}

impl LuaStatus {
    pub fn from_code(code: c_int) -> Self {
        match code {
            ffi::LUA_OK => LuaStatus::Ok,
            ffi::LUA_YIELD => LuaStatus::Yield,
            ffi::LUA_ERRRUN => LuaStatus::RuntimeError,
            ffi::LUA_ERRSYNTAX => LuaStatus::SyntaxError,
            ffi::LUA_ERRMEM => LuaStatus::MemoryError,
            ffi::LUA_ERRERR => LuaStatus::HandlerError,
            LUA_ERRFILE => LuaStatus::FileError,
            // Unknown codes only come from a misbehaving runtime.
            _ => LuaStatus::RuntimeError,
        }
    }

    pub fn is_ok(self) -> bool {
        self == LuaStatus::Ok
    }
}

impl std::fmt::Display for LuaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LuaStatus::Ok => "OK",
            LuaStatus::Yield => "YIELD",
            LuaStatus::RuntimeError => "ERRRUN",
            LuaStatus::SyntaxError => "ERRSYNTAX",
            LuaStatus::MemoryError => "ERRMEM",
            LuaStatus::HandlerError => "ERRERR",
            LuaStatus::FileError => "ERRFILE",
        };
        f.write_str(name)
    }
}
