// Lua Host-Object Bridge
// Embeds a Lua 5.4 interpreter and exposes native values to scripts through
// named metatables, upvalue closures and a process-wide handle registry

#[cfg(test)]
mod test;

pub mod closure;
pub mod context;
pub mod ex_data;
pub mod host_arena;
pub mod instance;
pub mod lib_registry;
pub mod lua_state;
pub mod marshal;
pub mod metatable;
pub mod point;

#[cfg(feature = "serde")]
pub mod serde;

pub use context::HostContext;
pub use host_arena::{HandleError, HostArena, HostHandle};
pub use instance::{LuaInstance, LuaThread};
pub use lib_registry::{LibraryModule, LibraryRegistry};
pub use lua_state::{BridgeOption, LuaError, LuaResult, LuaState, LuaStatus, LuaType};
pub use marshal::Value;
pub use metatable::{FieldTable, HostType, Scalar};
pub use point::Point;
