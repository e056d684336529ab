pub mod test_errors;
pub mod test_point;
pub mod test_registry;

use crate::instance::LuaInstance;
use crate::lua_state::BridgeOption;

/// Instance with the standard libraries, `Point` and the closure constructors.
pub(crate) fn bridge() -> LuaInstance {
    bridge_with(BridgeOption::default())
}

pub(crate) fn bridge_with(option: BridgeOption) -> LuaInstance {
    let instance = LuaInstance::with_option(option).unwrap();
    instance.open_bridge_libs().unwrap();
    instance
}
