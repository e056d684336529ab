#[derive(Debug, Clone)]
pub struct BridgeOption {
    /// Open the standard libraries when the instance is created.
    pub open_libs: bool,
    /// Run every protected call under a message handler that appends a
    /// stack traceback to the error message.
    pub traceback: bool,
    /// Chunk name used by `exec` for source strings.
    pub chunk_name: String,
    /// Free stack slots demanded before marshalling values across a call.
    pub stack_reserve: i32,
}

impl Default for BridgeOption {
    fn default() -> Self {
        Self {
            open_libs: true,
            traceback: false,
            chunk_name: "=bridge".to_string(),
            stack_reserve: 20, // LUA_MINSTACK
        }
    }
}
