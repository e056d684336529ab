// Tests for status reporting and error propagation across the boundary
use std::ffi::c_int;

use mlua::ffi;

use super::{bridge, bridge_with};
use crate::lib_module;
use crate::lua_state::{BridgeOption, LuaError, LuaStatus};
use crate::marshal::{self, Value};
use crate::point::Point;

#[test]
fn test_syntax_error_does_not_run() {
    let lua = bridge();
    let state = lua.state().unwrap();
    let top = state.get_top();

    let err = lua.exec("marker = 1\nlocal x = = 2").unwrap_err();
    assert_eq!(err.status(), LuaStatus::SyntaxError);
    match &err {
        LuaError::Syntax(msg) => assert!(!msg.is_empty()),
        other => panic!("expected a syntax error, got {:?}", other),
    }
    assert_eq!(lua.get_global("marker").unwrap(), Value::Nil);
    assert_eq!(state.get_top(), top);
}

#[test]
fn test_runtime_error_message() {
    let lua = bridge();
    let err = lua.exec("error('boom')").unwrap_err();
    assert_eq!(err.status(), LuaStatus::RuntimeError);
    assert!(err.message().unwrap().contains("boom"), "{}", err);
}

#[test]
fn test_runtime_error_keeps_earlier_effects() {
    let lua = bridge();
    assert!(lua.exec("done = true; error('late')").is_err());
    assert_eq!(lua.get_global("done").unwrap(), Value::Boolean(true));
}

#[test]
fn test_non_string_error_object() {
    let lua = bridge();
    let err = lua.exec("error({})").unwrap_err();
    assert_eq!(
        err.message(),
        Some("(error object is a table value)")
    );
}

#[test]
fn test_traceback_option() {
    let option = BridgeOption {
        traceback: true,
        ..BridgeOption::default()
    };
    let lua = bridge_with(option);
    let err = lua
        .exec("local function inner() error('deep') end\ninner()")
        .unwrap_err();
    let msg = err.message().unwrap();
    assert!(msg.contains("deep"), "{}", msg);
    assert!(msg.contains("stack traceback"), "{}", msg);

    // Results still come back intact with the handler installed
    let result = lua.exec("return 1, 'two'").unwrap();
    assert_eq!(result, vec![Value::Integer(1), Value::String("two".into())]);
}

#[test]
fn test_no_traceback_by_default() {
    let lua = bridge();
    let err = lua.exec("error('flat')").unwrap_err();
    assert!(!err.message().unwrap().contains("stack traceback"));
}

#[test]
fn test_missing_file() {
    let lua = bridge();
    let err = lua.exec_file("/nonexistent/dir/script.lua").unwrap_err();
    assert_eq!(err.status(), LuaStatus::FileError);
    assert!(matches!(err, LuaError::File(_)));
}

#[test]
fn test_exec_file() {
    let path = std::env::temp_dir().join(format!("luabridge_exec_{}.lua", std::process::id()));
    std::fs::write(&path, "local p = Point.new(2, 3)\nreturn p.x * p.y").unwrap();

    let lua = bridge();
    let result = lua.exec_file(path.to_str().unwrap());
    std::fs::remove_file(&path).unwrap();
    assert_eq!(result.unwrap(), vec![Value::Integer(6)]);
}

#[test]
fn test_chunk_name_in_message() {
    let lua = bridge();
    let err = lua.exec_named("error('here')", "=config").unwrap_err();
    assert!(err.message().unwrap().starts_with("config:1:"), "{}", err);
}

#[test]
fn test_nul_in_chunk_name() {
    let lua = bridge();
    let err = lua.exec_named("return 1", "bad\0name").unwrap_err();
    assert!(matches!(err, LuaError::InvalidName(_)));
}

unsafe extern "C-unwind" fn explode(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, |_| panic!("kaboom")) }
}

unsafe extern "C-unwind" fn refuse(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, |_| Err("refused".to_string())) }
}

#[test]
fn test_handler_panic_becomes_script_error() {
    let lua = bridge();
    lua.register_library(&lib_module!("_G", { "explode" => explode }))
        .unwrap();

    let result = lua
        .exec("local ok, msg = pcall(explode); return ok, msg")
        .unwrap();
    assert_eq!(result[0], Value::Boolean(false));
    assert!(result[1].as_str().unwrap().contains("kaboom"));

    // The instance keeps working afterwards
    assert_eq!(lua.exec("return 2").unwrap(), vec![Value::Integer(2)]);
}

#[test]
fn test_handler_error_is_catchable() {
    let lua = bridge();
    lua.register_library(&lib_module!("guard", { "refuse" => refuse }))
        .unwrap();
    let result = lua
        .exec("local ok, msg = pcall(guard.refuse); return ok, msg")
        .unwrap();
    assert_eq!(result, vec![Value::Boolean(false), Value::String("refused".into())]);
}

#[test]
fn test_stack_balanced_after_failures() {
    let lua = bridge();
    let state = lua.state().unwrap();
    let top = state.get_top();

    let _ = lua.exec("error('x')");
    let _ = lua.exec("this is not lua");
    let _ = lua.exec_file("/nonexistent.lua");
    let _ = lua.call_global("undefined_fn", &[Value::Integer(1)]);
    let _ = lua.call_global("error", &[Value::String("y".into())]);
    let _ = lua.exec("return 1, 2, 3, Point.new(1, 1)");

    assert_eq!(state.get_top(), top);
}

const STRICT_GLOBALS: &str = r#"
setmetatable(_G, {
    __index = function(_, k) error("strict: undefined global " .. tostring(k)) end,
    __newindex = function(_, k) error("readonly: cannot define " .. tostring(k)) end,
})
"#;

#[test]
fn test_native_global_access_ignores_strict_globals() {
    let lua = bridge();
    lua.exec(STRICT_GLOBALS).unwrap();
    let err = lua.exec("return missing").unwrap_err();
    assert!(err.message().unwrap().contains("strict"), "{}", err);

    assert_eq!(lua.get_global("missing").unwrap(), Value::Nil);
    lua.set_global("fresh", &Value::Integer(1)).unwrap();
    assert_eq!(lua.exec("return fresh").unwrap(), vec![Value::Integer(1)]);

    assert_eq!(
        lua.call_global("tostring", &[Value::Integer(5)]).unwrap(),
        vec![Value::String("5".into())]
    );
    let err = lua.call_global("missing_fn", &[]).unwrap_err();
    assert!(err.message().unwrap().contains("not a function"), "{}", err);

    lua.register_library(&lib_module!("guard", { "refuse" => refuse }))
        .unwrap();
    lua.register_library(&lib_module!("_G", { "explode" => explode }))
        .unwrap();
    lua.register::<Point>().unwrap();
    lua.set_global_host("p", Point::new(1, 2)).unwrap();
    assert_eq!(
        lua.exec("p:move(1, 1); return p.x, p.nope").unwrap(),
        vec![Value::Integer(2), Value::Nil]
    );
}

#[test]
fn test_method_lookup_without_type_global() {
    let lua = bridge();
    lua.set_global_host("p", Point::new(4, 5)).unwrap();
    lua.exec(STRICT_GLOBALS).unwrap();
    lua.exec("rawset(_G, 'Point', nil)").unwrap();
    let state = lua.state().unwrap();
    let top = state.get_top();

    // Fields still resolve; methods and unknown keys come back nil
    assert_eq!(
        lua.exec("return p.y, p.move, p.nope").unwrap(),
        vec![Value::Integer(5), Value::Nil, Value::Nil]
    );
    assert_eq!(state.get_top(), top);
}
