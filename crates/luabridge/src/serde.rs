/// JSON conversion for values crossing the bridge.
///
/// Scalars map onto their JSON counterparts. Host values serialize as their
/// raw handle unless the caller asks for the native value itself through
/// [`host_to_json`].
use serde::Serialize;

use crate::host_arena::HostHandle;
use crate::instance::LuaInstance;
use crate::marshal::Value;
use crate::metatable::HostType;

pub fn value_to_json(value: &Value) -> Result<serde_json::Value, String> {
    Ok(match value {
        Value::Nil => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| format!("cannot represent {} in JSON", n))?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Host(handle) => serde_json::json!({ "handle": handle.to_raw() }),
        Value::LightUserData(p) => serde_json::Value::from(*p as u64),
        Value::Other(kind) => return Err(format!("cannot convert a {} value to JSON", kind)),
    })
}

pub fn values_to_json_string(values: &[Value], pretty: bool) -> Result<String, String> {
    let array = values
        .iter()
        .map(value_to_json)
        .collect::<Result<Vec<_>, _>>()?;
    let json = serde_json::Value::Array(array);
    if pretty {
        serde_json::to_string_pretty(&json).map_err(|e| e.to_string())
    } else {
        serde_json::to_string(&json).map_err(|e| e.to_string())
    }
}

/// Scalar JSON into a bridge value; arrays and objects are rejected.
pub fn json_to_value(json: &serde_json::Value) -> Result<Value, String> {
    match json {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| format!("number {} out of range", n)),
        },
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(_) => Err("JSON arrays have no bridge value".to_string()),
        serde_json::Value::Object(_) => Err("JSON objects have no bridge value".to_string()),
    }
}

/// Serialize the native value behind `handle`.
pub fn host_to_json<T: HostType + Clone + Serialize>(
    instance: &LuaInstance,
    handle: HostHandle,
) -> Result<serde_json::Value, String> {
    let value = instance
        .host::<T>(handle)
        .ok_or_else(|| format!("no live {} behind handle", T::TYPE_NAME))?;
    serde_json::to_value(value).map_err(|e| e.to_string())
}
