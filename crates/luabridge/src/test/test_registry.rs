// Tests for the handle registry and instance lifecycle
use super::bridge;
use crate::context::HostContext;
use crate::ex_data::{self, StateKey};
use crate::instance::LuaInstance;
use crate::lua_state::LuaError;
use crate::marshal::Value;
use crate::point::Point;

#[test]
fn test_entry_registered_on_create() {
    let lua = LuaInstance::new().unwrap();
    let key = lua.key();

    let data = ex_data::get(key).unwrap();
    assert!(data.downcast::<HostContext>().is_ok());

    let state = lua.state().unwrap();
    assert!(state.get_ex_data().is_some());
    assert_eq!(StateKey::of(state), key);
}

#[test]
fn test_close_removes_entry() {
    let mut lua = bridge();
    let key = lua.key();
    assert!(ex_data::contains(key));

    lua.close();
    assert!(lua.is_closed());
    assert!(!ex_data::contains(key));
    assert!(ex_data::get(key).is_none());

    // Closing twice is harmless
    lua.close();
    assert_eq!(lua.exec("return 1"), Err(LuaError::Closed));
}

#[test]
fn test_drop_removes_entry() {
    let key = {
        let lua = bridge();
        lua.key()
    };
    assert!(!ex_data::contains(key));
}

#[test]
fn test_instances_are_independent() {
    let a = bridge();
    let b = bridge();
    assert_ne!(a.key(), b.key());
    assert!(!std::sync::Arc::ptr_eq(a.context(), b.context()));

    a.exec("p = Point.new(1, 1); shared = 'a'").unwrap();
    b.exec("p = Point.new(2, 2)").unwrap();

    assert_eq!(b.get_global("shared").unwrap(), Value::Nil);
    assert_eq!(a.exec("return p.x").unwrap(), vec![Value::Integer(1)]);
    assert_eq!(b.exec("return p.x").unwrap(), vec![Value::Integer(2)]);
    assert_eq!(a.context().arena.lock().len(), 1);
    assert_eq!(b.context().arena.lock().len(), 1);
}

#[test]
fn test_instances_on_separate_threads() {
    let workers: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let lua = bridge();
                let result = lua
                    .call_global("tostring", &[Value::Integer(i)])
                    .unwrap();
                let key = lua.key();
                drop(lua);
                (result, key)
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        let (result, key) = worker.join().unwrap();
        assert_eq!(result, vec![Value::String(i.to_string())]);
        assert!(!ex_data::contains(key));
    }
}

#[test]
fn test_thread_resolves_same_context() {
    let lua = bridge();
    let thread = lua.new_thread().unwrap();
    assert_ne!(thread.state(), lua.state().unwrap());
    assert_eq!(StateKey::of(thread.state()), lua.key());

    let result = thread.exec("q = Point.new(7, 8); return q.y").unwrap();
    assert_eq!(result, vec![Value::Integer(8)]);
    drop(thread);

    let handle = lua.get_global("q").unwrap().as_host().unwrap();
    assert_eq!(lua.host::<Point>(handle), Some(Point::new(7, 8)));
}

#[test]
fn test_raw_state_without_context() {
    let lua = LuaInstance::new().unwrap();
    let key = lua.key();
    ex_data::delete(key);

    let err = lua.open_bridge_libs().unwrap_err();
    assert_eq!(err, LuaError::MissingContext);
}
