// Tests for the Point binding: construction, arithmetic, fields, methods
use super::bridge;
use crate::lua_state::LuaError;
use crate::marshal::Value;
use crate::point::Point;

#[test]
fn test_add_then_move() {
    let lua = bridge();
    let result = lua
        .exec(
            r#"
            p1 = Point.new(1, 2)
            p2 = Point.new(3, 4)
            p3 = p1 + p2
            p3:move(1, 1)
            return p3.x, p3.y
            "#,
        )
        .unwrap();
    assert_eq!(result, vec![Value::Integer(5), Value::Integer(7)]);
}

#[test]
fn test_add_leaves_operands_alone() {
    let lua = bridge();
    let result = lua
        .exec(
            r#"
            local a = Point.new(1, 2)
            local b = Point.new(3, 4)
            local c = a + b
            c.x = 100
            return a.x, a.y, b.x, b.y
            "#,
        )
        .unwrap();
    assert_eq!(
        result,
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4)
        ]
    );
}

#[test]
fn test_tostring() {
    let lua = bridge();
    let result = lua
        .exec("local p = Point.new(4, 6); p:move(1, 1); return tostring(p)")
        .unwrap();
    assert_eq!(result[0].as_str(), Some("x = 5, y = 7"));
}

#[test]
fn test_field_write_then_read() {
    let lua = bridge();
    let result = lua
        .exec(
            r#"
            local p = Point.new(0, 0)
            p.x = 10
            p.y = -4
            local q = p + Point.new(1, 1)
            q.y = 2.0
            return p.x, p.y, q.x, q.y
            "#,
        )
        .unwrap();
    assert_eq!(
        result,
        vec![
            Value::Integer(10),
            Value::Integer(-4),
            Value::Integer(11),
            Value::Integer(2)
        ]
    );
}

#[test]
fn test_unknown_field_reads_nil() {
    let lua = bridge();
    let result = lua.exec("local p = Point.new(1, 2); return p.z, p[1]").unwrap();
    assert_eq!(result, vec![Value::Nil, Value::Nil]);
}

#[test]
fn test_method_is_reachable_through_index() {
    let lua = bridge();
    let result = lua
        .exec("local p = Point.new(1, 2); return p.move == Point.move, type(p.new)")
        .unwrap();
    assert_eq!(result[0], Value::Boolean(true));
    assert_eq!(result[1].as_str(), Some("function"));
}

#[test]
fn test_unknown_field_write_is_rejected() {
    let lua = bridge();
    lua.exec("p = Point.new(1, 2)").unwrap();

    let err = lua.exec("p.z = 5").unwrap_err();
    match &err {
        LuaError::Runtime(msg) => {
            assert!(msg.contains("cannot set unknown field 'z' on Point"), "{}", msg)
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let result = lua.exec("return p.x, p.y, p.z").unwrap();
    assert_eq!(result, vec![Value::Integer(1), Value::Integer(2), Value::Nil]);
}

#[test]
fn test_wrong_kind_write_is_rejected() {
    let lua = bridge();
    lua.exec("p = Point.new(1, 2)").unwrap();

    let err = lua.exec("p.x = 'far'").unwrap_err();
    assert!(err.message().unwrap().contains("field 'x' of Point"), "{}", err);

    let err = lua.exec("p.y = 1.5").unwrap_err();
    assert!(
        err.message().unwrap().contains("no integer representation"),
        "{}",
        err
    );

    let err = lua.exec("p.x = {}").unwrap_err();
    assert!(err.message().unwrap().contains("cannot assign a table"), "{}", err);

    let result = lua.exec("return p.x, p.y").unwrap();
    assert_eq!(result, vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn test_bad_constructor_arguments() {
    let lua = bridge();

    let err = lua.exec("return Point.new('a', 1)").unwrap_err();
    assert!(
        err.message()
            .unwrap()
            .contains("bad argument #1 to 'new' (number expected, got string)"),
        "{}",
        err
    );

    let err = lua.exec("return Point.new(1)").unwrap_err();
    assert!(
        err.message()
            .unwrap()
            .contains("bad argument #2 to 'new' (number expected, got no value)"),
        "{}",
        err
    );

    let err = lua.exec("return Point.new(1.5, 2)").unwrap_err();
    assert!(
        err.message().unwrap().contains("no integer representation"),
        "{}",
        err
    );
}

#[test]
fn test_add_with_non_point_operand() {
    let lua = bridge();
    let err = lua.exec("return Point.new(1, 2) + 1").unwrap_err();
    assert!(
        err.message()
            .unwrap()
            .contains("bad argument #2 to '__add' (Point expected, got number)"),
        "{}",
        err
    );
}

#[test]
fn test_move_on_wrong_receiver() {
    let lua = bridge();
    let err = lua.exec("Point.move({}, 1, 1)").unwrap_err();
    assert!(
        err.message().unwrap().contains("(Point expected, got table)"),
        "{}",
        err
    );
}

#[test]
fn test_native_and_script_share_the_value() {
    let lua = bridge();
    let handle = lua.set_global_host("origin", Point::new(0, 0)).unwrap();

    lua.exec("origin:move(3, 4)").unwrap();
    assert_eq!(lua.host::<Point>(handle), Some(Point::new(3, 4)));

    lua.with_host_mut(handle, |p: &mut Point| p.x = 9).unwrap();
    let result = lua.exec("return origin.x").unwrap();
    assert_eq!(result, vec![Value::Integer(9)]);
}

#[test]
fn test_script_result_resolves_to_native_value() {
    let lua = bridge();
    let result = lua.exec("return Point.new(2, 3) + Point.new(4, 5)").unwrap();
    let handle = result[0].as_host().unwrap();
    assert_eq!(lua.host::<Point>(handle), Some(Point::new(6, 8)));
}
