// 2D point exposed to scripts as `Point`
use std::ffi::c_int;
use std::fmt;
use std::ops::Add;

use mlua::ffi;

use crate::lib_registry::LibraryModule;
use crate::lua_state::{CFunction, LuaState};
use crate::marshal::{self, HandlerResult};
use crate::metatable::{self, FieldTable, HostType, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.x = self.x.wrapping_add(dx);
        self.y = self.y.wrapping_add(dy);
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x.wrapping_add(rhs.x), self.y.wrapping_add(rhs.y))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = itoa::Buffer::new();
        f.write_str("x = ")?;
        f.write_str(buf.format(self.x))?;
        f.write_str(", y = ")?;
        f.write_str(buf.format(self.y))
    }
}

impl HostType for Point {
    const TYPE_NAME: &'static str = "Point";
    const METATABLE: &'static str = "PointMetaTable";

    fn describe(fields: &mut FieldTable<Self>) {
        fields
            .field("x", |p| Scalar::Integer(p.x), |p, v| {
                p.x = v.as_integer()?;
                Ok(())
            })
            .field("y", |p| Scalar::Integer(p.y), |p, v| {
                p.y = v.as_integer()?;
                Ok(())
            });
    }

    fn library() -> LibraryModule {
        crate::lib_module!("Point", {
            "new" => point_new,
            "move" => point_move,
        })
    }

    fn metamethods() -> Vec<(&'static str, CFunction)> {
        vec![("__add", point_add as CFunction)]
    }

    fn display(&self) -> Option<String> {
        Some(self.to_string())
    }
}

// ===== Handlers =====

/// `Point.new(x, y)`
unsafe extern "C-unwind" fn point_new(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, new_point) }
}

fn new_point(state: LuaState) -> HandlerResult {
    let x = marshal::arg_integer(state, 1, "new")?;
    let y = marshal::arg_integer(state, 2, "new")?;
    metatable::push_host(state, Point::new(x, y)).map_err(|e| e.to_string())?;
    Ok(1)
}

/// `p1 + p2`: a new point; neither operand changes.
unsafe extern "C-unwind" fn point_add(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, add_points) }
}

fn add_points(state: LuaState) -> HandlerResult {
    let lhs = metatable::with_host(state, 1, "__add", |p: &Point| *p)?;
    let rhs = metatable::with_host(state, 2, "__add", |p: &Point| *p)?;
    metatable::push_host(state, lhs + rhs).map_err(|e| e.to_string())?;
    Ok(1)
}

/// `p:move(dx, dy)`
unsafe extern "C-unwind" fn point_move(l: *mut ffi::lua_State) -> c_int {
    unsafe { marshal::protect(l, move_point) }
}

fn move_point(state: LuaState) -> HandlerResult {
    let dx = marshal::arg_integer(state, 2, "move")?;
    let dy = marshal::arg_integer(state, 3, "move")?;
    metatable::with_host_mut(state, 1, "move", |p: &mut Point| p.translate(dx, dy))?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(Point::new(5, 7).to_string(), "x = 5, y = 7");
        assert_eq!(Point::new(-3, 0).to_string(), "x = -3, y = 0");
    }

    #[test]
    fn test_add_and_translate() {
        let mut p = Point::new(1, 2) + Point::new(3, 4);
        p.translate(1, 1);
        assert_eq!(p, Point::new(5, 7));
    }
}
