//! Stable storage for native values exposed to scripts.
//!
//! Scripts never see a native address. They hold a [`HostHandle`]: a slot
//! index plus the generation the slot had when the value was inserted. A
//! released slot bumps its generation before reuse, so a handle that
//! outlived its value is reported as stale instead of aliasing whatever
//! took the slot next.

use std::any::{Any, type_name};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HostHandle {
    index: u32,
    generation: u32,
}

impl HostHandle {
    /// Packed form stored inside the script-side box.
    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn from_raw(raw: u64) -> Self {
        HostHandle {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("stale handle: the native value was released")]
    Stale,
    #[error("{expected} expected, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct Entry {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
    metatable: &'static str,
}

#[derive(Default)]
pub struct HostArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl HostArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `value`. `metatable` is the registry metatable the
    /// script-side box must carry.
    pub fn insert<T: Any + Send>(&mut self, value: T, metatable: &'static str) -> HostHandle {
        let entry = Entry {
            value: Box::new(value),
            type_name: short_type_name::<T>(),
            metatable,
        };
        self.live += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return HostHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        HostHandle {
            index,
            generation: 0,
        }
    }

    fn entry(&self, handle: HostHandle) -> Result<&Entry, HandleError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(HandleError::Stale)
    }

    fn entry_mut(&mut self, handle: HostHandle) -> Result<&mut Entry, HandleError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(HandleError::Stale)
    }

    pub fn with<T: Any, R>(
        &self,
        handle: HostHandle,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, HandleError> {
        let entry = self.entry(handle)?;
        let found = entry.type_name;
        match entry.value.downcast_ref::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(HandleError::WrongType {
                expected: short_type_name::<T>(),
                found,
            }),
        }
    }

    pub fn with_mut<T: Any, R>(
        &mut self,
        handle: HostHandle,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, HandleError> {
        let entry = self.entry_mut(handle)?;
        let found = entry.type_name;
        match entry.value.downcast_mut::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(HandleError::WrongType {
                expected: short_type_name::<T>(),
                found,
            }),
        }
    }

    pub fn get_cloned<T: Any + Clone>(&self, handle: HostHandle) -> Result<T, HandleError> {
        self.with(handle, T::clone)
    }

    pub fn metatable_of(&self, handle: HostHandle) -> Result<&'static str, HandleError> {
        self.entry(handle).map(|entry| entry.metatable)
    }

    pub fn contains(&self, handle: HostHandle) -> bool {
        self.entry(handle).is_ok()
    }

    /// Drop the value behind `handle`. Returns false for stale handles.
    pub fn release(&mut self, handle: HostHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.entry.is_none() {
            return false;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.live -= 1;
        true
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// `crate::point::Point` -> `Point`
fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_makes_handle_stale() {
        let mut arena = HostArena::new();
        let h = arena.insert(7i64, "IntMetaTable");
        assert_eq!(arena.get_cloned::<i64>(h), Ok(7));
        assert!(arena.release(h));
        assert_eq!(arena.get_cloned::<i64>(h), Err(HandleError::Stale));
        assert!(!arena.release(h));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_reused_slot_does_not_alias_old_handle() {
        let mut arena = HostArena::new();
        let old = arena.insert(1i64, "IntMetaTable");
        arena.release(old);
        let new = arena.insert(2i64, "IntMetaTable");
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(arena.get_cloned::<i64>(old), Err(HandleError::Stale));
        assert_eq!(arena.get_cloned::<i64>(new), Ok(2));
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let mut arena = HostArena::new();
        let h = arena.insert(String::from("hi"), "StrMetaTable");
        let err = arena.get_cloned::<i64>(h).unwrap_err();
        assert_eq!(
            err,
            HandleError::WrongType {
                expected: "i64",
                found: "String"
            }
        );
    }

    #[test]
    fn test_raw_round_trip_keeps_generation() {
        let h = HostHandle {
            index: 3,
            generation: 9,
        };
        assert_eq!(HostHandle::from_raw(h.to_raw()), h);
    }
}
