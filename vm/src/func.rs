use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::Error;
use crate::proto::Proto;
use crate::value::{LuaStr, Value};
use crate::Vm;

/// Native function signature: the Rust rendering of `lua_CFunction`.
///
/// Arguments arrive on the stack; the function returns how many results it
/// left on top. Raising is returning `Err`, which a protected call turns
/// into an error message.
pub type NativeFn = Rc<dyn Fn(&mut Vm) -> Result<usize, Error>>;

/// Upvalues are shared places: every closure holding the cell observes
/// writes through any of them.
pub type UpvalCell = Rc<RefCell<Value>>;

pub struct Closure {
    pub proto: Rc<Proto>,
    pub upvalues: Vec<UpvalCell>,
}

/// A callable host value.
#[derive(Clone)]
pub enum Callable {
    Native(NativeFn),
    Lua(Rc<Closure>),
}

impl Callable {
    pub fn native(f: impl Fn(&mut Vm) -> Result<usize, Error> + 'static) -> Self {
        Callable::Native(Rc::new(f))
    }

    /// Instantiate a prototype that captures nothing (a loaded chunk).
    pub fn from_proto(proto: Rc<Proto>) -> Self {
        debug_assert!(
            proto.upvals.is_empty(),
            "a chunk-level prototype has nothing to capture from"
        );

        Callable::Lua(Rc::new(Closure {
            proto,
            upvalues: Vec::new(),
        }))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Callable::Native(_))
    }

    pub fn as_ptr(&self) -> usize {
        match self {
            Callable::Native(f) => Rc::as_ptr(f) as *const () as usize,
            Callable::Lua(c) => Rc::as_ptr(c) as usize,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }

    /// Upvalue at 1-based `n`: its name and current value.
    ///
    /// Native functions carry no upvalues here.
    pub fn upvalue(&self, n: usize) -> Option<(LuaStr, Value)> {
        let Callable::Lua(c) = self else {
            return None;
        };
        if n == 0 {
            return None;
        }

        let cell = c.upvalues.get(n - 1)?;
        let name = c
            .proto
            .upvals
            .get(n - 1)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "".into());

        Some((name, cell.borrow().clone()))
    }

    /// Write upvalue `n`, returning its name on success.
    pub fn set_upvalue(&self, n: usize, value: Value) -> Option<LuaStr> {
        let Callable::Lua(c) = self else {
            return None;
        };
        if n == 0 {
            return None;
        }

        let cell = c.upvalues.get(n - 1)?;
        *cell.borrow_mut() = value;

        let r = c
            .proto
            .upvals
            .get(n - 1)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "".into());

        Some(r)
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "native:{:#x}", self.as_ptr()),
            Callable::Lua(c) => write!(f, "lua:{:#x} ({})", self.as_ptr(), c.proto.chunk_name),
        }
    }
}
