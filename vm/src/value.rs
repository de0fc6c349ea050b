use std::fmt::{Debug, Display};
use std::rc::Rc;

use crate::func::Callable;
use crate::table::TableRef;
use crate::thread::ThreadRef;
use crate::userdata::UdRef;

/// Immutable byte string with cheap clones.
///
/// Lua strings are byte strings, not UTF-8; anything that round-trips through
/// userdata memory or the marshaller has to preserve arbitrary bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LuaStr(Rc<[u8]>);

impl LuaStr {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_ptr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }
}

impl From<&[u8]> for LuaStr {
    fn from(value: &[u8]) -> Self {
        LuaStr(value.into())
    }
}

impl From<Vec<u8>> for LuaStr {
    fn from(value: Vec<u8>) -> Self {
        LuaStr(value.into())
    }
}

impl From<&str> for LuaStr {
    fn from(value: &str) -> Self {
        LuaStr(value.as_bytes().into())
    }
}

impl From<String> for LuaStr {
    fn from(value: String) -> Self {
        LuaStr(value.into_bytes().into())
    }
}

impl Display for LuaStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl Debug for LuaStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

/// Value types as the host distinguishes them.
///
/// `Int` and `Float` are separate on the implementation side; both render as
/// Lua `number`, the same lossy collapse the teacher runtime performs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    LightPtr,
    Table,
    Function,
    Userdata,
    Thread,
}

impl Type {
    /// Lua-facing name of the type.
    pub fn name(self) -> &'static str {
        use Type::*;

        match self {
            Nil => "nil",
            Bool => "boolean",
            Int | Float => "number",
            Str => "string",
            LightPtr => "lightuserdata",
            Table => "table",
            Function => "function",
            Userdata => "userdata",
            Thread => "thread",
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single host value.
///
/// Aggregates are strong `Rc` handles; identity is pointer identity, which
/// also backs `to_pointer` addresses.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(LuaStr),
    LightPtr(usize),
    Table(TableRef),
    Function(Callable),
    Userdata(UdRef),
    Thread(ThreadRef),
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Nil => Type::Nil,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::Str,
            Value::LightPtr(_) => Type::LightPtr,
            Value::Table(_) => Type::Table,
            Value::Function(_) => Type::Function,
            Value::Userdata(_) => Type::Userdata,
            Value::Thread(_) => Type::Thread,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Stable address of the backing object, if the value has one.
    pub fn address(&self) -> Option<usize> {
        let r = match self {
            Value::Str(s) => s.as_ptr(),
            Value::LightPtr(p) => *p,
            Value::Table(t) => t.as_ptr(),
            Value::Function(c) => c.as_ptr(),
            Value::Userdata(u) => u.as_ptr(),
            Value::Thread(t) => t.as_ptr(),
            _ => return None,
        };

        Some(r)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(l0), Self::Bool(r0)) => l0 == r0,
            (Self::Int(l0), Self::Int(r0)) => l0 == r0,
            (Self::Float(l0), Self::Float(r0)) => l0 == r0,
            (Self::Str(l0), Self::Str(r0)) => l0 == r0,
            (Self::LightPtr(l0), Self::LightPtr(r0)) => l0 == r0,
            (Self::Table(l0), Self::Table(r0)) => l0.ptr_eq(r0),
            (Self::Function(l0), Self::Function(r0)) => l0.ptr_eq(r0),
            (Self::Userdata(l0), Self::Userdata(r0)) => l0.ptr_eq(r0),
            (Self::Thread(l0), Self::Thread(r0)) => l0.ptr_eq(r0),
            (Self::Nil, Self::Nil) => true,
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nil => write!(f, "Nil"),
            Self::Bool(arg0) => f.debug_tuple("Bool").field(arg0).finish(),
            Self::Int(arg0) => f.debug_tuple("Int").field(arg0).finish(),
            Self::Float(arg0) => f.debug_tuple("Float").field(arg0).finish(),
            Self::Str(arg0) => f.debug_tuple("Str").field(arg0).finish(),
            Self::LightPtr(arg0) => write!(f, "LightPtr({arg0:#x})"),
            Self::Table(arg0) => write!(f, "Table({:#x})", arg0.as_ptr()),
            Self::Function(arg0) => write!(f, "Function({:#x})", arg0.as_ptr()),
            Self::Userdata(arg0) => write!(f, "Userdata({:#x})", arg0.as_ptr()),
            Self::Thread(arg0) => write!(f, "Thread({:#x})", arg0.as_ptr()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(v) => write!(f, "{v}"),
            other => write!(
                f,
                "{}: {:#x}",
                other.type_of().name(),
                other.address().unwrap_or_default()
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<LuaStr> for Value {
    fn from(value: LuaStr) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}
