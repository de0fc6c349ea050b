//! A small stack-based scripting runtime handle.
//!
//! This crate provides the host-side contract a debugger visitor drives:
//! a Lua-shaped value system, a C-API-shaped stack interface, tables with an
//! observable internal layout, frames with debug information, protected
//! calls and a pluggable chunk loader. Two independent [`Vm`] instances act
//! as the *host* and *debugger* ends of a cross-VM inspection session.

pub mod debug;
pub mod error;
pub mod func;
mod interp;
pub mod proto;
pub mod table;
pub mod thread;
pub mod userdata;
pub mod value;
mod vm;

pub use debug::DebugInfo;
pub use error::Error;
pub use func::{Callable, NativeFn, UpvalCell};
pub use proto::{OpCode, Proto, ProtoBuilder, UpvalSource};
pub use table::{Table, TableRef};
pub use thread::{Status, Thread, ThreadRef};
pub use userdata::{UdRef, Userdata};
pub use value::{LuaStr, Type, Value};
pub use vm::{Loader, Symbolizer, Vm, MAX_STACK};
