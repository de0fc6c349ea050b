//! The operation surface driven by debugger scripts.
//!
//! The calling convention is the stack convention of the original C
//! surface: when an operation is invoked, the debugger stack holds exactly
//! its arguments; the operation pushes its results and returns how many it
//! pushed. Absence — a path that did not resolve — is `Ok(0)`; programmer
//! errors and stack exhaustion raise [`OpError`](crate::OpError).
//!
//! Every operation leaves the host stack exactly as it found it.

mod exec;
mod info;
mod inspect;
mod table;
mod userdata;

pub use exec::{cleanwatch, eval, load, watch};
pub use info::{cfunctioninfo, costatus, gccount, getinfo};
pub use inspect::{
    assign, field, fieldv, getlocal, getlocalv, getmetatable, getmetatablev, getupvalue,
    getupvaluev, getuservalue, getuservaluev, index, indexv, type_, value,
};
pub use table::{tablehash, tablehashv, tablekey, tablesize};
pub use userdata::{udread, udwrite};

use vm::{LuaStr, TableRef, Type, Vm};

use crate::error::OpError;
use crate::path;

/// Number of debugger results an operation pushed.
pub type OpResult = Result<usize, OpError>;

pub(crate) fn check_int(dbg: &Vm, idx: i32) -> Result<i64, OpError> {
    dbg.to_int(idx).ok_or(OpError::BadArgument(idx, "integer"))
}

pub(crate) fn opt_int(dbg: &Vm, idx: i32, default: i64) -> Result<i64, OpError> {
    match dbg.type_of(idx) {
        None | Some(Type::Nil) => Ok(default),
        _ => check_int(dbg, idx),
    }
}

pub(crate) fn check_str(dbg: &Vm, idx: i32) -> Result<LuaStr, OpError> {
    dbg.to_str(idx).ok_or(OpError::BadArgument(idx, "string"))
}

/// The reference blob carried by the debugger userdata at `idx`.
pub(crate) fn ref_blob(dbg: &Vm, idx: i32) -> Result<Vec<u8>, OpError> {
    let u = dbg
        .to_userdata(idx)
        .ok_or(OpError::BadArgument(idx, "userdata"))?;
    let r = u.borrow().bytes().to_vec();

    Ok(r)
}

pub(crate) fn type_name(dbg: &Vm, idx: i32) -> &'static str {
    dbg.type_of(idx).map(|t| t.name()).unwrap_or("no value")
}

/// Push a reference blob as opaque debugger userdata.
pub(crate) fn push_blob(dbg: &mut Vm, blob: Vec<u8>) {
    dbg.new_userdata_from(blob, 0);
}

/// Store the debugger's top value into `t[n]`, `t` at (negative) `tbl`.
pub(crate) fn seti(dbg: &mut Vm, tbl: i32, n: i64) -> Result<(), OpError> {
    debug_assert!(tbl < 0);

    dbg.push_int(n);
    dbg.insert(-2);
    dbg.raw_set(tbl - 1)?;

    Ok(())
}

/// Build the visitor library table on the debugger and push it.
///
/// The table carries the two predefined reference fields `_G` and
/// `_REGISTRY`; the operations themselves are free functions over the two
/// runtime handles, and wiring them into a transport is the embedder's
/// concern.
pub fn open(dbg: &mut Vm) -> TableRef {
    let t = dbg.new_table();

    dbg.push_str("_G");
    push_blob(dbg, path::global());
    dbg.raw_set(-3).expect("string keys are always valid");

    dbg.push_str("_REGISTRY");
    push_blob(dbg, path::registry());
    dbg.raw_set(-3).expect("string keys are always valid");

    t
}
