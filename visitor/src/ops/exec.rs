//! Loading and protected execution of host code.

use tracing::trace;
use vm::{LuaStr, Type, Vm};

use super::{check_str, OpResult};
use crate::anchor;
use crate::error::OpError;
use crate::marshal;

/// `load(src)` — compile a chunk in the host and return a reference to the
/// resulting function, or `(nil, message)` when loading fails.
///
/// The function is anchored in `__debugger_ref`, so it survives host GC
/// until unreferenced.
pub fn load(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let src = check_str(dbg, 1)?;
    if !host.check_stack(4) {
        return Err(OpError::StackOverflow);
    }

    if !host.load_buffer(src.as_bytes(), "=") {
        dbg.push_nil();
        let msg = host.to_str(-1).unwrap_or_else(|| LuaStr::from(""));
        dbg.push_str(msg.as_bytes());
        host.pop(1);
        return Ok(2);
    }

    anchor::ref_value(host, dbg)?;
    host.pop(1);
    Ok(1)
}

/// Marshal every debugger argument onto the host, checking that the first
/// one resolves to a function.
fn push_call_args(dbg: &mut Vm, host: &mut Vm) -> Result<usize, OpError> {
    let nargs = dbg.top();
    if nargs == 0 {
        return Err(OpError::NeedFunction);
    }
    if !host.check_stack(nargs) {
        return Err(OpError::StackOverflow);
    }

    for i in 1..=nargs {
        dbg.push_value(i as i32);
        let t = marshal::copy_args(dbg, host)?;
        dbg.pop(1);

        if i == 1 && t != Some(Type::Function) {
            host.pop(1);
            return Err(OpError::NeedFunction);
        }
    }

    Ok(nargs)
}

/// `eval(fnRef, args...)` — call a host function under a protected call.
///
/// Returns `(true, value-copy)` or `(false, message)`; host errors never
/// escape the protected call.
pub fn eval(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let nargs = push_call_args(dbg, host)?;
    trace!(nargs = nargs - 1, "eval");

    if !host.pcall(nargs - 1, Some(1)) {
        dbg.push_bool(false);
        let msg = host.to_str(-1).unwrap_or_else(|| LuaStr::from(""));
        dbg.push_str(msg.as_bytes());
        host.pop(1);
        return Ok(2);
    }

    dbg.push_bool(true);
    marshal::copy_value(host, dbg, false)?;
    host.pop(1);
    Ok(2)
}

/// `watch(fnRef, args...)` — like [`eval`], but every result is anchored in
/// `__debugger_watch` and returned as a reference.
pub fn watch(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let base = host.top();
    let nargs = push_call_args(dbg, host)?;
    trace!(nargs = nargs - 1, "watch");

    if !host.pcall(nargs - 1, None) {
        dbg.push_bool(false);
        let msg = host.to_str(-1).unwrap_or_else(|| LuaStr::from(""));
        dbg.push_str(msg.as_bytes());
        host.pop(1);
        return Ok(2);
    }

    if !host.check_stack(3) {
        return Err(OpError::StackOverflow);
    }

    dbg.push_bool(true);
    let rets = host.top() - base;
    if !dbg.check_stack(rets) {
        return Err(OpError::StackOverflow);
    }

    for i in 0..rets {
        let idx = i as i32 - rets as i32;
        let key = anchor::add_watch(host, idx)?;
        anchor::push_registry_entry(dbg, anchor::WATCH_TABLE, key);
    }

    host.set_top(base);
    Ok(1 + rets)
}

/// `cleanwatch()` — drop the whole watch table.
pub fn cleanwatch(_dbg: &mut Vm, host: &mut Vm) -> OpResult {
    anchor::clean_watch(host)?;
    Ok(0)
}
