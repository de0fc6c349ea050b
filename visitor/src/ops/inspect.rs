//! Reads, writes and type queries over single host values.

use tracing::trace;
use vm::{Type, Vm};

use super::{check_int, check_str, push_blob, ref_blob, type_name, OpResult};
use crate::error::OpError;
use crate::marshal;
use crate::path;

/// `getlocal(frame, slot)` — local of a stack frame, as `(name, value)`.
///
/// `frame` must fit in `u16`; `slot` is non-zero with `|slot| <= 255`,
/// negative slots addressing varargs.
pub fn getlocal(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getlocal(dbg, host, true)
}

/// Value-only variant of [`getlocal`].
pub fn getlocalv(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getlocal(dbg, host, false)
}

fn client_getlocal(dbg: &mut Vm, host: &mut Vm, getref: bool) -> OpResult {
    let frame = check_int(dbg, 1)?;
    let slot = check_int(dbg, 2)?;

    if frame < 0 || frame > u16::MAX as i64 {
        return Err(OpError::FrameOutOfRange);
    }
    if slot == 0 || slot > u8::MAX as i64 || -slot > u8::MAX as i64 {
        return Err(OpError::LocalOutOfRange);
    }
    let frame = frame as u16;
    let slot = slot as i16;

    trace!(frame, slot, getref, "getlocal");

    if !host.check_stack(1) {
        return Err(OpError::StackOverflow);
    }
    let Some(name) = host.get_local(frame as usize, slot) else {
        return Ok(0);
    };

    // host: value on top
    let copied = !getref && marshal::copy_scalar(host, dbg).is_some();
    host.pop(1);
    if !copied {
        push_blob(dbg, path::frame_local(frame, slot));
    }

    dbg.push_str(name.as_bytes());
    dbg.insert(-2);
    Ok(2)
}

/// `getupvalue(funcRef, n)` — upvalue of a function, as `(name, value)`.
pub fn getupvalue(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getupvalue(dbg, host, true)
}

/// Value-only variant of [`getupvalue`].
pub fn getupvaluev(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getupvalue(dbg, host, false)
}

fn client_getupvalue(dbg: &mut Vm, host: &mut Vm, getref: bool) -> OpResult {
    let index = check_int(dbg, 2)?;
    dbg.set_top(1);

    if dbg.type_of(-1) != Some(Type::Userdata) {
        dbg.pop(1);
        return Ok(0);
    }

    let Some(t) = marshal::copy_to_host(dbg, host)? else {
        dbg.pop(1);
        return Ok(0);
    };
    if t != Type::Function {
        dbg.pop(1);
        host.pop(1);
        return Ok(0);
    }
    if index <= 0 || index > i32::MAX as i64 {
        dbg.pop(1);
        host.pop(1);
        return Ok(0);
    }

    let Some(name) = host.get_upvalue(-1, index as usize) else {
        dbg.pop(1);
        host.pop(1);
        return Ok(0);
    };

    // host: function, upvalue
    if !getref && marshal::copy_scalar(host, dbg).is_some() {
        dbg.replace(-2);
        host.pop(2);
    } else {
        host.pop(2);
        let inner = ref_blob(dbg, -1)?;
        push_blob(dbg, path::child_upvalue(&inner, index as i32));
        dbg.replace(-2);
    }

    dbg.push_str(name.as_bytes());
    dbg.insert(-2);
    Ok(2)
}

/// `getmetatable(v)` — a reference to the metatable of the denoted value.
///
/// For tables and userdata the reference wraps the argument; for scalars it
/// denotes the metatable of the whole primitive type, so its evaluation may
/// be nil.
pub fn getmetatable(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getmetatable(dbg, host, true)
}

/// Variant of [`getmetatable`] that reports nothing when no metatable is
/// currently installed.
pub fn getmetatablev(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getmetatable(dbg, host, false)
}

fn client_getmetatable(dbg: &mut Vm, host: &mut Vm, getref: bool) -> OpResult {
    dbg.set_top(1);
    if !host.check_stack(2) {
        return Err(OpError::StackOverflow);
    }

    let Some(t) = marshal::copy_to_host(dbg, host)? else {
        dbg.pop(1);
        return Ok(0);
    };

    if !getref {
        if !host.get_metatable(-1) {
            dbg.pop(1);
            host.pop(1);
            return Ok(0);
        }
        host.pop(2);
    } else {
        host.pop(1);
    }

    let code = path::type_code(t);
    if path::is_aggregate(code) {
        let inner = ref_blob(dbg, -1)?;
        push_blob(dbg, path::child_metatable(&inner, code));
        dbg.replace(-2);
    } else {
        dbg.pop(1);
        push_blob(dbg, path::primitive_metatable(code));
    }

    Ok(1)
}

/// `getuservalue(v, n)` — user value `n` (default 1), as `(value, true)`.
pub fn getuservalue(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getuservalue(dbg, host, true)
}

/// Value-only variant of [`getuservalue`].
pub fn getuservaluev(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_getuservalue(dbg, host, false)
}

fn client_getuservalue(dbg: &mut Vm, host: &mut Vm, getref: bool) -> OpResult {
    let n = super::opt_int(dbg, 2, 1)?;
    dbg.set_top(1);
    if !host.check_stack(2) {
        return Err(OpError::StackOverflow);
    }

    let Some(t) = marshal::copy_to_host(dbg, host)? else {
        dbg.pop(1);
        return Ok(0);
    };
    if t != Type::Userdata {
        host.pop(1);
        dbg.pop(1);
        return Ok(0);
    }
    if n <= 0 || n > i32::MAX as i64 {
        host.pop(1);
        dbg.pop(1);
        return Ok(0);
    }

    if !getref {
        match host.get_uservalue(-1, n as usize) {
            None => {
                host.pop(1);
                dbg.pop(1);
                return Ok(0);
            }
            Some(_) => {
                if marshal::copy_scalar(host, dbg).is_some() {
                    host.pop(2);
                    dbg.replace(-2);
                    dbg.push_bool(true);
                    return Ok(2);
                }
                host.pop(1);
            }
        }
    }

    host.pop(1);
    let inner = ref_blob(dbg, -1)?;
    push_blob(dbg, path::child_uservalue(&inner, n as i32));
    dbg.replace(-2);
    dbg.push_bool(true);
    Ok(2)
}

/// `index(t, k)` — `t[k]` by raw integer access; `k` must be positive.
pub fn index(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_index(dbg, host, true)
}

/// Value-only variant of [`index`].
pub fn indexv(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_index(dbg, host, false)
}

fn client_index(dbg: &mut Vm, host: &mut Vm, getref: bool) -> OpResult {
    if dbg.top() != 2 {
        return Err(OpError::NeedTableKey);
    }
    let key = check_int(dbg, 2)?;
    if key <= 0 || key > i32::MAX as i64 {
        return Err(OpError::KeyOutOfRange);
    }

    if !table_key(dbg, host)? {
        return Ok(0);
    }
    if host.type_of(-2) != Some(Type::Table) {
        host.pop(2);
        return Err(OpError::NotATable);
    }
    host.raw_get(-2);

    combine_index(dbg, host, getref, IndexKind::Int(key as i32))
}

/// `field(t, k)` — `t[k]` by raw string access.
pub fn field(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_field(dbg, host, true)
}

/// Value-only variant of [`field`].
pub fn fieldv(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    client_field(dbg, host, false)
}

fn client_field(dbg: &mut Vm, host: &mut Vm, getref: bool) -> OpResult {
    if dbg.top() != 2 {
        return Err(OpError::NeedTableKey);
    }
    check_str(dbg, 2)?;

    if !table_key(dbg, host)? {
        return Ok(0);
    }
    if host.type_of(-2) != Some(Type::Table) {
        host.pop(2);
        return Err(OpError::NotATable);
    }
    host.raw_get(-2);

    combine_index(dbg, host, getref, IndexKind::Str)
}

enum IndexKind {
    Int(i32),
    Str,
}

/// Marshal the `(table, key)` debugger arguments onto the host.
///
/// Leaves `table key` on the host on success. On failure the debugger
/// arguments are consumed and nothing stays on the host.
fn table_key(dbg: &mut Vm, host: &mut Vm) -> Result<bool, OpError> {
    if !host.check_stack(3) {
        return Err(OpError::StackOverflow);
    }

    dbg.insert(-2); // key table
    match marshal::copy_to_host(dbg, host)? {
        Some(Type::Table) => (),
        Some(_) => {
            host.pop(1);
            dbg.pop(2);
            return Ok(false);
        }
        None => {
            dbg.pop(2);
            return Ok(false);
        }
    }

    dbg.insert(-2); // table key
    if marshal::copy_to_host(dbg, host)?.is_none() {
        host.pop(1);
        dbg.pop(2);
        return Ok(false);
    }

    Ok(true)
}

/// Combine the raw-get result into one debugger result.
///
/// Host holds `table value`; debugger holds `table key`. Both are consumed
/// and the single result (scalar copy or child reference) replaces them.
fn combine_index(dbg: &mut Vm, host: &mut Vm, getref: bool, kind: IndexKind) -> OpResult {
    let copied = !getref && marshal::copy_scalar(host, dbg).is_some();
    host.pop(2);

    if !copied {
        let inner = ref_blob(dbg, -2)?;
        let blob = match kind {
            IndexKind::Int(k) => path::child_index(&inner, k),
            IndexKind::Str => {
                let key = check_str(dbg, -1)?;
                path::child_field(&inner, key.as_bytes())
            }
        };
        push_blob(dbg, blob);
    }

    // table key result -> result
    dbg.replace(-3);
    dbg.pop(1);
    Ok(1)
}

/// `value(v)` — scalar copy of the denoted host value, or a printable
/// descriptor, or nil when the path does not resolve.
pub fn value(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    dbg.set_top(1);

    if marshal::copy_to_host(dbg, host)?.is_none() {
        dbg.pop(1);
        dbg.push_nil();
        return Ok(1);
    }

    dbg.pop(1);
    marshal::copy_value(host, dbg, false)?;
    host.pop(1);
    Ok(1)
}

/// `assign(ref, v)` — store a value through a reference; `true` on success.
pub fn assign(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    if !host.check_stack(3) {
        return Err(OpError::StackOverflow);
    }
    dbg.set_top(2);
    let blob = ref_blob(dbg, 1)?;

    if marshal::copy_to_host(dbg, host)?.is_none() {
        // an unresolved reference assigns nil; anything else is a caller bug
        if dbg.type_of(2) != Some(Type::Userdata) {
            return Err(OpError::InvalidValueType(type_name(dbg, 2)));
        }
        host.push_nil();
    }

    let ok = crate::assign::assign(host, &blob);
    dbg.push_bool(ok);
    Ok(1)
}

/// `type(v)` — the host-side type name of a debugger value or reference.
///
/// Numbers split into `integer`/`float`, native functions report
/// `c function`, and a reference that does not resolve reports `unknown`.
pub fn type_(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    match dbg.type_of(1) {
        Some(Type::Nil) => {
            dbg.push_str("nil");
            return Ok(1);
        }
        Some(Type::Bool) => {
            dbg.push_str("boolean");
            return Ok(1);
        }
        Some(Type::Str) => {
            dbg.push_str("string");
            return Ok(1);
        }
        Some(Type::LightPtr) => {
            dbg.push_str("lightuserdata");
            return Ok(1);
        }
        Some(Type::Int) => {
            dbg.push_str("integer");
            return Ok(1);
        }
        Some(Type::Float) => {
            dbg.push_str("float");
            return Ok(1);
        }
        Some(Type::Userdata) => (),
        _ => return Err(OpError::UnexpectedType(type_name(dbg, 1))),
    }

    if !host.check_stack(3) {
        return Err(OpError::StackOverflow);
    }
    dbg.set_top(1);

    let blob = ref_blob(dbg, 1)?;
    let Some(t) = crate::eval::eval(host, &blob) else {
        dbg.push_str("unknown");
        return Ok(1);
    };

    let name = match t {
        Type::Function if host.is_native(-1) => "c function",
        Type::Function => "function",
        Type::Int => "integer",
        Type::Float => "float",
        Type::LightPtr => "lightuserdata",
        other => other.name(),
    };
    host.pop(1);

    dbg.push_str(name);
    Ok(1)
}
