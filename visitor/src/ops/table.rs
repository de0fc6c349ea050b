//! Table enumeration over the host's raw hash layout.

use vm::{Type, Vm};

use super::{opt_int, push_blob, ref_blob, seti, OpResult};
use crate::error::OpError;
use crate::marshal;
use crate::path;
use crate::walk;

/// `tablehash(t, max?)` — flat `{k, v, vref, ...}` listing of the hash part.
pub fn tablehash(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    hash_impl(dbg, host, true)
}

/// `tablehashv(t, max?)` — flat `{k, v, ...}` listing, values by copy only.
pub fn tablehashv(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    hash_impl(dbg, host, false)
}

fn hash_impl(dbg: &mut Vm, host: &mut Vm, want_ref: bool) -> OpResult {
    let maxn = opt_int(dbg, 2, u32::MAX as i64)?;
    dbg.set_top(1);

    if !host.check_stack(4) {
        return Err(OpError::StackOverflow);
    }
    if !push_host_table(dbg, host)? {
        return Ok(0);
    }

    // debugger: t result; host: table
    dbg.new_table();
    let mut n: i64 = 0;
    let mut remaining = maxn;
    let hsize = walk::hash_size(host, -1);

    for slot in 0..=hsize {
        let present = if slot < hsize {
            walk::get_kv(host, -1, slot)
        } else {
            walk::get_zero(host, -1)
        };
        if !present {
            continue;
        }

        remaining -= 1;
        if remaining < 0 {
            host.pop(3);
            return Ok(1);
        }

        // host: table k v -> table v k
        host.insert(-2);
        combine_key(dbg, host, slot)?;
        n += 1;
        seti(dbg, -2, n)?;

        combine_val(dbg, host, slot, want_ref)?;
        if want_ref {
            // value first, then the value reference
            n += 1;
            seti(dbg, -3, n)?;
            n += 1;
            seti(dbg, -2, n)?;
        } else {
            n += 1;
            seti(dbg, -2, n)?;
        }
    }

    host.pop(1);
    Ok(1)
}

/// `tablesize(t)` — `(array_count, hash_count)`, the zero entry counted into
/// the hash part.
pub fn tablesize(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    if !push_host_table(dbg, host)? {
        return Ok(0);
    }

    dbg.push_int(walk::array_size(host, -1) as i64);
    dbg.push_int((walk::hash_size(host, -1) + walk::has_zero(host, -1) as usize) as i64);
    host.pop(1);
    Ok(2)
}

/// `tablekey(t, start?)` — next string key at or after raw bucket `start`,
/// as `(key, next_bucket)`.
pub fn tablekey(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let start = opt_int(dbg, 2, 0)?.max(0) as usize;
    dbg.set_top(1);

    if !host.check_stack(2) {
        return Err(OpError::StackOverflow);
    }
    if !push_host_table(dbg, host)? {
        return Ok(0);
    }

    let hsize = walk::hash_size(host, -1);
    for slot in start..hsize {
        if !walk::get_k(host, -1, slot) {
            continue;
        }
        if host.type_of(-1) == Some(Type::Str) {
            let Some(key) = host.to_str(-1) else {
                host.pop(2);
                return Ok(0);
            };
            dbg.push_str(key.as_bytes());
            dbg.push_int(slot as i64 + 1);
            host.pop(2);
            return Ok(2);
        }
        host.pop(1);
    }

    host.pop(1);
    Ok(0)
}

/// Evaluate the debugger's table argument onto the host.
fn push_host_table(dbg: &mut Vm, host: &mut Vm) -> Result<bool, OpError> {
    match marshal::copy_to_host(dbg, host)? {
        Some(Type::Table) => Ok(true),
        Some(_) => {
            host.pop(1);
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Combine the host's top (a raw key) into one debugger value: a scalar
/// copy, or an `INDEX_KEY` reference through the table argument.
fn combine_key(dbg: &mut Vm, host: &mut Vm, slot: usize) -> Result<(), OpError> {
    if marshal::copy_scalar(host, dbg).is_some() {
        host.pop(1);
        return Ok(());
    }

    host.pop(1);
    let inner = ref_blob(dbg, 1)?;
    push_blob(dbg, path::child_key(&inner, slot as i32));
    Ok(())
}

/// Combine the host's top (a raw value) into debugger values.
///
/// Without `want_ref`: one value, scalar copy or `INDEX_VAL` reference.
/// With `want_ref`: the `INDEX_VAL` reference first, then the scalar copy —
/// or the reference twice when no scalar copy exists.
fn combine_val(dbg: &mut Vm, host: &mut Vm, slot: usize, want_ref: bool) -> Result<(), OpError> {
    if want_ref {
        let inner = ref_blob(dbg, 1)?;
        push_blob(dbg, path::child_value(&inner, slot as i32));
        if marshal::copy_scalar(host, dbg).is_none() {
            dbg.push_value(-1);
        }
        host.pop(1);
        return Ok(());
    }

    if marshal::copy_scalar(host, dbg).is_none() {
        let inner = ref_blob(dbg, 1)?;
        push_blob(dbg, path::child_value(&inner, slot as i32));
    }
    host.pop(1);
    Ok(())
}
