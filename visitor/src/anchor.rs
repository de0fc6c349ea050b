//! Anchor tables: registry-rooted storage that keeps host values alive.
//!
//! Two registry-keyed tables back the debugger's need to re-reach host
//! objects that cannot cross the boundary as scalars: `__debugger_ref` for
//! explicitly referenced values and `__debugger_watch` for watch results.
//! Both live in the host registry, so anchored values stay GC-reachable for
//! as long as their key is live. Keys are integers recycled through a free
//! list whose head sits in the table's dedicated zero slot.
//!
//! Everything here drives the host through its public stack operations only.

use vm::{Type, Vm};

use crate::error::OpError;
use crate::path;

pub const REF_TABLE: &[u8] = b"__debugger_ref";
pub const WATCH_TABLE: &[u8] = b"__debugger_watch";

/// Push the named anchor table, creating it in the registry on first use.
fn push_anchor_table(host: &mut Vm, name: &[u8]) -> Result<(), OpError> {
    if !host.check_stack(4) {
        return Err(OpError::StackOverflow);
    }

    host.push_registry();
    host.push_str(name);
    if host.raw_get(-2) == Type::Nil {
        host.pop(1);
        host.new_table();
        host.push_str(name);
        host.push_value(-2);
        host.raw_set(-4)?;
    }
    host.remove(-2);

    Ok(())
}

/// Anchor the value on top into the table below it, popping the value.
///
/// Keys come from the free list headed at slot 0, falling back to the next
/// array slot: the host's standard integer-reference discipline.
fn alloc_key(host: &mut Vm) -> Result<i64, OpError> {
    host.push_int(0);
    host.raw_get(-3);
    let head = host.to_int(-1).unwrap_or(0);
    host.pop(1);

    let key = if head != 0 {
        // advance the free list: t[0] = t[head]
        host.push_int(head);
        host.raw_get(-3);
        host.push_int(0);
        host.insert(-2);
        host.raw_set(-4)?;
        head
    } else {
        host.raw_len(-2) as i64 + 1
    };

    host.push_int(key);
    host.insert(-2);
    host.raw_set(-3)?;

    Ok(key)
}

/// Anchor the host's top value in `__debugger_ref`, keeping the value where
/// it is, and push the canonical reference to it on the debugger.
pub fn ref_value(host: &mut Vm, dbg: &mut Vm) -> Result<i64, OpError> {
    push_anchor_table(host, REF_TABLE)?;
    host.push_value(-2);
    let key = alloc_key(host)?;
    host.pop(1);

    push_registry_entry(dbg, REF_TABLE, key);
    Ok(key)
}

/// Anchor the host value at `idx` in `__debugger_watch`; returns its key.
pub fn add_watch(host: &mut Vm, idx: i32) -> Result<i64, OpError> {
    host.push_value(idx);
    push_anchor_table(host, WATCH_TABLE)?;
    host.insert(-2);
    let key = alloc_key(host)?;
    host.pop(1);

    Ok(key)
}

/// Push the canonical `registry[table][key]` reference on the debugger.
pub fn push_registry_entry(dbg: &mut Vm, table: &[u8], key: i64) {
    let blob = path::registry_entry(table, key as i32);
    dbg.new_userdata_from(blob, 0);
}

/// Release an anchor key back to the free list.
pub fn unref(host: &mut Vm, key: i64) -> Result<(), OpError> {
    if key <= 0 {
        return Ok(());
    }
    if !host.check_stack(4) {
        return Err(OpError::StackOverflow);
    }

    host.push_registry();
    host.push_str(REF_TABLE);
    if host.raw_get(-2) == Type::Table {
        // t[key] = t[0]; t[0] = key
        host.push_int(key);
        host.push_int(0);
        host.raw_get(-3);
        host.raw_set(-3)?;
        host.push_int(0);
        host.push_int(key);
        host.raw_set(-3)?;
    }
    host.pop(2);

    Ok(())
}

/// Drop the whole watch table; every watch anchor becomes collectable.
pub fn clean_watch(host: &mut Vm) -> Result<(), OpError> {
    if !host.check_stack(3) {
        return Err(OpError::StackOverflow);
    }

    host.push_registry();
    host.push_str(WATCH_TABLE);
    host.push_nil();
    host.raw_set(-3)?;
    host.pop(1);

    Ok(())
}
