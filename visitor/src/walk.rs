//! Stack-level access to the host's raw table layout.
//!
//! These helpers bridge the host's internal bucket view into the stack
//! discipline every other component speaks: the table stays where it is,
//! keys and values travel via pushes and pops. Bucket index `hash_size`
//! addresses the dedicated zero entry.
//!
//! This is the one per-host-internals surface of the visitor; everything
//! else only assumes the interface below.

use vm::Vm;

pub fn array_size(host: &Vm, idx: i32) -> usize {
    host.to_table(idx)
        .map(|t| t.borrow().array_size())
        .unwrap_or(0)
}

pub fn hash_size(host: &Vm, idx: i32) -> usize {
    host.to_table(idx)
        .map(|t| t.borrow().hash_size())
        .unwrap_or(0)
}

pub fn has_zero(host: &Vm, idx: i32) -> bool {
    host.to_table(idx)
        .map(|t| t.borrow().has_zero())
        .unwrap_or(false)
}

/// Push the key at raw bucket `slot` of the table at `idx`.
pub fn get_k(host: &mut Vm, idx: i32, slot: usize) -> bool {
    let Some(t) = host.to_table(idx) else {
        return false;
    };
    let Some(k) = t.borrow().bucket_key(slot) else {
        return false;
    };

    host.push(k);
    true
}

/// Push the value at raw bucket `slot` of the table at `idx`.
pub fn get_v(host: &mut Vm, idx: i32, slot: usize) -> bool {
    let Some(t) = host.to_table(idx) else {
        return false;
    };
    let Some(v) = t.borrow().bucket_value(slot) else {
        return false;
    };

    host.push(v);
    true
}

/// Push key and value at raw bucket `slot` of the table at `idx`.
pub fn get_kv(host: &mut Vm, idx: i32, slot: usize) -> bool {
    let Some(t) = host.to_table(idx) else {
        return false;
    };
    let Some((k, v)) = t.borrow().bucket(slot) else {
        return false;
    };

    host.push(k);
    host.push(v);
    true
}

/// Push the dedicated zero entry of the table at `idx`, if occupied.
pub fn get_zero(host: &mut Vm, idx: i32) -> bool {
    let slot = hash_size(host, idx);
    has_zero(host, idx) && get_kv(host, idx, slot)
}

/// Pop the top value into raw bucket `slot` of the table at `idx`.
///
/// Keys are never mutated through the walker. The value is consumed only on
/// success.
pub fn set_v(host: &mut Vm, idx: i32, slot: usize) -> bool {
    let Some(t) = host.to_table(idx) else {
        return false;
    };
    let Some(v) = host.get(-1) else {
        return false;
    };

    let ok = t.borrow_mut().set_bucket_value(slot, v);
    if ok {
        host.pop(1);
    }

    ok
}
