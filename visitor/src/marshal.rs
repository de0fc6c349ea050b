//! Value marshalling between the two runtimes.
//!
//! Only scalars ever cross the boundary by value, and strings cross as fresh
//! copies: the two runtimes never share a heap object. Anything else either
//! becomes a reference (anchored on the host when requested) or a printable
//! descriptor. In the opposite direction, debugger-side references evaluate
//! back into live host values, and debugger tables deep-copy into fresh host
//! tables for `eval`/`watch` arguments.

use vm::{Type, Value, Vm};

use crate::anchor;
use crate::error::OpError;
use crate::eval::eval;

/// Copy the host's top value onto the debugger if it is a scalar.
///
/// Reports the host type on success; `None` leaves both stacks untouched.
pub fn copy_scalar(host: &Vm, dbg: &mut Vm) -> Option<Type> {
    match host.get(-1)? {
        Value::Nil => dbg.push_nil(),
        Value::Bool(b) => dbg.push_bool(b),
        Value::Int(i) => dbg.push_int(i),
        Value::Float(f) => dbg.push_float(f),
        // copied byte-for-byte into the debugger's own allocation
        Value::Str(s) => dbg.push_str(s.as_bytes()),
        Value::LightPtr(p) => dbg.push_light_ptr(p),
        _ => return None,
    }

    host.type_of(-1)
}

/// Copy the host's top value onto the debugger, falling back to an anchored
/// reference (`want_ref`) or a `"<typename>: <address>"` descriptor.
///
/// Exactly one debugger value is pushed either way. Returns the anchor key
/// when one was allocated.
pub fn copy_value(host: &mut Vm, dbg: &mut Vm, want_ref: bool) -> Result<Option<i64>, OpError> {
    if copy_scalar(host, dbg).is_some() {
        return Ok(None);
    }

    if want_ref {
        let key = anchor::ref_value(host, dbg)?;
        Ok(Some(key))
    } else {
        let ty = host.type_of(-1).unwrap_or(Type::Nil);
        let addr = host.to_pointer(-1).unwrap_or(0);
        dbg.push_str(format!("{}: {:#x}", ty.name(), addr));

        Ok(None)
    }
}

/// Copy the debugger's top value onto the host.
///
/// Scalars copy by value; a debugger userdata is a reference blob and
/// evaluates in place. `Ok(None)` covers both an unmarshallable debugger
/// value (nothing pushed) and a reference that did not resolve; callers
/// that care inspect the debugger-side type.
pub fn copy_to_host(dbg: &Vm, host: &mut Vm) -> Result<Option<Type>, OpError> {
    if !host.check_stack(1) {
        return Err(OpError::StackOverflow);
    }

    let Some(v) = dbg.get(-1) else {
        return Ok(None);
    };

    let ty = match v {
        Value::Nil => {
            host.push_nil();
            Type::Nil
        }
        Value::Bool(b) => {
            host.push_bool(b);
            Type::Bool
        }
        Value::Int(i) => {
            host.push_int(i);
            Type::Int
        }
        Value::Float(f) => {
            host.push_float(f);
            Type::Float
        }
        Value::Str(s) => {
            host.push_str(s.as_bytes());
            Type::Str
        }
        Value::LightPtr(p) => {
            host.push_light_ptr(p);
            Type::LightPtr
        }
        Value::Userdata(u) => {
            if !host.check_stack(3) {
                return Err(OpError::StackOverflow);
            }
            let blob = u.borrow().bytes().to_vec();
            return Ok(eval(host, &blob));
        }
        _ => return Ok(None),
    };

    Ok(Some(ty))
}

/// Marshal an `eval`/`watch` argument from the debugger's top slot.
///
/// Like [`copy_to_host`], but debugger tables are deep-copied into a fresh
/// host table, and anything else unmarshallable degrades to nil so argument
/// positions stay aligned.
pub fn copy_args(dbg: &mut Vm, host: &mut Vm) -> Result<Option<Type>, OpError> {
    if let Some(ty) = copy_to_host(dbg, host)? {
        return Ok(Some(ty));
    }

    match dbg.get(-1) {
        Some(Value::Table(t)) => {
            if !host.check_stack(3) {
                return Err(OpError::StackOverflow);
            }

            host.new_table();
            let pairs = t.borrow().entries();
            for (k, v) in pairs {
                dbg.push(k);
                copy_args(dbg, host)?;
                dbg.pop(1);

                dbg.push(v);
                copy_args(dbg, host)?;
                dbg.pop(1);

                host.raw_set(-3)?;
            }

            Ok(Some(Type::Table))
        }
        _ => {
            host.push_nil();
            Ok(None)
        }
    }
}
