//! Debug-info extraction, thread status and host statistics.

use vm::{Status, ThreadRef, Type, Vm};

use super::{check_int, check_str, push_blob, type_name, OpResult};
use crate::error::OpError;
use crate::info::InfoOptions;
use crate::marshal;
use crate::path;

/// Store the debugger's top value into `t[name]`, `t` at absolute `tbl`.
fn set_field(dbg: &mut Vm, tbl: i32, name: &str) -> Result<(), OpError> {
    debug_assert!(tbl > 0);

    dbg.push_str(name);
    dbg.insert(-2);
    dbg.raw_set(tbl)?;

    Ok(())
}

/// `getinfo(target, options, into?)` — populate a table with debug
/// information about a stack frame or a function reference.
///
/// `options` is a subset of `Slnfutr`; `f` is only valid for frame targets.
/// The `into` table is reused when supplied.
pub fn getinfo(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    dbg.set_top(3);
    let options = check_str(dbg, 2)?;
    let opts = InfoOptions::parse(options.as_bytes())?;

    if dbg.type_of(3) != Some(Type::Table) {
        dbg.pop(1);
        dbg.new_table();
    }

    let mut frame = 0i64;
    let info = match dbg.type_of(1) {
        Some(Type::Int) | Some(Type::Float) => {
            frame = check_int(dbg, 1)?;
            if frame < 0 {
                return Ok(0);
            }
            let Some(info) = host.stack_info(frame as usize) else {
                return Ok(0);
            };
            info
        }
        Some(Type::Userdata) => {
            if opts.func {
                return Err(OpError::InvalidOption);
            }

            dbg.push_value(1);
            let t = marshal::copy_to_host(dbg, host)?;
            dbg.pop(1);
            match t {
                Some(Type::Function) => (),
                Some(other) => {
                    host.pop(1);
                    return Err(OpError::NotAFunctionRef(other.name()));
                }
                None => return Err(OpError::NotAFunctionRef("no value")),
            }

            host.function_info().ok_or(OpError::NeedFunction)?
        }
        _ => return Err(OpError::BadTarget(type_name(dbg, 1))),
    };

    if opts.source {
        dbg.push_str(info.source.as_bytes());
        set_field(dbg, 3, "source")?;
        dbg.push_str(info.short_src.as_str());
        set_field(dbg, 3, "short_src")?;
        dbg.push_int(info.line_defined as i64);
        set_field(dbg, 3, "linedefined")?;
        dbg.push_int(info.last_line_defined as i64);
        set_field(dbg, 3, "lastlinedefined")?;
        dbg.push_str(info.what);
        set_field(dbg, 3, "what")?;
    }
    if opts.line {
        dbg.push_int(info.current_line as i64);
        set_field(dbg, 3, "currentline")?;
    }
    if opts.name {
        match &info.name {
            Some(name) => dbg.push_str(name.as_bytes()),
            None => dbg.push_str("?"),
        }
        set_field(dbg, 3, "name")?;
        match info.name_what {
            Some(what) => dbg.push_str(what),
            None => dbg.push_nil(),
        }
        set_field(dbg, 3, "namewhat")?;
    }
    if opts.func {
        push_blob(dbg, path::frame_func(frame as i32));
        set_field(dbg, 3, "func")?;
    }
    if opts.upvals {
        dbg.push_int(info.nparams as i64);
        set_field(dbg, 3, "nparams")?;
    }
    if opts.tailcall {
        dbg.push_bool(info.is_tailcall);
        set_field(dbg, 3, "istailcall")?;
    }
    if opts.transfer {
        dbg.push_int(info.ftransfer as i64);
        set_field(dbg, 3, "ftransfer")?;
        dbg.push_int(info.ntransfer as i64);
        set_field(dbg, 3, "ntransfer")?;
    }

    Ok(1)
}

fn thread_status(host: &Vm, co: &ThreadRef) -> &'static str {
    if co.ptr_eq(&host.current_thread()) {
        return "running";
    }

    let t = co.borrow();
    match t.status() {
        Status::Yield => "suspended",
        Status::Ok => {
            if t.frame_count() > 0 {
                "normal"
            } else if t.stack_len() == 0 {
                "dead"
            } else {
                // a started-but-not-yet-run coroutine
                "suspended"
            }
        }
        Status::Error => "dead",
    }
}

/// `costatus(v)` — one of `running`, `normal`, `suspended`, `dead`, or
/// `invalid` when the value is not a thread.
pub fn costatus(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    if marshal::copy_to_host(dbg, host)?.is_none() {
        dbg.push_str("invalid");
        return Ok(1);
    }
    let Some(co) = host.to_thread(-1) else {
        host.pop(1);
        dbg.push_str("invalid");
        return Ok(1);
    };

    let s = thread_status(host, &co);
    host.pop(1);
    dbg.push_str(s);
    Ok(1)
}

/// `gccount()` — host memory estimate in bytes.
pub fn gccount(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let (k, b) = host.gc_count();
    dbg.push_int(((k << 10) + b) as i64);
    Ok(1)
}

/// `cfunctioninfo(v)` — symbolic name of a native function pointer, or nil.
pub fn cfunctioninfo(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    if marshal::copy_to_host(dbg, host)?.is_none() {
        dbg.push_nil();
        return Ok(1);
    }
    if !host.is_native(-1) {
        host.pop(1);
        dbg.push_nil();
        return Ok(1);
    }

    let addr = host.to_pointer(-1).unwrap_or(0);
    host.pop(1);

    match host.symbolize(addr) {
        Some(name) => dbg.push_str(name),
        None => dbg.push_nil(),
    }
    Ok(1)
}
