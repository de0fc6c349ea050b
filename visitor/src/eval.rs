//! Path evaluation: from a reference blob to a live host value.

use vm::{Type, Vm};

use crate::path::{self, Seg};
use crate::walk;

/// Push the host value a blob denotes and report its type.
///
/// `None` means the path did not resolve — a missing frame, local, upvalue,
/// user value or key, or a segment whose inner value has the wrong type. On
/// that return the host stack is exactly as it was; on success the net stack
/// change is exactly one pushed value, whatever the recursion depth.
/// Malformed blobs evaluate like any other unresolved path.
pub fn eval(host: &mut Vm, blob: &[u8]) -> Option<Type> {
    let (seg, inner) = path::read(blob).ok()?;

    match seg {
        Seg::FrameLocal { frame, slot } => {
            host.get_local(frame as usize, slot)?;
            host.type_of(-1)
        }
        Seg::FrameFunc { frame } => {
            if frame < 0 || !host.push_frame_function(frame as usize) {
                return None;
            }

            Some(Type::Function)
        }
        Seg::IndexInt { key } => {
            if eval(host, inner)? != Type::Table {
                // only a table can be indexed
                host.pop(1);
                return None;
            }

            host.push_int(key as i64);
            let ty = host.raw_get(-2);
            host.replace(-2);

            Some(ty)
        }
        Seg::IndexStr { key } => {
            if eval(host, inner)? != Type::Table {
                host.pop(1);
                return None;
            }

            host.push_str(key);
            let ty = host.raw_get(-2);
            host.replace(-2);

            Some(ty)
        }
        Seg::IndexKey { slot } | Seg::IndexVal { slot } => {
            if eval(host, inner)? != Type::Table {
                host.pop(1);
                return None;
            }
            if slot < 0 {
                host.pop(1);
                return None;
            }

            let ok = match seg {
                Seg::IndexKey { .. } => walk::get_k(host, -1, slot as usize),
                _ => walk::get_v(host, -1, slot as usize),
            };
            if !ok {
                host.pop(1);
                return None;
            }

            host.remove(-2);
            host.type_of(-1)
        }
        Seg::Upvalue { index } => {
            if eval(host, inner)? != Type::Function {
                // only functions carry upvalues
                host.pop(1);
                return None;
            }
            if index <= 0 {
                host.pop(1);
                return None;
            }

            match host.get_upvalue(-1, index as usize) {
                Some(_) => {
                    host.replace(-2);
                    host.type_of(-1)
                }
                None => {
                    host.pop(1);
                    None
                }
            }
        }
        Seg::Global => {
            host.push_globals();
            Some(Type::Table)
        }
        Seg::Registry => {
            host.push_registry();
            Some(Type::Table)
        }
        Seg::Metatable { type_code } => {
            if path::is_aggregate(type_code) {
                let t = eval(host, inner)?;
                if t != Type::Table && t != Type::Userdata {
                    host.pop(1);
                    return None;
                }
            } else {
                // A fresh synthetic value stands in for the whole primitive
                // type; its metatable is the type's metatable.
                match type_code {
                    path::T_NIL => host.push_nil(),
                    path::T_BOOL => host.push_bool(false),
                    path::T_NUMBER => host.push_int(0),
                    path::T_STR => host.push_str(""),
                    path::T_LIGHTPTR => host.push_light_ptr(0),
                    _ => return None,
                }
            }

            if host.get_metatable(-1) {
                host.replace(-2);
                Some(Type::Table)
            } else {
                host.pop(1);
                host.push_nil();
                Some(Type::Nil)
            }
        }
        Seg::Uservalue { index } => {
            if eval(host, inner)? != Type::Userdata {
                host.pop(1);
                return None;
            }
            if index <= 0 {
                host.pop(1);
                return None;
            }

            match host.get_uservalue(-1, index as usize) {
                Some(ty) => {
                    host.replace(-2);
                    Some(ty)
                }
                None => {
                    host.pop(1);
                    None
                }
            }
        }
        Seg::Stack { index } => {
            host.push_value(index);
            host.type_of(-1)
        }
    }
}
