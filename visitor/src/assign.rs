//! Path assignment: store the host's top value into the slot a blob denotes.

use vm::{Type, Vm};

use crate::eval::eval;
use crate::path::{self, Seg};
use crate::walk;

/// Store the value on top of the host stack into the slot `blob` denotes.
///
/// The incoming value is always consumed: whatever happens, the host stack
/// ends at `top - 1`. Roots (`GLOBAL`, `REGISTRY`, frame functions, raw
/// stack positions), raw hash keys and primitive-type metatables refuse the
/// write.
pub fn assign(host: &mut Vm, blob: &[u8]) -> bool {
    let top = host.top();
    debug_assert!(top > 0, "assignment needs a value on the host stack");

    let ok = assign_value(host, blob);
    if !ok {
        host.set_top(top.saturating_sub(1));
    }
    debug_assert_eq!(host.top(), top.saturating_sub(1));

    ok
}

fn assign_value(host: &mut Vm, blob: &[u8]) -> bool {
    let Ok((seg, inner)) = path::read(blob) else {
        return false;
    };

    match seg {
        Seg::FrameLocal { frame, slot } => host.set_local(frame as usize, slot).is_some(),

        // Not assignable places.
        Seg::Global | Seg::Registry | Seg::FrameFunc { .. } | Seg::Stack { .. } => false,
        Seg::IndexKey { .. } => false,

        Seg::IndexInt { key } => {
            let Some(t) = eval(host, inner) else {
                return false;
            };
            if t != Type::Table {
                // only a table can be indexed
                return false;
            }

            // value table -> value table key value
            host.push_int(key as i64);
            host.push_value(-3);
            if host.raw_set(-3).is_err() {
                return false;
            }
            host.pop(2);

            true
        }
        Seg::IndexStr { key } => {
            let Some(t) = eval(host, inner) else {
                return false;
            };
            if t != Type::Table {
                return false;
            }

            host.push_str(key);
            host.push_value(-3);
            if host.raw_set(-3).is_err() {
                return false;
            }
            host.pop(2);

            true
        }
        Seg::IndexVal { slot } => {
            let Some(t) = eval(host, inner) else {
                return false;
            };
            if t != Type::Table || slot < 0 {
                return false;
            }

            // value table -> table value
            host.insert(-2);
            if !walk::set_v(host, -2, slot as usize) {
                return false;
            }
            host.pop(1);

            true
        }
        Seg::Upvalue { index } => {
            let Some(t) = eval(host, inner) else {
                return false;
            };
            if t != Type::Function || index <= 0 {
                return false;
            }

            // value func -> func value
            host.insert(-2);
            if host.set_upvalue(-2, index as usize).is_none() {
                return false;
            }
            host.pop(1);

            true
        }
        Seg::Uservalue { index } => {
            let Some(t) = eval(host, inner) else {
                return false;
            };
            if t != Type::Userdata || index <= 0 {
                return false;
            }

            host.insert(-2);
            if !host.set_uservalue(-2, index as usize) {
                return false;
            }
            host.pop(1);

            true
        }
        Seg::Metatable { type_code } => {
            if path::is_aggregate(type_code) {
                let Some(t) = eval(host, inner) else {
                    return false;
                };
                if t != Type::Table && t != Type::Userdata {
                    return false;
                }
            } else {
                // Metatables of whole primitive types are not assignable
                // through a reference.
                return false;
            }

            // value target -> target value
            host.insert(-2);
            let vt = host.type_of(-1);
            if vt != Some(Type::Nil) && vt != Some(Type::Table) {
                return false;
            }
            if host.set_metatable(-2).is_err() {
                return false;
            }
            host.pop(1);

            true
        }
    }
}
