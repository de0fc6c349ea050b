//! Reference blobs: packed path descriptors into host values.
//!
//! A reference is a cons-list of segments laid out from the outermost child
//! to the root:
//!
//! ```text
//! [ seg0 | seg1 | ... | root ]
//! ```
//!
//! Each segment is a fixed 8-byte record — a kind byte, three bytes of
//! padding, and a 4-byte payload — except `INDEX_STR`, whose record is
//! followed by the key bytes and only then by the inner blob. The layout is
//! bit-stable so a sibling reference is built by prepending one record to a
//! copy of an existing blob.
//!
//! Blobs travel as raw userdata payloads on the debugger runtime; nothing in
//! a blob points at host memory.

use thiserror::Error;

use vm::Type;

const KIND_FRAME_LOCAL: u8 = 0;
const KIND_FRAME_FUNC: u8 = 1;
const KIND_UPVALUE: u8 = 2;
const KIND_GLOBAL: u8 = 3;
const KIND_REGISTRY: u8 = 4;
const KIND_METATABLE: u8 = 5;
const KIND_USERVALUE: u8 = 6;
const KIND_STACK: u8 = 7;
const KIND_INDEX_KEY: u8 = 8;
const KIND_INDEX_VAL: u8 = 9;
const KIND_INDEX_INT: u8 = 10;
const KIND_INDEX_STR: u8 = 11;

const RECORD: usize = 8;

/// Numeric host-type codes carried by `METATABLE` segments.
pub const T_NIL: i32 = 0;
pub const T_BOOL: i32 = 1;
pub const T_LIGHTPTR: i32 = 2;
pub const T_NUMBER: i32 = 3;
pub const T_STR: i32 = 4;
pub const T_TABLE: i32 = 5;
pub const T_FUNCTION: i32 = 6;
pub const T_USERDATA: i32 = 7;
pub const T_THREAD: i32 = 8;

pub fn type_code(ty: Type) -> i32 {
    match ty {
        Type::Nil => T_NIL,
        Type::Bool => T_BOOL,
        Type::LightPtr => T_LIGHTPTR,
        Type::Int | Type::Float => T_NUMBER,
        Type::Str => T_STR,
        Type::Table => T_TABLE,
        Type::Function => T_FUNCTION,
        Type::Userdata => T_USERDATA,
        Type::Thread => T_THREAD,
    }
}

/// Only tables and full userdata carry their own metatable; a `METATABLE`
/// segment over any other code is a root.
pub fn is_aggregate(code: i32) -> bool {
    code == T_TABLE || code == T_USERDATA
}

#[derive(Debug, Error)]
#[error("malformed reference blob")]
pub struct MalformedBlob;

/// One decoded segment. String keys borrow from the blob.
#[derive(Debug, PartialEq, Eq)]
pub enum Seg<'a> {
    FrameLocal { frame: u16, slot: i16 },
    FrameFunc { frame: i32 },
    Upvalue { index: i32 },
    Global,
    Registry,
    Metatable { type_code: i32 },
    Uservalue { index: i32 },
    Stack { index: i32 },
    IndexKey { slot: i32 },
    IndexVal { slot: i32 },
    IndexInt { key: i32 },
    IndexStr { key: &'a [u8] },
}

impl Seg<'_> {
    /// Whether this segment must be followed by an inner sub-blob.
    pub fn has_inner(&self) -> bool {
        match self {
            Seg::Upvalue { .. }
            | Seg::Uservalue { .. }
            | Seg::IndexKey { .. }
            | Seg::IndexVal { .. }
            | Seg::IndexInt { .. }
            | Seg::IndexStr { .. } => true,
            Seg::Metatable { type_code } => is_aggregate(*type_code),
            _ => false,
        }
    }
}

fn payload(blob: &[u8]) -> i32 {
    i32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]])
}

/// Decode the leading segment; the remainder is the inner blob (empty for
/// roots).
pub fn read(blob: &[u8]) -> Result<(Seg<'_>, &[u8]), MalformedBlob> {
    if blob.len() < RECORD {
        return Err(MalformedBlob);
    }

    let rest = &blob[RECORD..];
    let seg = match blob[0] {
        KIND_FRAME_LOCAL => Seg::FrameLocal {
            frame: u16::from_le_bytes([blob[4], blob[5]]),
            slot: i16::from_le_bytes([blob[6], blob[7]]),
        },
        KIND_FRAME_FUNC => Seg::FrameFunc {
            frame: payload(blob),
        },
        KIND_UPVALUE => Seg::Upvalue {
            index: payload(blob),
        },
        KIND_GLOBAL => Seg::Global,
        KIND_REGISTRY => Seg::Registry,
        KIND_METATABLE => Seg::Metatable {
            type_code: payload(blob),
        },
        KIND_USERVALUE => Seg::Uservalue {
            index: payload(blob),
        },
        KIND_STACK => Seg::Stack {
            index: payload(blob),
        },
        KIND_INDEX_KEY => Seg::IndexKey {
            slot: payload(blob),
        },
        KIND_INDEX_VAL => Seg::IndexVal {
            slot: payload(blob),
        },
        KIND_INDEX_INT => Seg::IndexInt {
            key: payload(blob),
        },
        KIND_INDEX_STR => {
            let len = payload(blob);
            if len < 0 || rest.len() < len as usize {
                return Err(MalformedBlob);
            }
            let (key, rest) = rest.split_at(len as usize);
            return Ok((Seg::IndexStr { key }, rest));
        }
        _ => return Err(MalformedBlob),
    };

    Ok((seg, rest))
}

/// Walk a blob to its root, checking the terminator invariants. The blob's
/// size is recovered as a side effect: a well-formed blob has no trailing
/// bytes after its root segment.
pub fn validate(blob: &[u8]) -> Result<(), MalformedBlob> {
    let mut rest = blob;

    loop {
        let (seg, inner) = read(rest)?;

        if !seg.has_inner() {
            return if inner.is_empty() {
                Ok(())
            } else {
                Err(MalformedBlob)
            };
        }
        if inner.is_empty() {
            return Err(MalformedBlob);
        }
        rest = inner;
    }
}

fn record(out: &mut Vec<u8>, kind: u8, payload: i32) {
    out.push(kind);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(&payload.to_le_bytes());
}

pub fn global() -> Vec<u8> {
    let mut r = Vec::with_capacity(RECORD);
    record(&mut r, KIND_GLOBAL, 0);
    r
}

pub fn registry() -> Vec<u8> {
    let mut r = Vec::with_capacity(RECORD);
    record(&mut r, KIND_REGISTRY, 0);
    r
}

pub fn frame_local(frame: u16, slot: i16) -> Vec<u8> {
    let mut r = Vec::with_capacity(RECORD);
    r.push(KIND_FRAME_LOCAL);
    r.extend_from_slice(&[0, 0, 0]);
    r.extend_from_slice(&frame.to_le_bytes());
    r.extend_from_slice(&slot.to_le_bytes());
    r
}

pub fn frame_func(frame: i32) -> Vec<u8> {
    let mut r = Vec::with_capacity(RECORD);
    record(&mut r, KIND_FRAME_FUNC, frame);
    r
}

/// Root for an absolute host-stack position. Internal plumbing; scripts
/// never observe these.
pub fn stack_slot(index: i32) -> Vec<u8> {
    let mut r = Vec::with_capacity(RECORD);
    record(&mut r, KIND_STACK, index);
    r
}

fn child(kind: u8, payload_: i32, inner: &[u8]) -> Vec<u8> {
    let mut r = Vec::with_capacity(RECORD + inner.len());
    record(&mut r, kind, payload_);
    r.extend_from_slice(inner);
    r
}

pub fn child_index(inner: &[u8], key: i32) -> Vec<u8> {
    child(KIND_INDEX_INT, key, inner)
}

pub fn child_field(inner: &[u8], name: &[u8]) -> Vec<u8> {
    let mut r = Vec::with_capacity(2 * RECORD + name.len() + inner.len());
    record(&mut r, KIND_INDEX_STR, name.len() as i32);
    r.extend_from_slice(name);
    r.extend_from_slice(inner);
    r
}

pub fn child_upvalue(inner: &[u8], index: i32) -> Vec<u8> {
    child(KIND_UPVALUE, index, inner)
}

pub fn child_uservalue(inner: &[u8], index: i32) -> Vec<u8> {
    child(KIND_USERVALUE, index, inner)
}

/// Metatable of an aggregate inner reference.
pub fn child_metatable(inner: &[u8], code: i32) -> Vec<u8> {
    debug_assert!(is_aggregate(code));
    child(KIND_METATABLE, code, inner)
}

/// Metatable of a fresh synthetic value of primitive type `code`; a root.
pub fn primitive_metatable(code: i32) -> Vec<u8> {
    debug_assert!(!is_aggregate(code));
    let mut r = Vec::with_capacity(RECORD);
    record(&mut r, KIND_METATABLE, code);
    r
}

pub fn child_key(inner: &[u8], slot: i32) -> Vec<u8> {
    child(KIND_INDEX_KEY, slot, inner)
}

pub fn child_value(inner: &[u8], slot: i32) -> Vec<u8> {
    child(KIND_INDEX_VAL, slot, inner)
}

/// The canonical anchor path: `registry[field][key]`.
pub fn registry_entry(field: &[u8], key: i32) -> Vec<u8> {
    child_index(&child_field(&registry(), field), key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_are_single_records() {
        for blob in [global(), registry(), frame_func(3), stack_slot(-1)] {
            assert_eq!(blob.len(), RECORD);
            validate(&blob).unwrap();
        }

        let blob = frame_local(7, -2);
        let (seg, rest) = read(&blob).unwrap();
        assert_eq!(seg, Seg::FrameLocal { frame: 7, slot: -2 });
        assert!(rest.is_empty());
    }

    #[test]
    fn nesting_prepends_records() {
        let blob = child_index(&child_field(&global(), b"math"), 1);
        validate(&blob).unwrap();

        let (seg, rest) = read(&blob).unwrap();
        assert_eq!(seg, Seg::IndexInt { key: 1 });

        let (seg, rest) = read(rest).unwrap();
        assert_eq!(seg, Seg::IndexStr { key: b"math" });

        let (seg, rest) = read(rest).unwrap();
        assert_eq!(seg, Seg::Global);
        assert!(rest.is_empty());
    }

    #[test]
    fn registry_entry_shape() {
        let blob = registry_entry(b"__debugger_ref", 5);
        validate(&blob).unwrap();

        let (seg, rest) = read(&blob).unwrap();
        assert_eq!(seg, Seg::IndexInt { key: 5 });
        let (seg, rest) = read(rest).unwrap();
        assert_eq!(
            seg,
            Seg::IndexStr {
                key: b"__debugger_ref"
            }
        );
        let (seg, _) = read(rest).unwrap();
        assert_eq!(seg, Seg::Registry);
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        assert!(validate(b"").is_err());
        assert!(validate(&[99, 0, 0, 0, 0, 0, 0, 0]).is_err());

        // A child segment with no inner blob.
        assert!(validate(&child_upvalue(b"", 1)).is_err());

        // Trailing garbage after the root.
        let mut blob = global();
        blob.push(0);
        assert!(validate(&blob).is_err());

        // String segment whose length exceeds the blob.
        let mut blob = Vec::new();
        record(&mut blob, KIND_INDEX_STR, 100);
        assert!(validate(&blob).is_err());
    }

    #[test]
    fn metatable_roots_and_children() {
        validate(&primitive_metatable(T_STR)).unwrap();
        assert!(validate(&child_metatable(&global(), T_TABLE)).is_ok());

        // An aggregate metatable segment demands an inner blob.
        let mut blob = Vec::new();
        record(&mut blob, KIND_METATABLE, T_TABLE);
        assert!(validate(&blob).is_err());
    }
}
