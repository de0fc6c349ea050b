use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use ordered_float::NotNan;

use crate::error::Error;
use crate::value::Value;

/// One slot of the hash part.
///
/// A node whose value is nil but whose key survives is a *dead* node: erasing
/// a key keeps the bucket around until the table is rebuilt, and the raw view
/// exposes it even though logical iteration skips it.
#[derive(Debug, Clone)]
pub struct Node {
    pub key: Value,
    pub value: Value,
}

/// Host table with its internal layout kept observable.
///
/// The layout mirrors what the raw-bucket walker expects from a real host:
///
/// * a dense array part for keys `1..=n`;
/// * a dedicated slot for key `0`;
/// * hash buckets in slot order, addressable independently of iteration.
///
/// Keys that cannot be looked up (NaN floats) can still occupy a bucket when
/// planted through [`Table::push_raw_node`]; `raw_get` and logical iteration
/// never see them.
#[derive(Default)]
pub struct Table {
    array: Vec<Value>,
    zero: Option<Value>,
    hash: Vec<Node>,
    index: HashMap<HashKey, usize>,
    metatable: Option<TableRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    Bool(bool),
    Int(i64),
    Float(NotNan<f64>),
    Str(crate::value::LuaStr),
    Ptr(usize),
    Obj(usize),
}

/// Normalize a value into a lookup key.
///
/// Integral floats collapse into integer keys; nil and NaN have no key.
fn hash_key(value: &Value) -> Result<HashKey, Error> {
    let r = match value {
        Value::Nil => return Err(Error::NilKey),
        Value::Bool(b) => HashKey::Bool(*b),
        Value::Int(i) => HashKey::Int(*i),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(Error::NanKey);
            }
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                HashKey::Int(*f as i64)
            } else {
                HashKey::Float(NotNan::new(*f).expect("NaN is rejected above"))
            }
        }
        Value::Str(s) => HashKey::Str(s.clone()),
        Value::LightPtr(p) => HashKey::Ptr(*p),
        other => HashKey::Obj(other.address().expect("aggregates always have an address")),
    };

    Ok(r)
}

impl Table {
    pub fn new() -> Self {
        Default::default()
    }

    /// Raw read, bypassing metamethods.
    pub fn raw_get(&self, key: &Value) -> Value {
        let Ok(key) = hash_key(key) else {
            return Value::Nil;
        };

        if let HashKey::Int(k) = key {
            if k == 0 {
                return self.zero.clone().unwrap_or_default();
            }
            if k >= 1 && (k as usize) <= self.array.len() {
                return self.array[k as usize - 1].clone();
            }
        }

        match self.index.get(&key) {
            Some(&slot) => self.hash[slot].value.clone(),
            None => Value::Nil,
        }
    }

    /// Raw write, bypassing metamethods.
    ///
    /// Erasing a hash key leaves a dead node behind; erasing an array slot
    /// leaves a hole. Either state remains visible to the raw bucket view.
    pub fn raw_set(&mut self, key: Value, value: Value) -> Result<(), Error> {
        let hkey = hash_key(&key)?;

        if let HashKey::Int(k) = hkey {
            if k == 0 {
                self.zero = (!value.is_nil()).then_some(value);
                return Ok(());
            }
            if k >= 1 && (k as usize) <= self.array.len() {
                self.array[k as usize - 1] = value;
                return Ok(());
            }
            if k >= 1 && k as usize == self.array.len() + 1 && !value.is_nil() {
                self.array.push(value);
                return Ok(());
            }
        }

        match self.index.get(&hkey) {
            Some(&slot) => {
                self.hash[slot].value = value;
            }
            None if value.is_nil() => (),
            None => {
                self.index.insert(hkey, self.hash.len());
                self.hash.push(Node { key, value });
            }
        }

        Ok(())
    }

    /// Border of the array part: `t[n]` is non-nil and `t[n+1]` is nil.
    pub fn raw_len(&self) -> usize {
        let mut n = self.array.len();
        while n > 0 && self.array[n - 1].is_nil() {
            n -= 1;
        }

        n
    }

    /// Plant a node without indexing it.
    ///
    /// This is the host-internal path by which un-addressable keys (NaN)
    /// end up in a table. The node is invisible to `raw_get` and logical
    /// iteration but fully visible to the raw bucket view.
    pub fn push_raw_node(&mut self, key: Value, value: Value) {
        self.hash.push(Node { key, value });
    }

    pub fn array_size(&self) -> usize {
        self.array.len()
    }

    pub fn hash_size(&self) -> usize {
        self.hash.len()
    }

    pub fn has_zero(&self) -> bool {
        self.zero.is_some()
    }

    /// Raw bucket read; index `hash_size` addresses the zero slot.
    pub fn bucket(&self, slot: usize) -> Option<(Value, Value)> {
        if slot == self.hash.len() {
            let v = self.zero.clone()?;
            return Some((Value::Int(0), v));
        }

        let node = self.hash.get(slot)?;
        Some((node.key.clone(), node.value.clone()))
    }

    pub fn bucket_key(&self, slot: usize) -> Option<Value> {
        self.bucket(slot).map(|(k, _)| k)
    }

    pub fn bucket_value(&self, slot: usize) -> Option<Value> {
        self.bucket(slot).map(|(_, v)| v)
    }

    /// Raw bucket write. Keys are never mutated through this path.
    pub fn set_bucket_value(&mut self, slot: usize, value: Value) -> bool {
        if slot == self.hash.len() {
            if self.zero.is_some() {
                self.zero = Some(value);
                return true;
            }
            return false;
        }

        match self.hash.get_mut(slot) {
            Some(node) => {
                node.value = value;
                true
            }
            None => false,
        }
    }

    /// Logical pairs, the way host iteration would produce them.
    ///
    /// Dead nodes and unindexed (NaN-keyed) nodes are skipped.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let mut r = Vec::new();

        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                r.push((Value::Int(i as i64 + 1), v.clone()));
            }
        }

        if let Some(v) = &self.zero {
            r.push((Value::Int(0), v.clone()));
        }

        for (slot, node) in self.hash.iter().enumerate() {
            if node.value.is_nil() {
                continue;
            }
            let reachable = hash_key(&node.key)
                .ok()
                .and_then(|k| self.index.get(&k))
                .is_some_and(|&s| s == slot);
            if reachable {
                r.push((node.key.clone(), node.value.clone()));
            }
        }

        r
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt;
    }
}

impl Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("array", &self.array)
            .field("zero", &self.zero)
            .field("hash", &self.hash)
            .finish()
    }
}

/// Shared handle to a table; identity is pointer identity.
#[derive(Clone)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    pub fn new() -> Self {
        TableRef(Rc::new(RefCell::new(Table::new())))
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_ptr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn downgrade(&self) -> std::rc::Weak<RefCell<Table>> {
        Rc::downgrade(&self.0)
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableRef({:#x})", self.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(t: &mut Table, k: impl Into<Value>, v: impl Into<Value>) {
        t.raw_set(k.into(), v.into()).unwrap();
    }

    #[test]
    fn array_and_hash_split() {
        let mut t = Table::new();
        set(&mut t, 1, "a");
        set(&mut t, 2, "b");
        set(&mut t, 10, "far");
        set(&mut t, "name", "x");

        assert_eq!(t.array_size(), 2);
        assert_eq!(t.hash_size(), 2);
        assert_eq!(t.raw_get(&Value::Int(10)), Value::from("far"));
        assert_eq!(t.raw_get(&Value::from("name")), Value::from("x"));
        assert_eq!(t.raw_len(), 2);
    }

    #[test]
    fn zero_slot() {
        let mut t = Table::new();
        assert!(!t.has_zero());

        set(&mut t, 0, "zero");
        assert!(t.has_zero());
        assert_eq!(t.raw_get(&Value::Int(0)), Value::from("zero"));

        // Bucket index hash_size addresses the zero slot.
        let (k, v) = t.bucket(t.hash_size()).unwrap();
        assert_eq!(k, Value::Int(0));
        assert_eq!(v, Value::from("zero"));

        set(&mut t, 0, Value::Nil);
        assert!(!t.has_zero());
    }

    #[test]
    fn dead_nodes_stay_in_buckets() {
        let mut t = Table::new();
        set(&mut t, "gone", 1);
        set(&mut t, "gone", Value::Nil);

        assert_eq!(t.raw_get(&Value::from("gone")), Value::Nil);
        assert!(t.entries().is_empty());

        let (k, v) = t.bucket(0).unwrap();
        assert_eq!(k, Value::from("gone"));
        assert!(v.is_nil());
    }

    #[test]
    fn nan_nodes_are_raw_only() {
        let mut t = Table::new();
        t.push_raw_node(Value::Float(f64::NAN), Value::from("nan"));

        assert_eq!(t.raw_get(&Value::Float(f64::NAN)), Value::Nil);
        assert!(t.entries().is_empty());

        let (k, v) = t.bucket(0).unwrap();
        assert!(matches!(k, Value::Float(f) if f.is_nan()));
        assert_eq!(v, Value::from("nan"));
    }

    #[test]
    fn integral_float_keys_collapse() {
        let mut t = Table::new();
        set(&mut t, 3, "three");
        assert_eq!(t.raw_get(&Value::Float(3.0)), Value::from("three"));
    }
}
