use std::rc::Rc;

use crate::error::Error;
use crate::func::Callable;
use crate::proto::Proto;
use crate::table::TableRef;
use crate::thread::ThreadRef;
use crate::userdata::{UdRef, Userdata};
use crate::value::{LuaStr, Type, Value};

/// Hard ceiling on stack growth; `check_stack` reports against it.
pub const MAX_STACK: usize = 1_000_000;

/// Chunk loader hook: bytes + chunk name to a prototype.
///
/// Source compilation is the embedding's business; without an installed
/// loader, `load_buffer` fails cleanly.
pub type Loader = Box<dyn Fn(&[u8], &str) -> Result<Rc<Proto>, String>>;

/// Native-pointer symbolization hook.
pub type Symbolizer = Box<dyn Fn(usize) -> Option<String>>;

/// An activation record.
///
/// `base` is the stack position of the function value; for a Lua frame the
/// registers occupy `base + 1 ..= base + nregs`.
pub(crate) struct Frame {
    pub(crate) callable: Callable,
    pub(crate) base: usize,
    pub(crate) ip: usize,
    pub(crate) nregs: usize,
    pub(crate) varargs: Vec<Value>,
    pub(crate) name: Option<(LuaStr, &'static str)>,
}

/// A runtime handle: one value stack, one frame chain, registry and globals.
///
/// The API mirrors the stack-based C interface of the host contract:
/// 1-based absolute indices, negative indices counted from the top.
/// Arguments to the few operations that consume stack values (`raw_get`,
/// `raw_set`, metatable and user-value writes) are popped exactly as their
/// C counterparts pop them, so stack-delta reasoning carries over.
pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    registry: TableRef,
    globals: TableRef,
    main: ThreadRef,
    prim_meta: [Option<TableRef>; 7],
    loader: Option<Loader>,
    symbolizer: Option<Symbolizer>,
    pub(crate) pending_name: Option<(LuaStr, &'static str)>,
    mem: usize,
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            registry: TableRef::new(),
            globals: TableRef::new(),
            main: ThreadRef::default(),
            prim_meta: Default::default(),
            loader: None,
            symbolizer: None,
            pending_name: None,
            mem: 256,
        }
    }

    /// Resolve an index to a stack position.
    fn abs(&self, idx: i32) -> Option<usize> {
        let len = self.stack.len();

        if idx > 0 {
            let i = idx as usize;
            (i <= len).then(|| i - 1)
        } else if idx < 0 {
            let off = idx.unsigned_abs() as usize;
            (off <= len).then(|| len - off)
        } else {
            None
        }
    }

    pub fn top(&self) -> usize {
        self.stack.len()
    }

    pub fn set_top(&mut self, n: usize) {
        self.stack.resize(n, Value::Nil);
    }

    pub fn check_stack(&self, extra: usize) -> bool {
        self.stack.len() + extra <= MAX_STACK
    }

    pub fn push(&mut self, value: Value) {
        debug_assert!(self.stack.len() < MAX_STACK);
        self.stack.push(value);
    }

    pub fn push_nil(&mut self) {
        self.push(Value::Nil);
    }

    pub fn push_bool(&mut self, v: bool) {
        self.push(Value::Bool(v));
    }

    pub fn push_int(&mut self, v: i64) {
        self.push(Value::Int(v));
    }

    pub fn push_float(&mut self, v: f64) {
        self.push(Value::Float(v));
    }

    pub fn push_str(&mut self, v: impl Into<LuaStr>) {
        let s = v.into();
        self.mem += s.len();
        self.push(Value::Str(s));
    }

    pub fn push_light_ptr(&mut self, p: usize) {
        self.push(Value::LightPtr(p));
    }

    pub fn push_table(&mut self, t: TableRef) {
        self.push(Value::Table(t));
    }

    pub fn push_callable(&mut self, c: Callable) {
        self.push(Value::Function(c));
    }

    pub fn push_userdata(&mut self, u: UdRef) {
        self.push(Value::Userdata(u));
    }

    pub fn push_thread(&mut self, t: ThreadRef) {
        self.push(Value::Thread(t));
    }

    /// Push a copy of the value at `idx`.
    pub fn push_value(&mut self, idx: i32) {
        let v = self.get(idx).unwrap_or_default();
        self.push(v);
    }

    pub fn pop(&mut self, n: usize) {
        let len = self.stack.len().saturating_sub(n);
        self.stack.truncate(len);
    }

    /// Move the top value into position `idx`, shifting values up.
    pub fn insert(&mut self, idx: i32) {
        let Some(i) = self.abs(idx) else { return };
        let Some(v) = self.stack.pop() else { return };
        self.stack.insert(i, v);
    }

    /// Pop the top value into position `idx`.
    pub fn replace(&mut self, idx: i32) {
        let Some(i) = self.abs(idx) else { return };
        let Some(v) = self.stack.pop() else { return };

        if i < self.stack.len() {
            self.stack[i] = v;
        } else {
            self.stack.push(v);
        }
    }

    pub fn remove(&mut self, idx: i32) {
        if let Some(i) = self.abs(idx) {
            self.stack.remove(i);
        }
    }

    pub fn get(&self, idx: i32) -> Option<Value> {
        let i = self.abs(idx)?;
        self.stack.get(i).cloned()
    }

    pub fn type_of(&self, idx: i32) -> Option<Type> {
        self.get(idx).map(|v| v.type_of())
    }

    pub fn is_integer(&self, idx: i32) -> bool {
        matches!(self.get(idx), Some(Value::Int(_)))
    }

    pub fn is_native(&self, idx: i32) -> bool {
        matches!(self.get(idx), Some(Value::Function(c)) if c.is_native())
    }

    pub fn to_bool(&self, idx: i32) -> bool {
        !matches!(self.get(idx), None | Some(Value::Nil) | Some(Value::Bool(false)))
    }

    pub fn to_int(&self, idx: i32) -> Option<i64> {
        match self.get(idx)? {
            Value::Int(i) => Some(i),
            Value::Float(f) if f.fract() == 0.0 => Some(f as i64),
            _ => None,
        }
    }

    pub fn to_float(&self, idx: i32) -> Option<f64> {
        match self.get(idx)? {
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn to_str(&self, idx: i32) -> Option<LuaStr> {
        match self.get(idx)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_light_ptr(&self, idx: i32) -> Option<usize> {
        match self.get(idx)? {
            Value::LightPtr(p) => Some(p),
            _ => None,
        }
    }

    pub fn to_table(&self, idx: i32) -> Option<TableRef> {
        match self.get(idx)? {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn to_callable(&self, idx: i32) -> Option<Callable> {
        match self.get(idx)? {
            Value::Function(c) => Some(c),
            _ => None,
        }
    }

    pub fn to_userdata(&self, idx: i32) -> Option<UdRef> {
        match self.get(idx)? {
            Value::Userdata(u) => Some(u),
            _ => None,
        }
    }

    pub fn to_thread(&self, idx: i32) -> Option<ThreadRef> {
        match self.get(idx)? {
            Value::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn to_pointer(&self, idx: i32) -> Option<usize> {
        self.get(idx)?.address()
    }

    /// Raw table read: pops the key, pushes `t[key]`, reports its type.
    pub fn raw_get(&mut self, idx: i32) -> Type {
        let table = self.to_table(idx);
        let key = self.stack.pop().unwrap_or_default();

        let v = match table {
            Some(t) => t.borrow().raw_get(&key),
            None => Value::Nil,
        };
        let ty = v.type_of();
        self.push(v);

        ty
    }

    /// Raw table write: pops the value, then the key.
    pub fn raw_set(&mut self, idx: i32) -> Result<(), Error> {
        let table = self.to_table(idx).ok_or(Error::NotATable);
        let value = self.stack.pop().unwrap_or_default();
        let key = self.stack.pop().unwrap_or_default();

        table?.borrow_mut().raw_set(key, value)
    }

    pub fn raw_len(&self, idx: i32) -> usize {
        match self.get(idx) {
            Some(Value::Table(t)) => t.borrow().raw_len(),
            Some(Value::Str(s)) => s.len(),
            Some(Value::Userdata(u)) => u.borrow().len(),
            _ => 0,
        }
    }

    pub fn new_table(&mut self) -> TableRef {
        let t = TableRef::new();
        self.mem += 64;
        self.push_table(t.clone());

        t
    }

    pub fn new_userdata(&mut self, size: usize, nuvalue: usize) -> UdRef {
        let u = UdRef::new(Userdata::new(size, nuvalue));
        self.mem += 40 + size;
        self.push_userdata(u.clone());

        u
    }

    pub fn new_userdata_from(&mut self, bytes: Vec<u8>, nuvalue: usize) -> UdRef {
        self.mem += 40 + bytes.len();
        let u = UdRef::new(Userdata::from_bytes(bytes, nuvalue));
        self.push_userdata(u.clone());

        u
    }

    fn prim_slot(ty: Type) -> usize {
        match ty {
            Type::Nil => 0,
            Type::Bool => 1,
            Type::Int | Type::Float => 2,
            Type::Str => 3,
            Type::LightPtr => 4,
            Type::Function => 5,
            Type::Thread => 6,
            Type::Table | Type::Userdata => unreachable!("aggregates carry their own metatable"),
        }
    }

    /// Push the metatable of the value at `idx`, if it has one.
    pub fn get_metatable(&mut self, idx: i32) -> bool {
        let Some(v) = self.get(idx) else { return false };

        let mt = match &v {
            Value::Table(t) => t.borrow().metatable(),
            Value::Userdata(u) => u.borrow().metatable(),
            other => self.prim_meta[Self::prim_slot(other.type_of())].clone(),
        };

        match mt {
            Some(mt) => {
                self.push_table(mt);
                true
            }
            None => false,
        }
    }

    /// Pop the top value (nil or a table) and install it as the metatable of
    /// the value at `idx`.
    pub fn set_metatable(&mut self, idx: i32) -> Result<(), Error> {
        let target = self.get(idx);
        let mt = match self.stack.pop() {
            Some(Value::Nil) | None => None,
            Some(Value::Table(t)) => Some(t),
            Some(other) => {
                self.push(other);
                return Err(Error::BadMetatable);
            }
        };

        match target {
            Some(Value::Table(t)) => t.borrow_mut().set_metatable(mt),
            Some(Value::Userdata(u)) => u.borrow_mut().set_metatable(mt),
            Some(other) => self.prim_meta[Self::prim_slot(other.type_of())] = mt,
            None => return Err(Error::BadMetatable),
        }

        Ok(())
    }

    /// Push user value `slot` of the userdata at `idx`; `None` when the value
    /// is not userdata or the slot does not exist.
    pub fn get_uservalue(&mut self, idx: i32, slot: usize) -> Option<Type> {
        let u = self.to_userdata(idx)?;
        let v = u.borrow().uservalue(slot)?;
        let ty = v.type_of();
        self.push(v);

        Some(ty)
    }

    /// Pop the top value into user value `slot` of the userdata at `idx`.
    pub fn set_uservalue(&mut self, idx: i32, slot: usize) -> bool {
        let Some(u) = self.to_userdata(idx) else {
            self.pop(1);
            return false;
        };

        let value = self.stack.pop().unwrap_or_default();
        let result = u.borrow_mut().set_uservalue(slot, value);
        result
    }

    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    pub fn registry(&self) -> TableRef {
        self.registry.clone()
    }

    pub fn push_globals(&mut self) {
        let t = self.globals.clone();
        self.push_table(t);
    }

    pub fn push_registry(&mut self) {
        let t = self.registry.clone();
        self.push_table(t);
    }

    /// Convenience raw write into the globals table.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals
            .borrow_mut()
            .raw_set(name.into(), value)
            .expect("string keys are always valid");
    }

    /// Handle identifying the running thread.
    pub fn current_thread(&self) -> ThreadRef {
        self.main.clone()
    }

    pub fn set_loader(&mut self, loader: impl Fn(&[u8], &str) -> Result<Rc<Proto>, String> + 'static) {
        self.loader = Some(Box::new(loader));
    }

    /// Load a chunk through the installed loader.
    ///
    /// Pushes the resulting function and returns `true`, or pushes the error
    /// message and returns `false`.
    pub fn load_buffer(&mut self, chunk: &[u8], name: &str) -> bool {
        let r = match &self.loader {
            Some(loader) => loader(chunk, name),
            None => Err(Error::NoLoader.to_string()),
        };

        match r {
            Ok(proto) => {
                self.mem += 128;
                self.push_callable(Callable::from_proto(proto));
                true
            }
            Err(msg) => {
                self.push_str(msg);
                false
            }
        }
    }

    pub fn set_symbolizer(&mut self, f: impl Fn(usize) -> Option<String> + 'static) {
        self.symbolizer = Some(Box::new(f));
    }

    pub fn symbolize(&self, addr: usize) -> Option<String> {
        self.symbolizer.as_ref()?(addr)
    }

    /// Memory estimate, split the way `lua_gc` reports it: whole kilobytes
    /// and the remainder in bytes.
    pub fn gc_count(&self) -> (usize, usize) {
        (self.mem >> 10, self.mem & 0x3ff)
    }

    pub(crate) fn note_allocation(&mut self, bytes: usize) {
        self.mem += bytes;
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_top() {
        let mut vm = Vm::new();
        vm.push_int(1);
        vm.push_int(2);
        vm.push_int(3);

        assert_eq!(vm.to_int(-1), Some(3));
        assert_eq!(vm.to_int(-3), Some(1));
        assert_eq!(vm.to_int(1), Some(1));
        assert_eq!(vm.to_int(4), None);
        assert_eq!(vm.to_int(-4), None);
    }

    #[test]
    fn insert_and_replace() {
        let mut vm = Vm::new();
        vm.push_int(1);
        vm.push_int(2);
        vm.push_int(3);

        // 1 2 3 -> 3 1 2
        vm.insert(1);
        assert_eq!(vm.to_int(1), Some(3));
        assert_eq!(vm.to_int(3), Some(2));

        // 3 1 2 -> 2 1
        vm.replace(1);
        assert_eq!(vm.top(), 2);
        assert_eq!(vm.to_int(1), Some(2));
        assert_eq!(vm.to_int(2), Some(1));
    }

    #[test]
    fn raw_get_pops_key_and_pushes_value() {
        let mut vm = Vm::new();
        let t = vm.new_table();
        t.borrow_mut()
            .raw_set("pi".into(), Value::Float(3.25))
            .unwrap();

        vm.push_str("pi");
        let ty = vm.raw_get(-2);

        assert_eq!(ty, Type::Float);
        assert_eq!(vm.top(), 2);
        assert_eq!(vm.to_float(-1), Some(3.25));
    }

    #[test]
    fn primitive_metatables() {
        let mut vm = Vm::new();
        vm.push_str("abc");
        assert!(!vm.get_metatable(-1));

        let mt = TableRef::new();
        vm.push_table(mt.clone());
        vm.set_metatable(-2).unwrap();

        assert!(vm.get_metatable(-1));
        assert!(vm.to_table(-1).unwrap().ptr_eq(&mt));
    }

    #[test]
    fn uservalue_slots() {
        let mut vm = Vm::new();
        vm.new_userdata(4, 2);

        vm.push_int(7);
        assert!(vm.set_uservalue(-2, 1));

        assert_eq!(vm.get_uservalue(-1, 1), Some(Type::Int));
        assert_eq!(vm.to_int(-1), Some(7));
        vm.pop(1);

        assert_eq!(vm.get_uservalue(-1, 3), None);
    }
}
