use std::cell::{Ref, RefCell, RefMut};
use std::fmt::Debug;
use std::rc::Rc;

use crate::table::TableRef;
use crate::value::Value;

/// Full userdata: a raw byte payload plus user-value slots.
///
/// The payload is the memory `udread`/`udwrite` address; user values are the
/// host-attached slots reachable by index.
pub struct Userdata {
    data: Vec<u8>,
    uservalues: Vec<Value>,
    metatable: Option<TableRef>,
}

impl Userdata {
    pub fn new(size: usize, nuvalue: usize) -> Self {
        Userdata {
            data: vec![0; size],
            uservalues: vec![Value::Nil; nuvalue],
            metatable: None,
        }
    }

    pub fn from_bytes(data: Vec<u8>, nuvalue: usize) -> Self {
        Userdata {
            data,
            uservalues: vec![Value::Nil; nuvalue],
            metatable: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// User value at 1-based `slot`, or `None` past the allocated slots.
    pub fn uservalue(&self, slot: usize) -> Option<Value> {
        if slot == 0 {
            return None;
        }

        self.uservalues.get(slot - 1).cloned()
    }

    pub fn set_uservalue(&mut self, slot: usize, value: Value) -> bool {
        if slot == 0 {
            return false;
        }

        match self.uservalues.get_mut(slot - 1) {
            Some(place) => {
                *place = value;
                true
            }
            None => false,
        }
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt;
    }
}

impl Debug for Userdata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Userdata")
            .field("len", &self.data.len())
            .field("uservalues", &self.uservalues)
            .finish()
    }
}

/// Shared handle to full userdata.
#[derive(Clone)]
pub struct UdRef(Rc<RefCell<Userdata>>);

impl UdRef {
    pub fn new(ud: Userdata) -> Self {
        UdRef(Rc::new(RefCell::new(ud)))
    }

    pub fn borrow(&self) -> Ref<'_, Userdata> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Userdata> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_ptr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Debug for UdRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdRef({:#x})", self.as_ptr())
    }
}
