use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::error::Error;
use crate::func::{Callable, Closure as LuaClosure};
use crate::proto::{OpCode, UpvalSource};
use crate::value::{LuaStr, Value};
use crate::vm::{Frame, Vm};

impl Vm {
    /// Call the function below the top `nargs` values.
    pub fn call(&mut self, nargs: usize, nresults: usize) -> Result<(), Error> {
        self.call_value(nargs, Some(nresults))
    }

    /// Protected call.
    ///
    /// On success the results replace the function and its arguments. On
    /// failure the stack is restored to just below the function and the
    /// error message is pushed, so the net effect is always deterministic.
    /// `nresults == None` keeps every result.
    pub fn pcall(&mut self, nargs: usize, nresults: Option<usize>) -> bool {
        let func_pos = self.stack.len().saturating_sub(nargs + 1);
        let frames_depth = self.frames.len();

        match self.call_value(nargs, nresults) {
            Ok(()) => true,
            Err(e) => {
                self.frames.truncate(frames_depth);
                self.stack.truncate(func_pos);
                self.push_str(e.to_string());
                false
            }
        }
    }

    pub(crate) fn call_value(&mut self, nargs: usize, nresults: Option<usize>) -> Result<(), Error> {
        let func_pos = self
            .stack
            .len()
            .checked_sub(nargs + 1)
            .ok_or_else(|| Error::runtime("not enough values on the stack for a call"))?;
        let callee = match &self.stack[func_pos] {
            Value::Function(c) => c.clone(),
            _ => return Err(Error::NotCallable),
        };
        let name = self.pending_name.take();

        if !self.check_stack(16) {
            return Err(Error::StackOverflow);
        }

        match callee {
            Callable::Native(f) => {
                self.frames.push(Frame {
                    callable: Callable::Native(f.clone()),
                    base: func_pos,
                    ip: 0,
                    nregs: 0,
                    varargs: Vec::new(),
                    name,
                });

                let res = f(self);
                self.frames.pop();
                let nres = res?;

                let at = self.stack.len().saturating_sub(nres);
                let results = self.stack.split_off(at);
                self.stack.truncate(func_pos);
                self.finish_call(results, nresults);
            }
            Callable::Lua(cl) => {
                let proto = cl.proto.clone();
                let nparams = proto.nparams as usize;

                let mut args = self.stack.split_off(func_pos + 1);
                let varargs = if proto.is_vararg && args.len() > nparams {
                    args.split_off(nparams)
                } else {
                    Vec::new()
                };
                args.resize(proto.nregs as usize, Value::Nil);
                self.stack.extend(args);

                self.frames.push(Frame {
                    callable: Callable::Lua(cl),
                    base: func_pos,
                    ip: 0,
                    nregs: proto.nregs as usize,
                    varargs,
                    name,
                });

                let res = self.run_frame();
                self.frames.pop();
                let results = res?;

                self.stack.truncate(func_pos);
                self.finish_call(results, nresults);
            }
        }

        Ok(())
    }

    fn finish_call(&mut self, mut results: Vec<Value>, nresults: Option<usize>) {
        if let Some(n) = nresults {
            results.resize(n, Value::Nil);
        }

        self.stack.extend(results);
    }

    /// Execute the innermost frame until it returns.
    fn run_frame(&mut self) -> Result<Vec<Value>, Error> {
        use OpCode::*;

        // Name attribution for 'n' debug info: remembered from the global
        // fetch that produced the callee, consumed by the next Call.
        let mut last_global: Option<LuaStr> = None;

        loop {
            let (cl, base, op) = {
                let frame = self
                    .frames
                    .last_mut()
                    .expect("run_frame requires an active frame");
                let Callable::Lua(cl) = frame.callable.clone() else {
                    unreachable!("run_frame only executes Lua frames")
                };
                let Some(op) = cl.proto.code.get(frame.ip).copied() else {
                    // falling off the end returns nothing
                    return Ok(Vec::new());
                };
                frame.ip += 1;
                (cl, frame.base, op)
            };

            trace!(?op, "step");

            let fetched_global = last_global.take();

            match op {
                Const(i) => {
                    let v = cl
                        .proto
                        .consts
                        .get(i as usize)
                        .cloned()
                        .ok_or_else(|| Error::runtime("constant index out of range"))?;
                    self.push(v);
                }
                Nil => self.push_nil(),
                True => self.push_bool(true),
                False => self.push_bool(false),
                GetLocal(i) => {
                    let v = self
                        .stack
                        .get(base + 1 + i as usize)
                        .cloned()
                        .ok_or_else(|| Error::runtime("register out of range"))?;
                    self.push(v);
                }
                SetLocal(i) => {
                    let v = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::runtime("empty stack on SetLocal"))?;
                    let slot = base + 1 + i as usize;
                    if slot >= self.stack.len() {
                        return Err(Error::runtime("register out of range"));
                    }
                    self.stack[slot] = v;
                }
                GetUpval(i) => {
                    let cell = cl
                        .upvalues
                        .get(i as usize)
                        .ok_or_else(|| Error::runtime("upvalue index out of range"))?;
                    let v = cell.borrow().clone();
                    self.push(v);
                }
                SetUpval(i) => {
                    let v = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::runtime("empty stack on SetUpval"))?;
                    let cell = cl
                        .upvalues
                        .get(i as usize)
                        .ok_or_else(|| Error::runtime("upvalue index out of range"))?;
                    *cell.borrow_mut() = v;
                }
                GetGlobal(ci) => {
                    let key = cl
                        .proto
                        .consts
                        .get(ci as usize)
                        .cloned()
                        .ok_or_else(|| Error::runtime("constant index out of range"))?;
                    let v = self.globals().borrow().raw_get(&key);
                    self.push(v);
                    if let Value::Str(name) = key {
                        last_global = Some(name);
                    }
                }
                SetGlobal(ci) => {
                    let key = cl
                        .proto
                        .consts
                        .get(ci as usize)
                        .cloned()
                        .ok_or_else(|| Error::runtime("constant index out of range"))?;
                    let v = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::runtime("empty stack on SetGlobal"))?;
                    self.globals().borrow_mut().raw_set(key, v)?;
                }
                NewTable => {
                    self.new_table();
                }
                GetField(ci) => {
                    let key = cl.proto.consts[ci as usize].clone();
                    let t = match self.stack.pop() {
                        Some(Value::Table(t)) => t,
                        _ => return Err(Error::NotATable),
                    };
                    let v = t.borrow().raw_get(&key);
                    self.push(v);
                }
                SetField(ci) => {
                    let key = cl.proto.consts[ci as usize].clone();
                    let v = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::runtime("empty stack on SetField"))?;
                    let t = match self.stack.last() {
                        Some(Value::Table(t)) => t.clone(),
                        _ => return Err(Error::NotATable),
                    };
                    t.borrow_mut().raw_set(key, v)?;
                }
                RawSet => {
                    let v = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::runtime("empty stack on RawSet"))?;
                    let k = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::runtime("empty stack on RawSet"))?;
                    let t = match self.stack.last() {
                        Some(Value::Table(t)) => t.clone(),
                        _ => return Err(Error::NotATable),
                    };
                    t.borrow_mut().raw_set(k, v)?;
                }
                Add => {
                    let rhs = self.stack.pop();
                    let lhs = self.stack.pop();
                    let r = match (lhs, rhs) {
                        (Some(Value::Int(a)), Some(Value::Int(b))) => Value::Int(a.wrapping_add(b)),
                        (Some(Value::Int(a)), Some(Value::Float(b))) => Value::Float(a as f64 + b),
                        (Some(Value::Float(a)), Some(Value::Int(b))) => Value::Float(a + b as f64),
                        (Some(Value::Float(a)), Some(Value::Float(b))) => Value::Float(a + b),
                        _ => return Err(Error::runtime("attempt to add non-number values")),
                    };
                    self.push(r);
                }
                Closure(pi) => {
                    let proto = cl
                        .proto
                        .protos
                        .get(pi as usize)
                        .cloned()
                        .ok_or_else(|| Error::runtime("prototype index out of range"))?;

                    let mut upvalues = Vec::with_capacity(proto.upvals.len());
                    for desc in &proto.upvals {
                        let cell = match desc.source {
                            UpvalSource::Local(slot) => {
                                let v = self
                                    .stack
                                    .get(base + 1 + slot as usize)
                                    .cloned()
                                    .ok_or_else(|| Error::runtime("captured register out of range"))?;
                                Rc::new(RefCell::new(v))
                            }
                            UpvalSource::Upvalue(i) => cl
                                .upvalues
                                .get(i as usize)
                                .cloned()
                                .ok_or_else(|| Error::runtime("captured upvalue out of range"))?,
                        };
                        upvalues.push(cell);
                    }

                    self.note_allocation(48);
                    self.push(Value::Function(Callable::Lua(Rc::new(LuaClosure {
                        proto,
                        upvalues,
                    }))));
                }
                Call { nargs, nresults } => {
                    if let Some(name) = fetched_global {
                        self.pending_name = Some((name, "global"));
                    }
                    self.call_value(nargs as usize, Some(nresults as usize))?;
                }
                Return(n) => {
                    let at = self
                        .stack
                        .len()
                        .checked_sub(n as usize)
                        .ok_or_else(|| Error::runtime("not enough values to return"))?;
                    return Ok(self.stack.split_off(at));
                }
                Pop(n) => self.pop(n as usize),
            }
        }
    }
}
