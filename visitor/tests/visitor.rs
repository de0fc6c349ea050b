use std::cell::RefCell;
use std::rc::Rc;

use vm::{Callable, LuaStr, OpCode, ProtoBuilder, Status, TableRef, ThreadRef, Type, Value, Vm};
use visitor::error::OpError;
use visitor::ops;

/// Invoke an operation, asserting the host stack comes back unchanged.
fn call(dbg: &mut Vm, host: &mut Vm, op: fn(&mut Vm, &mut Vm) -> visitor::OpResult) -> usize {
    let before = host.top();
    let n = op(dbg, host).expect("operation should not raise");
    assert_eq!(host.top(), before, "host stack must be neutral");
    n
}

fn call_err(dbg: &mut Vm, host: &mut Vm, op: fn(&mut Vm, &mut Vm) -> visitor::OpResult) -> OpError {
    let before = host.top();
    let err = op(dbg, host).expect_err("operation should raise");
    assert_eq!(host.top(), before, "host stack must be neutral on errors");
    err
}

fn debugger() -> (Vm, TableRef) {
    let mut dbg = Vm::new();
    let lib = ops::open(&mut dbg);
    dbg.set_top(0);
    (dbg, lib)
}

fn g_ref(lib: &TableRef) -> Value {
    lib.borrow().raw_get(&Value::from("_G"))
}

/// Reference to `_G[name]` obtained through the operation surface.
fn global_ref(dbg: &mut Vm, host: &mut Vm, lib: &TableRef, name: &str) -> Value {
    dbg.set_top(0);
    dbg.push(g_ref(lib));
    dbg.push_str(name);
    assert_eq!(call(dbg, host, ops::field), 1);
    let r = dbg.get(-1).unwrap();
    dbg.set_top(0);
    r
}

fn demo_host() -> Vm {
    let mut host = Vm::new();

    let math = TableRef::new();
    math.borrow_mut()
        .raw_set("pi".into(), Value::Float(std::f64::consts::PI))
        .unwrap();
    host.set_global("math", Value::Table(math));
    host.set_global("answer", Value::Int(42));

    host
}

#[test]
fn global_read_chain() {
    let mut host = demo_host();
    let (mut dbg, lib) = debugger();

    // field(_G, "math") yields a reference, not a copy.
    let math_ref = global_ref(&mut dbg, &mut host, &lib, "math");
    assert_eq!(math_ref.type_of(), Type::Userdata);

    dbg.push(math_ref);
    dbg.push_str("pi");
    assert_eq!(call(&mut dbg, &mut host, ops::field), 1);
    let pi_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(pi_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::value), 1);
    assert_eq!(dbg.get(-1), Some(Value::Float(std::f64::consts::PI)));
    dbg.set_top(0);

    // The value-only variant short-circuits scalars.
    dbg.push(g_ref(&lib));
    dbg.push_str("answer");
    assert_eq!(call(&mut dbg, &mut host, ops::fieldv), 1);
    assert_eq!(dbg.get(-1), Some(Value::Int(42)));
}

#[test]
fn absent_fields_report_nothing() {
    let mut host = demo_host();
    let (mut dbg, lib) = debugger();

    let missing = global_ref(&mut dbg, &mut host, &lib, "no_such_table");

    // Indexing through a reference that evaluates to nil is absence.
    dbg.push(missing);
    dbg.push_str("pi");
    assert_eq!(call(&mut dbg, &mut host, ops::fieldv), 0);
}

#[test]
fn index_reads_the_array_part() {
    let mut host = demo_host();
    let list = TableRef::new();
    for (i, v) in [10i64, 20, 30].into_iter().enumerate() {
        list.borrow_mut()
            .raw_set(Value::Int(i as i64 + 1), Value::Int(v))
            .unwrap();
    }
    host.set_global("list", Value::Table(list));

    let (mut dbg, lib) = debugger();
    let list_ref = global_ref(&mut dbg, &mut host, &lib, "list");

    dbg.push(list_ref.clone());
    dbg.push_int(2);
    assert_eq!(call(&mut dbg, &mut host, ops::indexv), 1);
    assert_eq!(dbg.get(-1), Some(Value::Int(20)));
    dbg.set_top(0);

    // Zero and negative keys are rejected on this host.
    dbg.push(list_ref.clone());
    dbg.push_int(0);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::index),
        OpError::KeyOutOfRange
    ));

    dbg.set_top(0);
    dbg.push(list_ref);
    dbg.push_int(-1);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::index),
        OpError::KeyOutOfRange
    ));
}

/// `local x = "hi"; breakpoint()` — the paused-host shape.
fn paused_chunk() -> Rc<vm::Proto> {
    use OpCode::*;

    let mut b = ProtoBuilder::new("=paused").main();
    let x = b.local("x");
    b.at_line(1);
    let hi = b.constant("hi");
    b.emit(Const(hi));
    b.emit(SetLocal(x));
    b.at_line(2);
    let bp = b.constant("breakpoint");
    b.emit(GetGlobal(bp));
    b.emit(Call {
        nargs: 0,
        nresults: 0,
    });

    b.build()
}

/// Run `body` inside a native breakpoint called from a chunk with a live
/// named local, the way a real debugger observes a paused host.
fn with_paused_host(body: impl Fn(&mut Vm, &mut Vm) + 'static) {
    let hit = Rc::new(RefCell::new(false));
    let seen = hit.clone();

    let mut host = Vm::new();
    let breakpoint = Callable::native(move |host| {
        *seen.borrow_mut() = true;
        let mut dbg = Vm::new();
        body(&mut dbg, host);
        Ok(0)
    });
    host.set_global("breakpoint", Value::Function(breakpoint));

    host.push_callable(Callable::from_proto(paused_chunk()));
    assert!(host.pcall(0, Some(0)), "chunk must run cleanly");
    assert!(*hit.borrow(), "breakpoint must have been reached");
}

#[test]
fn frame_locals_of_a_paused_host() {
    with_paused_host(|dbg, host| {
        // getlocal(1, 1) |-> ("x", "hi")
        dbg.push_int(1);
        dbg.push_int(1);
        assert_eq!(call(dbg, host, ops::getlocalv), 2);
        assert_eq!(dbg.to_str(-2).unwrap().as_bytes(), b"x");
        assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"hi");
        dbg.set_top(0);

        // A slot past the live locals reports nothing.
        dbg.push_int(1);
        dbg.push_int(2);
        assert_eq!(call(dbg, host, ops::getlocalv), 0);
        dbg.set_top(0);

        // Assignment through a frame-local reference.
        dbg.push_int(1);
        dbg.push_int(1);
        assert_eq!(call(dbg, host, ops::getlocal), 2);
        let local_ref = dbg.get(-1).unwrap();
        dbg.set_top(0);

        dbg.push(local_ref);
        dbg.push_int(7);
        assert_eq!(call(dbg, host, ops::assign), 1);
        assert_eq!(dbg.get(-1), Some(Value::Bool(true)));
        dbg.set_top(0);

        dbg.push_int(1);
        dbg.push_int(1);
        assert_eq!(call(dbg, host, ops::getlocalv), 2);
        assert_eq!(dbg.get(-1), Some(Value::Int(7)));
        dbg.set_top(0);
    });
}

#[test]
fn getlocal_argument_ranges() {
    let mut host = demo_host();
    let (mut dbg, _) = debugger();

    dbg.push_int(0);
    dbg.push_int(0);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::getlocal),
        OpError::LocalOutOfRange
    ));

    dbg.set_top(0);
    dbg.push_int(0);
    dbg.push_int(256);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::getlocal),
        OpError::LocalOutOfRange
    ));

    dbg.set_top(0);
    dbg.push_int(0);
    dbg.push_int(-256);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::getlocal),
        OpError::LocalOutOfRange
    ));

    dbg.set_top(0);
    dbg.push_int(65536);
    dbg.push_int(1);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::getlocal),
        OpError::FrameOutOfRange
    ));

    // In-range but absent (no frames live): zero results, no error.
    dbg.set_top(0);
    dbg.push_int(0);
    dbg.push_int(255);
    assert_eq!(call(&mut dbg, &mut host, ops::getlocal), 0);
}

fn install_loader(host: &mut Vm) {
    host.set_loader(|src, _name| {
        use OpCode::*;

        match src {
            b"return function() local u = 1 return function() return u end end" => {
                let mut inner = ProtoBuilder::new("=chunk").defined_at(1, 1);
                inner.upvalue("u", vm::UpvalSource::Local(0));
                inner.emit(GetUpval(0));
                inner.emit(Return(1));
                let inner = inner.build();

                let mut outer = ProtoBuilder::new("=chunk").defined_at(1, 1);
                let u = outer.local("u");
                let one = outer.constant(1i64);
                outer.emit(Const(one));
                outer.emit(SetLocal(u));
                let child = outer.child(inner);
                outer.emit(Closure(child));
                outer.emit(Return(1));
                let outer = outer.build();

                let mut chunk = ProtoBuilder::new("=chunk").main();
                let child = chunk.child(outer);
                chunk.emit(Closure(child));
                chunk.emit(Return(1));
                Ok(chunk.build())
            }
            b"return {}" => {
                let mut chunk = ProtoBuilder::new("=chunk").main();
                chunk.emit(NewTable);
                chunk.emit(Return(1));
                Ok(chunk.build())
            }
            b"return boom()" => {
                let mut chunk = ProtoBuilder::new("=chunk").main();
                let boom = chunk.constant("boom");
                chunk.emit(GetGlobal(boom));
                chunk.emit(Call {
                    nargs: 0,
                    nresults: 1,
                });
                chunk.emit(Return(1));
                Ok(chunk.build())
            }
            b"return a + 37" => {
                let mut chunk = ProtoBuilder::new("=chunk").main();
                let a = chunk.param("a");
                let c = chunk.constant(37i64);
                chunk.emit(GetLocal(a));
                chunk.emit(Const(c));
                chunk.emit(Add);
                chunk.emit(Return(1));
                Ok(chunk.build())
            }
            b"return t.x" => {
                let mut chunk = ProtoBuilder::new("=chunk").main();
                let t = chunk.param("t");
                let x = chunk.constant("x");
                chunk.emit(GetLocal(t));
                chunk.emit(GetField(x));
                chunk.emit(Return(1));
                Ok(chunk.build())
            }
            _ => Err("syntax error near <eof>".to_string()),
        }
    });
}

/// `load(src)` followed by `watch` of the loaded chunk; returns the
/// reference to the chunk's single result.
fn load_and_watch(dbg: &mut Vm, host: &mut Vm, src: &str) -> Value {
    dbg.set_top(0);
    dbg.push_str(src);
    assert_eq!(call(dbg, host, ops::load), 1, "load({src:?})");
    let chunk_ref = dbg.get(-1).unwrap();
    assert_eq!(chunk_ref.type_of(), Type::Userdata);
    dbg.set_top(0);

    dbg.push(chunk_ref);
    assert_eq!(call(dbg, host, ops::watch), 2);
    assert_eq!(dbg.get(-2), Some(Value::Bool(true)));
    let r = dbg.get(-1).unwrap();
    dbg.set_top(0);
    r
}

#[test]
fn upvalue_assignment_through_references() {
    let mut host = Vm::new();
    install_loader(&mut host);
    let (mut dbg, _) = debugger();

    let outer =
        load_and_watch(&mut dbg, &mut host, "return function() local u = 1 return function() return u end end");

    // Calling the factory yields the closure over `u`.
    dbg.push(outer);
    assert_eq!(call(&mut dbg, &mut host, ops::watch), 2);
    let inner = dbg.get(-1).unwrap();
    dbg.set_top(0);

    // getupvalue(inner, 1) |-> ("u", ref)
    dbg.push(inner.clone());
    dbg.push_int(1);
    assert_eq!(call(&mut dbg, &mut host, ops::getupvalue), 2);
    assert_eq!(dbg.to_str(-2).unwrap().as_bytes(), b"u");
    let upval_ref = dbg.get(-1).unwrap();
    assert_eq!(upval_ref.type_of(), Type::Userdata);
    dbg.set_top(0);

    // The value-only variant sees the scalar payload.
    dbg.push(inner.clone());
    dbg.push_int(1);
    assert_eq!(call(&mut dbg, &mut host, ops::getupvaluev), 2);
    assert_eq!(dbg.get(-1), Some(Value::Int(1)));
    dbg.set_top(0);

    // Missing upvalue: nothing.
    dbg.push(inner.clone());
    dbg.push_int(2);
    assert_eq!(call(&mut dbg, &mut host, ops::getupvaluev), 0);
    dbg.set_top(0);

    // assign(upvalue_ref, 42) |-> true
    dbg.push(upval_ref);
    dbg.push_int(42);
    assert_eq!(call(&mut dbg, &mut host, ops::assign), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(true)));
    dbg.set_top(0);

    // eval(inner) |-> (true, 42)
    dbg.push(inner);
    assert_eq!(call(&mut dbg, &mut host, ops::eval), 2);
    assert_eq!(dbg.get(-2), Some(Value::Bool(true)));
    assert_eq!(dbg.get(-1), Some(Value::Int(42)));
}

#[test]
fn eval_marshals_arguments_and_captures_errors() {
    let mut host = Vm::new();
    install_loader(&mut host);
    host.set_global(
        "boom",
        Value::Function(Callable::native(|_| Err(vm::Error::runtime("kaboom")))),
    );
    let (mut dbg, _) = debugger();

    // Scalar argument.
    let add = load_and_watch(&mut dbg, &mut host, "return a + 37");
    dbg.push(add);
    dbg.push_int(5);
    assert_eq!(call(&mut dbg, &mut host, ops::eval), 2);
    assert_eq!(dbg.get(-2), Some(Value::Bool(true)));
    assert_eq!(dbg.get(-1), Some(Value::Int(42)));
    dbg.set_top(0);

    // Debugger table argument crosses as a deep copy.
    let reader = load_and_watch(&mut dbg, &mut host, "return t.x");
    let arg = TableRef::new();
    arg.borrow_mut()
        .raw_set("x".into(), Value::Int(7))
        .unwrap();
    dbg.push(reader);
    dbg.push(Value::Table(arg));
    assert_eq!(call(&mut dbg, &mut host, ops::eval), 2);
    assert_eq!(dbg.get(-2), Some(Value::Bool(true)));
    assert_eq!(dbg.get(-1), Some(Value::Int(7)));
    dbg.set_top(0);

    // Host errors are captured, never raised.
    dbg.push_str("return boom()");
    assert_eq!(call(&mut dbg, &mut host, ops::load), 1);
    let failing = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(failing);
    assert_eq!(call(&mut dbg, &mut host, ops::eval), 2);
    assert_eq!(dbg.get(-2), Some(Value::Bool(false)));
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"kaboom");
    dbg.set_top(0);

    // A non-function first argument is a caller bug.
    dbg.push_int(3);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::eval),
        OpError::NeedFunction
    ));
}

#[test]
fn load_failures_return_nil_and_message() {
    let mut host = Vm::new();
    install_loader(&mut host);
    let (mut dbg, _) = debugger();

    dbg.push_str("not a chunk");
    assert_eq!(call(&mut dbg, &mut host, ops::load), 2);
    assert_eq!(dbg.get(-2), Some(Value::Nil));
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"syntax error near <eof>");
}

#[test]
fn watch_anchors_survive_until_cleanwatch() {
    let mut host = Vm::new();
    install_loader(&mut host);
    let (mut dbg, _) = debugger();

    let table_ref = load_and_watch(&mut dbg, &mut host, "return {}");

    // The anchored table is reachable through the watch table; grab a weak
    // handle to observe collectability.
    let weak = {
        let watch = match host
            .registry()
            .borrow()
            .raw_get(&Value::from("__debugger_watch"))
        {
            Value::Table(t) => t,
            other => panic!("watch table missing: {other:?}"),
        };
        let anchored = match watch.borrow().raw_get(&Value::Int(1)) {
            Value::Table(t) => t,
            other => panic!("anchored value missing: {other:?}"),
        };
        anchored.downgrade()
    };
    assert!(weak.upgrade().is_some(), "anchor must keep the table alive");

    // The reference reads the live table.
    dbg.push(table_ref.clone());
    assert_eq!(call(&mut dbg, &mut host, ops::value), 1);
    assert!(dbg.to_str(-1).unwrap().to_string().starts_with("table: "));
    dbg.set_top(0);

    dbg.set_top(0);
    assert_eq!(call(&mut dbg, &mut host, ops::cleanwatch), 0);

    // Now the path dangles and the host object is collectable.
    dbg.push(table_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::value), 1);
    assert_eq!(dbg.get(-1), Some(Value::Nil));
    assert!(weak.upgrade().is_none(), "cleanwatch must release the anchor");
}

#[test]
fn load_anchors_release_on_unref() {
    let mut host = Vm::new();
    install_loader(&mut host);
    let (mut dbg, _) = debugger();

    dbg.push_str("return {}");
    assert_eq!(call(&mut dbg, &mut host, ops::load), 1);
    let chunk_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(chunk_ref.clone());
    dbg.set_top(1);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"function");
    dbg.set_top(0);

    visitor::anchor::unref(&mut host, 1).unwrap();

    dbg.push(chunk_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::value), 1);
    assert_eq!(dbg.get(-1), Some(Value::Nil));
}

#[test]
fn metatables_of_scalars_and_tables() {
    let mut host = demo_host();
    let (mut dbg, lib) = debugger();

    // No string metatable installed: getmetatablev reports nothing, but the
    // plain variant still hands out a reference whose evaluation is nil.
    dbg.push_str("abc");
    assert_eq!(call(&mut dbg, &mut host, ops::getmetatablev), 0);
    dbg.set_top(0);

    dbg.push_str("abc");
    assert_eq!(call(&mut dbg, &mut host, ops::getmetatable), 1);
    let mt_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(mt_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"nil");
    dbg.set_top(0);

    // Install a string metatable on the host; the same path now resolves.
    host.push_str("x");
    let mt = TableRef::new();
    host.push_table(mt);
    host.set_metatable(-2).unwrap();
    host.pop(1);

    dbg.push_str("abc");
    assert_eq!(call(&mut dbg, &mut host, ops::getmetatable), 1);
    let mt_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(mt_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"table");
    dbg.set_top(0);

    // Aggregate metatables wrap the argument reference.
    let math_ref = global_ref(&mut dbg, &mut host, &lib, "math");
    dbg.push(math_ref.clone());
    assert_eq!(call(&mut dbg, &mut host, ops::getmetatablev), 0);
    dbg.set_top(0);

    let mt = TableRef::new();
    mt.borrow_mut()
        .raw_set("__name".into(), Value::from("Math"))
        .unwrap();
    match host.globals().borrow().raw_get(&Value::from("math")) {
        Value::Table(t) => t.borrow_mut().set_metatable(Some(mt)),
        other => panic!("math missing: {other:?}"),
    }

    dbg.push(math_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::getmetatable), 1);
    let mt_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(mt_ref);
    dbg.push_str("__name");
    assert_eq!(call(&mut dbg, &mut host, ops::fieldv), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"Math");
}

#[test]
fn walker_sees_what_iteration_cannot() {
    let mut host = demo_host();
    let weird = TableRef::new();
    weird
        .borrow_mut()
        .push_raw_node(Value::Float(f64::NAN), Value::from("nan"));
    weird
        .borrow_mut()
        .raw_set("alpha".into(), Value::Int(1))
        .unwrap();
    // Logical iteration misses the NaN bucket entirely.
    assert_eq!(weird.borrow().entries().len(), 1);
    host.set_global("weird", Value::Table(weird));

    let (mut dbg, lib) = debugger();
    let weird_ref = global_ref(&mut dbg, &mut host, &lib, "weird");

    dbg.push(weird_ref.clone());
    assert_eq!(call(&mut dbg, &mut host, ops::tablehashv), 1);
    let list = dbg.to_table(-1).unwrap();
    let flat: Vec<Value> = list.borrow().entries().into_iter().map(|(_, v)| v).collect();
    dbg.set_top(0);

    assert_eq!(flat.len(), 4);
    assert!(matches!(flat[0], Value::Float(f) if f.is_nan()));
    assert_eq!(flat[1], Value::from("nan"));
    assert_eq!(flat[2], Value::from("alpha"));
    assert_eq!(flat[3], Value::Int(1));

    // tablesize: no array part, two hash buckets.
    dbg.push(weird_ref.clone());
    assert_eq!(call(&mut dbg, &mut host, ops::tablesize), 2);
    assert_eq!(dbg.get(-2), Some(Value::Int(0)));
    assert_eq!(dbg.get(-1), Some(Value::Int(2)));
    dbg.set_top(0);

    // tablekey skips the NaN bucket and lands on the string key.
    dbg.push(weird_ref.clone());
    assert_eq!(call(&mut dbg, &mut host, ops::tablekey), 2);
    assert_eq!(dbg.to_str(-2).unwrap().as_bytes(), b"alpha");
    assert_eq!(dbg.get(-1), Some(Value::Int(2)));
    dbg.set_top(0);

    // Resuming past the last bucket finds nothing.
    dbg.push(weird_ref.clone());
    dbg.push_int(2);
    assert_eq!(call(&mut dbg, &mut host, ops::tablekey), 0);
    dbg.set_top(0);

    // A zero cap yields an empty listing even for a non-empty table.
    dbg.push(weird_ref);
    dbg.push_int(0);
    assert_eq!(call(&mut dbg, &mut host, ops::tablehashv), 1);
    let list = dbg.to_table(-1).unwrap();
    assert!(list.borrow().entries().is_empty());
}

#[test]
fn tablehash_with_references_triples_entries() {
    let mut host = demo_host();
    let t = TableRef::new();
    t.borrow_mut()
        .raw_set("inner".into(), Value::Table(TableRef::new()))
        .unwrap();
    t.borrow_mut().raw_set(Value::Int(0), Value::Int(9)).unwrap();
    host.set_global("t", Value::Table(t));

    let (mut dbg, lib) = debugger();
    let t_ref = global_ref(&mut dbg, &mut host, &lib, "t");

    dbg.push(t_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::tablehash), 1);
    let list = dbg.to_table(-1).unwrap();
    let flat: Vec<Value> = list.borrow().entries().into_iter().map(|(_, v)| v).collect();
    dbg.set_top(0);

    // (key, value, value-ref) per entry: the hash bucket, then the zero slot.
    assert_eq!(flat.len(), 6);
    assert_eq!(flat[0], Value::from("inner"));
    // a non-scalar value appears as the reference, twice
    assert_eq!(flat[1].type_of(), Type::Userdata);
    assert_eq!(flat[2].type_of(), Type::Userdata);
    assert_eq!(flat[3], Value::Int(0));
    assert_eq!(flat[4], Value::Int(9));
    assert_eq!(flat[5].type_of(), Type::Userdata);

    // The value reference resolves to the nested table.
    dbg.push(flat[1].clone());
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"table");
}

#[test]
fn userdata_memory_window() {
    let mut host = demo_host();
    host.new_userdata_from(b"hello world".to_vec(), 1);
    host.push_int(5);
    assert!(host.set_uservalue(-2, 1));
    let blob = host.get(-1).unwrap();
    host.pop(1);
    host.set_global("blob", blob);

    let (mut dbg, lib) = debugger();
    let ud_ref = global_ref(&mut dbg, &mut host, &lib, "blob");

    // Clipped read.
    dbg.push(ud_ref.clone());
    dbg.push_int(6);
    dbg.push_int(100);
    assert_eq!(call(&mut dbg, &mut host, ops::udread), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"world");
    dbg.set_top(0);

    // Offset past the end: nothing.
    dbg.push(ud_ref.clone());
    dbg.push_int(11);
    dbg.push_int(1);
    assert_eq!(call(&mut dbg, &mut host, ops::udread), 0);
    dbg.set_top(0);

    // Whole-range write succeeds in place.
    dbg.push(ud_ref.clone());
    dbg.push_int(6);
    dbg.push_str("WORLD");
    assert_eq!(call(&mut dbg, &mut host, ops::udwrite), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(true)));
    dbg.set_top(0);

    // Out-of-range non-partial write refuses and writes nothing.
    dbg.push(ud_ref.clone());
    dbg.push_int(8);
    dbg.push_str("XXXXX");
    assert_eq!(call(&mut dbg, &mut host, ops::udwrite), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(false)));
    dbg.set_top(0);

    // Partial write reports the clipped byte count.
    dbg.push(ud_ref.clone());
    dbg.push_int(8);
    dbg.push_str("XXXXX");
    dbg.push_bool(true);
    assert_eq!(call(&mut dbg, &mut host, ops::udwrite), 1);
    assert_eq!(dbg.get(-1), Some(Value::Int(3)));
    dbg.set_top(0);

    dbg.push(ud_ref.clone());
    dbg.push_int(0);
    dbg.push_int(11);
    assert_eq!(call(&mut dbg, &mut host, ops::udread), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"hello WOXXX");
    dbg.set_top(0);

    // getuservalue reads the attached slot.
    dbg.push(ud_ref.clone());
    dbg.push_int(1);
    assert_eq!(call(&mut dbg, &mut host, ops::getuservaluev), 2);
    assert_eq!(dbg.get(-1), Some(Value::Bool(true)));
    assert_eq!(dbg.get(-2), Some(Value::Int(5)));
    dbg.set_top(0);

    dbg.push(ud_ref.clone());
    dbg.push_int(2);
    assert_eq!(call(&mut dbg, &mut host, ops::getuservaluev), 0);
    dbg.set_top(0);

    // udread on a non-userdata is a caller bug.
    let math_ref = global_ref(&mut dbg, &mut host, &lib, "math");
    dbg.push(math_ref);
    dbg.push_int(0);
    dbg.push_int(1);
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::udread),
        OpError::NeedUserdata
    ));
}

#[test]
fn marshalling_preserves_scalars_exactly() {
    let mut host = demo_host();
    host.set_global("i", Value::Int(42));
    host.set_global("f", Value::Float(42.0));
    host.set_global("s", Value::Str(LuaStr::from(vec![0xff, 0x00, b'a'])));
    host.set_global("p", Value::LightPtr(0xdead_beef));
    host.set_global("b", Value::Bool(false));

    let (mut dbg, lib) = debugger();

    let read = |dbg: &mut Vm, host: &mut Vm, name: &str| -> Value {
        dbg.set_top(0);
        dbg.push(g_ref(&lib));
        dbg.push_str(name);
        assert_eq!(call(dbg, host, ops::fieldv), 1);
        let r = dbg.get(-1).unwrap();
        dbg.set_top(0);
        r
    };

    // Integers stay integers, floats stay floats.
    assert_eq!(read(&mut dbg, &mut host, "i"), Value::Int(42));
    assert_eq!(read(&mut dbg, &mut host, "f"), Value::Float(42.0));
    assert!(matches!(read(&mut dbg, &mut host, "f"), Value::Float(_)));

    // String bytes and pointer bits are identical.
    let s = read(&mut dbg, &mut host, "s");
    assert_eq!(
        match &s {
            Value::Str(s) => s.as_bytes().to_vec(),
            other => panic!("expected string, got {other:?}"),
        },
        vec![0xff, 0x00, b'a']
    );
    assert_eq!(read(&mut dbg, &mut host, "p"), Value::LightPtr(0xdead_beef));
    assert_eq!(read(&mut dbg, &mut host, "b"), Value::Bool(false));

    // Round-trip back through assignment.
    let i_ref = global_ref(&mut dbg, &mut host, &lib, "i");
    dbg.push(i_ref);
    dbg.push_float(0.5);
    assert_eq!(call(&mut dbg, &mut host, ops::assign), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(true)));
    dbg.set_top(0);
    assert_eq!(
        host.globals().borrow().raw_get(&Value::from("i")),
        Value::Float(0.5)
    );
}

#[test]
fn type_reports_host_side_types() {
    let mut host = demo_host();
    host.set_global(
        "native",
        Value::Function(Callable::native(|_| Ok(0))),
    );
    install_loader(&mut host);
    let (mut dbg, lib) = debugger();

    dbg.push_int(1);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"integer");
    dbg.set_top(0);

    dbg.push_float(1.5);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"float");
    dbg.set_top(0);

    let math_ref = global_ref(&mut dbg, &mut host, &lib, "math");
    dbg.push(math_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"table");
    dbg.set_top(0);

    let native_ref = global_ref(&mut dbg, &mut host, &lib, "native");
    dbg.push(native_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"c function");
    dbg.set_top(0);

    // A reference to an absent global reads as nil; indexing through it is
    // absence, not an error.
    let missing_ref = global_ref(&mut dbg, &mut host, &lib, "gone");
    dbg.push(missing_ref.clone());
    dbg.push_str("deeper");
    assert_eq!(call(&mut dbg, &mut host, ops::field), 0);
    dbg.set_top(0);

    dbg.push(missing_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"nil");
    dbg.set_top(0);

    // A path that cannot resolve at all is "unknown".
    dbg.new_userdata_from(visitor::path::child_value(&visitor::path::global(), 9999), 0);
    assert_eq!(call(&mut dbg, &mut host, ops::type_), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"unknown");
    dbg.set_top(0);

    // Aggregate debugger values have no host-side type.
    dbg.push(Value::Table(TableRef::new()));
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::type_),
        OpError::UnexpectedType("table")
    ));
}

#[test]
fn getinfo_frame_and_function_targets() {
    with_paused_host(|dbg, host| {
        // Frame target with source, line, name and upvalue info.
        dbg.push_int(1);
        dbg.push_str("Slnu");
        dbg.push_nil();
        assert_eq!(call(dbg, host, ops::getinfo), 1);
        let info = dbg.to_table(-1).unwrap();
        dbg.set_top(0);

        let get = |name: &str| info.borrow().raw_get(&Value::from(name));
        assert_eq!(get("source"), Value::from("=paused"));
        assert_eq!(get("short_src"), Value::from("paused"));
        assert_eq!(get("what"), Value::from("main"));
        assert_eq!(get("linedefined"), Value::Int(0));
        assert_eq!(get("currentline"), Value::Int(2));
        assert_eq!(get("name"), Value::from("?"));
        assert_eq!(get("namewhat"), Value::Nil);
        assert_eq!(get("nparams"), Value::Int(0));

        // The native frame at level 0 is named by its call site.
        dbg.push_int(0);
        dbg.push_str("Sn");
        assert_eq!(call(dbg, host, ops::getinfo), 1);
        let info = dbg.to_table(-1).unwrap();
        dbg.set_top(0);
        assert_eq!(info.borrow().raw_get(&Value::from("what")), Value::from("C"));
        assert_eq!(
            info.borrow().raw_get(&Value::from("name")),
            Value::from("breakpoint")
        );
        assert_eq!(
            info.borrow().raw_get(&Value::from("namewhat")),
            Value::from("global")
        );

        // A supplied result table is reused.
        let into = TableRef::new();
        dbg.push_int(1);
        dbg.push_str("l");
        dbg.push(Value::Table(into.clone()));
        assert_eq!(call(dbg, host, ops::getinfo), 1);
        assert!(dbg.to_table(-1).unwrap().ptr_eq(&into));
        assert_eq!(
            into.borrow().raw_get(&Value::from("currentline")),
            Value::Int(2)
        );
        dbg.set_top(0);

        // `f` produces a reference to the frame's function.
        dbg.push_int(1);
        dbg.push_str("f");
        assert_eq!(call(dbg, host, ops::getinfo), 1);
        let info = dbg.to_table(-1).unwrap();
        dbg.set_top(0);
        let func_ref = info.borrow().raw_get(&Value::from("func"));
        dbg.push(func_ref);
        assert_eq!(call(dbg, host, ops::type_), 1);
        assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"function");
        dbg.set_top(0);

        // Out-of-range frame: absence, not an error.
        dbg.push_int(10);
        dbg.push_str("S");
        assert_eq!(call(dbg, host, ops::getinfo), 0);
        dbg.set_top(0);

        // Unknown letters and oversized option strings are rejected.
        dbg.push_int(1);
        dbg.push_str("Sx");
        assert!(matches!(
            call_err(dbg, host, ops::getinfo),
            OpError::InvalidOption
        ));
        dbg.set_top(0);

        // A non-target first argument is rejected.
        dbg.push_str("nonsense");
        dbg.push_str("S");
        assert!(matches!(
            call_err(dbg, host, ops::getinfo),
            OpError::BadTarget("string")
        ));
        dbg.set_top(0);
    });

    // Function-reference targets reject `f` (there is no frame to anchor).
    let mut host = Vm::new();
    install_loader(&mut host);
    let (mut dbg, _) = debugger();

    dbg.push_str("return {}");
    assert_eq!(call(&mut dbg, &mut host, ops::load), 1);
    let chunk_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(chunk_ref.clone());
    dbg.push_str("S");
    assert_eq!(call(&mut dbg, &mut host, ops::getinfo), 1);
    let info = dbg.to_table(-1).unwrap();
    assert_eq!(info.borrow().raw_get(&Value::from("what")), Value::from("main"));
    dbg.set_top(0);

    dbg.push(chunk_ref);
    dbg.push_str("f");
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::getinfo),
        OpError::InvalidOption
    ));
}

#[test]
fn costatus_derives_thread_states() {
    let mut host = demo_host();

    let dead = ThreadRef::default();
    let suspended = ThreadRef::default();
    suspended.borrow_mut().set_status(Status::Yield);
    let normal = ThreadRef::default();
    normal.borrow_mut().set_frame_count(1);

    host.set_global("co_dead", Value::Thread(dead));
    host.set_global("co_suspended", Value::Thread(suspended));
    host.set_global("co_normal", Value::Thread(normal));
    host.set_global("co_running", Value::Thread(host.current_thread()));

    let (mut dbg, lib) = debugger();

    let status = |dbg: &mut Vm, host: &mut Vm, name: &str| -> String {
        let r = global_ref(dbg, host, &lib, name);
        dbg.push(r);
        assert_eq!(call(dbg, host, ops::costatus), 1);
        let s = dbg.to_str(-1).unwrap().to_string();
        dbg.set_top(0);
        s
    };

    assert_eq!(status(&mut dbg, &mut host, "co_dead"), "dead");
    assert_eq!(status(&mut dbg, &mut host, "co_suspended"), "suspended");
    assert_eq!(status(&mut dbg, &mut host, "co_normal"), "normal");
    assert_eq!(status(&mut dbg, &mut host, "co_running"), "running");

    // Anything that is not a thread is invalid.
    dbg.push_int(7);
    assert_eq!(call(&mut dbg, &mut host, ops::costatus), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"invalid");
}

#[test]
fn gccount_and_cfunctioninfo() {
    let mut host = demo_host();
    let native = Callable::native(|_| Ok(0));
    let addr = native.as_ptr();
    host.set_global("native", Value::Function(native));
    host.set_symbolizer(move |a| (a == addr).then(|| "host_native".to_string()));
    install_loader(&mut host);

    let (mut dbg, lib) = debugger();

    dbg.set_top(0);
    assert_eq!(call(&mut dbg, &mut host, ops::gccount), 1);
    let bytes = dbg.to_int(-1).unwrap();
    assert!(bytes > 0, "memory estimate should be positive: {bytes}");
    dbg.set_top(0);

    let native_ref = global_ref(&mut dbg, &mut host, &lib, "native");
    dbg.push(native_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::cfunctioninfo), 1);
    assert_eq!(dbg.to_str(-1).unwrap().as_bytes(), b"host_native");
    dbg.set_top(0);

    // A Lua function has no native pointer to symbolize.
    dbg.push_str("return {}");
    assert_eq!(call(&mut dbg, &mut host, ops::load), 1);
    let chunk_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);
    dbg.push(chunk_ref);
    assert_eq!(call(&mut dbg, &mut host, ops::cfunctioninfo), 1);
    assert_eq!(dbg.get(-1), Some(Value::Nil));
}

#[test]
fn assignment_refusals() {
    let mut host = demo_host();
    let (mut dbg, lib) = debugger();

    // The globals root itself is not assignable.
    dbg.push(g_ref(&lib));
    dbg.push_int(1);
    assert_eq!(call(&mut dbg, &mut host, ops::assign), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(false)));
    dbg.set_top(0);

    // A metatable slot only accepts nil or a table.
    let math_ref = global_ref(&mut dbg, &mut host, &lib, "math");
    dbg.push(math_ref.clone());
    assert_eq!(call(&mut dbg, &mut host, ops::getmetatable), 1);
    let mt_ref = dbg.get(-1).unwrap();
    dbg.set_top(0);

    dbg.push(mt_ref.clone());
    dbg.push_int(5);
    assert_eq!(call(&mut dbg, &mut host, ops::assign), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(false)));
    dbg.set_top(0);

    dbg.push(mt_ref);
    dbg.push(Value::Nil);
    dbg.set_top(2);
    assert_eq!(call(&mut dbg, &mut host, ops::assign), 1);
    assert_eq!(dbg.get(-1), Some(Value::Bool(true)));
    dbg.set_top(0);

    // Assigning a debugger aggregate is a caller bug.
    let answer_ref = global_ref(&mut dbg, &mut host, &lib, "answer");
    dbg.push(answer_ref);
    dbg.push(Value::Table(TableRef::new()));
    assert!(matches!(
        call_err(&mut dbg, &mut host, ops::assign),
        OpError::InvalidValueType("table")
    ));
}
