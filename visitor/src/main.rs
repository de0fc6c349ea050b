use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use vm::{Callable, OpCode, ProtoBuilder, Value, Vm};
use visitor::ops;

#[derive(Debug, Parser)]
struct Cli {
    /// Cap on the number of enumerated globals.
    #[arg(long, default_value_t = 32)]
    max_entries: i64,

    /// Print interpreter trace output.
    #[arg(short, long)]
    verbose: bool,
}

/// `answer = 42; greeting = "..."; math = { pi = 3.14... }`
fn demo_chunk() -> Rc<vm::Proto> {
    use OpCode::*;

    let mut b = ProtoBuilder::new("=demo").main();

    b.at_line(1);
    let answer = b.constant("answer");
    let v = b.constant(42i64);
    b.emit(Const(v));
    b.emit(SetGlobal(answer));

    b.at_line(2);
    let greeting = b.constant("greeting");
    let v = b.constant("hello from the host");
    b.emit(Const(v));
    b.emit(SetGlobal(greeting));

    b.at_line(3);
    let math = b.constant("math");
    let pi = b.constant(std::f64::consts::PI);
    let pi_key = b.constant("pi");
    b.emit(NewTable);
    b.emit(Const(pi));
    b.emit(SetField(pi_key));
    b.emit(SetGlobal(math));

    b.build()
}

fn main() -> Result<()> {
    let cli = Cli::try_parse()?;

    let level = if cli.verbose {
        tracing_subscriber::filter::LevelFilter::TRACE
    } else {
        tracing_subscriber::filter::LevelFilter::WARN
    };
    let logger = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(logger)?;

    let mut host = Vm::new();
    host.push_callable(Callable::from_proto(demo_chunk()));
    if !host.pcall(0, Some(0)) {
        let msg = host.to_str(-1).map(|s| s.to_string()).unwrap_or_default();
        anyhow::bail!("demo chunk failed: {msg}");
    }

    let mut dbg = Vm::new();
    let lib = ops::open(&mut dbg);
    dbg.pop(1);

    let g = lib.borrow().raw_get(&Value::from("_G"));
    dbg.push(g);
    dbg.push_int(cli.max_entries);
    ops::tablehashv(&mut dbg, &mut host)?;

    let list = dbg.to_table(-1).context("tablehash yields a listing table")?;
    let flat: Vec<Value> = list.borrow().entries().into_iter().map(|(_, v)| v).collect();

    println!("globals of the host:");
    let mut it = flat.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        println!("  {k} = {v}");
    }

    dbg.set_top(0);
    ops::gccount(&mut dbg, &mut host)?;
    println!("host memory estimate: {} bytes", dbg.to_int(-1).unwrap_or(0));

    Ok(())
}
