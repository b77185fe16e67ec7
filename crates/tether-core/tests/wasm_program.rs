//! Integration tests for wasm programs and their WASI functions.

mod common;

use tether_core::bridge::{FixedInputQueue, FixedSource, InputBridge};
use tether_core::execute::{AbortHandle, EventSink, HostEvent, Program, ProgramIo, WasmProgram};

fn run(wat: &str, lines: &[&str]) -> (i32, Vec<HostEvent>) {
    let (sink, mut rx) = EventSink::channel();
    let source = FixedSource::new(FixedInputQueue::from_lines(lines.iter().copied()));
    let io = ProgramIo::new(InputBridge::new(source), sink, AbortHandle::new());

    let program: Box<dyn Program> = Box::new(WasmProgram::compile(wat.as_bytes()).unwrap());
    let status = program.run(io).unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (status, events)
}

#[test]
fn test_cat_copies_every_line() {
    let (status, events) = run(common::CAT, &["alpha", "beta"]);
    assert_eq!(status, 0);
    assert_eq!(
        events,
        vec![
            HostEvent::Stdout("alpha\n".into()),
            HostEvent::Stdout("beta\n".into()),
        ]
    );
}

#[test]
fn test_scattered_read_only_blocks_for_first_buffer() {
    // Two 3-byte iovecs: one read fills both from a single 6-byte chunk,
    // then reports the total.
    let wat = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (func (export "_start")
        (i32.store (i32.const 0) (i32.const 64))
        (i32.store (i32.const 4) (i32.const 3))
        (i32.store (i32.const 8) (i32.const 67))
        (i32.store (i32.const 12) (i32.const 3))
        (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 2) (i32.const 16)))
        (i32.store (i32.const 20) (i32.const 64))
        (i32.store (i32.const 24) (i32.load (i32.const 16)))
        (drop (call $fd_write (i32.const 1) (i32.const 20) (i32.const 1) (i32.const 28)))))
    "#;
    let (_, events) = run(wat, &["hello", "world"]);
    assert_eq!(events, vec![HostEvent::Stdout("hello\n".into())]);
}

#[test]
fn test_stderr_and_exit_status() {
    let wat = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
      (memory (export "memory") 1)
      (data (i32.const 64) "bad input\n")
      (func (export "_start")
        (i32.store (i32.const 0) (i32.const 64))
        (i32.store (i32.const 4) (i32.const 10))
        (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 8)))
        (call $exit (i32.const 1))))
    "#;
    let (status, events) = run(wat, &[]);
    assert_eq!(status, 1);
    assert_eq!(events, vec![HostEvent::Stderr("bad input\n".into())]);
}

#[test]
fn test_unsupported_descriptors_are_refused() {
    // Writing to fd 5 fails with EBADF (8), which becomes the exit status.
    let wat = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
      (memory (export "memory") 1)
      (func (export "_start")
        (call $exit (call $fd_write (i32.const 5) (i32.const 0) (i32.const 0) (i32.const 8)))))
    "#;
    let (status, events) = run(wat, &[]);
    assert_eq!(status, 8);
    assert!(events.is_empty());
}

#[test]
fn test_random_and_clock_succeed() {
    let wat = r#"
    (module
      (import "wasi_snapshot_preview1" "random_get" (func $random (param i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "clock_time_get" (func $clock (param i32 i64 i32) (result i32)))
      (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
      (memory (export "memory") 1)
      (func (export "_start")
        (call $exit
          (i32.or
            (call $random (i32.const 64) (i32.const 16))
            (call $clock (i32.const 1) (i64.const 0) (i32.const 128))))))
    "#;
    let (status, _) = run(wat, &[]);
    assert_eq!(status, 0);
}

#[test]
fn test_aborted_before_start_does_not_run() {
    let (sink, mut rx) = EventSink::channel();
    let abort = AbortHandle::new();
    abort.abort();
    let io = ProgramIo::new(
        InputBridge::new(FixedSource::new(FixedInputQueue::default())),
        sink,
        abort,
    );

    let program = Box::new(WasmProgram::compile(common::ECHO_ONCE.as_bytes()).unwrap());
    assert!(matches!(program.run(io), Err(tether_core::Error::Aborted)));
    assert!(rx.try_recv().is_err());
}
