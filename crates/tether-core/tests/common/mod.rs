//! WebAssembly text programs shared by the integration tests.

#![allow(dead_code)]

/// Reads once (up to 256 bytes) and writes back what it got.
pub const ECHO_ONCE: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 64))
    (i32.store (i32.const 4) (i32.const 256))
    (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
    (i32.store (i32.const 16) (i32.const 64))
    (i32.store (i32.const 20) (i32.load (i32.const 8)))
    (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 24)))))
"#;

/// Copies stdin to stdout until end of input.
pub const CAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (block $eof
      (loop $copy
        (i32.store (i32.const 0) (i32.const 64))
        (i32.store (i32.const 4) (i32.const 1024))
        (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
        (br_if $eof (i32.eqz (i32.load (i32.const 8))))
        (i32.store (i32.const 16) (i32.const 64))
        (i32.store (i32.const 20) (i32.load (i32.const 8)))
        (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 24)))
        (br $copy)))))
"#;

/// Reads two lines, prints the sum of the numbers on them.
pub const SUM_TWO_LINES: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (local $len i32) (local $lines i32) (local $n i32)
    (local $i i32) (local $c i32) (local $cur i32) (local $sum i32) (local $p i32)
    (block $done
      (loop $read
        (i32.store (i32.const 0) (i32.add (i32.const 64) (local.get $len)))
        (i32.store (i32.const 4) (i32.sub (i32.const 1024) (local.get $len)))
        (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
        (local.set $n (i32.load (i32.const 8)))
        (br_if $done (i32.eqz (local.get $n)))
        (local.set $i (local.get $len))
        (local.set $len (i32.add (local.get $len) (local.get $n)))
        (block $counted
          (loop $count
            (br_if $counted (i32.ge_u (local.get $i) (local.get $len)))
            (if (i32.eq (i32.load8_u (i32.add (i32.const 64) (local.get $i))) (i32.const 10))
              (then (local.set $lines (i32.add (local.get $lines) (i32.const 1)))))
            (local.set $i (i32.add (local.get $i) (i32.const 1)))
            (br $count)))
        (br_if $read (i32.lt_u (local.get $lines) (i32.const 2)))))
    (local.set $i (i32.const 0))
    (block $summed
      (loop $parse
        (local.set $c (i32.const 10))
        (if (i32.lt_u (local.get $i) (local.get $len))
          (then (local.set $c (i32.load8_u (i32.add (i32.const 64) (local.get $i))))))
        (if (i32.lt_u (i32.sub (local.get $c) (i32.const 48)) (i32.const 10))
          (then
            (local.set $cur
              (i32.add (i32.mul (local.get $cur) (i32.const 10))
                       (i32.sub (local.get $c) (i32.const 48)))))
          (else
            (local.set $sum (i32.add (local.get $sum) (local.get $cur)))
            (local.set $cur (i32.const 0))))
        (br_if $summed (i32.ge_u (local.get $i) (local.get $len)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $parse)))
    (local.set $p (i32.const 2079))
    (i32.store8 (local.get $p) (i32.const 10))
    (loop $digits
      (local.set $p (i32.sub (local.get $p) (i32.const 1)))
      (i32.store8 (local.get $p)
        (i32.add (i32.const 48) (i32.rem_u (local.get $sum) (i32.const 10))))
      (local.set $sum (i32.div_u (local.get $sum) (i32.const 10)))
      (br_if $digits (local.get $sum)))
    (i32.store (i32.const 16) (local.get $p))
    (i32.store (i32.const 20) (i32.sub (i32.const 2080) (local.get $p)))
    (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 24)))))
"#;

/// Never returns on its own.
pub const SPIN: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "_start") (loop $spin (br $spin))))
"#;

/// Exits with status 3.
pub const EXIT_THREE: &str = r#"
(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start") (call $exit (i32.const 3))))
"#;
