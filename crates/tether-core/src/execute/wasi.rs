//! Minimal `wasi_snapshot_preview1` host functions.
//!
//! Only what a freshly compiled console program needs: standard streams,
//! exit, clocks and randomness. There is no filesystem; fd 0 reads through
//! the [`InputBridge`](crate::bridge::InputBridge) and fds 1 and 2 become
//! output events.

use std::fmt;
use std::io::Read;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use wasmtime::{Caller, Extern, Linker, Memory};

use super::program::{ProgramIo, StreamKind};

const MODULE: &str = "wasi_snapshot_preview1";

const ERRNO_SUCCESS: i32 = 0;
const ERRNO_BADF: i32 = 8;
const ERRNO_FAULT: i32 = 21;
const ERRNO_INVAL: i32 = 28;
const ERRNO_SPIPE: i32 = 70;

const FILETYPE_CHARACTER_DEVICE: u8 = 2;
const CLOCK_REALTIME: i32 = 0;

/// Store data for a wasm run.
pub struct WasiState {
    pub(crate) io: ProgramIo,
    started: Instant,
}

impl WasiState {
    pub fn new(io: ProgramIo) -> Self {
        Self {
            io,
            started: Instant::now(),
        }
    }
}

/// Raised by `proc_exit` to unwind out of the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcExit(pub i32);

impl fmt::Display for ProcExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program exited with status {}", self.0)
    }
}

impl std::error::Error for ProcExit {}

fn memory(caller: &mut Caller<'_, WasiState>) -> Option<Memory> {
    caller.get_export("memory").and_then(Extern::into_memory)
}

fn slice(mem: &[u8], addr: u32, len: u32) -> Option<&[u8]> {
    let start = addr as usize;
    mem.get(start..start.checked_add(len as usize)?)
}

fn slice_mut(mem: &mut [u8], addr: u32, len: u32) -> Option<&mut [u8]> {
    let start = addr as usize;
    mem.get_mut(start..start.checked_add(len as usize)?)
}

fn read_u32(mem: &[u8], addr: u32) -> Option<u32> {
    let bytes = slice(mem, addr, 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn write_bytes(mem: &mut [u8], addr: u32, bytes: &[u8]) -> bool {
    match slice_mut(mem, addr, bytes.len() as u32) {
        Some(target) => {
            target.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

fn write_u32(mem: &mut [u8], addr: u32, value: u32) -> bool {
    write_bytes(mem, addr, &value.to_le_bytes())
}

fn write_u64(mem: &mut [u8], addr: u32, value: u64) -> bool {
    write_bytes(mem, addr, &value.to_le_bytes())
}

/// Read the `(ptr, len)` pair of iovec number `index`.
fn iovec(mem: &[u8], iovs: u32, index: u32) -> Option<(u32, u32)> {
    let base = iovs.checked_add(index.checked_mul(8)?)?;
    Some((read_u32(mem, base)?, read_u32(mem, base.checked_add(4)?)?))
}

fn status(ok: bool) -> i32 {
    if ok { ERRNO_SUCCESS } else { ERRNO_FAULT }
}

/// Register the host functions on `linker`.
pub fn add_to_linker(linker: &mut Linker<WasiState>) -> wasmtime::Result<()> {
    linker.func_wrap(
        MODULE,
        "fd_write",
        |mut caller: Caller<'_, WasiState>, fd: i32, iovs: i32, iovs_len: i32, nwritten: i32| -> i32 {
            let kind = match fd {
                1 => StreamKind::Stdout,
                2 => StreamKind::Stderr,
                _ => return ERRNO_BADF,
            };
            let Some(memory) = memory(&mut caller) else {
                return ERRNO_INVAL;
            };
            let (mem, state) = memory.data_and_store_mut(&mut caller);

            let mut total: u32 = 0;
            for index in 0..iovs_len as u32 {
                let Some((ptr, len)) = iovec(mem, iovs as u32, index) else {
                    return ERRNO_FAULT;
                };
                let Some(bytes) = slice(mem, ptr, len) else {
                    return ERRNO_FAULT;
                };
                state.io.write_stream(kind, bytes);
                total = total.saturating_add(len);
            }
            status(write_u32(mem, nwritten as u32, total))
        },
    )?;

    linker.func_wrap(
        MODULE,
        "fd_read",
        |mut caller: Caller<'_, WasiState>, fd: i32, iovs: i32, iovs_len: i32, nread: i32| -> i32 {
            if fd != 0 {
                return ERRNO_BADF;
            }
            let Some(memory) = memory(&mut caller) else {
                return ERRNO_INVAL;
            };
            let (mem, state) = memory.data_and_store_mut(&mut caller);

            let mut total: u32 = 0;
            if !state.io.is_aborted() {
                for index in 0..iovs_len as u32 {
                    let Some((ptr, len)) = iovec(mem, iovs as u32, index) else {
                        return ERRNO_FAULT;
                    };
                    let Some(target) = slice_mut(mem, ptr, len) else {
                        return ERRNO_FAULT;
                    };
                    if target.is_empty() {
                        continue;
                    }

                    // Only the first non-empty buffer may block; later ones
                    // take whatever is already buffered.
                    let n = if total == 0 {
                        state.io.stdin().read(target).unwrap_or(0)
                    } else {
                        state.io.stdin().read_available(target)
                    };
                    total += n as u32;
                    if n < target.len() {
                        break;
                    }
                }
            }
            status(write_u32(mem, nread as u32, total))
        },
    )?;

    linker.func_wrap(
        MODULE,
        "proc_exit",
        |_caller: Caller<'_, WasiState>, code: i32| -> wasmtime::Result<()> {
            Err(wasmtime::Error::new(ProcExit(code)))
        },
    )?;

    for (sizes, values) in [
        ("args_sizes_get", "args_get"),
        ("environ_sizes_get", "environ_get"),
    ] {
        linker.func_wrap(
            MODULE,
            sizes,
            |mut caller: Caller<'_, WasiState>, count: i32, buf_size: i32| -> i32 {
                let Some(memory) = memory(&mut caller) else {
                    return ERRNO_INVAL;
                };
                let mem = memory.data_mut(&mut caller);
                status(write_u32(mem, count as u32, 0) && write_u32(mem, buf_size as u32, 0))
            },
        )?;
        linker.func_wrap(
            MODULE,
            values,
            |_caller: Caller<'_, WasiState>, _ptrs: i32, _buf: i32| -> i32 { ERRNO_SUCCESS },
        )?;
    }

    linker.func_wrap(
        MODULE,
        "fd_close",
        |_caller: Caller<'_, WasiState>, _fd: i32| -> i32 { ERRNO_SUCCESS },
    )?;

    linker.func_wrap(
        MODULE,
        "fd_seek",
        |_caller: Caller<'_, WasiState>, _fd: i32, _offset: i64, _whence: i32, _new_offset: i32| -> i32 {
            ERRNO_SPIPE
        },
    )?;

    linker.func_wrap(
        MODULE,
        "fd_fdstat_get",
        |mut caller: Caller<'_, WasiState>, fd: i32, buf: i32| -> i32 {
            if !(0..=2).contains(&fd) {
                return ERRNO_BADF;
            }
            let Some(memory) = memory(&mut caller) else {
                return ERRNO_INVAL;
            };
            let mem = memory.data_mut(&mut caller);

            // struct fdstat { u8 filetype; u16 flags; u64 rights_base; u64 rights_inheriting; }
            let mut fdstat = [0u8; 24];
            fdstat[0] = FILETYPE_CHARACTER_DEVICE;
            fdstat[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
            fdstat[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
            status(write_bytes(mem, buf as u32, &fdstat))
        },
    )?;

    linker.func_wrap(
        MODULE,
        "fd_prestat_get",
        |_caller: Caller<'_, WasiState>, _fd: i32, _buf: i32| -> i32 { ERRNO_BADF },
    )?;

    linker.func_wrap(
        MODULE,
        "fd_prestat_dir_name",
        |_caller: Caller<'_, WasiState>, _fd: i32, _path: i32, _len: i32| -> i32 { ERRNO_BADF },
    )?;

    linker.func_wrap(
        MODULE,
        "clock_time_get",
        |mut caller: Caller<'_, WasiState>, clock: i32, _precision: i64, time: i32| -> i32 {
            let Some(memory) = memory(&mut caller) else {
                return ERRNO_INVAL;
            };
            let (mem, state) = memory.data_and_store_mut(&mut caller);
            let nanos = if clock == CLOCK_REALTIME {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0)
            } else {
                state.started.elapsed().as_nanos() as u64
            };
            status(write_u64(mem, time as u32, nanos))
        },
    )?;

    linker.func_wrap(
        MODULE,
        "random_get",
        |mut caller: Caller<'_, WasiState>, buf: i32, len: i32| -> i32 {
            let Some(memory) = memory(&mut caller) else {
                return ERRNO_INVAL;
            };
            let mem = memory.data_mut(&mut caller);
            match slice_mut(mem, buf as u32, len as u32) {
                Some(target) => {
                    rand::thread_rng().fill_bytes(target);
                    ERRNO_SUCCESS
                }
                None => ERRNO_FAULT,
            }
        },
    )?;

    linker.func_wrap(
        MODULE,
        "sched_yield",
        |_caller: Caller<'_, WasiState>| -> i32 {
            std::thread::yield_now();
            ERRNO_SUCCESS
        },
    )?;

    Ok(())
}
