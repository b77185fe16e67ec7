//! WebAssembly programs run with wasmtime.

use wasmtime::{Config, Engine, Linker, Module, Store, Trap};

use crate::error::{Error, Result};

use super::program::{Program, ProgramIo};
use super::wasi::{self, ProcExit, WasiState};

/// A validated wasm module with its own engine.
///
/// Each program gets a private engine so that bumping its epoch on abort
/// interrupts only this run.
pub struct WasmProgram {
    engine: Engine,
    module: Module,
}

impl WasmProgram {
    /// Validate and compile a module. Accepts the binary or text format.
    pub fn compile(bytes: &[u8]) -> Result<Self> {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config)
            .map_err(|e| Error::Environment(format!("cannot create wasm engine: {}", e)))?;

        let module = Module::new(&engine, bytes).map_err(|e| Error::Compile {
            message: format!("{:#}", e),
        })?;

        tracing::debug!(
            "Compiled wasm module with {} imports",
            module.imports().len()
        );
        Ok(Self { engine, module })
    }

    fn instantiate_and_start(&self, store: &mut Store<WasiState>) -> wasmtime::Result<()> {
        let mut linker = Linker::new(&self.engine);
        wasi::add_to_linker(&mut linker)?;
        linker.define_unknown_imports_as_traps(&self.module)?;

        let instance = linker.instantiate(&mut *store, &self.module)?;
        let start = instance.get_typed_func::<(), ()>(&mut *store, "_start")?;
        start.call(&mut *store, ())
    }
}

impl Program for WasmProgram {
    fn run(self: Box<Self>, io: ProgramIo) -> Result<i32> {
        let abort = io.abort_handle().clone();
        let engine = self.engine.clone();
        let _interrupt = abort.on_abort(move || engine.increment_epoch());

        let mut store = Store::new(&self.engine, WasiState::new(io));
        store.set_epoch_deadline(1);

        if abort.is_aborted() {
            return Err(Error::Aborted);
        }

        let outcome = self.instantiate_and_start(&mut store);
        store.data_mut().io.flush();

        match outcome {
            Ok(()) => Ok(0),
            Err(e) => {
                if let Some(ProcExit(code)) = e.downcast_ref::<ProcExit>() {
                    return Ok(*code);
                }
                if abort.is_aborted() || matches!(e.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
                    return Err(Error::Aborted);
                }
                Err(Error::Runtime(format!("{:#}", e)))
            }
        }
    }
}
