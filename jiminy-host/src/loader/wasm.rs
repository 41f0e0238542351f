//! Executable units compiled to WebAssembly
//!
//! A Wasm unit exports `plugin_manifest`, `plugin_process`, `plugin_alloc`,
//! `plugin_dealloc` and its linear `memory` (see `jiminy-plugin-sdk`).
//! Each unit gets its own store, so one unit cannot see another's state,
//! and every call runs under a fuel limit.

use super::{LoadedUnit, LoaderError, UnitEntry, UnitLoader};
use jiminy_plugin_api::{InstancePlan, ModuleManifest, ProcessRequest, ProcessResult, API_VERSION};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use wasmtime::{Config, Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

const FUEL_PER_CALL: u64 = 10_000_000;

/// Loader for `.wasm` units
pub struct WasmLoader {
    engine: Engine,
}

/// Instance state of a loaded Wasm unit
pub struct WasmUnit {
    store: Store<()>,
    instance: Instance,
    memory: Memory,
    alloc_fn: TypedFunc<i32, i32>,
    dealloc_fn: TypedFunc<(i32, i32), ()>,
}

/// Unpack ptr and len from a packed i64
#[inline]
fn unpack_ptr_len(packed: i64) -> (i32, i32) {
    let ptr = (packed >> 32) as i32;
    let len = (packed & 0xFFFFFFFF) as i32;
    (ptr, len)
}

fn call_error(function: &'static str, e: anyhow::Error) -> LoaderError {
    if e.to_string().contains("fuel") {
        LoaderError::FuelExhausted
    } else {
        LoaderError::FunctionCall {
            function,
            source: e,
        }
    }
}

impl WasmLoader {
    /// Create a loader with fuel metering enabled
    pub fn new() -> Result<Self, LoaderError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.wasm_memory64(false);

        let engine = Engine::new(&config).map_err(LoaderError::EngineCreation)?;

        Ok(Self { engine })
    }

    /// Instantiate a unit from bytes and read its manifest
    pub fn instantiate(
        &self,
        wasm_bytes: &[u8],
    ) -> Result<(ModuleManifest, WasmUnit), LoaderError> {
        let module =
            Module::new(&self.engine, wasm_bytes).map_err(LoaderError::ModuleCompilation)?;

        let mut store = Store::new(&self.engine, ());
        store
            .set_fuel(FUEL_PER_CALL)
            .map_err(LoaderError::EngineCreation)?;

        // No host imports: units only compute plans, the host touches the scene.
        let linker = Linker::new(&self.engine);
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(LoaderError::Instantiation)?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| LoaderError::FunctionNotFound("memory".to_string()))?;

        let alloc_fn = instance
            .get_typed_func::<i32, i32>(&mut store, "plugin_alloc")
            .map_err(|_| LoaderError::FunctionNotFound("plugin_alloc".to_string()))?;

        let dealloc_fn = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, "plugin_dealloc")
            .map_err(|_| LoaderError::FunctionNotFound("plugin_dealloc".to_string()))?;

        let manifest_fn = instance
            .get_typed_func::<(), i64>(&mut store, "plugin_manifest")
            .map_err(|_| LoaderError::FunctionNotFound("plugin_manifest".to_string()))?;

        let packed = manifest_fn
            .call(&mut store, ())
            .map_err(|e| call_error("plugin_manifest", e))?;
        let (ptr, len) = unpack_ptr_len(packed);

        let manifest_bytes = read_memory(&store, &memory, ptr, len)?;
        let manifest: ModuleManifest =
            rmp_serde::from_slice(&manifest_bytes).map_err(LoaderError::Deserialization)?;

        if manifest.api_version != API_VERSION {
            return Err(LoaderError::ApiVersionMismatch {
                expected: API_VERSION,
                actual: manifest.api_version,
            });
        }

        dealloc_fn
            .call(&mut store, (ptr, len))
            .map_err(|e| call_error("plugin_dealloc", e))?;

        Ok((
            manifest,
            WasmUnit {
                store,
                instance,
                memory,
                alloc_fn,
                dealloc_fn,
            },
        ))
    }
}

impl UnitLoader for WasmLoader {
    fn extension(&self) -> &str {
        "wasm"
    }

    fn load(&self, path: &Path) -> Result<LoadedUnit, LoaderError> {
        let wasm_bytes = std::fs::read(path).map_err(|source| LoaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let (manifest, unit) = self.instantiate(&wasm_bytes)?;

        Ok(LoadedUnit::new(path, manifest.classes).with_entry(Arc::new(Mutex::new(unit))))
    }
}

fn read_memory(
    store: &Store<()>,
    memory: &Memory,
    ptr: i32,
    len: i32,
) -> Result<Vec<u8>, LoaderError> {
    let data = memory.data(store);
    let (start, len) = (ptr as u32 as usize, len as u32 as usize);
    match start.checked_add(len) {
        Some(end) if end <= data.len() => Ok(data[start..end].to_vec()),
        _ => Err(LoaderError::MemoryAccess(format!(
            "Out of bounds: ptr={}, len={}, memory_size={}",
            start,
            len,
            data.len()
        ))),
    }
}

impl WasmUnit {
    /// Run `plugin_process` for `request`
    pub fn process(&mut self, request: &ProcessRequest) -> Result<ProcessResult, LoaderError> {
        let request_bytes = rmp_serde::to_vec(request).map_err(LoaderError::Serialization)?;

        self.store
            .set_fuel(FUEL_PER_CALL)
            .map_err(LoaderError::EngineCreation)?;

        let request_len = request_bytes.len() as i32;
        let request_ptr = self
            .alloc_fn
            .call(&mut self.store, request_len)
            .map_err(|e| call_error("plugin_alloc", e))?;

        self.memory
            .write(&mut self.store, request_ptr as usize, &request_bytes)
            .map_err(|e| LoaderError::MemoryAccess(format!("Failed to write request: {}", e)))?;

        let process_fn = self
            .instance
            .get_typed_func::<(i32, i32), i64>(&mut self.store, "plugin_process")
            .map_err(|_| LoaderError::FunctionNotFound("plugin_process".to_string()))?;

        let packed = process_fn
            .call(&mut self.store, (request_ptr, request_len))
            .map_err(|e| call_error("plugin_process", e))?;
        let (result_ptr, result_len) = unpack_ptr_len(packed);

        let result_bytes = read_memory(&self.store, &self.memory, result_ptr, result_len)?;
        let result: ProcessResult =
            rmp_serde::from_slice(&result_bytes).map_err(LoaderError::Deserialization)?;

        // Leaking guest memory is harmless once the result is copied out.
        self.dealloc_fn
            .call(&mut self.store, (request_ptr, request_len))
            .ok();
        self.dealloc_fn
            .call(&mut self.store, (result_ptr, result_len))
            .ok();

        Ok(result)
    }
}

impl UnitEntry for Mutex<WasmUnit> {
    fn process(&self, request: &ProcessRequest) -> anyhow::Result<InstancePlan> {
        match self.lock().process(request)? {
            ProcessResult::Create(plan) => Ok(plan),
            ProcessResult::Error(e) => Err(anyhow::anyhow!("{}: {}", request.class, e.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_creation() {
        assert!(WasmLoader::new().is_ok());
    }

    #[test]
    fn test_pack_unpack() {
        let ptr = 0x12345678_i32;
        let len = 0x00000100_i32;
        let packed = ((ptr as i64) << 32) | (len as i64 & 0xFFFFFFFF);
        assert_eq!(unpack_ptr_len(packed), (ptr, len));
    }

    #[test]
    fn test_garbage_bytes_fail_to_compile() {
        let loader = WasmLoader::new().unwrap();
        assert!(matches!(
            loader.instantiate(b"definitely not wasm"),
            Err(LoaderError::ModuleCompilation(_))
        ));
    }

    #[test]
    fn test_module_without_exports_is_rejected() {
        let loader = WasmLoader::new().unwrap();
        assert!(matches!(
            loader.instantiate(b"(module)"),
            Err(LoaderError::FunctionNotFound(name)) if name == "memory"
        ));
    }
}
