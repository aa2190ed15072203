//! C1 — Engine Host: wraps one sandboxed resolver engine instance.
//!
//! The engine is an opaque WebAssembly module, run under `wasmtime`, that
//! exports a fixed message-passing ABI. This module owns the call
//! protocol (alloc/write/call/copy-out/free) and nothing else — it never
//! interprets the payload bytes beyond the envelope.

use crate::error::ResolverError;
use crate::types::{CallEnvelope, CallResponse};
use async_trait::async_trait;
use prost::Message;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use wasmtime::{Caller, Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

/// Receives batches harvested from the engine's log-flushing exports.
/// Implemented by the log pipeline; a no-op sink drops everything.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, batch: crate::types::WriteFlagLogsRequest);
}

pub struct NoopLogSink;

#[async_trait]
impl LogSink for NoopLogSink {
    async fn write(&self, _batch: crate::types::WriteFlagLogsRequest) {}
}

/// Exported functions cached after instantiation so every call avoids a
/// name lookup.
struct Exports {
    alloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    set_resolver_state: TypedFunc<u32, u32>,
    resolve_with_sticky: TypedFunc<u32, u32>,
    bounded_flush_logs: TypedFunc<(), u32>,
    bounded_flush_assign: TypedFunc<(), u32>,
    memory: Memory,
}

/// One sandboxed resolver engine instance.
///
/// Invariant: at most one concurrent call per instance. Enforced by
/// serializing every call through `call_mutex`.
pub struct EngineHost {
    store: Mutex<Store<()>>,
    exports: Exports,
    log_sink: Arc<dyn LogSink>,
    closed: std::sync::atomic::AtomicBool,
}

fn current_time_payload() -> Vec<u8> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let ts = prost_types::Timestamp {
        seconds: now.as_secs() as i64,
        nanos: now.subsec_nanos() as i32,
    };
    ts.encode_to_vec()
}

/// Writes `payload` into the module's memory through its own `alloc`
/// export, reproducing the `ptr-4`-length-header convention the module
/// itself maintains, and returns the resulting pointer.
fn host_alloc_and_write(
    mut caller: Caller<'_, ()>,
    payload: &[u8],
) -> Result<u32, wasmtime::Error> {
    let alloc = caller
        .get_export("alloc")
        .and_then(|e| e.into_func())
        .ok_or_else(|| wasmtime::Error::msg("engine module missing `alloc` export"))?
        .typed::<u32, u32>(&caller)?;
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| wasmtime::Error::msg("engine module missing `memory` export"))?;

    let ptr = alloc.call(&mut caller, payload.len() as u32)?;
    memory.write(&mut caller, ptr as usize, payload)?;
    Ok(ptr)
}

impl EngineHost {
    /// Instantiates a fresh engine from compiled WASM bytes, wiring the
    /// `current_time` import and the log sink used to harvest
    /// exposure batches.
    pub fn instantiate(
        engine: &Engine,
        module: &Module,
        log_sink: Arc<dyn LogSink>,
    ) -> Result<Self, ResolverError> {
        let mut linker: Linker<()> = Linker::new(engine);
        linker
            .func_wrap("env", "current_time", |caller: Caller<'_, ()>| -> u32 {
                let payload = current_time_payload();
                host_alloc_and_write(caller, &payload).unwrap_or(0)
            })
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;

        let mut store = Store::new(engine, ());
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;

        let exports = Self::resolve_exports(&mut store, &instance)?;

        Ok(Self {
            store: Mutex::new(store),
            exports,
            log_sink,
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn resolve_exports(
        store: &mut Store<()>,
        instance: &Instance,
    ) -> Result<Exports, ResolverError> {
        let get = |name: &str| -> Result<_, ResolverError> {
            instance
                .get_export(&mut *store, name)
                .ok_or_else(|| ResolverError::EngineCall(format!("missing export `{name}`")))
        };
        let memory = get("memory")?
            .into_memory()
            .ok_or_else(|| ResolverError::EngineCall("`memory` is not a memory export".into()))?;

        Ok(Exports {
            alloc: instance
                .get_typed_func(&mut *store, "alloc")
                .map_err(|e| ResolverError::EngineCall(e.to_string()))?,
            free: instance
                .get_typed_func(&mut *store, "free")
                .map_err(|e| ResolverError::EngineCall(e.to_string()))?,
            set_resolver_state: instance
                .get_typed_func(&mut *store, "set_resolver_state")
                .map_err(|e| ResolverError::EngineCall(e.to_string()))?,
            resolve_with_sticky: instance
                .get_typed_func(&mut *store, "resolve_with_sticky")
                .map_err(|e| ResolverError::EngineCall(e.to_string()))?,
            bounded_flush_logs: instance
                .get_typed_func(&mut *store, "bounded_flush_logs")
                .map_err(|e| ResolverError::EngineCall(e.to_string()))?,
            bounded_flush_assign: instance
                .get_typed_func(&mut *store, "bounded_flush_assign")
                .map_err(|e| ResolverError::EngineCall(e.to_string()))?,
            memory,
        })
    }

    fn ensure_open(&self) -> Result<(), ResolverError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(ResolverError::InstanceClosed);
        }
        Ok(())
    }

    /// Writes `request` through `alloc`, invokes `func(reqPtr)`, copies out
    /// and frees the response, and deserializes it as `R`. Generic over the
    /// request/response payload types.
    async fn call<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        func: TypedFunc<u32, u32>,
        request: &Req,
    ) -> Result<Resp, ResolverError> {
        self.ensure_open()?;
        let envelope = CallEnvelope {
            data: serde_json::to_vec(request)?,
        };
        let payload = serde_json::to_vec(&envelope)?;

        let mut store = self.store.lock().await;

        let req_ptr = self
            .exports
            .alloc
            .call(&mut *store, payload.len() as u32)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;
        self.exports
            .memory
            .write(&mut *store, req_ptr as usize, &payload)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;

        let resp_ptr = func
            .call(&mut *store, req_ptr)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;

        let response: CallResponse = self.copy_out_and_free(&mut store, resp_ptr)?;
        drop(store);

        if let Some(error) = response.error {
            return Err(ResolverError::EngineCall(error));
        }
        let data = response
            .data
            .ok_or_else(|| ResolverError::EngineCall("empty engine response".into()))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Calls a zero-argument maintenance export (`bounded_flush_logs`,
    /// `bounded_flush_assign`) and harvests any non-empty batch to the log
    /// sink.
    async fn call_flush(
        &self,
        func: TypedFunc<(), u32>,
    ) -> Result<crate::types::WriteFlagLogsRequest, ResolverError> {
        self.ensure_open()?;
        let mut store = self.store.lock().await;
        let resp_ptr = func
            .call(&mut *store, ())
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;
        if resp_ptr == 0 {
            return Ok(crate::types::WriteFlagLogsRequest::default());
        }
        let response: CallResponse = self.copy_out_and_free(&mut store, resp_ptr)?;
        drop(store);

        if let Some(error) = response.error {
            return Err(ResolverError::EngineCall(error));
        }
        match response.data {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(crate::types::WriteFlagLogsRequest::default()),
        }
    }

    fn copy_out_and_free<R: serde::de::DeserializeOwned>(
        &self,
        store: &mut Store<()>,
        resp_ptr: u32,
    ) -> Result<R, ResolverError> {
        if resp_ptr == 0 {
            return Err(ResolverError::EngineCall("no response".into()));
        }
        let mut header = [0u8; 4];
        self.exports
            .memory
            .read(&mut *store, (resp_ptr - 4) as usize, &mut header)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;
        let total_len = u32::from_le_bytes(header);
        let payload_len = total_len.saturating_sub(4) as usize;

        let mut payload = vec![0u8; payload_len];
        self.exports
            .memory
            .read(&mut *store, resp_ptr as usize, &mut payload)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;

        self.exports
            .free
            .call(&mut *store, resp_ptr)
            .map_err(|e| ResolverError::EngineCall(e.to_string()))?;

        Ok(serde_json::from_slice(&payload)?)
    }

    pub async fn set_resolver_state(
        &self,
        envelope: &crate::types::SetResolverStateEnvelope,
    ) -> Result<(), ResolverError> {
        let _: serde_json::Value = self.call(self.exports.set_resolver_state, envelope).await?;
        Ok(())
    }

    pub async fn resolve_with_sticky(
        &self,
        request: &crate::types::ResolveWithStickyRequest,
    ) -> Result<crate::types::ResolveResponse, ResolverError> {
        self.call(self.exports.resolve_with_sticky, request).await
    }

    pub async fn bounded_flush_logs(&self) -> Result<(), ResolverError> {
        let batch = self.call_flush(self.exports.bounded_flush_logs).await?;
        if !batch.is_empty() {
            self.log_sink.write(batch).await;
        }
        Ok(())
    }

    pub async fn bounded_flush_assign(&self) -> Result<(), ResolverError> {
        let batch = self.call_flush(self.exports.bounded_flush_assign).await?;
        if !batch.is_empty() {
            self.log_sink.write(batch).await;
        }
        Ok(())
    }

    /// Marks the instance terminated and performs one last log flush.
    /// Concurrent callers observe `InstanceClosed` from that point on.
    pub async fn close(&self) {
        debug!("closing engine instance");
        if let Err(e) = self.bounded_flush_logs().await {
            debug!(error = %e, "final log flush failed during close");
        }
        self.closed
            .store(true, std::sync::atomic::Ordering::Release);
    }
}
