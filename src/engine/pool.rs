//! C2 — Engine Pool: N+1 slots sharing one logical state.

use crate::engine::host::{EngineHost, LogSink};
use crate::error::ResolverError;
use crate::types::{ResolveResponse, ResolveWithStickyRequest, SetResolverStateEnvelope};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use wasmtime::{Engine as WasmEngine, Module};

struct Slot {
    engine: RwLock<EngineHost>,
}

/// Round-robins evaluations across `N+1` slots and serializes maintenance
/// operations (state swap, log/assign flush, close) across all of them
/// under a single mutex, so a `set_resolver_state` call is observed
/// atomically by every subsequent evaluation.
pub struct EnginePool {
    slots: Vec<Slot>,
    cursor: AtomicUsize,
    maintenance: Mutex<()>,
}

impl EnginePool {
    /// `N` defaults to available hardware parallelism; one extra slot is
    /// always added so maintenance never has to wait for every in-flight
    /// reader.
    pub fn slot_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            + 1
    }

    pub fn new(
        wasm_engine: &WasmEngine,
        module: &Module,
        log_sink: Arc<dyn LogSink>,
        slot_count: usize,
    ) -> Result<Self, ResolverError> {
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let host = EngineHost::instantiate(wasm_engine, module, log_sink.clone())?;
            slots.push(Slot {
                engine: RwLock::new(host),
            });
        }
        Ok(Self {
            slots,
            cursor: AtomicUsize::new(0),
            maintenance: Mutex::new(()),
        })
    }

    /// Picks a slot without blocking on a maintenance writer: advances the
    /// round-robin cursor until a `try_read` succeeds. Ordering across
    /// slots is not preserved.
    pub async fn resolve_with_sticky(
        &self,
        request: &ResolveWithStickyRequest,
    ) -> Result<ResolveResponse, ResolverError> {
        let len = self.slots.len();
        loop {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            if let Ok(slot) = self.slots[idx].engine.try_read() {
                return slot.resolve_with_sticky(request).await;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Takes the pool-level maintenance mutex (to order maintenance ops
    /// globally), then each slot's write lock in turn, joining any errors.
    /// This guarantees every slot carries the new state before the call
    /// returns, and that no evaluation ever observes a half-updated slot.
    pub async fn set_resolver_state(
        &self,
        envelope: &SetResolverStateEnvelope,
    ) -> Result<(), ResolverError> {
        let _guard = self.maintenance.lock().await;
        let mut errors = Vec::new();
        for slot in &self.slots {
            let engine = slot.engine.write().await;
            if let Err(e) = engine.set_resolver_state(envelope).await {
                errors.push(e.to_string());
            }
        }
        join_errors(errors)
    }

    pub async fn bounded_flush_logs(&self) -> Result<(), ResolverError> {
        let _guard = self.maintenance.lock().await;
        let mut errors = Vec::new();
        for slot in &self.slots {
            let engine = slot.engine.write().await;
            if let Err(e) = engine.bounded_flush_logs().await {
                errors.push(e.to_string());
            }
        }
        join_errors(errors)
    }

    pub async fn bounded_flush_assign(&self) -> Result<(), ResolverError> {
        let _guard = self.maintenance.lock().await;
        let mut errors = Vec::new();
        for slot in &self.slots {
            let engine = slot.engine.write().await;
            if let Err(e) = engine.bounded_flush_assign().await {
                errors.push(e.to_string());
            }
        }
        join_errors(errors)
    }

    pub async fn close(&self) {
        let _guard = self.maintenance.lock().await;
        for slot in &self.slots {
            let engine = slot.engine.write().await;
            engine.close().await;
        }
    }
}

fn join_errors(errors: Vec<String>) -> Result<(), ResolverError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ResolverError::General(errors.join("; ")))
    }
}
