//! C3 — Swap Runtime: atomic hot-swap of the published `EnginePool`.
//!
//! `set_state` builds a brand new pool from compiled WASM + fresh resolver
//! state and publishes it atomically; in-flight `resolve` calls against the
//! old pool finish against the old pool, never a half-built one.

use crate::engine::{EngineHost, EnginePool, LogSink};
use crate::error::ResolverError;
use crate::types::{ResolveResponse, ResolveWithStickyRequest, SetResolverStateEnvelope};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{debug, warn};
use wasmtime::{Engine as WasmEngine, Module};

pub struct EngineSwap {
    wasm_engine: WasmEngine,
    log_sink: Arc<dyn LogSink>,
    slot_count: usize,
    current: ArcSwapOption<EnginePool>,
}

impl EngineSwap {
    pub fn new(wasm_engine: WasmEngine, log_sink: Arc<dyn LogSink>, slot_count: usize) -> Self {
        Self {
            wasm_engine,
            log_sink,
            slot_count,
            current: ArcSwapOption::empty(),
        }
    }

    /// Compiles `module` fresh, instantiates a full pool against it, loads
    /// `envelope` into every slot, then publishes the pool atomically.
    /// The previous pool, if any, is dropped once its last
    /// reader finishes.
    pub async fn set_state(
        &self,
        module: &Module,
        envelope: &SetResolverStateEnvelope,
    ) -> Result<(), ResolverError> {
        let pool = EnginePool::new(
            &self.wasm_engine,
            module,
            self.log_sink.clone(),
            self.slot_count,
        )?;
        pool.set_resolver_state(envelope).await?;
        let old = self.current.swap(Some(Arc::new(pool)));
        debug!(slots = self.slot_count, "published new engine pool");
        if let Some(old) = old {
            tokio::spawn(async move {
                old.close().await;
            });
        }
        Ok(())
    }

    /// Resolves against the currently published pool, retrying once if the
    /// picked instance reports `InstanceClosed` (a race with a concurrent
    /// swap tearing down the old pool). Returns `NotInitialized` if no pool
    /// has ever been published.
    pub async fn resolve(
        &self,
        request: &ResolveWithStickyRequest,
    ) -> Result<ResolveResponse, ResolverError> {
        let pool = self.current.load_full().ok_or(ResolverError::NotInitialized)?;
        match pool.resolve_with_sticky(request).await {
            Err(ResolverError::InstanceClosed) => {
                warn!("resolve hit a closed instance mid-swap, retrying once");
                let pool = self.current.load_full().ok_or(ResolverError::NotInitialized)?;
                pool.resolve_with_sticky(request).await
            }
            other => other,
        }
    }

    pub async fn bounded_flush_logs(&self) -> Result<(), ResolverError> {
        match self.current.load_full() {
            Some(pool) => pool.bounded_flush_logs().await,
            None => Ok(()),
        }
    }

    pub async fn bounded_flush_assign(&self) -> Result<(), ResolverError> {
        match self.current.load_full() {
            Some(pool) => pool.bounded_flush_assign().await,
            None => Ok(()),
        }
    }

    pub async fn close(&self) {
        if let Some(pool) = self.current.swap(None) {
            pool.close().await;
        }
    }
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<EngineSwap>();
    assert::<EngineHost>();
}
