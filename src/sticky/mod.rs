//! C4 — Sticky Coordinator: mediates between the engine's conditional
//! resolution and the materialization store.

pub mod store;

pub use store::{
    InMemoryMaterializationStore, MaterializationStore, MaterializationStoreError, ReadOp,
    ReadResult, WriteOp,
};

use crate::engine::EngineSwap;
use crate::error::ResolverError;
use crate::types::{MaterializationInfo, ResolveResponse, ResolveWithStickyRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 5;

/// Decorates an [`EngineSwap`] with sticky-assignment handling. Writes back
/// to the store are fire-and-forget from the caller's perspective but are
/// tracked in a `JoinSet` so `close` can drain them before shutdown
/// completes.
pub struct StickyCoordinator {
    inner: Arc<EngineSwap>,
    store: Arc<dyn MaterializationStore>,
    pending_writes: Mutex<JoinSet<()>>,
}

impl StickyCoordinator {
    pub fn new(inner: Arc<EngineSwap>, store: Arc<dyn MaterializationStore>) -> Self {
        Self {
            inner,
            store,
            pending_writes: Mutex::new(JoinSet::new()),
        }
    }

    pub async fn resolve(
        &self,
        mut request: ResolveWithStickyRequest,
    ) -> Result<ResolveResponse, ResolverError> {
        for attempt in 0..=MAX_RETRIES {
            let response = self.inner.resolve(&request).await?;
            match response {
                ResolveResponse::Success {
                    resolved_flags,
                    materialization_updates,
                } => {
                    if !materialization_updates.is_empty() {
                        self.spawn_writes(materialization_updates.iter().map(|u| WriteOp::Variant {
                            materialization: u.write_materialization.clone(),
                            unit: u.unit.clone(),
                            rule: u.rule.clone(),
                            variant: u.variant.clone(),
                        }))
                        .await;
                    }
                    return Ok(ResolveResponse::Success {
                        resolved_flags,
                        materialization_updates,
                    });
                }
                ResolveResponse::MissingMaterializations { items } => {
                    if attempt == MAX_RETRIES {
                        break;
                    }
                    debug!(
                        attempt,
                        missing = items.len(),
                        "engine reported missing materializations, reading from store"
                    );
                    let ops: Vec<ReadOp> = items
                        .iter()
                        .map(|item| ReadOp::Variant {
                            materialization: item.read_materialization.clone(),
                            unit: item.unit.clone(),
                            rule: item.rule.clone(),
                        })
                        .collect();

                    let results = self.store.read(&ops).await.map_err(|e| match e {
                        MaterializationStoreError::NotSupported => ResolverError::StickyUnsupported,
                        MaterializationStoreError::Backend(msg) => ResolverError::General(msg),
                    })?;

                    merge_into_request(&mut request, results);
                }
            }
        }
        Err(ResolverError::StickyExhausted)
    }

    async fn spawn_writes(&self, ops: impl IntoIterator<Item = WriteOp>) {
        let ops: Vec<WriteOp> = ops.into_iter().collect();
        if ops.is_empty() {
            return;
        }
        let store = self.store.clone();
        let mut pending = self.pending_writes.lock().await;
        pending.spawn(async move {
            if let Err(e) = store.write(&ops).await {
                warn!(error = %e, "failed to persist materialization update");
            }
        });
    }

    /// Drains all outstanding writes. Must complete before provider shutdown
    /// returns.
    pub async fn close(&self) {
        let mut pending = self.pending_writes.lock().await;
        while pending.join_next().await.is_some() {}
        self.store.close().await;
    }
}

fn merge_into_request(
    request: &mut ResolveWithStickyRequest,
    results: Vec<ReadResult>,
) {
    for result in results {
        if let ReadResult::Variant {
            materialization,
            unit,
            rule,
            variant: Some(variant),
        } = result
        {
            let per_materialization = request.materializations.entry(unit).or_default();
            let info = per_materialization
                .entry(materialization)
                .or_insert_with(|| MaterializationInfo {
                    unit_in_materialization: true,
                    rule_to_variant: HashMap::new(),
                });
            info.unit_in_materialization = true;
            info.rule_to_variant.insert(rule, variant);
        }
    }
}
