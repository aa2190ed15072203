//! C5 — Materialization Store: abstract batch read/write of sticky
//! assignment data, plus an in-memory reference implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum MaterializationStoreError {
    #[error("materialization read not supported by this store")]
    NotSupported,
    #[error("materialization store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub enum ReadOp {
    Inclusion { materialization: String, unit: String },
    Variant {
        materialization: String,
        unit: String,
        rule: String,
    },
}

#[derive(Debug, Clone)]
pub enum ReadResult {
    Inclusion {
        materialization: String,
        unit: String,
        included: bool,
    },
    Variant {
        materialization: String,
        unit: String,
        rule: String,
        variant: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Inclusion {
        materialization: String,
        unit: String,
        included: bool,
    },
    Variant {
        materialization: String,
        unit: String,
        rule: String,
        variant: String,
    },
}

/// Abstract batched access to sticky assignment data. Every method
/// batches so a single coordinator retry round costs one call, not one per
/// missing item.
#[async_trait]
pub trait MaterializationStore: Send + Sync {
    async fn read(&self, ops: &[ReadOp]) -> Result<Vec<ReadResult>, MaterializationStoreError>;
    async fn write(&self, ops: &[WriteOp]) -> Result<(), MaterializationStoreError>;
    async fn close(&self) {}
}

#[derive(Debug, Clone, Default)]
struct UnitRecord {
    included: bool,
    rule_to_variant: HashMap<String, String>,
}

/// Reference implementation. No persistence, no TTL, unbounded growth — not
/// meant for production use, only for local development and tests.
#[derive(Default)]
pub struct InMemoryMaterializationStore {
    // materialization -> unit -> record
    data: RwLock<HashMap<String, HashMap<String, UnitRecord>>>,
}

impl InMemoryMaterializationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MaterializationStore for InMemoryMaterializationStore {
    async fn read(&self, ops: &[ReadOp]) -> Result<Vec<ReadResult>, MaterializationStoreError> {
        let data = self.data.read().await;
        let mut out = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                ReadOp::Inclusion { materialization, unit } => {
                    let included = data
                        .get(materialization)
                        .and_then(|units| units.get(unit))
                        .map(|r| r.included)
                        .unwrap_or(false);
                    out.push(ReadResult::Inclusion {
                        materialization: materialization.clone(),
                        unit: unit.clone(),
                        included,
                    });
                }
                ReadOp::Variant {
                    materialization,
                    unit,
                    rule,
                } => {
                    let variant = data
                        .get(materialization)
                        .and_then(|units| units.get(unit))
                        .and_then(|r| r.rule_to_variant.get(rule))
                        .cloned();
                    out.push(ReadResult::Variant {
                        materialization: materialization.clone(),
                        unit: unit.clone(),
                        rule: rule.clone(),
                        variant,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn write(&self, ops: &[WriteOp]) -> Result<(), MaterializationStoreError> {
        let mut data = self.data.write().await;
        for op in ops {
            match op {
                WriteOp::Inclusion {
                    materialization,
                    unit,
                    included,
                } => {
                    let record = data
                        .entry(materialization.clone())
                        .or_default()
                        .entry(unit.clone())
                        .or_default();
                    record.included = *included;
                }
                WriteOp::Variant {
                    materialization,
                    unit,
                    rule,
                    variant,
                } => {
                    let record = data
                        .entry(materialization.clone())
                        .or_default()
                        .entry(unit.clone())
                        .or_default();
                    record.rule_to_variant.insert(rule.clone(), variant.clone());
                }
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.data.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn round_trips_variant_assignments() {
        let store = InMemoryMaterializationStore::new();
        store
            .write(&[WriteOp::Variant {
                materialization: "seg-a".into(),
                unit: "user-1".into(),
                rule: "rule-1".into(),
                variant: "treatment".into(),
            }])
            .await
            .unwrap();

        let results = store
            .read(&[ReadOp::Variant {
                materialization: "seg-a".into(),
                unit: "user-1".into(),
                rule: "rule-1".into(),
            }])
            .await
            .unwrap();

        match &results[0] {
            ReadResult::Variant { variant, .. } => {
                assert_eq!(variant.as_deref(), Some("treatment"))
            }
            _ => panic!("expected Variant result"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn missing_assignment_reads_as_none() {
        let store = InMemoryMaterializationStore::new();
        let results = store
            .read(&[ReadOp::Variant {
                materialization: "seg-a".into(),
                unit: "nobody".into(),
                rule: "rule-1".into(),
            }])
            .await
            .unwrap();
        match &results[0] {
            ReadResult::Variant { variant, .. } => assert!(variant.is_none()),
            _ => panic!("expected Variant result"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn close_clears_all_state() {
        let store = InMemoryMaterializationStore::new();
        store
            .write(&[WriteOp::Inclusion {
                materialization: "seg-a".into(),
                unit: "user-1".into(),
                included: true,
            }])
            .await
            .unwrap();
        store.close().await;
        let results = store
            .read(&[ReadOp::Inclusion {
                materialization: "seg-a".into(),
                unit: "user-1".into(),
            }])
            .await
            .unwrap();
        match &results[0] {
            ReadResult::Inclusion { included, .. } => assert!(!included),
            _ => panic!("expected Inclusion result"),
        }
    }
}
