//! Wire-level message types exchanged with the resolver engine.
//!
//! The engine ABI is deliberately opaque about its encoding; these types are encoded as JSON
//! across the `alloc`/`free` memory boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque account-scope identifier. Wrapped so it never gets logged or
/// `Debug`-printed by accident, and so call sites can't confuse it with an
/// arbitrary `String`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClientSecret(<redacted>)")
    }
}

/// The envelope used at every host/engine call boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `(state: bytes, accountId: string)` — the only way state enters the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResolverStateEnvelope {
    pub state: Vec<u8>,
    #[serde(rename = "accountId")]
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkInfo {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub flags: Vec<String>,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(rename = "evaluationContext")]
    pub evaluation_context: serde_json::Value,
    pub apply: bool,
    pub sdk: SdkInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MaterializationInfo {
    #[serde(rename = "unitInMaterialization")]
    pub unit_in_materialization: bool,
    #[serde(rename = "ruleToVariant")]
    pub rule_to_variant: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveWithStickyRequest {
    #[serde(flatten)]
    pub request: ResolveRequest,
    /// unit -> (materialization name -> info)
    pub materializations: HashMap<String, HashMap<String, MaterializationInfo>>,
    #[serde(rename = "failFastOnSticky")]
    pub fail_fast_on_sticky: bool,
    #[serde(rename = "notProcessSticky")]
    pub not_process_sticky: bool,
}

/// Reason codes emitted by the engine, mapped onto `open_feature::EvaluationReason`
/// by [`crate::convert::map_resolve_reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveReason {
    #[serde(rename = "MATCH")]
    Match,
    #[serde(rename = "NO_SEGMENT_MATCH")]
    NoSegmentMatch,
    #[serde(rename = "FLAG_ARCHIVED")]
    FlagArchived,
    #[serde(rename = "TARGETING_KEY_ERROR")]
    TargetingKeyError,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedFlag {
    pub flag: String,
    #[serde(default)]
    pub variant: String,
    pub value: serde_json::Value,
    pub reason: ResolveReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingItem {
    pub unit: String,
    pub rule: String,
    #[serde(rename = "readMaterialization")]
    pub read_materialization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationUpdate {
    pub unit: String,
    pub rule: String,
    #[serde(rename = "writeMaterialization")]
    pub write_materialization: String,
    pub variant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResolveResponse {
    Success {
        #[serde(rename = "resolvedFlags")]
        resolved_flags: Vec<ResolvedFlag>,
        #[serde(rename = "materializationUpdates", default)]
        materialization_updates: Vec<MaterializationUpdate>,
    },
    MissingMaterializations {
        items: Vec<MissingItem>,
    },
}

/// An exposure/telemetry batch surfaced by `bounded_flush_logs` /
/// `bounded_flush_assign`. Treated opaquely beyond the count of
/// `flag_assigned`, which drives chunking.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WriteFlagLogsRequest {
    #[serde(rename = "flagAssigned", default)]
    pub flag_assigned: Vec<serde_json::Value>,
    #[serde(rename = "clientResolveInfo", default)]
    pub client_resolve_info: Vec<serde_json::Value>,
    #[serde(rename = "flagResolveInfo", default)]
    pub flag_resolve_info: Vec<serde_json::Value>,
    #[serde(rename = "telemetryData", default)]
    pub telemetry_data: Option<serde_json::Value>,
}

impl WriteFlagLogsRequest {
    pub fn is_empty(&self) -> bool {
        self.flag_assigned.is_empty()
            && self.client_resolve_info.is_empty()
            && self.flag_resolve_info.is_empty()
    }
}
