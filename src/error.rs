use thiserror::Error;

/// Error taxonomy for the resolver core.
///
/// Every fallible core operation returns one of these variants. At the
/// `FeatureProvider` boundary they are collapsed into `(default, reason,
/// EvaluationError)` — see [`crate::convert::to_evaluation_error`].
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("PROVIDER_NOT_READY: {0}")]
    ProviderNotReady(String),

    #[error("FLAG_NOT_FOUND: {0}")]
    FlagNotFound(String),

    #[error("TYPE_MISMATCH: {0}")]
    TypeMismatch(String),

    #[error("GENERAL: {0}")]
    General(String),

    #[error("CONVERSION: unsupported type: {0}")]
    Conversion(String),

    #[error("engine call failed: {0}")]
    EngineCall(String),

    #[error("engine instance closed")]
    InstanceClosed,

    #[error("resolver not initialized")]
    NotInitialized,

    #[error("exceeded maximum retries (5) for handling missing materializations")]
    StickyExhausted,

    #[error("materialization read not supported, falling back to remote resolution")]
    StickyUnsupported,

    #[error("state fetch failed: {0}")]
    StateFetch(String),

    #[error("failed to fetch initial resolver state: {0}")]
    InitState(String),

    #[error("failed to load initial resolver state into engine: {0}")]
    InitEngine(String),

    #[error("panic during provider initialization: {0}")]
    InitFatal(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ResolverError {
    fn from(error: reqwest::Error) -> Self {
        ResolverError::StateFetch(error.to_string())
    }
}

impl From<wasmtime::Error> for ResolverError {
    fn from(error: wasmtime::Error) -> Self {
        ResolverError::EngineCall(error.to_string())
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(error: serde_json::Error) -> Self {
        ResolverError::EngineCall(format!("malformed engine message: {error}"))
    }
}
