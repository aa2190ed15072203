//! An OpenFeature provider backed by a sandboxed local resolver engine,
//! with sticky assignments and asynchronous exposure logging.
//!
//! ```rust,no_run
//! use open_feature_confidence::{ConfidenceOptions, ConfidenceProvider};
//! use open_feature::provider::FeatureProvider;
//! use open_feature::EvaluationContext;
//!
//! #[tokio::main]
//! async fn main() {
//!     let module = std::fs::read("resolver.wasm").unwrap();
//!     let provider = ConfidenceProvider::new(ConfidenceOptions::new("my-secret", module))
//!         .await
//!         .unwrap();
//!
//!     let context = EvaluationContext::default().with_targeting_key("user-123");
//!     let result = provider.resolve_bool_value("my-flag", &context).await.unwrap();
//!     println!("flag value: {}", result.value);
//!     provider.shutdown().await;
//! }
//! ```

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod logs;
pub mod state;
pub mod sticky;
pub mod transport;
pub mod types;

pub use config::ConfidenceOptions;
pub use error::ResolverError;
pub use sticky::{InMemoryMaterializationStore, MaterializationStore};
pub use transport::{DefaultTransportHooks, TransportHooks};

use async_trait::async_trait;
use convert::{
    coerce_bool, coerce_float, coerce_int, coerce_string, coerce_struct, context_to_json,
    get_value_at_path, json_to_feature_value, map_resolve_reason, split_flag_key,
    to_evaluation_error,
};
use engine::EngineSwap;
use logs::LogPipeline;
use open_feature::provider::{FeatureProvider, ProviderMetadata, ResolutionDetails};
use open_feature::{EvaluationContext, EvaluationError, EvaluationReason, StructValue, Value};
use state::StateFetcher;
use sticky::{InMemoryMaterializationStore as DefaultStore, StickyCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use types::{ClientSecret, MaterializationInfo, ResolveWithStickyRequest, SdkInfo};
use wasmtime::{Config, Engine as WasmEngine, Module};

const SDK_ID: &str = "confidence-sdk-rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
const ASSIGN_TICK: Duration = Duration::from_millis(100);

struct Scheduler {
    handle: JoinHandle<()>,
}

/// `open_feature::provider::FeatureProvider` implementation wrapping the
/// sandboxed resolver engine, sticky assignments, log shipping, and
/// periodic state refresh.
pub struct ConfidenceProvider {
    metadata: ProviderMetadata,
    client_secret: ClientSecret,
    engine: Arc<EngineSwap>,
    sticky: Arc<StickyCoordinator>,
    state_fetcher: Arc<StateFetcher>,
    log_pipeline: Arc<LogPipeline>,
    module: Module,
    scheduler: Mutex<Option<Scheduler>>,
}

impl std::fmt::Debug for ConfidenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidenceProvider").finish()
    }
}

impl ConfidenceProvider {
    /// Performs the full Init sequence: validates configuration,
    /// builds the wasm engine/module, fetches initial state, publishes it
    /// into the swap runtime, and starts the background scheduler.
    #[instrument(skip(options))]
    pub async fn new(options: ConfidenceOptions) -> Result<Self, ResolverError> {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            validate_module(&options.resolver_module)
        }))
        .map_err(|_| ResolverError::InitFatal("panic while validating resolver module".into()))??;

        let client_secret_str = options
            .client_secret()
            .ok_or_else(|| ResolverError::Config("client secret is required".into()))?;
        let client_secret = ClientSecret::new(client_secret_str);

        let mut wasm_config = Config::new();
        wasm_config.async_support(false);
        let wasm_engine = WasmEngine::new(&wasm_config)
            .map_err(|e| ResolverError::InitFatal(format!("failed to create wasm engine: {e}")))?;
        let module = Module::new(&wasm_engine, &options.resolver_module)
            .map_err(|e| ResolverError::InitFatal(format!("failed to compile resolver module: {e}")))?;

        let mut http_builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        let transport_hooks = options
            .transport_hooks
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultTransportHooks));
        http_builder = transport_hooks.modify_http(http_builder);
        let http_client = http_builder
            .build()
            .map_err(|e| ResolverError::InitFatal(format!("failed to build http client: {e}")))?;

        let log_pipeline = Arc::new(LogPipeline::new(
            http_client.clone(),
            options.ingestion_url(),
            client_secret.clone(),
        ));

        let slot_count = engine::EnginePool::slot_count();
        let engine_swap = Arc::new(EngineSwap::new(
            wasm_engine.clone(),
            log_pipeline.clone(),
            slot_count,
        ));

        let cdn_host = options.cdn_host();
        let cdn_base_url = if cdn_host.starts_with("http://") || cdn_host.starts_with("https://") {
            cdn_host
        } else {
            format!("https://{cdn_host}")
        };
        let state_fetcher = Arc::new(StateFetcher::new(http_client, &cdn_base_url, &client_secret));

        state_fetcher
            .provide()
            .await
            .map_err(|e| ResolverError::InitState(e.to_string()))?;
        if state_fetcher.account_id().is_empty() {
            return Err(ResolverError::InitState("empty account id after initial fetch".into()));
        }

        engine_swap
            .set_state(&module, &state_fetcher.as_envelope())
            .await
            .map_err(|e| ResolverError::InitEngine(e.to_string()))?;

        let store: Arc<dyn MaterializationStore> = options
            .materialization_store
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultStore::new()));
        let sticky = Arc::new(StickyCoordinator::new(engine_swap.clone(), store));

        let provider = Self {
            metadata: ProviderMetadata::new("confidence-sdk-go-local"),
            client_secret,
            engine: engine_swap,
            sticky,
            state_fetcher,
            log_pipeline,
            module,
            scheduler: Mutex::new(None),
        };

        provider.start_scheduler(options.poll_interval()).await;
        Ok(provider)
    }

    async fn start_scheduler(&self, poll_interval: Duration) {
        let engine_swap = self.engine.clone();
        let state_fetcher = self.state_fetcher.clone();
        let module = self.module.clone();

        let handle = tokio::spawn(async move {
            let mut state_tick = tokio::time::interval(poll_interval);
            let mut assign_tick = tokio::time::interval(ASSIGN_TICK);
            loop {
                tokio::select! {
                    _ = state_tick.tick() => {
                        match state_fetcher.provide().await {
                            Ok(_) => {
                                if let Err(e) = engine_swap
                                    .set_state(&module, &state_fetcher.as_envelope())
                                    .await
                                {
                                    warn!(error = %e, "failed to publish refreshed resolver state");
                                }
                            }
                            Err(e) => warn!(error = %e, "state refresh failed, continuing to serve cached state"),
                        }
                    }
                    _ = assign_tick.tick() => {
                        if let Err(e) = engine_swap.bounded_flush_assign().await {
                            debug!(error = %e, "assign flush failed");
                        }
                    }
                }
            }
        });

        *self.scheduler.lock().await = Some(Scheduler { handle });
    }

    /// Strict shutdown order: cancel the scheduler, close every
    /// engine (flushing a final log batch), then drain the log pipeline.
    /// Swapping steps 3 and 4 loses the final batch.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.handle.abort();
            let _ = scheduler.handle.await;
        }
        self.sticky.close().await;
        self.engine.close().await;
        self.log_pipeline.shutdown().await;
        info!("provider shutdown complete");
    }

    /// Returns `Ok((None, variant, reason))` for the two cases where the
    /// default must be returned silently (empty variant; `null` at the
    /// traversed path) — the caller substitutes the type-appropriate
    /// default in that case.
    #[instrument(skip(self, context), fields(flag = %flag))]
    async fn evaluate(
        &self,
        flag: &str,
        context: &EvaluationContext,
    ) -> Result<(Option<Value>, Option<String>, EvaluationReason), ResolverError> {
        let (flag_name, dotted_path) = split_flag_key(flag);

        let evaluation_context = context_to_json(context);
        let request = ResolveWithStickyRequest {
            request: types::ResolveRequest {
                flags: vec![flag_name.to_string()],
                client_secret: self.client_secret.as_str().to_string(),
                evaluation_context,
                apply: true,
                sdk: SdkInfo {
                    id: SDK_ID.to_string(),
                    version: SDK_VERSION.to_string(),
                },
            },
            materializations: std::collections::HashMap::<String, std::collections::HashMap<String, MaterializationInfo>>::new(),
            fail_fast_on_sticky: false,
            not_process_sticky: false,
        };

        let response = self.sticky.resolve(request).await?;

        let resolved_flags = match response {
            types::ResolveResponse::Success { resolved_flags, .. } => resolved_flags,
            types::ResolveResponse::MissingMaterializations { .. } => {
                return Err(ResolverError::General("missing materializations".into()));
            }
        };

        let resolved = resolved_flags
            .into_iter()
            .next()
            .ok_or_else(|| ResolverError::FlagNotFound(format!("flag '{flag_name}' not found")))?;

        if resolved.flag != flag_name {
            return Err(ResolverError::FlagNotFound("unexpected flag returned".into()));
        }

        let reason = map_resolve_reason(resolved.reason);

        if resolved.variant.is_empty() {
            return Ok((None, None, reason));
        }

        let (path_value, existed) = get_value_at_path(dotted_path, &resolved.value);
        if !existed {
            return Err(ResolverError::FlagNotFound(format!(
                "path '{dotted_path}' not found in flag '{flag_name}'"
            )));
        }

        match path_value {
            Some(serde_json::Value::Null) | None => Ok((None, Some(resolved.variant), reason)),
            Some(value) => Ok((
                Some(json_to_feature_value(value.clone())),
                Some(resolved.variant),
                reason,
            )),
        }
    }
}

fn validate_module(bytes: &[u8]) -> Result<(), ResolverError> {
    if bytes.is_empty() {
        return Err(ResolverError::Config("resolver module bytes are empty".into()));
    }
    Ok(())
}

macro_rules! resolve_primitive {
    ($name:ident, $ty:ty, $coerce:ident, $null_default:expr) => {
        async fn $name(
            &self,
            flag_key: &str,
            context: &EvaluationContext,
        ) -> Result<ResolutionDetails<$ty>, EvaluationError> {
            let (value, variant, reason) = self
                .evaluate(flag_key, context)
                .await
                .map_err(to_evaluation_error)?;

            let value = match value {
                None => {
                    return Ok(ResolutionDetails {
                        value: $null_default,
                        variant,
                        reason: Some(reason),
                        flag_metadata: Default::default(),
                    })
                }
                Some(v) => v,
            };

            let typed = $coerce(&value).map_err(to_evaluation_error)?;
            Ok(ResolutionDetails {
                value: typed,
                variant,
                reason: Some(reason),
                flag_metadata: Default::default(),
            })
        }
    };
}

#[async_trait]
impl FeatureProvider for ConfidenceProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    resolve_primitive!(resolve_bool_value, bool, coerce_bool, false);
    resolve_primitive!(resolve_int_value, i64, coerce_int, 0);
    resolve_primitive!(resolve_float_value, f64, coerce_float, 0.0);

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError> {
        let (value, variant, reason) = self
            .evaluate(flag_key, context)
            .await
            .map_err(to_evaluation_error)?;

        let value = match value {
            None => {
                return Ok(ResolutionDetails {
                    value: String::new(),
                    variant,
                    reason: Some(reason),
                    flag_metadata: Default::default(),
                })
            }
            Some(v) => v,
        };

        let typed = coerce_string(&value).map_err(to_evaluation_error)?;
        Ok(ResolutionDetails {
            value: typed,
            variant,
            reason: Some(reason),
            flag_metadata: Default::default(),
        })
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<StructValue>, EvaluationError> {
        let (value, variant, reason) = self
            .evaluate(flag_key, context)
            .await
            .map_err(to_evaluation_error)?;

        let value = match value {
            None => {
                return Ok(ResolutionDetails {
                    value: StructValue::default(),
                    variant,
                    reason: Some(reason),
                    flag_metadata: Default::default(),
                })
            }
            Some(v) => v,
        };

        let typed = coerce_struct(value).map_err(to_evaluation_error)?;
        Ok(ResolutionDetails {
            value: typed,
            variant,
            reason: Some(reason),
            flag_metadata: Default::default(),
        })
    }
}

impl Drop for ConfidenceProvider {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.scheduler.try_lock() {
            if let Some(scheduler) = guard.take() {
                scheduler.handle.abort();
                error!("ConfidenceProvider dropped without calling shutdown(); scheduler aborted");
            }
        }
    }
}
