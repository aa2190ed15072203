//! Sandboxed resolver engine: host protocol (C1), pool (C2), swap runtime (C3).

pub mod host;
pub mod pool;
pub mod swap;

pub use host::{EngineHost, LogSink, NoopLogSink};
pub use pool::EnginePool;
pub use swap::EngineSwap;
