/// Builder for constructing job manager instances.
pub mod builder;
/// Shutdown signalling and the worker pool.
pub mod supervisor;
/// Worker configuration and the worker loop.
pub mod worker;

pub use builder::JobManagerBuilder;
pub use supervisor::{ShutdownToken, WorkerPool};
pub use worker::WorkerConfig;
