//! Demo driver: submits a health check and a food search, polls both until
//! they finish, and prints the snapshots and stats as JSON.
//!
//! ```bash
//! forage --location "Palermo, Buenos Aires" --query sushi --workers 2
//! FORAGE_WORKERS=4 RUST_LOG=debug forage
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use forage::telemetry::init_tracing;
use forage::{
    JobId, JobManager, JobManagerBuilder, JobRequest, JobResponse, ManagerConfig,
    SampleSearchExecutor, SearchRequest,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "forage")]
#[command(about = "Run food-search jobs through the forage job runtime")]
#[command(version)]
struct Cli {
    /// Delivery location for the food search
    #[arg(long, default_value = "Buenos Aires, Argentina", env = "FORAGE_LOCATION")]
    location: String,

    /// Free-text search query
    #[arg(long, default_value = "", env = "FORAGE_QUERY")]
    query: String,

    /// Maximum restaurants to return (1-50)
    #[arg(long, default_value = "10", env = "FORAGE_MAX_RESULTS")]
    max_results: u32,

    /// Number of concurrent workers
    #[arg(long, default_value = "2", env = "FORAGE_WORKERS")]
    workers: usize,

    /// Permits on the blocking search pool (defaults to the worker count)
    #[arg(long, env = "FORAGE_BLOCKING_THREADS")]
    blocking_threads: Option<usize>,

    /// Worker poll interval in milliseconds
    #[arg(long = "poll-interval-ms", default_value = "1000", env = "FORAGE_POLL_INTERVAL_MS")]
    poll_interval_ms: u64,

    /// Retry ceiling for each job
    #[arg(long = "max-retries", default_value = "3", env = "FORAGE_MAX_RETRIES")]
    max_retries: u32,

    /// Fail attempts that exceed their timeout
    #[arg(long, env = "FORAGE_ENFORCE_TIMEOUTS")]
    enforce_timeouts: bool,

    /// Simulated health-check latency in milliseconds
    #[arg(long = "health-check-delay-ms", default_value = "2000", env = "FORAGE_HEALTH_CHECK_DELAY_MS")]
    health_check_delay_ms: u64,

    /// How often to poll job status, in milliseconds
    #[arg(long = "status-interval-ms", default_value = "250", env = "FORAGE_STATUS_INTERVAL_MS")]
    status_interval_ms: u64,
}

impl Cli {
    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            workers: self.workers,
            blocking_threads: self.blocking_threads,
            poll_interval_ms: self.poll_interval_ms,
            default_max_retries: self.max_retries,
            enforce_timeouts: self.enforce_timeouts,
            health_check_delay_ms: self.health_check_delay_ms,
            ..ManagerConfig::default()
        }
    }

    fn search_request(&self) -> SearchRequest {
        SearchRequest::new(&self.location)
            .with_query(&self.query)
            .with_max_results(self.max_results)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    forage::metrics::init_metrics()?;

    let manager = JobManagerBuilder::new(cli.manager_config())
        .with_search_executor(Arc::new(SampleSearchExecutor))
        .build()
        .context("failed to build job manager")?;
    manager.start().await?;

    let outcome = tokio::select! {
        result = run(&manager, &cli) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    };

    manager.shutdown().await;

    #[cfg(feature = "metrics")]
    println!("{}", forage::metrics::gather_metrics()?);

    outcome
}

async fn run(manager: &JobManager, cli: &Cli) -> anyhow::Result<()> {
    let health = manager.create_job(JobRequest::health_check())?;
    println!("{}", serde_json::to_string_pretty(&JobResponse::created(&health))?);

    let search = manager
        .create_food_search_job(&cli.search_request())
        .context("invalid search request")?;
    println!("{}", serde_json::to_string_pretty(&JobResponse::created(&search))?);

    let interval = Duration::from_millis(cli.status_interval_ms.max(10));
    for id in [health.id, search.id] {
        let response = wait_until_finished(manager, id, interval).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    println!("{}", serde_json::to_string_pretty(&manager.stats())?);
    Ok(())
}

async fn wait_until_finished(
    manager: &JobManager,
    id: JobId,
    interval: Duration,
) -> anyhow::Result<JobResponse> {
    let mut last_message = String::new();
    loop {
        let job = manager.get_job(id)?;
        let response = JobResponse::from(&job);
        if response.message != last_message {
            tracing::info!(job_id = %id, status = %job.status, "{}", response.message);
            last_message.clone_from(&response.message);
        }
        if job.status.is_finished() {
            return Ok(response);
        }
        tokio::time::sleep(interval).await;
    }
}
