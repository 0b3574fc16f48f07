//! Scaffold service: connects to PostgreSQL, RabbitMQ and Redis, keeps the three
//! connections supervised, and shuts them down cleanly on a termination signal.
//!
//! Usage:
//!   scaffold --db-uri postgres://... --amqp-uri amqp://... --redis-uri redis://...
//!
//! Environment variables (also read from `.env`):
//!   DB_URI - PostgreSQL connection string (required)
//!   AMQP_URI - AMQP broker URI (required)
//!   REDIS_URI - Redis URI (required)
//!   CONNECT_TIMEOUT_MS - bound on every connect attempt (default: 3000)
//!   HEALTH_INTERVAL_MS - probe period (default: 5000)
//!   MAX_RECONNECT_ATTEMPTS - give up and degrade after this many attempts (default: retry forever)
//!   LOG_FORMAT - `json` or `text` (default: json)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use linkvisor::backends::amqp::AmqpConnector;
use linkvisor::backends::postgres::PostgresConnector;
use linkvisor::backends::redis::RedisConnector;
use linkvisor::facades::{Broker, Cache, Database};
use linkvisor::{Supervisor, SupervisorConfig, shutdown};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "scaffold")]
#[command(about = "Supervised PostgreSQL, AMQP and Redis connections")]
#[command(version)]
struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DB_URI")]
    db_uri: String,

    /// AMQP broker URI
    #[arg(long, env = "AMQP_URI")]
    amqp_uri: String,

    /// Redis URI
    #[arg(long, env = "REDIS_URI")]
    redis_uri: String,

    /// Connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "3000")]
    connect_timeout_ms: u64,

    /// Health probe interval in milliseconds
    #[arg(long, env = "HEALTH_INTERVAL_MS", default_value = "5000")]
    health_interval_ms: u64,

    /// Reconnect attempts before degrading (unset = retry forever)
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS")]
    max_reconnect_attempts: Option<u32>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    log_format: LogFormat,
}

impl Args {
    fn supervisor_config(&self) -> SupervisorConfig {
        let cfg = SupervisorConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            health_interval: Duration::from_millis(self.health_interval_ms),
            ..SupervisorConfig::default()
        };
        match self.max_reconnect_attempts {
            Some(n) => cfg.with_max_attempts(n),
            None => cfg,
        }
    }
}

/// The three supervised backends and their facades.
struct Infra {
    db: Database,
    broker: Broker<AmqpConnector>,
    cache: Cache<RedisConnector>,
}

impl Infra {
    /// Connects in order. Supervisors built before a failing step are shut down
    /// before the error is returned.
    async fn connect(args: &Args) -> Result<Self> {
        let cfg = args.supervisor_config();

        let db = Supervisor::connect(PostgresConnector::new(&args.db_uri), cfg.clone())
            .await
            .context("failed to connect to database")?;
        let db = Database::new(Arc::new(db));

        let broker = Supervisor::connect(AmqpConnector::new(&args.amqp_uri), cfg.clone())
            .await
            .context("failed to connect to rabbitmq");
        let broker = or_rollback(broker, || db.shutdown()).await?;
        let broker = Broker::new(Arc::new(broker));

        let cache = connect_cache(&args.redis_uri, cfg).await;
        let cache = or_rollback(cache, || async {
            broker.shutdown().await;
            db.shutdown().await;
        })
        .await?;

        Ok(Self { db, broker, cache })
    }

    /// Shuts down in reverse construction order.
    async fn shutdown(&self) {
        self.cache.shutdown().await;
        self.broker.shutdown().await;
        self.db.shutdown().await;
    }
}

/// Passes `res` through, running `rollback` first when it is an error.
async fn or_rollback<T, F, Fut>(res: Result<T>, rollback: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    if res.is_err() {
        rollback().await;
    }
    res
}

async fn connect_cache(uri: &str, cfg: SupervisorConfig) -> Result<Cache<RedisConnector>> {
    let redis = RedisConnector::new(uri).context("invalid REDIS_URI")?;
    let cache = Supervisor::connect(redis, cfg)
        .await
        .context("failed to connect to redis")?;
    Ok(Cache::new(Arc::new(cache)))
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(args.log_format);

    info!(
        os = std::env::consts::OS,
        num_cpu = std::thread::available_parallelism().map_or(1, usize::from),
        version = env!("CARGO_PKG_VERSION"),
        "starting scaffold"
    );

    let infra = match Infra::connect(&args).await {
        Ok(infra) => infra,
        Err(err) => {
            error!(error = %format!("{err:#}"), "startup failed");
            return Err(err);
        }
    };
    info!(
        db = %infra.db.supervisor().status().phase,
        broker = %infra.broker.supervisor().status().phase,
        cache = %infra.cache.supervisor().status().phase,
        "infrastructure ready"
    );

    let signal = shutdown::wait_for_shutdown_signal()
        .await
        .context("failed to install signal handlers")?;
    info!(signal, "shutting down");

    infra.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use linkvisor::Phase;
    use linkvisor::backends::memory::{MemoryConnector, MemoryServer};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_shuts_down_earlier_supervisors() {
        let server = MemoryServer::new();
        let connector = MemoryConnector::new(server.clone());
        let sup = Supervisor::connect(connector, SupervisorConfig::default())
            .await
            .expect("connect");

        let res: Result<()> = Err(anyhow!("broker unreachable"));
        let err = or_rollback(res, || sup.shutdown())
            .await
            .expect_err("error passes through");
        assert_eq!(err.to_string(), "broker unreachable");
        assert_eq!(sup.status().phase, Phase::Closed);
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_step_keeps_earlier_supervisors() {
        let server = MemoryServer::new();
        let connector = MemoryConnector::new(server.clone());
        let sup = Supervisor::connect(connector, SupervisorConfig::default())
            .await
            .expect("connect");

        let value = or_rollback(Ok(7), || sup.shutdown()).await.expect("ok");
        assert_eq!(value, 7);
        assert!(sup.status().is_healthy());
        assert_eq!(server.close_count(), 0);
        sup.shutdown().await;
    }
}
