//! # Expiry Sweeper
//!
//! Background task that periodically deletes events whose retention
//! window has elapsed. Reads are already filtered to unexpired rows,
//! so the sweeper only reclaims storage; correctness never depends on
//! its timing.

use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, histogram};
use rand::Rng;
use sea_orm::DatabaseConnection;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::{AppConfig, SweeperConfig};
use crate::repositories::BuildEventRepository;

/// Background expiry sweeper service.
pub struct ExpirySweeper {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
}

impl ExpirySweeper {
    /// Create a new sweeper instance.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        Self { config, db }
    }

    /// Run the sweeper loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.sweeper.tick_interval_seconds,
            "Starting expiry sweeper"
        );

        loop {
            let tick_interval = sample_tick_interval(&self.config.sweeper);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    self.tick().await;
                    let elapsed = tick_started.elapsed();
                    histogram!("expiry_sweeper_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    /// Delete all rows past their expiry timestamp. Errors are logged
    /// and swallowed so a transient database failure never kills the
    /// loop.
    async fn tick(&self) {
        let repo = BuildEventRepository::new(&self.db);
        match repo.delete_expired(Utc::now()).await {
            Ok(removed) => {
                counter!("expiry_sweeper_events_removed_total").increment(removed);
                if removed > 0 {
                    info!(removed, "Removed expired events");
                } else {
                    debug!("No expired events to remove");
                }
            }
            Err(err) => {
                error!(error = ?err, "Expiry sweep failed");
            }
        }
    }
}

fn sample_tick_interval(config: &SweeperConfig) -> TokioDuration {
    let mut rng = rand::thread_rng();
    compute_tick_interval(config, &mut rng)
}

/// Base interval stretched by a random factor in `[0, jitter_factor]`
/// so multiple instances drift apart instead of sweeping in lockstep.
fn compute_tick_interval<R: Rng + ?Sized>(config: &SweeperConfig, rng: &mut R) -> TokioDuration {
    let base = config.tick_interval_seconds as f64;
    let jitter = config.jitter_factor.max(0.0);

    let factor = if jitter == 0.0 {
        0.0
    } else {
        rng.gen_range(0.0..=jitter)
    };

    TokioDuration::from_secs_f64(base * (1.0 + factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::normalization::{EventMeta, NormalizedEvent, parse_event_kind};
    use chrono::Duration;
    use migration::{Migrator, MigratorTrait};
    use rand::SeedableRng;
    use serde_json::json;

    fn sweeper_config(jitter_factor: f64) -> SweeperConfig {
        SweeperConfig {
            tick_interval_seconds: 3600,
            jitter_factor,
        }
    }

    #[test]
    fn tick_interval_respects_jitter_bounds() {
        let config = sweeper_config(0.1);
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let interval = compute_tick_interval(&config, &mut rng);
            assert!(interval >= TokioDuration::from_secs(3600));
            assert!(interval <= TokioDuration::from_secs_f64(3600.0 * 1.1));
        }
    }

    #[test]
    fn tick_interval_exact_when_jitter_zero() {
        let config = sweeper_config(0.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let interval = compute_tick_interval(&config, &mut rng);
        assert_eq!(interval, TokioDuration::from_secs(3600));
    }

    #[tokio::test]
    async fn tick_removes_only_expired_rows() {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            webhook_secret: Some("test_secret".to_string()),
            ..Default::default()
        };
        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.expect("Failed to migrate");

        let repo = BuildEventRepository::new(&db);
        let now = Utc::now();

        let make_event = |id: &str| NormalizedEvent {
            event_id: id.to_string(),
            kind: parse_event_kind("deployment.created"),
            event_type: "deployment.created".to_string(),
            occurred_at: now,
            payload: json!({}),
            region: "iad1".to_string(),
            project_id: None,
            deployment_id: None,
            status: None,
            url: None,
            meta: EventMeta::default(),
        };

        // Ingested 26 hours ago, past the 25 hour retention window.
        repo.insert(&make_event("evt_expired"), now - Duration::hours(26))
            .await
            .unwrap();
        repo.insert(&make_event("evt_live"), now).await.unwrap();

        let sweeper = ExpirySweeper::new(Arc::new(config), db.clone());
        sweeper.tick().await;

        let repo = BuildEventRepository::new(&db);
        let remaining = repo
            .count_events(&crate::repositories::EventFilter::default(), now)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            webhook_secret: Some("test_secret".to_string()),
            ..Default::default()
        };
        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.expect("Failed to migrate");

        let sweeper = ExpirySweeper::new(Arc::new(config), db);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));

        shutdown.cancel();
        handle.await.expect("Sweeper task panicked");
    }
}
