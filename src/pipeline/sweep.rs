use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::dispatcher::ShutdownSignal;
use super::registry::PipelineRegistry;

/// Starts the periodic retention sweep. The first pass runs one `every` after
/// start; the task ends when `shutdown` fires.
pub fn spawn_expiry_sweep(
    registry: Arc<PipelineRegistry>,
    retention: chrono::Duration,
    every: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "Pipeline expiry sweep started: retention={}h interval={:?}",
            retention.num_hours(),
            every
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => {
                    tracing::info!("Pipeline expiry sweep stopped");
                    return;
                }
            }

            match registry.sweep_expired(retention).await {
                Ok(0) => tracing::debug!("Expiry sweep found nothing to remove"),
                Ok(removed) => tracing::info!("Expiry sweep removed {} pipeline(s)", removed),
                Err(err) => tracing::error!("Expiry sweep failed: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationKind;
    use crate::pipeline::dispatcher::Dispatcher;
    use crate::pipeline::store::MemoryPipelineStore;

    #[tokio::test(start_paused = true)]
    async fn sweep_runs_on_interval_and_stops_on_shutdown() {
        let registry = Arc::new(PipelineRegistry::new(Arc::new(MemoryPipelineStore::new())));
        let created = registry
            .create(OperationKind::Mint, "mint", serde_json::json!({}))
            .await
            .unwrap();
        let dispatcher = Dispatcher::new(1);

        let handle = spawn_expiry_sweep(
            registry.clone(),
            chrono::Duration::zero(),
            Duration::from_secs(3_600),
            dispatcher.shutdown_signal(),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.get(&created.id).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(registry.get(&created.id).await.unwrap().is_none());

        dispatcher.shutdown(Duration::from_secs(1)).await;
        handle.await.unwrap();
    }
}
