use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    daemon::storage::entities::ObservationEntity, labels::registry::LabelRegistry,
    utils::clock::Clock, window_api::WindowManager,
};

use super::{afk::AfkEvaluator, observation::WindowObservation};

/// Samples the foreground window at a fixed interval, runs every registered
/// label against the sample and hands the labeled observation to the
/// processing module.
pub struct ObservationCollector {
    next: mpsc::Sender<ObservationEntity>,
    producer: Box<dyn WindowManager>,
    registry: Arc<LabelRegistry>,
    shutdown: CancellationToken,
    afk_evaluator: AfkEvaluator,
    sampling_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl ObservationCollector {
    pub fn new(
        next: mpsc::Sender<ObservationEntity>,
        producer: Box<dyn WindowManager>,
        registry: Arc<LabelRegistry>,
        shutdown: CancellationToken,
        afk_evaluator: AfkEvaluator,
        sampling_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            registry,
            shutdown,
            afk_evaluator,
            sampling_interval,
            time_provider,
        }
    }

    /// Builds one labeled observation. Every label sees the same snapshot;
    /// labels only ever append to the observation's label set, they never
    /// read it.
    fn sample(&mut self) -> Result<ObservationEntity> {
        let window_data = self.producer.get_active_window_data()?;
        let idle_ms = self.producer.get_idle_time()?;
        let afk = self.afk_evaluator.is_afk(idle_ms);
        let timestamp = self.time_provider.time();

        let mut observation = WindowObservation::new(
            timestamp,
            window_data.window_title,
            window_data.process_name,
            idle_ms,
            afk,
        );
        self.registry.apply_all(&mut observation);

        Ok(observation.into_entity())
    }

    /// Executes the collector event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.sampling_interval;

            match self.sample() {
                Ok(observation) => {
                    let span = info_span!("Processing collected observation");
                    debug!("Sending message {:?}", observation);
                    self.next
                        .send(observation)
                        .instrument(span)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    info!("Successfully sent message")
                }
                Err(e) => {
                    error!("Encountered an error during collection {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}
