use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::storage::entities::ObservationEntity;

pub mod local_save;
pub mod module;

/// Receives labeled observations from the collector and saves them using
/// whatever processor it was built with.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<ObservationEntity>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<ObservationEntity>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(observation) = self.receiver.recv().await {
            debug!("Processing observation {:?}", observation);
            match self.processor.process_next(observation.clone()).await {
                Ok(_) => {
                    info!("Processed observation {:?}", observation)
                }
                Err(e) => {
                    error!("Error processing observation {:?}: {e:?}", observation)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
