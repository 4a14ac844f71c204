use anyhow::Result;

use crate::{
    daemon::storage::{
        entities::ObservationEntity,
        observation_log::{ObservationLogHandle, ObservationStorage},
    },
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// Bridges the processing loop and [ObservationStorage], keeping the current
/// day's file open and rolling over to a new one at day boundaries.
pub struct LocalSaver<S: ObservationStorage> {
    storage: S,
    current_handle: Option<S::LogFile>,
    date_provider: Box<dyn Clock>,
}

impl<S: ObservationStorage> LocalSaver<S> {
    pub fn new(storage: S, date_provider: Box<dyn Clock>) -> Self {
        Self {
            storage,
            current_handle: None,
            date_provider,
        }
    }

    async fn move_file_handle(&mut self) -> Result<S::LogFile> {
        let current_file = self.current_handle.take();
        let now = self.date_provider.time().date_naive();

        match current_file {
            Some(mut file) if file.date() != now => {
                file.flush().await?;
            }
            Some(v) => return Ok(v),
            None => {}
        };
        self.storage.open_day(now).await
    }
}

impl<S: ObservationStorage> EventProcessor for LocalSaver<S> {
    async fn process_next(&mut self, message: ObservationEntity) -> Result<()> {
        let mut active_file = self.move_file_handle().await?;

        active_file.append(vec![message]).await?;

        self.current_handle = Some(active_file);

        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(v) = self.current_handle.as_mut() {
            v.flush().await?;
        }
        Ok(())
    }
}
