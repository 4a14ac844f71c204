use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use collection::{afk::AfkEvaluator, collector::ObservationCollector};
use processing::{local_save::LocalSaver, ProcessingModule};
use storage::{entities::ObservationEntity, observation_log::ObservationLogImpl};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    labels::{registry::LabelRegistry, store::JsonLabelStore},
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowManager, WindowManager},
};

pub mod args;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(5);

/// Threshold of input inactivity after which the user counts as afk.
const AFK_THRESHOLD_SECONDS: u32 = 60 * 2;

/// Represents the starting point for the daemon.
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let record_dir = dir.join("records");
    let label_store = JsonLabelStore::new(dir.join("labels.json"), Some(record_dir.clone()))?;
    let registry = Arc::new(LabelRegistry::load_from_store(&label_store)?);

    let (sender, receiver) = mpsc::channel::<ObservationEntity>(10);
    let manager = GenericWindowManager::new()?;

    let shutdown_token = CancellationToken::new();

    let collector = create_collector(
        sender,
        manager,
        registry.clone(),
        &shutdown_token,
        DEFAULT_SAMPLING_INTERVAL,
        DefaultClock,
    );

    let processor = create_processor(record_dir, receiver, DefaultClock)?;

    let (_, collection_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        collector.run(),
        processor.run(),
    );

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    // Orderly shutdown pushes every label's in-memory state back to the store.
    if let Err(e) = registry.flush_to_store(&label_store) {
        error!("Failed to flush labels to the store {e:?}");
    }

    Ok(())
}

fn create_collector(
    sender: mpsc::Sender<ObservationEntity>,
    manager: impl WindowManager + 'static,
    registry: Arc<LabelRegistry>,
    shutdown_token: &CancellationToken,
    sampling_interval: Duration,
    clock: impl Clock,
) -> ObservationCollector {
    ObservationCollector::new(
        sender,
        Box::new(manager),
        registry,
        shutdown_token.clone(),
        AfkEvaluator::from_seconds(AFK_THRESHOLD_SECONDS),
        sampling_interval,
        Box::new(clock),
    )
}

fn create_processor(
    record_dir: PathBuf,
    receiver: mpsc::Receiver<ObservationEntity>,
    clock: impl Clock,
) -> Result<ProcessingModule<LocalSaver<ObservationLogImpl>>, anyhow::Error> {
    let storage = ObservationLogImpl::new(record_dir)?;
    let saver = LocalSaver::new(storage, Box::new(clock));
    Ok(ProcessingModule::new(receiver, saver))
}

#[cfg(test)]
mod daemon_tests {
    use std::{fs, sync::Arc, time::Duration};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            create_collector, create_processor,
            storage::{entities::ObservationEntity, observation_log::ObservationLogImpl},
        },
        engine::{
            comparison::AttributeComparison,
            group::{BoolOp, ConditionGroup},
        },
        labels::{registry::LabelRegistry, store::LabelRecord, Label},
        utils::{clock::Clock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowManager},
    };

    use super::storage::observation_log::ObservationStorage;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn test_items() -> Vec<ActiveWindowData> {
        vec![
            ActiveWindowData {
                window_title: "main.py - Code".into(),
                process_name: "code.exe".into(),
            },
            ActiveWindowData {
                window_title: "python basics - Chrome".into(),
                process_name: "chrome.exe".into(),
            },
        ]
    }

    fn label_from_parts(
        name: &str,
        manually: bool,
        conditions: Option<ConditionGroup>,
    ) -> Arc<Label> {
        Arc::new(
            Label::from_record(&LabelRecord {
                id: Some(1),
                name: name.to_owned(),
                manually,
                active: true,
                conditions: conditions
                    .as_ref()
                    .map(crate::engine::serial::group_to_value),
                creation_datetime: Utc::now(),
                deleted: false,
            })
            .unwrap(),
        )
    }

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    /// Very simple smoke test to check if the application is working properly.
    /// Samples two alternating windows for a few seconds and checks the
    /// stored observations carry the right labels.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let mut mock_window_manager = MockWindowManager::new();
        mock_window_manager
            .expect_get_idle_time()
            .returning(|| Ok(0));
        let mut items = test_items().into_iter().cycle();
        mock_window_manager
            .expect_get_active_window_data()
            .returning(move || Ok(items.next().unwrap()))
            .times(..7);

        let registry = Arc::new(LabelRegistry::new());
        registry.register(label_from_parts("Tracked", true, None))?;
        let mut coding = ConditionGroup::new(BoolOp::And);
        coding.add(AttributeComparison::new("window_type", "==", "code.exe", "str").unwrap());
        coding.add(AttributeComparison::new("window_text_words", "in", "py", "str").unwrap());
        registry.register(label_from_parts("Coding", false, Some(coding)))?;

        let shutdown_token = CancellationToken::new();

        let (sender, receiver) = mpsc::channel::<ObservationEntity>(10);
        let test_clock = TestClock {
            start_time: Utc.from_utc_datetime(&TEST_START_DATE),
            reference: Instant::now(),
        };
        let collector = create_collector(
            sender,
            mock_window_manager,
            registry,
            &shutdown_token,
            Duration::from_secs(1),
            test_clock.clone(),
        );

        let dir = tempdir()?;

        let processor = create_processor(dir.path().to_path_buf(), receiver, test_clock.clone())?;

        let (_, collection_result, processing_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(3500)).await;
                shutdown_token.cancel()
            },
            collector.run(),
            processor.run(),
        );

        collection_result?;
        processing_result?;

        let files = fs::read_dir(dir.path())?.collect::<Vec<_>>();
        assert_eq!(files.len(), 1);

        let storage = ObservationLogImpl::new(dir.path().to_path_buf())?;

        let data = storage.get_data_for(TEST_START_DATE.date()).await?;

        assert!(data.len() >= 3);
        for observation in &data {
            assert!(observation.labels.contains(&"Tracked".to_owned()));
            let is_code = &*observation.window_type == "code.exe";
            assert_eq!(
                observation.labels.contains(&"Coding".to_owned()),
                is_code,
                "{observation:?}"
            );
        }

        Ok(())
    }
}
