use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::date_to_record_name;

use super::entities::ObservationEntity;

/// Interface for abstracting storage of observations.
pub trait ObservationStorage {
    type LogFile: ObservationLogHandle;

    /// Opens or creates the record file observations for `date` are appended
    /// to. One file holds one UTC day.
    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::LogFile>>;

    /// Reads back every observation stored for `date`.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ObservationEntity>>> + Send;
}

impl<T: Deref> ObservationStorage for T
where
    T::Target: ObservationStorage,
{
    type LogFile = <T::Target as ObservationStorage>::LogFile;

    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::LogFile>> {
        self.deref().open_day(date)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ObservationEntity>>> + Send {
        self.deref().get_data_for(date)
    }
}

pub trait ObservationLogHandle {
    fn append(&mut self, observations: Vec<ObservationEntity>) -> impl Future<Output = Result<()>>;
    fn date(&self) -> NaiveDate;
    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// The main realization of [ObservationStorage]: json lines per day under a
/// record directory.
pub struct ObservationLogImpl {
    record_dir: PathBuf,
}

impl ObservationLogImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    async fn read_all_inner(&self, path: &Path) -> Result<Vec<ObservationEntity>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<ObservationEntity>, std::io::Error>
        {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut observations = vec![];
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<ObservationEntity>(&line) {
                    Ok(v) => observations.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &line
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(observations)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }
}

impl ObservationStorage for ObservationLogImpl {
    type LogFile = ObservationLogFile;

    async fn open_day(&self, date: NaiveDate) -> Result<Self::LogFile> {
        let file_name = date_to_record_name(date);
        let path = self.record_dir.join(file_name);

        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(path)
            .await?;

        Ok(ObservationLogFile { file, date })
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<ObservationEntity>> {
        let file_name = date_to_record_name(date);
        let path = self.record_dir.join(file_name);
        let data = self.read_all_inner(&path).await?;
        Ok(data)
    }
}

pub struct ObservationLogFile {
    file: File,
    date: NaiveDate,
}

impl ObservationLogHandle for ObservationLogFile {
    /// Appends one line per observation. Unlike interval-merging trackers
    /// every sample is kept as its own row, so a plain locked append is all
    /// that's needed.
    async fn append(&mut self, observations: Vec<ObservationEntity>) -> Result<()> {
        self.file.lock_exclusive()?;
        let result = Self::append_with_file(&mut self.file, observations).await;
        self.file.unlock_async().await?;
        result
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

impl ObservationLogFile {
    async fn append_with_file(file: &mut File, observations: Vec<ObservationEntity>) -> Result<()> {
        file.seek(std::io::SeekFrom::End(0)).await?;

        let mut buffer = Vec::<u8>::new();
        for observation in observations {
            serde_json::to_writer(&mut buffer, &observation)?;
            buffer.push(b'\n');
        }

        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}
