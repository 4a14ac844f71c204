use std::{fmt::Display, future, path::PathBuf, sync::Arc};

use ansi_term::Colour;
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::{pin_mut, stream, Stream, StreamExt};
use now::DateTimeNow;
use tracing::error;

use crate::{
    daemon::storage::{
        entities::ObservationEntity,
        observation_log::{ObservationLogImpl, ObservationStorage},
    },
    utils::time::next_day_start,
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct RecordsCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    treat_as_days: bool,
    #[arg(short, long, help = "Only show observations carrying this label")]
    label: Option<String>,
    #[arg(
        short,
        long,
        help = "Include time afk. Person is considered afk after 2 minutes of idle time."
    )]
    afk: bool,
}

pub struct ExtractConfig {
    pub end: DateTime<Utc>,
    pub start: DateTime<Utc>,
}

impl ExtractConfig {
    fn contains(&self, entity: &ObservationEntity) -> bool {
        self.start <= entity.timestamp && entity.timestamp < self.end
    }
}

/// Prints stored observations between `start` and `end`, one row per sample.
pub async fn process_records_command(
    RecordsCommand {
        start_date,
        end_date,
        date_style,
        treat_as_days,
        label,
        afk,
    }: RecordsCommand,
    app_dir: PathBuf,
) -> Result<()> {
    let (start, end) = parse_range(start_date, end_date, date_style, treat_as_days)?;

    let storage = ObservationLogImpl::new(app_dir.join("records"))?;

    // A stream lets long ranges print as files come in instead of buffering
    // every day first.
    let results = extract_between(
        storage,
        ExtractConfig {
            start: start.into(),
            end: end.into(),
        },
    );
    pin_mut!(results);

    while let Some(observation) = results.next().await {
        let observation = observation?;
        if observation.afk && !afk {
            continue;
        }
        if let Some(wanted) = &label {
            if !observation
                .labels
                .iter()
                .any(|l| l.eq_ignore_ascii_case(wanted))
            {
                continue;
            }
        }
        print_observation(&observation);
    }
    Ok(())
}

fn parse_range(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
    treat_as_days: bool,
) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();
    let mut start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => now.beginning_of_day(),
    };
    let mut end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    if treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }
    Ok((start, end))
}

fn print_observation(observation: &ObservationEntity) {
    let time = observation.timestamp.with_timezone(&Local);
    let labels = observation
        .labels
        .iter()
        .map(|l| Colour::Cyan.paint(l.as_str()).to_string())
        .collect::<Vec<_>>()
        .join(",");
    println!(
        "{}\t{}\t{}\t{}",
        time.format("%x %H:%M:%S"),
        clean_process_name(&observation.window_type),
        observation.window_title,
        labels
    );
}

/// Extracts [ObservationEntity] rows between 2 dates. To do it in an
/// efficient manner streams are used.
pub fn extract_between(
    storage: impl ObservationStorage + Send + Sync + 'static,
    config: ExtractConfig,
) -> impl Stream<Item = Result<ObservationEntity>> {
    let storage = Arc::new(storage);
    let start = config.start;
    let end = config.end;

    let date_iteration = date_range(start.date_naive(), end.date_naive());

    let files = date_iteration
        .map(move |day| {
            let storage = storage.clone();
            async move { (day, storage.get_data_for(day).await) }
        })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter(move |v| {
            future::ready(match v {
                Ok(entity) => config.contains(entity),
                Err(_) => true,
            })
        })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(mut current, end)| {
        future::ready({
            if current <= end {
                let last_current = current;
                current = current.succ_opt().expect("End of time should never happen");
                Some((last_current, (current, end)))
            } else {
                None
            }
        })
    })
}

fn clean_process_name(value: &str) -> String {
    PathBuf::from(value)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use futures::StreamExt;
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::ObservationEntity,
        observation_log::{ObservationLogHandle, ObservationLogImpl, ObservationStorage},
    };

    use super::{extract_between, ExtractConfig};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn observation(title: &str, day_offset: i64, second: i64) -> ObservationEntity {
        ObservationEntity {
            window_title: title.into(),
            window_type: "test.exe".into(),
            window_text_words: vec![title.to_owned()],
            timestamp: Utc.from_utc_datetime(&TEST_START_DATE)
                + chrono::Duration::days(day_offset)
                + chrono::Duration::seconds(second),
            idle_millis: 0,
            afk: false,
            labels: vec![],
        }
    }

    #[tokio::test]
    async fn extracts_across_days_and_clips_the_range() -> Result<()> {
        let dir = tempdir()?;
        let storage = ObservationLogImpl::new(dir.path().to_owned())?;

        let mut first_day = storage.open_day(TEST_START_DATE.date()).await?;
        first_day
            .append(vec![
                observation("before", 0, 10),
                observation("inside", 0, 100),
            ])
            .await?;
        first_day.flush().await?;

        let second_date = TEST_START_DATE.date().succ_opt().unwrap();
        let mut second_day = storage.open_day(second_date).await?;
        second_day
            .append(vec![observation("next day", 1, 20)])
            .await?;
        second_day.flush().await?;

        let start = Utc.from_utc_datetime(&TEST_START_DATE) + chrono::Duration::seconds(50);
        let end = Utc.from_utc_datetime(&TEST_START_DATE) + chrono::Duration::days(2);
        let rows: Vec<_> = extract_between(storage, ExtractConfig { start, end })
            .collect()
            .await;

        let titles: Vec<_> = rows
            .into_iter()
            .map(|r| r.map(|o| o.window_title.to_string()))
            .collect::<Result<_>>()?;
        assert_eq!(titles, vec!["inside", "next day"]);
        Ok(())
    }
}
