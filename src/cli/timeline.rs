use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Duration, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use tracing::info;

use crate::{
    daemon::{
        query::{request_timeline, socket_path},
        storage::record_storage::ActivityStoreImpl,
    },
    timeline::{aggregator::TimelineAggregator, TimelineRange},
    utils::clock::DefaultClock,
};

use super::{Args, Locations};

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
pub struct TimelineCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Defaults to now. Accepts the same values as --start"
    )]
    end_date: Option<String>,
    #[arg(
        long,
        conflicts_with = "start_date",
        help = "Show the last N hours. Defaults to 1"
    )]
    hours: Option<u32>,
    #[arg(
        long,
        conflicts_with_all = ["start_date", "hours"],
        help = "Show everything since the start of today"
    )]
    today: bool,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[command(flatten)]
    pub locations: Locations,
}

const DEFAULT_HOURS: u32 = 1;

/// Command to process `timeline` command. Prints the anonymized timeline of the requested
/// range. The running daemon answers when there is one, so its title cache is reused.
/// Otherwise the records are aggregated here.
pub async fn process_timeline_command(command: TimelineCommand) -> Result<()> {
    let range = parse_range(&command, Local::now())?;
    let state_dir = command.locations.state_dir()?;

    if let Some(text) = request_timeline(&socket_path(&state_dir), range).await? {
        println!("{text}");
        return Ok(());
    }

    info!("No daemon is running, aggregating the records directly");
    let config = command.locations.load_config()?;
    let store = ActivityStoreImpl::new(state_dir.join("records"))?;
    let aggregator = TimelineAggregator::from_config(store, &config, Box::new(DefaultClock))?;
    println!("{}", aggregator.get_activity_timeline(range).await?);
    Ok(())
}

fn parse_date(value: &str, now: DateTime<Local>, dialect: chrono_english::Dialect, name: &str) -> Result<DateTime<Utc>> {
    match parse_date_string(value, now, dialect) {
        Ok(v) => Ok(v.with_timezone(&Utc)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} date {e}"),
            )
            .into()),
    }
}

/// Also provides sensible defaults for `timeline` command: without a start the last hour is
/// shown, without an end the range is open.
fn parse_range(command: &TimelineCommand, now: DateTime<Local>) -> Result<TimelineRange> {
    let dialect: chrono_english::Dialect = command.date_style.into();

    let since = if command.today {
        now.beginning_of_day().with_timezone(&Utc)
    } else if let Some(start) = &command.start_date {
        parse_date(start, now, dialect, "start")?
    } else {
        let hours = command.hours.unwrap_or(DEFAULT_HOURS).max(1);
        now.with_timezone(&Utc) - Duration::hours(hours as i64)
    };

    let until = command
        .end_date
        .as_deref()
        .map(|end| parse_date(end, now, dialect, "end"))
        .transpose()?;

    if until.is_some_and(|until| until < since) {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                "The end of the range is before its start",
            )
            .into());
    }

    Ok(TimelineRange::new(since, until))
}
