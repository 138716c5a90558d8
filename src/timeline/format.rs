use std::fmt::Display;

use chrono::{Duration, TimeZone};

use super::Timeline;

const RANGE_FORMAT: &str = "%Y-%m-%d %H:%M";
const ENTRY_FORMAT: &str = "%H:%M";

/// `45s`, `5m`, `2h`, `2h30m`. Seconds are dropped once a duration reaches a minute.
pub fn format_duration_compact(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if minutes == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h{minutes}m")
    }
}

/// Renders a timeline with times shown in `tz`. AFK entries carry no APM figure.
pub fn format_timeline<Tz: TimeZone>(timeline: &Timeline, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let since = timeline.since.with_timezone(tz).format(RANGE_FORMAT);
    let until = timeline.until.with_timezone(tz).format(RANGE_FORMAT);

    if timeline.entries.is_empty() {
        return format!("No activity recorded between {since} and {until}.");
    }

    let mut output = format!("Timeline of focused windows & AFK status ({since} to {until}):\n");
    for entry in &timeline.entries {
        let start = entry.start.with_timezone(tz).format(ENTRY_FORMAT);
        let end = if entry.ongoing {
            "ongoing".to_string()
        } else {
            entry.end.with_timezone(tz).format(ENTRY_FORMAT).to_string()
        };
        let duration = format_duration_compact(entry.duration());

        let line = if entry.afk {
            format!("{start} - {end} ({duration}): {}\n", entry.title)
        } else {
            format!(
                "{start} - {end} ({duration}): (Avg APM: {}) {}\n",
                entry.avg_apm, entry.title
            )
        };
        output.push_str(&line);
    }
    output.trim_end().to_string()
}
