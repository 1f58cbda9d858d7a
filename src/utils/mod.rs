use std::time::Duration;

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Human readable duration, e.g. "1 minute, 3 seconds, 250 milliseconds".
///
/// Zero-valued components are left out; a zero duration is "0 milliseconds".
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis() as u64;

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    let parts: Vec<String> = [
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
        (millis, "millisecond"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, unit)| plural(count, unit))
    .collect();

    if parts.is_empty() {
        plural(0, "millisecond")
    } else {
        parts.join(", ")
    }
}
