use chrono::{DateTime, Utc};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Human-readable size: `B` below 1 KiB, otherwise `KB`/`MB` with one decimal.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}

/// Uppercased first letter of every space-separated word.
pub fn initials(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Coarse age of an RFC 3339 timestamp relative to `now`.
///
/// Anything older than a week renders as a short date (`Apr 1`).
/// Unparseable timestamps are returned unchanged.
pub fn format_relative_time(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_owned();
    };

    let elapsed = now.signed_duration_since(parsed.with_timezone(&Utc));
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Just now".to_owned()
    } else if minutes < 60 {
        format!("{minutes} min ago")
    } else if hours < 24 {
        format!("{hours} hour{} ago", plural(hours))
    } else if days < 7 {
        format!("{days} day{} ago", plural(days))
    } else {
        parsed.format("%b %-d").to_string()
    }
}

fn plural(count: i64) -> &'static str {
    if count > 1 { "s" } else { "" }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn formats_sizes_across_units() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn collects_initials() {
        assert_eq!(initials("alice"), "A");
        assert_eq!(initials("bob van dam"), "BVD");
        assert_eq!(initials("   "), "");
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc
            .with_ymd_and_hms(2024, 5, 10, 12, 0, 0)
            .single()
            .expect("valid date");

        assert_eq!(format_relative_time("2024-05-10T11:59:30Z", now), "Just now");
        assert_eq!(format_relative_time("2024-05-10T11:45:00Z", now), "15 min ago");
        assert_eq!(format_relative_time("2024-05-10T11:00:00Z", now), "1 hour ago");
        assert_eq!(format_relative_time("2024-05-10T09:00:00Z", now), "3 hours ago");
        assert_eq!(format_relative_time("2024-05-08T12:00:00Z", now), "2 days ago");
        assert_eq!(format_relative_time("2024-04-01T12:00:00Z", now), "Apr 1");
        assert_eq!(format_relative_time("yesterday", now), "yesterday");
    }
}
