//! Relative timestamps for message metadata

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::fmt;

const NOW_WINDOW_MS: i64 = 60 * 1000;
const YESTERDAY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// How a message time is shown, in the viewer's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeTimestamp {
    /// Under a minute old
    Now,
    /// Same calendar day
    Today(NaiveTime),
    /// Previous calendar day, less than 24 hours old
    Yesterday(NaiveTime),
    Full(NaiveDateTime),
}

/// Classify `sent_at` against `now`. Calendar days are taken in `now`'s
/// time zone. Timestamps from the future count as `Now`.
pub fn relative_timestamp<Tz: TimeZone>(
    sent_at: DateTime<Utc>,
    now: &DateTime<Tz>,
) -> RelativeTimestamp {
    let elapsed_ms = now
        .with_timezone(&Utc)
        .signed_duration_since(sent_at)
        .num_milliseconds();
    if elapsed_ms < NOW_WINDOW_MS {
        return RelativeTimestamp::Now;
    }

    let local = sent_at.with_timezone(&now.timezone()).naive_local();
    let today = now.naive_local().date();

    if local.date() == today {
        RelativeTimestamp::Today(local.time())
    } else if elapsed_ms < YESTERDAY_WINDOW_MS && today.pred_opt() == Some(local.date()) {
        RelativeTimestamp::Yesterday(local.time())
    } else {
        RelativeTimestamp::Full(local)
    }
}

impl fmt::Display for RelativeTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeTimestamp::Now => f.write_str("Now"),
            RelativeTimestamp::Today(time) => write!(f, "{}", time.format("%-I:%M %p")),
            RelativeTimestamp::Yesterday(time) => {
                write!(f, "Yesterday, {}", time.format("%-I:%M %p"))
            }
            RelativeTimestamp::Full(datetime) => {
                write!(f, "{}", datetime.format("%-m/%-d/%Y, %-I:%M %p"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_now_window() {
        let now = utc(14, 15, 7);
        assert_eq!(
            relative_timestamp(now - Duration::seconds(59), &now),
            RelativeTimestamp::Now
        );
        assert_eq!(
            relative_timestamp(now + Duration::seconds(30), &now),
            RelativeTimestamp::Now
        );
        assert_eq!(relative_timestamp(now, &now).to_string(), "Now");
    }

    #[test]
    fn test_same_day() {
        let now = utc(14, 18, 0);
        let stamp = relative_timestamp(utc(14, 15, 7), &now);
        assert!(matches!(stamp, RelativeTimestamp::Today(_)));
        assert_eq!(stamp.to_string(), "3:07 PM");

        let morning = relative_timestamp(utc(14, 0, 5), &now);
        assert_eq!(morning.to_string(), "12:05 AM");
    }

    #[test]
    fn test_yesterday() {
        let now = utc(14, 9, 0);
        let stamp = relative_timestamp(utc(13, 15, 7), &now);
        assert!(matches!(stamp, RelativeTimestamp::Yesterday(_)));
        assert_eq!(stamp.to_string(), "Yesterday, 3:07 PM");

        // Previous day but more than 24 hours ago
        let stamp = relative_timestamp(utc(13, 8, 0), &now);
        assert_eq!(stamp.to_string(), "6/13/2024, 8:00 AM");
    }

    #[test]
    fn test_older_messages_show_full_date() {
        let now = utc(14, 9, 0);
        let stamp = relative_timestamp(utc(2, 21, 30), &now);
        assert!(matches!(stamp, RelativeTimestamp::Full(_)));
        assert_eq!(stamp.to_string(), "6/2/2024, 9:30 PM");
    }

    #[test]
    fn test_calendar_days_follow_viewer_zone() {
        // 23:30 UTC on the 13th is 08:30 on the 14th in UTC+9
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = utc(14, 1, 0).with_timezone(&tokyo);
        let stamp = relative_timestamp(utc(13, 23, 30), &now);
        assert_eq!(stamp.to_string(), "8:30 AM");

        // The same instant is still "yesterday" for a UTC viewer
        let stamp = relative_timestamp(utc(13, 23, 30), &utc(14, 1, 0));
        assert_eq!(stamp.to_string(), "Yesterday, 11:30 PM");
    }
}
