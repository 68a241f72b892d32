use chrono::{DateTime, FixedOffset, Utc};

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a millisecond Unix timestamp as RFC 3339 in JST (UTC+9).
///
/// A timestamp chrono cannot represent formats as an empty string.
pub fn millis_to_jst_rfc3339(millis: i64) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(millis) else {
        return String::new();
    };
    match FixedOffset::east_opt(JST_OFFSET_SECS) {
        Some(jst) => utc.with_timezone(&jst).to_rfc3339(),
        None => utc.to_rfc3339(),
    }
}
