#![forbid(unsafe_code)]

//! `wsu:Timestamp` rendering.

use chrono::{DateTime, Duration, Utc};
use vaxholm_core::ns;

/// When the message was signed and for how long it stays fresh.
#[derive(Debug, Clone, Copy)]
pub struct TimestampSpec {
    pub created: DateTime<Utc>,
    pub ttl: Duration,
}

impl TimestampSpec {
    /// A timestamp created now with the given time to live.
    ///
    /// A TTL beyond what `chrono` can represent saturates rather than
    /// wrapping; `expires` is then clamped to the maximum instant.
    pub fn with_ttl(ttl_secs: u64) -> Self {
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            created: Utc::now(),
            ttl: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
        }
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.created
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// UTC instant in the WS-Security wire form: ISO-8601, millisecond
/// precision, `Z` suffix.
pub fn format_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Render a self-contained `wsu:Timestamp` fragment.
pub(crate) fn render(spec: &TimestampSpec, id: &str) -> String {
    format!(
        "<wsu:Timestamp xmlns:wsu=\"{}\" wsu:Id=\"{}\"><wsu:Created>{}</wsu:Created><wsu:Expires>{}</wsu:Expires></wsu:Timestamp>",
        ns::WSU,
        id,
        format_instant(spec.created),
        format_instant(spec.expires()),
    )
}
