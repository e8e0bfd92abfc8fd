use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use review_sync_config::ReviewsConfig;
use review_sync_models::CanonicalInstant;
use tracing::debug;

/// Wall-clock layouts accepted when a timestamp carries no offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Converts store timestamps into canonical instants.
///
/// Values with an explicit offset (the store's native encoding) are absolute;
/// values without one are read as wall-clock time in the source zone.
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    zone: FixedOffset,
}

impl TimeNormalizer {
    pub fn new(zone: FixedOffset) -> Self {
        Self { zone }
    }

    pub fn from_config(config: &ReviewsConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.source_offset()?))
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn normalize(&self, raw: Option<&str>) -> Option<CanonicalInstant> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(absolute) = DateTime::parse_from_rfc3339(raw) {
            return Some(CanonicalInstant::new(absolute.with_timezone(&Utc), self.zone));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                // A fixed offset maps every wall-clock time to exactly one instant
                let local = self.zone.from_local_datetime(&naive).single()?;
                return Some(CanonicalInstant::new(local.with_timezone(&Utc), self.zone));
            }
        }

        debug!("Unparseable timestamp {:?}, treating as absent", raw);
        None
    }

    /// Canonical instant for "now", used for optimistic rows
    pub fn now(&self) -> CanonicalInstant {
        self.at(Utc::now())
    }

    pub fn at(&self, utc: DateTime<Utc>) -> CanonicalInstant {
        CanonicalInstant::new(utc, self.zone)
    }
}

/// Relative description of `instant` as seen at `now` ("3 hours ago", "in a day")
pub fn relative_to(instant: &CanonicalInstant, now: DateTime<Utc>) -> String {
    let seconds = (now - instant.utc).num_seconds();
    let phrase = humanize(seconds.unsigned_abs());
    if seconds >= 0 {
        format!("{} ago", phrase)
    } else {
        format!("in {}", phrase)
    }
}

fn humanize(seconds: u64) -> String {
    let seconds = seconds as f64;
    let minutes = (seconds / 60.0).round();
    let hours = (seconds / 3600.0).round();
    let days = (seconds / 86_400.0).round();

    if seconds < 45.0 {
        "a few seconds".to_string()
    } else if seconds < 90.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes", minutes)
    } else if minutes < 90.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{} hours", hours)
    } else if hours < 36.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{} days", days)
    } else if days < 45.0 {
        "a month".to_string()
    } else if days < 320.0 {
        format!("{} months", (days / 30.4).round().max(2.0))
    } else if days < 548.0 {
        "a year".to_string()
    } else {
        format!("{} years", (days / 365.0).round().max(2.0))
    }
}
