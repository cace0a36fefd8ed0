use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Handles parsing reading dates from the formats found in meter exports
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a reading date into the wall-clock time it was recorded at.
    /// Offsets (including a `Z` suffix) are accepted but not applied, so a
    /// reading taken at local midnight stays on its calendar day.
    pub fn parse(timestamp_str: &str) -> Result<NaiveDateTime> {
        let trimmed = timestamp_str.trim();

        // Handle both Z suffix and timezone info
        let timestamp = if trimmed.ends_with('Z') {
            trimmed.replace('Z', "+00:00")
        } else {
            trimmed.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&timestamp) {
            return Ok(dt.naive_local());
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(naive);
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight);
            }
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// Parse a `YYYY-MM-DD` command line date.
    pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|_| {
            anyhow::anyhow!("Invalid date format: {}. Use YYYY-MM-DD", date_str)
        })
    }
}
