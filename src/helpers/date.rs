//! Date helper functions
//!
//! Publication dates arrive as ISO-8601 strings and are shown as
//! `d MMM yyyy` with Brazilian Portuguese month abbreviations.

use chrono::{DateTime, Datelike, FixedOffset};

/// Month abbreviations, January first
pub const PT_BR_MONTHS: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];

/// Shown when a post has no (or an unreadable) publication date
pub const UNKNOWN_DATE: &str = "Data indisponível";

/// Parse a CMS timestamp, keeping its offset
///
/// Accepts RFC 3339 (`2021-03-15T00:00:00Z`) and the colon-less offset
/// form the CMS emits (`2021-03-15T19:25:28+0000`).
pub fn parse_publication_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// Format a date as `d MMM yyyy`, e.g. `15 Mar 2021`
pub fn format_pt_br(date: &DateTime<FixedOffset>) -> String {
    format!(
        "{} {} {}",
        date.day(),
        PT_BR_MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Format an optional publication date, degrading to a placeholder
pub fn format_publication_date(value: Option<&str>) -> String {
    match value.and_then(parse_publication_date) {
        Some(date) => format_pt_br(&date),
        None => {
            if let Some(raw) = value {
                tracing::debug!("Unreadable publication date {:?}", raw);
            }
            UNKNOWN_DATE.to_string()
        }
    }
}

/// Machine-readable form for `<time datetime>`
pub fn date_xml(value: Option<&str>) -> Option<String> {
    value
        .and_then(parse_publication_date)
        .map(|date| date.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
}
