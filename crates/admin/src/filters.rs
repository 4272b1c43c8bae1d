//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use chrono::{DateTime, NaiveDateTime, Utc};
use tienda_core::{OrderStatus, Price};

/// Format a price as `$ 1.234,50`.
///
/// Accepts anything that displays as a decimal amount; values that do not
/// parse are shown as-is.
///
/// Usage in templates: `{{ order.total|money }}`
#[askama::filter_fn]
pub fn money(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let raw = value.to_string();
    Ok(Price::parse(&raw).map_or(raw, |price| price.to_string()))
}

/// Format an RFC 3339 timestamp as `dd/mm/YYYY HH:MM` (UTC).
///
/// Usage in templates: `{{ order.created_at|datetime }}`
#[askama::filter_fn]
pub fn datetime(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let raw = value.to_string();
    Ok(parse_timestamp(&raw).map_or(raw, |at| at.format("%d/%m/%Y %H:%M").to_string()))
}

/// Spanish label for an order status identifier.
///
/// Usage in templates: `{{ order.status|status_label }}`
#[askama::filter_fn]
pub fn status_label(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let raw = value.to_string();
    Ok(raw
        .parse::<OrderStatus>()
        .map_or(raw, |status| status.label().to_owned()))
}

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// RFC 3339, or chrono's `Display` form (`2024-05-01 10:15:00 UTC`).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    raw.strip_suffix(" UTC")
        .and_then(|naive| NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f").ok())
        .map(|naive| naive.and_utc())
}
