// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, NaiveDate, Utc};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Format a point in time the way channel files record it, e.g.
/// `Thu, 01 Oct 2015 09:53:38 GMT`
pub fn format_rfc822(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The current time as an RFC-822 string
pub fn rfc822_now() -> String {
    format_rfc822(Utc::now())
}

/// Extract the calendar date from an RFC-822 style date string.
///
/// Accepts an optional leading weekday abbreviation (with or without a
/// comma) followed by day, month abbreviation and year. Anything after the
/// year (time, zone) is ignored. Two-digit years below 50 land in the 2000s,
/// the rest in the 1900s. Returns `None` for anything that does not describe
/// a valid date.
pub fn parse_rfc822_date(input: &str) -> Option<NaiveDate> {
    let mut rest = input.trim_start();
    if rest.is_empty() {
        return None;
    }

    if WEEKDAYS.iter().any(|day| rest.starts_with(day)) {
        rest = rest[3..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        if rest.is_empty() {
            return None;
        }
    }

    let mut fields = rest.split_whitespace();
    let day: u32 = fields.next()?.parse().ok()?;

    let month_field = fields.next()?;
    let month = MONTHS
        .iter()
        .position(|month| month_field.starts_with(month))? as u32
        + 1;

    let mut year = leading_integer(fields.next()?)?;
    if year < 1900 {
        year += if year < 50 { 2000 } else { 1900 };
    }

    NaiveDate::from_ymd_opt(year, month, day)
}

fn leading_integer(field: &str) -> Option<i32> {
    let end = field
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(field.len(), |(idx, _)| idx);

    field[..end].parse().ok()
}
