//! Parsed telemetry message from the physics engine.

use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseFloatError;

use serde::Serialize;
use tracing::{trace, warn};

/// Key under which the raw timestamp of a `TIME` line is stored.
pub const TIME_KEY: &str = "TIME";

/// One telemetry message: the raw lines plus a key/value view of them.
///
/// Lines of the form `key = value` map trimmed `key` to trimmed `value`. A
/// line starting with `TIME` and holding `YYYY-DDD-HH:MM:SS` additionally
/// yields `YEAR`, `DOY`, `HOUR`, `MINUTE`, `SECOND`, `MONTH`, `DAY` and
/// `ABSTIME` (seconds since J2000). Any other line becomes a key with an
/// empty value. The first occurrence of a key wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataPoint {
    lines: Vec<String>,
    values: BTreeMap<String, String>,
}

impl DataPoint {
    pub fn from_lines(lines: Vec<String>) -> Self {
        let mut values = BTreeMap::new();

        for line in &lines {
            if let Some((key, value)) = line.split_once('=') {
                insert(&mut values, key.trim(), value.trim());
            } else if let Some(rest) = line.strip_prefix(TIME_KEY) {
                let stamp = rest.trim();
                insert(&mut values, TIME_KEY, stamp);
                if let Err(reason) = insert_time_fields(&mut values, stamp) {
                    warn!(stamp, reason, "ignoring malformed telemetry timestamp");
                }
            } else {
                insert(&mut values, line.trim(), "");
            }
        }

        trace!(lines = lines.len(), keys = values.len(), "parsed telemetry data point");
        Self { lines, values }
    }

    /// Raw lines in arrival order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Parse the value under `key` as a bracketed vector of doubles.
    pub fn vector(&self, key: &str) -> Option<Vec<f64>> {
        self.value(key).and_then(|text| parse_double_vector(text).ok())
    }

    /// Seconds since J2000, when the message carried a valid `TIME` line.
    pub fn abs_time(&self) -> Option<f64> {
        self.value("ABSTIME").and_then(|text| text.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("42 Data Point: ")?;
        for line in &self.lines {
            f.write_str(line)?;
        }
        Ok(())
    }
}

fn insert(values: &mut BTreeMap<String, String>, key: &str, value: &str) {
    values
        .entry(key.to_string())
        .or_insert_with(|| value.to_string());
}

fn insert_time_fields(
    values: &mut BTreeMap<String, String>,
    stamp: &str,
) -> std::result::Result<(), &'static str> {
    let mut date = stamp.splitn(3, '-');
    let (Some(year), Some(doy), Some(clock)) = (date.next(), date.next(), date.next()) else {
        return Err("expected YYYY-DDD-HH:MM:SS");
    };
    let mut clock = clock.splitn(3, ':');
    let (Some(hour), Some(minute), Some(second)) = (clock.next(), clock.next(), clock.next())
    else {
        return Err("expected HH:MM:SS");
    };

    for (key, value) in [
        ("YEAR", year),
        ("DOY", doy),
        ("HOUR", hour),
        ("MINUTE", minute),
        ("SECOND", second),
    ] {
        insert(values, key, value.trim());
    }

    let field = |key: &str| values.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
    let integer = |key: &str| field(key).parse::<i64>().map_err(|_| "non-integer date field");
    let year = integer("YEAR")?;
    let doy = integer("DOY")?;
    let hour = integer("HOUR")?;
    let minute = integer("MINUTE")?;
    let second = field("SECOND")
        .parse::<f64>()
        .map_err(|_| "non-numeric seconds")?;

    if !(1..=9999).contains(&year)
        || !(1..=366).contains(&doy)
        || !(0..24).contains(&hour)
        || !(0..60).contains(&minute)
        || !second.is_finite()
    {
        return Err("date field out of range");
    }

    let (month, day) = doy_to_month_day(year, doy);
    let abs_time = date_to_j2000_seconds(year, month, day, hour, minute, second);

    insert(values, "MONTH", &month.to_string());
    insert(values, "DAY", &day.to_string());
    insert(values, "ABSTIME", &format!("{abs_time:.6}"));
    Ok(())
}

/// Month and day of month for a day of year (Meeus, Astronomical Algorithms).
///
/// Leap years are every fourth year; valid for 1901 through 2099.
/// `day_of_year` must lie in `1..=366`.
pub fn doy_to_month_day(year: i64, day_of_year: i64) -> (i64, i64) {
    let k = if year % 4 == 0 { 1 } else { 2 };
    let month = if day_of_year < 32 {
        1
    } else {
        (9.0 * (k + day_of_year) as f64 / 275.0 + 0.98) as i64
    };
    let day = day_of_year - 275 * month / 9 + k * ((month + 9) / 12) + 30;
    (month, day)
}

/// Seconds since the J2000 epoch (2000-01-01 12:00:00) for a Gregorian
/// calendar date. Agnostic to the TT/UTC offset.
pub fn date_to_j2000_seconds(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: f64,
) -> f64 {
    let (year, month) = if month < 3 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };

    let a = year / 100;
    let b = 2 - a + a / 4;
    let days = (365.25 * (year - 2000) as f64).floor()
        + (30.6001 * (month + 1) as f64).floor()
        + day as f64
        + b as f64
        - 50.5;

    86_400.0 * days + 3_600.0 * hour as f64 + 60.0 * minute as f64 + second
}

/// Parse `"[1.0 2.0 3.0]"` (brackets optional) into its numbers.
pub fn parse_double_vector(text: &str) -> std::result::Result<Vec<f64>, ParseFloatError> {
    text.replace(['[', ']'], " ")
        .split_whitespace()
        .map(str::parse)
        .collect()
}
