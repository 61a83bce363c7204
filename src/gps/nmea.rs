// src/gps/nmea.rs v2
//! NMEA sentence parsing
//!
//! Only RMC (Recommended Minimum) is decoded: it carries fix validity,
//! position and speed in one sentence. Everything else is reported as
//! [`ParseError::Unsupported`] so the caller can skip it.

use super::data::Fix;
use crate::error::ParseError;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// 1 knot = 1.852 km/h
pub const KNOTS_TO_KMH: f64 = 1.852;

/// Standard RMC has 12 fields before the checksum; NMEA 2.3+ adds a mode field.
const RMC_MIN_FIELDS: usize = 12;

/// Parse a single NMEA line into a fix.
///
/// `received_at` becomes the fix timestamp; the receiver's own UTC time, when
/// present, is kept separately in [`Fix::receiver_time`].
pub fn parse_sentence(line: &str, received_at: DateTime<Utc>) -> Result<Fix, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let body = verify_checksum(line)?;
    let parts: Vec<&str> = body.split(',').collect();

    let address = parts[0];
    if address.len() != 5 || !address.is_ascii() {
        return Err(ParseError::Unsupported(address.to_string()));
    }
    // Talker (GP, GN, GL, ...) is ignored; only the formatter matters.
    match &address[2..] {
        "RMC" => parse_rmc(&parts, received_at),
        _ => Err(ParseError::Unsupported(address.to_string())),
    }
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Check the `$...*hh` framing and return the body between them.
fn verify_checksum(line: &str) -> Result<&str, ParseError> {
    let inner = line.strip_prefix('$').ok_or(ParseError::MissingStart)?;
    let (body, hex) = inner.rsplit_once('*').ok_or(ParseError::MissingChecksum)?;

    let expected = match hex.trim() {
        h if h.len() == 2 && h.bytes().all(|b| b.is_ascii_hexdigit()) => u8::from_str_radix(h, 16).ok(),
        _ => None,
    }
    .ok_or_else(|| ParseError::InvalidField {
        field: "checksum",
        value: hex.to_string(),
    })?;

    let actual = checksum(body);
    if expected != actual {
        return Err(ParseError::BadChecksum { expected, actual });
    }
    Ok(body)
}

/// Parse RMC (Recommended Minimum Course) sentence
fn parse_rmc(parts: &[&str], received_at: DateTime<Utc>) -> Result<Fix, ParseError> {
    if parts.len() < RMC_MIN_FIELDS {
        return Err(ParseError::Truncated { fields: parts.len() });
    }

    // Status (field 2): A = active, V = void
    let active = match parts[2] {
        "A" | "a" => true,
        "V" | "v" | "" => false,
        other => return Err(invalid("status", other)),
    };

    // Latitude (fields 3 and 4), longitude (fields 5 and 6)
    let latitude = parse_coordinate(parts[3], parts[4], 'N', 'S', 90.0, "latitude")?;
    let longitude = parse_coordinate(parts[5], parts[6], 'E', 'W', 180.0, "longitude")?;

    // Speed over ground in knots (field 7)
    let speed_knots = match parts[7] {
        "" => 0.0,
        s => match s.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => return Err(invalid("speed", s)),
        },
    };

    // Mode indicator (field 12, NMEA 2.3+): N = data not valid
    let mode_ok = parts.get(12).map_or(true, |m| !m.starts_with('N'));

    let receiver_time = parse_utc(parts[1], parts[9]);

    Ok(match (latitude, longitude) {
        (Some(latitude), Some(longitude)) if active && mode_ok => Fix {
            valid: true,
            latitude,
            longitude,
            speed_kmh: speed_knots * KNOTS_TO_KMH,
            timestamp: received_at,
            receiver_time,
        },
        _ => Fix {
            receiver_time,
            ..Fix::invalid(received_at)
        },
    })
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed decimal degrees.
///
/// Empty fields mean "no position" and yield `Ok(None)`.
fn parse_coordinate(
    value: &str,
    hemisphere: &str,
    positive: char,
    negative: char,
    limit: f64,
    field: &'static str,
) -> Result<Option<f64>, ParseError> {
    if value.is_empty() || hemisphere.is_empty() {
        return Ok(None);
    }

    let dot = value.find('.').unwrap_or(value.len());
    if dot < 3 || !value.is_ascii() {
        return Err(invalid(field, value));
    }
    let deg_len = dot - 2;
    let degrees: u32 = value[..deg_len].parse().map_err(|_| invalid(field, value))?;
    let minutes: f64 = value[deg_len..].parse().map_err(|_| invalid(field, value))?;
    if !(0.0..60.0).contains(&minutes) {
        return Err(invalid(field, value));
    }

    let magnitude = degrees as f64 + minutes / 60.0;
    if magnitude > limit {
        return Err(invalid(field, value));
    }

    let sign = match hemisphere.chars().next() {
        Some(c) if c == positive && hemisphere.len() == 1 => 1.0,
        Some(c) if c == negative && hemisphere.len() == 1 => -1.0,
        _ => return Err(invalid("hemisphere", hemisphere)),
    };
    Ok(Some(sign * magnitude))
}

/// Combine `hhmmss[.sss]` and `ddmmyy` into a UTC instant.
fn parse_utc(time: &str, date: &str) -> Option<DateTime<Utc>> {
    if time.len() < 6 || date.len() != 6 || !time.is_ascii() || !date.is_ascii() {
        return None;
    }
    let hour: u32 = time[0..2].parse().ok()?;
    let minute: u32 = time[2..4].parse().ok()?;
    let seconds: f64 = time[4..].parse().ok()?;
    let nanos = ((seconds.fract() * 1e9).round() as u32).min(999_999_999);

    let day: u32 = date[0..2].parse().ok()?;
    let month: u32 = date[2..4].parse().ok()?;
    let yy: i32 = date[4..6].parse().ok()?;
    // Two-digit year: 80-99 are 19xx
    let year = if yy >= 80 { 1900 + yy } else { 2000 + yy };

    let naive = NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_nano_opt(hour, minute, seconds as u32, nanos)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn invalid(field: &'static str, value: &str) -> ParseError {
    ParseError::InvalidField {
        field,
        value: value.to_string(),
    }
}

/// Build a checksummed `$GPRMC` sentence for an active fix.
///
/// Used by the simulator so its output goes through the same parser as a
/// real receiver's.
pub fn format_rmc(latitude: f64, longitude: f64, speed_knots: f64, course: f64, at: DateTime<Utc>) -> String {
    let (lat, ns) = format_coordinate(latitude, 2, 'N', 'S');
    let (lon, ew) = format_coordinate(longitude, 3, 'E', 'W');
    let body = format!(
        "GPRMC,{},A,{},{},{},{},{:.1},{:.1},{},,,A",
        at.format("%H%M%S%.3f"),
        lat,
        ns,
        lon,
        ew,
        speed_knots,
        course,
        at.format("%d%m%y"),
    );
    format!("${}*{:02X}", body, checksum(&body))
}

fn format_coordinate(value: f64, deg_width: usize, positive: char, negative: char) -> (String, char) {
    let hemisphere = if value < 0.0 { negative } else { positive };
    // Work in ten-thousandths of a minute so rounding never yields "60.0000".
    let total = (value.abs() * 60.0 * 10_000.0).round() as u64;
    let degrees = total / 600_000;
    let minutes = (total % 600_000) as f64 / 10_000.0;
    (format!("{:0width$}{:07.4}", degrees, minutes, width = deg_width), hemisphere)
}
