//! Candle normalizer: raw provider records → ordered `Candle` series.
//!
//! Provider timestamps look like `2025-01-05T09:15:00+05:30`. The date, time of
//! day and offset suffix are split apart; a missing offset stays empty.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use thiserror::Error;

use super::provider::RawRecord;
use crate::domain::{Candle, TIME_FORMAT};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// The three textual parts of a provider timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampParts<'a> {
    pub date: &'a str,
    pub time: &'a str,
    pub timezone: &'a str,
}

impl TimestampParts<'_> {
    pub fn join(&self) -> String {
        format!("{}T{}{}", self.date, self.time, self.timezone)
    }
}

/// Split `DATE 'T' TIME ['+HH:MM']` into its parts.
///
/// Returns `None` when there is no `T` separator, the time part is empty, or a
/// `+` suffix is present but is not of the form `+HH:MM`.
pub fn split_timestamp(raw: &str) -> Option<TimestampParts<'_>> {
    let (date, rest) = raw.split_once('T')?;
    let (time, timezone) = match rest.find('+') {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };
    if date.is_empty() || time.is_empty() {
        return None;
    }
    if !timezone.is_empty() && !is_offset(timezone) {
        return None;
    }
    Some(TimestampParts {
        date,
        time,
        timezone,
    })
}

fn is_offset(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 6
        && b[0] == b'+'
        && b[1].is_ascii_digit()
        && b[2].is_ascii_digit()
        && b[3] == b':'
        && b[4].is_ascii_digit()
        && b[5].is_ascii_digit()
}

/// Parse one raw record into a candle.
pub fn parse_record(index: usize, record: &RawRecord) -> Result<Candle, NormalizeError> {
    let malformed = |reason: String| NormalizeError::MalformedRecord { index, reason };
    let fields = record.fields();

    if !(5..=6).contains(&fields.len()) {
        return Err(malformed(format!(
            "expected 5 or 6 fields, got {}",
            fields.len()
        )));
    }

    let raw_ts = fields[0]
        .as_str()
        .ok_or_else(|| malformed(format!("timestamp is not a string: {}", fields[0])))?;
    let parts =
        split_timestamp(raw_ts).ok_or_else(|| malformed(format!("bad timestamp '{raw_ts}'")))?;
    let date = NaiveDate::parse_from_str(parts.date, "%Y-%m-%d")
        .map_err(|e| malformed(format!("bad date '{}': {e}", parts.date)))?;
    let time = NaiveTime::parse_from_str(parts.time, TIME_FORMAT)
        .map_err(|e| malformed(format!("bad time '{}': {e}", parts.time)))?;

    let price = |i: usize, name: &str| -> Result<f64, NormalizeError> {
        fields[i]
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("{name} is not a number: {}", fields[i])))
    };

    let volume = match fields.get(5) {
        None | Some(Value::Null) => 0,
        Some(v) => volume_of(v).ok_or_else(|| malformed(format!("bad volume: {v}")))?,
    };

    let candle = Candle {
        date,
        time,
        timezone: parts.timezone.to_string(),
        open: price(1, "open")?,
        high: price(2, "high")?,
        low: price(3, "low")?,
        close: price(4, "close")?,
        volume,
    };
    if !candle.is_sane() {
        return Err(malformed(format!(
            "inconsistent OHLC o={} h={} l={} c={}",
            candle.open, candle.high, candle.low, candle.close
        )));
    }
    Ok(candle)
}

fn volume_of(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| {
        v.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64)
    })
}

/// Normalize a whole response batch.
///
/// Any malformed record fails the batch. The result is sorted by timestamp with
/// duplicate timestamps dropped (first occurrence kept).
pub fn normalize(records: &[RawRecord]) -> Result<Vec<Candle>, NormalizeError> {
    let mut candles = records
        .iter()
        .enumerate()
        .map(|(i, rec)| parse_record(i, rec))
        .collect::<Result<Vec<_>, _>>()?;

    candles.sort_by_key(Candle::timestamp);
    candles.dedup_by_key(|c| c.timestamp());
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn splits_timestamp_with_offset() {
        let raw = "2025-01-05T09:15:00+05:30";
        let parts = split_timestamp(raw).unwrap();
        assert_eq!(parts.date, "2025-01-05");
        assert_eq!(parts.time, "09:15:00");
        assert_eq!(parts.timezone, "+05:30");
        assert_eq!(parts.join(), raw);
    }

    #[test]
    fn missing_offset_stays_empty() {
        let parts = split_timestamp("2025-01-05T09:15:00").unwrap();
        assert_eq!(parts.time, "09:15:00");
        assert_eq!(parts.timezone, "");
    }

    #[test]
    fn rejects_bad_offsets_and_shapes() {
        assert!(split_timestamp("2025-01-05 09:15:00").is_none());
        assert!(split_timestamp("2025-01-05T+05:30").is_none());
        assert!(split_timestamp("2025-01-05T09:15:00+0530").is_none());
    }

    #[test]
    fn parses_six_field_record() {
        let rec = record(json!(["2025-01-06T09:15:00+05:30", 23600.5, 23640.0, 23590.0, 23620.25, 1500]));
        let candle = parse_record(0, &rec).unwrap();
        assert_eq!(candle.date, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(candle.time, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(candle.timezone, "+05:30");
        assert_eq!(candle.open, 23600.5);
        assert_eq!(candle.close, 23620.25);
        assert_eq!(candle.volume, 1500);
        assert_eq!(candle.raw_timestamp(), "2025-01-06T09:15:00+05:30");
    }

    #[test]
    fn five_field_record_defaults_volume() {
        let rec = record(json!(["2025-01-06T09:15:00+05:30", 1.0, 2.0, 0.5, 1.5]));
        assert_eq!(parse_record(0, &rec).unwrap().volume, 0);
    }

    #[test]
    fn null_volume_defaults_to_zero() {
        let rec = record(json!(["2025-01-06T09:15:00+05:30", 1.0, 2.0, 0.5, 1.5, null]));
        assert_eq!(parse_record(0, &rec).unwrap().volume, 0);
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let rec = record(json!(["2025-01-06T09:15:00+05:30", 1.0, 2.0, 0.5]));
        let err = parse_record(3, &rec).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedRecord { index: 3, .. }));
    }

    #[test]
    fn non_numeric_price_is_malformed() {
        let rec = record(json!(["2025-01-06T09:15:00+05:30", "1.0", 2.0, 0.5, 1.5]));
        assert!(parse_record(0, &rec).is_err());
    }

    #[test]
    fn inconsistent_ohlc_is_malformed() {
        // high below close
        let rec = record(json!(["2025-01-06T09:15:00+05:30", 100.0, 100.5, 99.0, 101.0, 0]));
        assert!(matches!(
            parse_record(2, &rec),
            Err(NormalizeError::MalformedRecord { index: 2, .. })
        ));
        let zero = record(json!(["2025-01-06T09:15:00+05:30", 0.0, 0.0, 0.0, 0.0, 0]));
        assert!(parse_record(0, &zero).is_err());
    }

    #[test]
    fn fractional_seconds_survive_the_round_trip() {
        let raw = "2025-01-06T09:15:00.250+05:30";
        let rec = record(json!([raw, 1.0, 2.0, 0.5, 1.5, 0]));
        let candle = parse_record(0, &rec).unwrap();
        assert_eq!(candle.time, NaiveTime::from_hms_milli_opt(9, 15, 0, 250).unwrap());
        assert_eq!(candle.raw_timestamp(), raw);
    }

    #[test]
    fn one_bad_record_fails_the_batch() {
        let records = vec![
            record(json!(["2025-01-06T09:15:00+05:30", 1.0, 2.0, 0.5, 1.5, 0])),
            record(json!(["garbage", 1.0, 2.0, 0.5, 1.5, 0])),
        ];
        let err = normalize(&records).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedRecord { index: 1, .. }));
    }

    #[test]
    fn normalize_sorts_and_dedupes() {
        let records = vec![
            record(json!(["2025-01-06T09:17:00+05:30", 3.0, 3.0, 3.0, 3.0, 0])),
            record(json!(["2025-01-06T09:15:00+05:30", 1.0, 1.0, 1.0, 1.0, 0])),
            record(json!(["2025-01-06T09:16:00+05:30", 2.0, 2.0, 2.0, 2.0, 0])),
            record(json!(["2025-01-06T09:15:00+05:30", 9.0, 9.0, 9.0, 9.0, 0])),
        ];
        let candles = normalize(&records).unwrap();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }
}
