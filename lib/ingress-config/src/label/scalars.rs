//! Scalar coercion helpers shared by every `Duration` field in the
//! dynamic/static configuration trees, so that label-sourced values
//! (strings, possibly raw nanosecond integers) and YAML/JSON-sourced
//! values (native numbers) both deserialize the same way (spec §4.1:
//! "duration (with unit suffix or nanoseconds as integer)").

use std::time::Duration;

pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    if let Ok(nanos) = raw.parse::<u64>() {
        return Ok(Duration::from_nanos(nanos));
    }
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}

pub fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("cannot parse `{other}` as bool")),
    }
}

pub mod duration {
    use super::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let value = Value::deserialize(d)?;
        from_value(&value).map_err(D::Error::custom)
    }

    pub fn from_value(value: &Value) -> Result<Duration, String> {
        match value {
            Value::String(s) => super::parse_duration(s),
            Value::Number(n) => n
                .as_u64()
                .map(Duration::from_nanos)
                .ok_or_else(|| format!("invalid duration number {n}")),
            other => Err(format!("cannot parse duration from {other}")),
        }
    }
}

pub mod opt_duration {
    use super::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::duration::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => super::duration::from_value(&v)
                .map(Some)
                .map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_suffixed_durations() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn parses_raw_nanoseconds() {
        assert_eq!(parse_duration("1000000000").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn parses_bool_variants() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
