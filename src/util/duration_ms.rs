//! Serde adapter storing a [`Duration`] as whole milliseconds.
//!
//! Use with `#[serde(with = "crate::util::duration_ms")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a duration as an integer number of milliseconds.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// Deserialize a duration from an integer number of milliseconds.
///
/// # Errors
///
/// Fails when the input is not an unsigned integer.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::util::duration_ms")]
        timeout: Duration,
    }

    #[test]
    fn test_millis_encoding() {
        let json = serde_json::to_string(&Wrapper {
            timeout: Duration::from_millis(1500),
        })
        .unwrap();
        assert_eq!(json, r#"{"timeout":1500}"#);

        let back: Wrapper = serde_json::from_str(r#"{"timeout":20}"#).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(20));
    }

    #[test]
    fn test_rejects_negative() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"timeout":-1}"#).is_err());
    }
}
