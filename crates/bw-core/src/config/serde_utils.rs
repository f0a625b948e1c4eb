//! Shared serialization/deserialization utilities for configuration

/// Helper module for Duration serialization as a human-readable string
///
/// Durations are written the way they are typed on the command line
/// (`10s`, `1m 30s`), and bare integers are accepted as seconds.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "burrow_core::config::serde_utils::duration_human")]
///     retry: Duration,
/// }
/// ```
pub mod duration_human {
    use serde::{self, de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Serialize a Duration as a humantime string
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserialize a Duration from a humantime string or integer seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(&text).map_err(de::Error::custom),
        }
    }

    /// Same as the parent module, for `Option<Duration>` fields
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapper(
                #[serde(with = "crate::config::serde_utils::duration_human")] Duration,
            );

            let wrapped = Option::<Wrapper>::deserialize(deserializer)?;
            Ok(wrapped.map(|Wrapper(d)| d))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_human")]
        retry: Duration,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct OptionalConfig {
        #[serde(default, with = "duration_human::option")]
        retry: Option<Duration>,
    }

    #[test]
    fn test_duration_human_serialize() {
        let config = TestConfig {
            retry: Duration::from_secs(90),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"retry":"1m 30s"}"#);
    }

    #[test]
    fn test_duration_human_deserialize_text() {
        let config: TestConfig = toml::from_str(r#"retry = "10s""#).unwrap();
        assert_eq!(config.retry, Duration::from_secs(10));
    }

    #[test]
    fn test_duration_human_deserialize_integer() {
        let config: TestConfig = toml::from_str("retry = 5").unwrap();
        assert_eq!(config.retry, Duration::from_secs(5));
    }

    #[test]
    fn test_duration_human_rejects_garbage() {
        assert!(toml::from_str::<TestConfig>(r#"retry = "soon""#).is_err());
    }

    #[test]
    fn test_duration_human_option() {
        let missing: OptionalConfig = toml::from_str("").unwrap();
        assert_eq!(missing.retry, None);

        let present: OptionalConfig = toml::from_str(r#"retry = "250ms""#).unwrap();
        assert_eq!(present.retry, Some(Duration::from_millis(250)));
    }
}
