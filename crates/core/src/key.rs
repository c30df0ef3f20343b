use std::cmp::PartialEq;
use std::fmt;
use std::str::FromStr;

use derive_more::{AsRef, Deref};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A normalized string identifier used for definition ids and categories.
/// Keys are normalized to lowercase with underscores replacing whitespace.
/// They can only contain ASCII lowercase letters and underscores, with a
/// maximum length of 64 characters.
#[derive(Clone, Hash, Deref, AsRef)]
#[deref(forward)]
pub struct Key(String);

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum KeyParseError {
    #[error("key cannot be empty or whitespace")]
    Empty,

    #[error("key contains invalid characters")]
    InvalidCharacters,

    #[error("key is too long (max 64 characters)")]
    TooLong,
}

impl Key {
    pub fn new<S: AsRef<str>>(s: S) -> Result<Self, KeyParseError> {
        let s = s.as_ref().trim();
        if s.is_empty() {
            return Err(KeyParseError::Empty);
        }

        let joined = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_ascii_lowercase();

        if !joined.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            return Err(KeyParseError::InvalidCharacters);
        }

        if joined.len() > 64 {
            return Err(KeyParseError::TooLong);
        }

        Ok(Key(joined))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid<S: AsRef<str>>(s: S) -> bool {
        Key::new(s).is_ok()
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::new(s)
    }
}

impl TryFrom<&str> for Key {
    type Error = KeyParseError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Key::new(s)
    }
}

impl TryFrom<String> for Key {
    type Error = KeyParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Key::new(&s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl<T> PartialEq<T> for Key
where
    T: AsRef<str>,
{
    fn eq(&self, other: &T) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl PartialEq<Key> for str {
    fn eq(&self, other: &Key) -> bool {
        self == other.as_ref()
    }
}

impl PartialEq<Key> for String {
    fn eq(&self, other: &Key) -> bool {
        self.as_str() == other.as_ref()
    }
}

impl Eq for Key {}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

struct KeyVisitor;

impl<'de> Visitor<'de> for KeyVisitor {
    type Value = Key;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a valid definition key string")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Key::new(value).map_err(|e| E::custom(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(KeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_creation_and_comparison() {
        let k = Key::new("My KEY").unwrap();
        assert_eq!(k, "my_key");
        assert_eq!(k, String::from("my_key"));

        let k2 = Key::new("my_key").unwrap();
        assert_eq!(k, k2);
    }

    #[test]
    fn key_normalization() {
        assert_eq!(
            Key::new("Hello World").unwrap(),
            Key::new("hello world").unwrap()
        );
        assert_eq!(
            Key::new("  Multi  Space  ").unwrap(),
            Key::new("multi space").unwrap()
        );
    }

    #[test]
    fn key_validation() {
        assert!(Key::new("").is_err());
        assert!(Key::new("   ").is_err());
        assert!(Key::new("Invalid-Dash").is_err());
        assert!(Key::new("Numbers123").is_err());

        let long_key = "a".repeat(65);
        assert!(Key::new(long_key).is_err());

        assert!(Key::is_valid("valid_key"));
        assert!(!Key::is_valid(""));
        assert!(!Key::is_valid("INVALID!"));
    }

    #[test]
    fn key_try_from_implementations() {
        let k1: Result<Key, _> = TryFrom::try_from("test_key");
        assert_eq!(k1.unwrap(), "test_key");

        let k2: Result<Key, _> = TryFrom::try_from(String::from("test_key"));
        assert_eq!(k2.unwrap(), "test_key");

        let k4: Result<Key, _> = "test_key".parse();
        assert_eq!(k4.unwrap(), "test_key");
    }

    #[test]
    fn key_serde_roundtrip() {
        let key = Key::new("branch").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        let back: Key = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
