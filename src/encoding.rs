//! Serde helpers for byte fields carried as standard base64 in JSON bodies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

/// Drop line breaks and other ASCII whitespace from wrapped base64 text.
fn compact(encoded: &str) -> String {
    encoded.split_ascii_whitespace().collect()
}

/// `Option<Vec<u8>>` as an optional base64 string.
pub mod base64_opt {
    use super::*;

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(compact(&s)).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// `BTreeMap<String, Vec<u8>>` as a map of base64 strings.
pub mod base64_map {
    use std::collections::BTreeMap;

    use serde::ser::SerializeMap;

    use super::*;

    pub fn serialize<S>(value: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(value.len()))?;
        for (key, bytes) in value {
            map.serialize_entry(key, &STANDARD.encode(bytes))?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(key, value)| {
                STANDARD
                    .decode(compact(&value))
                    .map(|bytes| (key.clone(), bytes))
                    .map_err(|e| serde::de::Error::custom(format!("data.{}: {}", key, e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        #[serde(default, with = "super::base64_opt")]
        blob: Option<Vec<u8>>,
        #[serde(default, with = "super::base64_map")]
        data: BTreeMap<String, Vec<u8>>,
    }

    #[test]
    fn test_decodes_base64_fields() {
        let json = r#"{"blob": "aGVsbG8=", "data": {"user": "YWRtaW4="}}"#;
        let payload: Payload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.blob.as_deref(), Some(b"hello".as_slice()));
        assert_eq!(payload.data["user"], b"admin".to_vec());
    }

    #[test]
    fn test_decodes_line_wrapped_values() {
        let json = "{\"blob\": \"aGVs\\nbG8=\\n\", \"data\": {\"user\": \"YWRt\\r\\naW4=\"}}";
        let payload: Payload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.blob.as_deref(), Some(b"hello".as_slice()));
        assert_eq!(payload.data["user"], b"admin".to_vec());
    }

    #[test]
    fn test_missing_fields_default() {
        let payload: Payload = serde_json::from_str("{}").unwrap();
        assert!(payload.blob.is_none());
        assert!(payload.data.is_empty());
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let json = r#"{"data": {"user": "%%%"}}"#;
        let err = serde_json::from_str::<Payload>(json).unwrap_err();
        assert!(err.to_string().contains("data.user"));
    }

    #[test]
    fn test_serializes_as_base64() {
        let payload = Payload {
            blob: Some(b"hi".to_vec()),
            data: BTreeMap::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["blob"], "aGk=");
    }
}
