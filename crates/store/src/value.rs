use serde::{Deserialize, Serialize};

/// AttributeValue is the store's tagged union over attribute representations.
/// The serde externally-tagged encoding yields the store's wire dialect
/// directly: `{"S": "hello"}`, `{"N": "42"}`, `{"NULL": true}` and so on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string.
    S(String),
    /// Arbitrary-precision decimal, carried as its base-10 string rendering.
    N(String),
    /// Byte string, base64 over the wire.
    B(#[serde(with = "b64")] bytes::Bytes),
    /// Boolean.
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Explicit null. The store requires the tag payload to be `true`.
    #[serde(rename = "NULL")]
    Null(bool),
    /// Ordered list of nested values.
    L(Vec<AttributeValue>),
    /// Map of attribute name to nested value.
    M(crate::AttributeMap),
    /// Set of strings.
    SS(Vec<String>),
    /// Set of decimal strings.
    NS(Vec<String>),
    /// Set of byte strings.
    BS(#[serde(with = "b64_seq")] Vec<bytes::Bytes>),
}

impl AttributeValue {
    /// The scalar payload of a key-eligible value, rendered as a string.
    /// Binary payloads render as base64 and Null / composite values are None.
    pub fn key_scalar(&self) -> Option<std::borrow::Cow<'_, str>> {
        use std::borrow::Cow;
        match self {
            AttributeValue::S(s) => Some(Cow::Borrowed(s)),
            AttributeValue::N(n) => Some(Cow::Borrowed(n)),
            AttributeValue::B(b) => Some(Cow::Owned(base64::encode(b))),
            _ => None,
        }
    }
}

mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &bytes::Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::encode(b))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bytes::Bytes, D::Error> {
        let s = String::deserialize(d)?;
        base64::decode(&s)
            .map(bytes::Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

mod b64_seq {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &[bytes::Bytes], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(b.iter().map(base64::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<bytes::Bytes>, D::Error> {
        let seq = Vec::<String>::deserialize(d)?;
        seq.into_iter()
            .map(|s| {
                base64::decode(&s)
                    .map(bytes::Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
