mod auto;
mod ident;
mod model;
mod schema;
mod unmarshal;
mod value;

pub use auto::{auto_marshal, auto_unmarshal};
pub use ident::item_identifier;
pub use model::{Model, Object};
pub use schema::{KeyRole, Kind, Schema, SchemaType};
pub use unmarshal::{unmarshal_item, unmarshal_value};
pub use value::{marshal_item, marshal_key, marshal_value};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The schema itself is malformed, for example a set whose member type
    /// is not a scalar, or a key attribute that is missing or composite.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A native value cannot be coerced to its declared schema type.
    #[error("value cannot be represented as {expected}: {value}")]
    InvalidValue {
        expected: &'static str,
        value: serde_json::Value,
    },
    /// An item does not expose required schema or table-name metadata.
    #[error("{0}")]
    ProtocolViolation(String),
}

impl Error {
    pub(crate) fn invalid(expected: &'static str, value: &serde_json::Value) -> Self {
        Error::InvalidValue {
            expected,
            value: value.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
