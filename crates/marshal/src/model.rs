use crate::{Error, Schema};
use serde_json::Value;
use std::sync::Arc;

/// Model attaches mapping metadata to an application type: the table it
/// lives in and the Schema describing its properties. Together with serde
/// these drive every mapper operation, so a Model needs no further glue.
pub trait Model: serde::Serialize + serde::de::DeserializeOwned + Send {
    /// The Schema describing this type's properties.
    fn schema() -> Arc<Schema>;
    /// The (unprefixed) table this type is stored in.
    fn table_name() -> &'static str;
}

/// Object is a type-erased item: a native value paired with the schema and
/// table metadata the mapper needs. It lets heterogeneous tables flow through
/// one batch stream; `typed()` recovers the concrete Model on the way out.
#[derive(Debug, Clone)]
pub struct Object {
    table: String,
    schema: Arc<Schema>,
    value: Value,
}

impl Object {
    /// Erase a Model instance into an Object.
    pub fn of<M: Model>(model: &M) -> crate::Result<Self> {
        let value = serde_json::to_value(model).map_err(|err| {
            Error::ProtocolViolation(format!("item does not serialize to an object: {err}"))
        })?;
        Self::new(M::table_name(), M::schema(), value)
    }

    /// Build an Object from explicit metadata. The table name must be
    /// non-empty and the value must be an object.
    pub fn new(
        table: impl Into<String>,
        schema: Arc<Schema>,
        value: Value,
    ) -> crate::Result<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(Error::ProtocolViolation(
                "item does not declare a table name".to_string(),
            ));
        }
        if !value.is_object() {
            return Err(Error::ProtocolViolation(format!(
                "item of table '{table}' is not an object: {value}"
            )));
        }
        Ok(Self {
            table,
            schema,
            value,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The physical table name, with the mapper-level prefix applied.
    pub fn table_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.table)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Recover a typed Model from this Object's value.
    pub fn typed<M: Model>(&self) -> crate::Result<M> {
        serde_json::from_value(self.value.clone()).map_err(|err| {
            Error::ProtocolViolation(format!(
                "item of table '{}' does not deserialize: {err}",
                self.table
            ))
        })
    }

    /// Rebuild this Object around a replacement native value.
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            table: self.table.clone(),
            schema: self.schema.clone(),
            value,
        }
    }
}
