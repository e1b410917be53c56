use std::collections::BTreeMap;
use std::sync::Arc;

/// Role of an attribute within a primary or secondary index key.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyRole {
    Hash,
    Range,
}

pub type DefaultFn = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;
pub type MarshalFn =
    Arc<dyn Fn(&serde_json::Value) -> crate::Result<Option<store::AttributeValue>> + Send + Sync>;
pub type UnmarshalFn =
    Arc<dyn Fn(&store::AttributeValue) -> crate::Result<serde_json::Value> + Send + Sync>;

/// Kind is the representational variant of a SchemaType.
#[derive(Clone)]
pub enum Kind {
    /// Byte string. Accepts native byte arrays or strings (as UTF-8).
    Binary,
    /// Boolean, with permissive coercion of scalar inputs.
    Boolean,
    /// Decimal, carried as a base-10 string.
    Number {
        /// Marks this attribute as the item's optimistic-locking version.
        version: bool,
    },
    /// UTF-8 string.
    String,
    /// Point in time, stored as an epoch-second decimal. Accepts RFC-3339
    /// strings or epoch-second numbers; sub-second precision is truncated.
    Date,
    /// Explicit null.
    Null,
    /// Nested item with its own Schema. The indirection through Arc admits
    /// self-referential documents.
    Document { members: Arc<Schema> },
    /// Map of arbitrary string keys to a homogeneous member type.
    Map { member: Box<SchemaType> },
    /// Ordered sequence of a homogeneous member type.
    List { member: Box<SchemaType> },
    /// Fixed positions, each with its own type.
    Tuple { members: Vec<SchemaType> },
    /// Typed set. The member must be Binary, Number, or String.
    Set { member: Box<SchemaType> },
    /// Untyped sequence, marshalled by runtime shape.
    Collection,
    /// Untyped map, marshalled by runtime shape.
    Hash,
    /// Any value, marshalled by runtime shape.
    Any,
    /// Caller-supplied conversion pair.
    Custom {
        marshal: MarshalFn,
        unmarshal: UnmarshalFn,
    },
}

impl std::fmt::Debug for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Binary => f.write_str("Binary"),
            Kind::Boolean => f.write_str("Boolean"),
            Kind::Number { version } => f.debug_struct("Number").field("version", version).finish(),
            Kind::String => f.write_str("String"),
            Kind::Date => f.write_str("Date"),
            Kind::Null => f.write_str("Null"),
            Kind::Document { members } => f.debug_struct("Document").field("members", members).finish(),
            Kind::Map { member } => f.debug_struct("Map").field("member", member).finish(),
            Kind::List { member } => f.debug_struct("List").field("member", member).finish(),
            Kind::Tuple { members } => f.debug_struct("Tuple").field("members", members).finish(),
            Kind::Set { member } => f.debug_struct("Set").field("member", member).finish(),
            Kind::Collection => f.write_str("Collection"),
            Kind::Hash => f.write_str("Hash"),
            Kind::Any => f.write_str("Any"),
            Kind::Custom { .. } => f.write_str("Custom"),
        }
    }
}

/// SchemaType describes how one logical property is represented in the store,
/// along with its key roles and write-time defaulting behavior.
#[derive(Clone)]
pub struct SchemaType {
    pub(crate) kind: Kind,
    pub(crate) attribute_name: Option<String>,
    pub(crate) key: Option<KeyRole>,
    pub(crate) index_keys: BTreeMap<String, KeyRole>,
    pub(crate) default: Option<DefaultFn>,
}

impl std::fmt::Debug for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaType")
            .field("kind", &self.kind)
            .field("attribute_name", &self.attribute_name)
            .field("key", &self.key)
            .field("index_keys", &self.index_keys)
            .field("default", &self.default.as_ref().map(|_| "Fn"))
            .finish()
    }
}

impl SchemaType {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            attribute_name: None,
            key: None,
            index_keys: BTreeMap::new(),
            default: None,
        }
    }

    pub fn binary() -> Self {
        Self::of(Kind::Binary)
    }
    pub fn boolean() -> Self {
        Self::of(Kind::Boolean)
    }
    pub fn number() -> Self {
        Self::of(Kind::Number { version: false })
    }
    pub fn string() -> Self {
        Self::of(Kind::String)
    }
    pub fn date() -> Self {
        Self::of(Kind::Date)
    }
    pub fn null() -> Self {
        Self::of(Kind::Null)
    }
    pub fn document(members: Schema) -> Self {
        Self::of(Kind::Document {
            members: Arc::new(members),
        })
    }
    pub fn shared_document(members: Arc<Schema>) -> Self {
        Self::of(Kind::Document { members })
    }
    pub fn map(member: SchemaType) -> Self {
        Self::of(Kind::Map {
            member: Box::new(member),
        })
    }
    pub fn list(member: SchemaType) -> Self {
        Self::of(Kind::List {
            member: Box::new(member),
        })
    }
    pub fn tuple(members: Vec<SchemaType>) -> Self {
        Self::of(Kind::Tuple { members })
    }
    pub fn set(member: SchemaType) -> Self {
        Self::of(Kind::Set {
            member: Box::new(member),
        })
    }
    pub fn collection() -> Self {
        Self::of(Kind::Collection)
    }
    pub fn hash() -> Self {
        Self::of(Kind::Hash)
    }
    pub fn any() -> Self {
        Self::of(Kind::Any)
    }
    pub fn custom(marshal: MarshalFn, unmarshal: UnmarshalFn) -> Self {
        Self::of(Kind::Custom { marshal, unmarshal })
    }

    /// Mark this property as the table's partition (HASH) key.
    pub fn hash_key(mut self) -> Self {
        self.key = Some(KeyRole::Hash);
        self
    }

    /// Mark this property as the table's sort (RANGE) key.
    pub fn range_key(mut self) -> Self {
        self.key = Some(KeyRole::Range);
        self
    }

    /// Mark this property as a key of the named secondary index.
    pub fn index_key(mut self, index: impl Into<String>, role: KeyRole) -> Self {
        self.index_keys.insert(index.into(), role);
        self
    }

    /// Override the physical attribute name. Defaults to the property name.
    pub fn attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_name = Some(name.into());
        self
    }

    /// Supply a default, materialized when the property is absent on write.
    pub fn with_default(
        mut self,
        default: impl Fn() -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(Arc::new(default));
        self
    }

    /// Mark a Number property as the item's optimistic-locking version.
    pub fn version(mut self) -> Self {
        if let Kind::Number { version } = &mut self.kind {
            *version = true;
        }
        self
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// True iff this property participates in the key of the (optionally
    /// named) index.
    pub fn is_key(&self, index: Option<&str>) -> bool {
        match index {
            None => self.key.is_some(),
            Some(index) => self.index_keys.contains_key(index),
        }
    }

    pub fn key_role(&self, index: Option<&str>) -> Option<KeyRole> {
        match index {
            None => self.key,
            Some(index) => self.index_keys.get(index).copied(),
        }
    }

    pub fn is_version(&self) -> bool {
        matches!(self.kind, Kind::Number { version: true })
    }

    /// The physical attribute name of this property.
    pub fn physical_name<'s>(&'s self, property: &'s str) -> &'s str {
        self.attribute_name.as_deref().unwrap_or(property)
    }

    pub(crate) fn default_value(&self) -> Option<serde_json::Value> {
        self.default.as_ref().map(|f| f())
    }
}

/// Schema maps property names to their SchemaTypes. Property order is
/// irrelevant to callers; iteration is by property name, which also defines
/// the canonical ordering of key properties.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    properties: BTreeMap<String, SchemaType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, property: impl Into<String>, ty: SchemaType) -> Self {
        self.properties.insert(property.into(), ty);
        self
    }

    pub fn get(&self, property: &str) -> Option<&SchemaType> {
        self.properties.get(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchemaType)> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties participating in the (optionally named) index key, in
    /// canonical property-name order.
    pub fn key_schemas<'s>(
        &'s self,
        index: Option<&'s str>,
    ) -> impl Iterator<Item = (&'s String, &'s SchemaType)> + 's {
        self.properties.iter().filter(move |(_, ty)| ty.is_key(index))
    }

    /// Physical attribute names of the (optionally named) index key, in
    /// canonical property-name order.
    pub fn key_properties(&self, index: Option<&str>) -> Vec<String> {
        self.key_schemas(index)
            .map(|(property, ty)| ty.physical_name(property).to_string())
            .collect()
    }

    /// The property carrying the optimistic-locking version, if any.
    pub fn version_property(&self) -> Option<(&String, &SchemaType)> {
        self.properties.iter().find(|(_, ty)| ty.is_version())
    }
}

impl FromIterator<(String, SchemaType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, SchemaType)>>(iter: I) -> Self {
        Self {
            properties: iter.into_iter().collect(),
        }
    }
}
