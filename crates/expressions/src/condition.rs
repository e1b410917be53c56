use crate::{AttributePath, ExpressionAttributes};
use marshal::{auto_marshal, marshal_value, Schema, SchemaType};
use store::AttributeValue;

/// An operand of a comparison or function: an attribute path, a native value
/// (marshalled against the subject path's schema type during normalization),
/// an already-marshalled value, or the size of an attribute.
#[derive(Debug, Clone)]
pub enum Operand {
    Path(AttributePath),
    Value(serde_json::Value),
    Attribute(AttributeValue),
    Size(AttributePath),
}

impl Operand {
    pub fn path(path: impl Into<AttributePath>) -> Self {
        Operand::Path(path.into())
    }

    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Operand::Value(value.into())
    }

    pub fn size(path: impl Into<AttributePath>) -> Self {
        Operand::Size(path.into())
    }

    pub(crate) fn normalize(
        &self,
        schema: &Schema,
        leaf: Option<&SchemaType>,
    ) -> crate::Result<Operand> {
        Ok(match self {
            Operand::Path(path) => Operand::Path(path.normalize(schema).0),
            Operand::Size(path) => Operand::Size(path.normalize(schema).0),
            Operand::Attribute(attr) => Operand::Attribute(attr.clone()),
            Operand::Value(value) => Operand::Attribute(match leaf {
                // A custom type serializes compared-against values through
                // the caller's marshal function, like any other type.
                Some(ty) => {
                    marshal_value(ty, Some(value))?.unwrap_or_else(|| auto_marshal(value))
                }
                None => auto_marshal(value),
            }),
        })
    }

    pub(crate) fn serialize(&self, attrs: &mut ExpressionAttributes) -> String {
        match self {
            Operand::Path(path) => attrs.add_path(path),
            Operand::Size(path) => format!("size({})", attrs.add_path(path)),
            Operand::Attribute(attr) => attrs.add_value(attr.clone()),
            Operand::Value(value) => attrs.add_value(auto_marshal(value)),
        }
    }

    /// The path whose schema type governs sibling value operands. A `size()`
    /// operand compares against a plain number, not the attribute's own
    /// representation, so it contributes no type.
    fn as_path(&self) -> Option<&AttributePath> {
        match self {
            Operand::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl From<AttributePath> for Operand {
    fn from(path: AttributePath) -> Self {
        Operand::Path(path)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Comparator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
}

impl Comparator {
    fn symbol(&self) -> &'static str {
        match self {
            Comparator::Equals => "=",
            Comparator::NotEquals => "<>",
            Comparator::LessThan => "<",
            Comparator::LessThanOrEqualTo => "<=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterThanOrEqualTo => ">=",
        }
    }
}

/// A store type tag, as compared by `attribute_type`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TypeTag {
    String,
    StringSet,
    Number,
    NumberSet,
    Binary,
    BinarySet,
    Boolean,
    Null,
    List,
    Map,
}

impl TypeTag {
    fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "S",
            TypeTag::StringSet => "SS",
            TypeTag::Number => "N",
            TypeTag::NumberSet => "NS",
            TypeTag::Binary => "B",
            TypeTag::BinarySet => "BS",
            TypeTag::Boolean => "BOOL",
            TypeTag::Null => "NULL",
            TypeTag::List => "L",
            TypeTag::Map => "M",
        }
    }
}

/// A function-call condition. Functions appear interchangeably with operator
/// conditions, and `size` additionally appears as a comparison operand.
#[derive(Debug, Clone)]
pub enum FunctionExpression {
    AttributeExists(AttributePath),
    AttributeNotExists(AttributePath),
    AttributeType(AttributePath, TypeTag),
    BeginsWith(AttributePath, Operand),
    Contains(AttributePath, Operand),
}

/// A symbolic condition tree, serialized to the store's textual dialect.
#[derive(Debug, Clone)]
pub enum Condition {
    Comparison {
        operator: Comparator,
        left: Operand,
        right: Operand,
    },
    Between {
        subject: Operand,
        lower: Operand,
        upper: Operand,
    },
    Membership {
        subject: Operand,
        members: Vec<Operand>,
    },
    Function(FunctionExpression),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    fn comparison(
        operator: Comparator,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> Self {
        Condition::Comparison {
            operator,
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn equals(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::comparison(Comparator::Equals, left, right)
    }
    pub fn not_equals(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::comparison(Comparator::NotEquals, left, right)
    }
    pub fn less_than(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::comparison(Comparator::LessThan, left, right)
    }
    pub fn less_than_or_equal_to(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::comparison(Comparator::LessThanOrEqualTo, left, right)
    }
    pub fn greater_than(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::comparison(Comparator::GreaterThan, left, right)
    }
    pub fn greater_than_or_equal_to(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::comparison(Comparator::GreaterThanOrEqualTo, left, right)
    }

    pub fn between(
        subject: impl Into<Operand>,
        lower: impl Into<Operand>,
        upper: impl Into<Operand>,
    ) -> Self {
        Condition::Between {
            subject: subject.into(),
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    pub fn is_in(subject: impl Into<Operand>, members: Vec<Operand>) -> Self {
        Condition::Membership {
            subject: subject.into(),
            members,
        }
    }

    pub fn attribute_exists(path: impl Into<AttributePath>) -> Self {
        Condition::Function(FunctionExpression::AttributeExists(path.into()))
    }
    pub fn attribute_not_exists(path: impl Into<AttributePath>) -> Self {
        Condition::Function(FunctionExpression::AttributeNotExists(path.into()))
    }
    pub fn attribute_type(path: impl Into<AttributePath>, tag: TypeTag) -> Self {
        Condition::Function(FunctionExpression::AttributeType(path.into(), tag))
    }
    pub fn begins_with(path: impl Into<AttributePath>, prefix: impl Into<Operand>) -> Self {
        Condition::Function(FunctionExpression::BeginsWith(path.into(), prefix.into()))
    }
    pub fn contains(path: impl Into<AttributePath>, operand: impl Into<Operand>) -> Self {
        Condition::Function(FunctionExpression::Contains(path.into(), operand.into()))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Rewrite every path in the tree to physical attribute names, and
    /// marshal native value operands against the schema type of the path
    /// they are compared with.
    pub fn normalize(&self, schema: &Schema) -> crate::Result<Condition> {
        Ok(match self {
            Condition::Comparison {
                operator,
                left,
                right,
            } => {
                let leaf = subject_leaf(schema, [left, right]);
                Condition::Comparison {
                    operator: *operator,
                    left: left.normalize(schema, leaf)?,
                    right: right.normalize(schema, leaf)?,
                }
            }
            Condition::Between {
                subject,
                lower,
                upper,
            } => {
                let leaf = subject_leaf(schema, [subject]);
                Condition::Between {
                    subject: subject.normalize(schema, leaf)?,
                    lower: lower.normalize(schema, leaf)?,
                    upper: upper.normalize(schema, leaf)?,
                }
            }
            Condition::Membership { subject, members } => {
                let leaf = subject_leaf(schema, [subject]);
                Condition::Membership {
                    subject: subject.normalize(schema, leaf)?,
                    members: members
                        .iter()
                        .map(|member| member.normalize(schema, leaf))
                        .collect::<crate::Result<_>>()?,
                }
            }
            Condition::Function(function) => Condition::Function(match function {
                FunctionExpression::AttributeExists(path) => {
                    FunctionExpression::AttributeExists(path.normalize(schema).0)
                }
                FunctionExpression::AttributeNotExists(path) => {
                    FunctionExpression::AttributeNotExists(path.normalize(schema).0)
                }
                FunctionExpression::AttributeType(path, tag) => {
                    FunctionExpression::AttributeType(path.normalize(schema).0, *tag)
                }
                FunctionExpression::BeginsWith(path, prefix) => {
                    let (path, leaf) = path.normalize(schema);
                    FunctionExpression::BeginsWith(path, prefix.normalize(schema, leaf)?)
                }
                FunctionExpression::Contains(path, operand) => {
                    let (path, leaf) = path.normalize(schema);
                    // `contains` matches set and list members; the member
                    // type, not the subject type, governs the operand.
                    let leaf = match leaf.map(SchemaType::kind) {
                        Some(
                            marshal::Kind::Set { member }
                            | marshal::Kind::List { member }
                            | marshal::Kind::Map { member },
                        ) => Some(member.as_ref()),
                        _ => leaf,
                    };
                    FunctionExpression::Contains(path, operand.normalize(schema, leaf)?)
                }
            }),
            Condition::Not(inner) => Condition::Not(Box::new(inner.normalize(schema)?)),
            Condition::And(children) => Condition::And(
                children
                    .iter()
                    .map(|child| child.normalize(schema))
                    .collect::<crate::Result<_>>()?,
            ),
            Condition::Or(children) => Condition::Or(
                children
                    .iter()
                    .map(|child| child.normalize(schema))
                    .collect::<crate::Result<_>>()?,
            ),
        })
    }

    /// Emit the store's textual dialect, allocating placeholder tokens
    /// left-to-right. Leaves render bare; logical operators parenthesize
    /// every child, including an only child, to preserve precedence.
    pub fn serialize(&self, attrs: &mut ExpressionAttributes) -> String {
        match self {
            Condition::Comparison {
                operator,
                left,
                right,
            } => {
                let left = left.serialize(attrs);
                let right = right.serialize(attrs);
                format!("{left} {} {right}", operator.symbol())
            }
            Condition::Between {
                subject,
                lower,
                upper,
            } => {
                let subject = subject.serialize(attrs);
                let lower = lower.serialize(attrs);
                let upper = upper.serialize(attrs);
                format!("{subject} BETWEEN {lower} AND {upper}")
            }
            Condition::Membership { subject, members } => {
                let subject = subject.serialize(attrs);
                let members = members
                    .iter()
                    .map(|member| member.serialize(attrs))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{subject} IN ({members})")
            }
            Condition::Function(function) => match function {
                FunctionExpression::AttributeExists(path) => {
                    format!("attribute_exists({})", attrs.add_path(path))
                }
                FunctionExpression::AttributeNotExists(path) => {
                    format!("attribute_not_exists({})", attrs.add_path(path))
                }
                FunctionExpression::AttributeType(path, tag) => {
                    let path = attrs.add_path(path);
                    let tag = attrs.add_value(AttributeValue::S(tag.as_str().to_string()));
                    format!("attribute_type({path}, {tag})")
                }
                FunctionExpression::BeginsWith(path, prefix) => {
                    let path = attrs.add_path(path);
                    let prefix = prefix.serialize(attrs);
                    format!("begins_with({path}, {prefix})")
                }
                FunctionExpression::Contains(path, operand) => {
                    let path = attrs.add_path(path);
                    let operand = operand.serialize(attrs);
                    format!("contains({path}, {operand})")
                }
            },
            Condition::Not(inner) => format!("NOT ({})", inner.serialize(attrs)),
            Condition::And(children) => join_logical(children, " AND ", attrs),
            Condition::Or(children) => join_logical(children, " OR ", attrs),
        }
    }
}

fn join_logical(
    children: &[Condition],
    separator: &str,
    attrs: &mut ExpressionAttributes,
) -> String {
    children
        .iter()
        .map(|child| format!("({})", child.serialize(attrs)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// The schema type governing value operands of a comparison: that of the
/// first path among `operands`.
fn subject_leaf<'s, const N: usize>(
    schema: &'s Schema,
    operands: [&Operand; N],
) -> Option<&'s SchemaType> {
    operands
        .iter()
        .find_map(|operand| operand.as_path())
        .and_then(|path| path.normalize(schema).1)
}
