use expressions::{AttributePath, Condition, Operand};
use serde_json::Value;

/// A predicate over a single key property, in the permissive object form of
/// a key condition.
#[derive(Debug, Clone)]
pub enum KeyPredicate {
    Equals(Value),
    LessThan(Value),
    LessThanOrEqualTo(Value),
    GreaterThan(Value),
    GreaterThanOrEqualTo(Value),
    Between(Value, Value),
    BeginsWith(Value),
}

impl KeyPredicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        KeyPredicate::Equals(value.into())
    }
    pub fn less_than(value: impl Into<Value>) -> Self {
        KeyPredicate::LessThan(value.into())
    }
    pub fn less_than_or_equal_to(value: impl Into<Value>) -> Self {
        KeyPredicate::LessThanOrEqualTo(value.into())
    }
    pub fn greater_than(value: impl Into<Value>) -> Self {
        KeyPredicate::GreaterThan(value.into())
    }
    pub fn greater_than_or_equal_to(value: impl Into<Value>) -> Self {
        KeyPredicate::GreaterThanOrEqualTo(value.into())
    }
    pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        KeyPredicate::Between(lower.into(), upper.into())
    }
    pub fn begins_with(prefix: impl Into<Value>) -> Self {
        KeyPredicate::BeginsWith(prefix.into())
    }

    fn lower(self, property: String) -> Condition {
        let path = AttributePath::new(property);
        match self {
            KeyPredicate::Equals(value) => Condition::equals(path, Operand::Value(value)),
            KeyPredicate::LessThan(value) => Condition::less_than(path, Operand::Value(value)),
            KeyPredicate::LessThanOrEqualTo(value) => {
                Condition::less_than_or_equal_to(path, Operand::Value(value))
            }
            KeyPredicate::GreaterThan(value) => {
                Condition::greater_than(path, Operand::Value(value))
            }
            KeyPredicate::GreaterThanOrEqualTo(value) => {
                Condition::greater_than_or_equal_to(path, Operand::Value(value))
            }
            KeyPredicate::Between(lower, upper) => {
                Condition::between(path, Operand::Value(lower), Operand::Value(upper))
            }
            KeyPredicate::BeginsWith(prefix) => {
                Condition::begins_with(path, Operand::Value(prefix))
            }
        }
    }
}

/// A query's key condition: either a canonical condition tree, or the
/// permissive object form mapping key properties to literals or predicates.
#[derive(Debug, Clone)]
pub enum KeyCondition {
    Expression(Condition),
    Properties(Vec<(String, KeyPredicate)>),
}

impl KeyCondition {
    /// A single `property = literal` entry.
    pub fn of(property: impl Into<String>, predicate: KeyPredicate) -> Self {
        KeyCondition::Properties(vec![(property.into(), predicate)])
    }

    /// Append a further `property → predicate` entry.
    pub fn and(self, property: impl Into<String>, predicate: KeyPredicate) -> Self {
        match self {
            KeyCondition::Properties(mut entries) => {
                entries.push((property.into(), predicate));
                KeyCondition::Properties(entries)
            }
            KeyCondition::Expression(condition) => KeyCondition::Expression(Condition::And(vec![
                condition,
                KeyPredicate::lower(predicate, property.into()),
            ])),
        }
    }

    /// Lower to a canonical condition tree: a single entry becomes its bare
    /// comparison, several entries become their conjunction.
    pub(crate) fn lower(self) -> Condition {
        match self {
            KeyCondition::Expression(condition) => condition,
            KeyCondition::Properties(mut entries) if entries.len() == 1 => {
                let (property, predicate) = entries.pop().expect("len is 1");
                predicate.lower(property)
            }
            KeyCondition::Properties(entries) => Condition::And(
                entries
                    .into_iter()
                    .map(|(property, predicate)| predicate.lower(property))
                    .collect(),
            ),
        }
    }
}

impl From<Condition> for KeyCondition {
    fn from(condition: Condition) -> Self {
        KeyCondition::Expression(condition)
    }
}

impl<S: Into<String>> FromIterator<(S, KeyPredicate)> for KeyCondition {
    fn from_iter<I: IntoIterator<Item = (S, KeyPredicate)>>(iter: I) -> Self {
        KeyCondition::Properties(
            iter.into_iter()
                .map(|(property, predicate)| (property.into(), predicate))
                .collect(),
        )
    }
}
