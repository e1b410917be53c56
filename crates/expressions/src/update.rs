use crate::condition::Operand;
use crate::{AttributePath, ExpressionAttributes};
use marshal::Schema;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MathOperator {
    Add,
    Subtract,
}

impl MathOperator {
    fn symbol(&self) -> &'static str {
        match self {
            MathOperator::Add => "+",
            MathOperator::Subtract => "-",
        }
    }
}

/// A mathematical SET operand: `left + right` or `left - right`, where each
/// side is an attribute path or a constant.
#[derive(Debug, Clone)]
pub struct Math {
    pub left: Operand,
    pub operator: MathOperator,
    pub right: Operand,
}

impl Math {
    pub fn add(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Math {
            left: left.into(),
            operator: MathOperator::Add,
            right: right.into(),
        }
    }

    pub fn subtract(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Math {
            left: left.into(),
            operator: MathOperator::Subtract,
            right: right.into(),
        }
    }
}

/// The value side of a SET clause.
#[derive(Debug, Clone)]
pub enum SetValue {
    Operand(Operand),
    Math(Math),
}

impl From<Operand> for SetValue {
    fn from(operand: Operand) -> Self {
        SetValue::Operand(operand)
    }
}

impl From<Math> for SetValue {
    fn from(math: Math) -> Self {
        SetValue::Math(math)
    }
}

/// An update expression: four disjoint per-attribute operations, serialized
/// as `SET ... REMOVE ... ADD ... DELETE ...` with verbs in that order.
#[derive(Debug, Clone, Default)]
pub struct Update {
    sets: Vec<(AttributePath, SetValue)>,
    removes: Vec<AttributePath>,
    adds: Vec<(AttributePath, Operand)>,
    deletes: Vec<(AttributePath, Operand)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<AttributePath>, value: impl Into<SetValue>) -> Self {
        self.sets.push((path.into(), value.into()));
        self
    }

    pub fn remove(mut self, path: impl Into<AttributePath>) -> Self {
        self.removes.push(path.into());
        self
    }

    pub fn add(mut self, path: impl Into<AttributePath>, value: impl Into<Operand>) -> Self {
        self.adds.push((path.into(), value.into()));
        self
    }

    pub fn delete(mut self, path: impl Into<AttributePath>, value: impl Into<Operand>) -> Self {
        self.deletes.push((path.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
            && self.removes.is_empty()
            && self.adds.is_empty()
            && self.deletes.is_empty()
    }

    /// Rewrite paths to physical names and marshal native value operands
    /// against the schema type of the path they assign.
    pub fn normalize(&self, schema: &Schema) -> crate::Result<Update> {
        let normalize_pair = |(path, value): &(AttributePath, Operand)| {
            let (path, leaf) = path.normalize(schema);
            Ok((path, value.normalize(schema, leaf)?))
        };

        Ok(Update {
            sets: self
                .sets
                .iter()
                .map(|(path, value)| {
                    let (path, leaf) = path.normalize(schema);
                    let value = match value {
                        SetValue::Operand(operand) => {
                            SetValue::Operand(operand.normalize(schema, leaf)?)
                        }
                        SetValue::Math(math) => SetValue::Math(Math {
                            left: math.left.normalize(schema, leaf)?,
                            operator: math.operator,
                            right: math.right.normalize(schema, leaf)?,
                        }),
                    };
                    Ok((path, value))
                })
                .collect::<crate::Result<_>>()?,
            removes: self
                .removes
                .iter()
                .map(|path| path.normalize(schema).0)
                .collect(),
            adds: self
                .adds
                .iter()
                .map(normalize_pair)
                .collect::<crate::Result<_>>()?,
            deletes: self
                .deletes
                .iter()
                .map(normalize_pair)
                .collect::<crate::Result<_>>()?,
        })
    }

    /// Emit the store's textual dialect: clauses comma-joined within each
    /// verb, verbs space-joined in SET, REMOVE, ADD, DELETE order.
    pub fn serialize(&self, attrs: &mut ExpressionAttributes) -> String {
        let mut verbs = Vec::new();

        if !self.sets.is_empty() {
            let clauses = self
                .sets
                .iter()
                .map(|(path, value)| {
                    let path = attrs.add_path(path);
                    let value = match value {
                        SetValue::Operand(operand) => operand.serialize(attrs),
                        SetValue::Math(math) => {
                            let left = math.left.serialize(attrs);
                            let right = math.right.serialize(attrs);
                            format!("{left} {} {right}", math.operator.symbol())
                        }
                    };
                    format!("{path} = {value}")
                })
                .collect::<Vec<_>>()
                .join(", ");
            verbs.push(format!("SET {clauses}"));
        }

        if !self.removes.is_empty() {
            let clauses = self
                .removes
                .iter()
                .map(|path| attrs.add_path(path))
                .collect::<Vec<_>>()
                .join(", ");
            verbs.push(format!("REMOVE {clauses}"));
        }

        if !self.adds.is_empty() {
            verbs.push(format!("ADD {}", serialize_pairs(&self.adds, attrs)));
        }
        if !self.deletes.is_empty() {
            verbs.push(format!("DELETE {}", serialize_pairs(&self.deletes, attrs)));
        }

        verbs.join(" ")
    }
}

fn serialize_pairs(pairs: &[(AttributePath, Operand)], attrs: &mut ExpressionAttributes) -> String {
    pairs
        .iter()
        .map(|(path, value)| {
            let path = attrs.add_path(path);
            let value = value.serialize(attrs);
            format!("{path} {value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
