mod attributes;
mod condition;
mod path;
mod projection;
mod update;

pub use attributes::ExpressionAttributes;
pub use condition::{Comparator, Condition, FunctionExpression, Operand, TypeTag};
pub use path::{AttributePath, Element};
pub use projection::serialize_projection;
pub use update::{Math, MathOperator, SetValue, Update};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid attribute path '{path}': {detail}")]
    InvalidPath { path: String, detail: &'static str },
    #[error(transparent)]
    Marshal(#[from] marshal::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
