use crate::{AttributePath, Element};
use std::collections::{BTreeMap, HashMap};
use store::AttributeValue;

/// ExpressionAttributes allocates the placeholder tokens of one serialized
/// expression, keeping the bijection between tokens and the attribute names
/// and values they stand for.
///
/// Name and value tokens draw from a single shared counter, so their numbers
/// interleave across one instance; this numbering is an observable contract.
/// A distinct path element maps to the same `#attrN` token every time it is
/// added, while every added value receives a fresh `:valN` token.
#[derive(Debug, Default)]
pub struct ExpressionAttributes {
    counter: usize,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, AttributeValue>,
    tokens_by_name: HashMap<String, String>,
}

impl ExpressionAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token standing for one attribute name.
    pub fn add_name(&mut self, name: &str) -> String {
        if let Some(token) = self.tokens_by_name.get(name) {
            return token.clone();
        }
        let token = format!("#attr{}", self.counter);
        self.counter += 1;
        self.names.insert(token.clone(), name.to_string());
        self.tokens_by_name.insert(name.to_string(), token.clone());
        token
    }

    /// A fresh token standing for one attribute value.
    pub fn add_value(&mut self, value: AttributeValue) -> String {
        let token = format!(":val{}", self.counter);
        self.counter += 1;
        self.values.insert(token.clone(), value);
        token
    }

    /// Render a (normalized) path with every name element substituted.
    pub fn add_path(&mut self, path: &AttributePath) -> String {
        let mut out = String::new();
        for (i, element) in path.elements.iter().enumerate() {
            match element {
                Element::Name(name) => {
                    if i != 0 {
                        out.push('.');
                    }
                    out.push_str(&self.add_name(name));
                }
                Element::Index(index) => {
                    out.push_str(&format!("[{index}]"));
                }
            }
        }
        out
    }

    /// Substituted names, for inclusion in an RPC request.
    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    /// Substituted values, for inclusion in an RPC request.
    pub fn values(&self) -> &BTreeMap<String, AttributeValue> {
        &self.values
    }

    pub fn into_parts(self) -> (BTreeMap<String, String>, BTreeMap<String, AttributeValue>) {
        (self.names, self.values)
    }
}
