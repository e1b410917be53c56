use crate::Error;
use marshal::{Kind, Schema, SchemaType};

/// One element of an attribute path: a member name or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Name(String),
    Index(u32),
}

/// AttributePath addresses a (possibly nested) attribute: a leading property
/// name followed by member names and list indexes.
///
/// The textual dialect is dot-separated names with bracketed indexes, e.g.
/// `address.lines[0]`. A name holding `.`, `[`, `]`, or a backtick is quoted
/// with backticks, and a literal backtick inside a quoted name is doubled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributePath {
    pub elements: Vec<Element>,
}

impl AttributePath {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            elements: vec![Element::Name(property.into())],
        }
    }

    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.elements.push(Element::Name(name.into()));
        self
    }

    pub fn index(mut self, index: u32) -> Self {
        self.elements.push(Element::Index(index));
        self
    }

    /// Parse the textual path dialect.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let invalid = |detail: &'static str| Error::InvalidPath {
            path: input.to_string(),
            detail,
        };

        let mut elements = Vec::new();
        let mut chars = input.chars().peekable();
        // Whether the previous element permits a following `.` or `[`.
        let mut after_element = false;

        while let Some(c) = chars.peek().copied() {
            match c {
                '.' => {
                    if !after_element {
                        return Err(invalid("unexpected '.'"));
                    }
                    chars.next();
                    after_element = false;
                }
                '[' => {
                    if !after_element {
                        return Err(invalid("unexpected '['"));
                    }
                    chars.next();
                    let mut digits = String::new();
                    for digit in chars.by_ref() {
                        if digit == ']' {
                            break;
                        }
                        digits.push(digit);
                    }
                    let index = digits
                        .parse()
                        .map_err(|_| invalid("index is not an unsigned integer"))?;
                    elements.push(Element::Index(index));
                }
                '`' => {
                    if after_element {
                        return Err(invalid("unexpected quoted name"));
                    }
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('`') if chars.peek() == Some(&'`') => {
                                chars.next();
                                name.push('`');
                            }
                            Some('`') => break,
                            Some(other) => name.push(other),
                            None => return Err(invalid("unterminated quoted name")),
                        }
                    }
                    elements.push(Element::Name(name));
                    after_element = true;
                }
                _ => {
                    if after_element {
                        return Err(invalid("expected '.' or '[' between elements"));
                    }
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        if c == ']' || c == '`' {
                            return Err(invalid("unquoted name holds a control character"));
                        }
                        name.push(c);
                        chars.next();
                    }
                    elements.push(Element::Name(name));
                    after_element = true;
                }
            }
        }

        if elements.is_empty() {
            return Err(invalid("path is empty"));
        }
        if !matches!(elements[0], Element::Name(_)) {
            return Err(invalid("path must begin with a property name"));
        }
        Ok(Self { elements })
    }

    /// Rewrite property names to physical attribute names by walking the
    /// schema, and resolve the SchemaType addressed by the path (if the
    /// schema describes it). Indexes and names under untyped members pass
    /// through unchanged.
    pub fn normalize<'s>(
        &self,
        schema: &'s Schema,
    ) -> (AttributePath, Option<&'s SchemaType>) {
        let mut elements = Vec::with_capacity(self.elements.len());
        let mut scope: Scope<'s> = Scope::Schema(schema);

        for element in &self.elements {
            let (element, next) = match (element, scope) {
                (Element::Name(name), Scope::Schema(schema)) => match schema.get(name) {
                    Some(ty) => (
                        Element::Name(ty.physical_name(name).to_string()),
                        Scope::Type(ty),
                    ),
                    None => (element.clone(), Scope::Untyped),
                },
                (Element::Name(name), Scope::Type(ty)) => match ty.kind() {
                    Kind::Document { members } => match members.get(name) {
                        Some(member) => (
                            Element::Name(member.physical_name(name).to_string()),
                            Scope::Type(member),
                        ),
                        None => (element.clone(), Scope::Untyped),
                    },
                    Kind::Map { member } => (element.clone(), Scope::Type(member)),
                    _ => (element.clone(), Scope::Untyped),
                },
                (Element::Index(index), Scope::Type(ty)) => match ty.kind() {
                    Kind::List { member } | Kind::Set { member } => {
                        (element.clone(), Scope::Type(member))
                    }
                    Kind::Tuple { members } => (
                        element.clone(),
                        members
                            .get(*index as usize)
                            .map(Scope::Type)
                            .unwrap_or(Scope::Untyped),
                    ),
                    _ => (element.clone(), Scope::Untyped),
                },
                (element, Scope::Untyped) => (element.clone(), Scope::Untyped),
                (element, Scope::Schema(_)) => (element.clone(), Scope::Untyped),
            };
            elements.push(element);
            scope = next;
        }

        let leaf = match scope {
            Scope::Type(ty) => Some(ty),
            _ => None,
        };
        (AttributePath { elements }, leaf)
    }
}

#[derive(Copy, Clone)]
enum Scope<'s> {
    Schema(&'s Schema),
    Type(&'s SchemaType),
    Untyped,
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            match element {
                Element::Name(name) => {
                    if i != 0 {
                        f.write_str(".")?;
                    }
                    if name.contains(&['.', '[', ']', '`'][..]) {
                        write!(f, "`{}`", name.replace('`', "``"))?;
                    } else {
                        f.write_str(name)?;
                    }
                }
                Element::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for AttributePath {
    /// Build from the textual dialect, treating an unparseable input as a
    /// single literal property name.
    fn from(s: &str) -> Self {
        AttributePath::parse(s).unwrap_or_else(|_| AttributePath::new(s))
    }
}

impl std::str::FromStr for AttributePath {
    type Err = Error;
    fn from_str(s: &str) -> crate::Result<Self> {
        AttributePath::parse(s)
    }
}
