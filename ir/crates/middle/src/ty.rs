use std::fmt::{
    Display,
    Formatter,
};

/// The result type of a [`Node`][`crate::Node`].
///
/// Only as much of a type system as the graph needs to print itself.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    Bits(u32),
    Tuple(Vec<Type>),
}

impl Type {
    pub const BOOL: Self = Self::Bits(1);

    pub const fn bits(width: u32) -> Self {
        Self::Bits(width)
    }

    pub fn unit() -> Self {
        Self::Tuple(vec![])
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bits(width) => write!(f, "bits[{width}]"),
            Type::Tuple(elements) => {
                write!(f, "(")?;
                for (index, element) in elements.iter().enumerate() {
                    write!(f, "{element}")?;
                    if index < elements.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}
