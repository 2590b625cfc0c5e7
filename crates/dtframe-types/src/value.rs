use std::sync::Arc;

use crate::column::Column;
use crate::error::{FrameError, Result};

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Boolean = 0,
    Integer = 1,
    Float = 2,
    String = 3,
    List = 4,
    Raw = 5,
}

impl ColumnType {
    /// True for the types a rolling function accepts as input.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Boolean | ColumnType::Integer | ColumnType::Float)
    }
}

impl TryFrom<u8> for ColumnType {
    type Error = FrameError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Boolean),
            1 => Ok(Self::Integer),
            2 => Ok(Self::Float),
            3 => Ok(Self::String),
            4 => Ok(Self::List),
            5 => Ok(Self::Raw),
            _ => Err(FrameError::Type(format!("Unknown column type value: {}", value))),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::List => write!(f, "list"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// A single cell value. `Undefined` is NA.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    List(Column),
    Raw(u8),
    Undefined,
}

impl Scalar {
    /// The column type this value belongs in; `None` for NA.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Scalar::Boolean(_) => Some(ColumnType::Boolean),
            Scalar::Integer(_) => Some(ColumnType::Integer),
            Scalar::Float(_) => Some(ColumnType::Float),
            Scalar::String(_) => Some(ColumnType::String),
            Scalar::List(_) => Some(ColumnType::List),
            Scalar::Raw(_) => Some(ColumnType::Raw),
            Scalar::Undefined => None,
        }
    }

    pub fn is_na(&self) -> bool {
        matches!(self, Scalar::Undefined)
    }

    /// Numeric view used by rolling callbacks and coercion.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Undefined => Some(f64::NAN),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::String(v) => write!(f, "{}", v),
            Scalar::List(col) => {
                write!(f, "[")?;
                for i in 0..col.len() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", col.get(i))?;
                }
                write!(f, "]")
            }
            Scalar::Raw(v) => write!(f, "{:02x}", v),
            Scalar::Undefined => write!(f, "NA"),
        }
    }
}
