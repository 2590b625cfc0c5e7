//! Data model shared by the dtframe engines.
//!
//! - [`Column`]: a typed, reference-counted buffer with attributes and the
//!   `special` flag used to mark group-by scratch memory.
//! - [`Table`]: named columns sharing one row count.
//! - [`Scalar`]: a single cell value.

pub mod column;
pub mod error;
pub mod table;
pub mod value;

pub use crate::column::{Attributes, Column, ColumnData};
pub use crate::error::{FrameError, Result};
pub use crate::table::Table;
pub use crate::value::{ColumnType, Scalar};
