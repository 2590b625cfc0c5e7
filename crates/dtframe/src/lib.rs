//! dtframe: a columnar frame with grouped evaluation and rolling-window
//! aggregates.
//!
//! ```ignore
//! let fr = Frame::from_columns(vec![
//!     ("city", Column::from_strings(&["A", "B", "A"])),
//!     ("sales", Column::from_i64(vec![1, 2, 3])),
//! ])?;
//! let g = fr.by(&["city"])?;
//! let (totals, _warnings) = fr.aggregate(&g, &["sales"], |ws: &WorkingSet| {
//!     Ok(Column::from_i64(vec![ws.n() as i64]).into())
//! })?;
//! ```

pub mod frame;
pub mod grouping;

pub use dtframe_query::{
    Align, Algo, GroupByOptions, GroupExpr, GroupOutput, NaPolicy, Record, RollFun, RollOptions,
    RollResult, RollSpec, ScalarFn, WindowCallback, Windows, WorkingSet,
};
pub use dtframe_types::{Column, ColumnType, FrameError, Result, Scalar, Table};
pub use frame::Frame;
pub use grouping::Grouping;
