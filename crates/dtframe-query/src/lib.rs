//! Group-by execution and rolling-window aggregation.
//!
//! - [`algorithms::groupby`]: evaluates an expression per group of a
//!   [`GroupPlan`], aggregating into a new table or assigning in place.
//! - [`algorithms::rolling`]: rolling sum/mean over fixed or adaptive windows.
//! - [`algorithms::roll_apply`]: rolling application of a callback.

pub mod algorithms;
pub mod config;

pub use algorithms::accumulator::{CapacityEstimator, FirstGroupShape, FixedEstimator, ShapeEstimator};
pub use algorithms::group_plan::{GroupPlan, GroupStart};
pub use algorithms::group_result::{Entry, GroupOutput, Record};
pub use algorithms::groupby::{AssignTarget, Assigned, GroupBy, GroupExpr, Grouped};
pub use algorithms::roll_apply::{roll_apply, ScalarFn, WindowCallback};
pub use algorithms::rolling::{
    roll_fun, roll_fun_columns, Algo, Align, NaPolicy, RollFun, RollResult, RollSpec, Windows,
};
pub use algorithms::working_set::WorkingSet;
pub use config::{GroupByOptions, RollOptions};
