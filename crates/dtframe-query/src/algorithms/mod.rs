pub mod accumulator;
pub mod alias_guard;
pub mod group_plan;
pub mod group_result;
pub mod groupby;
mod progress;
pub mod roll_answer;
pub(crate) mod roll_kernels;
pub mod roll_apply;
pub mod rolling;
pub mod working_set;
