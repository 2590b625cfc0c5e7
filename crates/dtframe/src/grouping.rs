//! A group plan bound to the key columns it was built from.

use dtframe_query::{GroupByOptions, GroupPlan};
use dtframe_types::{Result, Table};

/// Groups of one frame, ready to be evaluated by [`crate::Frame::aggregate`]
/// or [`crate::Frame::assign`].
///
/// `keys` is an owned table so that the frame can be borrowed mutably while
/// an assignment runs. Columns are reference-counted, so the copy is cheap.
#[derive(Debug, Clone)]
pub struct Grouping {
    pub(crate) plan: GroupPlan,
    pub(crate) keys: Table,
    pub(crate) key_cols: Vec<usize>,
    pub(crate) isd_cols: Vec<usize>,
    pub(crate) xsd: Vec<String>,
    pub(crate) options: GroupByOptions,
}

impl Grouping {
    pub(crate) fn new(plan: GroupPlan, keys: Table, key_cols: Vec<usize>) -> Self {
        Grouping {
            plan,
            keys,
            key_cols,
            isd_cols: Vec::new(),
            xsd: Vec::new(),
            options: GroupByOptions::default(),
        }
    }

    pub fn plan(&self) -> &GroupPlan {
        &self.plan
    }

    pub fn num_groups(&self) -> usize {
        self.plan.num_groups()
    }

    /// Names of the key columns, in output order.
    pub fn key_names(&self) -> Vec<&str> {
        self.key_cols
            .iter()
            .map(|&c| self.keys.names()[c].as_str())
            .collect()
    }

    /// Expose columns of the joining table as `iSD`. Only meaningful for a
    /// grouping built by [`crate::Frame::join_each`].
    pub fn with_isd(mut self, names: &[&str]) -> Result<Self> {
        self.isd_cols = names
            .iter()
            .map(|n| self.keys.column_index(n))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Expose columns of the grouped frame, at each group's first row, as
    /// `xSD`. Names are resolved when the grouping is evaluated.
    pub fn with_xsd(mut self, names: &[&str]) -> Self {
        self.xsd = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_options(mut self, options: GroupByOptions) -> Self {
        self.options = options;
        self
    }
}
