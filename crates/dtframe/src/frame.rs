//! Frame: the name-based entry point to grouped evaluation and rolling
//! aggregates.
//!
//! Columns are addressed by name. Grouping builds a [`GroupPlan`] from key
//! columns; [`Frame::aggregate`] and [`Frame::assign`] then run an expression
//! once per group through the group-by engine.

use log::debug;

use dtframe_query::{
    roll_apply, roll_fun_columns, Align, AssignTarget, GroupBy, GroupExpr, GroupPlan, RollOptions,
    RollResult, RollSpec, WindowCallback,
};
use dtframe_types::{Column, ColumnType, FrameError, Result, Table};

use crate::grouping::Grouping;

/// A columnar dataframe.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    table: Table,
}

impl Frame {
    pub fn new(table: Table) -> Self {
        Frame { table }
    }

    /// Create a frame from named columns of equal length.
    pub fn from_columns(columns: Vec<(&str, Column)>) -> Result<Self> {
        let cols = columns
            .into_iter()
            .map(|(name, col)| (name.to_string(), col))
            .collect();
        Ok(Frame {
            table: Table::new(cols)?,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.table.num_columns()
    }

    pub fn column_names(&self) -> &[String] {
        self.table.names()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.table.dtypes()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.table.column_by_name(name)
    }

    /// Select a subset of columns by name.
    pub fn select(&self, names: &[&str]) -> Result<Frame> {
        let indices = self.column_indices(names)?;
        Ok(Frame {
            table: self.table.select_columns(&indices)?,
        })
    }

    /// Append a column. Fails if the name exists or the length differs.
    pub fn add_column(&mut self, name: &str, column: Column) -> Result<()> {
        self.table.push_column(name, column)?;
        Ok(())
    }

    fn column_indices(&self, names: &[&str]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.table.column_index(n)).collect()
    }

    /// Group rows by `keys`, groups in order of first appearance.
    pub fn by(&self, keys: &[&str]) -> Result<Grouping> {
        self.grouping(keys, false)
    }

    /// Group rows by `keys`, groups in ascending key order (NA first).
    pub fn keyby(&self, keys: &[&str]) -> Result<Grouping> {
        self.grouping(keys, true)
    }

    fn grouping(&self, keys: &[&str], sorted: bool) -> Result<Grouping> {
        let key_idx = self.column_indices(keys)?;
        let key_table = self.table.select_columns(&key_idx)?;
        let key_cols: Vec<usize> = (0..key_idx.len()).collect();
        let plan = GroupPlan::from_keys(&key_table, &key_cols, sorted)?;
        debug!(
            "grouping {} rows by {:?}: {} groups, {}",
            self.num_rows(),
            keys,
            plan.num_groups(),
            if plan.order().is_some() { "permuted" } else { "contiguous" }
        );
        Ok(Grouping::new(plan, key_table, key_cols))
    }

    /// One group per row of `i`: the rows of this frame whose `on` columns
    /// equal that row's `on` columns. Unmatched rows of `i` form no-match
    /// groups, which aggregation evaluates with NA data and assignment skips.
    pub fn join_each(&self, i: &Frame, on: &[&str]) -> Result<Grouping> {
        let x_cols = self.column_indices(on)?;
        let i_cols = i.column_indices(on)?;
        let plan = GroupPlan::from_join(&self.table, &x_cols, &i.table, &i_cols)?;
        debug!(
            "joining {} rows of i on {:?}: {} of {} rows matched",
            i.num_rows(),
            on,
            (0..plan.num_groups()).filter(|&g| !plan.is_no_match(g)).count(),
            plan.num_groups()
        );
        Ok(Grouping::new(plan, i.table.clone(), i_cols))
    }

    /// Columns exposed as `SD`: `sd` when given, otherwise every column that
    /// is not a grouping key.
    fn sd_indices(&self, grouping: &Grouping, sd: &[&str]) -> Result<Vec<usize>> {
        if !sd.is_empty() {
            return self.column_indices(sd);
        }
        let keys = grouping.key_names();
        Ok((0..self.num_columns())
            .filter(|&c| !keys.contains(&self.table.names()[c].as_str()))
            .collect())
    }

    fn group_by<'g>(&self, grouping: &'g Grouping, sd: &[&str]) -> Result<GroupBy<'g>> {
        let sd_cols = self.sd_indices(grouping, sd)?;
        let xsd: Vec<&str> = grouping.xsd.iter().map(String::as_str).collect();
        let xsd_cols = self.column_indices(&xsd)?;
        Ok(GroupBy::new(&grouping.plan, &grouping.keys, &grouping.key_cols)
            .sd_columns(&sd_cols)
            .isd_columns(&grouping.isd_cols)
            .xsd_columns(&xsd_cols)
            .options(grouping.options.clone()))
    }

    /// Evaluate `expr` per group and stack the results under the group keys.
    /// Returns the new frame and any warnings raised along the way.
    pub fn aggregate<E: GroupExpr>(
        &self,
        grouping: &Grouping,
        sd: &[&str],
        expr: E,
    ) -> Result<(Frame, Vec<String>)> {
        let grouped = self.group_by(grouping, sd)?.aggregate(&self.table, expr)?;
        Ok((Frame::new(grouped.table), grouped.warnings))
    }

    /// Evaluate `expr` per group and write its results into `targets`,
    /// creating the columns that do not exist yet. Returns the warnings.
    pub fn assign<E: GroupExpr>(
        &mut self,
        grouping: &Grouping,
        targets: &[&str],
        sd: &[&str],
        expr: E,
    ) -> Result<Vec<String>> {
        if targets.is_empty() {
            return Err(FrameError::Shape("no assignment targets given".into()));
        }
        let targets: Vec<AssignTarget> = targets
            .iter()
            .map(|name| match self.table.column_index(name) {
                Ok(idx) => AssignTarget::Existing(idx),
                Err(_) => AssignTarget::New(name.to_string()),
            })
            .collect();
        let gb = self.group_by(grouping, sd)?;
        let assigned = gb.assign(&mut self.table, &targets, expr)?;
        Ok(assigned.warnings)
    }

    /// Rolling sum or mean of the named numeric columns.
    pub fn roll(&self, columns: &[&str], spec: &RollSpec) -> Result<RollResult> {
        self.roll_with(columns, spec, &RollOptions::default())
    }

    pub fn roll_with(
        &self,
        columns: &[&str],
        spec: &RollSpec,
        opts: &RollOptions,
    ) -> Result<RollResult> {
        let cols: Vec<Column> = columns
            .iter()
            .map(|n| self.column(n).cloned())
            .collect::<Result<_>>()?;
        roll_fun_columns(&cols, spec, opts)
    }

    /// Apply `cb` over every window of the named numeric columns.
    pub fn roll_apply<C: WindowCallback>(
        &self,
        columns: &[&str],
        windows: &[i64],
        align: Align,
        fill: f64,
        cb: C,
    ) -> Result<RollResult> {
        let mut data = Vec::with_capacity(columns.len());
        for name in columns {
            let col = self.column(name)?;
            if !col.dtype().is_numeric() {
                return Err(FrameError::Type(format!(
                    "Column '{}' must be of type numeric or boolean, got {}",
                    name,
                    col.dtype()
                )));
            }
            data.push(col.data().to_f64_vec()?);
        }
        let views: Vec<&[f64]> = data.iter().map(|v| v.as_slice()).collect();
        roll_apply(&views, windows, align, fill, cb, &RollOptions::default())
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nrows = self.num_rows();
        let ncols = self.num_columns();

        let max_display = 10;
        let display_rows = nrows.min(max_display);

        let mut col_widths: Vec<usize> = self.column_names().iter().map(|n| n.len()).collect();

        let mut cells: Vec<Vec<String>> = Vec::with_capacity(display_rows);
        for row in 0..display_rows {
            let mut row_strs = Vec::with_capacity(ncols);
            for (c, width) in col_widths.iter_mut().enumerate() {
                let s = self.table.column(c).get(row).to_string();
                let s = if s.chars().count() > 30 {
                    format!("{}...", s.chars().take(27).collect::<String>())
                } else {
                    s
                };
                *width = (*width).max(s.chars().count()).min(30);
                row_strs.push(s);
            }
            cells.push(row_strs);
        }

        let sep: String = col_widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<String>()
            + "+";

        writeln!(f, "{}", sep)?;
        writeln!(
            f,
            "{}",
            table_line(self.column_names().iter().map(String::as_str), &col_widths)
        )?;
        writeln!(f, "{}", sep)?;
        for row in &cells {
            writeln!(f, "{}", table_line(row.iter().map(String::as_str), &col_widths))?;
        }
        if nrows > max_display {
            writeln!(f, "{}", table_line(std::iter::repeat("...").take(ncols), &col_widths))?;
        }
        writeln!(f, "{}", sep)?;
        write!(f, "[{} rows x {} columns]", nrows, ncols)
    }
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(s, &w)| format!("| {:width$} ", s, width = w))
        .collect::<String>()
        + "|"
}
