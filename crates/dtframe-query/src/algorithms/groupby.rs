//! Group-by execution engine.
//!
//! Evaluates a caller-supplied expression once per group of a [`GroupPlan`],
//! exposing the group's rows through a [`WorkingSet`]. Results either become
//! a new table (aggregation) or are written into columns of the source table
//! (assignment).
//!
//! The loop is sequential: the expression is arbitrary caller code and the
//! working set is shared across iterations. Only the permuted gather of a
//! single large column runs in parallel.

use std::time::{Duration, Instant};

use log::{debug, warn};
use rayon::ThreadPool;

use dtframe_types::{Column, ColumnData, FrameError, Result, Table};

use crate::algorithms::accumulator::{
    CapacityEstimator, FirstGroupShape, GroupRows, ResultAccumulator, ShapeEstimator,
};
use crate::algorithms::alias_guard;
use crate::algorithms::group_plan::{GroupPlan, GroupStart};
use crate::algorithms::group_result::{Entry, GroupOutput, Record};
use crate::algorithms::progress::Progress;
use crate::algorithms::working_set::WorkingSet;
use crate::config::GroupByOptions;

/// A per-group expression.
pub trait GroupExpr {
    fn eval(&mut self, ws: &WorkingSet) -> Result<GroupOutput>;
}

impl<F> GroupExpr for F
where
    F: FnMut(&WorkingSet) -> Result<GroupOutput>,
{
    fn eval(&mut self, ws: &WorkingSet) -> Result<GroupOutput> {
        self(ws)
    }
}

/// Column receiving assigned values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    /// Existing column of the table, by index.
    Existing(usize),
    /// Column created NA-filled on first write.
    New(String),
}

/// Aggregation result.
#[derive(Debug)]
pub struct Grouped {
    pub table: Table,
    pub warnings: Vec<String>,
}

/// Assignment outcome; the table is modified in place.
#[derive(Debug, Default)]
pub struct Assigned {
    pub warnings: Vec<String>,
}

/// A configured group-by over one plan and key table.
pub struct GroupBy<'a> {
    plan: &'a GroupPlan,
    keys: &'a Table,
    key_cols: Vec<usize>,
    sd_cols: Vec<usize>,
    isd_cols: Vec<usize>,
    xsd_cols: Vec<usize>,
    options: GroupByOptions,
    estimator: Box<dyn CapacityEstimator>,
}

impl<'a> GroupBy<'a> {
    /// Group by `key_cols` of `keys` according to `plan`.
    pub fn new(plan: &'a GroupPlan, keys: &'a Table, key_cols: &[usize]) -> Self {
        GroupBy {
            plan,
            keys,
            key_cols: key_cols.to_vec(),
            sd_cols: Vec::new(),
            isd_cols: Vec::new(),
            xsd_cols: Vec::new(),
            options: GroupByOptions::default(),
            estimator: Box::new(ShapeEstimator),
        }
    }

    /// Table columns exposed as `SD`.
    pub fn sd_columns(mut self, cols: &[usize]) -> Self {
        self.sd_cols = cols.to_vec();
        self
    }

    /// Key-table columns exposed as `iSD`.
    pub fn isd_columns(mut self, cols: &[usize]) -> Self {
        self.isd_cols = cols.to_vec();
        self
    }

    /// Table columns exposed as `xSD`.
    pub fn xsd_columns(mut self, cols: &[usize]) -> Self {
        self.xsd_cols = cols.to_vec();
        self
    }

    pub fn options(mut self, options: GroupByOptions) -> Self {
        self.options = options;
        self
    }

    pub fn estimator(mut self, estimator: impl CapacityEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    /// Evaluate `expr` per group and stack the results under the group keys.
    pub fn aggregate<E: GroupExpr>(&self, table: &Table, mut expr: E) -> Result<Grouped> {
        let mut run = GroupLoop::new(self, table, false)?;
        let mut acc: Option<ResultAccumulator> = None;
        let num_groups = self.plan.num_groups();

        let outcome = (|| -> Result<()> {
            while let Some(step) = run.step(table, acc.is_some(), &mut expr)? {
                let Some(record) = step.record else { continue };
                let rows = GroupRows {
                    group: step.group,
                    n: step.n,
                    // A first group without rows fixes the contract but writes nothing.
                    empty: step.empty_sentinel || (acc.is_none() && step.plan_rows == 0),
                    key_row: step.key_row,
                    record: &record,
                };
                if acc.is_none() {
                    let shape = FirstGroupShape {
                        group_rows: step.plan_rows,
                        result_width: rows.width(),
                        num_groups,
                        total_rows: self.plan.total_rows(),
                    };
                    let first = ResultAccumulator::start(
                        self.keys,
                        &self.key_cols,
                        self.estimator.as_ref(),
                        &shape,
                        &rows,
                    )?;
                    if self.options.verbose {
                        debug!(
                            "first group result has {} rows; allocating {} result rows",
                            shape.result_width,
                            first.capacity()
                        );
                    }
                    acc = Some(first);
                }
                let Some(acc) = acc.as_mut() else { continue };
                acc.write_group(&rows)?;
            }
            Ok(())
        })();
        run.finish();
        outcome?;

        match acc {
            Some(acc) => {
                let (table, warnings) = acc.finish()?;
                Ok(Grouped { table, warnings })
            }
            None => {
                // Nothing produced a result: an empty table of key columns.
                let mut out = Vec::with_capacity(self.key_cols.len());
                for &k in &self.key_cols {
                    let src = self.keys.column(k);
                    out.push((
                        self.keys.names()[k].clone(),
                        Column::new(ColumnData::empty(src.dtype()))
                            .with_attrs(src.attrs().without_dim()),
                    ));
                }
                Ok(Grouped {
                    table: Table::new(out)?,
                    warnings: Vec::new(),
                })
            }
        }
    }

    /// Evaluate `expr` per group and write the results into `targets` of
    /// `table`, at the group's rows.
    ///
    /// Every target is validated for a group before any is written. Groups
    /// already written stay written if a later group fails.
    pub fn assign<E: GroupExpr>(
        &self,
        table: &mut Table,
        targets: &[AssignTarget],
        mut expr: E,
    ) -> Result<Assigned> {
        let mut slots = Vec::with_capacity(targets.len());
        for target in targets {
            slots.push(match target {
                AssignTarget::Existing(idx) if *idx < table.num_columns() => TargetSlot::Column(*idx),
                AssignTarget::Existing(idx) => {
                    return Err(FrameError::Invariant(format!(
                        "assignment target {} is outside a table of {} columns",
                        idx,
                        table.num_columns()
                    )))
                }
                AssignTarget::New(name) => {
                    if table.column_index(name).is_ok() {
                        return Err(FrameError::Invariant(format!(
                            "new assignment target '{}' already exists",
                            name
                        )));
                    }
                    TargetSlot::Pending(name.clone())
                }
            });
        }

        let mut run = GroupLoop::new(self, table, true)?;
        let mut warnings = Vec::new();
        let outcome = (|| -> Result<()> {
            while let Some(step) = run.step(table, false, &mut expr)? {
                let Some(record) = step.record else { continue };
                let values = check_assignment(table, &slots, &record, step.n, step.group + 1)?;
                let rows: Vec<usize> = run.ws.rows().iter().flatten().copied().collect();
                for (slot, value) in slots.iter_mut().zip(values) {
                    let idx = match slot {
                        TargetSlot::Column(idx) => *idx,
                        TargetSlot::Pending(name) => {
                            let col = Column::new(ColumnData::na(value.dtype(), table.num_rows()))
                                .with_attrs(value.attrs().without_dim());
                            let idx = table.push_column(name, col)?;
                            *slot = TargetSlot::Column(idx);
                            idx
                        }
                    };
                    if rows.is_empty() {
                        continue;
                    }
                    let target_type = table.column(idx).dtype();
                    let value = alias_guard::protect(target_type, value);
                    let (data, lossy) = value.data().coerce(target_type)?;
                    if lossy {
                        let msg = format!(
                            "Coercing '{}' RHS to '{}' to match the type of column {} named '{}' \
                             for group {}; precision lost",
                            value.dtype(),
                            target_type,
                            idx + 1,
                            table.names()[idx],
                            step.group + 1
                        );
                        warn!("{}", msg);
                        warnings.push(msg);
                    }
                    table.column_mut(idx).data_mut().scatter_recycled(&rows, &data)?;
                }
            }
            Ok(())
        })();
        run.finish();
        outcome?;
        Ok(Assigned { warnings })
    }
}

/// Assignment target, resolved to a column index once it exists.
enum TargetSlot {
    Column(usize),
    Pending(String),
}

/// The value for each target, or the first NULL or length error across all
/// of them.
fn check_assignment(
    table: &Table,
    slots: &[TargetSlot],
    record: &Record,
    n: usize,
    grp: usize,
) -> Result<Vec<Column>> {
    let target_name = |j: usize| match &slots[j] {
        TargetSlot::Column(idx) => table.names()[*idx].clone(),
        TargetSlot::Pending(name) => name.clone(),
    };
    let width = record.len();
    let mut values = Vec::with_capacity(slots.len());
    for j in 0..slots.len() {
        let col = match record.entry(j % width) {
            Entry::Column(col) => col,
            _ => {
                return Err(FrameError::Shape(format!(
                    "RHS of assignment to column '{}' is NULL for group {}. Deleting parts of \
                     a column is not supported",
                    target_name(j),
                    grp
                )))
            }
        };
        if col.len() != 1 && col.len() != n {
            return Err(FrameError::Recycle(format!(
                "Supplied {} items to be assigned to group {} of size {} in column '{}'. The \
                 RHS length must either be 1 (single values are ok) or match the LHS length exactly",
                col.len(),
                grp,
                n,
                target_name(j)
            )));
        }
        values.push(col.clone());
    }
    Ok(values)
}

/// One evaluated group.
struct GroupStep {
    group: usize,
    n: usize,
    plan_rows: usize,
    key_row: Option<usize>,
    empty_sentinel: bool,
    record: Option<Record>,
}

#[derive(Default)]
struct Timings {
    block: Duration,
    block_groups: usize,
    gather: Duration,
    gather_groups: usize,
    eval: Duration,
    evals: usize,
}

/// Drives the working set through the plan, one group per `step`.
struct GroupLoop<'g, 'a> {
    gb: &'g GroupBy<'a>,
    ws: WorkingSet,
    next: usize,
    skip_no_match: bool,
    pool: Option<ThreadPool>,
    progress: Progress,
    timings: Timings,
}

impl<'g, 'a> GroupLoop<'g, 'a> {
    fn new(gb: &'g GroupBy<'a>, table: &Table, skip_no_match: bool) -> Result<Self> {
        let plan = gb.plan;
        plan.validate(table.num_rows(), gb.keys.num_rows())?;
        let ws = WorkingSet::new(table, &gb.sd_cols, gb.keys, &gb.key_cols, plan.max_group_size())?
            .with_isd(gb.keys, &gb.isd_cols)?
            .with_xsd(table, &gb.xsd_cols)?;

        let opts = &gb.options;
        let pool = if plan.order().is_some()
            && opts.num_threads > 1
            && plan.max_group_size() >= opts.gather_parallel_min
        {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(opts.num_threads)
                    .build()
                    .map_err(|e| FrameError::ThreadPool(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(GroupLoop {
            gb,
            ws,
            next: 0,
            skip_no_match,
            pool,
            progress: Progress::new(opts.show_progress, plan.num_groups()),
            timings: Timings::default(),
        })
    }

    /// Evaluate the next group that is not skipped. `started` is true once a
    /// result exists, which suppresses the trailing empty sentinel.
    fn step<E: GroupExpr>(
        &mut self,
        table: &Table,
        started: bool,
        expr: &mut E,
    ) -> Result<Option<GroupStep>> {
        let plan = self.gb.plan;
        let num_groups = plan.num_groups();
        while self.next < num_groups {
            let i = self.next;
            self.next += 1;
            self.progress.tick(i);

            let start = plan.start(i);
            let empty_sentinel = start == GroupStart::Empty;
            if empty_sentinel && (i + 1 < num_groups || started) {
                continue;
            }
            let no_match = plan.is_no_match(i);
            if no_match && self.skip_no_match {
                continue;
            }

            let plan_rows = plan.len(i);
            let n = if no_match { 0 } else { plan_rows };
            self.ws.begin_group(i + 1, n);
            // An empty key table has no row to read keys from.
            let key_row = if (no_match && !plan.is_each_row()) || self.gb.keys.num_rows() == 0 {
                None
            } else {
                plan.key_row(i)
            };
            self.ws.load_keys(self.gb.keys, key_row)?;
            if !self.gb.isd_cols.is_empty() {
                let isd_row = (plan.is_each_row() && !no_match).then_some(i);
                self.ws.load_isd(self.gb.keys, isd_row)?;
            }
            self.load_rows(table, i, start, no_match)?;
            if !self.gb.xsd_cols.is_empty() {
                let first = if no_match { None } else { self.ws.rows().first().copied().flatten() };
                self.ws.load_xsd(table, first)?;
            }

            let t = self.gb.options.verbose.then(Instant::now);
            let output = expr.eval(&self.ws)?;
            if let Some(t) = t {
                self.timings.eval += t.elapsed();
                self.timings.evals += 1;
            }

            return Ok(Some(GroupStep {
                group: i,
                n,
                plan_rows,
                key_row,
                empty_sentinel,
                record: output.into_record(i + 1)?,
            }));
        }
        Ok(None)
    }

    fn load_rows(&mut self, table: &Table, i: usize, start: GroupStart, no_match: bool) -> Result<()> {
        if no_match {
            self.ws.load_no_match();
            return Ok(());
        }
        let plan = self.gb.plan;
        let t = self.gb.options.verbose.then(Instant::now);
        match (start, plan.order()) {
            (GroupStart::At(s), None) => {
                self.ws.load_contiguous(table, s, plan.len(i))?;
                if let Some(t) = t {
                    self.timings.block += t.elapsed();
                    self.timings.block_groups += 1;
                }
            }
            (GroupStart::At(s), Some(order)) => {
                let len = plan.len(i);
                let min = self.gb.options.gather_parallel_min;
                let pool = self.pool.as_ref().filter(|_| len >= min);
                self.ws.load_permuted(table, &order[s..s + len], pool)?;
                if let Some(t) = t {
                    self.timings.gather += t.elapsed();
                    self.timings.gather_groups += 1;
                }
            }
            (GroupStart::Empty, _) | (GroupStart::NoMatch, _) => {
                self.ws.load_contiguous(table, 0, 0)?;
            }
        }
        Ok(())
    }

    /// Release the working set and report timings; runs on success and error.
    fn finish(&mut self) {
        self.ws.release();
        self.progress.finish();
        if self.gb.options.verbose {
            let t = &self.timings;
            debug!(
                "memcpy contiguous groups took {:.3}s for {} groups",
                t.block.as_secs_f64(),
                t.block_groups
            );
            debug!(
                "collecting discontiguous groups took {:.3}s for {} groups",
                t.gather.as_secs_f64(),
                t.gather_groups
            );
            debug!(
                "eval(expr) took {:.3}s for {} calls",
                t.eval.as_secs_f64(),
                t.evals
            );
        }
    }
}
