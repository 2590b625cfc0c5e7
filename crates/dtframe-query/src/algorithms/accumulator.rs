//! Growable output for aggregation mode.
//!
//! The first group that produces a result fixes the number and types of the
//! result columns. Capacity is estimated from that group's shape and grown
//! geometrically on overflow; the final table is trimmed to the rows written.

use log::{trace, warn};

use dtframe_types::{Column, ColumnData, ColumnType, FrameError, Result, Table};

use crate::algorithms::alias_guard;
use crate::algorithms::group_result::{Entry, Record};

/// Shape of the first group that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstGroupShape {
    /// Rows in the group.
    pub group_rows: usize,
    /// Rows in its result (longest entry).
    pub result_width: usize,
    pub num_groups: usize,
    /// Sum of all group sizes.
    pub total_rows: usize,
}

/// Output sizing policy.
pub trait CapacityEstimator: Send + Sync {
    /// Initial capacity from the first group's shape.
    fn initial(&self, shape: &FirstGroupShape) -> usize;

    /// New capacity when group `group` (0-based) needs `offset + width` rows.
    fn regrow(&self, num_groups: usize, group: usize, offset: usize, width: usize) -> usize {
        let needed = offset + width;
        let scaled = 1.1 * (num_groups as f64 / group.max(1) as f64) * needed as f64;
        (scaled as usize).max(needed)
    }
}

/// Three-case estimate: aggregate, expansion, or truncation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeEstimator;

impl CapacityEstimator for ShapeEstimator {
    fn initial(&self, shape: &FirstGroupShape) -> usize {
        let est = if shape.group_rows == 0 {
            0
        } else if shape.result_width == 1 {
            shape.num_groups
        } else if shape.result_width >= shape.group_rows {
            shape.total_rows
        } else {
            shape.result_width * shape.num_groups
        };
        est.max(shape.result_width)
    }
}

/// Always starts at a fixed capacity.
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub usize);

impl CapacityEstimator for FixedEstimator {
    fn initial(&self, _shape: &FirstGroupShape) -> usize {
        self.0
    }
}

/// One group's contribution to the output.
#[derive(Debug, Clone, Copy)]
pub struct GroupRows<'r> {
    /// 0-based group index.
    pub group: usize,
    /// Rows in the group (0 for no match).
    pub n: usize,
    /// Write nothing for this group: the empty sentinel, or a first group
    /// without rows.
    pub empty: bool,
    /// Key-table row holding the group's keys; `None` writes NA keys.
    pub key_row: Option<usize>,
    pub record: &'r Record,
}

impl GroupRows<'_> {
    /// Rows this group writes: the longest entry, or 0 when empty.
    pub fn width(&self) -> usize {
        if self.empty {
            0
        } else {
            self.record.max_len()
        }
    }
}

/// Key columns followed by result columns, filled group by group.
pub struct ResultAccumulator<'a> {
    keys: &'a Table,
    key_cols: &'a [usize],
    estimator: &'a dyn CapacityEstimator,
    num_groups: usize,
    names: Vec<String>,
    columns: Vec<Column>,
    contract: Vec<ColumnType>,
    offset: usize,
    capacity: usize,
    warned_zero_len: bool,
    warnings: Vec<String>,
}

impl<'a> ResultAccumulator<'a> {
    /// Fix the contract from `first`, the first group with a result, and
    /// allocate the capacity `estimator` derives from `shape`.
    pub fn start(
        keys: &'a Table,
        key_cols: &'a [usize],
        estimator: &'a dyn CapacityEstimator,
        shape: &FirstGroupShape,
        first: &GroupRows<'_>,
    ) -> Result<Self> {
        let capacity = estimator.initial(shape);
        let record = first.record;
        let mut names = Vec::with_capacity(key_cols.len() + record.len());
        let mut columns = Vec::with_capacity(key_cols.len() + record.len());
        for &k in key_cols {
            let src = keys.column(k);
            names.push(keys.names()[k].clone());
            columns.push(
                Column::new(ColumnData::na(src.dtype(), capacity))
                    .with_attrs(src.attrs().without_dim()),
            );
        }
        let mut contract = Vec::with_capacity(record.len());
        for (j, entry) in record.entries().iter().enumerate() {
            let col = entry.as_column().ok_or_else(|| {
                FrameError::Shape(format!(
                    "Column {} of result for group {} is NULL. The first group fixes the \
                     result column types, so its entries cannot be NULL",
                    j + 1,
                    first.group + 1
                ))
            })?;
            contract.push(col.dtype());
            names.push(record.name(j));
            columns.push(
                Column::new(ColumnData::na(col.dtype(), capacity))
                    .with_attrs(col.attrs().without_dim()),
            );
        }
        Ok(ResultAccumulator {
            keys,
            key_cols,
            estimator,
            num_groups: shape.num_groups,
            names,
            columns,
            contract,
            offset: 0,
            capacity,
            warned_zero_len: false,
            warnings: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn grow(&mut self, capacity: usize) {
        for col in &mut self.columns {
            col.data_mut().set_len(capacity);
        }
        self.capacity = capacity;
    }

    /// Append one group's rows. NULL entries and zero-length entries are
    /// NA-filled to the group's width.
    pub fn write_group(&mut self, rows: &GroupRows<'_>) -> Result<()> {
        let GroupRows {
            group,
            n,
            key_row,
            record,
            ..
        } = *rows;
        let grp = group + 1;
        if record.len() != self.contract.len() {
            return Err(FrameError::Shape(format!(
                "Supplied {} columns for group {}, but the first group produced {}. \
                 Each group must return the same number of columns",
                record.len(),
                grp,
                self.contract.len()
            )));
        }
        let width = rows.width();

        for (j, entry) in record.entries().iter().enumerate() {
            let len = entry.len();
            if len > 1 && len != width && n > 0 {
                return Err(FrameError::Recycle(format!(
                    "Column {} of result for group {} has {} rows but the longest column \
                     has {}. Only length-1 values are recycled",
                    j + 1,
                    grp,
                    len,
                    width
                )));
            }
            if let Entry::Column(col) = entry {
                if col.dtype() != self.contract[j] {
                    return Err(FrameError::Shape(format!(
                        "Column {} of result for group {} is type '{}' but expecting type '{}'. \
                         Column types must be consistent for each group",
                        j + 1,
                        grp,
                        col.dtype(),
                        self.contract[j]
                    )));
                }
            }
        }

        if width == 0 {
            return Ok(());
        }

        if self.offset + width > self.capacity {
            let capacity = self.estimator.regrow(self.num_groups, group, self.offset, width);
            trace!(
                "growing result from {} to {} rows at group {} of {}",
                self.capacity,
                capacity,
                grp,
                self.num_groups
            );
            self.grow(capacity);
        }

        for (k, &src) in self.key_cols.iter().enumerate() {
            self.columns[k]
                .data_mut()
                .fill_from(self.offset, width, self.keys.column(src).data(), key_row)?;
        }

        for (j, entry) in record.entries().iter().enumerate() {
            let target = &mut self.columns[self.key_cols.len() + j];
            match entry {
                Entry::Column(col) if !col.is_empty() => {
                    let value = alias_guard::protect(self.contract[j], col.clone());
                    target
                        .data_mut()
                        .write_recycled(self.offset, width, value.data())?;
                }
                _ => {
                    if !self.warned_zero_len && width > 1 {
                        let msg = format!(
                            "Column {} of result for group {} is zero length. It is filled \
                             with {} NAs to match the longest column in this result. Later \
                             groups may have the same problem but only the first is reported",
                            j + 1,
                            grp,
                            width
                        );
                        warn!("{}", msg);
                        self.warnings.push(msg);
                        self.warned_zero_len = true;
                    }
                    target.data_mut().write_na(self.offset, width);
                }
            }
        }

        self.offset += width;
        Ok(())
    }

    /// Trim to the rows written and build the table.
    pub fn finish(mut self) -> Result<(Table, Vec<String>)> {
        for col in &mut self.columns {
            col.data_mut().shrink_to(self.offset);
        }
        let table = Table::new(self.names.into_iter().zip(self.columns).collect())?;
        Ok((table, self.warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtframe_types::Scalar;

    fn keys() -> Table {
        Table::new(vec![("k".to_string(), Column::from_strings(&["a", "b", "c"]))]).unwrap()
    }

    fn shape(group_rows: usize, result_width: usize) -> FirstGroupShape {
        FirstGroupShape {
            group_rows,
            result_width,
            num_groups: 10,
            total_rows: 50,
        }
    }

    fn rows(group: usize, n: usize, record: &Record) -> GroupRows<'_> {
        GroupRows {
            group,
            n,
            empty: false,
            key_row: Some(group),
            record,
        }
    }

    #[test]
    fn test_shape_estimator_cases() {
        let est = ShapeEstimator;
        assert_eq!(est.initial(&shape(0, 0)), 0);
        assert_eq!(est.initial(&shape(5, 1)), 10);
        assert_eq!(est.initial(&shape(5, 5)), 50);
        assert_eq!(est.initial(&shape(5, 2)), 20);
        assert_eq!(est.initial(&shape(5, 80)), 80);
    }

    #[test]
    fn test_regrow_covers_need() {
        let est = FixedEstimator(1);
        assert!(est.regrow(10, 0, 0, 3) >= 3);
        assert_eq!(est.regrow(10, 5, 10, 2), 26);
    }

    #[test]
    fn test_grows_from_undersized_estimate() {
        let k = keys();
        let est = FixedEstimator(1);
        let first = Record::new().push_named("x", Column::from_i64(vec![1, 2]));
        let mut acc =
            ResultAccumulator::start(&k, &[0], &est, &shape(3, 2), &rows(0, 3, &first)).unwrap();
        assert_eq!(acc.capacity(), 1);
        for g in 0..3 {
            let rec = Record::new().push(Column::from_i64(vec![g as i64, g as i64 + 10]));
            acc.write_group(&rows(g, 2, &rec)).unwrap();
        }
        assert!(acc.capacity() >= 6);
        let (table, warnings) = acc.finish().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(table.num_rows(), 6);
        assert_eq!(table.names(), &["k".to_string(), "x".to_string()]);
        assert_eq!(table.row(5), vec![Scalar::String("c".into()), Scalar::Integer(12)]);
    }

    #[test]
    fn test_first_group_null_is_error() {
        let k = keys();
        let first = Record::new().push_null();
        let err = ResultAccumulator::start(
            &k,
            &[0],
            &ShapeEstimator,
            &shape(4, 0),
            &rows(1, 4, &first),
        )
        .err()
        .unwrap();
        assert!(matches!(err, FrameError::Shape(_)));
        assert!(err.to_string().contains("group 2 is NULL"));
    }

    #[test]
    fn test_contract_violations() {
        let k = keys();
        let est = ShapeEstimator;
        let first = Record::new().push(Column::from_i64(vec![1]));
        let mut acc =
            ResultAccumulator::start(&k, &[0], &est, &shape(1, 1), &rows(0, 1, &first)).unwrap();

        let wrong_type = Record::new().push(Column::from_f64(vec![1.0]));
        let err = acc.write_group(&rows(1, 1, &wrong_type)).unwrap_err();
        assert!(err.to_string().contains("expecting type 'integer'"));

        let wrong_count = Record::new()
            .push(Column::from_i64(vec![1]))
            .push(Column::from_i64(vec![2]));
        assert!(acc.write_group(&rows(1, 1, &wrong_count)).is_err());
    }

    #[test]
    fn test_recycle_and_zero_length() {
        let k = keys();
        let est = FixedEstimator(9);
        let first = Record::new()
            .push(Column::from_i64(vec![1, 2, 3]))
            .push(Column::from_f64(vec![0.5]));
        let mut acc =
            ResultAccumulator::start(&k, &[0], &est, &shape(3, 3), &rows(0, 3, &first)).unwrap();
        acc.write_group(&rows(0, 3, &first)).unwrap();

        let bad = Record::new()
            .push(Column::from_i64(vec![1, 2, 3]))
            .push(Column::from_f64(vec![0.5, 1.5]));
        let err = acc.write_group(&rows(1, 3, &bad)).unwrap_err();
        assert!(matches!(err, FrameError::Recycle(_)));

        let zero = Record::new()
            .push(Column::from_i64(vec![4, 5]))
            .push(Column::new(ColumnData::empty(ColumnType::Float)));
        acc.write_group(&rows(1, 2, &zero)).unwrap();
        acc.write_group(&rows(2, 2, &zero)).unwrap();
        let (table, warnings) = acc.finish().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(table.num_rows(), 7);
        assert_eq!(table.column(2).get(0), Scalar::Float(0.5));
        assert_eq!(table.column(2).get(2), Scalar::Float(0.5));
        assert_eq!(table.column(2).get(3), Scalar::Undefined);
    }

    #[test]
    fn test_null_entry_after_first_group_is_na_filled() {
        let k = keys();
        let est = ShapeEstimator;
        let first = Record::new()
            .push(Column::from_i64(vec![1]))
            .push(Column::from_i64(vec![2]));
        let mut acc =
            ResultAccumulator::start(&k, &[0], &est, &shape(1, 1), &rows(0, 1, &first)).unwrap();
        acc.write_group(&rows(0, 1, &first)).unwrap();
        let later = Record::new()
            .push(Column::from_i64(vec![7, 8, 9]))
            .push_null();
        acc.write_group(&rows(1, 3, &later)).unwrap();
        let (table, warnings) = acc.finish().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(table.num_rows(), 4);
        for r in 1..4 {
            assert!(table.column(2).get(r).is_na());
        }
    }

    #[test]
    fn test_empty_group_writes_nothing() {
        let k = keys();
        let first = Record::new().push(Column::from_i64(vec![1]));
        let empty = GroupRows {
            group: 0,
            n: 0,
            empty: true,
            key_row: None,
            record: &first,
        };
        assert_eq!(empty.width(), 0);
        let mut acc =
            ResultAccumulator::start(&k, &[0], &ShapeEstimator, &shape(0, 0), &empty).unwrap();
        assert_eq!(acc.capacity(), 0);
        acc.write_group(&empty).unwrap();
        let (table, _) = acc.finish().unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.dtypes(), vec![ColumnType::String, ColumnType::Integer]);
    }
}
