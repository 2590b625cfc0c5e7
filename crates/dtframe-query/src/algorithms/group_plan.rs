//! Group plan: the partition of table rows into groups.
//!
//! A plan is an ordered list of `(start, len)` pairs. When a permutation is
//! present, `start` indexes into it and a group's rows are
//! `order[start..start + len]`; otherwise the rows are the contiguous range
//! `start..start + len` of the table.

use std::cmp::Ordering;
use std::collections::HashMap;

use dtframe_types::{FrameError, Result, Scalar, Table};

/// Where a group begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// The group has no rows. Only a final empty group is evaluated, so that a
    /// call where nothing matched still yields a consistently-shaped result.
    Empty,
    /// The group's key matched no row of the table.
    NoMatch,
    /// First position of the group.
    At(usize),
}

/// Precomputed partition of row indices into groups.
#[derive(Debug, Clone)]
pub struct GroupPlan {
    starts: Vec<GroupStart>,
    lens: Vec<usize>,
    order: Option<Vec<Option<usize>>>,
    key_order: Option<Vec<usize>>,
    each_row: bool,
}

impl GroupPlan {
    /// Create a plan over contiguous row ranges.
    pub fn new(starts: Vec<GroupStart>, lens: Vec<usize>) -> Result<Self> {
        if starts.len() != lens.len() {
            return Err(FrameError::Invariant(format!(
                "group plan has {} starts but {} lengths",
                starts.len(),
                lens.len()
            )));
        }
        Ok(GroupPlan {
            starts,
            lens,
            order: None,
            key_order: None,
            each_row: false,
        })
    }

    /// Route group positions through a row permutation. `None` entries mark
    /// positions with no matching row.
    pub fn with_order(mut self, order: Vec<Option<usize>>) -> Self {
        self.order = Some(order);
        self
    }

    /// Map a group's start position to the key-table row holding its key.
    pub fn with_key_order(mut self, key_order: Vec<usize>) -> Self {
        self.key_order = Some(key_order);
        self
    }

    /// One group per key-table row: group `i` takes its key from row `i`.
    pub fn each_row(mut self) -> Self {
        self.each_row = true;
        self
    }

    pub fn num_groups(&self) -> usize {
        self.starts.len()
    }

    pub fn start(&self, group: usize) -> GroupStart {
        self.starts[group]
    }

    pub fn len(&self, group: usize) -> usize {
        self.lens[group]
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn order(&self) -> Option<&[Option<usize>]> {
        self.order.as_deref()
    }

    pub fn is_each_row(&self) -> bool {
        self.each_row
    }

    pub fn max_group_size(&self) -> usize {
        self.lens.iter().copied().max().unwrap_or(0)
    }

    /// Sum of all group sizes.
    pub fn total_rows(&self) -> usize {
        self.lens.iter().sum()
    }

    /// True for a group whose key matched nothing, including a start that the
    /// permutation maps to no row.
    pub fn is_no_match(&self, group: usize) -> bool {
        match (self.starts[group], &self.order) {
            (GroupStart::NoMatch, _) => true,
            (GroupStart::At(s), Some(order)) => order.get(s).is_some_and(|r| r.is_none()),
            _ => false,
        }
    }

    /// Row of the key table holding this group's key values.
    pub fn key_row(&self, group: usize) -> Option<usize> {
        if self.each_row {
            return Some(group);
        }
        match self.starts[group] {
            GroupStart::At(s) => Some(self.key_order.as_ref().map_or(s, |ko| ko[s])),
            GroupStart::Empty | GroupStart::NoMatch => None,
        }
    }

    /// Member rows of a matched group, in plan order.
    pub fn member_rows(&self, group: usize) -> Vec<Option<usize>> {
        let len = self.lens[group];
        match self.starts[group] {
            GroupStart::At(s) => match &self.order {
                Some(order) => order[s..s + len].to_vec(),
                None => (s..s + len).map(Some).collect(),
            },
            GroupStart::Empty | GroupStart::NoMatch => Vec::new(),
        }
    }

    /// Check the plan against the table it partitions and the key table.
    pub fn validate(&self, table_rows: usize, key_rows: usize) -> Result<()> {
        let span = self.order.as_ref().map_or(table_rows, |o| o.len());
        if let Some(order) = &self.order {
            if let Some(bad) = order.iter().flatten().find(|&&r| r >= table_rows) {
                return Err(FrameError::Invariant(format!(
                    "permutation entry {} is outside a table of {} rows",
                    bad, table_rows
                )));
            }
        }
        for (i, (&start, &len)) in self.starts.iter().zip(&self.lens).enumerate() {
            if let GroupStart::At(s) = start {
                if s + len > span {
                    return Err(FrameError::Invariant(format!(
                        "group {} spans positions {}..{} but only {} are available",
                        i + 1,
                        s,
                        s + len,
                        span
                    )));
                }
                if let Some(ko) = &self.key_order {
                    match ko.get(s) {
                        Some(&r) if r < key_rows || key_rows == 0 => {}
                        _ => {
                            return Err(FrameError::Invariant(format!(
                                "group {} has no valid key row",
                                i + 1
                            )))
                        }
                    }
                } else if !self.each_row && key_rows > 0 && s >= key_rows {
                    return Err(FrameError::Invariant(format!(
                        "group {} key row {} is outside a key table of {} rows",
                        i + 1,
                        s,
                        key_rows
                    )));
                }
            }
        }
        if self.each_row && key_rows < self.starts.len() {
            return Err(FrameError::Invariant(format!(
                "each-row plan has {} groups but the key table has {} rows",
                self.starts.len(),
                key_rows
            )));
        }
        Ok(())
    }

    /// Build a plan grouping `keys` rows by the values in `key_cols`.
    ///
    /// Groups are numbered in order of first appearance, or by ascending key
    /// when `sorted` is set. The permutation is omitted when every group is
    /// already a contiguous run in row order.
    pub fn from_keys(keys: &Table, key_cols: &[usize], sorted: bool) -> Result<Self> {
        check_key_columns(keys, key_cols)?;

        let mut index: HashMap<Vec<ScalarKey>, usize> = HashMap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut group_keys: Vec<Vec<Scalar>> = Vec::new();
        for row in 0..keys.num_rows() {
            let key = row_key(keys, key_cols, row);
            let next = members.len();
            let g = *index.entry(key.clone()).or_insert(next);
            if g == next {
                members.push(Vec::new());
                group_keys.push(key.into_iter().map(|k| k.0).collect());
            }
            members[g].push(row);
        }

        let mut group_ids: Vec<usize> = (0..members.len()).collect();
        if sorted {
            group_ids.sort_by(|&a, &b| cmp_key(&group_keys[a], &group_keys[b]));
        }

        let mut starts = Vec::with_capacity(group_ids.len());
        let mut lens = Vec::with_capacity(group_ids.len());
        let mut order = Vec::with_capacity(keys.num_rows());
        for g in group_ids {
            starts.push(GroupStart::At(order.len()));
            lens.push(members[g].len());
            order.extend(members[g].iter().copied());
        }

        let identity = order.iter().enumerate().all(|(i, &r)| i == r);
        let plan = GroupPlan::new(starts, lens)?;
        if identity {
            Ok(plan)
        } else {
            let key_order = order.clone();
            Ok(plan
                .with_order(order.into_iter().map(Some).collect())
                .with_key_order(key_order))
        }
    }

    /// Each-row join plan: one group per row of `i`, holding the rows of `x`
    /// whose `x_cols` equal that row's `i_cols`. Rows of `i` with no match become
    /// no-match groups.
    pub fn from_join(x: &Table, x_cols: &[usize], i: &Table, i_cols: &[usize]) -> Result<Self> {
        if x_cols.len() != i_cols.len() {
            return Err(FrameError::Shape(format!(
                "join on {} column(s) of x but {} of i",
                x_cols.len(),
                i_cols.len()
            )));
        }
        check_key_columns(x, x_cols)?;
        check_key_columns(i, i_cols)?;

        let mut index: HashMap<Vec<ScalarKey>, Vec<usize>> = HashMap::new();
        for row in 0..x.num_rows() {
            let key = row_key(x, x_cols, row);
            index.entry(key).or_default().push(row);
        }

        let mut starts = Vec::with_capacity(i.num_rows());
        let mut lens = Vec::with_capacity(i.num_rows());
        let mut order = Vec::new();
        for row in 0..i.num_rows() {
            match index.get(&row_key(i, i_cols, row)) {
                Some(rows) => {
                    starts.push(GroupStart::At(order.len()));
                    lens.push(rows.len());
                    order.extend(rows.iter().map(|&r| Some(r)));
                }
                None => {
                    starts.push(GroupStart::NoMatch);
                    lens.push(1);
                }
            }
        }
        Ok(GroupPlan::new(starts, lens)?.with_order(order).each_row())
    }
}

fn check_key_columns(table: &Table, cols: &[usize]) -> Result<()> {
    for &c in cols {
        if c >= table.num_columns() {
            return Err(FrameError::Shape(format!(
                "Key column index {} out of range ({})",
                c,
                table.num_columns()
            )));
        }
        if table.column(c).dtype() == dtframe_types::ColumnType::List {
            return Err(FrameError::Type(format!(
                "Column '{}' is a list column and cannot be used as a grouping key",
                table.names()[c]
            )));
        }
    }
    Ok(())
}

fn row_key(table: &Table, cols: &[usize], row: usize) -> Vec<ScalarKey> {
    cols.iter().map(|&c| ScalarKey(table.column(c).get(row))).collect()
}

/// Wrapper around Scalar to implement Hash + Eq for use as HashMap keys.
#[derive(Clone, Debug)]
struct ScalarKey(Scalar);

impl PartialEq for ScalarKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Raw(a), Scalar::Raw(b)) => a == b,
            (Scalar::Undefined, Scalar::Undefined) => true,
            _ => false,
        }
    }
}

impl Eq for ScalarKey {}

impl std::hash::Hash for ScalarKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Scalar::Boolean(b) => b.hash(state),
            Scalar::Integer(i) => i.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::String(s) => s.hash(state),
            Scalar::Raw(b) => b.hash(state),
            Scalar::List(l) => l.len().hash(state),
            Scalar::Undefined => {}
        }
    }
}

/// NA sorts first; values of one column share a type.
fn cmp_scalar(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Undefined, Scalar::Undefined) => Ordering::Equal,
        (Scalar::Undefined, _) => Ordering::Less,
        (_, Scalar::Undefined) => Ordering::Greater,
        (Scalar::Boolean(x), Scalar::Boolean(y)) => x.cmp(y),
        (Scalar::Integer(x), Scalar::Integer(y)) => x.cmp(y),
        (Scalar::Float(x), Scalar::Float(y)) => x.total_cmp(y),
        (Scalar::String(x), Scalar::String(y)) => x.cmp(y),
        (Scalar::Raw(x), Scalar::Raw(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn cmp_key(a: &[Scalar], b: &[Scalar]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| cmp_scalar(x, y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtframe_types::Column;

    fn keys_table(values: Vec<i64>) -> Table {
        Table::new(vec![("k".to_string(), Column::from_i64(values))]).unwrap()
    }

    #[test]
    fn test_new_rejects_mismatched_lengths() {
        let err = GroupPlan::new(vec![GroupStart::At(0)], vec![]).unwrap_err();
        assert!(matches!(err, FrameError::Invariant(_)));
    }

    #[test]
    fn test_from_keys_first_appearance() {
        let plan = GroupPlan::from_keys(&keys_table(vec![1, 2, 1, 2]), &[0], false).unwrap();
        assert_eq!(plan.num_groups(), 2);
        assert_eq!(plan.member_rows(0), vec![Some(0), Some(2)]);
        assert_eq!(plan.member_rows(1), vec![Some(1), Some(3)]);
        assert_eq!(plan.key_row(1), Some(1));
        assert_eq!(plan.max_group_size(), 2);
        assert_eq!(plan.total_rows(), 4);
    }

    #[test]
    fn test_from_keys_contiguous_has_no_order() {
        let plan = GroupPlan::from_keys(&keys_table(vec![5, 5, 3]), &[0], false).unwrap();
        assert!(plan.order().is_none());
        assert_eq!(plan.start(1), GroupStart::At(2));
        assert_eq!(plan.key_row(1), Some(2));
    }

    #[test]
    fn test_from_keys_sorted() {
        let plan = GroupPlan::from_keys(&keys_table(vec![3, 1, 3, 2]), &[0], true).unwrap();
        let first_rows: Vec<_> = (0..plan.num_groups())
            .map(|g| plan.member_rows(g)[0])
            .collect();
        assert_eq!(first_rows, vec![Some(1), Some(3), Some(0)]);
    }

    #[test]
    fn test_no_match_via_order() {
        let plan = GroupPlan::new(vec![GroupStart::At(0), GroupStart::At(1)], vec![1, 1])
            .unwrap()
            .with_order(vec![Some(0), None]);
        assert!(!plan.is_no_match(0));
        assert!(plan.is_no_match(1));
    }

    #[test]
    fn test_from_join() {
        let x = keys_table(vec![7, 8, 7, 9]);
        let i = keys_table(vec![7, 5, 9]);
        let plan = GroupPlan::from_join(&x, &[0], &i, &[0]).unwrap();
        assert!(plan.is_each_row());
        assert_eq!(plan.num_groups(), 3);
        assert_eq!(plan.member_rows(0), vec![Some(0), Some(2)]);
        assert!(plan.is_no_match(1));
        assert_eq!(plan.member_rows(2), vec![Some(3)]);
        assert_eq!(plan.key_row(2), Some(2));
        assert!(plan.validate(4, 3).is_ok());

        assert!(GroupPlan::from_join(&x, &[0], &i, &[]).is_err());
    }

    #[test]
    fn test_validate() {
        let plan = GroupPlan::new(vec![GroupStart::At(0), GroupStart::At(2)], vec![2, 2]).unwrap();
        assert!(plan.validate(4, 4).is_ok());
        assert!(matches!(plan.validate(3, 3), Err(FrameError::Invariant(_))));

        let bad_order = GroupPlan::new(vec![GroupStart::At(0)], vec![1])
            .unwrap()
            .with_order(vec![Some(9)]);
        assert!(bad_order.validate(4, 4).is_err());

        let each = GroupPlan::new(vec![GroupStart::NoMatch; 3], vec![0; 3])
            .unwrap()
            .each_row();
        assert!(each.validate(4, 2).is_err());
        assert!(each.validate(4, 3).is_ok());
    }
}
