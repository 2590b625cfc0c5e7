//! The per-group view handed to a group expression.
//!
//! Buffers are allocated once, sized to the largest group, and refilled in
//! place for every group. While a buffer is uniquely owned its address does not
//! change; values that must outlive the current group have to be copied (see
//! [`alias_guard`](super::alias_guard)).

use rayon::prelude::*;
use rayon::ThreadPool;

use dtframe_types::column::{na, Slot};
use dtframe_types::{Column, ColumnData, ColumnType, FrameError, Result, Table};

/// Scratch columns exposed to the expression for the current group.
#[derive(Debug)]
pub struct WorkingSet {
    sd: Vec<Column>,
    sd_names: Vec<String>,
    sd_src: Vec<usize>,
    by: Vec<Column>,
    by_names: Vec<String>,
    by_src: Vec<usize>,
    isd: Vec<Column>,
    isd_names: Vec<String>,
    isd_src: Vec<usize>,
    xsd: Vec<Column>,
    xsd_names: Vec<String>,
    xsd_src: Vec<usize>,
    i: Column,
    rows: Vec<Option<usize>>,
    n: usize,
    grp: usize,
    max_group_size: usize,
}

fn check_columns(what: &str, table: &Table, cols: &[usize]) -> Result<()> {
    match cols.iter().find(|&&c| c >= table.num_columns()) {
        Some(c) => Err(FrameError::Invariant(format!(
            "{} column {} is outside a table of {} columns",
            what,
            c,
            table.num_columns()
        ))),
        None => Ok(()),
    }
}

/// Special scratch buffers mirroring `cols` of `table`, with room for `rows`.
fn scratch_columns(table: &Table, cols: &[usize], rows: usize) -> (Vec<Column>, Vec<String>) {
    cols.iter()
        .map(|&c| {
            let src = table.column(c);
            let mut data = ColumnData::with_capacity(src.dtype(), rows);
            data.set_len(rows);
            let mut col = Column::new(data).with_attrs(src.attrs().without_dim());
            col.set_special(true);
            (col, table.names()[c].clone())
        })
        .unzip()
}

impl WorkingSet {
    /// Allocate `SD` over `sd_cols` of `table` and `BY` over `key_cols` of
    /// `keys`, sized for groups of up to `max_group_size` rows.
    pub fn new(
        table: &Table,
        sd_cols: &[usize],
        keys: &Table,
        key_cols: &[usize],
        max_group_size: usize,
    ) -> Result<Self> {
        check_columns("SD", table, sd_cols)?;
        check_columns("BY", keys, key_cols)?;
        // A no-match group still exposes one NA row.
        let cap = max_group_size.max(1);
        let (sd, sd_names) = scratch_columns(table, sd_cols, cap);
        let (by, by_names) = scratch_columns(keys, key_cols, 1);
        let mut i = Column::new(ColumnData::na(ColumnType::Integer, cap));
        i.set_special(true);
        Ok(WorkingSet {
            sd,
            sd_names,
            sd_src: sd_cols.to_vec(),
            by,
            by_names,
            by_src: key_cols.to_vec(),
            isd: Vec::new(),
            isd_names: Vec::new(),
            isd_src: Vec::new(),
            xsd: Vec::new(),
            xsd_names: Vec::new(),
            xsd_src: Vec::new(),
            i,
            rows: Vec::with_capacity(cap),
            n: 0,
            grp: 0,
            max_group_size,
        })
    }

    /// Expose one row of `cols` of the key table as `iSD`.
    pub fn with_isd(mut self, keys: &Table, cols: &[usize]) -> Result<Self> {
        check_columns("iSD", keys, cols)?;
        let (isd, names) = scratch_columns(keys, cols, 1);
        self.isd = isd;
        self.isd_names = names;
        self.isd_src = cols.to_vec();
        Ok(self)
    }

    /// Expose the first row of each group over `cols` of the table as `xSD`.
    pub fn with_xsd(mut self, table: &Table, cols: &[usize]) -> Result<Self> {
        check_columns("xSD", table, cols)?;
        let (xsd, names) = scratch_columns(table, cols, 1);
        self.xsd = xsd;
        self.xsd_names = names;
        self.xsd_src = cols.to_vec();
        Ok(self)
    }

    /// Rows in the current group; 0 for a no-match group.
    pub fn n(&self) -> usize {
        self.n
    }

    /// 1-based group counter.
    pub fn grp(&self) -> usize {
        self.grp
    }

    pub fn sd(&self) -> &[Column] {
        &self.sd
    }

    pub fn sd_names(&self) -> &[String] {
        &self.sd_names
    }

    pub fn by(&self) -> &[Column] {
        &self.by
    }

    pub fn by_names(&self) -> &[String] {
        &self.by_names
    }

    pub fn isd(&self) -> &[Column] {
        &self.isd
    }

    pub fn xsd(&self) -> &[Column] {
        &self.xsd
    }

    /// Member row positions of the current group (0-based, NA for no match).
    pub fn i(&self) -> &Column {
        &self.i
    }

    pub fn rows(&self) -> &[Option<usize>] {
        &self.rows
    }

    pub fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    /// Look a column up by name in `SD`, then `BY`, then `iSD`, then `xSD`.
    pub fn column(&self, name: &str) -> Option<&Column> {
        [
            (&self.sd_names, &self.sd),
            (&self.by_names, &self.by),
            (&self.isd_names, &self.isd),
            (&self.xsd_names, &self.xsd),
        ]
        .into_iter()
        .find_map(|(names, cols)| names.iter().position(|n| n == name).map(|p| &cols[p]))
    }

    pub(crate) fn begin_group(&mut self, grp: usize, n: usize) {
        self.grp = grp;
        self.n = n;
    }

    /// Fill `BY` from row `key_row` of the key table (NA when `None`).
    pub(crate) fn load_keys(&mut self, keys: &Table, key_row: Option<usize>) -> Result<()> {
        load_one_row(&mut self.by, &self.by_src, keys, key_row)
    }

    pub(crate) fn load_isd(&mut self, keys: &Table, key_row: Option<usize>) -> Result<()> {
        load_one_row(&mut self.isd, &self.isd_src, keys, key_row)
    }

    pub(crate) fn load_xsd(&mut self, table: &Table, row: Option<usize>) -> Result<()> {
        load_one_row(&mut self.xsd, &self.xsd_src, table, row)
    }

    /// Fill `SD` and `I` with the contiguous rows `start..start + len`.
    pub(crate) fn load_contiguous(&mut self, table: &Table, start: usize, len: usize) -> Result<()> {
        for (col, &src) in self.sd.iter_mut().zip(&self.sd_src) {
            col.data_mut()
                .copy_range_from(table.column(src).data(), start, len)?;
        }
        self.rows.clear();
        self.rows.extend((start..start + len).map(Some));
        self.fill_i();
        Ok(())
    }

    /// Fill `SD` and `I` by gathering `rows` from the table. Plain columns are
    /// split across `pool` when one is given.
    pub(crate) fn load_permuted(
        &mut self,
        table: &Table,
        rows: &[Option<usize>],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        for (col, &src) in self.sd.iter_mut().zip(&self.sd_src) {
            let src = table.column(src).data();
            let dst = col.data_mut();
            match pool {
                Some(pool) => par_gather(dst, src, rows, pool)?,
                None => dst.gather_from(src, rows)?,
            }
        }
        self.rows.clear();
        self.rows.extend_from_slice(rows);
        self.fill_i();
        Ok(())
    }

    /// One NA row in `SD` and `I` for a key that matched nothing.
    pub(crate) fn load_no_match(&mut self) {
        for col in &mut self.sd {
            let data = col.data_mut();
            data.set_len(1);
            data.write_na(0, 1);
        }
        self.rows.clear();
        self.rows.push(None);
        self.fill_i();
    }

    fn fill_i(&mut self) {
        if let ColumnData::Integer(v) = self.i.data_mut() {
            v.clear();
            v.extend(self.rows.iter().map(|r| r.map(|r| r as i64)));
        }
    }

    /// Return the buffers to normal management: full length, not special.
    pub fn release(&mut self) {
        let len = self.max_group_size.max(1);
        for col in self.sd.iter_mut().chain(std::iter::once(&mut self.i)) {
            col.data_mut().set_len(len);
        }
        for col in self
            .sd
            .iter_mut()
            .chain(self.by.iter_mut())
            .chain(self.isd.iter_mut())
            .chain(self.xsd.iter_mut())
            .chain(std::iter::once(&mut self.i))
        {
            col.set_special(false);
        }
    }
}

fn load_one_row(dst: &mut [Column], src_cols: &[usize], table: &Table, row: Option<usize>) -> Result<()> {
    for (col, &src) in dst.iter_mut().zip(src_cols) {
        let data = col.data_mut();
        data.set_len(1);
        data.fill_from(0, 1, table.column(src).data(), row)?;
    }
    Ok(())
}

fn par_gather_slice<T: Slot + Copy>(dst: &mut Vec<T>, src: &[T], rows: &[Option<usize>], pool: &ThreadPool) {
    dst.clear();
    dst.resize(rows.len(), na());
    pool.install(|| {
        dst.par_iter_mut()
            .zip(rows.par_iter())
            .for_each(|(d, r)| *d = r.map_or_else(na, |i| src[i]));
    });
}

/// Parallel gather for fixed-width element types; others fall back to a
/// sequential gather.
fn par_gather(dst: &mut ColumnData, src: &ColumnData, rows: &[Option<usize>], pool: &ThreadPool) -> Result<()> {
    match (dst, src) {
        (ColumnData::Boolean(d), ColumnData::Boolean(s)) => par_gather_slice(d, s, rows, pool),
        (ColumnData::Integer(d), ColumnData::Integer(s)) => par_gather_slice(d, s, rows, pool),
        (ColumnData::Float(d), ColumnData::Float(s)) => par_gather_slice(d, s, rows, pool),
        (ColumnData::Raw(d), ColumnData::Raw(s)) => par_gather_slice(d, s, rows, pool),
        (d, s) => d.gather_from(s, rows)?,
    }
    Ok(())
}
