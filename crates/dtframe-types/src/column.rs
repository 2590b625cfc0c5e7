//! Column representation.
//!
//! `ColumnData` is a typed vector with `None` as NA. `Column` wraps it in a
//! reference-counted buffer together with attributes and the `special` flag
//! that marks group-by scratch memory.

use std::sync::Arc;

use crate::error::{FrameError, Result};
use crate::value::{ColumnType, Scalar};

/// Typed column vector. `None` represents NA; raw bytes have no NA and use 0.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Boolean(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    String(Vec<Option<Arc<str>>>),
    List(Vec<Option<Column>>),
    Raw(Vec<u8>),
}

/// A storage slot with a designated missing value.
pub trait Slot: Clone + Send + Sync {
    const NA: Self;
}

impl<T: Clone + Send + Sync> Slot for Option<T> {
    const NA: Self = None;
}

impl Slot for u8 {
    const NA: Self = 0;
}

/// The NA value of whatever slot type is inferred at the call site.
pub fn na<S: Slot>() -> S {
    S::NA
}

/// Run `$body` with `$v` bound to the inner vector, whatever the variant.
#[macro_export]
macro_rules! each_vec {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::column::ColumnData::Boolean($v) => $body,
            $crate::column::ColumnData::Integer($v) => $body,
            $crate::column::ColumnData::Float($v) => $body,
            $crate::column::ColumnData::String($v) => $body,
            $crate::column::ColumnData::List($v) => $body,
            $crate::column::ColumnData::Raw($v) => $body,
        }
    };
}

/// Run `$body` with both inner vectors bound when the variants agree.
macro_rules! each_pair {
    ($a:expr, $b:expr, ($x:ident, $y:ident) => $body:expr, ($l:ident, $r:ident) => $fallback:expr) => {
        match ($a, $b) {
            (ColumnData::Boolean($x), ColumnData::Boolean($y)) => $body,
            (ColumnData::Integer($x), ColumnData::Integer($y)) => $body,
            (ColumnData::Float($x), ColumnData::Float($y)) => $body,
            (ColumnData::String($x), ColumnData::String($y)) => $body,
            (ColumnData::List($x), ColumnData::List($y)) => $body,
            (ColumnData::Raw($x), ColumnData::Raw($y)) => $body,
            ($l, $r) => $fallback,
        }
    };
}

fn mismatch(op: &str, a: ColumnType, b: ColumnType) -> FrameError {
    FrameError::Type(format!("Cannot {} {} column with {} column", op, a, b))
}

impl ColumnData {
    /// Create an empty column of the given type.
    pub fn empty(dtype: ColumnType) -> Self {
        Self::with_capacity(dtype, 0)
    }

    pub fn with_capacity(dtype: ColumnType, capacity: usize) -> Self {
        match dtype {
            ColumnType::Boolean => ColumnData::Boolean(Vec::with_capacity(capacity)),
            ColumnType::Integer => ColumnData::Integer(Vec::with_capacity(capacity)),
            ColumnType::Float => ColumnData::Float(Vec::with_capacity(capacity)),
            ColumnType::String => ColumnData::String(Vec::with_capacity(capacity)),
            ColumnType::List => ColumnData::List(Vec::with_capacity(capacity)),
            ColumnType::Raw => ColumnData::Raw(Vec::with_capacity(capacity)),
        }
    }

    /// A column of `len` NA values.
    pub fn na(dtype: ColumnType, len: usize) -> Self {
        let mut col = Self::with_capacity(dtype, len);
        col.set_len(len);
        col
    }

    /// Number of elements in this column.
    pub fn len(&self) -> usize {
        each_vec!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated element capacity.
    pub fn capacity(&self) -> usize {
        each_vec!(self, v => v.capacity())
    }

    /// The type of this column.
    pub fn dtype(&self) -> ColumnType {
        match self {
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::String(_) => ColumnType::String,
            ColumnData::List(_) => ColumnType::List,
            ColumnData::Raw(_) => ColumnType::Raw,
        }
    }

    /// Push a value. NA is accepted by every type.
    pub fn push(&mut self, value: &Scalar) -> Result<()> {
        match (self, value) {
            (ColumnData::Boolean(v), Scalar::Boolean(b)) => v.push(Some(*b)),
            (ColumnData::Integer(v), Scalar::Integer(i)) => v.push(Some(*i)),
            (ColumnData::Float(v), Scalar::Float(f)) => v.push(Some(*f)),
            (ColumnData::String(v), Scalar::String(s)) => v.push(Some(s.clone())),
            (ColumnData::List(v), Scalar::List(c)) => v.push(Some(c.clone())),
            (ColumnData::Raw(v), Scalar::Raw(b)) => v.push(*b),
            (col, Scalar::Undefined) => {
                let len = col.len();
                col.set_len(len + 1);
            }
            (col, val) => {
                return Err(FrameError::Type(format!(
                    "Cannot push {:?} into {} column",
                    val,
                    col.dtype()
                )));
            }
        }
        Ok(())
    }

    /// Get a value at the given index.
    pub fn get(&self, index: usize) -> Scalar {
        match self {
            ColumnData::Boolean(v) => v[index].map_or(Scalar::Undefined, Scalar::Boolean),
            ColumnData::Integer(v) => v[index].map_or(Scalar::Undefined, Scalar::Integer),
            ColumnData::Float(v) => v[index].map_or(Scalar::Undefined, Scalar::Float),
            ColumnData::String(v) => match &v[index] {
                Some(s) => Scalar::String(s.clone()),
                None => Scalar::Undefined,
            },
            ColumnData::List(v) => match &v[index] {
                Some(c) => Scalar::List(c.clone()),
                None => Scalar::Undefined,
            },
            ColumnData::Raw(v) => Scalar::Raw(v[index]),
        }
    }

    /// Extend this column with values from another column of the same type.
    pub fn extend(&mut self, other: &ColumnData) -> Result<()> {
        each_pair!(self, other, (a, b) => a.extend_from_slice(b),
            (a, b) => return Err(mismatch("extend", a.dtype(), b.dtype())));
        Ok(())
    }

    /// Set the logical length, padding with NA. Capacity is never released.
    pub fn set_len(&mut self, len: usize) {
        each_vec!(self, v => v.resize(len, na()))
    }

    /// Truncate or NA-pad to `len` and release the excess allocation.
    pub fn shrink_to(&mut self, len: usize) {
        each_vec!(self, v => {
            v.resize(len, na());
            v.shrink_to_fit();
        })
    }

    /// Overwrite `n` elements starting at `start` with NA.
    pub fn write_na(&mut self, start: usize, n: usize) {
        each_vec!(self, v => v[start..start + n].fill(na()))
    }

    /// Replace the contents with `src[start..start + len]`, keeping the allocation.
    pub fn copy_range_from(&mut self, src: &ColumnData, start: usize, len: usize) -> Result<()> {
        each_pair!(self, src, (a, b) => {
            a.clear();
            a.extend_from_slice(&b[start..start + len]);
        }, (a, b) => return Err(mismatch("copy into", a.dtype(), b.dtype())));
        Ok(())
    }

    /// Replace the contents with the rows of `src` named by `rows` (NA rows give NA).
    pub fn gather_from(&mut self, src: &ColumnData, rows: &[Option<usize>]) -> Result<()> {
        each_pair!(self, src, (a, b) => {
            a.clear();
            a.extend(rows.iter().map(|r| r.map_or_else(na, |i| b[i].clone())));
        }, (a, b) => return Err(mismatch("gather into", a.dtype(), b.dtype())));
        Ok(())
    }

    /// Write `src[src_row]` (or NA when `src_row` is `None`) into `width` rows at `offset`.
    pub fn fill_from(
        &mut self,
        offset: usize,
        width: usize,
        src: &ColumnData,
        src_row: Option<usize>,
    ) -> Result<()> {
        each_pair!(self, src, (a, b) => {
            let value = src_row.map_or_else(na, |r| b[r].clone());
            a[offset..offset + width].fill(value);
        }, (a, b) => return Err(mismatch("fill", a.dtype(), b.dtype())));
        Ok(())
    }

    /// Write `src` into `width` rows at `offset`: broadcast when `src` has one
    /// element, element-wise when it has exactly `width`.
    pub fn write_recycled(&mut self, offset: usize, width: usize, src: &ColumnData) -> Result<()> {
        let n = src.len();
        if n != 1 && n != width {
            return Err(FrameError::Recycle(format!(
                "Supplied {} items for a target of {} rows",
                n, width
            )));
        }
        each_pair!(self, src, (a, b) => {
            if n == 1 {
                a[offset..offset + width].fill(b[0].clone());
            } else {
                a[offset..offset + width].clone_from_slice(b);
            }
        }, (a, b) => return Err(mismatch("write", a.dtype(), b.dtype())));
        Ok(())
    }

    /// Write `src` into the listed rows, recycling a single value.
    pub fn scatter_recycled(&mut self, rows: &[usize], src: &ColumnData) -> Result<()> {
        let n = src.len();
        if n != 1 && n != rows.len() {
            return Err(FrameError::Recycle(format!(
                "Supplied {} items for a target of {} rows",
                n,
                rows.len()
            )));
        }
        each_pair!(self, src, (a, b) => {
            for (k, &row) in rows.iter().enumerate() {
                a[row] = b[if n == 1 { 0 } else { k }].clone();
            }
        }, (a, b) => return Err(mismatch("write", a.dtype(), b.dtype())));
        Ok(())
    }

    /// Convert to another type. The flag is true when values were truncated.
    pub fn coerce(&self, to: ColumnType) -> Result<(ColumnData, bool)> {
        if self.dtype() == to {
            return Ok((self.clone(), false));
        }
        let mut lossy = false;
        let out = match (self, to) {
            (ColumnData::Boolean(v), ColumnType::Integer) => {
                ColumnData::Integer(v.iter().map(|b| b.map(i64::from)).collect())
            }
            (ColumnData::Boolean(v), ColumnType::Float) => ColumnData::Float(
                v.iter()
                    .map(|b| b.map(|b| if b { 1.0 } else { 0.0 }))
                    .collect(),
            ),
            (ColumnData::Integer(v), ColumnType::Float) => {
                ColumnData::Float(v.iter().map(|i| i.map(|i| i as f64)).collect())
            }
            (ColumnData::Float(v), ColumnType::Integer) => ColumnData::Integer(
                v.iter()
                    .map(|f| match f {
                        Some(f) if f.is_finite() => {
                            if f.fract() != 0.0 {
                                lossy = true;
                            }
                            Some(f.trunc() as i64)
                        }
                        Some(f) if f.is_nan() => None,
                        Some(_) => {
                            lossy = true;
                            None
                        }
                        None => None,
                    })
                    .collect(),
            ),
            (from, to) => {
                return Err(FrameError::Type(format!(
                    "Cannot coerce {} column to {}",
                    from.dtype(),
                    to
                )));
            }
        };
        Ok((out, lossy))
    }

    /// Floating-point view for numeric and boolean columns; NA becomes NaN.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match self {
            ColumnData::Float(v) => Ok(v.iter().map(|f| f.unwrap_or(f64::NAN)).collect()),
            ColumnData::Integer(v) => Ok(v.iter().map(|i| i.map_or(f64::NAN, |i| i as f64)).collect()),
            ColumnData::Boolean(v) => Ok(v
                .iter()
                .map(|b| b.map_or(f64::NAN, |b| if b { 1.0 } else { 0.0 }))
                .collect()),
            other => Err(FrameError::Type(format!(
                "Expected a numeric or boolean column, got {}",
                other.dtype()
            ))),
        }
    }
}

/// Column attributes. Auxiliary attributes may hold arbitrary columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub class: Vec<String>,
    pub levels: Option<Vec<String>>,
    pub dim: Option<Vec<usize>>,
    pub extra: Vec<(String, Column)>,
}

impl Attributes {
    pub fn is_empty(&self) -> bool {
        self.class.is_empty() && self.levels.is_none() && self.dim.is_none() && self.extra.is_empty()
    }

    /// Everything except the array shape.
    pub fn without_dim(&self) -> Attributes {
        Attributes {
            dim: None,
            ..self.clone()
        }
    }

    /// Number of dimensions with extent greater than one.
    pub fn non_trivial_dims(&self) -> usize {
        self.dim
            .as_ref()
            .map_or(0, |dims| dims.iter().filter(|&&d| d > 1).count())
    }
}

/// A column: shared typed buffer plus attributes.
///
/// Clones share the buffer. Mutation through [`Column::data_mut`] is
/// copy-on-write, so a buffer keeps its identity only while it is the sole
/// owner of its storage.
#[derive(Debug, Clone)]
pub struct Column {
    data: Arc<ColumnData>,
    attrs: Attributes,
    special: bool,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.attrs == other.attrs
    }
}

impl Column {
    pub fn new(data: ColumnData) -> Self {
        Column {
            data: Arc::new(data),
            attrs: Attributes::default(),
            special: false,
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(ColumnData::Integer(values.into_iter().map(Some).collect()))
    }

    pub fn from_f64(values: Vec<f64>) -> Self {
        Self::new(ColumnData::Float(values.into_iter().map(Some).collect()))
    }

    pub fn from_bool(values: Vec<bool>) -> Self {
        Self::new(ColumnData::Boolean(values.into_iter().map(Some).collect()))
    }

    pub fn from_strings(values: &[&str]) -> Self {
        Self::new(ColumnData::String(
            values.iter().map(|s| Some(Arc::from(*s))).collect(),
        ))
    }

    pub fn from_list(values: Vec<Option<Column>>) -> Self {
        Self::new(ColumnData::List(values))
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Mutable access to the buffer, cloning it first if it is shared.
    pub fn data_mut(&mut self) -> &mut ColumnData {
        Arc::make_mut(&mut self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> ColumnType {
        self.data.dtype()
    }

    pub fn get(&self, index: usize) -> Scalar {
        self.data.get(index)
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    /// True when this column is group-by scratch memory.
    pub fn is_special(&self) -> bool {
        self.special
    }

    pub fn set_special(&mut self, special: bool) {
        self.special = special;
    }

    /// Address of the buffer; stable for as long as the buffer is not replaced.
    pub fn buffer_id(&self) -> usize {
        Arc::as_ptr(&self.data) as usize
    }

    pub fn shares_buffer(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// A fresh, unshared, non-special copy of this column's top level.
    pub fn detached(&self) -> Column {
        Column {
            data: Arc::new((*self.data).clone()),
            attrs: self.attrs.clone(),
            special: false,
        }
    }

    /// All values as scalars.
    pub fn to_vec(&self) -> Vec<Scalar> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}
