//! Named, length-homogeneous column collection.

use crate::column::{Column, ColumnData};
use crate::error::{FrameError, Result};
use crate::value::{ColumnType, Scalar};

/// An ordered set of named columns sharing one row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Create a table from named columns. All columns must have the same length.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, |(_, c)| c.len());
        let mut names = Vec::with_capacity(columns.len());
        let mut cols = Vec::with_capacity(columns.len());
        for (i, (name, col)) in columns.into_iter().enumerate() {
            if col.len() != num_rows {
                return Err(FrameError::Shape(format!(
                    "Column {} ('{}') has {} rows, expected {}",
                    i + 1,
                    name,
                    col.len(),
                    num_rows
                )));
            }
            names.push(name);
            cols.push(col);
        }
        Ok(Table {
            names,
            columns: cols,
            num_rows,
        })
    }

    /// Create an empty table with the given schema.
    pub fn empty(schema: &[(&str, ColumnType)]) -> Self {
        Table {
            names: schema.iter().map(|(n, _)| n.to_string()).collect(),
            columns: schema
                .iter()
                .map(|&(_, dt)| Column::new(ColumnData::empty(dt)))
                .collect(),
            num_rows: 0,
        }
    }

    /// Convert from row-major values.
    pub fn from_rows(names: &[&str], rows: &[Vec<Scalar>], dtypes: &[ColumnType]) -> Result<Self> {
        if names.len() != dtypes.len() {
            return Err(FrameError::Shape(format!(
                "Got {} names for {} columns",
                names.len(),
                dtypes.len()
            )));
        }
        let mut data: Vec<ColumnData> = dtypes
            .iter()
            .map(|&dt| ColumnData::with_capacity(dt, rows.len()))
            .collect();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != dtypes.len() {
                return Err(FrameError::Shape(format!(
                    "Row {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    dtypes.len()
                )));
            }
            for (col, val) in data.iter_mut().zip(row) {
                col.push(val)?;
            }
        }
        Ok(Table {
            names: names.iter().map(|n| n.to_string()).collect(),
            columns: data.into_iter().map(Column::new).collect(),
            num_rows: rows.len(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dtypes(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.dtype()).collect()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    /// Mutable access for in-place assignment. The caller keeps the row count.
    pub fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| FrameError::Shape(format!("Column '{}' not found", name)))
    }

    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        Ok(&self.columns[self.column_index(name)?])
    }

    /// Append a column. Its length must match the table's row count, unless
    /// the table has no columns yet.
    pub fn push_column(&mut self, name: &str, column: Column) -> Result<usize> {
        if self.columns.is_empty() {
            self.num_rows = column.len();
        } else if column.len() != self.num_rows {
            return Err(FrameError::Shape(format!(
                "Column '{}' has {} rows, expected {}",
                name,
                column.len(),
                self.num_rows
            )));
        }
        if self.names.iter().any(|n| n == name) {
            return Err(FrameError::Shape(format!("Column '{}' already exists", name)));
        }
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(self.columns.len() - 1)
    }

    /// Get a single row.
    pub fn row(&self, index: usize) -> Vec<Scalar> {
        self.columns.iter().map(|col| col.get(index)).collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<Scalar>> {
        (0..self.num_rows).map(|i| self.row(i)).collect()
    }

    /// Select specific columns by index.
    pub fn select_columns(&self, indices: &[usize]) -> Result<Self> {
        let mut out = Vec::with_capacity(indices.len());
        for &idx in indices {
            if idx >= self.columns.len() {
                return Err(FrameError::Shape(format!(
                    "Column index {} out of range ({})",
                    idx,
                    self.columns.len()
                )));
            }
            out.push((self.names[idx].clone(), self.columns[idx].clone()));
        }
        Ok(Table {
            names: out.iter().map(|(n, _)| n.clone()).collect(),
            columns: out.into_iter().map(|(_, c)| c).collect(),
            num_rows: self.num_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_and_back() {
        let rows = vec![
            vec![Scalar::Integer(1), Scalar::String("a".into())],
            vec![Scalar::Integer(2), Scalar::Undefined],
        ];
        let dtypes = [ColumnType::Integer, ColumnType::String];
        let table = Table::from_rows(&["id", "name"], &rows, &dtypes).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.to_rows(), rows);
    }

    #[test]
    fn test_new_rejects_ragged() {
        let err = Table::new(vec![
            ("a".to_string(), Column::from_i64(vec![1, 2])),
            ("b".to_string(), Column::from_i64(vec![1])),
        ])
        .unwrap_err();
        assert!(matches!(err, FrameError::Shape(_)));
    }

    #[test]
    fn test_push_column() {
        let mut table = Table::new(vec![("a".to_string(), Column::from_i64(vec![1, 2]))]).unwrap();
        assert_eq!(table.push_column("b", Column::from_f64(vec![0.5, 1.5])).unwrap(), 1);
        assert!(table.push_column("c", Column::from_f64(vec![0.5])).is_err());
        assert!(table.push_column("a", Column::from_i64(vec![3, 4])).is_err());
        assert_eq!(table.column_index("b").unwrap(), 1);
    }

    #[test]
    fn test_select_columns() {
        let table = Table::new(vec![
            ("a".to_string(), Column::from_i64(vec![1])),
            ("b".to_string(), Column::from_f64(vec![2.0])),
        ])
        .unwrap();
        let projected = table.select_columns(&[1]).unwrap();
        assert_eq!(projected.names(), &["b".to_string()]);
        assert_eq!(projected.row(0), vec![Scalar::Float(2.0)]);
        assert!(table.select_columns(&[5]).is_err());
    }

    #[test]
    fn test_empty_table() {
        let table = Table::empty(&[("x", ColumnType::Integer), ("y", ColumnType::List)]);
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.dtypes(), vec![ColumnType::Integer, ColumnType::List]);
    }
}
