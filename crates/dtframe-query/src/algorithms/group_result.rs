//! What a group expression returns.

use dtframe_types::{Column, FrameError, Result, Table};

/// Output of one evaluation of a group expression.
#[derive(Debug, Clone)]
pub enum GroupOutput {
    /// Side effect only; the group contributes nothing.
    Empty,
    /// A bare vector, treated as a one-column record.
    Vector(Column),
    /// An ordered set of result columns.
    Record(Record),
    /// Anything that is neither a vector nor a record. Carries a description
    /// for the error message.
    Other(String),
}

impl From<Column> for GroupOutput {
    fn from(col: Column) -> Self {
        GroupOutput::Vector(col)
    }
}

impl From<Record> for GroupOutput {
    fn from(record: Record) -> Self {
        GroupOutput::Record(record)
    }
}

/// One entry of a record.
#[derive(Debug, Clone)]
pub enum Entry {
    Null,
    Column(Column),
    /// A nested table; always rejected.
    Table(Table),
}

impl Entry {
    /// Length of the entry; NULL counts as zero.
    pub fn len(&self) -> usize {
        match self {
            Entry::Null => 0,
            Entry::Column(c) => c.len(),
            Entry::Table(t) => t.num_rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Entry::Column(c) => Some(c),
            _ => None,
        }
    }
}

/// Ordered, optionally named result columns.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<Entry>,
    names: Vec<Option<String>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, col: Column) -> Self {
        self.entries.push(Entry::Column(col));
        self.names.push(None);
        self
    }

    pub fn push_named(mut self, name: &str, col: Column) -> Self {
        self.entries.push(Entry::Column(col));
        self.names.push(Some(name.to_string()));
        self
    }

    pub fn push_null(mut self) -> Self {
        self.entries.push(Entry::Null);
        self.names.push(None);
        self
    }

    pub fn push_table(mut self, table: Table) -> Self {
        self.entries.push(Entry::Table(table));
        self.names.push(None);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> &Entry {
        &self.entries[index]
    }

    /// Name of entry `index`, or `V{index + 1}` when unnamed.
    pub fn name(&self, index: usize) -> String {
        self.names[index]
            .clone()
            .unwrap_or_else(|| format!("V{}", index + 1))
    }

    /// Length of the longest entry.
    pub fn max_len(&self) -> usize {
        self.entries.iter().map(Entry::len).max().unwrap_or(0)
    }
}

impl GroupOutput {
    /// Normalize to a record, or `None` when the group contributes nothing.
    /// `group` is 1-based and only used in error messages.
    pub fn into_record(self, group: usize) -> Result<Option<Record>> {
        let record = match self {
            GroupOutput::Empty => return Ok(None),
            GroupOutput::Vector(col) => Record::new().push(col),
            GroupOutput::Record(r) if r.is_empty() => return Ok(None),
            GroupOutput::Record(r) => r,
            GroupOutput::Other(what) => {
                return Err(FrameError::Shape(format!(
                    "Result for group {} is {}; it must be a vector or a record of vectors",
                    group, what
                )))
            }
        };
        for (j, entry) in record.entries.iter().enumerate() {
            match entry {
                Entry::Table(_) => {
                    return Err(FrameError::Shape(format!(
                        "Column {} of result for group {} is a table; nested tables are not supported",
                        j + 1,
                        group
                    )))
                }
                Entry::Column(c) if c.attrs().non_trivial_dims() > 1 => {
                    return Err(FrameError::Shape(format!(
                        "Column {} of result for group {} is an array with {} non-trivial dimensions; only vectors are supported",
                        j + 1,
                        group,
                        c.attrs().non_trivial_dims()
                    )))
                }
                _ => {}
            }
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtframe_types::Attributes;

    #[test]
    fn test_vector_is_wrapped() {
        let rec = GroupOutput::from(Column::from_i64(vec![1, 2]))
            .into_record(1)
            .unwrap()
            .unwrap();
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.name(0), "V1");
        assert_eq!(rec.max_len(), 2);
    }

    #[test]
    fn test_empty_outputs_contribute_nothing() {
        assert!(GroupOutput::Empty.into_record(1).unwrap().is_none());
        assert!(GroupOutput::Record(Record::new())
            .into_record(1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_shape_errors() {
        let err = GroupOutput::Other("a function".into())
            .into_record(4)
            .unwrap_err();
        assert!(err.to_string().contains("group 4"));

        let nested = Record::new().push_table(Table::empty(&[]));
        assert!(matches!(
            GroupOutput::from(nested).into_record(1),
            Err(FrameError::Shape(_))
        ));

        let matrix = Column::from_i64(vec![1, 2, 3, 4]).with_attrs(Attributes {
            dim: Some(vec![2, 2]),
            ..Default::default()
        });
        assert!(GroupOutput::from(matrix).into_record(1).is_err());

        let column_vector = Column::from_i64(vec![1, 2]).with_attrs(Attributes {
            dim: Some(vec![2, 1]),
            ..Default::default()
        });
        assert!(GroupOutput::from(column_vector).into_record(1).is_ok());
    }

    #[test]
    fn test_names() {
        let rec = Record::new()
            .push_named("total", Column::from_f64(vec![1.0]))
            .push_null();
        assert_eq!(rec.name(0), "total");
        assert_eq!(rec.name(1), "V2");
        assert_eq!(rec.entry(1).len(), 0);
    }
}
