//! Keeps working-set buffers from escaping into stored results.
//!
//! A list value may hold `SD`/`BY`/`I` columns directly, or nested inside other
//! list elements or auxiliary attributes. Storing such a value by reference
//! would tie the result to a buffer that the next group overwrites, so it is
//! replaced by a deep copy with every special flag cleared.

use dtframe_types::{Column, ColumnData, ColumnType};

/// True when `col`, any list element, or any attribute value is special.
pub fn any_special(col: &Column) -> bool {
    if col.is_special() {
        return true;
    }
    if let ColumnData::List(items) = col.data() {
        if items.iter().flatten().any(any_special) {
            return true;
        }
    }
    col.attrs().extra.iter().any(|(_, c)| any_special(c))
}

/// Deep copy sharing no buffer with `col` and carrying no special flag.
pub fn copy_as_plain(col: &Column) -> Column {
    let mut copy = match col.data() {
        ColumnData::List(items) => Column::new(ColumnData::List(
            items
                .iter()
                .map(|item| item.as_ref().map(copy_as_plain))
                .collect(),
        ))
        .with_attrs(col.attrs().clone()),
        _ => col.detached(),
    };
    for (_, value) in copy.attrs_mut().extra.iter_mut() {
        *value = copy_as_plain(value);
    }
    copy
}

/// Value safe to store in a column of type `target`. Only list targets can
/// retain a column by reference.
pub fn protect(target: ColumnType, value: Column) -> Column {
    if target == ColumnType::List && any_special(&value) {
        copy_as_plain(&value)
    } else {
        value
    }
}
