//! Mapping rows onto record types
//!
//! A record opts in by implementing [`Bind`], usually through
//! [`impl_bind!`](crate::impl_bind), which generates the column→field table
//! at compile time. Binding starts from `T::default()` and copies a column
//! into a field only when the column exists and its value has exactly the
//! field's type; everything else keeps its default.

use super::row::Row;
use super::value::{DatabaseValue, FromValue};

/// A record type that can be populated from a [`Row`]
pub trait Bind: Default {
    /// Column names this record reads, one per bindable field
    const COLUMNS: &'static [&'static str];

    /// Store `value` into the field mapped to `column`
    ///
    /// Returns `false` when no field maps to `column` or the value's type
    /// does not match the field's type; the field is left untouched then.
    fn bind_column(&mut self, column: &str, value: &DatabaseValue) -> bool;
}

/// Assign `value` to `slot` if it holds exactly `F`
pub fn assign<F: FromValue>(slot: &mut F, value: &DatabaseValue) -> bool {
    match F::from_value(value) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

/// Build a `T` from one row
pub fn bind_row<T: Bind>(row: &Row) -> T {
    let mut record = T::default();
    for column in T::COLUMNS {
        if let Some(found) = row.get(column) {
            record.bind_column(column, found.raw_value());
        }
    }
    record
}

/// Lazily bind every row, preserving order
pub fn bind_rows<'a, T, I>(rows: I) -> impl Iterator<Item = T> + 'a
where
    T: Bind + 'a,
    I: IntoIterator<Item = &'a Row>,
    I::IntoIter: 'a,
{
    rows.into_iter().map(bind_row::<T>)
}

/// Implement [`Bind`] for a struct with named fields
///
/// Each listed field binds to the column of the same name, or to the
/// column named after `as`.
///
/// ```
/// use db_connection_wrapper::impl_bind;
///
/// #[derive(Debug, Default)]
/// pub struct UserRecord {
///     pub id: i64,
///     pub name: String,
///     pub email: Option<String>,
/// }
///
/// impl_bind!(UserRecord {
///     id as "Id",
///     name as "Name",
///     email,
/// });
/// ```
#[macro_export]
macro_rules! impl_bind {
    (@column $field:ident $column:literal) => {
        $column
    };
    (@column $field:ident) => {
        stringify!($field)
    };
    ($ty:ty { $($field:ident $(as $column:literal)?),* $(,)? }) => {
        impl $crate::core::binder::Bind for $ty {
            const COLUMNS: &'static [&'static str] = &[
                $($crate::impl_bind!(@column $field $($column)?)),*
            ];

            fn bind_column(
                &mut self,
                column: &str,
                value: &$crate::core::value::DatabaseValue,
            ) -> bool {
                $(
                    if column == $crate::impl_bind!(@column $field $($column)?) {
                        return $crate::core::binder::assign(&mut self.$field, value);
                    }
                )*
                false
            }
        }
    };
}
