/// Vendor-neutral parameter and result value.
///
/// This is the only currency exchanged with the drivers: arguments go down as
/// `SqlValue`, result cells come back as `SqlValue`. `List` only ever appears
/// as an argument (an `IN (...)` operand) and is flattened into individual
/// positional values before a statement is sent.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    List(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlValue::UInt(v) => Some(*v),
            SqlValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Appends this value to `out`, expanding a `List` into its elements.
    /// Left-to-right flattening keeps the positional placeholder count in step
    /// with the argument count.
    pub fn flatten_into(&self, out: &mut Vec<SqlValue>) {
        match self {
            SqlValue::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other.clone()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

macro_rules! from_int {
    ($($t:ty),+) => {$(
        impl From<$t> for SqlValue {
            fn from(v: $t) -> Self {
                SqlValue::Int(v as i64)
            }
        }
    )+};
}
from_int!(i8, i16, i32, i64, isize);

macro_rules! from_uint {
    ($($t:ty),+) => {$(
        impl From<$t> for SqlValue {
            fn from(v: $t) -> Self {
                SqlValue::UInt(v as u64)
            }
        }
    )+};
}
from_uint!(u8, u16, u32, u64, usize);

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl<T: Into<SqlValue>> FromIterator<T> for SqlValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        SqlValue::List(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(SqlValue::from(7_i32), SqlValue::Int(7));
        assert_eq!(SqlValue::from(7_u16), SqlValue::UInt(7));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from(Option::<i64>::None), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(true)), SqlValue::Bool(true));
    }

    #[test]
    fn flatten_expands_lists_in_order() {
        let list: SqlValue = [1_i64, 2, 3].into_iter().collect();
        let mut out = Vec::new();
        SqlValue::Text("a".into()).flatten_into(&mut out);
        list.flatten_into(&mut out);
        assert_eq!(
            out,
            vec![
                SqlValue::Text("a".into()),
                SqlValue::Int(1),
                SqlValue::Int(2),
                SqlValue::Int(3),
            ]
        );
    }

    #[test]
    fn accessors_widen_integers() {
        assert_eq!(SqlValue::UInt(9).as_i64(), Some(9));
        assert_eq!(SqlValue::Int(-1).as_u64(), None);
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
    }
}
