use std::fmt;

use super::field_type::FieldType;
use crate::kv::KvResult;

/// The typed value columns of a composite index: a tuple of two to four
/// [`FieldType`]s, encoded one after the other in declared order.
pub trait IndexColumns: Send + Sync {
    /// The tuple of column values.
    type Values: Clone + Ord + fmt::Debug;

    const ARITY: usize;

    fn type_names(&self) -> Vec<&str>;

    fn write_values(&self, values: &Self::Values, out: &mut Vec<u8>);

    fn read_values(&self, input: &mut &[u8]) -> KvResult<Self::Values>;
}

macro_rules! impl_index_columns {
    ($arity:expr; $($t:ident $idx:tt),+) => {
        impl<$($t: FieldType),+> IndexColumns for ($($t,)+) {
            type Values = ($($t::Value,)+);

            const ARITY: usize = $arity;

            fn type_names(&self) -> Vec<&str> {
                vec![$(self.$idx.name()),+]
            }

            fn write_values(&self, values: &Self::Values, out: &mut Vec<u8>) {
                $(self.$idx.write(&values.$idx, out);)+
            }

            fn read_values(&self, input: &mut &[u8]) -> KvResult<Self::Values> {
                Ok(($(self.$idx.read(input)?,)+))
            }
        }
    };
}

impl_index_columns!(2; A 0, B 1);
impl_index_columns!(3; A 0, B 1, C 2);
impl_index_columns!(4; A 0, B 1, C 2, D 3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::field_type::{BoolType, I64Type, StringType};

    #[test]
    fn test_tuple_columns() {
        let columns = (StringType, I64Type, BoolType);
        assert_eq!(<(StringType, I64Type, BoolType)>::ARITY, 3);
        assert_eq!(columns.type_names(), vec!["string", "long", "boolean"]);

        let values = ("x".to_string(), -5, true);
        let mut out = Vec::new();
        columns.write_values(&values, &mut out);
        let mut input = &out[..];
        assert_eq!(columns.read_values(&mut input).unwrap(), values);
        assert!(input.is_empty());
    }
}
