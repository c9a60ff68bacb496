use std::borrow::Cow;
use std::sync::Arc;

use crate::interface::Value;

/// Converts parameter values before they reach the statement.
///
/// Mappers are registered in order on the engine and consulted first match
/// wins; returning `None` passes the value on to the next mapper and finally
/// to the built-in conversion.
pub trait ValueMapper: Send + Sync {
    /// The value to put in the bind list instead of `value`.
    fn to_bind(&self, _value: &Value) -> Option<Value> {
        None
    }

    /// The text to embed instead of the default rendering of `value`.
    fn to_literal(&self, _value: &Value) -> Option<String> {
        None
    }
}

/// Binds and embeds booleans as `1` / `0`, for databases without a boolean type.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanAsInteger;

impl ValueMapper for BooleanAsInteger {
    fn to_bind(&self, value: &Value) -> Option<Value> {
        value.as_bool().map(|b| Value::Int(i64::from(b)))
    }

    fn to_literal(&self, value: &Value) -> Option<String> {
        value.as_bool().map(|b| if b { "1" } else { "0" }.to_owned())
    }
}

pub(crate) fn map_bind<'v>(mappers: &[Arc<dyn ValueMapper>], value: &'v Value) -> Cow<'v, Value> {
    mappers
        .iter()
        .find_map(|mapper| mapper.to_bind(value))
        .map_or(Cow::Borrowed(value), Cow::Owned)
}

pub(crate) fn map_literal(mappers: &[Arc<dyn ValueMapper>], value: &Value, quoted: bool) -> String {
    if let Some(text) = mappers.iter().find_map(|mapper| mapper.to_literal(value)) {
        return text;
    }
    if quoted {
        value.to_sql_literal()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl ValueMapper for Upper {
        fn to_bind(&self, value: &Value) -> Option<Value> {
            if let Value::String(s) = value {
                Some(Value::String(s.to_uppercase()))
            } else {
                None
            }
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_first_match_wins() {
        let mappers: Vec<Arc<dyn ValueMapper>> = vec![Arc::new(Upper), Arc::new(BooleanAsInteger)];
        assert_eq!(*map_bind(&mappers, &Value::from("abc")), Value::from("ABC"));
        assert_eq!(*map_bind(&mappers, &Value::from(true)), Value::Int(1));
        assert!(matches!(map_bind(&mappers, &Value::Int(3)), Cow::Borrowed(_)));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_literal_fallbacks() {
        let mappers: Vec<Arc<dyn ValueMapper>> = vec![Arc::new(BooleanAsInteger)];
        assert_eq!(map_literal(&mappers, &Value::from(false), true), "0");
        assert_eq!(map_literal(&mappers, &Value::from("it's"), true), "'it''s'");
        assert_eq!(map_literal(&mappers, &Value::from("name"), false), "name");
        assert_eq!(map_literal(&[], &Value::from(true), false), "true");
    }
}
