use std::collections::{BTreeMap, HashMap};

/// A parameter value, as supplied by the caller and as carried in the bind list.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Null
            | Self::Int(_)
            | Self::Float(_)
            | Self::String(_)
            | Self::List(_)
            | Self::Map(_) => None,
        }
    }

    /// The value as a SQL literal: strings are single-quoted with embedded
    /// quotes doubled, lists become comma separated literals.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::List(items) => items
                .iter()
                .map(Self::to_sql_literal)
                .collect::<Vec<_>>()
                .join(", "),
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Map(_) => {
                self.to_string()
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

/// Read access to the parameters of a single transform.
///
/// `has_value` must distinguish "no entry" from "entry holding [`Value::Null`]":
/// a null entry binds a null, a missing entry is an error.
pub trait VariableLookup {
    fn has_value(&self, name: &str) -> bool;

    fn get_value(&self, name: &str) -> Option<&Value>;

    /// Resolves a dotted path such as `user.address.city` through nested maps
    /// (and numeric list indices).
    ///
    /// Returns `Ok(None)` when any step is absent or null, and an error when a
    /// step tries to look inside a scalar.
    fn get_path(&self, path: &str) -> Result<Option<&Value>, String> {
        let mut segments = path.split('.');
        let Some(head) = segments.next() else {
            return Ok(None);
        };
        let mut current = match self.get_value(head) {
            Some(value) => value,
            None => return Ok(None),
        };

        for segment in segments {
            current = match current {
                Value::Null => return Ok(None),
                Value::Map(map) => match map.get(segment) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                Value::List(items) => {
                    let index: usize = segment.parse().map_err(|_| {
                        format!("'{segment}' is not a valid index into a list")
                    })?;
                    match items.get(index) {
                        Some(value) => value,
                        None => return Ok(None),
                    }
                }
                Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {
                    return Err(format!(
                        "cannot read property '{segment}' of a {}",
                        current.type_name()
                    ));
                }
            };
        }

        Ok(Some(current))
    }
}

impl<L: VariableLookup + ?Sized> VariableLookup for &L {
    fn has_value(&self, name: &str) -> bool {
        (**self).has_value(name)
    }

    fn get_value(&self, name: &str) -> Option<&Value> {
        (**self).get_value(name)
    }
}

impl VariableLookup for BTreeMap<String, Value> {
    fn has_value(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl<S: std::hash::BuildHasher> VariableLookup for HashMap<String, Value, S> {
    fn has_value(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// The stock parameter set handed to a transform.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    data: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.data.insert(name.as_ref().to_owned(), value.into());
        self
    }

    pub fn remove<N: AsRef<str>>(&mut self, name: N) -> Option<Value> {
        self.data.remove(name.as_ref())
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.data.contains_key(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl VariableLookup for Context {
    fn has_value(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Context {
        let mut address = BTreeMap::new();
        address.insert("city".to_owned(), Value::from("Kyoto"));
        let mut user = BTreeMap::new();
        user.insert("address".to_owned(), Value::Map(address));
        user.insert("nickname".to_owned(), Value::Null);
        user.insert("tags".to_owned(), Value::from(vec!["a", "b"]));

        let mut context = Context::new();
        context.insert("user", Value::Map(user)).insert("age", 30);
        context
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_null_entry_is_present() {
        let mut context = Context::new();
        context.insert("id", Value::Null);
        assert!(context.has_value("id"));
        assert!(!context.has_value("name"));
        assert_eq!(context.get_value("id"), Some(&Value::Null));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_get_path_through_maps() {
        let context = nested();
        assert_eq!(
            context.get_path("user.address.city"),
            Ok(Some(&Value::from("Kyoto")))
        );
        assert_eq!(context.get_path("user.tags.1"), Ok(Some(&Value::from("b"))));
        assert_eq!(context.get_path("user.missing"), Ok(None));
        assert_eq!(context.get_path("user.nickname.first"), Ok(None));
        assert_eq!(context.get_path("nobody.name"), Ok(None));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_get_path_into_scalar_fails() {
        let context = nested();
        let err = context.get_path("age.years").unwrap_err();
        assert!(err.contains("integer"), "unexpected message: {err}");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sql_literal() {
        assert_eq!(Value::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(Value::from(vec![1, 2]).to_sql_literal(), "1, 2");
        assert_eq!(Value::from(vec!["x", "y"]).to_sql_literal(), "'x', 'y'");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }
}
