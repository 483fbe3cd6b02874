//! Template context.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, json_kind};

/// String-keyed values handed to a template.
///
/// A context belongs to one request flow. Handlers build it, dispatchers and
/// views pass it to the renderer untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from any value that serializes to a map.
    ///
    /// ```rust
    /// use tsu_page::Context;
    ///
    /// #[derive(serde::Serialize)]
    /// struct Home { title: &'static str }
    ///
    /// let ctx = Context::from_serialize(&Home { title: "Home" }).unwrap();
    /// assert_eq!(ctx.get("title").unwrap(), "Home");
    /// ```
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        Self::try_from(serde_json::to_value(value)?)
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Like [`insert`](Self::insert) for values that need serde.
    pub fn insert_serialize<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), Error> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merges `other` into `self`. Keys present in both take `other`'s value.
    pub fn update(&mut self, other: Context) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Context {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::TypeMismatch { expected: "object", found: json_kind(&other) }),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_overwrites_existing_keys() {
        let mut ctx = Context::from_iter([("title", "Home"), ("lang", "en")]);
        ctx.update(Context::from_iter([("title", "About")]));
        assert_eq!(ctx.get("title"), Some(&json!("About")));
        assert_eq!(ctx.get("lang"), Some(&json!("en")));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = Context::from_serialize(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "object", found: "array" }));
    }

    #[test]
    fn insert_serialize_nests_structures() {
        #[derive(Serialize)]
        struct User {
            name: &'static str,
        }

        let mut ctx = Context::new();
        ctx.insert_serialize("user", &User { name: "alice" }).unwrap();
        assert_eq!(ctx.get("user"), Some(&json!({ "name": "alice" })));
    }

    #[test]
    fn serializes_as_a_plain_map() {
        let ctx = Context::from_iter([("n", 1)]);
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({ "n": 1 }));
    }
}
