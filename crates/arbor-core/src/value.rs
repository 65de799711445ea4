//! Dynamic values carried by entries.
//!
//! Lists and objects are shared, interior-mutable containers (`Shared<T>`), so a
//! caller can assemble any graph of values, including one that refers back to
//! itself. The tree never stores such a graph directly: every value entering an
//! entry goes through [`Value::detach`], which deep-copies it and rejects cycles.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{ArborError, Result};

pub type Shared<T> = Rc<RefCell<T>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    List(Shared<Vec<Value>>),
    Object(Shared<BTreeMap<Rc<str>, Value>>),
}

impl Value {
    pub fn text(s: impl Into<Rc<str>>) -> Self {
        Value::Text(s.into())
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(Rc::new(RefCell::new(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    pub fn object<K: Into<Rc<str>>, V: Into<Value>>(
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Value::Object(Rc::new(RefCell::new(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )))
    }

    pub fn empty_list() -> Self {
        Value::list(std::iter::empty::<Value>())
    }

    pub fn empty_object() -> Self {
        Value::object(std::iter::empty::<(Rc<str>, Value)>())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Shallow copy of an object field.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(fields) => fields.borrow().get(name).cloned(),
            _ => None,
        }
    }

    pub fn number_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(|v| v.as_number())
    }

    /// Shallow copy of a list item.
    pub fn item(&self, index: usize) -> Option<Value> {
        match self {
            Value::List(items) => items.borrow().get(index).cloned(),
            _ => None,
        }
    }

    pub fn items(&self) -> Vec<Value> {
        match self {
            Value::List(items) => items.borrow().clone(),
            _ => Vec::new(),
        }
    }

    pub fn fields(&self) -> Vec<(Rc<str>, Value)> {
        match self {
            Value::Object(fields) => fields
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of list items or object fields; zero for everything else.
    pub fn len(&self) -> usize {
        match self {
            Value::List(items) => items.borrow().len(),
            Value::Object(fields) => fields.borrow().len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends to a list in place. Shared copies observe the change.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        match self {
            Value::List(items) => {
                items.borrow_mut().push(value.into());
                Ok(())
            }
            other => Err(mismatch(&[], "list", other)),
        }
    }

    /// Inserts an object field in place. Shared copies observe the change.
    pub fn insert(&self, name: impl Into<Rc<str>>, value: impl Into<Value>) -> Result<()> {
        match self {
            Value::Object(fields) => {
                fields.borrow_mut().insert(name.into(), value.into());
                Ok(())
            }
            other => Err(mismatch(&[], "object", other)),
        }
    }

    /// Deep copy that shares no container with `self`.
    ///
    /// Fails with [`ArborError::CircularReference`] naming the first path that
    /// leads back to one of its own ancestors. Containers reachable twice
    /// without a cycle (a DAG) are copied twice.
    pub fn detach(&self) -> Result<Value> {
        let mut ancestors = Vec::new();
        let mut path = Vec::new();
        self.detach_inner(&mut ancestors, &mut path)
    }

    fn detach_inner(&self, ancestors: &mut Vec<*const ()>, path: &mut Vec<Key>) -> Result<Value> {
        match self {
            Value::List(items) => {
                let ptr = Rc::as_ptr(items).cast::<()>();
                if ancestors.contains(&ptr) {
                    return Err(ArborError::CircularReference {
                        path: display_path(path),
                    });
                }
                ancestors.push(ptr);
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push(Key::Index(i));
                    out.push(item.detach_inner(ancestors, path)?);
                    path.pop();
                }
                ancestors.pop();
                Ok(Value::List(Rc::new(RefCell::new(out))))
            }
            Value::Object(fields) => {
                let ptr = Rc::as_ptr(fields).cast::<()>();
                if ancestors.contains(&ptr) {
                    return Err(ArborError::CircularReference {
                        path: display_path(path),
                    });
                }
                ancestors.push(ptr);
                let fields = fields.borrow();
                let mut out = BTreeMap::new();
                for (name, field) in fields.iter() {
                    path.push(Key::Name(name.clone()));
                    out.insert(name.clone(), field.detach_inner(ancestors, path)?);
                    path.pop();
                }
                ancestors.pop();
                Ok(Value::Object(Rc::new(RefCell::new(out))))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, ancestors: &mut Vec<*const ()>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Text(s) => write!(f, "{:?}", &**s),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items).cast::<()>();
                if ancestors.contains(&ptr) {
                    return f.write_str("<circular>");
                }
                ancestors.push(ptr);
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.render(f, ancestors)?;
                }
                ancestors.pop();
                f.write_str("]")
            }
            Value::Object(fields) => {
                let ptr = Rc::as_ptr(fields).cast::<()>();
                if ancestors.contains(&ptr) {
                    return f.write_str("<circular>");
                }
                ancestors.push(ptr);
                f.write_str("{")?;
                for (i, (name, field)) in fields.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: ")?;
                    field.render(f, ancestors)?;
                }
                ancestors.pop();
                f.write_str("}")
            }
        }
    }
}

/// Structural equality, with `NaN` equal to itself. Comparing two distinct
/// cyclic graphs does not terminate; values stored in a tree are always
/// acyclic.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &mut Vec::new())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A member position: an object field, map key or set element name, or an
/// array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Index(usize),
    Name(Rc<str>),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(n) => Some(n),
            Key::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(_) => None,
        }
    }

    /// Map keys and set elements are named by text; numbers are accepted and
    /// stringified.
    pub fn name_from_value(value: &Value) -> Result<Key> {
        match value {
            Value::Text(s) => Ok(Key::Name(s.clone())),
            Value::Number(_) => Ok(Key::Name(value.to_string().into())),
            other => Err(mismatch(&[], "text", other)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Index(i) => Value::from(*i),
            Key::Name(n) => Value::Text(n.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(n) => f.write_str(n),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Key::Name(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

/// Renders `a.b[2].c`; the empty path is `$`.
pub fn display_path(keys: &[Key]) -> String {
    if keys.is_empty() {
        return "$".to_string();
    }
    let mut out = String::new();
    for key in keys {
        match key {
            Key::Index(i) => out.push_str(&format!("[{i}]")),
            Key::Name(n) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(n);
            }
        }
    }
    out
}

pub(crate) fn mismatch(path: &[Key], expected: &'static str, found: &Value) -> ArborError {
    ArborError::TypeMismatch {
        path: display_path(path),
        expected,
        found: found.type_name(),
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Serialize, Serializer};

    use super::{Key, Value};

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Null => serializer.serialize_unit(),
                Value::Bool(b) => serializer.serialize_bool(*b),
                Value::Number(n) => serializer.serialize_f64(*n),
                Value::Text(s) => serializer.serialize_str(s),
                Value::List(items) => {
                    let items = items.borrow();
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items.iter() {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Value::Object(fields) => {
                    let fields = fields.borrow();
                    let mut map = serializer.serialize_map(Some(fields.len()))?;
                    for (name, field) in fields.iter() {
                        map.serialize_entry(&**name, field)?;
                    }
                    map.end()
                }
            }
        }
    }

    impl Serialize for Key {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Key::Index(i) => serializer.serialize_u64(*i as u64),
                Key::Name(n) => serializer.serialize_str(n),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_copies_containers() {
        let inner = Value::list([1, 2]);
        let outer = Value::object([("items", inner.clone())]);
        let copy = outer.detach().unwrap();
        assert_eq!(copy, outer);

        inner.push(3).unwrap();
        assert_eq!(copy.field("items").unwrap().len(), 2);
        assert_eq!(outer.field("items").unwrap().len(), 3);
    }

    #[test]
    fn detach_rejects_cycles_with_path() {
        let node = Value::object([("name", "root")]);
        let children = Value::empty_list();
        node.insert("children", children.clone()).unwrap();
        children.push(node.clone()).unwrap();

        let err = node.detach().unwrap_err();
        assert_eq!(
            err,
            ArborError::CircularReference {
                path: "children[0]".into()
            }
        );
        // Rendering stays finite.
        assert_eq!(node.to_string(), "{children: [<circular>], name: \"root\"}");
    }

    #[test]
    fn shared_but_acyclic_is_fine() {
        let shared = Value::list([1]);
        let v = Value::object([("a", shared.clone()), ("b", shared)]);
        assert!(v.detach().is_ok());
    }

    #[test]
    fn paths_render() {
        let path = [Key::from("todos"), Key::from(2usize), Key::from("done")];
        assert_eq!(display_path(&path), "todos[2].done");
        assert_eq!(display_path(&[]), "$");
    }
}
