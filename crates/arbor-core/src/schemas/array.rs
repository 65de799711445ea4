use std::rc::Rc;

use crate::entry::Entry;
use crate::error::Result;
use crate::kind::Kind;
use crate::schema::{IntoSchema, Mutations, Outcome, Schema, SchemaRef, argument, bind};
use crate::schemas::Scalar;
use crate::value::{Key, Value, mismatch};

const LENGTH: &str = "length";

/// A list of elements sharing one schema, with its length stored in the
/// `length` member.
///
/// Elements past `length` are unset when the array shrinks. Mutations:
/// `push(value) -> length`, `pop() -> value | null`, `clear()`.
#[derive(Clone)]
pub struct Array {
    element: SchemaRef,
    length: SchemaRef,
}

impl Array {
    pub fn new(element: impl IntoSchema) -> Self {
        Self {
            element: element.into_schema(),
            length: Rc::new(Scalar::new(0).with_validate(check_length)),
        }
    }
}

/// Lengths are whole numbers that fit a `u32`.
fn check_length(value: &Value) -> std::result::Result<(), String> {
    match value.as_number() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(()),
        _ => Err(format!("{value} is not a valid length")),
    }
}

fn length_of(entry: &Entry) -> Result<usize> {
    let n = entry.member(LENGTH)?.get()?.as_number().unwrap_or(0.0);
    Ok(n as usize)
}

/// Sets the length and unsets cached elements beyond it.
fn truncate(entry: &Entry, len: usize) -> Result<()> {
    entry.member(LENGTH)?.set(len)?;
    for (key, child) in entry.children()? {
        if key.as_index().is_some_and(|i| i >= len) {
            child.unset()?;
        }
    }
    Ok(())
}

impl Schema for Array {
    fn kind(&self) -> Kind {
        Kind::Widening
    }

    fn name(&self) -> &'static str {
        "array"
    }

    fn compute(&self, entry: &Entry, _current: Option<&Value>) -> Result<Outcome> {
        let len = length_of(entry)?;
        let mut items = Vec::new();
        for i in 0..len {
            items.push(entry.member(i)?.get()?);
        }
        Ok(Outcome::Value(Value::from(items)))
    }

    /// Replaces the whole list.
    fn change(&self, entry: &Entry, proposed: Value, _previous: Option<&Value>) -> Result<Outcome> {
        let Value::List(_) = &proposed else {
            return Err(mismatch(&entry.path()?, "list", &proposed));
        };
        let items = proposed.items();
        for (i, item) in items.iter().enumerate() {
            entry.member(i)?.set(item.clone())?;
        }
        truncate(entry, items.len())?;
        Ok(Outcome::Keep)
    }

    fn compute_default(&self) -> Result<Value> {
        Ok(Value::empty_list())
    }

    fn member(&self, key: &Key) -> Option<SchemaRef> {
        match key {
            Key::Index(_) => Some(self.element.clone()),
            Key::Name(n) if &**n == LENGTH => Some(self.length.clone()),
            Key::Name(_) => None,
        }
    }

    fn is_collectable(&self, key: &Key) -> bool {
        key.as_index().is_some()
    }

    fn mutations(&self, entry: &Entry) -> Mutations {
        Mutations::new()
            .with(
                "push",
                bind(entry, |entry, args| {
                    let value = argument(args, 0, "push")?;
                    let len = length_of(entry)?;
                    entry.member(len)?.set(value.clone())?;
                    entry.member(LENGTH)?.set(len + 1)?;
                    Ok(Value::from(len + 1))
                }),
            )
            .with(
                "pop",
                bind(entry, |entry, _| {
                    let len = length_of(entry)?;
                    if len == 0 {
                        return Ok(Value::Null);
                    }
                    let last = entry.member(len - 1)?;
                    let value = last.get()?;
                    truncate(entry, len - 1)?;
                    Ok(value)
                }),
            )
            .with(
                "clear",
                bind(entry, |entry, _| {
                    truncate(entry, 0)?;
                    Ok(Value::Null)
                }),
            )
    }
}
