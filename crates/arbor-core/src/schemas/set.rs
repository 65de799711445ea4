use std::rc::Rc;

use crate::entry::Entry;
use crate::error::Result;
use crate::kind::Kind;
use crate::schema::{Mutations, Outcome, Schema, SchemaRef, argument, bind};
use crate::schemas::Scalar;
use crate::value::{Key, Value, mismatch};

/// A set of text elements, each backed by a boolean presence member.
#[derive(Clone)]
pub struct Set {
    presence: SchemaRef,
}

impl Set {
    pub fn new() -> Self {
        Self {
            presence: Rc::new(Scalar::new(false)),
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

fn contains(entry: &Entry, key: &Key) -> Result<bool> {
    for (k, child) in entry.children()? {
        if &k == key {
            return child.has_value();
        }
    }
    Ok(false)
}

impl Schema for Set {
    fn kind(&self) -> Kind {
        Kind::Widening
    }

    fn name(&self) -> &'static str {
        "set"
    }

    fn compute(&self, entry: &Entry, _current: Option<&Value>) -> Result<Outcome> {
        let mut items = Vec::new();
        for (key, child) in entry.children()? {
            if child.has_value()? {
                items.push(key.to_value());
            }
        }
        Ok(Outcome::Value(Value::from(items)))
    }

    /// Adds every listed element; elements not listed stay.
    fn change(&self, entry: &Entry, proposed: Value, _previous: Option<&Value>) -> Result<Outcome> {
        let Value::List(_) = &proposed else {
            return Err(mismatch(&entry.path()?, "list", &proposed));
        };
        let keys = proposed
            .items()
            .iter()
            .map(Key::name_from_value)
            .collect::<Result<Vec<_>>>()?;
        for key in keys {
            entry.member(key)?.set(true)?;
        }
        Ok(Outcome::Keep)
    }

    fn compute_default(&self) -> Result<Value> {
        Ok(Value::empty_list())
    }

    fn member(&self, key: &Key) -> Option<SchemaRef> {
        key.as_name().map(|_| self.presence.clone())
    }

    fn is_collectable(&self, _key: &Key) -> bool {
        true
    }

    fn mutations(&self, entry: &Entry) -> Mutations {
        Mutations::new()
            .with(
                "add",
                bind(entry, |entry, args| {
                    let key = Key::name_from_value(argument(args, 0, "add")?)?;
                    let added = !contains(entry, &key)?;
                    entry.member(key)?.set(true)?;
                    Ok(Value::Bool(added))
                }),
            )
            .with(
                "delete",
                bind(entry, |entry, args| {
                    let key = Key::name_from_value(argument(args, 0, "delete")?)?;
                    if !contains(entry, &key)? {
                        return Ok(Value::Bool(false));
                    }
                    entry.member(key)?.unset()?;
                    Ok(Value::Bool(true))
                }),
            )
            .with(
                "has",
                bind(entry, |entry, args| {
                    let key = Key::name_from_value(argument(args, 0, "has")?)?;
                    Ok(Value::Bool(contains(entry, &key)?))
                }),
            )
            .with(
                "clear",
                bind(entry, |entry, _| {
                    for (_, child) in entry.children()? {
                        child.unset()?;
                    }
                    Ok(Value::Null)
                }),
            )
    }
}
