use std::collections::BTreeMap;
use std::rc::Rc;

use crate::entry::Entry;
use crate::error::{ArborError, Result};
use crate::kind::Kind;
use crate::schema::{Comparator, IntoSchema, Outcome, Schema, SchemaRef, structural_eq};
use crate::value::{Key, Value};

type Read = Rc<dyn Fn(&Value) -> Result<Value>>;

/// A value computed from the parent's value.
///
/// Direct writes are dropped unless [`Derived::with_write`] maps them onto a
/// write of the parent.
#[derive(Clone)]
pub struct Derived {
    read: Read,
    write: Option<Read>,
    eq: Comparator,
    members: BTreeMap<Key, SchemaRef>,
}

impl Derived {
    pub fn new(read: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        Self {
            read: Rc::new(read),
            write: None,
            eq: structural_eq(),
            members: BTreeMap::new(),
        }
    }

    /// `write` turns a proposed value into the value written to the parent.
    pub fn with_write(mut self, write: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        self.write = Some(Rc::new(write));
        self
    }

    pub fn with_eq(mut self, eq: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        self.eq = Rc::new(eq);
        self
    }

    /// Adds a child, typically another `Derived` reading from this one.
    pub fn with_member(mut self, key: impl Into<Key>, schema: impl IntoSchema) -> Self {
        self.members.insert(key.into(), schema.into_schema());
        self
    }
}

fn parent_of(entry: &Entry) -> Result<Entry> {
    entry.parent()?.ok_or_else(|| ArborError::Orphan {
        path: entry.path_string(),
    })
}

impl Schema for Derived {
    fn kind(&self) -> Kind {
        Kind::Narrowing
    }

    fn name(&self) -> &'static str {
        "derived"
    }

    fn compute(&self, entry: &Entry, current: Option<&Value>) -> Result<Outcome> {
        let source = parent_of(entry)?.get()?;
        let next = (self.read)(&source)?;
        match current {
            Some(current) if (self.eq)(current, &next) => Ok(Outcome::Keep),
            _ => Ok(Outcome::Value(next)),
        }
    }

    fn change(&self, entry: &Entry, proposed: Value, _previous: Option<&Value>) -> Result<Outcome> {
        match &self.write {
            Some(write) => {
                let upstream = write(&proposed)?;
                parent_of(entry)?.set(upstream)?;
            }
            None => log::debug!("ignoring write to derived entry `{}`", entry.path_string()),
        }
        Ok(Outcome::Keep)
    }

    fn member(&self, key: &Key) -> Option<SchemaRef> {
        self.members.get(key).cloned()
    }

    fn unset(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }
}
