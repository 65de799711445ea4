use std::rc::Rc;

use crate::entry::Entry;
use crate::error::{ArborError, Result};
use crate::kind::Kind;
use crate::schema::{IntoSchema, Outcome, Schema, SchemaRef};
use crate::value::{Key, Value, mismatch};

/// A fixed set of named members.
///
/// The aggregate holds every stored member. Derived members are left out
/// unless [`Object::including_derived`] is set, in which case their changes
/// also invalidate the aggregate.
#[derive(Clone, Default)]
pub struct Object {
    members: Vec<(Rc<str>, SchemaRef)>,
    include_derived: bool,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the member `name`.
    pub fn member(mut self, name: impl Into<Rc<str>>, schema: impl IntoSchema) -> Self {
        let name = name.into();
        let schema = schema.into_schema();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = schema,
            None => self.members.push((name, schema)),
        }
        self
    }

    pub fn including_derived(mut self) -> Self {
        self.include_derived = true;
        self
    }

    fn lookup(&self, name: &str) -> Option<&SchemaRef> {
        self.members
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, s)| s)
    }

    fn stored(&self) -> impl Iterator<Item = &(Rc<str>, SchemaRef)> {
        self.members
            .iter()
            .filter(|(_, s)| s.kind() != Kind::Narrowing)
    }
}

impl Schema for Object {
    fn kind(&self) -> Kind {
        Kind::Widening
    }

    fn name(&self) -> &'static str {
        "object"
    }

    fn compute(&self, entry: &Entry, _current: Option<&Value>) -> Result<Outcome> {
        let out = Value::empty_object();
        for (name, _) in self.stored() {
            out.insert(name.clone(), entry.member(name.clone())?.get()?)?;
        }
        if !self.include_derived {
            return Ok(Outcome::Value(out));
        }

        entry.cache_partial(&out)?;
        for (name, _) in self.members.iter().filter(|(_, s)| s.kind() == Kind::Narrowing) {
            let value = entry.member(name.clone()).and_then(|m| m.get());
            match value {
                Ok(v) => out.insert(name.clone(), v)?,
                Err(e) => {
                    entry.clear_cached()?;
                    return Err(e);
                }
            }
        }
        Ok(Outcome::Value(out))
    }

    /// Writes each field to its member; fields not named keep their value.
    fn change(&self, entry: &Entry, proposed: Value, _previous: Option<&Value>) -> Result<Outcome> {
        let Value::Object(_) = &proposed else {
            return Err(mismatch(&entry.path()?, "object", &proposed));
        };
        let fields = proposed.fields();
        // Validate everything before the first member is touched.
        if let Some((name, _)) = fields.iter().find(|(n, _)| self.lookup(n).is_none()) {
            return Err(ArborError::InvalidMember {
                path: entry.path_string(),
                key: name.to_string(),
            });
        }
        for (name, value) in fields {
            entry.member(name)?.set(value)?;
        }
        Ok(Outcome::Keep)
    }

    fn compute_default(&self) -> Result<Value> {
        let out = Value::empty_object();
        for (name, schema) in self.stored() {
            out.insert(name.clone(), schema.compute_default()?)?;
        }
        Ok(out)
    }

    fn member(&self, key: &Key) -> Option<SchemaRef> {
        self.lookup(key.as_name()?).cloned()
    }

    fn aggregates_derived(&self) -> bool {
        self.include_derived
    }
}
