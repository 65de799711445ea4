use std::rc::Rc;

use crate::entry::Entry;
use crate::error::Result;
use crate::kind::Kind;
use crate::schema::{Outcome, Schema};
use crate::value::Value;

/// A value owned by something outside the tree, read and written through a
/// getter/setter pair.
///
/// The tree cannot see external changes; call [`Entry::invalidate`] when the
/// source changes so the next drain re-reads it.
#[derive(Clone)]
pub struct Synced {
    read: Rc<dyn Fn() -> Result<Value>>,
    write: Rc<dyn Fn(Value) -> Result<()>>,
}

impl Synced {
    pub fn new(
        read: impl Fn() -> Result<Value> + 'static,
        write: impl Fn(Value) -> Result<()> + 'static,
    ) -> Self {
        Self {
            read: Rc::new(read),
            write: Rc::new(write),
        }
    }
}

impl Schema for Synced {
    fn kind(&self) -> Kind {
        Kind::Narrowing
    }

    fn name(&self) -> &'static str {
        "synced"
    }

    fn compute(&self, _entry: &Entry, current: Option<&Value>) -> Result<Outcome> {
        let next = (self.read)()?;
        if current == Some(&next) {
            return Ok(Outcome::Keep);
        }
        Ok(Outcome::Value(next))
    }

    fn change(&self, entry: &Entry, proposed: Value, _previous: Option<&Value>) -> Result<Outcome> {
        (self.write)(proposed)?;
        entry.invalidate()?;
        Ok(Outcome::Keep)
    }

    fn unset(&self, entry: &Entry) -> Result<()> {
        entry.clear_cached()
    }
}
