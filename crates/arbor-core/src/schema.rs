//! The contract between entries and the behaviour they are instantiated from.
//!
//! A [`Schema`] is immutable and shared by every entry created from it. It owns
//! no state; whatever it needs to remember lives in the entry it is handed.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::entry::Entry;
use crate::error::{ArborError, Result};
use crate::kind::Kind;
use crate::value::{Key, Value};

/// Result of [`Schema::compute`] and [`Schema::change`].
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Leave the cached value as it is.
    Keep,
    Value(Value),
}

pub type SchemaRef = Rc<dyn Schema>;

pub type Comparator = Rc<dyn Fn(&Value, &Value) -> bool>;

pub(crate) fn structural_eq() -> Comparator {
    Rc::new(|a: &Value, b: &Value| a == b)
}

pub trait Schema: 'static {
    fn kind(&self) -> Kind;

    /// Short label for logs and devtools.
    fn name(&self) -> &'static str;

    /// Produces the entry's value. Must return a value when `current` is `None`.
    fn compute(&self, entry: &Entry, current: Option<&Value>) -> Result<Outcome>;

    /// Accepts, transforms or rejects (`Keep`) a write. Schemas that want the
    /// write to propagate call [`Entry::invalidate`] here.
    fn change(&self, entry: &Entry, proposed: Value, previous: Option<&Value>) -> Result<Outcome>;

    fn compute_default(&self) -> Result<Value> {
        Err(ArborError::NotImplemented("compute_default"))
    }

    /// Schema of the child at `key`, or `None` when there is no such member.
    fn member(&self, _key: &Key) -> Option<SchemaRef> {
        None
    }

    /// Whether an empty child at `key` may be garbage-collected.
    fn is_collectable(&self, _key: &Key) -> bool {
        false
    }

    /// Whether the aggregate includes Narrowing members, so their changes must
    /// invalidate it.
    fn aggregates_derived(&self) -> bool {
        false
    }

    fn mutations(&self, _entry: &Entry) -> Mutations {
        Mutations::default()
    }

    fn has_value(&self, entry: &Entry, _current: Option<&Value>) -> Result<bool> {
        match self.kind() {
            Kind::Widening => entry.any_member_populated(),
            Kind::Scalar | Kind::Narrowing => Ok(false),
        }
    }

    fn unset(&self, entry: &Entry) -> Result<()> {
        entry.invalidate()
    }
}

/// Anything that can be turned into a shared schema.
pub trait IntoSchema {
    fn into_schema(self) -> SchemaRef;
}

impl<S: Schema> IntoSchema for S {
    fn into_schema(self) -> SchemaRef {
        Rc::new(self)
    }
}

impl IntoSchema for SchemaRef {
    fn into_schema(self) -> SchemaRef {
        self
    }
}

pub type Mutation = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// Named imperative operations bound to one entry. Frozen once the entry has
/// cached them.
#[derive(Clone, Default)]
pub struct Mutations {
    ops: BTreeMap<&'static str, Mutation>,
}

impl Mutations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: &'static str,
        op: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.ops.insert(name, Rc::new(op));
        self
    }

    pub(crate) fn insert(&mut self, name: &'static str, op: Mutation) {
        self.ops.insert(name, op);
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let op = self
            .ops
            .get(name)
            .ok_or_else(|| ArborError::UnknownMutation(name.to_string()))?;
        op(args)
    }

    pub fn get(&self, name: &str) -> Option<&Mutation> {
        self.ops.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Debug for Mutations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ops.keys()).finish()
    }
}

/// Binds `op` to a weak handle of `entry`, so the mutation bag does not keep
/// the tree alive and fails with `Destroyed` once the entry is gone.
pub fn bind(
    entry: &Entry,
    op: impl Fn(&Entry, &[Value]) -> Result<Value> + 'static,
) -> impl Fn(&[Value]) -> Result<Value> + 'static {
    let weak = entry.downgrade();
    move |args| {
        let entry = weak.upgrade()?;
        op(&entry, args)
    }
}

pub fn argument<'a>(args: &'a [Value], index: usize, mutation: &'static str) -> Result<&'a Value> {
    args.get(index)
        .ok_or(ArborError::MissingArgument { mutation, index })
}
