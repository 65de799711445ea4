use std::collections::BTreeMap;
use std::rc::Rc;

use crate::entry::Entry;
use crate::error::Result;
use crate::kind::Kind;
use crate::schema::{IntoSchema, Mutations, Outcome, Schema, SchemaRef, bind};
use crate::value::{Key, Value};

type EntryOp = Rc<dyn Fn(&Entry, &[Value]) -> Result<Value>>;

/// A base schema with extra members and mutations layered on top.
///
/// Everything not overridden is delegated to the base. Added members take
/// precedence over the base's member of the same key and are never
/// collected. They are not part of the base's aggregate. Added mutations
/// replace base mutations of the same name.
#[derive(Clone)]
pub struct Extended {
    base: SchemaRef,
    members: BTreeMap<Key, SchemaRef>,
    mutations: Vec<(&'static str, EntryOp)>,
    name: Option<&'static str>,
}

impl Extended {
    pub fn new(base: impl IntoSchema) -> Self {
        Self {
            base: base.into_schema(),
            members: BTreeMap::new(),
            mutations: Vec::new(),
            name: None,
        }
    }

    pub fn member(mut self, key: impl Into<Key>, schema: impl IntoSchema) -> Self {
        self.members.insert(key.into(), schema.into_schema());
        self
    }

    /// Adds a mutation; `op` receives the entry it is bound to.
    pub fn mutation(
        mut self,
        name: &'static str,
        op: impl Fn(&Entry, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.mutations.push((name, Rc::new(op)));
        self
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }
}

impl Schema for Extended {
    fn kind(&self) -> Kind {
        self.base.kind()
    }

    fn name(&self) -> &'static str {
        self.name.unwrap_or_else(|| self.base.name())
    }

    fn compute(&self, entry: &Entry, current: Option<&Value>) -> Result<Outcome> {
        self.base.compute(entry, current)
    }

    fn change(&self, entry: &Entry, proposed: Value, previous: Option<&Value>) -> Result<Outcome> {
        self.base.change(entry, proposed, previous)
    }

    fn compute_default(&self) -> Result<Value> {
        self.base.compute_default()
    }

    fn member(&self, key: &Key) -> Option<SchemaRef> {
        self.members
            .get(key)
            .cloned()
            .or_else(|| self.base.member(key))
    }

    fn is_collectable(&self, key: &Key) -> bool {
        !self.members.contains_key(key) && self.base.is_collectable(key)
    }

    fn aggregates_derived(&self) -> bool {
        self.base.aggregates_derived()
    }

    fn mutations(&self, entry: &Entry) -> Mutations {
        let mut mutations = self.base.mutations(entry);
        for (name, op) in &self.mutations {
            let op = op.clone();
            mutations.insert(*name, Rc::new(bind(entry, move |e, args| op(e, args))));
        }
        mutations
    }

    fn has_value(&self, entry: &Entry, current: Option<&Value>) -> Result<bool> {
        self.base.has_value(entry, current)
    }

    fn unset(&self, entry: &Entry) -> Result<()> {
        self.base.unset(entry)
    }
}
