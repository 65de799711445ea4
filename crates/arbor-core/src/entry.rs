//! Live nodes of a state tree.
//!
//! An [`Entry`] is a cheap, cloneable handle (`Rc` of the root runtime plus a
//! generational arena key). All per-node state lives in the arena, so handles
//! can be copied freely; once garbage collection frees the slot, every
//! operation on a stale handle fails with [`ArborError::Destroyed`].
//!
//! No arena borrow is held while a schema or listener runs: schemas call back
//! into entries (`parent().get()`, `member(k).set(..)`) all the time.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::dispose::Dispose;
use crate::error::{ArborError, Result};
use crate::kind::{Kind, Phase};
use crate::runtime::{EntryId, Listener, ListenerId, Node, Runtime};
use crate::schema::{Mutations, Outcome, SchemaRef};
use crate::value::{Key, Value, display_path};

#[derive(Clone)]
pub struct Entry {
    rt: Rc<Runtime>,
    id: EntryId,
}

/// Non-owning entry handle, used by mutation closures and unsubscribe guards.
#[derive(Clone)]
pub struct WeakEntry {
    rt: Weak<Runtime>,
    id: EntryId,
}

impl WeakEntry {
    pub fn upgrade(&self) -> Result<Entry> {
        let rt = self.rt.upgrade().ok_or(ArborError::Destroyed)?;
        let entry = Entry { rt, id: self.id };
        entry.ensure_alive()?;
        Ok(entry)
    }
}

pub(crate) struct NotifyReport {
    pub called: bool,
    pub panics: u64,
}

/// Clears the re-entrancy flag on every exit path of a compute.
struct ComputeGuard<'a> {
    rt: &'a Runtime,
    id: EntryId,
}

impl<'a> ComputeGuard<'a> {
    fn acquire(rt: &'a Runtime, id: EntryId) -> Result<Self> {
        let mut store = rt.store.borrow_mut();
        let computing = store.node(id)?.computing;
        if computing {
            return Err(ArborError::RecursiveCompute {
                path: store.path_string(id),
            });
        }
        store.node_mut(id)?.computing = true;
        Ok(Self { rt, id })
    }
}

impl Drop for ComputeGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut store) = self.rt.store.try_borrow_mut()
            && let Some(node) = store.nodes.get_mut(self.id)
        {
            node.computing = false;
        }
    }
}

impl Entry {
    pub(crate) fn new(rt: Rc<Runtime>, id: EntryId) -> Self {
        Self { rt, id }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn downgrade(&self) -> WeakEntry {
        WeakEntry {
            rt: Rc::downgrade(&self.rt),
            id: self.id,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ArborError::Destroyed)
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.rt.destroyed.get() && self.rt.store.borrow().nodes.contains_key(self.id)
    }

    fn with_node<R>(&self, f: impl FnOnce(&Node) -> R) -> Result<R> {
        if self.rt.destroyed.get() {
            return Err(ArborError::Destroyed);
        }
        let store = self.rt.store.borrow();
        store.node(self.id).map(f)
    }

    fn with_node_mut<R>(&self, f: impl FnOnce(&mut Node) -> R) -> Result<R> {
        if self.rt.destroyed.get() {
            return Err(ArborError::Destroyed);
        }
        let mut store = self.rt.store.borrow_mut();
        store.node_mut(self.id).map(f)
    }

    fn sibling(&self, id: EntryId) -> Entry {
        Entry::new(self.rt.clone(), id)
    }

    pub fn kind(&self) -> Result<Kind> {
        self.with_node(|n| n.kind)
    }

    pub fn schema(&self) -> Result<SchemaRef> {
        self.with_node(|n| n.schema.clone())
    }

    pub fn key(&self) -> Result<Option<Key>> {
        self.with_node(|n| n.key.clone())
    }

    pub fn path(&self) -> Result<Vec<Key>> {
        self.ensure_alive()?;
        Ok(self.rt.store.borrow().path(self.id))
    }

    /// Dotted rendering of [`Entry::path`], `<destroyed>` for a dead handle.
    pub fn path_string(&self) -> String {
        self.rt.path_string(self.id)
    }

    pub fn parent(&self) -> Result<Option<Entry>> {
        Ok(self.with_node(|n| n.parent)?.map(|p| self.sibling(p)))
    }

    /// Children instantiated so far, in key order.
    pub fn children(&self) -> Result<Vec<(Key, Entry)>> {
        let members: Vec<(Key, EntryId)> = self.with_node(|n| {
            n.members
                .iter()
                .map(|(k, id)| (k.clone(), *id))
                .collect()
        })?;
        Ok(members
            .into_iter()
            .map(|(k, id)| (k, self.sibling(id)))
            .collect())
    }

    /// The cached value, without computing anything.
    pub fn peek(&self) -> Result<Option<Value>> {
        self.with_node(|n| n.value.clone())?
            .map(|v| v.detach())
            .transpose()
    }

    pub fn listener_count(&self) -> Result<usize> {
        self.with_node(|n| n.listeners.len())
    }

    pub fn default_value(&self) -> Result<Value> {
        self.schema()?.compute_default()
    }

    pub fn has_value(&self) -> Result<bool> {
        let (schema, current) = self.with_node(|n| (n.schema.clone(), n.value.clone()))?;
        schema.has_value(self, current.as_ref())
    }

    /// Whether any instantiated child holds a value.
    pub fn any_member_populated(&self) -> Result<bool> {
        for (_, child) in self.children()? {
            if child.has_value()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// No listeners, no populated children, no own value.
    pub fn is_empty(&self) -> Result<bool> {
        let (listening, schema, current, members) = self.with_node(|n| {
            (
                !n.listeners.is_empty(),
                n.schema.clone(),
                n.value.clone(),
                n.members.values().copied().collect::<SmallVec<[EntryId; 8]>>(),
            )
        })?;
        if listening {
            return Ok(false);
        }
        for child in members {
            if !self.sibling(child).is_empty()? {
                return Ok(false);
            }
        }
        Ok(!schema.has_value(self, current.as_ref())?)
    }

    pub fn mutations(&self) -> Result<Rc<Mutations>> {
        let (cached, schema) = self.with_node(|n| (n.mutations.clone(), n.schema.clone()))?;
        if let Some(m) = cached {
            return Ok(m);
        }
        let m = Rc::new(schema.mutations(self));
        self.with_node_mut(|n| n.mutations = Some(m.clone()))?;
        Ok(m)
    }

    pub fn mutate(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.mutations()?.call(name, args)
    }

    /// The child at `key`, created on first access and memoized afterwards.
    ///
    /// A new collectable child is queued for the destroy phase right away, so
    /// one that is only read is freed at the end of the batch.
    pub fn member(&self, key: impl Into<Key>) -> Result<Entry> {
        let key = key.into();
        let (existing, schema) =
            self.with_node(|n| (n.members.get(&key).copied(), n.schema.clone()))?;
        if let Some(id) = existing {
            return Ok(self.sibling(id));
        }
        let Some(child_schema) = schema.member(&key) else {
            return Err(ArborError::InvalidMember {
                path: self.path_string(),
                key: key.to_string(),
            });
        };

        let collectable = schema.is_collectable(&key);
        let mut store = self.rt.store.borrow_mut();
        store.node(self.id)?;
        let id = store
            .nodes
            .insert(Node::new(child_schema, Some(self.id), Some(key.clone())));
        store.node_mut(self.id)?.members.insert(key, id);
        drop(store);
        let child = self.sibling(id);
        if collectable {
            child.collect_if_empty()?;
        }
        Ok(child)
    }

    /// The current value, computed lazily.
    ///
    /// A Narrowing entry with a pending recompute pulls it now instead of
    /// returning the stale cache.
    pub fn get(&self) -> Result<Value> {
        let (kind, cached) = self.with_node(|n| (n.kind, n.value.clone()))?;
        if kind == Kind::Narrowing && self.rt.claim(self.id, Phase::Recompute) {
            self.recompute()?;
            if let Some(v) = self.with_node(|n| n.value.clone())? {
                return v.detach();
            }
        } else if let Some(v) = cached {
            return v.detach();
        }
        self.compute_fresh()
    }

    fn compute_fresh(&self) -> Result<Value> {
        let schema = self.schema()?;
        let guard = ComputeGuard::acquire(&self.rt, self.id)?;
        let outcome = schema.compute(self, None)?;
        drop(guard);
        match outcome {
            Outcome::Keep => Err(ArborError::KeepWithoutValue {
                path: self.path_string(),
            }),
            Outcome::Value(v) => {
                let stored = v.detach()?;
                self.with_node_mut(|n| n.value = Some(stored))?;
                Ok(v)
            }
        }
    }

    /// Writes through the schema's `change`.
    ///
    /// The value is detached first, so a cyclic graph fails with
    /// [`ArborError::CircularReference`] before anything is touched.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let (schema, current) = self.with_node(|n| (n.schema.clone(), n.value.clone()))?;
        let value = value.into().detach()?;
        match schema.change(self, value, current.as_ref())? {
            Outcome::Keep => Ok(()),
            Outcome::Value(accepted) => {
                let accepted = accepted.detach()?;
                self.with_node_mut(|n| n.value = Some(accepted))?;
                self.collect_if_empty()
            }
        }
    }

    /// Resets the entry to its unpopulated state; composites reset their
    /// instantiated children first so nested defaults apply bottom-up.
    pub fn unset(&self) -> Result<()> {
        let (schema, kind) = self.with_node(|n| (n.schema.clone(), n.kind))?;
        if kind == Kind::Widening {
            for (_, child) in self.children()? {
                child.unset()?;
            }
        }
        schema.unset(self)?;
        self.collect_if_empty()
    }

    /// Drops the cached value. For schema implementations.
    pub fn clear_cached(&self) -> Result<()> {
        self.with_node_mut(|n| n.value = None)
    }

    /// Caches an intermediate aggregate while `compute` is still running, so
    /// derived members that read this entry see it instead of recursing.
    /// Overwritten by the final result.
    pub fn cache_partial(&self, value: &Value) -> Result<()> {
        let value = value.detach()?;
        self.with_node_mut(|n| n.value = Some(value))
    }

    fn collect_if_empty(&self) -> Result<()> {
        if self.is_empty()? {
            self.rt.request(self.id, Phase::Destroy, None)?;
        }
        Ok(())
    }

    /// Marks the entry stale and schedules the follow-up work of its kind.
    ///
    /// Narrowing entries go to the recompute set and take all their children
    /// with them. Scalar and Widening entries go to the notify set, invalidate
    /// their parent and their Narrowing children; Widening entries also drop
    /// their cached aggregate.
    pub fn invalidate(&self) -> Result<()> {
        self.propagate(true)
    }

    fn propagate(&self, visit_children: bool) -> Result<()> {
        let (kind, parent, children) = {
            let store = self.rt.store.borrow();
            if self.rt.destroyed.get() {
                return Err(ArborError::Destroyed);
            }
            let node = store.node(self.id)?;
            let children: SmallVec<[EntryId; 8]> = node
                .members
                .values()
                .copied()
                .filter(|c| {
                    store
                        .nodes
                        .get(*c)
                        .is_some_and(|child| node.kind.visits_child(child.kind))
                })
                .collect();
            (node.kind, node.parent, children)
        };
        let rule = kind.propagation();

        let (baseline, had_cache) = self.with_node_mut(|n| {
            let had_cache = n.value.is_some();
            let baseline = if rule.clear_cache {
                n.value.take()
            } else {
                n.value.clone()
            };
            (baseline, had_cache)
        })?;
        let first = self.rt.request(self.id, rule.phase, baseline)?;

        // Already pending, and nobody has rebuilt the aggregate since: the
        // entries beyond it were reached by the first request.
        let propagate = match kind {
            Kind::Scalar => true,
            Kind::Widening => first || had_cache,
            Kind::Narrowing => first,
        };
        if !propagate {
            return Ok(());
        }
        if rule.to_parent
            && let Some(parent) = parent
        {
            self.sibling(parent).invalidate()?;
        }
        if visit_children {
            for child in children {
                self.sibling(child).invalidate()?;
            }
        }
        Ok(())
    }

    /// Recompute phase work for a Narrowing entry.
    pub(crate) fn recompute(&self) -> Result<()> {
        let (schema, current, listening) =
            self.with_node(|n| (n.schema.clone(), n.value.clone(), !n.listeners.is_empty()))?;
        if current.is_none() && !listening {
            // Never observed: the next `get` computes it.
            return Ok(());
        }

        let guard = ComputeGuard::acquire(&self.rt, self.id)?;
        let outcome = schema.compute(self, current.as_ref())?;
        drop(guard);

        let next = match outcome {
            Outcome::Keep if current.is_none() => {
                return Err(ArborError::KeepWithoutValue {
                    path: self.path_string(),
                });
            }
            Outcome::Keep => return Ok(()),
            Outcome::Value(v) => v,
        };
        if current.as_ref() == Some(&next) {
            return Ok(());
        }
        let stored = next.detach()?;
        self.with_node_mut(|n| n.value = Some(stored))?;
        self.rt.request(self.id, Phase::Notify, current)?;

        // The siblings were reached by the invalidation that got us here.
        if let Some(parent) = self.parent()?
            && parent.kind()? == Kind::Widening
            && parent.schema()?.aggregates_derived()
        {
            parent.propagate(false)?;
        }
        Ok(())
    }

    /// Notify phase work: hands `(new, previous)` to every listener.
    pub(crate) fn notify(&self, baseline: Option<Value>) -> Result<NotifyReport> {
        let listeners: SmallVec<[Listener; 4]> =
            self.with_node(|n| n.listeners.iter().map(|(_, l)| l.clone()).collect())?;
        let mut report = NotifyReport {
            called: false,
            panics: 0,
        };
        if listeners.is_empty() {
            return Ok(report);
        }

        let value = self.get()?;
        if baseline.as_ref() == Some(&value) {
            return Ok(report);
        }
        report.called = true;
        for listener in listeners {
            if !self.rt.config.contain_listener_panics {
                listener(&value, baseline.as_ref(), self);
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener(&value, baseline.as_ref(), self)
            }));
            if let Err(panic) = outcome {
                let message = if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "unknown panic".to_string()
                };
                log::warn!("listener of `{}` panicked: {message}", self.path_string());
                report.panics += 1;
            }
        }
        Ok(report)
    }

    /// Destroy phase work: frees empty collectable children, then walks up
    /// while this entry is empty. Returns the number of entries freed.
    pub(crate) fn garbage_collect(&self) -> Result<usize> {
        let schema = self.schema()?;
        let mut freed = 0;
        for (key, child) in self.children()? {
            if !schema.is_collectable(&key) || !child.is_empty()? {
                continue;
            }
            let removed = self.rt.store.borrow_mut().remove_subtree(child.id);
            log::debug!(
                "collected `{}` ({} entries)",
                display_path(&[self.path()?, vec![key]].concat()),
                removed.len()
            );
            freed += removed.len();
            drop(removed);
        }
        if self.is_empty()?
            && let Some(parent) = self.parent()?
        {
            freed += parent.garbage_collect()?;
        }
        Ok(freed)
    }

    /// Registers `listener` for the notify phase. It receives the new value,
    /// the value before the batch (`None` when it was never computed) and this
    /// entry. Run the returned guard to unsubscribe.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Value, Option<&Value>, &Entry) + 'static,
    ) -> Result<Dispose> {
        let lid = {
            if self.rt.destroyed.get() {
                return Err(ArborError::Destroyed);
            }
            let mut store = self.rt.store.borrow_mut();
            store.node(self.id)?;
            let lid = store.next_listener_id();
            let listener: Listener = Rc::new(listener);
            store.node_mut(self.id)?.listeners.push((lid, listener));
            lid
        };
        let weak = self.downgrade();
        Ok(Dispose::new(move || {
            let removed = weak.upgrade().and_then(|e| e.remove_listener(lid));
            if let Err(e) = removed {
                log::debug!("unsubscribe skipped: {e}");
            }
        }))
    }

    fn remove_listener(&self, lid: ListenerId) -> Result<()> {
        let removed = self.with_node_mut(|n| {
            n.listeners
                .iter()
                .position(|(id, _)| *id == lid)
                .map(|i| n.listeners.remove(i))
        })?;
        drop(removed);
        self.collect_if_empty()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.rt, &other.rt) && self.id == other.id
    }
}

impl Eq for Entry {}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({})", self.path_string())
    }
}
