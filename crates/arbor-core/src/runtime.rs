use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::config::EngineConfig;
use crate::entry::Entry;
use crate::error::{ArborError, Result};
use crate::kind::{Kind, Phase};
use crate::manager::Manager;
use crate::schema::{Mutations, SchemaRef};
use crate::scheduler::Scheduler;
use crate::value::{Key, Value, display_path};

slotmap::new_key_type! {
    /// Generational handle of an entry inside its root's arena.
    pub struct EntryId;
}

bitflags! {
    /// Membership of an entry in the manager's pending sets.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct Pending: u8 {
        const RECOMPUTE = 1;
        const NOTIFY = 1 << 1;
        const DESTROY = 1 << 2;
    }
}

impl Pending {
    pub(crate) fn of(phase: Phase) -> Self {
        match phase {
            Phase::Recompute => Pending::RECOMPUTE,
            Phase::Notify => Pending::NOTIFY,
            Phase::Destroy => Pending::DESTROY,
        }
    }
}

pub type Listener = Rc<dyn Fn(&Value, Option<&Value>, &Entry)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ListenerId(u64);

pub(crate) struct Node {
    pub schema: SchemaRef,
    pub kind: Kind,
    pub parent: Option<EntryId>,
    pub key: Option<Key>,
    pub value: Option<Value>,
    /// Value before the first change of the current batch; handed to listeners
    /// as the previous value.
    pub baseline: Option<Value>,
    pub listeners: SmallVec<[(ListenerId, Listener); 2]>,
    pub members: BTreeMap<Key, EntryId>,
    pub mutations: Option<Rc<Mutations>>,
    pub computing: bool,
    pub pending: Pending,
}

impl Node {
    pub(crate) fn new(schema: SchemaRef, parent: Option<EntryId>, key: Option<Key>) -> Self {
        Self {
            kind: schema.kind(),
            schema,
            parent,
            key,
            value: None,
            baseline: None,
            listeners: SmallVec::new(),
            members: BTreeMap::new(),
            mutations: None,
            computing: false,
            pending: Pending::empty(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Store {
    pub nodes: SlotMap<EntryId, Node>,
    next_listener: u64,
}

impl Store {
    pub(crate) fn node(&self, id: EntryId) -> Result<&Node> {
        self.nodes.get(id).ok_or(ArborError::Destroyed)
    }

    pub(crate) fn node_mut(&mut self, id: EntryId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(ArborError::Destroyed)
    }

    pub(crate) fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    pub(crate) fn path(&self, id: EntryId) -> Vec<Key> {
        let mut keys = Vec::new();
        let mut cursor = Some(id);
        while let Some(node) = cursor.and_then(|c| self.nodes.get(c)) {
            if let Some(key) = &node.key {
                keys.push(key.clone());
            }
            cursor = node.parent;
        }
        keys.reverse();
        keys
    }

    pub(crate) fn path_string(&self, id: EntryId) -> String {
        if self.nodes.contains_key(id) {
            display_path(&self.path(id))
        } else {
            "<destroyed>".to_string()
        }
    }

    /// Detaches `id` from its parent and frees it with every descendant.
    /// Returns the removed nodes so the caller can drop them outside the borrow.
    pub(crate) fn remove_subtree(&mut self, id: EntryId) -> Vec<Node> {
        let link = self
            .nodes
            .get(id)
            .and_then(|n| Some((n.parent?, n.key.clone()?)));
        if let Some((parent, key)) = link
            && let Some(parent) = self.nodes.get_mut(parent)
        {
            parent.members.remove(&key);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.members.values().copied());
                removed.push(node);
            }
        }
        removed
    }
}

/// Shared state behind every entry of one root: the arena plus its manager.
pub(crate) struct Runtime {
    pub store: RefCell<Store>,
    pub manager: Manager,
    pub config: EngineConfig,
    pub destroyed: Cell<bool>,
    pub this: Weak<Runtime>,
}

impl Runtime {
    pub(crate) fn new(
        schema: SchemaRef,
        scheduler: Box<dyn Scheduler>,
        config: EngineConfig,
    ) -> (Rc<Runtime>, EntryId) {
        let mut store = Store::default();
        let root = store.nodes.insert(Node::new(schema, None, None));
        let rt = Rc::new_cyclic(|this| Runtime {
            store: RefCell::new(store),
            manager: Manager::new(scheduler, config.max_iterations),
            config,
            destroyed: Cell::new(false),
            this: this.clone(),
        });
        (rt, root)
    }

    pub(crate) fn path_string(&self, id: EntryId) -> String {
        self.store.borrow().path_string(id)
    }

    /// Puts `id` into the pending set of `phase`. Returns `false` when it was
    /// already there; the baseline is only recorded on the first request.
    pub(crate) fn request(&self, id: EntryId, phase: Phase, baseline: Option<Value>) -> Result<bool> {
        if self.destroyed.get() {
            return Err(ArborError::Destroyed);
        }
        {
            let mut store = self.store.borrow_mut();
            let node = store.node_mut(id)?;
            let flag = Pending::of(phase);
            if node.pending.contains(flag) {
                return Ok(false);
            }
            node.pending.insert(flag);
            if phase == Phase::Notify {
                node.baseline = baseline;
            }
        }
        self.manager.enqueue(phase, id);
        self.manager.wake(&self.this)?;
        Ok(true)
    }

    /// Takes `id` out of the pending set of `phase`, if it is still there.
    pub(crate) fn claim(&self, id: EntryId, phase: Phase) -> bool {
        let mut store = self.store.borrow_mut();
        match store.nodes.get_mut(id) {
            Some(node) if node.pending.contains(Pending::of(phase)) => {
                node.pending.remove(Pending::of(phase));
                true
            }
            _ => false,
        }
    }

    pub(crate) fn take_baseline(&self, id: EntryId) -> Option<Value> {
        let mut store = self.store.borrow_mut();
        store.nodes.get_mut(id).and_then(|n| n.baseline.take())
    }

    pub(crate) fn clear_pending(&self) {
        let mut store = self.store.borrow_mut();
        for (_, node) in store.nodes.iter_mut() {
            node.pending = Pending::empty();
            node.baseline = None;
        }
    }

    pub(crate) fn teardown(&self) {
        self.destroyed.set(true);
        self.manager.shutdown();
        let nodes = std::mem::take(&mut self.store.borrow_mut().nodes);
        log::debug!("root destroyed, releasing {} entries", nodes.len());
        drop(nodes);
    }
}
