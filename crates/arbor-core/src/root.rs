use std::ops::Deref;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::entry::Entry;
use crate::manager::{BatchStats, Manager};
use crate::runtime::Runtime;
use crate::schema::IntoSchema;
use crate::scheduler::Scheduler;

/// Owner of a state tree. Dereferences to the root [`Entry`].
///
/// Dropping the `Root` does not tear the tree down while entry handles are
/// still around; call [`Root::destroy`] for that.
pub struct Root {
    entry: Entry,
    rt: Rc<Runtime>,
}

impl Root {
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Cancels the scheduled drain, frees every entry and makes all handles of
    /// this tree fail with `Destroyed`.
    pub fn destroy(&self) {
        if !self.rt.destroyed.get() {
            self.rt.teardown();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.rt.destroyed.get()
    }

    pub fn stats(&self) -> BatchStats {
        self.rt.manager.stats()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.rt.config
    }

    pub fn manager(&self) -> &Manager {
        &self.rt.manager
    }
}

impl Deref for Root {
    type Target = Entry;

    fn deref(&self) -> &Entry {
        &self.entry
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("destroyed", &self.is_destroyed())
            .field("state", &self.rt.manager.state())
            .finish()
    }
}

/// Instantiates `schema` as the root of a new tree with the default
/// [`EngineConfig`].
pub fn create_root(schema: impl IntoSchema, scheduler: impl Scheduler) -> Root {
    create_root_with(schema, scheduler, EngineConfig::default())
}

pub fn create_root_with(
    schema: impl IntoSchema,
    scheduler: impl Scheduler,
    config: EngineConfig,
) -> Root {
    let schema = schema.into_schema();
    log::debug!("creating {} root", schema.name());
    let (rt, id) = Runtime::new(schema, Box::new(scheduler), config);
    Root {
        entry: Entry::new(rt.clone(), id),
        rt,
    }
}
