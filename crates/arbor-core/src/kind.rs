/// How a schema's value relates to the rest of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    /// Leaf that stores its own value.
    Scalar,
    /// Derived from the parent's value; stores nothing of its own.
    Narrowing,
    /// Assembled from children; writes fan out to them.
    Widening,
}

/// Which pending set an invalidated entry is requested into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Recompute,
    Notify,
    Destroy,
}

/// Children visited when an entry is invalidated for the first time in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildScope {
    All,
    NarrowingOnly,
}

/// The invalidation rule of one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Propagation {
    pub phase: Phase,
    pub clear_cache: bool,
    pub to_parent: bool,
    pub children: ChildScope,
}

impl Kind {
    pub const fn propagation(self) -> Propagation {
        match self {
            // Its children read from it, so every one of them is stale.
            Kind::Narrowing => Propagation {
                phase: Phase::Recompute,
                clear_cache: false,
                to_parent: false,
                children: ChildScope::All,
            },
            Kind::Scalar => Propagation {
                phase: Phase::Notify,
                clear_cache: false,
                to_parent: true,
                children: ChildScope::NarrowingOnly,
            },
            Kind::Widening => Propagation {
                phase: Phase::Notify,
                clear_cache: true,
                to_parent: true,
                children: ChildScope::NarrowingOnly,
            },
        }
    }

    pub fn visits_child(self, child: Kind) -> bool {
        match self.propagation().children {
            ChildScope::All => true,
            ChildScope::NarrowingOnly => child == Kind::Narrowing,
        }
    }
}
