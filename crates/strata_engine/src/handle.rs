//! Loader handles: per-accessor views onto the engine's namespace.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use strata_load::{LayerStack, TopCache, UnitReleaser};

/// One accessor's view: a freshly chained clone of a layer-stack snapshot
/// plus an optional on-demand cache above it.
#[derive(Debug)]
pub(crate) struct HandleView {
    pub(crate) stack: LayerStack,
    pub(crate) top: Option<TopCache>,
}

#[derive(Debug)]
pub(crate) struct HandleCore {
    pub(crate) engine_id: u64,
    pub(crate) number: u64,
    pub(crate) attached: bool,
    pub(crate) releaser: Arc<dyn UnitReleaser>,
    view: RwLock<Arc<HandleView>>,
}

impl HandleCore {
    pub(crate) fn new(
        engine_id: u64,
        number: u64,
        attached: bool,
        releaser: Arc<dyn UnitReleaser>,
        view: HandleView,
    ) -> Self {
        Self {
            engine_id,
            number,
            attached,
            releaser,
            view: RwLock::new(Arc::new(view)),
        }
    }

    /// The current view. Callers resolve against the returned `Arc`
    /// without holding any lock, so a concurrent re-point never disturbs
    /// an in-flight resolution.
    pub(crate) fn view(&self) -> Arc<HandleView> {
        Arc::clone(&self.view.read().unwrap())
    }

    /// Re-points an attached handle at a new snapshot's view.
    pub(crate) fn replace_view(&self, view: HandleView) {
        *self.view.write().unwrap() = Arc::new(view);
    }
}

/// An opaque, engine-scoped token identifying one accessor's view.
///
/// Handles are equal when their issuing engine and sequence number are
/// equal. An attached handle is re-pointed at every newly installed
/// snapshot; a detached handle keeps the snapshot it was created against
/// forever. Disposing a handle releases everything its own view defined
/// and nothing else; using a disposed handle afterward is undefined.
#[derive(Debug, Clone)]
pub struct Handle {
    core: Arc<HandleCore>,
}

impl Handle {
    pub(crate) fn from_core(core: Arc<HandleCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &HandleCore {
        &self.core
    }

    /// The handle's sequence number within its issuing engine.
    pub fn number(&self) -> u64 {
        self.core.number
    }

    /// Whether this handle tracks newly installed snapshots.
    pub fn is_attached(&self) -> bool {
        self.core.attached
    }

    /// Releases every unit this handle's own view defined.
    ///
    /// The releaser runs once per ever-defined unit; individual failures
    /// are swallowed. Units defined through other handles, including ones
    /// sharing the same compiled layers, are untouched.
    pub fn dispose(&self) {
        let view = self.core.view();
        view.stack.dispose(self.core.releaser.as_ref());
        if let Some(top) = &view.top {
            top.dispose(self.core.releaser.as_ref());
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.core.engine_id == other.core.engine_id && self.core.number == other.core.number
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.engine_id.hash(state);
        self.core.number.hash(state);
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handle[engine={}, number={}, attached={}]",
            self.core.engine_id, self.core.number, self.core.attached
        )
    }
}
