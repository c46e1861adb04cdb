//! The define-once, policy-driven name resolver.

use crate::base::BaseResolver;
use crate::error::LoadError;
use crate::policy::ResolvePolicy;
use crate::unit::{Unit, UnitReleaser};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_code::{ArtifactSet, Source};

/// What a scope delegates to when a name is not its own.
#[derive(Debug, Clone)]
pub enum ScopeParent {
    /// Nothing below this scope; unresolved names are absent.
    None,
    /// The host's externally supplied base namespace.
    Base(Arc<dyn BaseResolver>),
    /// Another scope, as in a layer chain.
    Scope(Arc<Scope>),
}

/// A concurrency-safe resolver that defines artifacts on demand.
///
/// A scope owns one immutable [`ArtifactSet`], delegates to its parent
/// according to its [`ResolvePolicy`], and guarantees that each unit name
/// is defined at most once per scope instance over its lifetime: all
/// resolvers racing on one name observe the same `Arc<Unit>`, and racers
/// on unrelated names never block each other. Every unit ever defined is
/// remembered for bulk release at [`dispose`](Scope::dispose).
#[derive(Debug)]
pub struct Scope {
    parent: ScopeParent,
    policy: ResolvePolicy,
    artifacts: Arc<ArtifactSet>,
    /// Units defined so far, by name. The registry lock is only ever held
    /// for the already-defined decision, never across a definition.
    defined: Mutex<HashMap<String, Arc<Unit>>>,
    /// Short-lived per-name and per-namespace definition locks.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Namespace prefixes registered by first-touch initialization.
    namespaces: Mutex<BTreeSet<String>>,
    /// Every unit this scope ever defined, walked on disposal.
    ever_defined: Mutex<Vec<Arc<Unit>>>,
    define_count: AtomicUsize,
}

impl Scope {
    /// Creates a scope over an artifact set.
    pub fn new(parent: ScopeParent, policy: ResolvePolicy, artifacts: Arc<ArtifactSet>) -> Arc<Self> {
        Arc::new(Self {
            parent,
            policy,
            artifacts,
            defined: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            namespaces: Mutex::new(BTreeSet::new()),
            ever_defined: Mutex::new(Vec::new()),
            define_count: AtomicUsize::new(0),
        })
    }

    /// Returns this scope's resolution policy.
    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    /// Returns the artifact set this scope defines from.
    pub fn artifact_set(&self) -> &Arc<ArtifactSet> {
        &self.artifacts
    }

    /// Returns this scope's parent.
    pub fn parent(&self) -> &ScopeParent {
        &self.parent
    }

    /// Resolves a name through the chain according to the policy.
    ///
    /// `ParentFirst` returns an already-defined local unit, else lets the
    /// ancestors resolve (forcing their definitions), and only defines from
    /// this scope's own set when the chain above has no such name.
    /// `CurrentFirst` defines from this scope's own set whenever the name
    /// exists here, and only then delegates upward.
    pub fn resolve(&self, name: &str) -> Option<Arc<Unit>> {
        match self.policy {
            ResolvePolicy::ParentFirst => {
                if let Some(unit) = self.defined.lock().unwrap().get(name).cloned() {
                    return Some(unit);
                }
                if let Some(unit) = self.parent_resolve(name) {
                    return Some(unit);
                }
                self.define_from_set(name)
            }
            ResolvePolicy::CurrentFirst => {
                if let Some(unit) = self.define_from_set(name) {
                    return Some(unit);
                }
                self.parent_resolve(name)
            }
        }
    }

    fn parent_resolve(&self, name: &str) -> Option<Arc<Unit>> {
        match &self.parent {
            ScopeParent::None => None,
            ScopeParent::Base(base) => base.resolve(name),
            ScopeParent::Scope(scope) => scope.resolve(name),
        }
    }

    /// Finds the nearest scope in the chain, in policy order, whose
    /// artifact set was compiled from the given source.
    pub fn find_for_source(scope: &Arc<Scope>, source: &dyn Source) -> Option<Arc<Scope>> {
        match scope.policy {
            ResolvePolicy::ParentFirst => {
                if let ScopeParent::Scope(parent) = &scope.parent {
                    if let Some(found) = Scope::find_for_source(parent, source) {
                        return Some(found);
                    }
                }
                if scope.artifacts.is_for_source(source) {
                    return Some(Arc::clone(scope));
                }
                None
            }
            ResolvePolicy::CurrentFirst => {
                if scope.artifacts.is_for_source(source) {
                    return Some(Arc::clone(scope));
                }
                if let ScopeParent::Scope(parent) = &scope.parent {
                    return Scope::find_for_source(parent, source);
                }
                None
            }
        }
    }

    /// Loads the main unit of the given source, entering the chain at
    /// `scope`.
    ///
    /// Routes to the scope owning the source's artifacts and defines the
    /// unit there directly, bypassing name precedence.
    pub fn load_main_unit(scope: &Arc<Scope>, source: &dyn Source) -> Result<Arc<Unit>, LoadError> {
        let owner = Scope::find_for_source(scope, source)
            .ok_or_else(|| LoadError::source_not_found(source.id()))?;
        let name = owner
            .artifacts
            .main_unit_name(source)
            .ok_or_else(|| {
                LoadError::inconsistent(owner.artifacts.sources_name(), "<main>", source.id())
            })?
            .to_string();
        owner.define_from_set(&name).ok_or_else(|| {
            LoadError::inconsistent(owner.artifacts.sources_name(), name.clone(), source.id())
        })
    }

    /// Loads a unit belonging to the given source by name, entering the
    /// chain at `scope`.
    pub fn load_unit(
        scope: &Arc<Scope>,
        source: &dyn Source,
        name: &str,
    ) -> Result<Arc<Unit>, LoadError> {
        let owner = Scope::find_for_source(scope, source)
            .ok_or_else(|| LoadError::source_not_found(source.id()))?;
        let covered = owner
            .artifacts
            .unit_names(source)
            .is_some_and(|names| names.iter().any(|n| n == name));
        if !covered {
            return Err(LoadError::unit_not_for_source(name, source.id()));
        }
        owner.define_from_set(name).ok_or_else(|| {
            LoadError::inconsistent(owner.artifacts.sources_name(), name, source.id())
        })
    }

    /// Defines a unit from this scope's own artifact set, at most once.
    ///
    /// Returns `None` when the set has no artifact of that name.
    fn define_from_set(&self, name: &str) -> Option<Arc<Unit>> {
        let artifact = self.artifacts.artifact(name)?.clone();

        let namespace = namespace_of(name);
        let (ns_lock, name_lock) = {
            if let Some(unit) = self.defined.lock().unwrap().get(name) {
                return Some(Arc::clone(unit));
            }
            let mut locks = self.locks.lock().unwrap();
            let ns_lock =
                namespace.map(|ns| Arc::clone(locks.entry(ns.to_string()).or_default()));
            let name_lock = Arc::clone(locks.entry(name.to_string()).or_default());
            (ns_lock, name_lock)
        };

        // The namespace's first-touch registration must be ordered before
        // any unit in it is defined.
        if let (Some(ns), Some(lock)) = (namespace, &ns_lock) {
            let _guard = lock.lock().unwrap();
            self.namespaces.lock().unwrap().insert(ns.to_string());
        }

        let unit = {
            let _guard = name_lock.lock().unwrap();
            let mut defined = self.defined.lock().unwrap();
            if let Some(unit) = defined.get(name) {
                Arc::clone(unit)
            } else {
                let unit = Arc::new(Unit::from_artifact(&artifact));
                defined.insert(name.to_string(), Arc::clone(&unit));
                self.ever_defined.lock().unwrap().push(Arc::clone(&unit));
                self.define_count.fetch_add(1, Ordering::Relaxed);
                unit
            }
        };

        // Unit and namespace both exist now, so it no longer matters
        // whether later racers lock on these or on fresh locks.
        let mut locks = self.locks.lock().unwrap();
        if let Some(ns) = namespace {
            locks.remove(ns);
        }
        locks.remove(name);

        Some(unit)
    }

    /// Number of units defined by this scope instance so far.
    pub fn defined_count(&self) -> usize {
        self.define_count.load(Ordering::Relaxed)
    }

    /// Namespace prefixes registered by definitions in this scope.
    pub fn registered_namespaces(&self) -> Vec<String> {
        self.namespaces.lock().unwrap().iter().cloned().collect()
    }

    /// Releases every unit this scope ever defined.
    ///
    /// Individual release failures are swallowed. Further use of the scope
    /// after disposal is undefined.
    pub fn dispose(&self, releaser: &dyn UnitReleaser) {
        let units = std::mem::take(&mut *self.ever_defined.lock().unwrap());
        for unit in units {
            let _ = releaser.release(&unit);
        }
    }

    /// Creates a scope sharing this one's parent and artifact set but with
    /// its own independent defined-unit bookkeeping.
    pub fn clone_fresh(&self) -> Arc<Scope> {
        Scope::new(self.parent.clone(), self.policy, Arc::clone(&self.artifacts))
    }
}

/// The namespace prefix of a dotted unit name, if any.
fn namespace_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(ns, _)| ns)
}
