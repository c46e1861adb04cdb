//! Lazily compiled per-source cache above the static layers.

use crate::policy::ResolvePolicy;
use crate::scope::{Scope, ScopeParent};
use crate::unit::UnitReleaser;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use strata_code::{CompileError, Compiler, SingleSources, Source};

/// Caches single-source compilations keyed by source id.
///
/// An entry is reused only while its compile-time staleness token matches
/// the source's current `last_modified` and its scope is still chained on
/// the requested base; otherwise the source is recompiled into a fresh
/// single-unit artifact set, rewrapped, and the prior entry replaced.
/// Concurrent misses for one source compile once without blocking other
/// sources. The cache is unbounded by design: capacity management is the
/// owner's disposal, not eviction.
#[derive(Debug)]
pub struct TopCache {
    compiler: Arc<dyn Compiler>,
    policy: ResolvePolicy,
    entries: Mutex<HashMap<String, TopEntry>>,
    /// Short-lived per-source-id compile locks.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug)]
struct TopEntry {
    token: i64,
    scope: Arc<Scope>,
}

impl TopCache {
    /// Creates an empty cache compiling with the given compiler.
    pub fn new(compiler: Arc<dyn Compiler>, policy: ResolvePolicy) -> Self {
        Self {
            compiler,
            policy,
            entries: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the scope serving this source, compiling it if needed.
    pub fn scope_for(
        &self,
        source: &Arc<dyn Source>,
        base: &Arc<Scope>,
    ) -> Result<Arc<Scope>, CompileError> {
        let current = source.last_modified();
        if let Some(scope) = self.lookup(source.id(), current, base) {
            return Ok(scope);
        }

        let lock = Arc::clone(
            self.locks
                .lock()
                .unwrap()
                .entry(source.id().to_string())
                .or_default(),
        );
        let _guard = lock.lock().unwrap();

        // A racer may have compiled while this thread waited on the lock.
        if let Some(scope) = self.lookup(source.id(), current, base) {
            return Ok(scope);
        }

        let sources = SingleSources::new(Arc::clone(source), Arc::clone(&self.compiler));
        let code = Arc::new(self.compiler.compile(&sources)?);
        let token = code.sources_last_modified();
        let scope = Scope::new(ScopeParent::Scope(Arc::clone(base)), self.policy, code);
        self.entries.lock().unwrap().insert(
            source.id().to_string(),
            TopEntry {
                token,
                scope: Arc::clone(&scope),
            },
        );
        self.locks.lock().unwrap().remove(source.id());

        Ok(scope)
    }

    fn lookup(&self, source_id: &str, current: i64, base: &Arc<Scope>) -> Option<Arc<Scope>> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(source_id)?;
        if entry.token == current && chained_on(&entry.scope, base) {
            Some(Arc::clone(&entry.scope))
        } else {
            None
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Disposes every cached scope and clears the cache.
    pub fn dispose(&self, releaser: &dyn UnitReleaser) {
        let entries = std::mem::take(&mut *self.entries.lock().unwrap());
        for (_, entry) in entries {
            entry.scope.dispose(releaser);
        }
    }
}

fn chained_on(scope: &Scope, base: &Arc<Scope>) -> bool {
    matches!(scope.parent(), ScopeParent::Scope(parent) if Arc::ptr_eq(parent, base))
}
