//! The engine: staleness-driven recompilation and handle-based resolution.

use crate::config::EngineConfig;
use crate::error::{AuthorizationError, EngineError};
use crate::handle::{Handle, HandleCore, HandleView};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use strata_common::Throttled;
use strata_code::{conflict, ArtifactSet, Source, Sources};
use strata_load::{ConflictError, LayerStack, LoadError, ResolvePolicy, Scope, TopCache, Unit};

/// Process-wide engine identity counter, used to authenticate handles.
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Compiles an ordered set of sources layers and serves name resolution
/// over the resulting snapshot.
///
/// Construction compiles every layer and fails synchronously on the first
/// error. Afterwards, every public access runs an implicit, latency-
/// throttled staleness sweep: when any layer's sources report a changed
/// `last_modified`, the full stack is recompiled and, only on success,
/// atomically installed; on failure the previous snapshot keeps serving
/// and the error is recorded as the last update error. There are no
/// background threads anywhere; all work happens on the calling thread.
#[derive(Debug)]
pub struct Engine {
    id: u64,
    config: EngineConfig,
    layers: Vec<Arc<dyn Sources>>,
    state: RwLock<Arc<LayerStack>>,
    last_error: Mutex<Option<EngineError>>,
    update_throttle: Throttled<()>,
    next_handle: AtomicU64,
    attached: Mutex<Vec<Weak<HandleCore>>>,
}

impl Engine {
    /// Creates an engine over the given layers, compiling them all.
    ///
    /// Fails on an unusable configuration, on the first layer that does
    /// not compile, or (with conflict checking enabled) on duplicate unit
    /// names.
    pub fn new(config: EngineConfig, layers: Vec<Arc<dyn Sources>>) -> Result<Self, EngineError> {
        config.validate()?;
        let stack = LayerStack::build(&layers, config.base.clone(), config.settings.layer_policy)?;
        Self::check_conflicts(&config, stack.code_layers())?;
        let update_latency = config.settings.update_latency();
        Ok(Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            layers,
            state: RwLock::new(Arc::new(stack)),
            last_error: Mutex::new(None),
            update_throttle: Throttled::new(update_latency),
            next_handle: AtomicU64::new(0),
            attached: Mutex::new(Vec::new()),
        })
    }

    /// Allocates a handle that is re-pointed at every installed snapshot.
    pub fn new_attached_handle(&self) -> Handle {
        self.new_handle(true)
    }

    /// Allocates a handle frozen to the snapshot current at creation.
    pub fn new_detached_handle(&self) -> Handle {
        self.new_handle(false)
    }

    fn new_handle(&self, attached: bool) -> Handle {
        let number = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.current_stack();
        let core = Arc::new(HandleCore::new(
            self.id,
            number,
            attached,
            Arc::clone(&self.config.releaser),
            self.view_of(&snapshot),
        ));
        if attached {
            self.attached.lock().unwrap().push(Arc::downgrade(&core));
            // An update may have installed a newer snapshot while this
            // handle was being built; re-point it now that it is
            // registered.
            let latest = self.current_stack();
            if !Arc::ptr_eq(&latest, &snapshot) {
                core.replace_view(self.view_of(&latest));
            }
        }
        Handle::from_core(core)
    }

    fn view_of(&self, snapshot: &Arc<LayerStack>) -> HandleView {
        let top = match (&self.config.top_compiler, self.config.settings.top_cache) {
            (Some(compiler), true) => Some(TopCache::new(
                Arc::clone(compiler),
                self.config.settings.top_policy,
            )),
            _ => None,
        };
        HandleView {
            stack: snapshot.clone_fresh(),
            top,
        }
    }

    /// Resolves the main unit of the given source through a handle's view.
    pub fn resolve_by_origin(
        &self,
        handle: &Handle,
        source: &Arc<dyn Source>,
    ) -> Result<Arc<Unit>, EngineError> {
        self.authorize(handle)?;
        self.check_for_updates();
        let view = handle.core().view();
        let entry = self.entry_scope(&view, source)?;
        Ok(Scope::load_main_unit(&entry, source.as_ref())?)
    }

    /// Resolves a unit of the given source by name through a handle's view.
    pub fn resolve_by_name(
        &self,
        handle: &Handle,
        source: &Arc<dyn Source>,
        name: &str,
    ) -> Result<Arc<Unit>, EngineError> {
        self.authorize(handle)?;
        self.check_for_updates();
        let view = handle.core().view();
        let entry = self.entry_scope(&view, source)?;
        Ok(Scope::load_unit(&entry, source.as_ref(), name)?)
    }

    /// Picks the chain entry for a source: the static layers or the
    /// handle's on-demand cache, per the configured top policy.
    ///
    /// `ParentFirst` lets precompiled layers win and compiles on demand
    /// only for sources unknown to them; `CurrentFirst` prefers the ad hoc
    /// compile. Without a top cache, unknown sources are load errors.
    fn entry_scope(
        &self,
        view: &HandleView,
        source: &Arc<dyn Source>,
    ) -> Result<Arc<Scope>, EngineError> {
        let stack_top = view.stack.top();
        match self.config.settings.top_policy {
            ResolvePolicy::ParentFirst => {
                if Scope::find_for_source(stack_top, source.as_ref()).is_some() {
                    return Ok(Arc::clone(stack_top));
                }
                match &view.top {
                    Some(cache) => Ok(cache.scope_for(source, stack_top)?),
                    None => Err(LoadError::source_not_found(source.id()).into()),
                }
            }
            ResolvePolicy::CurrentFirst => match &view.top {
                Some(cache) => Ok(cache.scope_for(source, stack_top)?),
                None => Ok(Arc::clone(stack_top)),
            },
        }
    }

    /// Runs a staleness sweep now if the latency window has elapsed.
    ///
    /// Invoked implicitly by every resolution; exposed for hosts that want
    /// to drive updates explicitly. Never throws: failures are recorded as
    /// the last update error.
    pub fn check_for_updates(&self) {
        self.update_throttle.get_or_refresh(|| self.perform_update());
    }

    /// The most recent update failure, if the last sweep failed.
    ///
    /// Cleared by the next successful snapshot installation.
    pub fn last_update_error(&self) -> Option<EngineError> {
        self.last_error.lock().unwrap().clone()
    }

    fn current_stack(&self) -> Arc<LayerStack> {
        Arc::clone(&self.state.read().unwrap())
    }

    fn perform_update(&self) {
        let current = self.current_stack();
        let stale = self
            .layers
            .iter()
            .zip(current.code_layers())
            .any(|(sources, code)| sources.last_modified() != code.sources_last_modified());
        if !stale {
            return;
        }

        match LayerStack::build(
            &self.layers,
            self.config.base.clone(),
            self.config.settings.layer_policy,
        ) {
            Ok(stack) => {
                if let Err(conflict) = Self::check_conflicts(&self.config, stack.code_layers()) {
                    *self.last_error.lock().unwrap() = Some(conflict);
                    return;
                }
                let stack = Arc::new(stack);
                *self.state.write().unwrap() = Arc::clone(&stack);
                self.refresh_attached(&stack);
                *self.last_error.lock().unwrap() = None;
            }
            Err(error) => {
                *self.last_error.lock().unwrap() = Some(error.into());
            }
        }
    }

    fn refresh_attached(&self, snapshot: &Arc<LayerStack>) {
        let mut attached = self.attached.lock().unwrap();
        attached.retain(|weak| match weak.upgrade() {
            Some(core) => {
                core.replace_view(self.view_of(snapshot));
                true
            }
            None => false,
        });
    }

    fn check_conflicts(
        config: &EngineConfig,
        code_layers: &[Arc<ArtifactSet>],
    ) -> Result<(), EngineError> {
        let settings = &config.settings;
        if !settings.check_layer_conflicts && !settings.check_fallback_conflicts {
            return Ok(());
        }
        let duplicates = if settings.check_layer_conflicts {
            conflict::duplicate_unit_names_map(code_layers)
        } else {
            Default::default()
        };
        let in_fallback = match (&config.fallback, settings.check_fallback_conflicts) {
            (Some(fallback), true) => {
                conflict::unit_names_in_fallback_map(code_layers, &|name| fallback.contains(name))
            }
            _ => Default::default(),
        };
        if duplicates.is_empty() && in_fallback.is_empty() {
            return Ok(());
        }
        Err(ConflictError::from_maps(&duplicates, &in_fallback).into())
    }

    fn authorize(&self, handle: &Handle) -> Result<(), AuthorizationError> {
        let core = handle.core();
        if core.engine_id != self.id {
            return Err(AuthorizationError::new(
                self.id,
                core.engine_id,
                core.number,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use std::time::Duration;

    use strata_code::testkit::{MockCompiler, MockSource};
    use strata_code::{Compiler, FixedSetSources, SourceSet};

    fn layer(name: &str, members: Vec<Arc<dyn Source>>) -> Arc<dyn Sources> {
        Arc::new(FixedSetSources::new(
            name,
            SourceSet::from_sources(members),
            Duration::ZERO,
            Arc::new(MockCompiler::new()) as Arc<dyn Compiler>,
        ))
    }

    fn engine_over(layers: Vec<Arc<dyn Sources>>) -> Engine {
        let config = EngineConfig::new(EngineSettings::default())
            .with_top_compiler(Arc::new(MockCompiler::new()));
        Engine::new(config, layers).unwrap()
    }

    #[test]
    fn construction_compiles_layers() {
        let source = MockSource::new("s1", "unit: A\nv1");
        let engine = engine_over(vec![layer("l0", vec![source.clone() as Arc<dyn Source>])]);
        let handle = engine.new_attached_handle();

        let unit = engine
            .resolve_by_origin(&handle, &(source as Arc<dyn Source>))
            .unwrap();
        assert_eq!(unit.name(), "A");
    }

    #[test]
    fn construction_fails_on_bad_layer() {
        let source = MockSource::new("s1", "fail");
        let config = EngineConfig::new(EngineSettings::default())
            .with_top_compiler(Arc::new(MockCompiler::new()));
        let err = Engine::new(config, vec![layer("broken", vec![source as Arc<dyn Source>])]).unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn construction_fails_on_invalid_config() {
        let err = Engine::new(EngineConfig::new(EngineSettings::default()), Vec::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn handle_numbers_increase() {
        let engine = engine_over(Vec::new());
        let h0 = engine.new_attached_handle();
        let h1 = engine.new_detached_handle();
        assert_eq!(h0.number(), 0);
        assert_eq!(h1.number(), 1);
        assert!(h0.is_attached());
        assert!(!h1.is_attached());
        assert_ne!(h0, h1);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let engine_a = engine_over(Vec::new());
        let engine_b = engine_over(Vec::new());
        let foreign = engine_b.new_attached_handle();
        let source = MockSource::new("s1", "unit: A\nv1") as Arc<dyn Source>;

        let err = engine_a.resolve_by_origin(&foreign, &source).unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));
    }

    #[test]
    fn unknown_source_compiles_on_demand() {
        let engine = engine_over(Vec::new());
        let handle = engine.new_attached_handle();
        let source = MockSource::new("adhoc", "unit: AdHoc\nbody") as Arc<dyn Source>;

        let unit = engine.resolve_by_origin(&handle, &source).unwrap();
        assert_eq!(unit.name(), "AdHoc");
        // Same handle, same cache entry.
        let again = engine.resolve_by_origin(&handle, &source).unwrap();
        assert!(Arc::ptr_eq(&unit, &again));
    }

    #[test]
    fn unknown_source_without_top_cache_is_load_error() {
        let settings = EngineSettings {
            top_cache: false,
            ..Default::default()
        };
        let engine = Engine::new(EngineConfig::new(settings), Vec::new()).unwrap();
        let handle = engine.new_attached_handle();
        let source = MockSource::new("adhoc", "unit: AdHoc\nbody") as Arc<dyn Source>;

        let err = engine.resolve_by_origin(&handle, &source).unwrap_err();
        assert!(matches!(err, EngineError::Load(LoadError::SourceNotFound { .. })));
    }

    #[test]
    fn precompiled_layers_win_over_top_cache() {
        // The same source id is covered by a layer; parent-first top policy
        // must route to the layer's unit, not compile ad hoc.
        let source = MockSource::new("s1", "unit: FromLayer\nlayer-body");
        let engine = engine_over(vec![layer("l0", vec![source.clone() as Arc<dyn Source>])]);
        let handle = engine.new_attached_handle();

        let unit = engine
            .resolve_by_origin(&handle, &(source as Arc<dyn Source>))
            .unwrap();
        assert_eq!(unit.name(), "FromLayer");
    }

    #[test]
    fn resolve_by_name_checks_coverage() {
        let source = MockSource::new("s1", "unit: Main\nunit: Extra\nbody");
        let engine = engine_over(vec![layer("l0", vec![source.clone() as Arc<dyn Source>])]);
        let handle = engine.new_attached_handle();
        let source = source as Arc<dyn Source>;

        assert!(engine.resolve_by_name(&handle, &source, "Extra").is_ok());
        let err = engine
            .resolve_by_name(&handle, &source, "Elsewhere")
            .unwrap_err();
        assert!(matches!(err, EngineError::Load(LoadError::UnitNotForSource { .. })));
    }

    #[test]
    fn stale_layer_recompiles_on_access() {
        let source = MockSource::new("s1", "unit: A\nv1");
        let engine = engine_over(vec![layer("l0", vec![source.clone() as Arc<dyn Source>])]);
        let handle = engine.new_attached_handle();
        let dyn_source = source.clone() as Arc<dyn Source>;

        let before = engine.resolve_by_origin(&handle, &dyn_source).unwrap();
        assert_eq!(before.payload().as_ref(), b"unit: A\nv1");

        source.modify("unit: A\nv2");
        let after = engine.resolve_by_origin(&handle, &dyn_source).unwrap();
        assert_eq!(after.payload().as_ref(), b"unit: A\nv2");
        assert!(engine.last_update_error().is_none());
    }

    #[test]
    fn failed_update_keeps_serving_and_records_error() {
        let source = MockSource::new("s1", "unit: A\nv1");
        let engine = engine_over(vec![layer("l0", vec![source.clone() as Arc<dyn Source>])]);
        let handle = engine.new_attached_handle();
        let dyn_source = source.clone() as Arc<dyn Source>;

        engine.resolve_by_origin(&handle, &dyn_source).unwrap();

        source.modify("fail");
        let unit = engine.resolve_by_origin(&handle, &dyn_source).unwrap();
        // The previous good snapshot still serves v1.
        assert_eq!(unit.payload().as_ref(), b"unit: A\nv1");
        let err = engine.last_update_error().unwrap();
        assert!(matches!(err, EngineError::Compile(_)));

        // A later fix clears the recorded error.
        source.modify("unit: A\nv3");
        let unit = engine.resolve_by_origin(&handle, &dyn_source).unwrap();
        assert_eq!(unit.payload().as_ref(), b"unit: A\nv3");
        assert!(engine.last_update_error().is_none());
    }

    #[test]
    fn conflict_checking_rejects_duplicate_layers() {
        let settings = EngineSettings {
            check_layer_conflicts: true,
            ..Default::default()
        };
        let config = EngineConfig::new(settings)
            .with_top_compiler(Arc::new(MockCompiler::new()));
        let layers = vec![
            layer("l1", vec![MockSource::new("s1", "unit: Twice\na") as Arc<dyn Source>]),
            layer("l2", vec![MockSource::new("s2", "unit: Twice\nb") as Arc<dyn Source>]),
        ];
        let err = Engine::new(config, layers).unwrap_err();
        match err {
            EngineError::Conflict(conflict) => {
                assert_eq!(conflict.duplicate_names["Twice"], vec!["l1", "l2"]);
            }
            other => panic!("expected conflict error, got {other}"),
        }
    }

    #[test]
    fn fallback_conflict_checking_probes_base() {
        let fallback = Arc::new(strata_load::StaticBase::new().with_unit("Shadow", b"base"));
        let settings = EngineSettings {
            check_fallback_conflicts: true,
            ..Default::default()
        };
        let config = EngineConfig::new(settings)
            .with_top_compiler(Arc::new(MockCompiler::new()))
            .with_fallback(fallback);
        let layers = vec![layer("l1", vec![MockSource::new("s1", "unit: Shadow\na") as Arc<dyn Source>])];
        let err = Engine::new(config, layers).unwrap_err();
        match err {
            EngineError::Conflict(conflict) => {
                assert!(conflict.fallback_names.contains_key("Shadow"));
                assert!(conflict.duplicate_names.is_empty());
            }
            other => panic!("expected conflict error, got {other}"),
        }
    }
}
