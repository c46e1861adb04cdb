//! Ordered composition of scopes built from ordered sources layers.

use crate::base::BaseResolver;
use crate::policy::ResolvePolicy;
use crate::scope::{Scope, ScopeParent};
use crate::unit::UnitReleaser;
use std::sync::Arc;

use strata_code::{ArtifactSet, CompileError, Sources};

/// An immutable snapshot of chained scopes, one per compiled layer.
///
/// Layer 0 is outermost: its scope's parent is the externally supplied
/// base resolver (or nothing), and each later layer's scope is chained on
/// the previous one, so the innermost layer sits nearest the caller. A
/// stack with no layers still materializes one empty scope so callers
/// always have a chain entry. Replacing a snapshot never disturbs holders
/// of the old one; old scopes stay valid until whoever owns them disposes
/// them.
#[derive(Debug)]
pub struct LayerStack {
    scopes: Vec<Arc<Scope>>,
    top: Arc<Scope>,
    code_layers: Vec<Arc<ArtifactSet>>,
    base: Option<Arc<dyn BaseResolver>>,
    policy: ResolvePolicy,
}

impl LayerStack {
    /// Compiles every layer in order and chains the resulting scopes.
    ///
    /// Each layer is compiled with its own compiler. The first failing
    /// layer aborts the whole build; nothing is partially installed.
    pub fn build(
        layers: &[Arc<dyn Sources>],
        base: Option<Arc<dyn BaseResolver>>,
        policy: ResolvePolicy,
    ) -> Result<Self, CompileError> {
        let mut code_layers = Vec::with_capacity(layers.len());
        for sources in layers {
            let code = sources.compiler().compile(sources.as_ref())?;
            code_layers.push(Arc::new(code));
        }
        Ok(Self::from_code_layers(code_layers, base, policy))
    }

    /// Chains scopes over already-compiled layers.
    pub fn from_code_layers(
        code_layers: Vec<Arc<ArtifactSet>>,
        base: Option<Arc<dyn BaseResolver>>,
        policy: ResolvePolicy,
    ) -> Self {
        let mut parent = match &base {
            Some(resolver) => ScopeParent::Base(Arc::clone(resolver)),
            None => ScopeParent::None,
        };
        let mut scopes = Vec::with_capacity(code_layers.len().max(1));
        let mut top = None;
        for code in &code_layers {
            let scope = Scope::new(parent, policy, Arc::clone(code));
            parent = ScopeParent::Scope(Arc::clone(&scope));
            scopes.push(Arc::clone(&scope));
            top = Some(scope);
        }
        let top = top.unwrap_or_else(|| {
            let scope = Scope::new(parent, policy, Arc::new(ArtifactSet::empty("")));
            scopes.push(Arc::clone(&scope));
            scope
        });
        Self {
            scopes,
            top,
            code_layers,
            base,
            policy,
        }
    }

    /// The innermost scope, where resolution enters the chain.
    pub fn top(&self) -> &Arc<Scope> {
        &self.top
    }

    /// The scopes of this snapshot, outermost first.
    pub fn scopes(&self) -> &[Arc<Scope>] {
        &self.scopes
    }

    /// The compiled layers of this snapshot, outermost first.
    pub fn code_layers(&self) -> &[Arc<ArtifactSet>] {
        &self.code_layers
    }

    /// Creates a stack sharing this one's compiled layers and base but
    /// with freshly chained scopes and independent bookkeeping.
    pub fn clone_fresh(&self) -> LayerStack {
        Self::from_code_layers(
            self.code_layers.clone(),
            self.base.clone(),
            self.policy,
        )
    }

    /// Disposes every scope in this snapshot.
    pub fn dispose(&self, releaser: &dyn UnitReleaser) {
        for scope in &self.scopes {
            scope.dispose(releaser);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::StaticBase;
    use std::time::Duration;

    use strata_code::testkit::{MockCompiler, MockSource};
    use strata_code::{Compiler, FixedSetSources, Source, SourceSet};

    fn layer(name: &str, members: Vec<(&str, &str)>) -> Arc<dyn Sources> {
        let sources = members
            .into_iter()
            .map(|(id, content)| MockSource::new(id, content) as Arc<dyn Source>);
        Arc::new(FixedSetSources::new(
            name,
            SourceSet::from_sources(sources),
            Duration::ZERO,
            Arc::new(MockCompiler::new()) as Arc<dyn Compiler>,
        ))
    }

    #[test]
    fn builds_and_chains_layers() {
        let layers = vec![
            layer("outer", vec![("s1", "unit: Outer\nv1")]),
            layer("inner", vec![("s2", "unit: Inner\nv1")]),
        ];
        let stack = LayerStack::build(&layers, None, ResolvePolicy::ParentFirst).unwrap();

        assert_eq!(stack.code_layers().len(), 2);
        assert_eq!(stack.scopes().len(), 2);
        assert!(stack.top().resolve("Outer").is_some());
        assert!(stack.top().resolve("Inner").is_some());
        assert!(stack.top().resolve("Missing").is_none());
    }

    #[test]
    fn failed_layer_aborts_build() {
        let layers = vec![
            layer("ok", vec![("s1", "unit: A\nv1")]),
            layer("broken", vec![("s2", "fail")]),
        ];
        let err = LayerStack::build(&layers, None, ResolvePolicy::ParentFirst).unwrap_err();
        assert_eq!(err.sources_name, "broken");
    }

    #[test]
    fn empty_stack_delegates_to_base() {
        let base = Arc::new(StaticBase::new().with_unit("Fallback", b"base"));
        let stack = LayerStack::from_code_layers(
            Vec::new(),
            Some(base as Arc<dyn BaseResolver>),
            ResolvePolicy::ParentFirst,
        );
        assert_eq!(stack.scopes().len(), 1);
        assert!(stack.code_layers().is_empty());
        assert!(stack.top().resolve("Fallback").is_some());
        assert!(stack.top().resolve("Missing").is_none());
    }

    #[test]
    fn parent_first_outer_layer_wins() {
        let layers = vec![
            layer("outer", vec![("s1", "unit: Shared\nouter-body")]),
            layer("inner", vec![("s2", "unit: Shared\ninner-body")]),
        ];
        let stack = LayerStack::build(&layers, None, ResolvePolicy::ParentFirst).unwrap();
        let unit = stack.top().resolve("Shared").unwrap();
        assert_eq!(unit.payload().as_ref(), b"unit: Shared\nouter-body");
    }

    #[test]
    fn current_first_inner_layer_wins() {
        let layers = vec![
            layer("outer", vec![("s1", "unit: Shared\nouter-body")]),
            layer("inner", vec![("s2", "unit: Shared\ninner-body")]),
        ];
        let stack = LayerStack::build(&layers, None, ResolvePolicy::CurrentFirst).unwrap();
        let unit = stack.top().resolve("Shared").unwrap();
        assert_eq!(unit.payload().as_ref(), b"unit: Shared\ninner-body");
    }

    #[test]
    fn clone_fresh_shares_code_not_bookkeeping() {
        let layers = vec![layer("l0", vec![("s1", "unit: A\nv1")])];
        let stack = LayerStack::build(&layers, None, ResolvePolicy::ParentFirst).unwrap();
        let clone = stack.clone_fresh();

        let u1 = stack.top().resolve("A").unwrap();
        assert_eq!(stack.top().defined_count(), 1);
        assert_eq!(clone.top().defined_count(), 0);

        let u2 = clone.top().resolve("A").unwrap();
        assert!(!Arc::ptr_eq(&u1, &u2));
        assert!(Arc::ptr_eq(
            stack.top().artifact_set(),
            clone.top().artifact_set()
        ));
    }

    #[test]
    fn find_for_source_walks_the_chain() {
        let source = MockSource::new("s1", "unit: A\nv1");
        let layers = vec![
            layer("outer", vec![("s1", "unit: A\nv1")]),
            layer("inner", vec![("s2", "unit: B\nv1")]),
        ];
        let stack = LayerStack::build(&layers, None, ResolvePolicy::ParentFirst).unwrap();
        let owner = Scope::find_for_source(stack.top(), source.as_ref()).unwrap();
        assert_eq!(owner.artifact_set().sources_name(), "outer");
    }
}
