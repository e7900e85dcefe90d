//! Memoizing member resolver.
//!
//! Each adapter owns a [`MemberTable`] mapping [`MemberKey`]s to a
//! three-state cell:
//!
//! - *unset*: no lookup attempted yet (cell absent or not initialized)
//! - *missing*: the introspector failed; never retried
//! - *resolved*: the proxy built from the introspector's handle
//!
//! Concurrent first lookups of the same key block on the cell, so the
//! introspector runs at most once per key. Lookups of different keys only
//! share the map shard for the instant it takes to fetch the cell.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use stencil_core::{
    ConstructorHandle, Instance, Introspector, KeyFactory, MemberKey, MemberName, MethodHandle,
    StencilResult, TypeRef, Value,
};

// ============================================================================
// PROXIES
// ============================================================================

/// A resolved method, callable on instances of the adapter's target type.
#[derive(Clone)]
pub struct MethodProxy {
    key: MemberKey,
    handle: Arc<dyn MethodHandle>,
}

impl MethodProxy {
    pub fn key(&self) -> &MemberKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.key.name().as_str()
    }

    pub fn invoke(
        &self,
        receiver: &mut (dyn Any + Send + Sync),
        args: &[Value],
    ) -> StencilResult<Value> {
        self.handle.invoke(receiver, args)
    }

    /// True if both proxies wrap the same resolved handle.
    pub fn same_handle(&self, other: &MethodProxy) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodProxy").field(&self.key).finish()
    }
}

/// A resolved constructor of the adapter's target type.
#[derive(Clone)]
pub struct ConstructorProxy {
    key: MemberKey,
    handle: Arc<dyn ConstructorHandle>,
}

impl ConstructorProxy {
    pub fn key(&self) -> &MemberKey {
        &self.key
    }

    pub fn params(&self) -> &[TypeRef] {
        self.key.params()
    }

    pub fn construct(&self, args: &[Value]) -> StencilResult<Instance> {
        self.handle.construct(args)
    }

    pub fn same_handle(&self, other: &ConstructorProxy) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for ConstructorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConstructorProxy").field(&self.key).finish()
    }
}

/// Either kind of resolved member.
#[derive(Debug, Clone)]
pub enum MemberProxy {
    Method(MethodProxy),
    Constructor(ConstructorProxy),
}

// ============================================================================
// CELLS
// ============================================================================

#[derive(Debug)]
enum Resolution {
    Missing,
    Resolved(MemberProxy),
}

type Cell = Arc<OnceCell<Resolution>>;

/// Observable state of a member cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Unset,
    Missing,
    Resolved,
}

/// Counters for one member table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberStats {
    /// Calls made to the introspector.
    pub introspections: u64,
    /// Keys holding a resolved proxy.
    pub resolved: usize,
    /// Keys memoized as missing.
    pub missing: usize,
}

// ============================================================================
// MEMBER TABLE
// ============================================================================

/// Per-adapter cache of member lookups, including failed ones.
///
/// The introspector must not call back into the same table for the key it
/// is resolving; the cell is still being initialized at that point.
pub struct MemberTable {
    target: TypeRef,
    introspector: Arc<dyn Introspector>,
    cells: DashMap<MemberKey, Cell>,
    introspections: AtomicU64,
}

impl MemberTable {
    pub fn new(target: TypeRef, introspector: Arc<dyn Introspector>, capacity: usize) -> Self {
        Self {
            target,
            introspector,
            cells: DashMap::with_capacity(capacity),
            introspections: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> &TypeRef {
        &self.target
    }

    /// Resolve a method by name and parameter types.
    ///
    /// Returns `None` if the member does not exist or could not be resolved,
    /// now or on any earlier attempt.
    pub fn resolve_method(&self, name: &str, params: &[TypeRef]) -> Option<MethodProxy> {
        let key = KeyFactory::member_key(&self.target, name, params);
        match self.resolve(&key)? {
            MemberProxy::Method(proxy) => Some(proxy),
            MemberProxy::Constructor(_) => None,
        }
    }

    /// Resolve a constructor by parameter types.
    pub fn resolve_constructor(&self, params: &[TypeRef]) -> Option<ConstructorProxy> {
        let key = KeyFactory::constructor_key(&self.target, params);
        match self.resolve(&key)? {
            MemberProxy::Constructor(proxy) => Some(proxy),
            MemberProxy::Method(_) => None,
        }
    }

    /// Resolve any member key belonging to this table's target.
    pub fn resolve(&self, key: &MemberKey) -> Option<MemberProxy> {
        if key.target() != &self.target {
            return None;
        }
        let cell = self.cell(key);
        match cell.get_or_init(|| self.introspect(key)) {
            Resolution::Resolved(proxy) => Some(proxy.clone()),
            Resolution::Missing => None,
        }
    }

    /// Current state of a key, without triggering resolution.
    pub fn state(&self, key: &MemberKey) -> MemberState {
        let Some(cell) = self.cells.get(key) else {
            return MemberState::Unset;
        };
        match cell.value().get() {
            None => MemberState::Unset,
            Some(Resolution::Missing) => MemberState::Missing,
            Some(Resolution::Resolved(_)) => MemberState::Resolved,
        }
    }

    /// Number of keys with a settled outcome.
    pub fn len(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemberStats {
        let mut stats = MemberStats {
            introspections: self.introspections.load(Ordering::Relaxed),
            ..Default::default()
        };
        for cell in self.cells.iter() {
            match cell.value().get() {
                Some(Resolution::Resolved(_)) => stats.resolved += 1,
                Some(Resolution::Missing) => stats.missing += 1,
                None => {}
            }
        }
        stats
    }

    fn cell(&self, key: &MemberKey) -> Cell {
        if let Some(cell) = self.cells.get(key) {
            return cell.value().clone();
        }
        self.cells.entry(key.clone()).or_default().value().clone()
    }

    fn introspect(&self, key: &MemberKey) -> Resolution {
        self.introspections.fetch_add(1, Ordering::Relaxed);

        let outcome = match key.name() {
            MemberName::Constructor => self
                .introspector
                .find_constructor(&self.target, key.params())
                .map(|handle| {
                    MemberProxy::Constructor(ConstructorProxy {
                        key: key.clone(),
                        handle,
                    })
                }),
            MemberName::Method(name) => self
                .introspector
                .find_method(&self.target, name, key.params())
                .map(|handle| {
                    MemberProxy::Method(MethodProxy {
                        key: key.clone(),
                        handle,
                    })
                }),
        };

        match outcome {
            Ok(proxy) => {
                tracing::debug!(member = %key, "Resolved member");
                Resolution::Resolved(proxy)
            }
            Err(error) => {
                tracing::debug!(
                    member = %key,
                    %error,
                    "Member lookup failed, memoizing as missing"
                );
                Resolution::Missing
            }
        }
    }
}

impl fmt::Debug for MemberTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberTable")
            .field("target", &self.target)
            .field("cells", &self.cells.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_core::{IntrospectError, NoIntrospection, StencilError};
    use std::sync::Mutex;

    struct Echo;

    impl MethodHandle for Echo {
        fn invoke(
            &self,
            _receiver: &mut (dyn Any + Send + Sync),
            args: &[Value],
        ) -> StencilResult<Value> {
            Ok(args.first().cloned().unwrap_or_default())
        }
    }

    struct Unit;

    impl ConstructorHandle for Unit {
        fn construct(&self, _args: &[Value]) -> StencilResult<Instance> {
            Ok(Box::new(()))
        }
    }

    /// Knows one method `echo(int)` and the no-arg constructor.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<String>>,
    }

    impl Introspector for Scripted {
        fn find_method(
            &self,
            target: &TypeRef,
            name: &str,
            params: &[TypeRef],
        ) -> Result<Arc<dyn MethodHandle>, IntrospectError> {
            self.calls.lock().unwrap().push(name.to_string());
            if name == "echo" && params == [TypeRef::named("int")] {
                Ok(Arc::new(Echo))
            } else {
                Err(IntrospectError::NotFound {
                    target: target.clone(),
                    member: name.to_string(),
                })
            }
        }

        fn find_constructor(
            &self,
            target: &TypeRef,
            params: &[TypeRef],
        ) -> Result<Arc<dyn ConstructorHandle>, IntrospectError> {
            self.calls.lock().unwrap().push("<init>".to_string());
            if params.is_empty() {
                Ok(Arc::new(Unit))
            } else {
                Err(IntrospectError::Inaccessible {
                    target: target.clone(),
                    member: "<init>".to_string(),
                })
            }
        }
    }

    fn table(introspector: Arc<dyn Introspector>) -> MemberTable {
        MemberTable::new(TypeRef::named("Person"), introspector, 4)
    }

    #[test]
    fn test_resolved_method_is_cached() {
        let scripted = Arc::new(Scripted::default());
        let table = table(scripted.clone());
        let int = [TypeRef::named("int")];

        let first = table.resolve_method("echo", &int).expect("echo resolves");
        let second = table.resolve_method("echo", &int).expect("echo resolves");

        assert!(first.same_handle(&second));
        assert_eq!(scripted.calls.lock().unwrap().len(), 1);
        assert_eq!(first.name(), "echo");

        let mut receiver: Instance = Box::new(());
        let out = first.invoke(&mut *receiver, &[Value::Int(9)]).unwrap();
        assert_eq!(out, Value::Int(9));
    }

    #[test]
    fn test_missing_method_is_memoized() {
        let scripted = Arc::new(Scripted::default());
        let table = table(scripted.clone());

        assert!(table.resolve_method("nope", &[]).is_none());
        assert!(table.resolve_method("nope", &[]).is_none());

        assert_eq!(scripted.calls.lock().unwrap().len(), 1);
        let key = KeyFactory::member_key(&TypeRef::named("Person"), "nope", &[]);
        assert_eq!(table.state(&key), MemberState::Missing);
    }

    #[test]
    fn test_parameter_types_distinguish_keys() {
        let scripted = Arc::new(Scripted::default());
        let table = table(scripted.clone());

        assert!(table.resolve_method("echo", &[TypeRef::named("int")]).is_some());
        assert!(table.resolve_method("echo", &[TypeRef::named("str")]).is_none());
        assert_eq!(scripted.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_constructor_resolution() {
        let scripted = Arc::new(Scripted::default());
        let table = table(scripted.clone());

        let ctor = table.resolve_constructor(&[]).expect("default constructor");
        assert!(ctor.params().is_empty());
        assert!(ctor.construct(&[]).unwrap().downcast_ref::<()>().is_some());

        assert!(table.resolve_constructor(&[TypeRef::named("int")]).is_none());
        assert!(table.resolve_constructor(&[TypeRef::named("int")]).is_none());
        assert_eq!(scripted.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_method_named_init_is_not_constructor() {
        let scripted = Arc::new(Scripted::default());
        let table = table(scripted.clone());

        assert!(table.resolve_constructor(&[]).is_some());
        assert!(table.resolve_method("<init>", &[]).is_none());
        assert_eq!(scripted.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_state_transitions() {
        let table = table(Arc::new(Scripted::default()));
        let int = [TypeRef::named("int")];
        let key = KeyFactory::member_key(&TypeRef::named("Person"), "echo", &int);

        assert_eq!(table.state(&key), MemberState::Unset);
        table.resolve(&key);
        assert_eq!(table.state(&key), MemberState::Resolved);
    }

    #[test]
    fn test_foreign_target_key_is_rejected() {
        let scripted = Arc::new(Scripted::default());
        let table = table(scripted.clone());
        let key =
            KeyFactory::member_key(&TypeRef::named("Other"), "echo", &[TypeRef::named("int")]);

        assert!(table.resolve(&key).is_none());
        assert!(scripted.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let table = table(Arc::new(Scripted::default()));
        table.resolve_method("echo", &[TypeRef::named("int")]);
        table.resolve_method("a", &[]);
        table.resolve_method("a", &[]);
        table.resolve_constructor(&[]);

        let stats = table.stats();
        assert_eq!(stats.introspections, 3);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.missing, 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_no_introspection() {
        let table = table(Arc::new(NoIntrospection));
        assert!(table.resolve_method("x", &[]).is_none());
        assert!(table.resolve_constructor(&[]).is_none());
        assert_eq!(table.stats().missing, 2);
    }

    #[test]
    fn test_invoke_error_passes_through() {
        struct Failing;
        impl MethodHandle for Failing {
            fn invoke(
                &self,
                _r: &mut (dyn Any + Send + Sync),
                _a: &[Value],
            ) -> StencilResult<Value> {
                Err(stencil_core::InvokeError::Failed {
                    member: "boom".to_string(),
                    reason: "always".to_string(),
                }
                .into())
            }
        }
        struct One;
        impl Introspector for One {
            fn find_method(
                &self,
                _t: &TypeRef,
                _n: &str,
                _p: &[TypeRef],
            ) -> Result<Arc<dyn MethodHandle>, IntrospectError> {
                Ok(Arc::new(Failing))
            }
            fn find_constructor(
                &self,
                _t: &TypeRef,
                _p: &[TypeRef],
            ) -> Result<Arc<dyn ConstructorHandle>, IntrospectError> {
                Err(IntrospectError::Other {
                    reason: "none".to_string(),
                })
            }
        }

        let table = table(Arc::new(One));
        let proxy = table.resolve_method("boom", &[]).unwrap();
        let mut receiver: Instance = Box::new(());
        assert!(matches!(
            proxy.invoke(&mut *receiver, &[]),
            Err(StencilError::Invoke(_))
        ));
    }
}
