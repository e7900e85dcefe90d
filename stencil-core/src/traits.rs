//! Collaborator traits at the edges of the cache
//!
//! The adapter cache does not know how adapters are manufactured nor how
//! members are looked up. Both are strategy objects supplied by the caller:
//!
//! - [`AdapterGenerator`] produces an [`AdapterShell`] for a structural
//!   description.
//! - [`Introspector`] resolves methods and constructors to callable handles.

use crate::error::{IntrospectError, StencilResult};
use crate::identity::TypeRef;
use crate::key::StructuralDescription;
use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

/// An instance of an adapted type.
///
/// Adapters never look inside instances themselves; shells downcast to the
/// concrete type they were generated for.
pub type Instance = Box<dyn Any + Send + Sync>;

/// Generated accessor implementation for one structural description.
///
/// A shell is stateless with respect to the description: the adapter passes
/// its own copies of the getter and setter names on every call.
pub trait AdapterShell: Send + Sync {
    /// Construct a default instance of the target type.
    fn new_instance(&self) -> StencilResult<Instance>;

    /// Read one value per getter, in getter order.
    fn get_values(&self, instance: &(dyn Any + Send + Sync), getters: &[String])
        -> StencilResult<Vec<Value>>;

    /// Apply one value per setter, in setter order.
    ///
    /// `values.len() == setters.len()` is guaranteed by the caller.
    fn set_values(
        &self,
        instance: &mut (dyn Any + Send + Sync),
        setters: &[String],
        values: Vec<Value>,
    ) -> StencilResult<()>;
}

/// Factory producing adapter shells.
///
/// Invoked by the cache at most once per (domain, structural key).
pub trait AdapterGenerator: Send + Sync {
    fn generate(&self, description: &StructuralDescription) -> StencilResult<Box<dyn AdapterShell>>;
}

impl<F> AdapterGenerator for F
where
    F: Fn(&StructuralDescription) -> StencilResult<Box<dyn AdapterShell>> + Send + Sync,
{
    fn generate(
        &self,
        description: &StructuralDescription,
    ) -> StencilResult<Box<dyn AdapterShell>> {
        self(description)
    }
}

/// A resolved method.
pub trait MethodHandle: Send + Sync {
    fn invoke(
        &self,
        receiver: &mut (dyn Any + Send + Sync),
        args: &[Value],
    ) -> StencilResult<Value>;
}

/// A resolved constructor.
pub trait ConstructorHandle: Send + Sync {
    fn construct(&self, args: &[Value]) -> StencilResult<Instance>;
}

/// Member lookup by name and parameter types.
///
/// Any error is treated as "not found" by the member resolver.
pub trait Introspector: Send + Sync {
    fn find_method(
        &self,
        target: &TypeRef,
        name: &str,
        params: &[TypeRef],
    ) -> Result<Arc<dyn MethodHandle>, IntrospectError>;

    fn find_constructor(
        &self,
        target: &TypeRef,
        params: &[TypeRef],
    ) -> Result<Arc<dyn ConstructorHandle>, IntrospectError>;
}

/// Introspector that resolves nothing.
///
/// For caches whose adapters only need bulk property access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIntrospection;

impl Introspector for NoIntrospection {
    fn find_method(
        &self,
        target: &TypeRef,
        name: &str,
        _params: &[TypeRef],
    ) -> Result<Arc<dyn MethodHandle>, IntrospectError> {
        Err(IntrospectError::NotFound {
            target: target.clone(),
            member: name.to_string(),
        })
    }

    fn find_constructor(
        &self,
        target: &TypeRef,
        _params: &[TypeRef],
    ) -> Result<Arc<dyn ConstructorHandle>, IntrospectError> {
        Err(IntrospectError::NotFound {
            target: target.clone(),
            member: crate::key::CONSTRUCTOR_NAME.to_string(),
        })
    }
}
