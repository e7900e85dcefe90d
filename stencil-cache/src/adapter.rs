//! Accessor adapters handed out by the cache.

use std::fmt;

use chrono::Utc;
use stencil_core::{
    AccessError, AdapterShell, ArgumentError, DomainId, Instance, StencilResult, StructuralKey,
    Timestamp, TypeRef, Value,
};

use crate::members::{ConstructorProxy, MemberStats, MemberTable, MethodProxy};

/// Construction and bulk property access for one structural description.
///
/// The structural fields live in the adapter's [`StructuralKey`], which owns
/// copies of the sequences the adapter was requested with. Accessors that
/// return sequences hand out fresh copies.
pub struct Adapter {
    domain: DomainId,
    key: StructuralKey,
    shell: Box<dyn AdapterShell>,
    members: MemberTable,
    created_at: Timestamp,
}

impl Adapter {
    pub(crate) fn new(
        domain: DomainId,
        key: StructuralKey,
        shell: Box<dyn AdapterShell>,
        members: MemberTable,
    ) -> Self {
        Self {
            domain,
            key,
            shell,
            members,
            created_at: Utc::now(),
        }
    }

    pub fn target(&self) -> &TypeRef {
        self.key.target()
    }

    /// Domain whose partition owns this adapter.
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn key(&self) -> &StructuralKey {
        &self.key
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn property_count(&self) -> usize {
        self.key.property_count()
    }

    pub fn getter_names(&self) -> Vec<String> {
        self.key.getters().to_vec()
    }

    pub fn setter_names(&self) -> Vec<String> {
        self.key.setters().to_vec()
    }

    pub fn property_types(&self) -> Vec<TypeRef> {
        self.key.types().to_vec()
    }

    /// Construct a default instance of the target type.
    pub fn new_instance(&self) -> StencilResult<Instance> {
        self.shell.new_instance()
    }

    /// Read every configured property, in getter order.
    pub fn get_property_values(&self, instance: &Instance) -> StencilResult<Vec<Value>> {
        let values = self.shell.get_values(&**instance, self.key.getters())?;
        if values.len() != self.key.getters().len() {
            return Err(AccessError::ShellContract {
                target: self.target().clone(),
                reason: format!(
                    "returned {} values for {} getters",
                    values.len(),
                    self.key.getters().len()
                ),
            }
            .into());
        }
        Ok(values)
    }

    /// Write every configured property, in setter order.
    ///
    /// The value count is checked before anything is written.
    pub fn set_property_values(
        &self,
        instance: &mut Instance,
        values: Vec<Value>,
    ) -> StencilResult<()> {
        let expected = self.key.setters().len();
        if values.len() != expected {
            return Err(ArgumentError::PropertyCountMismatch {
                target: self.target().clone(),
                expected,
                got: values.len(),
            }
            .into());
        }
        self.shell.set_values(&mut **instance, self.key.setters(), values)
    }

    /// Resolve a method on the target type. See [`MemberTable::resolve_method`].
    pub fn resolve_method(&self, name: &str, params: &[TypeRef]) -> Option<MethodProxy> {
        self.members.resolve_method(name, params)
    }

    /// Resolve a constructor on the target type.
    pub fn resolve_constructor(&self, params: &[TypeRef]) -> Option<ConstructorProxy> {
        self.members.resolve_constructor(params)
    }

    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    pub fn member_stats(&self) -> MemberStats {
        self.members.stats()
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("domain", &self.domain)
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Arc;
    use stencil_core::{KeyFactory, NoIntrospection, StencilError};

    /// Shell over a `Vec<i64>`, one slot per property.
    struct SlotShell {
        width: usize,
    }

    impl AdapterShell for SlotShell {
        fn new_instance(&self) -> StencilResult<Instance> {
            Ok(Box::new(vec![0i64; self.width]))
        }

        fn get_values(
            &self,
            instance: &(dyn Any + Send + Sync),
            getters: &[String],
        ) -> StencilResult<Vec<Value>> {
            let slots = instance.downcast_ref::<Vec<i64>>().ok_or(AccessError::WrongInstance {
                expected: TypeRef::named("Slots"),
            })?;
            Ok(slots.iter().take(getters.len()).map(|v| Value::Int(*v)).collect())
        }

        fn set_values(
            &self,
            instance: &mut (dyn Any + Send + Sync),
            _setters: &[String],
            values: Vec<Value>,
        ) -> StencilResult<()> {
            let slots = instance.downcast_mut::<Vec<i64>>().ok_or(AccessError::WrongInstance {
                expected: TypeRef::named("Slots"),
            })?;
            for (slot, value) in slots.iter_mut().zip(values) {
                *slot = value.as_int().unwrap_or_default();
            }
            Ok(())
        }
    }

    fn adapter(names: &[&str], width: usize) -> Adapter {
        let types = vec![TypeRef::named("int"); names.len()];
        let key = KeyFactory::structural_key(&TypeRef::named("Slots"), names, names, &types);
        let members = MemberTable::new(key.target().clone(), Arc::new(NoIntrospection), 0);
        Adapter::new(DomainId::now_v7(), key, Box::new(SlotShell { width }), members)
    }

    #[test]
    fn test_round_trip() {
        let adapter = adapter(&["a", "b"], 2);
        let mut instance = adapter.new_instance().unwrap();

        adapter
            .set_property_values(&mut instance, vec![Value::Int(5), Value::Int(6)])
            .unwrap();
        assert_eq!(
            adapter.get_property_values(&instance).unwrap(),
            vec![Value::Int(5), Value::Int(6)]
        );
    }

    #[test]
    fn test_count_mismatch_leaves_instance_untouched() {
        let adapter = adapter(&["a", "b"], 2);
        let mut instance = adapter.new_instance().unwrap();

        let err = adapter
            .set_property_values(&mut instance, vec![Value::Int(1)])
            .unwrap_err();
        assert!(matches!(
            err,
            StencilError::Argument(ArgumentError::PropertyCountMismatch {
                expected: 2,
                got: 1,
                ..
            })
        ));
        assert_eq!(
            adapter.get_property_values(&instance).unwrap(),
            vec![Value::Int(0), Value::Int(0)]
        );
    }

    #[test]
    fn test_short_shell_output_is_contract_error() {
        let adapter = adapter(&["a", "b", "c"], 2);
        let instance = adapter.new_instance().unwrap();
        assert!(matches!(
            adapter.get_property_values(&instance),
            Err(StencilError::Access(AccessError::ShellContract { .. }))
        ));
    }

    #[test]
    fn test_wrong_instance_type() {
        let adapter = adapter(&["a"], 1);
        let instance: Instance = Box::new("not slots");
        assert!(matches!(
            adapter.get_property_values(&instance),
            Err(StencilError::Access(AccessError::WrongInstance { .. }))
        ));
    }

    #[test]
    fn test_defensive_copies() {
        let adapter = adapter(&["a", "b"], 2);

        let mut getters = adapter.getter_names();
        getters.clear();
        let mut types = adapter.property_types();
        types[0] = TypeRef::named("str");

        assert_eq!(adapter.getter_names(), vec!["a", "b"]);
        assert_eq!(adapter.setter_names(), vec!["a", "b"]);
        assert_eq!(adapter.property_types()[0], TypeRef::named("int"));
    }

    #[test]
    fn test_zero_properties() {
        let adapter = adapter(&[], 0);
        let mut instance = adapter.new_instance().unwrap();
        assert!(adapter.get_property_values(&instance).unwrap().is_empty());
        adapter.set_property_values(&mut instance, vec![]).unwrap();
        assert_eq!(adapter.property_count(), 0);
    }
}
