//! STENCIL Test Utilities
//!
//! Centralized test infrastructure for the STENCIL workspace:
//! - A dynamic [`Record`] type and a shell/generator pair adapting it
//! - A call-counting introspector with scriptable members
//! - Proptest generators for structural descriptions and values
//! - Test fixtures for common scenarios

// Re-export core types for convenience
pub use stencil_core::{
    AccessError, AdapterGenerator, AdapterShell, ConstructorHandle, GeneratorError, Instance,
    IntrospectError, Introspector, InvokeError, IsolationDomain, MethodHandle, StencilError,
    StencilResult, StructuralDescription, TypeRef, Value,
};

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// RECORD
// ============================================================================

/// A dynamically typed record: a type name plus named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    target: TypeRef,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(target: TypeRef) -> Self {
        Self {
            target,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn target(&self) -> &TypeRef {
        &self.target
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Box this record as an adapter instance.
    pub fn into_instance(self) -> Instance {
        Box::new(self)
    }
}

/// Value kind expected for a property type, if the type is one of the
/// primitive names the record shell understands.
fn kind_for(ty: &TypeRef) -> Option<&'static str> {
    match ty.name() {
        "int" | "i32" | "i64" => Some("int"),
        "float" | "f32" | "f64" => Some("float"),
        "bool" => Some("bool"),
        "str" | "String" | "alloc::string::String" => Some("str"),
        "bytes" => Some("bytes"),
        "list" => Some("list"),
        _ => None,
    }
}

fn default_for(ty: &TypeRef) -> Value {
    match kind_for(ty) {
        Some("int") => Value::Int(0),
        Some("float") => Value::Float(0.0),
        Some("bool") => Value::Bool(false),
        Some("str") => Value::Str(String::new()),
        Some("bytes") => Value::Bytes(Vec::new()),
        Some("list") => Value::List(Vec::new()),
        _ => Value::Null,
    }
}

// ============================================================================
// RECORD SHELL + GENERATOR
// ============================================================================

/// Adapter shell over [`Record`]s of one target type.
///
/// Writes are all-or-nothing: every value is type-checked before any field
/// is touched.
#[derive(Debug, Clone)]
pub struct RecordShell {
    target: TypeRef,
    defaults: Vec<(String, Value)>,
    setter_types: HashMap<String, TypeRef>,
}

impl RecordShell {
    pub fn new(description: &StructuralDescription) -> Self {
        let mut defaults = Vec::new();
        let mut setter_types = HashMap::new();
        for (name, ty) in description.getters().iter().zip(description.types()) {
            defaults.push((name.clone(), default_for(ty)));
        }
        for (name, ty) in description.setters().iter().zip(description.types()) {
            if !defaults.iter().any(|(existing, _)| existing == name) {
                defaults.push((name.clone(), default_for(ty)));
            }
            setter_types.insert(name.clone(), ty.clone());
        }
        Self {
            target: description.target().clone(),
            defaults,
            setter_types,
        }
    }

    fn wrong_instance(&self) -> StencilError {
        AccessError::WrongInstance {
            expected: self.target.clone(),
        }
        .into()
    }
}

impl AdapterShell for RecordShell {
    fn new_instance(&self) -> StencilResult<Instance> {
        let mut record = Record::new(self.target.clone());
        for (name, value) in &self.defaults {
            record.set(name.clone(), value.clone());
        }
        Ok(record.into_instance())
    }

    fn get_values(
        &self,
        instance: &(dyn Any + Send + Sync),
        getters: &[String],
    ) -> StencilResult<Vec<Value>> {
        let record = instance
            .downcast_ref::<Record>()
            .filter(|record| record.target == self.target)
            .ok_or_else(|| self.wrong_instance())?;

        getters
            .iter()
            .map(|getter| {
                record.get(getter).cloned().ok_or_else(|| {
                    StencilError::from(AccessError::UnknownProperty {
                        target: self.target.clone(),
                        property: getter.clone(),
                    })
                })
            })
            .collect()
    }

    fn set_values(
        &self,
        instance: &mut (dyn Any + Send + Sync),
        setters: &[String],
        values: Vec<Value>,
    ) -> StencilResult<()> {
        let record = match instance.downcast_mut::<Record>() {
            Some(record) if record.target == self.target => record,
            _ => return Err(self.wrong_instance()),
        };

        for (setter, value) in setters.iter().zip(&values) {
            let expected = self.setter_types.get(setter).and_then(kind_for);
            if let Some(expected) = expected {
                if !value.is_null() && value.kind() != expected {
                    return Err(AccessError::TypeMismatch {
                        property: setter.clone(),
                        expected: expected.to_string(),
                        got: value.kind().to_string(),
                    }
                    .into());
                }
            }
        }

        for (setter, value) in setters.iter().zip(values) {
            record.set(setter.clone(), value);
        }
        Ok(())
    }
}

/// Generator producing [`RecordShell`]s, counting its invocations.
#[derive(Debug, Default)]
pub struct RecordGenerator {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` generations.
    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Sleep inside every generation, widening race windows in
    /// concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AdapterGenerator for RecordGenerator {
    fn generate(
        &self,
        description: &StructuralDescription,
    ) -> StencilResult<Box<dyn AdapterShell>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(GeneratorError::Failed {
                target: description.target().clone(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(Box::new(RecordShell::new(description)))
    }
}

// ============================================================================
// MEMBER HANDLES
// ============================================================================

fn record_mut<'a>(
    receiver: &'a mut (dyn Any + Send + Sync),
    target: &TypeRef,
) -> StencilResult<&'a mut Record> {
    match receiver.downcast_mut::<Record>() {
        Some(record) if &record.target == target => Ok(record),
        _ => Err(InvokeError::WrongReceiver {
            expected: target.clone(),
        }
        .into()),
    }
}

fn check_arity(member: &str, expected: usize, args: &[Value]) -> StencilResult<()> {
    if args.len() != expected {
        return Err(InvokeError::ArityMismatch {
            member: member.to_string(),
            expected,
            got: args.len(),
        }
        .into());
    }
    Ok(())
}

/// Method returning one field of a [`Record`].
#[derive(Debug, Clone)]
pub struct FieldGetter {
    target: TypeRef,
    field: String,
}

impl MethodHandle for FieldGetter {
    fn invoke(
        &self,
        receiver: &mut (dyn Any + Send + Sync),
        args: &[Value],
    ) -> StencilResult<Value> {
        check_arity(&self.field, 0, args)?;
        let record = record_mut(receiver, &self.target)?;
        Ok(record.get(&self.field).cloned().unwrap_or_default())
    }
}

/// Method assigning one field of a [`Record`].
#[derive(Debug, Clone)]
pub struct FieldSetter {
    target: TypeRef,
    field: String,
}

impl MethodHandle for FieldSetter {
    fn invoke(
        &self,
        receiver: &mut (dyn Any + Send + Sync),
        args: &[Value],
    ) -> StencilResult<Value> {
        check_arity(&self.field, 1, args)?;
        let record = record_mut(receiver, &self.target)?;
        record.set(self.field.clone(), args[0].clone());
        Ok(Value::Null)
    }
}

/// Constructor building a [`Record`] from positional field values.
#[derive(Debug, Clone)]
pub struct RecordConstructor {
    target: TypeRef,
    fields: Vec<String>,
}

impl ConstructorHandle for RecordConstructor {
    fn construct(&self, args: &[Value]) -> StencilResult<Instance> {
        check_arity(stencil_core::CONSTRUCTOR_NAME, self.fields.len(), args)?;
        let mut record = Record::new(self.target.clone());
        for (field, value) in self.fields.iter().zip(args) {
            record.set(field.clone(), value.clone());
        }
        Ok(record.into_instance())
    }
}

// ============================================================================
// COUNTING INTROSPECTOR
// ============================================================================

type MethodSignature = (TypeRef, String, Vec<TypeRef>);
type ConstructorSignature = (TypeRef, Vec<TypeRef>);

/// Introspector answering from a fixed table of members and counting every
/// lookup, found or not.
#[derive(Default)]
pub struct CountingIntrospector {
    methods: HashMap<MethodSignature, Arc<dyn MethodHandle>>,
    constructors: HashMap<ConstructorSignature, Arc<dyn ConstructorHandle>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(
        mut self,
        target: &TypeRef,
        name: &str,
        params: &[TypeRef],
        handle: impl MethodHandle + 'static,
    ) -> Self {
        self.methods.insert(
            (target.clone(), name.to_string(), params.to_vec()),
            Arc::new(handle),
        );
        self
    }

    /// Register `name()` returning `field`.
    pub fn with_field_getter(self, target: &TypeRef, name: &str, field: &str) -> Self {
        let handle = FieldGetter {
            target: target.clone(),
            field: field.to_string(),
        };
        self.with_method(target, name, &[], handle)
    }

    /// Register `name(param)` assigning `field`.
    pub fn with_field_setter(
        self,
        target: &TypeRef,
        name: &str,
        field: &str,
        param: TypeRef,
    ) -> Self {
        let handle = FieldSetter {
            target: target.clone(),
            field: field.to_string(),
        };
        self.with_method(target, name, &[param], handle)
    }

    /// Register a constructor taking one argument per field.
    pub fn with_record_constructor(mut self, target: &TypeRef, fields: &[(&str, TypeRef)]) -> Self {
        let params: Vec<TypeRef> = fields.iter().map(|(_, ty)| ty.clone()).collect();
        let handle = RecordConstructor {
            target: target.clone(),
            fields: fields.iter().map(|(name, _)| name.to_string()).collect(),
        };
        self.constructors
            .insert((target.clone(), params), Arc::new(handle));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total lookups performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }
}

impl Introspector for CountingIntrospector {
    fn find_method(
        &self,
        target: &TypeRef,
        name: &str,
        params: &[TypeRef],
    ) -> Result<Arc<dyn MethodHandle>, IntrospectError> {
        self.record_call();
        self.methods
            .get(&(target.clone(), name.to_string(), params.to_vec()))
            .cloned()
            .ok_or_else(|| IntrospectError::NotFound {
                target: target.clone(),
                member: name.to_string(),
            })
    }

    fn find_constructor(
        &self,
        target: &TypeRef,
        params: &[TypeRef],
    ) -> Result<Arc<dyn ConstructorHandle>, IntrospectError> {
        self.record_call();
        self.constructors
            .get(&(target.clone(), params.to_vec()))
            .cloned()
            .ok_or_else(|| IntrospectError::NotFound {
                target: target.clone(),
                member: stencil_core::CONSTRUCTOR_NAME.to_string(),
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Common types, descriptions and records.

    use super::*;

    pub fn person_type() -> TypeRef {
        TypeRef::named("Person")
    }

    pub fn int_type() -> TypeRef {
        TypeRef::named("int")
    }

    pub fn str_type() -> TypeRef {
        TypeRef::named("str")
    }

    /// `Person` with int properties `a` and `b`, readable and writable.
    pub fn ab_description() -> StructuralDescription {
        StructuralDescription::from_parts(
            &person_type(),
            &["a", "b"],
            &["a", "b"],
            &[int_type(), int_type()],
        )
    }

    /// `Person { a, b }` as an adapter instance.
    pub fn record_ab(a: i64, b: i64) -> Instance {
        Record::new(person_type())
            .with("a", a)
            .with("b", b)
            .into_instance()
    }

    /// Read back a record from an instance produced by a record shell.
    pub fn as_record(instance: &Instance) -> &Record {
        instance
            .downcast_ref::<Record>()
            .expect("instance is a Record")
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating STENCIL inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a type reference from a small alphabet of names.
    pub fn arb_type_ref() -> impl Strategy<Value = TypeRef> {
        prop_oneof![
            Just(TypeRef::named("int")),
            Just(TypeRef::named("str")),
            Just(TypeRef::named("bool")),
            Just(TypeRef::named("float")),
            "[A-Z][a-z]{1,6}".prop_map(TypeRef::from),
        ]
    }

    /// Generate a property name.
    pub fn arb_property_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9]{0,7}"
    }

    /// Generate a valid structural description with independent getter and
    /// setter names.
    pub fn arb_description() -> impl Strategy<Value = StructuralDescription> {
        (0usize..6).prop_flat_map(|n| {
            (
                "[A-Z][a-z]{1,6}".prop_map(TypeRef::from),
                prop::collection::vec(arb_property_name(), n),
                prop::collection::vec(arb_property_name(), n),
                prop::collection::vec(arb_type_ref(), n),
            )
                .prop_map(|(target, getters, setters, types)| {
                    StructuralDescription::new(target, getters, setters, types)
                })
        })
    }

    /// Generate a description whose getters and setters are the same
    /// distinct int properties, so values written can be read back.
    pub fn arb_int_description() -> impl Strategy<Value = StructuralDescription> {
        prop::collection::btree_set(arb_property_name(), 0..6).prop_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let types = vec![TypeRef::named("int"); names.len()];
            StructuralDescription::new(TypeRef::named("Person"), names.clone(), names, types)
        })
    }

    /// Generate `n` int values.
    pub fn arb_int_values(n: usize) -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(any::<i64>().prop_map(Value::Int), n)
    }

    /// Generate a description together with a matching value row.
    pub fn arb_int_row() -> impl Strategy<Value = (StructuralDescription, Vec<Value>)> {
        arb_int_description().prop_flat_map(|desc| {
            let n = desc.property_count();
            (Just(desc), arb_int_values(n))
        })
    }
}
