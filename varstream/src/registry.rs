//! Process-wide catalog of type streamers, enums, and classes.
//!
//! The registry is built once at startup through [`TypeRegistryBuilder`],
//! frozen into an `Arc<TypeRegistry>`, and shared read-only by every codec
//! session. Registration is idempotent and first-writer-wins: a later
//! registration under an already-taken ID or name is ignored.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::object::DynamicObject;
use crate::streamer::{EnumStreamer, StreamerRef};

/// A stable integer identifying a registered type.
///
/// IDs are chosen by the registering caller and must be stable across both
/// ends of a connection only in the sense that *names* negotiate the wire;
/// the ID is a process-local lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TypeId(u32);

impl TypeId {
    /// Creates a type ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// One key of an enumeration: a stable name bound to an integer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumKey {
    pub name: String,
    pub value: i32,
}

impl EnumKey {
    /// Creates an enum key.
    #[must_use]
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// An enumeration declared by a class, scoped by the class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub keys: Vec<EnumKey>,
    /// Flag enums combine keys bitwise; each transmitted bit maps
    /// independently.
    pub is_flag: bool,
}

impl EnumDef {
    /// Declares a plain enumeration.
    #[must_use]
    pub fn new(name: impl Into<String>, keys: Vec<EnumKey>) -> Self {
        Self {
            name: name.into(),
            keys,
            is_flag: false,
        }
    }

    /// Declares a flag enumeration.
    #[must_use]
    pub fn flags(name: impl Into<String>, keys: Vec<EnumKey>) -> Self {
        Self {
            name: name.into(),
            keys,
            is_flag: true,
        }
    }
}

/// The declared type of a storable property.
#[derive(Debug, Clone)]
pub enum PropertyType {
    /// A concrete streamer.
    Streamer(StreamerRef),
    /// An enumeration resolved at registry build time.
    Enum { scope: String, name: String },
}

/// A storable property declaration.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub ty: PropertyType,
}

impl PropertyDef {
    /// Declares a property with a concrete streamer.
    #[must_use]
    pub fn new(name: impl Into<String>, streamer: StreamerRef) -> Self {
        Self {
            name: name.into(),
            ty: PropertyType::Streamer(streamer),
        }
    }

    /// Declares a property whose type is a registered enumeration.
    #[must_use]
    pub fn enumeration(
        name: impl Into<String>,
        scope: impl Into<String>,
        enum_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty: PropertyType::Enum {
                scope: scope.into(),
                name: enum_name.into(),
            },
        }
    }
}

/// Factory producing a zero-state instance of a class.
pub type ObjectFactory = Box<dyn Fn() -> Box<dyn DynamicObject> + Send + Sync>;

/// A class registration: name, ancestry, storable properties, declared
/// enumerations, and an instance factory.
pub struct ClassDef {
    name: String,
    ancestors: Vec<String>,
    properties: Vec<PropertyDef>,
    enums: Vec<EnumDef>,
    factory: ObjectFactory,
}

impl ClassDef {
    /// Starts a class registration.
    #[must_use]
    pub fn new(name: impl Into<String>, factory: ObjectFactory) -> Self {
        Self {
            name: name.into(),
            ancestors: Vec::new(),
            properties: Vec::new(),
            enums: Vec::new(),
            factory,
        }
    }

    /// Appends an ancestor, nearest first.
    #[must_use]
    pub fn ancestor(mut self, name: impl Into<String>) -> Self {
        self.ancestors.push(name.into());
        self
    }

    /// Appends a storable property.
    #[must_use]
    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Declares an enumeration scoped by this class.
    #[must_use]
    pub fn enumeration(mut self, def: EnumDef) -> Self {
        self.enums.push(def);
        self
    }
}

/// A resolved storable property.
#[derive(Debug, Clone)]
pub struct ClassProperty {
    pub name: String,
    pub streamer: StreamerRef,
}

/// A frozen class descriptor.
pub struct ClassDescriptor {
    name: String,
    ancestors: Vec<String>,
    properties: Vec<ClassProperty>,
    factory: ObjectFactory,
}

impl ClassDescriptor {
    /// The registered class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ancestor class names, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// The storable properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[ClassProperty] {
        &self.properties
    }

    /// Resolves a property name to its index.
    #[must_use]
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Produces a zero-state instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn DynamicObject> {
        (self.factory)()
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("ancestors", &self.ancestors)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Result type for registry construction.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while freezing a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A property referenced an enumeration that no class declares.
    UnknownEnum { scope: String, name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEnum { scope, name } => {
                write!(f, "property references undeclared enum {scope}::{name}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Builder for [`TypeRegistry`]. Starts with the built-in simple streamers
/// already registered.
pub struct TypeRegistryBuilder {
    streamers: Vec<StreamerRef>,
    classes: Vec<ClassDef>,
}

impl TypeRegistryBuilder {
    /// Creates a builder pre-populated with the built-in streamers.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            streamers: Vec::new(),
            classes: Vec::new(),
        };
        crate::builtin::register_defaults(&mut builder);
        builder
    }

    /// Registers a streamer. First registration under an ID or name wins.
    pub fn register_streamer(&mut self, streamer: StreamerRef) -> &mut Self {
        self.streamers.push(streamer);
        self
    }

    /// Registers a class with its ancestry, properties, and enums.
    pub fn register_class(&mut self, class: ClassDef) -> &mut Self {
        self.classes.push(class);
        self
    }

    /// Freezes the registry: materializes enum streamers from class
    /// declarations, resolves property types, and builds the lookup tables.
    pub fn build(self) -> RegistryResult<Arc<TypeRegistry>> {
        let mut enum_streamers: HashMap<(String, String), StreamerRef> = HashMap::new();
        for class in &self.classes {
            for def in &class.enums {
                let key = (class.name.clone(), def.name.clone());
                enum_streamers
                    .entry(key)
                    .or_insert_with(|| EnumStreamer::materialize(&class.name, def));
            }
        }

        let mut by_id: HashMap<TypeId, StreamerRef> = HashMap::new();
        let mut by_name: HashMap<String, StreamerRef> = HashMap::new();
        for streamer in self.streamers {
            by_id.entry(streamer.type_id()).or_insert_with(|| streamer.clone());
            by_name
                .entry(streamer.name().to_owned())
                .or_insert(streamer);
        }
        for streamer in enum_streamers.values() {
            by_name
                .entry(streamer.name().to_owned())
                .or_insert_with(|| streamer.clone());
        }

        let mut classes: HashMap<String, Arc<ClassDescriptor>> = HashMap::new();
        let mut subclasses: HashMap<String, Vec<Arc<ClassDescriptor>>> = HashMap::new();
        for class in self.classes {
            let mut properties = Vec::with_capacity(class.properties.len());
            for property in class.properties {
                let streamer = match property.ty {
                    PropertyType::Streamer(streamer) => streamer,
                    PropertyType::Enum { scope, name } => enum_streamers
                        .get(&(scope.clone(), name.clone()))
                        .cloned()
                        .ok_or(RegistryError::UnknownEnum { scope, name })?,
                };
                properties.push(ClassProperty {
                    name: property.name,
                    streamer,
                });
            }
            let descriptor = Arc::new(ClassDescriptor {
                name: class.name,
                ancestors: class.ancestors,
                properties,
                factory: class.factory,
            });
            if classes.contains_key(descriptor.name()) {
                continue;
            }
            subclasses
                .entry(descriptor.name().to_owned())
                .or_default()
                .push(descriptor.clone());
            for ancestor in descriptor.ancestors() {
                subclasses
                    .entry(ancestor.clone())
                    .or_default()
                    .push(descriptor.clone());
            }
            classes.insert(descriptor.name().to_owned(), descriptor);
        }

        Ok(Arc::new(TypeRegistry {
            by_id,
            by_name,
            enum_streamers,
            classes,
            subclasses,
        }))
    }
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The frozen, shareable catalog.
#[derive(Debug)]
pub struct TypeRegistry {
    by_id: HashMap<TypeId, StreamerRef>,
    by_name: HashMap<String, StreamerRef>,
    enum_streamers: HashMap<(String, String), StreamerRef>,
    classes: HashMap<String, Arc<ClassDescriptor>>,
    subclasses: HashMap<String, Vec<Arc<ClassDescriptor>>>,
}

impl TypeRegistry {
    /// Looks up a streamer by type ID.
    #[must_use]
    pub fn streamer(&self, id: TypeId) -> Option<&StreamerRef> {
        self.by_id.get(&id)
    }

    /// Looks up a streamer by name, covering registered types and
    /// materialized enums.
    #[must_use]
    pub fn streamer_by_name(&self, name: &str) -> Option<&StreamerRef> {
        self.by_name.get(name)
    }

    /// Looks up an enum streamer by scope and name.
    #[must_use]
    pub fn enum_streamer(&self, scope: &str, name: &str) -> Option<&StreamerRef> {
        self.enum_streamers
            .get(&(scope.to_owned(), name.to_owned()))
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&Arc<ClassDescriptor>> {
        self.classes.get(name)
    }

    /// Enumerates the registered subclasses of a class, including itself.
    #[must_use]
    pub fn subclasses(&self, name: &str) -> &[Arc<ClassDescriptor>] {
        self.subclasses.get(name).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::object::testing::Probe;
    use crate::value::Value;

    fn probe_factory() -> ObjectFactory {
        Box::new(|| {
            Box::new(Probe {
                label: String::new(),
                level: 0,
            })
        })
    }

    #[test]
    fn builder_includes_builtins() {
        let registry = TypeRegistryBuilder::new().build().unwrap();
        assert!(registry.streamer(builtin::BOOL).is_some());
        assert!(registry.streamer_by_name("int").is_some());
    }

    #[test]
    fn first_registration_wins() {
        let registry = TypeRegistryBuilder::new().build().unwrap();
        let bool_streamer = registry.streamer(builtin::BOOL).unwrap().clone();

        let mut builder = TypeRegistryBuilder::new();
        builder.register_streamer(bool_streamer);
        let registry = builder.build().unwrap();
        // The builtin registered by new() still answers for the name.
        assert_eq!(registry.streamer_by_name("bool").unwrap().name(), "bool");
    }

    #[test]
    fn class_registration_materializes_enums() {
        let mut builder = TypeRegistryBuilder::new();
        builder.register_class(
            ClassDef::new("Probe", probe_factory())
                .enumeration(EnumDef::new(
                    "Mode",
                    vec![EnumKey::new("Off", 0), EnumKey::new("On", 1)],
                ))
                .property(PropertyDef::enumeration("mode", "Probe", "Mode")),
        );
        let registry = builder.build().unwrap();

        let streamer = registry.enum_streamer("Probe", "Mode").unwrap();
        assert_eq!(streamer.name(), "Probe::Mode");
        assert!(registry.streamer_by_name("Probe::Mode").is_some());

        let class = registry.class("Probe").unwrap();
        assert_eq!(class.properties().len(), 1);
        assert_eq!(class.properties()[0].name, "mode");
    }

    #[test]
    fn unresolved_enum_property_is_an_error() {
        let mut builder = TypeRegistryBuilder::new();
        builder.register_class(
            ClassDef::new("Probe", probe_factory())
                .property(PropertyDef::enumeration("mode", "Probe", "Missing")),
        );
        let err = builder.build().unwrap_err();
        assert!(matches!(err, RegistryError::UnknownEnum { .. }));
    }

    #[test]
    fn subclass_enumeration_walks_ancestry() {
        let mut builder = TypeRegistryBuilder::new();
        builder.register_class(ClassDef::new("Base", probe_factory()));
        builder.register_class(ClassDef::new("Derived", probe_factory()).ancestor("Base"));
        let registry = builder.build().unwrap();

        let subclasses = registry.subclasses("Base");
        let names: Vec<&str> = subclasses.iter().map(|c| c.name()).collect();
        assert!(names.contains(&"Base"));
        assert!(names.contains(&"Derived"));
        assert_eq!(registry.subclasses("Derived").len(), 1);
        assert!(registry.subclasses("Unknown").is_empty());
    }

    #[test]
    fn factory_produces_zero_state_instances() {
        let mut builder = TypeRegistryBuilder::new();
        builder.register_class(ClassDef::new("Probe", probe_factory()));
        let registry = builder.build().unwrap();

        let instance = registry.class("Probe").unwrap().instantiate();
        assert_eq!(instance.class_name(), "Probe");
        assert_eq!(instance.property(0), Value::String(String::new()));
        assert_eq!(instance.property(1), Value::Int(0));
    }
}
