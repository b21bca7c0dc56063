//! Built-in streamers registered with every registry.
//!
//! The built-ins are process-wide singletons, built once and shared by every
//! registry, so exact-match comparisons (which are by identity) agree even
//! between registries built independently.

use std::sync::OnceLock;

use crate::registry::{TypeId, TypeRegistry, TypeRegistryBuilder};
use crate::streamer::{
    GenericStreamer, ListStreamer, MapStreamer, SetStreamer, SimpleKind, SimpleStreamer,
    StreamerRef,
};
use crate::value::Value;

pub const BOOL: TypeId = TypeId::new(1);
pub const INT: TypeId = TypeId::new(2);
pub const UINT: TypeId = TypeId::new(3);
pub const FLOAT: TypeId = TypeId::new(4);
pub const DOUBLE: TypeId = TypeId::new(5);
pub const BYTES: TypeId = TypeId::new(6);
pub const STRING: TypeId = TypeId::new(7);
pub const URL: TypeId = TypeId::new(8);
pub const COLOR: TypeId = TypeId::new(9);
pub const DATE_TIME: TypeId = TypeId::new(10);
pub const VEC3: TypeId = TypeId::new(11);
pub const QUAT: TypeId = TypeId::new(12);
pub const REGEX: TypeId = TypeId::new(13);
pub const VARIANT: TypeId = TypeId::new(14);
pub const SCRIPT: TypeId = TypeId::new(15);
pub const SHARED_OBJECT: TypeId = TypeId::new(16);
pub const GENERIC: TypeId = TypeId::new(17);
pub const VARIANT_LIST: TypeId = TypeId::new(18);
pub const VARIANT_MAP: TypeId = TypeId::new(19);
pub const VARIANT_SET: TypeId = TypeId::new(20);

/// Highest type ID claimed by the built-ins; user types start above this.
pub const FIRST_USER_TYPE_ID: u32 = 64;

fn all() -> &'static [StreamerRef] {
    static BUILTINS: OnceLock<Vec<StreamerRef>> = OnceLock::new();
    BUILTINS.get_or_init(|| {
        let variant = SimpleStreamer::new(VARIANT, "variant", SimpleKind::Variant);
        let string = SimpleStreamer::new(STRING, "string", SimpleKind::String);

        let mut streamers: Vec<StreamerRef> = [
            (BOOL, "bool", SimpleKind::Bool),
            (INT, "int", SimpleKind::Int),
            (UINT, "uint", SimpleKind::UInt),
            (FLOAT, "float", SimpleKind::Float),
            (DOUBLE, "double", SimpleKind::Double),
            (BYTES, "bytes", SimpleKind::Bytes),
            (URL, "url", SimpleKind::Url),
            (COLOR, "color", SimpleKind::Color),
            (DATE_TIME, "datetime", SimpleKind::DateTime),
            (VEC3, "vec3", SimpleKind::Vec3),
            (QUAT, "quat", SimpleKind::Quat),
            (REGEX, "regex", SimpleKind::Regex),
            (SCRIPT, "script", SimpleKind::Script),
            (SHARED_OBJECT, "shared", SimpleKind::SharedObject),
        ]
        .into_iter()
        .map(|(id, name, kind)| SimpleStreamer::new(id, name, kind))
        .collect();
        streamers.push(variant.clone());
        streamers.push(string.clone());
        streamers.push(GenericStreamer::new(GENERIC));
        streamers.push(ListStreamer::new(
            VARIANT_LIST,
            "variant-list",
            variant.clone(),
        ));
        streamers.push(SetStreamer::new(
            VARIANT_SET,
            "variant-set",
            variant.clone(),
        ));
        streamers.push(MapStreamer::new(VARIANT_MAP, "variant-map", string, variant));
        streamers
    })
}

/// Returns the process-wide instance of a built-in streamer.
#[must_use]
pub fn streamer(id: TypeId) -> Option<StreamerRef> {
    all().iter().find(|s| s.type_id() == id).cloned()
}

pub(crate) fn register_defaults(builder: &mut TypeRegistryBuilder) {
    for streamer in all() {
        builder.register_streamer(streamer.clone());
    }
}

impl TypeRegistry {
    /// Resolves the streamer for a value's runtime kind: built-ins by kind,
    /// records by their type name. Returns `None` for `Invalid` and for
    /// unregistered record types.
    #[must_use]
    pub fn streamer_for_value(&self, value: &Value) -> Option<&StreamerRef> {
        match value {
            Value::Invalid => None,
            Value::Bool(_) => self.streamer(BOOL),
            Value::Int(_) => self.streamer(INT),
            Value::UInt(_) => self.streamer(UINT),
            Value::Float(_) => self.streamer(FLOAT),
            Value::Double(_) => self.streamer(DOUBLE),
            Value::Bytes(_) => self.streamer(BYTES),
            Value::String(_) => self.streamer(STRING),
            Value::Url(_) => self.streamer(URL),
            Value::Color(_) => self.streamer(COLOR),
            Value::DateTime(_) => self.streamer(DATE_TIME),
            Value::Vec3(_) => self.streamer(VEC3),
            Value::Quat(_) => self.streamer(QUAT),
            Value::Regex(_) => self.streamer(REGEX),
            Value::List(_) => self.streamer(VARIANT_LIST),
            Value::Set(_) => self.streamer(VARIANT_SET),
            Value::Map(_) => self.streamer(VARIANT_MAP),
            Value::Record(record) => self.streamer_by_name(&record.type_name),
            Value::Generic(_) => self.streamer(GENERIC),
            Value::Shared(_) => self.streamer(SHARED_OBJECT),
            Value::Script(_) => self.streamer(SCRIPT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistryBuilder;

    #[test]
    fn builtins_resolve_by_id_and_name() {
        let registry = TypeRegistryBuilder::new().build().unwrap();
        for (id, name) in [
            (BOOL, "bool"),
            (INT, "int"),
            (STRING, "string"),
            (REGEX, "regex"),
            (VARIANT, "variant"),
            (SHARED_OBJECT, "shared"),
            (GENERIC, "generic"),
            (VARIANT_LIST, "variant-list"),
            (VARIANT_SET, "variant-set"),
            (VARIANT_MAP, "variant-map"),
        ] {
            let streamer = registry.streamer(id).expect(name);
            assert_eq!(streamer.name(), name);
            assert!(registry.streamer_by_name(name).is_some());
        }
    }

    #[test]
    fn value_resolution_covers_builtin_kinds() {
        let registry = TypeRegistryBuilder::new().build().unwrap();
        assert_eq!(
            registry
                .streamer_for_value(&Value::Bool(true))
                .unwrap()
                .name(),
            "bool"
        );
        assert_eq!(
            registry
                .streamer_for_value(&Value::List(vec![]))
                .unwrap()
                .name(),
            "variant-list"
        );
        assert_eq!(
            registry
                .streamer_for_value(&Value::Set(vec![]))
                .unwrap()
                .name(),
            "variant-set"
        );
        assert!(registry.streamer_for_value(&Value::Invalid).is_none());
    }
}
