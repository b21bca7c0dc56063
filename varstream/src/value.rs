//! The dynamically typed value model.

use std::fmt;
use std::sync::Arc;

use crate::object::SharedHandle;
use crate::script::ScriptValue;
use crate::streamer::StreamerRef;

/// Shared absent-marker reference for delta paths that need a `&Value`
/// outliving a local scope.
pub(crate) static INVALID: Value = Value::Invalid;

/// A dynamically typed value.
///
/// `Invalid` is the absent marker: it is what a dropped or unknown field
/// decodes to, and what an empty dynamic slot encodes as.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absent marker.
    Invalid,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Url(String),
    /// Packed RGBA, one byte per channel.
    Color(u32),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Vec3([f32; 3]),
    Quat([f32; 4]),
    Regex(RegexValue),
    List(Vec<Value>),
    /// Unordered semantics; stored in insertion order.
    Set(Vec<Value>),
    /// Unordered semantics; stored in insertion order, keys unique.
    Map(Vec<(Value, Value)>),
    Record(RecordValue),
    Generic(GenericValue),
    Shared(Option<SharedHandle>),
    Script(Box<ScriptValue>),
}

impl Value {
    /// Returns a short name for the value's runtime kind, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Url(_) => "url",
            Self::Color(_) => "color",
            Self::DateTime(_) => "datetime",
            Self::Vec3(_) => "vec3",
            Self::Quat(_) => "quat",
            Self::Regex(_) => "regex",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Record(_) => "record",
            Self::Generic(_) => "generic",
            Self::Shared(_) => "shared",
            Self::Script(_) => "script",
        }
    }

    /// Returns `true` for the absent marker.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Borrows the list elements, treating any non-list (notably `Invalid`
    /// references in deltas) as empty.
    #[must_use]
    pub(crate) fn as_list(&self) -> &[Value] {
        match self {
            Self::List(items) | Self::Set(items) => items,
            _ => &[],
        }
    }

    /// Borrows the map entries, treating any non-map as empty.
    #[must_use]
    pub(crate) fn as_map(&self) -> &[(Value, Value)] {
        match self {
            Self::Map(entries) => entries,
            _ => &[],
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Invalid, Self::Invalid) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::String(a), Self::String(b)) | (Self::Url(a), Self::Url(b)) => a == b,
            (Self::Color(a), Self::Color(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Vec3(a), Self::Vec3(b)) => a == b,
            (Self::Quat(a), Self::Quat(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => unordered_eq(a, b),
            (Self::Map(a), Self::Map(b)) => map_eq(a, b),
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Generic(a), Self::Generic(b)) => a == b,
            (Self::Shared(a), Self::Shared(b)) => a == b,
            (Self::Script(a), Self::Script(b)) => a == b,
            _ => false,
        }
    }
}

/// Multiset equality for set values.
fn unordered_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|item| {
        let count = |items: &[Value]| items.iter().filter(|other| *other == item).count();
        count(a) == count(b)
    })
}

/// Key-wise equality for map values, ignoring entry order.
fn map_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .all(|(key, value)| b.iter().any(|(k, v)| k == key && v == value))
}

/// Looks up a map entry by key.
pub(crate) fn map_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Inserts or replaces a map entry.
pub(crate) fn map_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        entries.push((key, value));
    }
}

/// Removes a map entry by key, returning whether it was present.
pub(crate) fn map_remove(entries: &mut Vec<(Value, Value)>, key: &Value) -> bool {
    let before = entries.len();
    entries.retain(|(k, _)| k != key);
    entries.len() != before
}

/// A record ("streamable") value: an ordered field list under a type name.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    /// The registered (or remote) type name.
    pub type_name: Arc<str>,
    /// Field values in declaration order.
    pub fields: Vec<Value>,
}

impl RecordValue {
    /// Creates a record value.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>, fields: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }
}

/// A value carrying its own type descriptor, used when transmitting data the
/// receiving side may not have a registered type for.
#[derive(Debug, Clone)]
pub struct GenericValue {
    /// The descriptor that knows how to encode `value`.
    pub streamer: StreamerRef,
    /// The wrapped payload.
    pub value: Box<Value>,
}

impl GenericValue {
    /// Creates a generic value.
    #[must_use]
    pub fn new(streamer: StreamerRef, value: Value) -> Self {
        Self {
            streamer,
            value: Box::new(value),
        }
    }
}

impl PartialEq for GenericValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.streamer, &other.streamer) && self.value == other.value
    }
}

/// Pattern syntax selector for regex values (3 bits on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegexSyntax {
    #[default]
    Full = 0,
    Wildcard = 1,
    Fixed = 2,
    Extended = 3,
    WildcardPath = 4,
    XmlSchema = 5,
}

impl RegexSyntax {
    /// Returns the wire representation.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Decodes a wire value, falling back to [`RegexSyntax::Full`] for
    /// unassigned codes.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Wildcard,
            2 => Self::Fixed,
            3 => Self::Extended,
            4 => Self::WildcardPath,
            5 => Self::XmlSchema,
            _ => Self::Full,
        }
    }
}

/// A regular expression value: pattern plus matching options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegexValue {
    pub pattern: String,
    pub case_sensitive: bool,
    pub syntax: RegexSyntax,
    /// Prefer the shortest match (non-greedy quantifiers).
    pub minimal: bool,
}

impl fmt::Display for RegexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_equality_ignores_order() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::Set(vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn set_equality_counts_duplicates() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(1)]);
        let b = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        assert_ne!(a, b);
    }

    #[test]
    fn map_equality_ignores_order() {
        let a = Value::Map(vec![
            (Value::String("x".into()), Value::Int(1)),
            (Value::String("y".into()), Value::Int(2)),
        ]);
        let b = Value::Map(vec![
            (Value::String("y".into()), Value::Int(2)),
            (Value::String("x".into()), Value::Int(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn list_equality_is_ordered() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(2), Value::Int(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn cross_kind_values_are_unequal() {
        assert_ne!(Value::Int(0), Value::UInt(0));
        assert_ne!(Value::Invalid, Value::Int(0));
        assert_ne!(Value::String("a".into()), Value::Url("a".into()));
    }

    #[test]
    fn map_helpers() {
        let mut entries = vec![(Value::Int(1), Value::Bool(true))];
        assert_eq!(map_get(&entries, &Value::Int(1)), Some(&Value::Bool(true)));
        assert_eq!(map_get(&entries, &Value::Int(2)), None);

        map_insert(&mut entries, Value::Int(1), Value::Bool(false));
        assert_eq!(entries.len(), 1);
        assert_eq!(map_get(&entries, &Value::Int(1)), Some(&Value::Bool(false)));

        map_insert(&mut entries, Value::Int(2), Value::Bool(true));
        assert_eq!(entries.len(), 2);

        assert!(map_remove(&mut entries, &Value::Int(1)));
        assert!(!map_remove(&mut entries, &Value::Int(1)));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn regex_syntax_roundtrip() {
        for syntax in [
            RegexSyntax::Full,
            RegexSyntax::Wildcard,
            RegexSyntax::Fixed,
            RegexSyntax::Extended,
            RegexSyntax::WildcardPath,
            RegexSyntax::XmlSchema,
        ] {
            assert_eq!(RegexSyntax::from_raw(syntax.raw()), syntax);
        }
        assert_eq!(RegexSyntax::from_raw(7), RegexSyntax::Full);
    }

    #[test]
    fn record_value_equality() {
        let a = RecordValue::new("point", vec![Value::Int(1), Value::Int(2)]);
        let b = RecordValue::new("point", vec![Value::Int(1), Value::Int(2)]);
        let c = RecordValue::new("point", vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
