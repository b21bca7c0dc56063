//! Script values: the dynamic value model of an embedded scripting engine.
//!
//! Script values travel under a closed 4-bit tag. Object property names go
//! through the string mapping stream as interned name handles; the invalid
//! name (ID 0) terminates a property sequence. The delta form keeps the
//! reference's shape where the kinds match and falls back to an absolute
//! encoding behind a one-bit "type changed" flag where they do not.

use std::sync::Arc;

use crate::decode::MessageReader;
use crate::encode::Encoder;
use crate::error::{CodecError, CodecResult};
use crate::object::DynamicObject;
use crate::registry::ClassDescriptor;
use crate::value::{RegexValue, Value};

/// A script-engine value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    /// No value at all; also the property-deletion marker in object deltas.
    #[default]
    Invalid,
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A wrapped dynamically typed value.
    Variant(Box<Value>),
    /// A native object instance exposed to scripts.
    NativeObject(Option<Box<dyn DynamicObject>>),
    /// A reference to a registered class.
    ClassRef(Option<Arc<ClassDescriptor>>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    RegExp(RegexValue),
    Array(Vec<ScriptValue>),
    /// Property name/value pairs in insertion order.
    Object(Vec<(String, ScriptValue)>),
}

const INVALID_TAG: u8 = 0;
const UNDEFINED_TAG: u8 = 1;
const NULL_TAG: u8 = 2;
const BOOL_TAG: u8 = 3;
const NUMBER_TAG: u8 = 4;
const STRING_TAG: u8 = 5;
const VARIANT_TAG: u8 = 6;
const OBJECT_REF_TAG: u8 = 7;
const CLASS_REF_TAG: u8 = 8;
const DATE_TAG: u8 = 9;
const REGEXP_TAG: u8 = 10;
const ARRAY_TAG: u8 = 11;
const OBJECT_TAG: u8 = 12;

const TAG_BITS: u8 = 4;

impl ScriptValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Invalid => INVALID_TAG,
            Self::Undefined => UNDEFINED_TAG,
            Self::Null => NULL_TAG,
            Self::Bool(_) => BOOL_TAG,
            Self::Number(_) => NUMBER_TAG,
            Self::String(_) => STRING_TAG,
            Self::Variant(_) => VARIANT_TAG,
            Self::NativeObject(_) => OBJECT_REF_TAG,
            Self::ClassRef(_) => CLASS_REF_TAG,
            Self::Date(_) => DATE_TAG,
            Self::RegExp(_) => REGEXP_TAG,
            Self::Array(_) => ARRAY_TAG,
            Self::Object(_) => OBJECT_TAG,
        }
    }
}

fn property<'a>(properties: &'a [(String, ScriptValue)], name: &str) -> Option<&'a ScriptValue> {
    properties
        .iter()
        .find(|(own, _)| own == name)
        .map(|(_, value)| value)
}

fn set_property(properties: &mut Vec<(String, ScriptValue)>, name: &str, value: ScriptValue) {
    if value == ScriptValue::Invalid {
        properties.retain(|(own, _)| own != name);
        return;
    }
    if let Some(entry) = properties.iter_mut().find(|(own, _)| own == name) {
        entry.1 = value;
    } else {
        properties.push((name.to_owned(), value));
    }
}

impl Encoder {
    /// Encodes a script value absolutely.
    pub fn write_script(&mut self, value: &ScriptValue) -> CodecResult<()> {
        self.write_bits(u64::from(value.tag()), TAG_BITS)?;
        match value {
            ScriptValue::Invalid | ScriptValue::Undefined | ScriptValue::Null => Ok(()),
            ScriptValue::Bool(value) => self.write_bool(*value),
            ScriptValue::Number(value) => self.write_f64(*value),
            ScriptValue::String(value) => self.write_string(value),
            ScriptValue::Variant(value) => self.write_value(value),
            ScriptValue::NativeObject(object) => self.write_object(object.as_deref()),
            ScriptValue::ClassRef(class) => self.write_class(class.as_ref()),
            ScriptValue::Date(value) => self.write_i64(*value),
            ScriptValue::RegExp(value) => self.write_regex(value),
            ScriptValue::Array(items) => {
                self.write_i32(items.len() as i32)?;
                for item in items {
                    self.write_script(item)?;
                }
                Ok(())
            }
            ScriptValue::Object(properties) => {
                for (name, value) in properties {
                    self.write_name(Some(name))?;
                    self.write_script(value)?;
                }
                self.write_name(None)
            }
        }
    }

    /// Encodes a one-bit unchanged flag, or the full script delta.
    pub fn write_script_delta(
        &mut self,
        value: &ScriptValue,
        reference: &ScriptValue,
    ) -> CodecResult<()> {
        if value == reference {
            self.write_bool(false)
        } else {
            self.write_bool(true)?;
            self.write_script_raw_delta(value, reference)
        }
    }

    /// Encodes a script delta with no leading flag. Matching kinds emit a
    /// clear "type changed" bit and a kind-specific delta; mismatched kinds
    /// emit a set bit and an absolute value.
    pub fn write_script_raw_delta(
        &mut self,
        value: &ScriptValue,
        reference: &ScriptValue,
    ) -> CodecResult<()> {
        match reference {
            ScriptValue::Invalid | ScriptValue::Undefined | ScriptValue::Null => {
                self.write_script(value)
            }
            ScriptValue::Bool(_) => {
                if let ScriptValue::Bool(v) = value {
                    self.write_bool(false)?;
                    self.write_bool(*v)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::Number(_) => {
                if let ScriptValue::Number(v) = value {
                    self.write_bool(false)?;
                    self.write_f64(*v)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::String(_) => {
                if let ScriptValue::String(v) = value {
                    self.write_bool(false)?;
                    self.write_string(v)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::Variant(reference) => {
                if let ScriptValue::Variant(v) = value {
                    self.write_bool(false)?;
                    self.write_value_raw_delta(v, reference)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::NativeObject(reference) => {
                if let ScriptValue::NativeObject(v) = value {
                    self.write_bool(false)?;
                    self.write_object_raw_delta(v.as_deref(), reference.as_deref())
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::ClassRef(_) => {
                if let ScriptValue::ClassRef(v) = value {
                    self.write_bool(false)?;
                    self.write_class(v.as_ref())
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::Date(_) => {
                if let ScriptValue::Date(v) = value {
                    self.write_bool(false)?;
                    self.write_i64(*v)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::RegExp(_) => {
                if let ScriptValue::RegExp(v) = value {
                    self.write_bool(false)?;
                    self.write_regex(v)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::Array(reference_items) => {
                if let ScriptValue::Array(items) = value {
                    self.write_bool(false)?;
                    self.write_i32(items.len() as i32)?;
                    for (i, item) in items.iter().enumerate() {
                        if let Some(reference_item) = reference_items.get(i) {
                            self.write_script_delta(item, reference_item)?;
                        } else {
                            self.write_script(item)?;
                        }
                    }
                    Ok(())
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
            ScriptValue::Object(reference_properties) => {
                if let ScriptValue::Object(properties) = value {
                    self.write_bool(false)?;
                    for (name, own) in properties {
                        let reference_value = property(reference_properties, name);
                        if reference_value != Some(own) {
                            self.write_name(Some(name))?;
                            self.write_script_raw_delta(
                                own,
                                reference_value.unwrap_or(&ScriptValue::Invalid),
                            )?;
                        }
                    }
                    for (name, reference_value) in reference_properties {
                        if property(properties, name).is_none() {
                            self.write_name(Some(name))?;
                            self.write_script_raw_delta(&ScriptValue::Invalid, reference_value)?;
                        }
                    }
                    self.write_name(None)
                } else {
                    self.write_bool(true)?;
                    self.write_script(value)
                }
            }
        }
    }
}

impl MessageReader<'_> {
    /// Decodes a script value.
    pub fn read_script(&mut self) -> CodecResult<ScriptValue> {
        self.enter_nested()?;
        let result = self.read_script_inner();
        self.exit_nested();
        result
    }

    fn read_script_inner(&mut self) -> CodecResult<ScriptValue> {
        let tag = self.read_bits(TAG_BITS)? as u8;
        Ok(match tag {
            INVALID_TAG => ScriptValue::Invalid,
            UNDEFINED_TAG => ScriptValue::Undefined,
            NULL_TAG => ScriptValue::Null,
            BOOL_TAG => ScriptValue::Bool(self.read_bool()?),
            NUMBER_TAG => ScriptValue::Number(self.read_f64()?),
            STRING_TAG => ScriptValue::String(self.read_string()?),
            VARIANT_TAG => ScriptValue::Variant(Box::new(self.read_value()?)),
            OBJECT_REF_TAG => ScriptValue::NativeObject(self.read_object()?),
            CLASS_REF_TAG => ScriptValue::ClassRef(self.read_class_ref()?),
            DATE_TAG => ScriptValue::Date(self.read_i64()?),
            REGEXP_TAG => ScriptValue::RegExp(self.read_regex()?),
            ARRAY_TAG => {
                let len = self.read_collection_len()?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_script()?);
                }
                ScriptValue::Array(items)
            }
            OBJECT_TAG => {
                let mut properties = Vec::new();
                while let Some(name) = self.read_name()? {
                    let value = self.read_script()?;
                    set_property(&mut properties, &name, value);
                }
                ScriptValue::Object(properties)
            }
            tag => return Err(CodecError::InvalidScriptTag { tag }),
        })
    }

    fn read_class_ref(&mut self) -> CodecResult<Option<Arc<ClassDescriptor>>> {
        Ok(self
            .read_object_reader()?
            .and_then(|reader| reader.class().cloned()))
    }

    /// Decodes a one-bit unchanged flag, reusing the reference when clear.
    pub fn read_script_delta(&mut self, reference: &ScriptValue) -> CodecResult<ScriptValue> {
        if self.read_bool()? {
            self.read_script_raw_delta(reference)
        } else {
            Ok(reference.clone())
        }
    }

    /// Decodes a script delta with no leading flag.
    pub fn read_script_raw_delta(&mut self, reference: &ScriptValue) -> CodecResult<ScriptValue> {
        self.enter_nested()?;
        let result = self.read_script_raw_delta_inner(reference);
        self.exit_nested();
        result
    }

    fn read_script_raw_delta_inner(&mut self, reference: &ScriptValue) -> CodecResult<ScriptValue> {
        match reference {
            ScriptValue::Invalid | ScriptValue::Undefined | ScriptValue::Null => {
                self.read_script_inner()
            }
            ScriptValue::Bool(_) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::Bool(self.read_bool()?))
                }
            }
            ScriptValue::Number(_) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::Number(self.read_f64()?))
                }
            }
            ScriptValue::String(_) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::String(self.read_string()?))
                }
            }
            ScriptValue::Variant(reference) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::Variant(Box::new(
                        self.read_value_raw_delta(reference)?,
                    )))
                }
            }
            ScriptValue::NativeObject(reference) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::NativeObject(
                        self.read_object_raw_delta(reference.as_deref())?,
                    ))
                }
            }
            ScriptValue::ClassRef(_) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::ClassRef(self.read_class_ref()?))
                }
            }
            ScriptValue::Date(_) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::Date(self.read_i64()?))
                }
            }
            ScriptValue::RegExp(_) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    Ok(ScriptValue::RegExp(self.read_regex()?))
                }
            }
            ScriptValue::Array(reference_items) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    let len = self.read_collection_len()?;
                    let mut items = Vec::with_capacity(len);
                    for i in 0..len {
                        if let Some(reference_item) = reference_items.get(i) {
                            items.push(self.read_script_delta(reference_item)?);
                        } else {
                            items.push(self.read_script()?);
                        }
                    }
                    Ok(ScriptValue::Array(items))
                }
            }
            ScriptValue::Object(reference_properties) => {
                if self.read_bool()? {
                    self.read_script_inner()
                } else {
                    // Start from the reference, then apply the changes.
                    let mut properties = reference_properties.clone();
                    while let Some(name) = self.read_name()? {
                        let reference_value =
                            property(reference_properties, &name).cloned().unwrap_or_default();
                        let value = self.read_script_raw_delta(&reference_value)?;
                        set_property(&mut properties, &name, value);
                    }
                    Ok(ScriptValue::Object(properties))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        assert_eq!(ScriptValue::Invalid.tag(), 0);
        assert_eq!(ScriptValue::Undefined.tag(), 1);
        assert_eq!(ScriptValue::Null.tag(), 2);
        assert_eq!(ScriptValue::Bool(true).tag(), 3);
        assert_eq!(ScriptValue::Number(0.0).tag(), 4);
        assert_eq!(ScriptValue::String(String::new()).tag(), 5);
        assert_eq!(ScriptValue::Variant(Box::new(Value::Invalid)).tag(), 6);
        assert_eq!(ScriptValue::NativeObject(None).tag(), 7);
        assert_eq!(ScriptValue::ClassRef(None).tag(), 8);
        assert_eq!(ScriptValue::Date(0).tag(), 9);
        assert_eq!(ScriptValue::RegExp(RegexValue::default()).tag(), 10);
        assert_eq!(ScriptValue::Array(Vec::new()).tag(), 11);
        assert_eq!(ScriptValue::Object(Vec::new()).tag(), 12);
    }

    #[test]
    fn set_property_inserts_replaces_and_deletes() {
        let mut properties = Vec::new();
        set_property(&mut properties, "x", ScriptValue::Number(1.0));
        set_property(&mut properties, "y", ScriptValue::Number(2.0));
        assert_eq!(properties.len(), 2);

        set_property(&mut properties, "x", ScriptValue::Number(3.0));
        assert_eq!(property(&properties, "x"), Some(&ScriptValue::Number(3.0)));
        assert_eq!(properties.len(), 2);

        set_property(&mut properties, "x", ScriptValue::Invalid);
        assert_eq!(property(&properties, "x"), None);
        assert_eq!(properties.len(), 1);
    }
}
