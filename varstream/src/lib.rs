//! Self-describing, bit-packed, delta-capable codec for dynamically typed
//! values and object graphs.
//!
//! varstream encodes arbitrary values - primitives, enumerations, records,
//! collections, keyed maps, class-based objects, script values, and shared
//! (identity-carrying) objects - onto a bit stream. Its distinguishing
//! responsibilities:
//!
//! - **Bit-level packing.** Booleans cost one bit; interning-stream IDs cost
//!   only as many bits as the largest ID issued so far; enums cost exactly
//!   the bits their declared range needs.
//! - **Schema negotiation.** A writer embeds FULL, HASH, or NO metadata for
//!   the types and classes it transmits; the reader reconciles it against
//!   its local [`TypeRegistry`] and builds either a fast-path or a
//!   translating read plan.
//! - **Value interning.** Type descriptors, class descriptors, name handles,
//!   and shared-object identities each get a small integer ID on first use,
//!   with transient (per-message) and persistent (cross-message) tiers.
//! - **Delta encoding.** Any typed value can be encoded absolutely or as a
//!   recursive delta against a caller-supplied reference.
//!
//! # Example
//!
//! ```
//! use varstream::{
//!     Decoder, Encoder, GenericsMode, MetadataMode, TypeRegistryBuilder, Value,
//! };
//!
//! let registry = TypeRegistryBuilder::new().build().unwrap();
//! let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
//! encoder.write_value(&Value::Int(7)).unwrap();
//! let message = encoder.finish_message();
//!
//! let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
//! let mut reader = decoder.begin(&message);
//! assert_eq!(reader.read_value().unwrap(), Value::Int(7));
//! ```
//!
//! # Sessions
//!
//! One [`Encoder`] or [`Decoder`] binds to one logical byte stream and is
//! single-threaded; the [`TypeRegistry`] is built once at startup and shared
//! read-only between sessions. Message boundaries are the caller's: flush
//! with [`Encoder::finish_message`], feed each message's bytes to
//! [`Decoder::begin`], and promote mapping assignments with the
//! snapshot/persist operations once the peer has acknowledged them.

pub mod builtin;
mod decode;
mod digest;
mod encode;
mod error;
mod limits;
mod mapping;
mod metadata;
mod object;
mod plan;
mod registry;
mod script;
mod streamer;
mod value;

pub use decode::{Decoder, MessageReader, ReadMappingSnapshot};
pub use digest::{enum_digest, name_digest, Digest, DIGEST_LEN};
pub use encode::{Encoder, WriteMappingSnapshot};
pub use error::{CodecError, CodecResult};
pub use limits::Limits;
pub use metadata::{GenericsMode, MetadataMode};
pub use object::{object_eq, DynamicObject, SharedHandle, SharedObject};
pub use plan::{FieldReader, ObjectReader, PropertyReader, TypeReader};
pub use registry::{
    ClassDef, ClassDescriptor, ClassProperty, EnumDef, EnumKey, ObjectFactory, PropertyDef,
    PropertyType, RegistryError, RegistryResult, TypeId, TypeRegistry, TypeRegistryBuilder,
};
pub use script::ScriptValue;
pub use streamer::{
    EnumStreamer, ListStreamer, MapStreamer, MetaField, RecordStreamer, SetStreamer, StreamerKind,
    StreamerRef, TypeStreamer,
};
pub use value::{GenericValue, RecordValue, RegexSyntax, RegexValue, Value};
