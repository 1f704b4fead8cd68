//! Schema-driven in-memory object model with JSON and binary codecs.
//!
//! `arbor-core` is the data layer of the arbor object database:
//!
//! - [`schema`] — immutable record-type descriptors (fields, enum maps,
//!   permissions, capacities);
//! - [`mask`] — two-bit-per-field touched/changed masks with set algebra,
//!   doubling as access/change/persistence filters;
//! - [`object`] — typed in-place records whose every mutation maintains
//!   the mask invariants;
//! - [`stream`] — pull-style input/output streams with sticky errors and
//!   a byte-counting sizing mode;
//! - [`codec`] — the [`Codec`] trait with two transports: canonical JSON
//!   and a protobuf-flavoured binary format, both schema-driven and both
//!   honouring field-level access filters;
//! - [`id`] — pluggable object-id generation.
//!
//! The REST path/verb layer lives in `arbor-rest`, and resources,
//! transactions, pub/sub and collections in `arbor-db`.
//!
//! # Example
//!
//! ```
//! use arbor_core::{Field, Object, RecordType};
//! use arbor_core::codec::json;
//!
//! let ty = RecordType::builder("Reading")
//!     .field(Field::signed("celsius", 2))
//!     .field(Field::string("sensor", 32))
//!     .build()
//!     .unwrap();
//!
//! let mut reading = Object::new(&ty);
//! reading.set(1, 21i64).unwrap();
//! reading.set_string(2, "lab").unwrap();
//!
//! assert_eq!(
//!     json::to_json(&reading).unwrap(),
//!     r#"{"celsius":21,"sensor":"lab"}"#
//! );
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod id;
pub mod mask;
pub mod object;
pub mod schema;
mod serde_support;
pub mod stream;
pub mod value;

pub use codec::{Codec, DecodeOptions, EncodeOptions, FieldFilter, FieldOutcome};
pub use mask::FieldMask;
pub use object::{Object, ObjectError};
pub use schema::{
    AccessLevel, EnumMap, Field, FieldType, ObjectId, RecordType, ID_FIELD_INDEX, MAX_FIELDS,
};
pub use stream::{CodecError, CodecResult, InputStream, OutputStream};
pub use value::Value;
