//! Resources, transactions, pub/sub, collections and the database root
//! for the arbor object database.
//!
//! This crate owns the concurrency and lifecycle layer on top of
//! `arbor-core` (objects and codecs) and `arbor-rest` (paths and verbs):
//!
//! - [`resource`] — a named root object behind a re-entrant lock, edited
//!   through scratch-copy [`Transaction`]s with validator hooks and a
//!   single published notification per commit;
//! - [`collection`] — id-keyed containers of homogeneous objects with
//!   REST on `/id[/path]` and add/delete notifications;
//! - [`database`] — the path-routing root mounting resources,
//!   collections and nested databases;
//! - [`queue`] — bounded FIFO notify queues with timeout processing,
//!   pause/replay, and an inline immediate mode;
//! - [`pubsub`] — notifications, subscriber filters and coalesced queue
//!   dispatch;
//! - [`relationships`] — mirrored deletes, cascade deletes and enforced
//!   foreign-key references between collections.
//!
//! # Example
//!
//! ```
//! use arbor_core::{Field, RecordType};
//! use arbor_db::{Database, Collection};
//! use arbor_rest::AccessControl;
//!
//! let device = RecordType::builder("Device")
//!     .field(Field::string("label", 32))
//!     .build()
//!     .unwrap();
//!
//! let devices = Collection::new("devices", &device);
//! let db = Database::new("site");
//! db.install_collection(&devices);
//!
//! let access = AccessControl::root();
//! let created = db.rest_post("/devices", r#"{"label":"gateway"}"#, &access);
//! let id = created.created_id().unwrap();
//! let body = db.rest_get(&format!("/devices/{id}/label"), &access).unwrap();
//! assert_eq!(body, r#""gateway""#);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod collection;
pub mod database;
pub mod pubsub;
pub mod queue;
pub mod relationships;
pub mod resource;
pub mod validate;

pub use collection::Collection;
pub use database::{Database, DatabaseEntry};
pub use pubsub::{Notification, Subscriber, SubscriptionHandle};
pub use queue::NotifyQueue;
pub use relationships::{ReferenceField, Relationships};
pub use resource::{Resource, Transaction};
pub use validate::{Validation, ValidationResult, Validator};
