//! Path resolution, access control and REST verbs for arbor objects.
//!
//! This crate turns a `/`-delimited path plus a verb into an operation on
//! an [`arbor_core::Object`] graph:
//!
//! - [`browser`] — resolves paths into typed targets (object, array or
//!   field), honouring field permissions at every step;
//! - [`access`] — the caller's [`AccessControl`] (level, top-level field
//!   filter, deltas-only and persistent-only modes) and its conversion
//!   into codec field filters;
//! - [`engine`] — GET/POST/PATCH/PUT/DELETE with the merge, replace and
//!   clear semantics of the object store, plus path completion search;
//! - [`result`] — [`RestResult`]: an [`http::StatusCode`], a short detail
//!   message and the created id for POST.
//!
//! # Example
//!
//! ```
//! use arbor_core::{Field, Object, RecordType};
//! use arbor_rest::{patch_json, get_json, AccessControl};
//!
//! let ty = RecordType::builder("Config")
//!     .field(Field::signed("limit", 2))
//!     .field(Field::string("name", 32))
//!     .build()
//!     .unwrap();
//! let mut config = Object::new(&ty);
//!
//! let access = AccessControl::root();
//! assert!(patch_json(&mut config, "/", r#"{"limit":5}"#, &access).is_ok());
//! assert_eq!(get_json(&config, "/limit", &access).unwrap(), "5");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod access;
pub mod browser;
pub mod engine;
pub mod result;

pub use access::{AccessControl, ReadAccess, WriteAccess};
pub use browser::{
    navigate, navigate_mut, resolve, PathError, Permission, Step, Target, MAX_PATH_TOKEN,
};
pub use engine::{
    get_json, patch_json, post_json, put_json, rest_delete, rest_get, rest_patch, rest_post,
    rest_put, search_paths,
};
pub use result::RestResult;
