//! Path resolution — walking an object graph via `/`-delimited tokens.
//!
//! A path resolves to a typed [`Target`]: an object, an array field, or a
//! single field (with an element index for arrays). Targets are *step
//! lists* from the root rather than borrowed references, so the verb
//! layer can re-navigate immutably or mutably without aliasing.
//!
//! Array tokens are decimal indices (scalar arrays), decimal ids
//! (sub-object arrays), or `*key=value` searches over a string field of
//! the element type. Field permissions are checked at every step against
//! the requested [`Permission`].

use arbor_core::{AccessLevel, Object, ObjectId};
use http::StatusCode;

/// Maximum length of one path token.
pub const MAX_PATH_TOKEN: usize = 64;

/// The access a traversal requires from each field it crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Traversal for GET.
    Read,
    /// Traversal for POST/PATCH/PUT/DELETE.
    Write,
}

/// One traversal step from an object to a child object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Descend into a nested object field.
    Nested(usize),
    /// Descend into a sub-object array element by id.
    Element(usize, ObjectId),
}

/// A resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An object (the root when `steps` is empty).
    Object {
        /// Steps from the root to the object.
        steps: Vec<Step>,
    },
    /// An array field of the object reached by `steps`.
    Array {
        /// Steps from the root to the containing object.
        steps: Vec<Step>,
        /// Field index of the array.
        field: usize,
    },
    /// A single field value.
    Field {
        /// Steps from the root to the containing object.
        steps: Vec<Step>,
        /// Field index.
        field: usize,
        /// Element index; 0 for scalars.
        at: usize,
    },
}

/// A failed resolution, carrying the REST status to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    /// REST status (400, 403 or 404).
    pub status: StatusCode,
    /// Short human-readable reason.
    pub detail: String,
}

impl PathError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

/// Split `path` into tokens, tolerating repeated and trailing slashes.
///
/// # Errors
///
/// 400 [`PathError`] when a token exceeds [`MAX_PATH_TOKEN`].
pub fn tokenize(path: &str) -> Result<Vec<&str>, PathError> {
    let mut tokens = Vec::new();
    for token in path.split('/') {
        if token.is_empty() {
            continue;
        }
        if token.len() >= MAX_PATH_TOKEN {
            return Err(PathError::bad_request("path token too long"));
        }
        tokens.push(token);
    }
    Ok(tokens)
}

/// Resolve `path` against `root`; the empty path is the root itself.
///
/// # Errors
///
/// [`PathError`] with 404 for unresolved tokens, 403 for permission
/// failures and 400 for malformed tokens or descents past a leaf.
pub fn resolve(
    root: &Object,
    path: &str,
    level: AccessLevel,
    permission: Permission,
) -> Result<Target, PathError> {
    let mut target = Target::Object { steps: Vec::new() };
    for token in tokenize(path)? {
        target = step(root, target, token, level, permission)?;
    }
    Ok(target)
}

/// Follow `steps` to the object they name.
#[must_use]
pub fn navigate<'a>(root: &'a Object, steps: &[Step]) -> Option<&'a Object> {
    let mut object = root;
    for step in steps {
        object = match step {
            Step::Nested(index) => object.nested_slot(*index)?,
            Step::Element(index, id) => object.find_object_element(*index, *id)?,
        };
    }
    Some(object)
}

/// Follow `steps` mutably.
#[must_use]
pub fn navigate_mut<'a>(root: &'a mut Object, steps: &[Step]) -> Option<&'a mut Object> {
    let mut object = root;
    for step in steps {
        object = match step {
            Step::Nested(index) => object.nested_slot_mut(*index)?,
            Step::Element(index, id) => object.find_object_element_mut(*index, *id)?,
        };
    }
    Some(object)
}

/// Consume one token from the current target.
pub(crate) fn step(
    root: &Object,
    target: Target,
    token: &str,
    level: AccessLevel,
    permission: Permission,
) -> Result<Target, PathError> {
    match target {
        Target::Field { .. } => Err(PathError::bad_request("cannot browse beyond a field")),
        Target::Object { mut steps } => {
            let object = navigate(root, &steps)
                .ok_or_else(|| PathError::not_found("object no longer present"))?;
            let field = object
                .record_type()
                .find_by_label(token)
                .ok_or_else(|| PathError::not_found(format!("no such field: {token}")))?;
            let permitted = match permission {
                Permission::Read => field.readable_at(level),
                Permission::Write => field.writable_at(level),
            };
            if !permitted {
                return Err(PathError::new(StatusCode::FORBIDDEN, ""));
            }
            if field.is_array() {
                Ok(Target::Array {
                    steps,
                    field: field.index,
                })
            } else if field.is_object() {
                steps.push(Step::Nested(field.index));
                Ok(Target::Object { steps })
            } else {
                Ok(Target::Field {
                    steps,
                    field: field.index,
                    at: 0,
                })
            }
        }
        Target::Array { mut steps, field } => {
            let object = navigate(root, &steps)
                .ok_or_else(|| PathError::not_found("object no longer present"))?;
            let descriptor = object
                .record_type()
                .field(field)
                .expect("array target carries a valid field index");

            if let Some(search) = token.strip_prefix('*') {
                // "/*key=value" searches a sub-object array by string field.
                if !descriptor.is_object() {
                    return Err(PathError::bad_request("search requires an object array"));
                }
                let (key, value) = search
                    .split_once('=')
                    .ok_or_else(|| PathError::bad_request("malformed search token"))?;
                if value.is_empty() {
                    return Err(PathError::bad_request("malformed search token"));
                }
                let subtype = descriptor
                    .subtype
                    .as_ref()
                    .expect("object field carries a subtype");
                let key_field = subtype
                    .find_by_label(key)
                    .ok_or_else(|| PathError::bad_request(format!("unknown search key: {key}")))?;
                let element = object
                    .object_elements(field)
                    .iter()
                    .find(|e| e.has_id() && e.string_value(key_field.index) == Some(value))
                    .ok_or_else(|| PathError::not_found(format!("no element with {key}={value}")))?;
                steps.push(Step::Element(field, element.id()));
                return Ok(Target::Object { steps });
            }

            let number: u64 = token
                .parse()
                .map_err(|_| PathError::bad_request(format!("invalid array token: {token}")))?;
            if descriptor.is_object() {
                if object.find_object_element(field, number).is_none() {
                    return Err(PathError::not_found(format!("no element with id {number}")));
                }
                steps.push(Step::Element(field, number));
                Ok(Target::Object { steps })
            } else {
                let at = usize::try_from(number)
                    .map_err(|_| PathError::bad_request("index overflow"))?;
                if at >= object.count(field) {
                    return Err(PathError::not_found(format!("index {at} out of range")));
                }
                Ok(Target::Field { steps, field, at })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Field, RecordType};
    use std::sync::Arc;

    fn sub_type() -> Arc<RecordType> {
        RecordType::builder("Sub")
            .field(Field::string("name", 16))
            .build()
            .unwrap()
    }

    fn test_type() -> Arc<RecordType> {
        RecordType::builder("Root")
            .field(Field::bool("flag"))
            .field(Field::signed("nums", 2).repeated(4))
            .field(Field::object("child", sub_type()))
            .field(Field::object("items", sub_type()).repeated(4))
            .field(Field::bool("locked").read(AccessLevel::Admin).write(AccessLevel::Root))
            .build()
            .unwrap()
    }

    fn populated() -> Object {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.set(1, true).unwrap();
        obj.push_element(2, 5i64).unwrap();
        obj.push_element(2, 6i64).unwrap();
        obj.add_object_element(4, Some(10))
            .unwrap()
            .set_string(1, "first")
            .unwrap();
        obj.add_object_element(4, Some(20))
            .unwrap()
            .set_string(1, "second")
            .unwrap();
        obj
    }

    fn read(obj: &Object, path: &str) -> Result<Target, PathError> {
        resolve(obj, path, AccessLevel::Admin, Permission::Read)
    }

    #[test]
    fn empty_path_is_the_root() {
        let obj = populated();
        assert_eq!(read(&obj, "").unwrap(), Target::Object { steps: vec![] });
        assert_eq!(read(&obj, "/").unwrap(), Target::Object { steps: vec![] });
    }

    #[test]
    fn scalar_field_resolves_to_field() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/flag").unwrap(),
            Target::Field {
                steps: vec![],
                field: 1,
                at: 0
            }
        );
    }

    #[test]
    fn trailing_and_repeated_slashes_tolerated() {
        let obj = populated();
        assert_eq!(read(&obj, "/flag/").unwrap(), read(&obj, "//flag").unwrap());
    }

    #[test]
    fn array_and_element_resolution() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/nums").unwrap(),
            Target::Array {
                steps: vec![],
                field: 2
            }
        );
        assert_eq!(
            read(&obj, "/nums/1").unwrap(),
            Target::Field {
                steps: vec![],
                field: 2,
                at: 1
            }
        );
        assert_eq!(
            read(&obj, "/nums/2").unwrap_err().status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            read(&obj, "/nums/x").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn sub_object_array_resolves_by_id() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/items/20").unwrap(),
            Target::Object {
                steps: vec![Step::Element(4, 20)]
            }
        );
        assert_eq!(
            read(&obj, "/items/1").unwrap_err().status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn keyed_search_finds_matching_element() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/items/*name=second").unwrap(),
            Target::Object {
                steps: vec![Step::Element(4, 20)]
            }
        );
        assert_eq!(
            read(&obj, "/items/*name=missing").unwrap_err().status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            read(&obj, "/items/*name").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            read(&obj, "/items/*bogus=x").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn nested_field_path() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/child/name").unwrap(),
            Target::Field {
                steps: vec![Step::Nested(3)],
                field: 1,
                at: 0
            }
        );
    }

    #[test]
    fn descending_past_a_leaf_is_bad_request() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/flag/deeper").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_field_is_not_found() {
        let obj = populated();
        assert_eq!(
            read(&obj, "/nope").unwrap_err().status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn permissions_checked_per_step() {
        let obj = populated();
        let err = resolve(&obj, "/locked", AccessLevel::Public, Permission::Read).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        // readable at admin, but not writable below root
        assert!(resolve(&obj, "/locked", AccessLevel::Admin, Permission::Read).is_ok());
        let err = resolve(&obj, "/locked", AccessLevel::Admin, Permission::Write).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn overlong_token_rejected() {
        let obj = populated();
        let long = format!("/{}", "x".repeat(MAX_PATH_TOKEN));
        assert_eq!(
            read(&obj, &long).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn navigate_follows_steps() {
        let mut obj = populated();
        let steps = vec![Step::Element(4, 10)];
        assert_eq!(
            navigate(&obj, &steps).unwrap().string_value(1),
            Some("first")
        );
        navigate_mut(&mut obj, &steps)
            .unwrap()
            .set_string(1, "renamed")
            .unwrap();
        assert_eq!(
            navigate(&obj, &steps).unwrap().string_value(1),
            Some("renamed")
        );
    }
}
