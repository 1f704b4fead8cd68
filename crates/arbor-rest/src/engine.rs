//! REST verbs on an object graph.
//!
//! Each verb resolves its path with the browser, then applies a codec
//! (GET/POST/PATCH/PUT) or a structural operation (DELETE) to the
//! resolved target, maintaining the touched/changed bits and marking the
//! ancestor chain changed so root-level change masks reflect deep edits.
//!
//! Error mapping follows the stream contract: decode failures surface as
//! 400 with the stream's message, encode failures as 500.

use arbor_core::codec::json::JsonCodec;
use arbor_core::{
    Codec, DecodeOptions, EncodeOptions, InputStream, Object, OutputStream, Value, ID_FIELD_INDEX,
};
use http::StatusCode;

use crate::access::{AccessControl, ReadAccess, WriteAccess};
use crate::browser::{
    navigate, navigate_mut, resolve, step, tokenize, PathError, Permission, Step, Target,
};
use crate::result::RestResult;

impl From<PathError> for RestResult {
    fn from(error: PathError) -> Self {
        Self::with_detail(error.status, error.detail)
    }
}

/// Mark the field containing each step's target as touched and changed,
/// so a deep edit is visible in the parent's encoding and shows up in
/// the root object's change mask.
fn mark_path_changed(root: &mut Object, steps: &[Step]) {
    let mut object = Some(root);
    for step in steps {
        let Some(current) = object.take() else {
            return;
        };
        match step {
            Step::Nested(index) => {
                current.mark_field_touched(*index, true);
                current.mark_field_changed(*index, true);
                object = current.nested_slot_mut(*index);
            }
            Step::Element(index, id) => {
                current.mark_field_changed(*index, true);
                object = current.find_object_element_mut(*index, *id);
            }
        }
    }
}

/// GET: encode the target (object, array or single field) into `out`.
pub fn rest_get(
    root: &Object,
    path: &str,
    access: &AccessControl,
    codec: &dyn Codec,
    out: &mut OutputStream<'_>,
) -> RestResult {
    let target = match resolve(root, path, access.level(), Permission::Read) {
        Ok(target) => target,
        Err(error) => return error.into(),
    };
    let filter = ReadAccess(access);
    match target {
        Target::Object { steps } => {
            let Some(object) = navigate(root, &steps) else {
                return RestResult::not_found();
            };
            let opts = EncodeOptions {
                filter: Some(&filter),
                extra_field: None,
                top_level: steps.is_empty(),
            };
            match codec.encode_object(out, object, &opts) {
                Ok(()) => RestResult::ok(),
                Err(error) => RestResult::internal(error.to_string()),
            }
        }
        Target::Array { steps, field } => {
            let Some(object) = navigate(root, &steps) else {
                return RestResult::not_found();
            };
            if !object.is_touched(field) {
                return RestResult::not_found();
            }
            match codec.encode_value(out, object, field, None) {
                Ok(()) => RestResult::ok(),
                Err(error) => RestResult::internal(error.to_string()),
            }
        }
        Target::Field { steps, field, at } => {
            let Some(object) = navigate(root, &steps) else {
                return RestResult::not_found();
            };
            if !object.is_touched(field) {
                return RestResult::not_found();
            }
            let is_array = object
                .record_type()
                .field(field)
                .is_some_and(arbor_core::schema::Field::is_array);
            match codec.encode_value(out, object, field, is_array.then_some(at)) {
                Ok(()) => RestResult::ok(),
                Err(error) => RestResult::internal(error.to_string()),
            }
        }
    }
}

/// POST: append a scalar element or add a sub-object (auto id) to an
/// array, decoding the body into the new element. Returns 201 with the
/// created id; a bad body rolls the creation back.
pub fn rest_post(
    root: &mut Object,
    path: &str,
    access: &AccessControl,
    codec: &dyn Codec,
    input: &mut InputStream<'_>,
) -> RestResult {
    let target = match resolve(root, path, access.level(), Permission::Write) {
        Ok(target) => target,
        Err(error) => return error.into(),
    };
    let Target::Array { steps, field } = target else {
        return RestResult::method_not_allowed("can only POST to an array");
    };
    let Some(object) = navigate_mut(root, &steps) else {
        return RestResult::not_found();
    };
    let descriptor = object
        .record_type()
        .field(field)
        .expect("array target carries a valid field index")
        .clone();

    if descriptor.is_object() {
        let was_changed = object.is_changed(field);
        let id = match object.add_object_element(field, None) {
            Ok(element) => element.id(),
            Err(error) => return RestResult::bad_request(error.to_string()),
        };
        let filter = WriteAccess(access);
        let mut opts = DecodeOptions {
            filter: Some(&filter),
            unknown_handler: None,
            top_level: false,
        };
        let element = object
            .find_object_element_mut(field, id)
            .expect("element was just added");
        match codec.decode_object(input, element, &mut opts) {
            Ok(_) => {
                mark_path_changed(root, &steps);
                RestResult::created(id)
            }
            Err(error) => {
                object.remove_object_element(field, id);
                if !was_changed {
                    object.mark_field_changed(field, false);
                }
                RestResult::bad_request(error.to_string())
            }
        }
    } else {
        let at = match object.push_element(field, Value::default_for(&descriptor)) {
            Ok(at) => at,
            Err(error) => return RestResult::bad_request(error.to_string()),
        };
        match codec.decode_element(input, object, field, at) {
            Ok(outcome) if !outcome.nulled => {
                object.mark_field_changed(field, true);
                mark_path_changed(root, &steps);
                RestResult::created(at as u64)
            }
            Ok(_) => {
                let _ = object.remove_element_at(field, at);
                RestResult::bad_request("cannot create a null element")
            }
            Err(error) => {
                let _ = object.remove_element_at(field, at);
                RestResult::bad_request(error.to_string())
            }
        }
    }
}

/// Merge-decode a body into `object`, reinstating the id (an object's id
/// is not patchable).
fn patch_object(
    object: &mut Object,
    codec: &dyn Codec,
    input: &mut InputStream<'_>,
    access: &AccessControl,
    top_level: bool,
) -> Result<bool, String> {
    let id = object.id();
    let had_id = object.has_id();
    let filter = WriteAccess(access);
    let mut opts = DecodeOptions {
        filter: Some(&filter),
        unknown_handler: None,
        top_level,
    };
    let result = codec.decode_object(input, object, &mut opts);
    if had_id {
        let _ = object.set(ID_FIELD_INDEX, id);
        object.mark_field_changed(ID_FIELD_INDEX, false);
    }
    result.map_err(|error| error.to_string())
}

/// Decode one element into a field, applying the null/touched/changed
/// bookkeeping. Returns whether anything observably changed.
fn patch_field(
    object: &mut Object,
    codec: &dyn Codec,
    input: &mut InputStream<'_>,
    field: usize,
    at: usize,
) -> Result<bool, String> {
    let descriptor = object
        .record_type()
        .field(field)
        .expect("field target carries a valid index")
        .clone();
    let was_touched = object.is_touched(field);
    let outcome = codec
        .decode_element(input, object, field, at)
        .map_err(|error| error.to_string())?;
    if outcome.nulled {
        object.clear_field(field);
        Ok(was_touched)
    } else {
        object.mark_field_touched(field, true);
        let changed = outcome.changed || !was_touched || descriptor.always_notify;
        if changed {
            object.mark_field_changed(field, true);
        }
        Ok(changed)
    }
}

/// PATCH: merge the body into the target, retaining unmentioned fields.
/// A `null` body on a field clears it.
pub fn rest_patch(
    root: &mut Object,
    path: &str,
    access: &AccessControl,
    codec: &dyn Codec,
    input: &mut InputStream<'_>,
) -> RestResult {
    let target = match resolve(root, path, access.level(), Permission::Write) {
        Ok(target) => target,
        Err(error) => return error.into(),
    };
    match target {
        Target::Object { steps } => {
            let top_level = steps.is_empty();
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            match patch_object(object, codec, input, access, top_level) {
                Ok(changed) => {
                    if changed {
                        mark_path_changed(root, &steps);
                    }
                    RestResult::ok()
                }
                Err(message) => RestResult::bad_request(message),
            }
        }
        Target::Array { steps, field } => {
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            let filter = WriteAccess(access);
            let mut opts = DecodeOptions {
                filter: Some(&filter),
                unknown_handler: None,
                top_level: false,
            };
            match codec.decode_array(input, object, field, &mut opts) {
                Ok(changed) => {
                    if changed {
                        mark_path_changed(root, &steps);
                    }
                    RestResult::ok()
                }
                Err(error) => RestResult::bad_request(error.to_string()),
            }
        }
        Target::Field { steps, field, at } => {
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            match patch_field(object, codec, input, field, at) {
                Ok(changed) => {
                    if changed {
                        mark_path_changed(root, &steps);
                    }
                    RestResult::ok()
                }
                Err(message) => RestResult::bad_request(message),
            }
        }
    }
}

/// PUT: clear the target (keeping an object's id), then PATCH the body
/// into it.
pub fn rest_put(
    root: &mut Object,
    path: &str,
    access: &AccessControl,
    codec: &dyn Codec,
    input: &mut InputStream<'_>,
) -> RestResult {
    let target = match resolve(root, path, access.level(), Permission::Write) {
        Ok(target) => target,
        Err(error) => return error.into(),
    };
    match target {
        Target::Object { steps } => {
            let top_level = steps.is_empty();
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            object.clear_all_except_id();
            match patch_object(object, codec, input, access, top_level) {
                Ok(_) => {
                    mark_path_changed(root, &steps);
                    RestResult::ok()
                }
                Err(message) => RestResult::bad_request(message),
            }
        }
        Target::Array { steps, field } => {
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            object.clear_field(field);
            let filter = WriteAccess(access);
            let mut opts = DecodeOptions {
                filter: Some(&filter),
                unknown_handler: None,
                top_level: false,
            };
            match codec.decode_array(input, object, field, &mut opts) {
                Ok(_) => {
                    mark_path_changed(root, &steps);
                    RestResult::ok()
                }
                Err(error) => RestResult::bad_request(error.to_string()),
            }
        }
        Target::Field { steps, field, at } => {
            // A single field has no partial state to replace; PUT and
            // PATCH coincide.
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            match patch_field(object, codec, input, field, at) {
                Ok(_) => {
                    mark_path_changed(root, &steps);
                    RestResult::ok()
                }
                Err(message) => RestResult::bad_request(message),
            }
        }
    }
}

/// DELETE: remove an array element, clear a field or array, or clear a
/// nested object (clearing its parent's slot when it is not an array
/// element). Deleting the root object is forbidden.
pub fn rest_delete(root: &mut Object, path: &str, access: &AccessControl) -> RestResult {
    let target = match resolve(root, path, access.level(), Permission::Write) {
        Ok(target) => target,
        Err(error) => return error.into(),
    };
    match target {
        Target::Object { steps } => {
            let Some((last, parents)) = steps.split_last() else {
                return RestResult::forbidden(); // cannot delete the root object
            };
            let Some(parent) = navigate_mut(root, parents) else {
                return RestResult::not_found();
            };
            match last {
                Step::Nested(field) => {
                    parent.clear_field(*field);
                    parent.mark_field_changed(*field, true);
                }
                Step::Element(field, id) => {
                    if !parent.remove_object_element(*field, *id) {
                        return RestResult::not_found();
                    }
                }
            }
            mark_path_changed(root, parents);
            RestResult::ok()
        }
        Target::Array { steps, field } => {
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            object.clear_field(field);
            object.mark_field_changed(field, true);
            mark_path_changed(root, &steps);
            RestResult::ok()
        }
        Target::Field { steps, field, at } => {
            let Some(object) = navigate_mut(root, &steps) else {
                return RestResult::not_found();
            };
            let is_array = object
                .record_type()
                .field(field)
                .is_some_and(arbor_core::schema::Field::is_array);
            if is_array {
                if object.remove_element_at(field, at).is_err() {
                    return RestResult::not_found();
                }
            } else {
                if !object.is_touched(field) {
                    return RestResult::not_found();
                }
                object.clear_field(field);
            }
            mark_path_changed(root, &steps);
            RestResult::ok()
        }
    }
}

// ---- JSON conveniences --------------------------------------------------

/// GET with the JSON codec, returning the body on success.
///
/// # Errors
///
/// The failing [`RestResult`] (status + detail).
pub fn get_json(root: &Object, path: &str, access: &AccessControl) -> Result<String, RestResult> {
    let mut buffer = Vec::new();
    let mut out = OutputStream::buffer(&mut buffer);
    let result = rest_get(root, path, access, &JsonCodec, &mut out);
    drop(out);
    if result.is_ok() {
        String::from_utf8(buffer).map_err(|_| RestResult::internal("invalid UTF-8 in output"))
    } else {
        Err(result)
    }
}

/// POST a JSON body.
pub fn post_json(root: &mut Object, path: &str, body: &str, access: &AccessControl) -> RestResult {
    let mut input = InputStream::new(body.as_bytes());
    rest_post(root, path, access, &JsonCodec, &mut input)
}

/// PATCH a JSON body.
pub fn patch_json(root: &mut Object, path: &str, body: &str, access: &AccessControl) -> RestResult {
    let mut input = InputStream::new(body.as_bytes());
    rest_patch(root, path, access, &JsonCodec, &mut input)
}

/// PUT a JSON body.
pub fn put_json(root: &mut Object, path: &str, body: &str, access: &AccessControl) -> RestResult {
    let mut input = InputStream::new(body.as_bytes());
    rest_put(root, path, access, &JsonCodec, &mut input)
}

// ---- path completion ----------------------------------------------------

/// Enumerate path completions for `prefix`: field labels, array ids or
/// indices, and enum value names, truncated to `max` entries.
#[must_use]
pub fn search_paths(
    root: &Object,
    prefix: &str,
    level: arbor_core::AccessLevel,
    permission: Permission,
    max: usize,
) -> Vec<String> {
    if !prefix.starts_with('/') {
        return Vec::new();
    }
    let ends_with_slash = prefix.ends_with('/');
    let Ok(mut tokens) = tokenize(prefix) else {
        return Vec::new();
    };
    let partial = if ends_with_slash || tokens.is_empty() {
        String::new()
    } else {
        tokens.pop().map(str::to_owned).unwrap_or_default()
    };

    let mut target = Target::Object { steps: Vec::new() };
    for token in &tokens {
        match step(root, target, token, level, permission) {
            Ok(next) => target = next,
            Err(_) => return Vec::new(),
        }
    }
    let base = if tokens.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}/", tokens.join("/"))
    };

    let mut paths = Vec::new();
    match &target {
        Target::Object { steps } => {
            let Some(object) = navigate(root, steps) else {
                return Vec::new();
            };
            for field in object.record_type().fields() {
                let permitted = match permission {
                    Permission::Read => field.readable_at(level),
                    Permission::Write => field.writable_at(level),
                };
                if permitted && field.label.starts_with(&partial) {
                    paths.push(format!("{base}{}", field.label));
                }
            }
        }
        Target::Array { steps, field } => {
            let Some(object) = navigate(root, steps) else {
                return Vec::new();
            };
            let descriptor = object
                .record_type()
                .field(*field)
                .expect("array target carries a valid field index");
            if descriptor.is_object() {
                for element in object.object_elements(*field) {
                    let id = element.id().to_string();
                    if element.has_id() && id.starts_with(&partial) {
                        paths.push(format!("{base}{id}"));
                    }
                }
            } else {
                for index in 0..object.count(*field) {
                    let text = index.to_string();
                    if text.starts_with(&partial) {
                        paths.push(format!("{base}{text}"));
                    }
                }
            }
        }
        Target::Field { steps, field, .. } => {
            let Some(object) = navigate(root, steps) else {
                return Vec::new();
            };
            let descriptor = object
                .record_type()
                .field(*field)
                .expect("field target carries a valid index");
            if let Some(map) = &descriptor.enum_map {
                for entry in map.entries() {
                    if entry.name.starts_with(&partial) {
                        paths.push(format!("{base}{}", entry.name));
                    }
                }
            } else if partial.is_empty() {
                paths.push(base.trim_end_matches('/').to_owned());
            }
        }
    }
    paths.truncate(max);
    paths
}
