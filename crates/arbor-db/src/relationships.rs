//! Cross-collection relationship helpers: mirrored deletes, cascade
//! deletes and enforced foreign-key references, built from subscriptions
//! and validators. Dropping the [`Relationships`] holder dissolves every
//! rule it installed.

use std::collections::BTreeSet;

use arbor_core::{Object, ObjectId, Value};

use crate::collection::Collection;
use crate::pubsub::SubscriptionHandle;
use crate::validate::{Validation, ValidationResult};

/// A path to a reference-valued field inside a collection's element type.
#[derive(Clone)]
pub struct ReferenceField {
    /// The collection holding the referencing elements.
    pub collection: Collection,
    /// Field index of the reference (scalar or array of ids).
    pub field: usize,
}

impl ReferenceField {
    /// Reference to `field` of `collection`'s element type.
    #[must_use]
    pub fn new(collection: &Collection, field: usize) -> Self {
        Self {
            collection: collection.clone(),
            field,
        }
    }
}

/// All id values held by a reference field (scalar or array).
fn reference_ids(object: &Object, field: usize) -> Vec<ObjectId> {
    let Some(descriptor) = object.record_type().field(field) else {
        return Vec::new();
    };
    if descriptor.is_array() {
        object
            .elements(field)
            .iter()
            .filter_map(Value::as_u64)
            .collect()
    } else {
        object.u64_value(field).into_iter().collect()
    }
}

fn field_label(collection: &Collection, field: usize) -> String {
    collection
        .record_type()
        .field(field)
        .map_or_else(String::new, |f| f.label.clone())
}

fn validate_reference(
    validation: &mut Validation<'_>,
    from: &ReferenceField,
    target: &Collection,
    allow_duplicates: bool,
) -> ValidationResult {
    if validation.is_deleted() || !validation.object().is_changed(from.field) {
        return Ok(());
    }
    let label = field_label(&from.collection, from.field);
    let ids = reference_ids(validation.object(), from.field);

    let mut seen = BTreeSet::new();
    for id in ids {
        if !target.contains(id) {
            return Err(format!(
                "'{}/{}' refers to id {} which is not in collection '{}'",
                from.collection.name(),
                label,
                id,
                target.name()
            ));
        }
        if !seen.insert(id) {
            return Err(format!(
                "'{}/{}' has duplicate entry {}",
                from.collection.name(),
                label,
                id
            ));
        }
    }
    if allow_duplicates {
        return Ok(());
    }

    // No two elements of the referencing collection may point at the
    // same target.
    let own_id = validation.object().id();
    let mut clash: Option<(ObjectId, ObjectId)> = None;
    from.collection.for_each(|other| {
        if other.id() == own_id || clash.is_some() {
            return;
        }
        for id in reference_ids(other, from.field) {
            if seen.contains(&id) {
                clash = Some((other.id(), id));
                return;
            }
        }
    });
    if let Some((other, id)) = clash {
        return Err(format!(
            "'{}/{}' and element {} both reference id {}",
            from.collection.name(),
            label,
            other,
            id
        ));
    }
    Ok(())
}

/// Remove every occurrence of `deleted_id` from the reference field
/// across the referencing collection.
fn scrub_references(from: &ReferenceField, deleted_id: ObjectId) {
    for element_id in from.collection.ids() {
        let holds_reference = from
            .collection
            .read(element_id, |object| {
                reference_ids(object, from.field).contains(&deleted_id)
            })
            .unwrap_or(false);
        if !holds_reference {
            continue;
        }
        tracing::debug!(
            collection = %from.collection.name(),
            element = element_id,
            reference = deleted_id,
            "scrubbing stale reference"
        );
        let field = from.field;
        from.collection.edit(element_id, |object| {
            let is_array = object
                .record_type()
                .field(field)
                .is_some_and(arbor_core::schema::Field::is_array);
            if is_array {
                loop {
                    let position = object
                        .elements(field)
                        .iter()
                        .position(|value| value.as_u64() == Some(deleted_id));
                    match position {
                        Some(at) => {
                            let _ = object.remove_element_at(field, at);
                        }
                        None => break,
                    }
                }
            } else {
                object.clear_field(field);
            }
        });
    }
}

/// Holder for installed relationship rules.
#[derive(Default)]
pub struct Relationships {
    handles: Vec<SubscriptionHandle>,
}

impl Relationships {
    /// An empty rule holder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dissolve every installed rule.
    pub fn clear_all(&mut self) {
        self.handles.clear();
    }

    /// Mirror deletes between two collections: deleting id `X` from one
    /// deletes id `X` from the other, when present.
    pub fn delete_together(&mut self, first: &Collection, second: &Collection) {
        let mirror = second.clone();
        self.handles.push(first.on_deleted(move |notification| {
            mirror.delete(notification.id());
        }));
        let mirror = first.clone();
        self.handles.push(second.on_deleted(move |notification| {
            mirror.delete(notification.id());
        }));
    }

    /// Delete dependents when their referent goes: whenever an object is
    /// deleted in `from`, every element of `dependents.collection` whose
    /// reference field points at it is deleted too.
    pub fn cascade_delete(&mut self, from: &Collection, dependents: ReferenceField) {
        self.handles.push(from.on_deleted(move |notification| {
            let referent = notification.id();
            let doomed: Vec<ObjectId> = {
                let mut doomed = Vec::new();
                dependents.collection.for_each(|object| {
                    if reference_ids(object, dependents.field).contains(&referent) {
                        doomed.push(object.id());
                    }
                });
                doomed
            };
            for id in doomed {
                dependents.collection.delete(id);
            }
        }));
    }

    /// Enforce that `from`'s reference field only holds ids present in
    /// `target`, with no duplicates within or across elements; deleting
    /// a target scrubs stale references.
    pub fn enforce_reference(&mut self, from: ReferenceField, target: &Collection) {
        self.enforce(from, target, false);
    }

    /// Like [`enforce_reference`](Self::enforce_reference) but allowing
    /// several elements to reference the same target.
    pub fn enforce_reference_allow_duplicates(&mut self, from: ReferenceField, target: &Collection) {
        self.enforce(from, target, true);
    }

    fn enforce(&mut self, from: ReferenceField, target: &Collection, allow_duplicates: bool) {
        let validated = from.clone();
        let target_handle = target.clone();
        self.handles
            .push(from.collection.validate_with(move |validation| {
                validate_reference(validation, &validated, &target_handle, allow_duplicates)
            }));

        self.handles.push(target.on_deleted(move |notification| {
            scrub_references(&from, notification.id());
        }));
    }
}

impl std::fmt::Debug for Relationships {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relationships")
            .field("rules", &self.handles.len())
            .finish()
    }
}
