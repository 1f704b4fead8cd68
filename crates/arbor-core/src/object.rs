//! In-memory objects — typed records with per-field touched/changed bits.
//!
//! An [`Object`] is an instance of a [`RecordType`]: one slot per field
//! plus a [`FieldMask`]. Every mutation funnels through a single path
//! that maintains the mask invariants:
//!
//! - setting a value marks the field *touched*, and *changed* when the
//!   value actually differs or the field was previously absent;
//! - clearing a touched field clears *touched* and marks *changed*;
//! - removing the last array element clears the array's *touched* bit.
//!
//! Nested objects are owned inline; arrays of sub-objects carry their own
//! masks and ids per element.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::id::generate_id;
use crate::mask::FieldMask;
use crate::schema::{Field, FieldType, ObjectId, RecordType, ID_FIELD_INDEX};
use crate::value::Value;

/// Error raised by object mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// No field at the given index.
    #[error("no field at index {0}")]
    NoSuchField(usize),
    /// Value variant does not match the field's semantic type, or a
    /// scalar operation was applied to an array (or vice versa).
    #[error("type mismatch on field '{0}'")]
    TypeMismatch(String),
    /// Array is at capacity.
    #[error("array overflow: {0}")]
    CapacityExceeded(String),
    /// Array index beyond the current count.
    #[error("index {1} out of range for '{0}'")]
    IndexOutOfRange(String, usize),
    /// Integer too wide for the field, numeric bounds violated, or
    /// string/bytes beyond capacity.
    #[error("value out of range for '{0}'")]
    OutOfRange(String),
    /// Operation between objects of different record types.
    #[error("record type mismatch: expected '{0}'")]
    WrongRecordType(String),
}

/// Storage for one field.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Scalar(Value),
    Object(Box<Object>),
    Values(Vec<Value>),
    Objects(Vec<Object>),
}

impl Slot {
    fn default_for(field: &Field) -> Self {
        if field.is_array() {
            if field.is_object() {
                Self::Objects(Vec::new())
            } else {
                Self::Values(Vec::new())
            }
        } else if field.is_object() {
            let subtype = field
                .subtype
                .as_ref()
                .expect("object field validated to carry a subtype");
            Self::Object(Box::new(Object::new(subtype)))
        } else {
            Self::Scalar(Value::default_for(field))
        }
    }
}

/// A typed, in-place record with per-field touched/changed tracking.
#[derive(Debug, Clone)]
pub struct Object {
    rtype: Arc<RecordType>,
    mask: FieldMask,
    slots: Vec<Slot>,
}

impl Object {
    /// Create an empty object of `rtype`; no field is touched.
    #[must_use]
    pub fn new(rtype: &Arc<RecordType>) -> Self {
        let slots = rtype.fields().iter().map(Slot::default_for).collect();
        Self {
            rtype: Arc::clone(rtype),
            mask: FieldMask::new(),
            slots,
        }
    }

    /// The object's record type.
    #[must_use]
    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.rtype
    }

    /// The touched/changed mask.
    #[must_use]
    pub fn mask(&self) -> &FieldMask {
        &self.mask
    }

    fn field(&self, index: usize) -> Result<&Field, ObjectError> {
        self.rtype
            .field(index)
            .ok_or(ObjectError::NoSuchField(index))
    }

    pub(crate) fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    /// True when field `index` is present.
    #[must_use]
    pub fn is_touched(&self, index: usize) -> bool {
        self.mask.touched(index)
    }

    /// True when field `index` changed since the last clear.
    #[must_use]
    pub fn is_changed(&self, index: usize) -> bool {
        self.mask.changed(index)
    }

    /// Set or clear the touched bit directly (codec/engine bookkeeping).
    pub fn mark_field_touched(&mut self, index: usize, on: bool) {
        self.mask.set_touched(index, on);
    }

    /// Set or clear the changed bit directly (codec/engine bookkeeping).
    pub fn mark_field_changed(&mut self, index: usize, on: bool) {
        self.mask.set_changed(index, on);
    }

    // ---- id -------------------------------------------------------------

    /// The object id; 0 when never assigned.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match &self.slots[ID_FIELD_INDEX] {
            Slot::Scalar(Value::Unsigned(id)) => *id,
            _ => 0,
        }
    }

    /// True when the id field is present.
    #[must_use]
    pub fn has_id(&self) -> bool {
        self.mask.touched(ID_FIELD_INDEX)
    }

    /// Assign the id, marking it changed when it actually differs.
    pub fn assign_id(&mut self, id: ObjectId) {
        let _ = self.apply_scalar(ID_FIELD_INDEX, Value::Unsigned(id));
    }

    // ---- scalar access --------------------------------------------------

    /// Value of a touched scalar field; `None` when absent or not scalar.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        if !self.mask.touched(index) {
            return None;
        }
        match &self.slots[index] {
            Slot::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Unsigned view of a touched numeric field.
    #[must_use]
    pub fn u64_value(&self, index: usize) -> Option<u64> {
        self.value(index).and_then(Value::as_u64)
    }

    /// Signed view of a touched numeric field.
    #[must_use]
    pub fn i64_value(&self, index: usize) -> Option<i64> {
        self.value(index).and_then(Value::as_i64)
    }

    /// String view of a touched string field.
    #[must_use]
    pub fn string_value(&self, index: usize) -> Option<&str> {
        self.value(index).and_then(Value::as_str)
    }

    /// Set a scalar field, enforcing type, width, capacity and bounds.
    ///
    /// Returns whether the stored value actually changed.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] on schema violations; the object is unchanged.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<bool, ObjectError> {
        self.apply_scalar(index, value.into())
    }

    /// The single mutation path: validates and stores a scalar, updating
    /// touched/changed per the mask invariants.
    fn apply_scalar(&mut self, index: usize, value: Value) -> Result<bool, ObjectError> {
        let field = self.field(index)?;
        if field.is_array() {
            return Err(ObjectError::TypeMismatch(field.label.clone()));
        }
        Self::check_value(field, &value)?;
        let label = field.label.clone();

        let was_touched = self.mask.touched(index);
        let changed = match &mut self.slots[index] {
            Slot::Scalar(current) => {
                let changed = !was_touched || *current != value;
                *current = value;
                changed
            }
            _ => return Err(ObjectError::TypeMismatch(label)),
        };
        self.mask.set_touched(index, true);
        if changed {
            self.mask.set_changed(index, true);
        }
        Ok(changed)
    }

    fn check_value(field: &Field, value: &Value) -> Result<(), ObjectError> {
        if !value.matches(field) {
            return Err(ObjectError::TypeMismatch(field.label.clone()));
        }
        if !value.fits_width(field.width) {
            return Err(ObjectError::OutOfRange(field.label.clone()));
        }
        match value {
            Value::String(s) if s.len() > field.width => {
                return Err(ObjectError::OutOfRange(field.label.clone()));
            }
            Value::Bytes(b) if b.len() > field.width => {
                return Err(ObjectError::OutOfRange(field.label.clone()));
            }
            _ => {}
        }
        if field.kind.is_numeric() {
            if let Some(n) = value.as_f64() {
                if field.min.is_some_and(|min| n < min) || field.max.is_some_and(|max| n > max) {
                    return Err(ObjectError::OutOfRange(field.label.clone()));
                }
            }
        }
        Ok(())
    }

    /// Set a string field.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] when the field is not a scalar string or the value
    /// exceeds its capacity.
    pub fn set_string(&mut self, index: usize, value: &str) -> Result<bool, ObjectError> {
        self.apply_scalar(index, Value::String(value.to_owned()))
    }

    /// Set a bytes field.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] when the field is not scalar bytes or the value
    /// exceeds its capacity.
    pub fn set_bytes(&mut self, index: usize, value: &[u8]) -> Result<bool, ObjectError> {
        self.apply_scalar(index, Value::Bytes(value.to_vec()))
    }

    // ---- bitmask helpers ------------------------------------------------

    /// Set or clear one bit of a bitmask field.
    ///
    /// # Errors
    ///
    /// [`ObjectError::TypeMismatch`] when the field is not a bitmask.
    pub fn set_bit(&mut self, index: usize, bit: u32, on: bool) -> Result<bool, ObjectError> {
        let field = self.field(index)?;
        if field.kind != FieldType::Bitmask || bit >= 64 {
            return Err(ObjectError::TypeMismatch(field.label.clone()));
        }
        let current = match &self.slots[index] {
            Slot::Scalar(Value::Unsigned(v)) => *v,
            _ => 0,
        };
        let updated = if on {
            current | (1 << bit)
        } else {
            current & !(1 << bit)
        };
        self.apply_scalar(index, Value::Unsigned(updated))
    }

    /// Set or clear a named bit of a bitmask field.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] when the field is not a bitmask or the name is not
    /// in its enum map.
    pub fn set_bit_by_name(
        &mut self,
        index: usize,
        name: &str,
        on: bool,
    ) -> Result<bool, ObjectError> {
        let field = self.field(index)?;
        let bit = field
            .enum_map
            .as_ref()
            .and_then(|m| m.value_for(name))
            .ok_or_else(|| ObjectError::TypeMismatch(field.label.clone()))?;
        #[allow(clippy::cast_possible_truncation)]
        self.set_bit(index, bit as u32, on)
    }

    /// Test one bit of a bitmask field.
    #[must_use]
    pub fn bit(&self, index: usize, bit: u32) -> bool {
        bit < 64
            && self
                .u64_value(index)
                .is_some_and(|v| v & (1 << bit) != 0)
    }

    // ---- clearing -------------------------------------------------------

    /// Clear field `index`: resets the slot and, if it was touched, clears
    /// touched and marks changed.
    pub fn clear_field(&mut self, index: usize) {
        let Some(field) = self.rtype.field(index) else {
            return;
        };
        self.slots[index] = Slot::default_for(field);
        self.mask.clear_if_touched_and_mark_changed(index);
    }

    /// Clear every field, including the id.
    pub fn clear_all(&mut self) {
        for index in 0..self.rtype.field_count() {
            self.clear_field(index);
        }
    }

    /// Clear every field except the id, which keeps its value, stays
    /// touched and is not marked changed.
    pub fn clear_all_except_id(&mut self) {
        let id = self.id();
        let id_touched = self.has_id();
        self.clear_all();
        if id_touched {
            let _ = self.apply_scalar(ID_FIELD_INDEX, Value::Unsigned(id));
            self.mask.set_changed(ID_FIELD_INDEX, false);
        }
    }

    /// Clear all touched bits, marking previously-touched fields changed.
    /// Recurses into nested objects and sub-object arrays.
    pub fn clear_touch_markers(&mut self) {
        for index in 0..self.rtype.field_count() {
            match &mut self.slots[index] {
                Slot::Object(sub) => sub.clear_touch_markers(),
                Slot::Objects(subs) => {
                    for sub in subs {
                        sub.clear_touch_markers();
                    }
                }
                Slot::Scalar(_) | Slot::Values(_) => {}
            }
            self.mask.clear_if_touched_and_mark_changed(index);
        }
    }

    /// Clear all changed bits, recursing into nested objects and
    /// sub-object arrays.
    pub fn clear_change_markers(&mut self) {
        self.mask.clear_all_changed();
        for slot in &mut self.slots {
            match slot {
                Slot::Object(sub) => sub.clear_change_markers(),
                Slot::Objects(subs) => {
                    for sub in subs {
                        sub.clear_change_markers();
                    }
                }
                Slot::Scalar(_) | Slot::Values(_) => {}
            }
        }
    }

    /// Snapshot of "what changed since the last clear" (changed bits only).
    #[must_use]
    pub fn changes(&self) -> FieldMask {
        let mut mask = self.mask;
        mask.clear_all_touched();
        mask
    }

    /// True when any field changed, here or in a nested object.
    #[must_use]
    pub fn is_any_changed(&self) -> bool {
        if self.mask.any_changed() {
            return true;
        }
        self.slots.iter().any(|slot| match slot {
            Slot::Object(sub) => sub.is_any_changed(),
            Slot::Objects(subs) => subs.iter().any(Object::is_any_changed),
            Slot::Scalar(_) | Slot::Values(_) => false,
        })
    }

    // ---- arrays ---------------------------------------------------------

    /// Element count: array length, or 0/1 presence for scalars.
    #[must_use]
    pub fn count(&self, index: usize) -> usize {
        if !self.mask.touched(index) {
            return 0;
        }
        match &self.slots[index] {
            Slot::Values(v) => v.len(),
            Slot::Objects(v) => v.len(),
            Slot::Scalar(_) | Slot::Object(_) => 1,
        }
    }

    /// Scalar-array element at `at`.
    #[must_use]
    pub fn element(&self, index: usize, at: usize) -> Option<&Value> {
        match &self.slots[index] {
            Slot::Values(v) if self.mask.touched(index) => v.get(at),
            _ => None,
        }
    }

    /// Scalar-array contents; empty when absent or not a scalar array.
    #[must_use]
    pub fn elements(&self, index: usize) -> &[Value] {
        match &self.slots[index] {
            Slot::Values(v) if self.mask.touched(index) => v,
            _ => &[],
        }
    }

    fn array_field(&self, index: usize) -> Result<&Field, ObjectError> {
        let field = self.field(index)?;
        if !field.is_array() {
            return Err(ObjectError::TypeMismatch(field.label.clone()));
        }
        Ok(field)
    }

    /// Insert a scalar-array element at position `at`.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] on type mismatch, capacity overflow or bad index.
    pub fn insert_element(
        &mut self,
        index: usize,
        at: usize,
        value: impl Into<Value>,
    ) -> Result<(), ObjectError> {
        let value = value.into();
        let field = self.array_field(index)?;
        Self::check_value(field, &value)?;
        let label = field.label.clone();
        let capacity = field.array_capacity;
        let Slot::Values(items) = &mut self.slots[index] else {
            return Err(ObjectError::TypeMismatch(label));
        };
        if items.len() >= capacity {
            return Err(ObjectError::CapacityExceeded(label));
        }
        if at > items.len() {
            return Err(ObjectError::IndexOutOfRange(label, at));
        }
        items.insert(at, value);
        self.mask.set_touched(index, true);
        self.mask.set_changed(index, true);
        Ok(())
    }

    /// Append a scalar-array element, returning its index.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] on type mismatch or capacity overflow.
    pub fn push_element(
        &mut self,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<usize, ObjectError> {
        let at = match &self.slots[index] {
            Slot::Values(v) => v.len(),
            _ => 0,
        };
        self.insert_element(index, at, value)?;
        Ok(at)
    }

    /// Overwrite the scalar-array element at `at`, returning whether it
    /// actually changed.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] on type mismatch or bad index.
    pub fn set_element(
        &mut self,
        index: usize,
        at: usize,
        value: impl Into<Value>,
    ) -> Result<bool, ObjectError> {
        let value = value.into();
        let field = self.array_field(index)?;
        Self::check_value(field, &value)?;
        let label = field.label.clone();
        let Slot::Values(items) = &mut self.slots[index] else {
            return Err(ObjectError::TypeMismatch(label));
        };
        let Some(current) = items.get_mut(at) else {
            return Err(ObjectError::IndexOutOfRange(label, at));
        };
        let changed = *current != value;
        *current = value;
        self.mask.set_touched(index, true);
        if changed {
            self.mask.set_changed(index, true);
        }
        Ok(changed)
    }

    /// Remove the array element at `at`; later elements shift down. Works
    /// for scalar and sub-object arrays. Removing the last element clears
    /// the array's touched bit.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] on a non-array field or bad index.
    pub fn remove_element_at(&mut self, index: usize, at: usize) -> Result<(), ObjectError> {
        let label = self.array_field(index)?.label.clone();
        let len = match &mut self.slots[index] {
            Slot::Values(items) => {
                if at >= items.len() {
                    return Err(ObjectError::IndexOutOfRange(label, at));
                }
                items.remove(at);
                items.len()
            }
            Slot::Objects(items) => {
                if at >= items.len() {
                    return Err(ObjectError::IndexOutOfRange(label, at));
                }
                items.remove(at);
                items.len()
            }
            Slot::Scalar(_) | Slot::Object(_) => {
                return Err(ObjectError::TypeMismatch(label));
            }
        };
        if len == 0 {
            self.mask.set_touched(index, false);
        }
        self.mask.set_changed(index, true);
        Ok(())
    }

    // ---- nested objects -------------------------------------------------

    /// Nested object at `index`, if the field is a touched object scalar.
    #[must_use]
    pub fn nested(&self, index: usize) -> Option<&Object> {
        match &self.slots[index] {
            Slot::Object(sub) if self.mask.touched(index) => Some(sub),
            _ => None,
        }
    }

    /// Nested object regardless of its touched bit; path traversal and
    /// codecs use this, since an absent nested object is still browsable.
    #[must_use]
    pub fn nested_slot(&self, index: usize) -> Option<&Object> {
        match &self.slots[index] {
            Slot::Object(sub) => Some(sub),
            _ => None,
        }
    }

    /// Mutable nested object without mask bookkeeping; callers maintain
    /// the touched/changed bits themselves.
    pub fn nested_slot_mut(&mut self, index: usize) -> Option<&mut Object> {
        match &mut self.slots[index] {
            Slot::Object(sub) => Some(sub),
            _ => None,
        }
    }

    /// Store a scalar without mask bookkeeping; returns whether the value
    /// differed (codec change detection).
    pub(crate) fn store_scalar_raw(&mut self, index: usize, value: Value) -> bool {
        let Slot::Scalar(current) = &mut self.slots[index] else {
            return false;
        };
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    }

    /// Overwrite an array element without mask bookkeeping; returns
    /// whether it differed.
    pub(crate) fn store_element_raw(&mut self, index: usize, at: usize, value: Value) -> bool {
        let Slot::Values(items) = &mut self.slots[index] else {
            return false;
        };
        match items.get_mut(at) {
            Some(current) if *current == value => false,
            Some(current) => {
                *current = value;
                true
            }
            None => false,
        }
    }

    /// Replace a scalar array's contents without mask bookkeeping;
    /// returns whether they differed.
    pub(crate) fn replace_values_raw(&mut self, index: usize, items: Vec<Value>) -> bool {
        let Slot::Values(current) = &mut self.slots[index] else {
            return false;
        };
        if *current == items {
            false
        } else {
            *current = items;
            true
        }
    }

    /// Replace a sub-object array's contents without mask bookkeeping;
    /// returns whether they differed.
    pub(crate) fn replace_objects_raw(&mut self, index: usize, items: Vec<Object>) -> bool {
        let Slot::Objects(current) = &mut self.slots[index] else {
            return false;
        };
        let differs = current.len() != items.len()
            || current
                .iter()
                .zip(items.iter())
                .any(|(a, b)| a.compare(b) != Ordering::Equal);
        *current = items;
        differs
    }

    /// Array length regardless of the touched bit (codec access).
    pub(crate) fn raw_count(&self, index: usize) -> usize {
        match &self.slots[index] {
            Slot::Values(items) => items.len(),
            Slot::Objects(items) => items.len(),
            Slot::Scalar(_) | Slot::Object(_) => 0,
        }
    }

    /// Append a scalar-array element without mask bookkeeping; returns the
    /// new length (codec access, capacity checked by the caller).
    pub(crate) fn append_value_raw(&mut self, index: usize, value: Value) -> usize {
        match &mut self.slots[index] {
            Slot::Values(items) => {
                items.push(value);
                items.len()
            }
            _ => 0,
        }
    }

    /// Append a sub-object element without mask bookkeeping; returns the
    /// new length.
    pub(crate) fn append_object_raw(&mut self, index: usize, element: Object) -> usize {
        match &mut self.slots[index] {
            Slot::Objects(items) => {
                items.push(element);
                items.len()
            }
            _ => 0,
        }
    }

    /// Mutable nested object; marks the field touched.
    #[must_use]
    pub fn nested_mut(&mut self, index: usize) -> Option<&mut Object> {
        let is_object = matches!(&self.slots[index], Slot::Object(_));
        if !is_object {
            return None;
        }
        self.mask.set_touched(index, true);
        match &mut self.slots[index] {
            Slot::Object(sub) => Some(sub),
            _ => unreachable!(),
        }
    }

    // ---- sub-object arrays ----------------------------------------------

    /// Elements of a sub-object array; empty when absent.
    #[must_use]
    pub fn object_elements(&self, index: usize) -> &[Object] {
        match &self.slots[index] {
            Slot::Objects(items) if self.mask.touched(index) => items,
            _ => &[],
        }
    }

    /// Sub-object array element at position `at`.
    #[must_use]
    pub fn object_element_at(&self, index: usize, at: usize) -> Option<&Object> {
        self.object_elements(index).get(at)
    }

    /// Mutable sub-object array element at position `at`.
    #[must_use]
    pub fn object_element_at_mut(&mut self, index: usize, at: usize) -> Option<&mut Object> {
        match &mut self.slots[index] {
            Slot::Objects(items) => items.get_mut(at),
            _ => None,
        }
    }

    /// Add a sub-object element; a missing `id` is generated. The new
    /// element has its id touched and changed; the array field is marked
    /// touched and changed.
    ///
    /// # Errors
    ///
    /// [`ObjectError`] on a non-object-array field or capacity overflow.
    pub fn add_object_element(
        &mut self,
        index: usize,
        id: Option<ObjectId>,
    ) -> Result<&mut Object, ObjectError> {
        let field = self.array_field(index)?;
        if !field.is_object() {
            return Err(ObjectError::TypeMismatch(field.label.clone()));
        }
        let label = field.label.clone();
        let capacity = field.array_capacity;
        let subtype = Arc::clone(field.subtype.as_ref().expect("object field has subtype"));

        let Slot::Objects(items) = &mut self.slots[index] else {
            return Err(ObjectError::TypeMismatch(label));
        };
        if items.len() >= capacity {
            return Err(ObjectError::CapacityExceeded(label));
        }
        let mut element = Object::new(&subtype);
        element.assign_id(id.unwrap_or_else(generate_id));
        items.push(element);
        self.mask.set_touched(index, true);
        self.mask.set_changed(index, true);
        let last = items.len() - 1;
        match &mut self.slots[index] {
            Slot::Objects(items) => Ok(&mut items[last]),
            _ => unreachable!(),
        }
    }

    /// Find a sub-object element by id.
    #[must_use]
    pub fn find_object_element(&self, index: usize, id: ObjectId) -> Option<&Object> {
        self.object_elements(index)
            .iter()
            .find(|o| o.has_id() && o.id() == id)
    }

    /// Mutable lookup of a sub-object element by id.
    #[must_use]
    pub fn find_object_element_mut(&mut self, index: usize, id: ObjectId) -> Option<&mut Object> {
        match &mut self.slots[index] {
            Slot::Objects(items) => items.iter_mut().find(|o| o.has_id() && o.id() == id),
            _ => None,
        }
    }

    /// Remove a sub-object element by id; true when something was removed.
    pub fn remove_object_element(&mut self, index: usize, id: ObjectId) -> bool {
        let Slot::Objects(items) = &mut self.slots[index] else {
            return false;
        };
        let Some(at) = items.iter().position(|o| o.has_id() && o.id() == id) else {
            return false;
        };
        items.remove(at);
        if items.is_empty() {
            self.mask.set_touched(index, false);
        }
        self.mask.set_changed(index, true);
        true
    }

    // ---- whole-object operations ----------------------------------------

    fn check_same_type(&self, other: &Object) -> Result<(), ObjectError> {
        if Arc::ptr_eq(&self.rtype, &other.rtype) || self.rtype.name() == other.rtype.name() {
            Ok(())
        } else {
            Err(ObjectError::WrongRecordType(self.rtype.name().to_owned()))
        }
    }

    /// Merge `other` into `self`: fields touched in `other` are copied,
    /// fields changed-but-cleared in `other` are cleared here, everything
    /// else is retained. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// [`ObjectError::WrongRecordType`] when the types differ.
    pub fn patch(&mut self, other: &Object) -> Result<bool, ObjectError> {
        self.check_same_type(other)?;
        let mut any = false;
        for index in 0..self.rtype.field_count() {
            if other.mask.touched(index) {
                any |= self.copy_field_from(other, index)?;
            } else if other.mask.changed(index) {
                let was = self.mask.touched(index);
                self.clear_field(index);
                any |= was;
            }
        }
        Ok(any)
    }

    fn copy_field_from(&mut self, other: &Object, index: usize) -> Result<bool, ObjectError> {
        match &other.slots[index] {
            Slot::Scalar(value) => self.apply_scalar(index, value.clone()),
            Slot::Object(sub) => {
                let was_touched = self.mask.touched(index);
                let changed = match &mut self.slots[index] {
                    Slot::Object(own) => own.patch(sub)?,
                    _ => return Err(ObjectError::TypeMismatch(String::new())),
                };
                self.mask.set_touched(index, true);
                if changed || !was_touched {
                    self.mask.set_changed(index, true);
                }
                Ok(changed || !was_touched)
            }
            Slot::Values(items) => {
                let was_touched = self.mask.touched(index);
                let items = items.clone();
                let changed = match &mut self.slots[index] {
                    Slot::Values(own) => {
                        let differs = *own != items;
                        *own = items;
                        differs
                    }
                    _ => return Err(ObjectError::TypeMismatch(String::new())),
                };
                self.mask.set_touched(index, true);
                if changed || !was_touched {
                    self.mask.set_changed(index, true);
                }
                Ok(changed || !was_touched)
            }
            Slot::Objects(items) => {
                let was_touched = self.mask.touched(index);
                let items = items.clone();
                let changed = match &mut self.slots[index] {
                    Slot::Objects(own) => {
                        let differs = own.len() != items.len()
                            || own
                                .iter()
                                .zip(items.iter())
                                .any(|(a, b)| a.compare(b) != Ordering::Equal);
                        *own = items;
                        differs
                    }
                    _ => return Err(ObjectError::TypeMismatch(String::new())),
                };
                self.mask.set_touched(index, true);
                if changed || !was_touched {
                    self.mask.set_changed(index, true);
                }
                Ok(changed || !was_touched)
            }
        }
    }

    /// Replace all fields with those present in `other`, keeping the id:
    /// clear everything except the id, then [`patch`](Self::patch).
    ///
    /// # Errors
    ///
    /// [`ObjectError::WrongRecordType`] when the types differ.
    pub fn put(&mut self, other: &Object) -> Result<bool, ObjectError> {
        self.check_same_type(other)?;
        let id = self.id();
        let id_touched = self.has_id();
        self.clear_all_except_id();
        let mut any = false;
        for index in 0..self.rtype.field_count() {
            if index == ID_FIELD_INDEX {
                continue;
            }
            if other.mask.touched(index) {
                any |= self.copy_field_from(other, index)?;
            }
        }
        if id_touched {
            let _ = self.apply_scalar(ID_FIELD_INDEX, Value::Unsigned(id));
            self.mask.set_changed(ID_FIELD_INDEX, false);
        }
        Ok(any)
    }

    /// Bit-exact copy of `other`'s data and mask.
    ///
    /// # Errors
    ///
    /// [`ObjectError::WrongRecordType`] when the types differ.
    pub fn overwrite(&mut self, other: &Object) -> Result<(), ObjectError> {
        self.check_same_type(other)?;
        self.slots = other.slots.clone();
        self.mask = other.mask;
        Ok(())
    }

    /// Move `other`'s data and mask into `self`.
    ///
    /// # Errors
    ///
    /// [`ObjectError::WrongRecordType`] when the types differ.
    pub fn transfer(&mut self, other: Object) -> Result<(), ObjectError> {
        self.check_same_type(&other)?;
        self.slots = other.slots;
        self.mask = other.mask;
        Ok(())
    }

    /// Deterministic ordering over present fields and their values.
    #[must_use]
    pub fn compare(&self, other: &Object) -> Ordering {
        self.rtype
            .name()
            .cmp(other.rtype.name())
            .then_with(|| self.compare_fields(other))
    }

    fn compare_fields(&self, other: &Object) -> Ordering {
        for index in 0..self.rtype.field_count() {
            let mine = self.mask.touched(index);
            let theirs = other.mask.touched(index);
            let order = mine.cmp(&theirs).then_with(|| {
                if !mine {
                    return Ordering::Equal;
                }
                match (&self.slots[index], &other.slots[index]) {
                    (Slot::Scalar(a), Slot::Scalar(b)) => a.compare(b),
                    (Slot::Object(a), Slot::Object(b)) => a.compare(b),
                    (Slot::Values(a), Slot::Values(b)) => a
                        .iter()
                        .map(Some)
                        .chain(std::iter::repeat(None))
                        .zip(b.iter().map(Some).chain(std::iter::repeat(None)))
                        .take(a.len().max(b.len()))
                        .map(|(x, y)| match (x, y) {
                            (Some(x), Some(y)) => x.compare(y),
                            (None, Some(_)) => Ordering::Less,
                            (Some(_), None) => Ordering::Greater,
                            (None, None) => Ordering::Equal,
                        })
                        .find(|o| *o != Ordering::Equal)
                        .unwrap_or(Ordering::Equal),
                    (Slot::Objects(a), Slot::Objects(b)) => a
                        .len()
                        .cmp(&b.len())
                        .then_with(|| {
                            a.iter()
                                .zip(b.iter())
                                .map(|(x, y)| x.compare(y))
                                .find(|o| *o != Ordering::Equal)
                                .unwrap_or(Ordering::Equal)
                        }),
                    _ => Ordering::Equal,
                }
            });
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}
