//! Validation hooks run inside transactions before a commit lands.

use std::sync::Arc;

use arbor_core::Object;

/// Outcome of a validator: `Err` carries the message surfaced in the
/// REST body of the rejected write.
pub type ValidationResult = Result<(), String>;

/// A registered validator. Validators run in insertion order; the first
/// failure aborts the commit.
pub type Validator = Arc<dyn Fn(&mut Validation<'_>) -> ValidationResult + Send + Sync>;

/// The state offered to a validator: the proposed (not yet committed)
/// object, writable so validators can apply defaults or fix-ups, plus a
/// read-only view of the pre-commit state.
pub struct Validation<'a> {
    proposed: &'a mut Object,
    current: Option<&'a Object>,
    is_new: bool,
    is_deleted: bool,
}

impl<'a> Validation<'a> {
    pub(crate) fn new(
        proposed: &'a mut Object,
        current: Option<&'a Object>,
        is_new: bool,
        is_deleted: bool,
    ) -> Self {
        Self {
            proposed,
            current,
            is_new,
            is_deleted,
        }
    }

    /// The proposed state.
    #[must_use]
    pub fn object(&self) -> &Object {
        self.proposed
    }

    /// The proposed state, writable for fix-ups.
    #[must_use]
    pub fn object_mut(&mut self) -> &mut Object {
        self.proposed
    }

    /// The pre-commit state; `None` for a newly created object.
    #[must_use]
    pub fn current(&self) -> Option<&Object> {
        self.current
    }

    /// True when the commit creates the object.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// True when the commit deletes the object.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }
}

/// Run `validators` in order; the first failure wins.
pub(crate) fn run_validators(
    validators: &[Validator],
    validation: &mut Validation<'_>,
) -> ValidationResult {
    for validator in validators {
        validator(validation)?;
    }
    Ok(())
}
