//! Access control: caller level plus read/write field filters.
//!
//! An [`AccessControl`] describes one caller: an [`AccessLevel`], an
//! optional mask restricting the visible top-level fields, a deltas-only
//! mode (reads emit only changed fields) and a persistent-only mode
//! (reads and writes see only fields marked persisted). The REST engine
//! turns it into per-object field masks and hands those to the codecs.

use arbor_core::{AccessLevel, FieldFilter, FieldMask, Object};

/// A caller's access configuration.
#[derive(Debug, Clone)]
pub struct AccessControl {
    level: AccessLevel,
    root_field_filter: Option<FieldMask>,
    deltas_only: bool,
    persistent_only: bool,
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new(AccessLevel::Root)
    }
}

impl AccessControl {
    /// Plain access at `level`.
    #[must_use]
    pub fn new(level: AccessLevel) -> Self {
        Self {
            level,
            root_field_filter: None,
            deltas_only: false,
            persistent_only: false,
        }
    }

    /// Unrestricted root access.
    #[must_use]
    pub fn root() -> Self {
        Self::new(AccessLevel::Root)
    }

    /// Access at `level` where reads emit only changed fields.
    #[must_use]
    pub fn for_deltas(level: AccessLevel) -> Self {
        Self {
            deltas_only: true,
            ..Self::new(level)
        }
    }

    /// Access at `level` restricted to persisted fields.
    #[must_use]
    pub fn for_persistence(level: AccessLevel) -> Self {
        Self {
            persistent_only: true,
            ..Self::new(level)
        }
    }

    /// Access at `level` restricted to changed persisted fields.
    #[must_use]
    pub fn for_persistence_deltas(level: AccessLevel) -> Self {
        Self {
            deltas_only: true,
            persistent_only: true,
            ..Self::new(level)
        }
    }

    /// Root access restricted to the given top-level fields.
    #[must_use]
    pub fn for_fields<I: IntoIterator<Item = usize>>(fields: I) -> Self {
        Self {
            root_field_filter: Some(FieldMask::for_fields(fields)),
            ..Self::root()
        }
    }

    /// Restrict the visible top-level fields.
    #[must_use]
    pub fn with_root_filter(mut self, filter: FieldMask) -> Self {
        self.root_field_filter = Some(filter);
        self
    }

    /// The caller's level.
    #[must_use]
    pub fn level(&self) -> AccessLevel {
        self.level
    }

    fn mask(&self, object: &Object, top_level: bool, for_reading: bool) -> FieldMask {
        let mut mask = FieldMask::new();
        let deltas = self.deltas_only && for_reading && top_level;
        for field in object.record_type().fields() {
            let mut allowed = if for_reading {
                field.readable_at(self.level)
            } else {
                field.writable_at(self.level)
            };
            allowed &= !self.persistent_only || field.persisted;
            if top_level {
                if let Some(filter) = &self.root_field_filter {
                    allowed &= filter.touched(field.index) || filter.changed(field.index);
                }
            }
            if !allowed {
                continue;
            }
            // The touched bit allows value emission; the changed bit asks
            // the encoder to signal cleared fields as null. Plain reads
            // never signal clears; delta reads always do.
            if deltas {
                if object.is_changed(field.index) {
                    mask.set_touched(field.index, true);
                }
                mask.set_changed(field.index, true);
            } else {
                mask.set_touched(field.index, true);
            }
        }
        mask
    }

    /// Fields this caller may read from `object`.
    #[must_use]
    pub fn read_mask(&self, object: &Object, top_level: bool) -> FieldMask {
        self.mask(object, top_level, true)
    }

    /// Fields this caller may write to `object`.
    #[must_use]
    pub fn write_mask(&self, object: &Object, top_level: bool) -> FieldMask {
        self.mask(object, top_level, false)
    }
}

impl From<AccessLevel> for AccessControl {
    fn from(level: AccessLevel) -> Self {
        Self::new(level)
    }
}

/// [`FieldFilter`] view of an [`AccessControl`] for encoding.
pub struct ReadAccess<'a>(pub &'a AccessControl);

impl FieldFilter for ReadAccess<'_> {
    fn mask_for(&self, object: &Object, top_level: bool) -> FieldMask {
        self.0.read_mask(object, top_level)
    }
}

/// [`FieldFilter`] view of an [`AccessControl`] for decoding.
pub struct WriteAccess<'a>(pub &'a AccessControl);

impl FieldFilter for WriteAccess<'_> {
    fn mask_for(&self, object: &Object, top_level: bool) -> FieldMask {
        self.0.write_mask(object, top_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Field, Object, RecordType};
    use std::sync::Arc;

    fn test_type() -> Arc<RecordType> {
        RecordType::builder("Secure")
            .field(Field::bool("open"))
            .field(Field::bool("cloudy").read(AccessLevel::Cloud).write(AccessLevel::Cloud))
            .field(
                Field::bool("admin_only")
                    .read(AccessLevel::Admin)
                    .write(AccessLevel::Admin)
                    .persisted(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn read_mask_respects_levels() {
        let obj = Object::new(&test_type());
        let public = AccessControl::new(AccessLevel::Public).read_mask(&obj, true);
        assert!(public.touched(1));
        assert!(!public.touched(2));
        assert!(!public.touched(3));

        let admin = AccessControl::new(AccessLevel::Admin).read_mask(&obj, true);
        assert!(admin.touched(2));
        assert!(admin.touched(3));
    }

    #[test]
    fn persistent_only_restricts_all_levels() {
        let obj = Object::new(&test_type());
        let access = AccessControl::for_persistence(AccessLevel::Root);
        let mask = access.read_mask(&obj, true);
        assert!(mask.touched(0)); // id is persisted
        assert!(!mask.touched(1));
        assert!(mask.touched(3));

        // persistent-only applies below the root too
        let nested = access.read_mask(&obj, false);
        assert!(!nested.touched(1));
        assert!(nested.touched(3));
    }

    #[test]
    fn deltas_only_tracks_changed_fields_at_top_level() {
        let mut obj = Object::new(&test_type());
        obj.set(1, true).unwrap();
        obj.clear_change_markers();
        obj.set(1, false).unwrap();

        let access = AccessControl::for_deltas(AccessLevel::Root);
        let top = access.read_mask(&obj, true);
        assert!(top.touched(1));
        assert!(!top.touched(2));

        let nested = access.read_mask(&obj, false);
        assert!(nested.touched(2));
    }

    #[test]
    fn root_field_filter_applies_to_top_level_only() {
        let obj = Object::new(&test_type());
        let access = AccessControl::for_fields([1]);
        let top = access.read_mask(&obj, true);
        assert!(top.touched(1));
        assert!(!top.touched(2));

        let nested = access.read_mask(&obj, false);
        assert!(nested.touched(2));
    }

    #[test]
    fn write_mask_uses_write_permissions() {
        let obj = Object::new(&test_type());
        let cloud = AccessControl::new(AccessLevel::Cloud).write_mask(&obj, true);
        assert!(cloud.touched(1));
        assert!(cloud.touched(2));
        assert!(!cloud.touched(3));
    }
}
