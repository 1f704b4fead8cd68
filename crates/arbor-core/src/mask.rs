//! Field masks — two bits per field, with set algebra.
//!
//! Even bits track *touched* (the field is present), odd bits track
//! *changed* (the field was modified since the last clear). The same
//! shape doubles as a filter: access control, change subscriptions and
//! persistence selection all intersect and union these masks.

use crate::schema::{AccessLevel, RecordType, MAX_FIELDS};

const WORDS: usize = MAX_FIELDS * 2 / 32;
const TOUCHED_WORD: u32 = 0x5555_5555;
const CHANGED_WORD: u32 = 0xAAAA_AAAA;

const fn touched_bit(index: usize) -> usize {
    index << 1
}

const fn changed_bit(index: usize) -> usize {
    (index << 1) + 1
}

/// Per-field touched/changed bit-vector, also used as a filter.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMask {
    words: [u32; WORDS],
}

impl FieldMask {
    /// Empty mask.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Mask with every bit set.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            words: [u32::MAX; WORDS],
        }
    }

    /// Filter matching any change on the given fields (changed bits set,
    /// touched bits set so the fields pass access filters too).
    #[must_use]
    pub fn for_fields<I: IntoIterator<Item = usize>>(fields: I) -> Self {
        let mut mask = Self::new();
        for index in fields {
            mask.set_touched(index, true);
            mask.set_changed(index, true);
        }
        mask
    }

    /// Filter matching a change on any field.
    #[must_use]
    pub fn for_all_changes() -> Self {
        let mut mask = Self::new();
        mask.fill_all_changed();
        mask
    }

    /// Filter selecting the persisted fields of `rtype`.
    #[must_use]
    pub fn for_persisted(rtype: &RecordType) -> Self {
        let mut mask = Self::new();
        for field in rtype.fields() {
            if field.persisted {
                mask.set_touched(field.index, true);
                mask.set_changed(field.index, true);
            }
        }
        mask
    }

    /// Filter selecting the fields of `rtype` readable at `level`.
    #[must_use]
    pub fn for_user(rtype: &RecordType, level: AccessLevel) -> Self {
        let mut mask = Self::new();
        for field in rtype.fields() {
            if field.readable_at(level) {
                mask.set_touched(field.index, true);
                mask.set_changed(field.index, true);
            }
        }
        mask
    }

    fn bit(&self, bit: usize) -> bool {
        self.words[bit / 32] & (1 << (bit % 32)) != 0
    }

    fn set_bit(&mut self, bit: usize, on: bool) {
        if on {
            self.words[bit / 32] |= 1 << (bit % 32);
        } else {
            self.words[bit / 32] &= !(1 << (bit % 32));
        }
    }

    /// Touched bit for field `index`.
    #[must_use]
    pub fn touched(&self, index: usize) -> bool {
        self.bit(touched_bit(index))
    }

    /// Changed bit for field `index`.
    #[must_use]
    pub fn changed(&self, index: usize) -> bool {
        self.bit(changed_bit(index))
    }

    /// Set or clear the touched bit for field `index`.
    pub fn set_touched(&mut self, index: usize, on: bool) {
        self.set_bit(touched_bit(index), on);
    }

    /// Set or clear the changed bit for field `index`.
    pub fn set_changed(&mut self, index: usize, on: bool) {
        self.set_bit(changed_bit(index), on);
    }

    /// If field `index` is touched, clear touched and mark changed.
    pub fn clear_if_touched_and_mark_changed(&mut self, index: usize) {
        if self.touched(index) {
            self.set_touched(index, false);
            self.set_changed(index, true);
        }
    }

    /// Clear every bit.
    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    /// Set every bit.
    pub fn fill_all(&mut self) {
        self.words = [u32::MAX; WORDS];
    }

    /// Clear all touched bits.
    pub fn clear_all_touched(&mut self) {
        for word in &mut self.words {
            *word &= !TOUCHED_WORD;
        }
    }

    /// Clear all changed bits.
    pub fn clear_all_changed(&mut self) {
        for word in &mut self.words {
            *word &= !CHANGED_WORD;
        }
    }

    /// Set all touched bits.
    pub fn fill_all_touched(&mut self) {
        for word in &mut self.words {
            *word |= TOUCHED_WORD;
        }
    }

    /// Set all changed bits.
    pub fn fill_all_changed(&mut self) {
        for word in &mut self.words {
            *word |= CHANGED_WORD;
        }
    }

    /// True when no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// True when any touched bit is set.
    #[must_use]
    pub fn any_touched(&self) -> bool {
        self.words.iter().any(|w| w & TOUCHED_WORD != 0)
    }

    /// True when any changed bit is set.
    #[must_use]
    pub fn any_changed(&self) -> bool {
        self.words.iter().any(|w| w & CHANGED_WORD != 0)
    }

    /// True when the bitwise intersection with `other` is non-empty.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Indices of fields with the changed bit set.
    pub fn changed_fields(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_FIELDS).filter(|i| self.changed(*i))
    }
}

impl std::ops::BitAndAssign for FieldMask {
    fn bitand_assign(&mut self, rhs: Self) {
        for (a, b) in self.words.iter_mut().zip(rhs.words.iter()) {
            *a &= b;
        }
    }
}

impl std::ops::BitOrAssign for FieldMask {
    fn bitor_assign(&mut self, rhs: Self) {
        for (a, b) in self.words.iter_mut().zip(rhs.words.iter()) {
            *a |= b;
        }
    }
}

impl std::fmt::Debug for FieldMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for index in 0..MAX_FIELDS {
            match (self.touched(index), self.changed(index)) {
                (true, true) => list.entry(&format_args!("{index}:tc")),
                (true, false) => list.entry(&format_args!("{index}:t")),
                (false, true) => list.entry(&format_args!("{index}:c")),
                (false, false) => continue,
            };
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, RecordType};

    #[test]
    fn touched_and_changed_are_independent() {
        let mut mask = FieldMask::new();
        mask.set_touched(3, true);
        assert!(mask.touched(3));
        assert!(!mask.changed(3));

        mask.set_changed(3, true);
        mask.set_touched(3, false);
        assert!(!mask.touched(3));
        assert!(mask.changed(3));
    }

    #[test]
    fn clear_if_touched_marks_changed() {
        let mut mask = FieldMask::new();
        mask.clear_if_touched_and_mark_changed(2);
        assert!(mask.is_empty());

        mask.set_touched(2, true);
        mask.clear_if_touched_and_mark_changed(2);
        assert!(!mask.touched(2));
        assert!(mask.changed(2));
    }

    #[test]
    fn fill_and_clear_halves() {
        let mut mask = FieldMask::new();
        mask.fill_all_touched();
        assert!(mask.any_touched());
        assert!(!mask.any_changed());

        mask.fill_all_changed();
        mask.clear_all_touched();
        assert!(!mask.any_touched());
        assert!(mask.any_changed());
    }

    #[test]
    fn overlap_and_set_ops() {
        let a = FieldMask::for_fields([1, 2]);
        let b = FieldMask::for_fields([2, 3]);
        let c = FieldMask::for_fields([4]);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));

        let mut and = a;
        and &= b;
        assert!(and.touched(2));
        assert!(!and.touched(1));

        let mut or = a;
        or |= c;
        assert!(or.touched(1));
        assert!(or.touched(4));
    }

    #[test]
    fn all_changes_overlaps_any_change() {
        let all = FieldMask::for_all_changes();
        let mut commit = FieldMask::new();
        commit.set_changed(17, true);
        assert!(all.overlaps(&commit));

        let mut untouched_only = FieldMask::new();
        untouched_only.set_touched(17, true);
        assert!(!all.overlaps(&untouched_only));
    }

    #[test]
    fn persisted_and_user_filters() {
        let ty = RecordType::builder("T")
            .field(Field::bool("a").persisted())
            .field(Field::bool("b").read(AccessLevel::Admin))
            .build()
            .unwrap();

        let persisted = FieldMask::for_persisted(&ty);
        assert!(persisted.touched(0)); // id is persisted
        assert!(persisted.touched(1));
        assert!(!persisted.touched(2));

        let public = FieldMask::for_user(&ty, AccessLevel::Public);
        assert!(public.touched(1));
        assert!(!public.touched(2));
        let admin = FieldMask::for_user(&ty, AccessLevel::Admin);
        assert!(admin.touched(2));
    }
}
