//! Wire-format codecs.
//!
//! Both transports implement [`Codec`], so switching formats is swapping
//! the trait object. The per-field decode bookkeeping (touched/changed
//! maintenance, `always_notify`, null handling) is shared here so the
//! JSON and binary decoders behave identically.

use crate::mask::FieldMask;
use crate::object::Object;
use crate::schema::Field;
use crate::stream::{CodecResult, InputStream, OutputStream};

pub mod binary;
pub mod json;

pub use binary::BinaryCodec;
pub use json::JsonCodec;

/// Supplies per-object field masks to codecs — the access-control hook.
///
/// The *touched* bits of the returned mask gate which fields the codec may
/// emit or accept.
pub trait FieldFilter {
    /// Mask for `object`; `top_level` is true for the outermost object of
    /// the encode/decode call.
    fn mask_for(&self, object: &Object, top_level: bool) -> FieldMask;
}

/// Options for [`Codec::encode_object`].
#[derive(Default)]
pub struct EncodeOptions<'a> {
    /// Read-access filter; fields outside it are silently elided.
    pub filter: Option<&'a dyn FieldFilter>,
    /// One extra `name: value` string pair appended to the outermost
    /// object (JSON only).
    pub extra_field: Option<(&'a str, &'a str)>,
    /// Whether the encoded object is a true root; nested GET targets pass
    /// `false` so root-only filters do not apply.
    pub top_level: bool,
}

impl EncodeOptions<'_> {
    /// Options for encoding a root object with no filter.
    #[must_use]
    pub fn root() -> Self {
        Self {
            top_level: true,
            ..Self::default()
        }
    }
}

/// Handler for unknown JSON fields; returning `true` consumes the field.
pub type UnknownFieldHandler<'a> = &'a mut dyn FnMut(&str, &str) -> bool;

/// Options for [`Codec::decode_object`].
#[derive(Default)]
pub struct DecodeOptions<'a> {
    /// Write-access filter; fields outside it are skipped, leaving the
    /// target unchanged.
    pub filter: Option<&'a dyn FieldFilter>,
    /// Called with `(label, raw string value)` for unknown string-valued
    /// fields (JSON only).
    pub unknown_handler: Option<UnknownFieldHandler<'a>>,
    /// Whether the decoded object is a true root.
    pub top_level: bool,
}

impl<'a> DecodeOptions<'a> {
    /// Options for decoding into a root object with no filter.
    #[must_use]
    pub fn root() -> Self {
        Self {
            top_level: true,
            ..Self::default()
        }
    }
}

/// Result of decoding one field element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOutcome {
    /// The element was an explicit `null`.
    pub nulled: bool,
    /// The stored value actually changed.
    pub changed: bool,
}

/// A wire format: encoder and decoder driven by the object's schema.
pub trait Codec {
    /// Encode a whole object.
    ///
    /// # Errors
    ///
    /// [`crate::stream::CodecError`] on stream failure or schema misuse.
    fn encode_object(
        &self,
        out: &mut OutputStream<'_>,
        object: &Object,
        opts: &EncodeOptions<'_>,
    ) -> CodecResult<()>;

    /// Encode one field value without its tag: the whole array when `at`
    /// is `None`, otherwise a single element.
    ///
    /// # Errors
    ///
    /// [`crate::stream::CodecError`] on stream failure or schema misuse.
    fn encode_value(
        &self,
        out: &mut OutputStream<'_>,
        object: &Object,
        index: usize,
        at: Option<usize>,
    ) -> CodecResult<()>;

    /// Decode a message into `object` with merge semantics: only fields
    /// present in the input are written. Returns whether anything
    /// observably changed.
    ///
    /// # Errors
    ///
    /// [`crate::stream::CodecError`] on malformed input; the error is also
    /// recorded on the stream.
    fn decode_object(
        &self,
        input: &mut InputStream<'_>,
        object: &mut Object,
        opts: &mut DecodeOptions<'_>,
    ) -> CodecResult<bool>;

    /// Decode a whole array field (including mask bookkeeping). Returns
    /// whether the array observably changed.
    ///
    /// # Errors
    ///
    /// [`crate::stream::CodecError`] on malformed input.
    fn decode_array(
        &self,
        input: &mut InputStream<'_>,
        object: &mut Object,
        index: usize,
        opts: &mut DecodeOptions<'_>,
    ) -> CodecResult<bool>;

    /// Decode one element of field `index` (element `at` for arrays)
    /// *without* mask bookkeeping; the caller applies the outcome.
    ///
    /// # Errors
    ///
    /// [`crate::stream::CodecError`] on malformed input.
    fn decode_element(
        &self,
        input: &mut InputStream<'_>,
        object: &mut Object,
        index: usize,
        at: usize,
    ) -> CodecResult<FieldOutcome>;
}

/// Apply the shared per-field decode bookkeeping after an element or
/// array decode: `always_notify` forces the changed flag; a null clears
/// the field (marking changed when it was present); a value marks the
/// field touched and changed on a difference or an absent→present
/// transition. Returns whether anything observably changed.
pub(crate) fn finish_field_decode(
    object: &mut Object,
    field: &Field,
    input: &mut InputStream<'_>,
) -> bool {
    let index = field.index;
    if field.always_notify {
        input.field_changed = true;
    }
    let was_touched = object.is_touched(index);
    let result = if input.field_nulled {
        object.clear_field(index);
        was_touched
    } else {
        object.mark_field_touched(index, true);
        let changed = input.field_changed || !was_touched;
        if changed {
            object.mark_field_changed(index, true);
        }
        changed
    };
    input.reset_field_flags();
    result
}

/// What the encoder should do with one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Emit {
    /// Field is elided.
    Skip,
    /// Field is emitted with its value.
    Value,
    /// Field is emitted as an explicit `null` (JSON only) — it was
    /// cleared and the filter's changed bit asks for clear signalling,
    /// as delta reads do.
    Null,
}

/// Encoder-side eligibility. The filter's *touched* bits gate value
/// emission; its *changed* bits gate null signalling for cleared fields.
/// With no filter, the raw canonical rule applies: touched fields emit
/// values, changed-but-cleared fields emit `null`.
pub(crate) fn field_emit_kind(object: &Object, index: usize, allow: Option<&FieldMask>) -> Emit {
    let touched = object.is_touched(index);
    let changed = object.is_changed(index);
    match allow {
        None => {
            if touched {
                Emit::Value
            } else if changed {
                Emit::Null
            } else {
                Emit::Skip
            }
        }
        Some(mask) => {
            if touched && mask.touched(index) {
                Emit::Value
            } else if !touched && changed && mask.changed(index) {
                Emit::Null
            } else {
                Emit::Skip
            }
        }
    }
}
