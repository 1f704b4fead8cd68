//! Binary transport: protobuf-flavoured varint/length-delimited codec.
//!
//! Each field is `(tag << 3) | wire_type` followed by a varint, a
//! length-delimited region or a fixed-width little-endian value. Signed
//! fields use zigzag varints; floats use fixed32/fixed64. Nested messages
//! are sized with a sizing stream, then length-prefixed, then re-encoded
//! with a byte-count verification. Arrays are not packed; each element
//! carries its own tag. Unknown fields are skipped by wire type and are
//! not surfaced to the unknown-field handler.

use std::sync::Arc;

use prost::encoding::{encode_key, encode_varint, WireType};

use crate::codec::{
    field_emit_kind, finish_field_decode, Codec, DecodeOptions, Emit, EncodeOptions, FieldOutcome,
};
use crate::object::{Object, Slot};
use crate::schema::{Field, FieldType};
use crate::stream::{CodecError, CodecResult, InputStream, OutputStream};
use crate::value::Value;

/// The binary wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

/// Encode `object` with root access and no filter.
///
/// # Errors
///
/// [`CodecError`] on schema misuse.
pub fn to_bytes(object: &Object) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut out = OutputStream::buffer(&mut buffer);
    BinaryCodec.encode_object(&mut out, object, &EncodeOptions::root())?;
    drop(out);
    Ok(buffer)
}

/// Merge-decode `bytes` into `object` with root access.
///
/// # Errors
///
/// [`CodecError`] on malformed input.
pub fn from_bytes(object: &mut Object, bytes: &[u8]) -> CodecResult<bool> {
    let mut input = InputStream::new(bytes);
    BinaryCodec.decode_object(&mut input, object, &mut DecodeOptions::root())
}

fn wire_type_for(field: &Field) -> WireType {
    match field.kind {
        FieldType::Float => {
            if field.width == 4 {
                WireType::ThirtyTwoBit
            } else {
                WireType::SixtyFourBit
            }
        }
        FieldType::String | FieldType::Bytes | FieldType::Object => WireType::LengthDelimited,
        FieldType::Bool
        | FieldType::Signed
        | FieldType::Unsigned
        | FieldType::Enum
        | FieldType::Bitmask
        | FieldType::Null => WireType::Varint,
    }
}

const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[allow(clippy::cast_possible_wrap)]
const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

impl Codec for BinaryCodec {
    fn encode_object(
        &self,
        out: &mut OutputStream<'_>,
        object: &Object,
        opts: &EncodeOptions<'_>,
    ) -> CodecResult<()> {
        encode_object_inner(out, object, opts, 0)
    }

    fn encode_value(
        &self,
        out: &mut OutputStream<'_>,
        object: &Object,
        index: usize,
        at: Option<usize>,
    ) -> CodecResult<()> {
        let field = object
            .record_type()
            .field(index)
            .ok_or_else(|| CodecError::invalid("no such field"))?
            .clone();
        match (object.slot(index), at) {
            (Slot::Scalar(value), _) => encode_plain_value(out, &field, value),
            (Slot::Values(items), Some(at)) => {
                let value = items
                    .get(at)
                    .ok_or_else(|| CodecError::invalid("array index out of range"))?;
                encode_plain_value(out, &field, value)
            }
            (Slot::Values(items), None) => {
                for value in items {
                    encode_tagged_value(out, &field, value)?;
                }
                Ok(())
            }
            (Slot::Object(sub), _) => encode_sized_object(out, sub, &EncodeOptions::default(), 1),
            (Slot::Objects(items), Some(at)) => {
                let element = items
                    .get(at)
                    .ok_or_else(|| CodecError::invalid("array index out of range"))?;
                encode_sized_object(out, element, &EncodeOptions::default(), 1)
            }
            (Slot::Objects(items), None) => {
                for element in items {
                    if !element.has_id() {
                        continue;
                    }
                    write_key(out, &field)?;
                    encode_sized_object(out, element, &EncodeOptions::default(), 1)?;
                }
                Ok(())
            }
        }
    }

    fn decode_object(
        &self,
        input: &mut InputStream<'_>,
        object: &mut Object,
        opts: &mut DecodeOptions<'_>,
    ) -> CodecResult<bool> {
        decode_object_inner(input, object, opts, 0)
    }

    fn decode_array(
        &self,
        input: &mut InputStream<'_>,
        object: &mut Object,
        index: usize,
        opts: &mut DecodeOptions<'_>,
    ) -> CodecResult<bool> {
        let field = object
            .record_type()
            .field(index)
            .ok_or_else(|| CodecError::invalid("no such field"))?
            .clone();
        input.reset_field_flags();
        while input.bytes_left() > 0 {
            let (tag, wire_type) = read_key(input)?;
            if tag != field.tag {
                return input.fail(CodecError::syntax("unexpected tag in array body"));
            }
            decode_array_element(input, object, &field, wire_type, opts)?;
            input.field_changed = true;
        }
        Ok(finish_field_decode(object, &field, input))
    }

    fn decode_element(
        &self,
        input: &mut InputStream<'_>,
        object: &mut Object,
        index: usize,
        at: usize,
    ) -> CodecResult<FieldOutcome> {
        let field = object
            .record_type()
            .field(index)
            .ok_or_else(|| CodecError::invalid("no such field"))?
            .clone();
        if field.is_object() {
            return input.fail(CodecError::invalid("cannot decode an object as an element"));
        }
        let value = decode_scalar_wire(input, &field, wire_type_for(&field))?;
        let changed = if field.is_array() {
            object.store_element_raw(index, at, value)
        } else {
            object.store_scalar_raw(index, value)
        };
        Ok(FieldOutcome {
            nulled: false,
            changed,
        })
    }
}

// ---- encoder ------------------------------------------------------------

fn encode_object_inner(
    out: &mut OutputStream<'_>,
    object: &Object,
    opts: &EncodeOptions<'_>,
    depth: usize,
) -> CodecResult<()> {
    let allow = opts
        .filter
        .map(|f| f.mask_for(object, opts.top_level && depth == 0));

    for field in object.record_type().fields() {
        let index = field.index;
        // The binary wire has no way to express a cleared field, so only
        // value-emitting fields are written.
        if field_emit_kind(object, index, allow.as_ref()) != Emit::Value {
            continue;
        }
        if field.kind == FieldType::Null {
            continue;
        }
        match object.slot(index) {
            Slot::Scalar(value) => encode_tagged_value(out, field, value)?,
            Slot::Values(items) => {
                for value in items {
                    encode_tagged_value(out, field, value)?;
                }
            }
            Slot::Object(sub) => {
                write_key(out, field)?;
                encode_sized_object(out, sub, opts, depth + 1)?;
            }
            Slot::Objects(items) => {
                for element in items {
                    if !element.has_id() {
                        continue;
                    }
                    write_key(out, field)?;
                    encode_sized_object(out, element, opts, depth + 1)?;
                }
            }
        }
    }
    Ok(())
}

fn write_key(out: &mut OutputStream<'_>, field: &Field) -> CodecResult<()> {
    let mut scratch = Vec::new();
    encode_key(field.tag, wire_type_for(field), &mut scratch);
    out.write(&scratch)
}

fn write_varint(out: &mut OutputStream<'_>, value: u64) -> CodecResult<()> {
    let mut scratch = Vec::new();
    encode_varint(value, &mut scratch);
    out.write(&scratch)
}

fn encode_tagged_value(
    out: &mut OutputStream<'_>,
    field: &Field,
    value: &Value,
) -> CodecResult<()> {
    write_key(out, field)?;
    encode_plain_value(out, field, value)
}

#[allow(clippy::cast_possible_truncation)]
fn encode_plain_value(out: &mut OutputStream<'_>, field: &Field, value: &Value) -> CodecResult<()> {
    match field.kind {
        FieldType::Bool | FieldType::Unsigned | FieldType::Enum | FieldType::Bitmask => {
            write_varint(out, value.as_u64().unwrap_or(0))
        }
        FieldType::Signed => write_varint(out, zigzag_encode(value.as_i64().unwrap_or(0))),
        FieldType::Float => {
            let v = value.as_f64().unwrap_or(0.0);
            if field.width == 4 {
                out.write(&(v as f32).to_le_bytes())
            } else {
                out.write(&v.to_le_bytes())
            }
        }
        FieldType::String => {
            let s = value.as_str().unwrap_or_default();
            write_varint(out, s.len() as u64)?;
            out.write_str(s)
        }
        FieldType::Bytes => {
            let b = value.as_bytes().unwrap_or_default();
            write_varint(out, b.len() as u64)?;
            out.write(b)
        }
        FieldType::Null => Ok(()),
        FieldType::Object => Err(CodecError::invalid("object field in scalar position")),
    }
}

/// Encode a nested message: size with a sizing stream, write the length
/// prefix, re-encode for real and verify the byte count.
fn encode_sized_object(
    out: &mut OutputStream<'_>,
    object: &Object,
    opts: &EncodeOptions<'_>,
    depth: usize,
) -> CodecResult<()> {
    let mut sizing = OutputStream::sizing();
    encode_object_inner(&mut sizing, object, opts, depth)?;
    let expected = sizing.bytes_written();

    write_varint(out, expected as u64)?;
    if out.is_sizing() {
        return out.count_only(expected);
    }

    let before = out.bytes_written();
    encode_object_inner(out, object, opts, depth)?;
    let written = out.bytes_written() - before;
    if written != expected {
        return out.fail(CodecError::invalid(format!(
            "submessage expected {expected} bytes but {written} were written"
        )));
    }
    Ok(())
}

// ---- decoder ------------------------------------------------------------

fn read_varint(input: &mut InputStream<'_>) -> CodecResult<u64> {
    let mut buf = input.remaining();
    let before = buf.len();
    match prost::encoding::decode_varint(&mut buf) {
        Ok(value) => {
            let used = before - buf.len();
            input.advance(used);
            Ok(value)
        }
        Err(_) => input.fail(CodecError::syntax("invalid varint")),
    }
}

fn read_key(input: &mut InputStream<'_>) -> CodecResult<(u32, WireType)> {
    let key = read_varint(input)?;
    let tag = u32::try_from(key >> 3)
        .map_err(|_| CodecError::syntax("tag overflow"))?;
    let wire_type = match key & 7 {
        0 => WireType::Varint,
        1 => WireType::SixtyFourBit,
        2 => WireType::LengthDelimited,
        5 => WireType::ThirtyTwoBit,
        _ => return input.fail(CodecError::syntax("invalid wire type")),
    };
    Ok((tag, wire_type))
}

fn read_exact<'a>(input: &mut InputStream<'a>, len: usize) -> CodecResult<&'a [u8]> {
    if input.bytes_left() < len {
        return input.fail(CodecError::UnexpectedEof);
    }
    let bytes = &input.remaining()[..len];
    input.advance(len);
    Ok(bytes)
}

fn skip_field_data(input: &mut InputStream<'_>, wire_type: WireType) -> CodecResult<()> {
    match wire_type {
        WireType::Varint => {
            read_varint(input)?;
        }
        WireType::SixtyFourBit => {
            read_exact(input, 8)?;
        }
        WireType::ThirtyTwoBit => {
            read_exact(input, 4)?;
        }
        WireType::LengthDelimited => {
            let len = usize::try_from(read_varint(input)?)
                .map_err(|_| CodecError::syntax("length overflow"))?;
            read_exact(input, len)?;
        }
        WireType::StartGroup | WireType::EndGroup => {
            return input.fail(CodecError::syntax("invalid wire type"));
        }
    }
    Ok(())
}

fn decode_scalar_wire(
    input: &mut InputStream<'_>,
    field: &Field,
    wire_type: WireType,
) -> CodecResult<Value> {
    let value = match field.kind {
        FieldType::Bool => Value::Bool(read_varint(input)? != 0),
        FieldType::Unsigned | FieldType::Enum | FieldType::Bitmask => {
            Value::Unsigned(read_varint(input)?)
        }
        FieldType::Signed => Value::Signed(zigzag_decode(read_varint(input)?)),
        FieldType::Float => {
            if field.width == 4 {
                let bytes: [u8; 4] = read_exact(input, 4)?
                    .try_into()
                    .map_err(|_| CodecError::invalid("short fixed32 read"))?;
                Value::Float(f64::from(f32::from_le_bytes(bytes)))
            } else {
                let bytes: [u8; 8] = read_exact(input, 8)?
                    .try_into()
                    .map_err(|_| CodecError::invalid("short fixed64 read"))?;
                Value::Float(f64::from_le_bytes(bytes))
            }
        }
        FieldType::String => {
            let len = usize::try_from(read_varint(input)?)
                .map_err(|_| CodecError::syntax("length overflow"))?;
            let bytes = read_exact(input, len)?;
            if len > field.width {
                return input.fail(CodecError::overflow(format!(
                    "string overflow: {}",
                    field.label
                )));
            }
            match std::str::from_utf8(bytes) {
                Ok(s) => Value::String(s.to_owned()),
                Err(_) => {
                    return input.fail(CodecError::syntax(format!(
                        "invalid UTF-8: {}",
                        field.label
                    )));
                }
            }
        }
        FieldType::Bytes => {
            let len = usize::try_from(read_varint(input)?)
                .map_err(|_| CodecError::syntax("length overflow"))?;
            let bytes = read_exact(input, len)?;
            if len > field.width {
                return input.fail(CodecError::overflow(format!(
                    "bytes overflow: {}",
                    field.label
                )));
            }
            Value::Bytes(bytes.to_vec())
        }
        FieldType::Null => {
            skip_field_data(input, wire_type)?;
            Value::Unsigned(0)
        }
        FieldType::Object => {
            return input.fail(CodecError::invalid("object field in scalar position"));
        }
    };
    if !value.fits_width(field.width) {
        return input.fail(CodecError::overflow(format!(
            "integer too large: {}",
            field.label
        )));
    }
    Ok(value)
}

fn decode_array_element(
    input: &mut InputStream<'_>,
    object: &mut Object,
    field: &Field,
    wire_type: WireType,
    opts: &mut DecodeOptions<'_>,
) -> CodecResult<()> {
    if object.raw_count(field.index) >= field.array_capacity {
        return input.fail(CodecError::overflow(format!(
            "array overflow: {}",
            field.label
        )));
    }
    if field.is_object() {
        let len = usize::try_from(read_varint(input)?)
            .map_err(|_| CodecError::syntax("length overflow"))?;
        let mut sub = input.sub_stream(len)?;
        let subtype = Arc::clone(field.subtype.as_ref().expect("object field has subtype"));
        let mut element = Object::new(&subtype);
        decode_object_inner(&mut sub, &mut element, opts, 1)?;
        input.absorb(&sub);
        if !element.has_id() {
            element.assign_id(crate::id::generate_id());
        }
        object.append_object_raw(field.index, element);
    } else {
        let value = decode_scalar_wire(input, field, wire_type)?;
        object.append_value_raw(field.index, value);
    }
    Ok(())
}

fn decode_object_inner(
    input: &mut InputStream<'_>,
    object: &mut Object,
    opts: &mut DecodeOptions<'_>,
    depth: usize,
) -> CodecResult<bool> {
    let allow = opts
        .filter
        .map(|f| f.mask_for(object, opts.top_level && depth == 0));

    let mut any_changed = false;
    while input.bytes_left() > 0 {
        let (tag, wire_type) = read_key(input)?;
        if tag == 0 {
            break; // 0-terminated message
        }

        let field = object.record_type().find_by_tag(tag).cloned();
        let Some(field) = field else {
            skip_field_data(input, wire_type)?;
            continue;
        };
        if allow.as_ref().is_some_and(|m| !m.touched(field.index)) {
            skip_field_data(input, wire_type)?;
            continue;
        }

        input.reset_field_flags();
        if field.is_array() {
            decode_array_element(input, object, &field, wire_type, opts)?;
            input.field_changed = true;
        } else if field.is_object() {
            let len = usize::try_from(read_varint(input)?)
                .map_err(|_| CodecError::syntax("length overflow"))?;
            let mut sub = input.sub_stream(len)?;
            let nested = object
                .nested_slot_mut(field.index)
                .ok_or_else(|| CodecError::invalid("object slot mismatch"))?;
            let changed = decode_object_inner(&mut sub, nested, opts, depth + 1)?;
            input.absorb(&sub);
            input.field_changed |= changed;
        } else {
            let value = decode_scalar_wire(input, &field, wire_type)?;
            input.field_changed |= object.store_scalar_raw(field.index, value);
        }
        any_changed |= finish_field_decode(object, &field, input);
    }
    Ok(any_changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumMap, RecordType};
    use pretty_assertions::assert_eq;

    fn sub_type() -> Arc<RecordType> {
        RecordType::builder("Inner")
            .field(Field::string("name", 16))
            .field(Field::signed("score", 4))
            .build()
            .unwrap()
    }

    fn test_type() -> Arc<RecordType> {
        let map = EnumMap::new([("OFF", 0, ""), ("ON", 1, "")]);
        RecordType::builder("Outer")
            .field(Field::signed("delta", 4))
            .field(Field::unsigned("count", 4))
            .field(Field::bool("flag"))
            .field(Field::float("ratio", 8))
            .field(Field::float("ratio32", 4))
            .field(Field::string("label", 16))
            .field(Field::bytes("blob", 8))
            .field(Field::enumeration("mode", 1, map))
            .field(Field::signed("values", 2).repeated(8))
            .field(Field::object("inner", sub_type()))
            .field(Field::object("items", sub_type()).repeated(4))
            .build()
            .unwrap()
    }

    fn populated() -> Object {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.assign_id(31);
        obj.set(1, -42i64).unwrap();
        obj.set(2, 42u64).unwrap();
        obj.set(3, true).unwrap();
        obj.set(4, 2.5f64).unwrap();
        obj.set(5, 0.5f64).unwrap();
        obj.set_string(6, "hello").unwrap();
        obj.set_bytes(7, &[0, 255, 3]).unwrap();
        obj.set(8, 1u64).unwrap();
        for v in [-1i64, 0, 257] {
            obj.push_element(9, v).unwrap();
        }
        {
            let inner = obj.nested_mut(10).unwrap();
            inner.set_string(1, "deep").unwrap();
            inner.set(2, 7i64).unwrap();
        }
        obj.add_object_element(11, Some(5))
            .unwrap()
            .set_string(1, "first")
            .unwrap();
        obj
    }

    #[test]
    fn binary_round_trip() {
        let obj = populated();
        let bytes = to_bytes(&obj).unwrap();
        let mut round = Object::new(&test_type());
        from_bytes(&mut round, &bytes).unwrap();
        assert!(round == obj, "round trip mismatch");
    }

    #[test]
    fn zigzag_codes_small_negatives_compactly() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_decode(zigzag_encode(-1234)), -1234);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        // Encode with the full type, decode with a narrower one whose tags
        // only partially overlap.
        let obj = populated();
        let bytes = to_bytes(&obj).unwrap();

        let narrow = RecordType::builder("Narrow")
            .field(Field::signed("delta", 4).tag(2))
            .build()
            .unwrap();
        let mut decoded = Object::new(&narrow);
        from_bytes(&mut decoded, &bytes).unwrap();
        assert_eq!(decoded.i64_value(1), Some(-42));
        assert_eq!(decoded.id(), 31);
    }

    #[test]
    fn untouched_fields_are_not_emitted() {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.set(3, false).unwrap();
        obj.clear_field(3); // changed but cleared: binary emits nothing
        let bytes = to_bytes(&obj).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn floats_use_fixed_width() {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.set(4, 1.5f64).unwrap();
        let bytes = to_bytes(&obj).unwrap();
        // key (1 byte) + 8-byte little-endian double
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[1..], 1.5f64.to_le_bytes());

        let mut obj32 = Object::new(&ty);
        obj32.set(5, 1.5f64).unwrap();
        let bytes = to_bytes(&obj32).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(&bytes[1..], 1.5f32.to_le_bytes());
    }

    #[test]
    fn nested_message_is_length_prefixed() {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.nested_mut(10).unwrap().set(2, 3i64).unwrap();
        let bytes = to_bytes(&obj).unwrap();

        // key for field `inner`, then the length of the nested body.
        let mut input = InputStream::new(&bytes);
        let (tag, wire_type) = read_key(&mut input).unwrap();
        assert_eq!(tag, 11);
        assert_eq!(wire_type, WireType::LengthDelimited);
        let len = read_varint(&mut input).unwrap();
        assert_eq!(len as usize, input.bytes_left());
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        let obj = populated();
        let bytes = to_bytes(&obj).unwrap();
        let mut round = Object::new(&test_type());
        let err = from_bytes(&mut round, &bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedEof | CodecError::Syntax(_)
        ));
    }

    #[test]
    fn string_capacity_enforced_on_decode() {
        let wide = RecordType::builder("Wide")
            .field(Field::string("label", 64).tag(7))
            .build()
            .unwrap();
        let narrow = RecordType::builder("NarrowStr")
            .field(Field::string("label", 4).tag(7))
            .build()
            .unwrap();

        let mut obj = Object::new(&wide);
        obj.set_string(1, "much too long").unwrap();
        let bytes = to_bytes(&obj).unwrap();

        let mut decoded = Object::new(&narrow);
        let err = from_bytes(&mut decoded, &bytes).unwrap_err();
        assert_eq!(err, CodecError::Overflow("string overflow: label".into()));
    }

    #[test]
    fn integer_width_enforced_on_decode() {
        let wide = RecordType::builder("WideInt")
            .field(Field::unsigned("n", 8).tag(3))
            .build()
            .unwrap();
        let narrow = RecordType::builder("NarrowInt")
            .field(Field::unsigned("n", 1).tag(3))
            .build()
            .unwrap();

        let mut obj = Object::new(&wide);
        obj.set(1, 300u64).unwrap();
        let bytes = to_bytes(&obj).unwrap();

        let mut decoded = Object::new(&narrow);
        let err = from_bytes(&mut decoded, &bytes).unwrap_err();
        assert_eq!(err, CodecError::Overflow("integer too large: n".into()));
    }

    #[test]
    fn elements_without_id_are_skipped_on_encode() {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.add_object_element(11, Some(1)).unwrap();
        // Forcing an element to lose its id makes it invisible.
        obj.object_element_at_mut(11, 0).unwrap().clear_field(0);
        obj.add_object_element(11, Some(2)).unwrap();

        let bytes = to_bytes(&obj).unwrap();
        let mut round = Object::new(&ty);
        from_bytes(&mut round, &bytes).unwrap();
        assert_eq!(round.object_elements(11).len(), 1);
        assert_eq!(round.object_elements(11)[0].id(), 2);
    }

    #[test]
    fn sizing_stream_matches_real_encode() {
        let obj = populated();
        let mut sizing = OutputStream::sizing();
        BinaryCodec
            .encode_object(&mut sizing, &obj, &EncodeOptions::root())
            .unwrap();
        let bytes = to_bytes(&obj).unwrap();
        assert_eq!(sizing.bytes_written(), bytes.len());
    }

    #[test]
    fn decode_tracks_changes() {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.set(2, 42u64).unwrap();
        obj.clear_change_markers();

        let mut same = Object::new(&ty);
        same.set(2, 42u64).unwrap();
        let bytes = to_bytes(&same).unwrap();
        let changed = from_bytes(&mut obj, &bytes).unwrap();
        assert!(!changed);
        assert!(!obj.is_changed(2));

        let mut different = Object::new(&ty);
        different.set(2, 43u64).unwrap();
        let bytes = to_bytes(&different).unwrap();
        assert!(from_bytes(&mut obj, &bytes).unwrap());
        assert!(obj.is_changed(2));
    }
}
