//! JSON transport: canonical encoder and tolerant pull decoder.
//!
//! Encoding is canonical: fields in descriptor order, touched fields as
//! values, changed-but-cleared fields as `null`, strings with the seven
//! JSON escapes, bytes as padded base64, enums by name, bitmasks as
//! arrays of set-bit names.
//!
//! Decoding is tolerant: leading whitespace, dotted labels matching
//! underscores, optional quotes around scalar bodies for single-field
//! targets, and an unknown-field handler. Integer parsing detects
//! overflow against the field's byte width.

use std::sync::Arc;

use crate::codec::{
    field_emit_kind, finish_field_decode, Codec, DecodeOptions, Emit, EncodeOptions, FieldOutcome,
};
use crate::object::{Object, Slot};
use crate::schema::{Field, FieldType};
use crate::stream::{CodecError, CodecResult, InputStream, OutputStream};
use crate::value::Value;

const MAX_FIELD_NAME: usize = 128;
const MAX_UNKNOWN_VALUE: usize = 256;

/// The JSON wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

/// Encode `object` as canonical JSON with root access and no filter.
///
/// # Errors
///
/// [`CodecError`] on schema misuse.
pub fn to_json(object: &Object) -> CodecResult<String> {
    let mut buffer = Vec::new();
    let mut out = OutputStream::buffer(&mut buffer);
    JsonCodec.encode_object(&mut out, object, &EncodeOptions::root())?;
    drop(out);
    String::from_utf8(buffer).map_err(|_| CodecError::invalid("encoder produced invalid UTF-8"))
}

/// Merge-decode `json` into `object` with root access. Returns whether
/// anything changed.
///
/// # Errors
///
/// [`CodecError`] on malformed input.
pub fn from_json(object: &mut Object, json: &str) -> CodecResult<bool> {
    let mut input = InputStream::new(json.as_bytes());
    JsonCodec.decode_object(&mut input, object, &mut DecodeOptions::root())
}

impl Codec for JsonCodec {
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
            (Slot::Scalar(value), _) => encode_scalar(out, &field, value),
            (Slot::Object(sub), _) => {
                encode_object_inner(out, sub, &EncodeOptions::default(), 1)
            }
            (Slot::Values(items), None) => {
                out.write_byte(b'[')?;
                for (n, value) in items.iter().enumerate() {
                    if n > 0 {
                        out.write_byte(b',')?;
                    }
                    encode_scalar(out, &field, value)?;
                }
                out.write_byte(b']')
            }
            (Slot::Values(items), Some(at)) => {
                let value = items
                    .get(at)
                    .ok_or_else(|| CodecError::invalid("array index out of range"))?;
                encode_scalar(out, &field, value)
            }
            (Slot::Objects(items), None) => {
                out.write_byte(b'[')?;
                let mut emitted = 0;
                for element in items {
                    if !element.has_id() {
                        continue;
                    }
                    if emitted > 0 {
                        out.write_byte(b',')?;
                    }
                    emitted += 1;
                    encode_object_inner(out, element, &EncodeOptions::default(), 1)?;
                }
                out.write_byte(b']')
            }
            (Slot::Objects(items), Some(at)) => {
                let element = items
                    .get(at)
                    .ok_or_else(|| CodecError::invalid("array index out of range"))?;
                encode_object_inner(out, element, &EncodeOptions::default(), 1)
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
        decode_array_body(input, object, &field, opts, 1)?;
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
        let current_mask = object.u64_value(index);
        match decode_scalar_value(input, &field, current_mask, true)? {
            None => Ok(FieldOutcome {
                nulled: true,
                changed: false,
            }),
            Some(value) => {
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

    out.write_byte(b'{')?;
    let mut emitted = 0;
    for field in object.record_type().fields() {
        let index = field.index;
        let emit = field_emit_kind(object, index, allow.as_ref());
        if emit == Emit::Skip {
            continue;
        }
        if emitted > 0 {
            out.write_byte(b',')?;
        }
        emitted += 1;
        write_tag(out, &field.label)?;
        if emit == Emit::Value {
            encode_field_value(out, object, field, opts, depth)?;
        } else {
            out.write_str("null")?;
        }
    }
    if depth == 0 {
        if let Some((name, value)) = opts.extra_field {
            if emitted > 0 {
                out.write_byte(b',')?;
            }
            write_tag(out, name)?;
            write_json_string(out, value)?;
        }
    }
    out.write_byte(b'}')
}

fn encode_field_value(
    out: &mut OutputStream<'_>,
    object: &Object,
    field: &Field,
    opts: &EncodeOptions<'_>,
    depth: usize,
) -> CodecResult<()> {
    match object.slot(field.index) {
        Slot::Scalar(value) => encode_scalar(out, field, value),
        Slot::Object(sub) => encode_object_inner(out, sub, opts, depth + 1),
        Slot::Values(items) => {
            out.write_byte(b'[')?;
            for (n, value) in items.iter().enumerate() {
                if n > 0 {
                    out.write_byte(b',')?;
                }
                encode_scalar(out, field, value)?;
            }
            out.write_byte(b']')
        }
        Slot::Objects(items) => {
            out.write_byte(b'[')?;
            let mut emitted = 0;
            for element in items {
                // Elements without an assigned id are invisible on the wire.
                if !element.has_id() {
                    continue;
                }
                if emitted > 0 {
                    out.write_byte(b',')?;
                }
                emitted += 1;
                encode_object_inner(out, element, opts, depth + 1)?;
            }
            out.write_byte(b']')
        }
    }
}

fn encode_scalar(out: &mut OutputStream<'_>, field: &Field, value: &Value) -> CodecResult<()> {
    match field.kind {
        FieldType::Bool => out.write_str(if value.as_u64() == Some(1) {
            "true"
        } else {
            "false"
        }),
        FieldType::Signed => out.write_str(&value.as_i64().unwrap_or(0).to_string()),
        FieldType::Unsigned => out.write_str(&value.as_u64().unwrap_or(0).to_string()),
        FieldType::Float => out.write_str(&format_float(value.as_f64().unwrap_or(0.0), field.width)),
        FieldType::Enum => {
            let raw = value.as_u64().unwrap_or(0);
            match field.enum_map.as_ref().and_then(|m| m.name_for(raw)) {
                Some(name) => write_json_string(out, name),
                None => out.write_str(&raw.to_string()),
            }
        }
        FieldType::Bitmask => {
            let raw = value.as_u64().unwrap_or(0);
            out.write_byte(b'[')?;
            let mut emitted = 0;
            if let Some(map) = &field.enum_map {
                for entry in map.entries() {
                    if entry.value < 64 && raw & (1 << entry.value) != 0 {
                        if emitted > 0 {
                            out.write_byte(b',')?;
                        }
                        emitted += 1;
                        write_json_string(out, &entry.name)?;
                    }
                }
            }
            out.write_byte(b']')
        }
        FieldType::String => match value.as_str() {
            Some(s) => write_json_string(out, s),
            None => out.write_str("null"),
        },
        FieldType::Bytes => {
            out.write_byte(b'"')?;
            out.write_base64(value.as_bytes().unwrap_or_default())?;
            out.write_byte(b'"')
        }
        FieldType::Null => out.write_str("null"),
        FieldType::Object => Err(CodecError::invalid("object field in scalar position")),
    }
}

fn write_tag(out: &mut OutputStream<'_>, label: &str) -> CodecResult<()> {
    write_json_string(out, label)?;
    out.write_byte(b':')
}

fn write_json_string(out: &mut OutputStream<'_>, text: &str) -> CodecResult<()> {
    out.write_byte(b'"')?;
    for byte in text.bytes() {
        match byte {
            b'"' => out.write_str("\\\"")?,
            b'\\' => out.write_str("\\\\")?,
            b'\n' => out.write_str("\\n")?,
            b'\r' => out.write_str("\\r")?,
            b'\t' => out.write_str("\\t")?,
            0x08 => out.write_str("\\b")?,
            0x0C => out.write_str("\\f")?,
            _ => out.write_byte(byte)?,
        }
    }
    out.write_byte(b'"')
}

#[allow(clippy::cast_possible_truncation)]
fn format_float(value: f64, width: usize) -> String {
    if width == 4 {
        let v = value as f32;
        if v != 0.0 && v.fract() == 0.0 && v.abs() < 1.0e9 {
            return format!("{v:.0}");
        }
        return format!("{v}");
    }
    if value != 0.0 && (value.abs() < 1.0e-6 || value.abs() >= 1.0e9) {
        format!("{value:e}")
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

// ---- scanner ------------------------------------------------------------

fn is_ws(byte: u8) -> bool {
    byte <= b' '
}

fn skip_ws(input: &mut InputStream<'_>) {
    while input.peek().is_some_and(is_ws) {
        input.bump();
    }
}

fn peek_non_ws(input: &mut InputStream<'_>) -> Option<u8> {
    skip_ws(input);
    input.peek()
}

fn expect(input: &mut InputStream<'_>, byte: u8) -> CodecResult<()> {
    match peek_non_ws(input) {
        Some(found) if found == byte => {
            input.bump();
            Ok(())
        }
        Some(found) => input.fail(CodecError::syntax(format!(
            "expected '{}', found '{}'",
            byte as char, found as char
        ))),
        None => input.fail(CodecError::UnexpectedEof),
    }
}

fn parse_quoted_string(
    input: &mut InputStream<'_>,
    max_len: usize,
    label: &str,
) -> CodecResult<String> {
    expect(input, b'"')?;
    let mut buffer = Vec::new();
    loop {
        match input.bump() {
            None => return input.fail(CodecError::UnexpectedEof),
            Some(b'"') => break,
            Some(b'\\') => {
                let escaped = match input.bump() {
                    Some(b'"') => b'"',
                    Some(b'\\') => b'\\',
                    Some(b'/') => b'/',
                    Some(b'n') => b'\n',
                    Some(b'r') => b'\r',
                    Some(b't') => b'\t',
                    Some(b'b') => 0x08,
                    Some(b'f') => 0x0C,
                    Some(other) => {
                        return input.fail(CodecError::syntax(format!(
                            "invalid escape '\\{}'",
                            other as char
                        )));
                    }
                    None => return input.fail(CodecError::UnexpectedEof),
                };
                buffer.push(escaped);
            }
            Some(byte) => buffer.push(byte),
        }
        if buffer.len() > max_len {
            return input.fail(CodecError::overflow(format!(
                "string overflow: {label}[{max_len}]"
            )));
        }
    }
    String::from_utf8(buffer).map_or_else(
        |_| input.fail(CodecError::syntax("invalid UTF-8 in string")),
        Ok,
    )
}

fn is_atom_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'+' | b'.')
}

fn parse_atom(input: &mut InputStream<'_>) -> String {
    let mut atom = String::new();
    while let Some(byte) = input.peek() {
        if !is_atom_byte(byte) {
            break;
        }
        atom.push(byte as char);
        input.bump();
    }
    atom
}

#[derive(Debug, Clone, Copy)]
enum Num {
    U(u64),
    I(i64),
    F(f64),
}

fn parse_number(input: &mut InputStream<'_>, label: &str) -> CodecResult<Num> {
    skip_ws(input);
    let mut text = String::new();
    while let Some(byte) = input.peek() {
        if byte.is_ascii_digit() || matches!(byte, b'-' | b'+' | b'.' | b'e' | b'E') {
            text.push(byte as char);
            input.bump();
        } else {
            break;
        }
    }
    if text.is_empty() {
        return input.fail(CodecError::syntax("expected numeric value"));
    }
    if text.contains(['.', 'e', 'E']) {
        match text.parse::<f64>() {
            Ok(v) => Ok(Num::F(v)),
            Err(_) => input.fail(CodecError::syntax("expected numeric value")),
        }
    } else if text.starts_with('-') {
        match text.parse::<i64>() {
            Ok(v) => Ok(Num::I(v)),
            Err(_) => input.fail(CodecError::overflow(format!("integer too large: {label}"))),
        }
    } else {
        match text.parse::<u64>() {
            Ok(v) => Ok(Num::U(v)),
            Err(_) => input.fail(CodecError::overflow(format!("integer too large: {label}"))),
        }
    }
}

/// Parse one of the bare literals `null`, `true` or `false`. Returns
/// `None` for null.
fn parse_bool_or_null(input: &mut InputStream<'_>, error: &str) -> CodecResult<Option<bool>> {
    skip_ws(input);
    match parse_atom(input).as_str() {
        "null" => Ok(None),
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        _ => input.fail(CodecError::syntax(error)),
    }
}

fn skip_string(input: &mut InputStream<'_>) -> CodecResult<()> {
    expect(input, b'"')?;
    loop {
        match input.bump() {
            None => return input.fail(CodecError::UnexpectedEof),
            Some(b'"') => return Ok(()),
            Some(b'\\') => {
                input.bump();
            }
            Some(_) => {}
        }
    }
}

fn skip_value(input: &mut InputStream<'_>) -> CodecResult<()> {
    match peek_non_ws(input) {
        None => input.fail(CodecError::UnexpectedEof),
        Some(b'"') => skip_string(input),
        Some(b'{' | b'[') => {
            let mut depth = 0usize;
            loop {
                match input.peek() {
                    None => return input.fail(CodecError::UnexpectedEof),
                    Some(b'{' | b'[') => {
                        depth += 1;
                        input.bump();
                    }
                    Some(b'}' | b']') => {
                        input.bump();
                        depth -= 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                    Some(b'"') => skip_string(input)?,
                    Some(_) => {
                        input.bump();
                    }
                }
            }
        }
        Some(_) => {
            while let Some(byte) = input.peek() {
                if matches!(byte, b',' | b'}' | b']') {
                    break;
                }
                input.bump();
            }
            Ok(())
        }
    }
}

// ---- decoder ------------------------------------------------------------

fn decode_object_inner(
    input: &mut InputStream<'_>,
    object: &mut Object,
    opts: &mut DecodeOptions<'_>,
    depth: usize,
) -> CodecResult<bool> {
    expect(input, b'{')?;
    let allow = opts
        .filter
        .map(|f| f.mask_for(object, opts.top_level && depth == 0));

    let mut any_changed = false;
    let mut first = true;
    loop {
        match peek_non_ws(input) {
            None => return input.fail(CodecError::UnexpectedEof),
            Some(b'}') => {
                input.bump();
                break;
            }
            Some(b',') if !first => {
                input.bump();
                skip_ws(input);
            }
            Some(_) if first => {}
            Some(found) => {
                return input.fail(CodecError::syntax(format!(
                    "expected ',' or '}}', found '{}'",
                    found as char
                )));
            }
        }
        first = false;

        let name = parse_quoted_string(input, MAX_FIELD_NAME, "tag")?;
        expect(input, b':')?;
        skip_ws(input);

        let field = object.record_type().find_by_label(&name).cloned();
        match field {
            None => {
                // Unknown field: offer quoted values to the handler, then
                // skip whatever remains.
                if input.peek() == Some(b'"') {
                    if let Some(handler) = opts.unknown_handler.as_deref_mut() {
                        let value = parse_quoted_string(input, MAX_UNKNOWN_VALUE, &name)?;
                        let _consumed = handler(&name, &value);
                        continue;
                    }
                }
                skip_value(input)?;
            }
            Some(field) if allow.as_ref().is_some_and(|m| !m.touched(field.index)) => {
                skip_value(input)?;
            }
            Some(field) => {
                input.reset_field_flags();
                any_changed |= decode_field_body(input, object, &field, opts, depth)?;
            }
        }
    }
    Ok(any_changed)
}

fn decode_field_body(
    input: &mut InputStream<'_>,
    object: &mut Object,
    field: &Field,
    opts: &mut DecodeOptions<'_>,
    depth: usize,
) -> CodecResult<bool> {
    if field.is_array() {
        decode_array_body(input, object, field, opts, depth + 1)?;
    } else if field.is_object() {
        if input.peek() == Some(b'n') {
            let atom = parse_atom(input);
            if atom != "null" {
                return input.fail(CodecError::syntax("expected object or null"));
            }
            input.field_nulled = true;
        } else {
            let sub = object
                .nested_slot_mut(field.index)
                .ok_or_else(|| CodecError::invalid("object slot mismatch"))?;
            let changed = decode_object_inner(input, sub, opts, depth + 1)?;
            input.field_changed |= changed;
        }
    } else {
        let current = object.u64_value(field.index);
        match decode_scalar_value(input, field, current, false)? {
            None => input.field_nulled = true,
            Some(value) => {
                input.field_changed |= object.store_scalar_raw(field.index, value);
            }
        }
    }
    Ok(finish_field_decode(object, field, input))
}

fn decode_array_body(
    input: &mut InputStream<'_>,
    object: &mut Object,
    field: &Field,
    opts: &mut DecodeOptions<'_>,
    depth: usize,
) -> CodecResult<()> {
    expect(input, b'[')?;
    if field.is_object() {
        let subtype = Arc::clone(field.subtype.as_ref().expect("object field has subtype"));
        let mut items: Vec<Object> = Vec::new();
        decode_array_elements(input, field, |input| {
            let mut element = Object::new(&subtype);
            decode_object_inner(input, &mut element, opts, depth + 1)?;
            if !element.has_id() {
                element.assign_id(crate::id::generate_id());
            }
            items.push(element);
            Ok(items.len())
        })?;
        input.field_changed |= object.replace_objects_raw(field.index, items);
    } else {
        let mut items: Vec<Value> = Vec::new();
        decode_array_elements(input, field, |input| {
            if let Some(value) = decode_scalar_value(input, field, None, false)? {
                items.push(value);
            }
            Ok(items.len())
        })?;
        input.field_changed |= object.replace_values_raw(field.index, items);
    }
    Ok(())
}

/// Drive `decode_one` for each element between `[` and `]`; the closure
/// reports the running element count for the capacity check. A nulled
/// element does not count.
fn decode_array_elements(
    input: &mut InputStream<'_>,
    field: &Field,
    mut decode_one: impl FnMut(&mut InputStream<'_>) -> CodecResult<usize>,
) -> CodecResult<()> {
    let mut first = true;
    loop {
        match peek_non_ws(input) {
            None => return input.fail(CodecError::UnexpectedEof),
            Some(b']') => {
                input.bump();
                return Ok(());
            }
            Some(b',') if !first => {
                input.bump();
                skip_ws(input);
            }
            Some(_) if first => {}
            Some(found) => {
                return input.fail(CodecError::syntax(format!(
                    "expected ',' or ']', found '{}'",
                    found as char
                )));
            }
        }
        first = false;
        let count = decode_one(input)?;
        if count > field.array_capacity {
            return input.fail(CodecError::overflow(format!(
                "array overflow: {}",
                field.label
            )));
        }
    }
}

/// Decode one scalar JSON value for `field`. Returns `None` for an
/// explicit `null`. `current` carries the present bitmask value so the
/// object-of-booleans form merges instead of replacing. `relaxed` allows
/// unquoted strings/enums (single-value REST bodies).
fn decode_scalar_value(
    input: &mut InputStream<'_>,
    field: &Field,
    current: Option<u64>,
    relaxed: bool,
) -> CodecResult<Option<Value>> {
    skip_ws(input);
    let Some(first) = input.peek() else {
        return input.fail(CodecError::UnexpectedEof);
    };

    match field.kind {
        FieldType::Bool => {
            if first == b'"' {
                input.bump();
                let value = parse_bool_or_null(input, "Expected true, false or null")?;
                expect(input, b'"')?;
                Ok(value.map(Value::Bool))
            } else {
                Ok(parse_bool_or_null(input, "Expected true, false or null")?.map(Value::Bool))
            }
        }
        FieldType::Signed | FieldType::Unsigned | FieldType::Float => {
            if first == b'"' {
                input.bump();
                let value = decode_number_value(input, field)?;
                expect(input, b'"')?;
                Ok(value)
            } else if first == b'n' {
                match parse_atom(input).as_str() {
                    "null" => Ok(None),
                    _ => input.fail(CodecError::syntax("Expected valid number or null")),
                }
            } else {
                decode_number_value(input, field)
            }
        }
        FieldType::Enum => decode_enum_value(input, field, relaxed),
        FieldType::Bitmask => decode_bitmask_value(input, field, current),
        FieldType::String => decode_string_value(input, field, relaxed),
        FieldType::Bytes => decode_bytes_value(input, field),
        FieldType::Null => match parse_atom(input).as_str() {
            "null" => Ok(None),
            _ => input.fail(CodecError::syntax("expected null")),
        },
        FieldType::Object => input.fail(CodecError::invalid("object field in scalar position")),
    }
}

fn decode_number_value(
    input: &mut InputStream<'_>,
    field: &Field,
) -> CodecResult<Option<Value>> {
    let number = parse_number(input, &field.label)?;
    let value = match field.kind {
        FieldType::Float => match number {
            Num::U(v) => {
                #[allow(clippy::cast_precision_loss)]
                Value::Float(v as f64)
            }
            Num::I(v) => {
                #[allow(clippy::cast_precision_loss)]
                Value::Float(v as f64)
            }
            Num::F(v) => Value::Float(v),
        },
        FieldType::Signed => match number {
            Num::U(v) => match i64::try_from(v) {
                Ok(v) => Value::Signed(v),
                Err(_) => {
                    return input.fail(CodecError::overflow(format!(
                        "integer too large: {}",
                        field.label
                    )));
                }
            },
            Num::I(v) => Value::Signed(v),
            Num::F(_) => {
                return input.fail(CodecError::syntax("expected numeric value"));
            }
        },
        _ => match number {
            Num::U(v) => Value::Unsigned(v),
            Num::I(_) | Num::F(_) => {
                return input.fail(CodecError::syntax("expected unsigned numeric value"));
            }
        },
    };
    if !value.fits_width(field.width) {
        return input.fail(CodecError::overflow(format!(
            "integer too large: {}",
            field.label
        )));
    }
    if field.kind.is_numeric() {
        if let Some(n) = value.as_f64() {
            if field.min.is_some_and(|min| n < min) || field.max.is_some_and(|max| n > max) {
                return input.fail(CodecError::overflow(format!(
                    "value out of range: {}",
                    field.label
                )));
            }
        }
    }
    Ok(Some(value))
}

fn decode_enum_value(
    input: &mut InputStream<'_>,
    field: &Field,
    relaxed: bool,
) -> CodecResult<Option<Value>> {
    let map = field
        .enum_map
        .clone()
        .ok_or_else(|| CodecError::invalid("enum field has no enum map"))?;
    let first = input.peek().unwrap_or(b'\0');

    if first.is_ascii_digit() {
        let Num::U(raw) = parse_number(input, &field.label)? else {
            return input.fail(CodecError::syntax("expected unsigned numeric value"));
        };
        if !map.contains(raw) {
            return input.fail(CodecError::syntax(format!(
                "'{raw}' not a value in this enum"
            )));
        }
        let value = Value::Unsigned(raw);
        if !value.fits_width(field.width) {
            return input.fail(CodecError::overflow(format!(
                "integer too large: {}",
                field.label
            )));
        }
        return Ok(Some(value));
    }

    let name = if first == b'"' {
        parse_quoted_string(input, MAX_FIELD_NAME, &field.label)?
    } else if relaxed || first == b'n' {
        parse_atom(input)
    } else {
        return input.fail(CodecError::syntax("Expected enum value or null"));
    };
    if name == "null" {
        return Ok(None);
    }
    match map.value_for(&name) {
        Some(value) => Ok(Some(Value::Unsigned(value))),
        None => input.fail(CodecError::syntax(format!("'{name}' not in this enum"))),
    }
}

fn decode_bitmask_value(
    input: &mut InputStream<'_>,
    field: &Field,
    current: Option<u64>,
) -> CodecResult<Option<Value>> {
    let map = field
        .enum_map
        .clone()
        .ok_or_else(|| CodecError::invalid("bitmask field has no enum map"))?;
    match peek_non_ws(input) {
        Some(b'{') => {
            input.bump();
            let mut mask = current.unwrap_or(0);
            let mut first = true;
            loop {
                match peek_non_ws(input) {
                    None => return input.fail(CodecError::UnexpectedEof),
                    Some(b'}') => {
                        input.bump();
                        break;
                    }
                    Some(b',') if !first => {
                        input.bump();
                        skip_ws(input);
                    }
                    Some(_) if first => {}
                    Some(_) => {
                        return input.fail(CodecError::syntax("expected ',' or '}'"));
                    }
                }
                first = false;
                let bit_name = parse_quoted_string(input, MAX_FIELD_NAME, "bitfield_name")?;
                expect(input, b':')?;
                let Some(on) = parse_bool_or_null(input, "Expected true, false or null")? else {
                    return input.fail(CodecError::syntax("Expected true or false"));
                };
                // Unknown bit names are tolerated and ignored.
                if let Some(bit) = map.value_for(&bit_name) {
                    if bit < 64 {
                        if on {
                            mask |= 1 << bit;
                        } else {
                            mask &= !(1 << bit);
                        }
                    }
                }
            }
            let value = Value::Unsigned(mask);
            if !value.fits_width(field.width) {
                return input.fail(CodecError::overflow(format!(
                    "integer too large: {}",
                    field.label
                )));
            }
            Ok(Some(value))
        }
        Some(b'n') => match parse_atom(input).as_str() {
            "null" => Ok(None),
            _ => input.fail(CodecError::syntax("Expected bitmask value or null")),
        },
        Some(first) if first.is_ascii_digit() => {
            let Num::U(raw) = parse_number(input, &field.label)? else {
                return input.fail(CodecError::syntax("expected unsigned numeric value"));
            };
            let value = Value::Unsigned(raw);
            if !value.fits_width(field.width) {
                return input.fail(CodecError::overflow(format!(
                    "integer too large: {}",
                    field.label
                )));
            }
            Ok(Some(value))
        }
        Some(_) => input.fail(CodecError::syntax("Expected bitmask value or null")),
        None => input.fail(CodecError::UnexpectedEof),
    }
}

fn decode_string_value(
    input: &mut InputStream<'_>,
    field: &Field,
    relaxed: bool,
) -> CodecResult<Option<Value>> {
    match input.peek() {
        Some(b'"') => {
            let value = parse_quoted_string(input, field.width, &field.label)?;
            Ok(Some(Value::String(value)))
        }
        Some(b'n') if !relaxed => match parse_atom(input).as_str() {
            "null" => Ok(None),
            _ => input.fail(CodecError::syntax("Expected 'null' or a valid string")),
        },
        Some(_) if relaxed => {
            // Quotes may be omitted for single-field bodies.
            let mut text = String::new();
            while let Some(byte) = input.peek() {
                text.push(byte as char);
                input.bump();
            }
            let text = text.trim_end().to_owned();
            if text == "null" {
                return Ok(None);
            }
            if text.len() > field.width {
                return input.fail(CodecError::overflow(format!(
                    "string overflow: {}[{}]",
                    field.label, field.width
                )));
            }
            Ok(Some(Value::String(text)))
        }
        Some(_) => input.fail(CodecError::syntax("Expected 'null' or a valid string")),
        None => input.fail(CodecError::UnexpectedEof),
    }
}

fn decode_bytes_value(input: &mut InputStream<'_>, field: &Field) -> CodecResult<Option<Value>> {
    match input.peek() {
        Some(b'"') => {
            input.bump();
            let mut text = String::new();
            loop {
                match input.bump() {
                    None => return input.fail(CodecError::UnexpectedEof),
                    Some(b'"') => break,
                    Some(byte) => text.push(byte as char),
                }
            }
            let Ok(bytes) = base64::decode(&text) else {
                return input.fail(CodecError::syntax(format!(
                    "invalid base64: {}",
                    field.label
                )));
            };
            if bytes.len() > field.width {
                return input.fail(CodecError::overflow(format!(
                    "bytes overflow: {}",
                    field.label
                )));
            }
            Ok(Some(Value::Bytes(bytes)))
        }
        Some(b'n') => match parse_atom(input).as_str() {
            "null" => Ok(None),
            _ => input.fail(CodecError::syntax("Expected base64 string or null")),
        },
        Some(_) => input.fail(CodecError::syntax("Expected base64 string or null")),
        None => input.fail(CodecError::UnexpectedEof),
    }
}
