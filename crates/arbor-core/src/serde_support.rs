//! `serde::Serialize` for objects, mirroring the canonical JSON shape.
//!
//! Serialization assumes root access and applies no filter; use the JSON
//! codec directly when access control or delta emission is needed.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::object::{Object, Slot};
use crate::schema::{Field, FieldType};
use crate::value::Value;

struct FieldValue<'a> {
    field: &'a Field,
    value: &'a Value,
}

impl Serialize for FieldValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.field.kind {
            FieldType::Bool => serializer.serialize_bool(self.value.as_u64() == Some(1)),
            FieldType::Signed => serializer.serialize_i64(self.value.as_i64().unwrap_or(0)),
            FieldType::Unsigned => serializer.serialize_u64(self.value.as_u64().unwrap_or(0)),
            FieldType::Float => serializer.serialize_f64(self.value.as_f64().unwrap_or(0.0)),
            FieldType::Enum => {
                let raw = self.value.as_u64().unwrap_or(0);
                match self.field.enum_map.as_ref().and_then(|m| m.name_for(raw)) {
                    Some(name) => serializer.serialize_str(name),
                    None => serializer.serialize_u64(raw),
                }
            }
            FieldType::Bitmask => {
                let raw = self.value.as_u64().unwrap_or(0);
                let names: Vec<&str> = self
                    .field
                    .enum_map
                    .iter()
                    .flat_map(|m| m.entries())
                    .filter(|e| e.value < 64 && raw & (1 << e.value) != 0)
                    .map(|e| e.name.as_str())
                    .collect();
                let mut seq = serializer.serialize_seq(Some(names.len()))?;
                for name in names {
                    seq.serialize_element(name)?;
                }
                seq.end()
            }
            FieldType::String => serializer.serialize_str(self.value.as_str().unwrap_or_default()),
            FieldType::Bytes => {
                serializer.serialize_str(&base64::encode(self.value.as_bytes().unwrap_or_default()))
            }
            FieldType::Null | FieldType::Object => serializer.serialize_unit(),
        }
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for field in self.record_type().fields() {
            if !self.is_touched(field.index) {
                continue;
            }
            match self.slot(field.index) {
                Slot::Scalar(value) => {
                    map.serialize_entry(&field.label, &FieldValue { field, value })?;
                }
                Slot::Object(sub) => map.serialize_entry(&field.label, sub.as_ref())?,
                Slot::Values(items) => {
                    let values: Vec<FieldValue<'_>> = items
                        .iter()
                        .map(|value| FieldValue { field, value })
                        .collect();
                    map.serialize_entry(&field.label, &values)?;
                }
                Slot::Objects(items) => {
                    let visible: Vec<&Object> = items.iter().filter(|o| o.has_id()).collect();
                    map.serialize_entry(&field.label, &visible)?;
                }
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::schema::{EnumMap, Field, RecordType};
    use crate::Object;

    fn test_type() -> Arc<RecordType> {
        let map = EnumMap::new([("OFF", 0, ""), ("ON", 1, "")]);
        RecordType::builder("Status")
            .field(Field::signed("level", 2))
            .field(Field::enumeration("mode", 1, Arc::clone(&map)))
            .field(Field::bitmask("bits", 1, map))
            .field(Field::bytes("payload", 8))
            .build()
            .unwrap()
    }

    #[test]
    fn serializes_canonical_shape() {
        let ty = test_type();
        let mut obj = Object::new(&ty);
        obj.assign_id(4);
        obj.set(1, -3i64).unwrap();
        obj.set(2, 1u64).unwrap();
        obj.set_bit_by_name(3, "ON", true).unwrap();
        obj.set_bytes(4, &[1, 2]).unwrap();

        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": 4,
                "level": -3,
                "mode": "ON",
                "bits": ["ON"],
                "payload": "AQI=",
            })
        );
    }

    #[test]
    fn untouched_fields_are_absent() {
        let obj = Object::new(&test_type());
        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
