//! Record-type descriptors — the static schema driving objects and codecs.
//!
//! A [`RecordType`] is an immutable, shareable description of an object
//! shape: an ordered list of [`Field`]s, each with a semantic type, wire
//! tag, permissions and (for arrays, strings and bytes) a capacity.
//! Field 0 is always the reserved `id` field.
//!
//! Descriptors are built once with [`RecordTypeBuilder`] and shared via
//! [`Arc`]; lookups never allocate.

use std::sync::Arc;

/// Object identifier — 64-bit, assigned by an [`crate::id::IdGenerator`].
pub type ObjectId = u64;

/// Index of the reserved `id` field in every record type.
pub const ID_FIELD_INDEX: usize = 0;

/// Maximum number of fields per record type (bounded by the field mask).
pub const MAX_FIELDS: usize = 64;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// Signed integer of 1, 2, 4 or 8 bytes.
    Signed,
    /// Unsigned integer of 1, 2, 4 or 8 bytes.
    Unsigned,
    /// Floating point of 4 or 8 bytes.
    Float,
    /// Enumeration backed by an [`EnumMap`].
    Enum,
    /// Bit mask whose bit positions are named by an [`EnumMap`].
    Bitmask,
    /// UTF-8 string with a byte capacity.
    String,
    /// Raw bytes with a capacity.
    Bytes,
    /// Nested object of another record type.
    Object,
    /// Placeholder that only ever encodes as `null`.
    Null,
}

impl FieldType {
    /// True for the numeric family (bool, integers, floats, enums, bitmasks).
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Signed | Self::Unsigned | Self::Float | Self::Enum | Self::Bitmask
        )
    }
}

/// Access level of a caller, ordered from least to most privileged.
///
/// A field is readable (writable) when the caller's level is at least the
/// field's `read` (`write`) level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AccessLevel {
    /// Unauthenticated local caller.
    #[default]
    Public,
    /// Remote/cloud caller.
    Cloud,
    /// Administrative caller.
    Admin,
    /// Unrestricted; used internally by transactions and persistence.
    Root,
}

/// One named value of an enumeration.
#[derive(Debug, Clone)]
pub struct EnumEntry {
    /// Symbolic name, as it appears in JSON.
    pub name: String,
    /// Numeric value; interpreted as a bit position for bitmask fields.
    pub value: u64,
    /// Human-readable description.
    pub description: String,
}

/// Ordered name/value map backing enum and bitmask fields.
#[derive(Debug, Clone, Default)]
pub struct EnumMap {
    entries: Vec<EnumEntry>,
}

impl EnumMap {
    /// Build a map from `(name, value, description)` triples.
    pub fn new<I, N, D>(entries: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (N, u64, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        Arc::new(Self {
            entries: entries
                .into_iter()
                .map(|(name, value, description)| EnumEntry {
                    name: name.into(),
                    value,
                    description: description.into(),
                })
                .collect(),
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[EnumEntry] {
        &self.entries
    }

    /// Look up the numeric value for `name`.
    #[must_use]
    pub fn value_for(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.value)
    }

    /// Look up the name for `value`.
    #[must_use]
    pub fn name_for(&self, value: u64) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.value == value)
            .map(|e| e.name.as_str())
    }

    /// Look up the description for `value`.
    #[must_use]
    pub fn description_for(&self, value: u64) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.value == value)
            .map(|e| e.description.as_str())
    }

    /// True when `value` appears in the map.
    #[must_use]
    pub fn contains(&self, value: u64) -> bool {
        self.name_for(value).is_some()
    }
}

/// Descriptor of one field inside a [`RecordType`].
#[derive(Debug, Clone)]
pub struct Field {
    /// 0-based position in the record.
    pub index: usize,
    /// Wire tag for the binary codec; defaults to `index + 1`.
    pub tag: u32,
    /// Label, as it appears in JSON and in paths.
    pub label: String,
    /// Semantic type.
    pub kind: FieldType,
    /// Byte width for numerics (1/2/4/8); byte capacity for strings/bytes.
    pub width: usize,
    /// Element capacity for arrays; 0 means scalar.
    pub array_capacity: usize,
    /// Name/value map for enum and bitmask fields.
    pub enum_map: Option<Arc<EnumMap>>,
    /// Record type of nested objects.
    pub subtype: Option<Arc<RecordType>>,
    /// Minimum level required to read the field.
    pub read: AccessLevel,
    /// Minimum level required to write the field.
    pub write: AccessLevel,
    /// Included in persistence filters.
    pub persisted: bool,
    /// Decoding this field always marks it changed, even without a
    /// value difference.
    pub always_notify: bool,
    /// Lower numeric bound, enforced on decode.
    pub min: Option<f64>,
    /// Upper numeric bound, enforced on decode.
    pub max: Option<f64>,
}

impl Field {
    fn new(label: impl Into<String>, kind: FieldType, width: usize) -> Self {
        Self {
            index: 0,
            tag: 0,
            label: label.into(),
            kind,
            width,
            array_capacity: 0,
            enum_map: None,
            subtype: None,
            read: AccessLevel::Public,
            write: AccessLevel::Public,
            persisted: false,
            always_notify: false,
            min: None,
            max: None,
        }
    }

    /// Boolean field.
    #[must_use]
    pub fn bool(label: impl Into<String>) -> Self {
        Self::new(label, FieldType::Bool, 1)
    }

    /// Signed integer field of `width` bytes (1/2/4/8).
    #[must_use]
    pub fn signed(label: impl Into<String>, width: usize) -> Self {
        Self::new(label, FieldType::Signed, width)
    }

    /// Unsigned integer field of `width` bytes (1/2/4/8).
    #[must_use]
    pub fn unsigned(label: impl Into<String>, width: usize) -> Self {
        Self::new(label, FieldType::Unsigned, width)
    }

    /// Floating-point field of `width` bytes (4/8).
    #[must_use]
    pub fn float(label: impl Into<String>, width: usize) -> Self {
        Self::new(label, FieldType::Float, width)
    }

    /// Enum field of `width` bytes backed by `map`.
    #[must_use]
    pub fn enumeration(label: impl Into<String>, width: usize, map: Arc<EnumMap>) -> Self {
        let mut field = Self::new(label, FieldType::Enum, width);
        field.enum_map = Some(map);
        field
    }

    /// Bitmask field of `width` bytes whose bit positions are named by `map`.
    #[must_use]
    pub fn bitmask(label: impl Into<String>, width: usize, map: Arc<EnumMap>) -> Self {
        let mut field = Self::new(label, FieldType::Bitmask, width);
        field.enum_map = Some(map);
        field
    }

    /// String field with a byte capacity.
    #[must_use]
    pub fn string(label: impl Into<String>, capacity: usize) -> Self {
        Self::new(label, FieldType::String, capacity)
    }

    /// Bytes field with a capacity.
    #[must_use]
    pub fn bytes(label: impl Into<String>, capacity: usize) -> Self {
        Self::new(label, FieldType::Bytes, capacity)
    }

    /// Nested object field.
    #[must_use]
    pub fn object(label: impl Into<String>, subtype: Arc<RecordType>) -> Self {
        let mut field = Self::new(label, FieldType::Object, 0);
        field.subtype = Some(subtype);
        field
    }

    /// Null-placeholder field.
    #[must_use]
    pub fn null(label: impl Into<String>) -> Self {
        Self::new(label, FieldType::Null, 0)
    }

    /// Make the field an array with the given element capacity.
    #[must_use]
    pub fn repeated(mut self, capacity: usize) -> Self {
        self.array_capacity = capacity;
        self
    }

    /// Override the wire tag.
    #[must_use]
    pub fn tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    /// Require `level` to read the field.
    #[must_use]
    pub fn read(mut self, level: AccessLevel) -> Self {
        self.read = level;
        self
    }

    /// Require `level` to write the field.
    #[must_use]
    pub fn write(mut self, level: AccessLevel) -> Self {
        self.write = level;
        self
    }

    /// Include the field in persistence filters.
    #[must_use]
    pub fn persisted(mut self) -> Self {
        self.persisted = true;
        self
    }

    /// Force the changed bit whenever the field is decoded.
    #[must_use]
    pub fn always_notify(mut self) -> Self {
        self.always_notify = true;
        self
    }

    /// Numeric bounds enforced on decode.
    #[must_use]
    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// True when the field holds an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.array_capacity != 0
    }

    /// True for nested-object fields.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.kind == FieldType::Object
    }

    /// True for string fields.
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.kind == FieldType::String
    }

    /// True when a caller at `level` may read this field.
    #[must_use]
    pub fn readable_at(&self, level: AccessLevel) -> bool {
        level >= self.read
    }

    /// True when a caller at `level` may write this field.
    #[must_use]
    pub fn writable_at(&self, level: AccessLevel) -> bool {
        level >= self.write
    }
}

/// Immutable descriptor of an object shape.
///
/// Construct with [`RecordType::builder`]; the reserved `id` field is
/// inserted automatically at index 0.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    fields: Vec<Field>,
}

/// Error raised by [`RecordTypeBuilder::build`] for an invalid schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// More than [`MAX_FIELDS`] fields.
    #[error("record type '{0}' exceeds {MAX_FIELDS} fields")]
    TooManyFields(String),
    /// Two fields share a label.
    #[error("duplicate field label '{0}'")]
    DuplicateLabel(String),
    /// Two fields share a wire tag.
    #[error("duplicate wire tag {0}")]
    DuplicateTag(u32),
    /// Numeric width is not one of 1/2/4/8 (or 4/8 for floats).
    #[error("field '{0}' has invalid width {1}")]
    BadWidth(String, usize),
    /// Enum or bitmask field without a map, or object field without a
    /// subtype.
    #[error("field '{0}' is missing its {1}")]
    MissingDetail(String, &'static str),
}

impl RecordType {
    /// Start building a record type called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order, `id` first.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields, including `id`.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field at `index`.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Find a field by label.
    ///
    /// A dot in the probe matches an underscore in the label, so a JSON
    /// name like `prefix.value` finds the field `prefix_value`.
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<&Field> {
        self.fields.iter().find(|f| labels_match(&f.label, label))
    }

    /// Find a field by wire tag.
    #[must_use]
    pub fn find_by_tag(&self, tag: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }
}

fn labels_match(label: &str, probe: &str) -> bool {
    if label.len() != probe.len() {
        return false;
    }
    label
        .bytes()
        .zip(probe.bytes())
        .all(|(l, p)| l == p || (p == b'.' && l == b'_'))
}

/// Builder for [`RecordType`]; fields gain indices in insertion order
/// starting at 1 (index 0 is the implicit `id`).
#[derive(Debug)]
pub struct RecordTypeBuilder {
    name: String,
    fields: Vec<Field>,
}

impl RecordTypeBuilder {
    /// Append a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate and produce the shared descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for duplicate labels or tags, invalid
    /// widths, missing enum maps or subtypes, or too many fields.
    pub fn build(self) -> Result<Arc<RecordType>, SchemaError> {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.push(
            Field::unsigned("id", 8)
                .tag(1)
                .write(AccessLevel::Public)
                .persisted(),
        );
        fields.extend(self.fields);

        if fields.len() > MAX_FIELDS {
            return Err(SchemaError::TooManyFields(self.name));
        }

        for (index, field) in fields.iter_mut().enumerate() {
            field.index = index;
            if field.tag == 0 {
                field.tag = u32::try_from(index).unwrap_or(u32::MAX) + 1;
            }
        }

        for field in &fields {
            match field.kind {
                FieldType::Bool | FieldType::Signed | FieldType::Unsigned => {
                    if !matches!(field.width, 1 | 2 | 4 | 8) {
                        return Err(SchemaError::BadWidth(field.label.clone(), field.width));
                    }
                }
                FieldType::Float => {
                    if !matches!(field.width, 4 | 8) {
                        return Err(SchemaError::BadWidth(field.label.clone(), field.width));
                    }
                }
                FieldType::Enum | FieldType::Bitmask => {
                    if !matches!(field.width, 1 | 2 | 4 | 8) {
                        return Err(SchemaError::BadWidth(field.label.clone(), field.width));
                    }
                    if field.enum_map.is_none() {
                        return Err(SchemaError::MissingDetail(field.label.clone(), "enum map"));
                    }
                }
                FieldType::Object => {
                    if field.subtype.is_none() {
                        return Err(SchemaError::MissingDetail(field.label.clone(), "subtype"));
                    }
                }
                FieldType::String | FieldType::Bytes | FieldType::Null => {}
            }
        }

        for (i, field) in fields.iter().enumerate() {
            for other in &fields[i + 1..] {
                if field.label == other.label {
                    return Err(SchemaError::DuplicateLabel(field.label.clone()));
                }
                if field.tag == other.tag {
                    return Err(SchemaError::DuplicateTag(field.tag));
                }
            }
        }

        Ok(Arc::new(RecordType {
            name: self.name,
            fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colour_map() -> Arc<EnumMap> {
        EnumMap::new([("RED", 0, "Red"), ("GREEN", 1, "Green"), ("BLUE", 2, "Blue")])
    }

    #[test]
    fn builder_inserts_id_field() {
        let ty = RecordType::builder("Thing")
            .field(Field::bool("flag"))
            .build()
            .unwrap();
        assert_eq!(ty.field_count(), 2);
        let id = ty.field(ID_FIELD_INDEX).unwrap();
        assert_eq!(id.label, "id");
        assert_eq!(id.kind, FieldType::Unsigned);
        assert_eq!(id.width, 8);
        assert_eq!(ty.field(1).unwrap().label, "flag");
    }

    #[test]
    fn default_tags_are_one_based() {
        let ty = RecordType::builder("Thing")
            .field(Field::bool("a"))
            .field(Field::bool("b"))
            .build()
            .unwrap();
        assert_eq!(ty.field(0).unwrap().tag, 1);
        assert_eq!(ty.field(1).unwrap().tag, 2);
        assert_eq!(ty.field(2).unwrap().tag, 3);
    }

    #[test]
    fn explicit_tag_is_kept() {
        let ty = RecordType::builder("Thing")
            .field(Field::bool("a").tag(9))
            .build()
            .unwrap();
        assert_eq!(ty.find_by_tag(9).unwrap().label, "a");
    }

    #[test]
    fn duplicate_label_rejected() {
        let err = RecordType::builder("Thing")
            .field(Field::bool("a"))
            .field(Field::signed("a", 4))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateLabel("a".into()));
    }

    #[test]
    fn duplicate_tag_rejected() {
        let err = RecordType::builder("Thing")
            .field(Field::bool("a").tag(5))
            .field(Field::bool("b").tag(5))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTag(5));
    }

    #[test]
    fn bad_float_width_rejected() {
        let err = RecordType::builder("Thing")
            .field(Field::float("f", 2))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::BadWidth("f".into(), 2));
    }

    #[test]
    fn dotted_labels_match_underscores() {
        let ty = RecordType::builder("Thing")
            .field(Field::bool("prefix_value"))
            .build()
            .unwrap();
        assert!(ty.find_by_label("prefix.value").is_some());
        assert!(ty.find_by_label("prefix_value").is_some());
        assert!(ty.find_by_label("prefix-value").is_none());
    }

    #[test]
    fn enum_map_lookups() {
        let map = colour_map();
        assert_eq!(map.value_for("GREEN"), Some(1));
        assert_eq!(map.name_for(2), Some("BLUE"));
        assert_eq!(map.description_for(0), Some("Red"));
        assert!(map.contains(1));
        assert!(!map.contains(7));
        assert_eq!(map.value_for("PINK"), None);
    }

    #[test]
    fn access_level_ordering() {
        assert!(AccessLevel::Public < AccessLevel::Cloud);
        assert!(AccessLevel::Cloud < AccessLevel::Admin);
        assert!(AccessLevel::Admin < AccessLevel::Root);

        let field = Field::bool("x").read(AccessLevel::Admin);
        assert!(field.readable_at(AccessLevel::Root));
        assert!(field.readable_at(AccessLevel::Admin));
        assert!(!field.readable_at(AccessLevel::Cloud));
    }

    #[test]
    fn enum_field_requires_map() {
        let mut field = Field::bool("e");
        field.kind = FieldType::Enum;
        let err = RecordType::builder("Thing").field(field).build().unwrap_err();
        assert!(matches!(err, SchemaError::MissingDetail(_, "enum map")));
    }
}
