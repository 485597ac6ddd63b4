use crate::core::{Result, TagError};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::hash::{Hash, Hasher};

/// Wire discriminant of a tag. `End` only appears as a terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TagType {
    pub fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            0 => Self::End,
            1 => Self::Byte,
            2 => Self::Short,
            3 => Self::Int,
            4 => Self::Long,
            5 => Self::Float,
            6 => Self::Double,
            7 => Self::ByteArray,
            8 => Self::String,
            9 => Self::List,
            10 => Self::Compound,
            11 => Self::IntArray,
            12 => Self::LongArray,
            other => {
                return Err(TagError::DecodeFormat(format!(
                    "unknown tag type id {}",
                    other
                )));
            }
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::End => "END",
            Self::Byte => "BYTE",
            Self::Short => "SHORT",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::ByteArray => "BYTE_ARRAY",
            Self::String => "STRING",
            Self::List => "LIST",
            Self::Compound => "COMPOUND",
            Self::IntArray => "INT_ARRAY",
            Self::LongArray => "LONG_ARRAY",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(ListTag),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn tag_type(&self) -> TagType {
        match self {
            Self::Byte(_) => TagType::Byte,
            Self::Short(_) => TagType::Short,
            Self::Int(_) => TagType::Int,
            Self::Long(_) => TagType::Long,
            Self::Float(_) => TagType::Float,
            Self::Double(_) => TagType::Double,
            Self::ByteArray(_) => TagType::ByteArray,
            Self::String(_) => TagType::String,
            Self::List(_) => TagType::List,
            Self::Compound(_) => TagType::Compound,
            Self::IntArray(_) => TagType::IntArray,
            Self::LongArray(_) => TagType::LongArray,
        }
    }

    /// Deep copy. Same as `clone`, kept for symmetry with the aggregate types.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Self::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        match self {
            Self::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

// Floats compare by bit pattern so that Tag can be Eq + Hash.
impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::ByteArray(a), Self::ByteArray(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Compound(a), Self::Compound(b)) => a == b,
            (Self::IntArray(a), Self::IntArray(b)) => a == b,
            (Self::LongArray(a), Self::LongArray(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag_type().hash(state);
        match self {
            Self::Byte(v) => v.hash(state),
            Self::Short(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::ByteArray(v) => v.hash(state),
            Self::String(v) => v.hash(state),
            Self::List(v) => v.hash(state),
            Self::Compound(v) => v.hash(state),
            Self::IntArray(v) => v.hash(state),
            Self::LongArray(v) => v.hash(state),
        }
    }
}

impl From<Compound> for Tag {
    fn from(value: Compound) -> Self {
        Self::Compound(value)
    }
}

impl From<ListTag> for Tag {
    fn from(value: ListTag) -> Self {
        Self::List(value)
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i32> for Tag {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Tag {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Tag {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Homogeneous list. An empty list may carry any element type, usually `End`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListTag {
    element_type: TagType,
    items: Vec<Tag>,
}

impl ListTag {
    pub fn new(element_type: TagType) -> Self {
        Self {
            element_type,
            items: Vec::new(),
        }
    }

    /// Build a list from tags that must all share one type.
    pub fn from_tags(items: Vec<Tag>) -> Result<Self> {
        let element_type = items.first().map(Tag::tag_type).unwrap_or(TagType::End);
        let mut list = Self::new(element_type);
        for item in items {
            list.push(item)?;
        }
        Ok(list)
    }

    pub fn push(&mut self, tag: Tag) -> Result<()> {
        if self.items.is_empty() && self.element_type == TagType::End {
            self.element_type = tag.tag_type();
        }
        if tag.tag_type() != self.element_type {
            return Err(TagError::Encode(format!(
                "list of {} cannot hold {}",
                self.element_type.name(),
                tag.tag_type().name()
            )));
        }
        self.items.push(tag);
        Ok(())
    }

    pub fn element_type(&self) -> TagType {
        self.element_type
    }

    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // Used by the decoder, which has already checked every element's type.
    pub(crate) fn from_parts(element_type: TagType, items: Vec<Tag>) -> Self {
        Self {
            element_type,
            items,
        }
    }
}

/// String-keyed map of tags; the container every other piece of metadata hangs off.
///
/// Key order is irrelevant for equality; a `BTreeMap` keeps encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Compound {
    entries: BTreeMap<String, Tag>,
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Tag> {
        self.entries.get_mut(key)
    }

    /// Insert a tag, returning the previous value under that key.
    pub fn put(&mut self, key: impl Into<String>, tag: impl Into<Tag>) -> Option<Tag> {
        self.entries.insert(key.into(), tag.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Tag> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn contains_key_of_type(&self, key: &str, tag_type: TagType) -> bool {
        self.entries
            .get(key)
            .is_some_and(|tag| tag.tag_type() == tag_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Tag> {
        self.entries.iter()
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Merge deep copies of every entry of `other` into `self`, overwriting on key clash.
    pub fn copy_from(&mut self, other: &Compound) {
        for (key, tag) in other.iter() {
            self.entries.insert(key.clone(), tag.copy());
        }
    }

    pub fn put_byte(&mut self, key: impl Into<String>, value: i8) {
        self.put(key, Tag::Byte(value));
    }

    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) {
        self.put(key, Tag::Byte(i8::from(value)));
    }

    pub fn put_short(&mut self, key: impl Into<String>, value: i16) {
        self.put(key, Tag::Short(value));
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i32) {
        self.put(key, Tag::Int(value));
    }

    pub fn put_long(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, Tag::Long(value));
    }

    pub fn put_float(&mut self, key: impl Into<String>, value: f32) {
        self.put(key, Tag::Float(value));
    }

    pub fn put_double(&mut self, key: impl Into<String>, value: f64) {
        self.put(key, Tag::Double(value));
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Tag::String(value.into()));
    }

    pub fn put_compound(&mut self, key: impl Into<String>, value: Compound) {
        self.put(key, Tag::Compound(value));
    }

    pub fn get_byte(&self, key: &str) -> Option<i8> {
        match self.get(key)? {
            Tag::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_byte(key).map(|v| v != 0)
    }

    pub fn get_short(&self, key: &str) -> Option<i16> {
        match self.get(key)? {
            Tag::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            Tag::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Tag::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.get(key)? {
            Tag::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Tag::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_compound(&self, key: &str) -> Option<&Compound> {
        self.get(key)?.as_compound()
    }

    pub fn get_compound_mut(&mut self, key: &str) -> Option<&mut Compound> {
        self.get_mut(key)?.as_compound_mut()
    }

    /// Child compound under `key`, inserting an empty one if absent or of another type.
    pub fn compound_entry(&mut self, key: impl Into<String>) -> &mut Compound {
        let slot = self
            .entries
            .entry(key.into())
            .or_insert_with(|| Tag::Compound(Compound::new()));
        if !matches!(slot, Tag::Compound(_)) {
            *slot = Tag::Compound(Compound::new());
        }
        match slot {
            Tag::Compound(c) => c,
            _ => unreachable!("slot was just set to a compound"),
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&ListTag> {
        match self.get(key)? {
            Tag::List(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> IntoIterator for &'a Compound {
    type Item = (&'a String, &'a Tag);
    type IntoIter = btree_map::Iter<'a, String, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, Tag)> for Compound {
    fn from_iter<T: IntoIterator<Item = (String, Tag)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
