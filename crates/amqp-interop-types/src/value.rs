//! Tagged-literal value grammar.
//!
//! A test value is one of:
//!
//! | Form      | JSON     | Example                                   |
//! |-----------|----------|-------------------------------------------|
//! | literal   | string   | `"0x7f"`, `"ubyte:1"`, `"none:"`          |
//! | list      | array    | `["ubyte:1", ["string:a"], {}]`           |
//! | map       | object   | `{"string:one": "ubyte:1"}`               |
//!
//! Top-level values of scalar types are bare literals (`"0x7f"`). Elements of
//! lists and maps carry their own type as `"<type>:<literal>"` so a receiver can
//! rebuild them without a schema.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::tag::AmqpType;

/// A composite element that is not a well-formed tagged literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("element `{0}` is not of the form <type>:<value>")]
    MissingSeparator(String),
    #[error("element `{element}` uses unknown type tag `{tag}`")]
    UnknownTag { tag: String, element: String },
}

/// A literal paired with its AMQP type, parsed from `"<type>:<literal>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValue {
    pub ty: AmqpType,
    pub literal: String,
}

impl TypedValue {
    pub fn new(ty: AmqpType, literal: impl Into<String>) -> Self {
        Self {
            ty,
            literal: literal.into(),
        }
    }

    /// Parse a tagged literal, splitting at the first colon.
    pub fn parse(element: &str) -> Result<Self, TagError> {
        let (tag, literal) = element
            .split_once(':')
            .ok_or_else(|| TagError::MissingSeparator(element.to_string()))?;
        let ty = AmqpType::from_tag(tag).ok_or_else(|| TagError::UnknownTag {
            tag: tag.to_string(),
            element: element.to_string(),
        })?;
        Ok(Self::new(ty, literal))
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Null is written with the `none` tag inside composites.
        let tag = match self.ty {
            AmqpType::Null => "none",
            other => other.as_str(),
        };
        write!(f, "{}:{}", tag, self.literal)
    }
}

/// One test value: a literal, or a list or map nesting further values.
///
/// Equality is structural and recursive. Map entries are kept sorted, so two
/// maps holding the same entries compare equal whatever order they were built
/// or decoded in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestValue {
    Literal(String),
    List(Vec<TestValue>),
    Map(BTreeMap<TestValue, TestValue>),
}

impl TestValue {
    pub fn literal(s: impl Into<String>) -> Self {
        TestValue::Literal(s.into())
    }

    /// A `"<type>:<literal>"` element for use inside a composite.
    pub fn tagged(ty: AmqpType, literal: impl Into<String>) -> Self {
        TestValue::Literal(TypedValue::new(ty, literal).to_string())
    }

    pub fn list<I: IntoIterator<Item = TestValue>>(items: I) -> Self {
        TestValue::List(items.into_iter().collect())
    }

    pub fn map<I: IntoIterator<Item = (TestValue, TestValue)>>(entries: I) -> Self {
        TestValue::Map(entries.into_iter().collect())
    }

    pub fn empty_list() -> Self {
        TestValue::List(Vec::new())
    }

    pub fn empty_map() -> Self {
        TestValue::Map(BTreeMap::new())
    }

    /// Check that every literal nested in this composite is tagged with a
    /// known type. A bare literal at the top level is not checked.
    pub fn validate_tags(&self) -> Result<(), TagError> {
        match self {
            TestValue::Literal(_) => Ok(()),
            TestValue::List(items) => items.iter().try_for_each(validate_element),
            TestValue::Map(entries) => entries.iter().try_for_each(|(k, v)| {
                validate_element(k)?;
                validate_element(v)
            }),
        }
    }
}

fn validate_element(value: &TestValue) -> Result<(), TagError> {
    match value {
        TestValue::Literal(element) => TypedValue::parse(element).map(|_| ()),
        composite => composite.validate_tags(),
    }
}

impl From<&str> for TestValue {
    fn from(s: &str) -> Self {
        TestValue::Literal(s.to_string())
    }
}

impl From<String> for TestValue {
    fn from(s: String) -> Self {
        TestValue::Literal(s)
    }
}

impl fmt::Display for TestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// JSON object keys are strings, so composite keys travel as their JSON text.
fn key_text(key: &TestValue) -> Result<Cow<'_, str>, serde_json::Error> {
    match key {
        TestValue::Literal(s) => Ok(Cow::Borrowed(s)),
        composite => serde_json::to_string(composite).map(Cow::Owned),
    }
}

fn parse_key(key: String) -> Result<TestValue, serde_json::Error> {
    if key.starts_with('[') || key.starts_with('{') {
        serde_json::from_str(&key)
    } else {
        Ok(TestValue::Literal(key))
    }
}

impl Serialize for TestValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TestValue::Literal(s) => serializer.serialize_str(s),
            TestValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            TestValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    let key = key_text(key).map_err(ser::Error::custom)?;
                    map.serialize_entry(key.as_ref(), value)?;
                }
                map.end()
            }
        }
    }
}

struct TestValueVisitor;

impl<'de> Visitor<'de> for TestValueVisitor {
    type Value = TestValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a literal string, an array of values or an object of values")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TestValue, E> {
        Ok(TestValue::Literal(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<TestValue, E> {
        Ok(TestValue::Literal(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<TestValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<TestValue>()? {
            items.push(item);
        }
        Ok(TestValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TestValue, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, TestValue>()? {
            let key = parse_key(key).map_err(de::Error::custom)?;
            entries.insert(key, value);
        }
        Ok(TestValue::Map(entries))
    }
}

impl<'de> Deserialize<'de> for TestValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TestValueVisitor)
    }
}
