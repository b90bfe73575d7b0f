//! Canonical test values per AMQP type.
//!
//! Floating point and decimal values are given as the hex bit pattern of their
//! binary encoding. Decimal-to-binary rounding differs between client
//! libraries, bit patterns do not.
//!
//! Array test values are never stored. Each array is synthesized on demand as
//! `[<element type>, <values of that type>...]` from the entry of its element
//! type.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use uuid::Uuid;

use amqp_interop_types::{AmqpType, TestValue};

use crate::error::CatalogError;

/// Element types used to build the `array` test values.
pub const DEFAULT_ARRAY_ELEMENT_TYPES: [AmqpType; 19] = [
    AmqpType::Boolean,
    AmqpType::Ubyte,
    AmqpType::Ushort,
    AmqpType::Uint,
    AmqpType::Ulong,
    AmqpType::Byte,
    AmqpType::Short,
    AmqpType::Int,
    AmqpType::Long,
    AmqpType::Float,
    AmqpType::Double,
    AmqpType::Decimal32,
    AmqpType::Decimal64,
    AmqpType::Decimal128,
    AmqpType::Char,
    AmqpType::Uuid,
    AmqpType::Binary,
    AmqpType::String,
    AmqpType::Symbol,
];

/// Milliseconds since the Unix epoch for 2000-01-01T00:00:00Z.
const Y2K_MILLIS: i64 = 946_684_800_000;

const FOX: &str = "The quick brown fox jumped over the lazy dog 0123456789.";

/// Values that depend on when and where the catalog is built.
///
/// They are fixed once per catalog so the sequence compared after the round
/// trip is the sequence that was sent.
#[derive(Debug, Clone, Copy)]
pub struct CatalogSeed {
    pub now_millis: i64,
    pub random_uuid: Uuid,
}

impl CatalogSeed {
    pub fn now() -> Self {
        Self {
            now_millis: chrono::Utc::now().timestamp_millis(),
            random_uuid: Uuid::new_v4(),
        }
    }
}

/// Read-only map from type to its ordered canonical test values.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    entries: BTreeMap<AmqpType, Vec<TestValue>>,
    array_element_types: Vec<AmqpType>,
}

impl TypeCatalog {
    /// Build a catalog from explicit entries.
    ///
    /// List and map entries must only contain tagged literals with known tags.
    pub fn from_entries<I>(entries: I, array_element_types: Vec<AmqpType>) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (AmqpType, Vec<TestValue>)>,
    {
        let mut map = BTreeMap::new();
        for (ty, values) in entries {
            if ty == AmqpType::Array {
                return Err(CatalogError::ArrayEntry);
            }
            if ty.is_composite() {
                for value in &values {
                    value
                        .validate_tags()
                        .map_err(|source| CatalogError::MalformedValue { ty, source })?;
                }
            }
            map.insert(ty, values);
        }

        for element in &array_element_types {
            if *element == AmqpType::Array {
                return Err(CatalogError::InvalidArrayElement(*element));
            }
            if !map.contains_key(element) {
                return Err(CatalogError::MissingEntry(*element));
            }
        }

        Ok(Self {
            entries: map,
            array_element_types,
        })
    }

    /// The full AMQP primitive catalog, seeded with the current time and a
    /// fresh random uuid.
    pub fn amqp_primitives() -> Self {
        Self::amqp_primitives_with(CatalogSeed::now())
    }

    pub fn amqp_primitives_with(seed: CatalogSeed) -> Self {
        Self {
            entries: amqp_entries(seed),
            array_element_types: DEFAULT_ARRAY_ELEMENT_TYPES.to_vec(),
        }
    }

    /// Supported type names in ascending lexical order.
    ///
    /// `array` is listed whenever at least one element type is configured.
    pub fn type_names(&self) -> Vec<AmqpType> {
        let mut names: Vec<AmqpType> = self.entries.keys().copied().collect();
        if !self.array_element_types.is_empty() {
            names.push(AmqpType::Array);
        }
        names.sort_by_key(|ty| ty.as_str());
        names
    }

    pub fn contains(&self, ty: AmqpType) -> bool {
        match ty {
            AmqpType::Array => !self.array_element_types.is_empty(),
            other => self.entries.contains_key(&other),
        }
    }

    pub fn array_element_types(&self) -> &[AmqpType] {
        &self.array_element_types
    }

    /// Ordered canonical values for `ty`.
    pub fn values(&self, ty: AmqpType) -> Result<Vec<TestValue>, CatalogError> {
        match ty {
            AmqpType::Array => self.array_values(&self.array_element_types),
            other => self
                .entries
                .get(&other)
                .cloned()
                .ok_or(CatalogError::MissingEntry(other)),
        }
    }

    /// Like [`TypeCatalog::values`], starting from a type name.
    pub fn values_by_name(&self, name: &str) -> Result<Vec<TestValue>, CatalogError> {
        self.values(name.parse()?)
    }

    /// One synthesized array per element type, in the order given.
    pub fn array_values(&self, elements: &[AmqpType]) -> Result<Vec<TestValue>, CatalogError> {
        elements
            .iter()
            .map(|element| self.synthesize_array(*element))
            .collect()
    }

    /// `[element] ++ values(element)`.
    pub fn synthesize_array(&self, element: AmqpType) -> Result<TestValue, CatalogError> {
        self.synthesize_array_repeated(element, 1)
    }

    /// `[element]` followed by the element's values, repeated `repeat` times.
    pub fn synthesize_array_repeated(
        &self,
        element: AmqpType,
        repeat: usize,
    ) -> Result<TestValue, CatalogError> {
        if element == AmqpType::Array {
            return Err(CatalogError::InvalidArrayElement(element));
        }
        let values = self
            .entries
            .get(&element)
            .ok_or(CatalogError::MissingEntry(element))?;

        let mut array = Vec::with_capacity(1 + values.len() * repeat);
        array.push(TestValue::literal(element.as_str()));
        for _ in 0..repeat {
            array.extend(values.iter().cloned());
        }
        Ok(TestValue::List(array))
    }
}

fn literals(values: &[&str]) -> Vec<TestValue> {
    values.iter().map(|v| TestValue::literal(*v)).collect()
}

fn tagged(ty: AmqpType, literal: &str) -> TestValue {
    TestValue::tagged(ty, literal)
}

fn amqp_entries(seed: CatalogSeed) -> BTreeMap<AmqpType, Vec<TestValue>> {
    let mut m = BTreeMap::new();

    m.insert(AmqpType::Null, literals(&["None"]));
    m.insert(AmqpType::Boolean, literals(&["True", "False"]));
    m.insert(AmqpType::Ubyte, literals(&["0x0", "0x7f", "0x80", "0xff"]));
    m.insert(AmqpType::Ushort, literals(&["0x0", "0x7fff", "0x8000", "0xffff"]));
    m.insert(
        AmqpType::Uint,
        literals(&["0x0", "0x7fffffff", "0x80000000", "0xffffffff"]),
    );
    m.insert(
        AmqpType::Ulong,
        literals(&[
            "0x0",
            "0x1",
            "0xff",
            "0x100",
            "0x102030405",
            "0x7fffffffffffffff",
            "0x8000000000000000",
            "0xffffffffffffffff",
        ]),
    );
    m.insert(AmqpType::Byte, literals(&["-0x80", "-0x1", "0x0", "0x7f"]));
    m.insert(AmqpType::Short, literals(&["-0x8000", "-0x1", "0x0", "0x7fff"]));
    m.insert(
        AmqpType::Int,
        literals(&["-0x80000000", "-0x1", "0x0", "0x7fffffff"]),
    );
    m.insert(
        AmqpType::Long,
        literals(&[
            "-0x8000000000000000",
            "-0x102030405",
            "-0x81",
            "-0x80",
            "-0x1",
            "0x0",
            "0x7f",
            "0x80",
            "0x102030405",
            "0x7fffffffffffffff",
        ]),
    );
    // Infinities are left out of float: several clients mangle them in
    // single precision. Negative NaN is not representable everywhere.
    m.insert(
        AmqpType::Float,
        literals(&[
            "0x00000000", // 0.0
            "0x80000000", // -0.0
            "0x40490fdb", // pi
            "0xc02df854", // -e
            "0x00000001", // smallest positive denormal
            "0x80000001", // smallest negative denormal
            "0x007fffff", // largest positive denormal
            "0x807fffff", // largest negative denormal
            "0x00800000", // smallest positive normal
            "0x80800000", // smallest negative normal
            "0x7f7fffff", // largest positive normal
            "0xff7fffff", // largest negative normal
            "0x7fc00000", // +NaN
        ]),
    );
    m.insert(
        AmqpType::Double,
        literals(&[
            "0x0000000000000000", // 0.0
            "0x8000000000000000", // -0.0
            "0x400921fb54442eea", // pi
            "0xc005bf0a8b145fcf", // -e
            "0x0000000000000001", // smallest positive denormal
            "0x8000000000000001", // smallest negative denormal
            "0x000fffffffffffff", // largest positive denormal
            "0x800fffffffffffff", // largest negative denormal
            "0x0010000000000000", // smallest positive normal
            "0x8010000000000000", // smallest negative normal
            "0x7fefffffffffffff", // largest positive normal
            "0xffefffffffffffff", // largest negative normal
            "0x7ff0000000000000", // +Infinity
            "0xfff0000000000000", // -Infinity
            "0x7ff8000000000000", // +NaN
        ]),
    );
    m.insert(
        AmqpType::Decimal32,
        literals(&["0x00000000", "0x40490fdb", "0xc02df854", "0xff7fffff"]),
    );
    m.insert(
        AmqpType::Decimal64,
        literals(&[
            "0x0000000000000000",
            "0x400921fb54442eea",
            "0xc005bf0a8b145fcf",
            "0xffefffffffffffff",
        ]),
    );
    m.insert(
        AmqpType::Decimal128,
        literals(&[
            "0x00000000000000000000000000000000",
            "0xff0102030405060708090a0b0c0d0e0f",
        ]),
    );
    m.insert(
        AmqpType::Char,
        literals(&[
            " ", "0", "A", "z", "~", "0x1", "0x7f", "0x16b5", "0x10203", "0x10ffff",
        ]),
    );
    m.insert(
        AmqpType::Timestamp,
        vec![
            TestValue::literal("0x0"),
            TestValue::literal(format!("{:#x}", Y2K_MILLIS)),
            TestValue::literal(format!("{:#x}", seed.now_millis)),
        ],
    );
    m.insert(
        AmqpType::Uuid,
        vec![
            TestValue::literal(Uuid::nil().hyphenated().to_string()),
            TestValue::literal("00010203-0405-0607-0809-0a0b0c0d0e0f"),
            TestValue::literal(seed.random_uuid.hyphenated().to_string()),
        ],
    );
    m.insert(
        AmqpType::Binary,
        [
            Vec::new(),
            vec![0u8; 12345],
            b"Hello, world".to_vec(),
            b"\x01\x02\x03\x04\x05abcde\x80\x81\xfe\xff".to_vec(),
            FOX.repeat(100).into_bytes(),
        ]
        .iter()
        .map(|bytes| TestValue::literal(BASE64.encode(bytes)))
        .collect(),
    );
    m.insert(
        AmqpType::String,
        vec![
            TestValue::literal(""),
            TestValue::literal("Hello, world"),
            TestValue::literal("\"Hello, world\""),
            TestValue::literal("Charlie's peach"),
            TestValue::literal(FOX.repeat(100)),
        ],
    );
    m.insert(
        AmqpType::Symbol,
        vec![
            TestValue::literal(""),
            TestValue::literal("myDomain.123"),
            TestValue::literal("domain.0123456789.".repeat(100)),
        ],
    );
    m.insert(AmqpType::List, list_values(seed));
    m.insert(AmqpType::Map, map_values());
    m
}

fn list_values(seed: CatalogSeed) -> Vec<TestValue> {
    use AmqpType as T;

    let shorts = (0..10)
        .map(|i| tagged(T::Short, &i.to_string()))
        .collect::<Vec<_>>();

    vec![
        TestValue::empty_list(),
        TestValue::list([tagged(T::Ubyte, "1"), tagged(T::Int, "-2"), tagged(T::Float, "3.14")]),
        TestValue::list([
            tagged(T::String, "a"),
            tagged(T::String, "b"),
            tagged(T::String, "c"),
        ]),
        TestValue::list([
            tagged(T::Ulong, "12345"),
            tagged(T::Timestamp, &seed.now_millis.to_string()),
            tagged(T::Short, "-2500"),
            tagged(T::Uuid, &seed.random_uuid.hyphenated().to_string()),
            tagged(T::Symbol, "a.b.c"),
            tagged(T::Null, ""),
            tagged(T::Decimal64, "0x400921fb54442eea"),
        ]),
        TestValue::list([
            TestValue::empty_list(),
            tagged(T::Null, ""),
            TestValue::list([tagged(T::Ubyte, "1"), tagged(T::Ubyte, "2"), tagged(T::Ubyte, "3")]),
            tagged(T::Boolean, "True"),
            tagged(T::Boolean, "False"),
            TestValue::map([
                (tagged(T::String, "hello"), tagged(T::Long, "1234")),
                (tagged(T::String, "goodbye"), tagged(T::Boolean, "True")),
            ]),
        ]),
        TestValue::list([
            TestValue::empty_list(),
            TestValue::list([
                TestValue::empty_list(),
                TestValue::list([
                    TestValue::empty_list(),
                    TestValue::empty_list(),
                    TestValue::empty_list(),
                ]),
                TestValue::empty_list(),
            ]),
            TestValue::empty_list(),
        ]),
        TestValue::List(shorts.iter().cloned().cycle().take(100).collect()),
    ]
}

fn map_values() -> Vec<TestValue> {
    use AmqpType as T;

    vec![
        TestValue::empty_map(),
        TestValue::map([
            (tagged(T::String, "one"), tagged(T::Ubyte, "1")),
            (tagged(T::String, "two"), tagged(T::Ushort, "2")),
        ]),
        TestValue::map([
            (tagged(T::Null, ""), tagged(T::String, "None")),
            (tagged(T::String, "None"), tagged(T::Null, "")),
            (tagged(T::String, "One"), tagged(T::Long, "-1234567890")),
            (tagged(T::Short, "2"), tagged(T::Int, "2")),
            (tagged(T::Boolean, "True"), tagged(T::String, "True")),
            (tagged(T::String, "False"), tagged(T::Boolean, "False")),
            (
                tagged(T::String, "map"),
                TestValue::map([
                    (tagged(T::Char, "A"), tagged(T::Int, "1")),
                    (tagged(T::Char, "B"), tagged(T::Int, "2")),
                ]),
            ),
        ]),
    ]
}
