use std::{collections::BTreeMap, fmt};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, EnumAccess, Unexpected, VariantAccess},
};

use crate::{
    EventKind,
    filter::{MatchFilter, PROVIDER_CLASS_KEY, Value},
};

const NOTIFICATION_TYPES: &[&str] = &[
    EventKind::Publish.notification_type(),
    EventKind::FirstPublish.notification_type(),
    EventKind::Matched.notification_type(),
    EventKind::FirstMatch.notification_type(),
    EventKind::Terminated.notification_type(),
];

struct EventKindVisitor;

impl de::Visitor<'_> for EventKindVisitor {
    type Value = EventKind;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("notification type name")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        EventKind::from_notification_type(v)
            .ok_or_else(|| E::unknown_variant(v, NOTIFICATION_TYPES))
    }
}

/// Human-readable formats use the notification type (`IOServiceMatched`, ...), binary formats
/// use the index into [`EventKind::ALL`].
impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.notification_type())
        } else {
            (self.index() as u8).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(EventKindVisitor)
        } else {
            let index = u8::deserialize(deserializer)?;
            EventKind::ALL
                .get(usize::from(index))
                .copied()
                .ok_or_else(|| {
                    de::Error::invalid_value(
                        Unexpected::Unsigned(index.into()),
                        &"event kind index below 5",
                    )
                })
        }
    }
}

const VALUE_VARIANTS: &[&str] = &["String", "Integer"];

enum ValueTag {
    String,
    Integer,
}

impl<'de> Deserialize<'de> for ValueTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TagVisitor;

        impl de::Visitor<'_> for TagVisitor {
            type Value = ValueTag;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("value variant")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match v {
                    0 => Ok(ValueTag::String),
                    1 => Ok(ValueTag::Integer),
                    _ => Err(E::invalid_value(
                        Unexpected::Unsigned(v),
                        &"variant index 0 or 1",
                    )),
                }
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match v {
                    "String" => Ok(ValueTag::String),
                    "Integer" => Ok(ValueTag::Integer),
                    _ => Err(E::unknown_variant(v, VALUE_VARIANTS)),
                }
            }
        }

        deserializer.deserialize_identifier(TagVisitor)
    }
}

struct ValueVisitor;

impl<'de> de::Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("string or integer")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match i64::try_from(v) {
            Ok(v) => Ok(Value::Integer(v)),
            Err(_) => Err(E::invalid_value(
                Unexpected::Unsigned(v),
                &"signed 64-bit integer",
            )),
        }
    }

    fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let (tag, variant) = data.variant::<ValueTag>()?;
        match tag {
            ValueTag::String => variant.newtype_variant().map(Value::String),
            ValueTag::Integer => variant.newtype_variant().map(Value::Integer),
        }
    }
}

/// Human-readable formats use a bare string or integer. Binary formats, which generally aren't
/// self-describing, use an externally tagged enum.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match (self, serializer.is_human_readable()) {
            (Value::String(s), true) => serializer.serialize_str(s),
            (Value::Integer(i), true) => serializer.serialize_i64(*i),
            (Value::String(s), false) => {
                serializer.serialize_newtype_variant("Value", 0, "String", s)
            }
            (Value::Integer(i), false) => {
                serializer.serialize_newtype_variant("Value", 1, "Integer", i)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(ValueVisitor)
        } else {
            deserializer.deserialize_enum("Value", VALUE_VARIANTS, ValueVisitor)
        }
    }
}

/// A filter is a map from property keys to values.
impl Serialize for MatchFilter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.iter())
    }
}

/// Fails if the map has no [`PROVIDER_CLASS_KEY`] entry.
impl<'de> Deserialize<'de> for MatchFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = BTreeMap::<String, Value>::deserialize(deserializer)?;
        MatchFilter::from_entries(entries)
            .ok_or_else(|| de::Error::missing_field(PROVIDER_CLASS_KEY))
    }
}
