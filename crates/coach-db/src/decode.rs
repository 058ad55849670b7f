//! Parse-or-default decoding for JSON columns.
//!
//! Several columns (`tags`, `category_allocation`, `question_ids`,
//! `related_topics`) hold JSON written by code paths outside this crate.
//! Older rows may contain a JSON *string* whose content is itself JSON, or a
//! shape that no longer matches. [`Lenient`] decodes such a column into `T`
//! and falls back to `T::default()` instead of failing the whole row.

use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::{Decode, Postgres, Type};

/// Decode a JSON value into `T`, unwrapping one level of stringified JSON.
///
/// Returns `T::default()` when the value does not fit.
pub fn decode_json_or_default<T>(value: Value) -> T
where
    T: DeserializeOwned + Default,
{
    let value = match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner) => inner,
            Err(_) => Value::String(text),
        },
        other => other,
    };
    serde_json::from_value(value).unwrap_or_default()
}

/// A JSON column value decoded with [`decode_json_or_default`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lenient<T>(pub T);

impl<T> Lenient<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Lenient<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for Lenient<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Lenient<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Serialize> Serialize for Lenient<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Lenient<T>
where
    T: DeserializeOwned + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self(decode_json_or_default(value)))
    }
}

impl<T> Type<Postgres> for Lenient<T> {
    fn type_info() -> PgTypeInfo {
        <Value as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <Value as Type<Postgres>>::compatible(ty)
    }
}

impl<'r, T> Decode<'r, Postgres> for Lenient<T>
where
    T: DeserializeOwned + Default,
{
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <Value as Decode<'r, Postgres>>::decode(value)?;
        Ok(Self(decode_json_or_default(raw)))
    }
}
