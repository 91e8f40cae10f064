//! Vocabulary injection
//!
//! Injection runs beside sessions as its own request/response exchange. A
//! request carries a caller-chosen `id` that the injecter echoes back in the
//! completion message; the engine keeps no record of outstanding requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// How the values of an operation are merged into the model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum InjectionKind {
    /// Add to the current assistant
    Add,
    /// Add on top of the values shipped with the assistant
    AddFromVanilla,
}

/// A value to inject, weighted against the other values of its entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityValue {
    pub value: String,
    pub weight: u32,
}

impl EntityValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            weight: 1,
        }
    }

    pub fn weighted(value: impl Into<String>, weight: u32) -> Self {
        Self {
            value: value.into(),
            weight,
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        EntityValue::new(value)
    }
}

// Accepts "value" or ["value", weight] and always writes the pair.
impl<'de> Deserialize<'de> for EntityValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Plain(String),
            Weighted((String, u32)),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Plain(value) => EntityValue::new(value),
            Raw::Weighted((value, weight)) => EntityValue { value, weight },
        })
    }
}

impl Serialize for EntityValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.value, self.weight).serialize(serializer)
    }
}

/// One batch of values keyed by entity name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(InjectionKind, BTreeMap<String, Vec<EntityValue>>)",
    into = "(InjectionKind, BTreeMap<String, Vec<EntityValue>>)"
)]
pub struct InjectionOperation {
    pub kind: InjectionKind,
    pub values: BTreeMap<String, Vec<EntityValue>>,
}

impl From<(InjectionKind, BTreeMap<String, Vec<EntityValue>>)> for InjectionOperation {
    fn from((kind, values): (InjectionKind, BTreeMap<String, Vec<EntityValue>>)) -> Self {
        Self { kind, values }
    }
}

impl From<InjectionOperation> for (InjectionKind, BTreeMap<String, Vec<EntityValue>>) {
    fn from(operation: InjectionOperation) -> Self {
        (operation.kind, operation.values)
    }
}

/// Batch of vocabulary mutations, applied in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionRequestMessage {
    pub operations: Vec<InjectionOperation>,
    /// Pre-computed pronunciations keyed by word
    #[serde(default)]
    pub lexicon: BTreeMap<String, Vec<String>>,
    /// Language to use for cross-language pronunciation
    pub cross_language: Option<String>,
    /// Echoed back as `request_id` on completion
    pub id: Option<String>,
}

/// An injection request was processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionCompleteMessage {
    pub request_id: Option<String>,
}

/// Ask the injecter to forget every injected value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionResetRequestMessage {
    pub request_id: Option<String>,
}

/// The injected values were forgotten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionResetCompleteMessage {
    pub request_id: Option<String>,
}

/// Answer to an injection status request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionStatusMessage {
    /// Date of the latest injection, `None` if nothing was ever injected
    pub last_injection_date: Option<DateTime<Utc>>,
}

/// Builds an [`InjectionRequestMessage`]
#[derive(Debug, Clone, Default)]
pub struct InjectionRequestBuilder {
    operations: Vec<InjectionOperation>,
    lexicon: BTreeMap<String, Vec<String>>,
    cross_language: Option<String>,
    id: Option<String>,
}

impl InjectionRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn cross_language(mut self, language: impl Into<String>) -> Self {
        self.cross_language = Some(language.into());
        self
    }

    /// Append an operation adding `values` to `entity`
    pub fn add<V>(self, entity: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<EntityValue>,
    {
        self.operation(InjectionKind::Add, entity.into(), values)
    }

    /// Append an operation adding `values` to the vanilla values of `entity`
    pub fn add_from_vanilla<V>(
        self,
        entity: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self
    where
        V: Into<EntityValue>,
    {
        self.operation(InjectionKind::AddFromVanilla, entity.into(), values)
    }

    fn operation<V>(
        mut self,
        kind: InjectionKind,
        entity: String,
        values: impl IntoIterator<Item = V>,
    ) -> Self
    where
        V: Into<EntityValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.operations.push(InjectionOperation {
            kind,
            values: BTreeMap::from([(entity, values)]),
        });
        self
    }

    /// Register pronunciations for a word
    pub fn pronounce<I, S>(mut self, word: impl Into<String>, pronunciations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lexicon
            .entry(word.into())
            .or_default()
            .extend(pronunciations.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> InjectionRequestMessage {
        InjectionRequestMessage {
            operations: self.operations,
            lexicon: self.lexicon,
            cross_language: self.cross_language,
            id: self.id,
        }
    }
}
