//! Typed slot values detected by the NLU

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;
use strum::{Display, EnumIter, EnumString};

use crate::error::{DialogueError, DialogueResult};

/// Confidence reported when the NLU did not provide one
pub const UNKNOWN_CONFIDENCE: f32 = -1.0;

fn unknown_confidence() -> f32 {
    UNKNOWN_CONFIDENCE
}

/// Numeric tag identifying the concrete shape of a [`SlotValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[repr(u32)]
pub enum SlotValueType {
    Custom = 1,
    Number = 2,
    Ordinal = 3,
    InstantTime = 4,
    TimeInterval = 5,
    AmountOfMoney = 6,
    Temperature = 7,
    Duration = 8,
    Percentage = 9,
    MusicArtist = 10,
    MusicAlbum = 11,
    MusicTrack = 12,
    City = 13,
    Country = 14,
    Region = 15,
}

impl SlotValueType {
    /// Wire tag of this type
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Resolve a wire tag, rejecting anything outside the known range
    pub fn from_tag(tag: u32) -> DialogueResult<Self> {
        use SlotValueType::*;
        let value_type = match tag {
            1 => Custom,
            2 => Number,
            3 => Ordinal,
            4 => InstantTime,
            5 => TimeInterval,
            6 => AmountOfMoney,
            7 => Temperature,
            8 => Duration,
            9 => Percentage,
            10 => MusicArtist,
            11 => MusicAlbum,
            12 => MusicTrack,
            13 => City,
            14 => Country,
            15 => Region,
            other => return Err(DialogueError::UnknownSlotValueType(other.to_string())),
        };
        Ok(value_type)
    }
}

/// Granularity of an instant time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Grain {
    Year = 0,
    Quarter = 1,
    Month = 2,
    Week = 3,
    Day = 4,
    Hour = 5,
    Minute = 6,
    Second = 7,
}

impl TryFrom<i32> for Grain {
    type Error = DialogueError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use Grain::*;
        [Year, Quarter, Month, Week, Day, Hour, Minute, Second]
            .into_iter()
            .find(|grain| *grain as i32 == value)
            .ok_or(DialogueError::MissingField("grain"))
    }
}

/// Whether a resolved value is exact or approximate
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Precision {
    Approximate = 0,
    #[default]
    Exact = 1,
}

impl TryFrom<i32> for Precision {
    type Error = DialogueError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Precision::Approximate),
            1 => Ok(Precision::Exact),
            _ => Err(DialogueError::MissingField("precision")),
        }
    }
}

/// A resolved point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstantTimeValue {
    /// ISO 8601 representation of the instant
    pub value: String,
    /// Granularity of the instant
    pub grain: Grain,
    /// Precision of the resolution
    pub precision: Precision,
}

/// A resolved time interval, either bound may be open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeIntervalValue {
    /// Start of the interval
    pub from: Option<String>,
    /// End of the interval
    pub to: Option<String>,
}

/// A resolved amount of money
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmountOfMoneyValue {
    /// The amount
    pub value: f32,
    /// Precision of the resolution
    pub precision: Precision,
    /// Currency, when one was mentioned
    pub unit: Option<String>,
}

/// A resolved temperature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemperatureValue {
    /// The temperature
    pub value: f32,
    /// Unit (celsius, fahrenheit...), when one was mentioned
    pub unit: Option<String>,
}

/// A resolved duration, one signed count per unit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DurationValue {
    pub years: i64,
    pub quarters: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    /// Precision of the resolution
    pub precision: Precision,
}

/// Structured value of a slot
///
/// The variant is the value type: the shape of the payload can never disagree
/// with its [`SlotValueType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TaggedSlotValue", try_from = "serde_json::Value")]
pub enum SlotValue {
    Custom(String),
    Number(f64),
    Ordinal(i64),
    InstantTime(InstantTimeValue),
    TimeInterval(TimeIntervalValue),
    AmountOfMoney(AmountOfMoneyValue),
    Temperature(TemperatureValue),
    Duration(DurationValue),
    Percentage(f64),
    MusicArtist(String),
    MusicAlbum(String),
    MusicTrack(String),
    City(String),
    Country(String),
    Region(String),
}

impl SlotValue {
    /// Type tag matching this value
    pub fn value_type(&self) -> SlotValueType {
        match self {
            SlotValue::Custom(_) => SlotValueType::Custom,
            SlotValue::Number(_) => SlotValueType::Number,
            SlotValue::Ordinal(_) => SlotValueType::Ordinal,
            SlotValue::InstantTime(_) => SlotValueType::InstantTime,
            SlotValue::TimeInterval(_) => SlotValueType::TimeInterval,
            SlotValue::AmountOfMoney(_) => SlotValueType::AmountOfMoney,
            SlotValue::Temperature(_) => SlotValueType::Temperature,
            SlotValue::Duration(_) => SlotValueType::Duration,
            SlotValue::Percentage(_) => SlotValueType::Percentage,
            SlotValue::MusicArtist(_) => SlotValueType::MusicArtist,
            SlotValue::MusicAlbum(_) => SlotValueType::MusicAlbum,
            SlotValue::MusicTrack(_) => SlotValueType::MusicTrack,
            SlotValue::City(_) => SlotValueType::City,
            SlotValue::Country(_) => SlotValueType::Country,
            SlotValue::Region(_) => SlotValueType::Region,
        }
    }

    /// Build a string-shaped value for one of the string kinds
    pub fn from_text(value_type: SlotValueType, text: impl Into<String>) -> DialogueResult<Self> {
        let text = text.into();
        let value = match value_type {
            SlotValueType::Custom => SlotValue::Custom(text),
            SlotValueType::MusicArtist => SlotValue::MusicArtist(text),
            SlotValueType::MusicAlbum => SlotValue::MusicAlbum(text),
            SlotValueType::MusicTrack => SlotValue::MusicTrack(text),
            SlotValueType::City => SlotValue::City(text),
            SlotValueType::Country => SlotValue::Country(text),
            SlotValueType::Region => SlotValue::Region(text),
            other => {
                return Err(DialogueError::MalformedRequest(format!(
                    "{other} slot values are not text"
                )));
            }
        };
        Ok(value)
    }

    /// The textual payload for the string kinds
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Custom(s)
            | SlotValue::MusicArtist(s)
            | SlotValue::MusicAlbum(s)
            | SlotValue::MusicTrack(s)
            | SlotValue::City(s)
            | SlotValue::Country(s)
            | SlotValue::Region(s) => Some(s),
            _ => None,
        }
    }
}

/// JSON shape of a slot value: `{"kind": "<type>", ...payload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
enum TaggedSlotValue {
    Custom { value: String },
    Number { value: f64 },
    Ordinal { value: i64 },
    InstantTime(InstantTimeValue),
    TimeInterval(TimeIntervalValue),
    AmountOfMoney(AmountOfMoneyValue),
    Temperature(TemperatureValue),
    Duration(DurationValue),
    Percentage { value: f64 },
    MusicArtist { value: String },
    MusicAlbum { value: String },
    MusicTrack { value: String },
    City { value: String },
    Country { value: String },
    Region { value: String },
}

impl From<SlotValue> for TaggedSlotValue {
    fn from(value: SlotValue) -> Self {
        match value {
            SlotValue::Custom(value) => TaggedSlotValue::Custom { value },
            SlotValue::Number(value) => TaggedSlotValue::Number { value },
            SlotValue::Ordinal(value) => TaggedSlotValue::Ordinal { value },
            SlotValue::InstantTime(v) => TaggedSlotValue::InstantTime(v),
            SlotValue::TimeInterval(v) => TaggedSlotValue::TimeInterval(v),
            SlotValue::AmountOfMoney(v) => TaggedSlotValue::AmountOfMoney(v),
            SlotValue::Temperature(v) => TaggedSlotValue::Temperature(v),
            SlotValue::Duration(v) => TaggedSlotValue::Duration(v),
            SlotValue::Percentage(value) => TaggedSlotValue::Percentage { value },
            SlotValue::MusicArtist(value) => TaggedSlotValue::MusicArtist { value },
            SlotValue::MusicAlbum(value) => TaggedSlotValue::MusicAlbum { value },
            SlotValue::MusicTrack(value) => TaggedSlotValue::MusicTrack { value },
            SlotValue::City(value) => TaggedSlotValue::City { value },
            SlotValue::Country(value) => TaggedSlotValue::Country { value },
            SlotValue::Region(value) => TaggedSlotValue::Region { value },
        }
    }
}

impl From<TaggedSlotValue> for SlotValue {
    fn from(value: TaggedSlotValue) -> Self {
        match value {
            TaggedSlotValue::Custom { value } => SlotValue::Custom(value),
            TaggedSlotValue::Number { value } => SlotValue::Number(value),
            TaggedSlotValue::Ordinal { value } => SlotValue::Ordinal(value),
            TaggedSlotValue::InstantTime(v) => SlotValue::InstantTime(v),
            TaggedSlotValue::TimeInterval(v) => SlotValue::TimeInterval(v),
            TaggedSlotValue::AmountOfMoney(v) => SlotValue::AmountOfMoney(v),
            TaggedSlotValue::Temperature(v) => SlotValue::Temperature(v),
            TaggedSlotValue::Duration(v) => SlotValue::Duration(v),
            TaggedSlotValue::Percentage { value } => SlotValue::Percentage(value),
            TaggedSlotValue::MusicArtist { value } => SlotValue::MusicArtist(value),
            TaggedSlotValue::MusicAlbum { value } => SlotValue::MusicAlbum(value),
            TaggedSlotValue::MusicTrack { value } => SlotValue::MusicTrack(value),
            TaggedSlotValue::City { value } => SlotValue::City(value),
            TaggedSlotValue::Country { value } => SlotValue::Country(value),
            TaggedSlotValue::Region { value } => SlotValue::Region(value),
        }
    }
}

impl TryFrom<serde_json::Value> for SlotValue {
    type Error = DialogueError;

    fn try_from(raw: serde_json::Value) -> Result<Self, Self::Error> {
        let kind = raw
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .ok_or(DialogueError::MissingField("kind"))?;
        if kind.parse::<SlotValueType>().is_err() {
            return Err(DialogueError::UnknownSlotValueType(kind.to_string()));
        }
        Ok(serde_json::from_value::<TaggedSlotValue>(raw)?.into())
    }
}

/// First slot value `kind` in a JSON document that names no known type
pub(crate) fn find_unknown_kind(document: &serde_json::Value) -> Option<String> {
    match document {
        serde_json::Value::Object(fields) => {
            if let Some(serde_json::Value::String(kind)) = fields.get("kind") {
                if kind.parse::<SlotValueType>().is_err() {
                    return Some(kind.clone());
                }
            }
            fields.values().find_map(find_unknown_kind)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_unknown_kind),
        _ => None,
    }
}

/// One detected occurrence of a slot in the user input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Substring of the input the slot was extracted from
    pub raw_value: String,
    /// Resolved value
    pub value: SlotValue,
    /// Other plausible resolutions, best first
    #[serde(default)]
    pub alternatives: Vec<SlotValue>,
    /// Entity the value belongs to
    pub entity: String,
    /// Name of the slot in the intent
    pub slot_name: String,
    /// Character range of `raw_value` in the input
    pub range_start: i32,
    pub range_end: i32,
    /// Detection confidence, negative when not provided
    #[serde(default = "unknown_confidence")]
    pub confidence_score: f32,
}

impl Slot {
    /// Create a slot with no range, alternatives or confidence
    pub fn new(
        slot_name: impl Into<String>,
        entity: impl Into<String>,
        raw_value: impl Into<String>,
        value: SlotValue,
    ) -> Self {
        Self {
            raw_value: raw_value.into(),
            value,
            alternatives: Vec::new(),
            entity: entity.into(),
            slot_name: slot_name.into(),
            range_start: 0,
            range_end: 0,
            confidence_score: UNKNOWN_CONFIDENCE,
        }
    }

    /// Set the character range
    pub fn with_range(mut self, start: i32, end: i32) -> Self {
        self.range_start = start;
        self.range_end = end;
        self
    }

    /// Set the detection confidence
    pub fn with_confidence(mut self, confidence_score: f32) -> Self {
        self.confidence_score = confidence_score;
        self
    }

    /// Set the alternative resolutions
    pub fn with_alternatives(mut self, alternatives: Vec<SlotValue>) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Detection confidence, `None` when the NLU did not provide one
    pub fn confidence(&self) -> Option<f32> {
        (self.confidence_score >= 0.0).then_some(self.confidence_score)
    }
}

/// All occurrences of one slot name, in detection order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotsList(Vec<Slot>);

impl SlotsList {
    /// First detected occurrence
    pub fn first(&self) -> Option<&Slot> {
        self.0.first()
    }

    /// Every occurrence
    pub fn all(&self) -> &[Slot] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot> {
        self.0.iter()
    }
}

static NO_SLOTS: SlotsList = SlotsList(Vec::new());

/// Slots of an intent keyed by slot name
///
/// Serialized as the flat list the NLU emits and regrouped by name on decode.
/// Occurrences are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Slot>", into = "Vec<Slot>")]
pub struct SlotMap {
    slots: BTreeMap<String, SlotsList>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an occurrence under its slot name
    pub fn insert(&mut self, slot: Slot) {
        self.slots
            .entry(slot.slot_name.clone())
            .or_default()
            .0
            .push(slot);
    }

    /// Occurrences of `slot_name`, if any were detected
    pub fn get(&self, slot_name: &str) -> Option<&SlotsList> {
        self.slots.get(slot_name)
    }

    pub fn contains(&self, slot_name: &str) -> bool {
        self.slots.contains_key(slot_name)
    }

    /// Names of the detected slots
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Every occurrence, grouped by name
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values().flat_map(SlotsList::iter)
    }

    /// Number of distinct slot names
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Keep only the occurrences of `slot_name`
    pub fn retain_only(&mut self, slot_name: &str) {
        self.slots.retain(|name, _| name == slot_name);
    }
}

impl Index<&str> for SlotMap {
    type Output = SlotsList;

    fn index(&self, slot_name: &str) -> &SlotsList {
        self.slots.get(slot_name).unwrap_or(&NO_SLOTS)
    }
}

impl FromIterator<Slot> for SlotMap {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        let mut map = SlotMap::new();
        for slot in iter {
            map.insert(slot);
        }
        map
    }
}

impl From<Vec<Slot>> for SlotMap {
    fn from(slots: Vec<Slot>) -> Self {
        slots.into_iter().collect()
    }
}

impl From<SlotMap> for Vec<Slot> {
    fn from(map: SlotMap) -> Self {
        map.slots.into_values().flat_map(|list| list.0).collect()
    }
}
