//! Structured wire records
//!
//! Protobuf mirrors of the protocol messages. Absent values use `optional`
//! fields (or a wrapper message for lists) so that "absent" and "empty" stay
//! distinct. A slot value is flattened into its type tag plus the one payload
//! field that tag calls for.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

use super::WireMessage;
use crate::error::{DialogueError, DialogueResult};
use crate::events::{
    ContinueSessionMessage, DialogueConfigureIntent, DialogueConfigureMessage,
    EndSessionMessage, ErrorMessage, IntentMessage, IntentNotRecognizedMessage,
    RegisterSoundMessage, SayFinishedMessage, SayMessage, SessionEndedMessage, SessionInit,
    SessionQueuedMessage, SessionStartedMessage, SessionTimeoutMessage, SiteMessage,
    StartSessionMessage,
};
use crate::injection::{
    EntityValue, InjectionCompleteMessage, InjectionKind, InjectionOperation,
    InjectionRequestMessage, InjectionResetCompleteMessage, InjectionResetRequestMessage,
    InjectionStatusMessage,
};
use crate::value_objects::{
    AmountOfMoneyValue, AsrDecodingDuration, AsrToken, Component, DurationValue, Grain,
    InstantTimeValue, IntentAlternative, IntentClassifierResult, Precision, SessionTermination,
    Slot, SlotMap, SlotValue, SlotValueType, TemperatureValue, TimeIntervalValue,
};

fn required<T>(value: Option<T>, field: &'static str) -> DialogueResult<T> {
    value.ok_or(DialogueError::MissingField(field))
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbStringList {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

fn to_string_list(values: &Option<Vec<String>>) -> Option<PbStringList> {
    values.as_ref().map(|values| PbStringList {
        values: values.clone(),
    })
}

// ---------------------------------------------------------------------------
// Slots

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbInstantTime {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(int32, tag = "2")]
    pub grain: i32,
    #[prost(int32, tag = "3")]
    pub precision: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbTimeInterval {
    #[prost(string, optional, tag = "1")]
    pub from: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub to: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbAmountOfMoney {
    #[prost(float, tag = "1")]
    pub value: f32,
    #[prost(int32, tag = "2")]
    pub precision: i32,
    #[prost(string, optional, tag = "3")]
    pub unit: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbTemperature {
    #[prost(float, tag = "1")]
    pub value: f32,
    #[prost(string, optional, tag = "2")]
    pub unit: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbDuration {
    #[prost(int64, tag = "1")]
    pub years: i64,
    #[prost(int64, tag = "2")]
    pub quarters: i64,
    #[prost(int64, tag = "3")]
    pub months: i64,
    #[prost(int64, tag = "4")]
    pub weeks: i64,
    #[prost(int64, tag = "5")]
    pub days: i64,
    #[prost(int64, tag = "6")]
    pub hours: i64,
    #[prost(int64, tag = "7")]
    pub minutes: i64,
    #[prost(int64, tag = "8")]
    pub seconds: i64,
    #[prost(int32, tag = "9")]
    pub precision: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSlotValue {
    #[prost(uint32, tag = "1")]
    pub value_type: u32,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
    #[prost(double, optional, tag = "3")]
    pub number: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub ordinal: Option<i64>,
    #[prost(message, optional, tag = "5")]
    pub instant_time: Option<PbInstantTime>,
    #[prost(message, optional, tag = "6")]
    pub time_interval: Option<PbTimeInterval>,
    #[prost(message, optional, tag = "7")]
    pub amount_of_money: Option<PbAmountOfMoney>,
    #[prost(message, optional, tag = "8")]
    pub temperature: Option<PbTemperature>,
    #[prost(message, optional, tag = "9")]
    pub duration: Option<PbDuration>,
}

impl From<&SlotValue> for PbSlotValue {
    fn from(value: &SlotValue) -> Self {
        let mut record = PbSlotValue {
            value_type: value.value_type().tag(),
            ..Default::default()
        };
        match value {
            SlotValue::Number(n) | SlotValue::Percentage(n) => record.number = Some(*n),
            SlotValue::Ordinal(n) => record.ordinal = Some(*n),
            SlotValue::InstantTime(t) => {
                record.instant_time = Some(PbInstantTime {
                    value: t.value.clone(),
                    grain: t.grain as i32,
                    precision: t.precision as i32,
                })
            }
            SlotValue::TimeInterval(t) => {
                record.time_interval = Some(PbTimeInterval {
                    from: t.from.clone(),
                    to: t.to.clone(),
                })
            }
            SlotValue::AmountOfMoney(m) => {
                record.amount_of_money = Some(PbAmountOfMoney {
                    value: m.value,
                    precision: m.precision as i32,
                    unit: m.unit.clone(),
                })
            }
            SlotValue::Temperature(t) => {
                record.temperature = Some(PbTemperature {
                    value: t.value,
                    unit: t.unit.clone(),
                })
            }
            SlotValue::Duration(d) => {
                record.duration = Some(PbDuration {
                    years: d.years,
                    quarters: d.quarters,
                    months: d.months,
                    weeks: d.weeks,
                    days: d.days,
                    hours: d.hours,
                    minutes: d.minutes,
                    seconds: d.seconds,
                    precision: d.precision as i32,
                })
            }
            text => record.text = text.as_text().map(str::to_string),
        }
        record
    }
}

impl TryFrom<PbSlotValue> for SlotValue {
    type Error = DialogueError;

    fn try_from(record: PbSlotValue) -> DialogueResult<Self> {
        let value_type = SlotValueType::from_tag(record.value_type)?;
        let value = match value_type {
            SlotValueType::Number => SlotValue::Number(required(record.number, "number")?),
            SlotValueType::Percentage => {
                SlotValue::Percentage(required(record.number, "number")?)
            }
            SlotValueType::Ordinal => SlotValue::Ordinal(required(record.ordinal, "ordinal")?),
            SlotValueType::InstantTime => {
                let t = required(record.instant_time, "instant_time")?;
                SlotValue::InstantTime(InstantTimeValue {
                    value: t.value,
                    grain: Grain::try_from(t.grain)?,
                    precision: Precision::try_from(t.precision)?,
                })
            }
            SlotValueType::TimeInterval => {
                let t = required(record.time_interval, "time_interval")?;
                SlotValue::TimeInterval(TimeIntervalValue {
                    from: t.from,
                    to: t.to,
                })
            }
            SlotValueType::AmountOfMoney => {
                let m = required(record.amount_of_money, "amount_of_money")?;
                SlotValue::AmountOfMoney(AmountOfMoneyValue {
                    value: m.value,
                    precision: Precision::try_from(m.precision)?,
                    unit: m.unit,
                })
            }
            SlotValueType::Temperature => {
                let t = required(record.temperature, "temperature")?;
                SlotValue::Temperature(TemperatureValue {
                    value: t.value,
                    unit: t.unit,
                })
            }
            SlotValueType::Duration => {
                let d = required(record.duration, "duration")?;
                SlotValue::Duration(DurationValue {
                    years: d.years,
                    quarters: d.quarters,
                    months: d.months,
                    weeks: d.weeks,
                    days: d.days,
                    hours: d.hours,
                    minutes: d.minutes,
                    seconds: d.seconds,
                    precision: Precision::try_from(d.precision)?,
                })
            }
            text_type => SlotValue::from_text(text_type, required(record.text, "text")?)?,
        };
        Ok(value)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSlot {
    #[prost(string, tag = "1")]
    pub raw_value: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<PbSlotValue>,
    #[prost(message, repeated, tag = "3")]
    pub alternatives: Vec<PbSlotValue>,
    #[prost(string, tag = "4")]
    pub entity: String,
    #[prost(string, tag = "5")]
    pub slot_name: String,
    #[prost(int32, tag = "6")]
    pub range_start: i32,
    #[prost(int32, tag = "7")]
    pub range_end: i32,
    #[prost(float, tag = "8")]
    pub confidence_score: f32,
}

impl From<&Slot> for PbSlot {
    fn from(slot: &Slot) -> Self {
        PbSlot {
            raw_value: slot.raw_value.clone(),
            value: Some(PbSlotValue::from(&slot.value)),
            alternatives: slot.alternatives.iter().map(PbSlotValue::from).collect(),
            entity: slot.entity.clone(),
            slot_name: slot.slot_name.clone(),
            range_start: slot.range_start,
            range_end: slot.range_end,
            confidence_score: slot.confidence_score,
        }
    }
}

impl TryFrom<PbSlot> for Slot {
    type Error = DialogueError;

    fn try_from(record: PbSlot) -> DialogueResult<Self> {
        Ok(Slot {
            raw_value: record.raw_value,
            value: required(record.value, "slot.value")?.try_into()?,
            alternatives: record
                .alternatives
                .into_iter()
                .map(SlotValue::try_from)
                .collect::<DialogueResult<_>>()?,
            entity: record.entity,
            slot_name: record.slot_name,
            range_start: record.range_start,
            range_end: record.range_end,
            confidence_score: record.confidence_score,
        })
    }
}

fn to_slot_records(slots: &SlotMap) -> Vec<PbSlot> {
    slots.iter().map(PbSlot::from).collect()
}

fn from_slot_records(records: Vec<PbSlot>) -> DialogueResult<SlotMap> {
    records
        .into_iter()
        .map(Slot::try_from)
        .collect::<DialogueResult<Vec<_>>>()
        .map(SlotMap::from)
}

// ---------------------------------------------------------------------------
// Intents

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbIntentClassifierResult {
    #[prost(string, tag = "1")]
    pub intent_name: String,
    #[prost(float, tag = "2")]
    pub confidence_score: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbIntentAlternative {
    #[prost(string, optional, tag = "1")]
    pub intent_name: Option<String>,
    #[prost(float, tag = "2")]
    pub confidence_score: f32,
    #[prost(message, repeated, tag = "3")]
    pub slots: Vec<PbSlot>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbIntentAlternatives {
    #[prost(message, repeated, tag = "1")]
    pub alternatives: Vec<PbIntentAlternative>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbAsrToken {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(float, tag = "2")]
    pub confidence: f32,
    #[prost(int32, tag = "3")]
    pub range_start: i32,
    #[prost(int32, tag = "4")]
    pub range_end: i32,
    #[prost(float, tag = "5")]
    pub time_start: f32,
    #[prost(float, tag = "6")]
    pub time_end: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbAsrTokenList {
    #[prost(message, repeated, tag = "1")]
    pub tokens: Vec<PbAsrToken>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbAsrTokenMatrix {
    #[prost(message, repeated, tag = "1")]
    pub passes: Vec<PbAsrTokenList>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbIntent {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, optional, tag = "2")]
    pub custom_data: Option<String>,
    #[prost(string, tag = "3")]
    pub site_id: String,
    #[prost(string, tag = "4")]
    pub input: String,
    #[prost(message, optional, tag = "5")]
    pub intent: Option<PbIntentClassifierResult>,
    #[prost(message, repeated, tag = "6")]
    pub slots: Vec<PbSlot>,
    #[prost(message, optional, tag = "7")]
    pub alternatives: Option<PbIntentAlternatives>,
    #[prost(message, optional, tag = "8")]
    pub asr_tokens: Option<PbAsrTokenMatrix>,
    #[prost(float, optional, tag = "9")]
    pub asr_confidence: Option<f32>,
}

impl WireMessage for IntentMessage {
    const NAME: &'static str = "IntentMessage";
    type Structured = PbIntent;

    fn to_structured(&self) -> PbIntent {
        PbIntent {
            session_id: self.session_id.clone(),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
            input: self.input.clone(),
            intent: Some(PbIntentClassifierResult {
                intent_name: self.intent.intent_name.clone(),
                confidence_score: self.intent.confidence_score,
            }),
            slots: to_slot_records(&self.slots),
            alternatives: self.alternatives.as_ref().map(|alternatives| {
                PbIntentAlternatives {
                    alternatives: alternatives
                        .iter()
                        .map(|alt| PbIntentAlternative {
                            intent_name: alt.intent_name.clone(),
                            confidence_score: alt.confidence_score,
                            slots: to_slot_records(&alt.slots),
                        })
                        .collect(),
                }
            }),
            asr_tokens: self.asr_tokens.as_ref().map(|matrix| PbAsrTokenMatrix {
                passes: matrix
                    .iter()
                    .map(|pass| PbAsrTokenList {
                        tokens: pass
                            .iter()
                            .map(|token| PbAsrToken {
                                value: token.value.clone(),
                                confidence: token.confidence,
                                range_start: token.range_start,
                                range_end: token.range_end,
                                time_start: token.time.start,
                                time_end: token.time.end,
                            })
                            .collect(),
                    })
                    .collect(),
            }),
            asr_confidence: self.asr_confidence,
        }
    }

    fn from_structured(record: PbIntent) -> DialogueResult<Self> {
        let intent = required(record.intent, "intent")?;
        let alternatives = match record.alternatives {
            Some(list) => Some(
                list.alternatives
                    .into_iter()
                    .map(|alt| {
                        Ok(IntentAlternative {
                            intent_name: alt.intent_name,
                            confidence_score: alt.confidence_score,
                            slots: from_slot_records(alt.slots)?,
                        })
                    })
                    .collect::<DialogueResult<Vec<_>>>()?,
            ),
            None => None,
        };
        let asr_tokens = record.asr_tokens.map(|matrix| {
            matrix
                .passes
                .into_iter()
                .map(|pass| {
                    pass.tokens
                        .into_iter()
                        .map(|token| AsrToken {
                            value: token.value,
                            confidence: token.confidence,
                            range_start: token.range_start,
                            range_end: token.range_end,
                            time: AsrDecodingDuration {
                                start: token.time_start,
                                end: token.time_end,
                            },
                        })
                        .collect()
                })
                .collect()
        });

        Ok(IntentMessage {
            session_id: record.session_id,
            custom_data: record.custom_data,
            site_id: record.site_id,
            input: record.input,
            intent: IntentClassifierResult {
                intent_name: intent.intent_name,
                confidence_score: intent.confidence_score,
            },
            slots: from_slot_records(record.slots)?,
            alternatives,
            asr_tokens,
            asr_confidence: record.asr_confidence,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbIntentNotRecognized {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, optional, tag = "2")]
    pub custom_data: Option<String>,
    #[prost(string, tag = "3")]
    pub site_id: String,
    #[prost(string, optional, tag = "4")]
    pub input: Option<String>,
    #[prost(float, tag = "5")]
    pub confidence_score: f32,
}

impl WireMessage for IntentNotRecognizedMessage {
    const NAME: &'static str = "IntentNotRecognizedMessage";
    type Structured = PbIntentNotRecognized;

    fn to_structured(&self) -> PbIntentNotRecognized {
        PbIntentNotRecognized {
            session_id: self.session_id.clone(),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
            input: self.input.clone(),
            confidence_score: self.confidence_score,
        }
    }

    fn from_structured(record: PbIntentNotRecognized) -> DialogueResult<Self> {
        Ok(IntentNotRecognizedMessage {
            session_id: record.session_id,
            custom_data: record.custom_data,
            site_id: record.site_id,
            input: record.input,
            confidence_score: record.confidence_score,
        })
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle

const INIT_ACTION: i32 = 0;
const INIT_NOTIFICATION: i32 = 1;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSessionInit {
    #[prost(int32, tag = "1")]
    pub kind: i32,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub intent_filter: Option<PbStringList>,
    #[prost(bool, tag = "4")]
    pub can_be_enqueued: bool,
    #[prost(bool, tag = "5")]
    pub send_intent_not_recognized: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbStartSession {
    #[prost(message, optional, tag = "1")]
    pub init: Option<PbSessionInit>,
    #[prost(string, optional, tag = "2")]
    pub custom_data: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub site_id: Option<String>,
}

impl WireMessage for StartSessionMessage {
    const NAME: &'static str = "StartSessionMessage";
    type Structured = PbStartSession;

    fn to_structured(&self) -> PbStartSession {
        let init = match &self.init {
            SessionInit::Action {
                text,
                intent_filter,
                can_be_enqueued,
                send_intent_not_recognized,
            } => PbSessionInit {
                kind: INIT_ACTION,
                text: text.clone(),
                intent_filter: to_string_list(intent_filter),
                can_be_enqueued: *can_be_enqueued,
                send_intent_not_recognized: *send_intent_not_recognized,
            },
            SessionInit::Notification { text } => PbSessionInit {
                kind: INIT_NOTIFICATION,
                text: Some(text.clone()),
                ..Default::default()
            },
        };
        PbStartSession {
            init: Some(init),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
        }
    }

    fn from_structured(record: PbStartSession) -> DialogueResult<Self> {
        let init = required(record.init, "init")?;
        let init = match init.kind {
            INIT_ACTION => SessionInit::Action {
                text: init.text,
                intent_filter: init.intent_filter.map(|list| list.values),
                can_be_enqueued: init.can_be_enqueued,
                send_intent_not_recognized: init.send_intent_not_recognized,
            },
            INIT_NOTIFICATION => SessionInit::Notification {
                text: required(init.text, "init.text")?,
            },
            other => {
                return Err(DialogueError::MalformedRequest(format!(
                    "unknown session init type {other}"
                )));
            }
        };
        Ok(StartSessionMessage {
            init,
            custom_data: record.custom_data,
            site_id: record.site_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbContinueSession {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, tag = "2")]
    pub text: String,
    #[prost(message, optional, tag = "3")]
    pub intent_filter: Option<PbStringList>,
    #[prost(string, optional, tag = "4")]
    pub custom_data: Option<String>,
    #[prost(bool, tag = "5")]
    pub send_intent_not_recognized: bool,
    #[prost(string, optional, tag = "6")]
    pub slot: Option<String>,
}

impl WireMessage for ContinueSessionMessage {
    const NAME: &'static str = "ContinueSessionMessage";
    type Structured = PbContinueSession;

    fn to_structured(&self) -> PbContinueSession {
        PbContinueSession {
            session_id: self.session_id.clone(),
            text: self.text.clone(),
            intent_filter: to_string_list(&self.intent_filter),
            custom_data: self.custom_data.clone(),
            send_intent_not_recognized: self.send_intent_not_recognized,
            slot: self.slot.clone(),
        }
    }

    fn from_structured(record: PbContinueSession) -> DialogueResult<Self> {
        Ok(ContinueSessionMessage {
            session_id: record.session_id,
            text: record.text,
            intent_filter: record.intent_filter.map(|list| list.values),
            custom_data: record.custom_data,
            send_intent_not_recognized: record.send_intent_not_recognized,
            slot: record.slot,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbEndSession {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
}

impl WireMessage for EndSessionMessage {
    const NAME: &'static str = "EndSessionMessage";
    type Structured = PbEndSession;

    fn to_structured(&self) -> PbEndSession {
        PbEndSession {
            session_id: self.session_id.clone(),
            text: self.text.clone(),
        }
    }

    fn from_structured(record: PbEndSession) -> DialogueResult<Self> {
        Ok(EndSessionMessage {
            session_id: record.session_id,
            text: record.text,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSessionStarted {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, optional, tag = "2")]
    pub custom_data: Option<String>,
    #[prost(string, tag = "3")]
    pub site_id: String,
    #[prost(string, optional, tag = "4")]
    pub reactivated_from_session_id: Option<String>,
}

impl WireMessage for SessionStartedMessage {
    const NAME: &'static str = "SessionStartedMessage";
    type Structured = PbSessionStarted;

    fn to_structured(&self) -> PbSessionStarted {
        PbSessionStarted {
            session_id: self.session_id.clone(),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
            reactivated_from_session_id: self.reactivated_from_session_id.clone(),
        }
    }

    fn from_structured(record: PbSessionStarted) -> DialogueResult<Self> {
        Ok(SessionStartedMessage {
            session_id: record.session_id,
            custom_data: record.custom_data,
            site_id: record.site_id,
            reactivated_from_session_id: record.reactivated_from_session_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSessionQueued {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, optional, tag = "2")]
    pub custom_data: Option<String>,
    #[prost(string, tag = "3")]
    pub site_id: String,
}

impl WireMessage for SessionQueuedMessage {
    const NAME: &'static str = "SessionQueuedMessage";
    type Structured = PbSessionQueued;

    fn to_structured(&self) -> PbSessionQueued {
        PbSessionQueued {
            session_id: self.session_id.clone(),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
        }
    }

    fn from_structured(record: PbSessionQueued) -> DialogueResult<Self> {
        Ok(SessionQueuedMessage {
            session_id: record.session_id,
            custom_data: record.custom_data,
            site_id: record.site_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSessionTermination {
    #[prost(uint32, tag = "1")]
    pub termination_type: u32,
    #[prost(string, optional, tag = "2")]
    pub data: Option<String>,
}

impl From<&SessionTermination> for PbSessionTermination {
    fn from(termination: &SessionTermination) -> Self {
        let termination_type = match termination {
            SessionTermination::Nominal => 1,
            SessionTermination::SiteUnavailable => 2,
            SessionTermination::AbortedByUser => 3,
            SessionTermination::IntentNotRecognized => 4,
            SessionTermination::Timeout { .. } => 5,
            SessionTermination::Error { .. } => 6,
        };
        PbSessionTermination {
            termination_type,
            data: termination.data(),
        }
    }
}

impl TryFrom<PbSessionTermination> for SessionTermination {
    type Error = DialogueError;

    fn try_from(record: PbSessionTermination) -> DialogueResult<Self> {
        let termination = match record.termination_type {
            1 => SessionTermination::Nominal,
            2 => SessionTermination::SiteUnavailable,
            3 => SessionTermination::AbortedByUser,
            4 => SessionTermination::IntentNotRecognized,
            5 => SessionTermination::Timeout {
                component: record.data.as_deref().map(parse_component).transpose()?,
            },
            6 => SessionTermination::Error {
                error: required(record.data, "termination.data")?,
            },
            other => {
                return Err(DialogueError::MalformedRequest(format!(
                    "unknown termination type {other}"
                )));
            }
        };
        Ok(termination)
    }
}

fn parse_component(name: &str) -> DialogueResult<Component> {
    name.parse()
        .map_err(|_| DialogueError::MalformedRequest(format!("unknown component `{name}`")))
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSessionEnded {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, optional, tag = "2")]
    pub custom_data: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub termination: Option<PbSessionTermination>,
    #[prost(string, tag = "4")]
    pub site_id: String,
}

impl WireMessage for SessionEndedMessage {
    const NAME: &'static str = "SessionEndedMessage";
    type Structured = PbSessionEnded;

    fn to_structured(&self) -> PbSessionEnded {
        PbSessionEnded {
            session_id: self.session_id.clone(),
            custom_data: self.custom_data.clone(),
            termination: Some(PbSessionTermination::from(&self.termination)),
            site_id: self.site_id.clone(),
        }
    }

    fn from_structured(record: PbSessionEnded) -> DialogueResult<Self> {
        Ok(SessionEndedMessage {
            session_id: record.session_id,
            custom_data: record.custom_data,
            termination: required(record.termination, "termination")?.try_into()?,
            site_id: record.site_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbDialogueConfigureIntent {
    #[prost(string, tag = "1")]
    pub intent_id: String,
    #[prost(bool, optional, tag = "2")]
    pub enable: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbDialogueConfigureIntents {
    #[prost(message, repeated, tag = "1")]
    pub intents: Vec<PbDialogueConfigureIntent>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbDialogueConfigure {
    #[prost(string, optional, tag = "1")]
    pub site_id: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub intents: Option<PbDialogueConfigureIntents>,
}

impl WireMessage for DialogueConfigureMessage {
    const NAME: &'static str = "DialogueConfigureMessage";
    type Structured = PbDialogueConfigure;

    fn to_structured(&self) -> PbDialogueConfigure {
        PbDialogueConfigure {
            site_id: self.site_id.clone(),
            intents: self.intents.as_ref().map(|intents| PbDialogueConfigureIntents {
                intents: intents
                    .iter()
                    .map(|intent| PbDialogueConfigureIntent {
                        intent_id: intent.intent_id.clone(),
                        enable: intent.enable,
                    })
                    .collect(),
            }),
        }
    }

    fn from_structured(record: PbDialogueConfigure) -> DialogueResult<Self> {
        Ok(DialogueConfigureMessage {
            site_id: record.site_id,
            intents: record.intents.map(|list| {
                list.intents
                    .into_iter()
                    .map(|intent| DialogueConfigureIntent {
                        intent_id: intent.intent_id,
                        enable: intent.enable,
                    })
                    .collect()
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Platform

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSite {
    #[prost(string, tag = "1")]
    pub site_id: String,
    #[prost(string, optional, tag = "2")]
    pub session_id: Option<String>,
}

impl WireMessage for SiteMessage {
    const NAME: &'static str = "SiteMessage";
    type Structured = PbSite;

    fn to_structured(&self) -> PbSite {
        PbSite {
            site_id: self.site_id.clone(),
            session_id: self.session_id.clone(),
        }
    }

    fn from_structured(record: PbSite) -> DialogueResult<Self> {
        Ok(SiteMessage {
            site_id: record.site_id,
            session_id: record.session_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSessionTimeout {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, tag = "2")]
    pub component: String,
}

impl WireMessage for SessionTimeoutMessage {
    const NAME: &'static str = "SessionTimeoutMessage";
    type Structured = PbSessionTimeout;

    fn to_structured(&self) -> PbSessionTimeout {
        PbSessionTimeout {
            session_id: self.session_id.clone(),
            component: self.component.to_string(),
        }
    }

    fn from_structured(record: PbSessionTimeout) -> DialogueResult<Self> {
        Ok(SessionTimeoutMessage {
            session_id: record.session_id,
            component: parse_component(&record.component)?,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbError {
    #[prost(string, optional, tag = "1")]
    pub session_id: Option<String>,
    #[prost(string, tag = "2")]
    pub error: String,
    #[prost(string, optional, tag = "3")]
    pub context: Option<String>,
}

impl WireMessage for ErrorMessage {
    const NAME: &'static str = "ErrorMessage";
    type Structured = PbError;

    fn to_structured(&self) -> PbError {
        PbError {
            session_id: self.session_id.clone(),
            error: self.error.clone(),
            context: self.context.clone(),
        }
    }

    fn from_structured(record: PbError) -> DialogueResult<Self> {
        Ok(ErrorMessage {
            session_id: record.session_id,
            error: record.error,
            context: record.context,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSay {
    #[prost(string, tag = "1")]
    pub text: String,
    #[prost(string, optional, tag = "2")]
    pub lang: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub id: Option<String>,
    #[prost(string, tag = "4")]
    pub site_id: String,
    #[prost(string, optional, tag = "5")]
    pub session_id: Option<String>,
}

impl WireMessage for SayMessage {
    const NAME: &'static str = "SayMessage";
    type Structured = PbSay;

    fn to_structured(&self) -> PbSay {
        PbSay {
            text: self.text.clone(),
            lang: self.lang.clone(),
            id: self.id.clone(),
            site_id: self.site_id.clone(),
            session_id: self.session_id.clone(),
        }
    }

    fn from_structured(record: PbSay) -> DialogueResult<Self> {
        Ok(SayMessage {
            text: record.text,
            lang: record.lang,
            id: record.id,
            site_id: record.site_id,
            session_id: record.session_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbSayFinished {
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub session_id: Option<String>,
}

impl WireMessage for SayFinishedMessage {
    const NAME: &'static str = "SayFinishedMessage";
    type Structured = PbSayFinished;

    fn to_structured(&self) -> PbSayFinished {
        PbSayFinished {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
        }
    }

    fn from_structured(record: PbSayFinished) -> DialogueResult<Self> {
        Ok(SayFinishedMessage {
            id: record.id,
            session_id: record.session_id,
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbRegisterSound {
    #[prost(string, tag = "1")]
    pub sound_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub wav_sound: Vec<u8>,
}

impl WireMessage for RegisterSoundMessage {
    const NAME: &'static str = "RegisterSoundMessage";
    type Structured = PbRegisterSound;

    fn to_structured(&self) -> PbRegisterSound {
        PbRegisterSound {
            sound_id: self.sound_id.clone(),
            wav_sound: self.wav_sound.clone(),
        }
    }

    fn from_structured(record: PbRegisterSound) -> DialogueResult<Self> {
        Ok(RegisterSoundMessage {
            sound_id: record.sound_id,
            wav_sound: record.wav_sound,
        })
    }
}

// ---------------------------------------------------------------------------
// Injection

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbEntityValue {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(uint32, tag = "2")]
    pub weight: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbEntityValues {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<PbEntityValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbInjectionOperation {
    #[prost(int32, tag = "1")]
    pub kind: i32,
    #[prost(btree_map = "string, message", tag = "2")]
    pub values: BTreeMap<String, PbEntityValues>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbInjectionRequest {
    #[prost(message, repeated, tag = "1")]
    pub operations: Vec<PbInjectionOperation>,
    #[prost(btree_map = "string, message", tag = "2")]
    pub lexicon: BTreeMap<String, PbStringList>,
    #[prost(string, optional, tag = "3")]
    pub cross_language: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub id: Option<String>,
}

impl WireMessage for InjectionRequestMessage {
    const NAME: &'static str = "InjectionRequestMessage";
    type Structured = PbInjectionRequest;

    fn to_structured(&self) -> PbInjectionRequest {
        PbInjectionRequest {
            operations: self
                .operations
                .iter()
                .map(|operation| PbInjectionOperation {
                    kind: match operation.kind {
                        InjectionKind::Add => 0,
                        InjectionKind::AddFromVanilla => 1,
                    },
                    values: operation
                        .values
                        .iter()
                        .map(|(entity, values)| {
                            let values = values
                                .iter()
                                .map(|v| PbEntityValue {
                                    value: v.value.clone(),
                                    weight: v.weight,
                                })
                                .collect();
                            (entity.clone(), PbEntityValues { values })
                        })
                        .collect(),
                })
                .collect(),
            lexicon: self
                .lexicon
                .iter()
                .map(|(word, pronunciations)| {
                    let list = PbStringList {
                        values: pronunciations.clone(),
                    };
                    (word.clone(), list)
                })
                .collect(),
            cross_language: self.cross_language.clone(),
            id: self.id.clone(),
        }
    }

    fn from_structured(record: PbInjectionRequest) -> DialogueResult<Self> {
        let operations = record
            .operations
            .into_iter()
            .map(|operation| {
                let kind = match operation.kind {
                    0 => InjectionKind::Add,
                    1 => InjectionKind::AddFromVanilla,
                    other => {
                        return Err(DialogueError::MalformedRequest(format!(
                            "unknown injection kind {other}"
                        )));
                    }
                };
                let values = operation
                    .values
                    .into_iter()
                    .map(|(entity, list)| {
                        let values = list
                            .values
                            .into_iter()
                            .map(|v| EntityValue::weighted(v.value, v.weight))
                            .collect();
                        (entity, values)
                    })
                    .collect();
                Ok(InjectionOperation { kind, values })
            })
            .collect::<DialogueResult<Vec<_>>>()?;

        Ok(InjectionRequestMessage {
            operations,
            lexicon: record
                .lexicon
                .into_iter()
                .map(|(word, list)| (word, list.values))
                .collect(),
            cross_language: record.cross_language,
            id: record.id,
        })
    }
}

/// Record shared by the messages that only carry a request id
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbRequestId {
    #[prost(string, optional, tag = "1")]
    pub request_id: Option<String>,
}

macro_rules! request_id_message {
    ($($message:ident),+ $(,)?) => {
        $(
            impl WireMessage for $message {
                const NAME: &'static str = stringify!($message);
                type Structured = PbRequestId;

                fn to_structured(&self) -> PbRequestId {
                    PbRequestId {
                        request_id: self.request_id.clone(),
                    }
                }

                fn from_structured(record: PbRequestId) -> DialogueResult<Self> {
                    Ok($message {
                        request_id: record.request_id,
                    })
                }
            }
        )+
    };
}

request_id_message!(
    InjectionCompleteMessage,
    InjectionResetRequestMessage,
    InjectionResetCompleteMessage,
);

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbInjectionStatus {
    /// RFC 3339 timestamp
    #[prost(string, optional, tag = "1")]
    pub last_injection_date: Option<String>,
}

impl WireMessage for InjectionStatusMessage {
    const NAME: &'static str = "InjectionStatusMessage";
    type Structured = PbInjectionStatus;

    fn to_structured(&self) -> PbInjectionStatus {
        PbInjectionStatus {
            last_injection_date: self
                .last_injection_date
                .map(|date| date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }

    fn from_structured(record: PbInjectionStatus) -> DialogueResult<Self> {
        let last_injection_date = record
            .last_injection_date
            .map(|date| {
                DateTime::parse_from_rfc3339(&date)
                    .map(|date| date.with_timezone(&Utc))
                    .map_err(|e| {
                        DialogueError::MalformedRequest(format!("invalid injection date: {e}"))
                    })
            })
            .transpose()?;
        Ok(InjectionStatusMessage { last_injection_date })
    }
}
