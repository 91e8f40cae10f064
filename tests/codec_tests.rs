//! Wire codec tests over both encodings

use chrono::{TimeZone, Utc};
use dialogue_engine::codec::structured::{
    PbIntent, PbIntentClassifierResult, PbSlot, PbSlotValue,
};
use dialogue_engine::{
    AmountOfMoneyValue, AsrToken, Component, ContinueSessionMessage, DialogueConfiguration,
    DialogueConfigureIntent, DialogueConfigureMessage, DialogueError, DurationValue,
    EndSessionMessage, EntityValue, ErrorMessage, Grain, InjectionCompleteMessage,
    InjectionRequestBuilder, InjectionResetCompleteMessage, InjectionResetRequestMessage,
    InjectionStatusMessage, InstantTimeValue, IntentAlternative, IntentClassifierResult,
    IntentMessage, IntentNotRecognizedMessage, Precision, RegisterSoundMessage,
    SayFinishedMessage, SayMessage, SessionEndedMessage, SessionInit, SessionQueuedMessage,
    SessionStartedMessage, SessionTermination, SessionTimeoutMessage, SiteMessage, Slot,
    SlotMap, SlotValue, StartSessionMessage, TemperatureValue, TimeIntervalValue, WireFormat,
    WireMessage,
};
use prost::Message;
use std::fmt::Debug;

const FORMATS: [WireFormat; 2] = [WireFormat::Structured, WireFormat::Json];

fn round_trip<M: WireMessage + PartialEq + Debug>(message: &M) {
    for format in FORMATS {
        let payload = format.encode(message).unwrap();
        let decoded: M = format.decode(&payload).unwrap();
        assert_eq!(&decoded, message, "{format:?} round trip changed the message");
    }
}

fn every_slot_kind() -> Vec<SlotValue> {
    vec![
        SlotValue::Custom("margherita".into()),
        SlotValue::Number(2.0),
        SlotValue::Ordinal(3),
        SlotValue::InstantTime(InstantTimeValue {
            value: "2026-10-16T19:00:00+02:00".into(),
            grain: Grain::Hour,
            precision: Precision::Exact,
        }),
        SlotValue::TimeInterval(TimeIntervalValue {
            from: Some("2026-10-16T18:00:00+02:00".into()),
            to: None,
        }),
        SlotValue::AmountOfMoney(AmountOfMoneyValue {
            value: 12.5,
            precision: Precision::Approximate,
            unit: Some("EUR".into()),
        }),
        SlotValue::Temperature(TemperatureValue {
            value: 21.5,
            unit: None,
        }),
        SlotValue::Duration(DurationValue {
            hours: 1,
            minutes: 30,
            ..Default::default()
        }),
        SlotValue::Percentage(25.0),
        SlotValue::MusicArtist("Nina Simone".into()),
        SlotValue::MusicAlbum("Pastel Blues".into()),
        SlotValue::MusicTrack("Sinnerman".into()),
        SlotValue::City("Paris".into()),
        SlotValue::Country("France".into()),
        SlotValue::Region("Brittany".into()),
    ]
}

#[test]
fn test_intent_with_every_slot_kind_round_trips() {
    // Setup
    let slots: SlotMap = every_slot_kind()
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            Slot::new(format!("slot{i:02}"), "entity", "raw", value)
                .with_range(0, 3)
                .with_confidence(0.75)
        })
        .collect();
    let mut intent = IntentMessage::new(
        "session-1",
        "kitchen",
        "a large margherita",
        IntentClassifierResult::new("order", 0.9),
    )
    .with_slots(slots);
    intent.custom_data = Some("table 4".into());
    intent.alternatives = Some(vec![
        IntentAlternative {
            intent_name: Some("cancel".into()),
            confidence_score: 0.25,
            slots: SlotMap::new(),
        },
        IntentAlternative {
            intent_name: None,
            confidence_score: 0.125,
            slots: SlotMap::from(vec![
                Slot::new("size", "size", "large", SlotValue::Custom("large".into()))
                    .with_alternatives(vec![SlotValue::Custom("big".into())]),
            ]),
        },
    ]);
    intent.asr_tokens = Some(vec![
        vec![
            AsrToken::new("a", 0.5, 0, 1).spoken_between(0.0, 0.25),
            AsrToken::new("large", 0.75, 2, 7).spoken_between(0.25, 0.5),
        ],
        vec![AsrToken::new("charge", 0.25, 2, 8)],
    ]);
    intent.asr_confidence = Some(0.875);

    // Execute + Verify
    assert_eq!(intent.slots.len(), 15);
    round_trip(&intent);
}

#[test]
fn test_repeated_slot_keeps_every_occurrence_in_order() {
    let slots = SlotMap::from(vec![
        Slot::new("size", "size", "large", SlotValue::Custom("large".into()))
            .with_confidence(0.9),
        Slot::new("topping", "topping", "ham", SlotValue::Custom("ham".into())),
        Slot::new("size", "size", "small", SlotValue::Custom("small".into()))
            .with_confidence(0.4),
    ]);
    let intent = IntentMessage::new(
        "session-1",
        "kitchen",
        "a large ham and a small",
        IntentClassifierResult::new("order", 0.8),
    )
    .with_slots(slots);

    for format in FORMATS {
        let decoded: IntentMessage = format.decode(&format.encode(&intent).unwrap()).unwrap();
        let sizes = &decoded.slots["size"];
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes.all()[0].raw_value, "large");
        assert_eq!(sizes.all()[1].raw_value, "small");
        assert_eq!(sizes.all()[0].confidence(), Some(0.9));
        assert_eq!(sizes.all()[1].confidence(), Some(0.4));
        assert_eq!(
            sizes.first().map(|slot| &slot.value),
            Some(&SlotValue::Custom("large".into()))
        );
        assert!(decoded.slots["crust"].is_empty());
    }
}

#[test]
fn test_unknown_slot_kind_is_reported_in_json() {
    let payload = br#"{
        "sessionId": "session-1",
        "customData": null,
        "siteId": "kitchen",
        "input": "fly me to mars",
        "intent": {"intentName": "travel", "confidenceScore": 0.5},
        "slots": [{
            "rawValue": "mars",
            "value": {"kind": "Planet", "value": "Mars"},
            "entity": "planet",
            "slotName": "destination",
            "rangeStart": 10,
            "rangeEnd": 14
        }],
        "alternatives": null,
        "asrTokens": null,
        "asrConfidence": null
    }"#;

    match WireFormat::Json.decode::<IntentMessage>(payload) {
        Err(DialogueError::UnknownSlotValueType(kind)) => assert_eq!(kind, "Planet"),
        other => panic!("unexpected decode result {other:?}"),
    }
}

#[test]
fn test_unknown_slot_kind_is_reported_in_structured() {
    let record = PbIntent {
        session_id: "session-1".into(),
        site_id: "kitchen".into(),
        input: "fly me to mars".into(),
        intent: Some(PbIntentClassifierResult {
            intent_name: "travel".into(),
            confidence_score: 0.5,
        }),
        slots: vec![PbSlot {
            raw_value: "mars".into(),
            value: Some(PbSlotValue {
                value_type: 99,
                text: Some("Mars".into()),
                ..Default::default()
            }),
            entity: "planet".into(),
            slot_name: "destination".into(),
            ..Default::default()
        }],
        ..Default::default()
    };

    let payload = record.encode_to_vec();
    match WireFormat::Structured.decode::<IntentMessage>(&payload) {
        Err(DialogueError::UnknownSlotValueType(tag)) => assert_eq!(tag, "99"),
        other => panic!("unexpected decode result {other:?}"),
    }
}

#[test]
fn test_missing_slot_confidence_defaults_to_unknown() {
    let payload = br#"{
        "rawValue": "two",
        "value": {"kind": "Number", "value": 2.0},
        "entity": "snips/number",
        "slotName": "count",
        "rangeStart": 0,
        "rangeEnd": 3
    }"#;
    let slot: Slot = serde_json::from_slice(payload).unwrap();
    assert_eq!(slot.confidence(), None);
    assert!(slot.alternatives.is_empty());
}

#[test]
fn test_session_requests_round_trip() {
    round_trip(
        &StartSessionMessage::new(SessionInit::Action {
            text: Some("what can I get you?".into()),
            intent_filter: Some(vec!["order".into(), "cancel".into()]),
            can_be_enqueued: false,
            send_intent_not_recognized: true,
        })
        .on_site("kitchen")
        .with_custom_data("table 4"),
    );
    round_trip(&StartSessionMessage::new(SessionInit::notification(
        "your pizza is ready",
    )));
    round_trip(
        &ContinueSessionMessage::new("session-1", "which size?")
            .with_intent_filter(["order"])
            .with_slot("size")
            .sending_intent_not_recognized(),
    );
    round_trip(&EndSessionMessage {
        session_id: "session-1".into(),
        text: Some("enjoy".into()),
    });
}

#[test]
fn test_session_events_round_trip() {
    round_trip(&SessionStartedMessage {
        session_id: "session-2".into(),
        custom_data: Some("table 4".into()),
        site_id: "kitchen".into(),
        reactivated_from_session_id: Some("session-1".into()),
    });
    round_trip(&SessionStartedMessage {
        session_id: "session-2".into(),
        custom_data: None,
        site_id: "kitchen".into(),
        reactivated_from_session_id: None,
    });
    round_trip(&SessionQueuedMessage {
        session_id: "session-3".into(),
        custom_data: Some(String::new()),
        site_id: "kitchen".into(),
    });
    round_trip(&SessionTimeoutMessage {
        session_id: "session-3".into(),
        component: Component::Nlu,
    });
}

#[test]
fn test_not_recognized_keeps_absent_and_empty_input_apart() {
    let mut message = IntentNotRecognizedMessage {
        session_id: "session-1".into(),
        custom_data: None,
        site_id: "kitchen".into(),
        input: None,
        confidence_score: 0.25,
    };
    round_trip(&message);

    message.input = Some(String::new());
    round_trip(&message);
    for format in FORMATS {
        let decoded: IntentNotRecognizedMessage =
            format.decode(&format.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded.input.as_deref(), Some(""));
    }
}

#[test]
fn test_platform_messages_round_trip() {
    round_trip(&SiteMessage::new("kitchen"));
    round_trip(&SiteMessage {
        site_id: "kitchen".into(),
        session_id: Some("session-1".into()),
    });
    round_trip(&ErrorMessage {
        session_id: None,
        error: "oven on fire".into(),
        context: Some("startSession".into()),
    });
    round_trip(&ErrorMessage {
        session_id: Some("session-1".into()),
        error: String::new(),
        context: None,
    });
    round_trip(&SayMessage {
        text: "your pizza is ready".into(),
        lang: Some("en".into()),
        id: Some("say-1".into()),
        site_id: "kitchen".into(),
        session_id: None,
    });
    round_trip(&SayFinishedMessage {
        id: Some("say-1".into()),
        session_id: Some("session-1".into()),
    });
    round_trip(&SayFinishedMessage {
        id: None,
        session_id: None,
    });
}

#[test]
fn test_configure_message_keeps_unset_fields() {
    round_trip(&DialogueConfigureMessage {
        site_id: None,
        intents: Some(vec![
            DialogueConfigureIntent {
                intent_id: "order".into(),
                enable: None,
            },
            DialogueConfigureIntent {
                intent_id: "cancel".into(),
                enable: Some(false),
            },
        ]),
    });
    round_trip(&DialogueConfigureMessage {
        site_id: Some("kitchen".into()),
        intents: None,
    });
    round_trip(&DialogueConfigureMessage {
        site_id: Some("kitchen".into()),
        intents: Some(Vec::new()),
    });
}

#[test]
fn test_every_termination_round_trips() {
    let terminations = [
        SessionTermination::Nominal,
        SessionTermination::SiteUnavailable,
        SessionTermination::AbortedByUser,
        SessionTermination::IntentNotRecognized,
        SessionTermination::Timeout {
            component: Some(Component::Tts),
        },
        SessionTermination::Timeout { component: None },
        SessionTermination::Error {
            error: "oven on fire".into(),
        },
    ];

    for termination in terminations {
        round_trip(&SessionEndedMessage {
            session_id: "session-1".into(),
            custom_data: None,
            termination,
            site_id: "kitchen".into(),
        });
    }
}

#[test]
fn test_configuration_last_toggle_wins() {
    // Setup
    let configuration = DialogueConfiguration::new()
        .disable_intent("order")
        .enable_intent("order");

    // Execute
    let messages = configuration.build();

    // Verify
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].site_id, None);
    let intents = messages[0].intents.as_ref().unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].intent_id, "order");
    assert_eq!(intents[0].enable, Some(true));
    round_trip(&messages[0]);
}

#[test]
fn test_injection_messages_round_trip() {
    let request = InjectionRequestBuilder::new()
        .with_id("req-1")
        .add("dish", ["pizza", "calzone"])
        .add_from_vanilla("topping", [EntityValue::weighted("anchovies", 3)])
        .pronounce("calzone", ["k a l t s o n e"])
        .cross_language("it")
        .build();
    assert_eq!(request.operations.len(), 2);
    round_trip(&request);

    round_trip(&InjectionCompleteMessage {
        request_id: Some("req-1".into()),
    });
    round_trip(&InjectionStatusMessage {
        last_injection_date: Some(Utc.with_ymd_and_hms(2026, 10, 16, 12, 30, 0).unwrap()),
    });
    round_trip(&InjectionStatusMessage {
        last_injection_date: None,
    });
    round_trip(&InjectionResetRequestMessage {
        request_id: Some("reset-1".into()),
    });
    round_trip(&InjectionResetRequestMessage { request_id: None });
    round_trip(&InjectionResetCompleteMessage {
        request_id: Some("reset-1".into()),
    });
}

#[test]
fn test_register_sound_round_trips_binary_payload() {
    let sound = RegisterSoundMessage {
        sound_id: "ding".into(),
        wav_sound: vec![0x52, 0x49, 0x46, 0x46, 0x00, 0xff, 0x10],
    };
    round_trip(&sound);

    let json: serde_json::Value =
        serde_json::from_slice(&WireFormat::Json.encode(&sound).unwrap()).unwrap();
    assert!(json["wavSound"].is_string());
}
