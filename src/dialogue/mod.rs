//! Dialogue router
//!
//! Maps a recognized intent and its slots to a banking action, a screen
//! route and a spoken reply. `route_turn` is pure; [`DialogueService`] wires
//! it to transcription, synthesis and the session trace.

use crate::clock::Clock;
use crate::models::SessionRecord;
use crate::session::{UserLocks, HOME_ROUTE};
use crate::speech::{
    IntentClassifier, IntentResult, Slots, Speech, SpeechToText, TextToSpeech,
};
use crate::store::BankStore;
use crate::voice::decode_audio;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Field hint sent by a focused form input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContext {
    Amount,
    Recipient,
}

impl FieldContext {
    /// Unknown hints are ignored rather than rejected.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("amount") => Some(FieldContext::Amount),
            Some("recipient") => Some(FieldContext::Recipient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldContext::Amount => "amount",
            FieldContext::Recipient => "recipient",
        }
    }
}

/// Router output for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueReply {
    pub text: String,
    pub next_action: String,
    pub route: String,
    pub suggestions: Vec<String>,
    pub field_to_focus: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueMetadata {
    pub route: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialoguePayload {
    pub text: String,
    pub next_action: String,
    pub metadata: DialogueMetadata,
    pub suggestions: Vec<String>,
}

/// Everything the client needs to render and speak one turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceTurn {
    pub transcript: String,
    pub intent: String,
    pub slots: Slots,
    pub dialogue: DialoguePayload,
    pub tts: Speech,
    pub confidence: f64,
}

struct IntentRoute {
    intent: &'static str,
    action: &'static str,
    route: &'static str,
    suggestions: &'static [&'static str],
}

const ROUTES: &[IntentRoute] = &[
    IntentRoute {
        intent: "transfer",
        action: "collect_transfer_details",
        route: "/transfer",
        suggestions: &["Use last beneficiary", "Validate IFSC"],
    },
    IntentRoute {
        intent: "balance",
        action: "show_balance",
        route: "/balance",
        suggestions: &["Show last statement"],
    },
    IntentRoute {
        intent: "history",
        action: "show_history",
        route: "/transactions",
        suggestions: &["Filter by last week"],
    },
    IntentRoute {
        intent: "loan",
        action: "show_loans",
        route: "/loans",
        suggestions: &["Show EMI schedule"],
    },
    IntentRoute {
        intent: "reminder",
        action: "setup_reminder",
        route: "/reminders",
        suggestions: &["Make it recurring"],
    },
];

const SMALLTALK: IntentRoute = IntentRoute {
    intent: "smalltalk",
    action: "smalltalk",
    route: HOME_ROUTE,
    suggestions: &["Transfer money", "Check balance"],
};

/// Demo amount offered for a recognized amount
const DEMO_AMOUNTS: &[(u64, u64)] = &[(5_000, 1_000), (10_000, 2_000), (15_000, 3_000)];
const DEFAULT_DEMO_AMOUNT: u64 = 1_000;

/// Demo UPI handles keyed by lowercase first name
const DEMO_UPI_IDS: &[(&str, &str)] = &[
    ("rajesh", "rajesh@paytm"),
    ("alice", "alice@phonepe"),
    ("john", "john@upi"),
    ("priya", "priya@paytm"),
    ("bob", "bob@phonepe"),
    ("sarah", "sarah@upi"),
];
const DEFAULT_DEMO_UPI: &str = "demo@paytm";

/// Prefilled recipient for the recipient shortcut
pub const SHORTCUT_RECIPIENT: &str = "rajesh@paytm";

fn route_for(intent: &str) -> &'static IntentRoute {
    ROUTES.iter().find(|r| r.intent == intent).unwrap_or(&SMALLTALK)
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn demo_upi_for(counterparty: &str) -> &'static str {
    let key = counterparty.trim().to_lowercase();
    DEMO_UPI_IDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, upi)| *upi)
        .unwrap_or(DEFAULT_DEMO_UPI)
}

fn demo_amount_for(amount: f64) -> u64 {
    let whole = amount.trunc() as u64;
    DEMO_AMOUNTS
        .iter()
        .find(|(heard, _)| *heard == whole)
        .map(|(_, suggested)| *suggested)
        .unwrap_or(DEFAULT_DEMO_AMOUNT)
}

/// Map an intent and its slots to the next action, route and reply.
pub fn route_turn(intent: &str, slots: &Slots) -> DialogueReply {
    let entry = route_for(intent);
    let (text, field_to_focus) = reply_text(entry.intent, slots);
    DialogueReply {
        text,
        next_action: entry.action.to_string(),
        route: entry.route.to_string(),
        suggestions: to_strings(entry.suggestions),
        field_to_focus,
    }
}

fn reply_text(intent: &str, slots: &Slots) -> (String, Option<String>) {
    match intent {
        "transfer" => match (slots.amount, slots.counterparty.as_deref()) {
            (Some(amount), Some(counterparty)) => (
                format!(
                    "Understood: ₹{:.2} to {}. Open 'Transfer Money' on the dashboard and I will walk you through the form.",
                    amount, counterparty
                ),
                None,
            ),
            (Some(amount), None) => (
                format!(
                    "I heard ₹{:.2}. For the amount field I suggest ₹{}. Confirm or change it, then we will pick the recipient.",
                    amount,
                    demo_amount_for(amount)
                ),
                Some(FieldContext::Recipient.as_str().to_string()),
            ),
            (None, Some(counterparty)) => {
                let lower = counterparty.to_lowercase();
                (
                    format!(
                        "Sending to {}. I filled the demo UPI ID {} in the recipient field; use a similar one such as {}@paytm. How much should I send?",
                        counterparty,
                        demo_upi_for(counterparty),
                        lower
                    ),
                    Some(FieldContext::Amount.as_str().to_string()),
                )
            }
            (None, None) => (
                "Tell me the amount and the recipient, for example 'five thousand rupees' or 'send to John'. The voice buttons on each field work too."
                    .to_string(),
                Some(FieldContext::Amount.as_str().to_string()),
            ),
        },
        "balance" => ("Fetching your account balance now.".to_string(), None),
        "history" => (
            "Here are your recent transactions with amount, recipient, channel and status.".to_string(),
            None,
        ),
        "loan" => (
            "Here are your active loans with outstanding amount, EMI, rate and next due date.".to_string(),
            None,
        ),
        "reminder" => (
            "What should I remind you about, and when? Bills and EMIs both work.".to_string(),
            None,
        ),
        _ => (
            "I can transfer money, check your balance, show transactions, manage loans or set reminders. What would you like to do?"
                .to_string(),
            None,
        ),
    }
}

/// Fixed guidance for a focused form field. Skips intent inference.
pub fn field_shortcut(field: FieldContext) -> (IntentResult, DialogueReply) {
    let (text, slots, suggestions) = match field {
        FieldContext::Amount => (
            "This is the amount field. Say something like 'one thousand rupees'; ₹1000 works as a demo amount.".to_string(),
            Slots::default(),
            &["Use last amount", "Enter manually"],
        ),
        FieldContext::Recipient => (
            format!(
                "This is the recipient field. Say a name like 'rajesh' or a UPI ID; I filled {} as an example.",
                SHORTCUT_RECIPIENT
            ),
            Slots {
                amount: None,
                counterparty: Some(SHORTCUT_RECIPIENT.to_string()),
            },
            &["Use last beneficiary", "Enter manually"],
        ),
    };

    let transfer = route_for("transfer");
    (
        IntentResult {
            intent: transfer.intent.to_string(),
            slots,
            confidence: 1.0,
        },
        DialogueReply {
            text,
            next_action: transfer.action.to_string(),
            route: transfer.route.to_string(),
            suggestions: to_strings(suggestions),
            field_to_focus: Some(field.as_str().to_string()),
        },
    )
}

/// Runs a full voice turn: transcribe, classify, route, speak, record.
pub struct DialogueService {
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    nlu: Arc<dyn IntentClassifier>,
    store: Arc<dyn BankStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
}

impl DialogueService {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        nlu: Arc<dyn IntentClassifier>,
        store: Arc<dyn BankStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stt,
            tts,
            nlu,
            store,
            locks,
            clock,
        }
    }

    pub async fn process_voice_turn(
        &self,
        user_id: &str,
        audio_base64: &str,
        language: &str,
        context: Option<&str>,
    ) -> Result<VoiceTurn> {
        let audio = decode_audio(audio_base64)?;
        let transcript = self.stt.transcribe(&audio, language).await.settle("stt");

        let (intent, reply) = match FieldContext::parse(context) {
            Some(field) => field_shortcut(field),
            None => {
                let intent = self.nlu.classify(&transcript.text).await.settle("nlu");
                let reply = route_turn(&intent.intent, &intent.slots);
                (intent, reply)
            }
        };
        debug!(user_id, intent = %intent.intent, confidence = intent.confidence, "Turn routed");

        let speech = self.tts.synthesize(&reply.text, language).await.settle("tts");
        self.record(user_id, &transcript.text, &reply).await?;

        info!(user_id, action = %reply.next_action, route = %reply.route, "Voice turn processed");

        Ok(VoiceTurn {
            transcript: transcript.text,
            intent: intent.intent,
            slots: intent.slots,
            dialogue: DialoguePayload {
                text: reply.text,
                next_action: reply.next_action,
                metadata: DialogueMetadata {
                    route: reply.route,
                    confidence: intent.confidence,
                },
                suggestions: reply.suggestions,
            },
            tts: speech,
            confidence: intent.confidence,
        })
    }

    async fn record(&self, user_id: &str, user_text: &str, reply: &DialogueReply) -> Result<()> {
        let _guard = self.locks.lock(user_id).await;
        let now = self.clock.now();

        let mut session = self
            .store
            .load_session(user_id)
            .await?
            .unwrap_or_else(|| SessionRecord::new(user_id, now));

        session.state.record_turn(
            user_text,
            &reply.text,
            &reply.route,
            reply.field_to_focus.clone(),
            now,
        );
        session.touch(now);
        self.store.save_session(&session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::speech::{
        fallback_transcript, ElevenLabsSynthesizer, KeywordIntentClassifier, WhisperTranscriber,
    };
    use crate::store::InMemoryBankStore;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::time::Duration;

    fn slots(amount: Option<f64>, counterparty: Option<&str>) -> Slots {
        Slots {
            amount,
            counterparty: counterparty.map(String::from),
        }
    }

    #[test]
    fn test_routing_table() {
        let balance = route_turn("balance", &Slots::default());
        assert_eq!(balance.next_action, "show_balance");
        assert_eq!(balance.route, "/balance");
        assert_eq!(balance.suggestions, vec!["Show last statement"]);

        let history = route_turn("history", &Slots::default());
        assert_eq!(history.route, "/transactions");

        let loan = route_turn("loan", &Slots::default());
        assert_eq!(loan.next_action, "show_loans");

        let reminder = route_turn("reminder", &Slots::default());
        assert_eq!(reminder.suggestions, vec!["Make it recurring"]);
    }

    #[test]
    fn test_unknown_intent_is_smalltalk() {
        let reply = route_turn("weather", &Slots::default());
        assert_eq!(reply.next_action, "smalltalk");
        assert_eq!(reply.route, "/home");
        assert_eq!(reply.suggestions, vec!["Transfer money", "Check balance"]);
    }

    #[test]
    fn test_transfer_slot_guidance() {
        let both = route_turn("transfer", &slots(Some(500.0), Some("Rahul")));
        assert!(both.text.contains("₹500.00 to Rahul"));
        assert_eq!(both.field_to_focus, None);

        let amount = route_turn("transfer", &slots(Some(10_000.0), None));
        assert!(amount.text.contains("₹2000"));
        assert_eq!(amount.field_to_focus.as_deref(), Some("recipient"));
        assert_eq!(
            FieldContext::parse(amount.field_to_focus.as_deref()),
            Some(FieldContext::Recipient)
        );

        let odd = route_turn("transfer", &slots(Some(750.0), None));
        assert!(odd.text.contains("₹1000"));

        let payee = route_turn("transfer", &slots(None, Some("Alice")));
        assert!(payee.text.contains("alice@phonepe"));
        assert_eq!(payee.field_to_focus.as_deref(), Some("amount"));

        let stranger = route_turn("transfer", &slots(None, Some("Zed")));
        assert!(stranger.text.contains("demo@paytm"));

        let empty = route_turn("transfer", &Slots::default());
        assert_eq!(empty.next_action, "collect_transfer_details");
        assert_eq!(empty.suggestions, vec!["Use last beneficiary", "Validate IFSC"]);
    }

    #[test]
    fn test_field_shortcuts() {
        let (intent, reply) = field_shortcut(FieldContext::Recipient);
        assert_eq!(intent.intent, "transfer");
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(intent.slots.counterparty.as_deref(), Some("rajesh@paytm"));
        assert_eq!(reply.route, "/transfer");
        assert_eq!(reply.suggestions, vec!["Use last beneficiary", "Enter manually"]);

        let (intent, reply) = field_shortcut(FieldContext::Amount);
        assert!(intent.slots.is_empty());
        assert_eq!(reply.suggestions, vec!["Use last amount", "Enter manually"]);
        assert_eq!(reply.field_to_focus.as_deref(), Some("amount"));

        assert_eq!(FieldContext::parse(Some(" Amount ")), Some(FieldContext::Amount));
        assert_eq!(FieldContext::parse(Some("loans")), None);
        assert_eq!(FieldContext::parse(None), None);
    }

    fn offline_service(store: Arc<dyn BankStore>) -> DialogueService {
        let timeout = Duration::from_secs(1);
        DialogueService::new(
            Arc::new(WhisperTranscriber::new(None, "whisper-1", timeout).unwrap()),
            Arc::new(ElevenLabsSynthesizer::new(None, "voice", timeout).unwrap()),
            Arc::new(KeywordIntentClassifier),
            store,
            Arc::new(UserLocks::new()),
            Arc::new(ManualClock::starting_now()),
        )
    }

    #[tokio::test]
    async fn test_turn_records_trace_and_creates_session() {
        let store: Arc<dyn BankStore> = Arc::new(InMemoryBankStore::new());
        let dialogue = offline_service(store.clone());
        let audio = vec![7u8; 20_000];
        let encoded = STANDARD.encode(&audio);

        let turn = dialogue
            .process_voice_turn("u1", &encoded, "en", None)
            .await
            .unwrap();
        assert_eq!(turn.transcript, fallback_transcript(&audio).text);
        assert_eq!(turn.intent, "transfer");
        assert_eq!(turn.dialogue.metadata.route, "/transfer");
        assert_eq!(turn.dialogue.metadata.confidence, turn.confidence);
        assert!(turn.tts.duration_seconds >= 1.0);

        dialogue
            .process_voice_turn("u1", &encoded, "en", Some("recipient"))
            .await
            .unwrap();

        let session = store.load_session("u1").await.unwrap().unwrap();
        assert_eq!(session.state.dialog_trace.len(), 4);
        assert!(session.state.dialog_trace[0].starts_with("user:"));
        assert!(session.state.dialog_trace[1].starts_with("assistant:"));
        assert_eq!(session.state.field_to_focus.as_deref(), Some("recipient"));
    }

    #[tokio::test]
    async fn test_invalid_audio_is_rejected() {
        let store: Arc<dyn BankStore> = Arc::new(InMemoryBankStore::new());
        let dialogue = offline_service(store.clone());
        let result = dialogue.process_voice_turn("u1", "not base64!!", "en", None).await;
        assert!(result.is_err());
        assert!(store.load_session("u1").await.unwrap().is_none());
    }
}
