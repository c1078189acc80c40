//! Intent classification and slot extraction
//!
//! A zero-shot NLU endpoint ranks the intent labels; slots are always
//! pulled out locally. Without an endpoint the keyword classifier decides.

use super::{bounded, Capability, DegradedReason, IntentClassifier, IntentResult, Slots};
use crate::config::Settings;
use crate::error::BankingError;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Labels sent to the zero-shot endpoint
pub const INTENT_LABELS: &[&str] = &["Transfer", "balance", "history", "loan", "reminder"];

/// Static keyword lists, checked in order
const TRANSFER_KEYWORDS: &[&str] = &["transfer", "send", "pay", "money", "rupees", "rupee"];

const INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("balance", &["balance", "funds"]),
    ("history", &["history", "transactions"]),
    ("loan", &["loan", "emi"]),
    ("reminder", &["remind", "alert"]),
];

/// Words that follow "to"/"pay"/"send" without naming anyone
const NOT_A_NAME: &[&str] = &[
    "me", "my", "the", "a", "an", "money", "some", "it", "him", "her", "them", "account",
    "rupees", "rupee", "rs", "amount", "is", "one", "two", "three", "four", "five", "six",
    "seven", "eight", "nine", "ten", "hundred", "thousand", "make", "check", "see", "know",
    "do", "get", "go", "be", "meet", "talk", "help", "transfer", "send", "pay", "you", "us",
];

lazy_static! {
    static ref CURRENCY_AMOUNT: Regex =
        Regex::new(r"(?i)(?:₹|\$|\brs\.?|\brupees?)\s?(\d+(?:,\d{3})*(?:\.\d{1,2})?)")
            .expect("valid currency regex");
    static ref BARE_AMOUNT: Regex =
        Regex::new(r"\b(\d+(?:,\d{3})*(?:\.\d{1,2})?)\b").expect("valid number regex");
    static ref NAMED_PAYEE: Regex = Regex::new(
        r"(?:\b(?i:to|for|pay)|\b(?i:send)(?:\s+(?i:to))?)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)"
    )
    .expect("valid payee regex");
    static ref LOWERCASE_PAYEE: Regex =
        Regex::new(r"(?i)\b(?:to|for|pay|send)\s+(?:to\s+)?([a-z]+)\b").expect("valid payee regex");
}

/// Amount and counterparty from free text
pub fn extract_slots(text: &str) -> Slots {
    Slots {
        amount: extract_amount(text).or_else(|| amount_from_words(text)),
        counterparty: extract_counterparty(text),
    }
}

/// Digits with an optional currency marker: `₹1,000`, `rs. 500`, `2500`
pub fn extract_amount(text: &str) -> Option<f64> {
    CURRENCY_AMOUNT
        .captures(text)
        .or_else(|| BARE_AMOUNT.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .filter(|amount| *amount > 0.0)
}

/// Spelled-out amounts such as "two thousand five hundred".
/// Returns `None` when the words overflow.
pub fn amount_from_words(text: &str) -> Option<f64> {
    let mut total: u64 = 0;
    let mut current: u64 = 0;

    for raw in text.split_whitespace() {
        let word = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match word.as_str() {
            "hundred" => current = current.checked_mul(100)?,
            "thousand" => {
                total = total.checked_add(current.checked_mul(1_000)?)?;
                current = 0;
            }
            "rupees" | "rupee" | "rs" => {
                total = total.checked_add(current)?;
                current = 0;
            }
            other => {
                if let Some(value) = small_number(other) {
                    current = current.checked_add(value)?;
                }
            }
        }
    }

    total = total.checked_add(current)?;
    (total > 0).then_some(total as f64)
}

fn small_number(word: &str) -> Option<u64> {
    let value = match word {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

/// Payee after "to", "for", "pay" or "send (to)". Capitalized names win.
pub fn extract_counterparty(text: &str) -> Option<String> {
    if let Some(name) = NAMED_PAYEE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|name| !NOT_A_NAME.contains(&name.to_lowercase().as_str()))
    {
        return Some(name);
    }

    LOWERCASE_PAYEE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .find(|name| !NOT_A_NAME.contains(&name.to_lowercase().as_str()))
}

/// Keyword classifier used when no NLU endpoint answers
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn infer(&self, transcript: &str) -> IntentResult {
        let lower = transcript.to_lowercase();
        let slots = extract_slots(transcript);

        let (intent, confidence) = if TRANSFER_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            ("transfer", if slots.is_empty() { 0.7 } else { 0.85 })
        } else if let Some((intent, _)) = INTENT_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        {
            (*intent, 0.7)
        } else if !slots.is_empty() {
            ("transfer", 0.75)
        } else {
            ("smalltalk", 0.5)
        };

        IntentResult {
            intent: intent.to_string(),
            slots,
            confidence,
        }
    }
}

#[async_trait::async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, transcript: &str) -> Capability<IntentResult> {
        Capability::Live(self.infer(transcript))
    }
}

/// Zero-shot NLU endpoint accepting `{text, labels}`
pub struct RemoteIntentClassifier {
    client: Client,
    url: Option<String>,
    timeout: Duration,
    fallback: KeywordIntentClassifier,
}

impl RemoteIntentClassifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
            timeout,
            fallback: KeywordIntentClassifier,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.nlu_api_url.clone(),
            Duration::from_secs(settings.external_timeout_secs),
        )
    }

    async fn request(&self, url: &str, transcript: &str) -> Result<IntentResult> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "text": transcript, "labels": INTENT_LABELS }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BankingError::ExternalServiceDegraded(format!(
                "intent endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let (intent, confidence) = best_label(&body).ok_or_else(|| {
            BankingError::ExternalServiceDegraded("unrecognized intent payload".into())
        })?;

        debug!(intent = %intent, confidence, "Intent classified");

        Ok(IntentResult {
            intent,
            slots: extract_slots(transcript),
            confidence,
        })
    }
}

#[async_trait::async_trait]
impl IntentClassifier for RemoteIntentClassifier {
    async fn classify(&self, transcript: &str) -> Capability<IntentResult> {
        let outcome = match self.url.as_deref() {
            None => Err(DegradedReason::NotConfigured),
            Some(url) => bounded(self.timeout, self.request(url, transcript)).await,
        };
        Capability::from_outcome(outcome, || self.fallback.infer(transcript))
    }
}

/// Highest scoring label from a flat `{labels, scores}` payload, the same
/// nested under `result`, or `{intent, confidence}`.
fn best_label(body: &Value) -> Option<(String, f64)> {
    let ranked = if body.get("labels").is_some() {
        body
    } else if body.pointer("/result/labels").is_some() {
        &body["result"]
    } else if let Some(intent) = body.get("intent").and_then(Value::as_str) {
        let confidence = body.get("confidence").and_then(Value::as_f64).unwrap_or(0.8);
        return Some((intent.to_lowercase(), confidence));
    } else {
        return None;
    };

    let labels = ranked.get("labels")?.as_array()?;
    let scores = ranked.get("scores")?.as_array()?;

    labels
        .iter()
        .zip(scores)
        .filter_map(|(label, score)| Some((label.as_str()?, score.as_f64()?)))
        .fold(None, |best: Option<(&str, f64)>, (label, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((label, score)),
        })
        .map(|(label, score)| (label.to_lowercase(), score))
}
