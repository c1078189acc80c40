//! Service wiring
//!
//! Builds every service over one shared store, lock registry, clock and
//! security context.

use crate::auth::AuthService;
use crate::banking::{BankingService, TransferPolicy, TransferWorkflow};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::dialogue::DialogueService;
use crate::security::{OtpGenerator, SecureOtpGenerator, SecurityContext};
use crate::session::UserLocks;
use crate::speech::{
    ElevenLabsSynthesizer, IntentClassifier, KeywordIntentClassifier, RemoteIntentClassifier,
    SpeechToText, TextToSpeech, WhisperTranscriber,
};
use crate::store::{self, BankStore};
use crate::voice::{DigestEmbedder, VoiceVerifier};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// External speech and intent backends
pub struct SpeechBackends {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub nlu: Arc<dyn IntentClassifier>,
}

impl SpeechBackends {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            stt: Arc::new(WhisperTranscriber::from_settings(settings)?),
            tts: Arc::new(ElevenLabsSynthesizer::from_settings(settings)?),
            nlu: Arc::new(RemoteIntentClassifier::from_settings(settings)?),
        })
    }

    /// No keys, no endpoints: every call takes the local fallback.
    pub fn offline() -> Result<Self> {
        let timeout = Duration::from_secs(1);
        Ok(Self {
            stt: Arc::new(WhisperTranscriber::new(None, "whisper-1", timeout)?),
            tts: Arc::new(ElevenLabsSynthesizer::new(None, "offline", timeout)?),
            nlu: Arc::new(KeywordIntentClassifier),
        })
    }
}

pub struct Assistant {
    pub settings: Settings,
    pub store: Arc<dyn BankStore>,
    pub security: Arc<SecurityContext>,
    pub auth: AuthService,
    pub transfers: TransferWorkflow,
    pub banking: BankingService,
    pub dialogue: DialogueService,
}

impl Assistant {
    /// Production wiring: configured store, OS-random OTPs, wall clock.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let store = store::connect(&settings);
        let speech = SpeechBackends::from_settings(&settings)?;
        Ok(Self::with_parts(
            settings,
            store,
            Arc::new(SecureOtpGenerator),
            Arc::new(SystemClock),
            speech,
        ))
    }

    pub fn with_parts(
        settings: Settings,
        store: Arc<dyn BankStore>,
        otp: Arc<dyn OtpGenerator>,
        clock: Arc<dyn Clock>,
        speech: SpeechBackends,
    ) -> Self {
        let locks = Arc::new(UserLocks::new());
        let security = Arc::new(SecurityContext::new(&settings, otp, clock.clone()));
        let voice = Arc::new(VoiceVerifier::new(
            Arc::new(DigestEmbedder),
            settings.voice_similarity_threshold,
        ));

        let auth = AuthService::new(
            store.clone(),
            security.clone(),
            voice,
            locks.clone(),
            settings.otp_ttl_minutes,
        );
        let transfers = TransferWorkflow::new(
            store.clone(),
            locks.clone(),
            clock.clone(),
            TransferPolicy {
                mfa_threshold: settings.mfa_required_amount,
                otp_policy: settings.mfa_otp_policy,
                allow_overdraft: settings.allow_overdraft,
            },
        );
        let banking = BankingService::new(
            store.clone(),
            clock.clone(),
            settings.reminder_lookahead_minutes,
        );
        let dialogue = DialogueService::new(
            speech.stt,
            speech.tts,
            speech.nlu,
            store.clone(),
            locks,
            clock,
        );

        info!(app = %settings.app_name, "Assistant services ready");

        Self {
            settings,
            store,
            security,
            auth,
            transfers,
            banking,
            dialogue,
        }
    }
}
