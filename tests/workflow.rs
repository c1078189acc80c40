use chrono::Duration;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use voice_banking_assistant::{
    banking::MfaProof,
    clock::{Clock, ManualClock},
    error::{BankingError, ErrorKind},
    security::FixedOtpGenerator,
    store::{seed_demo_data, BankStore, InMemoryBankStore, DEMO_PASSWORD, DEMO_USERNAME, DEMO_USER_ID},
    Assistant, Settings, SpeechBackends, TransactionStatus, TransferRequest,
};

const VOICE: &[u8] = b"registered speaker sample";
const OTP: &str = "123456";

async fn assistant() -> (Assistant, Arc<ManualClock>) {
    let store: Arc<dyn BankStore> = Arc::new(InMemoryBankStore::new());
    seed_demo_data(store.as_ref()).await.unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let assistant = Assistant::with_parts(
        Settings::default(),
        store,
        Arc::new(FixedOtpGenerator::new(OTP)),
        clock.clone(),
        SpeechBackends::offline().unwrap(),
    );
    (assistant, clock)
}

async fn logged_in(assistant: &Assistant) -> String {
    let challenge = assistant.auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
    assistant.auth.enroll_voice(&challenge.user_id, VOICE).await.unwrap();
    let tokens = assistant
        .auth
        .issue_tokens(&challenge.user_id, OTP, VOICE)
        .await
        .unwrap();
    assistant.auth.authenticate(&tokens.access_token).await.unwrap().user_id
}

async fn savings(assistant: &Assistant) -> f64 {
    assistant.banking.balance(DEMO_USER_ID, None).await.unwrap().balance
}

#[tokio::test]
async fn test_end_to_end_small_transfer() {
    let (assistant, _) = assistant().await;
    let user_id = logged_in(&assistant).await;
    assert_eq!(user_id, DEMO_USER_ID);
    assert_eq!(savings(&assistant).await, 23_450.0);

    let ticket = assistant
        .transfers
        .init(&user_id, TransferRequest::new(500.0, "Rahul", "UPI"))
        .await
        .unwrap();
    assert!(!ticket.mfa_required);
    assert_eq!(ticket.summary, "500 to Rahul via UPI");

    let txn = assert_ok!(
        assistant
            .transfers
            .confirm(&user_id, &ticket.session_id, MfaProof::default())
            .await
    );
    assert_eq!(txn.status, TransactionStatus::Success);
    assert_eq!(txn.amount, 500.0);
    assert_eq!(savings(&assistant).await, 22_950.0);

    let history = assistant.banking.transactions(&user_id, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].txn_id, txn.txn_id);
}

#[tokio::test]
async fn test_limit_rejection_leaves_state_untouched() {
    let (assistant, _) = assistant().await;
    let user_id = logged_in(&assistant).await;

    let err = assistant
        .transfers
        .init(&user_id, TransferRequest::new(60_000.0, "Rahul", "UPI"))
        .await
        .unwrap_err();
    assert!(matches!(err, BankingError::LimitExceeded { .. }));
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let session = assistant.store.load_session(&user_id).await.unwrap().unwrap();
    assert!(session.transfer_session.is_none());
    assert_eq!(savings(&assistant).await, 23_450.0);
}

#[tokio::test]
async fn test_second_confirm_fails_and_debits_once() {
    let (assistant, _) = assistant().await;
    let user_id = logged_in(&assistant).await;

    let ticket = assistant
        .transfers
        .init(&user_id, TransferRequest::new(1_000.0, "Priya", "UPI"))
        .await
        .unwrap();
    assistant
        .transfers
        .confirm(&user_id, &ticket.session_id, MfaProof::default())
        .await
        .unwrap();

    let again = assert_err!(
        assistant
            .transfers
            .confirm(&user_id, &ticket.session_id, MfaProof::default())
            .await
    );
    assert!(matches!(again, BankingError::TransferSessionMissing(_)));
    assert_eq!(savings(&assistant).await, 22_450.0);
}

#[tokio::test]
async fn test_mfa_gate_for_large_transfers() {
    let (assistant, _) = assistant().await;
    let user_id = logged_in(&assistant).await;

    let ticket = assistant
        .transfers
        .init(&user_id, TransferRequest::new(15_000.0, "Alice", "UPI"))
        .await
        .unwrap();
    assert!(ticket.mfa_required);

    let denied = assistant
        .transfers
        .confirm(&user_id, &ticket.session_id, MfaProof::default())
        .await;
    assert!(matches!(denied, Err(BankingError::AuthenticationFailed(_))));

    let wrong = assistant
        .transfers
        .confirm(
            &user_id,
            &ticket.session_id,
            MfaProof {
                otp: Some("000000"),
                voice_verified: false,
            },
        )
        .await;
    assert!(matches!(wrong, Err(BankingError::AuthenticationFailed(_))));
    assert_eq!(savings(&assistant).await, 23_450.0);

    let txn = assistant
        .transfers
        .confirm(
            &user_id,
            &ticket.session_id,
            MfaProof {
                otp: Some(OTP),
                voice_verified: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Success);
    assert_eq!(savings(&assistant).await, 8_450.0);
}

#[tokio::test]
async fn test_expired_otp_blocks_token_issuance() {
    let (assistant, clock) = assistant().await;
    let challenge = assistant.auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
    assistant.auth.enroll_voice(&challenge.user_id, VOICE).await.unwrap();

    clock.advance(Duration::minutes(6));
    let result = assistant.auth.issue_tokens(&challenge.user_id, OTP, VOICE).await;
    assert!(matches!(result, Err(BankingError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_access_token_expires_with_clock() {
    let (assistant, clock) = assistant().await;
    let challenge = assistant.auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
    assistant.auth.enroll_voice(&challenge.user_id, VOICE).await.unwrap();
    let tokens = assistant
        .auth
        .issue_tokens(&challenge.user_id, OTP, VOICE)
        .await
        .unwrap();

    clock.advance(Duration::minutes(11));
    assert!(matches!(
        assistant.auth.authenticate(&tokens.access_token).await,
        Err(BankingError::TokenExpired)
    ));

    let renewed = assistant.auth.refresh(&tokens.refresh_token).await.unwrap();
    assert!(assistant.auth.authenticate(&renewed.access_token).await.is_ok());
    assert!(matches!(
        assistant.auth.refresh(&tokens.refresh_token).await,
        Err(BankingError::UnknownToken)
    ));
}

#[tokio::test]
async fn test_due_reminder_window() {
    let (assistant, clock) = assistant().await;
    let now = clock.now();

    let soon = assistant
        .banking
        .create_reminder(
            DEMO_USER_ID,
            "Credit card bill",
            &(now + Duration::minutes(3)).to_rfc3339(),
            Some("push"),
        )
        .await
        .unwrap();
    assistant
        .banking
        .create_reminder(
            DEMO_USER_ID,
            "Rent",
            &(now + Duration::minutes(10)).to_rfc3339(),
            Some("email"),
        )
        .await
        .unwrap();

    let due = assistant.banking.due_reminders(DEMO_USER_ID).await.unwrap();
    assert_eq!(due.count, 1);
    assert_eq!(due.reminders[0].reminder_id, soon.reminder_id);
}

#[tokio::test]
async fn test_voice_turn_extends_session_trace() {
    let (assistant, _) = assistant().await;
    let user_id = logged_in(&assistant).await;

    let audio = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        vec![9u8; 2_000],
    );
    let turn = assistant
        .dialogue
        .process_voice_turn(&user_id, &audio, "en", None)
        .await
        .unwrap();
    assert_eq!(turn.intent, "transfer");
    assert!(turn.slots.amount.is_some());

    let state = assistant.auth.session_state(&user_id).await.unwrap();
    assert_eq!(state.dialog_trace.len(), 2);
    assert_eq!(state.route, "/transfer");
}
