use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_banking_assistant::{
    banking::MfaProof,
    clock::SystemClock,
    security::FixedOtpGenerator,
    store::{seed_demo_data, BankStore, InMemoryBankStore, DEMO_PASSWORD, DEMO_USERNAME},
    Assistant, Settings, SpeechBackends, TransferRequest,
};

/// Stand-in for a recorded enrollment phrase
const DEMO_VOICE_SAMPLE: &[u8] = b"demo customer voice sample";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    info!("Voice Banking Assistant demo starting");

    let store: Arc<dyn BankStore> = Arc::new(InMemoryBankStore::new());
    seed_demo_data(store.as_ref()).await?;

    let assistant = Assistant::with_parts(
        Settings::default(),
        store,
        Arc::new(FixedOtpGenerator::new("123456")),
        Arc::new(SystemClock),
        SpeechBackends::offline()?,
    );

    let challenge = assistant.auth.login(DEMO_USERNAME, DEMO_PASSWORD).await?;
    let user_id = challenge.user_id.clone();
    println!("\n=== Login ===");
    println!("User: {} (OTP required: {})", user_id, challenge.otp_required);

    assistant.auth.enroll_voice(&user_id, DEMO_VOICE_SAMPLE).await?;
    let tokens = assistant
        .auth
        .issue_tokens(&user_id, "123456", DEMO_VOICE_SAMPLE)
        .await?;
    let caller = assistant.auth.authenticate(&tokens.access_token).await?;
    println!("Tokens issued, access token resolves to {}", caller.user_id);

    let before = assistant.banking.balance(&user_id, None).await?;
    println!("\n=== Balance ===");
    println!("{}: ₹{:.2}", before.account_type, before.balance);

    println!("\n=== Transfer ===");
    let ticket = assistant
        .transfers
        .init(&user_id, TransferRequest::new(500.0, "Rahul", "UPI"))
        .await?;
    println!("Pending: {} (MFA required: {})", ticket.summary, ticket.mfa_required);

    let txn = assistant
        .transfers
        .confirm(&user_id, &ticket.session_id, MfaProof::default())
        .await?;
    println!("Committed {} with status {}", txn.txn_id, txn.status);

    let after = assistant.banking.balance(&user_id, None).await?;
    println!("{}: ₹{:.2}", after.account_type, after.balance);

    println!("\n=== Voice Turn ===");
    let audio = STANDARD.encode(vec![42u8; 20_000]);
    let turn = assistant
        .dialogue
        .process_voice_turn(&user_id, &audio, "en", None)
        .await?;
    println!("Heard: \"{}\"", turn.transcript);
    println!("Intent: {} ({:.2})", turn.intent, turn.confidence);
    println!("Reply: {}", turn.dialogue.text);
    println!("Route: {}", turn.dialogue.metadata.route);

    let state = assistant.auth.session_state(&user_id).await?;
    println!("\nDialogue trace:");
    for line in &state.dialog_trace {
        println!("  {}", line);
    }

    Ok(())
}
