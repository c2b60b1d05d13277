//! Run one practice conversation from the terminal.
//!
//! Expects a token-minting endpoint that returns the realtime credential:
//!
//! ```bash
//! KAIWA_TOKEN_URL=http://localhost:3000/api/session \
//!     cargo run --example practice_session
//! ```
//!
//! Speak into the default microphone; the assistant replies through the
//! default speaker. Press Enter to toggle mute, Ctrl-D (or `quit`) to hang
//! up. The transcript is printed as entries arrive.

use anyhow::{Context, Result};
use kaiwa_webrtc::{
    HttpCredentialProvider, ScenarioConfig, SessionConfig, SessionEvent, SessionManager, Speaker,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webrtc=warn".into()),
        )
        .init();

    let token_url = std::env::var("KAIWA_TOKEN_URL")
        .context("set KAIWA_TOKEN_URL to your token-minting endpoint")?;
    let token_url = url::Url::parse(&token_url).context("KAIWA_TOKEN_URL is not a valid URL")?;

    let scenario = ScenarioConfig::new(
        "restaurant-order",
        "あなたは東京のレストランの店員です。お客様の注文を丁寧な日本語で受けてください。\
         お客様が間違えたら、優しく正しい言い方を教えてください。",
        "alloy",
    );

    let provider = Arc::new(HttpCredentialProvider::new(token_url));
    let manager = Arc::new(SessionManager::new(SessionConfig::default(), provider)?);
    let mut events = manager
        .take_event_receiver()
        .await
        .expect("first take of the event receiver");

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::PhaseChanged { phase } => {
                    eprintln!("-- {}", phase.name());
                }
                SessionEvent::TranscriptAppended { entry } => {
                    let who = match entry.speaker {
                        Speaker::User => "you",
                        Speaker::Assistant => "assistant",
                    };
                    println!("{}: {}", who, entry.text);
                }
                SessionEvent::AssistantDelta { .. } => {}
                SessionEvent::Error { code, message } => {
                    eprintln!("!! {}: {}", code, message);
                }
            }
        }
    });

    println!("connecting...");
    manager.connect(scenario).await?;
    println!("connected. Enter toggles mute, 'quit' hangs up.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "quit" {
            break;
        }
        let muted = manager.toggle_mute().await;
        println!("{}", if muted { "muted" } else { "unmuted" });
    }

    manager.disconnect().await;
    printer.abort();
    println!("bye");
    Ok(())
}
