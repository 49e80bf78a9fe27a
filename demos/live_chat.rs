//! Live voice chat example.
//!
//! Talks to the live endpoint through the default microphone and speaker
//! until Ctrl-C is pressed.
//!
//! # Usage
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! cargo run --example live_chat            # English
//! cargo run --example live_chat -- mm      # Burmese
//! RUST_LOG=live_voice=debug cargo run --example live_chat -- rk
//! ```

use live_voice::{Activity, Language, LiveVoice, SessionConfig, SessionEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("live_voice=info")),
        )
        .init();

    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| "set GEMINI_API_KEY to your API key")?;
    let language: Language = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => Language::English,
    };

    println!(
        "Input:  {}",
        live_voice::default_input_device_name().unwrap_or_else(|| "<none>".into())
    );
    println!(
        "Output: {}",
        live_voice::default_output_device_name().unwrap_or_else(|| "<none>".into())
    );

    let mut session = LiveVoice::builder()
        .config(SessionConfig::default().with_api_key(api_key))
        .on_event(|event| match event {
            SessionEvent::InputSilent { silent_for } => {
                eprintln!("No audio from the microphone for {silent_for:?}. Is it muted?");
            }
            SessionEvent::Interrupted { stopped } => {
                eprintln!("(interrupted, {stopped} buffers dropped)");
            }
            SessionEvent::GoAway { time_left } => {
                eprintln!("Endpoint closing soon: {time_left:?}");
            }
            _ => {}
        })
        .build()?;

    let control = session.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nStopping...");
            control.disconnect();
        }
    });

    let mut status = session.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        while status.changed().await.is_ok() {
            let activity = status.borrow_and_update().activity();
            if last != Some(activity) {
                let label = match activity {
                    Activity::Disconnected => "Disconnected",
                    Activity::Connecting => "Connecting...",
                    Activity::Listening => "Listening",
                    Activity::Speaking => "Speaking",
                    Activity::Error => "Error",
                };
                println!("[{label}]");
                last = Some(activity);
            }
        }
    });

    session.connect(language).await?;
    println!("Connected ({language}). Start talking, Ctrl-C to stop.");

    session.run().await;

    let status = session.status();
    if let Some(error) = status.error {
        eprintln!("Session failed: {error}");
    }
    let stats = session.stats();
    println!(
        "Sent {} chunks, played {} buffers, {} interruptions",
        stats.chunks_sent, stats.buffers_scheduled, stats.interruptions
    );

    Ok(())
}
