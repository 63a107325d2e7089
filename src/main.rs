use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing_subscriber::EnvFilter;

use totem_client::audio::window_level;
use totem_client::{
    AudioSink, AudioSource, CallController, CallState, Config, ConnectionState,
    ConversationMessage, CpalAudioSink, CpalAudioSource, KioskController, NullAudioSink,
    PlaybackAudio, PlaybackOutcome, QaBackend, RealtimeClient, ResourceLoader, Role, TotemApi,
};

/// Totem - voice call and kiosk Q&A client for AI assistant backends
#[derive(Parser)]
#[command(name = "totem", version, about)]
struct Cli {
    /// Path to the config file (falls back to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive voice call session
    Call,
    /// Ask the backend one question and play the answer
    Ask {
        /// Question text
        question: String,
        /// Print the answer without playing its audio
        #[arg(long)]
        no_audio: bool,
    },
    /// List the predefined questions
    Questions,
    /// Query the backend health endpoint
    Health,
    /// Query the backend test endpoint
    Probe,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; TOTEM_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,totem_client=info",
        1 => "info,totem_client=debug",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_env("TOTEM_LOG").unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref());
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Call => call(&config).await,
        Command::Ask { question, no_audio } => ask(&config, &question, no_audio).await,
        Command::Questions => questions(&config).await,
        Command::Health => health(&config).await,
        Command::Probe => probe(&config).await,
        Command::TestMic { seconds } => test_mic(&config, seconds).await,
        Command::TestSpeaker => test_speaker(&config).await,
    }
}

/// Interactive voice call session driven by stdin commands.
async fn call(config: &Config) -> anyhow::Result<()> {
    let client = RealtimeClient::new(config.realtime_config());
    let source: Arc<dyn AudioSource> = Arc::new(CpalAudioSource::new(
        config.audio.sample_rate,
        config.audio.input_device.clone(),
    ));
    let sink: Arc<dyn AudioSink> = Arc::new(CpalAudioSink::new(config.audio.output_device.clone()));
    let controller = CallController::new(client.clone(), source, sink, config.audio.chunk_ms);

    println!("Connecting to {}", config.ws_url());
    println!("Commands: start, stop, reset, quit\n");

    client.connect().await;

    let printer = tokio::spawn(print_call_updates(
        client.subscribe_state(),
        controller.subscribe(),
    ));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "start" | "s" => controller.start_call(),
            "stop" => controller.stop_call(),
            "reset" | "r" => controller.reset_conversation(),
            "quit" | "q" | "exit" => break,
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }

    printer.abort();
    controller.shutdown().await;
    client.disconnect().await;

    Ok(())
}

/// Print connection, status, error, and transcript transitions as they land.
async fn print_call_updates(
    connection: watch::Receiver<ConnectionState>,
    session: watch::Receiver<CallState>,
) {
    let mut connection = WatchStream::from_changes(connection);
    let mut session = WatchStream::from_changes(session);
    let mut printed = 0;
    let mut status = None;
    let mut error = None;

    loop {
        tokio::select! {
            Some(state) = connection.next() => {
                println!("[connection] {state}");
            }
            Some(state) = session.next() => {
                if state.transcript.len() < printed {
                    printed = 0;
                }
                for message in state.transcript.iter().skip(printed) {
                    print_message(message);
                }
                printed = state.transcript.len();

                if status != Some(state.status) {
                    status = Some(state.status);
                    println!("[status] {}", state.status);
                }
                if error != state.error {
                    if let Some(e) = &state.error {
                        println!("[error] {e}");
                    }
                    error = state.error;
                }
            }
            else => break,
        }
    }
}

fn print_message(message: &ConversationMessage) {
    let tag = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::Error => "error",
    };
    println!("[{tag}] {}", message.content);
}

/// One kiosk Q&A exchange.
async fn ask(config: &Config, question: &str, no_audio: bool) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question is empty");
    }

    let backend = Arc::new(TotemApi::new(&config.api_url()));
    let sink: Arc<dyn AudioSink> = if no_audio {
        Arc::new(NullAudioSink::new())
    } else {
        Arc::new(CpalAudioSink::new(config.audio.output_device.clone()))
    };
    let loader = ResourceLoader::new(config.origin_url());
    let kiosk = KioskController::new(backend, sink, loader, config.kiosk.clone());

    let mut updates = kiosk.subscribe();
    kiosk.submit(question).await;

    let snapshot = kiosk.snapshot();
    for message in &snapshot.transcript {
        print_message(message);
    }

    // submit returns once the answer is applied; wait out the narration
    while kiosk.snapshot().is_playing() {
        updates.changed().await?;
    }

    if snapshot.transcript.iter().any(|m| m.role == Role::Error) {
        anyhow::bail!("the backend could not answer");
    }

    Ok(())
}

/// List the predefined questions, static config first.
async fn questions(config: &Config) -> anyhow::Result<()> {
    let backend = Arc::new(TotemApi::new(&config.api_url()));
    let sink: Arc<dyn AudioSink> = Arc::new(NullAudioSink::new());
    let loader = ResourceLoader::new(config.origin_url());
    let kiosk = KioskController::new(backend, sink, loader, config.kiosk.clone());

    let questions = kiosk.load_questions().await?;
    if questions.is_empty() {
        println!("No predefined questions available.");
        return Ok(());
    }

    for question in &questions {
        println!("{}: {}", question.id, question.text);
        if question.question != question.text {
            println!("    asks: {}", question.question);
        }
    }

    Ok(())
}

/// Query the backend health endpoint.
async fn health(config: &Config) -> anyhow::Result<()> {
    let backend = TotemApi::new(&config.api_url());
    let report = backend.health().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Query the backend test endpoint.
async fn probe(config: &Config) -> anyhow::Result<()> {
    let backend = TotemApi::new(&config.api_url());
    let report = backend.probe().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Test microphone input.
async fn test_mic(config: &Config, seconds: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {seconds} seconds...");
    println!("Speak into your microphone!\n");

    let source = CpalAudioSource::new(
        config.audio.sample_rate,
        config.audio.input_device.clone(),
    );
    source.start()?;

    println!("Sample rate: {} Hz", source.sample_rate());
    println!("---");

    for i in 0..seconds {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let window = source.recent();
        let level = window_level(&window);
        let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] level: {:.4} | peak: {:.4} | [{}]",
            i + 1,
            level,
            peak,
            meter
        );

        // Keep the capture buffer from growing across the run
        source.take();
    }

    source.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If the level stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave.
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalAudioSink::new(config.audio.output_device.clone());

    let sample_rate = config.audio.sample_rate;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    let handle = sink.play(PlaybackAudio {
        samples,
        sample_rate,
    })?;
    match handle.done.await {
        Ok(PlaybackOutcome::Ended) => {}
        Ok(PlaybackOutcome::Stopped) => println!("Playback was interrupted."),
        Ok(PlaybackOutcome::Failed(e)) => anyhow::bail!("playback failed: {e}"),
        Err(_) => anyhow::bail!("playback worker went away"),
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
