use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use voice_tutor::backend::{HttpBackend, TutorBackend};
use voice_tutor::controller::events::{self, EventSender};
use voice_tutor::voice::{
    AudioCapture, AudioPlayback, NativeMicrophone, NativeRecognizer, NativeSynthesizer, NoSpeech,
    PLAYBACK_SAMPLE_RATE, PlaybackHandle, SAMPLE_RATE, SegmentEvent, SpeechSegmenter, SpeechToText,
    TextToSpeech, is_speech, rms_energy,
};
use voice_tutor::{
    Config, ControllerEvent, MicState, Mode, QuickAction, Role, SpeechEngines, TutorController,
};

/// Tutor - Voice-first AI tutoring from the terminal
#[derive(Parser)]
#[command(name = "tutor", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Tutoring service base URL
    #[arg(long, env = "TUTOR_BACKEND_URL")]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start or resume an interactive tutoring session
    Chat {
        /// Interaction mode (tutor, conversation, debate, interview)
        #[arg(short, long, default_value = "tutor")]
        mode: Mode,
        /// Subject to study
        #[arg(short, long)]
        subject: String,
        /// Learner email
        #[arg(short, long, env = "TUTOR_USER_EMAIL")]
        user: Option<String>,
        /// Don't speak replies aloud
        #[arg(long)]
        no_voice: bool,
        /// Disable all audio devices
        #[arg(long)]
        text_only: bool,
    },
    /// Check that the tutoring service is reachable
    Health,
    /// List available session modes
    Modes,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,voice_tutor=info",
        1 => "info,voice_tutor=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.backend_url {
        config.backend.url = url;
    }
    tracing::debug!(backend = %config.backend.url, "loaded configuration");

    match cli.command {
        Command::Chat {
            mode,
            subject,
            user,
            no_voice,
            text_only,
        } => {
            let user = user.or_else(|| config.user_email.clone());
            chat(&config, mode, &subject, user, no_voice, text_only).await
        }
        Command::Health => health(&config).await,
        Command::Modes => {
            list_modes();
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

const HELP: &str = "\
Type a message and press enter to send it.
  /rec      start recording        /stop    stop and send
  /mute     stop speaking replies  /unmute  speak replies again
  /hush     stop current speech    /replay  speak the last reply
  /ask /hint /more /topic          quick actions
  /end      end the session        /quit    exit";

/// Interactive session loop
#[allow(clippy::future_not_send)]
async fn chat(
    config: &Config,
    mode: Mode,
    subject: &str,
    user: Option<String>,
    no_voice: bool,
    text_only: bool,
) -> anyhow::Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend.url, config.backend.timeout)?);
    let (events_tx, mut events_rx) = events::channel();

    let engines = if text_only {
        SpeechEngines {
            recognizer: Box::new(NoSpeech),
            synthesizer: Box::new(NoSpeech),
            microphone: Box::new(NoSpeech),
        }
    } else {
        native_engines(config, &events_tx)
    };

    let mut settings = config.session.controller_settings();
    if no_voice || text_only {
        settings.voice_output = false;
    }

    let mut controller = TutorController::new(backend, engines, settings);
    let mut shown = HashSet::new();

    controller
        .handle_event(ControllerEvent::AuthResolved(user))
        .await?;

    match controller.session() {
        Some(session) => println!(
            "Resuming your {} session on {}.",
            session.mode.display_name(),
            session.subject
        ),
        None => {
            println!("Starting {} on {subject}...", mode.display_name());
            controller.start_session(mode, subject).await?;
            println!("{}", mode.prompt_hint(subject));
        }
    }
    println!("{HELP}\n");
    print_new_messages(&controller, &mut shown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut mic = controller.mic_state();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_line(&mut controller, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("! {e}"),
                }
            }
            Some(event) = events_rx.recv() => {
                if let Err(e) = controller.handle_event(event).await {
                    println!("! {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        print_new_messages(&controller, &mut shown);
        if controller.mic_state() != mic {
            mic = controller.mic_state();
            println!("[mic: {}]", mic_label(mic));
        }
    }

    controller.handle_event(ControllerEvent::Unload).await?;
    Ok(())
}

/// Apply one REPL line; returns false when the user asked to quit
#[allow(clippy::future_not_send)]
async fn handle_line(controller: &mut TutorController, line: &str) -> voice_tutor::Result<bool> {
    match line {
        "" => {}
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{HELP}"),
        "/rec" => controller.start_recording().await?,
        "/stop" => controller.stop_recording().await?,
        "/mute" => controller.set_voice_output(false).await,
        "/unmute" => controller.set_voice_output(true).await,
        "/hush" => controller.stop_speaking().await,
        "/replay" => {
            let last = controller
                .messages()
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .map(|m| m.id);
            if let Some(id) = last {
                controller.speak_message(id).await?;
            }
        }
        "/ask" => controller.send_quick_action(QuickAction::AskQuestion).await?,
        "/hint" => controller.send_quick_action(QuickAction::GetHint).await?,
        "/more" => controller.send_quick_action(QuickAction::ExplainMore).await?,
        "/topic" => controller.send_quick_action(QuickAction::ChangeTopic).await?,
        "/end" => controller.end_session().await?,
        text if text.starts_with('/') => println!("unknown command {text}, try /help"),
        text => controller.send_message(text, false).await?,
    }
    Ok(true)
}

fn print_new_messages(controller: &TutorController, shown: &mut HashSet<Uuid>) {
    for message in controller.messages() {
        if !shown.insert(message.id) {
            continue;
        }
        match message.role {
            Role::User if message.is_voice_input => println!("you (voice)> {}", message.content),
            Role::User => println!("you> {}", message.content),
            Role::Assistant => println!("tutor> {}", message.content),
            Role::System => println!("* {}", message.content),
        }
    }
}

const fn mic_label(mic: MicState) -> &'static str {
    match mic {
        MicState::Inactive => "off",
        MicState::Active => "listening",
        MicState::Disabled => "busy",
    }
}

/// Build device-backed engines, degrading to unsupported ones without keys
fn native_engines(config: &Config, events: &EventSender) -> SpeechEngines {
    let stt = SpeechToText::from_config(&config.voice, &config.api_keys)
        .inspect_err(|e| tracing::warn!(error = %e, "voice input unavailable"))
        .ok();
    let tts = TextToSpeech::from_config(&config.voice, &config.api_keys)
        .inspect_err(|e| tracing::warn!(error = %e, "voice output unavailable"))
        .ok();

    SpeechEngines {
        recognizer: Box::new(NativeRecognizer::new(stt, events.clone())),
        synthesizer: Box::new(NativeSynthesizer::new(tts, events.clone())),
        microphone: Box::new(NativeMicrophone),
    }
}

/// Check tutoring service health
async fn health(config: &Config) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend.url, config.backend.timeout)?;
    let resp = backend.health().await?;
    if resp.success {
        println!("{} is healthy", backend.base_url());
        Ok(())
    } else {
        anyhow::bail!("{} reported failure", backend.base_url())
    }
}

fn list_modes() {
    for mode in Mode::ALL {
        println!(
            "{:<14} {:<22} {}",
            mode.as_str(),
            mode.display_name(),
            mode.description()
        );
    }
}

/// Listen on the default input and report what the recognizer would hear
#[allow(clippy::future_not_send, clippy::cast_precision_loss)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new()?;
    let mut segmenter = SpeechSegmenter::new();
    capture.start()?;
    println!("Listening for {duration}s at {SAMPLE_RATE} Hz. Say a short sentence.\n");

    let mut utterances = 0_usize;
    for second in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let samples = capture.peek_buffer();
        capture.clear_buffer();

        let label = if is_speech(&samples) { "speech" } else { "quiet" };
        println!("[{second:2}s] level {:.4} {label}", rms_energy(&samples));
        if let Some(SegmentEvent::Segment(segment)) = segmenter.process(&samples) {
            utterances += 1;
            println!(
                "      utterance of {:.1}s",
                segment.len() as f32 / SAMPLE_RATE as f32
            );
        }
    }
    capture.stop();
    utterances += usize::from(segmenter.flush().is_some());

    if utterances == 0 {
        println!("\nNo speech detected. Check the default input device (pactl info, arecord -l).");
    } else {
        println!("\n{utterances} utterance(s) detected, the microphone is usable for recording.");
    }
    Ok(())
}

/// Play a short rising chime on the default output
async fn test_speaker() -> anyhow::Result<()> {
    #[allow(clippy::cast_precision_loss)]
    let rate = PLAYBACK_SAMPLE_RATE as f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = [523.25_f32, 659.25, 783.99]
        .iter()
        .flat_map(|&freq| {
            (0..PLAYBACK_SAMPLE_RATE / 3)
                .map(move |i| (std::f32::consts::TAU * freq * i as f32 / rate).sin() * 0.25)
        })
        .collect();

    println!("Playing a one second chime at {PLAYBACK_SAMPLE_RATE} Hz...");
    tokio::task::spawn_blocking(move || {
        AudioPlayback::new()?.play_samples(samples, &PlaybackHandle::started())
    })
    .await??;
    println!("Done. No sound means the default sink is wrong (pactl info).");
    Ok(())
}

/// Test TTS output with the configured provider
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.voice, &config.api_keys)?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    tokio::task::spawn_blocking(move || {
        AudioPlayback::new()?.play_mp3(&mp3_data, &PlaybackHandle::started())
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
