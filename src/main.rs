use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voicebot::api::{ApiServer, ApiState};
use voicebot::voice::{
    AudioBackend, AudioInput, LevelMeter, LocalSpeaker, MeterState, estimate_loudness,
    input_device_names,
};
use voicebot::{
    Assistant, Config, CpalBackend, SessionController, SpeechOutput, SystemSpeech, Voice,
    VoiceServices,
};

/// Voicebot - talk to a language model, hands free
#[derive(Parser)]
#[command(name = "voicebot", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Proxy server URL; talk to Groq directly when unset
    #[arg(long, env = "VOICEBOT_PROXY_URL")]
    proxy: Option<String>,

    /// Remote voice for replies
    #[arg(long, value_enum)]
    voice: Option<Voice>,

    /// How replies are spoken
    #[arg(long, value_enum)]
    speech: Option<SpeechMode>,

    /// Input device name (see `voicebot devices`)
    #[arg(long)]
    device: Option<String>,

    /// Transcription language hint (e.g. "en")
    #[arg(long)]
    language: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SpeechMode {
    /// Groq neural voice
    Remote,
    /// Local system synthesizer
    Local,
    /// Print replies only
    Off,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive conversation (default)
    Chat,
    /// Ask one typed question
    Ask {
        /// Question text
        text: String,
    },
    /// Run the API proxy server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Port to listen on
        #[arg(short, long, env = "VOICEBOT_PORT")]
        port: Option<u16>,
    },
    /// Show the live level meter for a few seconds
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// List input devices
    Devices,
    /// List remote voices
    Voices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voicebot=info",
        1 => "info,voicebot=debug",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so the meter on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    apply_overrides(&mut config, &cli);

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&config).await,
        Command::Ask { text } => ask_once(&config, &text).await,
        Command::Serve { host, port } => serve(&config, host, port).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::Devices => {
            for name in input_device_names()? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Voices => {
            for voice in Voice::ALL {
                let marker = if voice == Voice::default() { " (default)" } else { "" };
                println!("{voice}{marker}");
            }
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(proxy) = &cli.proxy {
        config.proxy_url = Some(proxy.clone());
    }
    if let Some(device) = &cli.device {
        config.device = Some(device.clone());
    }
    if let Some(language) = &cli.language {
        config.language = Some(language.clone());
    }

    let voice = cli.voice.unwrap_or(match config.speech {
        SpeechOutput::Remote(voice) => voice,
        _ => Voice::default(),
    });
    config.speech = match (cli.speech, config.speech) {
        (Some(SpeechMode::Remote), _) | (None, SpeechOutput::Remote(_)) => {
            SpeechOutput::Remote(voice)
        }
        (Some(SpeechMode::Local), _) => SpeechOutput::Local,
        (Some(SpeechMode::Off), _) => SpeechOutput::Muted,
        (None, other) => other,
    };
}

type Services = Box<dyn VoiceServices>;

fn build_assistant(config: &Config) -> anyhow::Result<(Assistant<Services>, SystemSpeech)> {
    let services = config.services()?;
    tracing::debug!(services = services.name(), speech = ?config.speech, "assistant ready");

    let local = match LocalSpeaker::detect() {
        Ok(speaker) => Some(speaker),
        Err(e) => {
            if config.speech == SpeechOutput::Local {
                return Err(e.into());
            }
            None
        }
    };

    let assistant =
        Assistant::new(services, config.speech).with_language(config.language.clone());
    Ok((assistant, SystemSpeech::new(local)))
}

#[allow(clippy::future_not_send)]
async fn ask_once(config: &Config, text: &str) -> anyhow::Result<()> {
    let (mut assistant, mut sink) = build_assistant(config)?;
    let outcome = assistant.text_turn(text, &mut sink).await?;
    if let Some(reply) = outcome.reply {
        println!("{reply}");
    }
    Ok(())
}

async fn serve(config: &Config, host: IpAddr, port: Option<u16>) -> anyhow::Result<()> {
    let state = ApiState::new(config.upstream()?);
    let addr = SocketAddr::new(host, port.unwrap_or(config.port));
    ApiServer::new(state, addr).run().await?;
    Ok(())
}

fn draw(meter: &MeterState, status: &str) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\r\x1b[2K{}  {status}", meter.to_blocks());
    let _ = stdout.flush();
}

fn draw_status(status: &str) {
    if !status.is_empty() {
        println!("\r\x1b[2K{status}");
    }
}

/// Forward stdin lines to a channel so they can be raced against other work
fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[allow(clippy::future_not_send)]
async fn chat(config: &Config) -> anyhow::Result<()> {
    let (mut assistant, mut sink) = build_assistant(config)?;
    let backend = CpalBackend::new(config.device.clone());
    let mut controller = SessionController::new(backend, config.session);
    let mut lines = spawn_stdin_lines();

    let mut meter_rx = controller.subscribe_meter();
    let mut status_rx = assistant.subscribe_status();

    println!("Press Enter to talk (Enter again to stop), type to ask, /quit to exit.");

    loop {
        let Some(line) = lines.recv().await else {
            break;
        };
        let line = line.trim();

        match line {
            "/quit" | "/exit" => break,
            "" => {
                let (stop_tx, stop_rx) = mpsc::channel(1);
                let outcome = {
                    let turn = assistant.voice_turn(&mut controller, stop_rx, &mut sink);
                    tokio::pin!(turn);

                    // Any line while recording means stop
                    loop {
                        tokio::select! {
                            result = &mut turn => break result,
                            Some(_) = lines.recv() => {
                                let _ = stop_tx.try_send(());
                            }
                            Ok(()) = meter_rx.changed() => {
                                draw(&meter_rx.borrow_and_update(), &status_rx.borrow());
                            }
                            Ok(()) = status_rx.changed() => {
                                draw_status(&status_rx.borrow_and_update());
                            }
                        }
                    }
                };

                print!("\r\x1b[2K");
                match outcome {
                    Ok(outcome) => {
                        if let Some(transcript) = outcome.transcript.filter(|t| !t.is_empty()) {
                            println!("you: {transcript}");
                        }
                        if let Some(reply) = outcome.reply {
                            println!("bot: {reply}");
                        }
                    }
                    Err(_) => println!("{}", assistant.status()),
                }
            }
            text => match assistant.text_turn(text, &mut sink).await {
                Ok(outcome) => {
                    if let Some(reply) = outcome.reply {
                        println!("bot: {reply}");
                    }
                }
                Err(_) => println!("{}", assistant.status()),
            },
        }

        let status = assistant.status();
        if !status.is_empty() {
            println!("{status}");
        }
        status_rx.mark_unchanged();
    }

    sink.cancel().await;
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut backend = CpalBackend::new(config.device.clone());
    let mut input = backend.acquire().await?;

    println!("Sample rate: {} Hz", input.format().sample_rate);

    let mut meter = LevelMeter::new(config.session.meter);
    let mut window = Vec::with_capacity(input.sampler().window());
    let mut chunks = Vec::new();
    let mut ticker = tokio::time::interval(config.session.tick_interval);
    let deadline = Instant::now() + Duration::from_secs(duration);

    while Instant::now() < deadline {
        ticker.tick().await;

        // Chunks are not kept here; only the live window matters
        input.drain_chunks(&mut chunks);
        chunks.clear();

        input.sampler().snapshot(&mut window)?;
        let level = estimate_loudness(&window);
        let speaking = level > config.session.thresholds.loudness;

        if let Some(state) = meter.observe(Instant::now(), level) {
            let label = if speaking { "  speech" } else { "" };
            draw(state, &format!("level {level:.3}{label}"));
        }
    }

    input.release();
    println!("\n\nIf the bars moved while you spoke, your mic is working!");
    println!("If they stayed flat, check the input device with `voicebot devices`.");

    Ok(())
}
