use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use guinness_contracts::catalog::{Persona, Style};
use guinness_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use guinness_contracts::prompt::compose_prompt;
use guinness_engine::config::secrets_path;
use guinness_engine::session::HistoryEntry;
use guinness_engine::{
    CancelToken, Credential, CredentialLoader, DryrunBackend, EngineConfig, GenerationError,
    GenerationOutcome, ImageBackend, OpenRouterBackend, SelfieGenerator, SelfieInputs,
    UploadedImage, ERROR_TROUBLESHOOTING, NOT_FOUND_TROUBLESHOOTING, SETUP_INSTRUCTIONS,
};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "guinness-selfie",
    version,
    about = "Generate a legendary selfie with Messi or Ronaldo while holding a pint of Guinness"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: upload, pick, generate, browse history, save.
    Chat(ChatArgs),
    /// One-shot generation that saves the image and its receipt.
    Generate(GenerateArgs),
    /// Print the prompt a selection would send.
    Prompt(PromptArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    secrets: Option<PathBuf>,
    #[arg(long)]
    history_limit: Option<usize>,
    /// Use the offline backend instead of OpenRouter.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, default_value = "Ronaldo")]
    persona: Persona,
    #[arg(long, default_value = "Casual")]
    style: Style,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    photo: PathBuf,
    #[arg(long, default_value = "Ronaldo")]
    persona: Persona,
    #[arg(long, default_value = "Casual")]
    style: Style,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct PromptArgs {
    #[arg(long, default_value = "Ronaldo")]
    persona: Persona,
    #[arg(long, default_value = "Casual")]
    style: Style,
}

const EXIT_MISSING_CREDENTIAL: i32 = 2;
const EXIT_NO_IMAGE: i32 = 3;
const HISTORY_GRID_COLUMNS: usize = 3;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("guinness-selfie error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => run_chat(args),
        Command::Generate(args) => run_generate(args),
        Command::Prompt(args) => {
            println!("{}", compose_prompt(args.persona, args.style));
            Ok(0)
        }
    }
}

/// Builds the session, or prints setup help and returns `None` when no API key is configured.
fn open_generator(args: &SessionArgs) -> Result<Option<SelfieGenerator>> {
    let mut config = EngineConfig::from_env();
    if let Some(limit) = args.history_limit {
        config.history_limit = Some(limit).filter(|value| *value > 0);
    }
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    debug!(events = %events_path.display(), dryrun = args.dryrun, "opening session");

    if args.dryrun {
        return Ok(Some(SelfieGenerator::with_backend(
            Box::new(DryrunBackend),
            &config,
            &args.out,
            &events_path,
        )));
    }

    let loader = CredentialLoader::layered(secrets_path(args.secrets.as_deref()));
    let started = SelfieGenerator::start(
        &loader,
        &config,
        &args.out,
        &events_path,
        |credential: Credential, config: &EngineConfig| {
            Box::new(OpenRouterBackend::new(credential, config)) as Box<dyn ImageBackend>
        },
    );
    match started {
        Ok(generator) => Ok(Some(generator)),
        Err(GenerationError::MissingCredential) => {
            eprintln!("OpenRouter API Key not configured!\n");
            eprintln!("{SETUP_INSTRUCTIONS}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let Some(mut generator) = open_generator(&args.session)? else {
        return Ok(EXIT_MISSING_CREDENTIAL);
    };
    let mut inputs = SelfieInputs::new(args.persona, args.style);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let result = run_chat_loop(&mut generator, &mut inputs, stdin.lock(), stdout.lock());
    let summary = generator.finish();
    result?;
    println!("Session summary written to {}", summary?.display());
    Ok(0)
}

fn run_chat_loop<R: BufRead, W: Write>(
    generator: &mut SelfieGenerator,
    inputs: &mut SelfieInputs,
    mut reader: R,
    mut out: W,
) -> Result<()> {
    writeln!(
        out,
        "Guinness Selfie Generator ({} / {}). Type /help for commands.",
        generator.backend_name(),
        generator.model()
    )?;
    let mut line = String::new();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join("  "))?;
            }
            "set_persona" => {
                let raw = value_as_string(intent.command_args.get("persona"));
                match raw.parse::<Persona>() {
                    Ok(persona) => {
                        inputs.persona = persona;
                        writeln!(out, "Footballer set to {persona}")?;
                    }
                    Err(message) => writeln!(out, "{message}")?,
                }
            }
            "set_style" => {
                let raw = value_as_string(intent.command_args.get("style"));
                match raw.parse::<Style>() {
                    Ok(style) => {
                        inputs.style = style;
                        writeln!(out, "Style set to {style}")?;
                    }
                    Err(message) => writeln!(out, "{message}")?,
                }
            }
            "upload" => {
                let path = value_as_string(intent.command_args.get("path"));
                if path.is_empty() {
                    writeln!(out, "/upload requires a path")?;
                    continue;
                }
                match load_upload(Path::new(&path)) {
                    Ok((upload, caption)) => {
                        writeln!(out, "Uploaded {} ({caption})", upload.file_name())?;
                        inputs.set_upload(upload);
                    }
                    Err(err) => writeln!(out, "Could not use {path}: {err}")?,
                }
            }
            "generate" => {
                if !inputs.can_generate() {
                    writeln!(out, "Please upload a photo first! (/upload <path>)")?;
                    continue;
                }
                writeln!(
                    out,
                    "Generating your selfie with {}... This may take 10-30 seconds...",
                    inputs.persona
                )?;
                out.flush()?;
                report_generation(&mut out, generator.generate(inputs, &CancelToken::new()))?;
            }
            "history" => match intent.command_args.get("count").and_then(Value::as_u64) {
                Some(count) => {
                    let entries = generator.session().history().recent(count as usize);
                    if entries.is_empty() {
                        writeln!(out, "No generations yet.")?;
                    }
                    for row in format_history_rows(&entries) {
                        writeln!(out, "{row}")?;
                    }
                }
                None => writeln!(out, "/history takes an optional count, e.g. /history 3")?,
            },
            "save" => {
                let path = value_as_string(intent.command_args.get("path"));
                let dir = (!path.is_empty()).then(|| PathBuf::from(&path));
                match generator.save_current(dir.as_deref()) {
                    Ok(saved) => writeln!(out, "Saved {}", saved.image_path.display())?,
                    Err(err) => writeln!(out, "{err:#}")?,
                }
            }
            "status" => {
                for row in status_rows(generator, inputs) {
                    writeln!(out, "{row}")?;
                }
            }
            "quit" => break,
            "unknown" => {
                let command = value_as_string(intent.command_args.get("command"));
                writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
            }
            _ => {
                writeln!(
                    out,
                    "Use slash commands to drive the session, e.g. /upload me.png then /generate."
                )?;
            }
        }
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let Some(mut generator) = open_generator(&args.session)? else {
        return Ok(EXIT_MISSING_CREDENTIAL);
    };
    let mut inputs = SelfieInputs::new(args.persona, args.style);
    let (upload, caption) = load_upload(&args.photo)?;
    println!("Uploaded {} ({caption})", upload.file_name());
    inputs.set_upload(upload);

    println!(
        "Generating your selfie with {}... This may take 10-30 seconds...",
        inputs.persona
    );
    let outcome = generator.generate(&inputs, &CancelToken::new());
    let mut stdout = io::stdout();
    let code = match &outcome {
        Ok(GenerationOutcome::Generated { .. }) => 0,
        Ok(GenerationOutcome::NoImage { .. }) => EXIT_NO_IMAGE,
        Err(_) => 1,
    };
    report_generation(&mut stdout, outcome)?;
    if code == 0 {
        let saved = generator.save_current(None)?;
        println!("Saved {}", saved.image_path.display());
        println!("Receipt {}", saved.receipt_path.display());
    }
    generator.finish()?;
    Ok(code)
}

fn load_upload(path: &Path) -> Result<(UploadedImage, String)> {
    let upload = UploadedImage::from_path(path)?;
    let caption = upload.describe()?;
    Ok((upload, caption))
}

fn report_generation<W: Write>(
    out: &mut W,
    outcome: Result<GenerationOutcome, GenerationError>,
) -> Result<()> {
    match outcome {
        Ok(GenerationOutcome::Generated { image, latency }) => {
            writeln!(
                out,
                "Selfie generated successfully! {}x{} in {:.1}s. Use /save to download it.",
                image.width(),
                image.height(),
                latency.as_secs_f64()
            )?;
        }
        Ok(GenerationOutcome::NoImage { finish_reason }) => {
            writeln!(out, "No image found in the API response. Please try again.")?;
            if let Some(reason) = finish_reason {
                writeln!(out, "(finish_reason: {reason})")?;
            }
            writeln!(out, "{NOT_FOUND_TROUBLESHOOTING}")?;
        }
        Err(err) if err.is_remote() => {
            writeln!(out, "Error: {err}")?;
            writeln!(out, "{ERROR_TROUBLESHOOTING}")?;
        }
        Err(err) => writeln!(out, "Error: {err}")?,
    }
    Ok(())
}

/// History rows in grid order: newest first, `HISTORY_GRID_COLUMNS` per row.
fn format_history_rows(entries: &[&HistoryEntry]) -> Vec<String> {
    entries
        .chunks(HISTORY_GRID_COLUMNS)
        .map(|row| {
            row.iter()
                .map(|entry| {
                    format!(
                        "[{} | {} | {}x{}]",
                        entry.caption(),
                        entry.timestamp_label(),
                        entry.image.width(),
                        entry.image.height()
                    )
                })
                .collect::<Vec<String>>()
                .join("  ")
        })
        .collect()
}

fn status_rows(generator: &SelfieGenerator, inputs: &SelfieInputs) -> Vec<String> {
    let session = generator.session();
    let upload = inputs
        .upload()
        .map(|upload| upload.file_name().to_string())
        .unwrap_or_else(|| "none".to_string());
    let current = session
        .current()
        .map(|current| {
            format!(
                "{} - {} ({}x{})",
                current.record.persona,
                current.record.style,
                current.image.width(),
                current.image.height()
            )
        })
        .unwrap_or_else(|| "none".to_string());
    vec![
        format!("Footballer: {}", inputs.persona),
        format!("Style: {}", inputs.style),
        format!("Photo: {upload}"),
        format!("Current selfie: {current}"),
        format!(
            "History: {} kept, {} generated",
            session.history().len(),
            session.history().total_recorded()
        ),
        format!("Model: {} via {}", generator.model(), generator.backend_name()),
    ]
}

fn value_as_string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}
