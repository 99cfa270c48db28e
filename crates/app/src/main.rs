use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use exam_core::model::{InputEvent, QuestionId, RawSignal};
use exam_core::{Clock, ExamConfig};
use services::{
    FULLSCREEN_ADVISORY, HttpBackend, SessionController, SessionInput, SessionRuntime, SubmitCause,
};
use storage::repository::SnapshotStore;
use storage::sqlite::SqliteStore;
use tokio::sync::mpsc;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDuration { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDuration { raw } => {
                write!(f, "invalid --duration-min value: {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- run   [--server <url>] [--db <sqlite_url>] [--duration-min <n>] [--no-fullscreen]"
    );
    eprintln!("  cargo run -p app -- reset [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults for run:");
    eprintln!("  --server http://127.0.0.1:8000");
    eprintln!("  --db sqlite:exam_state.sqlite3");
    eprintln!("  --duration-min 90");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_SERVER_URL, EXAM_DB_URL, EXAM_DURATION_MIN");
    eprintln!();
    eprintln!("Signal lines on stdin:");
    eprintln!("  hidden | visible | blur | fullscreen-on | fullscreen-off");
    eprintln!("  pagehide | beforeunload | back | contextmenu | copy | cut | paste");
    eprintln!("  key <name> [ctrl]");
    eprintln!("  answer <question_id> <value>");
    eprintln!("  submit   (EOF also submits)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

struct Args {
    server_url: String,
    db_url: String,
    duration_min: u32,
    no_fullscreen: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut server_url = std::env::var("EXAM_SERVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        let mut db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://exam_state.sqlite3".into(), normalize_sqlite_url);
        let mut duration_min = std::env::var("EXAM_DURATION_MIN")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(90);
        let mut no_fullscreen = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--server" => {
                    server_url = require_value(args, "--server")?;
                }
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--duration-min" => {
                    let value = require_value(args, "--duration-min")?;
                    duration_min = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(ArgsError::InvalidDuration { raw: value })?;
                }
                "--no-fullscreen" => {
                    no_fullscreen = true;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            server_url,
            db_url,
            duration_min,
            no_fullscreen,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Map one stdin line onto a session input. `None` for blank or
/// unrecognized lines.
fn parse_input_line(line: &str) -> Option<SessionInput> {
    let mut parts = line.split_whitespace();
    let head = parts.next()?;
    match head {
        "hidden" => Some(SessionInput::Signal(RawSignal::VisibilityHidden)),
        "visible" => Some(SessionInput::Signal(RawSignal::VisibilityVisible)),
        "blur" => Some(SessionInput::Signal(RawSignal::WindowBlur)),
        "fullscreen-on" => Some(SessionInput::Signal(RawSignal::FullscreenEntered)),
        "fullscreen-off" => Some(SessionInput::Signal(RawSignal::FullscreenExited)),
        "pagehide" => Some(SessionInput::Signal(RawSignal::PageHide)),
        "beforeunload" => Some(SessionInput::Signal(RawSignal::BeforeUnload)),
        "back" => Some(SessionInput::Input(InputEvent::BackNavigation)),
        "contextmenu" => Some(SessionInput::Input(InputEvent::ContextMenu)),
        "copy" => Some(SessionInput::Input(InputEvent::Copy)),
        "cut" => Some(SessionInput::Input(InputEvent::Cut)),
        "paste" => Some(SessionInput::Input(InputEvent::Paste)),
        "key" => {
            let key = parts.next()?.to_string();
            let ctrl_or_meta = parts.next() == Some("ctrl");
            Some(SessionInput::Input(InputEvent::KeyDown { key, ctrl_or_meta }))
        }
        "answer" => {
            let question = QuestionId::new(parts.next()?);
            let value = parts.next()?.to_string();
            Some(SessionInput::Answer { question, value })
        }
        "submit" => Some(SessionInput::Submit),
        _ => None,
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<SessionInput>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_input_line(&line) {
                Some(input) => {
                    if tx.blocking_send(input).is_err() {
                        break;
                    }
                }
                None => {
                    if !line.trim().is_empty() {
                        tracing::warn!(line = line.trim(), "unrecognized input line");
                    }
                }
            }
        }
        // Dropping the sender closes the channel, which the runtime treats
        // as the user submitting.
    });
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let store = SqliteStore::connect(&args.db_url).await?;
    store.migrate().await?;

    match cmd {
        Command::Reset => {
            store.clear().await?;
            eprintln!("reset: persisted exam state cleared (db={}).", args.db_url);
            Ok(())
        }
        Command::Run => {
            let config = ExamConfig::with_duration_min(args.duration_min)?;
            let backend = Arc::new(HttpBackend::new(args.server_url.clone()));
            let controller = SessionController::resume_or_start(
                config,
                Clock::default_clock(),
                Arc::new(store),
                backend,
            )
            .await?;

            if args.no_fullscreen {
                println!("{FULLSCREEN_ADVISORY}");
            }

            let view = controller.view();
            println!("time remaining: {}", view.countdown);
            for (question, value) in &view.answers {
                // Restored selections, for the host to re-check.
                println!("restored answer: {question} = {value}");
            }
            if view.violation_count > 0 {
                println!("violations so far: {}", view.violation_count);
            }

            let (tx, rx) = mpsc::channel(64);
            spawn_stdin_reader(tx);

            let receipt = SessionRuntime::new(controller, rx).run().await?;
            match receipt.cause {
                SubmitCause::ViolationBlock => println!("exam blocked and auto-submitted."),
                SubmitCause::TimeExpired => println!("time is up; exam auto-submitted."),
                SubmitCause::UserSubmit => println!("exam submitted."),
            }
            println!("submitted answers: {}", receipt.answers_json);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
