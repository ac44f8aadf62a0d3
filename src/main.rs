use anyhow::Result;
use clap::Parser;
use classdesk::cli;
use classdesk::config::Config;
use classdesk::session::{Session, SessionOptions};
use classdesk::storage::{FileStore, KeyValueStore, MemoryStore};
use classdesk::transcript::Transcript;
use classdesk::view::{AuthForm, ViewState};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "classdesk", about = "Task lists for teachers and students")]
pub struct Args {
    #[arg(long, help = "Config file path (replaces the default layers)")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "CLASSDESK_STORAGE", help = "Storage file path")]
    pub storage: Option<PathBuf>,

    #[arg(long, help = "Keep everything in memory; nothing is saved")]
    pub ephemeral: bool,

    #[arg(long, help = "Skip the splash screen")]
    pub no_intro: bool,

    #[arg(long, help = "Session transcripts directory")]
    pub transcripts_dir: Option<PathBuf>,

    #[arg(long, help = "Do not write a session transcript")]
    pub no_transcript: bool,

    #[arg(
        short = 'c',
        long = "command",
        value_name = "LINE",
        action = clap::ArgAction::Append,
        help = "Run a command and exit (repeatable)"
    )]
    pub commands: Vec<String>,

    #[arg(long, help = "Debug output")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.debug { "classdesk=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // CLI flags win over every config layer
    if let Some(path) = &args.storage {
        cfg.storage.path = Some(path.clone());
    }
    if args.no_intro || !args.commands.is_empty() {
        cfg.intro.enabled = Some(false);
    }
    if let Some(dir) = &args.transcripts_dir {
        cfg.transcript.dir = Some(dir.clone());
    }
    if args.no_transcript {
        cfg.transcript.enabled = Some(false);
    }

    if let Err(errors) = cfg.validate() {
        eprintln!("Invalid configuration:");
        for e in &errors {
            eprintln!("  {}", e);
        }
        std::process::exit(2);
    }

    let (storage, storage_label): (Rc<dyn KeyValueStore>, String) = if args.ephemeral {
        (
            Rc::new(MemoryStore::with_quota(cfg.storage.quota_bytes())),
            "memory (ephemeral)".to_string(),
        )
    } else {
        let path = cfg.storage.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = FileStore::open(&path, Some(cfg.storage.quota_bytes()))?;
        let label = store.path().display().to_string();
        (Rc::new(store), label)
    };
    tracing::debug!("storage: {}", storage_label);

    let options = SessionOptions {
        rollback_on_write_failure: cfg.storage.rollback_on_write_failure(),
    };
    let session = Session::new(storage, options);

    let session_id = uuid::Uuid::new_v4().to_string();
    let transcript = if cfg.transcript.enabled() {
        match Transcript::create(&cfg.transcript.dir(), &session_id) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("transcript disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let auth_mode = cfg.auth.default_mode();
    let ctx = cli::Context {
        play_intro: cfg.intro.enabled(),
        config: cfg,
        session: RefCell::new(session),
        view: RefCell::new(ViewState {
            auth_mode,
            ..ViewState::default()
        }),
        auth: RefCell::new(AuthForm::new(auth_mode)),
        transcript: RefCell::new(transcript),
        session_id,
        storage_label,
    };

    if args.commands.is_empty() {
        cli::run_repl(ctx)
    } else {
        cli::run_once(&ctx, &args.commands)
    }
}
