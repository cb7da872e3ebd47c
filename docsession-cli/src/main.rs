use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use docsession_core::{
    Command, DocumentProvider, FileBlobStore, FsIdentityResolver, LaunchInputs, NavFeedback,
    PersistentStore, Rect, RestorePolicy, SaveScheduler, Session, SessionConfig, SessionEvent,
    SystemClock,
};
use docsession_pdf::PdfiumSurfaceFactory;
use docsession_tty::{
    frame_for_terminal, ring_bell, status_label, write_status_line, EventMapper, UiEvent,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Upper bound on how long the loop sleeps waiting for input.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(
    name = "docsession",
    version,
    about = "Terminal document viewer that remembers where you were"
)]
struct Args {
    /// Document to open; without one the previous session is restored
    files: Vec<PathBuf>,

    /// Directory holding the saved session and document history
    #[arg(long = "state-dir")]
    state_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Print the restore plan as JSON and exit
    #[arg(long = "plan")]
    plan: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let project_dirs = ProjectDirs::from("net", "docsession", "docsession");

    let (state_dir, log_dir) = match (&args.state_dir, &project_dirs) {
        (Some(dir), _) => (dir.clone(), dir.join("logs")),
        (None, Some(dirs)) => (
            dirs.data_local_dir().join("state"),
            dirs.data_local_dir().join("logs"),
        ),
        (None, None) => {
            return Err(anyhow!(
                "unable to resolve platform data directories; pass --state-dir"
            ))
        }
    };
    let _log_guard = init_logging(&log_dir)?;

    let config_path = args
        .config
        .clone()
        .or_else(|| project_dirs.as_ref().map(|d| d.config_dir().join("config.toml")));
    let config = match &config_path {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    if let Some(extra) = args.files.get(1..).filter(|rest| !rest.is_empty()) {
        warn!(ignored = ?extra, "only one document can be given; extra arguments ignored");
    }

    let blobs = Arc::new(FileBlobStore::new(state_dir)?);
    let store = PersistentStore::open_with_limits(
        blobs,
        Arc::new(FsIdentityResolver::new()),
        config.archive_capacity,
        config.eviction,
    );
    let inputs = LaunchInputs::new(args.files.first().cloned())
        .with_requested_from_env(&config.requested_files_env);
    let plan = RestorePolicy::new(&store)
        .plan(&inputs)
        .context("usage: docsession [FILE]")?;

    if args.plan {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    if plan.windows.is_empty() {
        return Err(anyhow!(
            "nothing to open: no previous session; usage: docsession [FILE]"
        ));
    }

    let provider = PdfiumSurfaceFactory::new()?;
    let scheduler = SaveScheduler::new(config.save_delay(), Arc::new(SystemClock));
    let mut session = Session::new(store, scheduler);
    let opened = session.restore(&provider, &plan).await;
    info!(opened, planned = plan.windows.len(), "session restored");
    if opened == 0 {
        return Err(anyhow!("none of the planned documents could be opened"));
    }

    run(&mut session, &provider).await
}

async fn run(session: &mut Session, provider: &PdfiumSurfaceFactory) -> Result<()> {
    let mut stdout = io::stdout();
    let outcome = match RawModeGuard::new() {
        Ok(_raw) => {
            let frame = terminal::size()
                .ok()
                .map(|(columns, rows)| frame_for_terminal(columns, rows));
            event_loop(session, provider, frame, next_terminal_event, &mut stdout).await
        }
        Err(err) => Err(err),
    };
    finish(session, outcome, &mut stdout)
}

/// Always runs the termination sequence, then reports the loop's outcome.
fn finish<W: Write>(session: &mut Session, outcome: Result<()>, out: &mut W) -> Result<()> {
    session.terminate();
    let cleared = crossterm::execute!(out, Clear(ClearType::All), cursor::MoveTo(0, 0));
    outcome?;
    cleared?;
    Ok(())
}

fn next_terminal_event(timeout: Duration) -> io::Result<Option<Event>> {
    if event::poll(timeout)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

/// Every window fills the terminal, so they all share one frame.
fn fit_windows(session: &mut Session, frame: Rect) -> Result<()> {
    let active = session.active_index();
    for index in 0..session.windows().len() {
        session.apply(Command::SwitchWindow { index })?;
        session.apply(Command::ResizeWindow { frame })?;
    }
    session.apply(Command::SwitchWindow { index: active })
}

async fn event_loop<P, I, W>(
    session: &mut Session,
    provider: &P,
    frame: Option<Rect>,
    mut next_event: I,
    out: &mut W,
) -> Result<()>
where
    P: DocumentProvider + ?Sized,
    I: FnMut(Duration) -> io::Result<Option<Event>>,
    W: Write,
{
    crossterm::execute!(out, cursor::Hide, Clear(ClearType::All))?;
    if let Some(frame) = frame {
        fit_windows(session, frame)?;
    }
    let mut mapper = EventMapper::new();
    let mut feedback: Option<NavFeedback> = None;
    let mut dirty = true;

    loop {
        for event in session.drain_events() {
            if let SessionEvent::Feedback(message) = event {
                ring_bell(out)?;
                feedback = Some(message);
            }
            dirty = true;
        }
        if session.windows().is_empty() {
            break;
        }
        if dirty {
            redraw(out, session, &mapper, feedback.as_ref())?;
            dirty = false;
        }

        let timeout = session
            .next_save_in()
            .map_or(IDLE_POLL, |due| due.min(IDLE_POLL));
        if let Some(event) = next_event(timeout)? {
            match mapper.map_event(event) {
                UiEvent::Command(command) => {
                    feedback = None;
                    session.apply(command)?;
                }
                UiEvent::CloseActiveWindow => {
                    let index = session.active_index();
                    session.apply(Command::CloseWindow { index })?;
                }
                UiEvent::DuplicateWindow => {
                    if let Err(err) = session.duplicate_active(provider).await {
                        warn!(error = %format!("{err:#}"), "failed to duplicate window");
                    }
                }
                UiEvent::Resize { columns, rows } => {
                    fit_windows(session, frame_for_terminal(columns, rows))?;
                }
                UiEvent::Quit => break,
                UiEvent::None => {}
            }
            dirty = true;
        }
        session.pump();
    }
    Ok(())
}

fn redraw<W: Write>(
    stdout: &mut W,
    session: &Session,
    mapper: &EventMapper,
    feedback: Option<&NavFeedback>,
) -> Result<()> {
    let Some(window) = session.active() else {
        return Ok(());
    };
    let pending = mapper.pending_input();
    let label = status_label(
        window,
        session.active_index(),
        session.windows().len(),
        pending.as_deref(),
        feedback,
    );
    write_status_line(stdout, &label)?;

    let others: Vec<String> = session
        .windows()
        .iter()
        .enumerate()
        .map(|(index, window)| {
            let name = window
                .path()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let marker = if index == session.active_index() { "*" } else { " " };
            format!("{marker}{}:{name}", index + 1)
        })
        .collect();
    crossterm::queue!(stdout, cursor::MoveTo(0, 1), Clear(ClearType::CurrentLine))?;
    write!(stdout, "{}", others.join("  "))?;
    stdout.flush()?;
    Ok(())
}

fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory at {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "docsession.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout belongs to the terminal UI and to `--plan`.
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
