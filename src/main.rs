use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use flick::{
    app::App,
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore},
    extract::{extract_from_reader, extract_text},
    focal::HighlightStrategy,
    runtime::{Clock, CrosstermEventSource, FixedTicker, ReaderEvent, ReaderEventSource, Runner, SystemClock, Ticker},
    stats::{export_csv, open_store},
    token::tokenize,
    ui::{format_secs, screen::current_screen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    io::{self, stdin, stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing::{info, warn, Level};

const TICK_RATE_MS: u64 = 100;

/// sleek speed-reading tui: one word at a time with focal-point highlighting
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Reads documents to you one word at a time (RSVP), highlighting the letter your eye should land on, and keeps a history of your reading sessions."
)]
pub struct Cli {
    /// document to read (.txt, .md, .docx, .pdf), or - for stdin
    file: Option<PathBuf>,

    /// read this text instead of a file
    #[clap(short = 't', long, conflicts_with = "file")]
    text: Option<String>,

    /// starting speed in words per minute
    #[clap(short = 'w', long)]
    wpm: Option<u32>,

    /// how the focal letters of each word are highlighted
    #[clap(short = 's', long, value_enum)]
    strategy: Option<HighlightStrategy>,

    /// print reading statistics and exit
    #[clap(long)]
    stats: bool,

    /// write the reading history as CSV to this path and exit
    #[clap(long, value_name = "PATH")]
    export_csv: Option<PathBuf>,

    /// statistics database to use instead of the default one
    #[clap(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// config file to use instead of the default one
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// log file to use instead of the default one
    #[clap(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// log debug events
    #[clap(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }

    /// Label stored with each session
    fn source_label(&self) -> Option<String> {
        match &self.file {
            Some(path) if path.as_os_str() != "-" => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Some(_) => Some("stdin".to_string()),
            None => None,
        }
    }

    fn load_text(&self) -> flick::error::Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) if path.as_os_str() == "-" => extract_from_reader(stdin().lock()),
            (None, Some(path)) => extract_text(path),
            (None, None) => Err(flick::error::Error::InvalidInput(
                "nothing to read: pass a file, - for stdin, or --text".to_string(),
            )),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.verbose);

    let config_store = cli.config_store();
    let mut config = config_store.load().with_overrides(cli.wpm, cli.strategy);

    if cli.stats || cli.export_csv.is_some() {
        return report(&cli);
    }

    let text = match cli.load_text() {
        Ok(text) => text,
        Err(e) => Cli::command().error(ErrorKind::Io, e.to_string()).exit(),
    };
    let tokens = match tokenize(&text) {
        Ok(tokens) => tokens,
        Err(e) => Cli::command().error(ErrorKind::InvalidValue, e.to_string()).exit(),
    };

    if !stdout().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdout must be a tty").exit();
    }

    info!(tokens = tokens.len(), wpm = config.wpm, strategy = %config.strategy, "starting reader");
    let store = open_store(cli.db.as_deref());
    let mut app = App::new(tokens, config.clone(), store, cli.source_label())?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let result = start_tui(&mut terminal, &mut app, &runner, &SystemClock);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;
    result?;

    // remember the last speed and highlighting for next time
    if config.wpm != app.scheduler.rate() || config.strategy != app.strategy {
        config.wpm = app.scheduler.rate();
        config.strategy = app.strategy;
        if let Err(e) = config_store.save(&config) {
            warn!(error = %e, "could not save config");
        }
    }

    Ok(())
}

fn start_tui<B: Backend, E: ReaderEventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
    clock: &impl Clock,
) -> Result<(), Box<dyn Error>> {
    while !app.should_quit {
        terminal.draw(|f| current_screen(&app.state).render(app, f))?;

        // wake up for the next word even when no key arrives
        let wait = app.wait_time(clock.now(), runner.interval());
        match runner.step_within(wait) {
            ReaderEvent::Key(key) => app.on_key(key, clock.now()),
            ReaderEvent::Resize | ReaderEvent::Tick => {}
        }
        app.on_tick(clock.now());
    }

    Ok(())
}

/// `--stats` / `--export-csv`: work on the history without a terminal UI
fn report(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let stats = open_store(cli.db.as_deref()).load();

    if let Some(path) = &cli.export_csv {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        export_csv(&stats, File::create(path)?)?;
        info!(path = %path.display(), sessions = stats.sessions.len(), "exported reading history");
        println!("exported {} sessions to {}", stats.sessions.len(), path.display());
    }

    if cli.stats {
        println!("sessions:      {}", stats.sessions.len());
        println!("words read:    {}", stats.total_words);
        println!("active time:   {}", format_secs(stats.total_active_secs));
        println!("average speed: {:.0} wpm", stats.average_wpm());
    }

    Ok(())
}

/// JSON logs to a file; the terminal belongs to the UI.
/// Logging is skipped when no log file can be opened.
fn init_logging(path: Option<&Path>, verbose: bool) {
    let Some(path) = path.map(Path::to_path_buf).or_else(AppDirs::log_path) else {
        return;
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .json()
        .with_writer(Mutex::new(file))
        .init();
}
