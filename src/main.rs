mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use scantap::{
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore, ScanConfig},
    dispatch::{Callbacks, Scan},
    engine::{Outcome, ScanEngine},
    error::{ConfigError, SinkError},
    field::{InputField, SharedField},
    history::ScanHistory,
    ingest::{EventTarget, Key, KeyInput},
    runtime::{CrosstermEventSource, FixedTicker, Runner, ScanEvent},
    simulate::{Keystroke, Pacing, ScannerSimulator},
    transport::TransportMode,
};
use std::{
    cell::RefCell,
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    rc::Rc,
    sync::mpsc::Sender,
    thread,
    time::{Duration, Instant},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TICK_RATE_MS: u64 = 250;

#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A scan console: tells keyboard-wedge barcode scans apart from manual typing in real time, without any out-of-band signal from the scanner."
)]
pub struct Cli {
    /// minimum decoded length accepted as a scan
    #[clap(long)]
    min_length: Option<usize>,

    /// maximum expected scan length
    #[clap(long)]
    max_length: Option<usize>,

    /// pin the transport profile instead of inferring it from timing
    #[clap(short = 't', long, value_enum)]
    transport: Option<TransportMode>,

    /// key that ends a scan: enter, tab, or a single character (repeatable)
    #[clap(long = "terminator", value_parser = parse_terminator)]
    terminators: Vec<Key>,

    /// never finalize a scan on silence, only on a terminator
    #[clap(long)]
    no_auto_submit: bool,

    /// use the short quiescence window for fast bursts even when terminators are configured
    #[clap(long)]
    no_wait_for_terminator: bool,

    /// leave the scan field untouched after a dispatch
    #[clap(long)]
    keep_input: bool,

    /// ignore keystrokes when neither field has focus
    #[clap(long)]
    no_page_fallback: bool,

    /// config file to load (defaults to the user config directory)
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// write the effective configuration back to the config file
    #[clap(long)]
    save_config: bool,

    /// CSV file the history is exported to with F3
    #[clap(short = 'e', long)]
    export: Option<PathBuf>,

    /// write logs to this file (the terminal is owned by the UI)
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// log filter, e.g. "debug" or "scantap=trace"
    #[clap(long, default_value = "info")]
    log_level: String,
}

fn parse_terminator(s: &str) -> Result<Key, String> {
    match s.to_lowercase().as_str() {
        "enter" | "return" => Ok(Key::Enter),
        "tab" => Ok(Key::Tab),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if !c.is_control() => Ok(Key::Char(c)),
                _ => Err(format!(
                    "'{s}' is not a terminator (use enter, tab or a single character)"
                )),
            }
        }
    }
}

impl Cli {
    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }

    /// Overlays command line flags on a loaded configuration.
    fn apply(&self, mut config: ScanConfig) -> ScanConfig {
        if let Some(min) = self.min_length {
            config.min_length = min;
        }
        if let Some(max) = self.max_length {
            config.max_length = max;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if !self.terminators.is_empty() {
            config.terminators = self.terminators.clone();
        }
        if self.no_auto_submit {
            config.auto_submit = false;
        }
        if self.no_wait_for_terminator {
            config.wait_for_terminator = false;
        }
        if self.keep_input {
            config.clear_host_input_on_dispatch = false;
        }
        if self.no_page_fallback {
            config.page_fallback = false;
        }
        config
    }

    fn export_path(&self) -> PathBuf {
        self.export.clone().unwrap_or_else(|| {
            AppDirs::export_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scans.csv")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Focus {
    #[strum(serialize = "scan field")]
    ScanField,
    #[strum(serialize = "notes")]
    Notes,
    #[strum(serialize = "page")]
    Page,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::ScanField => Focus::Notes,
            Focus::Notes => Focus::Page,
            Focus::Page => Focus::ScanField,
        }
    }

    fn target(self) -> EventTarget {
        match self {
            Focus::ScanField => EventTarget::BoundInput,
            Focus::Notes => EventTarget::OtherEditable,
            Focus::Page => EventTarget::Page,
        }
    }
}

pub struct App {
    pub engine: ScanEngine<Callbacks>,
    pub field: SharedField,
    pub notes: InputField,
    pub history: Rc<RefCell<ScanHistory>>,
    pub focus: Focus,
    pub status: String,
    pub export_path: PathBuf,
}

impl App {
    pub fn new(config: ScanConfig, export_path: PathBuf) -> Result<Self, ConfigError> {
        let history = Rc::new(RefCell::new(ScanHistory::default()));
        let recorder = Rc::clone(&history);
        let sink = Callbacks::new(move |scan: &Scan| -> Result<(), SinkError> {
            recorder.borrow_mut().record(scan);
            Ok(())
        })
        .on_complete(|scan: &Scan| -> Result<(), SinkError> {
            tracing::debug!(
                value = %scan.value,
                elapsed_ms = scan.duration().as_millis() as u64,
                "scan complete"
            );
            Ok(())
        });

        let mut engine = ScanEngine::new(config, sink)?;
        let field = SharedField::new();
        engine.bind(field.clone());

        Ok(Self {
            engine,
            field,
            notes: InputField::new(),
            history,
            focus: Focus::ScanField,
            status: "ready".to_string(),
            export_path,
        })
    }

    /// Routes a keystroke to whichever widget has focus, then through the engine.
    pub fn feed(&mut self, input: KeyInput, now: Instant) {
        match input.target {
            EventTarget::BoundInput => {
                self.field.borrow_mut().apply_key(&input);
            }
            EventTarget::OtherEditable => {
                self.notes.apply_key(&input);
            }
            EventTarget::Page => {}
        }
        let outcome = self.engine.handle_key(&input, now);
        self.note(&outcome);
    }

    pub fn on_tick(&mut self, now: Instant) {
        for outcome in self.engine.tick(now) {
            self.note(&outcome);
        }
    }

    pub fn cycle_focus(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.status = "engine reset".to_string();
    }

    pub fn abort(&mut self) {
        self.engine.abort();
        self.status = "engine aborted, input re-enabled".to_string();
    }

    pub fn export(&mut self) {
        self.status = match self.history.borrow().export_csv(&self.export_path) {
            Ok(rows) => format!("exported {} scans to {}", rows, self.export_path.display()),
            Err(err) => format!("export failed: {}", err),
        };
    }

    /// A simulated burst aimed at whatever currently has focus.
    pub fn simulated_burst(&self, pacing: Pacing) -> Vec<Keystroke> {
        let mut simulator = ScannerSimulator::new(self.focus.target());
        let code = simulator.random_ean13();
        let terminator = match pacing {
            Pacing::Fast => self.engine.config().terminators.first().copied(),
            Pacing::Moderate | Pacing::Manual => None,
        };
        simulator.burst(&code, pacing, terminator)
    }

    fn note(&mut self, outcome: &Outcome) {
        let status = match outcome {
            Outcome::Ignored | Outcome::Buffered | Outcome::Released => return,
            Outcome::Dropped(reason) => format!("input dropped ({})", reason),
            Outcome::Discarded(reason) => format!("not a scan ({})", reason),
            Outcome::Dispatched(scan) => format!(
                "scanned {} [{} / {}]",
                scan.value, scan.profile, scan.completion
            ),
            Outcome::EmergencyStop(reason) => format!("EMERGENCY STOP ({}), input locked", reason),
            Outcome::Unblocked => "input unlocked".to_string(),
        };
        self.status = status;
    }
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let Some(log_file) = &cli.log_file else {
        return Ok(());
    };
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    init_logging(&cli)?;

    let store = cli.config_store();
    let config = cli.apply(store.load());
    if let Err(err) = config.validate() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::ValueValidation, err).exit();
    }
    if cli.save_config {
        store.save(&config)?;
        tracing::info!(path = %store.path().display(), "configuration saved");
    }

    let mut app = App::new(config, cli.export_path())?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let source = CrosstermEventSource::new();
    let injector = source.injector();
    let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));

    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        let event = runner.step(app.engine.next_deadline());
        let now = Instant::now();
        match event {
            ScanEvent::Tick | ScanEvent::Resize => {}
            ScanEvent::Injected(input) => app.feed(input, now),
            ScanEvent::Key(key) if key.kind != KeyEventKind::Release => {
                if handle_control_key(app, &key, &injector) == ControlFlow::Quit {
                    break;
                }
            }
            ScanEvent::Key(_) => {}
        }
        app.on_tick(Instant::now());
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ControlFlow {
    Continue,
    Quit,
}

fn handle_control_key(app: &mut App, key: &KeyEvent, injector: &Sender<ScanEvent>) -> ControlFlow {
    match key.code {
        // ctrl+c to quit
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return ControlFlow::Quit;
        }
        KeyCode::F(2) => app.cycle_focus(),
        KeyCode::F(3) => app.export(),
        KeyCode::F(4) => inject(injector, app.simulated_burst(Pacing::Fast)),
        KeyCode::F(5) => app.reset(),
        KeyCode::F(6) => inject(injector, app.simulated_burst(Pacing::Moderate)),
        KeyCode::F(8) => app.abort(),
        _ => {
            if let Some(input) = KeyInput::from_crossterm(key, app.focus.target()) {
                app.feed(input, Instant::now());
            }
        }
    }
    ControlFlow::Continue
}

/// Replays a burst on its own thread with the burst's own timing.
fn inject(injector: &Sender<ScanEvent>, strokes: Vec<Keystroke>) {
    let tx = injector.clone();
    thread::spawn(move || {
        let start = Instant::now();
        for stroke in strokes {
            let due = start + stroke.offset;
            thread::sleep(due.saturating_duration_since(Instant::now()));
            if tx.send(ScanEvent::Injected(stroke.input)).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use scantap::ingest::Modifiers;
    use std::sync::mpsc;

    fn app() -> App {
        App::new(ScanConfig::default(), PathBuf::from("scans.csv")).unwrap()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn type_burst(app: &mut App, text: &str, start: Instant, gap: u64) -> Instant {
        let mut now = start;
        for c in text.chars() {
            app.feed(KeyInput::char(c, app.focus.target()), now);
            now += ms(gap);
        }
        now
    }

    #[test]
    fn test_parse_terminator() {
        assert_eq!(parse_terminator("enter"), Ok(Key::Enter));
        assert_eq!(parse_terminator("Return"), Ok(Key::Enter));
        assert_eq!(parse_terminator("TAB"), Ok(Key::Tab));
        assert_eq!(parse_terminator("#"), Ok(Key::Char('#')));
        assert!(parse_terminator("##").is_err());
        assert!(parse_terminator("").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "scantap",
            "--min-length",
            "8",
            "--max-length",
            "13",
            "-t",
            "moderate",
            "--terminator",
            "enter",
            "--terminator",
            "#",
            "--no-auto-submit",
            "--keep-input",
        ]);
        let config = cli.apply(ScanConfig::default());
        assert_eq!(config.min_length, 8);
        assert_eq!(config.max_length, 13);
        assert_eq!(config.transport, TransportMode::Moderate);
        assert_eq!(config.terminators, vec![Key::Enter, Key::Char('#')]);
        assert!(!config.auto_submit);
        assert!(!config.clear_host_input_on_dispatch);
        assert!(config.wait_for_terminator);
        assert!(config.page_fallback);
    }

    #[test]
    fn test_cli_without_flags_keeps_loaded_config() {
        let cli = Cli::parse_from(["scantap"]);
        let loaded = ScanConfig {
            min_length: 6,
            ..ScanConfig::default()
        };
        assert_eq!(cli.apply(loaded.clone()), loaded);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_cli_export_path() {
        let cli = Cli::parse_from(["scantap", "-e", "/tmp/out.csv"]);
        assert_eq!(cli.export_path(), PathBuf::from("/tmp/out.csv"));
        let default = Cli::parse_from(["scantap"]);
        assert!(default.export_path().ends_with("scans.csv"));
    }

    #[test]
    fn test_focus_cycle() {
        let mut app = app();
        assert_eq!(app.focus, Focus::ScanField);
        app.cycle_focus();
        assert_eq!(app.focus, Focus::Notes);
        app.cycle_focus();
        assert_eq!(app.focus, Focus::Page);
        app.cycle_focus();
        assert_eq!(app.focus, Focus::ScanField);
        assert_eq!(Focus::Notes.target(), EventTarget::OtherEditable);
    }

    #[test]
    fn test_scan_into_field_records_history_and_clears_field() {
        let mut app = app();
        let t0 = Instant::now();
        let now = type_burst(&mut app, "8901234", t0, 10);
        app.feed(KeyInput::new(Key::Enter, EventTarget::BoundInput), now);

        assert_eq!(app.history.borrow().len(), 1);
        assert_eq!(app.history.borrow().latest().unwrap().value, "8901234");
        assert_eq!(app.field.borrow().value(), "");
        assert!(app.status.starts_with("scanned 8901234"));
    }

    #[test]
    fn test_typing_in_notes_is_left_alone() {
        let mut app = app();
        app.cycle_focus();
        let t0 = Instant::now();
        let now = type_burst(&mut app, "8901234", t0, 10);
        app.feed(KeyInput::new(Key::Enter, EventTarget::OtherEditable), now);

        assert_eq!(app.notes.value(), "8901234");
        assert!(app.history.borrow().is_empty());
        assert_eq!(app.engine.buffer(), "");
    }

    #[test]
    fn test_page_scan_without_focus() {
        let mut app = app();
        app.focus = Focus::Page;
        let t0 = Instant::now();
        let now = type_burst(&mut app, "ABC-123", t0, 8);
        app.feed(KeyInput::new(Key::Enter, EventTarget::Page), now);
        assert_eq!(app.history.borrow().latest().unwrap().value, "ABC-123");
    }

    #[test]
    fn test_abort_key_locks_field_and_f8_unlocks() {
        let mut app = app();
        let t0 = Instant::now();
        app.feed(KeyInput::char('1', EventTarget::BoundInput), t0);
        app.feed(KeyInput::new(Key::Escape, EventTarget::BoundInput), t0 + ms(5));
        assert!(app.engine.is_blocked());
        assert!(app.field.borrow().is_disabled());
        assert!(app.status.contains("EMERGENCY STOP"));

        app.abort();
        assert!(!app.engine.is_blocked());
        assert!(!app.field.borrow().is_disabled());
    }

    #[test]
    fn test_lockout_expires_on_tick() {
        let mut app = app();
        let t0 = Instant::now();
        app.feed(KeyInput::new(Key::Escape, EventTarget::Page), t0);
        app.on_tick(t0 + ms(1999));
        assert!(app.engine.is_blocked());
        app.on_tick(t0 + ms(2000));
        assert!(!app.engine.is_blocked());
        assert_eq!(app.status, "input unlocked");
    }

    #[test]
    fn test_export_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(ScanConfig::default(), dir.path().join("scans.csv")).unwrap();
        let t0 = Instant::now();
        let now = type_burst(&mut app, "4006381333931", t0, 5);
        app.feed(KeyInput::new(Key::Tab, EventTarget::BoundInput), now);
        app.export();
        assert!(app.status.starts_with("exported 1 scans"));
        assert!(dir.path().join("scans.csv").exists());
    }

    #[test]
    fn test_simulated_fast_burst_ends_with_terminator() {
        let app = app();
        let strokes = app.simulated_burst(Pacing::Fast);
        assert_eq!(strokes.len(), 14);
        assert_eq!(strokes.last().unwrap().input.key, Key::Enter);
        let moderate = app.simulated_burst(Pacing::Moderate);
        assert_eq!(moderate.len(), 13);
    }

    #[test]
    fn test_control_keys() {
        let mut app = app();
        let (tx, rx) = mpsc::channel();

        let f2 = KeyEvent::new(KeyCode::F(2), KeyModifiers::NONE);
        assert_eq!(handle_control_key(&mut app, &f2, &tx), ControlFlow::Continue);
        assert_eq!(app.focus, Focus::Notes);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle_control_key(&mut app, &ctrl_c, &tx), ControlFlow::Quit);

        let f4 = KeyEvent::new(KeyCode::F(4), KeyModifiers::NONE);
        handle_control_key(&mut app, &f4, &tx);
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match first {
            ScanEvent::Injected(input) => assert_eq!(input.target, EventTarget::OtherEditable),
            other => panic!("expected injected keystroke, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_char_reaches_field() {
        let mut app = app();
        let key = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        let (tx, _rx) = mpsc::channel();
        handle_control_key(&mut app, &key, &tx);
        assert_eq!(app.field.borrow().value(), "x");
        assert_eq!(app.engine.buffer(), "x");

        let shortcut = KeyInput::char('v', EventTarget::BoundInput).with_modifiers(Modifiers {
            ctrl: true,
            ..Modifiers::none()
        });
        let outcome = app.engine.handle_key(&shortcut, Instant::now());
        assert_eq!(outcome, Outcome::Ignored);
    }
}
