use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{info, warn};

use taltext::audio::{LevelTap, SpectrumAnalyzer};
use taltext::clipboard;
use taltext::config::{self, Config, Theme};
use taltext::export::{self, ExportError, ExportFormat};
use taltext::recognition::{
    download, Recognizer, RecognizerEvent, UnavailableRecognizer, WhisperRecognizer,
};
use taltext::session::{SessionController, Update};
use taltext::telemetry;
use taltext::ui::{Frame, Overlay, Screen, StatusKind, StatusLine, StatusNote};
use taltext::visualizer::Visualizer;
use taltext::vocab;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize telemetry
    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    info!("taltext starting");

    // Bring up the recognition backend; failure leaves the shell usable
    // with recording keys disabled
    let (events_tx, events_rx) = unbounded();
    let (recognizer, tap, controls_enabled) = init_recognizer(&config, events_tx);

    let mut app = App::new(&config, recognizer, tap, controls_enabled)?;
    let mut screen = Screen::enter()?;

    let outcome = run(&mut app, &mut screen, &events_rx, &config).await;

    drop(screen);
    info!("taltext stopped");
    outcome
}

/// Main event loop: drain recognizer notifications, poll terminal events,
/// tick the meter and the status revert timer, redraw
async fn run(
    app: &mut App,
    screen: &mut Screen,
    events: &Receiver<RecognizerEvent>,
    config: &Config,
) -> Result<()> {
    let tick = Duration::from_millis(config.ui.tick_ms.max(10));

    loop {
        while let Ok(event) = events.try_recv() {
            let update = app.controller.handle(event);
            app.apply(update);
        }

        while event::poll(Duration::ZERO).context("failed to poll terminal events")? {
            let event = event::read().context("failed to read terminal event")?;
            if app.handle_event(&event, screen)? {
                return Ok(());
            }
        }

        app.tick();
        screen.draw(&app.frame())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
            () = tokio::time::sleep(tick) => {}
        }
    }
}

fn init_recognizer(
    config: &Config,
    events: Sender<RecognizerEvent>,
) -> (Box<dyn Recognizer>, LevelTap, bool) {
    match spawn_backend(config, events) {
        Ok(recognizer) => {
            let tap = recognizer.level_tap();
            (Box::new(recognizer), tap, true)
        }
        Err(e) => {
            warn!(error = %e, "recognition backend unavailable");
            (Box::new(UnavailableRecognizer), LevelTap::default(), false)
        }
    }
}

fn spawn_backend(config: &Config, events: Sender<RecognizerEvent>) -> Result<WhisperRecognizer> {
    let model_path = Config::expand_path(&config.recognition.model_path)?;
    download::ensure_model(&config.recognition.model, &model_path)
        .context("failed to fetch recognition model")?;
    WhisperRecognizer::spawn(&config.recognition, &config.audio, events)
}

/// Everything the loop mutates, in one place
struct App {
    controller: SessionController,
    status: StatusLine,
    visualizer: Visualizer,
    analyzer: SpectrumAnalyzer,
    tap: LevelTap,
    theme: Theme,
    interim: String,
    overlay: Option<Overlay>,
    controls_enabled: bool,
    output_dir: PathBuf,
}

impl App {
    fn new(
        config: &Config,
        recognizer: Box<dyn Recognizer>,
        tap: LevelTap,
        controls_enabled: bool,
    ) -> Result<Self> {
        let mut status = StatusLine::new();
        if !controls_enabled {
            status.set(StatusNote::new(
                StatusKind::Error,
                "Speech recognition is not available.",
            ));
        }

        Ok(Self {
            controller: SessionController::new(recognizer, &config.recognition.locale),
            status,
            visualizer: Visualizer::new(),
            analyzer: SpectrumAnalyzer::new(),
            tap,
            theme: config::load_theme(config.ui.default_theme),
            interim: String::new(),
            overlay: None,
            controls_enabled,
            output_dir: Config::expand_path(&config.export.output_dir)?,
        })
    }

    fn frame(&self) -> Frame<'_> {
        Frame {
            theme: self.theme,
            locale_display: self.controller.locale().display_name,
            bars: self.visualizer.heights(),
            status: &self.status,
            transcript: self.controller.transcript(),
            interim: &self.interim,
            controls_enabled: self.controls_enabled,
            overlay: self.overlay,
        }
    }

    fn apply(&mut self, update: Update) {
        if let Some(note) = update.note {
            self.status.set(note);
        }
        if let Some(interim) = update.interim {
            self.interim = interim;
        }
    }

    /// One animation tick: the meter follows the microphone only while
    /// listening, otherwise it settles at the baseline
    fn tick(&mut self) {
        if self.controller.state().is_listening() {
            let bins = self.analyzer.bins(&self.tap.snapshot());
            self.visualizer.update(&bins);
        } else {
            self.visualizer.reset();
        }
        self.status.tick(Instant::now());
    }

    /// Returns true when the loop should exit
    fn handle_event(&mut self, event: &Event, screen: &mut Screen) -> Result<bool> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(*key, screen),
            Event::FocusLost => {
                let update = self.controller.on_focus_lost();
                self.apply(update);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn handle_key(&mut self, key: KeyEvent, screen: &mut Screen) -> Result<bool> {
        if let Some(overlay) = self.overlay.take() {
            return Ok(self.handle_overlay_key(overlay, key.code));
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        match key.code {
            KeyCode::Char('s') => self.start(),
            KeyCode::Char('x') => {
                let update = self.controller.stop();
                self.apply(update);
            }
            KeyCode::Char('p') => {
                let update = self.controller.pause();
                self.apply(update);
            }
            KeyCode::Char('c') => self.copy(),
            KeyCode::Char('w') => self.export(ExportFormat::Text),
            KeyCode::Char('d') => self.export(ExportFormat::Docx),
            KeyCode::Char('e') => self.edit(screen)?,
            KeyCode::Char('k') => self.request_clear(),
            KeyCode::Char('l') => self.cycle_locale(),
            KeyCode::Char('t') => self.toggle_theme(),
            KeyCode::Char('?') => self.overlay = Some(Overlay::Privacy),
            KeyCode::Char('q') => {
                if self.controller.transcript().trim().is_empty() {
                    return Ok(true);
                }
                self.overlay = Some(Overlay::ConfirmQuit);
            }
            _ => {}
        }
        Ok(false)
    }

    /// Overlay-gated keys; the overlay has already been taken down
    fn handle_overlay_key(&mut self, overlay: Overlay, code: KeyCode) -> bool {
        match (overlay, code) {
            (Overlay::ConfirmQuit, KeyCode::Char('q')) => return true,
            (Overlay::ConfirmClear, KeyCode::Char('k')) => {
                let update = self.controller.clear();
                self.apply(update);
                self.status
                    .flash(StatusNote::new(StatusKind::Success, "Transcript cleared."));
            }
            _ => {}
        }
        false
    }

    fn start(&mut self) {
        if !self.controls_enabled {
            self.status.flash(StatusNote::new(
                StatusKind::Error,
                "Speech recognition is not available.",
            ));
            return;
        }
        let update = self.controller.start();
        self.apply(update);
    }

    fn copy(&mut self) {
        match clipboard::copy_text(self.controller.transcript()) {
            Ok(()) => self
                .status
                .flash(StatusNote::new(StatusKind::Success, "Copied to clipboard!")),
            Err(e) => self
                .status
                .set(StatusNote::new(StatusKind::Error, format!("Copy failed: {e}"))),
        }
    }

    fn export(&mut self, format: ExportFormat) {
        let locale_display = self.controller.locale().display_name;
        match export::export(
            self.controller.transcript(),
            format,
            locale_display,
            &self.output_dir,
        ) {
            Ok(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.status
                    .flash(StatusNote::new(StatusKind::Success, format!("Saved {name}")));
            }
            Err(ExportError::EmptyTranscript) => {
                self.status
                    .flash(StatusNote::new(StatusKind::Warning, "Nothing to save."));
            }
            Err(e) => self
                .status
                .set(StatusNote::new(StatusKind::Error, format!("Save failed: {e}"))),
        }
    }

    fn request_clear(&mut self) {
        if self.controller.transcript().is_empty() {
            self.status.flash(StatusNote::new(
                StatusKind::Info,
                "Transcript is already empty.",
            ));
            return;
        }
        self.overlay = Some(Overlay::ConfirmClear);
    }

    fn cycle_locale(&mut self) {
        let locales = vocab::all();
        let current = self.controller.locale().tag;
        let index = locales
            .iter()
            .position(|v| v.tag == current)
            .unwrap_or_default();
        let next = &locales[(index + 1) % locales.len()];
        let update = self.controller.set_locale(next.tag);
        self.apply(update);
    }

    fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
        if let Err(e) = config::save_theme(self.theme) {
            warn!(error = %e, "theme preference not persisted");
        }
        self.status.flash(StatusNote::new(
            StatusKind::Info,
            format!("Theme: {}", self.theme.as_str()),
        ));
    }

    fn edit(&mut self, screen: &mut Screen) -> Result<()> {
        match edit_transcript(screen, self.controller.transcript())? {
            Some(edited) => {
                self.controller.set_transcript(edited);
                self.status
                    .flash(StatusNote::new(StatusKind::Success, "Transcript updated."));
            }
            None => self
                .status
                .flash(StatusNote::new(StatusKind::Warning, "Edit discarded.")),
        }
        Ok(())
    }
}

/// Round-trip the transcript through `$EDITOR`
///
/// Returns None when the editor exits nonzero; the screen is restored on
/// every path before errors propagate.
fn edit_transcript(screen: &mut Screen, current: &str) -> Result<Option<String>> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_owned());
    let path = std::env::temp_dir().join("taltext-transcript.txt");
    std::fs::write(&path, current).context("failed to write edit buffer")?;

    screen.suspend()?;
    let status = std::process::Command::new(&editor).arg(&path).status();
    screen.resume()?;

    let status = status.with_context(|| format!("failed to launch editor {editor}"))?;
    if !status.success() {
        let _ = std::fs::remove_file(&path);
        return Ok(None);
    }

    let edited = std::fs::read_to_string(&path).context("failed to read edit buffer")?;
    let _ = std::fs::remove_file(&path);
    Ok(Some(edited))
}
