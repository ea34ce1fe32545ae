use anyhow::{Context, Result};
use crossterm::event::{DisableFocusChange, EnableFocusChange};
use crossterm::style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{cursor, execute, queue};
use std::io::{Stdout, Write};
use std::time::{Duration, Instant};

use crate::config::Theme;
use crate::visualizer::{bar_color, FULL_SCALE_HEIGHT, MIN_BAR_HEIGHT};

/// Idle status text
pub const READY_TEXT: &str = "Ready to record...";

/// How long transient notices stay up before reverting
pub const STATUS_REVERT: Duration = Duration::from_secs(2);

/// Styling class of a status message, mirrored in both theme palettes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Idle / neutral
    Ready,
    /// Actively listening or a completed action
    Success,
    /// Paused or a rejected action
    Warning,
    /// Surfaced failure
    Error,
    /// Informational, e.g. locale changes
    Info,
}

/// A status message with its styling class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNote {
    /// Styling class
    pub kind: StatusKind,
    /// Message text
    pub text: String,
}

impl StatusNote {
    /// Build a note
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// The status line: one current message, optionally reverting to the ready
/// text after a fixed delay
pub struct StatusLine {
    kind: StatusKind,
    text: String,
    revert_at: Option<Instant>,
}

impl StatusLine {
    /// Starts at the ready text
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: StatusKind::Ready,
            text: READY_TEXT.to_owned(),
            revert_at: None,
        }
    }

    /// Show a persistent message
    pub fn set(&mut self, note: StatusNote) {
        self.kind = note.kind;
        self.text = note.text;
        self.revert_at = None;
    }

    /// Show a transient message that reverts to the ready text
    pub fn flash(&mut self, note: StatusNote) {
        self.set(note);
        self.revert_at = Some(Instant::now() + STATUS_REVERT);
    }

    /// Revert an expired transient message; returns true if it reverted
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.revert_at.is_some_and(|deadline| now >= deadline) {
            self.set(StatusNote::new(StatusKind::Ready, READY_TEXT));
            return true;
        }
        false
    }

    /// Current message text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current styling class
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        self.kind
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Words in the transcript (whitespace-separated, zero for blank text)
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Characters in the transcript
#[must_use]
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// The word/character counter line
#[must_use]
pub fn stats_line(text: &str) -> String {
    format!(
        "Words: {} | Characters: {}",
        word_count(text),
        char_count(text)
    )
}

/// Foreground/background pair for a status kind under a theme
#[must_use]
pub const fn kind_colors(theme: Theme, kind: StatusKind) -> (Color, Color) {
    let success = (Color::Black, Color::Green);
    let warning = (Color::Black, Color::Yellow);
    let error = (Color::White, Color::Red);
    match (theme, kind) {
        (Theme::Dark, StatusKind::Ready | StatusKind::Info) => (Color::Cyan, Color::Reset),
        (Theme::Light, StatusKind::Ready | StatusKind::Info) => (Color::Blue, Color::Reset),
        (_, StatusKind::Success) => success,
        (_, StatusKind::Warning) => warning,
        (_, StatusKind::Error) => error,
    }
}

/// Dim text color under a theme
#[must_use]
pub const fn dim_color(theme: Theme) -> Color {
    match theme {
        Theme::Dark => Color::DarkGrey,
        Theme::Light => Color::Grey,
    }
}

const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Block glyph for a bar height, clamped at the full-scale height
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn bar_glyph(height: f32) -> char {
    let span = FULL_SCALE_HEIGHT - MIN_BAR_HEIGHT;
    let level = ((height - MIN_BAR_HEIGHT) / span * 7.0).clamp(0.0, 7.0);
    BAR_GLYPHS[level.round() as usize]
}

/// Full-screen overlays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    /// Privacy notice, dismissed by any key
    Privacy,
    /// Clear asks for a confirming second press
    ConfirmClear,
    /// Quit with an unsaved transcript asks for a confirming second press
    ConfirmQuit,
}

const PRIVACY_NOTICE: &[&str] = &[
    "Privacy",
    "",
    "Audio is captured from your microphone and transcribed locally on",
    "this machine. Nothing you say leaves the computer. The only network",
    "access is a one-time download of the recognition model on first run.",
    "",
    "Transcripts live in memory until you save, copy, or clear them.",
    "",
    "Press any key to close.",
];

const KEY_HINTS: &str =
    "s start  x stop  p pause  c copy  w save txt  d save docx  e edit  k clear  l language  t theme  ? privacy  q quit";

/// Everything one frame needs
pub struct Frame<'a> {
    /// Active theme
    pub theme: Theme,
    /// Display name of the active locale
    pub locale_display: &'a str,
    /// Bar heights from the visualizer
    pub bars: &'a [f32],
    /// Status line state
    pub status: &'a StatusLine,
    /// Accumulated transcript
    pub transcript: &'a str,
    /// Transient interim text, shown dim and never persisted
    pub interim: &'a str,
    /// False when the recognition backend failed to initialize
    pub controls_enabled: bool,
    /// Active overlay, if any
    pub overlay: Option<Overlay>,
}

/// Raw-mode alternate-screen terminal wrapper
///
/// Restores the terminal on drop, including the panic-unwind path.
pub struct Screen {
    out: Stdout,
    active: bool,
}

impl Screen {
    /// Enter raw mode on the alternate screen
    ///
    /// # Errors
    /// Returns error if the terminal refuses raw mode
    pub fn enter() -> Result<Self> {
        let mut out = std::io::stdout();
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(out, EnterAlternateScreen, EnableFocusChange, cursor::Hide)
            .context("failed to enter alternate screen")?;
        Ok(Self { out, active: true })
    }

    /// Temporarily hand the terminal back, e.g. for `$EDITOR`
    ///
    /// # Errors
    /// Returns error on terminal I/O failure
    pub fn suspend(&mut self) -> Result<()> {
        execute!(self.out, DisableFocusChange, cursor::Show, LeaveAlternateScreen)
            .context("failed to leave alternate screen")?;
        disable_raw_mode().context("failed to disable raw mode")?;
        self.active = false;
        Ok(())
    }

    /// Re-take the terminal after [`Self::suspend`]
    ///
    /// # Errors
    /// Returns error on terminal I/O failure
    pub fn resume(&mut self) -> Result<()> {
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(self.out, EnterAlternateScreen, EnableFocusChange, cursor::Hide)
            .context("failed to re-enter alternate screen")?;
        self.active = true;
        Ok(())
    }

    /// Redraw the whole frame
    ///
    /// # Errors
    /// Returns error on terminal I/O failure
    pub fn draw(&mut self, frame: &Frame<'_>) -> Result<()> {
        let (width, height) = terminal::size().unwrap_or((80, 24));
        let width = width.max(20) as usize;

        queue!(
            self.out,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0),
            ResetColor
        )?;

        if let Some(overlay) = frame.overlay {
            self.draw_overlay(overlay)?;
            return self.out.flush().context("failed to flush frame");
        }

        // Header
        queue!(self.out, SetForegroundColor(dim_color(frame.theme)))?;
        write!(
            self.out,
            "taltext | {} | theme: {}",
            frame.locale_display,
            frame.theme.as_str()
        )?;
        queue!(self.out, ResetColor, cursor::MoveTo(0, 1))?;

        // Bar meter
        for (i, &bar) in frame.bars.iter().enumerate() {
            let (r, g, b) = bar_color(i);
            queue!(self.out, SetForegroundColor(Color::Rgb { r, g, b }))?;
            write!(self.out, "{} ", bar_glyph(bar))?;
        }
        queue!(self.out, ResetColor, cursor::MoveTo(0, 2))?;

        // Status line
        let (fg, bg) = kind_colors(frame.theme, frame.status.kind());
        queue!(self.out, SetForegroundColor(fg), SetBackgroundColor(bg))?;
        write!(self.out, " {} ", frame.status.text())?;
        queue!(self.out, ResetColor, cursor::MoveTo(0, 3))?;

        // Counter
        queue!(self.out, SetForegroundColor(dim_color(frame.theme)))?;
        write!(self.out, "{}", stats_line(frame.transcript))?;
        queue!(self.out, ResetColor)?;

        // Transcript tail with interim appended, wrapped to the visible rows
        let body_rows = usize::from(height.saturating_sub(6)).max(1);
        let mut lines = wrap_tail(frame.transcript, frame.interim, width, body_rows);
        for (row, line) in lines.drain(..).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            queue!(self.out, cursor::MoveTo(0, 4 + row as u16))?;
            match line {
                WrappedLine::Final(text) => write!(self.out, "{text}")?,
                WrappedLine::Interim(text) => {
                    queue!(self.out, SetForegroundColor(dim_color(frame.theme)))?;
                    write!(self.out, "{text}")?;
                    queue!(self.out, ResetColor)?;
                }
            }
        }

        // Key hints
        queue!(
            self.out,
            cursor::MoveTo(0, height.saturating_sub(1)),
            SetForegroundColor(dim_color(frame.theme))
        )?;
        if frame.controls_enabled {
            write!(self.out, "{KEY_HINTS}")?;
        } else {
            write!(
                self.out,
                "Speech recognition unavailable; recording keys disabled.  {KEY_HINTS}"
            )?;
        }
        queue!(self.out, ResetColor)?;

        self.out.flush().context("failed to flush frame")
    }

    fn draw_overlay(&mut self, overlay: Overlay) -> Result<()> {
        let lines: Vec<&str> = match overlay {
            Overlay::Privacy => PRIVACY_NOTICE.to_vec(),
            Overlay::ConfirmClear => vec![
                "Clear the whole transcript?",
                "",
                "Press k again to clear, any other key to keep it.",
            ],
            Overlay::ConfirmQuit => vec![
                "The transcript has not been saved.",
                "",
                "Press q again to quit anyway, any other key to stay.",
            ],
        };
        for (row, line) in lines.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            queue!(self.out, cursor::MoveTo(2, 1 + row as u16))?;
            write!(self.out, "{line}")?;
        }
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        if self.active {
            let _ = execute!(self.out, DisableFocusChange, cursor::Show, LeaveAlternateScreen);
            let _ = disable_raw_mode();
        }
    }
}

enum WrappedLine {
    Final(String),
    Interim(String),
}

/// Last `rows` display lines of transcript plus interim text, hard-wrapped
/// at `width` characters
fn wrap_tail(transcript: &str, interim: &str, width: usize, rows: usize) -> Vec<WrappedLine> {
    let mut lines = Vec::new();
    for chunk in chunk_chars(transcript, width) {
        lines.push(WrappedLine::Final(chunk));
    }
    for chunk in chunk_chars(interim, width) {
        lines.push(WrappedLine::Interim(chunk));
    }
    if lines.len() > rows {
        lines.drain(..lines.len() - rows);
    }
    lines
}

fn chunk_chars(text: &str, width: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == width {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_and_char_counts() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
        assert_eq!(word_count("hej världen "), 2);
        assert_eq!(char_count("hej"), 3);
        assert_eq!(char_count("åäö"), 3);
    }

    #[test]
    fn test_stats_line_format() {
        assert_eq!(stats_line("one two"), "Words: 2 | Characters: 7");
        assert_eq!(stats_line(""), "Words: 0 | Characters: 0");
    }

    #[test]
    fn test_status_flash_reverts_after_delay() {
        let mut status = StatusLine::new();
        status.flash(StatusNote::new(StatusKind::Success, "Copied!"));
        assert_eq!(status.text(), "Copied!");

        // Not yet expired
        assert!(!status.tick(Instant::now()));
        assert_eq!(status.text(), "Copied!");

        // Past the deadline
        assert!(status.tick(Instant::now() + STATUS_REVERT + Duration::from_millis(1)));
        assert_eq!(status.text(), READY_TEXT);
        assert_eq!(status.kind(), StatusKind::Ready);
    }

    #[test]
    fn test_persistent_status_never_reverts() {
        let mut status = StatusLine::new();
        status.set(StatusNote::new(StatusKind::Warning, "Paused"));
        assert!(!status.tick(Instant::now() + Duration::from_secs(60)));
        assert_eq!(status.text(), "Paused");
    }

    #[test]
    fn test_bar_glyph_extremes() {
        assert_eq!(bar_glyph(MIN_BAR_HEIGHT), '▁');
        assert_eq!(bar_glyph(FULL_SCALE_HEIGHT), '█');
        // Above full scale clamps
        assert_eq!(bar_glyph(FULL_SCALE_HEIGHT * 2.0), '█');
    }

    #[test]
    fn test_kind_colors_differ_between_themes() {
        assert_ne!(
            kind_colors(Theme::Dark, StatusKind::Ready),
            kind_colors(Theme::Light, StatusKind::Ready)
        );
    }

    #[test]
    fn test_error_style_uniform_across_themes() {
        assert_eq!(
            kind_colors(Theme::Dark, StatusKind::Error),
            kind_colors(Theme::Light, StatusKind::Error)
        );
    }

    #[test]
    fn test_wrap_tail_keeps_most_recent_rows() {
        let lines = wrap_tail("abcdefghij", "", 4, 2);
        assert_eq!(lines.len(), 2);
        match &lines[0] {
            WrappedLine::Final(text) => assert_eq!(text, "efgh"),
            WrappedLine::Interim(_) => panic!("expected final line"),
        }
    }

    #[test]
    fn test_wrap_tail_marks_interim_lines() {
        let lines = wrap_tail("done ", "partial", 80, 5);
        assert!(matches!(&lines[0], WrappedLine::Final(_)));
        assert!(matches!(&lines[1], WrappedLine::Interim(_)));
    }
}
