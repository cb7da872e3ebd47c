use std::io::{self, Write};

use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{Clear, ClearType},
};
use docsession_core::{
    Command, DocumentWindow, MarkAction, MarkKey, NavFeedback, PagePoint, Rect, Zoom,
};
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    CloseActiveWindow,
    DuplicateWindow,
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Waiting for the letter after `m` or `'`.
    Mark(MarkAction),
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
}

impl EventMapper {
    /// Pan distance in page points.
    pub const PAN_STEP: f64 = 36.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            Event::Key(key) => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::Mark(action) => self.map_key_mark(action, key),
            },
            _ => UiEvent::None,
        }
    }

    fn map_key_mark(&mut self, action: MarkAction, key: KeyEvent) -> UiEvent {
        self.mode = InputMode::Normal;
        let mark_key = match (key.code, key.modifiers) {
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                MarkKey::Char(c)
            }
            _ => MarkKey::Other,
        };
        trace!(?action, ?mark_key, "mark key");
        UiEvent::Command(Command::MarkKey(mark_key))
    }

    fn map_key_normal(&mut self, key: KeyEvent) -> UiEvent {
        let KeyEvent {
            code, modifiers, ..
        } = key;
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('m'), KeyModifiers::NONE) => self.begin_mark(MarkAction::Set),
            (KeyCode::Char('\''), _) => self.begin_mark(MarkAction::Jump),
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ResetScale)
            }
            (KeyCode::Left, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(-Self::PAN_STEP, 0.0)
            }
            (KeyCode::Right, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(Self::PAN_STEP, 0.0)
            }
            (KeyCode::Up, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(0.0, -Self::PAN_STEP)
            }
            (KeyCode::Down, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(0.0, Self::PAN_STEP)
            }
            (KeyCode::Char('H'), KeyModifiers::SHIFT) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
                self.pan(-Self::PAN_STEP, 0.0)
            }
            (KeyCode::Char('L'), KeyModifiers::SHIFT) | (KeyCode::Char('l'), KeyModifiers::NONE) => {
                self.pan(Self::PAN_STEP, 0.0)
            }
            (KeyCode::Char('K'), KeyModifiers::SHIFT) => self.pan(0.0, -Self::PAN_STEP),
            (KeyCode::Char('J'), KeyModifiers::SHIFT) => self.pan(0.0, Self::PAN_STEP),
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('o'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Command(Command::JumpBackward)
            }
            (KeyCode::Char('i'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Command(Command::JumpForward)
            }
            (KeyCode::Tab, modifiers)
                if modifiers.is_empty() || modifiers.contains(KeyModifiers::CONTROL) =>
            {
                self.reset_count();
                UiEvent::Command(Command::JumpForward)
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ScaleBy { factor: 1.1 })
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ScaleBy { factor: 0.9 })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) => {
                // `12g` goes to page 12, a bare `g` to the first page.
                let page = self.pending_count.take().unwrap_or(1).saturating_sub(1);
                self.pending_digits.clear();
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page: usize::MAX })
            }
            (KeyCode::Char('v'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::CycleLayout)
            }
            (KeyCode::Char('V'), KeyModifiers::SHIFT) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleLayoutDirection)
            }
            (KeyCode::Char('b'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::TogglePairedPages)
            }
            (KeyCode::Char(']'), _) => {
                self.reset_count();
                UiEvent::Command(Command::NextWindow)
            }
            (KeyCode::Char('['), _) => {
                self.reset_count();
                UiEvent::Command(Command::PrevWindow)
            }
            (KeyCode::Char('w'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::DuplicateWindow
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CloseActiveWindow
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn begin_mark(&mut self, action: MarkAction) -> UiEvent {
        self.reset_count();
        self.mode = InputMode::Mark(action);
        UiEvent::Command(Command::BeginMark(action))
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn pan(&mut self, dx: f64, dy: f64) -> UiEvent {
        let multiplier = self.take_count() as f64;
        UiEvent::Command(Command::AdjustViewport {
            dx: dx * multiplier,
            dy: dy * multiplier,
        })
    }

    pub fn pending_input(&self) -> Option<String> {
        let mut pending = self.pending_digits.clone();
        match self.mode {
            InputMode::Mark(MarkAction::Set) => pending.push('m'),
            InputMode::Mark(MarkAction::Jump) => pending.push('\''),
            InputMode::Normal => {}
        }
        if pending.is_empty() {
            None
        } else {
            Some(pending)
        }
    }
}

/// Terminal cells as a window frame.
pub fn frame_for_terminal(columns: u16, rows: u16) -> Rect {
    Rect::new(0.0, 0.0, f64::from(columns), f64::from(rows))
}

/// One-line summary of the active window.
pub fn status_label(
    window: &DocumentWindow,
    index: usize,
    total: usize,
    pending: Option<&str>,
    feedback: Option<&NavFeedback>,
) -> String {
    let surface = window.surface();
    let name = window
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let page = match surface.current_page_index() {
        Some(page) => format!("{}/{}", page + 1, surface.page_count()),
        None => "-/0".to_owned(),
    };
    let zoom = match surface.current_zoom() {
        Zoom::Auto => "auto".to_owned(),
        Zoom::Scale(scale) => format!("{:.0}%", scale * 100.0),
    };
    let PagePoint { x, y } = surface
        .current_point_in_page()
        .unwrap_or(PagePoint::new(0.0, 0.0));
    let mut label = format!(
        "[{}/{}] {} p.{} {} {} @{:.0},{:.0}",
        index + 1,
        total,
        name,
        page,
        zoom,
        surface.layout().mode.label(),
        x,
        y
    );
    if let Some(pending) = pending {
        label.push_str(" | ");
        label.push_str(pending);
    }
    if let Some(feedback) = feedback {
        label.push_str(" | ");
        label.push_str(&feedback.to_string());
    }
    label
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, 0),
        Clear(ClearType::CurrentLine)
    )?;
    write!(writer, "{}", label)?;
    writer.flush()
}

/// Audible feedback for rejected navigation.
pub fn ring_bell<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(b"\x07")?;
    writer.flush()
}
