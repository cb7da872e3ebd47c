use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{clamp_page, ViewingSurface};
use crate::model::BookmarkState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkAction {
    Set,
    Jump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkPrompt {
    #[default]
    Idle,
    AwaitingMarkLetter(MarkAction),
}

/// A key press as far as the mark machine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKey {
    Char(char),
    /// Anything that is not a printable character (Esc, arrows, ...).
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavFeedback {
    InvalidMarkKey(Option<char>),
    UnknownMark(char),
    NothingToMark,
    BackStackEmpty,
    ForwardStackEmpty,
}

impl fmt::Display for NavFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavFeedback::InvalidMarkKey(Some(c)) => write!(f, "invalid mark: {c:?}"),
            NavFeedback::InvalidMarkKey(None) => write!(f, "invalid mark"),
            NavFeedback::UnknownMark(c) => write!(f, "mark '{c}' is not set"),
            NavFeedback::NothingToMark => write!(f, "no page to mark"),
            NavFeedback::BackStackEmpty => write!(f, "already at oldest position"),
            NavFeedback::ForwardStackEmpty => write!(f, "already at newest position"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// The key was not meant for navigation.
    Ignored,
    Pending(MarkAction),
    MarkSet(char),
    JumpedToMark(char),
    Moved,
    Feedback(NavFeedback),
}

impl NavOutcome {
    /// Whether the persisted state may have changed.
    pub fn changes_state(self) -> bool {
        matches!(
            self,
            NavOutcome::MarkSet(_) | NavOutcome::JumpedToMark(_) | NavOutcome::Moved
        )
    }
}

/// Marks and jump list of one window.
#[derive(Debug, Default, Clone)]
pub struct NavigationCore {
    prompt: MarkPrompt,
    marks: BTreeMap<char, BookmarkState>,
    back: Vec<BookmarkState>,
    forward: Vec<BookmarkState>,
}

fn is_mark_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn location_of(surface: &dyn ViewingSurface) -> Option<BookmarkState> {
    let page_index = surface.current_page_index()?;
    Some(BookmarkState {
        page_index,
        point_in_page: surface.current_point_in_page(),
    })
}

fn go(surface: &mut dyn ViewingSurface, target: BookmarkState) {
    let page = clamp_page(target.page_index, surface.page_count());
    surface.navigate_to(page, target.point_in_page);
}

impl NavigationCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(&self) -> MarkPrompt {
        self.prompt
    }

    pub fn is_awaiting_mark(&self) -> bool {
        matches!(self.prompt, MarkPrompt::AwaitingMarkLetter(_))
    }

    pub fn begin_mark(&mut self, action: MarkAction) {
        self.prompt = MarkPrompt::AwaitingMarkLetter(action);
    }

    /// Feeds one key through the mark machine.
    pub fn press_key(&mut self, key: MarkKey, surface: &mut dyn ViewingSurface) -> NavOutcome {
        match self.prompt {
            MarkPrompt::Idle => match key {
                MarkKey::Char('m') => {
                    self.begin_mark(MarkAction::Set);
                    NavOutcome::Pending(MarkAction::Set)
                }
                MarkKey::Char('\'') => {
                    self.begin_mark(MarkAction::Jump);
                    NavOutcome::Pending(MarkAction::Jump)
                }
                _ => NavOutcome::Ignored,
            },
            MarkPrompt::AwaitingMarkLetter(action) => {
                self.prompt = MarkPrompt::Idle;
                match key {
                    MarkKey::Char(c) if is_mark_letter(c) => match action {
                        MarkAction::Set => self.set_mark(c, surface),
                        MarkAction::Jump => self.jump_to_mark(c, surface),
                    },
                    MarkKey::Char(c) => NavOutcome::Feedback(NavFeedback::InvalidMarkKey(Some(c))),
                    MarkKey::Other => NavOutcome::Feedback(NavFeedback::InvalidMarkKey(None)),
                }
            }
        }
    }

    /// Records the current location under `letter`, replacing any older mark.
    pub fn set_mark(&mut self, letter: char, surface: &dyn ViewingSurface) -> NavOutcome {
        if !is_mark_letter(letter) {
            return NavOutcome::Feedback(NavFeedback::InvalidMarkKey(Some(letter)));
        }
        match location_of(surface) {
            Some(location) => {
                self.marks.insert(letter, location);
                NavOutcome::MarkSet(letter)
            }
            None => NavOutcome::Feedback(NavFeedback::NothingToMark),
        }
    }

    /// Jumps to a mark. The departure point goes onto the jump list.
    pub fn jump_to_mark(&mut self, letter: char, surface: &mut dyn ViewingSurface) -> NavOutcome {
        let Some(target) = self.marks.get(&letter).copied() else {
            return NavOutcome::Feedback(NavFeedback::UnknownMark(letter));
        };
        if surface.page_count() == 0 {
            return NavOutcome::Feedback(NavFeedback::NothingToMark);
        }
        self.navigate(surface, target);
        NavOutcome::JumpedToMark(letter)
    }

    /// A plain in-document navigation such as following a link.
    pub fn navigate(&mut self, surface: &mut dyn ViewingSurface, target: BookmarkState) {
        if let Some(here) = location_of(surface) {
            self.back.push(here);
        }
        self.forward.clear();
        go(surface, target);
    }

    pub fn go_back(&mut self, surface: &mut dyn ViewingSurface) -> NavOutcome {
        let Some(target) = self.back.pop() else {
            return NavOutcome::Feedback(NavFeedback::BackStackEmpty);
        };
        if let Some(here) = location_of(surface) {
            self.forward.push(here);
        }
        go(surface, target);
        NavOutcome::Moved
    }

    pub fn go_forward(&mut self, surface: &mut dyn ViewingSurface) -> NavOutcome {
        let Some(target) = self.forward.pop() else {
            return NavOutcome::Feedback(NavFeedback::ForwardStackEmpty);
        };
        if let Some(here) = location_of(surface) {
            self.back.push(here);
        }
        go(surface, target);
        NavOutcome::Moved
    }

    pub fn back_stack(&self) -> &[BookmarkState] {
        &self.back
    }

    pub fn forward_stack(&self) -> &[BookmarkState] {
        &self.forward
    }

    pub fn export_marks(&self) -> BTreeMap<char, BookmarkState> {
        self.marks.clone()
    }

    /// Replaces the marks with saved ones. Without a fingerprint match only
    /// the page of each mark is kept.
    pub fn import_marks(&mut self, saved: &BTreeMap<char, BookmarkState>, fingerprint_ok: bool) {
        self.marks = saved
            .iter()
            .filter(|(letter, _)| is_mark_letter(**letter))
            .map(|(letter, mark)| {
                let mark = if fingerprint_ok {
                    *mark
                } else {
                    BookmarkState::at_page(mark.page_index)
                };
                (*letter, mark)
            })
            .collect();
    }
}
