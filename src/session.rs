//! Shell-state detection and session bookkeeping.
//!
//! The remote peer is in one of a handful of observable states: waiting at a
//! login prompt, waiting for a password, or sitting at an idle shell prompt.
//! Detection is a pure function from a single (escape-stripped) line to a
//! state, driven by a fixed-order pattern table so it stays trivially
//! testable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Observable state of the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Nothing recognizable observed yet.
    Unknown,
    /// The peer printed a ` login: ` prompt.
    LoginPrompt,
    /// The peer printed a `Password: ` prompt.
    PasswordPrompt,
    /// The peer is at an idle shell prompt and will accept commands.
    ShellReady,
}

/// Prompt patterns, evaluated in order; the first match wins.
static PROMPT_TABLE: Lazy<[(Regex, ShellState); 3]> = Lazy::new(|| {
    [
        (
            Regex::new(r" login: $").expect("valid login pattern"),
            ShellState::LoginPrompt,
        ),
        (
            Regex::new(r"^Password: $").expect("valid password pattern"),
            ShellState::PasswordPrompt,
        ),
        (
            Regex::new(r"[$#] $").expect("valid shell pattern"),
            ShellState::ShellReady,
        ),
    ]
});

/// Classify a single line of remote output.
///
/// Returns `None` when the line is not a prompt of any kind. The input is
/// expected to already have escape sequences stripped (the line decoder does
/// this); trailing whitespace is significant and must be preserved.
pub fn classify_line(line: &str) -> Option<ShellState> {
    for (pattern, state) in PROMPT_TABLE.iter() {
        if pattern.is_match(line) {
            return Some(*state);
        }
    }
    None
}

/// Mutable session state owned by the protocol call path.
///
/// Only the login/logout and detection sequences mutate this; the command
/// executor reads `prompt` as the remembered end-of-output marker.
#[derive(Debug, Default)]
pub struct SessionState {
    prompt: Option<String>,
    authenticated: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remembered shell prompt, if one has been observed.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Record a state observation; a shell prompt line becomes the
    /// remembered prompt string.
    pub fn note(&mut self, state: ShellState, line: &str) {
        if state == ShellState::ShellReady {
            self.prompt = Some(line.trim_end_matches('\n').to_string());
            self.authenticated = true;
        }
    }

    /// Forget authentication (after logout or a dead link).
    pub fn reset(&mut self) {
        self.authenticated = false;
    }
}
