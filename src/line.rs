//! Line reassembly over the raw byte stream.
//!
//! The reader worker delivers bytes in arbitrary chunks; [`LineDecoder`]
//! reassembles them into logical text lines with terminal escape sequences
//! removed. A trailing run of bytes with no newline is exposed as a
//! *partial* line, because shell prompts (` login: `, `user@host$ `) never
//! carry a newline and must still be observable.
//!
//! [`EchoReconciler`] implements the echo-suppression mode of the earlier
//! single-threaded generation of this transport: each observed line is
//! cross-checked against the head of the text we expect the half-duplex link
//! to echo back. The concurrent engine does not filter echo (it treats
//! every inbound line as authoritative and relies on delimiter-based
//! extraction instead), but the reconciler is kept as the documented legacy
//! behavior.

use memchr::memchr;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use tracing::warn;

/// 7-bit C1 escape sequences and ANSI CSI sequences.
/// See <http://ascii-table.com/ansi-escape-sequences-vt-100.php>.
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    // ESC + single C1 final byte, or ESC [ + parameter bytes + intermediate
    // bytes + final byte.
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~]?)").expect("valid ANSI pattern")
});

/// Remove terminal escape sequences from a line.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Incremental decoder from raw byte chunks to logical lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes from the link.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// The returned text has the trailing `\r?\n` removed and escape
    /// sequences stripped. Interior whitespace is preserved: prompt
    /// classification depends on trailing spaces.
    pub fn pop_line(&mut self) -> Option<String> {
        let idx = memchr(b'\n', &self.buf)?;
        let mut raw: Vec<u8> = self.buf.drain(..=idx).collect();
        raw.pop(); // the newline itself
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Some(strip_ansi(&String::from_utf8_lossy(&raw)))
    }

    /// The buffered trailing bytes that do not (yet) end in a newline.
    ///
    /// Returns `None` when the buffer is empty. The bytes stay buffered:
    /// if more data arrives it is appended and the line may complete.
    pub fn partial(&self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(strip_ansi(&String::from_utf8_lossy(&self.buf)))
        }
    }

    /// Discard all buffered bytes (used once a partial line has been
    /// consumed as a prompt).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Outcome of checking one observed line against the expected echo text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoOutcome {
    /// The line was (part of) our own echo and has been consumed.
    Echo,
    /// The line is genuine remote output.
    Output(String),
    /// The line matched neither the echo nor its prefix. Non-fatal: echo and
    /// response can legitimately interleave on a half-duplex link.
    Distorted { expected: String, received: String },
}

/// Cross-checks observed lines against text previously written to the link.
///
/// Legacy single-threaded mode only; see the module docs.
#[derive(Debug, Default)]
pub struct EchoReconciler {
    pending: VecDeque<String>,
    carry: String,
}

impl EchoReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record text that was written and is expected to be echoed back.
    pub fn expect(&mut self, text: impl Into<String>) {
        self.pending.push_back(text.into());
    }

    /// The unmatched remainder carried over from a partial match.
    pub fn carry(&self) -> &str {
        &self.carry
    }

    /// Classify one observed line.
    pub fn observe(&mut self, line: &str) -> EchoOutcome {
        let expected = if !self.carry.is_empty() {
            std::mem::take(&mut self.carry)
        } else {
            match self.pending.pop_front() {
                Some(text) => text,
                None => return EchoOutcome::Output(line.to_string()),
            }
        };

        if expected == line || expected.trim_end_matches('\n') == line {
            return EchoOutcome::Echo;
        }

        if let Some(rest) = expected.strip_prefix(line) {
            // Echo arrived split across reads; keep the unmatched tail for
            // the next observed line.
            self.carry = rest.to_string();
            return EchoOutcome::Echo;
        }

        warn!(
            expected = %expected,
            received = %line,
            "echo seems distorted"
        );
        EchoOutcome::Distorted {
            expected,
            received: line.to_string(),
        }
    }
}
