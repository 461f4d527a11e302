//! A scripted remote peer for integration tests.
//!
//! `MockShellPort` implements `LinkPort` and behaves like a serial console
//! with a POSIX shell behind it: it echoes input, shows `login:` /
//! `Password:` prompts, keeps an in-memory file system, and understands the
//! exact command shapes the protocol engine produces (the delimited wrapper,
//! `CODE=$?` capture, `base64` dumps, and the put chunk commands). Commands
//! themselves are canned: tests register the stdout/stderr/status for each
//! command string they intend to run.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serial_shell::port::{LinkPort, PortError};
use std::collections::HashMap;
use std::sync::Arc;

const LOGIN_PROMPT: &str = "mock login: ";
const SHELL_PROMPT: &str = "root@mock:~# ";
const EOT: u8 = 0x04;

/// Canned behavior for one registered command.
#[derive(Debug, Clone, Default)]
struct CannedCommand {
    /// Newline-terminated stdout text.
    stdout: String,
    stderr: String,
    status: i32,
    /// Emit the start sentinel, then go silent (for liveness tests).
    hang: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AtLogin,
    AtPassword,
    LoggedIn,
}

#[derive(Debug)]
struct ShellInner {
    stage: Stage,
    user: String,
    password: String,
    attempted_user: String,
    /// Bytes waiting to be read by the host side.
    output: Vec<u8>,
    /// Received bytes of the current, not yet newline-terminated line.
    input_line: Vec<u8>,
    /// Every full line the host sent, in order (EOT recorded as "<EOT>").
    received_lines: Vec<String>,
    commands: HashMap<String, CannedCommand>,
    files: HashMap<String, Vec<u8>>,
    /// Value of the remote `CODE` shell variable.
    code_var: i32,
}

/// In-memory serial peer simulating a login shell.
#[derive(Clone)]
pub struct MockShellPort {
    state: Arc<Mutex<ShellInner>>,
}

impl MockShellPort {
    /// A peer sitting at a login prompt with the given credentials.
    pub fn at_login(user: &str, password: &str) -> Self {
        Self::new(Stage::AtLogin, user, password)
    }

    /// A peer already logged in at an idle shell prompt.
    pub fn at_shell() -> Self {
        Self::new(Stage::LoggedIn, "root", "")
    }

    fn new(stage: Stage, user: &str, password: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ShellInner {
                stage,
                user: user.to_string(),
                password: password.to_string(),
                attempted_user: String::new(),
                output: Vec::new(),
                input_line: Vec::new(),
                received_lines: Vec::new(),
                commands: HashMap::new(),
                files: HashMap::new(),
                code_var: 0,
            })),
        }
    }

    /// Register the result of a command the test will execute.
    ///
    /// `stdout` and `stderr` must be newline-terminated (or empty).
    pub fn register_command(&self, command: &str, stdout: &str, stderr: &str, status: i32) {
        self.state.lock().commands.insert(
            command.to_string(),
            CannedCommand {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                status,
                hang: false,
            },
        );
    }

    /// Register a command that emits its start sentinel and then nothing.
    pub fn register_hang(&self, command: &str) {
        self.state.lock().commands.insert(
            command.to_string(),
            CannedCommand {
                hang: true,
                ..Default::default()
            },
        );
    }

    /// Seed a file on the simulated remote host.
    pub fn seed_file(&self, path: &str, data: &[u8]) {
        self.state.lock().files.insert(path.to_string(), data.to_vec());
    }

    /// Contents of a simulated remote file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Every full line the host has sent, in order.
    pub fn received_lines(&self) -> Vec<String> {
        self.state.lock().received_lines.clone()
    }
}

impl LinkPort for MockShellPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut inner = self.state.lock();
        for &byte in data {
            if byte == EOT {
                inner.received_lines.push("<EOT>".to_string());
                inner.handle_eot();
            } else if byte == b'\n' {
                let line = String::from_utf8_lossy(&std::mem::take(&mut inner.input_line))
                    .trim_end_matches('\r')
                    .to_string();
                inner.received_lines.push(line.clone());
                inner.handle_line(&line);
            } else {
                inner.input_line.push(byte);
            }
        }
        Ok(data.len())
    }

    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut inner = self.state.lock();
        let n = buffer.len().min(inner.output.len());
        buffer[..n].copy_from_slice(&inner.output[..n]);
        inner.output.drain(..n);
        Ok(n)
    }

    fn name(&self) -> &str {
        "mock-shell"
    }
}

impl std::fmt::Debug for MockShellPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockShellPort").finish()
    }
}

impl ShellInner {
    fn emit(&mut self, text: &str) {
        self.output.extend_from_slice(text.as_bytes());
    }

    fn emit_bytes(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    fn handle_eot(&mut self) {
        if self.stage == Stage::LoggedIn {
            self.stage = Stage::AtLogin;
            self.emit("logout\r\n");
            self.emit(LOGIN_PROMPT);
        }
    }

    fn handle_line(&mut self, line: &str) {
        match self.stage {
            Stage::AtLogin => {
                // getty echoes the user name.
                self.emit(&format!("{line}\r\n"));
                if line.is_empty() {
                    self.emit(LOGIN_PROMPT);
                } else {
                    self.attempted_user = line.to_string();
                    self.emit("Password: ");
                    self.stage = Stage::AtPassword;
                }
            }
            Stage::AtPassword => {
                // Passwords are not echoed.
                self.emit("\r\n");
                if self.attempted_user == self.user && line == self.password {
                    self.stage = Stage::LoggedIn;
                    self.emit("Welcome to mock\r\n");
                    self.emit(SHELL_PROMPT);
                } else {
                    self.stage = Stage::AtLogin;
                    self.emit("Login incorrect\r\n");
                    self.emit(LOGIN_PROMPT);
                }
            }
            Stage::LoggedIn => {
                self.emit(&format!("{line}\r\n"));
                if line.is_empty() {
                    self.emit(SHELL_PROMPT);
                } else if self.run_command_line(line) {
                    self.emit(SHELL_PROMPT);
                }
            }
        }
    }

    /// Interpret one command line; returns false when the shell should go
    /// silent afterwards (hanging command).
    fn run_command_line(&mut self, line: &str) -> bool {
        if let Some((start, command, end)) = parse_wrapped(line) {
            self.emit(&format!("{start}\r\n"));
            let finished = self.run_inner(&command);
            if finished {
                self.emit(&format!("{end}\r\n"));
            }
            return finished;
        }

        if let Some((encoded, path)) = parse_put_chunk(line) {
            let decoded = STANDARD
                .decode(encoded.as_bytes())
                .expect("host sent invalid base64 in a put chunk");
            self.files.entry(path).or_default().extend_from_slice(&decoded);
            return true;
        }

        if let Some(text) = parse_plain_echo(line) {
            self.emit(&format!("{text}\r\n"));
            return true;
        }

        self.emit(&format!("sh: {line}: not found\r\n"));
        self.code_var = 127;
        true
    }

    /// Interpret the command between the sentinels.
    fn run_inner(&mut self, command: &str) -> bool {
        // Phase 1: `2><file> <cmd>; CODE=$?`
        if let Some(rest) = command.strip_prefix("2>") {
            let (stderr_path, rest) = match rest.split_once(' ') {
                Some(parts) => parts,
                None => return true,
            };
            let cmd = rest.strip_suffix("; CODE=$?").unwrap_or(rest);
            let canned = self.commands.get(cmd).cloned().unwrap_or(CannedCommand {
                stdout: String::new(),
                stderr: format!("sh: {cmd}: not found\n"),
                status: 127,
                hang: false,
            });
            if canned.hang {
                return false;
            }
            self.emit(&canned.stdout.replace('\n', "\r\n"));
            self.files
                .insert(stderr_path.to_string(), canned.stderr.into_bytes());
            self.code_var = canned.status;
            return true;
        }

        // Phase 2: exit status retrieval.
        if command == "echo \"${CODE}\"" {
            let code = self.code_var;
            self.emit(&format!("{code}\r\n"));
            return true;
        }

        // Phase 3: stderr retrieval and cleanup.
        if let Some(rest) = command.strip_prefix("cat ") {
            let path = rest.split(';').next().unwrap_or("").trim().to_string();
            if let Some(content) = self.files.get(&path).cloned() {
                self.emit_lines_crlf(&content);
            }
            if rest.contains("rm ") {
                self.files.remove(&path);
            }
            return true;
        }

        // Fetch: base64 dump, wrapped at 76 columns like coreutils.
        if let Some(path) = command.strip_prefix("base64 ") {
            match self.files.get(path.trim()).cloned() {
                Some(content) => {
                    let encoded = STANDARD.encode(&content);
                    for chunk in encoded.as_bytes().chunks(76) {
                        self.emit_bytes(chunk);
                        self.emit("\r\n");
                    }
                }
                None => {
                    self.code_var = 1;
                }
            }
            return true;
        }

        self.emit(&format!("sh: {command}: not found\r\n"));
        self.code_var = 127;
        true
    }

    fn emit_lines_crlf(&mut self, content: &[u8]) {
        let text = String::from_utf8_lossy(content).into_owned();
        self.emit(&text.replace('\n', "\r\n"));
    }
}

/// A wrapper that lets through at most `budget` bytes per read poll,
/// stretching a response over many poll intervals.
#[derive(Debug)]
pub struct TricklePort {
    inner: MockShellPort,
    budget: usize,
}

impl TricklePort {
    pub fn new(inner: MockShellPort, budget: usize) -> Self {
        Self { inner, budget }
    }
}

impl LinkPort for TricklePort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.inner.write_bytes(data)
    }

    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let n = self.budget.min(buffer.len());
        self.inner.read_available(&mut buffer[..n])
    }

    fn name(&self) -> &str {
        "trickle-shell"
    }
}

/// Split `echo "<start>"; <command>;echo "<end>"` into its three parts.
fn parse_wrapped(line: &str) -> Option<(String, String, String)> {
    let rest = line.strip_prefix("echo \"<<--START-")?;
    let quote = rest.find('"')?;
    let start = format!("<<--START-{}", &rest[..quote]);
    let rest = rest[quote + 1..].strip_prefix("; ")?;
    let tail = rest.rfind(";echo \"")?;
    let command = rest[..tail].to_string();
    let end = rest[tail + 7..].strip_suffix('"')?.to_string();
    Some((start, command, end))
}

/// Parse `echo -n '<base64>' | base64 -d >> <path>`.
fn parse_put_chunk(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("echo -n '")?;
    let (encoded, rest) = rest.split_once('\'')?;
    let path = rest.strip_prefix(" | base64 -d >> ")?;
    Some((encoded.to_string(), path.trim().to_string()))
}

/// Parse a bare `echo "<text>"` (transfer sentinels).
fn parse_plain_echo(line: &str) -> Option<String> {
    let rest = line.strip_prefix("echo \"")?;
    let text = rest.strip_suffix('"')?;
    Some(text.to_string())
}
