//! The session protocol engine.
//!
//! [`SerialConnection`] drives login/logout sequencing, shell-state
//! detection, and delimited command execution over the link transport. The
//! protocol layer is caller-at-a-time: only one delimited operation may be
//! in flight per session, which `&mut self` enforces at the type level.

use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::line::LineDecoder;
use crate::port::{LinkPort, SerialLinkPort};
use crate::session::{classify_line, SessionState, ShellState};
use crate::transport::{LinkTransport, OutboundMessage};
use async_trait::async_trait;
use std::path::Path;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// End-of-transmission control character, sent to log out.
const EOT: u8 = 0x04;

/// Result of one remote command execution.
///
/// A non-zero `exit_status` is a normal, successful result; it is the remote
/// command's own outcome, not a protocol failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The generic remote-execution contract exposed to collaborators.
#[async_trait]
pub trait RemoteConnection {
    /// Establish the link, start the transport workers, detect the remote
    /// shell state, and log in if necessary.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Run a command and return its exit status, stdout, and stderr.
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, ConnectionError>;

    /// Transfer a local file to the remote host.
    async fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<(), ConnectionError>;

    /// Transfer a remote file to the local host.
    async fn fetch(&mut self, remote_path: &str, local_path: &Path)
        -> Result<(), ConnectionError>;

    /// Log out (best effort), stop the workers, and release the link.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// A logical inbound line as seen by the read primitives.
///
/// `complete` lines ended in a newline; a partial line is the trailing
/// newline-less data currently buffered (shell prompts arrive this way).
#[derive(Debug, Clone)]
pub(crate) struct Line {
    pub text: String,
    pub complete: bool,
}

/// Matcher for a complete line equal to `expected` (ignoring trailing
/// whitespace on both sides). Partial lines never match: a sentinel is only
/// trusted once its newline has arrived.
pub(crate) fn is_line(expected: &str) -> impl Fn(&Line) -> bool + '_ {
    let expected = expected.trim_end();
    move |line: &Line| line.complete && line.text.trim_end() == expected
}

/// Generate the start/end sentinel pair for one logical sub-channel.
pub(crate) fn delimiter_pair(channel: &str) -> (String, String) {
    let name = channel.to_uppercase();
    (
        format!("<<--START-CMD-{name}-->>"),
        format!("<<--END-CMD-{name}-->>"),
    )
}

/// Session over a serial link implementing [`RemoteConnection`].
pub struct SerialConnection {
    config: ConnectionConfig,
    /// Port injected for tests; `connect` opens the configured device when
    /// this is empty.
    injected_port: Option<Box<dyn LinkPort>>,
    transport: Option<LinkTransport>,
    decoder: LineDecoder,
    session: SessionState,
}

impl SerialConnection {
    /// Create a session that will open the configured serial device on
    /// `connect`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            injected_port: None,
            transport: None,
            decoder: LineDecoder::new(),
            session: SessionState::new(),
        }
    }

    /// Create a session over an already-constructed port (tests use this
    /// with a mock link).
    pub fn with_port(config: ConnectionConfig, port: Box<dyn LinkPort>) -> Self {
        Self {
            injected_port: Some(port),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The remembered shell prompt, once detection has seen one.
    pub fn prompt(&self) -> Option<&str> {
        self.session.prompt()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && self.session.is_authenticated()
    }

    // ----- wire primitives -------------------------------------------------

    pub(crate) fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.transport()?.send(OutboundMessage::text(text))
    }

    pub(crate) fn send_raw(&self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        self.transport()?.send(OutboundMessage::raw(payload))
    }

    fn transport(&self) -> Result<&LinkTransport, ConnectionError> {
        self.transport.as_ref().ok_or(ConnectionError::NotConnected)
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), ConnectionError> {
        if self.transport.is_none() || !self.session.is_authenticated() {
            return Err(ConnectionError::NotConnected);
        }
        Ok(())
    }

    /// Read inbound lines until `matcher` accepts one.
    ///
    /// Every line before the match (and, when `inclusive`, the matching line
    /// itself) is passed to `sink`. The response timeout is counted from the
    /// last completed line, so long-running commands that keep producing
    /// output never trip it; a peer dribbling newline-less bytes does not
    /// defer it. A matching partial line is consumed wholesale, since a
    /// prompt leaves no newline behind.
    pub(crate) async fn read_until<M, S>(
        &mut self,
        matcher: M,
        inclusive: bool,
        mut sink: S,
    ) -> Result<(), ConnectionError>
    where
        M: Fn(&Line) -> bool,
        S: FnMut(&Line) -> Result<(), ConnectionError>,
    {
        let poll = self.config.poll_interval();
        let window = self.config.response_timeout();
        let mut last_rx = Instant::now();

        loop {
            while let Some(text) = self.decoder.pop_line() {
                last_rx = Instant::now();
                let line = Line {
                    text,
                    complete: true,
                };
                if matcher(&line) {
                    if inclusive {
                        sink(&line)?;
                    }
                    return Ok(());
                }
                sink(&line)?;
            }

            if let Some(text) = self.decoder.partial() {
                let line = Line {
                    text,
                    complete: false,
                };
                if matcher(&line) {
                    self.decoder.clear();
                    if inclusive {
                        sink(&line)?;
                    }
                    return Ok(());
                }
            }

            // Expiry is evaluated only after every buffered complete line
            // has been drained, so a line arriving late in the window still
            // resets the timer before it can fire.
            if last_rx.elapsed() >= window {
                return Err(ConnectionError::ResponseTimeout { window });
            }

            let transport = self
                .transport
                .as_mut()
                .ok_or(ConnectionError::NotConnected)?;
            match tokio::time::timeout(poll, transport.recv()).await {
                Ok(Some(chunk)) => self.decoder.feed(&chunk),
                Ok(None) => return Err(ConnectionError::LinkClosed),
                Err(_) => {}
            }
        }
    }

    // ----- delimited execution (§ command executor) ------------------------

    /// Run `command` wrapped in start/end sentinels and stream its output
    /// lines to `sink`.
    ///
    /// Sentinel uniqueness is per sub-channel, not per call; correctness
    /// relies on delimited calls being serialized on one session. Output
    /// lines that happen to equal a sentinel would truncate the capture;
    /// this is an accepted limitation of the wire protocol.
    pub(crate) async fn delimited_command<S>(
        &mut self,
        command: &str,
        channel: &str,
        mut sink: S,
    ) -> Result<(), ConnectionError>
    where
        S: FnMut(&str) -> Result<(), ConnectionError>,
    {
        let (start, end) = delimiter_pair(channel);
        let wrapped = format!("echo \"{start}\"; {command};echo \"{end}\"\n");

        debug!(command, channel, ">>");
        self.send_text(wrapped)?;

        // Flush everything up to and including the start sentinel; this
        // discards our own echoed command line as well.
        self.read_until(is_line(&start), true, |_| Ok(())).await?;

        // Yield output up to, but not including, the end sentinel.
        self.read_until(is_line(&end), false, |line| {
            if line.complete {
                debug!(line = %line.text, "<<");
                sink(&line.text)?;
            }
            Ok(())
        })
        .await
    }

    /// Delimited execution collecting the output lines.
    pub(crate) async fn delimited_capture(
        &mut self,
        command: &str,
        channel: &str,
    ) -> Result<Vec<String>, ConnectionError> {
        let mut lines = Vec::new();
        self.delimited_command(command, channel, |text| {
            lines.push(text.to_string());
            Ok(())
        })
        .await?;
        Ok(lines)
    }

    // ----- shell-state detection and login ---------------------------------

    /// Send a line feed and classify the next prompt the remote shows.
    ///
    /// Retries up to the configured number of attempts when nothing
    /// prompt-like appears within the response window. Idempotent in
    /// `ShellReady`: re-probing an idle shell yields `ShellReady` again with
    /// the same recorded prompt.
    pub async fn detect_shell_state(&mut self) -> Result<ShellState, ConnectionError> {
        let attempts = self.config.detect_attempts.max(1);
        for attempt in 1..=attempts {
            self.send_text("\n")?;
            match self.await_prompt().await {
                Ok(state) => return Ok(state),
                Err(ConnectionError::ResponseTimeout { .. }) if attempt < attempts => {
                    debug!(attempt, "no prompt observed, probing again");
                }
                Err(ConnectionError::ResponseTimeout { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        Err(ConnectionError::ShellUndetected { attempts })
    }

    /// Wait for any prompt-shaped line and record the observed state.
    async fn await_prompt(&mut self) -> Result<ShellState, ConnectionError> {
        let mut observed: Option<String> = None;
        self.read_until(
            |line| classify_line(&line.text).is_some(),
            true,
            |line| {
                observed = Some(line.text.clone());
                Ok(())
            },
        )
        .await?;

        // The matching line is yielded last by the inclusive read.
        let line = observed.unwrap_or_default();
        let state = classify_line(&line).unwrap_or(ShellState::Unknown);
        self.session.note(state, &line);
        debug!(?state, line = %line, "prompt classified");
        Ok(state)
    }

    async fn login(&mut self) -> Result<(), ConnectionError> {
        debug!(user = %self.config.remote_user, "submitting user name");
        self.send_text(format!("{}\n", self.config.remote_user))?;

        let mut state = self.await_prompt().await?;
        if state == ShellState::PasswordPrompt {
            state = self.submit_password().await?;
        }
        if state != ShellState::ShellReady {
            return Err(ConnectionError::authentication(
                "login did not reach a ready shell",
            ));
        }
        info!(user = %self.config.remote_user, "logged in");
        Ok(())
    }

    async fn submit_password(&mut self) -> Result<ShellState, ConnectionError> {
        debug!("submitting password");
        self.send_text(format!("{}\n", self.config.password))?;
        self.detect_shell_state().await
    }

    /// Send EOT and check whether the peer dropped back to a login prompt.
    async fn logout(&mut self) -> Result<ShellState, ConnectionError> {
        self.send_raw(vec![EOT])?;
        self.send_text("\n")?;
        self.await_prompt().await
    }

    // ----- lifecycle -------------------------------------------------------

    async fn do_connect(&mut self) -> Result<(), ConnectionError> {
        if self.transport.is_some() {
            return Ok(());
        }

        let port: Box<dyn LinkPort> = match self.injected_port.take() {
            Some(port) => port,
            None => Box::new(SerialLinkPort::open(&self.config.port, self.config.baud_rate)?),
        };
        info!(port = port.name(), baud = self.config.baud_rate, "opening serial session");

        self.transport = Some(LinkTransport::start(
            port,
            self.config.poll_interval(),
            self.config.payload_size,
        ));

        let state = self.detect_shell_state().await?;
        match state {
            ShellState::ShellReady => {}
            ShellState::LoginPrompt => self.login().await?,
            ShellState::PasswordPrompt => {
                if self.submit_password().await? != ShellState::ShellReady {
                    return Err(ConnectionError::authentication(
                        "password was not accepted",
                    ));
                }
            }
            ShellState::Unknown => {
                return Err(ConnectionError::ShellUndetected {
                    attempts: self.config.detect_attempts,
                })
            }
        }

        info!(prompt = ?self.session.prompt(), "session ready");
        Ok(())
    }

    async fn do_execute(&mut self, command: &str) -> Result<CommandOutput, ConnectionError> {
        self.ensure_ready()?;

        // Stderr goes to a side-channel file and the exit status into a
        // shell variable; both are retrieved by follow-up delimited calls.
        // Output without a trailing newline merges with the end sentinel on
        // the wire and surfaces as a response timeout.
        let stderr_file = format!("~{}/.serial-shell.stderr", self.config.remote_user);
        let wrapped = format!("2>{stderr_file} {command}; CODE=$?");

        let stdout_lines = self.delimited_capture(&wrapped, "out").await?;

        let code_lines = self.delimited_capture("echo \"${CODE}\"", "code").await?;
        let exit_status = code_lines
            .first()
            .map(|s| s.trim())
            .unwrap_or("")
            .parse::<i32>()
            .map_err(|_| {
                ConnectionError::protocol(format!(
                    "exit status not numeric: {:?}",
                    code_lines.first()
                ))
            })?;

        let stderr_lines = self
            .delimited_capture(&format!("cat {stderr_file}; rm {stderr_file}"), "err")
            .await?;

        debug!(exit_status, "command finished");
        Ok(CommandOutput {
            exit_status,
            stdout: join_lines(&stdout_lines),
            stderr: join_lines(&stderr_lines),
        })
    }

    async fn do_close(&mut self) -> Result<(), ConnectionError> {
        if self.transport.is_none() {
            return Ok(());
        }

        if self.session.is_authenticated() {
            // Logout is best effort: the link is released regardless.
            match self.logout().await {
                Ok(ShellState::LoginPrompt) => info!("logout confirmed"),
                Ok(state) => warn!(?state, "logout not confirmed"),
                Err(e) => warn!(error = %e, "logout not acknowledged"),
            }
        }
        self.session.reset();

        if let Some(transport) = self.transport.take() {
            transport.shutdown().await;
        }
        info!("session closed");
        Ok(())
    }
}

#[async_trait]
impl RemoteConnection for SerialConnection {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.do_connect().await
    }

    async fn execute(&mut self, command: &str) -> Result<CommandOutput, ConnectionError> {
        self.do_execute(command).await
    }

    async fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<(), ConnectionError> {
        self.do_put(local_path, remote_path).await
    }

    async fn fetch(
        &mut self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ConnectionError> {
        self.do_fetch(remote_path, local_path).await
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.do_close().await
    }
}

/// Reassemble captured lines into a byte stream, one `\n` per line.
pub(crate) fn join_lines(lines: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}
