//! File transfer over the shell link.
//!
//! Put splits the local file into bounded chunks and sends one remote
//! `base64 -d` append command per chunk between a start/end sentinel pair;
//! waiting for both sentinels guarantees the remote shell has accepted every
//! chunk command in order. Fetch runs `base64 <path>` through the delimited
//! executor and streams each output line through the carry-over decoder into
//! the local file.

use crate::codec::Base64StreamDecoder;
use crate::connection::{is_line, SerialConnection};
use crate::error::ConnectionError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Write;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Raw bytes per put chunk, chosen so the base64-expanded, quoted command
/// line stays within the transport payload and remote command-line limits.
pub const TRANSFER_CHUNK: usize = 510;

const START_TR: &str = "<<--START-TR-->>";
const END_TR: &str = "<<--END-TR-->>";

/// Remote command appending one base64-encoded chunk to the target file.
pub(crate) fn chunk_command(encoded: &str, remote_path: &str) -> String {
    format!("echo -n '{encoded}' | base64 -d >> {remote_path}\n")
}

impl SerialConnection {
    pub(crate) async fn do_put(
        &mut self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), ConnectionError> {
        self.ensure_ready()?;
        info!(from = %local_path.display(), to = remote_path, "PUT");

        let mut file = tokio::fs::File::open(local_path).await?;

        self.send_text(format!("echo \"{START_TR}\"\n"))?;

        let mut buf = vec![0u8; TRANSFER_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let encoded = STANDARD.encode(&buf[..n]);
            self.send_text(chunk_command(&encoded, remote_path))?;
        }

        self.send_text(format!("echo \"{END_TR}\"\n"))?;

        // Both sentinels observed means every chunk command in between has
        // been accepted by the remote shell, in order.
        self.read_until(is_line(START_TR), true, |_| Ok(())).await?;
        self.read_until(is_line(END_TR), false, |_| Ok(())).await?;
        Ok(())
    }

    pub(crate) async fn do_fetch(
        &mut self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ConnectionError> {
        self.ensure_ready()?;
        info!(from = remote_path, to = %local_path.display(), "FETCH");

        let mut file = std::fs::File::create(local_path)?;
        let mut decoder = Base64StreamDecoder::new();

        // The base64 text arrives as lines that need not align on 4-char
        // group boundaries; the decoder carries the remainder across lines.
        self.delimited_command(&format!("base64 {remote_path}"), "fetch", |text| {
            let bytes = decoder.update(text.trim_end().as_bytes())?;
            file.write_all(&bytes)?;
            Ok(())
        })
        .await?;

        decoder.finalize()?;
        file.flush()?;
        Ok(())
    }
}
