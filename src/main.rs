use clap::{Parser, Subcommand};
use serial_shell::{ConnectionConfig, RemoteConnection, SerialConnection};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Run commands and move files over a serial console.
#[derive(Parser, Debug)]
#[command(
    name = "serial-shell",
    version,
    about = "Remote command execution and file transfer over a serial shell link."
)]
struct Args {
    /// Path to a TOML config file; defaults and SERIAL_SHELL_* environment
    /// overrides are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path (overrides config).
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides config).
    #[arg(short, long)]
    baud: Option<u32>,

    /// Remote user name (overrides config).
    #[arg(short, long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a command on the remote host and print its output.
    Exec {
        /// The shell command to run remotely.
        command: String,
    },
    /// Copy a local file to the remote host.
    Put {
        local_path: PathBuf,
        remote_path: String,
    },
    /// Copy a remote file to the local host.
    Fetch {
        remote_path: String,
        local_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ConnectionConfig::load_from(path)?,
        None => ConnectionConfig::from_env(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(user) = args.user {
        config.remote_user = user;
    }

    let mut session = SerialConnection::new(config);
    session.connect().await?;

    let status = match run(&mut session, args.command).await {
        Ok(status) => status,
        Err(e) => {
            // Close before reporting; resource release is unconditional.
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "close after failure");
            }
            return Err(e.into());
        }
    };

    session.close().await?;
    std::process::exit(status);
}

async fn run(
    session: &mut SerialConnection,
    command: Command,
) -> Result<i32, serial_shell::ConnectionError> {
    match command {
        Command::Exec { command } => {
            let output = session.execute(&command).await?;
            use std::io::Write;
            std::io::stdout().write_all(&output.stdout)?;
            std::io::stderr().write_all(&output.stderr)?;
            Ok(output.exit_status)
        }
        Command::Put {
            local_path,
            remote_path,
        } => {
            session.put(&local_path, &remote_path).await?;
            Ok(0)
        }
        Command::Fetch {
            remote_path,
            local_path,
        } => {
            session.fetch(&remote_path, &local_path).await?;
            Ok(0)
        }
    }
}
