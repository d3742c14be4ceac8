//! tabradio-ctl: one-shot client for the daemon's command socket.
//!
//! Host keybindings invoke this with a single operation; every notification
//! the daemon emits is printed on its own line so the host can surface it.

use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tabradio_proto::config::Config;
use tabradio_proto::platform::daemon_address;
use tabradio_proto::protocol::{read_message, write_message, Command, Message, Reply};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Generous: a restart includes the player's stop grace period.
const REPLY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    /// Daemon address, e.g. 127.0.0.1:9877 (default: from config.toml)
    #[arg(long)]
    addr: Option<String>,

    #[command(subcommand)]
    op: Op,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    /// Start the last session, or stop playback
    Toggle,
    /// Switch to the radio catalog and play
    #[command(name = "listen-radio", alias = "listenRadio")]
    ListenRadio,
    /// Switch to the TV catalog and play
    #[command(name = "listen-tv", alias = "listenTv")]
    ListenTv,
    /// Say which channel is on
    Announce,
    #[command(name = "volume-up", alias = "volumeUp")]
    VolumeUp,
    #[command(name = "volume-down", alias = "volumeDown")]
    VolumeDown,
    Next,
    Previous,
    /// Stop playback, save, and exit the daemon
    Shutdown,
}

impl From<Op> for Command {
    fn from(op: Op) -> Self {
        match op {
            Op::Toggle => Command::Toggle,
            Op::ListenRadio => Command::ListenRadio,
            Op::ListenTv => Command::ListenTv,
            Op::Announce => Command::Announce,
            Op::VolumeUp => Command::VolumeUp,
            Op::VolumeDown => Command::VolumeDown,
            Op::Next => Command::Next,
            Op::Previous => Command::Previous,
            Op::Shutdown => Command::Shutdown,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let addr = cli.addr.unwrap_or_else(configured_address);

    for line in send(&addr, cli.op.into()).await? {
        println!("{}", line);
    }
    Ok(())
}

/// Address from an existing config file.  Never creates one: that is the
/// daemon's job.
fn configured_address() -> String {
    let path = Config::config_path();
    match std::fs::read_to_string(&path) {
        Ok(content) => match Config::parse(&content) {
            Ok(config) => format!("{}:{}", config.daemon.bind_address, config.daemon.port),
            Err(e) => {
                warn!("Ignoring unreadable config {:?}: {:#}", path, e);
                daemon_address()
            }
        },
        Err(_) => daemon_address(),
    }
}

async fn send(addr: &str, command: Command) -> anyhow::Result<Vec<String>> {
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .with_context(|| format!("timed out connecting to {}", addr))?
        .with_context(|| format!("daemon not reachable at {}", addr))?;
    debug!("Connected to {}", addr);

    write_message(&mut stream, &Message::Command(command)).await?;
    let answer = tokio::time::timeout(REPLY_TIMEOUT, read_message(&mut stream))
        .await
        .with_context(|| format!("no reply to {} from daemon", command))??;

    match answer {
        Some(Message::Reply(Reply::Notices { messages })) => Ok(messages),
        Some(Message::Reply(Reply::Error { message })) => bail!("daemon: {}", message),
        Some(Message::Command(_)) => bail!("daemon answered with a command"),
        None => bail!("daemon closed the connection without replying"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn op(args: &[&str]) -> Op {
        let mut argv = vec!["tabradio-ctl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().op
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(op(&["toggle"]), Op::Toggle);
        assert_eq!(op(&["listen-radio"]), Op::ListenRadio);
        assert_eq!(op(&["listenRadio"]), Op::ListenRadio);
        assert_eq!(op(&["listenTv"]), Op::ListenTv);
        assert_eq!(op(&["volumeDown"]), Op::VolumeDown);
        assert_eq!(op(&["--addr", "127.0.0.1:1", "next"]), Op::Next);
        assert!(Cli::try_parse_from(["tabradio-ctl", "rewind"]).is_err());
    }

    #[test]
    fn test_ops_map_to_wire_commands() {
        assert_eq!(Command::from(Op::VolumeUp).name(), "volumeUp");
        assert_eq!(Command::from(Op::ListenTv).name(), "listenTv");
        assert_eq!(Command::from(Op::Shutdown), Command::Shutdown);
    }

    #[tokio::test]
    async fn test_send_prints_notices_and_surfaces_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            for reply in [
                Reply::Notices {
                    messages: vec!["Volume: 90%".into(), "Now playing: BBC".into()],
                },
                Reply::Error {
                    message: "daemon is shutting down".into(),
                },
            ] {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_message(&mut stream).await.unwrap();
                assert!(matches!(request, Some(Message::Command(_))));
                write_message(&mut stream, &Message::Reply(reply)).await.unwrap();
            }
        });

        assert_eq!(
            send(&addr, Command::VolumeDown).await.unwrap(),
            vec!["Volume: 90%".to_string(), "Now playing: BBC".to_string()]
        );
        assert!(send(&addr, Command::Toggle).await.is_err());
        server.await.unwrap();
    }
}
