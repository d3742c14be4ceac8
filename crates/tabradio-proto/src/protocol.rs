use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on one framed message; anything larger is a broken peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Operations the host keybinding table can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Command {
    Toggle,
    ListenRadio,
    ListenTv,
    Announce,
    VolumeUp,
    VolumeDown,
    Next,
    Previous,
    /// Host-initiated teardown: stop the player, save, exit the daemon.
    Shutdown,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Toggle,
        Command::ListenRadio,
        Command::ListenTv,
        Command::Announce,
        Command::VolumeUp,
        Command::VolumeDown,
        Command::Next,
        Command::Previous,
        Command::Shutdown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Toggle => "toggle",
            Command::ListenRadio => "listenRadio",
            Command::ListenTv => "listenTv",
            Command::Announce => "announce",
            Command::VolumeUp => "volumeUp",
            Command::VolumeDown => "volumeDown",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Daemon answer to exactly one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum Reply {
    /// Plain-text status lines for the user, in emission order.
    Notices { messages: Vec<String> },
    /// The command could not be delivered to the session.
    Error { message: String },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Reply(Reply),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = u32::try_from(json.len())?;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Payload length announced by the header at the front of `data`.
    pub fn frame_len(data: &[u8]) -> anyhow::Result<usize> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds limit", len);
        }
        Ok(len)
    }
}

/// Read one framed message.  `Ok(None)` when the stream ends before a
/// complete header.
pub async fn read_message<R>(reader: &mut R) -> anyhow::Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = Message::frame_len(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

pub async fn write_message<W>(writer: &mut W, msg: &Message) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.encode()?).await?;
    writer.flush().await?;
    Ok(())
}
