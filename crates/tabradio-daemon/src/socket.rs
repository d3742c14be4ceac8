use crate::core::DaemonEvent;
use tabradio_proto::protocol::{read_message, write_message, Command, Message, Reply};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Accept command clients until the core goes away.  The listener is bound by
/// the caller so a second daemon fails before it touches any state.
pub fn start_server(
    listener: TcpListener,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match listener.local_addr() {
            Ok(addr) => info!("Command socket listening at {}", addr),
            Err(e) => warn!("Command socket listening (address unknown: {})", e),
        }

        let mut client_id = 0usize;

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = event_tx.closed() => {
                    info!("Command socket: core stopped, no longer accepting");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    debug!("Client {} connected from {}", id, peer);

                    let evt_tx = event_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, id, evt_tx).await {
                            warn!("Client {}: {}", id, e);
                        }
                        debug!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> anyhow::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();

    loop {
        let msg = match read_message(&mut read_half).await {
            Ok(Some(msg)) => msg,
            Ok(None) => return Ok(()),
            Err(e) => {
                let reply = Reply::Error {
                    message: format!("malformed request: {}", e),
                };
                write_message(&mut write_half, &Message::Reply(reply)).await?;
                return Err(e);
            }
        };

        let reply = match msg {
            Message::Command(command) => {
                info!("Client {} sent command: {}", client_id, command);
                dispatch(&event_tx, command).await
            }
            Message::Reply(_) => Reply::Error {
                message: "expected a command".to_string(),
            },
        };
        write_message(&mut write_half, &Message::Reply(reply)).await?;
    }
}

async fn dispatch(event_tx: &mpsc::Sender<DaemonEvent>, command: Command) -> Reply {
    let (reply, rx) = oneshot::channel();
    if event_tx
        .send(DaemonEvent::Command { command, reply })
        .await
        .is_err()
    {
        warn!("DaemonEvent channel closed");
        return Reply::Error {
            message: "daemon is shutting down".to_string(),
        };
    }
    match rx.await {
        Ok(notices) => Reply::Notices {
            messages: notices.iter().map(ToString::to_string).collect(),
        },
        Err(_) => Reply::Error {
            message: "daemon dropped the command".to_string(),
        },
    }
}
