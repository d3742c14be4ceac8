/// DaemonCore: single-owner event loop for the session.
///
/// Socket clients and the signal hook never touch session state; they send a
/// `DaemonEvent` and (for commands) wait for the notifications on a oneshot.
/// Events are handled strictly one at a time, so a spawn can never interleave
/// with a stop.
///
/// Every way out of the loop (shutdown command, termination signal, channel
/// closed) ends in `SessionController::shutdown`, which only acts once.
use tabradio_proto::catalog::{CatalogKind, Catalogs};
use tabradio_proto::config::Config;
use tabradio_proto::protocol::Command;
use tabradio_proto::state::StateStore;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::player::{Playback, PlayerManager};
use crate::session::{Notification, SessionController};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from the command socket.
    Command {
        command: Command,
        reply: oneshot::Sender<Vec<Notification>>,
    },
    /// Process is being terminated (Ctrl-C, SIGTERM).
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore<P> {
    controller: SessionController<P>,
    resume_on_start: bool,
}

impl DaemonCore<PlayerManager> {
    pub fn from_config(config: &Config) -> Self {
        let catalogs = Catalogs::load(&config.channels.radio_file, &config.channels.tv_file);
        let store = StateStore::new(config.daemon.state_file.clone());
        let player = PlayerManager::from_config(&config.player);
        if player.backend().is_none() {
            warn!("DaemonCore: playback requests will fail until vlc or ffplay is installed");
        }
        let controller =
            SessionController::new(catalogs, store, player, config.session.default_volume);
        Self::new(controller, config.session.resume_on_start)
    }
}

impl<P: Playback> DaemonCore<P> {
    pub fn new(controller: SessionController<P>, resume_on_start: bool) -> Self {
        Self {
            controller,
            resume_on_start,
        }
    }

    /// Run until a shutdown is requested or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!(
            "DaemonCore: starting event loop ({} catalog, {} channels)",
            self.controller.state().kind,
            self.controller.selection().len()
        );

        if self.resume_on_start {
            self.controller.resume_if_running().await;
            for notice in self.controller.take_notifications() {
                info!("DaemonCore: startup: {}", notice);
            }
        }

        loop {
            match event_rx.recv().await {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }

                Some(DaemonEvent::Shutdown) => {
                    info!("DaemonCore: termination requested");
                    break;
                }

                Some(DaemonEvent::Command { command, reply }) => {
                    info!("DaemonCore: command {}", command);
                    let notices = self.handle_command(command).await;
                    debug!("DaemonCore: state after {}: {:?}", command, self.controller.state());
                    if reply.send(notices).is_err() {
                        warn!("DaemonCore: client went away before reply to {}", command);
                    }
                    if self.controller.is_shut_down() {
                        break;
                    }
                }
            }
        }

        self.controller.shutdown().await;
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Vec<Notification> {
        let ctl = &mut self.controller;
        match command {
            Command::Toggle => ctl.toggle().await,
            Command::ListenRadio => ctl.activate(CatalogKind::Radio).await,
            Command::ListenTv => ctl.activate(CatalogKind::Tv).await,
            Command::Announce => ctl.announce(),
            Command::VolumeUp => ctl.volume_up().await,
            Command::VolumeDown => ctl.volume_down().await,
            Command::Next => ctl.next().await,
            Command::Previous => ctl.previous().await,
            Command::Shutdown => {
                ctl.shutdown().await;
                let mut notices = ctl.take_notifications();
                notices.push(Notification::ShutDown);
                return notices;
            }
        }
        ctl.take_notifications()
    }
}
