//! Session controller: the single owner of playback state.
//!
//! Every user operation funnels through one `SessionController`.  It picks the
//! channel list, tracks index/volume/current name, drives the player and
//! mirrors the result into the snapshot file after each mutation.  Nothing here
//! returns an error: failures turn into a `Notification` and a stopped, saved
//! state.

use std::fmt;

use tabradio_proto::catalog::{CatalogKind, Catalogs};
use tabradio_proto::state::{Snapshot, StateStore, MAX_VOLUME};
use tracing::{debug, info, warn};

use crate::player::{Playback, PlayerError};

pub const VOLUME_STEP: u8 = 10;

/// One plain-text status line for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NoChannels(CatalogKind),
    NothingToPlay,
    InvalidIndex,
    NoUrl(String),
    NowPlaying(String),
    PlayerUnavailable,
    PlaybackFailed(String),
    Stopped,
    Volume(u8),
    MaxVolume,
    MinVolume,
    NothingPlaying,
    Listening(String),
    ShutDown,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::NoChannels(CatalogKind::Radio) => write!(f, "TABRadio: no radio channels"),
            Notification::NoChannels(CatalogKind::Tv) => write!(f, "TABRadio: no TV channels"),
            Notification::NothingToPlay => write!(f, "TABRadio: no channel to play"),
            Notification::InvalidIndex => write!(f, "TABRadio: invalid channel index"),
            Notification::NoUrl(key) => write!(f, "TABRadio: no URL for channel {}", key),
            Notification::NowPlaying(key) => write!(f, "Now playing: {}", key),
            Notification::PlayerUnavailable => {
                write!(f, "TABRadio: no media player (vlc or ffplay) on this system")
            }
            Notification::PlaybackFailed(reason) => {
                write!(f, "TABRadio: failed to start player ({})", reason)
            }
            Notification::Stopped => write!(f, "TABRadio stopped (state saved)"),
            Notification::Volume(v) => write!(f, "Volume: {}%", v),
            Notification::MaxVolume => write!(f, "Max volume already reached"),
            Notification::MinVolume => write!(f, "Min volume already reached"),
            Notification::NothingPlaying => write!(f, "Radio or TV is not playing"),
            Notification::Listening(key) => write!(f, "Listening to: {}", key),
            Notification::ShutDown => write!(f, "TABRadio closed (state saved)"),
        }
    }
}

impl From<&PlayerError> for Notification {
    fn from(err: &PlayerError) -> Self {
        match err {
            PlayerError::NoBackend => Notification::PlayerUnavailable,
            other => Notification::PlaybackFailed(other.to_string()),
        }
    }
}

/// In-memory session.  Authoritative while the daemon runs; the snapshot file
/// only mirrors it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub kind: CatalogKind,
    pub current_index: usize,
    pub volume: u8,
    pub is_running: bool,
    pub current_channel_name: String,
}

pub struct SessionController<P> {
    catalogs: Catalogs,
    store: StateStore,
    player: P,
    state: SessionState,
    /// Sorted keys of `catalogs.get(state.kind)`.
    selection: Vec<String>,
    outbox: Vec<Notification>,
    shut_down: bool,
}

impl<P: Playback> SessionController<P> {
    /// Build the controller and recover kind, volume and channel from the
    /// snapshot, if one is readable.  Nothing is played.
    pub fn new(catalogs: Catalogs, store: StateStore, player: P, default_volume: u8) -> Self {
        let mut controller = Self {
            catalogs,
            store,
            player,
            state: SessionState {
                kind: CatalogKind::Radio,
                current_index: 0,
                volume: default_volume.min(MAX_VOLUME),
                is_running: false,
                current_channel_name: String::new(),
            },
            selection: Vec::new(),
            outbox: Vec::new(),
            shut_down: false,
        };
        match controller.store.load() {
            Some(snapshot) => controller.restore(&snapshot),
            None => controller.refresh_selection(),
        }
        controller
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Drain the notifications produced since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    // ── operations ────────────────────────────────────────────────────────────

    /// Switch to `kind` and play its current channel.
    pub async fn activate(&mut self, kind: CatalogKind) {
        let changed = kind != self.state.kind;
        self.state.kind = kind;
        self.refresh_selection();

        if self.selection.is_empty() {
            self.notify(Notification::NoChannels(kind));
            if self.state.is_running {
                self.halt().await;
            }
            return;
        }

        if changed || self.state.current_index >= self.selection.len() {
            self.state.current_index = 0;
        }
        self.play_current().await;
        self.persist();
    }

    /// (Re)start the player on the selected channel.  Returns whether a player
    /// is now running.
    pub async fn play_current(&mut self) -> bool {
        if self.selection.is_empty() {
            self.notify(Notification::NothingToPlay);
            self.halt().await;
            return false;
        }
        let Some(key) = self.selection.get(self.state.current_index).cloned() else {
            self.notify(Notification::InvalidIndex);
            self.halt().await;
            return false;
        };
        let Some(url) = self
            .catalogs
            .get(self.state.kind)
            .url(&key)
            .map(str::to_owned)
        else {
            self.notify(Notification::NoUrl(key));
            self.halt().await;
            return false;
        };

        self.state.current_channel_name = key.clone();
        match self.player.start(&url, self.state.volume).await {
            Ok(()) => {
                info!("session: playing {} ({})", key, url);
                self.state.is_running = true;
                self.notify(Notification::NowPlaying(key));
                self.persist();
                true
            }
            Err(e) => {
                warn!("session: cannot play {}: {}", key, e);
                self.state.is_running = false;
                self.notify(Notification::from(&e));
                self.persist();
                false
            }
        }
    }

    /// Stop when playing; otherwise resume whatever the snapshot remembers.
    pub async fn toggle(&mut self) {
        if self.state.is_running {
            self.player.stop().await;
            self.state.is_running = false;
            self.persist();
            self.notify(Notification::Stopped);
            return;
        }

        let kind = match self.store.load() {
            Some(snapshot) => {
                self.restore(&snapshot);
                snapshot.channel_type
            }
            None => CatalogKind::Radio,
        };
        self.activate(kind).await;
    }

    pub async fn volume_up(&mut self) {
        if self.state.volume >= MAX_VOLUME {
            self.notify(Notification::MaxVolume);
            return;
        }
        self.set_volume((self.state.volume + VOLUME_STEP).min(MAX_VOLUME))
            .await;
    }

    pub async fn volume_down(&mut self) {
        if self.state.volume == 0 {
            self.notify(Notification::MinVolume);
            return;
        }
        self.set_volume(self.state.volume.saturating_sub(VOLUME_STEP))
            .await;
    }

    pub async fn next(&mut self) {
        self.step_channel(true).await;
    }

    pub async fn previous(&mut self) {
        self.step_channel(false).await;
    }

    pub fn announce(&mut self) {
        if self.state.is_running {
            let name = self.state.current_channel_name.clone();
            self.notify(Notification::Listening(name));
        } else {
            self.notify(Notification::NothingPlaying);
        }
    }

    /// Stop the player and save a not-running snapshot.  Safe to call any
    /// number of times; only the first call does anything.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            debug!("session: already shut down");
            return;
        }
        self.shut_down = true;
        info!("session: shutting down");
        self.player.stop().await;
        self.state.is_running = false;
        self.persist();
    }

    /// Resume playback once at startup if the snapshot says it was running.
    pub async fn resume_if_running(&mut self) {
        if self.state.is_running {
            return;
        }
        if self.store.load().is_some_and(|s| s.is_running) {
            info!("session: resuming previous session");
            self.toggle().await;
        }
    }

    // ── internals ─────────────────────────────────────────────────────────────

    async fn set_volume(&mut self, volume: u8) {
        self.state.volume = volume;
        self.notify(Notification::Volume(volume));
        // Players only take volume at launch.
        if self.state.is_running {
            self.play_current().await;
        }
        self.persist();
    }

    async fn step_channel(&mut self, forward: bool) {
        if !self.state.is_running || self.selection.is_empty() {
            self.notify(Notification::NothingPlaying);
            return;
        }
        let len = self.selection.len();
        let current = self.state.current_index % len;
        self.state.current_index = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        self.play_current().await;
        self.persist();
    }

    /// Stop everything and record it.
    async fn halt(&mut self) {
        self.player.stop().await;
        self.state.is_running = false;
        self.persist();
    }

    fn restore(&mut self, snapshot: &Snapshot) {
        self.state.kind = snapshot.channel_type;
        self.state.volume = snapshot.volume.min(MAX_VOLUME);
        self.refresh_selection();
        self.state.current_index = snapshot.index_in(&self.selection);
        debug!(
            "session: restored {} index={} volume={}",
            self.state.kind, self.state.current_index, self.state.volume
        );
    }

    fn refresh_selection(&mut self) {
        self.selection = self.catalogs.get(self.state.kind).selection();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_channel_key: self.selection.get(self.state.current_index).cloned(),
            volume: self.state.volume,
            channel_type: self.state.kind,
            is_running: self.state.is_running,
        }
    }

    fn persist(&self) {
        self.store.save(&self.snapshot());
    }

    fn notify(&mut self, notification: Notification) {
        info!("notify: {}", notification);
        self.outbox.push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog, Call, FakePlayer};
    use tabradio_proto::catalog::Catalog;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: StateStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = StateStore::new(dir.path().join("state.json"));
            Self { _dir: dir, store }
        }

        fn controller(&self, catalogs: Catalogs, player: FakePlayer) -> SessionController<FakePlayer> {
            SessionController::new(catalogs, self.store.clone(), player, 100)
        }

        fn saved(&self) -> Option<Snapshot> {
            self.store.load()
        }
    }

    fn news_catalogs() -> Catalogs {
        Catalogs {
            radio: catalog(CatalogKind::Radio, &[("CNN", "url2"), ("BBC", "url1")]),
            tv: catalog(
                CatalogKind::Tv,
                &[("Thai PBS", "tv1"), ("Channel 3", "tv2"), ("Channel 7", "tv3")],
            ),
        }
    }

    #[tokio::test]
    async fn test_activate_plays_first_sorted_channel() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());

        ctl.activate(CatalogKind::Radio).await;

        assert!(ctl.state().is_running);
        assert_eq!(ctl.state().current_channel_name, "BBC");
        assert_eq!(ctl.player.calls, vec![Call::start("url1", 100)]);
        assert_eq!(
            ctl.take_notifications(),
            vec![Notification::NowPlaying("BBC".into())]
        );
        let saved = fx.saved().unwrap();
        assert_eq!(saved.current_channel_key.as_deref(), Some("BBC"));
        assert!(saved.is_running);
    }

    #[tokio::test]
    async fn test_volume_up_at_max_is_idempotent() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Radio).await;
        ctl.take_notifications();
        ctl.player.calls.clear();

        for _ in 0..3 {
            ctl.volume_up().await;
            assert_eq!(ctl.state().volume, 100);
            assert_eq!(ctl.take_notifications(), vec![Notification::MaxVolume]);
        }
        assert!(ctl.player.calls.is_empty());
        assert_eq!(Notification::MaxVolume.to_string(), "Max volume already reached");
    }

    #[tokio::test]
    async fn test_volume_change_while_playing_respawns() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Radio).await;
        ctl.take_notifications();
        ctl.player.calls.clear();

        ctl.volume_down().await;

        assert_eq!(ctl.state().volume, 90);
        assert_eq!(ctl.player.calls, vec![Call::start("url1", 90)]);
        assert_eq!(
            ctl.take_notifications(),
            vec![
                Notification::Volume(90),
                Notification::NowPlaying("BBC".into())
            ]
        );
        assert_eq!(fx.saved().unwrap().volume, 90);
    }

    #[tokio::test]
    async fn test_volume_change_while_stopped_only_persists() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());

        ctl.volume_down().await;

        assert!(ctl.player.calls.is_empty());
        assert_eq!(ctl.take_notifications(), vec![Notification::Volume(90)]);
        let saved = fx.saved().unwrap();
        assert_eq!(saved.volume, 90);
        assert!(!saved.is_running);
    }

    #[tokio::test]
    async fn test_volume_stays_in_bounds() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        // u = up, d = down
        for op in "uudduuuuuuuuuuddduuddddddddddddduuuu".chars() {
            if op == 'u' {
                ctl.volume_up().await;
            } else {
                ctl.volume_down().await;
            }
            assert!(ctl.state().volume <= 100);
        }
        for _ in 0..12 {
            ctl.volume_down().await;
        }
        assert_eq!(ctl.state().volume, 0);
        ctl.take_notifications();
        ctl.volume_down().await;
        assert_eq!(ctl.take_notifications(), vec![Notification::MinVolume]);
    }

    #[tokio::test]
    async fn test_next_previous_round_trip() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Tv).await;
        let start = ctl.state().current_index;

        for _ in 0..5 {
            ctl.next().await;
        }
        // 5 steps over 3 channels
        assert_eq!(ctl.state().current_index, (start + 5) % 3);
        for _ in 0..5 {
            ctl.previous().await;
        }
        assert_eq!(ctl.state().current_index, start);
    }

    #[tokio::test]
    async fn test_previous_wraps_to_last() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Tv).await;
        ctl.player.calls.clear();

        ctl.previous().await;

        assert_eq!(ctl.state().current_index, 2);
        assert_eq!(ctl.state().current_channel_name, "Thai PBS");
        assert_eq!(ctl.player.calls, vec![Call::start("tv1", 100)]);
        assert_eq!(
            fx.saved().unwrap().current_channel_key.as_deref(),
            Some("Thai PBS")
        );
    }

    #[tokio::test]
    async fn test_next_while_stopped() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());

        ctl.next().await;
        ctl.previous().await;

        assert!(ctl.player.calls.is_empty());
        assert_eq!(
            ctl.take_notifications(),
            vec![Notification::NothingPlaying, Notification::NothingPlaying]
        );
    }

    #[tokio::test]
    async fn test_empty_catalog_stays_stopped() {
        let fx = Fixture::new();
        let catalogs = Catalogs {
            radio: Catalog::empty(CatalogKind::Radio),
            tv: catalog(CatalogKind::Tv, &[("A", "a")]),
        };
        let mut ctl = fx.controller(catalogs, FakePlayer::default());

        ctl.activate(CatalogKind::Radio).await;

        assert!(!ctl.state().is_running);
        assert!(ctl.player.calls.is_empty());
        assert_eq!(
            ctl.take_notifications(),
            vec![Notification::NoChannels(CatalogKind::Radio)]
        );
        assert!(fx.saved().map_or(true, |s| !s.is_running));
    }

    #[tokio::test]
    async fn test_switch_to_empty_catalog_stops_player() {
        let fx = Fixture::new();
        let catalogs = Catalogs {
            radio: catalog(CatalogKind::Radio, &[("A", "a")]),
            tv: Catalog::empty(CatalogKind::Tv),
        };
        let mut ctl = fx.controller(catalogs, FakePlayer::default());
        ctl.activate(CatalogKind::Radio).await;
        ctl.player.calls.clear();

        ctl.activate(CatalogKind::Tv).await;

        assert!(!ctl.state().is_running);
        assert_eq!(ctl.player.calls, vec![Call::Stop]);
        assert!(!fx.saved().unwrap().is_running);
    }

    #[tokio::test]
    async fn test_toggle_resumes_tv_snapshot_with_missing_key() {
        let fx = Fixture::new();
        fx.store.save(&Snapshot {
            current_channel_key: Some("CNN".into()),
            volume: 40,
            channel_type: CatalogKind::Tv,
            is_running: false,
        });
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());

        ctl.toggle().await;

        assert_eq!(ctl.state().kind, CatalogKind::Tv);
        assert_eq!(ctl.state().current_index, 0);
        assert_eq!(ctl.state().current_channel_name, "Channel 3");
        assert_eq!(ctl.player.calls, vec![Call::start("tv2", 40)]);
    }

    #[tokio::test]
    async fn test_toggle_resumes_remembered_channel() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Tv).await;
        ctl.next().await;
        ctl.next().await;
        ctl.take_notifications();

        ctl.toggle().await;
        assert!(!ctl.state().is_running);
        assert_eq!(ctl.take_notifications(), vec![Notification::Stopped]);
        assert!(!fx.saved().unwrap().is_running);

        ctl.player.calls.clear();
        ctl.toggle().await;
        assert!(ctl.state().is_running);
        assert_eq!(ctl.state().current_channel_name, "Thai PBS");
        assert_eq!(ctl.player.calls, vec![Call::start("tv1", 100)]);
    }

    #[tokio::test]
    async fn test_toggle_without_snapshot_defaults_to_radio() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());

        ctl.toggle().await;

        assert_eq!(ctl.state().kind, CatalogKind::Radio);
        assert_eq!(ctl.state().current_channel_name, "BBC");
    }

    #[tokio::test]
    async fn test_new_restores_snapshot() {
        let fx = Fixture::new();
        fx.store.save(&Snapshot {
            current_channel_key: Some("CNN".into()),
            volume: 30,
            channel_type: CatalogKind::Radio,
            is_running: true,
        });
        let ctl = fx.controller(news_catalogs(), FakePlayer::default());

        assert_eq!(ctl.state().current_index, 1);
        assert_eq!(ctl.state().volume, 30);
        assert!(!ctl.state().is_running);
        assert_eq!(ctl.selection(), ["BBC", "CNN"]);
    }

    #[tokio::test]
    async fn test_switching_catalog_resets_index() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Tv).await;
        ctl.next().await;
        assert_eq!(ctl.state().current_index, 1);

        ctl.activate(CatalogKind::Radio).await;

        assert_eq!(ctl.state().current_index, 0);
        assert_eq!(ctl.selection(), ["BBC", "CNN"]);
        assert_eq!(fx.saved().unwrap().channel_type, CatalogKind::Radio);
    }

    #[tokio::test]
    async fn test_no_backend_leaves_stopped_snapshot() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::without_backend());

        ctl.activate(CatalogKind::Radio).await;

        assert!(!ctl.state().is_running);
        assert_eq!(
            ctl.take_notifications(),
            vec![Notification::PlayerUnavailable]
        );
        let saved = fx.saved().unwrap();
        assert!(!saved.is_running);
        assert_eq!(saved.current_channel_key.as_deref(), Some("BBC"));

        assert!(!ctl.play_current().await);
        assert!(!fx.saved().unwrap().is_running);
    }

    #[tokio::test]
    async fn test_channel_without_url() {
        let fx = Fixture::new();
        let catalogs = Catalogs {
            radio: catalog(CatalogKind::Radio, &[("A", "a"), ("B", "")]),
            tv: Catalog::empty(CatalogKind::Tv),
        };
        let mut ctl = fx.controller(catalogs, FakePlayer::default());
        ctl.activate(CatalogKind::Radio).await;
        ctl.take_notifications();
        ctl.player.calls.clear();

        ctl.next().await;

        assert!(!ctl.state().is_running);
        assert_eq!(ctl.player.calls, vec![Call::Stop]);
        assert_eq!(ctl.take_notifications(), vec![Notification::NoUrl("B".into())]);
        assert!(!fx.saved().unwrap().is_running);
    }

    #[tokio::test]
    async fn test_announce() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.announce();
        ctl.activate(CatalogKind::Radio).await;
        ctl.take_notifications();
        ctl.announce();
        ctl.announce();
        assert_eq!(
            ctl.take_notifications(),
            vec![
                Notification::Listening("BBC".into()),
                Notification::Listening("BBC".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let fx = Fixture::new();
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());
        ctl.activate(CatalogKind::Tv).await;
        ctl.player.calls.clear();

        ctl.shutdown().await;
        ctl.shutdown().await;

        assert!(ctl.is_shut_down());
        assert_eq!(ctl.player.calls, vec![Call::Stop]);
        let saved = fx.saved().unwrap();
        assert!(!saved.is_running);
        assert_eq!(saved.channel_type, CatalogKind::Tv);
        assert_eq!(saved.current_channel_key.as_deref(), Some("Channel 3"));
    }

    #[tokio::test]
    async fn test_resume_if_running() {
        let fx = Fixture::new();
        fx.store.save(&Snapshot {
            current_channel_key: Some("CNN".into()),
            volume: 50,
            channel_type: CatalogKind::Radio,
            is_running: true,
        });
        let mut ctl = fx.controller(news_catalogs(), FakePlayer::default());

        ctl.resume_if_running().await;

        assert!(ctl.state().is_running);
        assert_eq!(ctl.player.calls, vec![Call::start("url2", 50)]);
    }
}
