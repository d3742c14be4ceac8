/// External player process management.
///
/// The daemon never decodes audio itself.  It launches one of two command-line
/// players pointed at the stream URL and owns that process until it is
/// replaced or stopped:
///
/// ```text
///   start(url)  ──► stop() ──► spawn (own process group / no console) ──► grace sleep
///   stop()      ──► Terminate::terminate ──► wait ≤ stop_timeout ──► Terminate::kill
/// ```
///
/// Volume is only passed on the command line, so a volume change means a
/// respawn.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tabradio_proto::config::PlayerConfig;
use tabradio_proto::platform;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// ── backends ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vlc,
    Ffplay,
}

impl Backend {
    pub const DEFAULT_ORDER: [Backend; 2] = [Backend::Vlc, Backend::Ffplay];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Vlc => "vlc",
            Backend::Ffplay => "ffplay",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vlc" | "cvlc" => Some(Backend::Vlc),
            "ffplay" => Some(Backend::Ffplay),
            _ => None,
        }
    }

    fn locate(self) -> Option<PathBuf> {
        match self {
            Backend::Vlc => platform::find_vlc_binary(),
            Backend::Ffplay => platform::find_ffplay_binary(),
        }
    }
}

/// A backend together with the binary that will be executed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub backend: Backend,
    pub binary: PathBuf,
}

/// Turn configured backend names into a probe order.  Unknown names are
/// skipped; an empty result falls back to vlc then ffplay.
pub fn parse_preference(names: &[String]) -> Vec<Backend> {
    let mut order = Vec::new();
    for name in names {
        match Backend::from_name(name) {
            Some(b) if !order.contains(&b) => order.push(b),
            Some(_) => {}
            None => warn!("player: unknown backend {:?} in config, ignoring", name),
        }
    }
    if order.is_empty() {
        order.extend(Backend::DEFAULT_ORDER);
    }
    order
}

/// Probe the system for the first available backend in `preference` order.
pub fn select_backend(preference: &[Backend]) -> Option<ResolvedBackend> {
    preference.iter().find_map(|&backend| {
        backend
            .locate()
            .map(|binary| ResolvedBackend { backend, binary })
    })
}

/// Arguments (after the program name) for playing `url` at `volume` (0..=100).
pub fn build_args(backend: Backend, url: &str, volume: u8) -> Vec<String> {
    match backend {
        Backend::Vlc => {
            // vlc gain: 1.0 is unity, so 100% maps to 10.0
            let gain = (f64::from(volume) / 10.0).max(0.0);
            vec![
                "--intf".to_string(),
                "dummy".to_string(),
                "--no-video".to_string(),
                format!("--gain={:.1}", gain),
                url.to_string(),
            ]
        }
        Backend::Ffplay => vec![
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            "-volume".to_string(),
            volume.min(100).to_string(),
            url.to_string(),
        ],
    }
}

// ── errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no media player (vlc or ffplay) found")]
    NoBackend,
    #[error("failed to start {backend}: {source}")]
    Spawn {
        backend: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{backend} exited immediately ({status})")]
    ExitedEarly {
        backend: &'static str,
        status: std::process::ExitStatus,
    },
}

// ── termination capability ────────────────────────────────────────────────────

/// Stop requests for a running player.  Neither call may block; the caller
/// waits and escalates from `terminate` to `kill`.
pub trait Terminate: Send + Sync {
    fn terminate(&self, child: &mut Child) -> std::io::Result<()>;

    /// Forced stop once the grace period is over.
    fn kill(&self, child: &mut Child) -> std::io::Result<()> {
        child.start_kill()
    }
}

/// Signals the player's whole process group, so helpers it forked die with
/// it.  Falls back to the player pid alone when the group is unknown or is
/// our own.
#[cfg(unix)]
pub struct ProcessGroupTerminator;

/// The child's process group, unless it is ours (signalling it would hit the
/// daemon too) or already gone.
#[cfg(unix)]
fn foreign_group(child: &Child) -> Option<nix::unistd::Pid> {
    use nix::unistd::{getpgid, getpgrp, Pid};

    let pid = Pid::from_raw(child.id()? as i32);
    match getpgid(Some(pid)) {
        Ok(pgid) if pgid != getpgrp() => Some(pgid),
        Ok(_) => {
            debug!("player: {} shares our process group, signalling it alone", pid);
            None
        }
        Err(e) => {
            debug!("player: getpgid({}) failed: {}", pid, e);
            None
        }
    }
}

#[cfg(unix)]
impl Terminate for ProcessGroupTerminator {
    fn terminate(&self, child: &mut Child) -> std::io::Result<()> {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        // Already reaped.
        let Some(raw) = child.id() else {
            return Ok(());
        };

        match foreign_group(child) {
            Some(pgid) => {
                debug!("player: SIGTERM to process group {}", pgid);
                killpg(pgid, Signal::SIGTERM)?;
            }
            None => kill(Pid::from_raw(raw as i32), Signal::SIGTERM)?,
        }
        Ok(())
    }

    fn kill(&self, child: &mut Child) -> std::io::Result<()> {
        use nix::sys::signal::{killpg, Signal};

        if let Some(pgid) = foreign_group(child) {
            debug!("player: SIGKILL to process group {}", pgid);
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!("player: killpg({}) failed: {}", pgid, e);
            }
        }
        child.start_kill()
    }
}

/// Terminate the direct child only (TerminateProcess on Windows).
#[cfg_attr(unix, allow(dead_code))]
pub struct DirectTerminator;

impl Terminate for DirectTerminator {
    fn terminate(&self, child: &mut Child) -> std::io::Result<()> {
        child.start_kill()
    }
}

/// The termination strategy for this platform, chosen once at startup.
pub fn platform_terminator() -> Box<dyn Terminate> {
    #[cfg(unix)]
    {
        Box::new(ProcessGroupTerminator)
    }
    #[cfg(not(unix))]
    {
        Box::new(DirectTerminator)
    }
}

/// Spawn `binary` with all stdio discarded, detached from our process group
/// (Unix) or without a console window (Windows).
///
/// On Unix the child leads a new process group but stays in the daemon's
/// session (`setpgid`, not `setsid`).
fn spawn_detached(binary: &Path, args: &[String]) -> std::io::Result<Child> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd.spawn()
}

// ── playback seam ─────────────────────────────────────────────────────────────

/// What the session needs from a player.
#[allow(async_fn_in_trait)]
pub trait Playback {
    /// Replace whatever is playing with `url` at `volume`.  Any previous
    /// process is fully stopped before the new one is launched.
    async fn start(&mut self, url: &str, volume: u8) -> Result<(), PlayerError>;

    /// Stop the current process, if any.  Always leaves no handle behind.
    async fn stop(&mut self);
}

// ── manager ───────────────────────────────────────────────────────────────────

/// Owns at most one external player process.
pub struct PlayerManager {
    backend: Option<ResolvedBackend>,
    process: Option<Child>,
    terminator: Box<dyn Terminate>,
    stop_timeout: Duration,
    spawn_grace: Duration,
}

impl PlayerManager {
    pub fn new(
        backend: Option<ResolvedBackend>,
        terminator: Box<dyn Terminate>,
        stop_timeout: Duration,
        spawn_grace: Duration,
    ) -> Self {
        Self {
            backend,
            process: None,
            terminator,
            stop_timeout,
            spawn_grace,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        let backend = select_backend(&parse_preference(&config.backends));
        match &backend {
            Some(resolved) => info!(
                "player: using {} at {}",
                resolved.backend.name(),
                resolved.binary.display()
            ),
            None => warn!("player: neither vlc nor ffplay found, playback disabled"),
        }
        Self::new(
            backend,
            platform_terminator(),
            Duration::from_millis(config.stop_timeout_ms),
            Duration::from_millis(config.spawn_grace_ms),
        )
    }

    pub fn backend(&self) -> Option<&ResolvedBackend> {
        self.backend.as_ref()
    }
}

impl Playback for PlayerManager {
    async fn start(&mut self, url: &str, volume: u8) -> Result<(), PlayerError> {
        self.stop().await;

        let Some(resolved) = self.backend.as_ref() else {
            return Err(PlayerError::NoBackend);
        };
        let name = resolved.backend.name();
        let args = build_args(resolved.backend, url, volume);
        debug!("player: exec {} {:?}", resolved.binary.display(), args);

        let mut child = spawn_detached(&resolved.binary, &args)
            .map_err(|source| PlayerError::Spawn { backend: name, source })?;
        info!("player: spawned {} with pid {:?}", name, child.id());

        tokio::time::sleep(self.spawn_grace).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                warn!("player: {} exited during startup: {}", name, status);
                return Err(PlayerError::ExitedEarly {
                    backend: name,
                    status,
                });
            }
            Ok(None) => {}
            Err(e) => debug!("player: try_wait after spawn failed: {}", e),
        }

        self.process = Some(child);
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(mut child) = self.process.take() else {
            return;
        };
        let pid = child.id();

        if let Err(e) = self.terminator.terminate(&mut child) {
            debug!("player: terminate {:?} failed: {}", pid, e);
        }

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("player: {:?} exited ({})", pid, status),
            Ok(Err(e)) => {
                warn!("player: wait on {:?} failed: {}, killing", pid, e);
                self.force_kill(&mut child).await;
            }
            Err(_) => {
                warn!(
                    "player: {:?} still running after {:?}, killing",
                    pid, self.stop_timeout
                );
                self.force_kill(&mut child).await;
            }
        }
    }
}

impl PlayerManager {
    async fn force_kill(&self, child: &mut Child) {
        if let Err(e) = self.terminator.kill(child) {
            warn!("player: kill failed: {}", e);
        }
        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("player: killed ({})", status),
            Ok(Err(e)) => warn!("player: wait after kill failed: {}", e),
            Err(_) => warn!("player: process did not exit after kill"),
        }
    }
}
