use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub const DAEMON_TCP_PORT: u16 = 9877;
const DAEMON_TCP_HOST: &str = "127.0.0.1";

pub fn daemon_address() -> String {
    format!("{}:{}", DAEMON_TCP_HOST, DAEMON_TCP_PORT)
}

/// Directory for the snapshot, the channel files and the log.
pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/tabradio/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("tabradio")
    }
    #[cfg(windows)]
    {
        // Portable install: a data/ folder beside the executable wins
        if let Some(portable) = beside_exe("data") {
            return portable;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabradio")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(portable) = beside_exe("config.toml") {
            if let Some(dir) = portable.parent() {
                return dir.to_path_buf();
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("tabradio")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabradio")
    }
}

/// `name` in the directory of the running executable, if it exists there.
#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let p = current_exe.parent()?.join(name);
    p.exists().then_some(p)
}

#[cfg(unix)]
pub fn vlc_binary_names() -> &'static [&'static str] {
    &["vlc", "cvlc"]
}

#[cfg(windows)]
pub fn vlc_binary_names() -> &'static [&'static str] {
    &["vlc.exe"]
}

#[cfg(unix)]
pub fn ffplay_binary_names() -> &'static [&'static str] {
    &["ffplay"]
}

#[cfg(windows)]
pub fn ffplay_binary_names() -> &'static [&'static str] {
    &["ffplay.exe", "ffplay"]
}

/// Well-known install locations that are usually not on PATH.
#[cfg(windows)]
fn vlc_install_dirs() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|root| PathBuf::from(root).join("VideoLAN").join("VLC"))
        .collect()
}

#[cfg(unix)]
fn vlc_install_dirs() -> Vec<PathBuf> {
    Vec::new()
}

fn find_in_dir(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

fn exe_dir() -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    current_exe.parent().map(Path::to_path_buf)
}

/// Probe order for player binaries: the `PATH` entries, then the executable's
/// own directory and its `external/` folder, then `install_dirs`.
fn search(
    names: &[&str],
    path_var: Option<&OsStr>,
    exe_dir: Option<&Path>,
    install_dirs: &[PathBuf],
) -> Option<PathBuf> {
    path_var
        .and_then(|path| std::env::split_paths(path).find_map(|dir| find_in_dir(&dir, names)))
        .or_else(|| {
            exe_dir.and_then(|dir| {
                find_in_dir(dir, names).or_else(|| find_in_dir(&dir.join("external"), names))
            })
        })
        .or_else(|| install_dirs.iter().find_map(|dir| find_in_dir(dir, names)))
}

fn find_binary(names: &[&str], install_dirs: &[PathBuf]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH");
    search(
        names,
        path_var.as_deref(),
        exe_dir().as_deref(),
        install_dirs,
    )
}

/// Find a vlc binary: PATH, beside the executable, then the usual install
/// directory.
pub fn find_vlc_binary() -> Option<PathBuf> {
    find_binary(vlc_binary_names(), &vlc_install_dirs())
}

/// Find an ffplay binary: PATH, then beside the executable.
pub fn find_ffplay_binary() -> Option<PathBuf> {
    find_binary(ffplay_binary_names(), &[])
}
