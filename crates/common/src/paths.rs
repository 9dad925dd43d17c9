use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DATA_DIR: &str = ".devpulse";
pub const DB_FILE: &str = "data.db";
pub const TOKEN_FILE: &str = "github_token";

pub fn data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(DATA_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join(DB_FILE))
}

pub fn token_file() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join(TOKEN_FILE))
}

/// Creates `dir` (and parents) and restricts it to the owner.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    set_mode(dir, 0o700)
}

/// Writes `contents` to `path` readable only by the owner.
pub fn write_private_file(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }
    fs::write(path, contents)?;
    set_mode(path, 0o600)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
