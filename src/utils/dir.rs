use std::{env, io, path::PathBuf};

use anyhow::Result;

/// Directory holding the summary, time bucket and settings files.
pub fn create_application_default_path() -> Result<PathBuf> {
    create_application_path(default_state_base())
}

#[cfg(windows)]
fn default_state_base() -> PathBuf {
    PathBuf::from(env::var("APPDATA").expect("APPDATA should be present on Windows"))
}

#[cfg(not(windows))]
fn default_state_base() -> PathBuf {
    env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|_| {
            env::var("HOME").map(|home| {
                let mut path = PathBuf::from(home);
                path.push(".local/state");
                path
            })
        })
        .expect("Couldn't find neither XDG_STATE_HOME nor HOME")
}

fn create_application_path(mut base: PathBuf) -> Result<PathBuf> {
    base.push("codepulse");
    match std::fs::create_dir_all(&base) {
        Ok(_) => Ok(base),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(base),
        Err(v) => Err(v.into()),
    }
}
