//! IPC endpoint discovery.
//!
//! On Windows the desktop client always listens on `\\.\pipe\discord-ipc-0`.
//! On Unix it creates a socket file `discord-ipc-<N>` (`N` in `0..=9`) in its
//! runtime directory, which is probed through the environment variables in
//! [`RUNTIME_DIR_VARS`] and finally [`FALLBACK_DIR`]. Flatpak and Snap builds
//! place the socket one level deeper, under [`SANDBOX_SUBDIRS`].

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::{AppError, Result};

/// File (or pipe) name prefix of the endpoint.
pub const IPC_PREFIX: &str = "discord-ipc-";

/// Endpoint indices probed, lowest first.
pub const IPC_INDICES: std::ops::Range<u8> = 0..10;

/// Environment variables naming candidate runtime directories, in priority order.
pub const RUNTIME_DIR_VARS: [&str; 4] = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"];

/// Directory probed when no environment variable points elsewhere.
pub const FALLBACK_DIR: &str = "/tmp";

/// Sandbox sub-directories probed inside every base directory.
pub const SANDBOX_SUBDIRS: [&str; 2] = ["app/com.discordapp.Discord", "snap.discord"];

/// Pipe used on Windows.
pub const WINDOWS_PIPE: &str = r"\\.\pipe\discord-ipc-0";

/// Locates the endpoint the desktop client is listening on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base_dirs: Vec<PathBuf>,
}

impl PathResolver {
    /// Resolver over the runtime directories named by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolver over the runtime directories named by `lookup`.
    ///
    /// Unset or empty variables are skipped, duplicates are dropped, and
    /// [`FALLBACK_DIR`] is always probed last.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let dirs = RUNTIME_DIR_VARS
            .iter()
            .filter_map(|key| lookup(key))
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .chain(std::iter::once(PathBuf::from(FALLBACK_DIR)));
        Self::with_base_dirs(dirs)
    }

    /// Resolver over an explicit, ordered list of base directories.
    #[must_use]
    pub fn with_base_dirs<I>(dirs: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut seen = HashSet::new();
        let base_dirs = dirs
            .into_iter()
            .filter(|dir| seen.insert(dir.clone()))
            .collect();
        Self { base_dirs }
    }

    /// Base directories in probe order.
    #[must_use]
    pub fn base_dirs(&self) -> &[PathBuf] {
        &self.base_dirs
    }

    /// Every directory probed, in order: each base directory followed by
    /// its sandbox sub-directories.
    #[must_use]
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        self.base_dirs
            .iter()
            .flat_map(|base| {
                std::iter::once(base.clone())
                    .chain(SANDBOX_SUBDIRS.iter().map(move |sub| base.join(sub)))
            })
            .collect()
    }

    /// Path of the endpoint to connect to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Discovery` on Unix if no `discord-ipc-<0..9>` file
    /// exists in any candidate directory.
    pub fn resolve(&self) -> Result<PathBuf> {
        #[cfg(windows)]
        {
            Ok(PathBuf::from(WINDOWS_PIPE))
        }

        #[cfg(not(windows))]
        {
            self.scan()
        }
    }

    /// Probe the candidate directories for an existing socket file.
    ///
    /// The first directory holding any endpoint wins, and within it the
    /// lowest index.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Discovery` if nothing is found.
    pub fn scan(&self) -> Result<PathBuf> {
        let candidates = self.candidate_dirs();

        for dir in &candidates {
            for index in IPC_INDICES {
                let path = dir.join(format!("{IPC_PREFIX}{index}"));
                if path.exists() {
                    debug!(path = %path.display(), "ipc endpoint found");
                    return Ok(path);
                }
            }
        }

        let searched = candidates
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(AppError::Discovery(format!(
            "no {IPC_PREFIX}[0-9] endpoint in [{searched}]; is the desktop client running?"
        )))
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::from_env()
    }
}
