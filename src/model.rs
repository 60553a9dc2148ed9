use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transport state of the playback controller. Exactly one holds at a time;
/// `Playing` and `Paused` are only entered while the playlist has entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub last_folder: Option<PathBuf>,
    #[serde(default = "default_volume")]
    pub volume: u8,
}

fn default_volume() -> u8 {
    64
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            last_folder: None,
            volume: default_volume(),
        }
    }
}
