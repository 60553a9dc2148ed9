use crate::audio::{AudioEngine, MAX_VOLUME};
use crate::library;
use crate::model::PlaybackState;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The playback controller. Owns the playlist, the current index, the
/// transport state and the volume, and is the sole driver of the audio
/// engine: a track is always stopped and released before another is loaded.
pub struct Player {
    engine: Box<dyn AudioEngine>,
    playlist: Vec<PathBuf>,
    current_index: usize,
    state: PlaybackState,
    volume: u8,
    folder: Option<PathBuf>,
    pub status: String,
    pub dirty: bool,
}

impl Player {
    pub fn new(engine: Box<dyn AudioEngine>, volume: u8) -> Self {
        let mut player = Self {
            engine,
            playlist: Vec::new(),
            current_index: 0,
            state: PlaybackState::Stopped,
            volume: volume.min(MAX_VOLUME),
            folder: None,
            status: String::from("Ready"),
            dirty: true,
        };
        player.engine.set_volume(player.volume);
        player
    }

    pub fn playlist(&self) -> &[PathBuf] {
        &self.playlist
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn output_name(&self) -> Option<String> {
        self.engine.output_name()
    }

    pub fn current_path(&self) -> Option<&Path> {
        if self.state == PlaybackState::Stopped {
            return None;
        }
        self.playlist.get(self.current_index).map(PathBuf::as_path)
    }

    /// Replaces the playlist with the playable files directly inside `dir`
    /// and resets the current index. Transport state is left alone: whatever
    /// is playing keeps going until the next command or tick re-evaluates it
    /// against the new playlist.
    pub fn load_folder(&mut self, dir: &Path) -> Result<()> {
        self.playlist.clear();
        self.current_index = 0;

        match library::scan_folder(dir) {
            Ok(found) => {
                self.playlist = found;
                self.folder = Some(dir.to_path_buf());
                if self.playlist.is_empty() {
                    self.set_status("No audio files found");
                } else {
                    self.set_status(&format!("Loaded {} files", self.playlist.len()));
                }
                Ok(())
            }
            Err(err) => {
                self.set_status("No audio files found");
                Err(err)
            }
        }
    }

    /// Starts playback: resumes when paused, otherwise loads and plays the
    /// track at the current index (restarting it if it was already going).
    pub fn start(&mut self) {
        if self.playlist.is_empty() {
            self.set_status("Playlist empty — choose folder");
            return;
        }

        if self.state == PlaybackState::Paused {
            self.engine.resume();
            self.state = PlaybackState::Playing;
            self.set_status("Resumed");
            return;
        }

        self.play_current();
    }

    /// Pause toggle: pauses a progressing track, resumes a paused one,
    /// does nothing when stopped.
    pub fn pause(&mut self) {
        if self.engine.is_playing() {
            self.engine.pause();
            self.state = PlaybackState::Paused;
            self.set_status("Paused");
        } else if self.state == PlaybackState::Paused {
            self.engine.resume();
            self.state = PlaybackState::Playing;
            self.set_status("Resumed");
        }
    }

    /// Stops whatever is loaded, advances the index with wrap-around, then
    /// attempts to play the track it landed on.
    pub fn next(&mut self) {
        self.stop_music();
        self.advance_index();
        self.play_current();
    }

    /// Periodic hook and the only end-of-track detector: when the playlist
    /// has entries, nothing is paused and the engine reports idle, advance
    /// and play. Paused tracks never auto-advance.
    pub fn tick(&mut self) {
        if self.playlist.is_empty()
            || self.state == PlaybackState::Paused
            || self.engine.is_playing()
        {
            return;
        }

        self.advance_index();
        self.play_current();
    }

    /// Stores and applies the volume in one step so the engine and the
    /// controller never disagree.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        self.engine.set_volume(self.volume);
        self.set_status(&format!("Volume: {}", self.volume));
    }

    fn advance_index(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        self.current_index = (self.current_index + 1) % self.playlist.len();
    }

    fn play_current(&mut self) {
        self.stop_music();
        if self.playlist.is_empty() {
            return;
        }

        let path = self.playlist[self.current_index].clone();
        if let Err(err) = self.engine.load(&path) {
            warn!(track = %path.display(), error = %format!("{err:#}"), "skipping unplayable track");
            self.set_status(&format!("Skipped {}", display_name(&path)));
            self.advance_index();
            return;
        }

        self.engine.set_volume(self.volume);
        if let Err(err) = self.engine.play() {
            warn!(track = %path.display(), error = %format!("{err:#}"), "failed to start playback");
            self.engine.stop();
            self.set_status(&format!("playback error: {err:#}"));
            return;
        }

        self.state = PlaybackState::Playing;
        self.set_status(&format!("Playing {}", display_name(&path)));
    }

    fn stop_music(&mut self) {
        self.engine.stop();
        self.state = PlaybackState::Stopped;
    }

    fn set_status(&mut self, message: &str) {
        self.status = message.to_string();
        self.dirty = true;
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
