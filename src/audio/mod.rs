use anyhow::{Context, Result};
use rodio::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Engine volume scale: 0 is silence, 128 is full output.
pub const MAX_VOLUME: u8 = 128;

/// Synchronous audio engine driven by the playback controller. At most one
/// track is ever loaded; `load` releases whatever came before it.
pub trait AudioEngine {
    /// Decode `path` and hold it ready for `play`.
    fn load(&mut self, path: &Path) -> Result<()>;
    /// Start the loaded track.
    fn play(&mut self) -> Result<()>;
    /// Halt and release the loaded track, if any.
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    /// True while a loaded track is making forward progress. Paused,
    /// not-yet-started and finished tracks all report false.
    fn is_playing(&self) -> bool;
    fn volume(&self) -> u8;
    /// Clamps to `MAX_VOLUME` and applies to the output immediately.
    fn set_volume(&mut self, volume: u8);
    fn output_name(&self) -> Option<String>;
}

pub struct RodioAudioEngine {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    volume: u8,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let mut stream = with_silenced_stderr(|| {
            OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                })
        })?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());

        Ok(Self {
            stream,
            sink,
            current: None,
            volume: MAX_VOLUME / 2,
        })
    }

    fn sink_volume(&self) -> f32 {
        f32::from(self.volume) / f32::from(MAX_VOLUME)
    }
}

impl AudioEngine for RodioAudioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.sink.stop();
        self.current = None;
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.sink.append(source);
        self.sink.set_volume(self.sink_volume());
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no track loaded"));
        }
        self.sink.play();
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.current = None;
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn is_playing(&self) -> bool {
        self.current.is_some() && !self.sink.is_paused() && !self.sink.empty()
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        self.sink.set_volume(self.sink_volume());
    }

    fn output_name(&self) -> Option<String> {
        Some(String::from("System default output (CPAL)"))
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// Silent engine used when no output device can be opened and for headless
/// runs. Keeps a logical playback clock so end-of-track polling still works
/// for tracks whose duration can be decoded.
pub struct NullAudioEngine {
    current: Option<PathBuf>,
    paused: bool,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
    volume: u8,
}

impl NullAudioEngine {
    pub fn new() -> Self {
        Self {
            current: None,
            paused: false,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
            volume: MAX_VOLUME / 2,
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn position(&self) -> Duration {
        let mut position = self.position_offset;
        if let Some(started_at) = self.started_at {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }

    fn finished(&self) -> bool {
        match self.track_duration {
            Some(duration) => self.current.is_some() && self.position() >= duration,
            None => false,
        }
    }
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for NullAudioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.current = Some(path.to_path_buf());
        self.paused = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(path);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no track loaded"));
        }
        self.paused = false;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.current = None;
        self.paused = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = None;
    }

    fn pause(&mut self) {
        self.position_offset = self.position();
        self.started_at = None;
        self.paused = true;
    }

    fn resume(&mut self) {
        if self.current.is_some() && self.paused {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn is_playing(&self) -> bool {
        self.current.is_some() && !self.paused && self.started_at.is_some() && !self.finished()
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }

    fn output_name(&self) -> Option<String> {
        Some(String::from("Null audio engine"))
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioEngine, MAX_VOLUME, NullAudioEngine};
    use std::fs;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);

        let mut bytes = Vec::with_capacity((44 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    #[test]
    fn load_holds_track_without_starting() {
        let mut engine = NullAudioEngine::new();
        engine
            .load(Path::new("missing-track.mp3"))
            .expect("load should succeed in null mode");

        assert!(!engine.is_playing());
        engine.play().expect("play should succeed");
        assert!(engine.is_playing());
    }

    #[test]
    fn play_without_load_errors() {
        let mut engine = NullAudioEngine::new();
        assert!(engine.play().is_err());
    }

    #[test]
    fn pause_stops_progress_and_resume_continues() {
        let mut engine = NullAudioEngine::new();
        engine
            .load(Path::new("missing-track.mp3"))
            .expect("load should succeed in null mode");
        engine.play().expect("play");
        thread::sleep(Duration::from_millis(20));

        engine.pause();
        assert!(!engine.is_playing());
        let paused = engine.position();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.position(), paused, "position should freeze");

        engine.resume();
        assert!(engine.is_playing());
        thread::sleep(Duration::from_millis(20));
        assert!(engine.position() > paused, "position should continue");
    }

    #[test]
    fn known_duration_track_stops_reporting_playing() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 80);

        let mut engine = NullAudioEngine::new();
        engine.load(&track).expect("load wav fixture");
        engine.play().expect("play");
        assert!(engine.is_playing());

        thread::sleep(Duration::from_millis(120));
        assert!(
            !engine.is_playing(),
            "known-duration playback should run out"
        );
    }

    #[test]
    fn unknown_duration_track_keeps_playing() {
        let mut engine = NullAudioEngine::new();
        engine
            .load(Path::new("missing-track.mp3"))
            .expect("load should succeed in null mode");
        engine.play().expect("play");

        thread::sleep(Duration::from_millis(50));
        assert!(
            engine.is_playing(),
            "unknown-duration playback should remain active"
        );
    }

    #[test]
    fn stop_releases_the_track() {
        let mut engine = NullAudioEngine::new();
        engine
            .load(Path::new("missing-track.mp3"))
            .expect("load should succeed in null mode");
        engine.play().expect("play");

        engine.stop();
        assert!(!engine.is_playing());
        assert!(engine.play().is_err(), "stop should release the track");
    }

    #[test]
    fn volume_is_clamped_to_scale() {
        let mut engine = NullAudioEngine::new();
        engine.set_volume(255);
        assert_eq!(engine.volume(), MAX_VOLUME);
        engine.set_volume(12);
        assert_eq!(engine.volume(), 12);
    }
}
