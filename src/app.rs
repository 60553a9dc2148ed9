use crate::audio::{AudioEngine, MAX_VOLUME, NullAudioEngine, RodioAudioEngine};
use crate::config;
use crate::model::{PersistedState, PlaybackState};
use crate::player::Player;
use anyhow::Result;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{execute, queue};
use std::io::{Stdout, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const VOLUME_STEP: u8 = 8;

#[derive(Debug, Default)]
pub struct AppStartupOptions {
    pub folder: Option<PathBuf>,
    pub volume: Option<u8>,
    pub null_audio: bool,
}

pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let state = config::load_state()?;

    let engine: Box<dyn AudioEngine> = if options.null_audio {
        Box::new(NullAudioEngine::new())
    } else {
        match RodioAudioEngine::new() {
            Ok(engine) => Box::new(engine),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "audio output unavailable, using null engine");
                Box::new(NullAudioEngine::new())
            }
        }
    };

    let volume = options.volume.unwrap_or(state.volume);
    let mut player = Player::new(engine, volume);
    info!(
        output = player.output_name().as_deref(),
        volume = player.volume(),
        "engine ready"
    );

    if let Some(folder) = options.folder.or(state.last_folder) {
        if let Err(err) = player.load_folder(&folder) {
            warn!(
                folder = %folder.display(),
                error = %format!("{err:#}"),
                "startup folder scan failed"
            );
        }
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, Hide)?;

    let result = run_event_loop(&mut player, &mut out);

    disable_raw_mode()?;
    execute!(out, LeaveAlternateScreen, Show)?;
    let save_result = config::save_state(&persisted_state(&player));
    result?;
    save_result?;
    Ok(())
}

fn run_event_loop(player: &mut Player, out: &mut Stdout) -> Result<()> {
    let mut command_mode = false;
    let mut command_buffer = String::new();
    let mut last_tick = Instant::now();
    let mut last_draw = Instant::now();

    loop {
        if last_tick.elapsed() >= TICK_INTERVAL {
            player.tick();
            last_tick = Instant::now();
        }

        if player.dirty || last_draw.elapsed() > Duration::from_millis(250) {
            draw(out, player, command_mode, &command_buffer)?;
            player.dirty = false;
            last_draw = Instant::now();
        }

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if command_mode {
            match key.code {
                KeyCode::Esc => {
                    command_mode = false;
                    command_buffer.clear();
                    player.dirty = true;
                }
                KeyCode::Enter => {
                    let quit = run_command(player, &command_buffer);
                    command_mode = false;
                    command_buffer.clear();
                    if quit {
                        break;
                    }
                }
                KeyCode::Backspace => {
                    command_buffer.pop();
                    player.dirty = true;
                }
                KeyCode::Char(ch) => {
                    command_buffer.push(ch);
                    player.dirty = true;
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::Char('q') => break,
            KeyCode::Char('s') | KeyCode::Enter => player.start(),
            KeyCode::Char(' ') | KeyCode::Char('p') => player.pause(),
            KeyCode::Char('n') => player.next(),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let next = player.volume().saturating_add(VOLUME_STEP);
                player.set_volume(next);
            }
            KeyCode::Char('-') => {
                let next = player.volume().saturating_sub(VOLUME_STEP);
                player.set_volume(next);
            }
            KeyCode::Char(':') => {
                command_mode = true;
                player.dirty = true;
            }
            _ => {}
        }
    }

    Ok(())
}

fn draw(out: &mut Stdout, player: &Player, command_mode: bool, command_buffer: &str) -> Result<()> {
    let transport = match player.state() {
        PlaybackState::Stopped => "stopped",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
    };
    let track = player
        .current_path()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("-"));

    queue!(
        out,
        MoveTo(0, 0),
        Clear(ClearType::CurrentLine),
        Print(format!(
            "juke  [{transport}] {track}  vol {}/{}",
            player.volume(),
            MAX_VOLUME
        )),
        MoveTo(0, 1),
        Clear(ClearType::CurrentLine),
        Print(&player.status),
    )?;

    let footer = if command_mode {
        format!(":{command_buffer}")
    } else {
        String::from("s/enter start | space pause | n next | +/- volume | : command | q quit")
    };
    queue!(out, MoveTo(0, 2), Clear(ClearType::CurrentLine), Print(footer))?;
    out.flush()?;
    Ok(())
}

/// Runs one `:` command. Returns true when the app should exit.
fn run_command(player: &mut Player, raw: &str) -> bool {
    let input = raw.trim();
    if input.is_empty() {
        player.status = String::from("No command");
        player.dirty = true;
        return false;
    }

    let mut split = input.splitn(2, char::is_whitespace);
    let command = split.next().unwrap_or_default();
    let rest = split.next().unwrap_or("").trim();

    match command {
        "help" => {
            player.status = String::from("Commands: open <folder> | volume <0-128> | save | quit");
            player.dirty = true;
        }
        "open" => {
            if rest.is_empty() {
                player.status = String::from("Usage: open <folder>");
                player.dirty = true;
            } else if let Err(err) = player.load_folder(Path::new(rest)) {
                player.status = format!("open error: {err:#}");
                player.dirty = true;
            }
        }
        "volume" => match rest.parse::<u8>() {
            Ok(value) => player.set_volume(value),
            Err(_) => {
                player.status = String::from("Usage: volume <0-128>");
                player.dirty = true;
            }
        },
        "save" => {
            match config::save_state(&persisted_state(player)) {
                Ok(()) => player.status = String::from("State saved"),
                Err(err) => player.status = format!("save error: {err:#}"),
            }
            player.dirty = true;
        }
        "quit" => return true,
        _ => {
            player.status = String::from("Unknown command. Use :help");
            player.dirty = true;
        }
    }

    false
}

fn persisted_state(player: &Player) -> PersistedState {
    PersistedState {
        last_folder: player.folder().map(Path::to_path_buf),
        volume: player.volume(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_player() -> Player {
        Player::new(Box::new(NullAudioEngine::new()), 64)
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut player = test_player();
        run_command(&mut player, "wat");
        assert!(player.status.contains("Unknown command"));
    }

    #[test]
    fn open_command_accepts_paths_with_spaces() {
        let dir = tempdir().expect("tempdir");
        let folder = dir.path().join("My Music Folder");
        fs::create_dir(&folder).expect("folder");
        fs::write(folder.join("song.wav"), b"x").expect("fixture");

        let mut player = test_player();
        run_command(&mut player, &format!("open {}", folder.display()));

        assert_eq!(player.status, "Loaded 1 files");
        assert_eq!(player.playlist().len(), 1);
    }

    #[test]
    fn open_command_reports_unreadable_folders() {
        let dir = tempdir().expect("tempdir");
        let mut player = test_player();
        run_command(&mut player, &format!("open {}", dir.path().join("nope").display()));
        assert!(player.status.starts_with("open error"));
    }

    #[test]
    fn volume_command_clamps_and_rejects_garbage() {
        let mut player = test_player();

        run_command(&mut player, "volume 200");
        assert_eq!(player.volume(), MAX_VOLUME);

        run_command(&mut player, "volume loud");
        assert!(player.status.contains("Usage: volume"));
    }

    #[test]
    fn quit_command_requests_exit() {
        let mut player = test_player();
        assert!(run_command(&mut player, "quit"));
        assert!(!run_command(&mut player, "help"));
    }
}
