//! Interactive demo shell for the Tiger media engine.
//!
//! Real demuxers and codecs are out of scope for this workspace (see
//! `tiger-devices`'s doc comment), so this shell plays a small built-in
//! scripted fixture through `tiger-devices::testing`'s pass-through devices
//! rather than the URL it's given — the URL only labels the session in logs,
//! the way a real build would thread it to a container/codec registry
//! instead.

use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{error, info, warn};

use tiger_devices::testing::{frame, track_format, ScriptedDeviceFactory, ScriptedFileFactory, ScriptedMedia};
use tiger_player::registry::Registry;
use tiger_player::{AddMediaOptions, MediaId, Player, PlayerEvent, PlayerState};
use tiger_time::{AudioFormat, AudioSampleFormat, MediaTime};
use tiger_types::{MediaFormat, TrackKind};

/// Seek step for the `Left`/`Right` keys.
const SEEK_STEP: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "tiger", about = "Demo shell for the Tiger media engine")]
struct Args {
    /// Media URL to "play" (logged only — see module docs).
    url: String,

    /// Log level filter, e.g. `info`, `debug`, `tiger_player=debug`.
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(args.log.clone()))
        .init();

    match run(&args.url) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "tiger: initialization failed");
            ExitCode::FAILURE
        }
    }
}

fn run(url: &str) -> Result<(), tiger_types::MediaError> {
    let registry = build_registry();
    tiger_player::registry::install(registry);

    let (tx, rx) = mpsc::channel::<(MediaId, PlayerEvent)>();
    let mut player = Player::new(Box::new(move |id, event| {
        let _ = tx.send((id, event));
    }));

    info!(url, "tiger: opening media");
    let id = player.add_media(url, AddMediaOptions::default())?;

    enable_raw_mode().map_err(|err| tiger_types::MediaError::Unknown(err.to_string()))?;
    let result = event_loop(&mut player, id, &rx);
    let _ = disable_raw_mode();
    result
}

fn event_loop(
    player: &mut Player,
    id: MediaId,
    rx: &mpsc::Receiver<(MediaId, PlayerEvent)>,
) -> Result<(), tiger_types::MediaError> {
    let mut position = MediaTime::BEGIN;
    let mut playing = false;

    loop {
        while let Ok((event_id, event)) = rx.try_recv() {
            log_event(event_id, &event);
            if event_id == id && matches!(event, PlayerEvent::End | PlayerEvent::Error(_)) {
                return Ok(());
            }
        }

        if !event::poll(Duration::from_millis(100)).map_err(|err| tiger_types::MediaError::Unknown(err.to_string()))? {
            continue;
        }
        let Event::Key(key) = event::read().map_err(|err| tiger_types::MediaError::Unknown(err.to_string()))? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char(' ') => {
                if playing {
                    player.pause(id)?;
                } else {
                    player.start(id)?;
                }
                playing = !playing;
            }
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                player.pause(id)?;
                return Ok(());
            }
            KeyCode::Right => {
                position = position + MediaTime::from_micros(SEEK_STEP.as_micros() as i64);
                player.seek(id, position)?;
            }
            KeyCode::Left => {
                let back = MediaTime::from_micros(SEEK_STEP.as_micros() as i64);
                position = if position.as_micros() > back.as_micros() {
                    position - back
                } else {
                    MediaTime::BEGIN
                };
                player.seek(id, position)?;
            }
            _ => {}
        }

        if player.state(id) == PlayerState::Stopped {
            return Ok(());
        }
    }
}

fn log_event(id: MediaId, event: &PlayerEvent) {
    match event {
        PlayerEvent::Ready(formats) => info!(?id, tracks = formats.len(), "ready"),
        PlayerEvent::Playing => info!(?id, "playing"),
        PlayerEvent::Paused => info!(?id, "paused"),
        PlayerEvent::End => info!(?id, "end of stream"),
        PlayerEvent::Error(err) => warn!(?id, %err, "player error"),
    }
}

/// A one-second silent mono 48kHz audio track, just enough to drive the
/// session graph's state machine end to end.
fn build_registry() -> Registry {
    let format = MediaFormat::Audio(AudioFormat::packed(AudioSampleFormat::S16, 1, 48_000));
    let tracks = vec![track_format(0, TrackKind::Audio, format)];
    let frames = (0i64..20)
        .map(|i| frame(0, MediaTime::new(i * 50_000, 1_000_000), format, i == 0))
        .collect();
    let media = ScriptedMedia::new(tracks, frames);

    let mut registry = Registry::new(Arc::new(ScriptedDeviceFactory));
    registry.register_file_factory(Arc::new(ScriptedFileFactory::new(media)));
    registry
}
