/// Sound playback through rodio
///
/// The output stream lives on a dedicated thread; callers only send commands,
/// so `Playback` calls never block on the audio device. Sound ids resolve to
/// `<sounds_dir>/<id>.wav`.

use crate::alarm::{AlertError, Playback};
use rodio::{Decoder, OutputStreamBuilder, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

enum Command {
    Once(PathBuf),
    Loop { path: PathBuf, volume: f32 },
    StopAll,
}

/// rodio-backed playback
pub struct RodioPlayback {
    sounds_dir: PathBuf,
    commands: mpsc::UnboundedSender<Command>,
}

impl RodioPlayback {
    /// Spawn the playback thread; sounds are looked up in `sounds_dir`
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Result<Self, AlertError> {
        let (commands, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("alarm-playback".to_string())
            .spawn(move || run_playback(rx))
            .map_err(|e| AlertError::Device(format!("Failed to spawn playback thread: {}", e)))?;

        Ok(Self {
            sounds_dir: sounds_dir.into(),
            commands,
        })
    }

    /// File backing a sound id
    pub fn sound_path(&self, sound: &str) -> PathBuf {
        self.sounds_dir.join(format!("{}.wav", sound))
    }

    fn resolve(&self, sound: &str) -> Result<PathBuf, AlertError> {
        let path = self.sound_path(sound);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AlertError::ResourceUnavailable(format!(
                "Sound file missing: {}",
                path.display()
            )))
        }
    }

    fn send(&self, command: Command) -> Result<(), AlertError> {
        self.commands
            .send(command)
            .map_err(|_| AlertError::Device("Audio output unavailable".to_string()))
    }
}

impl Playback for RodioPlayback {
    fn play_once(&self, sound: &str) -> Result<(), AlertError> {
        let path = self.resolve(sound)?;
        self.send(Command::Once(path))
    }

    fn play_loop(&self, sound: &str, volume: f32) -> Result<(), AlertError> {
        let path = self.resolve(sound)?;
        self.send(Command::Loop {
            path,
            volume: volume.clamp(0.0, 1.0),
        })
    }

    fn stop_all(&self) -> Result<(), AlertError> {
        self.send(Command::StopAll)
    }
}

fn run_playback(mut commands: mpsc::UnboundedReceiver<Command>) {
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(e) => {
            // Dropping the receiver makes every later command fail fast
            error!("Audio output initialization failed: {}", e);
            return;
        }
    };

    let mut sinks: Vec<Sink> = Vec::new();

    while let Some(command) = commands.blocking_recv() {
        sinks.retain(|sink| !sink.empty());

        match command {
            Command::Once(path) => match open_source(&path) {
                Ok(source) => {
                    let sink = Sink::connect_new(stream.mixer());
                    sink.append(source);
                    sinks.push(sink);
                    debug!("Playing {}", path.display());
                }
                Err(e) => warn!("{}", e),
            },
            Command::Loop { path, volume } => match open_source(&path) {
                Ok(source) => {
                    let sink = Sink::connect_new(stream.mixer());
                    sink.set_volume(volume);
                    sink.append(source.repeat_infinite());
                    sinks.push(sink);
                    debug!("Looping {} at volume {}", path.display(), volume);
                }
                Err(e) => warn!("{}", e),
            },
            Command::StopAll => {
                for sink in sinks.drain(..) {
                    sink.stop();
                }
                debug!("Playback stopped");
            }
        }
    }

    debug!("Playback thread exiting");
}

fn open_source(path: &Path) -> Result<Decoder<BufReader<File>>, AlertError> {
    let file = File::open(path).map_err(|e| {
        AlertError::ResourceUnavailable(format!("Failed to open {}: {}", path.display(), e))
    })?;

    Decoder::new(BufReader::new(file)).map_err(|e| {
        AlertError::ResourceUnavailable(format!("Failed to decode {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_path() {
        let playback = RodioPlayback::new("/opt/whistle/sounds").unwrap();
        assert_eq!(
            playback.sound_path("alarm"),
            PathBuf::from("/opt/whistle/sounds/alarm.wav")
        );
    }

    #[test]
    fn test_missing_sound_is_resource_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let playback = RodioPlayback::new(dir.path()).unwrap();

        let once = playback.play_once("alarm");
        let looped = playback.play_loop("silent", 0.001);

        assert!(matches!(once, Err(AlertError::ResourceUnavailable(_))));
        assert!(matches!(looped, Err(AlertError::ResourceUnavailable(_))));
    }
}
