//! Single shared playback slot for synthesized speech.
//!
//! Only one clip is loaded at a time. Loading a new clip stops and releases the
//! previous one first, so the last request wins.

use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::ai::SpeechClip;
use crate::media::{self, MediaError, DEFAULT_SPEECH_SAMPLE_RATE};

/// File name of the cached clip inside the cache directory
pub const CLIP_FILE_NAME: &str = "tts_output.wav";

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("invalid audio payload: {0}")]
    Payload(#[from] MediaError),
    #[error("could not write audio clip {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not start audio player `{player}`: {source}")]
    Player {
        player: String,
        #[source]
        source: std::io::Error,
    },
}

struct LoadedClip {
    path: PathBuf,
    player: Option<Child>,
}

pub struct AudioSlot {
    cache_dir: PathBuf,
    player: Option<String>,
    current: Option<LoadedClip>,
}

impl AudioSlot {
    /// `player` is a command taking the clip path as its only argument.
    /// With `None` clips are written to disk but not played.
    pub fn new(cache_dir: impl Into<PathBuf>, player: Option<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            player,
            current: None,
        }
    }

    /// First player found on this platform
    pub fn detect_player() -> Option<String> {
        let candidates: &[&str] = if cfg!(target_os = "macos") {
            &["afplay"]
        } else {
            &["paplay", "aplay", "ffplay"]
        };
        candidates
            .iter()
            .find(|name| which(name).is_some())
            .map(|name| name.to_string())
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Decode, cache and start playing a clip, replacing whatever was loaded
    pub fn play(&mut self, clip: &SpeechClip) -> Result<PathBuf, AudioError> {
        let bytes = media::decode_base64(&clip.data)?;
        let bytes = match clip.mime_type.as_deref() {
            Some(mime) if media::is_raw_pcm(mime) => media::wrap_pcm16_as_wav(
                &bytes,
                media::sample_rate(mime).unwrap_or(DEFAULT_SPEECH_SAMPLE_RATE),
            ),
            _ => bytes,
        };

        self.release();

        let path = self.cache_dir.join(CLIP_FILE_NAME);
        fs::create_dir_all(&self.cache_dir)
            .and_then(|_| fs::write(&path, &bytes))
            .map_err(|source| AudioError::Write {
                path: path.clone(),
                source,
            })?;

        let child = match &self.player {
            Some(player) => Some(
                Command::new(player)
                    .arg(&path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|source| AudioError::Player {
                        player: player.clone(),
                        source,
                    })?,
            ),
            None => None,
        };

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "speech clip loaded");
        self.current = Some(LoadedClip {
            path: path.clone(),
            player: child,
        });
        Ok(path)
    }

    /// Stop playback and drop the loaded clip
    pub fn release(&mut self) {
        if let Some(mut clip) = self.current.take() {
            if let Some(mut child) = clip.player.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
            let _ = fs::remove_file(&clip.path);
        }
    }
}

impl Drop for AudioSlot {
    fn drop(&mut self) {
        self.release();
    }
}

fn which(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
