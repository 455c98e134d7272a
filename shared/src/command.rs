//! Command payload model
//!
//! Inbound payloads are JSON objects keyed by a `command` field:
//! ```text
//! { "command": "PLAY_SONG", "tempo": 120,
//!   "score": [ { "freq": 262, "beats": 1 }, { "freqStart": 200, "freqEnd": 400, "tie": true } ] }
//! ```
//! Parsing happens in two steps. [`CommandDocument::parse`] only checks that the
//! payload is a JSON object; each handler then decodes the typed [`Command`] it
//! understands with [`Command::from_document`].

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{limits, timing};

/// Errors raised while decoding or validating a command payload
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Payload too large: {0} bytes (max: {})", limits::MAX_PAYLOAD_BYTES)]
    PayloadTooLarge(usize),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing 'command' field")]
    MissingCommand,

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Score is empty")]
    EmptyScore,

    #[error("Score too long: {0} notes (max: {})", limits::MAX_SCORE_NOTES)]
    ScoreTooLong(usize),

    #[error("Invalid note #{index}: {reason}")]
    InvalidNote { index: usize, reason: String },
}

/// A parsed but not yet validated command payload
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDocument {
    fields: Map<String, Value>,
}

impl CommandDocument {
    /// Parse a raw payload into a JSON object document
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        if payload.len() > limits::MAX_PAYLOAD_BYTES {
            return Err(CommandError::PayloadTooLarge(payload.len()));
        }

        match serde_json::from_slice(payload)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(CommandError::NotAnObject),
        }
    }

    /// The raw `command` string, if present and a string
    pub fn command_name(&self) -> Option<&str> {
        self.fields.get("command").and_then(Value::as_str)
    }

    /// Look up an arbitrary field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A decoded request for an actuator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    On,
    Off,
    SetBrightness { brightness: u8 },
    Beep { duration: Duration },
    PlaySong { score: Score },
}

impl Command {
    /// Decode a typed command from a document
    ///
    /// The command name is matched case-insensitively. Missing or malformed
    /// required fields are rejected; optional fields fall back to defaults.
    pub fn from_document(doc: &CommandDocument) -> Result<Self, CommandError> {
        let name = match doc.get("command") {
            Some(Value::String(s)) => s.to_ascii_uppercase(),
            Some(_) => {
                return Err(CommandError::InvalidField {
                    field: "command",
                    reason: "expected a string".into(),
                })
            }
            None => return Err(CommandError::MissingCommand),
        };

        match name.as_str() {
            "ON" => Ok(Command::On),
            "OFF" => Ok(Command::Off),
            "SET_BRIGHTNESS" => {
                let raw = doc
                    .get("brightness")
                    .ok_or(CommandError::MissingField("brightness"))?;
                let value = raw.as_i64().ok_or_else(|| CommandError::InvalidField {
                    field: "brightness",
                    reason: format!("expected an integer, got {}", raw),
                })?;
                Ok(Command::SetBrightness {
                    brightness: value.clamp(0, 255) as u8,
                })
            }
            "BEEP" => {
                let ms = doc
                    .get("duration")
                    .and_then(Value::as_i64)
                    .map(|d| d.clamp(timing::BEEP_MIN_MS as i64, timing::BEEP_MAX_MS as i64) as u64)
                    .unwrap_or(timing::BEEP_DEFAULT_MS);
                Ok(Command::Beep {
                    duration: Duration::from_millis(ms),
                })
            }
            "PLAY_SONG" => Ok(Command::PlaySong {
                score: Score::from_document(doc)?,
            }),
            _ => Err(CommandError::UnknownCommand(name)),
        }
    }

    /// Canonical upper-case command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::On => "ON",
            Command::Off => "OFF",
            Command::SetBrightness { .. } => "SET_BRIGHTNESS",
            Command::Beep { .. } => "BEEP",
            Command::PlaySong { .. } => "PLAY_SONG",
        }
    }
}

/// One note of a score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// Start frequency in Hz, 0 for a rest
    pub freq_start: u32,
    /// End frequency in Hz, equal to `freq_start` when there is no glide
    pub freq_end: u32,
    /// Length in beats, always positive
    pub beats: f64,
    /// Output amplitude (PWM duty)
    pub amp: u8,
    /// Suppress the gap before the next note
    pub tie: bool,
}

impl Note {
    /// A plain note without glide
    pub fn tone(freq: u32, beats: f64) -> Self {
        Self {
            freq_start: freq,
            freq_end: freq,
            beats,
            amp: limits::DEFAULT_AMPLITUDE,
            tie: false,
        }
    }

    /// A silent note
    pub fn rest(beats: f64) -> Self {
        Self::tone(0, beats)
    }

    /// A note gliding linearly from `start` to `end`
    pub fn glide(start: u32, end: u32, beats: f64) -> Self {
        Self {
            freq_end: end,
            ..Self::tone(start, beats)
        }
    }

    pub fn tied(mut self) -> Self {
        self.tie = true;
        self
    }

    pub fn is_rest(&self) -> bool {
        self.freq_start == 0
    }

    pub fn is_glide(&self) -> bool {
        !self.is_rest() && self.freq_start != self.freq_end
    }

    /// Duration of this note at the given tempo
    pub fn duration(&self, tempo_bpm: u32) -> Duration {
        note_duration(tempo_bpm, self.beats)
    }

    /// Instantaneous frequency `elapsed` into a note lasting `duration`
    pub fn frequency_at(&self, elapsed: Duration, duration: Duration) -> u32 {
        if self.is_rest() {
            return 0;
        }
        glide_frequency(self.freq_start, self.freq_end, elapsed, duration)
    }
}

/// Wire form of a note; `freq` and `freqStart` are interchangeable, with
/// `freqStart` winning when both are present.
#[derive(Debug, Deserialize)]
struct RawNote {
    #[serde(default)]
    freq: Option<f64>,
    #[serde(default, alias = "freqStart")]
    freq_start: Option<f64>,
    #[serde(default, alias = "freqEnd")]
    freq_end: Option<f64>,
    #[serde(default)]
    beats: Option<f64>,
    #[serde(default)]
    amp: Option<f64>,
    #[serde(default)]
    tie: Option<bool>,
}

fn frequency_field(value: f64, name: &str) -> Result<u32, String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number, got {}", name, value));
    }
    Ok(value.round().min(u32::MAX as f64) as u32)
}

impl TryFrom<RawNote> for Note {
    type Error = String;

    fn try_from(raw: RawNote) -> Result<Self, Self::Error> {
        let freq_start = frequency_field(raw.freq_start.or(raw.freq).unwrap_or(0.0), "freqStart")?;
        let freq_end = match raw.freq_end {
            Some(end) => frequency_field(end, "freqEnd")?,
            None => freq_start,
        };

        let beats = raw.beats.unwrap_or(1.0);
        if !beats.is_finite() || beats <= 0.0 {
            return Err(format!("beats must be positive, got {}", beats));
        }

        let amp = raw
            .amp
            .filter(|a| a.is_finite())
            .map(|a| a.round().clamp(0.0, 255.0) as u8)
            .unwrap_or(limits::DEFAULT_AMPLITUDE);

        Ok(Note {
            freq_start,
            freq_end,
            beats,
            amp,
            tie: raw.tie.unwrap_or(false),
        })
    }
}

/// An ordered, finite, non-empty sequence of notes played at one tempo
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    notes: Vec<Note>,
    tempo_bpm: u32,
}

impl Score {
    /// Build a score, substituting the default tempo for a zero one
    pub fn new(notes: Vec<Note>, tempo_bpm: u32) -> Result<Self, CommandError> {
        if notes.is_empty() {
            return Err(CommandError::EmptyScore);
        }
        if notes.len() > limits::MAX_SCORE_NOTES {
            return Err(CommandError::ScoreTooLong(notes.len()));
        }
        let tempo_bpm = if tempo_bpm == 0 {
            timing::DEFAULT_TEMPO_BPM
        } else {
            tempo_bpm
        };
        Ok(Self { notes, tempo_bpm })
    }

    /// Decode the `score` and `tempo` fields of a PLAY_SONG document
    pub fn from_document(doc: &CommandDocument) -> Result<Self, CommandError> {
        let entries = match doc.get("score") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(CommandError::InvalidField {
                    field: "score",
                    reason: "expected an array of notes".into(),
                })
            }
            None => return Err(CommandError::MissingField("score")),
        };

        if entries.len() > limits::MAX_SCORE_NOTES {
            return Err(CommandError::ScoreTooLong(entries.len()));
        }

        let notes = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                RawNote::deserialize(entry)
                    .map_err(|e| e.to_string())
                    .and_then(Note::try_from)
                    .map_err(|reason| CommandError::InvalidNote { index, reason })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tempo = doc
            .get("tempo")
            .and_then(Value::as_f64)
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| t.round().min(u32::MAX as f64) as u32)
            .unwrap_or(timing::DEFAULT_TEMPO_BPM);

        Self::new(notes, tempo)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Total playing time including inter-note gaps
    pub fn total_duration(&self, gap: Duration) -> Duration {
        self.notes
            .iter()
            .map(|n| n.duration(self.tempo_bpm) + if n.tie { Duration::ZERO } else { gap })
            .sum()
    }
}

/// Note length: `(60000 / tempo) * beats` milliseconds, rounded to the millisecond
pub fn note_duration(tempo_bpm: u32, beats: f64) -> Duration {
    let tempo = if tempo_bpm == 0 {
        timing::DEFAULT_TEMPO_BPM
    } else {
        tempo_bpm
    };
    let ms = 60_000.0 / tempo as f64 * beats;
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis(ms.round() as u64)
}

/// Linear glide: `start + (t / duration) * (end - start)`, rounded to the nearest Hz
pub fn glide_frequency(start: u32, end: u32, elapsed: Duration, duration: Duration) -> u32 {
    if duration.is_zero() {
        return end;
    }
    let t = (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
    let freq = start as f64 + t * (end as f64 - start as f64);
    freq.round() as u32
}
