//! Playback Module
//!
//! Runs scores on the tone output as a cancellable background activity so
//! command dispatch and connectivity maintenance never wait on a song.

mod sequencer;

pub use sequencer::{Sequencer, SequencerConfig, ToneCommand};
