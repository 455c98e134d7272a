//! Buzzer command handler
//!
//! Every write to the tone output goes through the sequencer, so a BEEP or
//! OFF arriving mid-song supersedes the song instead of racing it.

use super::{CommandHandler, CommandResult};
use crate::hardware::{HardwareError, ToneOutput};
use crate::playback::{Sequencer, SequencerConfig, ToneCommand};
use actuator_shared::{limits, timing, Command, CommandDocument};
use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

/// Handles ON / OFF / BEEP / PLAY_SONG for one tone output
pub struct BuzzerHandler {
    topic: String,
    /// Taken by the sequencer on initialize
    output: Mutex<Option<Box<dyn ToneOutput>>>,
    sequencer: OnceCell<Sequencer>,
    config: SequencerConfig,
}

impl BuzzerHandler {
    #[cfg(test)]
    pub fn new(topic: impl Into<String>, output: Box<dyn ToneOutput>) -> Self {
        Self::with_config(topic, output, SequencerConfig::default())
    }

    pub fn with_config(
        topic: impl Into<String>,
        output: Box<dyn ToneOutput>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            topic: topic.into(),
            output: Mutex::new(Some(output)),
            sequencer: OnceCell::new(),
            config,
        }
    }

    /// The playback engine, once the output has been configured
    pub fn sequencer(&self) -> Option<&Sequencer> {
        self.sequencer.get()
    }
}

#[async_trait]
impl CommandHandler for BuzzerHandler {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn initialize(&self) -> Result<(), HardwareError> {
        if self.sequencer.initialized() {
            return Ok(());
        }
        let output = self
            .output
            .lock()
            .await
            .take()
            .ok_or(HardwareError::NotConfigured)?;
        let sequencer = Sequencer::start(output, self.config.clone())?;
        // initialize is only driven by the registry, one handler at a time
        let _ = self.sequencer.set(sequencer);
        Ok(())
    }

    async fn handle(&self, document: &CommandDocument) -> CommandResult {
        let command = match Command::from_document(document) {
            Ok(command) => command,
            Err(e) => {
                return CommandResult::Rejected {
                    message: e.to_string(),
                }
            }
        };

        let Some(sequencer) = self.sequencer() else {
            return CommandResult::Failed {
                message: "Buzzer output not initialized".into(),
            };
        };

        match command {
            Command::On => {
                sequencer
                    .direct(ToneCommand::Sustain {
                        freq_hz: timing::BEEP_FREQ_HZ,
                        amp: limits::DEFAULT_AMPLITUDE,
                    })
                    .await;
                info!("  [BUZZER] on");
                CommandResult::Completed {
                    message: "Buzzer on".into(),
                }
            }
            Command::Off => {
                sequencer.stop().await;
                info!("  [BUZZER] off");
                CommandResult::Completed {
                    message: "Buzzer off".into(),
                }
            }
            Command::Beep { duration } => {
                sequencer
                    .direct(ToneCommand::Beep {
                        freq_hz: timing::BEEP_FREQ_HZ,
                        amp: limits::DEFAULT_AMPLITUDE,
                        duration,
                    })
                    .await;
                info!("  [BUZZER] beep {}ms", duration.as_millis());
                CommandResult::Completed {
                    message: format!("Beep for {}ms", duration.as_millis()),
                }
            }
            Command::PlaySong { score } => {
                let notes = score.len();
                let session = sequencer.play(score).await;
                CommandResult::Pending {
                    message: format!("Playing {} notes (session {})", notes, session),
                }
            }
            other => CommandResult::Rejected {
                message: format!("{} is not supported by the buzzer", other.name()),
            },
        }
    }

    async fn shutdown(&self) {
        if let Some(sequencer) = self.sequencer() {
            sequencer.shutdown().await;
        }
    }
}
