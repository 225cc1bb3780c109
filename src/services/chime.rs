//! Completion sound

use std::io::Write;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ChimeError {
    #[error("failed to write terminal bell: {0}")]
    Bell(#[source] std::io::Error),
    #[error("failed to launch chime command `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Plays one short sound when a phase completes
pub trait Chime: Send + Sync {
    fn play(&self) -> Result<(), ChimeError>;
}

/// ASCII BEL on stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl Chime for TerminalBell {
    fn play(&self) -> Result<(), ChimeError> {
        let mut stdout = std::io::stdout();
        stdout.write_all(b"\x07").map_err(ChimeError::Bell)?;
        stdout.flush().map_err(ChimeError::Bell)?;
        debug!("Rang terminal bell");
        Ok(())
    }
}

/// Runs an external player such as `paplay ding.wav`; the child is not awaited
#[derive(Debug, Clone)]
pub struct CommandChime {
    program: String,
    args: Vec<String>,
}

impl CommandChime {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace; `None` if it is blank
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl Chime for CommandChime {
    fn play(&self) -> Result<(), ChimeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| ChimeError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Chime `{}` finished", program),
                Ok(status) => warn!("Chime `{}` exited with {}", program, status),
                Err(e) => warn!("Failed to wait for chime `{}`: {}", program, e),
            }
        });

        info!("Playing chime with `{}`", self.program);
        Ok(())
    }
}

/// No sound at all
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentChime;

impl Chime for SilentChime {
    fn play(&self) -> Result<(), ChimeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_split_on_whitespace() {
        let chime = CommandChime::from_command_line("paplay  /usr/share/sounds/ding.wav").unwrap();
        assert_eq!(chime.program, "paplay");
        assert_eq!(chime.args, vec!["/usr/share/sounds/ding.wav".to_string()]);
        assert!(CommandChime::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn missing_program_reports_a_launch_error() {
        let chime = CommandChime::new("definitely-not-a-real-chime-player", Vec::new());
        assert!(matches!(chime.play(), Err(ChimeError::Launch { .. })));
    }
}
