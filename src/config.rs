//! Configuration and CLI argument handling

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use crate::{
    services::{Chime, CommandChime, SilentChime, TerminalBell},
    store::{Identity, StoreSelector},
    timing::Visibility,
};

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "pomodoro-keeper")]
#[command(about = "A wall-clock accurate Pomodoro timer daemon")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding the device-local timer records
    #[arg(long, default_value = "pomodoro-data")]
    pub data_dir: PathBuf,

    /// Base URL of the per-user remote document store
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Start signed in as this user (requires --remote-url)
    #[arg(long)]
    pub user: Option<String>,

    /// Bearer token for the remote store
    #[arg(long, env = "POMODORO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Command that plays the completion sound, e.g. "paplay ding.wav"
    #[arg(long)]
    pub chime_command: Option<String>,

    /// Do not play any completion sound
    #[arg(long, conflicts_with = "chime_command")]
    pub no_chime: bool,

    /// Mirror the countdown into the terminal window title
    #[arg(long)]
    pub terminal_title: bool,

    /// Start in the foreground (frame-rate) tick regime
    #[arg(long)]
    pub visible: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn identity(&self) -> Identity {
        Identity::from_parts(self.user.clone(), self.token.clone())
    }

    pub fn store_selector(&self) -> StoreSelector {
        StoreSelector::new(&self.data_dir, self.remote_url.clone())
    }

    pub fn chime(&self) -> Arc<dyn Chime> {
        if self.no_chime {
            return Arc::new(SilentChime);
        }
        match self.chime_command.as_deref().and_then(CommandChime::from_command_line) {
            Some(command) => Arc::new(command),
            None => Arc::new(TerminalBell),
        }
    }

    pub fn initial_visibility(&self) -> Visibility {
        Visibility::from_visible(self.visible)
    }
}
