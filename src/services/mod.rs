//! Side effects of the countdown
//!
//! This module contains the completion sound and the status line sink,
//! both best-effort: a failure here never blocks a timer transition.

pub mod chime;
pub mod status_line;

// Re-export main types
pub use chime::{Chime, ChimeError, CommandChime, SilentChime, TerminalBell};
pub use status_line::{StatusLine, TitleStatusLine};
