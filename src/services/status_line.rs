//! Human-visible status line (window title)

use std::{
    io::Write,
    sync::Mutex,
};

use tracing::{debug, warn};

/// Receives the `MM:SS - <Phase>` line on every tick and state change
pub trait StatusLine: Send + Sync {
    fn set(&self, line: &str);
}

/// Remembers the last line, logs changes, and can mirror it to the terminal title
#[derive(Debug, Default)]
pub struct TitleStatusLine {
    terminal_title: bool,
    last: Mutex<String>,
}

impl TitleStatusLine {
    pub fn new(terminal_title: bool) -> Self {
        Self {
            terminal_title,
            last: Mutex::new(String::new()),
        }
    }

    pub fn current(&self) -> String {
        self.last.lock().map(|line| line.clone()).unwrap_or_default()
    }
}

impl StatusLine for TitleStatusLine {
    fn set(&self, line: &str) {
        let mut last = match self.last.lock() {
            Ok(last) => last,
            Err(e) => {
                warn!("Status line lock poisoned: {}", e);
                return;
            }
        };
        if *last == line {
            return;
        }
        last.clear();
        last.push_str(line);
        drop(last);

        debug!("Status line: {}", line);
        if self.terminal_title {
            // OSC 0: set icon name and window title.
            let mut stdout = std::io::stdout();
            if let Err(e) = write!(stdout, "\x1b]0;{}\x07", line).and_then(|_| stdout.flush()) {
                warn!("Failed to update terminal title: {}", e);
            }
        }
    }
}
