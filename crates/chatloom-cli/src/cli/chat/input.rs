//! Line input for the chat loop.
//!
//! `rustyline_async` keeps the prompt alive while replies stream above it.
//! The prompt shows a marker while an image is waiting to be sent.

use console::style;
use rustyline_async::{Readline, ReadlineError, ReadlineEvent, SharedWriter};

/// What the user did at the prompt.
#[derive(Debug)]
pub enum InputEvent {
    /// A submitted line, trimmed.
    Message(String),
    /// Ctrl+D or a closed terminal.
    Eof,
    /// Ctrl+C.
    Interrupted,
}

fn prompt(attachment_pending: bool) -> String {
    let marker = if attachment_pending {
        format!(" {}", style("[image]").magenta())
    } else {
        String::new()
    };
    format!("  {}{marker} {} ", style("You").green().bold(), style(">").green().bold())
}

pub struct ChatInput {
    rl: Readline,
    last_entry: Option<String>,
}

impl ChatInput {
    /// Open the prompt. The returned writer prints above it.
    pub fn new() -> Result<(Self, SharedWriter), ReadlineError> {
        let (rl, out) = Readline::new(prompt(false))?;
        Ok((
            Self {
                rl,
                last_entry: None,
            },
            out,
        ))
    }

    /// Show or hide the pending-attachment marker.
    pub fn set_attachment_pending(&mut self, pending: bool) {
        let _ = self.rl.update_prompt(&prompt(pending));
    }

    /// Read one line. Cancel-safe: partially typed text survives.
    pub async fn read_line(&mut self) -> InputEvent {
        match self.rl.readline().await {
            Ok(ReadlineEvent::Line(line)) => {
                let line = line.trim().to_string();
                if !line.is_empty() && self.last_entry.as_deref() != Some(line.as_str()) {
                    let _ = self.rl.add_history_entry(line.clone());
                    self.last_entry = Some(line.clone());
                }
                InputEvent::Message(line)
            }
            Ok(ReadlineEvent::Eof) | Err(_) => InputEvent::Eof,
            Ok(ReadlineEvent::Interrupted) => InputEvent::Interrupted,
        }
    }

    pub fn clear(&mut self) {
        let _ = self.rl.clear();
    }

    /// Flush pending output before the terminal is handed back.
    pub fn flush(&mut self) {
        let _ = self.rl.flush();
    }
}
