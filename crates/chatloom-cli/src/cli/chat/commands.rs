//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and control sessions, images, appearance and
//! the stored key.

use console::style;

use chatloom_types::config::Theme;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    Help,
    Clear,
    Exit,
    /// Start a new session.
    New,
    /// List sessions.
    List,
    /// Switch to a session by list number or id prefix.
    Switch(String),
    /// Delete a session; the active one when no selector is given.
    Delete(Option<String>),
    /// Regenerate the last reply.
    Retry,
    /// Generate an image from a prompt.
    Image(String),
    /// Attach an image file to the next message.
    Attach(String),
    /// Show or set the theme.
    Theme(Option<Theme>),
    /// Forget the API key and enter a new one.
    Key,
    /// Dismiss the quota notice.
    Dismiss,
    /// Unknown command or missing argument; carries the message to show.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd.to_lowercase(), Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
        None => (trimmed.to_lowercase(), None),
    };

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/clear" | "/cls" => ChatCommand::Clear,
        "/exit" | "/quit" | "/q" => ChatCommand::Exit,
        "/new" => ChatCommand::New,
        "/list" | "/ls" => ChatCommand::List,
        "/switch" | "/sw" => match arg {
            Some(selector) => ChatCommand::Switch(selector),
            None => ChatCommand::Unknown("/switch requires a session number or id".to_string()),
        },
        "/delete" | "/rm" => ChatCommand::Delete(arg),
        "/retry" | "/r" => ChatCommand::Retry,
        "/image" | "/img" => match arg {
            Some(prompt) => ChatCommand::Image(prompt),
            None => ChatCommand::Unknown("/image requires a prompt".to_string()),
        },
        "/attach" => match arg {
            Some(path) => ChatCommand::Attach(path),
            None => ChatCommand::Unknown("/attach requires a file path".to_string()),
        },
        "/theme" => match arg.as_deref().map(str::parse::<Theme>) {
            None => ChatCommand::Theme(None),
            Some(Ok(theme)) => ChatCommand::Theme(Some(theme)),
            Some(Err(e)) => ChatCommand::Unknown(e),
        },
        "/key" => ChatCommand::Key,
        "/dismiss" => ChatCommand::Dismiss,
        other => ChatCommand::Unknown(format!("Unknown command: {other}")),
    };
    Some(command)
}

/// Help text listing all available commands.
pub fn help_text() -> String {
    let entries = [
        ("/new", "Start a new session"),
        ("/list", "List sessions"),
        ("/switch <n|id>", "Switch to another session"),
        ("/delete [n|id]", "Delete a session (default: current)"),
        ("/retry", "Regenerate the last reply"),
        ("/image <prompt>", "Generate an image"),
        ("/attach <file>", "Attach an image to the next message"),
        ("/theme [light|dark]", "Show or set the theme"),
        ("/key", "Change the API key"),
        ("/dismiss", "Hide the quota notice"),
        ("/clear", "Clear the screen"),
        ("/help", "Show this help message"),
        ("/exit", "Leave the chat"),
    ];

    let mut out = format!("\n  {}\n\n", style("Available commands:").bold());
    for (cmd, description) in entries {
        out.push_str(&format!("  {}{description}\n", style(format!("{cmd:<22}")).cyan()));
    }
    out.push_str(&format!(
        "\n  {}\n",
        style("Ctrl+C stops a reply, Ctrl+D exits").dim()
    ));
    out
}
