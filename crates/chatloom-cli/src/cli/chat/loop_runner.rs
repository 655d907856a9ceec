//! Main chat loop orchestration.
//!
//! Coordinates the interactive conversation: session selection, welcome
//! banner, the input loop, slash commands, and printing of streamed
//! replies as the session store publishes them. Replies are generated in
//! background tasks, so the loop keeps reading input while one streams and
//! Ctrl+C can stop it.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use console::style;
use rustyline_async::SharedWriter;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use chatloom_core::chat::advisory::Advisory;
use chatloom_core::storage::KvStore;
use chatloom_types::chat::{ImageAttachment, PLACEHOLDER_TITLE, SessionId};
use chatloom_types::error::ChatError;
use chatloom_types::event::{FailureKind, GenerationOutcome, SessionEvent};

use crate::cli::session::{resolve_session, session_table, SessionRow};
use crate::state::{AppChatService, AppState};

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::{ChatRenderer, StreamPrinter};

/// How long a one-shot run waits for the session title before exiting.
const TITLE_WAIT: Duration = Duration::from_secs(10);

/// Options for entering a chat.
#[derive(Debug, Default)]
pub struct ChatOptions {
    /// Session to open, by list number or id prefix.
    pub session: Option<String>,
    /// Open a fresh session instead of the most recent one.
    pub new: bool,
    /// Where sessions live, shown in the banner.
    pub storage_label: &'static str,
}

/// Why the input loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Quit,
    ChangeKey,
}

enum Step {
    Input(InputEvent),
    Event(Result<SessionEvent, broadcast::error::RecvError>),
    Advisory(bool),
}

/// Readline plus the writer that prints above the prompt.
struct Terminal {
    input: ChatInput,
    out: SharedWriter,
}

impl Terminal {
    fn open() -> Result<Self> {
        let (input, out) =
            ChatInput::new().map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;
        Ok(Self { input, out })
    }
}

/// Infer an image media type from a file extension.
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// What to suggest after a failed reply.
pub fn failure_hint(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Credential => "Use /key to change your API key.",
        FailureKind::Quota | FailureKind::Transient => "Type /retry to try again.",
    }
}

/// Read an image file into a base64 attachment.
pub async fn load_attachment(path: &Path) -> Result<ImageAttachment> {
    let mime_type = image_mime_type(path)
        .with_context(|| format!("{} is not a png, jpeg, gif or webp image", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    Ok(ImageAttachment {
        mime_type: mime_type.to_string(),
        data: STANDARD.encode(bytes),
    })
}

/// Make the requested session active, creating one when needed.
async fn open_session<K: KvStore>(
    service: &AppChatService<K>,
    selector: Option<&str>,
    new: bool,
) -> Result<SessionId> {
    if let Some(selector) = selector {
        let ids: Vec<SessionId> = service.sessions().iter().map(|s| s.id).collect();
        let id = resolve_session(&ids, selector)
            .with_context(|| format!("no session matches '{selector}'"))?;
        service.select_session(id);
        return Ok(id);
    }
    match service.active_session() {
        Some(session) if !new => Ok(session.id),
        _ => Ok(service.new_chat().await.id),
    }
}

/// Send one message, print the reply and exit.
///
/// Uses the given session, or a new one.
pub async fn ask_once<K: KvStore>(
    state: &AppState<K>,
    session: Option<&str>,
    text: &str,
    json: bool,
) -> Result<()> {
    let service = state.connect().await?;
    let session_id = open_session(&service, session, session.is_none()).await?;
    let mut events = service.subscribe();

    let handle = service.send_message(text, None).await?;
    handle.await.context("generation task failed")?;

    let session = service
        .session(session_id)
        .context("session disappeared during generation")?;
    let reply = session
        .messages
        .last()
        .filter(|m| m.is_assistant())
        .context("no reply recorded")?
        .clone();

    let mut title = session.title.clone();
    if !reply.is_error && session.titled && session.title == PLACEHOLDER_TITLE {
        // The title task runs after the reply settles.
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::TitleChanged { session_id: id, title }) if id == session_id => {
                        return Some(title);
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        if let Ok(Some(changed)) = tokio::time::timeout(TITLE_WAIT, wait).await {
            title = changed;
        }
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "session_id": session_id,
                "title": title,
                "reply": reply.text,
                "error": reply.is_error,
            })
        );
    } else if reply.is_error {
        eprintln!("  {} {}", style("!").red().bold(), reply.text);
    } else {
        let renderer = ChatRenderer::new(service.theme().await);
        println!("{}", renderer.render_final(&reply.text).trim_end());
    }

    if reply.is_error {
        anyhow::bail!("generation failed");
    }
    Ok(())
}

/// Run the interactive chat loop.
pub async fn run_chat_loop<K: KvStore>(state: &AppState<K>, options: ChatOptions) -> Result<()> {
    let mut service = state.connect().await?;
    open_session(&service, options.session.as_deref(), options.new).await?;

    print_welcome_banner(
        &state.config.model,
        service.sessions().len(),
        options.storage_label,
    );

    let mut renderer = ChatRenderer::new(service.theme().await);
    if let Some(session) = service.active_session() {
        if !session.messages.is_empty() {
            println!("{}", renderer.render_transcript(&session));
        }
    }

    loop {
        let mut chat = ChatLoop::new(service, renderer)?;
        chat.show_advisory();
        let exit = chat.run().await;

        let ChatLoop {
            service: previous,
            renderer: kept,
            mut terminal,
            ..
        } = chat;
        terminal.input.flush();
        // Readline must release the terminal before dialoguer prompts.
        drop(terminal);

        match exit {
            LoopExit::Quit => {
                previous.stop_generating();
                println!("\n  {}", style("Bye.").dim());
                return Ok(());
            }
            LoopExit::ChangeKey => {
                previous.change_credential().await?;
                drop(previous);
                state.prompt_and_store_key().await?;
                service = state.connect().await?;
                open_session(&service, None, false).await?;
                renderer = kept;
                info!("reconnected with new key");
                println!("  {} Key updated.", style("✓").green().bold());
            }
        }
    }
}

struct ChatLoop<K: KvStore> {
    service: AppChatService<K>,
    events: broadcast::Receiver<SessionEvent>,
    advisory: watch::Receiver<Option<Advisory>>,
    renderer: ChatRenderer,
    terminal: Terminal,
    printer: StreamPrinter,
    attachment: Option<ImageAttachment>,
}

impl<K: KvStore> ChatLoop<K> {
    fn new(service: AppChatService<K>, renderer: ChatRenderer) -> Result<Self> {
        Ok(Self {
            events: service.subscribe(),
            advisory: service.watch_advisory(),
            service,
            renderer,
            terminal: Terminal::open()?,
            printer: StreamPrinter::new(),
            attachment: None,
        })
    }

    async fn run(&mut self) -> LoopExit {
        loop {
            let step = tokio::select! {
                line = self.terminal.input.read_line() => Step::Input(line),
                event = self.events.recv() => Step::Event(event),
                changed = self.advisory.changed() => Step::Advisory(changed.is_ok()),
            };

            match step {
                Step::Input(InputEvent::Eof) => return LoopExit::Quit,
                Step::Input(InputEvent::Interrupted) => {
                    if self.service.stop_generating() {
                        debug!("generation stopped by user");
                    } else {
                        self.say(style("Press Ctrl+D or /exit to leave.").dim());
                    }
                }
                Step::Input(InputEvent::Message(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    match commands::parse(&text) {
                        Some(cmd) => {
                            if let Some(exit) = self.handle_command(cmd).await {
                                return exit;
                            }
                        }
                        None => self.send(&text).await,
                    }
                }
                Step::Event(Ok(event)) => self.on_event(event),
                Step::Event(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "chat loop lagged behind session events");
                }
                Step::Event(Err(broadcast::error::RecvError::Closed)) => {
                    self.events = self.service.subscribe();
                }
                Step::Advisory(true) => self.show_advisory(),
                Step::Advisory(false) => {
                    self.advisory = self.service.watch_advisory();
                }
            }
        }
    }

    fn say(&mut self, line: impl Display) {
        let _ = writeln!(self.terminal.out, "  {line}");
    }

    fn write_raw(&mut self, text: &str) {
        let _ = write!(self.terminal.out, "{text}");
        let _ = self.terminal.out.flush();
    }

    fn active_id(&self) -> Option<SessionId> {
        self.service.active_session().map(|s| s.id)
    }

    fn session_ids(&self) -> Vec<SessionId> {
        self.service.sessions().iter().map(|s| s.id).collect()
    }

    async fn ensure_active(&self) -> SessionId {
        match self.service.active_session() {
            Some(session) => session.id,
            None => self.service.new_chat().await.id,
        }
    }

    async fn send(&mut self, text: &str) {
        self.ensure_active().await;
        match self.service.send_message(text, self.attachment.clone()).await {
            Ok(_handle) => {
                if self.attachment.take().is_some() {
                    self.terminal.input.set_attachment_pending(false);
                }
            }
            Err(ChatError::GenerationInProgress) => {
                self.say(style("A reply is still streaming. Wait for it or press Ctrl+C.").yellow());
            }
            Err(e) => self.say(style(format!("! {e}")).red()),
        }
    }

    async fn handle_command(&mut self, cmd: ChatCommand) -> Option<LoopExit> {
        match cmd {
            ChatCommand::Help => {
                let help = commands::help_text();
                self.write_raw(&help);
            }
            ChatCommand::Clear => self.terminal.input.clear(),
            ChatCommand::Exit => return Some(LoopExit::Quit),
            ChatCommand::New => {
                let session = self.service.new_chat().await;
                self.printer = StreamPrinter::new();
                self.say(format!("{} {}", style("+").cyan().bold(), session.title));
            }
            ChatCommand::List => {
                let rows: Vec<SessionRow> = self
                    .service
                    .sessions()
                    .iter()
                    .map(|s| SessionRow {
                        id: s.id,
                        title: s.title.clone(),
                        messages: s.messages.len(),
                    })
                    .collect();
                let table = session_table(&rows, self.active_id());
                self.write_raw(&format!("\n{table}\n\n"));
            }
            ChatCommand::Switch(selector) => match resolve_session(&self.session_ids(), &selector) {
                Some(id) => {
                    self.service.select_session(id);
                    self.printer = StreamPrinter::new();
                    if let Some(session) = self.service.session(id) {
                        let transcript = self.renderer.render_transcript(&session);
                        self.write_raw(&transcript);
                    }
                }
                None => self.say(style(format!("No session matches '{selector}'.")).yellow()),
            },
            ChatCommand::Delete(selector) => {
                let target = match selector.as_deref() {
                    Some(selector) => resolve_session(&self.session_ids(), selector),
                    None => self.active_id(),
                };
                match target {
                    Some(id) => {
                        let title = self.service.session(id).map(|s| s.title.clone()).unwrap_or_default();
                        if self.service.delete_session(id).await {
                            self.say(format!("{} Deleted '{title}'", style("✓").green().bold()));
                        }
                        self.ensure_active().await;
                    }
                    None => self.say(style("No matching session.").yellow()),
                }
            }
            ChatCommand::Retry => {
                let session_id = self.ensure_active().await;
                match self.service.retry(session_id).await {
                    Ok(Some(_handle)) => {}
                    Ok(None) => self.say(style("Nothing to retry.").dim()),
                    Err(e) => self.say(style(format!("! {e}")).red()),
                }
            }
            ChatCommand::Image(prompt) => {
                let session_id = self.ensure_active().await;
                match self.service.generate_image(&prompt).await {
                    Ok(()) => {
                        let last = self
                            .service
                            .session(session_id)
                            .and_then(|s| s.messages.last().cloned());
                        if let Some(message) = last {
                            let rendered = self.renderer.render_message(&message);
                            self.write_raw(&format!("\n{rendered}\n\n"));
                        }
                    }
                    Err(e) => self.say(style(format!("! {e}")).red()),
                }
            }
            ChatCommand::Attach(path) => match load_attachment(Path::new(&path)).await {
                Ok(image) => {
                    self.say(format!(
                        "{} {} attached to your next message",
                        style("+").cyan().bold(),
                        image.mime_type
                    ));
                    self.attachment = Some(image);
                    self.terminal.input.set_attachment_pending(true);
                }
                Err(e) => self.say(style(format!("! {e:#}")).red()),
            },
            ChatCommand::Theme(None) => {
                let theme = self.renderer.theme();
                self.say(format!("Theme: {}", style(theme).bold()));
            }
            ChatCommand::Theme(Some(theme)) => match self.service.set_theme(theme).await {
                Ok(()) => {
                    self.renderer.set_theme(theme);
                    self.say(format!("Theme set to {}", style(theme).bold()));
                }
                Err(e) => self.say(style(format!("! {e}")).red()),
            },
            ChatCommand::Key => return Some(LoopExit::ChangeKey),
            ChatCommand::Dismiss => self.service.dismiss_advisory(),
            ChatCommand::Unknown(message) => {
                self.say(format!(
                    "{} {message}. Type /help for available commands.",
                    style("?").yellow().bold()
                ));
            }
        }
        None
    }

    fn on_event(&mut self, event: SessionEvent) {
        let active = self.active_id();
        match event {
            SessionEvent::MessageFlushed {
                session_id,
                message_id,
                text,
            } if Some(session_id) == active => {
                if let Some(out) = self.printer.on_flush(message_id, &text) {
                    self.write_raw(&out);
                }
            }
            SessionEvent::GenerationFinished {
                session_id,
                message_id,
                outcome,
            } if Some(session_id) == active => {
                let message = self
                    .service
                    .session(session_id)
                    .and_then(|s| s.messages.iter().find(|m| m.id == message_id).cloned());
                match outcome {
                    GenerationOutcome::Completed | GenerationOutcome::Cancelled => {
                        let text = message.map(|m| m.text).unwrap_or_default();
                        let out = self.printer.finish(message_id, &text);
                        self.write_raw(&out);
                        if outcome == GenerationOutcome::Cancelled {
                            self.say(style("(stopped)").dim());
                        }
                    }
                    GenerationOutcome::Failed { kind } => {
                        if self.printer.is_streaming() {
                            let out = self.printer.finish(message_id, "");
                            self.write_raw(&out);
                        } else {
                            self.printer = StreamPrinter::new();
                        }
                        let text = message.map(|m| m.text).unwrap_or_default();
                        self.say(format!("{} {}", style("!").red().bold(), style(text).red()));
                        self.say(style(failure_hint(kind)).dim());
                    }
                }
                self.write_raw("\n");
            }
            SessionEvent::GenerationFinished { .. } => {
                self.printer = StreamPrinter::new();
            }
            SessionEvent::TitleChanged { session_id, title } if Some(session_id) == active => {
                self.say(style(format!("Title: {title}")).dim());
            }
            _ => {}
        }
    }

    fn show_advisory(&mut self) {
        let current = self.advisory.borrow_and_update().clone();
        if let Some(advisory) = current {
            self.say(format!(
                "{} {}",
                style("!").yellow().bold(),
                style(&advisory.message).yellow()
            ));
            self.say(style("Use /key to change your API key or /dismiss to hide this.").dim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type(Path::new("cat.PNG")), Some("image/png"));
        assert_eq!(image_mime_type(Path::new("a/b/photo.jpeg")), Some("image/jpeg"));
        assert_eq!(image_mime_type(Path::new("notes.txt")), None);
        assert_eq!(image_mime_type(Path::new("noext")), None);
    }

    #[test]
    fn test_failure_hint_points_rejected_key_to_key_command() {
        assert_eq!(failure_hint(FailureKind::Credential), "Use /key to change your API key.");
        assert!(!failure_hint(FailureKind::Credential).contains("/retry"));
        assert_eq!(failure_hint(FailureKind::Quota), "Type /retry to try again.");
        assert_eq!(failure_hint(FailureKind::Transient), "Type /retry to try again.");
    }

    #[tokio::test]
    async fn test_load_attachment_encodes_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let attachment = load_attachment(&path).await.unwrap();
        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.data, "aGVsbG8=");
    }

    #[tokio::test]
    async fn test_load_attachment_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();
        assert!(load_attachment(&path).await.is_err());
    }
}
