//! Terminal rendering: markdown with syntax-highlighted code blocks, and
//! incremental printing of streamed replies.
//!
//! `ChatRenderer` combines `termimad` for prose and `syntect` for code block
//! highlighting. While a reply streams, flushed text is printed raw through
//! a `StreamPrinter`; stored transcripts are rendered as formatted markdown.

use crossterm::style::Color;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::as_24_bit_terminal_escaped;
use termimad::MadSkin;
use uuid::Uuid;

use chatloom_core::chat::session::ChatSession;
use chatloom_types::chat::ChatMessage;
use chatloom_types::config::Theme;

/// Label printed before assistant replies.
pub const ASSISTANT_LABEL: &str = "Gemini";

/// Terminal markdown renderer with syntax highlighting.
pub struct ChatRenderer {
    theme: Theme,
    skin: MadSkin,
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl ChatRenderer {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            skin: Self::skin_for(theme),
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.skin = Self::skin_for(theme);
    }

    fn skin_for(theme: Theme) -> MadSkin {
        let (mut skin, accent) = match theme {
            Theme::Dark => (MadSkin::default_dark(), Color::Cyan),
            Theme::Light => (MadSkin::default_light(), Color::Blue),
        };
        let tc = Self::crossterm_to_termimad(accent);
        skin.bold.set_fg(tc);
        skin.headers[0].set_fg(tc);
        skin.headers[1].set_fg(tc);
        skin.inline_code
            .set_fg(termimad::crossterm::style::Color::Yellow);
        skin
    }

    /// Render a complete markdown response with syntax-highlighted code blocks.
    ///
    /// Code fences with a language tag are highlighted via syntect; everything
    /// else is rendered through termimad.
    pub fn render_final(&self, markdown: &str) -> String {
        let mut output = String::new();
        let mut in_code_block = false;
        let mut code_lang = String::new();
        let mut code_buf = String::new();

        for line in markdown.lines() {
            if line.starts_with("```") && !in_code_block {
                in_code_block = true;
                code_lang = line.trim_start_matches('`').trim().to_string();
                code_buf.clear();
            } else if line.starts_with("```") && in_code_block {
                in_code_block = false;
                output.push_str(&self.highlight_code(&code_buf, &code_lang));
                output.push('\n');
            } else if in_code_block {
                code_buf.push_str(line);
                code_buf.push('\n');
            } else {
                output.push_str(&format!("{}", self.skin.term_text(line)));
            }
        }

        if in_code_block && !code_buf.is_empty() {
            output.push_str(&self.highlight_code(&code_buf, &code_lang));
        }

        output
    }

    /// One transcript entry, as shown when switching sessions.
    pub fn render_message(&self, message: &ChatMessage) -> String {
        if message.is_user() {
            let mut line = format!("  {} {}", console::style("You >").green().bold(), message.text);
            if let Some(image) = &message.image {
                line.push_str(&format!(
                    " {}",
                    console::style(format!("[{} attached]", image.mime_type)).dim()
                ));
            }
            return line;
        }

        let label = console::style(format!("{ASSISTANT_LABEL} >")).cyan().bold();
        if message.is_error {
            return format!("  {label} {}", console::style(&message.text).red());
        }
        if let Some(image) = &message.generated_image {
            return format!(
                "  {label} {}\n  {}",
                message.text,
                console::style(&image.url).underlined().cyan()
            );
        }
        format!("  {label}\n{}", self.render_final(&message.text).trim_end())
    }

    /// Full transcript of a session.
    pub fn render_transcript(&self, session: &ChatSession) -> String {
        let mut out = format!("\n  {}\n\n", console::style(&session.title).bold());
        if session.messages.is_empty() {
            out.push_str(&format!("  {}\n", console::style("(no messages yet)").dim()));
        }
        for message in &session.messages {
            out.push_str(&self.render_message(message));
            out.push_str("\n\n");
        }
        out
    }

    /// Highlight a code block using syntect.
    fn highlight_code(&self, code: &str, lang: &str) -> String {
        let syntax = if lang.is_empty() {
            self.syntax_set.find_syntax_plain_text()
        } else {
            self.syntax_set
                .find_syntax_by_token(lang)
                .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
        };

        let theme_name = match self.theme {
            Theme::Dark => "base16-ocean.dark",
            Theme::Light => "InspiredGitHub",
        };
        let Some(theme) = self.theme_set.themes.get(theme_name) else {
            return code.to_string();
        };
        let mut h = HighlightLines::new(syntax, theme);

        let mut output = String::new();
        output.push_str(&format!("  {}\n", console::style(format!("--- {lang} ---")).dim()));

        for line in code.lines() {
            let ranges: Vec<(Style, &str)> = h
                .highlight_line(line, &self.syntax_set)
                .unwrap_or_default();
            let escaped = as_24_bit_terminal_escaped(&ranges[..], false);
            output.push_str(&format!("  {escaped}\x1b[0m\n"));
        }

        output
    }

    /// Convert a crossterm Color to termimad Color.
    fn crossterm_to_termimad(color: Color) -> termimad::crossterm::style::Color {
        match color {
            Color::Cyan => termimad::crossterm::style::Color::Cyan,
            Color::Blue => termimad::crossterm::style::Color::Blue,
            Color::Rgb { r, g, b } => termimad::crossterm::style::Color::Rgb { r, g, b },
            _ => termimad::crossterm::style::Color::Cyan,
        }
    }
}

/// Tracks how much of each streamed reply has been printed.
///
/// Flushes carry the full accumulated text, so only the unseen suffix is
/// returned for printing.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    current: Option<Uuid>,
    printed: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output for a flush of `text` into `message_id`.
    pub fn on_flush(&mut self, message_id: Uuid, text: &str) -> Option<String> {
        let mut out = String::new();
        if self.current != Some(message_id) {
            self.current = Some(message_id);
            self.printed = 0;
            out.push_str(&format!(
                "\n  {} ",
                console::style(format!("{ASSISTANT_LABEL} >")).cyan().bold()
            ));
        }
        if let Some(rest) = text.get(self.printed..) {
            out.push_str(rest);
            self.printed = text.len();
        }
        (!out.is_empty()).then_some(out)
    }

    /// Remaining output once `message_id` settles with `final_text`.
    ///
    /// Returns an empty string if the message was never streamed and has
    /// no text.
    pub fn finish(&mut self, message_id: Uuid, final_text: &str) -> String {
        let mut out = if final_text.is_empty() && self.current != Some(message_id) {
            String::new()
        } else {
            self.on_flush(message_id, final_text).unwrap_or_default()
        };
        self.current = None;
        self.printed = 0;
        out.push('\n');
        out
    }

    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_printer_prints_only_new_text() {
        console::set_colors_enabled(false);
        let id = Uuid::now_v7();
        let mut printer = StreamPrinter::new();

        let first = printer.on_flush(id, "Hi").unwrap();
        assert!(first.contains("Gemini >"));
        assert!(first.ends_with("Hi"));
        assert_eq!(printer.on_flush(id, "Hi there").unwrap(), " there");
        assert!(printer.on_flush(id, "Hi there").is_none());
        assert_eq!(printer.finish(id, "Hi there!"), "!\n");
        assert!(!printer.is_streaming());
    }

    #[test]
    fn test_stream_printer_finish_without_flush() {
        console::set_colors_enabled(false);
        let id = Uuid::now_v7();
        let mut printer = StreamPrinter::new();
        let out = printer.finish(id, "Short answer");
        assert!(out.contains("Gemini >"));
        assert!(out.ends_with("Short answer\n"));

        assert_eq!(printer.finish(Uuid::now_v7(), ""), "\n");
    }

    #[test]
    fn test_render_final_highlights_code() {
        let renderer = ChatRenderer::new(Theme::Dark);
        let out = renderer.render_final("Here:\n```rust\nfn main() {}\n```\n");
        assert!(out.contains("--- rust ---"));
        assert!(out.contains("main"));
    }

    #[test]
    fn test_render_error_and_image_messages() {
        console::set_colors_enabled(false);
        let renderer = ChatRenderer::new(Theme::Light);

        let mut failed = ChatMessage::assistant_placeholder();
        failed.is_loading = false;
        failed.is_error = true;
        failed.text = "Sorry, something went wrong. boom".to_string();
        assert!(renderer.render_message(&failed).contains("boom"));

        let mut image = ChatMessage::assistant_placeholder().into_image_generation();
        image.is_loading = false;
        image.text = "Here's your generated image.".to_string();
        image.generated_image = Some(chatloom_types::chat::GeneratedImage {
            url: "https://image.pollinations.ai/prompt/cat".to_string(),
            prompt: "cat".to_string(),
            model: "Pollinations AI".to_string(),
        });
        assert!(renderer.render_message(&image).contains("pollinations.ai/prompt/cat"));
    }

    #[test]
    fn test_theme_switch() {
        let mut renderer = ChatRenderer::new(Theme::Light);
        renderer.set_theme(Theme::Dark);
        assert_eq!(renderer.theme(), Theme::Dark);
    }
}
