use crossterm::style::{Color, ResetColor, SetForegroundColor};
use std::fmt::Write as _;
use std::io::{self, Write};

use crate::single_turn::SingleTurnState;
use crate::store::{ChatMessage, Sender};

/// Formats published snapshots as bordered cards for the terminal
pub struct ResponseCard {
    width: usize,
    color: bool,
}

impl ResponseCard {
    pub fn new() -> Self {
        Self {
            width: 120, // Default width that fits most terminals
            color: true,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(12);
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Render one chat message as a card
    pub fn render_message(&self, message: &ChatMessage) -> String {
        let (title, color) = match message.sender {
            Sender::User => ("You", Color::Cyan),
            Sender::Model => ("Gemini", Color::Green),
            Sender::Error => ("Error", Color::Red),
        };
        let body = if message.pending {
            "⠋ thinking..."
        } else {
            message.text.as_str()
        };
        let title = format!("{} · {}", title, message.created_at.format("%H:%M"));
        self.card(&title, body, color)
    }

    pub fn render_messages<'a, I>(&self, messages: I) -> String
    where
        I: IntoIterator<Item = &'a ChatMessage>,
    {
        messages
            .into_iter()
            .map(|message| self.render_message(message))
            .collect()
    }

    pub fn render_state(&self, state: &SingleTurnState) -> String {
        match state {
            SingleTurnState::Idle => self.card("Ready", "Ask a question to get started.", Color::DarkGrey),
            SingleTurnState::Loading => self.card("Loading", "⠋ waiting for the model...", Color::Yellow),
            SingleTurnState::Success(output) => self.card("Answer", output, Color::Green),
            SingleTurnState::Error => self.card(
                "Error",
                "Something went wrong. Type /retry to try again.",
                Color::Red,
            ),
        }
    }

    pub fn print(&self, rendered: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()
    }

    fn card(&self, title: &str, content: &str, color: Color) -> String {
        let mut out = String::new();
        if self.color {
            let _ = write!(out, "{}", SetForegroundColor(color));
        }
        out.push_str(&self.header(title));
        out.push('\n');

        let content_width = self.width.saturating_sub(4); // Account for "│ " on both sides
        for line in content.lines() {
            for wrapped in wrap_text(line, content_width) {
                let padding = content_width.saturating_sub(wrapped.chars().count());
                let _ = writeln!(out, "│ {}{} │", wrapped, " ".repeat(padding));
            }
        }
        if content.is_empty() {
            let _ = writeln!(out, "│{}│", " ".repeat(self.width.saturating_sub(2)));
        }

        let _ = writeln!(out, "╰{}╯", "─".repeat(self.width.saturating_sub(2)));
        if self.color {
            let _ = write!(out, "{}", ResetColor);
        }
        out
    }

    fn header(&self, title: &str) -> String {
        let title = format!(" {} ", title);
        let remaining = self.width.saturating_sub(2);
        let right = remaining.saturating_sub(title.chars().count() + 1);
        format!("╭─{}{}╮", title, "─".repeat(right))
    }
}

impl Default for ResponseCard {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap text to fit within the specified width
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if text.chars().count() <= width {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current_line.chars().count();
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(width: usize) -> ResponseCard {
        ResponseCard::new().with_width(width).with_color(false)
    }

    #[test]
    fn test_wrap_text() {
        let text = "This is a very long line that should be wrapped properly";
        let wrapped = wrap_text(text, 20);

        assert!(wrapped.len() > 1);
        for line in &wrapped {
            assert!(line.len() <= 20);
        }
    }

    #[test]
    fn test_card_lines_share_width() {
        let rendered = plain(40).render_message(&ChatMessage::model("hello there"));
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("╭─ Gemini"));
        assert!(lines[1].contains("hello there"));
        for line in &lines {
            assert_eq!(line.chars().count(), 40);
        }
    }

    #[test]
    fn test_pending_and_error_titles() {
        let card = plain(60);
        assert!(card.render_message(&ChatMessage::placeholder()).contains("thinking"));
        assert!(card.render_message(&ChatMessage::error("timeout")).starts_with("╭─ Error"));
        assert!(card.render_message(&ChatMessage::user("hi")).starts_with("╭─ You"));
    }

    #[test]
    fn test_render_state() {
        let card = plain(60);
        assert!(card
            .render_state(&SingleTurnState::Success("4".to_string()))
            .contains("│ 4 "));
        assert!(card.render_state(&SingleTurnState::Error).contains("/retry"));
    }

    #[test]
    fn test_color_codes_only_when_enabled() {
        let message = ChatMessage::user("hi");
        assert!(!plain(40).render_message(&message).contains('\x1b'));
        assert!(ResponseCard::new()
            .with_width(40)
            .render_message(&message)
            .contains('\x1b'));
    }
}
