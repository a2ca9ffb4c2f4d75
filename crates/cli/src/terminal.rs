use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use parley_runtime::Response;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_CALL: Color = Color::Yellow;
    const TOOL_RESULT: Color = Color::DarkGreen;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

const MAX_RESULT_CHARS: usize = 500;

/// Manages terminal I/O for the interactive REPL.
pub struct Terminal {
    /// Set once any reply text has been printed for the current turn.
    printed: AtomicBool,
}

impl Terminal {
    pub fn new() -> Self {
        Self {
            printed: AtomicBool::new(false),
        }
    }

    /// Print the startup banner.
    pub fn print_banner(&self, transport: &str, model: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("parley"),
            ResetColor,
            Print(" - chat completions in the terminal\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Transport: {} | Model: {}\n", transport, model)),
            Print("Type 'exit' or press Ctrl+D to end. Ctrl+C cancels the current reply.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt.
    /// Returns None on end of input or an exit command.
    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            execute!(stdout, Print("\n"))?;
            return Ok(None);
        }
        Ok(parse_input(&input))
    }

    /// Start a reply block for a new turn.
    pub fn begin_reply(&self) -> Result<()> {
        self.printed.store(false, Ordering::SeqCst);
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(Colors::DIM), Print("assistant> "), ResetColor)?;
        stdout.flush()?;
        Ok(())
    }

    /// Print a streamed text fragment.
    pub fn print_delta(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.printed.store(true, Ordering::SeqCst);
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ASSISTANT_TEXT),
            Print(text),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Close the reply block. Prints the answer text when nothing was
    /// streamed, then a dim status line.
    pub fn finish_reply(&self, response: &Response) -> Result<()> {
        if !self.printed.load(Ordering::SeqCst) {
            self.print_delta(&response.text())?;
        }

        let mut status = Vec::new();
        if let Some(reason) = response.first_choice().and_then(|c| c.finish_reason.as_ref()) {
            status.push(format!("finish: {}", reason));
        }
        if let Some(usage) = &response.usage {
            status.push(usage.to_string());
        }
        if !response.is_complete() {
            status.push("incomplete".to_string());
        }

        let mut stdout = io::stdout();
        execute!(stdout, Print("\n"))?;
        if !status.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print(format!("[{}]\n", status.join(" | "))),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Announce a tool call the model requested.
    pub fn display_tool_call(&self, name: &str, arguments: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::TOOL_CALL),
            Print(format!("[tool: {}] {}\n", name, arguments)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Display a tool execution result.
    pub fn display_tool_result(&self, tool_name: &str, content: &str, is_error: bool) -> Result<()> {
        let mut stdout = io::stdout();
        let color = if is_error { Colors::ERROR } else { Colors::TOOL_RESULT };
        let label = if is_error { "error" } else { "result" };

        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!("  [{} {}]: {}\n", tool_name, label, truncate(content, MAX_RESULT_CHARS))),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

/// Trim a raw input line. `None` means the user asked to leave.
fn parse_input(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match trimmed {
        "exit" | "quit" | "/exit" | "/quit" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn truncate(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars).collect();
    format!("{}... ({} chars total)", head, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  hello \n"), Some("hello".to_string()));
        assert_eq!(parse_input("\n"), Some(String::new()));
        assert_eq!(parse_input("quit\n"), None);
        assert_eq!(parse_input("/exit"), None);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        let long = "é".repeat(12);
        assert_eq!(truncate(&long, 10), format!("{}... (12 chars total)", "é".repeat(10)));
    }

    #[test]
    fn test_printed_flag_resets_per_reply() {
        let term = Terminal::new();
        term.printed.store(true, Ordering::SeqCst);
        term.begin_reply().unwrap();
        assert!(!term.printed.load(Ordering::SeqCst));
    }
}
