//! Parsing of one line of REPL input.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Memory,
    Facts,
    Search(String),
    Delete(String),
    DeleteAll,
    /// `/delete` without an argument.
    DeleteUsage,
    /// `/search` without an argument.
    SearchUsage,
    Reset,
    Exit,
    /// Anything else that is not blank: a message for the model.
    Turn(String),
}

pub const HELP: &str = "\
Available commands:
  /help               Show this help menu
  /memory             Show stored messages for this session
  /facts              Show messages retained as facts
  /search <keyword>   Show messages containing a keyword
  /delete <id>        Delete one message
  /delete all         Delete all stored memory
  /reset              Save this session and start fresh
  /exit               Save and quit";

impl Command {
    /// Parse a line. Commands match case-insensitively; blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let command = match head.to_lowercase().as_str() {
            "/help" if rest.is_empty() => Self::Help,
            "/memory" if rest.is_empty() => Self::Memory,
            "/facts" if rest.is_empty() => Self::Facts,
            "/reset" if rest.is_empty() => Self::Reset,
            "/exit" if rest.is_empty() => Self::Exit,
            "/search" if rest.is_empty() => Self::SearchUsage,
            "/search" => Self::Search(rest.to_string()),
            "/delete" if rest.is_empty() => Self::DeleteUsage,
            "/delete" if rest.eq_ignore_ascii_case("all") => Self::DeleteAll,
            "/delete" => Self::Delete(rest.to_string()),
            _ => Self::Turn(line.to_string()),
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_commands() {
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/memory"), Some(Command::Memory));
        assert_eq!(Command::parse("/facts"), Some(Command::Facts));
        assert_eq!(Command::parse("/reset"), Some(Command::Reset));
        assert_eq!(Command::parse("/exit"), Some(Command::Exit));
    }

    #[test]
    fn commands_ignore_case_and_padding() {
        assert_eq!(Command::parse("  /EXIT \n"), Some(Command::Exit));
        assert_eq!(Command::parse("/Memory"), Some(Command::Memory));
        assert_eq!(Command::parse("/DELETE ALL"), Some(Command::DeleteAll));
    }

    #[test]
    fn delete_forms() {
        assert_eq!(Command::parse("/delete all"), Some(Command::DeleteAll));
        assert_eq!(
            Command::parse("/delete msg_0192"),
            Some(Command::Delete("msg_0192".into()))
        );
        assert_eq!(Command::parse("/delete"), Some(Command::DeleteUsage));
        assert_eq!(Command::parse("/delete   "), Some(Command::DeleteUsage));
    }

    #[test]
    fn search_keeps_keyword_case() {
        assert_eq!(
            Command::parse("/search Database Pools"),
            Some(Command::Search("Database Pools".into()))
        );
        assert_eq!(Command::parse("/search"), Some(Command::SearchUsage));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("   \t"), None);
    }

    #[test]
    fn other_lines_are_turns() {
        assert_eq!(
            Command::parse("What is an API?"),
            Some(Command::Turn("What is an API?".into()))
        );
        assert_eq!(
            Command::parse("/unknown thing"),
            Some(Command::Turn("/unknown thing".into()))
        );
        assert_eq!(
            Command::parse("/help me please"),
            Some(Command::Turn("/help me please".into()))
        );
    }
}
