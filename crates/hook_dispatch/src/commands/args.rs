//! Console command line tokenizer.

use std::fmt;

/// Characters that always form a token of their own.
const BREAK_CHARS: &[char] = &['{', '}', '(', ')', '\'', ':'];

/// A tokenized command line shared by the Pre and Post phases of one
/// dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    line: String,
    args: Vec<String>,
    arg_s_start: usize,
}

impl CommandArgs {
    /// Splits a command line the way the engine console does.
    ///
    /// Tokens are separated by whitespace. A double-quoted run is one token
    /// without its quotes, and each of `{ } ( ) ' :` is a token by itself.
    pub fn tokenize(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let mut args = Vec::new();
        let mut arg_s_start = line.len();

        let mut chars = line.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }

            if args.len() == 1 {
                arg_s_start = start;
            }

            if c == '"' {
                chars.next();
                let mut token = String::new();
                for (_, c) in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    token.push(c);
                }
                args.push(token);
            } else if BREAK_CHARS.contains(&c) {
                chars.next();
                args.push(c.to_string());
            } else {
                let mut token = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || c == '"' || BREAK_CHARS.contains(&c) {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                args.push(token);
            }
        }

        Self {
            line,
            args,
            arg_s_start,
        }
    }

    /// Number of tokens, including the command name.
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Token at `index`, or an empty string past the end.
    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(String::as_str).unwrap_or("")
    }

    /// The command name.
    pub fn name(&self) -> &str {
        self.arg(0)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Raw text after the command name.
    pub fn arg_s(&self) -> &str {
        &self.line[self.arg_s_start..]
    }

    /// The full command line.
    pub fn command_string(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for CommandArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl From<&str> for CommandArgs {
    fn from(line: &str) -> Self {
        Self::tokenize(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_split() {
        let args = CommandArgs::tokenize("kick   5  now\n");
        assert_eq!(args.argc(), 3);
        assert_eq!(args.name(), "kick");
        assert_eq!(args.arg(1), "5");
        assert_eq!(args.arg(2), "now");
        assert_eq!(args.arg(3), "");
        assert_eq!(args.arg_s(), "5  now");
        assert_eq!(args.command_string(), "kick   5  now");
    }

    #[test]
    fn test_quoted_tokens() {
        let args = CommandArgs::tokenize("say \"hello there\" \"\"");
        assert_eq!(args.args(), &["say", "hello there", ""]);
        assert_eq!(args.arg_s(), "\"hello there\" \"\"");
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        let args = CommandArgs::tokenize("say \"oops");
        assert_eq!(args.args(), &["say", "oops"]);
    }

    #[test]
    fn test_break_characters() {
        let args = CommandArgs::tokenize("map de_dust2:1 {a}");
        assert_eq!(args.args(), &["map", "de_dust2", ":", "1", "{", "a", "}"]);
    }

    #[test]
    fn test_empty_and_bare_lines() {
        assert!(CommandArgs::tokenize("   ").is_empty());
        assert_eq!(CommandArgs::tokenize("").name(), "");

        let bare = CommandArgs::tokenize("status");
        assert_eq!(bare.argc(), 1);
        assert_eq!(bare.arg_s(), "");
    }
}
