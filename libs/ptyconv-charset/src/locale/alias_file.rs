//! The X locale.alias file parser.
//!
//! Lines carry two tokens: an alias (optionally ending in a colon, the
//! older format) and its replacement. `#` starts a comment, quoted
//! strings are honoured, and a backslash before a newline continues the
//! line.

use std::path::Path;
use tracing::debug;

#[derive(Debug, PartialEq)]
enum Token {
    Keyword(String),
    Eol,
    Eof,
}

struct Tokenizer<'a> {
    input: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
        }
    }

    fn next_token(&mut self) -> Token {
        loop {
            match self.input.peek() {
                None => return Token::Eof,
                Some(' ' | '\t' | '\r') => {
                    self.input.next();
                }
                Some('#') => {
                    for c in self.input.by_ref() {
                        if c == '\n' {
                            return Token::Eol;
                        }
                    }
                    return Token::Eof;
                }
                Some('\n') => {
                    self.input.next();
                    return Token::Eol;
                }
                Some(&quote @ ('\'' | '"')) => {
                    self.input.next();
                    return self.string(quote);
                }
                Some(_) => return self.keyword(),
            }
        }
    }

    fn string(&mut self, quote: char) -> Token {
        let mut word = String::new();
        while let Some(c) = self.input.next() {
            match c {
                c if c == quote => return Token::Keyword(word),
                '\\' => match self.input.next() {
                    Some('\n') | None => {}
                    Some(escaped) => word.push(escaped),
                },
                c => word.push(c),
            }
        }
        // unterminated string
        Token::Eof
    }

    fn keyword(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&c) = self.input.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => break,
                '\\' => {
                    self.input.next();
                    match self.input.next() {
                        Some('\n') | None => {}
                        Some(escaped) => word.push(escaped),
                    }
                }
                c => {
                    word.push(c);
                    self.input.next();
                }
            }
        }
        Token::Keyword(word)
    }

    /// Reads the next `alias replacement` pair, skipping blank lines.
    /// `None` at end of input or on a malformed line.
    fn next_pair(&mut self) -> Option<(String, String)> {
        let mut first = loop {
            match self.next_token() {
                Token::Keyword(word) => break word,
                Token::Eol => continue,
                Token::Eof => return None,
            }
        };
        if first.ends_with(':') {
            first.pop();
        }

        let Token::Keyword(second) = self.next_token()
            else {
                return None;
            };
        match self.next_token() {
            Token::Eol | Token::Eof => Some((first, second)),
            _ => None,
        }
    }
}

/// Looks a locale up in the alias file. The alias column must match
/// exactly.
pub fn lookup_alias(path: &Path, locale: &str) -> Option<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            debug!("cannot read {}: {error}", path.display());
            return None;
        }
    };
    let mut tokenizer = Tokenizer::new(&text);
    while let Some((alias, replacement)) = tokenizer.next_pair() {
        if alias == locale {
            debug!("alias file: {alias} -> {replacement}");
            return Some(replacement);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ALIASES: &str = "\
# locale.alias, abridged
ja_JP.ujis:\t\t\t\tja_JP.eucJP
ja_JP.eucJP\t\t\t\tja_JP.eucJP
ru:\t\t\t\t\tru_RU.KOI8-R
\"fr quoted\"\t\t\t\tfr_FR.ISO8859-1
continued\\
-name\t\t\t\t\tde_DE.ISO8859-15
";

    fn alias_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ALIASES.as_bytes()).unwrap();
        file
    }

    #[test]
    fn aliases_resolve() {
        let file = alias_file();
        assert_eq!(
            lookup_alias(file.path(), "ja_JP.ujis").as_deref(),
            Some("ja_JP.eucJP")
        );
        // the trailing colon on the alias column is optional
        assert_eq!(
            lookup_alias(file.path(), "ru").as_deref(),
            Some("ru_RU.KOI8-R")
        );
        assert_eq!(lookup_alias(file.path(), "no_NO").as_deref(), None);
    }

    #[test]
    fn quoting_and_continuations() {
        let file = alias_file();
        assert_eq!(
            lookup_alias(file.path(), "fr quoted").as_deref(),
            Some("fr_FR.ISO8859-1")
        );
        assert_eq!(
            lookup_alias(file.path(), "continued-name").as_deref(),
            Some("de_DE.ISO8859-15")
        );
    }

    #[test]
    fn missing_file_is_not_fatal() {
        assert_eq!(lookup_alias(Path::new("/nonexistent/locale.alias"), "C"), None);
    }
}
