use std::fmt::{self, Display, Formatter};

// The whitespace set is fixed by the language: space, tab, newline.
fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r' || c == '\n'
}

/// Where something was found in the source. 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: &str) -> Self {
        Location {
            file: file.to_owned(),
            line: 1,
            column: 1,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A lexeme plus the location it started at.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub location: Location,
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

// A forward-only cursor over one source text. The text is held by value so
// includes can stack Inputs without lifetime plumbing; on a newline the line
// counter bumps and the column resets. mark()/marked() expose verbatim spans
// for the quoted-text and [code] forms, which are lexed by the caller.
pub struct Input {
    text: Vec<char>,
    offset: usize,
    location: Location,
    mark: usize,
    token_start: usize,
}

impl Input {
    pub fn new(file: &str, source: &str) -> Self {
        Input {
            text: source.chars().collect(),
            offset: 0,
            location: Location::new(file),
            mark: 0,
            token_start: 0,
        }
    }

    pub fn location(&self) -> Location {
        self.location.clone()
    }

    pub fn at_end(&self) -> bool {
        self.offset >= self.text.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.text.get(self.offset).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let next = self.peek()?;
        self.offset += 1;
        if next == '\n' {
            self.location.line += 1;
            self.location.column = 1;
        } else {
            self.location.column += 1;
        }
        Some(next)
    }

    pub fn skip_line(&mut self) {
        while let Some(c) = self.advance() {
            if c == '\n' {
                break;
            }
        }
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !is_whitespace(c) {
                break;
            }
            self.advance();
        }
    }

    // A token is a maximal run of non-whitespace characters. Returns None at
    // end of stream.
    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace();
        if self.at_end() {
            return None;
        }
        let location = self.location.clone();
        self.token_start = self.offset;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        Some(Token { text, location })
    }

    /// Offset where the most recent token began, for verbatim capture that
    /// must stop just short of a terminator token.
    pub fn last_token_start(&self) -> usize {
        self.token_start
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn mark(&mut self) {
        self.mark = self.offset;
    }

    /// The verbatim text between the mark and `end`, whitespace included.
    pub fn marked(&self, end: usize) -> String {
        self.text[self.mark..end].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_track_lines_and_columns() {
        let mut input = Input::new("test.fth", "dup swap\n  drop");
        let tok = input.next_token().unwrap();
        assert_eq!(tok.text, "dup");
        assert_eq!((tok.location.line, tok.location.column), (1, 1));
        let tok = input.next_token().unwrap();
        assert_eq!(tok.text, "swap");
        assert_eq!((tok.location.line, tok.location.column), (1, 5));
        let tok = input.next_token().unwrap();
        assert_eq!(tok.text, "drop");
        assert_eq!((tok.location.line, tok.location.column), (2, 3));
        assert!(input.next_token().is_none());
    }

    #[test]
    fn should_treat_tabs_as_whitespace() {
        let mut input = Input::new("test.fth", "\t1\t2");
        assert_eq!(input.next_token().unwrap().text, "1");
        assert_eq!(input.next_token().unwrap().text, "2");
    }

    #[test]
    fn should_skip_to_end_of_line() {
        let mut input = Input::new("test.fth", "a comment here\nnext");
        assert_eq!(input.next_token().unwrap().text, "a");
        input.skip_line();
        assert_eq!(input.next_token().unwrap().text, "next");
    }

    #[test]
    fn should_capture_marked_spans_verbatim() {
        let mut input = Input::new("test.fth", "start  one  two end");
        input.next_token().unwrap();
        input.mark();
        loop {
            let tok = input.next_token().unwrap();
            if tok.text == "end" {
                break;
            }
        }
        assert_eq!(input.marked(input.last_token_start()), "  one  two ");
    }

    #[test]
    fn should_compare_tokens_to_literals() {
        let mut input = Input::new("test.fth", ": main ;");
        let tok = input.next_token().unwrap();
        assert!(tok == ":");
        assert!(tok != ";");
    }

    #[test]
    fn should_retokenize_after_space_join() {
        let source = ": sq dup * ;";
        let mut input = Input::new("a", source);
        let mut texts = vec![];
        while let Some(tok) = input.next_token() {
            texts.push(tok.text);
        }
        let joined = texts.join(" ");
        let mut again = Input::new("b", &joined);
        let mut texts2 = vec![];
        while let Some(tok) = again.next_token() {
            texts2.push(tok.text);
        }
        assert_eq!(texts, texts2);
    }
}
