use tower_lsp::lsp_types::{Position, Range};

/// One syntactic unit of a proof script, plus the raw text that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    /// The raw slice from the end of the previous sentence through the end
    /// of this one, leading whitespace and comments included.
    pub text: String,

    /// The span of the sentence proper, leading trivia excluded.
    pub range: Range,
}

/// Splits a script into sentences.
///
/// Returns the sentences and the tail: whatever trails the final sentence,
/// usually a newline. Concatenating every sentence's `text` and then the
/// tail reproduces the input byte for byte.
///
/// A sentence normally ends at a period followed by whitespace or the end
/// of input. A period glued to an identifier character is a qualified-name
/// dot (`Nat.add`) and does not terminate. Comments nest, strings hide
/// periods and comment delimiters, and a double quote inside a string is
/// written as `""`. Bullets (runs of `-`, `+` or `*`) and the focus braces
/// `{` and `}` are sentences of their own, with no period.
pub fn split(text: &str) -> (Vec<Sentence>, String) {
    let mut scanner = Scanner::new(text);
    let mut sentences = Vec::new();
    loop {
        let segment_start = scanner.offset();
        scanner.skip_trivia();
        if scanner.peek().is_none() {
            return (sentences, text[segment_start..].to_string());
        }
        let start = scanner.position();
        match scanner.peek() {
            Some(c @ ('-' | '+' | '*')) => {
                while scanner.peek() == Some(c) {
                    scanner.bump();
                }
            }
            Some('{') | Some('}') => {
                scanner.bump();
            }
            _ => scanner.scan_to_period(),
        }
        sentences.push(Sentence {
            text: text[segment_start..scanner.offset()].to_string(),
            range: Range {
                start,
                end: scanner.position(),
            },
        });
    }
}

struct Scanner<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    line: u32,
    character: u32,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Scanner<'a> {
        Scanner {
            text,
            chars: text.char_indices().collect(),
            index: 0,
            line: 0,
            character: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|&(_, c)| c)
    }

    /// The byte offset of the next unconsumed character.
    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map_or(self.text.len(), |&(offset, _)| offset)
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            character: self.character,
        }
    }

    fn bump(&mut self) {
        if let Some(&(_, c)) = self.chars.get(self.index) {
            self.index += 1;
            if c == '\n' {
                self.line += 1;
                self.character = 0;
            } else {
                self.character += 1;
            }
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.bump(),
                Some('(') if self.peek_at(1) == Some('*') => self.skip_comment(),
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        self.bump();
        self.bump();
        let mut depth = 1;
        while depth > 0 {
            match self.peek() {
                None => break,
                Some('(') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                Some('*') if self.peek_at(1) == Some(')') => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                }
                Some('"') => self.skip_string(),
                _ => self.bump(),
            }
        }
    }

    fn skip_string(&mut self) {
        self.bump();
        loop {
            match self.peek() {
                None => break,
                Some('"') if self.peek_at(1) == Some('"') => {
                    self.bump();
                    self.bump();
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                _ => self.bump(),
            }
        }
    }

    fn scan_to_period(&mut self) {
        loop {
            match self.peek() {
                None => break,
                Some('"') => self.skip_string(),
                Some('(') if self.peek_at(1) == Some('*') => self.skip_comment(),
                Some('.') => match self.peek_at(1) {
                    None => {
                        self.bump();
                        break;
                    }
                    Some(next) if next.is_whitespace() => {
                        self.bump();
                        break;
                    }
                    // An ellipsis, as in a notation's ".." binder.
                    Some('.') => {
                        self.bump();
                        self.bump();
                    }
                    // A qualified-name dot, or punctuation glued to the
                    // period; either way the sentence continues.
                    Some(_) => self.bump(),
                },
                _ => self.bump(),
            }
        }
    }
}
