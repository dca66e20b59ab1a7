//! Whitespace tokenizer and positional flag/value scanning
//!
//! Shared by the firewall dump parser and the route listing parser. A flag's
//! value is whatever token immediately follows it; there is no quoting or
//! escaping, so values with embedded whitespace cannot be represented.

/// Split a line into whitespace-separated tokens.
///
/// Leading and trailing whitespace is ignored and runs of separators collapse.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Left-to-right cursor over a token slice
#[derive(Debug)]
pub struct Cursor<'a> {
    tokens: &'a [&'a str],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [&'a str], start: usize) -> Self {
        Self { tokens, pos: start }
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Token under the cursor, if any
    pub fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    /// Consume a flag-value pair.
    ///
    /// If the current token is one of `flags` and a following token exists,
    /// returns that token and moves past both. Otherwise the cursor is left
    /// where it was.
    pub fn take_value(&mut self, flags: &[&str]) -> Option<&'a str> {
        let flag = self.peek()?;
        if !flags.contains(&flag) {
            return None;
        }
        let value = self.tokens.get(self.pos + 1).copied()?;
        self.pos += 2;
        Some(value)
    }

    /// Skip one token without interpreting it
    pub fn skip(&mut self) {
        if !self.is_done() {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_collapses_whitespace() {
        let tokens = tokenize("  -A   INPUT\t-j  ACCEPT \n");
        assert_eq!(tokens, vec!["-A", "INPUT", "-j", "ACCEPT"]);
    }

    #[test]
    fn test_tokenize_blank_line() {
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_take_value_advances_past_pair() {
        let tokens = tokenize("-p tcp --dport 22");
        let mut cursor = Cursor::new(&tokens, 0);
        assert_eq!(cursor.take_value(&["-p"]), Some("tcp"));
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.take_value(&["--dport"]), Some("22"));
        assert!(cursor.is_done());
    }

    #[test]
    fn test_take_value_unmatched_flag_leaves_cursor() {
        let tokens = tokenize("-s 10.0.0.1");
        let mut cursor = Cursor::new(&tokens, 0);
        assert_eq!(cursor.take_value(&["-d"]), None);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_take_value_trailing_flag_has_no_value() {
        let tokens = tokenize("-j");
        let mut cursor = Cursor::new(&tokens, 0);
        assert_eq!(cursor.take_value(&["-j"]), None);
        assert_eq!(cursor.position(), 0);
        cursor.skip();
        assert!(cursor.is_done());
    }

    #[test]
    fn test_take_value_accepts_any_spelling() {
        let tokens = tokenize("comment hello");
        let mut cursor = Cursor::new(&tokens, 0);
        assert_eq!(
            cursor.take_value(&["-m", "comment", "--comment"]),
            Some("hello")
        );
    }
}
