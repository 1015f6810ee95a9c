use crate::domain::TokenError;

/// Index cursor over the lines of a text file.
///
/// Lines are never removed; the cursor only advances, so every failure can
/// report the 1-based line it occurred on.
#[derive(Debug, Clone)]
pub struct LineCursor<'a> {
    lines: Vec<&'a str>,
    position: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// 1-based number of the next unread line.
    pub fn line_number(&self) -> usize {
        self.position + 1
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.lines.len()
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.position).copied()
    }

    pub fn next_raw(&mut self) -> Result<(usize, &'a str), TokenError> {
        let line = self
            .peek()
            .ok_or_else(|| TokenError::new(self.line_number(), "unexpected end of input"))?;
        self.position += 1;
        Ok((self.position, line))
    }

    pub fn skip_blank_lines(&mut self) {
        while self.peek().is_some_and(|line| line.trim().is_empty()) {
            self.position += 1;
        }
    }

    /// Next non-blank line without consuming anything.
    pub fn peek_data(&self) -> Option<(usize, &'a str)> {
        self.lines[self.position.min(self.lines.len())..]
            .iter()
            .enumerate()
            .find(|(_, line)| !line.trim().is_empty())
            .map(|(offset, line)| (self.position + offset + 1, *line))
    }

    pub fn next_data(&mut self) -> Result<TokenLine<'a>, TokenError> {
        self.skip_blank_lines();
        let (number, raw) = self.next_raw()?;
        Ok(TokenLine::new(number, raw))
    }

    pub fn expect_closing_brace(&mut self) -> Result<(), TokenError> {
        let line = self.next_data()?;
        if line.raw.trim() == "}" {
            return Ok(());
        }
        Err(TokenError::new(
            line.number,
            format!("expected '}}', found '{}'", line.raw.trim()),
        ))
    }
}

/// One line split on whitespace. Only the leading tokens carry data; the
/// rest is a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLine<'a> {
    pub number: usize,
    pub raw: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> TokenLine<'a> {
    pub fn new(number: usize, raw: &'a str) -> Self {
        Self {
            number,
            raw,
            tokens: raw.split_whitespace().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.raw.contains(needle)
    }

    pub fn token(&self, index: usize) -> Result<&'a str, TokenError> {
        self.tokens.get(index).copied().ok_or_else(|| {
            TokenError::new(
                self.number,
                format!("expected at least {} token(s)", index + 1),
            )
        })
    }

    /// Token counted from the end; `0` is the last token.
    pub fn token_from_end(&self, index: usize) -> Result<&'a str, TokenError> {
        self.tokens
            .len()
            .checked_sub(index + 1)
            .map(|position| self.tokens[position])
            .ok_or_else(|| {
                TokenError::new(
                    self.number,
                    format!("expected at least {} token(s)", index + 1),
                )
            })
    }

    /// File-name token; `*` stands for "no file".
    pub fn file_name(&self, index: usize) -> Result<String, TokenError> {
        let token = self.token(index)?;
        Ok(if token == "*" {
            String::new()
        } else {
            token.to_string()
        })
    }

    pub fn f64(&self, index: usize) -> Result<f64, TokenError> {
        parse_f64(self.number, self.token(index)?)
    }

    pub fn u32(&self, index: usize) -> Result<u32, TokenError> {
        let token = self.token(index)?;
        token.parse::<u32>().map_err(|_| {
            TokenError::new(
                self.number,
                format!("expected a non-negative integer, found '{token}'"),
            )
        })
    }

    pub fn i64(&self, index: usize) -> Result<i64, TokenError> {
        let token = self.token(index)?;
        token.parse::<i64>().map_err(|_| {
            TokenError::new(self.number, format!("expected an integer, found '{token}'"))
        })
    }

    pub fn flag(&self, index: usize) -> Result<bool, TokenError> {
        let token = self.token(index)?;
        match token.to_ascii_uppercase().as_str() {
            "1" | "Y" | "T" | "TRUE" => Ok(true),
            "0" | "N" | "F" | "FALSE" => Ok(false),
            _ => Err(TokenError::new(
                self.number,
                format!("expected a boolean flag, found '{token}'"),
            )),
        }
    }

    pub fn f64_array<const N: usize>(&self) -> Result<[f64; N], TokenError> {
        let mut values = [0.0; N];
        for (index, value) in values.iter_mut().enumerate() {
            *value = self.f64(index)?;
        }
        Ok(values)
    }

    pub fn f64_values(&self, count: usize) -> Result<Vec<f64>, TokenError> {
        (0..count).map(|index| self.f64(index)).collect()
    }

    /// Leading run of integer tokens, stopping at the first label word.
    pub fn leading_u32s(&self) -> Vec<u32> {
        self.tokens
            .iter()
            .map_while(|token| token.parse::<u32>().ok())
            .collect()
    }

    pub fn rest_from(&self, index: usize) -> String {
        self.tokens
            .get(index..)
            .map(|tokens| tokens.join(" "))
            .unwrap_or_default()
    }
}

pub fn parse_f64(line: usize, token: &str) -> Result<f64, TokenError> {
    token
        .parse::<f64>()
        .map_err(|_| TokenError::new(line, format!("expected a number, found '{token}'")))
}
