use serde::Serialize;

/// Byte range in source, half-open (`start..end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `offset` lies in `start..end`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Like `contains`, but also accepts the end offset (a cursor placed
    /// right after the last byte).
    pub fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Source text covered by this span. Empty if the span does not fall on
    /// character boundaries.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// The three delimiter pairs of the template language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Delimiter {
    /// `{% ... %}`
    Tag,
    /// `{{ ... }}`
    Expression,
    /// `{# ... #}`
    Comment,
}

impl Delimiter {
    pub fn open(self) -> &'static str {
        match self {
            Delimiter::Tag => "{%",
            Delimiter::Expression => "{{",
            Delimiter::Comment => "{#",
        }
    }

    pub fn close(self) -> &'static str {
        match self {
            Delimiter::Tag => "%}",
            Delimiter::Expression => "}}",
            Delimiter::Comment => "#}",
        }
    }

    /// Classify the two bytes following a `{`.
    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'%' => Some(Delimiter::Tag),
            b'{' => Some(Delimiter::Expression),
            b'#' => Some(Delimiter::Comment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "delimiter", rename_all = "camelCase")]
pub enum TokenKind {
    /// Opening delimiter, including a trailing `-`/`~` trim marker
    Open(Delimiter),
    /// Closing delimiter, including a leading `-`/`~` trim marker
    Close(Delimiter),
    /// A terminated `'...'` or `"..."` literal inside a tag or expression
    QuotedString,
    /// Anything else: markup, tag arguments, comment bodies, unterminated strings
    Raw,
}

/// Tokens produced by the lexer. Consecutive tokens are contiguous and
/// together cover the whole source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Delimiter carries a whitespace-control marker (`{%-`, `~}}`, ...)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub trim: bool,
}

impl Token {
    fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
            trim: false,
        }
    }
}

/// How a tag, expression or comment region ended.
enum RegionEnd {
    Closed,
    /// Another opening delimiter of a different kind showed up first
    Interrupted(Delimiter),
    Eof,
}

/// Tokenizer for template sources.
///
/// Scanning is byte-oriented: every structural character is ASCII, so all
/// token boundaries fall on UTF-8 character boundaries.
pub struct Tokenizer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut pending = None;

        while !self.at_eof() {
            let delimiter = match pending.take() {
                Some(delimiter) => delimiter,
                None => match self.scan_text() {
                    Some(delimiter) => delimiter,
                    None => break,
                },
            };

            let body_start = self.open(delimiter);
            let end = match delimiter {
                Delimiter::Comment => self.scan_comment(),
                Delimiter::Tag | Delimiter::Expression => self.scan_code(delimiter),
            };

            match end {
                RegionEnd::Closed => {
                    if delimiter == Delimiter::Tag {
                        self.skip_verbatim_body(body_start);
                    }
                }
                RegionEnd::Interrupted(next) => pending = Some(next),
                RegionEnd::Eof => break,
            }
        }

        self.tokens
    }

    // === Regions ===

    /// Consume markup up to the next opening delimiter. Returns the delimiter
    /// found there, or `None` at end of input.
    fn scan_text(&mut self) -> Option<Delimiter> {
        let start = self.pos;
        let mut i = start;

        while i + 1 < self.bytes.len() {
            if self.bytes[i] == b'{' {
                if let Some(delimiter) = Delimiter::from_marker(self.bytes[i + 1]) {
                    self.push_raw(start, i);
                    self.pos = i;
                    return Some(delimiter);
                }
            }
            i += 1;
        }

        self.push_raw(start, self.bytes.len());
        self.pos = self.bytes.len();
        None
    }

    /// Emit the opening delimiter at the cursor. Returns the offset where the
    /// region's content begins.
    fn open(&mut self, delimiter: Delimiter) -> usize {
        let start = self.pos;
        self.pos += 2;
        let trim = self.at_trim_marker();
        if trim {
            self.pos += 1;
        }
        self.tokens.push(Token {
            kind: TokenKind::Open(delimiter),
            span: Span::new(start, self.pos),
            trim,
        });
        self.pos
    }

    /// Scan the inside of a tag or expression: quote-aware, and for
    /// expressions brace-aware so `{{ {'a': {'b': 1}} }}` closes at the end.
    fn scan_code(&mut self, delimiter: Delimiter) -> RegionEnd {
        let mut run_start = self.pos;
        let mut depth = 0usize;

        while !self.at_eof() {
            let b = self.bytes[self.pos];

            if b == b'"' || b == b'\'' {
                self.push_raw(run_start, self.pos);
                if !self.scan_string(b) {
                    return RegionEnd::Eof;
                }
                run_start = self.pos;
                continue;
            }

            if depth == 0 && self.at_close(delimiter) {
                self.push_raw(run_start, self.pos);
                self.close(delimiter);
                return RegionEnd::Closed;
            }

            match b {
                b'{' => {
                    if let Some(next) = self.delimiter_at(self.pos) {
                        if next != delimiter {
                            self.push_raw(run_start, self.pos);
                            return RegionEnd::Interrupted(next);
                        }
                    }
                    if delimiter == Delimiter::Expression {
                        depth += 1;
                    }
                }
                b'}' if delimiter == Delimiter::Expression => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.pos += 1;
        }

        self.push_raw(run_start, self.pos);
        RegionEnd::Eof
    }

    /// Comments are opaque: only `#}` (optionally trimmed) ends them.
    fn scan_comment(&mut self) -> RegionEnd {
        let start = self.pos;
        let mut i = start;

        while i + 1 < self.bytes.len() {
            if self.bytes[i] == b'#' && self.bytes[i + 1] == b'}' {
                let close_start = if i > start && is_trim_marker(self.bytes[i - 1]) {
                    i - 1
                } else {
                    i
                };
                self.push_raw(start, close_start);
                self.tokens.push(Token {
                    kind: TokenKind::Close(Delimiter::Comment),
                    span: Span::new(close_start, i + 2),
                    trim: close_start < i,
                });
                self.pos = i + 2;
                return RegionEnd::Closed;
            }
            i += 1;
        }

        self.push_raw(start, self.bytes.len());
        self.pos = self.bytes.len();
        RegionEnd::Eof
    }

    /// Scan a quoted literal starting at the cursor. An unterminated literal
    /// turns the rest of the input into one raw run and returns `false`.
    fn scan_string(&mut self, quote: u8) -> bool {
        let start = self.pos;
        let mut i = start + 1;

        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b if b == quote => {
                    self.tokens.push(Token::new(TokenKind::QuotedString, start, i + 1));
                    self.pos = i + 1;
                    return true;
                }
                _ => i += 1,
            }
        }

        self.push_raw(start, self.bytes.len());
        self.pos = self.bytes.len();
        false
    }

    fn close(&mut self, delimiter: Delimiter) {
        let start = self.pos;
        let trim = self.at_trim_marker();
        self.pos += if trim { 3 } else { 2 };
        self.tokens.push(Token {
            kind: TokenKind::Close(delimiter),
            span: Span::new(start, self.pos),
            trim,
        });
        debug_assert!(self.pos <= self.bytes.len());
    }

    /// After `{% verbatim %}` or `{% raw %}`, everything up to the matching
    /// end tag is markup.
    fn skip_verbatim_body(&mut self, body_start: usize) {
        let close_start = self.tokens.last().map(|t| t.span.start).unwrap_or(self.pos);
        let body = self.source.get(body_start..close_start).unwrap_or("").trim();
        let end_keyword = match body {
            "verbatim" => "endverbatim",
            "raw" => "endraw",
            _ => return,
        };

        let start = self.pos;
        let end = self.find_end_tag(end_keyword).unwrap_or(self.bytes.len());
        self.push_raw(start, end);
        self.pos = end;
    }

    /// Offset of the next `{% <keyword> %}` (whitespace and trim markers allowed).
    fn find_end_tag(&self, keyword: &str) -> Option<usize> {
        let mut i = self.pos;
        while i + 1 < self.bytes.len() {
            if self.bytes[i] == b'{' && self.bytes[i + 1] == b'%' {
                let mut j = i + 2;
                if j < self.bytes.len() && is_trim_marker(self.bytes[j]) {
                    j += 1;
                }
                while j < self.bytes.len() && self.bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if self.bytes[j..].starts_with(keyword.as_bytes()) {
                    let mut k = j + keyword.len();
                    while k < self.bytes.len() && self.bytes[k].is_ascii_whitespace() {
                        k += 1;
                    }
                    if k < self.bytes.len() && is_trim_marker(self.bytes[k]) {
                        k += 1;
                    }
                    if self.bytes[k..].starts_with(b"%}") {
                        return Some(i);
                    }
                }
            }
            i += 1;
        }
        None
    }

    // === Helpers ===

    fn push_raw(&mut self, start: usize, end: usize) {
        if start < end {
            self.tokens.push(Token::new(TokenKind::Raw, start, end));
        }
    }

    fn delimiter_at(&self, offset: usize) -> Option<Delimiter> {
        if self.bytes.get(offset) != Some(&b'{') {
            return None;
        }
        self.bytes.get(offset + 1).and_then(|&b| Delimiter::from_marker(b))
    }

    fn at_close(&self, delimiter: Delimiter) -> bool {
        let close = delimiter.close().as_bytes();
        let rest = &self.bytes[self.pos..];
        rest.starts_with(close) || (!rest.is_empty() && is_trim_marker(rest[0]) && rest[1..].starts_with(close))
    }

    fn at_trim_marker(&self) -> bool {
        self.bytes.get(self.pos).is_some_and(|&b| is_trim_marker(b))
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

fn is_trim_marker(b: u8) -> bool {
    b == b'-' || b == b'~'
}

/// Tokenize a template source. Never fails; every byte of `source` belongs
/// to exactly one token.
pub fn tokenize(source: &str) -> Vec<Token> {
    Tokenizer::new(source).tokenize()
}
