use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Tokens must be strictly shorter than this (in chars).
/// Longer runs are almost always minified code, hashes or base64 blobs.
pub const MAX_TOKEN_LENGTH: usize = 30;

/// Minimum length of an identifier sub-token (snake_case, camelCase or letter/digit part)
const MIN_PART_LENGTH: usize = 2;

/// Lexical grammar approximating JavaScript-family source: comments, string and
/// template literals, numeric literals, identifiers, and single-char punctuators.
/// Whitespace is never matched.
const LEXER_PATTERN: &str = r##"(?x)
      (?P<comment>//[^\n]*|/\*(?s:.*?)(?:\*/|\z))
    | (?P<string>"(?:[^"\\\n]|\\.)*"?|'(?:[^'\\\n]|\\.)*'?)
    | (?P<template>`(?:[^`\\]|\\(?s:.))*`?)
    | (?P<number>0[xX][0-9a-fA-F_]+n?|0[oO][0-7_]+n?|0[bB][01_]+n?|(?:\d[\d_]*(?:\.[\d_]*)?|\.\d[\d_]*)(?:[eE][+-]?\d+)?n?)
    | (?P<name>[\p{L}\p{Nl}$_][\p{L}\p{Nl}\p{Mn}\p{Mc}\p{Nd}\p{Pc}$]*)
    | (?P<punct>\S)
"##;

static LEXER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LEXER_PATTERN).expect("lexer pattern compiles"));

/// Input accepted by [`Tokenizer::normalize`]
#[derive(Debug, Clone, Copy)]
pub enum TokenInput<'a> {
    /// Nothing to tokenize
    Absent,
    /// Raw text to lex
    Text(&'a str),
    /// Already split tokens; only lower-cased
    Tokens(&'a [String]),
}

impl<'a> From<&'a str> for TokenInput<'a> {
    fn from(text: &'a str) -> Self {
        TokenInput::Text(text)
    }
}

impl<'a> From<Option<&'a str>> for TokenInput<'a> {
    fn from(text: Option<&'a str>) -> Self {
        text.map_or(TokenInput::Absent, TokenInput::Text)
    }
}

impl<'a> From<&'a [String]> for TokenInput<'a> {
    fn from(tokens: &'a [String]) -> Self {
        TokenInput::Tokens(tokens)
    }
}

impl<'a> From<&'a Vec<String>> for TokenInput<'a> {
    fn from(tokens: &'a Vec<String>) -> Self {
        TokenInput::Tokens(tokens.as_slice())
    }
}

/// Whether text is being indexed or used as a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Index,
    /// Identifiers too long to be indexed whole contribute no terms, so a long
    /// run never matches through its parts alone
    Query,
}

/// A named tokenization function.
///
/// The name is persisted in snapshots; a snapshot can only be loaded by a
/// build that registers a tokenizer under the same name.
#[derive(Clone, Copy)]
pub struct Tokenizer {
    name: &'static str,
    split: fn(&str, Mode, &mut Vec<String>),
}

impl Tokenizer {
    /// Source-code aware lexer (the default)
    pub const SOURCE_CODE: Tokenizer = Tokenizer {
        name: "source-code",
        split: split_source,
    };

    /// Plain whitespace splitting, for prose-only trees
    pub const WHITESPACE: Tokenizer = Tokenizer {
        name: "whitespace",
        split: split_whitespace,
    };

    const REGISTERED: [Tokenizer; 2] = [Tokenizer::SOURCE_CODE, Tokenizer::WHITESPACE];

    /// Look up a registered tokenizer by its persisted name
    pub fn by_name(name: &str) -> Option<Tokenizer> {
        Self::REGISTERED.iter().copied().find(|t| t.name == name)
    }

    pub fn registered_names() -> impl Iterator<Item = &'static str> {
        Self::REGISTERED.iter().map(|t| t.name)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Turn input into normalized search tokens.
    ///
    /// Duplicates are kept; callers count them as term frequency.
    pub fn normalize<'a>(&self, input: impl Into<TokenInput<'a>>) -> Vec<String> {
        match input.into() {
            TokenInput::Absent => Vec::new(),
            TokenInput::Tokens(tokens) => tokens.iter().map(|t| t.to_lowercase()).collect(),
            TokenInput::Text(text) => self.split_text(text, Mode::Index),
        }
    }

    /// Tokens to look up for a free-text query.
    ///
    /// Same as [`Tokenizer::normalize`], except that an identifier of
    /// [`MAX_TOKEN_LENGTH`] chars or more yields nothing instead of its parts.
    pub fn query_terms(&self, query: &str) -> Vec<String> {
        self.split_text(query, Mode::Query)
    }

    fn split_text(&self, text: &str, mode: Mode) -> Vec<String> {
        let text = text.trim();
        let mut tokens = Vec::new();
        if !text.is_empty() {
            (self.split)(text, mode, &mut tokens);
        }
        tokens
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::SOURCE_CODE
    }
}

impl PartialEq for Tokenizer {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tokenizer {}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tokenizer").field(&self.name).finish()
    }
}

fn split_whitespace(text: &str, _mode: Mode, out: &mut Vec<String>) {
    for word in text.split_whitespace() {
        push_token(out, word);
    }
}

fn split_source(text: &str, mode: Mode, out: &mut Vec<String>) {
    for caps in LEXER.captures_iter(text) {
        if let Some(m) = caps.name("name") {
            push_identifier(out, m.as_str(), mode);
        } else if let Some(m) = caps.name("number") {
            push_token(out, m.as_str());
        } else if let Some(m) = caps.name("string").or_else(|| caps.name("template")) {
            split_source(literal_body(m.as_str()), mode, out);
        } else if let Some(m) = caps.name("comment") {
            split_source(comment_body(m.as_str()), mode, out);
        }
        // punctuators carry no word characters and trim to nothing
    }
}

/// Strip the opening quote and, if present, the matching closing quote
fn literal_body(literal: &str) -> &str {
    let mut chars = literal.chars();
    let Some(quote) = chars.next() else {
        return literal;
    };
    let inner = chars.as_str();
    inner.strip_suffix(quote).unwrap_or(inner)
}

fn comment_body(comment: &str) -> &str {
    if let Some(line) = comment.strip_prefix("//") {
        line
    } else {
        let block = comment.strip_prefix("/*").unwrap_or(comment);
        block.strip_suffix("*/").unwrap_or(block)
    }
}

/// Push the whole identifier plus its snake_case / camelCase parts
fn push_identifier(out: &mut Vec<String>, ident: &str, mode: Mode) {
    if mode == Mode::Query && ident.chars().count() >= MAX_TOKEN_LENGTH {
        return;
    }
    push_token(out, ident);

    let parts = split_identifier(ident);
    if parts.len() > 1 {
        for part in parts {
            if part.chars().count() >= MIN_PART_LENGTH {
                push_token(out, part);
            }
        }
    }
}

/// Split an identifier at underscores, `$`, lower→upper and letter↔digit
/// transitions
fn split_identifier(ident: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut prev: Option<char> = None;

    for (i, ch) in ident.char_indices() {
        if ch == '_' || ch == '$' {
            if let Some(s) = start.take() {
                parts.push(&ident[s..i]);
            }
            prev = None;
            continue;
        }

        let boundary = prev.is_some_and(|p| {
            (ch.is_uppercase() && (p.is_lowercase() || p.is_numeric()))
                || (ch.is_numeric() != p.is_numeric())
        });

        match start {
            Some(s) if boundary => {
                parts.push(&ident[s..i]);
                start = Some(i);
            }
            None => start = Some(i),
            _ => {}
        }
        prev = Some(ch);
    }

    if let Some(s) = start {
        parts.push(&ident[s..]);
    }

    parts
}

fn push_token(out: &mut Vec<String>, token: &str) {
    let token = token.to_lowercase();
    if !token.is_empty() && token.chars().count() < MAX_TOKEN_LENGTH {
        out.push(token);
    }
}
