//! JSX lowering
//!
//! Rewrites JSX elements into pragma calls (`React.createElement` by default).
//! The scanner copies everything else through untouched while tracking
//! strings, template literals and comments so that `<` inside them is never
//! mistaken for an element.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct JsxError {
    pub line: usize,
    pub message: String,
}

/// Keywords after which `<` opens an expression rather than comparing
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "yield", "case", "default", "in", "of", "typeof", "void", "await", "else", "do",
    "delete", "throw",
];

/// Characters after which `<` opens an expression
const EXPRESSION_PUNCTUATION: &str = "([{,;=:?!&|+-*%~^><";

/// Lower every JSX element in `source`
pub fn transform_jsx(source: &str, pragma: &str, pragma_frag: &str) -> Result<String, JsxError> {
    let mut scanner = Scanner {
        chars: source.chars().collect(),
        pos: 0,
        pragma,
        pragma_frag,
    };

    scanner.code(false)
}

enum Attr {
    Named { key: String, value: String },
    Spread(String),
}

struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    pragma: &'a str,
    pragma_frag: &'a str,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> JsxError {
        let line = self.chars[..self.pos.min(self.chars.len())]
            .iter()
            .filter(|&&c| c == '\n')
            .count()
            + 1;

        JsxError {
            line,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), JsxError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Copy JavaScript, lowering JSX along the way.
    ///
    /// With `until_close_brace` the scan stops (without consuming) at the `}`
    /// closing the surrounding expression container.
    fn code(&mut self, until_close_brace: bool) -> Result<String, JsxError> {
        let mut out = String::new();
        let mut depth = 0usize;
        let mut prev: Option<char> = None;
        let mut word = String::new();

        while let Some(c) = self.peek() {
            match c {
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        out.push(c);
                        self.pos += 1;
                    }
                }
                '/' if self.peek_at(1) == Some('*') => out.push_str(&self.block_comment()?),
                // Where an expression is expected `/` opens a regex, elsewhere it divides
                '/' if expression_expected(prev, &word) => {
                    match self.regex_literal() {
                        Some(regex) => {
                            out.push_str(&regex);
                            prev = Some(')');
                        }
                        // `i++ / 2`: no closing slash on this line, so a division
                        None => {
                            out.push(c);
                            self.pos += 1;
                            prev = Some(c);
                        }
                    }
                    word.clear();
                }
                '"' | '\'' => {
                    out.push_str(&self.string_literal(c)?);
                    prev = Some(c);
                    word.clear();
                }
                '`' => {
                    out.push_str(&self.template_literal()?);
                    prev = Some(c);
                    word.clear();
                }
                '{' => {
                    depth += 1;
                    out.push(c);
                    self.pos += 1;
                    prev = Some(c);
                    word.clear();
                }
                '}' => {
                    if depth == 0 && until_close_brace {
                        return Ok(out);
                    }
                    depth = depth.saturating_sub(1);
                    out.push(c);
                    self.pos += 1;
                    prev = Some(c);
                    word.clear();
                }
                '<' if self.jsx_starts_here(prev, &word) => {
                    out.push_str(&self.element()?);
                    prev = Some(')');
                    word.clear();
                }
                c if c.is_whitespace() => {
                    out.push(c);
                    self.pos += 1;
                }
                c => {
                    if is_ident_char(c) {
                        // A word ends at whitespace as well as at punctuation
                        if !out.chars().next_back().is_some_and(is_ident_char) {
                            word.clear();
                        }
                        word.push(c);
                    } else {
                        word.clear();
                    }
                    out.push(c);
                    self.pos += 1;
                    prev = Some(c);
                }
            }
        }

        if until_close_brace {
            return Err(self.error("unterminated expression container"));
        }

        Ok(out)
    }

    fn jsx_starts_here(&self, prev: Option<char>, word: &str) -> bool {
        let opens_tag = self
            .peek_at(1)
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$' || c == '>');

        if !opens_tag {
            return false;
        }

        expression_expected(prev, word)
    }

    /// Copy a regex literal, including its flags
    ///
    /// Leaves the position untouched and returns `None` when the literal does
    /// not close on the same line.
    fn regex_literal(&mut self) -> Option<String> {
        let start = self.pos;
        let mut out = String::from('/');
        self.pos += 1;
        let mut in_class = false;

        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            out.push(c);
            self.pos += 1;

            match c {
                '\\' => {
                    if let Some(escaped) = self.peek().filter(|&e| e != '\n') {
                        out.push(escaped);
                        self.pos += 1;
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    while let Some(flag) = self.peek().filter(|&f| is_ident_char(f)) {
                        out.push(flag);
                        self.pos += 1;
                    }
                    return Some(out);
                }
                _ => {}
            }
        }

        self.pos = start;
        None
    }

    fn block_comment(&mut self) -> Result<String, JsxError> {
        let mut out = String::from("/*");
        self.pos += 2;

        loop {
            match self.peek() {
                Some('*') if self.peek_at(1) == Some('/') => {
                    out.push_str("*/");
                    self.pos += 2;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated comment")),
            }
        }
    }

    fn string_literal(&mut self, quote: char) -> Result<String, JsxError> {
        let mut out = String::from(quote);
        self.pos += 1;

        while let Some(c) = self.peek() {
            out.push(c);
            self.pos += 1;

            if c == '\\' {
                if let Some(escaped) = self.peek() {
                    out.push(escaped);
                    self.pos += 1;
                }
            } else if c == quote {
                return Ok(out);
            } else if c == '\n' {
                break;
            }
        }

        Err(self.error("unterminated string literal"))
    }

    fn template_literal(&mut self) -> Result<String, JsxError> {
        let mut out = String::from('`');
        self.pos += 1;

        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    out.push(c);
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        out.push(escaped);
                        self.pos += 1;
                    }
                }
                '`' => {
                    out.push(c);
                    self.pos += 1;
                    return Ok(out);
                }
                '$' if self.peek_at(1) == Some('{') => {
                    out.push_str("${");
                    self.pos += 2;
                    out.push_str(&self.code(true)?);
                    self.expect('}')?;
                    out.push('}');
                }
                c => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }

        Err(self.error("unterminated template literal"))
    }

    /// Tag or attribute name: identifiers joined by `.`, `-` or `:`
    fn name(&mut self) -> String {
        let mut name = String::new();

        while let Some(c) = self.peek() {
            if is_ident_char(c) || c == '.' || c == '-' || c == ':' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }

        name
    }

    /// `{ ... }` in JSX position; returns the lowered inner expression
    fn expression_container(&mut self) -> Result<String, JsxError> {
        self.expect('{')?;
        let expr = self.code(true)?;
        self.expect('}')?;

        Ok(expr.trim().to_string())
    }

    fn element(&mut self) -> Result<String, JsxError> {
        self.expect('<')?;
        self.skip_whitespace();

        if self.peek() == Some('>') {
            self.pos += 1;
            let children = self.children("")?;
            return Ok(self.create_element(self.pragma_frag, "null", &children));
        }

        let name = self.name();
        if name.is_empty() {
            return Err(self.error("expected element name"));
        }
        let tag = tag_expression(&name);
        let mut attrs = Vec::new();

        loop {
            self.skip_whitespace();

            match self.peek() {
                Some('/') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    self.expect('>')?;
                    return Ok(self.create_element(&tag, &render_props(&attrs), &[]));
                }
                Some('>') => {
                    self.pos += 1;
                    let children = self.children(&name)?;
                    return Ok(self.create_element(&tag, &render_props(&attrs), &children));
                }
                Some('{') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    for _ in 0..3 {
                        self.expect('.')?;
                    }
                    let expr = self.code(true)?;
                    self.expect('}')?;
                    attrs.push(Attr::Spread(expr.trim().to_string()));
                }
                Some(_) => {
                    let key = self.name();
                    if key.is_empty() {
                        return Err(self.error(format!("unexpected character in <{name}>")));
                    }
                    self.skip_whitespace();

                    let value = if self.peek() == Some('=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        self.attribute_value()?
                    } else {
                        "true".to_string()
                    };

                    attrs.push(Attr::Named { key, value });
                }
                None => return Err(self.error(format!("unterminated <{name}>"))),
            }
        }
    }

    fn attribute_value(&mut self) -> Result<String, JsxError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut raw = String::new();
                loop {
                    match self.peek() {
                        Some(c) if c == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            raw.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated attribute string")),
                    }
                }
                Ok(js_string(&decode_entities(&raw)))
            }
            Some('{') => self.expression_container(),
            Some('<') => self.element(),
            _ => Err(self.error("expected attribute value")),
        }
    }

    /// Parse children up to the closing tag `</closing>` (`</>` for fragments)
    fn children(&mut self, closing: &str) -> Result<Vec<String>, JsxError> {
        let mut children = Vec::new();

        loop {
            match self.peek() {
                None => {
                    let tag = if closing.is_empty() { "<>" } else { closing };
                    return Err(self.error(format!("missing closing tag for {tag}")));
                }
                Some('<') if self.peek_at(1) == Some('/') => {
                    self.pos += 2;
                    self.skip_whitespace();
                    let name = self.name();
                    self.skip_whitespace();
                    self.expect('>')?;

                    if name != closing {
                        return Err(self.error(format!(
                            "expected closing tag </{closing}>, found </{name}>"
                        )));
                    }
                    return Ok(children);
                }
                Some('<') => children.push(self.element()?),
                Some('{') => {
                    let expr = self.expression_container()?;
                    if !is_empty_expression(&expr) {
                        children.push(expr);
                    }
                }
                Some(_) => {
                    let mut text = String::new();
                    while let Some(c) = self.peek() {
                        if c == '<' || c == '{' {
                            break;
                        }
                        text.push(c);
                        self.pos += 1;
                    }
                    if let Some(cleaned) = clean_jsx_text(&text) {
                        children.push(js_string(&decode_entities(&cleaned)));
                    }
                }
            }
        }
    }

    fn create_element(&self, tag: &str, props: &str, children: &[String]) -> String {
        let mut call = format!("{}({}, {}", self.pragma, tag, props);
        for child in children {
            call.push_str(", ");
            call.push_str(child);
        }
        call.push(')');
        call
    }
}

/// Whether the previous token leaves the scanner expecting an expression
fn expression_expected(prev: Option<char>, word: &str) -> bool {
    match prev {
        None => true,
        Some(c) if is_ident_char(c) => EXPRESSION_KEYWORDS.contains(&word),
        Some(c) => EXPRESSION_PUNCTUATION.contains(c),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Lowercase and dashed names are intrinsic elements, the rest are references
fn tag_expression(name: &str) -> String {
    let intrinsic = name.starts_with(|c: char| c.is_lowercase()) && !name.contains('.')
        || name.contains('-')
        || name.contains(':');

    if intrinsic {
        js_string(name)
    } else {
        name.to_string()
    }
}

fn render_props(attrs: &[Attr]) -> String {
    if attrs.is_empty() {
        return "null".to_string();
    }

    let has_spread = attrs.iter().any(|a| matches!(a, Attr::Spread(_)));
    let mut groups: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for attr in attrs {
        match attr {
            Attr::Named { key, value } => current.push(format!("{}: {}", prop_key(key), value)),
            Attr::Spread(expr) => {
                if !current.is_empty() {
                    groups.push(format!("{{ {} }}", current.join(", ")));
                    current.clear();
                }
                groups.push(expr.clone());
            }
        }
    }
    if !current.is_empty() {
        groups.push(format!("{{ {} }}", current.join(", ")));
    }

    if has_spread {
        format!("Object.assign({{}}, {})", groups.join(", "))
    } else {
        groups.join(", ")
    }
}

fn prop_key(key: &str) -> String {
    let plain = key.starts_with(|c: char| c.is_alphabetic() || c == '_' || c == '$')
        && key.chars().all(is_ident_char);

    if plain {
        key.to_string()
    } else {
        js_string(key)
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.escape_default()))
}

fn is_empty_expression(expr: &str) -> bool {
    expr.is_empty()
        || (expr.len() >= 4
            && expr.starts_with("/*")
            && expr.ends_with("*/")
            && !expr[2..expr.len() - 2].contains("*/"))
}

/// Collapse JSX text the way JSX compilers do: lines are trimmed at their
/// inner edges, blank lines dropped, and the rest joined by single spaces.
fn clean_jsx_text(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    let last_non_empty = lines.iter().rposition(|l| !l.trim().is_empty())?;
    let mut cleaned = String::new();

    for (i, line) in lines.iter().enumerate() {
        let line = line.replace('\t', " ").replace('\r', "");
        let mut trimmed: &str = &line;
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ');
        }
        if i != last {
            trimmed = trimmed.trim_end_matches(' ');
        }
        if trimmed.is_empty() {
            continue;
        }
        cleaned.push_str(trimmed);
        if i != last_non_empty {
            cleaned.push(' ');
        }
    }

    Some(cleaned)
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    text.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
