//! Query parsing / mode selection (spec §4.I): URL lookup, boolean /
//! field-qualified AST, or plaintext fallback.

use crate::models::Snapshot;
use crate::urlnorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Snippet,
    Url,
    Any,
}

#[derive(Debug, Clone)]
pub enum Ast {
    Term(Field, String),
    Not(Box<Ast>),
    And(Vec<Ast>),
    Or(Vec<Ast>),
}

impl Ast {
    /// Case-insensitive substring evaluation against a candidate's
    /// title/snippet/url fields, per spec §4.I mode 2.
    pub fn matches(&self, candidate: &Snapshot) -> bool {
        match self {
            Ast::Term(field, term) => field_contains(candidate, *field, term),
            Ast::Not(inner) => !inner.matches(candidate),
            Ast::And(parts) => parts.iter().all(|p| p.matches(candidate)),
            Ast::Or(parts) => parts.iter().any(|p| p.matches(candidate)),
        }
    }

    /// Every bare (unqualified/qualified) term string in the AST, used
    /// by the ranking pass for field-weighted scoring and the
    /// phrase-in-title boost.
    pub fn terms(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_terms(self, &mut out);
        out
    }
}

fn collect_terms(ast: &Ast, out: &mut Vec<String>) {
    match ast {
        Ast::Term(_, t) => out.push(t.clone()),
        Ast::Not(inner) => collect_terms(inner, out),
        Ast::And(parts) | Ast::Or(parts) => {
            for p in parts {
                collect_terms(p, out);
            }
        }
    }
}

fn field_contains(candidate: &Snapshot, field: Field, term: &str) -> bool {
    let term = term.to_ascii_lowercase();
    let title = candidate.title.as_deref().unwrap_or("").to_ascii_lowercase();
    let snippet = candidate.snippet.as_deref().unwrap_or("").to_ascii_lowercase();
    let url = candidate.url.to_ascii_lowercase();

    match field {
        Field::Title => title.contains(&term),
        Field::Snippet => snippet.contains(&term),
        Field::Url => url.contains(&term),
        Field::Any => title.contains(&term) || snippet.contains(&term) || url.contains(&term),
    }
}

/// The selected query-mode for one request (spec §4.I "Query parsing").
pub enum QueryMode {
    /// No `q` at all: every candidate matches, ranking falls back to
    /// recency/tie-break ordering only.
    Empty,
    /// Mode 1: a literal URL or `url:`-prefixed value. Carries the set
    /// of `normalized_url_group` variants to try, in order.
    UrlLookup(Vec<String>),
    /// Mode 2: boolean / field-qualified AST.
    Boolean(Ast),
    /// Mode 3: plaintext, evaluated as an OR of its terms (tokenized
    /// substring fallback) with ranking scoring every matched field.
    Plaintext(Ast),
}

const BOOLEAN_MARKERS: &[&str] = &["AND", "OR", "NOT"];

/// Selects a query mode for `q` per spec §4.I's ordered rule list.
pub fn select_mode(q: Option<&str>) -> QueryMode {
    let Some(raw) = q.map(str::trim).filter(|s| !s.is_empty()) else {
        return QueryMode::Empty;
    };

    if let Some(value) = raw.strip_prefix("url:") {
        return QueryMode::UrlLookup(url_variants(value.trim()));
    }
    if looks_like_url(raw) {
        return QueryMode::UrlLookup(url_variants(raw));
    }

    if is_boolean_query(raw) {
        return QueryMode::Boolean(parse_boolean(raw));
    }

    QueryMode::Plaintext(parse_plaintext(raw))
}

fn looks_like_url(raw: &str) -> bool {
    raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("www.")
}

fn is_boolean_query(raw: &str) -> bool {
    raw.contains('(')
        || raw.contains(')')
        || raw.contains('-')
        || raw.contains("title:")
        || raw.contains("snippet:")
        || raw.contains("url:")
        || BOOLEAN_MARKERS.iter().any(|m| raw.split_whitespace().any(|w| w == *m))
}

/// Builds the scheme/`www.` variant set tried for URL lookup (spec
/// §4.I mode 1): the value as given, with `https://`/`http://` added if
/// no scheme is present, and with/without a `www.` host prefix.
fn url_variants(raw: &str) -> Vec<String> {
    let bases: Vec<String> = if raw.starts_with("http://") || raw.starts_with("https://") {
        vec![raw.to_string()]
    } else {
        let stripped = raw.trim_start_matches("www.");
        vec![format!("https://{raw}"), format!("https://www.{stripped}"), format!("http://{raw}")]
    };

    let mut variants = Vec::new();
    for base in bases {
        variants.push(urlnorm::normalize(&base));
        if let Some(without_www) = swap_www(&base) {
            variants.push(urlnorm::normalize(&without_www));
        }
    }
    variants.dedup();
    variants
}

fn swap_www(url: &str) -> Option<String> {
    if let Some(idx) = url.find("://www.") {
        let (scheme, rest) = url.split_at(idx + 3);
        Some(format!("{scheme}{}", &rest[4..]))
    } else if let Some(idx) = url.find("://") {
        let (scheme, rest) = url.split_at(idx + 3);
        Some(format!("{scheme}www.{rest}"))
    } else {
        None
    }
}

/// Tokenizes and parses a boolean/field-qualified query into an AST
/// (spec §4.I mode 2). Grammar (lowest to highest precedence):
/// `Or := And (OR And)*`, `And := Not (AND? Not)*` (implicit AND
/// between adjacent terms), `Not := ("NOT" | "-") Primary | Primary`,
/// `Primary := "(" Or ")" | field:term | term`.
pub fn parse_boolean(raw: &str) -> Ast {
    let tokens = tokenize(raw);
    let mut pos = 0;
    let ast = parse_or(&tokens, &mut pos);
    ast.unwrap_or(Ast::And(vec![]))
}

/// Synthesizes an OR-of-terms AST over whitespace-split words (spec
/// §4.I mode 3's "tokenized substring match" fallback).
pub fn parse_plaintext(raw: &str) -> Ast {
    let terms: Vec<Ast> = raw
        .split_whitespace()
        .map(|w| Ast::Term(Field::Any, w.to_string()))
        .collect();
    if terms.is_empty() {
        Ast::And(vec![])
    } else {
        Ast::Or(terms)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Term(Field, String),
}

fn tokenize(raw: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut current = String::new();

    fn flush(current: &mut String, tokens: &mut Vec<Token>) {
        if current.is_empty() {
            return;
        }
        tokens.extend(word_to_tokens(current));
        current.clear();
    }

    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::RParen);
                chars.next();
            }
            c if c.is_whitespace() => {
                flush(&mut current, &mut tokens);
                chars.next();
            }
            _ => {
                current.push(c);
                chars.next();
            }
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn word_to_tokens(word: &str) -> Vec<Token> {
    match word {
        "AND" => return vec![Token::And],
        "OR" => return vec![Token::Or],
        "NOT" => return vec![Token::Not],
        _ => {}
    }

    if let Some(rest) = word.strip_prefix('-') {
        if !rest.is_empty() {
            return vec![Token::Not, field_term(rest)];
        }
    }

    vec![field_term(word)]
}

fn field_term(word: &str) -> Token {
    for (prefix, field) in [("title:", Field::Title), ("snippet:", Field::Snippet), ("url:", Field::Url)] {
        if let Some(rest) = word.strip_prefix(prefix) {
            if !rest.is_empty() {
                return Token::Term(field, rest.to_string());
            }
        }
    }
    Token::Term(Field::Any, word.to_string())
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Option<Ast> {
    let mut parts = vec![parse_and(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::Or)) {
        *pos += 1;
        parts.push(parse_and(tokens, pos)?);
    }
    Some(if parts.len() == 1 { parts.remove(0) } else { Ast::Or(parts) })
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Option<Ast> {
    let mut parts = vec![parse_not(tokens, pos)?];
    loop {
        if matches!(tokens.get(*pos), Some(Token::And)) {
            *pos += 1;
        }
        match tokens.get(*pos) {
            Some(Token::Or) | Some(Token::RParen) | None => break,
            _ => {}
        }
        match parse_not(tokens, pos) {
            Some(ast) => parts.push(ast),
            None => break,
        }
    }
    Some(if parts.len() == 1 { parts.remove(0) } else { Ast::And(parts) })
}

fn parse_not(tokens: &[Token], pos: &mut usize) -> Option<Ast> {
    if matches!(tokens.get(*pos), Some(Token::Not)) {
        *pos += 1;
        let inner = parse_primary(tokens, pos)?;
        return Some(Ast::Not(Box::new(inner)));
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[Token], pos: &mut usize) -> Option<Ast> {
    match tokens.get(*pos)?.clone() {
        Token::LParen => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            if matches!(tokens.get(*pos), Some(Token::RParen)) {
                *pos += 1;
            }
            Some(inner)
        }
        Token::Term(field, term) => {
            *pos += 1;
            Some(Ast::Term(field, term))
        }
        Token::RParen => None,
        Token::And | Token::Or | Token::Not => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Snapshot {
        let mut s = Snapshot::new(
            "job-1",
            "source-1",
            "https://www.canada.ca/en/health/vaccines.html?ref=home",
            "canada.ca/en/health/vaccines.html",
            Utc::now(),
            "/archive/a.warc.gz",
            "hash",
        );
        s.title = Some("Vaccines and immunization".to_string());
        s.snippet = Some("Information about publicly funded vaccines.".to_string());
        s
    }

    #[test]
    fn url_like_query_selects_url_lookup() {
        assert!(matches!(select_mode(Some("https://canada.ca/en/health.html")), QueryMode::UrlLookup(_)));
        assert!(matches!(select_mode(Some("url:canada.ca/en/health.html")), QueryMode::UrlLookup(_)));
    }

    #[test]
    fn boolean_markers_select_boolean_mode() {
        assert!(matches!(select_mode(Some("vaccines AND measles")), QueryMode::Boolean(_)));
        assert!(matches!(select_mode(Some("title:vaccines")), QueryMode::Boolean(_)));
        assert!(matches!(select_mode(Some("-measles vaccines")), QueryMode::Boolean(_)));
    }

    #[test]
    fn plain_words_select_plaintext_mode() {
        assert!(matches!(select_mode(Some("vaccines immunization")), QueryMode::Plaintext(_)));
    }

    #[test]
    fn empty_query_selects_empty_mode() {
        assert!(matches!(select_mode(None), QueryMode::Empty));
        assert!(matches!(select_mode(Some("   ")), QueryMode::Empty));
    }

    #[test]
    fn and_conjunction_requires_both_terms() {
        let ast = parse_boolean("vaccines AND influenza");
        assert!(!ast.matches(&sample()));
        let ast2 = parse_boolean("vaccines AND immunization");
        assert!(ast2.matches(&sample()));
    }

    #[test]
    fn or_disjunction_matches_either_term() {
        let ast = parse_boolean("influenza OR vaccines");
        assert!(ast.matches(&sample()));
    }

    #[test]
    fn negated_term_excludes_match() {
        let ast = parse_boolean("-influenza vaccines");
        assert!(ast.matches(&sample()));
        let ast2 = parse_boolean("-vaccines immunization");
        assert!(!ast2.matches(&sample()));
    }

    #[test]
    fn field_qualified_term_checks_only_that_field() {
        let ast = parse_boolean("title:vaccines");
        assert!(ast.matches(&sample()));
        let ast2 = parse_boolean("title:influenza");
        assert!(!ast2.matches(&sample()));
    }

    #[test]
    fn parenthesized_grouping_respected() {
        let ast = parse_boolean("(influenza OR vaccines) AND immunization");
        assert!(ast.matches(&sample()));
    }

    #[test]
    fn plaintext_mode_matches_on_any_term() {
        let ast = parse_plaintext("influenza immunization");
        assert!(ast.matches(&sample()));
    }
}
