//! Extraction (spec §4.F): HTML → title, cleaned content text, short
//! snippet, language, archived-banner flag, content hash.
//!
//! Grounded on `scrapers/configurable.rs`'s `scraper::Html::parse_document`
//! + `Selector::parse` idiom (already the teacher's way of pulling a
//! `<title>` out of fetched HTML) and `utils/html.rs`'s text-cleanup
//! helpers, generalized from "grab one field" to full content-root
//! selection and boilerplate stripping.

use std::collections::HashSet;

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};
use sha2::{Digest, Sha256};

use crate::models::Language;

/// Tags whose entire subtree is dropped before content extraction
/// (spec §4.F).
const BOILERPLATE_TAGS: &[&str] = &["script", "style", "noscript", "nav", "header", "footer", "aside", "form"];
const BOILERPLATE_ROLES: &[&str] = &["navigation", "banner", "contentinfo", "search"];

/// Bilingual phrases that mark a boilerplate lead-in block (skip
/// links, cookie banners, site search/menu widgets) — never chosen as
/// the snippet even if otherwise well-formed (spec §4.F).
const SNIPPET_BOILERPLATE_PREFIXES: &[&str] = &[
    "skip to main content",
    "skip to content",
    "passer au contenu principal",
    "passer au contenu",
    "this website uses cookies",
    "ce site utilise des temoins",
    "ce site utilise des cookies",
    "menu",
    "search",
    "rechercher",
];

/// Bilingual "this page has been archived" banner phrases (spec §4.F
/// `is_archived`). Conservative by design: false positives would wrongly
/// penalize live pages in ranking (spec §4.I archived_penalty).
const ARCHIVED_BANNER_PHRASES: &[&str] = &[
    "this page has been archived",
    "the following information is outside of the scope of",
    "no longer being updated",
    "cette page a ete archivee",
    "l'information suivante est en dehors du champ",
    "n'est plus mise a jour",
];

const CONTENT_TEXT_MAX_CHARS: usize = 4096;
const SNIPPET_MAX_CHARS: usize = 280;
const SNIPPET_MIN_CHARS: usize = 40;

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub content_text: String,
    pub snippet: Option<String>,
    pub language: Language,
    /// Tri-state: `None` = unknown signal, `Some(true/false)` = known.
    pub is_archived: Option<bool>,
    pub content_hash: String,
}

/// Extracts structured content from one captured HTML page. Never
/// panics or returns `Err` — malformed HTML degrades to best-effort
/// empty fields (spec §4.F "Extraction must never raise on malformed
/// HTML").
pub fn extract(html_bytes: &[u8], headers: &[(String, String)]) -> ExtractedContent {
    let html_text = String::from_utf8_lossy(html_bytes);
    let document = Html::parse_document(&html_text);

    let title = extract_title(&document);
    let content_root = select_content_root(&document);

    let content_text = content_root.map(|root| clean_text(root)).unwrap_or_default();
    let content_text_full = collapse_whitespace(&content_text);
    let content_text_truncated = truncate_chars(&content_text_full, CONTENT_TEXT_MAX_CHARS);

    let snippet = content_root.and_then(|root| extract_snippet(root));

    let language = detect_language(headers, &document, title.as_deref(), &content_text_full);
    let is_archived = detect_archived(title.as_deref(), &content_text_full);
    let content_hash = hash_content(&content_text_full);

    ExtractedContent {
        title,
        content_text: content_text_truncated,
        snippet,
        language,
        is_archived,
        content_hash,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_sel = Selector::parse("title").ok()?;
    if let Some(el) = document.select(&title_sel).next() {
        let text = collapse_whitespace(&el.text().collect::<String>());
        if !text.is_empty() {
            return Some(text);
        }
    }
    let h1_sel = Selector::parse("h1").ok()?;
    document.select(&h1_sel).next().map(|el| collapse_whitespace(&el.text().collect::<String>())).filter(|t| !t.is_empty())
}

/// Selects the content root (spec §4.F): `<main>`/`[role=main]`, else
/// `<article>`, else the best-scoring container.
fn select_content_root(document: &Html) -> Option<ElementRef<'_>> {
    for selector_str in ["main", "[role=main]", "article"] {
        if let Ok(sel) = Selector::parse(selector_str) {
            if let Some(el) = document.select(&sel).next() {
                return Some(el);
            }
        }
    }

    let candidate_sel = Selector::parse("div, section").ok()?;
    document
        .select(&candidate_sel)
        .map(|el| (score_container(el), el))
        .filter(|(score, _)| *score > 0.0)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, el)| el)
        .or_else(|| document.select(&Selector::parse("body").ok()?).next())
}

fn score_container(el: ElementRef<'_>) -> f64 {
    let text = clean_text(el);
    let text_len = text.chars().count() as f64;
    if text_len < 1.0 {
        return 0.0;
    }

    let punctuation = text.chars().filter(|c| matches!(c, '.' | '!' | '?' | ',')).count() as f64;
    let punctuation_density = punctuation / text_len;

    let link_sel = Selector::parse("a").unwrap();
    let link_text_len: f64 = el.select(&link_sel).map(|a| a.text().collect::<String>().chars().count() as f64).sum();
    let link_density = link_text_len / text_len;

    let lower = text.to_ascii_lowercase();
    let boilerplate_hits = SNIPPET_BOILERPLATE_PREFIXES.iter().filter(|p| lower.contains(*p)).count() as f64;

    text_len + punctuation_density * 1000.0 - link_density * text_len - boilerplate_hits * 200.0
}

/// Visible text of `root`'s subtree, skipping boilerplate containers
/// and ARIA-role landmarks (spec §4.F).
fn clean_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(*root, &mut out);
    out
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    if let Some(element) = node.value().as_element() {
        if BOILERPLATE_TAGS.contains(&element.name()) {
            return;
        }
        if let Some(role) = element.attr("role") {
            if BOILERPLATE_ROLES.contains(&role) {
                return;
            }
        }
    }

    if let Node::Text(text) = node.value() {
        out.push_str(text);
        out.push(' ');
    }

    for child in node.children() {
        collect_text(child, out);
    }
}

/// First qualifying block of text in `root`'s subtree (spec §4.F):
/// length ≥ threshold, contains sentence punctuation, doesn't start
/// with a known boilerplate phrase.
fn extract_snippet(root: ElementRef<'_>) -> Option<String> {
    let block_sel = Selector::parse("p, li, blockquote").ok()?;
    for el in root.select(&block_sel) {
        let text = collapse_whitespace(&el.text().collect::<String>());
        if text.chars().count() < SNIPPET_MIN_CHARS {
            continue;
        }
        if !text.contains(['.', '!', '?']) {
            continue;
        }
        let lower = text.to_ascii_lowercase();
        if SNIPPET_BOILERPLATE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }
        return Some(truncate_chars(&text, SNIPPET_MAX_CHARS));
    }
    None
}

fn detect_language(headers: &[(String, String)], document: &Html, title: Option<&str>, content: &str) -> Language {
    if let Some(lang) = header_language(headers) {
        return lang;
    }

    if let Ok(html_sel) = Selector::parse("html") {
        if let Some(html_el) = document.select(&html_sel).next() {
            if let Some(lang_attr) = html_el.value().attr("lang") {
                if let Some(lang) = parse_lang_code(lang_attr) {
                    return lang;
                }
            }
        }
    }

    // Lightweight stopword heuristic fallback.
    let sample = format!("{} {}", title.unwrap_or(""), content).to_ascii_lowercase();
    if sample.trim().is_empty() {
        return Language::Unknown;
    }
    let fr_hits = ["vous", "votre", "les", "des", "pour", "sante", "canadien"].iter().filter(|w| sample.contains(*w)).count();
    let en_hits = ["the", "you", "your", "health", "canada", "for"].iter().filter(|w| sample.contains(*w)).count();
    if fr_hits == 0 && en_hits == 0 {
        Language::Unknown
    } else if fr_hits > en_hits {
        Language::Fr
    } else {
        Language::En
    }
}

fn header_language(headers: &[(String, String)]) -> Option<Language> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-language"))
        .and_then(|(_, v)| parse_lang_code(v))
}

fn parse_lang_code(raw: &str) -> Option<Language> {
    let primary = raw.split(|c| c == '-' || c == ',' || c == ';').next()?.trim().to_ascii_lowercase();
    match primary.as_str() {
        "en" => Some(Language::En),
        "fr" => Some(Language::Fr),
        _ => None,
    }
}

/// Tri-state "archived page" banner detection (spec §4.F): `Some(true)`
/// on a confident phrase match, `None` when no signal is present
/// (never `Some(false)` — absence of a banner doesn't prove a page is
/// *not* archived, it just means this extractor found no evidence).
fn detect_archived(title: Option<&str>, content: &str) -> Option<bool> {
    let haystack = format!("{} {}", title.unwrap_or(""), content).to_ascii_lowercase();
    if ARCHIVED_BANNER_PHRASES.iter().any(|p| haystack.contains(p)) {
        Some(true)
    } else {
        None
    }
}

/// Stable content hash (spec §4.F / §3 invariant I5): whitespace
/// collapsed and case-folded before hashing so cosmetic re-renders of
/// identical content produce identical hashes.
fn hash_content(content: &str) -> String {
    let normalized = collapse_whitespace(content).to_ascii_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_html() -> Vec<(String, String)> {
        vec![("Content-Type".to_string(), "text/html; charset=utf-8".to_string())]
    }

    #[test]
    fn extracts_title_from_title_tag() {
        let html = b"<html><head><title>COVID-19 vaccines</title></head><body><main><p>Information about the mRNA vaccine and how it works in the body today.</p></main></body></html>";
        let result = extract(html, &headers_html());
        assert_eq!(result.title.as_deref(), Some("COVID-19 vaccines"));
        assert!(result.content_text.contains("mRNA vaccine"));
    }

    #[test]
    fn falls_back_to_h1_when_no_title() {
        let html = b"<html><body><h1>Vaccine Safety</h1><main><p>Some long enough paragraph of content here, period.</p></main></body></html>";
        let result = extract(html, &headers_html());
        assert_eq!(result.title.as_deref(), Some("Vaccine Safety"));
    }

    #[test]
    fn strips_nav_and_script_content() {
        let html = b"<html><body><nav>Home About Contact</nav><script>var x = 1;</script><main><p>Actual article content that is long enough to qualify, with punctuation.</p></main></body></html>";
        let result = extract(html, &headers_html());
        assert!(!result.content_text.contains("Home About Contact"));
        assert!(!result.content_text.contains("var x"));
        assert!(result.content_text.contains("Actual article content"));
    }

    #[test]
    fn snippet_skips_boilerplate_and_picks_first_real_paragraph() {
        let html = b"<html><body><main><p>Skip to main content</p><p>This is the real lead paragraph about health policy, it is detailed.</p></main></body></html>";
        let result = extract(html, &headers_html());
        let snippet = result.snippet.unwrap();
        assert!(snippet.starts_with("This is the real lead paragraph"));
    }

    #[test]
    fn detects_archived_banner_bilingual() {
        let html = b"<html><head><title>Old guidance</title></head><body><main><p>This page has been archived for reference purposes, it is no longer maintained.</p></main></body></html>";
        let result = extract(html, &headers_html());
        assert_eq!(result.is_archived, Some(true));
    }

    #[test]
    fn unknown_archived_when_no_banner_phrase() {
        let html = b"<html><body><main><p>Regular content with no archival notice present here at all.</p></main></body></html>";
        let result = extract(html, &headers_html());
        assert_eq!(result.is_archived, None);
    }

    #[test]
    fn content_hash_is_stable_across_whitespace_and_case_variance() {
        let html_a = b"<html><body><main><p>Hello   World. This is fine.</p></main></body></html>";
        let html_b = b"<html><body><main><p>hello world. this is fine.</p></main></body></html>";
        let a = extract(html_a, &headers_html());
        let b = extract(html_b, &headers_html());
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn malformed_html_never_panics() {
        let html = b"<html><body><main><p>unterminated tags <div <span>broken";
        let result = extract(html, &headers_html());
        assert!(result.content_hash.len() == 64);
    }

    #[test]
    fn detects_language_from_header() {
        let headers = vec![("Content-Language".to_string(), "fr-CA".to_string())];
        let html = b"<html><body><main><p>Contenu de la page en francais, avec assez de longueur.</p></main></body></html>";
        let result = extract(html, &headers);
        assert_eq!(result.language, Language::Fr);
    }
}
