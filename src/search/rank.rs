//! Ranking (spec §4.I): versions v1/v2/v3 over a field-weighted
//! substring match score, with v3 (the default) adding depth/
//! querystring/archived penalties and an authority bonus.

use crate::config::RankingVersion;
use crate::models::Snapshot;

const TITLE_WEIGHT: f64 = 3.0;
const URL_WEIGHT: f64 = 2.0;
const SNIPPET_WEIGHT: f64 = 1.0;
const PHRASE_IN_TITLE_BOOST: f64 = 2.0;
const DEPTH_PENALTY_PER_SEGMENT: f64 = 0.15;
const QUERYSTRING_PENALTY: f64 = 0.5;
const ARCHIVED_PENALTY_KNOWN: f64 = 3.0;
const ARCHIVED_PENALTY_HEURISTIC: f64 = 1.0;
const AUTHORITY_BONUS_CAP: f64 = 2.0;

const ARCHIVED_BANNER_PHRASES: &[&str] = &[
    "this page has been archived",
    "no longer being updated",
    "cette page a ete archivee",
    "n'est plus mise a jour",
];

/// Relevance score for a candidate given the query's term list (spec
/// §4.I ranking). Higher is better; ties are broken by the caller on
/// `capture_timestamp DESC, id DESC`.
pub fn score(candidate: &Snapshot, terms: &[String], version: RankingVersion, inlink_count: i64) -> f64 {
    let match_score = field_weighted_match_score(candidate, terms);

    match version {
        RankingVersion::V1 => match_score,
        RankingVersion::V2 => match_score + phrase_boost(candidate, terms) - depth_penalty(candidate) - querystring_penalty(candidate),
        RankingVersion::V3 => {
            match_score + phrase_boost(candidate, terms) - depth_penalty(candidate) - querystring_penalty(candidate) - archived_penalty(candidate)
                + authority_bonus(inlink_count)
        }
    }
}

fn field_weighted_match_score(candidate: &Snapshot, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let title = candidate.title.as_deref().unwrap_or("").to_ascii_lowercase();
    let url = candidate.url.to_ascii_lowercase();
    let snippet = candidate.snippet.as_deref().unwrap_or("").to_ascii_lowercase();

    terms
        .iter()
        .map(|t| {
            let t = t.to_ascii_lowercase();
            let mut s = 0.0;
            if title.contains(&t) {
                s += TITLE_WEIGHT;
            }
            if url.contains(&t) {
                s += URL_WEIGHT;
            }
            if snippet.contains(&t) {
                s += SNIPPET_WEIGHT;
            }
            s
        })
        .sum()
}

fn phrase_boost(candidate: &Snapshot, terms: &[String]) -> f64 {
    if terms.len() < 2 {
        return 0.0;
    }
    let phrase = terms.join(" ").to_ascii_lowercase();
    let title = candidate.title.as_deref().unwrap_or("").to_ascii_lowercase();
    if title.contains(&phrase) {
        PHRASE_IN_TITLE_BOOST
    } else {
        0.0
    }
}

fn depth_penalty(candidate: &Snapshot) -> f64 {
    let path = url_path(&candidate.url);
    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    segments as f64 * DEPTH_PENALTY_PER_SEGMENT
}

fn querystring_penalty(candidate: &Snapshot) -> f64 {
    if candidate.url.contains('?') {
        QUERYSTRING_PENALTY
    } else {
        0.0
    }
}

fn archived_penalty(candidate: &Snapshot) -> f64 {
    match candidate.is_archived {
        Some(true) => ARCHIVED_PENALTY_KNOWN,
        Some(false) => 0.0,
        None => {
            let title = candidate.title.as_deref().unwrap_or("").to_ascii_lowercase();
            let snippet = candidate.snippet.as_deref().unwrap_or("").to_ascii_lowercase();
            let has_banner = ARCHIVED_BANNER_PHRASES.iter().any(|p| title.contains(p) || snippet.contains(p));
            if has_banner {
                ARCHIVED_PENALTY_HEURISTIC
            } else {
                0.0
            }
        }
    }
}

fn authority_bonus(inlink_count: i64) -> f64 {
    let bonus = ((inlink_count.max(0) as f64) + 1.0).ln();
    bonus.min(AUTHORITY_BONUS_CAP)
}

fn url_path(url: &str) -> String {
    url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.to_string())
}
