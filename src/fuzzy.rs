//! Near-match search used while curating the mapping table.
//!
//! Candidates go through three filters, cheapest first. The first two are
//! upper bounds on the final score, so anything they reject could never have
//! passed the cutoff.

use std::collections::HashMap;

use strsim::normalized_levenshtein;

pub const DEFAULT_CUTOFF: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a> {
    pub candidate: &'a str,
    /// Position in the candidate list
    pub index: usize,
    pub score: f64,
}

fn ratio(numerator: usize, longest: usize) -> f64 {
    if longest == 0 {
        1.0
    } else {
        numerator as f64 / longest as f64
    }
}

/// Bound from lengths alone: at least `|len(a) - len(b)|` edits are needed.
fn real_quick_ratio(a: &[char], b: &[char]) -> f64 {
    ratio(a.len().min(b.len()), a.len().max(b.len()))
}

/// Bound from character multisets: every character not shared costs an edit.
fn quick_ratio(a: &[char], b: &[char]) -> f64 {
    let mut available: HashMap<char, usize> = HashMap::new();
    for &c in b {
        *available.entry(c).or_insert(0) += 1;
    }
    let mut shared = 0;
    for c in a {
        if let Some(n) = available.get_mut(c)
            && *n > 0
        {
            *n -= 1;
            shared += 1;
        }
    }
    ratio(shared, a.len().max(b.len()))
}

/// Up to `limit` candidates scoring at least `cutoff`, best first. Equal
/// scores keep candidate order. `None` returns every match.
pub fn close_matches<'a>(
    query: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    limit: Option<usize>,
    cutoff: f64,
) -> Vec<Match<'a>> {
    let query_chars: Vec<char> = query.chars().collect();
    let mut matches = Vec::new();

    for (index, candidate) in candidates.into_iter().enumerate() {
        let chars: Vec<char> = candidate.chars().collect();
        if real_quick_ratio(&query_chars, &chars) < cutoff || quick_ratio(&query_chars, &chars) < cutoff {
            continue;
        }
        let score = normalized_levenshtein(query, candidate);
        if score >= cutoff {
            matches.push(Match {
                candidate,
                index,
                score,
            });
        }
    }

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    if let Some(limit) = limit {
        matches.truncate(limit);
    }
    matches
}
