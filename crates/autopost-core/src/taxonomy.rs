//! Mapping free-text category guesses onto the operator taxonomy, plus
//! hashtag normalization for stored articles.

use strsim::jaro_winkler;

/// Minimum similarity for a fuzzy category match.
const FUZZY_CUTOFF: f64 = 0.5;

/// Map a predicted category onto the fixed taxonomy.
///
/// Exact case-insensitive match wins, otherwise the closest name by
/// Jaro-Winkler similarity above the cutoff, otherwise the first
/// taxonomy entry. Only an empty taxonomy yields `None`.
pub fn choose_category(predicted: Option<&str>, names: &[String]) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    if let Some(predicted) = predicted.map(str::trim).filter(|p| !p.is_empty()) {
        let lower = predicted.to_lowercase();
        for name in names {
            if name.to_lowercase() == lower {
                return Some(name.clone());
            }
        }
        let best = names
            .iter()
            .map(|name| (name, jaro_winkler(&lower, &name.to_lowercase())))
            .filter(|(_, score)| *score >= FUZZY_CUTOFF)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((name, _)) = best {
            return Some(name.clone());
        }
    }
    names.first().cloned()
}

/// Normalize a raw hashtag string: split on commas/semicolons/space,
/// strip leading `#`, lowercase, de-duplicate preserving order, cap at
/// 7 entries, join with ", ". Returns `None` when nothing survives.
pub fn normalize_hashtags(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let splitter = regex::Regex::new(r"[;,\s]+").unwrap();
    let mut seen = std::collections::HashSet::new();
    let mut uniq = Vec::new();
    for part in splitter.split(raw) {
        let tag = part.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && seen.insert(tag.clone()) {
            uniq.push(tag);
        }
    }
    if uniq.is_empty() {
        return None;
    }
    uniq.truncate(7);
    Some(uniq.join(", "))
}
