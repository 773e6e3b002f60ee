//! Alias Index
//!
//! Answers "what canonical code, if any, does this raw text correspond to,
//! and how confident should we be?". The index is rebuilt from the
//! persisted alias set on each resolution batch; there is no long-lived
//! mutable index state, so the engine stays stateless between calls.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::types::ItemCodeAlias;

/// Confidence multiplier applied when an alias references a deactivated
/// code. Historical resolutions keep working, but at reduced confidence.
const STALE_CODE_PENALTY: f64 = 0.5;

/// How an alias lookup matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Normalized input found verbatim in the index
    Exact,
    /// Best fuzzy candidate at or above the configured threshold
    Fuzzy,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
        }
    }
}

/// Result of an alias lookup
#[derive(Debug, Clone)]
pub struct AliasMatch {
    pub canonical_code: String,
    pub canonical_code_id: Uuid,
    /// Combined confidence: alias confidence, scaled by similarity for
    /// fuzzy hits and by the stale-code penalty where applicable
    pub confidence: f64,
    pub match_type: MatchType,
    /// Raw string similarity (1.0 for exact hits)
    pub similarity: f64,
    /// True when the target code has been deactivated since the alias was
    /// learned; tolerated and surfaced, not fatal
    pub stale: bool,
}

/// Pluggable string-similarity strategy
///
/// Implementations must be monotonic and return values in [0.0, 1.0].
/// The exact formula is deliberately configuration, not contract.
pub trait SimilarityStrategy: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Default similarity: Jaro-Winkler (favors shared prefixes, which suits
/// financial line-item vocabulary like "Net Construction Costs")
pub struct JaroWinklerSimilarity;

impl SimilarityStrategy for JaroWinklerSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b).clamp(0.0, 1.0)
    }
}

/// Normalize a raw item name for index lookup
///
/// Lowercases, folds common diacritics to ASCII, strips punctuation,
/// collapses whitespace and trims. Total and idempotent:
/// `normalize_name(normalize_name(s)) == normalize_name(s)`.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true; // leading whitespace is dropped

    for ch in raw.chars() {
        for folded in fold_char(ch) {
            // Classify after lowercasing: some uppercase letters lowercase
            // to multi-char sequences containing combining marks, which
            // must become spaces on the first pass, not the second.
            for lowered in folded.to_lowercase() {
                if lowered.is_alphanumeric() {
                    out.push(lowered);
                    last_was_space = false;
                } else if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
            }
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Fold a character to its ASCII base form where a common mapping exists
fn fold_char(ch: char) -> impl Iterator<Item = char> {
    let folded: &'static str = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ç' | 'Ç' => "c",
        'ñ' | 'Ñ' => "n",
        'ß' => "ss",
        'æ' | 'Æ' => "ae",
        'ø' | 'Ø' => "o",
        _ => return FoldIter::Single(Some(ch)),
    };
    FoldIter::Str(folded.chars())
}

enum FoldIter {
    Single(Option<char>),
    Str(std::str::Chars<'static>),
}

impl Iterator for FoldIter {
    type Item = char;
    fn next(&mut self) -> Option<char> {
        match self {
            FoldIter::Single(ch) => ch.take(),
            FoldIter::Str(chars) => chars.next(),
        }
    }
}

/// One winning entry per normalized key
#[derive(Debug, Clone)]
struct IndexEntry {
    canonical_code: String,
    canonical_code_id: Uuid,
    confidence: f64,
    created_at: chrono::DateTime<chrono::Utc>,
    source_priority: u8,
    stale: bool,
}

/// Normalized-string → canonical-code lookup table
///
/// Built fresh from the full alias set per resolution batch; lookup cost
/// is bounded by the alias-table size.
pub struct AliasIndex {
    entries: HashMap<String, IndexEntry>,
    fuzzy_threshold: f64,
    similarity: Box<dyn SimilarityStrategy>,
}

impl AliasIndex {
    /// Build an index from the persisted alias set
    ///
    /// When multiple aliases normalize to the same key, the winner is the
    /// entry with the highest confidence, tie-broken by most recent
    /// creation, then by source priority (user_confirmed > manual >
    /// ai_suggested). Aliases targeting deactivated codes are kept but
    /// flagged stale.
    pub fn build(
        aliases: &[ItemCodeAlias],
        active_code_ids: &HashSet<Uuid>,
        fuzzy_threshold: f64,
        similarity: Box<dyn SimilarityStrategy>,
    ) -> Self {
        let mut entries: HashMap<String, IndexEntry> = HashMap::new();

        for alias in aliases {
            let stale = !active_code_ids.contains(&alias.canonical_code_id);
            if stale {
                tracing::warn!(
                    alias = %alias.alias_raw,
                    code = %alias.canonical_code,
                    "Alias references deactivated code; lookups will carry reduced confidence"
                );
            }
            let candidate = IndexEntry {
                canonical_code: alias.canonical_code.clone(),
                canonical_code_id: alias.canonical_code_id,
                confidence: alias.confidence,
                created_at: alias.created_at,
                source_priority: alias.source.priority(),
                stale,
            };

            match entries.entry(alias.alias_normalized.clone()) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    if candidate_beats(&candidate, slot.get()) {
                        slot.insert(candidate);
                    }
                }
            }
        }

        Self {
            entries,
            fuzzy_threshold,
            similarity,
        }
    }

    /// Number of distinct normalized keys in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a raw item name against the index
    ///
    /// An exact normalized hit always beats any fuzzy candidate. A fuzzy
    /// hit is accepted only when the best similarity reaches the
    /// configured threshold; its confidence is `similarity * alias
    /// confidence`. Returns `None` below threshold.
    pub fn lookup(&self, raw_name: &str) -> Option<AliasMatch> {
        let normalized = normalize_name(raw_name);
        if normalized.is_empty() {
            return None;
        }

        if let Some(entry) = self.entries.get(&normalized) {
            return Some(self.to_match(entry, MatchType::Exact, 1.0, entry.confidence));
        }

        let mut best: Option<(&IndexEntry, f64)> = None;
        for (key, entry) in &self.entries {
            let similarity = self.similarity.similarity(&normalized, key);
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((entry, similarity));
            }
        }

        match best {
            Some((entry, similarity)) if similarity >= self.fuzzy_threshold => {
                let confidence = similarity * entry.confidence;
                Some(self.to_match(entry, MatchType::Fuzzy, similarity, confidence))
            }
            _ => None,
        }
    }

    fn to_match(
        &self,
        entry: &IndexEntry,
        match_type: MatchType,
        similarity: f64,
        confidence: f64,
    ) -> AliasMatch {
        let confidence = if entry.stale {
            confidence * STALE_CODE_PENALTY
        } else {
            confidence
        };
        AliasMatch {
            canonical_code: entry.canonical_code.clone(),
            canonical_code_id: entry.canonical_code_id,
            confidence,
            match_type,
            similarity,
            stale: entry.stale,
        }
    }
}

/// Collision rule: highest confidence, then most recently created, then
/// source priority
fn candidate_beats(candidate: &IndexEntry, incumbent: &IndexEntry) -> bool {
    if candidate.confidence != incumbent.confidence {
        return candidate.confidence > incumbent.confidence;
    }
    if candidate.created_at != incumbent.created_at {
        return candidate.created_at > incumbent.created_at;
    }
    candidate.source_priority > incumbent.source_priority
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AliasSource;

    fn alias(
        raw: &str,
        code: &str,
        code_id: Uuid,
        confidence: f64,
        source: AliasSource,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> ItemCodeAlias {
        ItemCodeAlias {
            id: Uuid::new_v4(),
            alias_raw: raw.to_string(),
            alias_normalized: normalize_name(raw),
            canonical_code: code.to_string(),
            canonical_code_id: code_id,
            confidence,
            source,
            created_at,
        }
    }

    fn index_of(aliases: Vec<ItemCodeAlias>) -> AliasIndex {
        let active: HashSet<Uuid> = aliases.iter().map(|a| a.canonical_code_id).collect();
        AliasIndex::build(&aliases, &active, 0.85, Box::new(JaroWinklerSimilarity))
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Site Acquisition Cost",
            "  Net   Construction—Costs!  ",
            "Coût d'Acquisition (Réel)",
            "",
            "---",
            "ÜBER 100% FEES",
            // Dotted capital I lowercases to "i" plus a combining mark
            "İNCE CAPITAL",
            "ǅeljko Holdings",
        ];
        for s in samples {
            let once = normalize_name(s);
            assert_eq!(normalize_name(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_strips_punctuation_and_diacritics() {
        assert_eq!(
            normalize_name("  Coût d'Acquisition (Réel)  "),
            "cout d acquisition reel"
        );
        assert_eq!(normalize_name("Net   Construction—Costs!"), "net construction costs");
    }

    #[test]
    fn test_exact_lookup_returns_stored_confidence() {
        let code_id = Uuid::new_v4();
        let index = index_of(vec![alias(
            "Site Acquisition Cost",
            "costs.siteAcquisition",
            code_id,
            0.9,
            AliasSource::UserConfirmed,
            chrono::Utc::now(),
        )]);

        let hit = index.lookup("site acquisition cost!").expect("exact hit");
        assert_eq!(hit.match_type, MatchType::Exact);
        assert_eq!(hit.canonical_code, "costs.siteAcquisition");
        assert_eq!(hit.canonical_code_id, code_id);
        assert_eq!(hit.confidence, 0.9);
        assert_eq!(hit.similarity, 1.0);
    }

    #[test]
    fn test_fuzzy_lookup_scales_confidence() {
        let index = index_of(vec![alias(
            "Site Acquisition Cost",
            "costs.siteAcquisition",
            Uuid::new_v4(),
            1.0,
            AliasSource::UserConfirmed,
            chrono::Utc::now(),
        )]);

        let hit = index.lookup("Site Acquisition Costs").expect("fuzzy hit");
        assert_eq!(hit.match_type, MatchType::Fuzzy);
        assert!(hit.similarity >= 0.85 && hit.similarity < 1.0);
        assert!((hit.confidence - hit.similarity).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_beats_any_fuzzy_candidate() {
        let exact_id = Uuid::new_v4();
        let index = index_of(vec![
            alias(
                "Construction Cost",
                "costs.construction",
                exact_id,
                0.6,
                AliasSource::AiSuggested,
                chrono::Utc::now(),
            ),
            // Near-identical key with a much stronger stored confidence
            alias(
                "Construction Costs",
                "costs.constructionTotal",
                Uuid::new_v4(),
                1.0,
                AliasSource::UserConfirmed,
                chrono::Utc::now(),
            ),
        ]);

        let hit = index.lookup("Construction Cost").unwrap();
        assert_eq!(hit.match_type, MatchType::Exact);
        assert_eq!(hit.canonical_code, "costs.construction");
        assert_eq!(hit.canonical_code_id, exact_id);
    }

    #[test]
    fn test_below_threshold_is_no_match() {
        let index = index_of(vec![alias(
            "Site Acquisition Cost",
            "costs.siteAcquisition",
            Uuid::new_v4(),
            1.0,
            AliasSource::UserConfirmed,
            chrono::Utc::now(),
        )]);

        assert!(index.lookup("Annual Debt Service").is_none());
    }

    #[test]
    fn test_collision_higher_confidence_wins() {
        let now = chrono::Utc::now();
        let winner_id = Uuid::new_v4();
        let index = index_of(vec![
            alias(
                "Net Costs",
                "costs.net",
                Uuid::new_v4(),
                0.6,
                AliasSource::UserConfirmed,
                now,
            ),
            alias(
                "net costs",
                "costs.netTotal",
                winner_id,
                0.9,
                AliasSource::AiSuggested,
                now - chrono::Duration::days(1),
            ),
        ]);

        let hit = index.lookup("Net Costs").unwrap();
        assert_eq!(hit.canonical_code, "costs.netTotal");
        assert_eq!(hit.canonical_code_id, winner_id);
    }

    #[test]
    fn test_collision_newest_wins_on_equal_confidence() {
        let now = chrono::Utc::now();
        let index = index_of(vec![
            alias(
                "Net Costs",
                "costs.old",
                Uuid::new_v4(),
                1.0,
                AliasSource::UserConfirmed,
                now - chrono::Duration::hours(1),
            ),
            alias(
                "net costs",
                "costs.new",
                Uuid::new_v4(),
                1.0,
                AliasSource::UserConfirmed,
                now,
            ),
        ]);

        // Last write wins for future lookups
        assert_eq!(index.lookup("Net Costs").unwrap().canonical_code, "costs.new");
    }

    #[test]
    fn test_stale_alias_surfaced_with_reduced_confidence() {
        let code_id = Uuid::new_v4();
        let aliases = vec![alias(
            "Legacy Fee",
            "fees.legacy",
            code_id,
            1.0,
            AliasSource::UserConfirmed,
            chrono::Utc::now(),
        )];
        // Active set does not contain the alias target
        let index = AliasIndex::build(
            &aliases,
            &HashSet::new(),
            0.85,
            Box::new(JaroWinklerSimilarity),
        );

        let hit = index.lookup("Legacy Fee").expect("still resolves");
        assert!(hit.stale);
        assert_eq!(hit.confidence, STALE_CODE_PENALTY);
    }
}
