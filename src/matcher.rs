// 🔍 Matcher - Candidate extraction and the auto-accept rule
//
// Auto-accept needs BOTH a near-exact top score AND a clear gap to the
// runner-up. Everything else goes to the operator.

use crate::model::NormalizedKey;
use crate::registry::{CanonicalId, CanonicalIndex, CanonicalRegistry};
use crate::similarity::{JaroWinkler, ScorerKind, SimilarityScorer, WeightedRatio};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// MATCH POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Top score must be strictly above this (default: 95)
    pub auto_accept_above: u8,

    /// Second-best score must be at most this (default: 90)
    pub runner_up_at_most: u8,

    /// Candidates scoring below this are dropped (default: 75)
    pub score_cutoff: u8,

    /// Maximum candidates shown (default: 20)
    pub limit: usize,

    /// Scoring algorithm (default: weighted_ratio)
    pub scorer: ScorerKind,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy {
            auto_accept_above: 95,
            runner_up_at_most: 90,
            score_cutoff: 75,
            limit: 20,
            scorer: ScorerKind::WeightedRatio,
        }
    }
}

// ============================================================================
// CANDIDATES + EXCLUSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Index key that matched
    pub key: NormalizedKey,
    pub id: CanonicalId,
    pub score: u8,
}

/// Canonical records already consumed during the current source's pass
///
/// Blocks automatic matching only; the operator may still pick a taken
/// record, and each source starts with an empty set.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    taken: HashSet<CanonicalId>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: CanonicalId) -> bool {
        self.taken.insert(id)
    }

    pub fn contains(&self, id: CanonicalId) -> bool {
        self.taken.contains(&id)
    }

    pub fn clear(&mut self) {
        self.taken.clear();
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}

// ============================================================================
// MATCHER
// ============================================================================

pub struct Matcher {
    pub policy: MatchPolicy,
    scorer: Box<dyn SimilarityScorer>,
}

impl Matcher {
    /// Default policy, default scorer
    pub fn new() -> Self {
        Matcher::with_policy(MatchPolicy::default())
    }

    /// Scorer chosen by `policy.scorer`
    pub fn with_policy(policy: MatchPolicy) -> Self {
        match policy.scorer {
            ScorerKind::WeightedRatio => Matcher::with_scorer(policy, WeightedRatio),
            ScorerKind::JaroWinkler => Matcher::with_scorer(policy, JaroWinkler),
        }
    }

    pub fn with_scorer(policy: MatchPolicy, scorer: impl SimilarityScorer + 'static) -> Self {
        Matcher {
            policy,
            scorer: Box::new(scorer),
        }
    }

    /// Scored candidates from one index, best first
    ///
    /// Only scores >= cutoff are kept, at most `limit` of them. Equal
    /// scores are ordered by key.
    pub fn candidates(
        &self,
        key: &NormalizedKey,
        registry: &CanonicalRegistry,
        index: CanonicalIndex,
    ) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = registry
            .entries(index)
            .filter_map(|(canonical_key, id)| {
                let score = self.scorer.score(key.as_str(), canonical_key.as_str());
                (score >= self.policy.score_cutoff).then(|| Candidate {
                    key: canonical_key.clone(),
                    id,
                    score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        candidates.truncate(self.policy.limit);
        candidates
    }

    /// The top candidate if the auto-accept rule holds
    ///
    /// s1 > auto_accept_above AND (single candidate OR s2 <= runner_up_at_most)
    /// AND top not already taken in this pass.
    pub fn auto_accept<'c>(
        &self,
        candidates: &'c [Candidate],
        exclusion: &ExclusionSet,
    ) -> Option<&'c Candidate> {
        let top = candidates.first()?;
        let runner_up = candidates.get(1).map(|c| c.score).unwrap_or(0);

        let accepted = top.score > self.policy.auto_accept_above
            && (candidates.len() == 1 || runner_up <= self.policy.runner_up_at_most)
            && !exclusion.contains(top.id);

        accepted.then_some(top)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalRecord, Record};

    fn registry(names: &[&str]) -> CanonicalRegistry {
        let mut registry = CanonicalRegistry::new();
        for name in names {
            registry.insert(CanonicalRecord::from_target(Record::new(*name)));
        }
        registry
    }

    /// Scores looked up from a fixed table, 0 otherwise
    fn table_scorer(table: &'static [(&'static str, u8)]) -> impl SimilarityScorer {
        move |_: &str, b: &str| {
            table
                .iter()
                .find(|(k, _)| *k == b)
                .map(|(_, s)| *s)
                .unwrap_or(0)
        }
    }

    fn candidate(registry: &CanonicalRegistry, key: &str, score: u8) -> Candidate {
        let key = NormalizedKey::from(key);
        let id = registry.lookup(CanonicalIndex::Name, &key).unwrap();
        Candidate { key, id, score }
    }

    #[test]
    fn test_candidates_sorted_and_cut_off() {
        let registry = registry(&["Alpha", "Beta", "Gamma"]);
        let matcher = Matcher::with_scorer(
            MatchPolicy::default(),
            table_scorer(&[("alpha", 80), ("beta", 97), ("gamma", 74)]),
        );

        let found = matcher.candidates(&NormalizedKey::from("x"), &registry, CanonicalIndex::Name);
        let keys: Vec<&str> = found.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["beta", "alpha"]);
    }

    #[test]
    fn test_candidates_limited() {
        let names: Vec<String> = (0..30).map(|i| format!("Anbieter {i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let registry = registry(&refs);
        let matcher = Matcher::with_scorer(MatchPolicy::default(), |_: &str, _: &str| 80u8);

        let found = matcher.candidates(&NormalizedKey::from("anbieter"), &registry, CanonicalIndex::Name);
        assert_eq!(found.len(), 20);
    }

    #[test]
    fn test_exact_single_candidate_auto_accepted() {
        let registry = registry(&["Stadtwerke Musterstadt GmbH", "Naturstrom AG"]);
        let matcher = Matcher::new();

        let found = matcher.candidates(
            &NormalizedKey::from("stadtwerke musterstadt"),
            &registry,
            CanonicalIndex::Name,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].score, 100);

        let accepted = matcher.auto_accept(&found, &ExclusionSet::new()).unwrap();
        assert_eq!(accepted.key.as_str(), "stadtwerke musterstadt");
    }

    #[test]
    fn test_close_runner_up_blocks_auto_accept() {
        let registry = registry(&["A", "B"]);
        let matcher = Matcher::new();
        let found = vec![candidate(&registry, "a", 96), candidate(&registry, "b", 92)];

        assert!(matcher.auto_accept(&found, &ExclusionSet::new()).is_none());
    }

    #[test]
    fn test_distant_runner_up_allows_auto_accept() {
        let registry = registry(&["A", "B"]);
        let matcher = Matcher::new();
        let found = vec![candidate(&registry, "a", 96), candidate(&registry, "b", 90)];

        assert_eq!(matcher.auto_accept(&found, &ExclusionSet::new()), Some(&found[0]));
    }

    #[test]
    fn test_top_score_must_exceed_threshold() {
        let registry = registry(&["A"]);
        let matcher = Matcher::new();
        let found = vec![candidate(&registry, "a", 95)];

        assert!(matcher.auto_accept(&found, &ExclusionSet::new()).is_none());
    }

    #[test]
    fn test_taken_candidate_not_auto_accepted() {
        let registry = registry(&["A"]);
        let matcher = Matcher::new();
        let found = vec![candidate(&registry, "a", 100)];
        let mut exclusion = ExclusionSet::new();
        exclusion.insert(found[0].id);

        assert!(matcher.auto_accept(&found, &exclusion).is_none());
        exclusion.clear();
        assert!(matcher.auto_accept(&found, &exclusion).is_some());
    }

    #[test]
    fn test_no_candidates_no_accept() {
        let matcher = Matcher::new();
        assert!(matcher.auto_accept(&[], &ExclusionSet::new()).is_none());
    }

    #[test]
    fn test_policy_deserializes_partial() {
        let policy: MatchPolicy = serde_json::from_str(r#"{"score_cutoff": 80}"#).unwrap();
        assert_eq!(policy.score_cutoff, 80);
        assert_eq!(policy.auto_accept_above, 95);
        assert_eq!(policy.limit, 20);
        assert_eq!(policy.scorer, ScorerKind::WeightedRatio);
    }

    #[test]
    fn test_policy_selects_scorer() {
        let registry = registry(&["Naturstrom AG", "Naturstrom Bayern"]);
        let policy: MatchPolicy = serde_json::from_str(r#"{"scorer": "jaro_winkler"}"#).unwrap();
        let key = NormalizedKey::from("naturstrom baye");

        let weighted = Matcher::new().candidates(&key, &registry, CanonicalIndex::Name);
        let jaro = Matcher::with_policy(policy).candidates(&key, &registry, CanonicalIndex::Name);

        let scores = |found: &[Candidate]| -> Vec<(String, u8)> {
            found.iter().map(|c| (c.key.to_string(), c.score)).collect()
        };
        assert_eq!(
            scores(&weighted),
            vec![("naturstrom bayern".to_string(), 94), ("naturstrom".to_string(), 90)]
        );
        // Shared prefix weighs more
        assert_eq!(
            scores(&jaro),
            vec![("naturstrom bayern".to_string(), 98), ("naturstrom".to_string(), 93)]
        );
    }
}
