//! Caller-side policy deciding whether retrieved chunks are trustworthy
//! enough to be injected into the model prompt.

use investiq_core::types::RetrievedChunk;

pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum ContextDecision {
    /// Use the knowledge base. `confidence` is the top similarity as a
    /// percentage rounded to two decimals.
    Trusted { context: String, confidence: f32, sources: Vec<String> },
    /// Discard the retrieval and let the caller fall back to other sources.
    Fallback,
}

impl ContextDecision {
    pub fn is_trusted(&self) -> bool { matches!(self, Self::Trusted { .. }) }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevancePolicy {
    pub threshold: f32,
}

impl Default for RelevancePolicy {
    fn default() -> Self { Self { threshold: DEFAULT_RELEVANCE_THRESHOLD } }
}

impl RelevancePolicy {
    pub fn new(threshold: f32) -> Self { Self { threshold } }

    /// Trusted only when the best similarity is strictly above the threshold.
    pub fn assess(&self, results: &[RetrievedChunk]) -> ContextDecision {
        let best = results.iter().map(|r| r.similarity).fold(f32::NEG_INFINITY, f32::max);
        if results.is_empty() || best <= self.threshold {
            return ContextDecision::Fallback;
        }
        let context = results.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join("\n");
        let mut sources: Vec<String> = Vec::new();
        for r in results {
            if !sources.contains(&r.source_filename) { sources.push(r.source_filename.clone()); }
        }
        let confidence = (best * 100.0 * 100.0).round() / 100.0;
        ContextDecision::Trusted { context, confidence, sources }
    }
}

pub fn build_prompt(query: &str, decision: &ContextDecision) -> String {
    match decision {
        ContextDecision::Trusted { context, .. } => format!("Context:\n{context}\n\nQuestion: {query}"),
        ContextDecision::Fallback => query.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, file: &str, similarity: f32) -> RetrievedChunk {
        RetrievedChunk { text: text.to_string(), source_filename: file.to_string(), similarity }
    }

    #[test]
    fn above_threshold_is_trusted() {
        let results = vec![hit("Apple reported record profits", "a.pdf", 0.8123), hit("Guidance raised", "b.pdf", 0.61)];
        let decision = RelevancePolicy::default().assess(&results);
        match &decision {
            ContextDecision::Trusted { context, confidence, sources } => {
                assert_eq!(context, "Apple reported record profits\nGuidance raised");
                assert!((confidence - 81.23).abs() < 1e-3);
                assert_eq!(sources, &vec!["a.pdf".to_string(), "b.pdf".to_string()]);
            }
            ContextDecision::Fallback => panic!("expected trusted context"),
        }
        assert_eq!(
            build_prompt("Did Apple have good earnings?", &decision),
            "Context:\nApple reported record profits\nGuidance raised\n\nQuestion: Did Apple have good earnings?"
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        let results = vec![hit("The Fed raised interest rates", "a.pdf", 0.5)];
        assert_eq!(RelevancePolicy::default().assess(&results), ContextDecision::Fallback);
    }

    #[test]
    fn empty_results_fall_back_to_bare_query() {
        let decision = RelevancePolicy::new(-1.0).assess(&[]);
        assert!(!decision.is_trusted());
        assert_eq!(build_prompt("What is the S&P 500?", &decision), "What is the S&P 500?");
    }
}
