//! Query refinement, expansion, merged search, and reranking.
//!
//! A raw user query goes through:
//!
//! 1. **Refine** ([`refine_query`]): strip "search my documents for..."
//!    phrasing and stop-words.
//! 2. **Expand** ([`query_variations`]): a handful of rephrasings.
//! 3. **Multi-search** ([`QueryEngine::multi_search`]): embed and search each
//!    variation, merge with slug deduplication (first occurrence wins).
//! 4. **Rerank** ([`rerank`]): nudge distances by keyword overlap and
//!    chat-origin sources, then cap the list.
//! 5. **Truncate** to the caller's limit.
//!
//! [`QueryEngine::synthesize`] additionally formats the results into a
//! context block and a short digest. No generative model is involved.
//!
//! Every call is independent; the engine holds no per-query state.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::QueryError;
use crate::models::SearchResult;
use crate::store::VectorStore;

/// Scale applied to the rerank bonus before subtracting it from a distance.
pub const RERANK_SCALE: f32 = 0.01;
/// Quotes in the synthesized digest are cut to this many characters.
pub const DIGEST_QUOTE_CHARS: usize = 200;

const MIN_REFINED_CHARS: usize = 5;
const SHORT_QUERY_CHARS: usize = 3;
const SUBSTRING_BONUS: f32 = 10.0;
const WORD_OVERLAP_BONUS: f32 = 5.0;
const CHAT_SOURCE_BONUS: f32 = 3.0;
const CHAT_SOURCE_MARKERS: &[&str] = &["chat", "conversation", "history", "transcript"];
const EXPANSION_SUFFIXES: &[&str] = &["explanation", "details", "summary"];
const QUESTION_PREFIX: &str = "what is";

/// Meta phrasing about where to look, stripped before embedding. Generic
/// nouns ("notes", "history", "data") only count after "my"/"our"; "the"
/// only introduces an explicit store ("the vector db", "the knowledge base").
const META_PATTERN_SOURCES: &[&str] = &[
    // "based on my vector db", "according to our notes", "from the knowledge base"
    r"(?i)\b(?:based\s+on|according\s+to|using|from|in|within|across|with)\s+(?:(?:my|our)\s+(?:vector\s*(?:db|database|store)|knowledge\s*base|documents?|docs|files?|notes|data|memory|(?:past|previous|earlier|old)\s+(?:conversations?|chats?)|(?:chat\s+|conversation\s+)?history|conversations?|chats?)|the\s+(?:vector\s*(?:db|database|store)|knowledge\s*base))\b[,:;]?",
    // "search my documents for", "look through our notes about"
    r"(?i)\b(?:search|searching|look|looking|check|checking|find|scan)\s+(?:through\s+|in\s+)?(?:my|our)\s+\w+(?:\s+\w+)?\s+(?:for|about|on)\b",
    // "can you tell me", "could you find"
    r"(?i)\b(?:can|could|would|will)\s+you\s+(?:please\s+)?(?:tell\s+me|find|search|look\s+up|show\s+me|explain)\b",
    r"(?i)\bplease\b",
    // "what did I say about", "what have we discussed about"
    r"(?i)\bwhat\s+(?:did|have)\s+(?:i|we)\s+(?:say|said|discuss|discussed|talk|talked|mention|mentioned|write|written)\s+(?:about|regarding|on)?\b",
];

static META_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    META_PATTERN_SOURCES
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = %p, error = %e, "meta pattern failed to compile");
                None
            }
        })
        .collect()
});

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "if", "of", "at", "by", "for", "with", "about",
        "to", "from", "in", "on", "into", "is", "are", "was", "were", "be", "been", "being",
        "am", "do", "does", "did", "have", "has", "had", "what", "which", "who", "whom",
        "whose", "when", "where", "why", "how", "this", "that", "these", "those", "i", "me",
        "my", "we", "our", "you", "your", "it", "its", "they", "them", "their", "can", "could",
        "would", "should", "will", "shall", "may", "might", "must", "tell", "show", "give",
        "some", "any", "all", "there", "here", "so", "than", "then", "too", "very", "just",
        "also", "as", "not", "no",
    ]
    .into_iter()
    .collect()
});

fn strip_punctuation(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Rewrite a raw query into the words worth embedding.
///
/// Short queries (≤ 3 characters) come back trimmed but otherwise
/// unchanged, as does anything that refines to fewer than 5 characters.
///
/// ```rust
/// use chat_rag::query::refine_query;
///
/// assert_eq!(
///     refine_query("based on my vector db, what is the project architecture"),
///     "project architecture"
/// );
/// ```
pub fn refine_query(raw: &str) -> String {
    let original = raw.trim();
    if original.chars().count() <= SHORT_QUERY_CHARS {
        return original.to_string();
    }

    let mut stripped = original.to_string();
    for pattern in META_PATTERNS.iter() {
        stripped = pattern.replace_all(&stripped, " ").into_owned();
    }

    let kept: Vec<&str> = stripped
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w.to_lowercase().as_str()))
        .collect();
    let refined = kept.join(" ");

    if refined.chars().count() < MIN_REFINED_CHARS {
        original.to_string()
    } else {
        refined
    }
}

/// Rephrasings of `refined` to search with, the query itself first.
/// Duplicates are removed, first occurrence kept.
pub fn query_variations(refined: &str) -> Vec<String> {
    let refined = refined.trim();
    let lower = refined.to_lowercase();
    let words: Vec<&str> = refined.split_whitespace().collect();
    let mut variations = vec![refined.to_string()];

    if words.len() > 1 {
        let without_last = words[..words.len() - 1].join(" ");
        if without_last.chars().count() >= MIN_REFINED_CHARS {
            variations.push(without_last);
        }
        let without_first = words[1..].join(" ");
        if without_first.chars().count() >= MIN_REFINED_CHARS {
            variations.push(without_first);
        }
    }

    for suffix in EXPANSION_SUFFIXES {
        if !lower.contains(suffix) {
            variations.push(format!("{} {}", refined, suffix));
        }
    }

    if !lower.starts_with(QUESTION_PREFIX) {
        variations.push(format!("{} {}", QUESTION_PREFIX, refined));
    }

    let mut seen = HashSet::new();
    variations.retain(|v| !v.is_empty() && seen.insert(v.clone()));
    variations
}

fn is_chat_source(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    CHAT_SOURCE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Heuristic bonus for one result: literal match, word overlap, chat origin.
fn rerank_bonus(query_lower: &str, query_words: &[String], result: &SearchResult) -> f32 {
    let text = result.record.raw_text.to_lowercase();
    let mut bonus = 0.0;

    if !query_lower.is_empty() && text.contains(query_lower) {
        bonus += SUBSTRING_BONUS;
    }
    if !query_words.is_empty() {
        let found = query_words.iter().filter(|w| text.contains(w.as_str())).count();
        bonus += WORD_OVERLAP_BONUS * found as f32 / query_words.len() as f32;
    }
    if is_chat_source(&result.record.source_filename) {
        bonus += CHAT_SOURCE_BONUS;
    }
    bonus
}

/// Adjust distances by the rerank bonus, sort ascending (stable), and keep
/// at most `max_results`.
pub fn rerank(query: &str, mut results: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    let query_lower = query.trim().to_lowercase();
    let query_words: Vec<String> = query_lower
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|w| w.chars().count() > 2)
        .map(String::from)
        .collect();

    for result in &mut results {
        let bonus = rerank_bonus(&query_lower, &query_words, result);
        result.distance -= bonus * RERANK_SCALE;
    }
    results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    results.truncate(max_results);
    results
}

/// Retrieval output formatted for display or for a downstream prompt.
#[derive(Debug, Clone, Serialize)]
pub struct Synthesis {
    pub query: String,
    /// Query plus numbered passages with `[source: file]` attribution.
    pub context: String,
    /// Digest of the top passages: truncated quote and filename each.
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// Build the context block and digest for `results`.
pub fn synthesize_from(query: &str, results: Vec<SearchResult>) -> Synthesis {
    let mut context = format!("Query: {}\n\nRelevant passages:\n", query);
    for (i, r) in results.iter().enumerate() {
        context.push_str(&format!(
            "\n[{}] {}\n[source: {}]\n",
            i + 1,
            r.record.raw_text.trim(),
            r.record.source_filename
        ));
    }

    let answer = if results.is_empty() {
        format!("No relevant passages found for \"{}\".", query)
    } else {
        let mut digest = format!(
            "Found {} relevant passage{}:\n",
            results.len(),
            if results.len() == 1 { "" } else { "s" }
        );
        for r in &results {
            digest.push_str(&format!(
                "- \"{}\" ({})\n",
                truncate_chars(&r.record.raw_text, DIGEST_QUOTE_CHARS),
                r.record.source_filename
            ));
        }
        digest
    };

    Synthesis {
        query: query.to_string(),
        context,
        answer,
        sources: results,
    }
}

/// Runs the refine → expand → search → rerank sequence against one store.
#[derive(Clone)]
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Up to `limit` results for `raw_query`, closest first.
    pub async fn search(&self, raw_query: &str, limit: usize) -> Result<Vec<SearchResult>, QueryError> {
        if raw_query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let refined = refine_query(raw_query);
        let variations = query_variations(&refined);
        tracing::debug!(refined = %refined, variations = variations.len(), "query expanded");

        let merged = self.multi_search(&variations).await?;
        let mut results = rerank(&refined, merged, self.config.max_results);
        results.truncate(limit);
        Ok(results)
    }

    /// Search every variation concurrently and merge by slug, first wins.
    ///
    /// Variations whose embedding or search fails are logged and skipped;
    /// the call fails only when none succeed.
    pub async fn multi_search(&self, variations: &[String]) -> Result<Vec<SearchResult>, QueryError> {
        let k = self.config.per_query_k;
        let outcomes = join_all(variations.iter().map(|variation| async move {
            let vector = self
                .embedder
                .embed(variation)
                .await
                .map_err(|e| e.to_string())?;
            self.store
                .search(&vector, k)
                .await
                .map_err(|e| e.to_string())
        }))
        .await;

        let mut merged = Vec::new();
        let mut seen = HashSet::new();
        let mut succeeded = 0usize;
        let mut last_error = None;

        for (variation, outcome) in variations.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => {
                    succeeded += 1;
                    for hit in hits {
                        if seen.insert(hit.record.slug.clone()) {
                            merged.push(hit);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(variation = %variation, error = %e, "query variation failed");
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            return Err(QueryError::AllVariationsFailed(
                last_error.unwrap_or_else(|| "no variations to search".to_string()),
            ));
        }
        Ok(merged)
    }

    pub async fn synthesize(&self, raw_query: &str, limit: usize) -> Result<Synthesis, QueryError> {
        let results = self.search(raw_query, limit).await?;
        Ok(synthesize_from(raw_query.trim(), results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbedder;
    use crate::error::EmbedError;
    use crate::models::VectorRecord;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;

    const DIMS: usize = 384;
    const VOCAB: &[&str] = &[
        "project", "architecture", "database", "schema", "deploy", "pipeline", "cat", "dog",
        "weather", "rain",
    ];

    /// Embeds text as counts over a tiny vocabulary, padded to 384 dims.
    struct VocabEmbedder {
        fail_prefix: Option<&'static str>,
    }

    #[async_trait]
    impl Embedder for VocabEmbedder {
        fn model_name(&self) -> &str {
            "vocab"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            texts
                .iter()
                .map(|t| {
                    if let Some(prefix) = self.fail_prefix {
                        if t.starts_with(prefix) {
                            return Err(EmbedError::Timeout);
                        }
                    }
                    let lower = t.to_lowercase();
                    let mut v = vec![0.0f32; DIMS];
                    for (i, word) in VOCAB.iter().enumerate() {
                        v[i] = lower.matches(word).count() as f32;
                    }
                    v[DIMS - 1] = 0.1;
                    Ok(v)
                })
                .collect()
        }
    }

    async fn seeded_store(records: &[(&str, &str, &str)]) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = VocabEmbedder { fail_prefix: None };
        for (slug, text, file) in records {
            let v = embedder.embed(text).await.unwrap();
            store.write(&VectorRecord::new(v, *slug, *text, *file)).await.unwrap();
        }
        store
    }

    fn engine(store: Arc<InMemoryVectorStore>, embedder: Arc<dyn Embedder>) -> QueryEngine {
        QueryEngine::new(embedder, store, RetrievalConfig::default())
    }

    #[test]
    fn test_refine_strips_meta_phrase() {
        assert_eq!(
            refine_query("based on my vector db, what is the project architecture"),
            "project architecture"
        );
        assert_eq!(
            refine_query("Search my documents for deployment pipeline notes"),
            "deployment pipeline notes"
        );
        assert_eq!(
            refine_query("what did we discuss about the database schema in our past conversations?"),
            "database schema"
        );
    }

    #[test]
    fn test_meta_patterns_all_compile() {
        assert_eq!(META_PATTERNS.len(), META_PATTERN_SOURCES.len());
    }

    #[test]
    fn test_refine_keeps_content_phrases() {
        assert_eq!(
            refine_query("how are tokens stored in the memory"),
            "tokens stored memory"
        );
        assert_eq!(
            refine_query("conflicts in the history of rome"),
            "conflicts history rome"
        );
        assert_eq!(
            refine_query("memory leaks in the data layer"),
            "memory leaks data layer"
        );
        assert_eq!(
            refine_query("errors with the files upload"),
            "errors files upload"
        );
        assert_eq!(
            refine_query("search the archive for tax forms"),
            "search archive tax forms"
        );
    }

    #[test]
    fn test_refine_strips_explicit_store_references() {
        assert_eq!(
            refine_query("deploy steps from the vector db"),
            "deploy steps"
        );
        assert_eq!(
            refine_query("release checklist in our notes"),
            "release checklist"
        );
        assert_eq!(
            refine_query("what did I say about caching in my chat history"),
            "caching"
        );
    }

    #[test]
    fn test_refine_short_and_degenerate() {
        assert_eq!(refine_query("  ab "), "ab");
        assert_eq!(refine_query("what is it"), "what is it");
        assert_eq!(refine_query("   "), "");
    }

    #[test]
    fn test_variations() {
        let v = query_variations("project architecture");
        assert_eq!(
            v,
            vec![
                "project architecture",
                "project",
                "architecture",
                "project architecture explanation",
                "project architecture details",
                "project architecture summary",
                "what is project architecture",
            ]
        );
    }

    #[test]
    fn test_variations_skip_short_and_present() {
        let v = query_variations("what is rust summary");
        assert!(!v.iter().any(|s| s.ends_with("summary summary")));
        assert!(!v.iter().any(|s| s.starts_with("what is what is")));
        assert!(v.contains(&"what is rust summary explanation".to_string()));

        let v = query_variations("big cat");
        assert!(!v.contains(&"big".to_string()));
        assert!(!v.contains(&"cat".to_string()));
    }

    #[test]
    fn test_variations_deduplicated() {
        let v = query_variations("details");
        let unique: HashSet<_> = v.iter().collect();
        assert_eq!(unique.len(), v.len());
    }

    fn result(slug: &str, text: &str, file: &str, distance: f32) -> SearchResult {
        SearchResult {
            record: VectorRecord::new(vec![], slug, text, file),
            distance,
        }
    }

    #[test]
    fn test_rerank_literal_match_wins_close_call() {
        let results = vec![
            result("a", "nothing relevant here", "a.txt", 0.30),
            result("b", "the project architecture is layered", "b.txt", 0.35),
        ];
        let ranked = rerank("project architecture", results, 10);
        assert_eq!(ranked[0].record.slug, "b");
        // 10 (literal) + 5 (both words) = 15 → 0.15 off
        assert!((ranked[0].distance - 0.20).abs() < 1e-5);
        assert!((ranked[1].distance - 0.30).abs() < 1e-5);
    }

    #[test]
    fn test_rerank_chat_source_bonus() {
        let results = vec![
            result("a", "xyz", "notes.txt", 0.50),
            result("b", "xyz", "Chat-2024-01.md", 0.52),
        ];
        let ranked = rerank("unrelated words", results, 10);
        assert_eq!(ranked[0].record.slug, "b");
        assert!((ranked[0].distance - 0.49).abs() < 1e-5);
    }

    #[test]
    fn test_rerank_caps_and_is_stable() {
        let results: Vec<_> = (0..15)
            .map(|i| result(&format!("s{}", i), "same", "f.txt", 0.5))
            .collect();
        let ranked = rerank("zzz", results, 10);
        assert_eq!(ranked.len(), 10);
        let slugs: Vec<_> = ranked.iter().map(|r| r.record.slug.as_str()).collect();
        assert_eq!(slugs[..3], ["s0", "s1", "s2"]);
    }

    #[tokio::test]
    async fn test_duplicate_slugs_merged() {
        let store = seeded_store(&[
            ("arch_0_0", "project architecture overview", "design.md"),
            ("db_0_0", "database schema", "db.md"),
            ("pets_0_0", "cat and dog", "pets.txt"),
        ])
        .await;
        let engine = engine(store, Arc::new(VocabEmbedder { fail_prefix: None }));

        let results = engine.search("project architecture", 10).await.unwrap();
        let slugs: Vec<_> = results.iter().map(|r| r.record.slug.as_str()).collect();
        let unique: HashSet<_> = slugs.iter().collect();
        assert_eq!(unique.len(), slugs.len());
        assert_eq!(slugs[0], "arch_0_0");
        // every variation returns all three records; merged, each appears once
        assert_eq!(slugs.len(), 3);
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let store = seeded_store(&[
            ("a", "project", "a.md"),
            ("b", "architecture", "b.md"),
            ("c", "deploy pipeline", "c.md"),
        ])
        .await;
        let engine = engine(store, Arc::new(VocabEmbedder { fail_prefix: None }));
        assert_eq!(engine.search("project architecture", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_variations_skipped() {
        let store = seeded_store(&[("a", "project architecture", "a.md")]).await;
        let engine = engine(
            store,
            Arc::new(VocabEmbedder {
                fail_prefix: Some("what is"),
            }),
        );
        let results = engine.search("project architecture", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_all_variations_failed() {
        let store = seeded_store(&[("a", "project architecture", "a.md")]).await;
        let engine = engine(store, Arc::new(DisabledEmbedder));
        let err = engine.search("project architecture", 5).await.unwrap_err();
        assert!(matches!(err, QueryError::AllVariationsFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_query() {
        let engine = engine(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(VocabEmbedder { fail_prefix: None }),
        );
        assert!(matches!(
            engine.search("  ", 5).await.unwrap_err(),
            QueryError::EmptyQuery
        ));
    }

    #[test]
    fn test_synthesis_digest() {
        let long = "word ".repeat(100);
        let synthesis = synthesize_from(
            "project architecture",
            vec![
                result("a", "The project architecture is layered.", "design.md", 0.1),
                result("b", &long, "chat_log.txt", 0.2),
            ],
        );
        assert!(synthesis.context.starts_with("Query: project architecture"));
        assert!(synthesis.context.contains("[1] The project architecture is layered."));
        assert!(synthesis.context.contains("[source: chat_log.txt]"));
        assert!(synthesis.answer.starts_with("Found 2 relevant passages"));
        assert!(synthesis.answer.contains("(design.md)"));

        let quote_line = synthesis.answer.lines().nth(2).unwrap();
        assert!(quote_line.contains("...\""));
        assert!(quote_line.len() < 230);
    }

    #[test]
    fn test_synthesis_empty() {
        let synthesis = synthesize_from("anything", vec![]);
        assert!(synthesis.answer.contains("No relevant passages"));
        assert!(synthesis.sources.is_empty());
    }
}
