//! Search engine with lexical, semantic, and hybrid retrieval modes.
//!
//! Hybrid fusion is an outer join over page identity: a page may carry a
//! lexical score, a semantic score, or both, and the missing side counts as
//! zero. `final = lexical_weight × lexical + semantic_weight × semantic`
//! over each mode's own raw scale; the weights default to 0.5/0.5 and need
//! not sum to 1. Intersecting the two candidate sets instead would silently
//! drop pages that match only conceptually or only by exact phrase.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cases::CaseStore;
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingGenerator;
use crate::error::SearchError;
use crate::models::{CaseMetadata, Document};
use crate::store::{PageCandidate, SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Lexical,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn parse(value: &str) -> Result<SearchMode, SearchError> {
        match value {
            "lexical" | "full-text" | "fulltext" => Ok(SearchMode::Lexical),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(SearchError::UnknownMode(other.to_string())),
        }
    }
}

/// How a returned page matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchType {
    #[serde(rename = "full-text")]
    FullText,
    #[serde(rename = "semantic")]
    Semantic,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::FullText => "full-text",
            MatchType::Semantic => "semantic",
            MatchType::Hybrid => "hybrid",
        }
    }
}

/// Caller-supplied fusion weights. They are trusted to pick a meaningful
/// scale and need not sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct SearchWeights {
    pub lexical: f64,
    pub semantic: f64,
}

/// One page-level hit with its citation and owning-case metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub document_id: String,
    pub case_id: String,
    pub file_name: String,
    pub page_number: i64,
    pub content: String,
    pub score: f64,
    pub match_type: MatchType,
    pub case: Option<CaseMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchMatch>,
    pub total_results: usize,
    pub execution_time_ms: u64,
}

pub struct SearchEngine {
    store: SqliteStore,
    embedder: Arc<EmbeddingGenerator>,
    cases: Arc<dyn CaseStore>,
    retrieval: RetrievalConfig,
}

impl SearchEngine {
    pub fn new(
        store: SqliteStore,
        embedder: Arc<EmbeddingGenerator>,
        cases: Arc<dyn CaseStore>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            cases,
            retrieval,
        }
    }

    pub fn default_weights(&self) -> SearchWeights {
        SearchWeights {
            lexical: self.retrieval.lexical_weight,
            semantic: self.retrieval.semantic_weight,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        weights: Option<SearchWeights>,
    ) -> Result<SearchResponse, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let started = Instant::now();
        let candidate_limit = self.retrieval.candidate_limit;

        let lexical = if matches!(mode, SearchMode::Lexical | SearchMode::Hybrid) {
            self.store
                .lexical_candidates(&fts_match_query(query), candidate_limit)
                .await?
        } else {
            Vec::new()
        };

        let semantic = if matches!(mode, SearchMode::Semantic | SearchMode::Hybrid) {
            // A query that cannot be embedded cannot be ranked semantically;
            // this is fatal to the search call, not best-effort.
            let query_vec = self.embedder.embed(query).await?;
            self.store
                .semantic_candidates(&query_vec, candidate_limit)
                .await?
        } else {
            Vec::new()
        };

        let effective = match mode {
            SearchMode::Lexical => SearchWeights {
                lexical: 1.0,
                semantic: 0.0,
            },
            SearchMode::Semantic => SearchWeights {
                lexical: 0.0,
                semantic: 1.0,
            },
            SearchMode::Hybrid => weights.unwrap_or_else(|| self.default_weights()),
        };

        let match_type = match mode {
            SearchMode::Lexical => MatchType::FullText,
            SearchMode::Semantic => MatchType::Semantic,
            SearchMode::Hybrid => MatchType::Hybrid,
        };

        let mut fused = fuse_candidates(&lexical, &semantic, effective);
        let total_results = fused.len();

        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.page_number.cmp(&b.page_number))
        });
        fused.truncate(limit);

        let mut documents: HashMap<String, (Document, Option<CaseMetadata>)> = HashMap::new();
        let mut results = Vec::with_capacity(fused.len());

        for hit in fused {
            if !documents.contains_key(&hit.document_id) {
                let Some(doc) = self.store.get_document(&hit.document_id).await? else {
                    tracing::warn!(document = %hit.document_id, "candidate references missing document");
                    continue;
                };
                let case = match self.cases.case_metadata(&doc.case_id).await {
                    Ok(case) => case,
                    Err(error) => {
                        tracing::warn!(case = %doc.case_id, error = %error, "case metadata lookup failed");
                        None
                    }
                };
                documents.insert(hit.document_id.clone(), (doc, case));
            }

            let (doc, case) = &documents[&hit.document_id];
            results.push(SearchMatch {
                document_id: hit.document_id,
                case_id: doc.case_id.clone(),
                file_name: doc.file_name.clone(),
                page_number: hit.page_number,
                content: extract_snippet(
                    &hit.text,
                    query,
                    self.retrieval.snippet_max_chars,
                    self.retrieval.snippet_context_chars,
                ),
                score: hit.score,
                match_type,
                case: case.clone(),
            });
        }

        Ok(SearchResponse {
            results,
            total_results,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[derive(Debug, Clone)]
struct FusedCandidate {
    document_id: String,
    page_number: i64,
    text: String,
    score: f64,
}

/// Outer-join lexical and semantic candidates on page identity and compute
/// the weighted sum; a side that did not return the page scores 0.
fn fuse_candidates(
    lexical: &[PageCandidate],
    semantic: &[PageCandidate],
    weights: SearchWeights,
) -> Vec<FusedCandidate> {
    struct Sides {
        text: String,
        lexical: f64,
        semantic: f64,
    }

    let mut joined: HashMap<(String, i64), Sides> = HashMap::new();

    for candidate in lexical {
        let key = (candidate.document_id.clone(), candidate.page_number);
        let entry = joined.entry(key).or_insert_with(|| Sides {
            text: candidate.text.clone(),
            lexical: 0.0,
            semantic: 0.0,
        });
        entry.lexical = candidate.score;
    }

    for candidate in semantic {
        let key = (candidate.document_id.clone(), candidate.page_number);
        let entry = joined.entry(key).or_insert_with(|| Sides {
            text: candidate.text.clone(),
            lexical: 0.0,
            semantic: 0.0,
        });
        entry.semantic = candidate.score;
    }

    joined
        .into_iter()
        .map(|((document_id, page_number), sides)| FusedCandidate {
            document_id,
            page_number,
            text: sides.text,
            score: weights.lexical * sides.lexical + weights.semantic * sides.semantic,
        })
        .collect()
}

/// Build a safe FTS5 match string: terms are stripped to alphanumerics,
/// quoted, and OR-ed so any term can contribute to the ranking.
fn fts_match_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|ch| ch.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Build a snippet window around the earliest query-term occurrence.
///
/// The window starts `context` characters before the first hit (clamped to
/// the text start) and extends at most `max_chars` characters; an ellipsis
/// marks a window that starts after the beginning or ends before the end of
/// the text. When no term occurs, the window falls back to the start of the
/// text, deliberately, so semantic-only hits still get an excerpt.
pub(crate) fn extract_snippet(
    text: &str,
    query: &str,
    max_chars: usize,
    context: usize,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let lower = text.to_lowercase();
    let first_hit = query
        .split_whitespace()
        .map(|term| term.to_lowercase())
        .filter(|term| !term.is_empty())
        .filter_map(|term| lower.find(&term))
        .min();

    let hit_char = first_hit
        .map(|byte| lower[..byte].chars().count())
        .map(|idx| idx.min(chars.len()));

    let start = hit_char.unwrap_or(0).saturating_sub(context);
    let end = (start + max_chars).min(chars.len());

    let mut snippet: String = chars[start..end].iter().collect();
    if start > 0 {
        snippet = format!("...{}", snippet);
    }
    if end < chars.len() {
        snippet.push_str("...");
    }
    snippet
}
