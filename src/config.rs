//! Pipeline configuration.
//!
//! A [`RagConfig`] is constructed once at process start (explicitly, or from
//! the environment via [`RagConfig::from_env`]) and passed by reference into
//! component constructors. There is no global memoized configuration: tests
//! substitute their own values by building a different `RagConfig`.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::types::RagError;

/// Sliding-window chunking tunables.
///
/// Validated at construction so an invalid pair (which would make the window
/// loop non-terminating) is unrepresentable downstream. No serde derive on
/// purpose: deserialization would bypass the constructor.
#[derive(Clone, Copy, Debug)]
pub struct ChunkingConfig {
    max_chars: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub const DEFAULT_MAX_CHARS: usize = 1200;
    pub const DEFAULT_OVERLAP: usize = 100;

    /// Builds a validated config. Requires `max_chars > 0` and
    /// `overlap < max_chars`.
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, RagError> {
        if max_chars == 0 {
            return Err(RagError::Configuration(
                "chunking max_chars must be positive".to_string(),
            ));
        }
        if overlap >= max_chars {
            return Err(RagError::Configuration(format!(
                "chunking overlap ({overlap}) must be smaller than max_chars ({max_chars})"
            )));
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: Self::DEFAULT_MAX_CHARS,
            overlap: Self::DEFAULT_OVERLAP,
        }
    }
}

/// Retrieval and ranking tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from the vector index per query.
    pub vector_top_k: usize,
    /// Size of the intermediate reranked pool after fusion.
    pub rerank_top_k: usize,
    /// Results actually returned to the caller.
    pub final_top_k: usize,
    /// Hybrid mode: lexical (BM25) rescoring of the candidate pool.
    pub bm25_enable: bool,
    /// Weight applied to the dense (vector-similarity) score.
    pub vector_weight: f32,
    /// Weight applied to the lexical (BM25) score.
    pub lexical_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 12,
            rerank_top_k: 10,
            final_top_k: 6,
            bm25_enable: true,
            vector_weight: 0.6,
            lexical_weight: 0.4,
        }
    }
}

/// Top-level configuration for the ingestion and query pipelines.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    /// Content-addressed embedding cache toggle.
    pub embed_cache_enable: bool,
    /// Upper bound on question length, in characters.
    pub max_question_chars: usize,
    /// Retry/timeout policy for model and store calls.
    pub retry: RetryPolicy,
    /// Attempts a queued ingestion job makes before it is marked failed.
    pub job_retry_limit: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embed_cache_enable: true,
            max_question_chars: 4000,
            retry: RetryPolicy::default(),
            job_retry_limit: 3,
        }
    }
}

impl RagConfig {
    /// Reads overrides from `RAG_*` environment variables (after loading a
    /// `.env` file if present), falling back to defaults for anything unset
    /// or unparsable.
    ///
    /// Recognized variables: `RAG_MAX_CHARS`, `RAG_OVERLAP`, `RAG_BM25`,
    /// `RAG_VECTOR_TOP_K`, `RAG_RERANK_TOP_K`, `RAG_FINAL_TOP_K`,
    /// `RAG_EMBED_CACHE`, `RAG_RETRY_ATTEMPTS`, `RAG_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        config.chunking = ChunkingConfig::new(
            env_parse("RAG_MAX_CHARS", config.chunking.max_chars()),
            env_parse("RAG_OVERLAP", config.chunking.overlap()),
        )?;

        config.retrieval.vector_top_k =
            env_parse("RAG_VECTOR_TOP_K", config.retrieval.vector_top_k);
        config.retrieval.rerank_top_k =
            env_parse("RAG_RERANK_TOP_K", config.retrieval.rerank_top_k);
        config.retrieval.final_top_k = env_parse("RAG_FINAL_TOP_K", config.retrieval.final_top_k);
        config.retrieval.bm25_enable = env_flag("RAG_BM25", config.retrieval.bm25_enable);

        config.retry.max_attempts = env_parse("RAG_RETRY_ATTEMPTS", config.retry.max_attempts);
        config.retry.op_timeout = Duration::from_secs(env_parse(
            "RAG_TIMEOUT_SECS",
            config.retry.op_timeout.as_secs(),
        ));

        config.embed_cache_enable = env_flag("RAG_EMBED_CACHE", config.embed_cache_enable);

        config.validate()?;
        Ok(config)
    }

    /// Checks every tunable the components assume valid.
    ///
    /// `ChunkingConfig` re-validates itself at construction; the remaining
    /// checks live here so a hand-built `RagConfig` fails before the
    /// pipeline runs rather than deep inside a query.
    pub fn validate(&self) -> Result<(), RagError> {
        let r = &self.retrieval;
        if r.vector_top_k == 0 || r.rerank_top_k == 0 || r.final_top_k == 0 {
            return Err(RagError::Configuration(
                "retrieval top-k values must be >= 1".to_string(),
            ));
        }
        if !(r.vector_weight.is_finite() && r.lexical_weight.is_finite())
            || r.vector_weight < 0.0
            || r.lexical_weight < 0.0
        {
            return Err(RagError::Configuration(format!(
                "fusion weights must be finite and non-negative (got {}/{})",
                r.vector_weight, r.lexical_weight
            )));
        }
        if self.max_question_chars == 0 {
            return Err(RagError::Configuration(
                "max_question_chars must be >= 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::Configuration(
                "retry max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => value == "1" || value.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}
