use super::{ApiKey, Config, IndexBackend};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_retrieval();
        self.apply_env_overrides_index();
        self.resolve_secrets();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("ONBOARD_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("ONBOARD_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("ONBOARD_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("ONBOARD_LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse::<u32>() {
                self.llm.max_tokens = n;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_LLM_MAX_TOKENS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_LLM_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.llm.timeout_secs = secs;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_LLM_TIMEOUT_SECS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_LLM_MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                self.llm.max_retries = n;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_LLM_MAX_RETRIES value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_EMBEDDING_DIMENSION") {
            if let Ok(n) = v.parse::<usize>() {
                self.embedding.dimension = n;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_EMBEDDING_DIMENSION value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_EMBEDDING_BATCH_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.embedding.batch_size = n;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_EMBEDDING_BATCH_SIZE value: {v}");
            }
        }
    }

    fn apply_env_overrides_retrieval(&mut self) {
        if let Ok(v) = std::env::var("ONBOARD_RETRIEVAL_TOP_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.retrieval.top_k = k;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_RETRIEVAL_TOP_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_RETRIEVAL_BUDGET_TOKENS") {
            if let Ok(tokens) = v.parse::<usize>() {
                self.retrieval.context_budget_tokens = tokens;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_RETRIEVAL_BUDGET_TOKENS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_RETRIEVAL_SCORE_THRESHOLD") {
            match v.parse::<f32>() {
                Ok(t) if (0.0..=1.0).contains(&t) => self.retrieval.score_threshold = Some(t),
                _ => tracing::warn!("ignoring invalid ONBOARD_RETRIEVAL_SCORE_THRESHOLD value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_QUERY_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.retrieval.query_timeout_secs = secs;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_QUERY_TIMEOUT_SECS value: {v}");
            }
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("ONBOARD_INDEX_BACKEND") {
            if let Ok(backend) = serde_json::from_value::<IndexBackend>(serde_json::Value::String(v.clone())) {
                self.index.backend = backend;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_INDEX_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ONBOARD_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("ONBOARD_INGEST_CONCURRENCY") {
            if let Ok(n) = v.parse::<usize>() {
                self.ingest.concurrency = n;
            } else {
                tracing::warn!("ignoring invalid ONBOARD_INGEST_CONCURRENCY value: {v}");
            }
        }
    }

    fn resolve_secrets(&mut self) {
        self.secrets.api_key = ["ONBOARD_API_KEY", "OPENAI_API_KEY"]
            .into_iter()
            .find_map(|var| {
                std::env::var(var)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| ApiKey::new(k, var))
            })
            .or_else(|| self.secrets.api_key.take());
    }
}
