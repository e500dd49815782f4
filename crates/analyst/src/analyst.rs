//! The analyst orchestrator.
//!
//! Owns the prepared dataset and the chat gateway, and turns a question
//! plus conversation history into a grounded answer:
//!
//! 1. **Prepare**: load, parse, and enrich the master table, memoized
//!    on the source file's content digest
//! 2. **Partition**: pack the table slice the question should see
//! 3. **Assemble**: instruction + payload + history window + question
//! 4. **Complete**: send through the gateway, return the trimmed answer
//!
//! The memo revalidates on every question, so edits to the source file
//! are picked up without restarting the process.

use crate::context::{BuiltContext, ContextBuilder, ContextStats};
use lotline_config::{AppConfig, ContextConfig, PayloadModeConfig};
use lotline_core::error::Result;
use lotline_core::gateway::{ChatGateway, ChatRequest, TokenUsage};
use lotline_core::message::History;
use lotline_core::record::EnrichedRecord;
use lotline_dataset::{
    enrich, fingerprint, load, load_instruction, partition, summarize, DatasetSummary, LoadReport,
    PartitionMode, SourceDigest,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The loaded, enriched, and memoized dataset state.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    /// Digest of the source bytes this state was built from.
    pub digest: SourceDigest,
    /// Enriched rows in stable chronological order.
    pub records: Vec<EnrichedRecord>,
    /// The analyst instruction text.
    pub instruction: String,
    /// How the load went.
    pub report: LoadReport,
}

/// Per-question overrides for how much of the table the prompt sees.
///
/// An empty scope means "use the configured defaults". `head_rows` wins
/// over `years` when both are set.
#[derive(Debug, Clone, Default)]
pub struct AskScope {
    /// Restrict the by-year payload to these years.
    pub years: Option<Vec<i32>>,
    /// Switch to a head payload with this row cap.
    pub head_rows: Option<usize>,
}

/// A completed answer with its provenance.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The answer text, trimmed.
    pub text: String,
    /// Which model produced it.
    pub model: String,
    /// Token usage, when the backend reported it.
    pub usage: Option<TokenUsage>,
    /// What the prompt was built from.
    pub stats: ContextStats,
}

/// The production analyst: prepared data on one side, a chat gateway on
/// the other.
pub struct Analyst {
    config: AppConfig,
    gateway: Arc<dyn ChatGateway>,
    builder: ContextBuilder,
    /// Memo of the prepared dataset, keyed by source digest.
    /// Concurrent misses may load twice; the slot keeps whichever
    /// finishes last.
    prepared: RwLock<Option<Arc<PreparedDataset>>>,
}

impl Analyst {
    pub fn new(config: AppConfig, gateway: Arc<dyn ChatGateway>) -> Self {
        let builder = ContextBuilder::new(config.context.history_limit);
        Self {
            config,
            gateway,
            builder,
            prepared: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Name of the backend answers come from.
    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Load and enrich the dataset, reusing the memo while the source
    /// file is unchanged.
    pub async fn prepare(&self) -> Result<Arc<PreparedDataset>> {
        let digest = fingerprint(&self.config.dataset.path)?;

        if let Some(prepared) = self.prepared.read().await.as_ref() {
            if prepared.digest == digest {
                return Ok(Arc::clone(prepared));
            }
        }

        let table = load(&self.config.dataset)?;
        let instruction = load_instruction(&self.config.dataset.instruction_path)?;
        let records = enrich(table.records);
        info!(
            rows = records.len(),
            digest = %table.report.digest,
            from_cache = table.report.from_cache,
            "Dataset prepared"
        );

        let prepared = Arc::new(PreparedDataset {
            digest: table.report.digest.clone(),
            records,
            instruction,
            report: table.report,
        });
        *self.prepared.write().await = Some(Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Condensed view of the prepared table for status displays.
    pub async fn summary(&self) -> Result<DatasetSummary> {
        let prepared = self.prepare().await?;
        Ok(summarize(&prepared.records))
    }

    /// Answer a question with the configured payload defaults.
    pub async fn ask(&self, question: &str, history: &History) -> Result<Answer> {
        self.ask_scoped(question, history, &AskScope::default()).await
    }

    /// Answer a question, with per-question payload overrides.
    pub async fn ask_scoped(
        &self,
        question: &str,
        history: &History,
        scope: &AskScope,
    ) -> Result<Answer> {
        let prepared = self.prepare().await?;
        let mode = resolve_mode(&self.config.context, scope);
        let payload = partition(&prepared.records, &mode)?;

        let BuiltContext { messages, stats } =
            self.builder
                .build(&prepared.instruction, &payload, history, question)?;
        debug!(
            history_kept = stats.history_kept,
            payload_rows = stats.payload_rows,
            estimated_tokens = stats.estimated_tokens,
            "Context assembled"
        );

        let mut request = ChatRequest::new(self.config.gateway.model.clone(), messages);
        request.temperature = self.config.gateway.temperature;
        request.max_tokens = Some(self.config.gateway.max_tokens);

        let response = self.gateway.complete(request).await?;
        info!(
            gateway = %self.gateway.name(),
            model = %response.model,
            "Answer received"
        );

        Ok(Answer {
            text: response.content,
            model: response.model,
            usage: response.usage,
            stats,
        })
    }
}

/// Pick the partition mode for one question. Per-question scope wins
/// over the configured defaults.
fn resolve_mode(context: &ContextConfig, scope: &AskScope) -> PartitionMode {
    if let Some(cap) = scope.head_rows {
        return PartitionMode::Head { cap };
    }
    if let Some(years) = &scope.years {
        return PartitionMode::ByYear {
            years: Some(years.iter().copied().collect()),
        };
    }
    match context.payload_mode {
        PayloadModeConfig::Head => PartitionMode::Head {
            cap: context.head_rows,
        },
        PayloadModeConfig::ByYear => PartitionMode::ByYear {
            years: context.years.as_ref().map(|v| v.iter().copied().collect()),
        },
    }
}
