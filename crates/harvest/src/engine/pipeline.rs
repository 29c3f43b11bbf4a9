// ABOUTME: The extraction pipeline and the error boundary that always yields an envelope.
// ABOUTME: Poll, build schema, pace, re-snapshot, extract records, assemble stats and metadata.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::engine::coerce::CoerceContext;
use crate::engine::poller::{Pacing, Readiness, ReadinessPoller};
use crate::engine::records::RecordExtractor;
use crate::engine::resolver::resolve_all;
use crate::engine::schema::{FieldSchemaBuilder, TableLayout};
use crate::engine::types::{serialize_instant, FieldDescriptor, Record};
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};

/// Per-run knobs for a table extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    pub max_records: usize,
    pub infer_types: bool,
    pub formatted: bool,
    pub wait_for_load: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_records: 100,
            infer_types: true,
            formatted: true,
            wait_for_load: Duration::from_millis(3000),
        }
    }
}

/// Counts describing a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_records: usize,
    pub total_fields: usize,
    pub rows_scanned: usize,
    pub duplicate_rows: usize,
    pub timed_out: bool,
}

/// A successful table extraction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub source_metadata: Map<String, JsonValue>,
    pub fields: Vec<FieldDescriptor>,
    pub records: Vec<Record>,
    pub stats: Stats,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// A failed extraction, carrying whatever metadata was captured before the fault.
///
/// Serializes as `{"error": ..., "<domain>": {...}, "extractedAt": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionError {
    pub error: String,
    pub domain: String,
    pub source_metadata: Map<String, JsonValue>,
    pub extracted_at: DateTime<Utc>,
}

impl Serialize for ExtractionError {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(3))?;
        map.serialize_entry("error", &self.error)?;
        map.serialize_entry(&self.domain, &self.source_metadata)?;
        map.serialize_entry("extractedAt", &timestamp(&self.extracted_at))?;
        map.end()
    }
}

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Either outcome of an extraction. Serializes as the inner document.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Success(T),
    Failure(ExtractionError),
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Envelope::Success(v) => Some(v),
            Envelope::Failure(_) => None,
        }
    }

    pub fn failure(self) -> Option<ExtractionError> {
        match self {
            Envelope::Success(_) => None,
            Envelope::Failure(e) => Some(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        match self {
            Envelope::Success(v) => Envelope::Success(f(v)),
            Envelope::Failure(e) => Envelope::Failure(e),
        }
    }
}

/// The single place failures are converted into error envelopes.
///
/// The page address is captured when the boundary opens, before any step that
/// can fail, so an error envelope can always say where it came from.
#[derive(Debug, Clone)]
pub struct ErrorBoundary {
    domain: String,
    url: String,
    metadata: Map<String, JsonValue>,
}

impl ErrorBoundary {
    pub fn open(domain: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut metadata = Map::new();
        metadata.insert("url".to_string(), JsonValue::String(url.clone()));
        Self {
            domain: domain.into(),
            url,
            metadata,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Records partial metadata that an error envelope should still carry.
    pub fn note(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }

    /// Runs `stage`, converting both its error and any panic inside it into a
    /// failure envelope.
    pub async fn guard<T, F>(self, stage: &str, fut: F) -> Envelope<T>
    where
        F: Future<Output = Result<T, ExtractError>>,
    {
        let outcome = catch_faults(&self.url, stage, fut).await;
        self.close(outcome)
    }

    pub fn close<T>(self, outcome: Result<T, ExtractError>) -> Envelope<T> {
        match outcome {
            Ok(value) => Envelope::Success(value),
            Err(err) => {
                warn!(url = %self.url, error = %err, "extraction failed");
                Envelope::Failure(ExtractionError {
                    error: err.message(),
                    domain: self.domain,
                    source_metadata: self.metadata,
                    extracted_at: Utc::now(),
                })
            }
        }
    }
}

/// Awaits `fut`, turning a panic inside it into a structural error.
pub async fn catch_faults<T, F>(url: &str, stage: &str, fut: F) -> Result<T, ExtractError>
where
    F: Future<Output = Result<T, ExtractError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(ExtractError::structure(
            url,
            stage,
            Some(anyhow::anyhow!("{}", panic_message(payload.as_ref()))),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected fault during extraction".to_string()
    }
}

/// Contributes site metadata to a run and names the error-envelope key.
pub trait MetadataHook {
    /// Key under which an error envelope carries the captured metadata.
    fn domain(&self) -> &str {
        "sourceMetadata"
    }

    /// Adds entries derived from the final snapshot.
    fn collect(&self, _snapshot: &Snapshot, _metadata: &mut Map<String, JsonValue>) {}
}

/// A hook that adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataHook for NoMetadata {}

/// Orchestrates one table extraction against a page.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionPipeline {
    poll_interval: Duration,
    stabilization: Duration,
    pacing: Pacing,
}

impl ExtractionPipeline {
    pub fn new(opts: &Options) -> Self {
        Self {
            poll_interval: opts.poll_interval,
            stabilization: opts.stabilization,
            pacing: opts.pacing,
        }
    }

    /// Runs the pipeline. Never fails: every fault becomes an error envelope.
    pub async fn run<P>(
        &self,
        source: &P,
        layout: &TableLayout,
        config: &TableConfig,
        hook: &dyn MetadataHook,
    ) -> Envelope<ExtractionResult>
    where
        P: PageSource + ?Sized,
    {
        let url = source.url();
        let span = info_span!("extract", domain = hook.domain(), url = %url);
        let boundary = ErrorBoundary::open(hook.domain(), url);
        let metadata = boundary.metadata().clone();
        boundary
            .guard("Extract", self.stages(source, layout, config, hook, metadata))
            .instrument(span)
            .await
    }

    async fn stages<P>(
        &self,
        source: &P,
        layout: &TableLayout,
        config: &TableConfig,
        hook: &dyn MetadataHook,
        mut metadata: Map<String, JsonValue>,
    ) -> Result<ExtractionResult, ExtractError>
    where
        P: PageSource + ?Sized,
    {
        let poller = ReadinessPoller::new(config.wait_for_load, self.poll_interval, self.stabilization);
        let readiness = poller.wait(source, |snap| layout.is_ready(snap)).await;

        let fields = {
            let snap = source.snapshot().await?;
            FieldSchemaBuilder::new(layout, config.infer_types).discover(snap.root())
        };
        info!(fields = fields.len(), "schema built");

        self.pacing.pause().await;

        let snap = source.snapshot().await?;
        let ctx = CoerceContext::new(config.formatted, snap.base_url());
        let rows = resolve_all(snap.root(), layout.rows);
        debug!(rows = rows.len(), "row elements found");
        let batch = RecordExtractor::new(layout).extract(&rows, &fields, config.max_records, &ctx);
        info!(records = batch.records.len(), "records extracted");

        let stats = Stats {
            total_records: batch.records.len(),
            total_fields: fields.len(),
            rows_scanned: batch.rows_scanned,
            duplicate_rows: batch.duplicate_rows,
            timed_out: readiness == Readiness::TimedOut,
        };
        hook.collect(&snap, &mut metadata);

        Ok(ExtractionResult {
            source_metadata: metadata,
            fields,
            records: batch.records,
            stats,
            extracted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Frame, ScriptedPage, StaticPage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn opts() -> Options {
        Options {
            poll_interval: Duration::from_millis(10),
            stabilization: Duration::ZERO,
            ..Options::default()
        }
    }

    const GRID: &str = r#"<table>
        <tr><th data-columnid="c1">Name</th><th data-columnid="c2">Count</th></tr>
        <tr data-rowid="r1"><td data-columnid="c1">Ada</td><td data-columnid="c2">3</td></tr>
    </table>"#;

    #[tokio::test(start_paused = true)]
    async fn successful_run_assembles_result() {
        let page = StaticPage::new("https://grid.test/t", GRID);
        let env = ExtractionPipeline::new(&opts())
            .run(&page, &TableLayout::GENERIC, &TableConfig::default(), &NoMetadata)
            .await;
        let result = env.success().expect("success envelope");
        assert_eq!(result.stats.total_records, 1);
        assert_eq!(result.stats.total_fields, 2);
        assert!(!result.stats.timed_out);
        assert_eq!(result.source_metadata.get("url"), Some(&json!("https://grid.test/t")));
        let doc = serde_json::to_value(&result.records).unwrap();
        assert_eq!(doc, json!([{"id": "r1", "fields": {"Name": "Ada", "Count": 3}}]));
    }

    #[tokio::test(start_paused = true)]
    async fn fault_during_records_becomes_error_envelope() {
        let page = ScriptedPage::new(
            "https://grid.test/t",
            vec![
                Frame::Html(GRID.to_string()),
                Frame::Html(GRID.to_string()),
                Frame::Fault("target closed".to_string()),
            ],
        );
        let env = ExtractionPipeline::new(&opts())
            .run(&page, &TableLayout::GENERIC, &TableConfig::default(), &NoMetadata)
            .await;
        let failure = env.failure().expect("failure envelope");
        assert!(failure.error.contains("target closed"));
        let doc = serde_json::to_value(&failure).unwrap();
        assert_eq!(doc["sourceMetadata"], json!({"url": "https://grid.test/t"}));
        let stamp = doc["extractedAt"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_still_produces_a_result() {
        let page = StaticPage::new("https://grid.test/empty", "<p>loading</p>");
        let config = TableConfig {
            wait_for_load: Duration::from_millis(50),
            ..TableConfig::default()
        };
        let result = ExtractionPipeline::new(&opts())
            .run(&page, &TableLayout::GENERIC, &config, &NoMetadata)
            .await
            .success()
            .unwrap();
        assert!(result.stats.timed_out);
        assert!(result.records.is_empty());
    }

    #[tokio::test]
    async fn guard_converts_panics() {
        let boundary = ErrorBoundary::open("repository", "https://github.com/a/b");
        let env: Envelope<()> = boundary
            .guard("Stats", async {
                let v: Vec<u8> = Vec::new();
                if v.is_empty() {
                    panic!("index out of range");
                }
                Ok(())
            })
            .await;
        let failure = env.failure().unwrap();
        assert_eq!(failure.error, "Stats: index out of range");
        let doc = serde_json::to_value(&failure).unwrap();
        assert_eq!(doc["repository"]["url"], json!("https://github.com/a/b"));
    }

    #[test]
    fn noted_metadata_survives_failure() {
        let mut boundary = ErrorBoundary::open("base", "https://airtable.com/appX");
        boundary.note("tableName", "Tasks");
        let env: Envelope<()> = boundary.close(Err(ExtractError::page("u", "Snapshot", None)));
        let doc = serde_json::to_value(env).unwrap();
        assert_eq!(doc["base"], json!({"url": "https://airtable.com/appX", "tableName": "Tasks"}));
        assert_eq!(doc["error"], json!("Snapshot: page unavailable"));
    }
}
