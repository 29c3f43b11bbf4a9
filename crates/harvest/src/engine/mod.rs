// ABOUTME: The resilient structured extraction engine shared by every site extractor.
// ABOUTME: Resolution, inference, coercion, readiness, schema, records, and the error boundary.

//! Extraction engine.
//!
//! Data flows one way: the poller gates everything, the schema builder's
//! output is read-only input to the record extractor, and the pipeline
//! combines both into an [`Envelope`]. Nothing here holds state across runs.
//!
//! Submodules:
//! - `compiled`: selector cache
//! - `resolver`: ordered-fallback selector resolution
//! - `text`: text normalization helpers
//! - `poller`: readiness polling and pacing
//! - `types`: field types, values, records
//! - `infer`: field-type inference from header markup
//! - `coerce`: typed value coercion
//! - `schema`: grid layouts and field schema discovery
//! - `records`: row extraction and deduplication
//! - `pipeline`: orchestration and the error boundary

pub mod coerce;
pub mod compiled;
pub mod infer;
pub mod pipeline;
pub mod poller;
pub mod records;
pub mod resolver;
pub mod schema;
pub mod text;
pub mod types;

pub use crate::engine::coerce::{coerce, CoerceContext};
pub use crate::engine::infer::infer_type;
pub use crate::engine::pipeline::{
    catch_faults, timestamp, Envelope, ErrorBoundary, ExtractionError, ExtractionPipeline,
    ExtractionResult, MetadataHook, NoMetadata, Stats, TableConfig,
};
pub use crate::engine::poller::{Pacing, Readiness, ReadinessPoller};
pub use crate::engine::records::{RecordBatch, RecordExtractor};
pub use crate::engine::resolver::{resolve, resolve_all, resolve_text, resolve_value, Locator, Presence};
pub use crate::engine::schema::{FieldSchemaBuilder, TableLayout};
pub use crate::engine::types::{
    Attachment, AttachmentKind, FieldDescriptor, FieldType, Fields, Link, Record, Value,
};
