// ABOUTME: Airtable grid extractor: the grid's selector tables, a metadata hook, and the base/table envelope.
// ABOUTME: Runs the generic table pipeline and reshapes its result for Airtable views.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use url::Url;

use crate::engine::pipeline::{
    Envelope, ExtractionPipeline, ExtractionResult, MetadataHook, TableConfig,
};
use crate::engine::resolver::{resolve_text, select_first};
use crate::engine::schema::TableLayout;
use crate::engine::text::element_text;
use crate::engine::types::{serialize_instant, FieldDescriptor, Record};
use crate::options::Options;
use crate::page::{PageSource, Snapshot};

/// Parameters accepted by the Airtable extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableParams {
    pub max_records: usize,
    pub include_field_types: bool,
    pub include_formatted_values: bool,
    /// Milliseconds.
    pub wait_for_load: u64,
}

impl Default for TableParams {
    fn default() -> Self {
        Self {
            max_records: 100,
            include_field_types: true,
            include_formatted_values: true,
            wait_for_load: 3000,
        }
    }
}

impl TableParams {
    pub fn config(&self) -> TableConfig {
        TableConfig {
            max_records: self.max_records,
            infer_types: self.include_field_types,
            formatted: self.include_formatted_values,
            wait_for_load: Duration::from_millis(self.wait_for_load),
        }
    }
}

/// Where an Airtable grid keeps its parts. Left and right panes render
/// separate row elements that share a row id.
pub const LAYOUT: TableLayout = TableLayout {
    containers: &[".gridView, [class*=\"gridView\"]"],
    headers: &[
        ".headerRow .cell[data-columnid]",
        "[data-testid=\"gridHeaderCell\"]",
        ".cell.header[data-columnid]",
        ".gridHeaderCell[data-columnid]",
        "[class*=\"header\"][data-columnid]",
        "th[data-columnid]",
        ".headerLeftPane .cell[data-columnid]",
        ".headerRightPane .cell[data-columnid]",
    ],
    header_names: &[
        ".nameAndDescription .truncate-pre",
        ".name .truncate-pre",
        ".contentWrapper .truncate-pre",
        ".truncate-pre",
        ".name",
        ".contentWrapper",
        "span:not([class*=\"icon\"])",
        "div:not([class*=\"icon\"])",
    ],
    column_id_attrs: &["data-columnid", "data-column-id"],
    rows: &[
        ".dataRow[data-rowid]:not(.ghost):not(.template)",
        "[data-testid=\"data-row\"]",
        "[data-rowid]:not(.ghost):not(.template)",
    ],
    row_id_attrs: &["data-rowid", "data-row-id"],
    cells: &[".cell[data-columnid], [data-testid*=\"gridCell\"]"],
    column_index_attr: Some("data-columnindex"),
};

const TABLE_NAME: &[&str] = &[
    ".tableTab.activeTab .truncate-pre",
    ".activeTab [class*=\"truncate\"]",
    ".tableTab[class*=\"active\"] span",
    "[data-tutorial-selector-id*=\"tableTab\"] .truncate-pre",
    ".table-name",
    ".tableTabLabel.active",
    ".activeTab span:not(:empty)",
    "[class*=\"active\"] .truncate-pre",
];

const VIEW_TAB: &[&str] = &[
    "[data-testid=\"viewName\"]",
    ".viewTab.active",
    "[aria-selected=\"true\"]",
];

const VIEW_KINDS: &[&str] = &["grid", "form", "calendar", "gallery", "kanban"];

static BASE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(app[a-zA-Z0-9]+)").expect("valid regex"));
static TABLE_ID: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"/tbl([a-zA-Z0-9]+)", r"table[=/]([a-zA-Z0-9]+)"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

/// Name of the active table tab, else the last path segment, else `Unknown Table`.
pub fn table_name(snap: &Snapshot) -> String {
    if let Some(name) = resolve_text(snap.root(), TABLE_NAME) {
        return name;
    }
    Url::parse(snap.url())
        .ok()
        .and_then(|u| {
            u.path()
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown Table".to_string())
}

/// View kind named in the URL, else in the active view tab, else `grid`.
pub fn view_type(snap: &Snapshot) -> &'static str {
    let url = snap.url().to_ascii_lowercase();
    if let Some(kind) = VIEW_KINDS.iter().copied().find(|k| url.contains(k)) {
        return kind;
    }
    for css in VIEW_TAB {
        if let Some(tab) = select_first(snap.root(), css) {
            let text = element_text(tab).to_lowercase();
            if let Some(kind) = VIEW_KINDS.iter().copied().find(|k| text.contains(k)) {
                return kind;
            }
        }
    }
    "grid"
}

/// `app…` identifier of the base, from the page address.
pub fn base_id(url: &str) -> Option<String> {
    BASE_ID.captures(url).map(|c| c[1].to_string())
}

/// `tbl…` identifier of the table, from the page address.
pub fn table_id(url: &str) -> Option<String> {
    TABLE_ID
        .iter()
        .find_map(|re| re.captures(url))
        .map(|c| format!("tbl{}", &c[1]))
}

/// Adds table name, view type and ids; error envelopes key metadata under `base`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AirtableMetadata;

impl MetadataHook for AirtableMetadata {
    fn domain(&self) -> &str {
        "base"
    }

    fn collect(&self, snap: &Snapshot, metadata: &mut Map<String, JsonValue>) {
        metadata.insert("tableName".into(), table_name(snap).into());
        metadata.insert("viewType".into(), view_type(snap).into());
        metadata.insert("baseId".into(), base_id(snap.url()).into());
        metadata.insert("tableId".into(), table_id(snap.url()).into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseInfo {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub total_records: usize,
    pub total_fields: usize,
    pub view_type: String,
    pub base_id: Option<String>,
    pub table_id: Option<String>,
}

/// The Airtable success document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExtraction {
    pub base: BaseInfo,
    pub table: TableInfo,
    pub fields: Vec<FieldDescriptor>,
    pub records: Vec<Record>,
    pub metadata: TableMetadata,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

impl From<ExtractionResult> for TableExtraction {
    fn from(result: ExtractionResult) -> Self {
        let meta = &result.source_metadata;
        let text = |key: &str| meta.get(key).and_then(JsonValue::as_str).map(str::to_string);
        Self {
            base: BaseInfo {
                url: text("url").unwrap_or_default(),
            },
            table: TableInfo {
                name: text("tableName").unwrap_or_else(|| "Unknown Table".to_string()),
            },
            metadata: TableMetadata {
                total_records: result.stats.total_records,
                total_fields: result.stats.total_fields,
                view_type: text("viewType").unwrap_or_else(|| "grid".to_string()),
                base_id: text("baseId"),
                table_id: text("tableId"),
            },
            fields: result.fields,
            records: result.records,
            extracted_at: result.extracted_at,
        }
    }
}

/// Extracts the visible grid of an Airtable view.
pub async fn extract<P>(source: &P, params: &TableParams, opts: &Options) -> Envelope<TableExtraction>
where
    P: PageSource + ?Sized,
{
    ExtractionPipeline::new(opts)
        .run(source, &LAYOUT, &params.config(), &AirtableMetadata)
        .await
        .map(TableExtraction::from)
}
