// ABOUTME: Grid layouts and field schema discovery from header elements.
// ABOUTME: Names come from an ordered locator chain; indices are dense over accepted headers.

use std::collections::HashSet;

use scraper::ElementRef;
use tracing::debug;

use crate::engine::infer::infer_type;
use crate::engine::resolver::{resolve_all, resolve_text, select};
use crate::engine::text::{first_line, normalize_whitespace, raw_text, strip_zero_width};
use crate::engine::types::{FieldDescriptor, FieldType};
use crate::page::Snapshot;

/// Static selector tables describing where a grid keeps its parts.
///
/// Every list is an ordered fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    /// Containers that must exist before the grid counts as loaded. Empty means no requirement.
    pub containers: &'static [&'static str],
    pub headers: &'static [&'static str],
    /// Where a header keeps its display name.
    pub header_names: &'static [&'static str],
    pub column_id_attrs: &'static [&'static str],
    pub rows: &'static [&'static str],
    pub row_id_attrs: &'static [&'static str],
    pub cells: &'static [&'static str],
    /// Attribute giving a cell's column position, when the grid renders one.
    pub column_index_attr: Option<&'static str>,
}

impl TableLayout {
    /// A layout for plainly annotated grids: `data-columnid` headers and cells,
    /// `data-rowid` rows.
    pub const GENERIC: TableLayout = TableLayout {
        containers: &[],
        headers: &["[data-columnid][role=\"columnheader\"]", "th[data-columnid]", ".header [data-columnid]"],
        header_names: &[".name", ".label"],
        column_id_attrs: &["data-columnid", "data-column-id"],
        rows: &["[data-rowid]", "[data-row-id]"],
        row_id_attrs: &["data-rowid", "data-row-id"],
        cells: &["[data-columnid]:not([role=\"columnheader\"])", "td", ".cell"],
        column_index_attr: Some("data-columnindex"),
    };

    /// Whether the grid has rendered its headers and at least one row.
    pub fn is_ready(&self, snap: &Snapshot) -> bool {
        let root = snap.root();
        let container_ok = self.containers.is_empty() || !resolve_all(root, self.containers).is_empty();
        container_ok
            && !resolve_all(root, self.headers).is_empty()
            && !resolve_all(root, self.rows).is_empty()
    }

    /// First non-empty value of `attrs` on `el`.
    pub fn attr_of(el: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
        attrs.iter().find_map(|a| {
            el.value()
                .attr(a)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    }
}

/// Sort and caret glyphs grids render next to header labels.
const SORT_GLYPHS: &[char] = &['▼', '▲', '▾', '▴', '⌄', '↑', '↓', '⇅'];

/// Builds an ordered field schema from header elements.
#[derive(Debug, Clone, Copy)]
pub struct FieldSchemaBuilder<'l> {
    layout: &'l TableLayout,
    infer_types: bool,
}

impl<'l> FieldSchemaBuilder<'l> {
    pub fn new(layout: &'l TableLayout, infer_types: bool) -> Self {
        Self {
            layout,
            infer_types,
        }
    }

    /// Finds the header elements in `scope` and builds the schema from them.
    pub fn discover(&self, scope: ElementRef<'_>) -> Vec<FieldDescriptor> {
        let headers = resolve_all(scope, self.layout.headers);
        debug!(count = headers.len(), "header elements found");
        self.build(&headers)
    }

    /// Builds descriptors for `headers` in document order.
    ///
    /// Headers with an empty or glyph-only name are skipped, as are headers
    /// whose native column id was already accepted. `index` counts accepted
    /// headers. Headers without a native id get `field_<index>`, suffixed when
    /// that string is some other header's id.
    pub fn build(&self, headers: &[ElementRef<'_>]) -> Vec<FieldDescriptor> {
        let native_ids: HashSet<String> = headers
            .iter()
            .filter_map(|h| TableLayout::attr_of(*h, self.layout.column_id_attrs))
            .collect();
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        for header in headers {
            let name = header_name(*header, self.layout.header_names);
            if name.is_empty() {
                debug!("skipping header without a name");
                continue;
            }
            let index = fields.len();
            let id = match TableLayout::attr_of(*header, self.layout.column_id_attrs) {
                Some(native) => {
                    if seen_ids.contains(&native) {
                        debug!(id = %native, "skipping repeated header");
                        continue;
                    }
                    native
                }
                None => synthesize_id(index, &native_ids, &seen_ids),
            };
            seen_ids.insert(id.clone());
            let field_type = if self.infer_types {
                infer_type(*header)
            } else {
                FieldType::SingleLineText
            };
            fields.push(FieldDescriptor {
                index,
                name,
                id,
                field_type,
            });
        }
        fields
    }
}

fn synthesize_id(index: usize, native_ids: &HashSet<String>, seen_ids: &HashSet<String>) -> String {
    let base = format!("field_{}", index);
    let taken = |id: &str| native_ids.contains(id) || seen_ids.contains(id);
    let mut id = base.clone();
    let mut n = 0;
    while taken(&id) {
        n += 1;
        id = format!("{}_{}", base, n);
    }
    id
}

/// Display name of a header: the first non-empty name locator, else the
/// first line of its own text. Sort glyphs are dropped.
fn header_name(header: ElementRef<'_>, name_locators: &[&str]) -> String {
    let raw = match resolve_text(header, name_locators) {
        Some(text) => text,
        None => first_line(&strip_zero_width(&raw_text(header))),
    };
    let cleaned: String = raw.chars().filter(|c| !SORT_GLYPHS.contains(c)).collect();
    normalize_whitespace(&cleaned)
}

/// Cells of every element in `rows` that carries `row_id`, in document order.
pub(crate) fn cells_for<'a>(
    layout: &TableLayout,
    rows: &[ElementRef<'a>],
    row_id: &str,
) -> Vec<ElementRef<'a>> {
    let mut cells = Vec::new();
    for row in rows {
        if TableLayout::attr_of(*row, layout.row_id_attrs).as_deref() != Some(row_id) {
            continue;
        }
        for css in layout.cells {
            let found = select(*row, css);
            if !found.is_empty() {
                cells.extend(found);
                break;
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::Html;

    fn build(html: &str, infer: bool) -> Vec<FieldDescriptor> {
        let doc = Html::parse_document(html);
        FieldSchemaBuilder::new(&TableLayout::GENERIC, infer).discover(doc.root_element())
    }

    #[test]
    fn indices_are_dense_over_accepted_headers() {
        let fields = build(
            r#"<table><tr>
                <th data-columnid="c1"><span class="name">Name</span> ▼</th>
                <th data-columnid="cx">▼</th>
                <th data-columnid="c2">Count</th>
                <th data-columnid="c3" data-columntype="checkbox">Done</th>
            </tr></table>"#,
            true,
        );
        let summary: Vec<(usize, &str, &str, FieldType)> = fields
            .iter()
            .map(|f| (f.index, f.name.as_str(), f.id.as_str(), f.field_type))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "Name", "c1", FieldType::SingleLineText),
                (1, "Count", "c2", FieldType::Number),
                (2, "Done", "c3", FieldType::Checkbox),
            ]
        );
    }

    #[test]
    fn synthesizes_ids_and_skips_repeated_headers() {
        let doc = Html::parse_document(
            r#"<div class="h">Alpha</div><div class="h" data-columnid="dup">Beta</div>
               <div class="h" data-columnid="dup">Beta again</div><div class="h">Gamma
               second line</div>"#,
        );
        let headers = select(doc.root_element(), ".h");
        let fields = FieldSchemaBuilder::new(&TableLayout::GENERIC, false).build(&headers);
        let ids: Vec<&str> = fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["field_0", "dup", "field_2"]);
        assert_eq!(fields[2].name, "Gamma");
        assert!(fields.iter().all(|f| f.field_type == FieldType::SingleLineText));
    }

    #[test]
    fn synthesized_ids_never_collide_with_native_ones() {
        let doc = Html::parse_document(
            r#"<div class="h" data-columnid="field_1">Alpha</div><div class="h">Beta</div>
               <div class="h" data-columnid="field_1">Alpha again</div>"#,
        );
        let headers = select(doc.root_element(), ".h");
        let fields = FieldSchemaBuilder::new(&TableLayout::GENERIC, false).build(&headers);
        let summary: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.name.as_str(), f.id.as_str()))
            .collect();
        assert_eq!(summary, vec![("Alpha", "field_1"), ("Beta", "field_1_1")]);
    }

    #[test]
    fn ready_requires_headers_and_rows() {
        let empty = Snapshot::parse("https://x.test", "<table></table>");
        assert!(!TableLayout::GENERIC.is_ready(&empty));
        let ready = Snapshot::parse(
            "https://x.test",
            r#"<table><tr><th data-columnid="c1">A</th></tr><tr data-rowid="r1"><td>1</td></tr></table>"#,
        );
        assert!(TableLayout::GENERIC.is_ready(&ready));
    }
}
