// ABOUTME: Row enumeration with identity-based deduplication and cell-to-field mapping.
// ABOUTME: Cells match fields by native column id first, then by position.

use std::collections::HashSet;

use scraper::ElementRef;
use tracing::debug;

use crate::engine::coerce::{coerce, CoerceContext};
use crate::engine::schema::{cells_for, TableLayout};
use crate::engine::types::{FieldDescriptor, Fields, Record};

/// Records from one pass plus the bookkeeping behind them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    /// Row elements examined, duplicates included.
    pub rows_scanned: usize,
    /// Rows skipped because their id was already taken.
    pub duplicate_rows: usize,
}

/// Turns row elements into records.
#[derive(Debug, Clone, Copy)]
pub struct RecordExtractor<'l> {
    layout: &'l TableLayout,
}

impl<'l> RecordExtractor<'l> {
    pub fn new(layout: &'l TableLayout) -> Self {
        Self { layout }
    }

    /// Extracts records from `rows` in document order.
    ///
    /// At most `max_records` row elements are examined; a row whose id was
    /// already seen is skipped but still counts toward the limit. A row's cells
    /// are gathered from every row element sharing its id, so grids split across
    /// panes come back whole. Rows that yield no values are dropped.
    pub fn extract(
        &self,
        rows: &[ElementRef<'_>],
        fields: &[FieldDescriptor],
        max_records: usize,
        ctx: &CoerceContext,
    ) -> RecordBatch {
        let limit = max_records.min(rows.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut batch = RecordBatch::default();

        for (position, row) in rows.iter().take(limit).enumerate() {
            batch.rows_scanned += 1;
            let native = TableLayout::attr_of(*row, self.layout.row_id_attrs);
            let id = native
                .clone()
                .unwrap_or_else(|| format!("record_{}", position));
            if !seen.insert(id.clone()) {
                debug!(id = %id, "skipping duplicate row");
                batch.duplicate_rows += 1;
                continue;
            }

            let cells = match native {
                Some(ref rid) => cells_for(self.layout, rows, rid),
                None => cells_for_single(self.layout, *row),
            };
            let values = self.map_cells(&cells, fields, ctx);
            if values.is_empty() {
                debug!(id = %id, "dropping row without values");
                continue;
            }
            batch.records.push(Record { id, fields: values });
        }
        debug!(
            records = batch.records.len(),
            scanned = batch.rows_scanned,
            duplicates = batch.duplicate_rows,
            "rows extracted"
        );
        batch
    }

    fn map_cells(
        &self,
        cells: &[ElementRef<'_>],
        fields: &[FieldDescriptor],
        ctx: &CoerceContext,
    ) -> Fields {
        let cell_ids: Vec<Option<String>> = cells
            .iter()
            .map(|c| TableLayout::attr_of(*c, self.layout.column_id_attrs))
            .collect();
        let field_ids: HashSet<&str> = fields.iter().map(|f| f.id.as_str()).collect();

        let mut out = Fields::new();
        for field in fields {
            let by_id = cell_ids
                .iter()
                .position(|cid| cid.as_deref() == Some(field.id.as_str()));
            let slot = by_id.or_else(|| self.positional(cells, &cell_ids, &field_ids, field));
            let cell = match slot {
                Some(i) => cells[i],
                None => continue,
            };
            if let Some(value) = coerce(cell, field.field_type, ctx) {
                out.insert(field.name.clone(), value);
            }
        }
        out
    }

    /// Positional fallback: a cell declaring this field's column index, else the
    /// cell at the field's index. Cells owned by another field's id are never taken.
    fn positional(
        &self,
        cells: &[ElementRef<'_>],
        cell_ids: &[Option<String>],
        field_ids: &HashSet<&str>,
        field: &FieldDescriptor,
    ) -> Option<usize> {
        let free = |i: usize| match cell_ids[i].as_deref() {
            Some(cid) => !field_ids.contains(cid),
            None => true,
        };
        if let Some(attr) = self.layout.column_index_attr {
            let declared = cells.iter().enumerate().position(|(i, c)| {
                free(i)
                    && c.value()
                        .attr(attr)
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        == Some(field.index)
            });
            if declared.is_some() {
                return declared;
            }
        }
        if field.index < cells.len() && free(field.index) {
            Some(field.index)
        } else {
            None
        }
    }
}

fn cells_for_single<'a>(layout: &TableLayout, row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    crate::engine::resolver::resolve_all(row, layout.cells)
}
