// src/extractors/page.rs
use std::path::PathBuf;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::extractors::fields::AmountPolicy;
use crate::extractors::layout::Layout;
use crate::extractors::row::{clean_text, MappingStrategy, RowExtractor};
use crate::registry::models::{NormalizedRecord, PageSnapshot};
use crate::utils::html_debug;

static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table").expect("Failed to compile TABLE_SELECTOR")
});

// A rendered result table has at least one data cell in its body
static MATERIALIZED_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table tbody tr td").expect("Failed to compile MATERIALIZED_SELECTOR")
});

static HEADER_CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("thead th, thead td").expect("Failed to compile HEADER_CELL_SELECTOR")
});

/// Records found on one page, in row order.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub table_found: bool,
    pub rows_seen: usize,
    pub records: Vec<NormalizedRecord>,
}

/// Whether the renderer has produced the result table yet.
pub fn table_materialized(content: &str) -> bool {
    Html::parse_document(content).select(&MATERIALIZED_SELECTOR).next().is_some()
}

/// Locates the result table on a page and runs every body row through `RowExtractor`.
pub struct PageExtractor {
    layout: Layout,
    base_url: Url,
    amount_policy: AmountPolicy,
    debug_dir: Option<PathBuf>,
}

impl PageExtractor {
    pub fn new(layout: Layout, base_url: Url, amount_policy: AmountPolicy, debug_dir: Option<PathBuf>) -> Self {
        Self { layout, base_url, amount_policy, debug_dir }
    }

    pub fn extract(&self, snapshot: &PageSnapshot) -> PageExtraction {
        let document = Html::parse_document(&snapshot.content);

        let Some(table) = self.find_result_table(&document) else {
            tracing::warn!("Result table not found on page {} ({})", snapshot.page, snapshot.url);
            self.dump_for_debugging(snapshot);
            return PageExtraction::default();
        };

        let rows = body_rows(table);
        let headers = header_texts(table);
        // Notice and banner rows span the table in one cell; size the mapping on a data row
        let first_row_cells = rows
            .iter()
            .map(|r| data_cells(*r))
            .find(|&n| n >= self.layout.min_cells);
        let strategy = MappingStrategy::select(&self.layout, &headers, first_row_cells);
        tracing::debug!(
            "Page {}: {} rows, {} headers, {} mapping",
            snapshot.page,
            rows.len(),
            headers.len(),
            strategy.name()
        );

        let extractor = RowExtractor::new(&self.layout, &strategy, &self.base_url, self.amount_policy);
        let records: Vec<NormalizedRecord> = rows.iter().filter_map(|row| extractor.extract(*row)).collect();

        if records.len() < rows.len() {
            tracing::debug!(
                "Page {}: {} of {} rows skipped as unusable",
                snapshot.page,
                rows.len() - records.len(),
                rows.len()
            );
        }

        PageExtraction { table_found: true, rows_seen: rows.len(), records }
    }

    /// The first table whose text contains every marker string.
    fn find_result_table<'d>(&self, document: &'d Html) -> Option<ElementRef<'d>> {
        document.select(&TABLE_SELECTOR).find(|table| {
            let text = table.text().collect::<String>();
            self.layout
                .table_markers
                .iter()
                .filter(|m| !m.trim().is_empty())
                .all(|marker| text.contains(marker.as_str()))
        })
    }

    fn dump_for_debugging(&self, snapshot: &PageSnapshot) {
        let Some(dir) = &self.debug_dir else { return };
        if let Err(e) = html_debug::dump_page(dir, snapshot.page, &snapshot.content) {
            tracing::warn!("Failed to write debug dump for page {}: {}", snapshot.page, e);
        }
    }
}

/// `<tr>` elements directly under the table's `<tbody>` sections.
fn body_rows(table: ElementRef) -> Vec<ElementRef> {
    table
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tbody")
        .flat_map(|tbody| tbody.children().filter_map(ElementRef::wrap))
        .filter(|el| el.value().name() == "tr")
        .collect()
}

fn header_texts(table: ElementRef) -> Vec<String> {
    table
        .select(&HEADER_CELL_SELECTOR)
        .map(|th| clean_text(th).unwrap_or_default())
        .collect()
}

fn data_cells(row: ElementRef) -> usize {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .count()
}
