// src/extractors/row.rs

// --- Imports ---
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use url::Url;

use crate::extractors::fields::{self, AmountPolicy};
use crate::extractors::identity::compute_identity;
use crate::extractors::layout::{ColumnBinding, Field, Layout};
use crate::registry::models::NormalizedRecord;

// --- CSS Selectors (Lazy Static) ---
static BOLD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("b, strong").expect("Failed to compile BOLD_SELECTOR")
});

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").expect("Failed to compile LINK_SELECTOR")
});

/// How cells map onto fields for every row of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingStrategy {
    /// Column i carries `columns[i]`, resolved from the page's header row.
    Headered { columns: Vec<Option<Field>> },
    /// Fixed column indexes from the layout profile.
    Positional { columns: Vec<ColumnBinding> },
}

impl MappingStrategy {
    /// Picks the strategy once per page.
    ///
    /// Headers win when their count equals the cell count of the first data
    /// row and at least one of them is recognised; otherwise the positional
    /// table applies.
    pub fn select(layout: &Layout, headers: &[String], row_cells: Option<usize>) -> Self {
        if !headers.is_empty() && row_cells == Some(headers.len()) {
            let mut columns: Vec<Option<Field>> = Vec::with_capacity(headers.len());
            for header in headers {
                // Each field binds to the first header that names it
                let field = layout.match_header(header).filter(|f| !columns.contains(&Some(*f)));
                columns.push(field);
            }
            if columns.iter().any(Option::is_some) {
                return MappingStrategy::Headered { columns };
            }
            tracing::debug!("No header matched a known field; using positional mapping");
        } else if !headers.is_empty() {
            tracing::debug!(
                "Header count {} does not match row cell count {:?}; using positional mapping",
                headers.len(),
                row_cells
            );
        }
        MappingStrategy::Positional { columns: layout.positional.clone() }
    }

    pub fn column_of(&self, field: Field) -> Option<usize> {
        match self {
            MappingStrategy::Headered { columns } => columns.iter().position(|c| *c == Some(field)),
            MappingStrategy::Positional { columns } => {
                columns.iter().find(|b| b.field == field).map(|b| b.index)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MappingStrategy::Headered { .. } => "headered",
            MappingStrategy::Positional { .. } => "positional",
        }
    }
}

/// Forensic copy of what a record was built from.
#[derive(Serialize)]
struct RawSnapshot<'a> {
    layout: &'a str,
    strategy: &'static str,
    cells: Vec<String>,
}

/// Turns one `<tr>` into a record. Pure: the same row always yields the same record.
pub struct RowExtractor<'a> {
    layout: &'a Layout,
    strategy: &'a MappingStrategy,
    base_url: &'a Url,
    amount_policy: AmountPolicy,
}

impl<'a> RowExtractor<'a> {
    pub fn new(
        layout: &'a Layout,
        strategy: &'a MappingStrategy,
        base_url: &'a Url,
        amount_policy: AmountPolicy,
    ) -> Self {
        Self { layout, strategy, base_url, amount_policy }
    }

    /// Returns `None` for malformed rows or rows without any identifying field.
    pub fn extract(&self, row: ElementRef) -> Option<NormalizedRecord> {
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();

        if cells.len() < self.layout.min_cells {
            tracing::trace!("Skipping row with {} cells (minimum {})", cells.len(), self.layout.min_cells);
            return None;
        }

        let cell = |field: Field| self.strategy.column_of(field).and_then(|i| cells.get(i).copied());
        let text_of = |field: Field| cell(field).and_then(clean_text);

        // Lot number: emphasised span first, else the first line of the cell
        let lot_cell = cell(Field::LotNumber);
        let lot_number = lot_cell
            .and_then(|c| bold_text(c).or_else(|| first_line(c)))
            .or_else(|| cells.first().and_then(|c| bold_text(*c)));

        // Announcement: dedicated cell, then the packed lot cell (the first cell when unmapped)
        let announce_link =
            self.find_announce_link(cell(Field::AnnounceNumber), lot_cell.or_else(|| cells.first().copied()));
        let announce_number = announce_link
            .as_ref()
            .and_then(|(text, _)| first_token(text))
            .or_else(|| text_of(Field::AnnounceNumber).and_then(|t| first_token(&t)));
        let announce_name = text_of(Field::AnnounceName)
            .or_else(|| announce_link.as_ref().map(|(text, _)| text.clone()));
        let announce_url = announce_link.as_ref().and_then(|(_, href)| self.resolve(href));

        let (record_name, record_url) = match cell(Field::RecordName) {
            Some(c) => match self.find_link(c, |href| self.layout.record_link.is_match(href)) {
                Some((text, href)) => (Some(text), self.resolve(&href)),
                None => (clean_text(c), None),
            },
            None => (None, None),
        };

        if lot_number.is_none() && announce_number.is_none() && record_name.is_none() {
            tracing::debug!("Row has no identifying fields; skipped");
            return None;
        }

        let (customer_name, customer_source) = self.customer(&cells, cell(Field::CustomerName));
        let customer_tax_id = customer_name
            .as_deref()
            .and_then(fields::extract_tax_id)
            .or_else(|| customer_source.and_then(|c| fields::extract_tax_id(&line_text(c))));

        let raw = RawSnapshot {
            layout: &self.layout.version,
            strategy: self.strategy.name(),
            cells: cells.iter().map(|c| clean_text(*c).unwrap_or_default()).collect(),
        };
        let raw_snapshot = serde_json::to_string(&raw).unwrap_or_default();

        Some(NormalizedRecord {
            identity_hash: compute_identity(
                lot_number.as_deref(),
                announce_number.as_deref(),
                record_name.as_deref(),
            ),
            lot_number,
            announce_number,
            announce_name,
            record_name,
            subject_type: text_of(Field::SubjectType),
            quantity: text_of(Field::Quantity),
            status: text_of(Field::Status),
            purchase_method: text_of(Field::PurchaseMethod),
            customer_name,
            customer_tax_id,
            purchase_amount: text_of(Field::PurchaseAmount)
                .and_then(|t| fields::parse_amount(&t, self.amount_policy)),
            deadline_date: text_of(Field::DeadlineDate).and_then(|t| fields::parse_date(&t)),
            publication_date: text_of(Field::PublicationDate).and_then(|t| fields::parse_date(&t)),
            financial_year: text_of(Field::FinancialYear).and_then(|t| fields::parse_year(&t)),
            delivery_place: text_of(Field::DeliveryPlace),
            source_url: record_url.or(announce_url),
            raw_snapshot,
        })
    }

    fn find_announce_link(
        &self,
        announce_cell: Option<ElementRef>,
        lot_cell: Option<ElementRef>,
    ) -> Option<(String, String)> {
        let is_announce = |href: &str| self.layout.announce_link.is_match(href);
        announce_cell
            .into_iter()
            .chain(lot_cell)
            .find_map(|c| self.find_link(c, &is_announce))
    }

    fn find_link(&self, cell: ElementRef, accept: impl Fn(&str) -> bool) -> Option<(String, String)> {
        cell.select(&LINK_SELECTOR).find_map(|a| {
            let href = a.value().attr("href")?;
            if !accept(href) {
                return None;
            }
            Some((clean_text(a).unwrap_or_default(), href.to_string()))
        })
    }

    /// Customer from its own column, or from a labelled line in any cell.
    fn customer<'r>(
        &self,
        cells: &[ElementRef<'r>],
        customer_cell: Option<ElementRef<'r>>,
    ) -> (Option<String>, Option<ElementRef<'r>>) {
        if let Some(c) = customer_cell {
            let name = self.labelled_customer(c).or_else(|| clean_text(c));
            return (name, Some(c));
        }
        cells
            .iter()
            .find_map(|c| self.labelled_customer(*c).map(|name| (Some(name), Some(*c))))
            .unwrap_or((None, None))
    }

    fn labelled_customer(&self, cell: ElementRef) -> Option<String> {
        let text = line_text(cell);
        let caps = self.layout.customer_label.captures(&text)?;
        non_empty(caps.get(1)?.as_str())
    }

    fn resolve(&self, href: &str) -> Option<String> {
        self.base_url.join(href.trim()).ok().map(String::from)
    }
}

// --- Text helpers ---

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Text nodes trimmed and joined by single spaces.
pub(crate) fn clean_text(el: ElementRef) -> Option<String> {
    let joined = el
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(&joined)
}

/// Text nodes trimmed and joined by newlines, preserving visual lines.
fn line_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_line(el: ElementRef) -> Option<String> {
    line_text(el).lines().next().and_then(non_empty)
}

fn bold_text(el: ElementRef) -> Option<String> {
    el.select(&BOLD_SELECTOR).find_map(clean_text)
}

fn first_token(text: &str) -> Option<String> {
    text.split_whitespace().next().map(str::to_string)
}
