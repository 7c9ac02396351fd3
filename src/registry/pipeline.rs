// src/registry/pipeline.rs
use std::collections::VecDeque;

use crate::config::PipelineConfig;
use crate::extractors::{Layout, PageExtractor};
use crate::registry::models::NormalizedRecord;
use crate::registry::pagination::PaginationController;
use crate::registry::renderer::RenderSession;
use crate::utils::error::RenderError;

/// Lazy, single-use sequence of records across every visited page.
///
/// Pages are loaded only when the records of the previous page have been
/// consumed, so a consumer that stops early never triggers further loads.
pub struct ExtractionPipeline<S> {
    controller: PaginationController<S>,
    extractor: PageExtractor,
    pending: VecDeque<NormalizedRecord>,
}

impl<S: RenderSession> ExtractionPipeline<S> {
    pub fn new(session: S, config: PipelineConfig, layout: Layout) -> Self {
        let extractor = PageExtractor::new(
            layout,
            config.base_url.clone(),
            config.amount_policy,
            config.debug_dir.clone(),
        );
        Self {
            controller: PaginationController::new(session, config),
            extractor,
            pending: VecDeque::new(),
        }
    }

    /// Next record in page order; `Ok(None)` when the walk is complete.
    pub async fn next_record(&mut self) -> Result<Option<NormalizedRecord>, RenderError> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            let Some(snapshot) = self.controller.next_page().await? else {
                return Ok(None);
            };

            let extraction = self.extractor.extract(&snapshot);
            if extraction.table_found {
                tracing::info!(
                    "Page {}: {} record(s) from {} row(s)",
                    snapshot.page,
                    extraction.records.len(),
                    extraction.rows_seen
                );
            }
            self.controller.complete_page(extraction.records.len());
            self.pending.extend(extraction.records);
        }
    }

    pub fn pages_parsed(&self) -> u32 {
        self.controller.pages_parsed()
    }

    pub fn pages_failed(&self) -> u32 {
        self.controller.pages_failed()
    }

    /// Ends the sequence and releases the renderer session.
    pub async fn close(mut self) {
        self.controller.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::registry::fake::{fixture_page, quick_config, FakePage, FakeRenderer};
    use crate::registry::pagination::PageState;
    use crate::registry::renderer::Renderer;

    async fn drain<S: RenderSession>(pipeline: &mut ExtractionPipeline<S>) -> Result<Vec<NormalizedRecord>, RenderError> {
        let mut out = Vec::new();
        while let Some(record) = pipeline.next_record().await? {
            out.push(record);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn yields_records_in_page_order() {
        let renderer = FakeRenderer::new(vec![
            FakePage::Html(fixture_page(1, 0..3, 7, 3)),
            FakePage::Html(fixture_page(2, 3..6, 7, 3)),
            FakePage::Html(fixture_page(3, 6..7, 7, 3)),
        ]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();

        let lots: Vec<_> = records.iter().map(|r| r.lot_number.clone().unwrap()).collect();
        assert_eq!(lots, (0..7).map(|i| format!("LOT-{:05}", i)).collect::<Vec<_>>());
        assert_eq!(pipeline.pages_parsed(), 3);
        assert_eq!(renderer.loaded_pages(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stops_at_first_empty_page() {
        // Declares five pages of two records, but page 3 comes back empty
        let renderer = FakeRenderer::new(vec![
            FakePage::Html(fixture_page(1, 0..2, 10, 2)),
            FakePage::Html(fixture_page(2, 2..4, 10, 2)),
            FakePage::Html(fixture_page(3, 0..0, 10, 2)),
            FakePage::Html(fixture_page(4, 6..8, 10, 2)),
            FakePage::Html(fixture_page(5, 8..10, 10, 2)),
        ]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(pipeline.pages_parsed(), 3);
        assert_eq!(pipeline.controller.total_pages(), 5);
        assert_eq!(pipeline.controller.state(), PageState::Done);
        assert_eq!(renderer.loaded_pages(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_page_does_not_stop_the_walk() {
        let renderer = FakeRenderer::new(vec![
            FakePage::Html(fixture_page(1, 0..2, 8, 2)),
            FakePage::NavigationError,
            FakePage::Html(fixture_page(3, 4..6, 8, 2)),
            FakePage::Html(fixture_page(4, 6..8, 8, 2)),
        ]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(pipeline.pages_parsed(), 3);
        assert_eq!(pipeline.pages_failed(), 1);
        assert_eq!(renderer.loaded_pages(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn crash_aborts_the_walk() {
        let renderer = FakeRenderer::new(vec![
            FakePage::Html(fixture_page(1, 0..2, 6, 2)),
            FakePage::Crash,
            FakePage::Html(fixture_page(3, 4..6, 6, 2)),
        ]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        assert!(pipeline.next_record().await.unwrap().is_some());
        assert!(pipeline.next_record().await.unwrap().is_some());
        let err = pipeline.next_record().await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(pipeline.controller.state(), PageState::Aborted);
        assert!(pipeline.next_record().await.unwrap().is_none());
        assert_eq!(renderer.loaded_pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn page_cap_clamps_total() {
        let renderer = FakeRenderer::new(vec![
            FakePage::Html(fixture_page(1, 0..2, 6, 2)),
            FakePage::Html(fixture_page(2, 2..4, 6, 2)),
            FakePage::Html(fixture_page(3, 4..6, 6, 2)),
        ]);
        let session = renderer.open().await.unwrap();
        let config = PipelineConfig { page_cap: 2, ..quick_config(FakeRenderer::BASE) };
        let mut pipeline = ExtractionPipeline::new(session, config, Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(renderer.loaded_pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn early_stop_loads_no_further_pages() {
        let renderer = FakeRenderer::new(vec![
            FakePage::Html(fixture_page(1, 0..2, 6, 2)),
            FakePage::Html(fixture_page(2, 2..4, 6, 2)),
            FakePage::Html(fixture_page(3, 4..6, 6, 2)),
        ]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        assert!(pipeline.next_record().await.unwrap().is_some());
        pipeline.close().await;

        assert_eq!(renderer.loaded_pages(), vec![1]);
        assert!(renderer.closed());
    }

    #[tokio::test]
    async fn missing_first_page_is_fatal() {
        let renderer = FakeRenderer::new(vec![FakePage::NavigationError]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        let err = pipeline.next_record().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn extracts_after_grace_when_table_is_late() {
        // Renders after the 50 ms load timeout but within the grace period
        let renderer = FakeRenderer::new(vec![FakePage::Stalled {
            html: fixture_page(1, 0..3, 3, 3),
            after: Duration::from_millis(120),
        }]);
        let session = renderer.open().await.unwrap();
        let config = PipelineConfig { render_grace: Duration::from_millis(200), ..quick_config(FakeRenderer::BASE) };
        let mut pipeline = ExtractionPipeline::new(session, config, Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(pipeline.pages_parsed(), 1);
        assert_eq!(pipeline.pages_failed(), 0);
    }

    #[tokio::test]
    async fn table_that_never_renders_counts_as_parsed() {
        let renderer = FakeRenderer::new(vec![
            FakePage::Stalled { html: fixture_page(1, 0..2, 4, 2), after: Duration::from_secs(60) },
            FakePage::Html(fixture_page(2, 2..4, 4, 2)),
        ]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();

        // Page 1 reached extraction with the overlay only; no count is known, so the walk ends
        assert!(records.is_empty());
        assert_eq!(pipeline.pages_parsed(), 1);
        assert_eq!(pipeline.controller.state(), PageState::Done);
        assert_eq!(renderer.loaded_pages(), vec![1]);
    }

    #[tokio::test]
    async fn waits_for_table_behind_loading_overlay() {
        let renderer = FakeRenderer::new(vec![FakePage::Delayed(fixture_page(1, 0..2, 2, 2))]);
        let session = renderer.open().await.unwrap();
        let mut pipeline = ExtractionPipeline::new(session, quick_config(FakeRenderer::BASE), Layout::builtin().unwrap());

        let records = drain(&mut pipeline).await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
