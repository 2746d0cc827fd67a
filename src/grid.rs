//! Customer data grid state.
//!
//! Pure state transitions for the console's central view: server-driven
//! pagination, filter-triggered reloads, per-row risk annotations, selection
//! and bulk-mutation reconciliation. All I/O lives in [`crate::worker`]; this
//! module only decides what each response does to the state, which keeps the
//! invariants unit-testable.
//!
//! Phases: `Idle -> Loading -> {Loaded, Errored}`, `Loaded -> Loading` on any
//! reload, `Errored -> Loading` on retry. Every reload cycle gets a sequence
//! number; a response is applied only while its sequence is still current, so
//! a superseding reload wins regardless of arrival order.

use crate::api::ApiError;
use crate::models::{BulkOutcome, BulkStatus, Customer, PaginatedResponse, RiskAnnotation};
use crate::query::CustomerFilters;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPhase {
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// Current page window plus the server-reported total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
}

impl Pagination {
    pub fn total_pages(&self) -> u32 {
        if self.total_items == 0 {
            return 1;
        }
        self.total_items.div_ceil(self.page_size as u64) as u32
    }

    /// 1-based index of the first row shown, for "Showing X to Y of Z".
    pub fn first_row(&self) -> u64 {
        if self.total_items == 0 {
            return 0;
        }
        (self.page as u64 - 1) * self.page_size as u64 + 1
    }

    pub fn last_row(&self) -> u64 {
        (self.page as u64 * self.page_size as u64).min(self.total_items)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: crate::query::DEFAULT_PAGE,
            page_size: crate::query::DEFAULT_PAGE_SIZE,
            total_items: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing status message. The console shows one at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Success, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Error, text: text.into() }
    }
}

/// What a classified bulk response asks the caller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkDisposition {
    /// Selection cleared; reload the page.
    Reload,
    /// Selection untouched; nothing to refetch.
    Keep,
}

#[derive(Debug, Clone)]
pub struct GridState {
    pub phase: GridPhase,
    pub rows: Vec<Customer>,
    /// Transient risk annotations keyed by customer id. Rebuilt every load
    /// cycle; merged in place by the manual Calculate action.
    pub risk: HashMap<u32, RiskAnnotation>,
    pub selection: BTreeSet<u32>,
    pub filters: CustomerFilters,
    pub pagination: Pagination,
    pub notice: Option<Notice>,
    seq: u64,
}

impl Default for GridState {
    fn default() -> Self {
        Self::new()
    }
}

impl GridState {
    pub fn new() -> Self {
        GridState {
            phase: GridPhase::Idle,
            rows: Vec::new(),
            risk: HashMap::new(),
            selection: BTreeSet::new(),
            filters: CustomerFilters::default(),
            pagination: Pagination::default(),
            notice: None,
            seq: 0,
        }
    }

    pub fn current_seq(&self) -> u64 {
        self.seq
    }

    fn is_current(&self, seq: u64) -> bool {
        self.seq == seq
    }

    /// Start a new load cycle and return its sequence number. Any response
    /// tagged with an earlier sequence is now stale.
    pub fn begin_reload(&mut self) -> u64 {
        self.phase = GridPhase::Loading;
        self.seq += 1;
        self.seq
    }

    /// Apply a fetched page. Returns false (and changes nothing) when the
    /// response was superseded by a newer reload. Keeps the phase at Loading:
    /// the page counts as loaded only after enrichment resolves.
    pub fn apply_page(&mut self, seq: u64, page: PaginatedResponse<Customer>) -> bool {
        if !self.is_current(seq) {
            return false;
        }
        self.rows = page.results;
        self.risk.clear();
        self.selection.clear();
        self.pagination = Pagination {
            page: self.filters.effective_page(),
            page_size: self.filters.effective_page_size(),
            total_items: page.count,
        };
        true
    }

    /// Finish the load cycle with the page's risk annotations.
    pub fn apply_enrichment(&mut self, seq: u64, annotations: HashMap<u32, RiskAnnotation>) -> bool {
        if !self.is_current(seq) {
            return false;
        }
        self.risk.extend(annotations);
        self.phase = GridPhase::Loaded;
        true
    }

    /// A failed load surfaces an error and leaves the previous rows on
    /// screen; the grid offers a manual retry.
    pub fn apply_load_error(&mut self, seq: u64, message: impl Into<String>) -> bool {
        if !self.is_current(seq) {
            return false;
        }
        self.phase = GridPhase::Errored;
        self.notice = Some(Notice::error(message));
        true
    }

    /// Merge a manually requested annotation without a reload. The only
    /// optimistic local mutation the grid performs.
    pub fn apply_row_annotation(&mut self, customer_id: u32, annotation: RiskAnnotation) {
        self.risk.insert(customer_id, annotation);
    }

    // ------------------------------------------------------------------
    // Filters & pagination
    // ------------------------------------------------------------------

    /// Replace the filter set. Predicate changes restart from page 1; the
    /// page size is whatever the new filter set says.
    pub fn set_filters(&mut self, filters: CustomerFilters) {
        self.filters = filters;
        self.filters.page = Some(1);
    }

    /// Jump to a page, clamped to the known page range.
    pub fn set_page(&mut self, page: u32) {
        let clamped = page.clamp(1, self.pagination.total_pages());
        self.filters.page = Some(clamped);
    }

    pub fn next_page(&mut self) {
        self.set_page(self.pagination.page + 1);
    }

    pub fn previous_page(&mut self) {
        self.set_page(self.pagination.page.saturating_sub(1));
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Toggle one row. Ids not on the loaded page are ignored.
    pub fn toggle_select(&mut self, customer_id: u32) {
        if !self.rows.iter().any(|c| c.customer_id == Some(customer_id)) {
            return;
        }
        if !self.selection.remove(&customer_id) {
            self.selection.insert(customer_id);
        }
    }

    /// Select every currently loaded row. Never reaches beyond the page.
    pub fn select_all_loaded(&mut self) {
        self.selection = self
            .rows
            .iter()
            .filter_map(|c| c.customer_id)
            .collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected_ids(&self) -> Vec<u32> {
        self.selection.iter().copied().collect()
    }

    pub fn is_selected(&self, customer_id: u32) -> bool {
        self.selection.contains(&customer_id)
    }

    // ------------------------------------------------------------------
    // Bulk reconciliation
    // ------------------------------------------------------------------

    /// Classify a bulk response: distinct notice per kind, selection cleared
    /// and page reloaded on success/partial success, selection kept on total
    /// failure.
    pub fn classify_bulk(&mut self, result: Result<BulkOutcome, ApiError>) -> BulkDisposition {
        match result {
            Ok(outcome) => match outcome.status {
                BulkStatus::Success => {
                    self.notice = Some(Notice::success(outcome.message));
                    self.selection.clear();
                    BulkDisposition::Reload
                }
                BulkStatus::PartialSuccess => {
                    self.notice = Some(Notice::warning(format!(
                        "Partial success: {}",
                        outcome.message
                    )));
                    self.selection.clear();
                    BulkDisposition::Reload
                }
                BulkStatus::Error => {
                    self.notice = Some(Notice::error(format!(
                        "Bulk operation failed: {}",
                        outcome.message
                    )));
                    BulkDisposition::Keep
                }
            },
            Err(e) => {
                self.notice = Some(Notice::error(format!("Bulk operation failed: {}", e)));
                BulkDisposition::Keep
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: u32) -> Customer {
        Customer {
            customer_id: Some(id),
            credit_score: 600,
            age: 40,
            tenure: 2,
            balance: 1000.0,
            num_of_products: 1,
            has_cr_card: true,
            is_active_member: true,
            estimated_salary: 50000.0,
            geography: "France".to_string(),
            gender: "Female".to_string(),
            exited: Some(false),
            surname: None,
        }
    }

    fn page_of(ids: &[u32], count: u64) -> PaginatedResponse<Customer> {
        PaginatedResponse {
            count,
            next: None,
            previous: None,
            results: ids.iter().map(|id| customer(*id)).collect(),
        }
    }

    fn loaded_grid(ids: &[u32], count: u64) -> GridState {
        let mut grid = GridState::new();
        let seq = grid.begin_reload();
        assert!(grid.apply_page(seq, page_of(ids, count)));
        assert!(grid.apply_enrichment(seq, HashMap::new()));
        grid
    }

    #[test]
    fn test_total_pages_is_ceiling() {
        let pagination = Pagination { page: 1, page_size: 10, total_items: 25 };
        assert_eq!(pagination.total_pages(), 3);

        let pagination = Pagination { page: 1, page_size: 10, total_items: 30 };
        assert_eq!(pagination.total_pages(), 3);

        let pagination = Pagination { page: 1, page_size: 10, total_items: 0 };
        assert_eq!(pagination.total_pages(), 1);
    }

    #[test]
    fn test_row_window_bounds() {
        let pagination = Pagination { page: 3, page_size: 10, total_items: 25 };
        assert_eq!(pagination.first_row(), 21);
        assert_eq!(pagination.last_row(), 25);

        let empty = Pagination { page: 1, page_size: 10, total_items: 0 };
        assert_eq!(empty.first_row(), 0);
        assert_eq!(empty.last_row(), 0);
    }

    #[test]
    fn test_phase_walk_through_load_cycle() {
        let mut grid = GridState::new();
        assert_eq!(grid.phase, GridPhase::Idle);

        let seq = grid.begin_reload();
        assert_eq!(grid.phase, GridPhase::Loading);

        assert!(grid.apply_page(seq, page_of(&[1, 2], 2)));
        // still loading until every row's enrichment attempt resolved
        assert_eq!(grid.phase, GridPhase::Loading);

        assert!(grid.apply_enrichment(seq, HashMap::new()));
        assert_eq!(grid.phase, GridPhase::Loaded);
    }

    #[test]
    fn test_stale_page_response_is_discarded() {
        let mut grid = GridState::new();
        let first = grid.begin_reload();
        let second = grid.begin_reload();

        assert!(!grid.apply_page(first, page_of(&[1], 1)));
        assert!(grid.rows.is_empty());

        assert!(grid.apply_page(second, page_of(&[2, 3], 2)));
        assert_eq!(grid.rows.len(), 2);

        // late enrichment for the superseded cycle is dropped too
        let mut stale = HashMap::new();
        stale.insert(1, RiskAnnotation { score: 0.5, delta: 0.0 });
        assert!(!grid.apply_enrichment(first, stale));
        assert!(grid.risk.is_empty());
    }

    #[test]
    fn test_load_error_keeps_previous_rows() {
        let mut grid = loaded_grid(&[1, 2, 3], 3);

        let seq = grid.begin_reload();
        assert!(grid.apply_load_error(seq, "connection refused"));
        assert_eq!(grid.phase, GridPhase::Errored);
        assert_eq!(grid.rows.len(), 3);
        assert_eq!(grid.notice.as_ref().unwrap().kind, NoticeKind::Error);

        // manual retry resumes the normal cycle
        let retry = grid.begin_reload();
        assert_eq!(grid.phase, GridPhase::Loading);
        assert!(grid.apply_page(retry, page_of(&[4], 1)));
        assert!(grid.apply_enrichment(retry, HashMap::new()));
        assert_eq!(grid.phase, GridPhase::Loaded);
        assert_eq!(grid.rows.len(), 1);
    }

    #[test]
    fn test_reload_invalidates_selection_and_risk() {
        let mut grid = loaded_grid(&[1, 2], 2);
        grid.toggle_select(1);
        grid.apply_row_annotation(1, RiskAnnotation { score: 0.3, delta: 0.0 });

        let seq = grid.begin_reload();
        assert!(grid.apply_page(seq, page_of(&[1, 2], 2)));
        assert!(grid.selection.is_empty());
        assert!(grid.risk.is_empty());
    }

    #[test]
    fn test_selection_covers_loaded_rows_only() {
        let mut grid = loaded_grid(&[5, 6], 40);

        grid.toggle_select(99); // not on this page
        assert!(grid.selection.is_empty());

        grid.select_all_loaded();
        assert_eq!(grid.selected_ids(), vec![5, 6]);

        grid.toggle_select(5);
        assert_eq!(grid.selected_ids(), vec![6]);

        grid.clear_selection();
        assert!(grid.selection.is_empty());
    }

    #[test]
    fn test_bulk_success_clears_selection_and_reloads() {
        let mut grid = loaded_grid(&[1, 2], 2);
        grid.select_all_loaded();

        let outcome = BulkOutcome {
            status: BulkStatus::Success,
            message: "updated 2 of 2 customers".to_string(),
            data: serde_json::Value::Null,
        };
        assert_eq!(grid.classify_bulk(Ok(outcome)), BulkDisposition::Reload);
        assert!(grid.selection.is_empty());
        assert_eq!(grid.notice.as_ref().unwrap().kind, NoticeKind::Success);
    }

    #[test]
    fn test_bulk_partial_success_clears_selection_and_reloads() {
        let mut grid = loaded_grid(&[1, 2], 2);
        grid.select_all_loaded();

        let outcome = BulkOutcome {
            status: BulkStatus::PartialSuccess,
            message: "updated 1 of 2 customers".to_string(),
            data: serde_json::Value::Null,
        };
        assert_eq!(grid.classify_bulk(Ok(outcome)), BulkDisposition::Reload);
        assert!(grid.selection.is_empty());
        assert_eq!(grid.notice.as_ref().unwrap().kind, NoticeKind::Warning);
    }

    #[test]
    fn test_bulk_error_keeps_selection() {
        let mut grid = loaded_grid(&[1, 2], 2);
        grid.select_all_loaded();

        let outcome = BulkOutcome {
            status: BulkStatus::Error,
            message: "all rows rejected".to_string(),
            data: serde_json::Value::Null,
        };
        assert_eq!(grid.classify_bulk(Ok(outcome)), BulkDisposition::Keep);
        assert_eq!(grid.selection.len(), 2);
        assert_eq!(grid.notice.as_ref().unwrap().kind, NoticeKind::Error);
    }

    #[test]
    fn test_bulk_transport_failure_keeps_selection() {
        let mut grid = loaded_grid(&[1], 1);
        grid.select_all_loaded();

        let err = ApiError::Status { status: 500, message: "boom".to_string() };
        assert_eq!(grid.classify_bulk(Err(err)), BulkDisposition::Keep);
        assert_eq!(grid.selection.len(), 1);
    }

    #[test]
    fn test_set_filters_resets_to_first_page() {
        let mut grid = loaded_grid(&[1], 25);
        grid.set_page(3);
        assert_eq!(grid.filters.page, Some(3));

        let filters = CustomerFilters {
            geography: Some("Germany".to_string()),
            page: Some(3),
            ..Default::default()
        };
        grid.set_filters(filters);
        assert_eq!(grid.filters.page, Some(1));
        assert_eq!(grid.filters.geography.as_deref(), Some("Germany"));
    }

    #[test]
    fn test_set_page_clamps_to_range() {
        let mut grid = loaded_grid(&[1], 25); // 3 pages at size 10

        grid.set_page(99);
        assert_eq!(grid.filters.page, Some(3));

        grid.set_page(0);
        assert_eq!(grid.filters.page, Some(1));

        grid.next_page();
        assert_eq!(grid.filters.page, Some(2));
    }

    #[test]
    fn test_manual_annotation_merges_without_reload() {
        let mut grid = loaded_grid(&[1], 1);
        let seq_before = grid.current_seq();

        grid.apply_row_annotation(1, RiskAnnotation { score: 0.8, delta: 1.5 });
        assert_eq!(grid.current_seq(), seq_before);
        assert_eq!(grid.phase, GridPhase::Loaded);
        assert!((grid.risk[&1].score - 0.8).abs() < 1e-9);
    }
}
