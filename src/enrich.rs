//! Risk enrichment for a loaded page of customers.
//!
//! One batch call covers as many rows as the backend has cached scores for;
//! the rest fall back per row (cached monitoring result, then an on-demand
//! prediction) under a bounded permit pool. A row with no reachable score is
//! simply left unannotated - the grid renders a manual Calculate action - and
//! never fails the page.

use crate::api::ApiClient;
use crate::models::{Customer, RiskAnnotation};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Cap on concurrent per-row fallback requests.
pub const FALLBACK_CONCURRENCY: usize = 4;

/// Annotate every persisted customer on the page. Resolves only once each
/// row's attempt has succeeded or exhausted its fallbacks.
pub async fn annotate_page(
    api: &ApiClient,
    customers: &[Customer],
) -> HashMap<u32, RiskAnnotation> {
    let ids: Vec<u32> = customers.iter().filter_map(|c| c.customer_id).collect();
    if ids.is_empty() {
        return HashMap::new();
    }

    let mut annotations: HashMap<u32, RiskAnnotation> = HashMap::new();

    // Batch first: one request instead of a fan-out per row.
    match api.risk_scores(&ids).await {
        Ok(scores) => {
            for score in scores {
                annotations.insert(
                    score.customer_id,
                    RiskAnnotation {
                        score: score.probability,
                        delta: score.risk_change,
                    },
                );
            }
        }
        Err(e) => debug!("batch risk scores unavailable: {}", e),
    }

    // Per-row fallback for whatever the batch did not cover.
    let remaining: Vec<Customer> = customers
        .iter()
        .filter(|c| {
            c.customer_id
                .map(|id| !annotations.contains_key(&id))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if remaining.is_empty() {
        return annotations;
    }

    let semaphore = Arc::new(Semaphore::new(FALLBACK_CONCURRENCY));
    let mut tasks = JoinSet::new();
    for customer in remaining {
        let api = api.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore open");
            let id = customer.customer_id.expect("filtered to persisted rows");
            (id, annotate_row(&api, &customer).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Ok((id, Some(annotation))) = joined {
            annotations.insert(id, annotation);
        }
    }

    annotations
}

/// Single-row enrichment: cached monitoring result, then on-demand
/// prediction, then nothing. Also backs the grid's manual Calculate action.
pub async fn annotate_row(api: &ApiClient, customer: &Customer) -> Option<RiskAnnotation> {
    let id = customer.customer_id?;

    match api.monitoring_result(id).await {
        Ok(result) => return Some(result.into()),
        Err(e) => debug!("no monitoring result for customer {}: {}", id, e),
    }

    match api.predict(&customer.prediction_input()).await {
        Ok(result) => Some(RiskAnnotation::from_prediction(&result)),
        Err(e) => {
            debug!("prediction failed for customer {}: {}", id, e);
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Session;
    use crate::mockd::{self, MockState};
    use crate::models::{Credentials, MonitoringResult};

    async fn spawn_mock() -> (ApiClient, Arc<MockState>) {
        let state = Arc::new(MockState::seeded());
        let app = mockd::router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let session = Session::with_credentials(Credentials {
            username: mockd::MOCK_USERNAME.to_string(),
            password: mockd::MOCK_PASSWORD.to_string(),
        });
        let client = ApiClient::new(format!("http://{}", addr), session).unwrap();
        (client, state)
    }

    fn customers(state: &MockState, n: usize) -> Vec<Customer> {
        state
            .customer_ids()
            .into_iter()
            .take(n)
            .map(|id| state.customer(id).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_batch_scores_carry_their_delta() {
        let (api, state) = spawn_mock().await;
        let page = customers(&state, 3);
        let monitored = page[0].customer_id.unwrap();
        state.set_monitoring(
            monitored,
            MonitoringResult {
                probability: 0.75,
                risk_change: 9.5,
            },
        );

        let annotations = annotate_page(&api, &page).await;
        let annotation = annotations[&monitored];
        assert!((annotation.score - 0.75).abs() < 1e-9);
        assert!((annotation.delta - 9.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_prediction_fallback_has_zero_delta() {
        let (api, state) = spawn_mock().await;
        let page = customers(&state, 2);

        // No monitoring entries at all: every row falls back to prediction.
        let annotations = annotate_page(&api, &page).await;
        assert_eq!(annotations.len(), 2);
        for customer in &page {
            let annotation = annotations[&customer.customer_id.unwrap()];
            assert!((0.0..=1.0).contains(&annotation.score));
            assert_eq!(annotation.delta, 0.0);
        }
    }

    #[tokio::test]
    async fn test_row_failure_does_not_fail_the_page() {
        let (api, state) = spawn_mock().await;
        let page = customers(&state, 3);
        let monitored = page[0].customer_id.unwrap();
        state.set_monitoring(
            monitored,
            MonitoringResult {
                probability: 0.4,
                risk_change: 0.0,
            },
        );
        state.set_fail_predict(true);

        // Rows without a cached score exhaust both fallbacks and stay bare;
        // the monitored row still comes through.
        let annotations = annotate_page(&api, &page).await;
        assert_eq!(annotations.len(), 1);
        assert!(annotations.contains_key(&monitored));
    }

    #[tokio::test]
    async fn test_annotate_row_prefers_cached_monitoring() {
        let (api, state) = spawn_mock().await;
        let customer = customers(&state, 1).remove(0);
        let id = customer.customer_id.unwrap();

        state.set_monitoring(
            id,
            MonitoringResult {
                probability: 0.9,
                risk_change: 22.0,
            },
        );
        let annotation = annotate_row(&api, &customer).await.unwrap();
        assert!((annotation.score - 0.9).abs() < 1e-9);
        assert!((annotation.delta - 22.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_annotate_row_both_fallbacks_exhausted() {
        let (api, state) = spawn_mock().await;
        let customer = customers(&state, 1).remove(0);
        state.set_fail_predict(true);

        assert!(annotate_row(&api, &customer).await.is_none());
    }

    #[tokio::test]
    async fn test_unsaved_customers_are_skipped() {
        let (api, state) = spawn_mock().await;
        let mut customer = customers(&state, 1).remove(0);
        customer.customer_id = None;

        assert!(annotate_row(&api, &customer).await.is_none());
        let annotations = annotate_page(&api, &[customer]).await;
        assert!(annotations.is_empty());
    }
}
