//! Customer CSV import.
//!
//! The file is validated locally before anything goes on the wire: cheap
//! checks (extension, required header columns, at least one data row) catch
//! the usual mistakes without a round trip. The actual import happens
//! server-side via the multipart endpoint.

use crate::api::{ApiClient, ApiError};
use crate::models::ImportReport;
use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Columns the backend importer requires. `customer_id`, `surname` and
/// `exited` are optional.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "credit_score",
    "age",
    "tenure",
    "balance",
    "num_of_products",
    "has_cr_card",
    "is_active_member",
    "estimated_salary",
    "geography",
    "gender",
];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("not a CSV file: {}", .0.display())]
    NotCsv(PathBuf),

    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required columns: {0}")]
    MissingColumns(String),

    #[error("file has a header but no data rows")]
    Empty,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What the local validation learned about the file.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub headers: Vec<String>,
    pub rows: usize,
}

/// Validate a CSV file without uploading it.
pub fn preflight(path: &Path) -> Result<Preflight, ImportError> {
    let is_csv = path
        .extension()
        .map(|ext| ext.to_ascii_lowercase() == "csv")
        .unwrap_or(false);
    if !is_csv {
        return Err(ImportError::NotCsv(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing.join(", ")));
    }

    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    if rows == 0 {
        return Err(ImportError::Empty);
    }

    Ok(Preflight { headers, rows })
}

/// Preflight locally, then upload. A body-level error status from the server
/// surfaces as [`ApiError::Status`] via the client.
pub async fn run(
    api: &ApiClient,
    path: &Path,
    update_existing: bool,
) -> Result<ImportReport, ImportError> {
    let checked_path = path.to_path_buf();
    let preflight = tokio::task::spawn_blocking(move || preflight(&checked_path))
        .await
        .expect("preflight task panicked")?;
    debug!(
        "preflight ok: {} data rows, columns: {}",
        preflight.rows,
        preflight.headers.join(",")
    );

    Ok(api.import_csv(path, update_existing).await?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Session;
    use crate::mockd::{self, MockState};
    use crate::models::Credentials;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::Builder;

    const GOOD_HEADER: &str = "customer_id,credit_score,age,tenure,balance,num_of_products,has_cr_card,is_active_member,estimated_salary,geography,gender,exited,surname";

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_preflight_accepts_a_valid_file() {
        let file = csv_file(&format!(
            "{}\n,700,30,2,1000.0,1,true,true,50000.0,France,Male,false,Nouveau\n",
            GOOD_HEADER
        ));
        let preflight = preflight(file.path()).unwrap();
        assert_eq!(preflight.rows, 1);
        assert!(preflight.headers.contains(&"geography".to_string()));
    }

    #[test]
    fn test_preflight_rejects_wrong_extension() {
        let mut file = Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(GOOD_HEADER.as_bytes()).unwrap();

        let err = preflight(file.path()).unwrap_err();
        assert!(matches!(err, ImportError::NotCsv(_)));
    }

    #[test]
    fn test_preflight_rejects_missing_columns() {
        let file = csv_file("credit_score,age\n700,30\n");
        let err = preflight(file.path()).unwrap_err();
        match err {
            ImportError::MissingColumns(missing) => {
                assert!(missing.contains("geography"));
                assert!(missing.contains("tenure"));
                assert!(!missing.contains("credit_score"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_preflight_rejects_header_only_file() {
        let file = csv_file(&format!("{}\n", GOOD_HEADER));
        let err = preflight(file.path()).unwrap_err();
        assert!(matches!(err, ImportError::Empty));
    }

    #[tokio::test]
    async fn test_import_against_backend_creates_and_skips() {
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
        let api = ApiClient::new(format!("http://{}", addr), session).unwrap();

        let existing = state.first_customer_id().unwrap();
        let file = csv_file(&format!(
            "{}\n\
             ,700,30,2,1000.0,1,true,true,50000.0,France,Male,false,Nouveau\n\
             ,610,45,7,0.0,2,false,false,32000.0,Spain,Female,true,Nueva\n\
             {},650,41,3,12000.0,1,true,true,58000.0,Germany,Male,false,Bestand\n",
            GOOD_HEADER, existing
        ));

        let before = state.customer_count();
        let report = run(&api, file.path(), false).await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(state.customer_count(), before + 2);

        // same file with update_existing flips the skip into an update
        let report = run(&api, file.path(), true).await.unwrap();
        assert_eq!(report.updated, 1);
    }
}
