//! Admin API handlers.
//!
//! # Endpoints
//!
//! - `POST /run/{stage}`      – queue a run of a pipeline stage
//! - `GET  /exports`          – list materialized export files
//! - `GET  /exports/{name}`   – download one export file

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use offerhub_sdk::objects::UnknownName;

use crate::state::AppState;

mod exports;
mod run_stage;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run/{stage}", post(run_stage::run_stage))
        .route("/exports", get(exports::list_exports))
        .route("/exports/{name}", get(exports::download_export))
}

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    UnknownStage(UnknownName),
    InvalidFileName,
    NotFound,
    Io(std::io::Error),
    StageWorkerStopped,
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::UnknownStage(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
            AdminApiError::InvalidFileName => {
                (StatusCode::BAD_REQUEST, "invalid export file name").into_response()
            }
            AdminApiError::NotFound => {
                (StatusCode::NOT_FOUND, "resource not found").into_response()
            }
            AdminApiError::Io(e) => {
                tracing::error!(error = %e, "Admin API I/O error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::StageWorkerStopped => {
                tracing::error!("Admin API: stage worker stopped");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::build_router;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use offerhub_core::events::{StageReceivers, StageRequest, StageSenders, Trigger};
    use offerhub_sdk::objects::StageName;
    use tower::ServiceExt;

    fn app(export_dir: &std::path::Path) -> (axum::Router, StageReceivers) {
        let (senders, receivers) = StageSenders::channels();
        (build_router(AppState::new(export_dir, senders)), receivers)
    }

    async fn call(router: axum::Router, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    #[tokio::test]
    async fn health_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _receivers) = app(dir.path());
        let (status, _, body) = call(router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn run_stage_queues_manual_request() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mut receivers) = app(dir.path());
        let (status, _, body) = call(router, "POST", "/admin/run/compute").await;

        assert_eq!(status, StatusCode::ACCEPTED);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["queued"], "compute");
        assert_eq!(
            receivers.compute.try_recv().unwrap(),
            StageRequest::new(StageName::Compute, Trigger::Manual)
        );
        assert!(receivers.export.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_stage_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _receivers) = app(dir.path());
        let (status, _, _) = call(router, "POST", "/admin/run/publish").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lists_export_files_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("galaxus_price_stock.csv"), "providerKey\n").unwrap();
        std::fs::write(dir.path().join("galaxus_master.csv"), "providerKey,title\n").unwrap();
        std::fs::write(dir.path().join("galaxus_master.csv.tmp"), "partial").unwrap();
        std::fs::write(dir.path().join("galaxus_master.csv.prev"), "previous").unwrap();
        std::fs::create_dir(dir.path().join("archive")).unwrap();
        let (router, _receivers) = app(dir.path());

        let (status, _, body) = call(router, "GET", "/admin/exports").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let files = json.as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["name"], "galaxus_master.csv");
        assert_eq!(files[0]["size"], 18);
        assert!(files[0]["modifiedAt"].as_i64().unwrap() > 0);
        assert_eq!(files[1]["name"], "galaxus_price_stock.csv");
    }

    #[tokio::test]
    async fn missing_export_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _receivers) = app(&dir.path().join("not-yet-created"));
        let (status, _, body) = call(router, "GET", "/admin/exports").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn downloads_export_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("galaxus_master.csv"), "providerKey,title\nA,Shoe\n").unwrap();
        let (router, _receivers) = app(dir.path());

        let (status, headers, body) = call(router, "GET", "/admin/exports/galaxus_master.csv").await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/csv")
        );
        assert_eq!(body, b"providerKey,title\nA,Shoe\n");
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let outer = tempfile::tempdir().unwrap();
        let exports = outer.path().join("exports");
        std::fs::create_dir(&exports).unwrap();
        std::fs::write(outer.path().join("secret.csv"), "secret").unwrap();
        let (router, _receivers) = app(&exports);

        let (status, _, _) = call(router.clone(), "GET", "/admin/exports/..%2Fsecret.csv").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = call(router, "GET", "/admin/exports/..").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_export_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _receivers) = app(dir.path());
        let (status, _, _) = call(router, "GET", "/admin/exports/galaxus_master.csv").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
