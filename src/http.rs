//! HTTP transport for the hosting platform.
//!
//! Every route builds the same request envelope the stdio transport reads
//! and runs it through the router on a blocking thread with its own database
//! connection. Session fields come from the query string:
//! `mode`, `key` and `student`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db;
use crate::ipc::{self, AppState, Request};
use crate::session::SessionInfo;

#[derive(Clone)]
pub struct Shared {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub data_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    mode: Option<String>,
    key: Option<String>,
    student: Option<String>,
}

impl From<SessionQuery> for SessionInfo {
    fn from(q: SessionQuery) -> Self {
        SessionInfo {
            mode: q.mode,
            key: q.key,
            student_id: q.student,
        }
    }
}

pub fn router(shared: Shared) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/view", get(view_handler))
        .route("/api/{method}", post(call_handler))
        .route("/export/{lecture}", get(export_handler))
        .with_state(shared)
}

pub async fn serve(config: Arc<Config>, catalog: Arc<Catalog>) -> anyhow::Result<()> {
    let shared = Shared {
        data_dir: config.data_dir.clone(),
        config: config.clone(),
        catalog,
    };
    let app = router(shared);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}

fn envelope(method: &str, params: serde_json::Value, session: SessionInfo) -> Request {
    Request {
        id: Uuid::new_v4().to_string(),
        method: method.to_string(),
        params,
        session,
    }
}

async fn dispatch(shared: Shared, req: Request) -> serde_json::Value {
    let id = req.id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let db = match db::connect_or_init(&shared.data_dir) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, path = %shared.data_dir.display(), "cannot open response store");
                None
            }
        };
        let state = AppState {
            config: shared.config,
            catalog: shared.catalog,
            db,
            file_export: false,
        };
        ipc::handle_request(&state, req)
    })
    .await;

    joined.unwrap_or_else(|e| {
        error!(id = %id, "request task failed: {e}");
        ipc::err(&id, "internal", "request failed", None)
    })
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    if v.get("ok").and_then(|o| o.as_bool()) == Some(true) {
        return None;
    }
    Some(
        v.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or("internal"),
    )
}

fn status_for(code: Option<&str>) -> StatusCode {
    match code {
        None => StatusCode::OK,
        Some("bad_params") | Some("bad_json") => StatusCode::BAD_REQUEST,
        Some("instructor_required") => StatusCode::FORBIDDEN,
        Some("unknown_lecture") | Some("unknown_question") | Some("not_implemented") => {
            StatusCode::NOT_FOUND
        }
        Some("database_unavailable") => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_response(v: serde_json::Value) -> Response {
    (status_for(error_code(&v)), Json(v)).into_response()
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn view_handler(State(shared): State<Shared>, Query(q): Query<SessionQuery>) -> Response {
    let req = envelope("view", json!({}), q.into());
    json_response(dispatch(shared, req).await)
}

async fn call_handler(
    State(shared): State<Shared>,
    Path(method): Path<String>,
    Query(q): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let params = if body.iter().all(|b| b.is_ascii_whitespace()) {
        json!({})
    } else {
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(v) => v,
            Err(e) => {
                return json_response(ipc::err("", "bad_json", e.to_string(), None));
            }
        }
    };
    let req = envelope(&method, params, q.into());
    json_response(dispatch(shared, req).await)
}

fn safe_file_name(lecture: &str) -> String {
    let stem: String = lecture
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("responses_{}.csv", stem)
}

async fn export_handler(
    State(shared): State<Shared>,
    Path(lecture): Path<String>,
    Query(q): Query<SessionQuery>,
) -> Response {
    let req = envelope("export.lectureCsv", json!({ "lecture": lecture }), q.into());
    let mut v = dispatch(shared, req).await;
    if error_code(&v).is_some() {
        return json_response(v);
    }
    let csv = match v
        .get_mut("result")
        .and_then(|r| r.get_mut("csv"))
        .map(serde_json::Value::take)
    {
        Some(serde_json::Value::String(s)) => s,
        _ => String::new(),
    };
    let disposition = format!("attachment; filename=\"{}\"", safe_file_name(&lecture));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        dir: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn fixture() -> Fixture {
        let dir = std::env::temp_dir().join(format!("participationd-http-{}", Uuid::new_v4()));
        db::open_db(&dir).expect("open db");
        let shared = Shared {
            data_dir: dir.clone(),
            config: Arc::new(Config::for_tests(dir.clone())),
            catalog: Arc::new(flow::tests::sample_catalog()),
        };
        Fixture {
            app: router(shared),
            dir,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let req = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let resp = app.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        let v = serde_json::from_slice(&bytes).expect("json body");
        (status, v)
    }

    const INSTRUCTOR: &str = "mode=instructor&key=letmein";

    #[tokio::test]
    async fn healthz_is_ok() {
        let f = fixture();
        let (status, _) = send(&f.app, "GET", "/healthz", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn submit_flow_over_http() {
        let f = fixture();
        let (status, _) = send_json(
            &f.app,
            "POST",
            &format!("/api/instructor.advance?{INSTRUCTOR}"),
            r#"{"questionId": "Q1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, v) = send_json(
            &f.app,
            "POST",
            "/api/responses.submit?student=S1",
            r#"{"questionId": "Q1", "answer": "A"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["result"]["status"], "accepted");

        let (_, v) = send_json(
            &f.app,
            "POST",
            "/api/responses.submit?student=s1",
            r#"{"questionId": "Q1", "answer": "B"}"#,
        )
        .await;
        assert_eq!(v["result"]["status"], "already_submitted");

        let (_, v) = send_json(&f.app, "GET", "/api/view?student=s1", "").await;
        assert_eq!(v["result"]["question"]["questionId"], "Q1");
        assert_eq!(v["result"]["alreadySubmitted"], true);
    }

    #[tokio::test]
    async fn wrong_passcode_gets_student_view_and_403_on_actions() {
        let f = fixture();
        let (status, v) = send_json(&f.app, "GET", "/api/view?mode=instructor&key=nope", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["result"]["role"], "student");
        assert_eq!(v["result"]["instructorLocked"], true);

        let (status, v) = send_json(
            &f.app,
            "POST",
            "/api/instructor.advance?mode=instructor&key=nope",
            r#"{"questionId": "Q1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(v["error"]["code"], "instructor_required");

        let (status, _) = send(&f.app, "GET", "/export/L1", "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn export_downloads_csv() {
        let f = fixture();
        send_json(
            &f.app,
            "POST",
            &format!("/api/instructor.advance?{INSTRUCTOR}"),
            r#"{"questionId": "Q1"}"#,
        )
        .await;
        for s in ["a", "b"] {
            send_json(
                &f.app,
                "POST",
                &format!("/api/responses.submit?student={s}"),
                r#"{"questionId": "Q1", "answer": "B"}"#,
            )
            .await;
        }

        let req = HttpRequest::builder()
            .uri(format!("/export/L1?{INSTRUCTOR}"))
            .body(Body::empty())
            .expect("request");
        let resp = f.app.clone().oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"responses_L1.csv\""
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("timestamp,course,lecture,student_id"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_requests() {
        let f = fixture();
        let (status, v) = send_json(&f.app, "POST", "/api/responses.submit", "{nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"]["code"], "bad_json");

        let (status, v) = send_json(&f.app, "POST", "/api/does.not.exist", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v["error"]["code"], "not_implemented");
    }

    #[tokio::test]
    async fn store_recovers_once_the_data_dir_is_usable() {
        let root = std::env::temp_dir().join(format!("participationd-http-late-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).expect("root");
        // A plain file where the data directory should be.
        let dir = root.join("data");
        std::fs::write(&dir, b"not a directory").expect("blocker");
        let app = router(Shared {
            data_dir: dir.clone(),
            config: Arc::new(Config::for_tests(dir.clone())),
            catalog: Arc::new(flow::tests::sample_catalog()),
        });

        let (status, v) = send_json(&app, "GET", "/api/view?student=s1", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(v["error"]["code"], "database_unavailable");

        std::fs::remove_file(&dir).expect("remove blocker");
        let (status, v) = send_json(&app, "GET", "/api/view?student=s1", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["result"]["studentId"], "s1");
        assert!(db::db_path(&dir).exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn export_never_writes_files_over_http() {
        let f = fixture();
        let target = f.dir.join("written_over_http.csv");
        let body = json!({ "lecture": "L1", "outPath": target.to_string_lossy() }).to_string();
        let (status, v) = send_json(
            &f.app,
            "POST",
            &format!("/api/export.lectureCsv?{INSTRUCTOR}"),
            &body,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"]["code"], "bad_params");
        assert!(!target.exists());

        let (status, v) = send_json(
            &f.app,
            "POST",
            &format!("/api/export.lectureCsv?{INSTRUCTOR}"),
            r#"{"lecture": "L1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["result"]["rowsExported"], 0);
    }

    #[test]
    fn export_file_names_are_header_safe() {
        assert_eq!(safe_file_name("lecture_01"), "responses_lecture_01.csv");
        assert_eq!(safe_file_name("a\"b c"), "responses_a_b_c.csv");
    }
}
