//! 解析サーバー呼び出しテスト
//!
//! axum でローカルサーバーを立て、multipart・認証ヘッダー・エラー分類・
//! タイムアウトを検証

use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use denticheck::acquisition::SelectedImage;
use denticheck::client::{AnalysisBackend, HttpBackend, Session, Tier};
use denticheck::error::DentiCheckError;
use denticheck_common::{DetectionLabel, QuickStatus, RiskLevel};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
struct Upload {
    field: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: usize,
    authorization: Option<String>,
    generate_pdf: Option<String>,
}

type Seen = Arc<Mutex<Vec<Upload>>>;

const QUICK_BODY: &str = r#"{"sessionId":"q-77","status":"done","detections":[{"label":"tartar","confidence":0.91,"bbox":{"x":10,"y":20,"w":30,"h":40}}]}"#;
const ANALYZE_BODY: &str = r#"{
    "sessionId": "f-77",
    "status": "done",
    "pdfUrl": "http://localhost:8080/reports/f-77.pdf",
    "detections": [{"label": "oral_cancer", "confidence": 0.6, "bbox": {"x": 0, "y": 0, "w": 5, "h": 5}}],
    "rag": {"topK": 3, "sources": [{"source": "guide", "score": 0.8, "snippet": "..."}], "usedFallback": false},
    "llmResult": {"riskLevel": "RED", "summary": "要受診", "findings": [], "careGuide": ["歯磨き"], "disclaimer": ["参考情報です"]}
}"#;

async fn record(seen: &Seen, headers: &HeaderMap, query: Option<String>, mut multipart: Multipart) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap().len();
        seen.lock().unwrap().push(Upload {
            field: name,
            file_name,
            content_type,
            bytes,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            generate_pdf: query.clone(),
        });
    }
}

async fn quick(State(seen): State<Seen>, headers: HeaderMap, multipart: Multipart) -> (StatusCode, String) {
    record(&seen, &headers, None, multipart).await;
    (StatusCode::OK, QUICK_BODY.to_string())
}

async fn analyze(
    State(seen): State<Seen>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> (StatusCode, String) {
    record(&seen, &headers, params.get("generatePdf").cloned(), multipart).await;
    (StatusCode::OK, ANALYZE_BODY.to_string())
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn analysis_server() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let router = Router::new()
        .route("/api/ai-check/quick", post(quick))
        .route("/api/ai-check/analyze", post(analyze))
        .with_state(Arc::clone(&seen));
    (spawn_server(router).await, seen)
}

/// 固定のステータスと本文を返すサーバー
async fn fixed_server(status: StatusCode, body: &'static str, delay: Duration) -> String {
    let handler = move || async move {
        tokio::time::sleep(delay).await;
        (status, body)
    };
    let router = Router::new()
        .route("/api/ai-check/quick", post(handler))
        .route("/api/ai-check/analyze", post(handler));
    spawn_server(router).await
}

fn sample_image(dir: &TempDir, name: &str, mime: &str) -> SelectedImage {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![0x89u8; 2048]).unwrap();
    SelectedImage {
        location: path,
        file_name: name.to_string(),
        mime_type: mime.to_string(),
    }
}

fn backend(base: &str, token: Option<&str>, quick_timeout: Duration) -> HttpBackend {
    HttpBackend::new(
        base,
        Session::new(token.map(str::to_string)),
        quick_timeout,
        Duration::from_secs(10),
    )
}

/// 簡易チェック: file フィールド・ファイル名・MIME・Bearer を送る
#[tokio::test]
async fn test_quick_sends_multipart_with_bearer() {
    let (base, seen) = analysis_server().await;
    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.png", "image/png");

    let result = backend(&base, Some("secret"), Duration::from_secs(5))
        .quick_check(&image, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.session_id, "q-77");
    assert_eq!(result.status, QuickStatus::Done);
    assert_eq!(result.detections[0].label, DetectionLabel::Tartar);
    assert_eq!(result.detections[0].bbox.width, 30.0);

    let uploads = seen.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].field, "file");
    assert_eq!(uploads[0].file_name.as_deref(), Some("mouth.png"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(uploads[0].bytes, 2048);
    assert_eq!(uploads[0].authorization.as_deref(), Some("Bearer secret"));
}

/// トークンがなければ Authorization ヘッダーを付けない
#[tokio::test]
async fn test_anonymous_request_has_no_authorization() {
    let (base, seen) = analysis_server().await;
    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.jpg", "image/jpeg");

    backend(&base, None, Duration::from_secs(5))
        .quick_check(&image, CancellationToken::new())
        .await
        .unwrap();

    assert!(seen.lock().unwrap()[0].authorization.is_none());
}

/// 本解析: generatePdf=true を付け、解釈ブロックまで読める
#[tokio::test]
async fn test_analyze_requests_pdf_generation() {
    let (base, seen) = analysis_server().await;
    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.jpg", "image/jpeg");

    let result = backend(&base, Some("secret"), Duration::from_secs(5))
        .analyze(&image, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.session_id, "f-77");
    assert_eq!(result.report_url(), Some("http://localhost:8080/reports/f-77.pdf"));
    assert_eq!(result.interpretation.risk_level, Some(RiskLevel::Red));
    assert_eq!(result.rag.top_k, 3);
    assert_eq!(result.detections[0].label, DetectionLabel::OralCancer);
    assert_eq!(seen.lock().unwrap()[0].generate_pdf.as_deref(), Some("true"));
}

/// 非2xx は HTTPステータス付きのエラー
#[tokio::test]
async fn test_http_error_status() {
    let base = fixed_server(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#, Duration::ZERO).await;
    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.jpg", "image/jpeg");

    let err = backend(&base, None, Duration::from_secs(5))
        .analyze(&image, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DentiCheckError::Http { status: 500 }));
    assert_eq!(err.to_string(), "リクエスト失敗 (HTTP 500)");
}

/// 空の本文・不正なJSONはステータス付きの「リクエスト失敗」
#[tokio::test]
async fn test_malformed_body() {
    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.jpg", "image/jpeg");

    for body in ["", "<html>oops</html>"] {
        let base = fixed_server(StatusCode::OK, body, Duration::ZERO).await;
        let err = backend(&base, None, Duration::from_secs(5))
            .quick_check(&image, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DentiCheckError::MalformedResponse { status: 200 }), "body: {:?}", body);
        assert_eq!(err.to_string(), "リクエスト失敗 (HTTP 200)");
    }
}

/// 期限切れはネットワークエラーではなくタイムアウトとして返る
#[tokio::test]
async fn test_timeout_is_distinct() {
    let base = fixed_server(StatusCode::OK, QUICK_BODY, Duration::from_secs(3)).await;
    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.jpg", "image/jpeg");
    let cancel = CancellationToken::new();

    let err = backend(&base, None, Duration::from_millis(200))
        .quick_check(&image, cancel.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, DentiCheckError::Timeout(Tier::Quick)));
    assert_eq!(err.to_string(), "簡易チェックがタイムアウトしました");
    assert!(cancel.is_cancelled());
}

/// 接続できない場合はネットワークエラー
#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let image = sample_image(&dir, "mouth.jpg", "image/jpeg");

    let err = backend(&format!("http://127.0.0.1:{}", port), None, Duration::from_secs(5))
        .quick_check(&image, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DentiCheckError::Network(_)));
}

/// 画像ファイルが読めなければ送信しない
#[tokio::test]
async fn test_missing_image_file() {
    let (base, seen) = analysis_server().await;
    let image = SelectedImage {
        location: "/nonexistent/denticheck/mouth.jpg".into(),
        file_name: "mouth.jpg".into(),
        mime_type: "image/jpeg".into(),
    };

    let err = backend(&base, None, Duration::from_secs(5))
        .quick_check(&image, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DentiCheckError::ImageLoad(_)));
    assert!(seen.lock().unwrap().is_empty());
}
