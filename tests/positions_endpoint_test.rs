use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use yieldledger::api;
use yieldledger::datasource::MockDataSource;
use yieldledger::db::init_db;
use yieldledger::domain::{
    PoolReserves, PositionKey, PositionType, PriceRatio, TimeMs, TokenUnit, TrackedPosition,
    WalletAddress,
};
use yieldledger::engine::Reconciler;
use yieldledger::orchestration::ReportService;
use yieldledger::Repository;

const DAY_MS: i64 = 86_400_000;

struct TestApp {
    app: axum::Router,
    reconciler: Reconciler,
    _temp: TempDir,
}

async fn setup_test_app(datasource: Arc<MockDataSource>) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let reports = Arc::new(ReportService::new(
        repo.clone(),
        datasource.clone(),
        datasource,
    ));
    let app = api::create_router(api::AppState::new(repo.clone(), reports));

    TestApp {
        app,
        reconciler: Reconciler::new(repo),
        _temp: temp_dir,
    }
}

fn lp() -> TrackedPosition {
    TrackedPosition {
        key: PositionKey::new(
            WalletAddress::new("addr_api".to_string()),
            TokenUnit::new("lp01".to_string()),
        ),
        protocol: "minswap".to_string(),
        market: "NIGHT/ADA".to_string(),
        position_type: PositionType::Lp,
        pool_id: Some("pool1".to_string()),
        token_decimals: 0,
    }
}

fn supply() -> TrackedPosition {
    TrackedPosition {
        key: PositionKey::new(
            WalletAddress::new("addr_api".to_string()),
            TokenUnit::new("qADA".to_string()),
        ),
        protocol: "liqwid".to_string(),
        market: "ADA".to_string(),
        position_type: PositionType::Supply,
        pool_id: None,
        token_decimals: 6,
    }
}

/// Observation times relative to now so that holding periods are positive.
fn days_ago(days: i64) -> TimeMs {
    TimeMs::new(TimeMs::now().as_ms() - days * DAY_MS)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app(Arc::new(MockDataSource::new())).await;

    let (status, body) = get_json(&test_app.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&test_app.app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_positions_report_lp_and_lending() {
    let mock = MockDataSource::new()
        .with_reserves("pool1", PoolReserves::new(4_000, 1_000).with_total_supply(4_000))
        .with_apr("minswap", "NIGHT/ADA", 20.0)
        .with_apr("liqwid", "ADA", 3.5)
        .with_exchange_rate("liqwid", "ADA", 0.02);
    let test_app = setup_test_app(Arc::new(mock)).await;

    test_app
        .reconciler
        .reconcile(&lp(), 1_000, PriceRatio::new(1.0), days_ago(30))
        .await
        .unwrap();
    test_app
        .reconciler
        .reconcile(&supply(), 50_000_000, None, days_ago(10))
        .await
        .unwrap();

    let (status, body) = get_json(&test_app.app, "/v1/positions?wallet=addr_api").await;
    assert_eq!(status, StatusCode::OK);
    let positions = body["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 2);

    let lp = &positions[0];
    assert_eq!(lp["positionType"], "lp");
    assert_eq!(lp["status"], "active");
    assert_eq!(lp["daysHeld"], 30);
    assert_eq!(lp["amount"], "1000");
    assert!((lp["ilPct"].as_f64().unwrap() + 20.0).abs() < 1e-9);
    assert_eq!(lp["poolSharePct"].as_f64().unwrap(), 25.0);
    assert_eq!(lp["currentPriceRatio"].as_f64().unwrap(), 4.0);
    let net = lp["netGainLossPct"].as_f64().unwrap();
    let expected = lp["actualYieldPct"].as_f64().unwrap() + lp["ilPct"].as_f64().unwrap();
    assert!((net - expected).abs() < 1e-12);

    let lending = &positions[1];
    assert_eq!(lending["positionType"], "supply");
    assert!(lending["ilPct"].is_null());
    assert_eq!(lending["currentValue"].as_f64().unwrap(), 1.0);
    assert_eq!(lending["daysHeld"], 10);
}

#[tokio::test]
async fn test_positions_report_marks_unavailable_fields() {
    // no reserves or APR configured: every market lookup fails
    let test_app = setup_test_app(Arc::new(MockDataSource::new())).await;
    test_app
        .reconciler
        .reconcile(&lp(), 1_000, PriceRatio::new(1.5), days_ago(3))
        .await
        .unwrap();

    let (status, body) = get_json(&test_app.app, "/v1/positions?wallet=addr_api").await;
    assert_eq!(status, StatusCode::OK);
    let lp = &body["positions"][0];
    assert_eq!(lp["actualApr"], "unavailable");
    assert_eq!(lp["ilPct"], "unavailable");
    assert_eq!(lp["currentValue"], "unavailable");
    assert_eq!(lp["entryPriceRatio"].as_f64().unwrap(), 1.5);
}

#[tokio::test]
async fn test_closed_positions_hidden_by_default() {
    let test_app = setup_test_app(Arc::new(MockDataSource::new())).await;
    let target = supply();
    test_app
        .reconciler
        .reconcile(&target, 100, None, days_ago(5))
        .await
        .unwrap();
    test_app
        .reconciler
        .reconcile(&target, 0, None, days_ago(1))
        .await
        .unwrap();

    let (_, body) = get_json(&test_app.app, "/v1/positions?wallet=addr_api").await;
    assert!(body["positions"].as_array().unwrap().is_empty());

    let (_, body) = get_json(
        &test_app.app,
        "/v1/positions?wallet=addr_api&includeClosed=true",
    )
    .await;
    let positions = body["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0]["status"], "closed");
    assert_eq!(positions[0]["events"][0]["eventType"], "withdrawal");
}

#[tokio::test]
async fn test_position_events_endpoint() {
    let test_app = setup_test_app(Arc::new(MockDataSource::new())).await;
    let target = lp();
    test_app
        .reconciler
        .reconcile(&target, 1_000, PriceRatio::new(1.0), days_ago(4))
        .await
        .unwrap();
    test_app
        .reconciler
        .reconcile(&target, 3_000, PriceRatio::new(2.0), days_ago(2))
        .await
        .unwrap();
    test_app
        .reconciler
        .reconcile(&target, 2_500, PriceRatio::new(2.0), days_ago(1))
        .await
        .unwrap();

    let (status, body) = get_json(
        &test_app.app,
        "/v1/positions/events?wallet=addr_api&tokenUnit=lp01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["eventType"], "deposit");
    assert_eq!(events[0]["amountChange"], "2000");
    assert_eq!(events[1]["eventType"], "withdrawal");
    assert_eq!(events[1]["amountAfter"], "2500");
    assert!(events[1]["priceRatioAtEvent"].is_null());
}

#[tokio::test]
async fn test_bad_requests() {
    let test_app = setup_test_app(Arc::new(MockDataSource::new())).await;

    let (status, _) = get_json(&test_app.app, "/v1/positions").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get_json(&test_app.app, "/v1/positions?wallet=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("wallet"));

    let (status, _) = get_json(
        &test_app.app,
        "/v1/positions/events?wallet=addr_api&tokenUnit=missing",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_frozen_unreadable_position_still_listed() {
    let mock = MockDataSource::new().with_exchange_rate("liqwid", "ADA", 0.02);
    let test_app = setup_test_app(Arc::new(mock)).await;
    let target = supply();
    test_app
        .reconciler
        .reconcile(&target, 100, None, days_ago(5))
        .await
        .unwrap();
    sqlx::query("UPDATE positions SET last_known_amount = '-40' WHERE token_unit = 'qADA'")
        .execute(test_app.reconciler.repo().pool())
        .await
        .unwrap();
    assert!(test_app
        .reconciler
        .reconcile(&target, 100, None, days_ago(1))
        .await
        .is_err());

    let (status, body) = get_json(&test_app.app, "/v1/positions?wallet=addr_api").await;
    assert_eq!(status, StatusCode::OK);
    let positions = body["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 1);
    let frozen = &positions[0];
    assert_eq!(frozen["status"], "frozen");
    assert_eq!(frozen["positionType"], "supply");
    assert_eq!(frozen["amount"], "-40");
    assert!(frozen["frozenReason"].as_str().unwrap().contains("last_known_amount"));
    assert_eq!(frozen["currentValue"], "unavailable");
    assert_eq!(frozen["actualYieldPct"], "unavailable");
    assert!(frozen["ilPct"].is_null());
}
