use axum::http::StatusCode;
use std::sync::Arc;
use tower::util::ServiceExt;
use vaultsync::api::{self, AppState};
use vaultsync::clock::ManualClock;
use vaultsync::datasource::{DataSourceError, MockDataSource, MutationRequest, ReadKind};
use vaultsync::domain::{
    AccountPosition, Address, Decimal, EpochStatus, RiskTier, TimeMs, VaultMetrics,
};
use vaultsync::sync::{SyncEngine, SyncSettings, TransactionService};
use vaultsync::Fetcher;

const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

struct TestApp {
    app: axum::Router,
    mock: Arc<MockDataSource>,
    engine: Arc<SyncEngine>,
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn setup_test_app() -> TestApp {
    let alice = Address::new(ALICE.to_string());
    let mock = Arc::new(
        MockDataSource::new()
            .with_epoch_status(EpochStatus {
                epoch_number: 12,
                time_remaining: 7_200,
                yield_pool: d("4"),
                participant_count: 2,
            })
            .with_vault_metrics(VaultMetrics {
                total_value_locked: d("1000"),
                total_users: 2,
                total_supply: d("1000"),
                management_fee: 200,
                performance_fee: 2000,
                assets_count: 1,
                total_principal: d("1000"),
                total_yield_generated: Decimal::zero(),
                total_yield_distributed: Decimal::zero(),
            })
            .with_position(
                &alice,
                AccountPosition {
                    share_balance: d("1000"),
                    last_mutation_time: 1_700_000_000,
                    withdrawal_requested: false,
                    withdrawal_available_at: 0,
                    risk_tier: RiskTier::Low,
                    total_deposited: d("1000"),
                },
            ),
    );
    let engine = Arc::new(SyncEngine::new(
        Fetcher::new(mock.clone(), 10),
        Arc::new(ManualClock::new(TimeMs::new(1_700_000_000_000))),
        SyncSettings::default(),
    ));
    let transactions = TransactionService::new(engine.clone(), mock.clone(), "FLOW");
    let app = api::create_router(AppState::new(engine.clone(), transactions));
    TestApp { app, mock, engine }
}

async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn connect(test_app: &TestApp) -> serde_json::Value {
    let (status, body) = request(
        test_app.app.clone(),
        "PUT",
        "/v1/account",
        Some(serde_json::json!({ "account": ALICE })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn decimal_at(json: &serde_json::Value, pointer: &str) -> Decimal {
    d(json.pointer(pointer).and_then(|v| v.as_str()).unwrap())
}

#[tokio::test]
async fn test_state_before_connecting() {
    let test_app = setup_test_app();
    let (status, body) = request(test_app.app.clone(), "GET", "/v1/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["account"].is_null());
    assert_eq!(body["initialLoading"], false);
    assert_eq!(body["hasUserDeposits"], false);
    assert!(body["lastSuccessfulFetchTime"].is_null());
}

#[tokio::test]
async fn test_ready_reports_starting_until_data_arrives() {
    let test_app = setup_test_app();
    let (_, body) = request(test_app.app.clone(), "GET", "/ready", None).await;
    assert_eq!(body["status"], "starting");

    connect(&test_app).await;
    let (status, body) = request(test_app.app.clone(), "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert!(body["lastSuccessfulFetchTime"].is_string());
}

#[tokio::test]
async fn test_put_account_returns_loaded_view() {
    let test_app = setup_test_app();
    let body = connect(&test_app).await;

    assert_eq!(body["account"], ALICE);
    assert_eq!(body["initialLoading"], false);
    assert_eq!(body["epochInfo"]["epochNumber"], 12);
    assert_eq!(
        decimal_at(&body, "/accountPosition/totalDeposited"),
        d("1000")
    );
    assert_eq!(body["hasUserDeposits"], true);
    // No deposit history yet, so nothing is cooking.
    assert!(body["cooking"].is_null());
}

#[tokio::test]
async fn test_put_account_rejects_bad_address() {
    let test_app = setup_test_app();
    let (status, body) = request(
        test_app.app.clone(),
        "PUT",
        "/v1/account",
        Some(serde_json::json!({ "account": "0x1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_optimistic_deposit_lifecycle() {
    let test_app = setup_test_app();

    let deposit = serde_json::json!({
        "amount": "500",
        "asset": "FLOW",
        "riskTier": "MEDIUM",
    });
    let (status, _) = request(
        test_app.app.clone(),
        "POST",
        "/v1/optimistic/deposit",
        Some(deposit.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    connect(&test_app).await;
    let (status, body) = request(
        test_app.app.clone(),
        "POST",
        "/v1/optimistic/deposit",
        Some(deposit),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let pending_id = body["pendingId"].as_str().unwrap().to_string();

    let (_, state) = request(test_app.app.clone(), "GET", "/v1/state", None).await;
    assert_eq!(
        decimal_at(&state, "/accountPosition/totalDeposited"),
        d("1500")
    );
    assert_eq!(state["accountPosition"]["riskTier"], "MEDIUM");
    assert_eq!(state["hasPendingOptimisticUpdates"], true);
    assert_eq!(state["pendingMutations"][0]["kind"]["type"], "deposit");

    let uri = format!("/v1/optimistic/{}", pending_id);
    let (status, _) = request(test_app.app.clone(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = request(test_app.app.clone(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, state) = request(test_app.app.clone(), "GET", "/v1/state", None).await;
    assert_eq!(
        decimal_at(&state, "/accountPosition/totalDeposited"),
        d("1000")
    );
    assert_eq!(state["hasPendingOptimisticUpdates"], false);
}

#[tokio::test]
async fn test_transaction_validation_and_rejection() {
    let test_app = setup_test_app();
    connect(&test_app).await;

    let (status, _) = request(
        test_app.app.clone(),
        "POST",
        "/v1/transactions/deposit",
        Some(serde_json::json!({ "amount": "-1", "riskTier": "LOW" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    test_app
        .mock
        .fail_submissions(DataSourceError::Rejected("user denied".to_string()));
    let (status, body) = request(
        test_app.app.clone(),
        "POST",
        "/v1/transactions/claim",
        Some(serde_json::json!({ "epochNumber": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("user denied"));
    assert!(test_app.engine.view().pending_mutations.is_empty());
}

#[tokio::test]
async fn test_native_deposit_is_accepted() {
    let test_app = setup_test_app();
    connect(&test_app).await;
    test_app.mock.hold_settlements();

    let (status, body) = request(
        test_app.app.clone(),
        "POST",
        "/v1/transactions/deposit",
        Some(serde_json::json!({ "amount": "2.5", "riskTier": "AGGRESSIVE" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["txHash"].as_str().unwrap().starts_with("0x"));
    assert!(body["pendingId"].is_string());
    assert_eq!(
        test_app.engine.view().account_position.unwrap().total_deposited,
        d("1002.5")
    );
}

#[tokio::test]
async fn test_token_deposit_carries_token_decimals() {
    let test_app = setup_test_app();
    connect(&test_app).await;
    test_app.mock.hold_settlements();
    let usdc = "0x0000000000000000000000000000000000000c0c";

    for body in [
        serde_json::json!({ "asset": usdc, "amount": "1.5", "decimals": 6, "riskTier": "LOW" }),
        serde_json::json!({ "asset": usdc, "amount": "1", "riskTier": "LOW" }),
    ] {
        let (status, _) = request(
            test_app.app.clone(),
            "POST",
            "/v1/transactions/deposit",
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let decimals: Vec<u32> = test_app
        .mock
        .submitted()
        .into_iter()
        .map(|req| match req {
            MutationRequest::Deposit { decimals, .. } => decimals,
            other => panic!("unexpected request: {:?}", other),
        })
        .collect();
    assert_eq!(decimals, vec![6, 18]);
}

#[tokio::test]
async fn test_refresh_failure_maps_to_bad_gateway() {
    let test_app = setup_test_app();
    connect(&test_app).await;

    let (status, body) = request(test_app.app.clone(), "POST", "/v1/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");

    test_app.mock.fail_reads(ReadKind::Position);
    let (status, body) = request(test_app.app.clone(), "POST", "/v1/refresh", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("refresh failed"));
}

#[tokio::test]
async fn test_dismissing_unknown_notification_is_not_found() {
    let test_app = setup_test_app();
    let (status, _) = request(
        test_app.app.clone(),
        "DELETE",
        "/v1/notifications/99",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = test_app.engine.notify("Transaction failed");
    let uri = format!("/v1/notifications/{}", id);
    let (status, _) = request(test_app.app.clone(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
