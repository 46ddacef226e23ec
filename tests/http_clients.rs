use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use fx_forecast::{
    CurrencyPair, DateRange, ExchangeRatesProvider, FetchError, ForecastPipeline, ForecastPoint,
    ForecastService, ForecastStore, MarketDataProvider, PipelineSettings, ProviderConfig,
    RestStore, RestStoreConfig, StoreError, TraderMadeProvider,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const MARKET_KEY: &str = "md-key";
const BACKEND_KEY: &str = "backend-key";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn march_range() -> DateRange {
    DateRange::new(march(1), march(10))
}

// --- TraderMade mock ---

async fn tradermade_records(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if params.get("api_key").map(String::as_str) != Some(MARKET_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "invalid key"})));
    }
    if params.get("format").map(String::as_str) != Some("records")
        || params.get("fields").map(String::as_str) != Some("ohlc")
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "bad format"})));
    }
    if params.get("currency").map(String::as_str) == Some("XAUUSD") {
        return (StatusCode::OK, Json(json!([])));
    }

    let records: Vec<Value> = (0..10)
        .map(|i| {
            let mid = 1.08 + 0.001 * i as f64;
            json!({
                "date": format!("2024-03-{:02}", i + 1),
                "open": mid,
                "high": mid + 0.002,
                "low": mid - 0.002,
                "close": mid,
            })
        })
        .collect();
    (StatusCode::OK, Json(Value::Array(records)))
}

fn tradermade_app() -> Router {
    Router::new().route("/api/v1/pandasDF", get(tradermade_records))
}

#[tokio::test]
async fn tradermade_fetches_ohlc_records() {
    let base = serve(tradermade_app()).await;
    let provider =
        TraderMadeProvider::with_config(ProviderConfig::new(MARKET_KEY).with_base_url(base)).unwrap();

    let series = provider
        .fetch_daily_series(&CurrencyPair::new("EURUSD").unwrap(), &march_range())
        .await
        .unwrap();

    assert_eq!(series.len(), 10);
    assert_eq!(series[0].date, march(1));
    assert_eq!(series[0].fields.len(), 4);
    assert!((series[9].average().unwrap() - 1.089).abs() < 1e-12);
}

#[tokio::test]
async fn tradermade_non_success_status_is_reported() {
    let base = serve(tradermade_app()).await;
    let provider =
        TraderMadeProvider::with_config(ProviderConfig::new("wrong").with_base_url(base)).unwrap();

    let result = provider
        .fetch_daily_series(&CurrencyPair::new("EURUSD").unwrap(), &march_range())
        .await;
    assert_eq!(result, Err(FetchError::Status(401)));
}

#[tokio::test]
async fn tradermade_empty_array_is_empty_series() {
    let base = serve(tradermade_app()).await;
    let provider =
        TraderMadeProvider::with_config(ProviderConfig::new(MARKET_KEY).with_base_url(base)).unwrap();

    let series = provider
        .fetch_daily_series(&CurrencyPair::new("XAUUSD").unwrap(), &march_range())
        .await
        .unwrap();
    assert!(series.is_empty());
}

// --- Exchange-rates mock ---

async fn exchange_rates(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let key = headers.get("apikey").and_then(|v| v.to_str().ok());
    if key != Some(MARKET_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "No API key found"})));
    }
    assert_eq!(params.get("base").map(String::as_str), Some("EUR"));
    assert_eq!(params.get("symbols").map(String::as_str), Some("USD"));
    assert_eq!(params.get("start_date").map(String::as_str), Some("2024-03-01"));

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "timeseries": true,
            "base": "EUR",
            "rates": {
                "2024-03-03": {"USD": 1.0850},
                "2024-03-01": {"USD": 1.0830},
                "2024-03-02": {"USD": 1.0841}
            }
        })),
    )
}

#[tokio::test]
async fn exchange_rates_sends_header_key_and_sorts_dates() {
    let base = serve(Router::new().route("/timeseries", get(exchange_rates))).await;
    let provider =
        ExchangeRatesProvider::with_config(ProviderConfig::new(MARKET_KEY).with_base_url(base))
            .unwrap();

    let series = provider
        .fetch_daily_series(&CurrencyPair::new("EURUSD").unwrap(), &march_range())
        .await
        .unwrap();

    let dates: Vec<NaiveDate> = series.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![march(1), march(2), march(3)]);
    assert_eq!(series[1].fields, vec![1.0841]);
}

#[tokio::test]
async fn exchange_rates_missing_key_is_status_error() {
    let base = serve(Router::new().route("/timeseries", get(exchange_rates))).await;
    let provider =
        ExchangeRatesProvider::with_config(ProviderConfig::new("").with_base_url(base)).unwrap();

    let result = provider
        .fetch_daily_series(&CurrencyPair::new("EURUSD").unwrap(), &march_range())
        .await;
    assert_eq!(result.unwrap_err().status(), Some(401));
}

// --- PostgREST mock ---

#[derive(Default)]
struct Backend {
    requests: Vec<Value>,
    forecasts: Vec<Value>,
}

type Shared = Arc<Mutex<Backend>>;

fn authorized(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let bearer = format!("Bearer {}", BACKEND_KEY);
    header("apikey") == Some(BACKEND_KEY) && header("authorization") == Some(bearer.as_str())
}

fn eq_filter<'a>(params: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    params.get(column).and_then(|v| v.strip_prefix("eq."))
}

async fn list_requests(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let only_pending = params.get("processed").map(String::as_str) == Some("not.is.true");
    let backend = backend.lock().unwrap();
    let rows: Vec<Value> = backend
        .requests
        .iter()
        .filter(|row| !only_pending || row["processed"] != json!(true))
        .cloned()
        .collect();
    Ok(Json(Value::Array(rows)))
}

async fn update_request(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Some(id) = eq_filter(&params, "id").and_then(|v| v.parse::<i64>().ok()) else {
        return StatusCode::BAD_REQUEST;
    };
    let mut backend = backend.lock().unwrap();
    for row in backend.requests.iter_mut().filter(|row| row["id"] == json!(id)) {
        row["processed"] = body["processed"].clone();
    }
    StatusCode::NO_CONTENT
}

async fn list_forecasts(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let currency = eq_filter(&params, "currency").map(str::to_string);
    let backend = backend.lock().unwrap();
    let mut rows: Vec<Value> = backend
        .forecasts
        .iter()
        .filter(|row| currency.as_deref().map_or(true, |c| row["currency"] == json!(c)))
        .cloned()
        .collect();
    rows.sort_by(|a, b| a["date"].as_str().cmp(&b["date"].as_str()));
    Ok(Json(Value::Array(rows)))
}

async fn delete_forecasts(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Some(currency) = eq_filter(&params, "currency") else {
        return StatusCode::BAD_REQUEST;
    };
    let target = json!(currency);
    backend
        .lock()
        .unwrap()
        .forecasts
        .retain(|row| row["currency"] != target);
    StatusCode::NO_CONTENT
}

async fn insert_forecasts(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    backend.lock().unwrap().forecasts.extend(rows);
    StatusCode::CREATED
}

fn backend_app(backend: Shared) -> Router {
    Router::new()
        .route("/rest/v1/UserInputs", get(list_requests).patch(update_request))
        .route(
            "/rest/v1/forecast_results",
            get(list_forecasts)
                .delete(delete_forecasts)
                .post(insert_forecasts),
        )
        .with_state(backend)
}

fn request_row(id: i64, currency: &str, processed: bool) -> Value {
    json!({
        "id": id,
        "currency": currency,
        "startdate": "2024-03-01",
        "enddate": "2024-03-10",
        "processed": processed,
        "created_at": "2024-03-11T08:00:00+00:00"
    })
}

#[tokio::test]
async fn rest_store_round_trip() {
    let backend: Shared = Arc::default();
    backend.lock().unwrap().requests = vec![
        request_row(1, "EURUSD", true),
        request_row(2, "GBPUSD", false),
    ];
    let base = serve(backend_app(backend.clone())).await;
    let store = RestStore::new(RestStoreConfig::new(base, BACKEND_KEY)).unwrap();

    let pending = store.pending_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, 2);
    assert_eq!(pending[0].start_date, "2024-03-01");

    let mut unset = request_row(3, "USDJPY", false);
    unset["processed"] = Value::Null;
    backend.lock().unwrap().requests.push(unset);
    let pending = store.pending_requests().await.unwrap();
    let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert!(!pending[1].processed);
    backend.lock().unwrap().requests.pop();

    let old = vec![ForecastPoint::new("GBPUSD", march(1), 1.26)];
    let new = vec![
        ForecastPoint::new("GBPUSD", march(2), 1.27),
        ForecastPoint::new("GBPUSD", march(3), 1.28),
    ];
    store.replace_forecast("GBPUSD", &old).await.unwrap();
    store.replace_forecast("GBPUSD", &new).await.unwrap();
    assert_eq!(store.forecast_for("GBPUSD").await.unwrap(), new);

    store.mark_processed(2).await.unwrap();
    assert!(store.pending_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rest_store_rejected_key_is_status_error() {
    let backend: Shared = Arc::default();
    let base = serve(backend_app(backend)).await;
    let store = RestStore::new(RestStoreConfig::new(base, "anon")).unwrap();

    match store.pending_requests().await {
        Err(StoreError::Status { status, .. }) => assert_eq!(status, 401),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn service_runs_against_http_backends() {
    let backend: Shared = Arc::default();
    backend.lock().unwrap().requests = vec![
        request_row(1, "EURUSD", false),
        request_row(2, "XAUUSD", false),
    ];
    let store_url = serve(backend_app(backend.clone())).await;
    let market_url = serve(tradermade_app()).await;

    let provider =
        TraderMadeProvider::with_config(ProviderConfig::new(MARKET_KEY).with_base_url(market_url))
            .unwrap();
    let store = RestStore::new(RestStoreConfig::new(store_url, BACKEND_KEY)).unwrap();
    let pipeline =
        ForecastPipeline::new(Arc::new(provider), Arc::new(store), PipelineSettings::default())
            .unwrap();
    let mut service = ForecastService::new(pipeline);

    let report = service.run_once().await.unwrap();
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.skipped.len(), 1);

    let backend = backend.lock().unwrap();
    assert_eq!(backend.requests[0]["processed"], json!(true));
    assert_eq!(backend.requests[1]["processed"], json!(false));

    assert_eq!(backend.forecasts.len(), 2);
    assert_eq!(backend.forecasts[0]["date"], json!("2024-03-09"));
    assert_eq!(backend.forecasts[1]["date"], json!("2024-03-10"));
    let first = backend.forecasts[0]["value"].as_f64().unwrap();
    let second = backend.forecasts[1]["value"].as_f64().unwrap();
    assert!((first - 1.090).abs() < 1e-6);
    assert!((second - 1.091).abs() < 1e-6);
}
