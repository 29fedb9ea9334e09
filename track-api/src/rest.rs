use crate::errors::{Error, Result};
use crate::metrics::{
    QUERIES_TOTAL, QUERY_LATENCY_SECONDS, RECORDS_SERVED_TOTAL, REJECTED_QUERIES_TOTAL,
};
use crate::model::{QueryResponse, SortOrder};
use crate::store::TrackStore;
use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
struct AppState {
    store: Arc<TrackStore>,
    api_token: Arc<str>,
}

#[derive(Debug, Deserialize)]
pub struct GpsQuery {
    imsi: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
    sort: Option<String>,
    limit: Option<usize>,
}

pub fn create_router(store: Arc<TrackStore>, api_token: &str) -> Router {
    let state = AppState {
        store,
        api_token: Arc::from(api_token),
    };

    Router::new()
        .route("/v1/gps-data", get(get_gps_data))
        .with_state(state)
}

async fn get_gps_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<GpsQuery>,
) -> Result<Json<QueryResponse>> {
    QUERIES_TOTAL.inc();
    let start = Instant::now();

    let result = answer(&state, &headers, params).await;
    match &result {
        Ok(response) => RECORDS_SERVED_TOTAL.inc_by(response.count as f64),
        Err(_) => REJECTED_QUERIES_TOTAL.inc(),
    }
    QUERY_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

    result.map(Json)
}

async fn answer(state: &AppState, headers: &HeaderMap, params: GpsQuery) -> Result<QueryResponse> {
    authorize(headers, &state.api_token)?;

    let imsi = params
        .imsi
        .filter(|imsi| !imsi.is_empty())
        .ok_or(Error::MissingDevice)?;

    let order = match params.sort.as_deref() {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(other) => {
            return Err(Error::InvalidParameter(format!(
                "sort must be asc or desc, got {}",
                other
            )))
        }
    };

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(Error::InvalidParameter("limit must be positive".to_string()));
    }
    let limit = limit.min(MAX_LIMIT);

    let items = state
        .store
        .query(&imsi, params.from, params.to, order, limit)
        .await;
    debug!(
        "Query imsi={} from={:?} to={:?} order={:?} limit={} -> {} records",
        imsi,
        params.from,
        params.to,
        order,
        limit,
        items.len()
    );

    Ok(QueryResponse {
        count: items.len(),
        scanned_count: items.len(),
        items,
    })
}

/// The token is compared verbatim, no scheme prefix
fn authorize(headers: &HeaderMap, api_token: &str) -> Result<()> {
    let presented = headers.get(AUTHORIZATION).ok_or(Error::MissingToken)?;
    if presented.as_bytes() == api_token.as_bytes() {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GpsPayload, StoredRecord};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const TOKEN: &str = "pass12345!";

    async fn router() -> Router {
        let store = Arc::new(TrackStore::new());
        let records = (0..30)
            .map(|i| StoredRecord {
                imsi: "440103123456789".to_string(),
                timestamp: 1_000 * (i + 1),
                payloads: GpsPayload {
                    lat: (i % 3 != 0).then_some(35.0),
                    lon: (i % 3 != 0).then_some(135.0),
                    bat: 3,
                    temp: 25.0,
                    humi: 50.0,
                    kind: 0,
                    rs: 4,
                },
            })
            .collect();
        store.insert_many(records).await;
        create_router(store, TOKEN)
    }

    async fn get(uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token);
        }
        let response = router()
            .await
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn timestamps(body: &Value) -> Vec<i64> {
        body["Items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["timestamp"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_newest_first_with_limit() {
        let (status, body) = get("/v1/gps-data?imsi=440103123456789&sort=desc&limit=3", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timestamps(&body), vec![30_000, 29_000, 28_000]);
        assert_eq!(body["Count"], 3);
    }

    #[tokio::test]
    async fn test_defaults() {
        let (status, body) = get("/v1/gps-data?imsi=440103123456789", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timestamps(&body).len(), DEFAULT_LIMIT);
        assert_eq!(timestamps(&body)[0], 30_000);
    }

    #[tokio::test]
    async fn test_upper_bound() {
        let (_, body) = get(
            "/v1/gps-data?imsi=440103123456789&sort=desc&limit=2&to=10500",
            Some(TOKEN),
        )
        .await;
        assert_eq!(timestamps(&body), vec![10_000, 9_000]);
    }

    #[tokio::test]
    async fn test_records_without_fix_omit_position() {
        let (_, body) = get("/v1/gps-data?imsi=440103123456789&limit=1&to=1000", Some(TOKEN)).await;
        let payloads = &body["Items"][0]["payloads"];
        assert!(payloads.get("lat").is_none());
        assert_eq!(payloads["type"], 0);
    }

    #[tokio::test]
    async fn test_missing_imsi() {
        let (status, body) = get("/v1/gps-data?limit=3", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "imsi needed");
    }

    #[tokio::test]
    async fn test_bad_sort_and_limit() {
        let (status, _) = get("/v1/gps-data?imsi=x&sort=sideways", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get("/v1/gps-data?imsi=x&limit=0", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authorization() {
        let (status, _) = get("/v1/gps-data?imsi=440103123456789", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = get("/v1/gps-data?imsi=440103123456789", Some("wrong")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["Message"].as_str().unwrap().contains("explicit deny"));
    }
}
