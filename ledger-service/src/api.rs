//! HTTP and WebSocket routes

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::auth_middleware::{authorize_bearer, terminal_auth, API_KEY_HEADER};
use crate::database::constants::CURRENT_SCHEMA_VERSION;
use crate::database::models::ElectionRecord;
use crate::error::{Error, Result};
use crate::metrics;
use crate::state::AppState;
use crate::types::{
    AuditResponse, CastRequest, CastResponse, CheckStatusRequest, ElectionDetail, StatusResponse,
};
use crate::utils::validate_election_id;

pub fn router(state: AppState) -> Router {
    let terminal = Router::new()
        .route("/vote/cast", post(cast_vote))
        .route("/vote/check-status", post(check_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), terminal_auth));

    let app = Router::new()
        .route("/healthz", get(health_check))
        .route("/meta", get(get_meta))
        .route("/metrics", get(get_metrics))
        .route("/election/{election_id}", get(get_election))
        .route("/dashboard/{election_id}", get(get_dashboard))
        .route("/audit/{election_id}", get(get_audit))
        .merge(terminal)
        .layer(TraceLayer::new_for_http());

    let app = match cors_layer(state.config.cors_allow_origin.as_deref()) {
        Some(cors) => app.layer(cors),
        None => app,
    };
    app.with_state(state)
}

fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin?;
    let layer = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(API_KEY_HEADER),
        ]);
    if origin == "*" {
        return Some(layer.allow_origin(tower_http::cors::Any));
    }
    match origin.parse::<header::HeaderValue>() {
        Ok(value) => Some(layer.allow_origin(value)),
        Err(_) => {
            warn!("Ignoring invalid CORS_ALLOW_ORIGIN {:?}", origin);
            None
        }
    }
}

async fn health_check() -> &'static str {
    "ok"
}

async fn get_meta(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": env!("LEDGER_BUILD_GIT_HASH"),
        "build_time_unix": env!("LEDGER_BUILD_TIME_UNIX"),
        "schema_version": CURRENT_SCHEMA_VERSION,
        "active_sessions": state.hub.session_count(),
    }))
}

async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    authorize_bearer(&headers, state.config.metrics_auth_token.as_deref())?;
    Ok(Json(metrics::snapshot_as_json(&state.config.db_path)))
}

async fn cast_vote(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CastRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CastResponse>)> {
    let Json(request) = payload?;
    info!("POST /vote/cast - election {}", request.election_id);

    let entry = state
        .orchestrator
        .cast_vote(&request.election_id, &request.voter_credential, request.votes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CastResponse {
            status: "success",
            message: "Vote cast and confirmed.",
            vote_id: entry.vote_id(),
            current_hash: entry.current_hash().to_string(),
        }),
    ))
}

async fn check_status(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckStatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let Json(request) = payload?;
    info!("POST /vote/check-status - election {}", request.election_id);

    state
        .orchestrator
        .check_status(&request.election_id, &request.voter_credential)
        .await?;

    Ok(Json(StatusResponse {
        status: "success",
        message: "Voter is valid and clear to vote.",
    }))
}

async fn get_election(
    State(state): State<AppState>,
    Path(election_id): Path<String>,
) -> Result<Json<ElectionDetail>> {
    validate_election_id(&election_id)?;
    let (election, schema) = state
        .registry
        .active_election(&election_id)
        .await
        .map_err(|err| match err {
            Error::Eligibility(_) => Error::election_not_found(&election_id),
            other => other,
        })?;

    Ok(Json(ElectionDetail {
        name: election.name,
        election_id: election.election_id,
        positions_json: schema,
    }))
}

/// Snapshot JSON for plain requests; a live feed for WebSocket upgrades.
async fn get_dashboard(
    State(state): State<AppState>,
    Path(election_id): Path<String>,
    request: Request,
) -> Response {
    if let Err(err) = validate_election_id(&election_id) {
        return err.into_response();
    }

    let (mut parts, _body) = request.into_parts();
    if !is_websocket_upgrade(&parts.headers) {
        return match state.hub.snapshot_for(&election_id).await {
            Ok(snapshot) => Json(snapshot).into_response(),
            Err(err) => err.into_response(),
        };
    }

    match ElectionRecord::get(state.store.pool(), &election_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Error::election_not_found(&election_id).into_response(),
        Err(err) => return Error::from(err).into_response(),
    }

    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws.on_upgrade(move |socket| dashboard_socket(socket, state, election_id)),
        Err(rejection) => rejection.into_response(),
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

async fn dashboard_socket(socket: WebSocket, state: AppState, election_id: String) {
    let mut session = state.hub.open_session();
    let (mut sink, mut stream) = socket.split();

    if let Err(err) = state.hub.subscribe(&election_id, &mut session).await {
        info!("Dashboard subscription to {} refused: {}", election_id, err);
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            delivery = session.recv() => {
                let Some(delivery) = delivery else { break };
                let text = match serde_json::to_string(delivery.as_ref()) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("Could not encode snapshot: {}", err);
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            // Clients only ever send close and ping frames
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unsubscribe(&mut session);
    debug!("Dashboard session {} for {} ended", session.id(), election_id);
}

async fn get_audit(
    State(state): State<AppState>,
    Path(election_id): Path<String>,
) -> Result<Json<AuditResponse>> {
    validate_election_id(&election_id)?;
    if ElectionRecord::get(state.store.pool(), &election_id)
        .await?
        .is_none()
    {
        return Err(Error::election_not_found(&election_id));
    }

    let report = state.store.verify_report(&election_id).await?;
    Ok(Json(AuditResponse {
        election_id,
        report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::seed::{apply_seed, SeedFile};

    const SEED: &str = r#"{
        "elections": [
            {
                "election_id": "E1",
                "name": "Student Council",
                "positions": {"President": ["Alice", "Bob"], "VP": ["Dana", "Charlie"]},
                "voters": ["card-1", "card-2"]
            },
            {
                "election_id": "closed",
                "name": "Closed",
                "is_active": false,
                "positions": {"Chair": ["Zed"]}
            }
        ]
    }"#;

    async fn app(api_key: Option<&str>) -> Router {
        let mut config = Config::in_memory();
        config.terminal_api_key = api_key.map(str::to_string);
        config.metrics_auth_token = Some("metrics-token".into());
        let (state, _worker) = AppState::initialize(config).await.unwrap();
        let seed: SeedFile = serde_json::from_str(SEED).unwrap();
        apply_seed(state.store.pool(), &seed).await.unwrap();
        router(state)
    }

    fn post_json(uri: &str, body: Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn cast_body(credential: &str, president: &str) -> Value {
        json!({
            "election_id": "E1",
            "voter_credential": credential,
            "votes": {"President": president}
        })
    }

    #[tokio::test]
    async fn test_cast_then_duplicate() {
        let app = app(None).await;

        let (status, body) = send(&app, post_json("/vote/cast", cast_body("card-1", "Alice"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Vote cast and confirmed.");
        assert_eq!(body["vote_id"], 1);

        let (status, body) = send(&app, post_json("/vote/cast", cast_body("card-1", "Bob"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "error");

        let (status, body) = send(&app, get("/dashboard/E1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ledger"].as_array().unwrap().len(), 1);
        assert_eq!(body["tally"][0]["votes"], 1);
    }

    #[tokio::test]
    async fn test_cast_rejections() {
        let app = app(None).await;

        let (status, _) = send(&app, post_json("/vote/cast", cast_body("stranger", "Alice"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, post_json("/vote/cast", cast_body("card-1", "Mallory"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, post_json("/vote/cast", json!({"election_id": "E1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        // The rejected ballot must not have consumed the voter
        let (status, _) = send(
            &app,
            post_json(
                "/vote/check-status",
                json!({"election_id": "E1", "voter_credential": "card-1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_terminal_routes_require_api_key() {
        let app = app(Some("terminal-key")).await;

        let (status, _) = send(&app, post_json("/vote/cast", cast_body("card-1", "Alice"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = post_json("/vote/cast", cast_body("card-1", "Alice"));
        request
            .headers_mut()
            .insert(API_KEY_HEADER, "terminal-key".parse().unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);

        // Read-only routes stay public
        let (status, _) = send(&app, get("/election/E1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_election_detail_only_for_active_elections() {
        let app = app(None).await;

        let (status, body) = send(&app, get("/election/E1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Student Council");
        let positions: Vec<_> = body["positions_json"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(positions, ["President", "VP"]);

        let (status, _) = send(&app, get("/election/closed")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get("/election/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_audit_and_dashboard_lookups() {
        let app = app(None).await;
        send(&app, post_json("/vote/cast", cast_body("card-1", "Alice"))).await;
        send(&app, post_json("/vote/cast", cast_body("card-2", "Bob"))).await;

        let (status, body) = send(&app, get("/audit/E1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["election_id"], "E1");
        assert_eq!(body["valid"], true);
        assert_eq!(body["total_entries"], 2);

        let (status, _) = send(&app, get("/audit/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get("/dashboard/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get("/dashboard/bad%20slug")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_requires_bearer_token() {
        let app = app(None).await;

        let (status, _) = send(&app, get("/metrics")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = axum::http::Request::get("/metrics")
            .header(header::AUTHORIZATION, "Bearer metrics-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_object());

        let (status, body) = send(&app, get("/meta")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schema_version"], CURRENT_SCHEMA_VERSION);
    }
}
