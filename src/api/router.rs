use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    http::header::{HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::api::{handlers, submissions};
use crate::core::{config::Settings, metrics, state::AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stub application: `/`, `/healthz`, optional `/metrics` and the grading API under `/api`.
pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();
    let mut app: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest("/api", submissions::router(settings));

    if settings.telemetry().prometheus_enabled {
        app = app.route("/metrics", get(handlers::metrics));
    }

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "stub_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id
        )
    });

    app.route_layer(middleware::from_fn(track_requests))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(trace)
        .layer(cors_layer(settings))
        .with_state(state)
}

/// Per-route counters and latency, labelled by the matched route template so
/// submission ids do not explode label cardinality.
async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;
    let latency = started.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(%method, %route, status = status.as_u16(), "Stub request failed");
    } else if status.is_client_error() && status != StatusCode::NOT_FOUND {
        tracing::info!(%method, %route, status = status.as_u16(), "Stub request rejected");
    }

    metrics::record_http_response(method, route, status.as_u16(), latency);
    response
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, ORIGIN, HeaderName::from_static(REQUEST_ID_HEADER)])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    layer.allow_credentials(true).allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    use crate::core::{config::Settings, metrics};
    use crate::services::grader::AnswerKey;
    use crate::test_support;

    #[tokio::test]
    async fn root_lists_endpoints() {
        let settings = test_support::test_settings().await;
        let app = test_support::stub_router(test_support::stub_state(settings, AnswerKey::default()));

        let response =
            app.oneshot(test_support::empty_request(Method::GET, "/")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = test_support::read_json(response).await;
        assert_eq!(json["message"], "Olympiad tutor grading stub");
        assert_eq!(json["endpoints"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn healthz_reports_store_counts() {
        let settings = test_support::test_settings().await;
        let state = test_support::stub_state(settings, AnswerKey::from_pairs([(1, "2")]));
        state.store().upsert_submission(1, "alice").await;
        let app = test_support::stub_router(state);

        let response =
            app.oneshot(test_support::empty_request(Method::GET, "/healthz")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = test_support::read_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["submissions"], "1");
        assert_eq!(json["components"]["answer_key"], "1");
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let settings = test_support::test_settings().await;
        let app = test_support::stub_router(test_support::stub_state(settings, AnswerKey::default()));

        let response =
            app.oneshot(test_support::empty_request(Method::GET, "/metrics")).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_returns_200() {
        let settings = {
            let _guard = test_support::env_lock().await;
            test_support::set_test_env();
            std::env::set_var("PROMETHEUS_ENABLED", "1");
            let settings = Settings::load().expect("settings");
            std::env::set_var("PROMETHEUS_ENABLED", "0");
            settings
        };
        metrics::init(&settings).expect("metrics init");
        let app = test_support::stub_router(test_support::stub_state(settings, AnswerKey::default()));

        let response =
            app.oneshot(test_support::empty_request(Method::GET, "/metrics")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
