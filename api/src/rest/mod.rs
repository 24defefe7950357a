// Garage
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Entry point to the REST server.

use crate::driver::{CAR_NOT_FOUND_MESSAGE, Driver};
use crate::model::CarId;
use crate::options::ServiceOptions;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use garage_core::clocks::Clock;
use garage_core::rest::{RestError, RestResult};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::{CompressionLayer, CompressionLevel};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

mod body;
mod car_delete;
mod car_get;
mod car_put;
mod cars_get;
mod cars_make_get;
mod cars_post;
mod health_get;
mod middleware;
mod ratelimit;
#[cfg(test)]
mod testutils;

/// Compression level for response bodies.
const COMPRESSION_LEVEL: i32 = 6;

/// Parses the `id` path segment of a car.  Values that cannot identify a car are reported as
/// a missing car.
fn parse_car_id(id: &str) -> RestResult<CarId> {
    id.parse::<i64>()
        .ok()
        .and_then(|id| CarId::new(id).ok())
        .ok_or_else(|| RestError::NotFound(CAR_NOT_FOUND_MESSAGE.to_owned()))
}

/// Creates the layer that allows cross-origin requests from anywhere.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Adds the security-related headers to every response of `router`.
fn with_security_headers(router: Router) -> Router {
    let headers = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_XSS_PROTECTION, "0"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::X_DNS_PREFETCH_CONTROL, "off"),
        (header::REFERRER_POLICY, "no-referrer"),
    ];
    headers.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value)))
    })
}

/// Creates the router for the application.
pub(crate) fn app(
    driver: Driver,
    opts: &ServiceOptions,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Router {
    use axum::middleware::{from_fn, from_fn_with_state};
    use axum::routing::get;

    let cars = Router::new()
        .route(
            "/",
            get(cars_get::handler).post(cars_post::handler).fallback(middleware::not_found),
        )
        .route("/make/:make", get(cars_make_get::handler).fallback(middleware::not_found))
        .route(
            "/:id",
            get(car_get::handler)
                .put(car_put::handler)
                .delete(car_delete::handler)
                .fallback(middleware::not_found),
        )
        .with_state(driver);

    let health = Router::new()
        .route("/health", get(health_get::handler).fallback(middleware::not_found))
        .with_state(opts.environment);

    let rate_limiter =
        Arc::new(ratelimit::RateLimiter::new(clock, opts.rate_limit_window, opts.rate_limit_max));

    // Layers are listed from the innermost to the outermost.
    let mut router = Router::new()
        .nest("/cars", cars)
        .merge(health)
        .fallback(middleware::not_found)
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(from_fn_with_state(opts.environment, middleware::expose_error_details));
    if opts.log_requests {
        router = router.layer(from_fn(middleware::log_request));
    }
    let router = router
        .layer(from_fn_with_state(rate_limiter, ratelimit::rate_limit))
        .layer(
            CompressionLayer::new()
                .quality(CompressionLevel::Precise(COMPRESSION_LEVEL))
                .compress_when(SizeAbove::new(opts.compression_threshold)),
        )
        .layer(DefaultBodyLimit::max(opts.body_limit))
        .layer(cors_layer());
    with_security_headers(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Environment;
    use crate::rest::ratelimit::RateLimitedResponse;
    use crate::rest::testutils::*;
    use axum::extract::ConnectInfo;
    use axum::http::StatusCode;
    use garage_core::rest::testutils::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    #[test]
    fn test_parse_car_id() {
        assert_eq!(CarId::new(12).unwrap(), parse_car_id("12").unwrap());
        for raw in ["0", "-3", "abc", "1.5", "", "99999999999999999999"] {
            assert_eq!(
                RestError::NotFound("Car not found".to_owned()),
                parse_car_id(raw).unwrap_err(),
                "{}",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.into_app(), (http::Method::GET, "/trucks"))
            .send_empty()
            .await
            .expect_status(StatusCode::NOT_FOUND)
            .expect_error("^Route not found$")
            .await;
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::PATCH, "/cars/1"))
            .send_empty()
            .await
            .expect_status(StatusCode::NOT_FOUND)
            .expect_error("^Route not found$")
            .await;

        OneShotBuilder::new(context.into_app(), (http::Method::DELETE, "/cars"))
            .send_empty()
            .await
            .expect_status(StatusCode::NOT_FOUND)
            .expect_error("^Route not found$")
            .await;
    }

    #[tokio::test]
    async fn test_security_headers() {
        let context = TestContext::setup().await;

        let response = OneShotBuilder::new(context.into_app(), (http::Method::GET, "/health"))
            .send_empty()
            .await
            .take_response()
            .await;
        let headers = response.headers();
        assert_eq!("nosniff", headers["x-content-type-options"]);
        assert_eq!("0", headers["x-xss-protection"]);
        assert_eq!("SAMEORIGIN", headers["x-frame-options"]);
        assert_eq!("off", headers["x-dns-prefetch-control"]);
        assert_eq!("no-referrer", headers["referrer-policy"]);
        assert!(!headers.contains_key("x-powered-by"));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let context = TestContext::setup().await;

        let response = OneShotBuilder::new(context.into_app(), (http::Method::OPTIONS, "/cars"))
            .with_header(header::ORIGIN, "https://frontend.example.com")
            .with_header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .send_empty()
            .await
            .take_response()
            .await;
        let headers = response.headers();
        assert_eq!("*", headers[header::ACCESS_CONTROL_ALLOW_ORIGIN]);
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("PUT"), "{}", methods);
        assert!(methods.contains("DELETE"), "{}", methods);
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let opts = ServiceOptions { body_limit: 64, ..test_options() };
        let context = TestContext::setup_with(opts).await;

        let image_url = format!("https://example.com/{}", "x".repeat(128));
        OneShotBuilder::new(context.app(), (http::Method::POST, "/cars"))
            .send_json(serde_json::json!({
                "plate": "P", "make": "Seat", "model": "Ibiza", "year": 2010,
                "image_url": image_url,
            }))
            .await
            .expect_status(StatusCode::BAD_REQUEST)
            .expect_error("^Request body too large$")
            .await;

        assert_eq!(0, context.count_cars().await);
    }

    #[tokio::test]
    async fn test_compression_above_threshold() {
        let opts = ServiceOptions { compression_threshold: 16, ..test_options() };
        let context = TestContext::setup_with(opts).await;
        for i in 0..10 {
            context.create_car(&format!("P{}", i), "Toyota").await;
        }

        let response = OneShotBuilder::new(context.app(), (http::Method::GET, "/cars"))
            .with_header(header::ACCEPT_ENCODING, "gzip")
            .send_empty()
            .await
            .take_response()
            .await;
        assert_eq!("gzip", response.headers()[header::CONTENT_ENCODING]);

        let response = OneShotBuilder::new(context.into_app(), (http::Method::GET, "/cars"))
            .send_empty()
            .await
            .take_response()
            .await;
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let opts = ServiceOptions {
            rate_limit_max: 2,
            rate_limit_window: Duration::from_secs(15 * 60),
            ..test_options()
        };
        let context = TestContext::setup_with(opts).await;
        let client = ConnectInfo("192.0.2.1:5000".parse::<SocketAddr>().unwrap());
        let other = ConnectInfo("192.0.2.2:5000".parse::<SocketAddr>().unwrap());

        for remaining in ["1", "0"] {
            let response = OneShotBuilder::new(context.app(), (http::Method::GET, "/health"))
                .with_extension(client)
                .send_empty()
                .await
                .take_response()
                .await;
            assert_eq!("2", response.headers()["ratelimit-limit"]);
            assert_eq!(remaining, response.headers()["ratelimit-remaining"]);
        }

        let response = OneShotBuilder::new(context.app(), (http::Method::GET, "/health"))
            .with_extension(client)
            .send_empty()
            .await
            .expect_status(StatusCode::TOO_MANY_REQUESTS)
            .take_response()
            .await;
        assert_eq!("900", response.headers()[header::RETRY_AFTER]);
        assert_eq!("0", response.headers()["ratelimit-remaining"]);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(
            RateLimitedResponse {
                success: false,
                error: "Too many requests, please try again later.".to_owned(),
                retry_after: 15,
            },
            serde_json::from_slice::<RateLimitedResponse>(&body).unwrap()
        );

        OneShotBuilder::new(context.app(), (http::Method::GET, "/health"))
            .with_extension(other)
            .send_empty()
            .await
            .expect_status(StatusCode::OK)
            .verify();

        context.advance_clock(Duration::from_secs(15 * 60));
        OneShotBuilder::new(context.into_app(), (http::Method::GET, "/health"))
            .with_extension(client)
            .send_empty()
            .await
            .expect_status(StatusCode::OK)
            .verify();
    }

    #[tokio::test]
    async fn test_request_logging_disabled_still_serves() {
        let opts = ServiceOptions { log_requests: false, ..test_options() };
        let context = TestContext::setup_with(opts).await;

        OneShotBuilder::new(context.into_app(), (http::Method::GET, "/health"))
            .send_empty()
            .await
            .expect_status(StatusCode::OK)
            .verify();
    }

    #[tokio::test]
    async fn test_environment_is_reported() {
        let opts = ServiceOptions { environment: Environment::Production, ..test_options() };
        let context = TestContext::setup_with(opts).await;

        let response = OneShotBuilder::new(context.into_app(), (http::Method::GET, "/health"))
            .send_empty()
            .await
            .expect_json::<serde_json::Value>()
            .await;
        assert_eq!("production", response["environment"]);
    }
}
