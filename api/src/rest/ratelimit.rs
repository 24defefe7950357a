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

//! Fixed-window rate limiting of requests per client address.

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use garage_core::clocks::Clock;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;

/// Error message returned to clients that exceed their quota.
const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests, please try again later.";

/// Number of tracked clients above which expired windows are purged.
const PURGE_THRESHOLD: usize = 10 * 1024;

/// Key used for requests whose peer address is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

/// Header carrying the maximum number of requests per window.
const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");

/// Header carrying the number of requests left in the current window.
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");

/// Header carrying the number of seconds until the current window ends.
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Body of the responses to requests rejected due to rate limiting.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct RateLimitedResponse {
    /// Always false for this type.
    pub(crate) success: bool,

    /// Textual representation of the error message.
    pub(crate) error: String,

    /// Length of the rate limiting window, in minutes.
    #[serde(rename = "retryAfter")]
    pub(crate) retry_after: u64,
}

/// Requests issued by a single client within the current window.
struct Window {
    /// Time when the window started.
    start: OffsetDateTime,

    /// Number of requests seen so far, including rejected ones.
    hits: u32,
}

/// Outcome of accounting for a request.
#[derive(Debug, PartialEq)]
pub(crate) struct Quota {
    /// Whether the request is within the quota.
    pub(crate) allowed: bool,

    /// Number of requests left in the current window.
    pub(crate) remaining: u32,

    /// Time left until the current window ends.
    pub(crate) reset: Duration,
}

/// Tracks the number of requests issued by each client in fixed time windows.
pub(crate) struct RateLimiter {
    /// Clock used to delimit windows.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Length of every window.
    window: Duration,

    /// Maximum number of requests allowed per client and window.
    max: u32,

    /// Active windows keyed by client.
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Creates a new rate limiter that allows `max` requests per `window`.
    pub(crate) fn new(clock: Arc<dyn Clock + Send + Sync>, window: Duration, max: u32) -> Self {
        Self { clock, window, max, windows: Mutex::new(HashMap::new()) }
    }

    /// Computes how much of the window that started at `start` has elapsed at `now`, or `None`
    /// if the window is over.
    fn elapsed(&self, start: OffsetDateTime, now: OffsetDateTime) -> Option<Duration> {
        match Duration::try_from(now - start) {
            Ok(elapsed) if elapsed < self.window => Some(elapsed),
            _ => None,
        }
    }

    /// Accounts for a new request from `client` and checks if it fits within the quota.
    pub(crate) fn check(&self, client: &str) -> Quota {
        let now = self.clock.now_utc();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= PURGE_THRESHOLD {
            windows.retain(|_, window| self.elapsed(window.start, now).is_some());
        }

        let window = windows.entry(client.to_owned()).or_insert(Window { start: now, hits: 0 });
        let elapsed = match self.elapsed(window.start, now) {
            Some(elapsed) => elapsed,
            None => {
                *window = Window { start: now, hits: 0 };
                Duration::ZERO
            }
        };
        window.hits = window.hits.saturating_add(1);

        Quota {
            allowed: window.hits <= self.max,
            remaining: self.max.saturating_sub(window.hits),
            reset: self.window - elapsed,
        }
    }

    /// Adds the headers that describe `quota` to `headers`.
    fn add_headers(&self, headers: &mut HeaderMap, quota: &Quota) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.max));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(quota.reset)));
    }
}

/// Converts `d` to seconds, rounding up.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Middleware that rejects requests from clients that exceeded their quota.
pub(crate) async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_owned(),
    };

    let quota = limiter.check(&client);
    let mut response = if quota.allowed {
        next.run(request).await
    } else {
        warn!("Rate limit exceeded for client {}", client);
        let body = RateLimitedResponse {
            success: false,
            error: TOO_MANY_REQUESTS_MESSAGE.to_owned(),
            retry_after: ceil_secs(limiter.window).div_ceil(60),
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(ceil_secs(quota.reset)));
        response
    };
    limiter.add_headers(response.headers_mut(), &quota);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use garage_core::clocks::testutils::SettableClock;
    use time::macros::datetime;

    /// Creates a rate limiter for tests along with the clock that controls it.
    fn setup(window: Duration, max: u32) -> (Arc<SettableClock>, RateLimiter) {
        let clock = Arc::new(SettableClock::new(datetime!(2024-03-01 10:00:00 UTC)));
        let limiter = RateLimiter::new(clock.clone(), window, max);
        (clock, limiter)
    }

    #[test]
    fn test_check_within_quota() {
        let (clock, limiter) = setup(Duration::from_secs(60), 3);

        assert_eq!(
            Quota { allowed: true, remaining: 2, reset: Duration::from_secs(60) },
            limiter.check("a")
        );
        clock.advance(Duration::from_secs(10));
        assert_eq!(
            Quota { allowed: true, remaining: 1, reset: Duration::from_secs(50) },
            limiter.check("a")
        );
        assert_eq!(
            Quota { allowed: true, remaining: 0, reset: Duration::from_secs(50) },
            limiter.check("a")
        );
    }

    #[test]
    fn test_check_over_quota_until_window_ends() {
        let (clock, limiter) = setup(Duration::from_secs(60), 1);

        assert!(limiter.check("a").allowed);
        clock.advance(Duration::from_secs(59));
        assert_eq!(
            Quota { allowed: false, remaining: 0, reset: Duration::from_secs(1) },
            limiter.check("a")
        );

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            Quota { allowed: true, remaining: 0, reset: Duration::from_secs(60) },
            limiter.check("a")
        );
    }

    #[test]
    fn test_check_clients_are_independent() {
        let (_clock, limiter) = setup(Duration::from_secs(60), 1);

        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(limiter.check(UNKNOWN_CLIENT).allowed);
    }

    #[test]
    fn test_check_purges_expired_windows() {
        let (clock, limiter) = setup(Duration::from_secs(60), 1);

        for i in 0..PURGE_THRESHOLD {
            limiter.check(&format!("client-{}", i));
        }
        assert_eq!(PURGE_THRESHOLD, limiter.windows.lock().unwrap().len());

        clock.advance(Duration::from_secs(60));
        limiter.check("new");
        assert_eq!(1, limiter.windows.lock().unwrap().len());
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(0, ceil_secs(Duration::ZERO));
        assert_eq!(1, ceil_secs(Duration::from_millis(1)));
        assert_eq!(15 * 60, ceil_secs(Duration::from_secs(15 * 60)));
    }
}
