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

//! Middleware and fallbacks shared by all routes.

use crate::options::Environment;
use axum::Json;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use garage_core::rest::{DetailedErrorResponse, INTERNAL_ERROR_MESSAGE, InternalErrorDetail, RestError};
use log::info;
use std::any::Any;

/// Error message returned for requests that do not match any route.
const ROUTE_NOT_FOUND_MESSAGE: &str = "Route not found";

/// Handler for requests that do not match any route or method.
pub(crate) async fn not_found() -> RestError {
    RestError::NotFound(ROUTE_NOT_FOUND_MESSAGE.to_owned())
}

/// Middleware that logs every incoming request.
pub(crate) async fn log_request(request: Request, next: Next) -> Response {
    info!("{} {}", request.method(), request.uri().path());
    next.run(request).await
}

/// Middleware that rewrites internal errors to include their details, except in production.
pub(crate) async fn expose_error_details(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if environment == Environment::Production {
        return response;
    }

    match response.extensions_mut().remove::<InternalErrorDetail>() {
        Some(InternalErrorDetail(stack)) => {
            let body = DetailedErrorResponse {
                success: false,
                error: INTERNAL_ERROR_MESSAGE.to_owned(),
                stack,
            };
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}

/// Converts a panic raised by a handler into an internal error response.
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "Unknown panic payload".to_owned()
    };
    RestError::InternalError(format!("Handler panicked: {}", detail)).into_response()
}
