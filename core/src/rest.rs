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

//! Generic code for REST handlers.
//!
//! All services should implement an `app` function in this module that returns the `Router` for the
//! application.
//!
//! Every API should be put in its own `.rs` file, using a name like `<entity>_<method>.rs`.  This
//! may seem overkill, but putting every API in its own file makes it easy to ensure all the
//! integration tests for the given API truly belong to that API.
//!
//! More specifically, the `tests` module within an API should define a `route` method that
//! returns the HTTP method and the API path under test.  All integration tests within the module
//! then rely on `route` to obtain this information, ensuring that they all test the desired API.
//!
//! It is also useful for the tests in this layer to define a `TestContext` in a `testutils` module
//! that allows interacting with the database layer directly, using simplified types.
//!
//! Every response body is a JSON envelope with a `success` flag: successful responses use
//! `Envelope` and failed ones use `ErrorResponse`.

use crate::driver::DriverError;
use crate::model::ModelError;
use axum::Json;
use axum::response::IntoResponse;
use log::error;
use serde::{Deserialize, Serialize};

/// Message returned to clients on any unexpected failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Frontend errors.  These are the errors that are visible to the user on failed requests.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestError {
    /// Indicates that the request conflicts with the current state of an entity.
    #[error("{0}")]
    Conflict(String),

    /// Catch-all error type for all unexpected errors.  The message is logged but never sent to
    /// the client.
    #[error("{0}")]
    InternalError(String),

    /// Indicates an error in the contents of the request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Indicates that a requested entity does not exist.
    #[error("{0}")]
    NotFound(String),
}

impl From<DriverError> for RestError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::AlreadyExists(_) => RestError::Conflict(e.to_string()),
            DriverError::BackendError(_) => RestError::InternalError(e.to_string()),
            DriverError::InvalidInput(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::NotFound(_) => RestError::NotFound(e.to_string()),
        }
    }
}

impl From<ModelError> for RestError {
    fn from(e: ModelError) -> Self {
        RestError::InvalidRequest(e.to_string())
    }
}

impl From<serde_json::Error> for RestError {
    fn from(e: serde_json::Error) -> Self {
        RestError::InvalidRequest(format!("Invalid request body: {}", e))
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            RestError::Conflict(_) => http::StatusCode::CONFLICT,
            RestError::InternalError(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            RestError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            RestError::NotFound(_) => http::StatusCode::NOT_FOUND,
        };

        match self {
            RestError::InternalError(detail) => {
                error!("Request failed: {}", detail);
                let mut response =
                    (status, Json(ErrorResponse::new(INTERNAL_ERROR_MESSAGE))).into_response();
                response.extensions_mut().insert(InternalErrorDetail(detail));
                response
            }
            e => (status, Json(ErrorResponse::new(e.to_string()))).into_response(),
        }
    }
}

/// Result type for this module.
pub type RestResult<T> = Result<T, RestError>;

/// Envelope for successful responses.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope<T> {
    /// Always true for this type.
    pub success: bool,

    /// Payload of the response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Number of items in `data` when it is a collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    /// Human-readable summary of the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Creates a successful envelope carrying `data`.
    pub fn data(data: T) -> Self {
        Self { success: true, data: Some(data), count: None, message: None }
    }

    /// Creates a successful envelope carrying the collection `items` and their count.
    pub fn list(items: Vec<T>) -> Envelope<Vec<T>> {
        Envelope { success: true, count: Some(items.len()), data: Some(items), message: None }
    }

    /// Attaches a human-readable `message` to the envelope.
    pub fn with_message<M: Into<String>>(mut self, message: M) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Representation of the details of an error response.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// Always false for this type.
    pub success: bool,

    /// Textual representation of the error message.
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new error response with the given `error` message.
    pub fn new<E: Into<String>>(error: E) -> Self {
        Self { success: false, error: error.into() }
    }
}

/// Representation of an internal error response that exposes debugging details.
///
/// Only used outside of production deployments.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct DetailedErrorResponse {
    /// Always false for this type.
    pub success: bool,

    /// Textual representation of the error message.
    pub error: String,

    /// Internal details of the failure.
    pub stack: String,
}

/// Response extension that carries the internal details of a 500 response so that outer layers
/// can decide whether to expose them.
#[derive(Clone, Debug, PartialEq)]
pub struct InternalErrorDetail(pub String);

/// Common test code for the REST server.
#[cfg(feature = "testutils")]
pub mod testutils {
    use super::*;
    use axum::Router;
    use axum::extract::Request;
    use axum::http::{self, HeaderName, HeaderValue};
    use serde::de::DeserializeOwned;
    use tower::util::ServiceExt;

    /// Maximum body size for testing purposes.
    const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Builder for a single request to the API server.
    #[must_use]
    pub struct OneShotBuilder {
        /// The router for the app being tested.
        app: Router,

        /// Builder for the request that will be sent to the app.
        builder: axum::http::request::Builder,
    }

    impl OneShotBuilder {
        /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
        pub fn new<U: AsRef<str>>(app: Router, (method, uri): (http::Method, U)) -> Self {
            let builder = Request::builder().method(method).uri(uri.as_ref());
            Self { app, builder }
        }

        /// Sets the header `name` to `value` in the outgoing request.
        pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
        where
            HeaderName: TryFrom<K>,
            <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
            HeaderValue: TryFrom<V>,
            <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
        {
            self.builder = self.builder.header(name, value);
            self
        }

        /// Attaches `extension` to the outgoing request, as the server would do for things like
        /// the peer address.
        pub fn with_extension<T>(mut self, extension: T) -> Self
        where
            T: Clone + Send + Sync + 'static,
        {
            self.builder = self.builder.extension(extension);
            self
        }

        /// Finishes building the request and sends it with an empty payload.
        pub async fn send_empty(self) -> ResponseChecker {
            let request = self.builder.body(axum::body::Body::empty()).unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a text payload.
        pub async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(axum::body::Body::from(text.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a raw payload of the given
        /// `content_type`.
        pub async fn send_raw<B: Into<Vec<u8>>>(self, content_type: &str, body: B) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, content_type)
                .body(axum::body::Body::from(body.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a form encoded in the
        /// body as the payload.
        pub async fn send_form<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
                .body(axum::body::Body::from(serde_urlencoded::to_string(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a JSON payload.
        pub async fn send_json<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(axum::body::Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }
    }

    /// Type alias for the complex type returned by the `oneshot` function.
    type HttpResponse = hyper::Response<axum::body::Body>;

    /// Validator for the outcome of a request sent by a `OneShotBuilder`.
    #[must_use]
    pub struct ResponseChecker {
        /// Actual response that we received from the app.
        response: HttpResponse,

        /// Expected HTTP status code in the response above.
        exp_status: http::StatusCode,
    }

    impl From<HttpResponse> for ResponseChecker {
        fn from(response: HttpResponse) -> Self {
            Self { response, exp_status: http::StatusCode::OK }
        }
    }

    impl ResponseChecker {
        /// Sets the expected exit HTTP status to `status`.
        pub fn expect_status(mut self, status: http::StatusCode) -> Self {
            self.exp_status = status;
            self
        }

        /// Performs common validation operations on the response.
        pub fn verify(&self) {
            assert_eq!(self.exp_status, self.response.status());
        }

        /// Reads the whole body of the response after validating it.
        async fn take_body(self) -> bytes::Bytes {
            self.verify();
            axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap()
        }

        /// Finishes checking the response and expects its body to be an `ErrorResponse` whose
        /// message matches `exp_re`.
        pub async fn expect_error(self, exp_re: &str) {
            let body = self.take_body().await;
            let response: ErrorResponse = match serde_json::from_slice(&body) {
                Ok(response) => response,
                Err(e) => {
                    let body = String::from_utf8(body.to_vec()).unwrap();
                    panic!("Invalid error response due to {}; content was {}", e, body);
                }
            };
            assert!(!response.success, "Error response '{:?}' claims success", response);
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(
                re.is_match(&response.error),
                "Response content '{:?}' does not match re '{}'",
                response,
                exp_re
            );
        }

        /// Finishes checking the response and expects it to be a successful `Envelope` carrying
        /// a payload of type `T`.
        pub async fn expect_envelope<T: DeserializeOwned>(self) -> Envelope<T> {
            let envelope: Envelope<T> = self.expect_json().await;
            assert!(envelope.success, "Envelope does not report success");
            envelope
        }

        /// Finishes checking the response and expects it to contain a valid JSON object of
        /// type `T`.
        pub async fn expect_json<T: DeserializeOwned>(self) -> T {
            let body = self.take_body().await;
            match serde_json::from_slice::<T>(&body) {
                Ok(value) => value,
                Err(e) => {
                    let body = String::from_utf8(body.to_vec()).unwrap();
                    panic!("Invalid JSON response due to {}; content was {}", e, body);
                }
            }
        }

        /// Finishes checking the response and returns the response itself for out of band
        /// validation of properties not supported by the `ResponseChecker`.
        pub async fn take_response(self) -> HttpResponse {
            self.verify();

            self.response
        }
    }

    /// Generates a test to verify that an API that accepts a JSON payload rejects malformed
    /// documents.
    #[macro_export]
    macro_rules! test_payload_must_be_valid_json {
        ( $app:expr, $route:expr ) => {
            #[tokio::test]
            async fn test_payload_must_be_valid_json() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .send_raw("application/json", "this is not json")
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("Invalid request body: expected ident")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_valid_json;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    /// Consumes `response` and parses its body as JSON.
    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_rest_error_statuses() {
        for (err, status) in [
            (RestError::Conflict("dup".to_owned()), http::StatusCode::CONFLICT),
            (RestError::InvalidRequest("bad".to_owned()), http::StatusCode::BAD_REQUEST),
            (RestError::NotFound("gone".to_owned()), http::StatusCode::NOT_FOUND),
        ] {
            let message = err.to_string();
            let response = err.into_response();
            assert_eq!(status, response.status());
            assert!(response.extensions().get::<InternalErrorDetail>().is_none());
            assert_eq!(
                serde_json::json!({"success": false, "error": message}),
                body_json(response).await
            );
        }
    }

    #[tokio::test]
    async fn test_rest_error_internal_hides_detail() {
        let response = RestError::InternalError("connection refused".to_owned()).into_response();
        assert_eq!(http::StatusCode::INTERNAL_SERVER_ERROR, response.status());
        assert_eq!(
            Some(&InternalErrorDetail("connection refused".to_owned())),
            response.extensions().get::<InternalErrorDetail>()
        );
        assert_eq!(
            serde_json::json!({"success": false, "error": "Internal Server Error"}),
            body_json(response).await
        );
    }

    #[test]
    fn test_from_driver_error() {
        assert_eq!(
            RestError::Conflict("Plate already exists".to_owned()),
            DriverError::AlreadyExists("Plate already exists".to_owned()).into()
        );
        assert_eq!(
            RestError::InternalError("boom".to_owned()),
            DriverError::BackendError("boom".to_owned()).into()
        );
        assert_eq!(
            RestError::InvalidRequest("bad".to_owned()),
            DriverError::InvalidInput("bad".to_owned()).into()
        );
        assert_eq!(
            RestError::NotFound("Car not found".to_owned()),
            DriverError::NotFound("Car not found".to_owned()).into()
        );
    }

    #[test]
    fn test_envelope_serialization_skips_absent_fields() {
        assert_eq!(
            serde_json::json!({"success": true, "data": 5}),
            serde_json::to_value(Envelope::data(5)).unwrap()
        );
        assert_eq!(
            serde_json::json!({"success": true, "data": [1, 2], "count": 2}),
            serde_json::to_value(Envelope::<i32>::list(vec![1, 2])).unwrap()
        );
        assert_eq!(
            serde_json::json!({"success": true, "data": "x", "message": "Done"}),
            serde_json::to_value(Envelope::data("x").with_message("Done")).unwrap()
        );
    }

    /// Payload without a `Default` implementation.
    #[derive(Debug, Deserialize, PartialEq)]
    struct Opaque {
        /// Some value.
        value: u8,
    }

    #[test]
    fn test_envelope_deserialization_without_default_payload() {
        let envelope: Envelope<Opaque> =
            serde_json::from_value(serde_json::json!({"success": true, "data": {"value": 3}}))
                .unwrap();
        assert_eq!(Some(Opaque { value: 3 }), envelope.data);
        assert_eq!(None, envelope.count);
        assert_eq!(None, envelope.message);

        let envelope: Envelope<Opaque> =
            serde_json::from_value(serde_json::json!({"success": true})).unwrap();
        assert_eq!(None, envelope.data);
    }
}
