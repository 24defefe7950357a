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

//! Parsing and validation of the request bodies that describe a car.

use crate::driver::MISSING_FIELDS_MESSAGE;
use crate::model::{CarFields, CarUpdate};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{StatusCode, header};
use garage_core::rest::{RestError, RestResult};
use serde::Deserialize;

/// A numeric field that clients may send either as a JSON number or as a string.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum LooseNumber {
    /// A native JSON number.
    Number(serde_json::Number),

    /// Textual representation of a number, as sent by forms.
    Text(String),
}

impl LooseNumber {
    /// Returns true if the value is zero or empty, which is treated as not provided.
    fn is_blank(&self) -> bool {
        match self {
            LooseNumber::Number(n) => n.as_f64() == Some(0.0),
            LooseNumber::Text(s) => s.is_empty(),
        }
    }

    /// Interprets the value as a finite floating point number.
    fn to_f64(&self) -> Option<f64> {
        let value = match self {
            LooseNumber::Number(n) => n.as_f64(),
            LooseNumber::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|v| v.is_finite())
    }

    /// Interprets the value as an integer that fits in an `i32`.
    fn to_i32(&self) -> Option<i32> {
        match self {
            LooseNumber::Number(n) => match n.as_i64() {
                Some(v) => i32::try_from(v).ok(),
                None => n
                    .as_f64()
                    .filter(|v| v.fract() == 0.0)
                    .filter(|v| *v >= f64::from(i32::MIN) && *v <= f64::from(i32::MAX))
                    .map(|v| v as i32),
            },
            LooseNumber::Text(s) => s.trim().parse::<i32>().ok(),
        }
    }
}

/// A textual field that clients may also send as a JSON number or boolean.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum LooseText {
    /// A native string.
    Text(String),

    /// A number, stored in its textual form.
    Number(serde_json::Number),

    /// A boolean, stored in its textual form.
    Bool(bool),
}

impl From<LooseText> for String {
    fn from(value: LooseText) -> Self {
        match value {
            LooseText::Text(s) => s,
            LooseText::Number(n) => n.to_string(),
            LooseText::Bool(b) => b.to_string(),
        }
    }
}

/// Validates a provided `year`.
fn parse_year(year: &LooseNumber) -> RestResult<i32> {
    year.to_i32().ok_or_else(|| RestError::InvalidRequest("Year must be an integer".to_owned()))
}

/// Validates a provided `kilometerage`.
fn parse_kilometerage(kilometerage: &LooseNumber) -> RestResult<f64> {
    kilometerage
        .to_f64()
        .ok_or_else(|| RestError::InvalidRequest("Kilometerage must be a number".to_owned()))
}

/// Returns true if the textual `value` was provided and is not empty.
fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// Returns true if the numeric `value` was provided and is not zero or empty.
fn is_present_number(value: &Option<LooseNumber>) -> bool {
    value.as_ref().is_some_and(|n| !n.is_blank())
}

/// Drops numbers sent as empty strings, which cannot be stored in a numeric column.
fn non_empty_number(value: Option<LooseNumber>) -> Option<LooseNumber> {
    value.filter(|n| !matches!(n, LooseNumber::Text(s) if s.is_empty()))
}

/// Raw contents of a request that creates or updates a car, before validation.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub(crate) struct CarRequest {
    /// License plate.
    #[serde(default)]
    plate: Option<LooseText>,

    /// Manufacturer.
    #[serde(default)]
    make: Option<LooseText>,

    /// Model name.
    #[serde(default)]
    model: Option<LooseText>,

    /// Year of manufacture.
    #[serde(default)]
    year: Option<LooseNumber>,

    /// Accumulated distance.
    #[serde(default)]
    kilometerage: Option<LooseNumber>,

    /// Link to a picture of the car.
    #[serde(default)]
    image_url: Option<LooseText>,
}

impl CarRequest {
    /// Validates the request as the contents of a new car.
    ///
    /// `plate`, `make`, `model` and `year` are required and cannot be empty or zero.  A missing,
    /// empty or zero `kilometerage` defaults to 0.
    pub(crate) fn into_fields(self) -> RestResult<CarFields> {
        let (plate, make, model, year) = match (
            self.plate.map(String::from).filter(|s| !s.is_empty()),
            self.make.map(String::from).filter(|s| !s.is_empty()),
            self.model.map(String::from).filter(|s| !s.is_empty()),
            self.year.filter(|n| !n.is_blank()),
        ) {
            (Some(plate), Some(make), Some(model), Some(year)) => (plate, make, model, year),
            _ => return Err(RestError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_owned())),
        };

        let kilometerage = match self.kilometerage.filter(|n| !n.is_blank()) {
            Some(kilometerage) => parse_kilometerage(&kilometerage)?,
            None => 0.0,
        };
        let year = parse_year(&year)?;

        Ok(CarFields::new(plate, make, model, year, kilometerage, self.image_url.map(String::from)))
    }

    /// Validates the request as the replacement contents of an existing car.
    ///
    /// At least one field must be provided with a non-empty, non-zero value.  The fields are then
    /// stored as sent, and those that are not provided are cleared.
    pub(crate) fn into_update(self) -> RestResult<CarUpdate> {
        let plate = self.plate.map(String::from);
        let make = self.make.map(String::from);
        let model = self.model.map(String::from);
        let image_url = self.image_url.map(String::from);

        if !is_present(&plate)
            && !is_present(&make)
            && !is_present(&model)
            && !is_present_number(&self.year)
            && !is_present_number(&self.kilometerage)
            && !is_present(&image_url)
        {
            return Err(RestError::InvalidRequest("No data to update".to_owned()));
        }

        let kilometerage =
            non_empty_number(self.kilometerage).as_ref().map(parse_kilometerage).transpose()?;
        let year = non_empty_number(self.year).as_ref().map(parse_year).transpose()?;

        Ok(CarUpdate::new(plate, make, model, year, kilometerage, image_url))
    }
}

/// Extractor for the body of requests that describe a car.
///
/// Accepts JSON and URL-encoded form payloads.  Any other payload, including an empty one, is
/// treated as a request with no fields.
pub(crate) struct CarBody(pub(crate) CarRequest);

#[async_trait]
impl<S> FromRequest<S> for CarBody
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok());

        let body = match Bytes::from_request(req, state).await {
            Ok(body) => body,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(RestError::InvalidRequest("Request body too large".to_owned()));
            }
            Err(e) => {
                return Err(RestError::InvalidRequest(format!(
                    "Invalid request body: {}",
                    e.body_text()
                )));
            }
        };
        if body.is_empty() {
            return Ok(CarBody(CarRequest::default()));
        }

        let request = match content_type {
            Some(mime) if is_json(&mime) => serde_json::from_slice(&body)?,
            Some(mime) if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.as_ref() => {
                serde_urlencoded::from_bytes(&body).map_err(|e| {
                    RestError::InvalidRequest(format!("Invalid request body: {}", e))
                })?
            }
            _ => CarRequest::default(),
        };
        Ok(CarBody(request))
    }
}

/// Returns true if `mime` describes a JSON document.
fn is_json(mime: &mime::Mime) -> bool {
    mime.type_() == mime::APPLICATION
        && (mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON))
}
