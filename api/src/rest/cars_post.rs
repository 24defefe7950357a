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

//! API to create a new car.

use crate::driver::Driver;
use crate::model::Car;
use crate::rest::body::CarBody;
use axum::extract::State;
use axum::{Json, http};
use garage_core::rest::{Envelope, RestResult};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    CarBody(request): CarBody,
) -> RestResult<(http::StatusCode, Json<Envelope<Car>>)> {
    let fields = request.into_fields()?;
    let car = driver.create_car(fields).await?;
    let envelope = Envelope::data(car).with_message("Car created successfully");
    Ok((http::StatusCode::CREATED, Json(envelope)))
}
