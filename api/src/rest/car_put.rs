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

//! API to update a car.

use crate::driver::Driver;
use crate::model::Car;
use crate::rest::body::CarBody;
use crate::rest::parse_car_id;
use axum::Json;
use axum::extract::{Path, State};
use garage_core::rest::{Envelope, RestResult};

/// API handler.
///
/// The update replaces all fields of the car: any field not present in the request is cleared.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    Path(id): Path<String>,
    CarBody(request): CarBody,
) -> RestResult<Json<Envelope<Car>>> {
    let update = request.into_update()?;
    let id = parse_car_id(&id)?;
    let car = driver.update_car(id, update).await?;
    Ok(Json(Envelope::data(car).with_message("Car updated successfully")))
}
