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

//! API to delete a car.

use crate::driver::Driver;
use crate::model::Car;
use crate::rest::parse_car_id;
use axum::Json;
use axum::extract::{Path, State};
use garage_core::rest::{Envelope, RestResult};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    Path(id): Path<String>,
) -> RestResult<Json<Envelope<Car>>> {
    let id = parse_car_id(&id)?;
    let car = driver.delete_car(id).await?;
    Ok(Json(Envelope::data(car).with_message("Car deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use garage_core::rest::testutils::*;

    fn route<I: std::fmt::Display>(id: I) -> (http::Method, String) {
        (http::Method::DELETE, format!("/cars/{}", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let car1 = context.create_car("P1", "Toyota").await;
        let car2 = context.create_car("P2", "Ford").await;

        let response = OneShotBuilder::new(context.app(), route(car1.id()))
            .send_empty()
            .await
            .expect_envelope::<Car>()
            .await;
        assert_eq!(Some("Car deleted successfully"), response.message.as_deref());
        assert_eq!(Some(car1.clone()), response.data);

        assert_eq!(None, context.get_car(*car1.id()).await);
        assert_eq!(Some(car2.clone()), context.get_car(*car2.id()).await);

        OneShotBuilder::new(context.into_app(), (http::Method::GET, format!("/cars/{}", car1.id())))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Car not found$")
            .await;
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        let car = context.create_car("P1", "Toyota").await;

        OneShotBuilder::new(context.app(), route(999999))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Car not found$")
            .await;

        OneShotBuilder::new(context.app(), route("nope"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Car not found$")
            .await;

        assert_eq!(Some(car.clone()), context.get_car(*car.id()).await);
    }
}
