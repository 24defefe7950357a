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

//! Extends the driver with the operations on individual cars.

use crate::db;
use crate::driver::{CAR_NOT_FOUND_MESSAGE, Driver, MISSING_FIELDS_MESSAGE};
use crate::model::{Car, CarId, CarUpdate};
use garage_core::db::DbError;
use garage_core::driver::{DriverError, DriverResult};

/// Error message returned when updating a car to a plate that is already in use.
const DUPLICATE_PLATE_MESSAGE: &str = "Plate already exists";

impl Driver {
    /// Gets the car identified by `id`.
    pub(crate) async fn get_car(self, id: CarId) -> DriverResult<Car> {
        match db::get_car(&mut self.db.ex().await?, id).await? {
            Some(car) => Ok(car),
            None => Err(DriverError::NotFound(CAR_NOT_FOUND_MESSAGE.to_owned())),
        }
    }

    /// Overwrites all editable fields of the car identified by `id` with `update` and returns
    /// the car as stored after the update.
    pub(crate) async fn update_car(self, id: CarId, update: CarUpdate) -> DriverResult<Car> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        if db::get_car(tx.ex(), id).await?.is_none() {
            return Err(DriverError::NotFound(CAR_NOT_FOUND_MESSAGE.to_owned()));
        }

        let car = match db::update_car(tx.ex(), id, &update, now).await {
            Ok(Some(car)) => car,
            Ok(None) => return Err(DriverError::NotFound(CAR_NOT_FOUND_MESSAGE.to_owned())),
            Err(DbError::AlreadyExists) => {
                return Err(DriverError::AlreadyExists(DUPLICATE_PLATE_MESSAGE.to_owned()));
            }
            Err(DbError::MissingValue(_)) => {
                return Err(DriverError::InvalidInput(MISSING_FIELDS_MESSAGE.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(car)
    }

    /// Deletes the car identified by `id` and returns its last known state.
    pub(crate) async fn delete_car(self, id: CarId) -> DriverResult<Car> {
        match db::delete_car(&mut self.db.ex().await?, id).await? {
            Some(car) => Ok(car),
            None => Err(DriverError::NotFound(CAR_NOT_FOUND_MESSAGE.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;

    #[tokio::test]
    async fn test_get_car_ok() {
        let context = TestContext::setup().await;

        context.create_car("P1", "Toyota").await;
        let car = context.create_car("P2", "Ford").await;

        assert_eq!(car, context.driver().get_car(*car.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_car_not_found() {
        let context = TestContext::setup().await;

        let err = context.driver().get_car(CarId::new(5).unwrap()).await.unwrap_err();
        assert_eq!(DriverError::NotFound("Car not found".to_owned()), err);
    }

    #[tokio::test]
    async fn test_update_car_ok() {
        let context = TestContext::setup().await;

        let car = context.create_car("OLD", "Toyota").await;

        let update = CarUpdate::new(
            Some("NEW".to_owned()),
            Some("Ford".to_owned()),
            Some("Focus".to_owned()),
            Some(2012),
            None,
            Some("https://example.com/focus.png".to_owned()),
        );
        let updated = context.driver().update_car(*car.id(), update).await.unwrap();
        assert_eq!(car.id(), updated.id());
        assert_eq!("NEW", updated.plate());
        assert_eq!("Ford", updated.make());
        assert_eq!("Focus", updated.model());
        assert_eq!(2012, *updated.year());
        assert_eq!(None, *updated.kilometerage());
        assert_eq!(Some("https://example.com/focus.png"), updated.image_url().as_deref());
        assert_eq!(car.created_at(), updated.created_at());
        assert!(updated.updated_at() > car.updated_at());

        assert_eq!(updated, context.driver().get_car(*car.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_car_not_found() {
        let context = TestContext::setup().await;

        let update = CarUpdate::from(test_fields("P", "Seat"));
        let err = context.driver().update_car(CarId::new(999999).unwrap(), update).await.unwrap_err();
        assert_eq!(DriverError::NotFound("Car not found".to_owned()), err);

        assert_eq!(0, db::count_cars(&mut context.ex().await).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_car_duplicate_plate() {
        let context = TestContext::setup().await;

        context.create_car("TAKEN", "Toyota").await;
        let car = context.create_car("MINE", "Ford").await;

        let update = CarUpdate::from(test_fields("TAKEN", "Ford"));
        let err = context.driver().update_car(*car.id(), update).await.unwrap_err();
        assert_eq!(DriverError::AlreadyExists("Plate already exists".to_owned()), err);

        assert_eq!(car, context.driver().get_car(*car.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_car_missing_required_field() {
        let context = TestContext::setup().await;

        let car = context.create_car("P", "Toyota").await;

        let update = CarUpdate::new(None, None, None, None, Some(10.0), None);
        let err = context.driver().update_car(*car.id(), update).await.unwrap_err();
        assert_eq!(DriverError::InvalidInput(MISSING_FIELDS_MESSAGE.to_owned()), err);

        assert_eq!(car, context.driver().get_car(*car.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_car_ok() {
        let context = TestContext::setup().await;

        let car1 = context.create_car("P1", "Toyota").await;
        let car2 = context.create_car("P2", "Ford").await;

        assert_eq!(car1, context.driver().delete_car(*car1.id()).await.unwrap());

        let err = context.driver().get_car(*car1.id()).await.unwrap_err();
        assert_eq!(DriverError::NotFound("Car not found".to_owned()), err);
        assert_eq!(vec![car2], context.driver().get_cars().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_car_not_found() {
        let context = TestContext::setup().await;

        let err = context.driver().delete_car(CarId::new(1).unwrap()).await.unwrap_err();
        assert_eq!(DriverError::NotFound("Car not found".to_owned()), err);
    }
}
