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

//! Extends the driver with the operations on the collection of cars.

use crate::db;
use crate::driver::Driver;
use crate::model::{Car, CarFields};
use garage_core::db::{DbError, Executor};
use garage_core::driver::{DriverError, DriverResult};
use time::OffsetDateTime;

/// Error message returned when creating a car whose plate is already in use.
const DUPLICATE_PLATE_MESSAGE: &str = "Car with this plate already exists";

/// Inserts a car with the given `fields`, reporting a plate collision raised by the store as a
/// duplicate car.
async fn insert_car(ex: &mut Executor, fields: &CarFields, now: OffsetDateTime) -> DriverResult<Car> {
    match db::create_car(ex, fields, now).await {
        Ok(car) => Ok(car),
        Err(DbError::AlreadyExists) => {
            Err(DriverError::AlreadyExists(DUPLICATE_PLATE_MESSAGE.to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

impl Driver {
    /// Gets all cars, most recently created first.
    pub(crate) async fn get_cars(self) -> DriverResult<Vec<Car>> {
        let cars = db::get_cars(&mut self.db.ex().await?).await?;
        Ok(cars)
    }

    /// Gets all cars whose make contains `make`, ignoring case.
    pub(crate) async fn get_cars_by_make(self, make: &str) -> DriverResult<Vec<Car>> {
        let cars = db::get_cars_by_make(&mut self.db.ex().await?, make).await?;
        Ok(cars)
    }

    /// Creates a new car with the given `fields` and returns it as stored.
    pub(crate) async fn create_car(self, fields: CarFields) -> DriverResult<Car> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        if db::get_car_by_plate(tx.ex(), fields.plate()).await?.is_some() {
            return Err(DriverError::AlreadyExists(DUPLICATE_PLATE_MESSAGE.to_owned()));
        }

        let car = insert_car(tx.ex(), &fields, now).await?;

        tx.commit().await?;
        Ok(car)
    }
}
