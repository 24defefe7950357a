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

//! Utilities to help testing the driver and the layers built on top of it.

use crate::db;
use crate::driver::Driver;
use crate::model::{Car, CarFields};
use garage_core::clocks::testutils::MonotonicClock;
use garage_core::db::{Db, Executor};
use std::sync::Arc;
use time::macros::datetime;

/// Syntactic sugar to build valid car fields given only their `plate` and `make`.
pub(crate) fn test_fields(plate: &str, make: &str) -> CarFields {
    CarFields::new(plate.to_owned(), make.to_owned(), "Model".to_owned(), 2020, 1000.0, None)
}

/// State of a running test.
pub(crate) struct TestContext {
    /// The database backing the driver.
    db: Arc<dyn Db + Send + Sync>,

    /// The driver under test.
    driver: Driver,
}

impl TestContext {
    /// Initializes the driver using an in-memory database and a monotonic clock.
    pub(crate) async fn setup() -> Self {
        let db = garage_core::db::sqlite::testutils::setup().await;
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let db: Arc<dyn Db + Send + Sync> = Arc::new(db);
        let clock = Arc::new(MonotonicClock::new(datetime!(2024-01-01 00:00:00 UTC)));
        let driver = Driver::new(db.clone(), clock);
        Self { db, driver }
    }

    /// Gets a copy of the driver in this test context.
    pub(crate) fn driver(&self) -> Driver {
        self.driver.clone()
    }

    /// Gets a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Syntactic sugar to create a car via the driver given only its `plate` and `make`.
    pub(crate) async fn create_car(&self, plate: &str, make: &str) -> Car {
        self.driver().create_car(test_fields(plate, make)).await.unwrap()
    }
}
