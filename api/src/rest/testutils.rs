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

//! Test utilities for the REST API.

use crate::db;
use crate::driver::Driver;
use crate::driver::testutils::test_fields;
use crate::model::{Car, CarId};
use crate::options::{Environment, ServiceOptions};
use crate::rest::app;
use axum::Router;
use garage_core::clocks::Clock;
use garage_core::clocks::testutils::{MonotonicClock, SettableClock};
use garage_core::db::Db;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

/// Returns service options suitable for tests.
pub(crate) fn test_options() -> ServiceOptions {
    ServiceOptions {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        environment: Environment::Test,
        body_limit: 5 * 1024 * 1024,
        compression_threshold: 1024,
        rate_limit_window: Duration::from_secs(15 * 60),
        rate_limit_max: 1000,
        log_requests: true,
    }
}

/// State of a running test.
pub(crate) struct TestContext {
    db: Arc<dyn Db + Send + Sync>,
    db_clock: Arc<MonotonicClock>,
    clock: Arc<SettableClock>,
    app: Router,
}

impl TestContext {
    pub(crate) async fn setup() -> Self {
        Self::setup_with(test_options()).await
    }

    pub(crate) async fn setup_with(opts: ServiceOptions) -> Self {
        let db = garage_core::db::sqlite::testutils::setup().await;
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let db: Arc<dyn Db + Send + Sync> = Arc::new(db);
        let db_clock = Arc::new(MonotonicClock::new(datetime!(2024-01-01 00:00:00 UTC)));
        let driver = Driver::new(db.clone(), db_clock.clone());
        let clock = Arc::new(SettableClock::new(datetime!(2024-01-01 00:00:00 UTC)));
        let app = app(driver, &opts, clock.clone());
        Self { db, db_clock, clock, app }
    }

    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    pub(crate) fn advance_clock(&self, delta: Duration) {
        self.clock.advance(delta);
    }

    pub(crate) async fn close_db(&self) {
        self.db.close().await;
    }

    pub(crate) async fn create_car(&self, plate: &str, make: &str) -> Car {
        self.create_car_at(plate, make, self.db_clock.now_utc()).await
    }

    pub(crate) async fn create_car_at(&self, plate: &str, make: &str, now: OffsetDateTime) -> Car {
        db::create_car(&mut self.db.ex().await.unwrap(), &test_fields(plate, make), now)
            .await
            .unwrap()
    }

    pub(crate) async fn get_car(&self, id: CarId) -> Option<Car> {
        db::get_car(&mut self.db.ex().await.unwrap(), id).await.unwrap()
    }

    pub(crate) async fn count_cars(&self) -> usize {
        db::count_cars(&mut self.db.ex().await.unwrap()).await.unwrap()
    }
}
