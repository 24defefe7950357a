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

//! High-level data types.

use derive_getters::Getters;
use derive_more::Constructor;
use garage_core::model::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Identifier of a car as assigned by the database.  Always positive.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct CarId(i64);

impl CarId {
    /// Creates a new identifier after validating that it is positive.
    pub fn new(id: i64) -> ModelResult<Self> {
        if id <= 0 {
            return Err(ModelError(format!("Car identifiers must be positive; got {}", id)));
        }
        Ok(Self(id))
    }

    /// Returns the raw identifier for storage.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for CarId {
    type Error = ModelError;

    fn try_from(id: i64) -> ModelResult<Self> {
        CarId::new(id)
    }
}

impl From<CarId> for i64 {
    fn from(id: CarId) -> Self {
        id.0
    }
}

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated contents of a new car.
#[derive(Clone, Constructor, Debug, Getters, PartialEq)]
pub struct CarFields {
    /// License plate.  Unique across all cars.
    plate: String,

    /// Manufacturer.
    make: String,

    /// Model name.
    model: String,

    /// Year of manufacture.
    year: i32,

    /// Accumulated distance.
    kilometerage: f64,

    /// Link to a picture of the car.
    image_url: Option<String>,
}

/// Replacement contents of an existing car.
///
/// Updates rewrite every column: any field set to `None` is written as NULL, which the database
/// rejects for required columns.
#[derive(Clone, Constructor, Debug, Default, Getters, PartialEq)]
pub struct CarUpdate {
    /// New license plate.
    plate: Option<String>,

    /// New manufacturer.
    make: Option<String>,

    /// New model name.
    model: Option<String>,

    /// New year of manufacture.
    year: Option<i32>,

    /// New accumulated distance.
    kilometerage: Option<f64>,

    /// New link to a picture of the car.
    image_url: Option<String>,
}

impl From<CarFields> for CarUpdate {
    fn from(fields: CarFields) -> Self {
        Self {
            plate: Some(fields.plate),
            make: Some(fields.make),
            model: Some(fields.model),
            year: Some(fields.year),
            kilometerage: Some(fields.kilometerage),
            image_url: fields.image_url,
        }
    }
}

/// A car as stored in the database.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct Car {
    /// Identifier assigned by the database.
    id: CarId,

    /// License plate.
    plate: String,

    /// Manufacturer.
    make: String,

    /// Model name.
    model: String,

    /// Year of manufacture.
    year: i32,

    /// Accumulated distance, which can be cleared by updates.
    kilometerage: Option<f64>,

    /// Link to a picture of the car.
    image_url: Option<String>,

    /// Time when the car was first stored.
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    /// Time when the car was last modified.
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Car {
    /// Assembles a car from its stored columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: CarId,
        plate: String,
        make: String,
        model: String,
        year: i32,
        kilometerage: Option<f64>,
        image_url: Option<String>,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self { id, plate, make, model, year, kilometerage, image_url, created_at, updated_at }
    }
}
