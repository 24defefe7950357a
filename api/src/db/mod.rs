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

//! Database abstraction to manipulate cars.

use crate::model::{Car, CarFields, CarId, CarUpdate};
#[cfg(feature = "postgres")]
use garage_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use garage_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use garage_core::db::{DbError, DbResult, Executor};
use sqlx::Row;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use time::OffsetDateTime;


/// Initializes the database schema.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Escapes the `LIKE` wildcards in `text` so that it matches literally, using `\` as the escape
/// character.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for Car {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: i64 = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let plate: String = row.try_get("plate").map_err(postgres::map_sqlx_error)?;
        let make: String = row.try_get("make").map_err(postgres::map_sqlx_error)?;
        let model: String = row.try_get("model").map_err(postgres::map_sqlx_error)?;
        let year: i32 = row.try_get("year").map_err(postgres::map_sqlx_error)?;
        let kilometerage: Option<f64> =
            row.try_get("kilometerage").map_err(postgres::map_sqlx_error)?;
        let image_url: Option<String> =
            row.try_get("image_url").map_err(postgres::map_sqlx_error)?;
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;
        let updated_at: OffsetDateTime =
            row.try_get("updated_at").map_err(postgres::map_sqlx_error)?;

        Ok(Car::new(
            CarId::new(id)?,
            plate,
            make,
            model,
            year,
            kilometerage,
            image_url,
            created_at,
            updated_at,
        ))
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for Car {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: i64 = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let plate: String = row.try_get("plate").map_err(sqlite::map_sqlx_error)?;
        let make: String = row.try_get("make").map_err(sqlite::map_sqlx_error)?;
        let model: String = row.try_get("model").map_err(sqlite::map_sqlx_error)?;
        let year: i32 = row.try_get("year").map_err(sqlite::map_sqlx_error)?;
        let kilometerage: Option<f64> =
            row.try_get("kilometerage").map_err(sqlite::map_sqlx_error)?;
        let image_url: Option<String> = row.try_get("image_url").map_err(sqlite::map_sqlx_error)?;
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let updated_at_secs: i64 = row.try_get("updated_at_secs").map_err(sqlite::map_sqlx_error)?;
        let updated_at_nsecs: i64 =
            row.try_get("updated_at_nsecs").map_err(sqlite::map_sqlx_error)?;

        Ok(Car::new(
            CarId::new(id)?,
            plate,
            make,
            model,
            year,
            kilometerage,
            image_url,
            build_timestamp(created_at_secs, created_at_nsecs)?,
            build_timestamp(updated_at_secs, updated_at_nsecs)?,
        ))
    }
}

/// Converts a list of raw `rows` into cars using the backend-specific `TryFrom` implementation.
fn rows_to_cars<R>(rows: Vec<R>) -> DbResult<Vec<Car>>
where
    Car: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(Car::try_from).collect()
}

/// Stores a new car with the given `fields`, stamping it with `now` as its creation and
/// modification time.  Returns the stored car, including its newly-assigned identifier.
///
/// Fails with `DbError::AlreadyExists` if another car has the same plate.
pub async fn create_car(ex: &mut Executor, fields: &CarFields, now: OffsetDateTime) -> DbResult<Car> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO cars
                    (plate, make, model, year, kilometerage, image_url, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                RETURNING *";
            let row = sqlx::query(query_str)
                .bind(fields.plate())
                .bind(fields.make())
                .bind(fields.model())
                .bind(*fields.year())
                .bind(*fields.kilometerage())
                .bind(fields.image_url().as_deref())
                .bind(now)
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            Car::try_from(row)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_secs, now_nsecs) = unpack_timestamp(now)?;

            let query_str = "
                INSERT INTO cars (
                    plate, make, model, year, kilometerage, image_url,
                    created_at_secs, created_at_nsecs, updated_at_secs, updated_at_nsecs
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *";
            let row = sqlx::query(query_str)
                .bind(fields.plate())
                .bind(fields.make())
                .bind(fields.model())
                .bind(*fields.year())
                .bind(*fields.kilometerage())
                .bind(fields.image_url().as_deref())
                .bind(now_secs)
                .bind(now_nsecs)
                .bind(now_secs)
                .bind(now_nsecs)
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            Car::try_from(row)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets all cars, most recently created first.
pub async fn get_cars(ex: &mut Executor) -> DbResult<Vec<Car>> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT * FROM cars ORDER BY created_at DESC, id DESC";
            let rows = sqlx::query(query_str)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            rows_to_cars(rows)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT * FROM cars
                ORDER BY created_at_secs DESC, created_at_nsecs DESC, id DESC";
            let rows =
                sqlx::query(query_str).fetch_all(ex.conn()).await.map_err(sqlite::map_sqlx_error)?;
            rows_to_cars(rows)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets the car identified by `id`, if it exists.
pub async fn get_car(ex: &mut Executor, id: CarId) -> DbResult<Option<Car>> {
    let maybe_car = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT * FROM cars WHERE id = $1";
            sqlx::query(query_str)
                .bind(id.as_i64())
                .fetch_optional(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT * FROM cars WHERE id = ?";
            sqlx::query(query_str)
                .bind(id.as_i64())
                .fetch_optional(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    maybe_car.transpose()
}

/// Gets the car with the exact license `plate`, if it exists.
pub async fn get_car_by_plate(ex: &mut Executor, plate: &str) -> DbResult<Option<Car>> {
    let maybe_car = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT * FROM cars WHERE plate = $1";
            sqlx::query(query_str)
                .bind(plate)
                .fetch_optional(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT * FROM cars WHERE plate = ?";
            sqlx::query(query_str)
                .bind(plate)
                .fetch_optional(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    maybe_car.transpose()
}

/// Gets all cars whose make contains `make`, ignoring case.  Ordered like `get_cars`.
pub async fn get_cars_by_make(ex: &mut Executor, make: &str) -> DbResult<Vec<Car>> {
    let pattern = format!("%{}%", escape_like(make));
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT * FROM cars
                WHERE make ILIKE $1 ESCAPE '\\'
                ORDER BY created_at DESC, id DESC";
            let rows = sqlx::query(query_str)
                .bind(pattern)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            rows_to_cars(rows)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            // LIKE is case-insensitive for ASCII characters in SQLite.
            let query_str = "
                SELECT * FROM cars
                WHERE make LIKE ? ESCAPE '\\'
                ORDER BY created_at_secs DESC, created_at_nsecs DESC, id DESC";
            let rows = sqlx::query(query_str)
                .bind(pattern)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            rows_to_cars(rows)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Overwrites all editable columns of the car identified by `id` with `update`, stamping it with
/// `now` as its modification time.  Returns the updated car or `None` if it does not exist.
///
/// Fails with `DbError::AlreadyExists` if the new plate belongs to another car and with
/// `DbError::MissingValue` if `update` lacks a required column.
pub async fn update_car(
    ex: &mut Executor,
    id: CarId,
    update: &CarUpdate,
    now: OffsetDateTime,
) -> DbResult<Option<Car>> {
    let maybe_car = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE cars
                SET plate = $1, make = $2, model = $3, year = $4, kilometerage = $5,
                    image_url = $6, updated_at = $7
                WHERE id = $8
                RETURNING *";
            sqlx::query(query_str)
                .bind(update.plate().as_deref())
                .bind(update.make().as_deref())
                .bind(update.model().as_deref())
                .bind(*update.year())
                .bind(*update.kilometerage())
                .bind(update.image_url().as_deref())
                .bind(now)
                .bind(id.as_i64())
                .fetch_optional(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_secs, now_nsecs) = unpack_timestamp(now)?;

            let query_str = "
                UPDATE cars
                SET plate = ?, make = ?, model = ?, year = ?, kilometerage = ?, image_url = ?,
                    updated_at_secs = ?, updated_at_nsecs = ?
                WHERE id = ?
                RETURNING *";
            sqlx::query(query_str)
                .bind(update.plate().as_deref())
                .bind(update.make().as_deref())
                .bind(update.model().as_deref())
                .bind(*update.year())
                .bind(*update.kilometerage())
                .bind(update.image_url().as_deref())
                .bind(now_secs)
                .bind(now_nsecs)
                .bind(id.as_i64())
                .fetch_optional(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    maybe_car.transpose()
}

/// Deletes the car identified by `id`.  Returns the car as it was right before deletion or `None`
/// if it did not exist.
pub async fn delete_car(ex: &mut Executor, id: CarId) -> DbResult<Option<Car>> {
    let maybe_car = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "DELETE FROM cars WHERE id = $1 RETURNING *";
            sqlx::query(query_str)
                .bind(id.as_i64())
                .fetch_optional(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "DELETE FROM cars WHERE id = ? RETURNING *";
            sqlx::query(query_str)
                .bind(id.as_i64())
                .fetch_optional(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .map(Car::try_from)
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    maybe_car.transpose()
}

/// Counts the number of stored cars.
pub async fn count_cars(ex: &mut Executor) -> DbResult<usize> {
    let count: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT COUNT(*) AS count FROM cars";
            let row = sqlx::query(query_str)
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("count").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT COUNT(*) AS count FROM cars";
            let row =
                sqlx::query(query_str).fetch_one(ex.conn()).await.map_err(sqlite::map_sqlx_error)?;
            row.try_get("count").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    usize::try_from(count)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid car count {}: {}", count, e)))
}
