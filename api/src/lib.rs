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

//! REST service to manage vehicle records.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

#[cfg(feature = "postgres")]
use garage_core::clocks::SystemClock;
#[cfg(feature = "postgres")]
use garage_core::db::Db;
#[cfg(feature = "postgres")]
use garage_core::db::postgres::{PostgresDb, PostgresOptions};
#[cfg(feature = "postgres")]
use log::{error, info};
#[cfg(feature = "postgres")]
use std::error::Error;
#[cfg(feature = "postgres")]
use std::net::SocketAddr;
#[cfg(feature = "postgres")]
use std::sync::Arc;

pub(crate) mod db;
pub(crate) mod driver;
pub(crate) mod model;
pub mod options;
mod rest;

/// Waits until the process is asked to terminate via SIGINT or SIGTERM.
#[cfg(feature = "postgres")]
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Received SIGINT; shutting down"),
        () = terminate => info!("Received SIGTERM; shutting down"),
    }
}

/// Initializes the schema in `db` and serves the application until a termination signal arrives.
#[cfg(feature = "postgres")]
async fn run(db: Arc<PostgresDb>, opts: options::ServiceOptions) -> Result<(), Box<dyn Error>> {
    db::init_schema(&mut db.ex().await?).await?;
    let count = db::count_cars(&mut db.ex().await?).await?;
    info!("Database ready with {} stored cars", count);

    let clock = Arc::new(SystemClock::default());
    let driver = driver::Driver::new(db, clock.clone());
    let app = rest::app(driver, &opts, clock);

    let listener = tokio::net::TcpListener::bind(opts.bind_addr()).await?;
    info!("Listening on {} in {} mode", listener.local_addr()?, opts.environment);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Instantiates all resources to serve the application as configured by `opts`, storing data
/// in the database described by `db_opts`.
///
/// Returns once the server has shut down and the database connections have been closed.
///
/// While it'd be nice to push this responsibility to `main`, doing so would force us to expose many
/// crate-internal types to the public, which in turn would make dead code detection harder.
#[cfg(feature = "postgres")]
pub async fn serve(
    opts: options::ServiceOptions,
    db_opts: PostgresOptions,
) -> Result<(), Box<dyn Error>> {
    let db = Arc::new(PostgresDb::connect(db_opts)?);
    let result = run(db.clone(), opts).await;
    info!("Closing database connections");
    db.close().await;
    result
}
