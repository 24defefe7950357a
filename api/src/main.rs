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

//! Entry point to the vehicle records service.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use garage_api::options::{Environment, ServiceOptions};
use garage_api::serve;
use garage_core::db::postgres::PostgresOptions;
use log::error;
use std::error::Error;

/// Gathers the configuration from the environment and runs the service.
async fn run() -> Result<(), Box<dyn Error>> {
    let opts = ServiceOptions::from_env()?;
    let mut db_opts = PostgresOptions::from_env("DB")?;
    if opts.environment == Environment::Production {
        db_opts.require_tls = true;
    }
    serve(opts, db_opts).await
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}
