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

//! Configuration of the running service.

use garage_core::env::{Value, get_optional_var, get_required_var};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Default value for the `BODY_LIMIT` setting when not specified.
const DEFAULT_BODY_LIMIT: usize = 5 * 1024 * 1024;

/// Default value for the `COMPRESSION_THRESHOLD` setting when not specified.
const DEFAULT_COMPRESSION_THRESHOLD: u16 = 1024;

/// Default value for the `RATE_LIMIT_WINDOW` setting when not specified.
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 15 * 60;

/// Default value for the `RATE_LIMIT_MAX` setting in production deployments.
const DEFAULT_RATE_LIMIT_MAX_PRODUCTION: u32 = 100;

/// Default value for the `RATE_LIMIT_MAX` setting in any other deployment.
const DEFAULT_RATE_LIMIT_MAX: u32 = 1000;

/// Kind of deployment the service is running in.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.  Internal error details are exposed to clients.
    #[default]
    Development,

    /// Production deployment.  Internal error details are hidden and limits are tighter.
    Production,

    /// Automated testing.
    Test,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl TryFrom<Value> for Environment {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        String::try_from(value)?.parse()
    }
}

/// Configuration options for the HTTP service.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceOptions {
    /// Address to listen on.
    pub host: IpAddr,

    /// Port to listen on.
    pub port: u16,

    /// Kind of deployment.
    pub environment: Environment,

    /// Maximum size of request bodies, in bytes.
    pub body_limit: usize,

    /// Minimum size of responses to compress, in bytes.
    pub compression_threshold: u16,

    /// Duration of each rate limiting window.
    pub rate_limit_window: Duration,

    /// Maximum number of requests a client can issue within a rate limiting window.
    pub rate_limit_max: u32,

    /// Whether to log a line for every incoming request.
    pub log_requests: bool,
}

impl ServiceOptions {
    /// Creates a new set of options from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let environment =
            get_optional_var::<Environment>("", "APP_ENV")?.unwrap_or(Environment::Development);
        let default_rate_limit_max = match environment {
            Environment::Production => DEFAULT_RATE_LIMIT_MAX_PRODUCTION,
            _ => DEFAULT_RATE_LIMIT_MAX,
        };

        Ok(Self {
            host: get_optional_var::<IpAddr>("", "HOST")?
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: get_required_var::<u16>("", "PORT")?,
            environment,
            body_limit: get_optional_var::<usize>("", "BODY_LIMIT")?.unwrap_or(DEFAULT_BODY_LIMIT),
            compression_threshold: get_optional_var::<u16>("", "COMPRESSION_THRESHOLD")?
                .unwrap_or(DEFAULT_COMPRESSION_THRESHOLD),
            rate_limit_window: get_optional_var::<Duration>("", "RATE_LIMIT_WINDOW")?
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS)),
            rate_limit_max: get_optional_var::<u32>("", "RATE_LIMIT_MAX")?
                .unwrap_or(default_rate_limit_max),
            log_requests: get_optional_var::<bool>("", "LOG_REQUESTS")?.unwrap_or(true),
        })
    }

    /// Returns the socket address to bind the server to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
