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

//! Utilities to deal with environment variables.

use std::env;
use std::time::Duration;

/// Result type for environment errors.
type Result<T> = std::result::Result<T, String>;

/// Wrapper around an environment variable's value to support conversions to other types.
pub struct Value(String);

impl TryFrom<Value> for String {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        Ok(value.0)
    }
}

impl TryFrom<Value> for bool {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value.0.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            s => Err(format!("Invalid bool: {}", s)),
        }
    }
}

impl TryFrom<Value> for Duration {
    type Error = String;

    /// Parses a duration expressed as an integer followed by an optional unit suffix of `ms`,
    /// `s`, `m` or `h`.  A missing suffix means seconds.
    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let s = value.0.trim();
        let split = s.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let number = number.parse::<u64>().map_err(|e| format!("Invalid Duration: {}", e))?;
        match unit {
            "ms" => Ok(Duration::from_millis(number)),
            "" | "s" => Ok(Duration::from_secs(number)),
            "m" => Ok(Duration::from_secs(number * 60)),
            "h" => Ok(Duration::from_secs(number * 60 * 60)),
            unit => Err(format!("Invalid Duration: unknown unit '{}'", unit)),
        }
    }
}

/// Generates a `TryFrom<Value>` for a type that can be parsed by `FromStr`.
macro_rules! tryfrom_value_for_fromstr [
    ( $t:ty ) => {
        impl TryFrom<Value> for $t {
            type Error = String;

            fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
                value.0.parse::<$t>().map_err(|e| format!("Invalid {}: {}", stringify!($t), e))
            }
        }
    }
];

tryfrom_value_for_fromstr!(u16);
tryfrom_value_for_fromstr!(u32);
tryfrom_value_for_fromstr!(u64);
tryfrom_value_for_fromstr!(usize);
tryfrom_value_for_fromstr!(std::net::IpAddr);

/// Gets the raw value of the environment variable `name` if present.
fn get_var(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(format!("Invalid value in environment variable {}", name))
        }
    }
}

/// Converts the raw `value` read from the variable `name` to the target type `T`.
fn convert_var<T: TryFrom<Value, Error = String>>(name: &str, value: String) -> Result<T> {
    Value(value)
        .try_into()
        .map_err(|e| format!("Invalid type in environment variable {}: {}", name, e))
}

/// Gets a required environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.  An empty `prefix` means that the variable is named `<suffix>`.
pub fn get_required_var<T: TryFrom<Value, Error = String>>(
    prefix: &str,
    suffix: &str,
) -> Result<T> {
    let name = var_name(prefix, suffix);
    match get_var(&name)? {
        Some(value) => convert_var(&name, value),
        None => Err(format!("Required environment variable {} not present", name)),
    }
}

/// Gets an optional environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.  An empty `prefix` means that the variable is named `<suffix>`.
pub fn get_optional_var<T: TryFrom<Value, Error = String>>(
    prefix: &str,
    suffix: &str,
) -> Result<Option<T>> {
    let name = var_name(prefix, suffix);
    match get_var(&name)? {
        Some(value) => Ok(Some(convert_var(&name, value)?)),
        None => Ok(None),
    }
}

/// Computes the name of a variable from its `prefix` and `suffix`.
fn var_name(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() { suffix.to_owned() } else { format!("{}_{}", prefix, suffix) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn test_value_to_string() {
        assert_eq!("foo bar", &TryInto::<String>::try_into(Value("foo bar".to_owned())).unwrap());
    }

    #[test]
    fn test_value_to_fromstr() {
        assert_eq!(1234u16, TryInto::<u16>::try_into(Value("1234".to_owned())).unwrap());

        let err = TryInto::<u16>::try_into(Value("-1".to_owned())).unwrap_err();
        assert!(err.starts_with("Invalid u16:"));
    }

    #[test]
    fn test_value_to_bool() {
        for raw in ["1", "true", "TRUE", "yes", "on"] {
            assert!(TryInto::<bool>::try_into(Value(raw.to_owned())).unwrap(), "{}", raw);
        }
        for raw in ["0", "false", "No", "off"] {
            assert!(!TryInto::<bool>::try_into(Value(raw.to_owned())).unwrap(), "{}", raw);
        }
        assert_eq!(
            "Invalid bool: maybe",
            TryInto::<bool>::try_into(Value("maybe".to_owned())).unwrap_err()
        );
    }

    #[test]
    fn test_value_to_duration() {
        let parse = |s: &str| TryInto::<Duration>::try_into(Value(s.to_owned()));
        assert_eq!(Duration::from_millis(250), parse("250ms").unwrap());
        assert_eq!(Duration::from_secs(30), parse("30").unwrap());
        assert_eq!(Duration::from_secs(30), parse("30s").unwrap());
        assert_eq!(Duration::from_secs(15 * 60), parse("15m").unwrap());
        assert_eq!(Duration::from_secs(2 * 60 * 60), parse("2h").unwrap());
        assert!(parse("").unwrap_err().starts_with("Invalid Duration:"));
        assert!(parse("5d").unwrap_err().contains("unknown unit 'd'"));
    }

    #[test]
    fn test_get_required_var_ok() {
        temp_env::with_var("PREFIX_PRESENT", Some("1234"), || {
            assert_eq!("1234", &get_required_var::<String>("PREFIX", "PRESENT").unwrap());
        });
    }

    #[test]
    fn test_get_required_var_no_prefix() {
        temp_env::with_var("UNPREFIXED", Some("8080"), || {
            assert_eq!(8080u16, get_required_var::<u16>("", "UNPREFIXED").unwrap());
        });
    }

    #[test]
    fn test_get_required_var_missing() {
        temp_env::with_var_unset("PREFIX_MISSING", || {
            assert_eq!(
                "Required environment variable PREFIX_MISSING not present",
                &get_required_var::<String>("PREFIX", "MISSING").unwrap_err()
            );
        });
    }

    #[test]
    fn test_get_required_var_not_utf8() {
        temp_env::with_var("PREFIX_INVALID", Some(OsStr::from_bytes(b"\xc3\x28")), || {
            assert_eq!(
                "Invalid value in environment variable PREFIX_INVALID",
                &get_required_var::<String>("PREFIX", "INVALID").unwrap_err()
            );
        });
    }

    #[test]
    fn test_get_required_var_bad_type() {
        temp_env::with_var("PREFIX_BAD", Some("b4d"), || {
            let err = get_required_var::<u16>("PREFIX", "BAD").unwrap_err();
            assert!(err.starts_with("Invalid type in environment variable PREFIX_BAD: Invalid u16"));
        });
    }

    #[test]
    fn test_get_optional_var_ok() {
        temp_env::with_var("PREFIX_PRESENT", Some("15m"), || {
            assert_eq!(
                Some(Duration::from_secs(900)),
                get_optional_var::<Duration>("PREFIX", "PRESENT").unwrap()
            );
        });
    }

    #[test]
    fn test_get_optional_var_missing() {
        temp_env::with_var_unset("PREFIX_MISSING", || {
            assert_eq!(None, get_optional_var::<u32>("PREFIX", "MISSING").unwrap());
        });
    }

    #[test]
    fn test_get_optional_var_bad_type() {
        temp_env::with_var("PREFIX_BAD", Some("many"), || {
            let err = get_optional_var::<u32>("PREFIX", "BAD").unwrap_err();
            assert!(err.starts_with("Invalid type in environment variable PREFIX_BAD: Invalid u32"));
        });
    }
}
