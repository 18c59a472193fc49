use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

/// Parses an environment variable into `T`.
///
/// # Returns
/// - `Ok(None)` if the variable is unset or blank
/// - `Ok(Some(value))` if it parses
/// - `Err(ConfigError::InvalidEnvValue)` if it is set but unparseable
pub fn get_env_var_parsed<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue {
                name: var.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Parses a boolean flag ("1", "true", "yes", "on" and their negatives).
pub fn get_env_var_flag(var: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnvValue {
                name: var.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_env_values() {
        env::set_var("NEWS_CLUSTER_TEST_PARSED_OK", " 42 ");
        env::set_var("NEWS_CLUSTER_TEST_PARSED_BAD", "forty-two");
        env::set_var("NEWS_CLUSTER_TEST_PARSED_BLANK", "  ");

        assert_eq!(
            get_env_var_parsed::<usize>("NEWS_CLUSTER_TEST_PARSED_OK").unwrap(),
            Some(42)
        );
        assert!(get_env_var_parsed::<usize>("NEWS_CLUSTER_TEST_PARSED_BAD").is_err());
        assert_eq!(
            get_env_var_parsed::<usize>("NEWS_CLUSTER_TEST_PARSED_BLANK").unwrap(),
            None
        );
        assert_eq!(
            get_env_var_parsed::<usize>("NEWS_CLUSTER_TEST_PARSED_UNSET").unwrap(),
            None
        );
    }

    #[test]
    fn test_flag_values() {
        env::set_var("NEWS_CLUSTER_TEST_FLAG", "Yes");
        assert_eq!(get_env_var_flag("NEWS_CLUSTER_TEST_FLAG").unwrap(), Some(true));
        env::set_var("NEWS_CLUSTER_TEST_FLAG_BAD", "maybe");
        assert!(get_env_var_flag("NEWS_CLUSTER_TEST_FLAG_BAD").is_err());
    }
}
