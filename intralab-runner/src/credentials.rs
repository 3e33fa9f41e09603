//! SmartAPI credentials from the environment, optionally seeded from a
//! `config.env` file.

use std::path::Path;

use tracing::debug;

use intralab_core::data::SmartApiCredentials;

use crate::config::ConfigError;

pub const DEFAULT_ENV_FILE: &str = "config.env";

pub const API_KEY_VAR: &str = "API_KEY";
pub const CLIENT_CODE_VAR: &str = "CLIENT_CODE";
/// Accepted in place of `CLIENT_CODE` for existing `config.env` files.
pub const LEGACY_CLIENT_CODE_VAR: &str = "USERNAME";
pub const MPIN_VAR: &str = "MPIN";
pub const TOTP_SECRET_VAR: &str = "TOTP_SECRET";

/// Load `path` into the process environment if it exists. Variables already
/// set are left alone. Returns whether a file was loaded.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no env file");
        return Ok(false);
    }
    dotenv::from_path(path).map_err(|e| ConfigError::EnvFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), "loaded env file");
    Ok(true)
}

/// Read credentials from the process environment.
pub fn credentials_from_env() -> Result<SmartApiCredentials, ConfigError> {
    credentials_from(|name| std::env::var(name).ok())
}

/// Read credentials through `lookup`. Blank values count as missing.
pub fn credentials_from<F>(lookup: F) -> Result<SmartApiCredentials, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let require = |name: &'static str| get(name).ok_or(ConfigError::MissingCredential(name));

    let client_code = get(CLIENT_CODE_VAR)
        .or_else(|| get(LEGACY_CLIENT_CODE_VAR))
        .ok_or(ConfigError::MissingCredential(CLIENT_CODE_VAR))?;

    Ok(SmartApiCredentials {
        api_key: require(API_KEY_VAR)?,
        client_code,
        pin: require(MPIN_VAR)?,
        totp_secret: require(TOTP_SECRET_VAR)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full() -> HashMap<String, String> {
        env(&[
            ("API_KEY", "key"),
            ("CLIENT_CODE", "A123"),
            ("MPIN", "1234"),
            ("TOTP_SECRET", "GEZDGNBVGY3TQOJQ"),
        ])
    }

    #[test]
    fn reads_all_four_values() {
        let vars = full();
        let creds = credentials_from(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.client_code, "A123");
        assert_eq!(creds.pin, "1234");
        assert_eq!(creds.totp_secret, "GEZDGNBVGY3TQOJQ");
    }

    #[test]
    fn falls_back_to_username() {
        let mut vars = full();
        vars.remove("CLIENT_CODE");
        vars.insert("USERNAME".into(), "B456".into());
        let creds = credentials_from(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.client_code, "B456");
    }

    #[test]
    fn missing_or_blank_is_an_error() {
        let mut vars = full();
        vars.remove("MPIN");
        let err = credentials_from(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("MPIN")));

        let mut vars = full();
        vars.insert("TOTP_SECRET".into(), "  ".into());
        let err = credentials_from(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("TOTP_SECRET")));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let vars = full();
        let creds = credentials_from(|k| vars.get(k).cloned()).unwrap();
        let shown = format!("{creds:?}");
        assert!(!shown.contains("1234"));
        assert!(!shown.contains("GEZDGNBVGY3TQOJQ"));
    }

    #[test]
    fn env_file_is_loaded_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "INTRALAB_CREDENTIALS_TEST_VAR=loaded").unwrap();
        drop(file);

        assert!(load_env_file(&path).unwrap());
        assert_eq!(
            std::env::var("INTRALAB_CREDENTIALS_TEST_VAR").as_deref(),
            Ok("loaded")
        );
    }

    #[test]
    fn absent_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!load_env_file(&dir.path().join("config.env")).unwrap());
    }
}
