//! Connection configuration.
//!
//! Options come from a `.nbase.json` file in the current directory, from
//! `NB_*`/`NBASE_*` environment variables, or from built-in defaults, in that
//! order of preference. The CLI layers its own flags on top.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::{self, BackendKind, BackendOptions, Connection, DbError};

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".nbase.json";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3020;

/// Top-level configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub connection: ConnectOptions,
}

/// Everything needed to open a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub backend: BackendKind,
    /// Path of `libnbclient`; required by the `cpp_lib` backend.
    pub lib_path: Option<PathBuf>,
    /// ODBC driver name; required by the `odbc` backend.
    pub odbc_driver: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
            backend: BackendKind::default(),
            lib_path: None,
            odbc_driver: None,
        }
    }
}

impl ConfigFile {
    /// Load `.nbase.json` from the current directory.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load() -> Result<Option<Self>, DbError> {
        let path = PathBuf::from(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load a configuration file from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON of
    /// the expected shape.
    pub fn load_from(path: &Path) -> Result<Self, DbError> {
        let content = fs::read_to_string(path).map_err(|e| DbError::Interface {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| DbError::Interface {
            message: format!("Invalid JSON in {}: {}", path.display(), e),
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl ConnectOptions {
    /// Load from environment variables.
    ///
    /// Reads `NB_HOST`, `NB_PORT`, `NB_USER`, `NB_PASSWORD`, `NBASE_BACKEND`,
    /// `NBASE_LIB_PATH` and `NBASE_ODBC_DRIVER`. Returns `Ok(None)` when none
    /// of them is set; unset ones keep their defaults.
    pub fn from_env() -> Result<Option<Self>, DbError> {
        let mut options = Self::default();
        let mut found = false;

        if let Some(host) = env_var("NB_HOST") {
            options.host = host;
            found = true;
        }
        if let Some(port) = env_var("NB_PORT") {
            options.port = port
                .trim()
                .parse()
                .map_err(|e| DbError::Interface {
                    message: format!("Invalid NB_PORT '{}': {}", port, e),
                })?;
            found = true;
        }
        if let Some(user) = env_var("NB_USER") {
            options.user = Some(user);
            found = true;
        }
        if let Some(password) = env_var("NB_PASSWORD") {
            options.password = Some(password);
            found = true;
        }
        if let Some(backend) = env_var("NBASE_BACKEND") {
            options.backend = backend.parse()?;
            found = true;
        }
        if let Some(path) = env_var("NBASE_LIB_PATH") {
            options.lib_path = Some(PathBuf::from(path));
            found = true;
        }
        if let Some(driver) = env_var("NBASE_ODBC_DRIVER") {
            options.odbc_driver = Some(driver);
            found = true;
        }

        Ok(found.then_some(options))
    }

    /// Resolve options from config file and environment.
    ///
    /// Priority: Config file > Environment > Defaults
    pub fn resolve() -> Result<Self, DbError> {
        if let Some(config_file) = ConfigFile::load()? {
            tracing::debug!(file = CONFIG_FILE_NAME, "using configuration file");
            return Ok(config_file.connection);
        }

        if let Some(options) = Self::from_env()? {
            tracing::debug!("using environment configuration");
            return Ok(options);
        }

        Ok(Self::default())
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            lib_path: self.lib_path.clone(),
            odbc_driver: self.odbc_driver.clone(),
            span: None,
        }
    }

    /// Open a connection with these options.
    pub fn connect(&self) -> Result<Connection, DbError> {
        db::connect(
            &self.host,
            self.port,
            self.user.as_deref(),
            self.password.as_deref(),
            self.backend,
            &self.backend_options(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_VARS: [&str; 7] = [
        "NB_HOST",
        "NB_PORT",
        "NB_USER",
        "NB_PASSWORD",
        "NBASE_BACKEND",
        "NBASE_LIB_PATH",
        "NBASE_ODBC_DRIVER",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            unsafe {
                std::env::remove_var(name);
            }
        }
    }

    struct CurrentDir(PathBuf);

    impl CurrentDir {
        fn enter(path: &Path) -> Self {
            let old = std::env::current_dir().unwrap();
            std::env::set_current_dir(path).unwrap();
            Self(old)
        }
    }

    impl Drop for CurrentDir {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    fn test_full_deserialization() {
        let json = r#"
        {
            "connection": {
                "host": "db.local",
                "port": 4000,
                "user": "sa",
                "backend": "odbc",
                "odbc_driver": "NitrosBase"
            }
        }
        "#;
        let config: ConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection.host, "db.local");
        assert_eq!(config.connection.port, 4000);
        assert_eq!(config.connection.user.as_deref(), Some("sa"));
        assert_eq!(config.connection.backend, BackendKind::Odbc);
        assert_eq!(config.connection.odbc_driver.as_deref(), Some("NitrosBase"));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let json = r#"{ "connection": { "lib_path": "/opt/nb/libnbclient.so" } }"#;
        let config: ConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 3020);
        assert_eq!(config.connection.backend, BackendKind::CppLib);
        assert_eq!(
            config.connection.lib_path,
            Some(PathBuf::from("/opt/nb/libnbclient.so"))
        );
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let json = r#"{ "connection": { "backend": "jdbc" } }"#;
        assert!(serde_json::from_str::<ConfigFile>(json).is_err());
    }

    #[test]
    fn test_native_backend_aliases_in_file() {
        for alias in ["cpp", "cpp-lib"] {
            let json = format!(r#"{{ "connection": {{ "backend": "{}" }} }}"#, alias);
            let config: ConfigFile = serde_json::from_str(&json).unwrap();
            assert_eq!(config.connection.backend, BackendKind::CppLib);
        }
    }

    #[test]
    fn test_load_from_missing_path_is_interface_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::load_from(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DbError::Interface { .. }));
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_load_from_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ invalid json }").unwrap();
        file.flush().unwrap();
        let err = ConfigFile::load_from(file.path()).unwrap_err();
        assert!(matches!(err, DbError::Interface { .. }));
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    #[serial]
    fn test_load_missing_file_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());
        assert!(ConfigFile::load().unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_config_file() {
        clear_env();
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"{ "connection": { "host": "from-file", "port": 5000 } }"#,
        )
        .unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());
        unsafe {
            std::env::set_var("NB_HOST", "from-env");
        }

        let options = ConnectOptions::resolve().unwrap();
        assert_eq!(options.host, "from-file");
        assert_eq!(options.port, 5000);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_resolve_from_env() {
        clear_env();
        let temp_dir = tempfile::tempdir().unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());
        unsafe {
            std::env::set_var("NB_PORT", "3021");
            std::env::set_var("NBASE_LIB_PATH", "/tmp/libnbclient.so");
            std::env::set_var("NBASE_BACKEND", "cpp");
        }

        let options = ConnectOptions::resolve().unwrap();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 3021);
        assert_eq!(options.backend, BackendKind::CppLib);
        assert_eq!(options.lib_path, Some(PathBuf::from("/tmp/libnbclient.so")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_resolve_defaults() {
        clear_env();
        let temp_dir = tempfile::tempdir().unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());
        assert_eq!(ConnectOptions::resolve().unwrap(), ConnectOptions::default());
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        clear_env();
        unsafe {
            std::env::set_var("NB_PORT", "not-a-port");
        }
        let err = ConnectOptions::from_env().unwrap_err();
        assert!(matches!(err, DbError::Interface { .. }));
        assert!(err.to_string().contains("NB_PORT"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_unknown_backend() {
        clear_env();
        unsafe {
            std::env::set_var("NBASE_BACKEND", "jdbc");
        }
        let err = ConnectOptions::from_env().unwrap_err();
        assert!(matches!(err, DbError::Interface { .. }));
        assert!(err.to_string().contains("unrecognized backend kind"));
        clear_env();
    }

    #[test]
    fn test_connect_without_lib_path_is_interface_error() {
        let err = ConnectOptions::default().connect().unwrap_err();
        assert!(matches!(err, DbError::Interface { .. }));
    }
}
