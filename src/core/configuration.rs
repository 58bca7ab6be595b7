//! Connection configuration parsed from a DSN
//!
//! Format: `scheme://[user[:password]@]host[:port]/databaseName[?key=value&...]`.
//! Embedded schemes also accept `scheme:///path`, which is read as
//! `scheme://localhost/path`.

use super::database_types::BackendKind;
use super::error::{Result, StorageError};
use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;
use url::Url;

/// Host used when the DSN does not name one
pub const DEFAULT_HOST: &str = "localhost";

/// Encoding used when the DSN has no `charset` parameter
pub const DEFAULT_ENCODING: &str = "UTF-8";

const EMBEDDED_SCHEMES: [&str; 4] = ["sqlite", "sqlite3", "pdo_sqlite", "pdo_sqlite3"];

/// Immutable connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfiguration {
    original_dsn: String,
    scheme: String,
    host: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    database_name: Option<String>,
    encoding: String,
    query_parameters: HashMap<String, String>,
}

impl StorageConfiguration {
    /// Parse a connection string
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfigurationOptions`] if the DSN is not a
    /// valid URI.
    pub fn parse(dsn: &str) -> Result<Self> {
        let prepared = with_default_host(&rewrite_embedded_path(dsn)).into_owned();

        let url = Url::parse(&prepared).map_err(|e| {
            StorageError::invalid_configuration(format!(
                "Error while parsing connection DSN \"{}\": {}",
                dsn, e
            ))
            .with_source(Box::new(e))
        })?;

        let mut query_parameters: HashMap<String, String> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if url.query().map_or(true, str::is_empty) {
            query_parameters.insert("charset".to_string(), DEFAULT_ENCODING.to_string());
        }

        let encoding = non_empty(query_parameters.get("charset").cloned())
            .unwrap_or_else(|| DEFAULT_ENCODING.to_string());

        let path = url.path();
        let database_name = non_empty(Some(path.strip_prefix('/').unwrap_or(path).to_string()));

        Ok(Self {
            original_dsn: dsn.to_string(),
            scheme: url.scheme().to_string(),
            host: non_empty(url.host_str().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: url.port(),
            username: non_empty(Some(url.username().to_string())),
            password: non_empty(url.password().map(str::to_string)),
            database_name,
            encoding,
            query_parameters,
        })
    }

    /// The DSN exactly as supplied
    pub fn original_dsn(&self) -> &str {
        &self.original_dsn
    }

    /// URI scheme, lowercased
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Backend selected by the scheme
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfigurationOptions`] for unknown schemes.
    pub fn backend(&self) -> Result<BackendKind> {
        self.scheme
            .parse()
            .map_err(StorageError::invalid_configuration)
    }

    /// Host name, never empty
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, if any
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Path component without its leading `/`
    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    /// Character encoding, never empty
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// All query string parameters
    pub fn query_parameters(&self) -> &HashMap<String, String> {
        &self.query_parameters
    }

    /// Raw query string parameter
    pub fn query_parameter(&self, key: &str) -> Option<&str> {
        self.query_parameters.get(key).map(String::as_str)
    }

    /// Query string parameter parsed into `T`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfigurationOptions`] if the parameter is
    /// present but cannot be parsed.
    pub fn query_parameter_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.query_parameter(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    StorageError::invalid_configuration(format!(
                        "Invalid value \"{}\" for \"{}\": {}",
                        raw, key, e
                    ))
                })
            })
            .transpose()
    }
}

impl FromStr for StorageConfiguration {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `sqlite:///path` -> `sqlite://localhost/path`
fn rewrite_embedded_path(dsn: &str) -> Cow<'_, str> {
    if let Some((scheme, rest)) = dsn.split_once(":///") {
        if EMBEDDED_SCHEMES.contains(&scheme) {
            return Cow::Owned(format!("{}://{}/{}", scheme, DEFAULT_HOST, rest));
        }
    }
    Cow::Borrowed(dsn)
}

/// Inserts the default host into authorities such as `user:pw@` or `user@:5432`,
/// which URI parsing rejects.
fn with_default_host(dsn: &str) -> Cow<'_, str> {
    let Some(authority_start) = dsn.find("://").map(|i| i + 3) else {
        return Cow::Borrowed(dsn);
    };
    let rest = &dsn[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let Some(at) = authority.rfind('@') else {
        return Cow::Borrowed(dsn);
    };
    let host_and_port = &authority[at + 1..];
    if !host_and_port.is_empty() && !host_and_port.starts_with(':') {
        return Cow::Borrowed(dsn);
    }

    let insert_at = authority_start + at + 1;
    Cow::Owned(format!("{}{}{}", &dsn[..insert_at], DEFAULT_HOST, &dsn[insert_at..]))
}
