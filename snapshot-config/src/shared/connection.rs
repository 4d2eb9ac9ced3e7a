use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions as SqlxConnectOptions, PgSslMode as SqlxSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

const COMMON_DATESTYLE: &str = "ISO";
const COMMON_INTERVALSTYLE: &str = "postgres";
const COMMON_EXTRA_FLOAT_DIGITS: i32 = 3;
const COMMON_CLIENT_ENCODING: &str = "UTF8";
const COMMON_TIMEZONE: &str = "UTC";

const APP_NAME_SNAPSHOT: &str = "schema_snapshot";
const APP_NAME_SCHEMALOG: &str = "schema_snapshot_schemalog";

/// Session settings for catalog queries, dumps and restores.
///
/// Dumps of large schemas can take a while, so statements are never timed out.
pub static SNAPSHOT_CONNECTION_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: COMMON_DATESTYLE.to_string(),
        intervalstyle: COMMON_INTERVALSTYLE.to_string(),
        extra_float_digits: COMMON_EXTRA_FLOAT_DIGITS,
        client_encoding: COMMON_CLIENT_ENCODING.to_string(),
        timezone: COMMON_TIMEZONE.to_string(),
        statement_timeout: 0,
        lock_timeout: 30_000,
        idle_in_transaction_session_timeout: 60_000,
        application_name: APP_NAME_SNAPSHOT.to_string(),
    });

/// Session settings for the schemalog store.
pub static SCHEMALOG_CONNECTION_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: COMMON_DATESTYLE.to_string(),
        intervalstyle: COMMON_INTERVALSTYLE.to_string(),
        extra_float_digits: COMMON_EXTRA_FLOAT_DIGITS,
        client_encoding: COMMON_CLIENT_ENCODING.to_string(),
        timezone: COMMON_TIMEZONE.to_string(),
        statement_timeout: 30_000,
        lock_timeout: 10_000,
        idle_in_transaction_session_timeout: 60_000,
        application_name: APP_NAME_SCHEMALOG.to_string(),
    });

#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub intervalstyle: String,
    pub extra_float_digits: i32,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub lock_timeout: u32,
    pub idle_in_transaction_session_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    /// Renders the settings as the value of the libpq `options` parameter.
    pub fn to_options_string(&self) -> String {
        format!(
            "-c datestyle={} -c intervalstyle={} -c extra_float_digits={} -c client_encoding={} -c timezone={} -c statement_timeout={} -c lock_timeout={} -c idle_in_transaction_session_timeout={} -c application_name={}",
            self.datestyle,
            self.intervalstyle,
            self.extra_float_digits,
            self.client_encoding,
            self.timezone,
            self.statement_timeout,
            self.lock_timeout,
            self.idle_in_transaction_session_timeout,
            self.application_name
        )
    }

    pub fn to_key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), self.datestyle.clone()),
            ("intervalstyle".to_string(), self.intervalstyle.clone()),
            (
                "extra_float_digits".to_string(),
                self.extra_float_digits.to_string(),
            ),
            ("client_encoding".to_string(), self.client_encoding.clone()),
            ("timezone".to_string(), self.timezone.clone()),
            (
                "statement_timeout".to_string(),
                self.statement_timeout.to_string(),
            ),
            ("lock_timeout".to_string(), self.lock_timeout.to_string()),
            (
                "idle_in_transaction_session_timeout".to_string(),
                self.idle_in_transaction_session_timeout.to_string(),
            ),
            ("application_name".to_string(), self.application_name.clone()),
        ]
    }
}

/// Quotes a libpq keyword/value connection string value when needed.
pub fn quote_connection_value(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');

    if !needs_quoting {
        return value.to_string();
    }

    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Connection settings of a Postgres database.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the password.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: Option<SerializableSecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyValue("host"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyValue("name"));
        }

        self.tls.validate()
    }

    fn ssl_mode(&self) -> &'static str {
        if self.tls.enabled {
            "verify-full"
        } else {
            "prefer"
        }
    }

    /// Renders a libpq keyword/value connection string, understood both by the Postgres client
    /// binaries and by `tokio_postgres`.
    ///
    /// With TLS enabled the server certificate and host name are verified. `root_cert_path` must
    /// then point to a PEM file holding [`TlsConfig::trusted_root_certs`], otherwise libpq falls
    /// back to `~/.postgresql/root.crt`.
    ///
    /// The string contains the password, so it must never be logged.
    pub fn to_connection_string(
        &self,
        options: Option<&PgConnectionOptions>,
        root_cert_path: Option<&Path>,
    ) -> String {
        let mut params = vec![
            ("host", self.host.clone()),
            ("port", self.port.to_string()),
            ("dbname", self.name.clone()),
            ("user", self.username.clone()),
        ];

        if let Some(password) = &self.password {
            params.push(("password", password.expose_secret().clone()));
        }

        params.push(("sslmode", self.ssl_mode().to_string()));

        if self.tls.enabled
            && let Some(root_cert_path) = root_cert_path
        {
            params.push(("sslrootcert", root_cert_path.display().to_string()));
        }

        if let Some(options) = options {
            params.push(("options", options.to_options_string()));
        }

        params
            .iter()
            .map(|(key, value)| format!("{key}={}", quote_connection_value(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Shows where the config points to, without credentials.
impl fmt::Display for PgConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: "".to_string(),
            enabled: false,
        }
    }

    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled without
    /// certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Conversion of [`PgConnectionConfig`] into client specific connect options.
pub trait IntoConnectOptions<Output> {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> Output;
    fn with_db(&self, options: Option<&PgConnectionOptions>) -> Output;
}

impl IntoConnectOptions<SqlxConnectOptions> for PgConnectionConfig {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> SqlxConnectOptions {
        let ssl_mode = if self.tls.enabled {
            SqlxSslMode::VerifyFull
        } else {
            SqlxSslMode::Prefer
        };
        let mut connect_options = SqlxConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());

        if let Some(password) = &self.password {
            connect_options = connect_options.password(password.expose_secret());
        }

        if let Some(opts) = options {
            connect_options = connect_options.options(opts.to_key_value_pairs());
        }

        connect_options
    }

    fn with_db(&self, options: Option<&PgConnectionOptions>) -> SqlxConnectOptions {
        let connect_options: SqlxConnectOptions = self.without_db(options);
        connect_options.database(&self.name)
    }
}
