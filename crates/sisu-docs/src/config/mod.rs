use chrono::FixedOffset;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEVELOPMENT_SESSION_SECRET: &str = "sisu-docs-development-session-secret";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub site: SiteConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub intake: IntakeConfig,
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let site = SiteConfig {
            name: env::var("APP_SITE_NAME").unwrap_or_else(|_| "SiSU Docs".to_string()),
            portal_url: env::var("APP_PORTAL_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}/portal")),
            admin_url: env::var("APP_ADMIN_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}/admin")),
        };

        let database = DatabaseConfig {
            url: non_empty_var("DATABASE_URL"),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
        };

        let storage = StorageConfig {
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads/sisu-docs".to_string()),
            ),
            body_limit_bytes: parse_var("UPLOAD_BODY_LIMIT", 64 * 1024 * 1024)?,
        };

        let secret = match non_empty_var("SESSION_SECRET") {
            Some(secret) => secret,
            None if environment.is_production() => return Err(ConfigError::MissingSessionSecret),
            None => DEVELOPMENT_SESSION_SECRET.to_string(),
        };
        let session = SessionConfig {
            secret,
            ttl_hours: parse_var("SESSION_TTL_HOURS", 24 * 7)?,
            secure_cookie: environment.is_production(),
        };

        let offset_raw = env::var("INTAKE_UTC_OFFSET").unwrap_or_else(|_| "-03:00".to_string());
        let intake = IntakeConfig {
            utc_offset: parse_utc_offset(&offset_raw)
                .ok_or(ConfigError::InvalidUtcOffset { value: offset_raw })?,
        };

        let mail = match non_empty_var("SMTP_HOST") {
            Some(host) => Some(MailConfig {
                host,
                port: parse_var("SMTP_PORT", 587)?,
                username: non_empty_var("SMTP_USER"),
                password: non_empty_var("SMTP_PASS"),
                encryption: SmtpEncryption::from_str(
                    &env::var("SMTP_ENCRYPTION").unwrap_or_else(|_| "STARTTLS".to_string()),
                ),
                from_address: non_empty_var("SMTP_FROM_ADDRESS")
                    .ok_or(ConfigError::MissingVar("SMTP_FROM_ADDRESS"))?,
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| site.name.clone()),
            }),
            None => None,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            site,
            database,
            storage,
            session,
            intake,
            mail,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber { key }),
        None => Ok(default),
    }
}

/// Parses offsets written as `-03:00`, `+0530` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match trimmed.chars().next()? {
        '+' => (1, &trimmed[1..]),
        '-' => (-1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Public-facing names and links embedded in outgoing mail.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub portal_url: String,
    pub admin_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres DSN. The in-memory store is used when absent.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_hours: i64,
    pub secure_cookie: bool,
}

/// Wall-clock offset used to interpret the intake window stored in settings.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub utc_offset: FixedOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpEncryption {
    StartTls,
    Implicit,
    None,
}

impl SmtpEncryption {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "SSL" | "SMTPS" | "TLS" => Self::Implicit,
            "PLAIN" | "NONE" => Self::None,
            _ => Self::StartTls,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: SmtpEncryption,
    pub from_address: String,
    pub from_name: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidUtcOffset { value: String },
    MissingSessionSecret,
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a valid number"),
            ConfigError::InvalidUtcOffset { value } => {
                write!(f, "INTAKE_UTC_OFFSET '{value}' must look like -03:00")
            }
            ConfigError::MissingSessionSecret => {
                write!(f, "SESSION_SECRET is required in production")
            }
            ConfigError::MissingVar(key) => write!(f, "{key} is required"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
