//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{DEFAULT_CONTENT_TTL, MAX_TTL_CEILING};
use crate::domain::types::XFrameOptions;

mod cli;

pub use cli::{CheckArgs, CliArgs, Command, ContentOverride, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "trellis";
const ENV_PREFIX: &str = "TRELLIS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_NAMESPACE: &str = "trellis-page";
const DEFAULT_CACHE_CAPACITY: u64 = 1024;
const DEFAULT_CONTENT_FILE: &str = "content.toml";
const DEFAULT_LOGIN_URL: &str = "/login/";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub content: ContentSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub namespace: String,
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub capacity: NonZeroUsize,
    pub timezone_aware: bool,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub file: PathBuf,
    pub login_url: String,
    pub append_slash: bool,
    pub language_prefix: bool,
    pub default_xframe_options: XFrameOptions,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Check(args)) => raw.apply_content_override(&args.content),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    content: RawContentSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
        if let Some(seconds) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_secs = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_max_ttl_seconds {
            self.cache.max_ttl_secs = Some(seconds);
        }

        self.apply_content_override(&overrides.content);
    }

    fn apply_content_override(&mut self, overrides: &ContentOverride) {
        if let Some(file) = overrides.content_file.as_ref() {
            self.content.file = Some(file.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            content,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let content = build_content_settings(content)?;

        Ok(Self {
            server,
            logging,
            cache,
            content,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());
    if namespace.is_empty() {
        return Err(LoadError::invalid("cache.namespace", "must not be empty"));
    }
    if namespace.contains(char::is_whitespace) {
        return Err(LoadError::invalid(
            "cache.namespace",
            "must not contain whitespace",
        ));
    }

    let default_ttl_secs = cache.default_ttl_secs.unwrap_or(DEFAULT_CONTENT_TTL);
    let max_ttl_secs = cache.max_ttl_secs.unwrap_or(MAX_TTL_CEILING);
    if max_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.max_ttl_secs",
            "must be greater than zero",
        ));
    }

    let capacity = non_zero_u32(
        cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
        "cache.capacity",
    )?;
    let capacity = usize::try_from(capacity.get())
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("cache.capacity", "value exceeds supported range for usize")
        })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        namespace,
        default_ttl_secs,
        max_ttl_secs,
        capacity,
        timezone_aware: cache.timezone_aware.unwrap_or(false),
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let file = content
        .file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_FILE));
    if file.as_os_str().is_empty() {
        return Err(LoadError::invalid("content.file", "path must not be empty"));
    }

    let login_url = content
        .login_url
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string());
    if !(login_url.starts_with('/') || url::Url::parse(&login_url).is_ok()) {
        return Err(LoadError::invalid(
            "content.login_url",
            "must be an absolute URL or start with `/`",
        ));
    }

    let default_xframe_options = match content.default_xframe_options.as_deref() {
        Some(value) => parse_xframe_options(value)
            .ok_or_else(|| {
                LoadError::invalid(
                    "content.default_xframe_options",
                    format!("unknown policy `{value}` (expected deny|sameorigin|allow|inherit)"),
                )
            })?,
        None => XFrameOptions::Inherit,
    };

    Ok(ContentSettings {
        file,
        login_url,
        append_slash: content.append_slash.unwrap_or(true),
        language_prefix: content.language_prefix.unwrap_or(true),
        default_xframe_options,
    })
}

fn parse_xframe_options(value: &str) -> Option<XFrameOptions> {
    match value.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "deny" => Some(XFrameOptions::Deny),
        "sameorigin" => Some(XFrameOptions::SameOrigin),
        "allow" => Some(XFrameOptions::Allow),
        "inherit" | "" => Some(XFrameOptions::Inherit),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    namespace: Option<String>,
    default_ttl_secs: Option<u64>,
    max_ttl_secs: Option<u64>,
    capacity: Option<u64>,
    timezone_aware: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    file: Option<PathBuf>,
    login_url: Option<String>,
    append_slash: Option<bool>,
    language_prefix: Option<bool>,
    default_xframe_options: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
