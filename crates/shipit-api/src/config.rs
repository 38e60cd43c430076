// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for shipit-api.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use shipit_core::scopes::{ADMIN_GROUP, default_signoff_groups};

/// Deployment channels the service knows about.
pub const APP_CHANNELS: &[&str] = &["dev", "development", "staging", "production"];

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Deployment channel (dev, development, staging or production)
    pub app_channel: String,
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// Taskcluster deployment and credentials
    pub taskcluster: TaskclusterConfig,
    /// Bearer token validation
    pub auth: AuthConfig,
    /// Members of this group hold every scope
    pub admin_group: String,
    /// Signoff permission key -> groups allowed to sign
    pub signoff_groups: BTreeMap<String, Vec<String>>,
    /// GitHub GraphQL access
    pub github: GitHubConfig,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// Matrix notifications
    pub notify: NotifyConfig,
    /// Product details rebuild
    pub product_details: ProductDetailsConfig,
    /// How often the worker polls for rebuild requests
    pub worker_poll_interval: Duration,
    /// `version.json` served by `/__version__`
    pub version_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TaskclusterConfig {
    pub root_url: String,
    pub client_id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider domain (`https://{domain}/` is the token issuer)
    pub domain: Option<String>,
    pub audience: Option<String>,
    /// Claim holding the user's groups
    pub groups_claim: String,
    /// JWKS endpoint; without it tokens are checked against the userinfo endpoint
    pub jwks_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub api_url: String,
    pub xpi_manifest_owner: String,
    pub xpi_manifest_repo: String,
    pub skip_private_repos: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub disabled: bool,
    /// Product (or `default`) -> Matrix handles to mention
    pub owners_per_product: HashMap<String, Vec<String>>,
    /// Product (or `default`) -> Matrix room ids
    pub rooms_per_product: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ProductDetailsConfig {
    pub git_repo_url: Option<String>,
    /// Branch the data set is pushed to; defaults to the deployment channel
    pub git_branch: String,
    /// Folder of the repository holding the data set
    pub folder_in_repo: String,
    /// Working copy location
    pub dir: PathBuf,
    /// On-disk cache of fetched l10n changesets
    pub cache_dir: PathBuf,
    pub breakpoint_version: u32,
    pub current_esr: Option<String>,
    pub esr_next: Option<String>,
    /// Mercurial server the l10n changesets are read from
    pub hg_prefix: String,
    /// Release schedule API (`?version=N` is appended)
    pub schedule_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("SHIPIT_DATABASE_URL"))
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL or SHIPIT_DATABASE_URL"))?;

        let app_channel = validate_channel(
            &std::env::var("APP_CHANNEL").map_err(|_| ConfigError::MissingEnvVar("APP_CHANNEL"))?,
        )?;

        let bind_addr: SocketAddr = env_or("SHIPIT_BIND_ADDR", "0.0.0.0:8015")
            .parse()
            .map_err(|_| ConfigError::InvalidAddr("SHIPIT_BIND_ADDR"))?;

        let taskcluster = TaskclusterConfig {
            root_url: env_or(
                "TASKCLUSTER_ROOT_URL",
                "https://firefox-ci-tc.services.mozilla.com",
            ),
            client_id: env_opt("TASKCLUSTER_CLIENT_ID"),
            access_token: env_opt("TASKCLUSTER_ACCESS_TOKEN"),
        };

        let auth = AuthConfig {
            domain: env_opt("AUTH_DOMAIN"),
            audience: env_opt("AUTH_AUDIENCE"),
            groups_claim: env_or("AUTH_GROUPS_CLAIM", "https://sso.mozilla.com/claim/groups"),
            jwks_url: env_opt("AUTH_JWKS_URL"),
        };

        let signoff_groups = match env_opt("SIGNOFF_GROUPS") {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| ConfigError::InvalidJson("SIGNOFF_GROUPS", e.to_string()))?,
            None => default_signoff_groups(),
        };

        let github = GitHubConfig {
            token: env_opt("GITHUB_TOKEN"),
            api_url: env_or("GITHUB_API_URL", "https://api.github.com/graphql"),
            xpi_manifest_owner: env_or("XPI_MANIFEST_OWNER", "mozilla-extensions"),
            xpi_manifest_repo: env_or("XPI_MANIFEST_REPO", "xpi-manifest"),
            skip_private_repos: env_flag("GITHUB_SKIP_PRIVATE_REPOS"),
        };

        let notify = NotifyConfig {
            disabled: env_flag("DISABLE_NOTIFY"),
            owners_per_product: env_json_map("MATRIX_NOTIFICATIONS_OWNERS_PER_PRODUCT")?,
            rooms_per_product: env_json_map("MATRIX_NOTIFICATIONS_ROOMS_PER_PRODUCT")?,
        };

        let dir = PathBuf::from(env_or("PRODUCT_DETAILS_DIR", ".data/product-details"));
        let cache_dir = env_opt("PRODUCT_DETAILS_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| dir.with_extension("cache"));
        let product_details = ProductDetailsConfig {
            git_repo_url: env_opt("PRODUCT_DETAILS_GIT_REPO_URL"),
            git_branch: env_or("PRODUCT_DETAILS_GIT_BRANCH", &app_channel),
            folder_in_repo: env_or("PRODUCT_DETAILS_FOLDER", "public/"),
            dir,
            cache_dir,
            breakpoint_version: env_number("BREAKPOINT_VERSION", 114)?,
            current_esr: env_opt("CURRENT_ESR"),
            esr_next: env_opt("ESR_NEXT"),
            hg_prefix: env_or("HG_PREFIX", "https://hg.mozilla.org"),
            schedule_url: env_or(
                "RELEASE_SCHEDULE_URL",
                "https://whattrainisitnow.com/api/release/schedule/",
            ),
        };

        let worker_poll_interval =
            Duration::from_secs(env_number("WORKER_POLL_INTERVAL_SECS", 60)?);

        Ok(Self {
            database_url,
            app_channel,
            bind_addr,
            taskcluster,
            auth,
            admin_group: env_or("ADMIN_GROUP", ADMIN_GROUP),
            signoff_groups,
            github,
            cors_origins: parse_origins(&env_or("CORS_ORIGINS", "*")),
            notify,
            product_details,
            worker_poll_interval,
            version_file: PathBuf::from(env_or("SHIPIT_VERSION_FILE", "/app/version.json")),
        })
    }

    /// Development configuration that reads no environment: no credentials,
    /// no OIDC, local product details directory. Used by tests.
    pub fn local(database_url: &str) -> Self {
        let dir = PathBuf::from(".data/product-details");
        Self {
            database_url: database_url.to_string(),
            app_channel: "dev".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8015)),
            taskcluster: TaskclusterConfig {
                root_url: "https://firefox-ci-tc.services.mozilla.com".to_string(),
                client_id: None,
                access_token: None,
            },
            auth: AuthConfig {
                domain: None,
                audience: None,
                groups_claim: "https://sso.mozilla.com/claim/groups".to_string(),
                jwks_url: None,
            },
            admin_group: ADMIN_GROUP.to_string(),
            signoff_groups: default_signoff_groups(),
            github: GitHubConfig {
                token: None,
                api_url: "https://api.github.com/graphql".to_string(),
                xpi_manifest_owner: "mozilla-extensions".to_string(),
                xpi_manifest_repo: "xpi-manifest".to_string(),
                skip_private_repos: false,
            },
            cors_origins: vec!["*".to_string()],
            notify: NotifyConfig::default(),
            product_details: ProductDetailsConfig {
                git_repo_url: None,
                git_branch: "dev".to_string(),
                folder_in_repo: "public/".to_string(),
                cache_dir: dir.with_extension("cache"),
                dir,
                breakpoint_version: 114,
                current_esr: None,
                esr_next: None,
                hg_prefix: "https://hg.mozilla.org".to_string(),
                schedule_url: "https://whattrainisitnow.com/api/release/schedule/".to_string(),
            },
            worker_poll_interval: Duration::from_secs(60),
            version_file: PathBuf::from("version.json"),
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn env_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_opt(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(name)),
        None => Ok(default),
    }
}

fn env_json_map(name: &'static str) -> Result<HashMap<String, Vec<String>>, ConfigError> {
    match env_opt(name) {
        Some(raw) => {
            serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidJson(name, e.to_string()))
        }
        None => Ok(HashMap::new()),
    }
}

/// Accept a deployment channel name.
pub fn validate_channel(channel: &str) -> Result<String, ConfigError> {
    if APP_CHANNELS.contains(&channel) {
        Ok(channel.to_string())
    } else {
        Err(ConfigError::InvalidChannel(channel.to_string()))
    }
}

/// Split a CORS origin list on commas and whitespace.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// APP_CHANNEL is not a known channel.
    #[error("Invalid APP_CHANNEL `{0}`, expected one of dev, development, staging, production")]
    InvalidChannel(String),
    /// A socket address could not be parsed.
    #[error("Invalid address in {0}")]
    InvalidAddr(&'static str),
    /// A number could not be parsed.
    #[error("Invalid number in {0}")]
    InvalidNumber(&'static str),
    /// A JSON value could not be parsed.
    #[error("Invalid JSON in {0}: {1}")]
    InvalidJson(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_channel() {
        assert_eq!(validate_channel("staging").unwrap(), "staging");
        assert_eq!(validate_channel("dev").unwrap(), "dev");
        let err = validate_channel("prod").unwrap_err();
        assert!(err.to_string().contains("`prod`"));
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(parse_origins("*"), vec!["*"]);
        assert_eq!(
            parse_origins("https://a.example.com, https://b.example.com https://c.example.com"),
            vec![
                "https://a.example.com",
                "https://b.example.com",
                "https://c.example.com"
            ]
        );
        assert!(parse_origins("  ").is_empty());
    }
}
