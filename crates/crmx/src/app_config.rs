//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing.", every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. `CRMX_*` environment variables form the base layer,
//! a TOML file (if any) is merged on top. Nested keys use a double underscore:
//! `CRMX_DESTINATION__TOKEN` lands in `destination.token`.
//!
//! ```toml
//! [source]
//! base_url = "https://old-crm.example.com"
//! token = "..."
//!
//! [destination]
//! base_url = "https://new-crm.example.com"
//! token = "..."
//!
//! [runtime]
//! pacing_delay_ms = 50
//!
//! [mapping]
//! plan_match = "most_specific"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::plans::MatchStrategy;

/// 📦 Everything a run needs to know about the world outside the process.
///
/// Both endpoints are optional at parse time: a `clients --dry-run` needs neither,
/// `invoices --import-from` needs only the destination. Commands ask for the
/// endpoint they need through [`AppConfig::source`] / [`AppConfig::destination`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// 📡 The old instance, the one with the expiring license.
    #[serde(default)]
    pub source: Option<ApiEndpointConfig>,
    /// 📡 The new instance. Everything gets written here.
    #[serde(default)]
    pub destination: Option<ApiEndpointConfig>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

impl AppConfig {
    pub fn source(&self) -> anyhow::Result<&ApiEndpointConfig> {
        self.source.as_ref().context(
            "💀 This command reads from the source CRM, but no [source] section was configured. \
             Set [source] base_url/token in the config file or CRMX_SOURCE__BASE_URL / CRMX_SOURCE__TOKEN.",
        )
    }

    pub fn destination(&self) -> anyhow::Result<&ApiEndpointConfig> {
        self.destination.as_ref().context(
            "💀 This command writes to the destination CRM, but no [destination] section was configured. \
             Set [destination] base_url/token in the config file or CRMX_DESTINATION__BASE_URL / CRMX_DESTINATION__TOKEN.",
        )
    }
}

/// 🔒 One CRM instance: where it lives and the key that opens it.
#[derive(Deserialize, Clone, PartialEq)]
pub struct ApiEndpointConfig {
    /// Scheme + host, no API prefix. `/crm/api/v1.0` is appended for you.
    pub base_url: String,
    /// Sent as `X-Auth-App-Key`.
    pub token: String,
    /// 🔓 Off by default: both CRMs run self-signed certs.
    #[serde(default)]
    pub verify_tls: bool,
}

// -- 🎭 manual Debug so the token never ends up in a log line or a panic message
impl fmt::Debug for ApiEndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiEndpointConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// ⏱️ Knobs for how politely and how far we go.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 🔄 Total tries for a request that keeps failing on the wire. 429s don't count.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff after the n-th connection failure is `n * backoff_step_secs`.
    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,
    /// Used when a 429 shows up without a `Retry-After`.
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
    /// 💤 Nap between records. The CRM is old. Be kind.
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,
    /// 📦 Page size for the full scans that build lookup tables.
    #[serde(default = "default_discovery_page_size")]
    pub discovery_page_size: usize,
    /// 📦 Page size for exports (invoices, services).
    #[serde(default = "default_export_page_size")]
    pub export_page_size: usize,
    /// 📊 Log a checkpoint line every this many records.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    /// 🧪 Overrides the per-command `--test` size when set.
    #[serde(default)]
    pub test_limit: Option<usize>,
    /// 📁 Where logs, exports and failure manifests land.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_secs() -> u64 {
    5
}

// -- 🚦 a full minute. the CRM's rate limiter has never once been in a hurry.
fn default_retry_after_secs() -> u64 {
    60
}

fn default_pacing_delay_ms() -> u64 {
    50
}

fn default_discovery_page_size() -> usize {
    10_000
}

fn default_export_page_size() -> usize {
    500
}

fn default_progress_every() -> usize {
    500
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step_secs(),
            default_retry_after_secs: default_retry_after_secs(),
            pacing_delay_ms: default_pacing_delay_ms(),
            discovery_page_size: default_discovery_page_size(),
            export_page_size: default_export_page_size(),
            progress_every: default_progress_every(),
            test_limit: None,
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

/// 🗺️ Destination-specific constants that end up inside payloads.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MappingConfig {
    /// 🌏 `countryId` stamped on every created client.
    #[serde(default = "default_country_id")]
    pub country_id: u64,
    /// Offset appended to naive timestamps, `+HHMM`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// 💸 Payment currency when the invoice doesn't carry one.
    #[serde(default = "default_currency_code")]
    pub currency_code: String,
    /// The destination's payment method for imported payments.
    #[serde(default = "default_payment_method_id")]
    pub payment_method_id: String,
    #[serde(default = "default_maturity_days")]
    pub default_maturity_days: i64,
    /// 🔑 Client-level custom attribute on the source holding the PPPoE username.
    #[serde(default = "default_source_pppoe_attribute_id")]
    pub source_pppoe_attribute_id: u64,
    /// 🔑 Service-level custom attribute on the destination that receives it.
    #[serde(default = "default_destination_pppoe_attribute_id")]
    pub destination_pppoe_attribute_id: u64,
    #[serde(default)]
    pub plan_match: MatchStrategy,
}

fn default_country_id() -> u64 {
    170
}

fn default_utc_offset() -> String {
    "+0800".to_string()
}

fn default_currency_code() -> String {
    "PHP".to_string()
}

fn default_payment_method_id() -> String {
    "6efe0fa8-36b2-4dd1-b049-427bffc7d369".to_string()
}

fn default_maturity_days() -> i64 {
    14
}

fn default_source_pppoe_attribute_id() -> u64 {
    1
}

fn default_destination_pppoe_attribute_id() -> u64 {
    2
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            country_id: default_country_id(),
            utc_offset: default_utc_offset(),
            currency_code: default_currency_code(),
            payment_method_id: default_payment_method_id(),
            default_maturity_days: default_maturity_days(),
            source_pppoe_attribute_id: default_source_pppoe_attribute_id(),
            destination_pppoe_attribute_id: default_destination_pppoe_attribute_id(),
            plan_match: MatchStrategy::default(),
        }
    }
}

/// 🚀 Load the config, from a file, from env vars, or from the sheer power of hoping.
///
/// 📐 `None` means env vars only. `Some(path)` means env vars plus the TOML file,
/// TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable, with a message that says where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("CRMX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (CRMX_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (CRMX_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
