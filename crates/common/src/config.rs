use std::{path::PathBuf, time::Duration};

use byte_unit::n_mib_bytes;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

/// Default configuration file, looked up in the invocation's working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Vib3.toml";

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
///
/// [`FromStr`]: std::str::FromStr
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// Logging configuration.
#[cfg(feature = "logging")]
#[derive(Deserialize)]
pub struct Logging {
    /// Log level.
    #[serde(deserialize_with = "deserialize_from_str")]
    pub level: LevelFilter,
}

#[cfg(feature = "logging")]
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
        }
    }
}

/// AWS S3-compatible storage configuration.
#[derive(Deserialize)]
pub struct Storage {
    /// Region used when a command doesn't specify one explicitly.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom S3-compatible endpoint URL.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Static access key identifier.
    ///
    /// When either of the static keys is missing, the default
    /// credential provider chain is used instead.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Address buckets by path instead of by virtual host.
    #[serde(default)]
    pub force_path_style: bool,

    /// Multipart upload part size, in bytes.
    ///
    /// Files that fit into a single part are uploaded with one request.
    #[serde(default = "default_part_size")]
    pub part_size: u64,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            part_size: default_part_size(),
        }
    }
}

fn default_region() -> String {
    String::from("us-east-1")
}

fn default_part_size() -> u64 {
    n_mib_bytes!(8) as u64
}

/// Web deployment configuration.
///
/// All paths are relative to the invocation's working directory.
#[derive(Deserialize)]
pub struct Deploy {
    /// Static assets directory published by the object storage provider.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Server entry point started by the local provider.
    #[serde(default = "default_server_entry")]
    pub server_entry: PathBuf,

    /// Runtime binary used to start the server entry point.
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Package manager used to install server dependencies.
    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Package manifest which requires dependency installation.
    #[serde(default = "default_package_manifest")]
    pub package_manifest: PathBuf,

    /// Directory that marks dependencies as installed.
    #[serde(default = "default_dependencies_dir")]
    pub dependencies_dir: PathBuf,

    /// Deployment key/value configuration document.
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,

    /// Deployment history document.
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,

    /// Max count of deployment records retained per provider.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Prefix of generated bucket and application names.
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,

    /// Website index document.
    #[serde(default = "default_index_document")]
    pub index_document: String,

    /// Website error document.
    #[serde(default = "default_error_document")]
    pub error_document: String,

    /// AWS CLI binary name.
    #[serde(default = "default_aws_cli")]
    pub aws_cli: String,

    /// Oracle Cloud CLI binary name.
    #[serde(default = "default_oci_cli")]
    pub oci_cli: String,

    /// DigitalOcean CLI binary name.
    #[serde(default = "default_doctl")]
    pub doctl: String,

    /// Max duration of a single tool probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Source repository referenced by generated application specs.
    #[serde(default = "default_app_repository")]
    pub app_repository: String,

    /// Source branch referenced by generated application specs.
    #[serde(default = "default_app_branch")]
    pub app_branch: String,

    /// HTTP port exposed by the generated application service.
    #[serde(default = "default_app_http_port")]
    pub app_http_port: u16,

    /// Instance size of the generated application service.
    #[serde(default = "default_instance_size")]
    pub instance_size: String,
}

impl Deploy {
    /// Tool probe timeout as a [`Duration`].
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

impl Default for Deploy {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            server_entry: default_server_entry(),
            runtime: default_runtime(),
            package_manager: default_package_manager(),
            package_manifest: default_package_manifest(),
            dependencies_dir: default_dependencies_dir(),
            config_file: default_config_file(),
            ledger_file: default_ledger_file(),
            history_limit: default_history_limit(),
            bucket_prefix: default_bucket_prefix(),
            index_document: default_index_document(),
            error_document: default_error_document(),
            aws_cli: default_aws_cli(),
            oci_cli: default_oci_cli(),
            doctl: default_doctl(),
            probe_timeout: default_probe_timeout(),
            app_repository: default_app_repository(),
            app_branch: default_app_branch(),
            app_http_port: default_app_http_port(),
            instance_size: default_instance_size(),
        }
    }
}

// Default values mirror the layout of a Node.js project
// with static assets in the `www` directory.
fn default_assets_dir() -> PathBuf {
    PathBuf::from("www")
}

fn default_server_entry() -> PathBuf {
    PathBuf::from("server.js")
}

fn default_runtime() -> String {
    String::from("node")
}

fn default_package_manager() -> String {
    String::from("npm")
}

fn default_package_manifest() -> PathBuf {
    PathBuf::from("package.json")
}

fn default_dependencies_dir() -> PathBuf {
    PathBuf::from("node_modules")
}

fn default_config_file() -> PathBuf {
    PathBuf::from(".vib3_deploy_config.json")
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from(".vib3_deployments.json")
}

fn default_history_limit() -> usize {
    5
}

fn default_bucket_prefix() -> String {
    String::from("vib3")
}

fn default_index_document() -> String {
    String::from("index.html")
}

fn default_error_document() -> String {
    String::from("error.html")
}

fn default_aws_cli() -> String {
    String::from("aws")
}

fn default_oci_cli() -> String {
    String::from("oci")
}

fn default_doctl() -> String {
    String::from("doctl")
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_app_repository() -> String {
    String::from("your-username/vib3")
}

fn default_app_branch() -> String {
    String::from("main")
}

fn default_app_http_port() -> u16 {
    3000
}

fn default_instance_size() -> String {
    String::from("basic-xxs")
}

/// General configuration.
#[derive(Deserialize, Default)]
pub struct Config {
    /// Logging configuration.
    #[cfg(feature = "logging")]
    #[serde(default)]
    pub logging: Logging,

    /// Storage configuration.
    #[serde(default)]
    pub storage: Storage,

    /// Web deployment configuration.
    #[serde(default)]
    pub deploy: Deploy,
}

impl Config {
    /// Create new config using default configuration file or environment variables.
    ///
    /// Nested values are set with a double underscore separator,
    /// for example `VIB3_STORAGE__REGION=eu-west-1`.
    /// See [`Env`] for more details on how to use environment variables configuration.
    ///
    /// [`Env`]: figment::providers::Env
    pub fn new(path: Option<PathBuf>) -> Result<Self, figment::Error> {
        Self::figment(path.unwrap_or(PathBuf::from(DEFAULT_CONFIG_FILE))).extract()
    }

    /// Configuration sources, in the order of increasing priority.
    fn figment(path: PathBuf) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VIB3_").split("__"))
    }
}
