//! # Application manifests
//!
//! DigitalOcean App Platform application specification, which is generated
//! for the user to apply with `doctl`. Manifests are write-only: they are
//! never parsed back.

use common::config;
use serde::Serialize;

use crate::providers::Environment;

/// Service runtime environment slug.
const NODE_ENVIRONMENT_SLUG: &str = "node-js";

/// Name of the generated web service.
const SERVICE_NAME: &str = "web";

/// Name of the generated static site.
const STATIC_SITE_NAME: &str = "frontend";

/// Route of the generated static site.
const STATIC_SITE_ROUTE: &str = "/static";

/// Top-level application specification.
#[derive(Debug, Serialize)]
pub(crate) struct AppSpec {
    /// Application name.
    pub name: String,

    /// Long-running services.
    pub services: Vec<ServiceSpec>,

    /// Static sites served directly from the repository.
    pub static_sites: Vec<StaticSiteSpec>,
}

/// Long-running service specification.
#[derive(Debug, Serialize)]
pub(crate) struct ServiceSpec {
    /// Service name.
    pub name: String,

    /// Directory inside of the repository to build from.
    pub source_dir: String,

    /// Source repository.
    pub github: GithubSource,

    /// Command that starts the service.
    pub run_command: String,

    /// Runtime environment slug.
    pub environment_slug: String,

    /// Count of running instances.
    pub instance_count: u32,

    /// Instance size slug.
    pub instance_size_slug: String,

    /// Port the service listens on.
    pub http_port: u16,

    /// Public routes.
    pub routes: Vec<Route>,

    /// Service environment variables.
    pub envs: Vec<EnvVar>,
}

/// Static site specification.
#[derive(Debug, Serialize)]
pub(crate) struct StaticSiteSpec {
    /// Site name.
    pub name: String,

    /// Directory inside of the repository to publish.
    pub source_dir: String,

    /// Public routes.
    pub routes: Vec<Route>,
}

/// GitHub repository reference.
#[derive(Debug, Serialize)]
pub(crate) struct GithubSource {
    /// Repository in `owner/name` form.
    pub repo: String,

    /// Deployed branch.
    pub branch: String,
}

/// HTTP route.
#[derive(Debug, Serialize)]
pub(crate) struct Route {
    /// Route path prefix.
    pub path: String,
}

/// Environment variable.
#[derive(Debug, Serialize)]
pub(crate) struct EnvVar {
    /// Variable name.
    pub key: String,

    /// Variable value.
    pub value: String,
}

impl AppSpec {
    /// Build the application specification of the provided `environment`.
    pub(crate) fn new(config: &config::Deploy, environment: Environment) -> Self {
        let service = ServiceSpec {
            name: String::from(SERVICE_NAME),
            source_dir: String::from("/"),
            github: GithubSource {
                repo: config.app_repository.clone(),
                branch: config.app_branch.clone(),
            },
            run_command: format!("{} {}", config.runtime, slash_path(&config.server_entry)),
            environment_slug: String::from(NODE_ENVIRONMENT_SLUG),
            instance_count: 1,
            instance_size_slug: config.instance_size.clone(),
            http_port: config.app_http_port,
            routes: vec![Route {
                path: String::from("/"),
            }],
            envs: vec![EnvVar {
                key: String::from("NODE_ENV"),
                value: environment.to_string(),
            }],
        };

        let static_site = StaticSiteSpec {
            name: String::from(STATIC_SITE_NAME),
            source_dir: format!("/{}", slash_path(&config.assets_dir)),
            routes: vec![Route {
                path: String::from(STATIC_SITE_ROUTE),
            }],
        };

        Self {
            name: format!("{}-{environment}", config.bucket_prefix),
            services: vec![service],
            static_sites: vec![static_site],
        }
    }

    /// Serialize the specification as YAML.
    pub(crate) fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Render a relative path with `/` separators.
fn slash_path(path: &std::path::Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
