use envconfig::Envconfig;
use log::debug;

/// Connection settings for the Cube.js REST API, read once at startup.
///
/// A missing `CUBEJS_API_TOKEN` is not an error: deployments running in dev
/// mode or with a permissive `checkAuth` accept anonymous requests.
#[derive(Envconfig, Clone)]
pub struct CubeApiConfig {
    #[envconfig(
        from = "CUBEJS_API_BASE_URL",
        default = "http://localhost:4000/cubejs-api/v1"
    )]
    pub base_url: String,

    #[envconfig(from = "CUBEJS_API_TOKEN")]
    pub api_token: Option<String>,

    #[envconfig(from = "CUBEJS_REQUEST_TIMEOUT_SECS", default = "30")]
    pub timeout_secs: u64,
}

impl CubeApiConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "CubeApiConfig loaded: base_url={}, token_configured={}, timeout_secs={}",
            config.base_url,
            config.api_token.is_some(),
            config.timeout_secs
        );
        Ok(config)
    }
}
