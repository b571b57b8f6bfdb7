//! Access keys and default region

use crate::error::{AliyunError, Result};
use provflow_config::Config;

/// Prefix of every environment variable provflow reads or exports
pub const ENV_PREFIX: &str = "ENV_ALIYUN_";

pub const ENV_ACCESS_KEY_ID: &str = "ENV_ALIYUN_ACCESS_KEY_ID";
pub const ENV_ACCESS_KEY_SECRET: &str = "ENV_ALIYUN_ACCESS_KEY_SECRET";
pub const ENV_REGION: &str = "ENV_ALIYUN_REGION";

/// Resolved account credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub region: String,
}

impl Credentials {
    /// Read `aliyun.access-key-id`, `aliyun.access-key-secret` and
    /// `aliyun.region`, falling back to the `ENV_ALIYUN_*` variables.
    pub fn resolve(config: &Config) -> Result<Self> {
        let access_key_id = lookup(config, "aliyun.access-key-id", ENV_ACCESS_KEY_ID);
        let access_key_secret = lookup(config, "aliyun.access-key-secret", ENV_ACCESS_KEY_SECRET);
        let region = lookup(config, "aliyun.region", ENV_REGION);

        let (Some(access_key_id), Some(access_key_secret)) = (access_key_id, access_key_secret)
        else {
            return Err(AliyunError::MissingCredentials);
        };
        let region = region.ok_or(AliyunError::MissingRegion)?;

        Ok(Self {
            access_key_id,
            access_key_secret,
            region,
        })
    }
}

fn lookup(config: &Config, path: &str, env: &str) -> Option<String> {
    config
        .get_string(path)
        .or_else(|| std::env::var(env).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}
