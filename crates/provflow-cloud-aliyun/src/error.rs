//! Alibaba Cloud provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AliyunError {
    #[error(
        "please set aliyun.access-key-id into config or ${{ENV_ALIYUN_ACCESS_KEY_ID}}, and aliyun.access-key-secret into config or ${{ENV_ALIYUN_ACCESS_KEY_SECRET}}"
    )]
    MissingCredentials,

    #[error("region is empty, please set aliyun.region into config or ${{ENV_ALIYUN_REGION}}")]
    MissingRegion,

    #[error("aliyun CLI not found. Please install: https://github.com/aliyun/aliyun-cli")]
    CliNotFound,

    #[error(transparent)]
    Cloud(#[from] provflow_cloud::CloudError),

    #[error(transparent)]
    Config(#[from] provflow_config::ConfigError),
}

impl AliyunError {
    /// The reconciliation error behind this one, if any
    pub fn as_cloud(&self) -> Option<&provflow_cloud::CloudError> {
        match self {
            Self::Cloud(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AliyunError>;
