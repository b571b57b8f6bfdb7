//! Alibaba Cloud provider and per-invocation session

use crate::api::AliyunClients;
use crate::cli::AliyunCli;
use crate::credentials::{Credentials, ENV_PREFIX};
use crate::error::Result;
use provflow_cloud::{
    EnvFunctions, HandlerContext, Ownership, Prompter, RetryConfig, TerminalPrompter, WaitConfig,
    Waiter, env_key,
};
use provflow_config::Config;
use std::future::Future;
use std::sync::Arc;

/// Builds the per-product clients for one set of credentials
pub trait ClientFactory: Send + Sync {
    fn clients(&self, credentials: &Credentials) -> AliyunClients;
}

/// Clients backed by the `aliyun` CLI
#[derive(Debug, Clone, Default)]
pub struct CliClientFactory {
    binary: Option<String>,
}

impl CliClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }
}

impl ClientFactory for CliClientFactory {
    fn clients(&self, credentials: &Credentials) -> AliyunClients {
        let mut cli = AliyunCli::new(credentials.clone());
        if let Some(binary) = &self.binary {
            cli = cli.with_binary(binary.clone());
        }
        AliyunClients::uniform(Arc::new(cli))
    }
}

/// Alibaba Cloud provider
///
/// Shared by every registered handler; each invocation opens its own
/// [`Aliyun`] session from the handler context and configuration.
#[derive(Clone)]
pub struct AliyunProvider {
    factory: Arc<dyn ClientFactory>,
    prompter: Arc<dyn Prompter>,
    retry: RetryConfig,
}

impl AliyunProvider {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            prompter: Arc::new(TerminalPrompter),
            retry: RetryConfig::default(),
        }
    }

    /// Provider driving the `aliyun` CLI found on `PATH`
    pub fn cli() -> Self {
        Self::new(Arc::new(CliClientFactory::new()))
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Backoff applied to each mutating provider call
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve code and credentials, then build the session's clients
    pub fn connect(&self, ctx: HandlerContext, config: Config) -> Result<Aliyun> {
        let credentials = Credentials::resolve(&config)?;
        let ownership = Ownership::new(ctx.resolve_code(&config)?)?;
        let clients = self.factory.clients(&credentials);
        let env = EnvFunctions::with_defaults(self.prompter.clone(), ctx.env().clone());

        tracing::debug!(
            code = ownership.code(),
            region = %credentials.region,
            "Aliyun session opened"
        );

        Ok(Aliyun {
            config,
            region: credentials.region,
            ownership,
            clients,
            ctx,
            env,
            retry: self.retry.clone(),
        })
    }
}

/// One handler invocation's view of the account
pub struct Aliyun {
    pub(crate) config: Config,
    pub(crate) region: String,
    pub(crate) ownership: Ownership,
    pub(crate) clients: AliyunClients,
    pub(crate) ctx: HandlerContext,
    pub(crate) env: EnvFunctions,
    pub(crate) retry: RetryConfig,
}

impl Aliyun {
    pub fn code(&self) -> &str {
        self.ownership.code()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Configuration section at `path`
    pub(crate) fn section(&self, path: &str) -> Config {
        self.config.get_config(path)
    }

    pub(crate) fn waiter(&self, config: WaitConfig) -> Waiter {
        Waiter::new(config).with_cancel(self.ctx.cancel_token().clone())
    }

    /// Resolve an env-function expression for configuration key `key`
    pub(crate) fn resolve_value(&self, key: &str, expr: &str) -> provflow_cloud::Result<String> {
        self.env.resolve(key, expr)
    }

    /// Export `ENV_ALIYUN_<KEY>` for later steps
    pub(crate) fn export(&self, key: &str, value: &str) {
        let name = env_key(ENV_PREFIX, key);
        tracing::debug!(name = %name, "Environment exported");
        self.ctx.env().set(&name, value);
    }

    /// Issue one mutating provider call, retrying transient errors
    pub(crate) async fn call<T, F, Fut>(&self, what: &str, f: F) -> provflow_cloud::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = provflow_cloud::Result<T>>,
    {
        provflow_cloud::retry(&self.retry, what, f).await
    }
}
