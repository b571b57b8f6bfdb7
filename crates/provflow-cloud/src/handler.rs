//! Named handlers and their request context
//!
//! Every reconciliation step is registered under a dotted name such as
//! `devops.aliyun.vpc.vpc.create` and invoked with a [`HandlerContext`] and a
//! configuration snapshot. Handlers publish side-channel results through the
//! context's output sink and environment exports.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use provflow_config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build an environment variable name: `prefix` + upper-cased `key` with
/// `-`, `.`, space and `:` replaced by `_`
pub fn env_key(prefix: &str, key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' | ':' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{prefix}{key}")
}

/// Environment variables exported by handlers, in export order
#[derive(Debug, Clone, Default)]
pub struct EnvExports {
    vars: Arc<Mutex<Vec<(String, String)>>>,
}

impl EnvExports {
    /// Record an export; a later export of the same name replaces the value
    pub fn set(&self, name: &str, value: &str) {
        let mut vars = lock(&self.vars);
        match vars.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => vars.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        lock(&self.vars)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Take every pending export
    pub fn drain(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *lock(&self.vars))
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.vars).is_empty()
    }
}

/// One published output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub value: serde_json::Value,
    pub tags: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only sink for handler outputs
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    outputs: Arc<Mutex<Vec<Output>>>,
}

impl OutputSink {
    pub fn append<T: Serialize>(&self, name: &str, value: &T, tags: Vec<String>) -> Result<()> {
        let output = Output {
            name: name.to_string(),
            value: serde_json::to_value(value)?,
            tags,
            recorded_at: Utc::now(),
        };

        tracing::debug!(name, tags = ?output.tags, "Output published");
        lock(&self.outputs).push(output);
        Ok(())
    }

    pub fn all(&self) -> Vec<Output> {
        lock(&self.outputs).clone()
    }

    /// Most recent output published under `name`
    pub fn latest(&self, name: &str) -> Option<Output> {
        lock(&self.outputs)
            .iter()
            .rev()
            .find(|o| o.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.outputs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.outputs).is_empty()
    }
}

/// Request-scoped context shared by the handlers of one run
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    code: Option<String>,
    outputs: OutputSink,
    env: EnvExports,
    cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.code = (!code.trim().is_empty()).then_some(code);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The context's code, falling back to the top-level `code` key
    pub fn resolve_code(&self, config: &Config) -> Result<String> {
        self.code
            .clone()
            .or_else(|| config.get_string("code"))
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .ok_or_else(|| CloudError::invalid("code", "the context of code is empty"))
    }

    pub fn outputs(&self) -> &OutputSink {
        &self.outputs
    }

    pub fn env(&self) -> &EnvExports {
        &self.env
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

type HandlerFn<E> =
    Arc<dyn Fn(HandlerContext, Config) -> BoxFuture<'static, std::result::Result<(), E>> + Send + Sync>;

/// Dotted name to handler map
pub struct HandlerRegistry<E = CloudError> {
    handlers: BTreeMap<String, HandlerFn<E>>,
}

impl<E> HandlerRegistry<E>
where
    E: From<CloudError> + 'static,
{
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(HandlerContext, Config) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    {
        let handler: HandlerFn<E> = Arc::new(
            move |ctx: HandlerContext, config: Config| -> BoxFuture<'static, std::result::Result<(), E>> {
                Box::pin(handler(ctx, config))
            },
        );
        if self.handlers.insert(name.to_string(), handler).is_some() {
            tracing::warn!(handler = name, "Handler registered twice, keeping the last one");
        }
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn invoke(
        &self,
        name: &str,
        ctx: HandlerContext,
        config: Config,
    ) -> std::result::Result<(), E> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| CloudError::HandlerNotFound(name.to_string()))?;

        tracing::info!(handler = name, "Invoking handler");
        handler(ctx, config).await
    }
}

impl<E> Default for HandlerRegistry<E>
where
    E: From<CloudError> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
