//! Environment functions
//!
//! A configuration value such as `func://pwgen?len=16` is not a literal: it
//! names a function that produces the value at plan time. Expressions that
//! do not use the `func` scheme, or that name an unknown function, are
//! returned unchanged.

use crate::error::{CloudError, Result};
use crate::handler::EnvExports;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use md5::Md5;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use url::Url;

pub const SCHEME: &str = "func";

/// Query parameter that exports the produced value as an environment variable
pub const SET_ENV_PARAM: &str = "set_env";

/// A named value producer
pub trait EnvFunction: Send + Sync {
    /// Produce a value for configuration key `key`
    fn resolve(&self, key: &str, params: &HashMap<String, String>) -> Result<String>;
}

/// Source of interactive input
pub trait Prompter: Send + Sync {
    fn read_line(&self, prompt: &str, secret: bool) -> Result<String>;
}

/// Registry of environment functions
#[derive(Clone)]
pub struct EnvFunctions {
    functions: HashMap<String, Arc<dyn EnvFunction>>,
    exports: EnvExports,
}

impl EnvFunctions {
    /// Empty registry; every expression passes through
    pub fn new(exports: EnvExports) -> Self {
        Self {
            functions: HashMap::new(),
            exports,
        }
    }

    /// `pwgen` and `readline`, reading input through `prompter`
    pub fn with_defaults(prompter: Arc<dyn Prompter>, exports: EnvExports) -> Self {
        let mut functions = Self::new(exports);
        functions.register("pwgen", Arc::new(Pwgen));
        functions.register("readline", Arc::new(Readline::new(prompter)));
        functions
    }

    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn EnvFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `expr` for configuration key `key`
    pub fn resolve(&self, key: &str, expr: &str) -> Result<String> {
        let Some((name, params)) = parse(expr) else {
            return Ok(expr.to_string());
        };

        let Some(function) = self.functions.get(&name) else {
            tracing::debug!(key, function = %name, "Unknown environment function, using literal");
            return Ok(expr.to_string());
        };

        let value = function.resolve(key, &params)?;
        tracing::debug!(key, function = %name, "Resolved environment function");

        if let Some(var) = params.get(SET_ENV_PARAM).filter(|v| !v.is_empty()) {
            self.exports.set(var, &value);
        }

        Ok(value)
    }
}

/// Split a `func://name?query` expression
fn parse(expr: &str) -> Option<(String, HashMap<String, String>)> {
    if !expr.starts_with("func://") {
        return None;
    }

    let url = Url::parse(expr).ok()?;
    if url.scheme() != SCHEME {
        return None;
    }

    let name = url.host_str()?.to_string();
    let params = url.query_pairs().into_owned().collect();
    Some((name, params))
}

/// Longest value `pwgen` generates
const PWGEN_MAX_LEN: usize = 1024;

/// Random alphanumeric string of `len` characters
pub struct Pwgen;

impl EnvFunction for Pwgen {
    fn resolve(&self, key: &str, params: &HashMap<String, String>) -> Result<String> {
        let len: usize = params
            .get("len")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                CloudError::EnvFunction(format!("pwgen for {key} needs a numeric len parameter"))
            })?;
        if len > PWGEN_MAX_LEN {
            return Err(CloudError::EnvFunction(format!(
                "pwgen for {key} asks for {len} characters, at most {PWGEN_MAX_LEN} are allowed"
            )));
        }

        Ok(rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect())
    }
}

/// Interactive input with optional confirmation and hashing
pub struct Readline {
    prompter: Arc<dyn Prompter>,
}

impl Readline {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self { prompter }
    }
}

impl EnvFunction for Readline {
    fn resolve(&self, key: &str, params: &HashMap<String, String>) -> Result<String> {
        let param = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();

        let prompt = match param("prompt") {
            "" => format!("[KEY:{key}]"),
            text => format!("[KEY:{key}] {text}"),
        };
        let secret = matches!(param("type"), "password" | "pwd" | "pass");
        let confirm = matches!(param("confirm"), "true" | "1" | "TRUE" | "True");

        let input = self.prompter.read_line(&format!("{prompt}:"), secret)?;

        if confirm {
            let again = self
                .prompter
                .read_line(&format!("{prompt}[CONFIRM]:"), secret)?;
            if again != input {
                return Err(CloudError::EnvFunction(format!(
                    "the two inputs for {key} do not match"
                )));
            }
        }

        match param("hash").to_ascii_lowercase().as_str() {
            "" => Ok(input),
            "md5" => Ok(format!("{:x}", Md5::digest(input.as_bytes()))),
            "sha256" => Ok(format!("{:x}", Sha256::digest(input.as_bytes()))),
            other => {
                tracing::warn!(key, hash = %other, "Unsupported hash, keeping input as entered");
                Ok(input)
            }
        }
    }
}

/// Reads from the controlling terminal; secret input is not echoed
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_line(&self, prompt: &str, secret: bool) -> Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;

        if !secret {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            return Ok(line.trim_end_matches(['\r', '\n']).to_string());
        }

        terminal::enable_raw_mode()?;
        let outcome = read_hidden();
        terminal::disable_raw_mode()?;
        writeln!(stderr)?;
        outcome
    }
}

fn read_hidden() -> Result<String> {
    let mut line = String::new();

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Enter => return Ok(line),
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Esc => return Err(CloudError::Cancelled("input aborted".to_string())),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(CloudError::Cancelled("input aborted".to_string()));
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}
