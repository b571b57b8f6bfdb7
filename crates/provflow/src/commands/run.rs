use anyhow::Context;
use colored::Colorize;
use provflow_cloud::{HandlerContext, HandlerRegistry, Output};
use provflow_cloud_aliyun::{AliyunError, AliyunProvider, Credentials, handlers};
use provflow_config::Config;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct RunOptions {
    pub handlers: Vec<String>,
    pub config: Option<PathBuf>,
    pub code: Option<String>,
    pub outputs: Option<PathBuf>,
}

pub async fn handle(opts: RunOptions) -> anyhow::Result<()> {
    let registry = handlers::registry(AliyunProvider::cli());
    check_names(&registry, &opts.handlers)?;

    let (path, config) = provflow_config::load_config(opts.config.as_deref())?;
    println!("Config file: {}", path.display().to_string().cyan());

    // Setup errors stop the run before any handler touches the account
    Credentials::resolve(&config)?;
    let mut ctx = HandlerContext::new();
    if let Some(code) = opts.code {
        ctx = ctx.with_code(code);
    }
    let code = ctx.resolve_code(&config)?;
    println!("Code: {}", code.cyan());
    println!();

    let cancel = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pending waits");
            cancel.cancel();
        }
    });

    let result = run_handlers(&registry, &ctx, &config, &opts.handlers).await;

    // Outputs published before a failure are still written
    if let Some(outputs) = &opts.outputs {
        write_outputs(outputs, &ctx.outputs().all())?;
        println!(
            "Outputs: {} ({} entries)",
            outputs.display().to_string().cyan(),
            ctx.outputs().len()
        );
    }

    result
}

fn check_names(registry: &HandlerRegistry<AliyunError>, names: &[String]) -> anyhow::Result<()> {
    let unknown: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| !registry.contains(name))
        .collect();

    if !unknown.is_empty() {
        anyhow::bail!(
            "unknown handler: {} (see `provflow handlers`)",
            unknown.join(", ")
        );
    }
    Ok(())
}

async fn run_handlers(
    registry: &HandlerRegistry<AliyunError>,
    ctx: &HandlerContext,
    config: &Config,
    names: &[String],
) -> anyhow::Result<()> {
    let total = names.len();

    for (i, name) in names.iter().enumerate() {
        println!("{} {}", format!("[{}/{}]", i + 1, total).dimmed(), name.cyan());
        let started = Instant::now();

        if let Err(e) = registry.invoke(name, ctx.clone(), config.clone()).await {
            println!("  {} {}", "✗".red().bold(), e);
            return Err(e).with_context(|| format!("handler {name} failed"));
        }

        apply_exports(ctx);
        println!(
            "  {} done in {:.1}s",
            "✓".green(),
            started.elapsed().as_secs_f64()
        );
    }

    println!();
    println!("{}", format!("✓ {total} handler(s) completed").green().bold());
    Ok(())
}

/// Move exported variables into the process environment for later steps
fn apply_exports(ctx: &HandlerContext) {
    for (name, value) in ctx.env().drain() {
        tracing::info!(name = %name, "Environment variable set");
        // SAFETY: handlers run one at a time and no other thread reads the
        // environment while the variable is set
        unsafe {
            std::env::set_var(&name, &value);
        }
    }
}

fn write_outputs(path: &Path, outputs: &[Output]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(outputs)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write outputs to {}", path.display()))?;
    Ok(())
}
