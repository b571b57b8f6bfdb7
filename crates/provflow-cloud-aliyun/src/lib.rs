//! Alibaba Cloud provider for provflow
//!
//! This crate implements the `devops.aliyun.*` reconciliation handlers on top
//! of the provider-independent core in `provflow-cloud`.
//!
//! # Families
//!
//! - VPC and VSwitch
//! - ECS instance lookup (used by SLB vserver groups)
//! - RDS instances, accounts and public connections
//! - SLB balancers, listeners, vserver groups and forwarding rules
//! - Container service swarm clusters, volumes and projects
//! - DNS records
//! - OSS buckets
//!
//! # Requirements
//!
//! - The `aliyun` CLI must be installed
//! - Credentials and region come from `aliyun.access-key-id`,
//!   `aliyun.access-key-secret` and `aliyun.region`, or the matching
//!   `ENV_ALIYUN_*` variables
//!
//! # Example
//!
//! ```ignore
//! use provflow_cloud::HandlerContext;
//! use provflow_cloud_aliyun::{AliyunProvider, handlers};
//! use provflow_config::Config;
//!
//! let registry = handlers::registry(AliyunProvider::cli());
//! let config = Config::load("provflow.yaml")?;
//! let ctx = HandlerContext::new().with_code("shop");
//!
//! registry.invoke("devops.aliyun.vpc.vpc.create", ctx.clone(), config.clone()).await?;
//! registry.invoke("devops.aliyun.vpc.vpc.running.wait", ctx, config).await?;
//! ```

pub mod api;
pub mod cli;
pub mod credentials;
pub mod cs;
pub mod dns;
pub mod ecs;
pub mod error;
pub mod handlers;
pub mod oss;
pub mod provider;
pub mod rds;
pub mod slb;
pub mod vpc;

pub use api::AliyunClients;
pub use cli::AliyunCli;
pub use credentials::Credentials;
pub use ecs::InstanceLookup;
pub use error::{AliyunError, Result};
pub use provider::{Aliyun, AliyunProvider, CliClientFactory, ClientFactory};
