//! provflow reconciliation core
//!
//! This crate holds the provider-independent half of provflow: the pieces
//! every resource family reuses to drive remote state towards the declared
//! configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  provflow CLI                     │
//! │              (provflow run <handler>)             │
//! └─────────────────┬────────────────────────────────┘
//!                   │ HandlerRegistry::invoke
//! ┌─────────────────▼────────────────────────────────┐
//! │                provflow-cloud                     │
//! │  Ownership ─► list_existing ─► diff ─► Plan      │
//! │                                   │               │
//! │                     Executor ◄────┘               │
//! │                        │                          │
//! │                     Waiter / wait_all             │
//! └────────────────────────┬─────────────────────────┘
//!                          │
//!                ┌─────────▼─────────┐
//!                │ provflow-cloud-   │
//!                │ aliyun families   │
//!                └───────────────────┘
//! ```

pub mod action;
pub mod diff;
pub mod envfunc;
pub mod error;
pub mod executor;
pub mod handler;
pub mod ownership;
pub mod waiter;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use diff::{Diff, diff, index_existing, list_existing, single};
pub use envfunc::{EnvFunction, EnvFunctions, Prompter, TerminalPrompter};
pub use error::{CloudError, Result};
pub use executor::{Executor, RetryConfig, retry};
pub use handler::{EnvExports, HandlerContext, HandlerRegistry, Output, OutputSink, env_key};
pub use ownership::{OwnerTags, Ownership};
pub use waiter::{WaitConfig, WaitReport, Waiter, WhenMissing, wait_all};
