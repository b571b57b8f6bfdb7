//! Server Load Balancer family
//!
//! ```yaml
//! aliyun:
//!   slb:
//!     balancer:
//!       front:
//!         address-type: internet
//!         vpc-name: main
//!         vswitch-name: web
//!         listener:
//!           http:
//!             www:
//!               listen-port: 80
//!               vserver-group-name: web
//!               rules:
//!                 api:
//!                   domain: api.example.com
//!                   vserver-group-name: api
//!         vserver-group:
//!           web:
//!             web-1:
//!               instance:
//!                 name: web-1
//!               ports:
//!                 http:
//!                   port: 8080
//! ```
//!
//! Steps run in a fixed order: balancer, vserver group, listener, rule.
//! Each step expects the ones before it to have converged.

mod balancer;
mod certificate;
mod listener;
mod rule;
mod vgroup;

use crate::api::LoadBalancerRecord;
use crate::provider::Aliyun;
use provflow_cloud::{CloudError, Result, list_existing};
use std::collections::HashMap;

pub use balancer::OUTPUT_BALANCERS;

pub const SECTION: &str = "aliyun.slb.balancer";

impl Aliyun {
    /// Declared balancers that already exist, keyed by name
    async fn existing_balancers(&self, names: &[String]) -> Result<HashMap<String, LoadBalancerRecord>> {
        list_existing(
            "slb",
            names,
            || self.clients.slb.list_load_balancers(&self.region),
            |lb: &LoadBalancerRecord| {
                (lb.region_id.is_empty() || lb.region_id == self.region).then(|| lb.name.clone())
            },
        )
        .await
    }

    /// Every declared balancer with its record; a missing one is `NotFound`
    async fn require_balancers(&self) -> Result<Vec<(String, LoadBalancerRecord)>> {
        let names = self.section(SECTION).keys();
        let mut existing = self.existing_balancers(&names).await?;

        names
            .into_iter()
            .map(|name| match existing.remove(&name) {
                Some(lb) => Ok((name, lb)),
                None => Err(CloudError::NotFound(format!("load balancer {name}"))),
            })
            .collect()
    }
}
