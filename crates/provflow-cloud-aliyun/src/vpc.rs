//! VPC and VSwitch reconciliation
//!
//! ```yaml
//! aliyun:
//!   vpc:
//!     vpc:
//!       main:
//!         cidr-block: 172.16.0.0/16
//!         description: shop network
//!     vswitch:
//!       web:
//!         vpc-name: main
//!         zone-id: cn-beijing-a
//!         cidr-block: 172.16.1.0/24
//! ```
//!
//! VPCs and VSwitches are identified by name plus the ownership marker signed
//! into their description, so two deployments may reuse the same names.

use crate::api::{CreateVSwitch, CreateVpc, VSwitchRecord, VpcRecord};
use crate::provider::Aliyun;
use provflow_cloud::{
    Action, ApplyResult, CloudError, Executor, Plan, Result, WaitConfig, WhenMissing, diff,
    index_existing, list_existing, single, wait_all,
};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

pub const VPC_SECTION: &str = "aliyun.vpc.vpc";
pub const VSWITCH_SECTION: &str = "aliyun.vpc.vswitch";

pub const DEFAULT_VPC_CIDR: &str = "172.16.0.0/16";
pub const DEFAULT_VSWITCH_CIDR: &str = "172.16.0.0/24";

/// Pause after each VSwitch deletion so router entries are gone before the VPC
const VSWITCH_DELETE_PAUSE: Duration = Duration::from_secs(2);

fn vpc_wait() -> WaitConfig {
    WaitConfig::secs(30, 5)
}

impl Aliyun {
    /// Owned VPC named `name`, or `None`
    pub async fn find_vpc(&self, name: &str) -> Result<Option<VpcRecord>> {
        let vpcs = self.clients.vpc.list_vpcs(&self.region).await?;
        single(
            &format!("vpc named {name}"),
            vpcs.into_iter()
                .filter(|vpc| vpc.name == name && self.ownership.is_owned(&vpc.description)),
        )
    }

    /// Owned VSwitch `vswitch_name` inside owned VPC `vpc_name`.
    ///
    /// A missing VPC is an error; a missing VSwitch is `None`.
    pub async fn find_vswitch(
        &self,
        vpc_name: &str,
        vswitch_name: &str,
    ) -> Result<Option<VSwitchRecord>> {
        let vpc = self
            .find_vpc(vpc_name)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("vpc {vpc_name}")))?;

        let vswitches = self.clients.vpc.list_vswitches(&vpc.vpc_id).await?;
        single(
            &format!("vswitch named {vswitch_name}"),
            vswitches.into_iter().filter(|sw| {
                sw.name == vswitch_name
                    && sw.vpc_id == vpc.vpc_id
                    && self.ownership.is_owned(&sw.description)
            }),
        )
    }

    /// Declared VPCs that already exist, keyed by declared name.
    ///
    /// Identity is (region, name, cidr-block, owned description).
    async fn existing_vpcs(&self, names: &[String]) -> Result<HashMap<String, VpcRecord>> {
        let section = self.section(VPC_SECTION);

        list_existing(
            "vpc",
            names,
            || self.clients.vpc.list_vpcs(&self.region),
            |vpc: &VpcRecord| {
                let cidr = section
                    .get_config(&vpc.name)
                    .get_string_or("cidr-block", DEFAULT_VPC_CIDR);

                (vpc.region_id == self.region
                    && vpc.cidr_block == cidr
                    && self.ownership.is_owned(&vpc.description))
                .then(|| vpc.name.clone())
            },
        )
        .await
    }

    /// Split declared VPCs into those with an explicit `id` and the rest
    fn partition_declared_vpcs(&self) -> (Vec<(String, String)>, Vec<String>) {
        let section = self.section(VPC_SECTION);
        let mut with_id = Vec::new();
        let mut by_name = Vec::new();

        for name in section.keys() {
            match section.get_string(&format!("{name}.id")) {
                Some(id) => with_id.push((name, id)),
                None => by_name.push(name),
            }
        }

        (with_id, by_name)
    }

    pub async fn create_vpcs(&self) -> Result<ApplyResult> {
        let section = self.section(VPC_SECTION);
        let (with_id, names) = self.partition_declared_vpcs();

        let existing = self.existing_vpcs(&names).await?;
        let diff = diff("vpc", &names, &existing, |_| Ok(()))?;

        let mut plan = Plan::new();
        for (name, id) in with_id {
            tracing::info!(code = self.code(), vpc = %name, vpc_id = %id, "VPC id declared, skipping creation");
            plan.keep(name);
        }
        for name in diff.already_exists {
            plan.keep(name);
        }
        for name in &diff.to_create {
            let entry = section.get_config(name);
            plan.push(Action::create(
                "vpc",
                name,
                CreateVpc {
                    region_id: self.region.clone(),
                    name: name.clone(),
                    cidr_block: entry.get_string_or("cidr-block", DEFAULT_VPC_CIDR),
                    description: self
                        .ownership
                        .sign(&entry.get_string("description").unwrap_or_default()),
                },
            ));
        }

        tracing::info!(code = self.code(), "VPC plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |request| async move {
                let vpc_id = self
                    .call("create vpc", || self.clients.vpc.create_vpc(&request))
                    .await?;
                tracing::info!(code = self.code(), vpc = %request.name, vpc_id = %vpc_id, "VPC created");
                Ok::<_, CloudError>(vpc_id)
            })
            .await
    }

    pub async fn delete_vpcs(&self) -> Result<ApplyResult> {
        let (with_id, names) = self.partition_declared_vpcs();
        let existing = self.existing_vpcs(&names).await?;

        let mut plan = Plan::new();
        for (name, id) in with_id {
            plan.push(Action::delete("vpc", name, id));
        }
        for name in &names {
            match existing.get(name) {
                Some(vpc) => plan.push(Action::delete("vpc", name, vpc.vpc_id.clone())),
                None => tracing::info!(code = self.code(), vpc = %name, "VPC not exist"),
            }
        }

        Executor::new()
            .benign("InvalidVpcId.NotFound")
            .benign("Forbidden.VpcNotFound")
            .execute(plan, |vpc_id| async move {
                self.call("delete vpc", || self.clients.vpc.delete_vpc(&vpc_id))
                    .await?;
                tracing::info!(code = self.code(), vpc_id = %vpc_id, "VPC deleted");
                Ok::<_, CloudError>(vpc_id)
            })
            .await
    }

    /// Wait for every declared VPC to become `Available`
    pub async fn wait_vpcs_available(&self) -> Result<()> {
        let (with_id, names) = self.partition_declared_vpcs();
        let existing = self.existing_vpcs(&names).await?;

        let ids: Vec<String> = with_id
            .into_iter()
            .map(|(_, id)| id)
            .chain(existing.into_values().map(|vpc| vpc.vpc_id))
            .collect();

        let waiter = self.waiter(vpc_wait());
        let waiter = &waiter;

        wait_all(ids, |vpc_id| async move {
            let id = vpc_id.as_str();
            waiter
                .wait_for_status(id, "Available", || async move {
                    let vpc = self.clients.vpc.describe_vpc(id).await?;
                    Ok::<_, CloudError>(vpc.map(|vpc| vpc.status))
                })
                .await
        })
        .await
        .into_result()
    }

    /// Resolve the VPC of every declared VSwitch.
    ///
    /// With `strict`, a missing VPC is an error; otherwise its VSwitches are
    /// left out of the result.
    async fn declared_vswitch_vpcs(&self, strict: bool) -> Result<HashMap<String, String>> {
        let section = self.section(VSWITCH_SECTION);
        let mut vpc_names = HashMap::new();

        for name in section.keys() {
            let vpc_name = section
                .get_string(&format!("{name}.vpc-name"))
                .ok_or_else(|| CloudError::invalid(format!("vswitch {name}"), "vpc-name is empty"))?;
            vpc_names.insert(name, vpc_name);
        }

        let mut vpc_ids: HashMap<String, String> = HashMap::new();
        for vpc_name in vpc_names.values().collect::<BTreeSet<_>>() {
            match self.find_vpc(vpc_name).await? {
                Some(vpc) => {
                    vpc_ids.insert(vpc_name.clone(), vpc.vpc_id);
                }
                None if strict => {
                    return Err(CloudError::NotFound(format!("vpc {vpc_name}")));
                }
                None => tracing::info!(code = self.code(), vpc = %vpc_name, "VPC not exist"),
            }
        }

        Ok(vpc_names
            .into_iter()
            .filter_map(|(sw, vpc_name)| vpc_ids.get(&vpc_name).map(|id| (sw, id.clone())))
            .collect())
    }

    /// Declared VSwitches that already exist, keyed by declared name.
    ///
    /// Identity is (VPC id, name, owned description).
    async fn existing_vswitches(
        &self,
        names: &[String],
        vpc_of: &HashMap<String, String>,
    ) -> Result<HashMap<String, VSwitchRecord>> {
        let mut records = Vec::new();
        for vpc_id in vpc_of.values().collect::<BTreeSet<_>>() {
            records.extend(self.clients.vpc.list_vswitches(vpc_id).await?);
        }

        index_existing("vswitch", names, records, |sw: &VSwitchRecord| {
            let declared_vpc = vpc_of.get(&sw.name)?;
            (sw.vpc_id == *declared_vpc && self.ownership.is_owned(&sw.description))
                .then(|| sw.name.clone())
        })
    }

    pub async fn create_vswitches(&self) -> Result<ApplyResult> {
        let section = self.section(VSWITCH_SECTION);
        let names = section.keys();
        let vpc_of = self.declared_vswitch_vpcs(true).await?;
        let existing = self.existing_vswitches(&names, &vpc_of).await?;

        let diff = diff("vswitch", &names, &existing, |name| {
            let zone = section.get_string(&format!("{name}.zone-id")).ok_or_else(|| {
                CloudError::invalid(format!("vswitch {name}"), "zone-id is empty")
            })?;
            if !zone.starts_with(&self.region) {
                return Err(CloudError::invalid(
                    format!("vswitch {name}"),
                    format!("zone-id {zone} is not in region {}", self.region),
                ));
            }
            Ok(())
        })?;

        let mut plan = Plan::new();
        for name in diff.already_exists {
            plan.keep(name);
        }
        for name in &diff.to_create {
            let entry = section.get_config(name);
            plan.push(Action::create(
                "vswitch",
                name,
                CreateVSwitch {
                    vpc_id: vpc_of[name].clone(),
                    zone_id: entry.get_string_or("zone-id", ""),
                    name: name.clone(),
                    cidr_block: entry.get_string_or("cidr-block", DEFAULT_VSWITCH_CIDR),
                    description: self
                        .ownership
                        .sign(&entry.get_string("description").unwrap_or_default()),
                },
            ));
        }

        tracing::info!(code = self.code(), "VSwitch plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |request| async move {
                let vswitch_id = self
                    .call("create vswitch", || self.clients.vpc.create_vswitch(&request))
                    .await?;
                tracing::info!(
                    code = self.code(),
                    vswitch = %request.name,
                    vswitch_id = %vswitch_id,
                    vpc_id = %request.vpc_id,
                    "VSwitch created"
                );
                Ok::<_, CloudError>(vswitch_id)
            })
            .await
    }

    pub async fn delete_vswitches(&self) -> Result<ApplyResult> {
        let names = self.section(VSWITCH_SECTION).keys();
        let vpc_of = self.declared_vswitch_vpcs(false).await?;
        let existing = self.existing_vswitches(&names, &vpc_of).await?;

        let plan: Plan<String> = names
            .iter()
            .filter_map(|name| {
                existing
                    .get(name)
                    .map(|sw| Action::delete("vswitch", name, sw.vswitch_id.clone()))
            })
            .collect();

        Executor::new()
            .benign("InvalidVSwitchId.NotFound")
            .execute(plan, |vswitch_id| async move {
                self.call("delete vswitch", || self.clients.vpc.delete_vswitch(&vswitch_id))
                    .await?;
                tracing::info!(code = self.code(), vswitch_id = %vswitch_id, "VSwitch deleted");
                tokio::time::sleep(VSWITCH_DELETE_PAUSE).await;
                Ok::<_, CloudError>(vswitch_id)
            })
            .await
    }

    /// Wait for every declared VSwitch to become `Available`
    pub async fn wait_vswitches_available(&self) -> Result<()> {
        let names = self.section(VSWITCH_SECTION).keys();
        let vpc_of = self.declared_vswitch_vpcs(true).await?;
        let existing = self.existing_vswitches(&names, &vpc_of).await?;

        let waiter = self.waiter(vpc_wait().when_missing(WhenMissing::Fail));
        let waiter = &waiter;

        wait_all(
            existing.into_values().map(|sw| sw.vswitch_id),
            |vswitch_id| async move {
                let id = vswitch_id.as_str();
                waiter
                    .wait_for_status(id, "Available", || async move {
                        let vswitch = self.clients.vpc.describe_vswitch(id).await?;
                        Ok::<_, CloudError>(vswitch.map(|sw| sw.status))
                    })
                    .await
            },
        )
        .await
        .into_result()
    }
}
