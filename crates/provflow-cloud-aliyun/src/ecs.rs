//! Compute instance lookup
//!
//! Instances are never created here; other families reference them by a
//! composite search and require the search to be unambiguous.

use crate::api::{InstanceQuery, InstanceRecord};
use crate::provider::Aliyun;
use provflow_cloud::{CloudError, Result, single};
use provflow_config::Config;
use std::collections::BTreeMap;

/// Upper bound on tag filters accepted by DescribeInstances
pub const MAX_TAG_FILTERS: usize = 5;

/// Declared search for one instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceLookup {
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub network_type: Option<String>,
    pub zone_id: Option<String>,
    pub vpc_name: Option<String>,
    pub vswitch_name: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl InstanceLookup {
    /// Read `{id, name, network-type, zone-id, vpc-name, vswitch-name, tag.*}`
    pub fn from_config(entry: &str, config: &Config) -> Result<Self> {
        let tag_section = config.get_config("tag");
        let tags: BTreeMap<String, String> = tag_section
            .keys()
            .into_iter()
            .filter_map(|key| tag_section.get_string(&key).map(|value| (key, value)))
            .collect();

        if tags.len() > MAX_TAG_FILTERS {
            return Err(CloudError::invalid(
                entry,
                format!("at most {MAX_TAG_FILTERS} instance tags are supported"),
            ));
        }

        Ok(Self {
            instance_id: config.get_string("id"),
            instance_name: config.get_string("name"),
            network_type: config.get_string("network-type"),
            zone_id: config.get_string("zone-id"),
            vpc_name: config.get_string("vpc-name"),
            vswitch_name: config.get_string("vswitch-name"),
            tags,
        })
    }

    /// Whether nothing constrains the search
    pub fn is_empty(&self) -> bool {
        self.instance_id.is_none()
            && self.instance_name.is_none()
            && self.network_type.is_none()
            && self.zone_id.is_none()
            && self.vpc_name.is_none()
            && self.vswitch_name.is_none()
            && self.tags.is_empty()
    }

    fn query(&self, vpc_id: Option<String>, vswitch_id: Option<String>) -> InstanceQuery {
        InstanceQuery {
            instance_id: self.instance_id.clone(),
            instance_name: self.instance_name.clone(),
            network_type: self.network_type.clone(),
            zone_id: self.zone_id.clone(),
            vpc_id,
            vswitch_id,
            tags: self.tags.clone(),
        }
    }
}

impl Aliyun {
    /// The single instance matching `lookup`, or `None`.
    ///
    /// VPC and VSwitch names are resolved to ids first; an unknown VPC or
    /// VSwitch name is `NotFound`.
    pub async fn find_instance(&self, lookup: &InstanceLookup) -> Result<Option<InstanceRecord>> {
        let (vpc_id, vswitch_id) = match (&lookup.vpc_name, &lookup.vswitch_name) {
            (None, None) => (None, None),
            (Some(vpc_name), None) => {
                let vpc = self
                    .find_vpc(vpc_name)
                    .await?
                    .ok_or_else(|| CloudError::NotFound(format!("vpc {vpc_name}")))?;
                (Some(vpc.vpc_id), None)
            }
            (Some(vpc_name), Some(vswitch_name)) => {
                let vswitch = self
                    .find_vswitch(vpc_name, vswitch_name)
                    .await?
                    .ok_or_else(|| {
                        CloudError::NotFound(format!("vswitch {vswitch_name} in vpc {vpc_name}"))
                    })?;
                (Some(vswitch.vpc_id), Some(vswitch.vswitch_id))
            }
            (None, Some(vswitch_name)) => {
                return Err(CloudError::invalid(
                    format!("instance vswitch {vswitch_name}"),
                    "vswitch-name requires vpc-name",
                ));
            }
        };

        self.find_instance_in(lookup, vpc_id, vswitch_id).await
    }

    /// Like [`Aliyun::find_instance`] with the network scope already resolved
    pub async fn find_instance_in(
        &self,
        lookup: &InstanceLookup,
        vpc_id: Option<String>,
        vswitch_id: Option<String>,
    ) -> Result<Option<InstanceRecord>> {
        let query = lookup.query(vpc_id, vswitch_id);
        let instances = self.clients.ecs.describe_instances(&self.region, &query).await?;

        let found = single(
            "instance",
            instances.into_iter().filter(|instance| query.matches(instance)),
        )?;

        match &found {
            Some(instance) => tracing::debug!(
                code = self.code(),
                instance_id = %instance.instance_id,
                "Instance resolved"
            ),
            None => tracing::debug!(code = self.code(), query = ?query, "No instance matched"),
        }

        Ok(found)
    }
}
