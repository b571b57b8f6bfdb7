use super::SECTION;
use crate::api::{CreateLoadBalancer, LoadBalancerRecord};
use crate::provider::Aliyun;
use provflow_cloud::{Action, ApplyResult, CloudError, Executor, Plan, Result, diff};

pub const OUTPUT_BALANCERS: &str = "ALIYUN_SLB_BALANCERS";

const NOT_FOUND: &str = "InvalidLoadBalancerId.NotFound";

impl Aliyun {
    async fn create_balancer_request(&self, name: &str) -> Result<CreateLoadBalancer> {
        let entry = self.section(SECTION).get_config(name);

        let (vpc_id, vswitch_id) = match (entry.get_string("vpc-name"), entry.get_string("vswitch-name")) {
            (None, None) => (None, None),
            (Some(vpc_name), Some(vswitch_name)) => {
                let vswitch = self
                    .find_vswitch(&vpc_name, &vswitch_name)
                    .await?
                    .ok_or_else(|| {
                        CloudError::NotFound(format!(
                            "vswitch {vswitch_name} in vpc {vpc_name} for load balancer {name}"
                        ))
                    })?;
                (Some(vswitch.vpc_id), Some(vswitch.vswitch_id))
            }
            _ => {
                return Err(CloudError::invalid(
                    format!("slb {name}"),
                    "vpc-name and vswitch-name must be given together",
                ));
            }
        };

        Ok(CreateLoadBalancer {
            region_id: self.region.clone(),
            name: name.to_string(),
            address_type: entry.get_string_or("address-type", "internet"),
            charge_type: entry.get_string_or("charge-type", "paybytraffic"),
            bandwidth: entry.get_i64_or("band-width", 100),
            vpc_id,
            vswitch_id,
        })
    }

    pub async fn create_balancers(&self) -> Result<ApplyResult> {
        let names = self.section(SECTION).keys();
        let existing = self.existing_balancers(&names).await?;
        let diff = diff("slb", &names, &existing, |_| Ok(()))?;

        let mut plan = Plan::new();
        for name in diff.already_exists {
            plan.keep(name);
        }
        for name in &diff.to_create {
            plan.push(Action::create("slb", name, self.create_balancer_request(name).await?));
        }

        tracing::info!(code = self.code(), "Load balancer plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |request| async move {
                let id = self
                    .call("create slb", || self.clients.slb.create_load_balancer(&request))
                    .await?;
                tracing::info!(
                    code = self.code(),
                    slb = %request.name,
                    load_balancer_id = %id,
                    "Load balancer created"
                );
                Ok::<_, CloudError>(id)
            })
            .await
    }

    pub async fn delete_balancers(&self) -> Result<ApplyResult> {
        let names = self.section(SECTION).keys();
        let existing = self.existing_balancers(&names).await?;

        let plan: Plan<String> = names
            .iter()
            .filter_map(|name| {
                existing
                    .get(name)
                    .map(|lb| Action::delete("slb", name, lb.load_balancer_id.clone()))
            })
            .collect();

        Executor::new()
            .benign(NOT_FOUND)
            .execute(plan, |id| async move {
                match self
                    .call("delete slb", || self.clients.slb.delete_load_balancer(&id))
                    .await
                {
                    Ok(()) => Ok(id),
                    Err(err @ CloudError::Provider { .. }) if err.is_code(NOT_FOUND) => Err(err),
                    Err(CloudError::Provider { code, message }) => Err(CloudError::provider(
                        code,
                        format!("delete load balancer {id}: {message}"),
                    )),
                    Err(err) => Err(err),
                }
            })
            .await
    }

    /// Publish the declared balancers and export `SLB_<NAME>_ADDRESS`
    pub async fn describe_balancers(&self) -> Result<()> {
        let names = self.section(SECTION).keys();
        let existing = self.existing_balancers(&names).await?;

        let balancers: Vec<LoadBalancerRecord> = names
            .iter()
            .filter_map(|name| existing.get(name).cloned())
            .collect();

        for lb in &balancers {
            self.export(&format!("slb_{}_address", lb.name), &lb.address);
        }

        self.ctx.outputs().append(
            OUTPUT_BALANCERS,
            &balancers,
            vec!["aliyun".to_string(), "slb".to_string(), "balancer".to_string()],
        )
    }
}
