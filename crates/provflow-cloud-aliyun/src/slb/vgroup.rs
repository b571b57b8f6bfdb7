use super::SECTION;
use crate::api::{BackendServer, LoadBalancerRecord, VServerGroupRecord};
use crate::ecs::InstanceLookup;
use crate::provider::Aliyun;
use provflow_cloud::{Action, ApplyResult, CloudError, Executor, Plan, Result, diff, index_existing, single};
use provflow_config::Config;

const DEFAULT_WEIGHT: i64 = 100;

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Vserver group to create on one balancer
#[derive(Debug, Clone)]
struct CreateGroup {
    load_balancer_id: String,
    name: String,
    backends: Vec<BackendServer>,
}

impl Aliyun {
    /// Id of vserver group `name` on balancer `load_balancer_id`
    pub(super) async fn vserver_group_id(&self, load_balancer_id: &str, name: &str) -> Result<String> {
        let groups = self.clients.slb.list_vserver_groups(load_balancer_id).await?;
        single(
            &format!("vserver group named {name}"),
            groups.into_iter().filter(|group| group.name == name),
        )?
        .map(|group| group.vserver_group_id)
        .ok_or_else(|| {
            CloudError::NotFound(format!("vserver group {name} on load balancer {load_balancer_id}"))
        })
    }

    /// Backends of one declared server: its instance on every declared port
    async fn server_backends(
        &self,
        lb_name: &str,
        lb: &LoadBalancerRecord,
        group: &str,
        server: &str,
        entry: &Config,
    ) -> Result<Vec<BackendServer>> {
        let path = format!("{lb_name}.{group}.{server}");
        let lookup = InstanceLookup::from_config(&path, &entry.get_config("instance"))?;
        if lookup.is_empty() {
            return Err(CloudError::invalid(&path, "instance is empty"));
        }

        let instance = self
            .find_instance_in(&lookup, non_empty(&lb.vpc_id), non_empty(&lb.vswitch_id))
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("instance '{server}' not found: {path}")))?;

        let ports = entry.get_config("ports");
        let mut backends = Vec::new();
        for port_name in ports.keys() {
            let port = ports.get_i64(&format!("{port_name}.port")).unwrap_or(0);
            if port <= 0 {
                return Err(CloudError::invalid(
                    format!("{path}.ports.{port_name}"),
                    "port must be positive",
                ));
            }

            backends.push(BackendServer {
                server_id: instance.instance_id.clone(),
                port,
                weight: ports.get_i64_or(&format!("{port_name}.weight"), DEFAULT_WEIGHT),
            });
        }

        if backends.is_empty() {
            return Err(CloudError::invalid(&path, "ports is empty"));
        }

        Ok(backends)
    }

    pub async fn create_vserver_groups(&self) -> Result<ApplyResult> {
        let section = self.section(SECTION);
        let mut plan = Plan::new();

        for (lb_name, lb) in self.require_balancers().await? {
            let groups = section.get_config(&format!("{lb_name}.vserver-group"));
            let names = groups.keys();
            if names.is_empty() {
                continue;
            }

            let remote = self.clients.slb.list_vserver_groups(&lb.load_balancer_id).await?;
            let existing = index_existing("vserver-group", &names, remote, |group: &VServerGroupRecord| {
                Some(group.name.clone())
            })?;
            let diff = diff("vserver-group", &names, &existing, |_| Ok(()))?;

            for name in diff.already_exists {
                plan.keep(format!("{lb_name}/{name}"));
            }
            for name in diff.to_create {
                let servers = groups.get_config(&name);
                let mut backends = Vec::new();
                for server in servers.keys() {
                    let entry = servers.get_config(&server);
                    backends.extend(self.server_backends(&lb_name, &lb, &name, &server, &entry).await?);
                }

                plan.push(Action::create(
                    "slb-vserver-group",
                    format!("{lb_name}/{name}"),
                    CreateGroup {
                        load_balancer_id: lb.load_balancer_id.clone(),
                        name,
                        backends,
                    },
                ));
            }
        }

        tracing::info!(code = self.code(), "VServer group plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |group| async move {
                let id = self
                    .call("create slb vserver group", || {
                        self.clients.slb.create_vserver_group(
                            &group.load_balancer_id,
                            &group.name,
                            &group.backends,
                        )
                    })
                    .await?;
                tracing::info!(
                    code = self.code(),
                    vserver_group = %group.name,
                    vserver_group_id = %id,
                    backends = group.backends.len(),
                    "VServer group created"
                );
                Ok::<_, CloudError>(id)
            })
            .await
    }
}
