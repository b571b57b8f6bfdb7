use super::SECTION;
use super::listener::listen_port;
use crate::api::{ListenerProtocol, RuleSpec};
use crate::provider::Aliyun;
use provflow_cloud::{Action, ApplyResult, CloudError, Executor, Plan, Result};
use provflow_config::Config;
use std::collections::HashMap;

/// Rules to add to one listener in a single call
#[derive(Debug, Clone)]
struct ListenerRules {
    load_balancer_id: String,
    port: i64,
    rules: Vec<RuleSpec>,
}

impl Aliyun {
    /// Create the forwarding rules of every HTTP and HTTPS listener.
    ///
    /// The listener port must already be listened and every referenced
    /// vserver group must exist; rules already present by name are left
    /// alone.
    pub async fn create_listener_rules(&self) -> Result<ApplyResult> {
        let section = self.section(SECTION);
        let mut plan = Plan::new();

        for (lb_name, lb) in self.require_balancers().await? {
            let lb_id = lb.load_balancer_id.as_str();
            let declared: Vec<(String, Config)> = [ListenerProtocol::Http, ListenerProtocol::Https]
                .into_iter()
                .flat_map(|protocol| {
                    let listeners = section.get_config(&format!("{lb_name}.listener.{protocol}"));
                    listeners
                        .keys()
                        .into_iter()
                        .map(|name| {
                            let entry = listeners.get_config(&name);
                            (format!("{lb_name}.listener.{protocol}.{name}"), entry)
                        })
                        .collect::<Vec<_>>()
                })
                .filter(|(_, entry)| !entry.get_config("rules").is_empty())
                .collect();
            if declared.is_empty() {
                continue;
            }

            let listened = self.clients.slb.listener_ports(lb_id).await?;
            let groups: HashMap<String, String> = self
                .clients
                .slb
                .list_vserver_groups(lb_id)
                .await?
                .into_iter()
                .map(|group| (group.name, group.vserver_group_id))
                .collect();

            for (path, entry) in declared {
                let rules = entry.get_config("rules");
                let port = listen_port(&path, &entry)?;
                if !listened.contains(&port) {
                    return Err(CloudError::NotFound(format!("listener port {port} of {path}")));
                }
                if groups.is_empty() {
                    return Err(CloudError::NotFound(format!(
                        "vserver groups of load balancer {lb_name}"
                    )));
                }

                let existing: Vec<String> = self
                    .clients
                    .slb
                    .list_rules(lb_id, port)
                    .await?
                    .into_iter()
                    .map(|rule| rule.name)
                    .collect();

                let mut specs = Vec::new();
                for rule in rules.keys() {
                    if existing.contains(&rule) {
                        tracing::info!(code = self.code(), rule = %rule, listener = %path, "Rule already exists");
                        plan.keep(format!("{path}.{rule}"));
                        continue;
                    }

                    let rule_entry = rules.get_config(&rule);
                    let rule_path = format!("{path}.rules.{rule}");
                    let domain = rule_entry.get_string("domain");
                    let url = rule_entry.get_string("url");
                    if domain.is_none() && url.is_none() {
                        return Err(CloudError::invalid(&rule_path, "domain or url is required"));
                    }

                    let group = rule_entry
                        .get_string("vserver-group-name")
                        .ok_or_else(|| CloudError::invalid(&rule_path, "vserver-group-name is empty"))?;
                    let group_id = groups.get(&group).cloned().ok_or_else(|| {
                        CloudError::NotFound(format!("vserver group {group} for {rule_path}"))
                    })?;

                    specs.push(RuleSpec {
                        name: rule,
                        domain: domain.unwrap_or_default(),
                        url,
                        vserver_group_id: group_id,
                    });
                }

                if !specs.is_empty() {
                    plan.push(Action::create(
                        "slb-rules",
                        path,
                        ListenerRules {
                            load_balancer_id: lb_id.to_string(),
                            port,
                            rules: specs,
                        },
                    ));
                }
            }
        }

        tracing::info!(code = self.code(), "Rule plan: {}", plan.summary());

        Executor::new()
            .benign("DomainExist")
            .execute(plan, |batch| async move {
                self.call("create slb rules", || {
                    self.clients
                        .slb
                        .create_rules(&batch.load_balancer_id, batch.port, &batch.rules)
                })
                .await?;
                Ok::<_, CloudError>(format!("{} rules on port {}", batch.rules.len(), batch.port))
            })
            .await
    }
}
