use async_trait::async_trait;
use provflow_cloud::{CloudError, HandlerContext, Prompter, Result};
use provflow_cloud_aliyun::api::*;
use provflow_cloud_aliyun::{Aliyun, AliyunClients, AliyunProvider, ClientFactory, Credentials};
use provflow_config::Config;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const REGION: &str = "cn-beijing";

/// Credentials block prepended to every test configuration
pub const CREDENTIALS: &str = r#"
aliyun:
  access-key-id: AKID
  access-key-secret: SECRET
  region: cn-beijing
"#;

#[derive(Debug, Clone)]
pub struct Listener {
    pub load_balancer_id: String,
    pub port: i64,
    pub protocol: ListenerProtocol,
    pub status: String,
    pub request: CreateListener,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub load_balancer_id: String,
    pub record: VServerGroupRecord,
    pub backends: Vec<BackendServer>,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub cluster_id: String,
    pub record: ProjectRecord,
    pub request: CreateProject,
}

/// Remote state of the fake account
#[derive(Debug, Default)]
pub struct State {
    pub vpcs: Vec<VpcRecord>,
    pub vswitches: Vec<VSwitchRecord>,
    pub instances: Vec<InstanceRecord>,
    pub dbs: Vec<DbInstanceRecord>,
    pub accounts: Vec<(String, CreateAccount)>,
    pub grants: Vec<GrantPrivilege>,
    pub net_info: HashMap<String, Vec<DbNetInfo>>,
    pub balancers: Vec<LoadBalancerRecord>,
    pub listeners: Vec<Listener>,
    pub certificates: Vec<CertificateRecord>,
    pub ca_certificates: Vec<CertificateRecord>,
    pub groups: Vec<Group>,
    pub rules: Vec<(String, i64, RuleRecord)>,
    pub clusters: Vec<ClusterRecord>,
    pub volumes: Vec<(String, CreateVolume)>,
    pub projects: Vec<Project>,
    pub records: Vec<(String, DomainRecord)>,
    pub buckets: Vec<(BucketRecord, String)>,

    /// Mutating calls in order, e.g. `create_vpc main`
    pub calls: Vec<String>,
    /// Status polls answered `Pending` before the real status shows
    pub pending: HashMap<String, u32>,
    /// Scripted provider errors keyed by `operation:target`
    pub failures: HashMap<String, (String, String)>,
    /// Scripted provider errors that clear after the given number of calls
    pub flaky: HashMap<String, (String, u32)>,
    next_id: u32,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-memory Alibaba Cloud account
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

#[allow(dead_code)]
impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn fail(&self, operation: &str, target: &str, code: &str) {
        self.state().failures.insert(
            format!("{operation}:{target}"),
            (code.to_string(), format!("scripted failure of {operation}")),
        );
    }

    /// Fail the next `times` calls of `operation` on `target` with `code`;
    /// target `*` matches any
    pub fn fail_times(&self, operation: &str, target: &str, code: &str, times: u32) {
        self.state()
            .flaky
            .insert(format!("{operation}:{target}"), (code.to_string(), times));
    }

    pub fn pend(&self, id: &str, polls: u32) {
        self.state().pending.insert(id.to_string(), polls);
    }

    pub fn add_vpc(&self, name: &str, cidr: &str, description: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("vpc");
        state.vpcs.push(VpcRecord {
            vpc_id: id.clone(),
            name: name.to_string(),
            cidr_block: cidr.to_string(),
            description: description.to_string(),
            region_id: REGION.to_string(),
            status: "Available".to_string(),
        });
        id
    }

    pub fn add_vswitch(&self, vpc_id: &str, name: &str, description: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("vsw");
        state.vswitches.push(VSwitchRecord {
            vswitch_id: id.clone(),
            vpc_id: vpc_id.to_string(),
            name: name.to_string(),
            cidr_block: "172.16.1.0/24".to_string(),
            zone_id: "cn-beijing-a".to_string(),
            description: description.to_string(),
            status: "Available".to_string(),
        });
        id
    }

    pub fn add_instance(&self, name: &str, vpc_id: &str, vswitch_id: &str, tags: &[(&str, &str)]) -> String {
        let mut state = self.state();
        let id = state.next_id("i");
        state.instances.push(InstanceRecord {
            instance_id: id.clone(),
            instance_name: name.to_string(),
            zone_id: "cn-beijing-a".to_string(),
            network_type: "vpc".to_string(),
            vpc_id: vpc_id.to_string(),
            vswitch_id: vswitch_id.to_string(),
            status: "Running".to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        id
    }

    pub fn add_balancer(&self, name: &str) -> String {
        let state = &mut *self.state();
        let id = state.next_id("lb");
        state.balancers.push(LoadBalancerRecord {
            load_balancer_id: id.clone(),
            name: name.to_string(),
            address: format!("47.0.0.{}", state.next_id),
            address_type: "internet".to_string(),
            region_id: REGION.to_string(),
            status: "active".to_string(),
            ..Default::default()
        });
        id
    }

    pub fn add_vserver_group(&self, load_balancer_id: &str, name: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("rsp");
        state.groups.push(Group {
            load_balancer_id: load_balancer_id.to_string(),
            record: VServerGroupRecord {
                vserver_group_id: id.clone(),
                name: name.to_string(),
            },
            backends: Vec::new(),
        });
        id
    }

    pub fn add_certificate(&self, name: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("cert");
        state.certificates.push(CertificateRecord {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn check(&self, operation: &str, target: &str) -> Result<()> {
        let key = format!("{operation}:{target}");
        let mut state = self.state();
        if let Some((code, message)) = state.failures.get(&key) {
            return Err(CloudError::provider(code.clone(), message.clone()));
        }
        let flaky = match state.flaky.contains_key(&key) {
            true => key,
            false => format!("{operation}:*"),
        };
        match state.flaky.get_mut(&flaky) {
            Some((code, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(CloudError::provider(
                    code.clone(),
                    format!("scripted failure of {operation}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// `Pending` while scripted polls remain for `id`
    fn poll(&self, id: &str, status: String) -> String {
        let mut state = self.state();
        match state.pending.get_mut(id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                "Pending".to_string()
            }
            _ => status,
        }
    }
}

#[async_trait]
impl VpcApi for FakeCloud {
    async fn list_vpcs(&self, region_id: &str) -> Result<Vec<VpcRecord>> {
        Ok(self
            .state()
            .vpcs
            .iter()
            .filter(|vpc| vpc.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn describe_vpc(&self, vpc_id: &str) -> Result<Option<VpcRecord>> {
        self.check("describe_vpc", vpc_id)?;
        let vpc = self.state().vpcs.iter().find(|v| v.vpc_id == vpc_id).cloned();
        Ok(vpc.map(|mut vpc| {
            vpc.status = self.poll(vpc_id, vpc.status);
            vpc
        }))
    }

    async fn create_vpc(&self, request: &CreateVpc) -> Result<String> {
        self.check("create_vpc", &request.name)?;
        self.record(format!("create_vpc {}", request.name));
        let mut state = self.state();
        let id = state.next_id("vpc");
        state.vpcs.push(VpcRecord {
            vpc_id: id.clone(),
            name: request.name.clone(),
            cidr_block: request.cidr_block.clone(),
            description: request.description.clone(),
            region_id: request.region_id.clone(),
            status: "Available".to_string(),
        });
        Ok(id)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        self.check("delete_vpc", vpc_id)?;
        self.record(format!("delete_vpc {vpc_id}"));
        let mut state = self.state();
        let before = state.vpcs.len();
        state.vpcs.retain(|v| v.vpc_id != vpc_id);
        if state.vpcs.len() == before {
            return Err(CloudError::provider("InvalidVpcId.NotFound", vpc_id));
        }
        Ok(())
    }

    async fn list_vswitches(&self, vpc_id: &str) -> Result<Vec<VSwitchRecord>> {
        Ok(self
            .state()
            .vswitches
            .iter()
            .filter(|sw| sw.vpc_id == vpc_id)
            .cloned()
            .collect())
    }

    async fn describe_vswitch(&self, vswitch_id: &str) -> Result<Option<VSwitchRecord>> {
        let vswitch = self
            .state()
            .vswitches
            .iter()
            .find(|sw| sw.vswitch_id == vswitch_id)
            .cloned();
        Ok(vswitch.map(|mut sw| {
            sw.status = self.poll(vswitch_id, sw.status);
            sw
        }))
    }

    async fn create_vswitch(&self, request: &CreateVSwitch) -> Result<String> {
        self.check("create_vswitch", &request.name)?;
        self.record(format!("create_vswitch {}", request.name));
        let mut state = self.state();
        let id = state.next_id("vsw");
        state.vswitches.push(VSwitchRecord {
            vswitch_id: id.clone(),
            vpc_id: request.vpc_id.clone(),
            name: request.name.clone(),
            cidr_block: request.cidr_block.clone(),
            zone_id: request.zone_id.clone(),
            description: request.description.clone(),
            status: "Available".to_string(),
        });
        Ok(id)
    }

    async fn delete_vswitch(&self, vswitch_id: &str) -> Result<()> {
        self.record(format!("delete_vswitch {vswitch_id}"));
        let mut state = self.state();
        let before = state.vswitches.len();
        state.vswitches.retain(|sw| sw.vswitch_id != vswitch_id);
        if state.vswitches.len() == before {
            return Err(CloudError::provider("InvalidVSwitchId.NotFound", vswitch_id));
        }
        Ok(())
    }
}

#[async_trait]
impl EcsApi for FakeCloud {
    async fn describe_instances(
        &self,
        _region_id: &str,
        query: &InstanceQuery,
    ) -> Result<Vec<InstanceRecord>> {
        Ok(self
            .state()
            .instances
            .iter()
            .filter(|instance| query.matches(instance))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RdsApi for FakeCloud {
    async fn list_instances(
        &self,
        _region_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Vec<DbInstanceRecord>> {
        Ok(self
            .state()
            .dbs
            .iter()
            .filter(|db| tags.iter().all(|(k, v)| db.tags.get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn describe_instance(&self, db_instance_id: &str) -> Result<Option<DbInstanceRecord>> {
        let db = self
            .state()
            .dbs
            .iter()
            .find(|db| db.db_instance_id == db_instance_id)
            .cloned();
        Ok(db.map(|mut db| {
            db.status = self.poll(db_instance_id, db.status);
            db
        }))
    }

    async fn create_instance(&self, request: &CreateDbInstance) -> Result<String> {
        self.record(format!("create_db_instance {}", request.description));
        let mut state = self.state();
        let id = state.next_id("rm");
        state.dbs.push(DbInstanceRecord {
            db_instance_id: id.clone(),
            description: request.description.clone(),
            engine: request.engine.clone(),
            engine_version: request.engine_version.clone(),
            vpc_id: request.vpc_id.clone(),
            vswitch_id: request.vswitch_id.clone(),
            status: "Running".to_string(),
            tags: BTreeMap::new(),
        });
        state.net_info.insert(
            id.clone(),
            vec![DbNetInfo {
                ip_type: "Private".to_string(),
                connection_string: format!("{id}.mysql.rds.aliyuncs.com"),
                ip_address: "172.16.2.10".to_string(),
                port: "3306".to_string(),
            }],
        );
        Ok(id)
    }

    async fn add_tags(
        &self,
        _region_id: &str,
        db_instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(format!("add_tags {db_instance_id}"));
        self.check("add_tags", db_instance_id)?;
        let mut state = self.state();
        let db = state
            .dbs
            .iter_mut()
            .find(|db| db.db_instance_id == db_instance_id)
            .ok_or_else(|| CloudError::provider("InvalidDBInstanceId.NotFound", db_instance_id))?;
        db.tags.extend(tags.clone());
        Ok(())
    }

    async fn delete_instance(&self, db_instance_id: &str) -> Result<()> {
        self.record(format!("delete_db_instance {db_instance_id}"));
        let mut state = self.state();
        let before = state.dbs.len();
        state.dbs.retain(|db| db.db_instance_id != db_instance_id);
        if state.dbs.len() == before {
            return Err(CloudError::provider("InvalidDBInstanceId.NotFound", db_instance_id));
        }
        Ok(())
    }

    async fn describe_attributes(&self, db_instance_ids: &[String]) -> Result<Vec<DbInstanceAttribute>> {
        Ok(self
            .state()
            .dbs
            .iter()
            .filter(|db| db_instance_ids.contains(&db.db_instance_id))
            .map(|db| DbInstanceAttribute {
                db_instance_id: db.db_instance_id.clone(),
                description: db.description.clone(),
                engine: db.engine.clone(),
                engine_version: db.engine_version.clone(),
                status: db.status.clone(),
                connection_string: format!("{}.mysql.rds.aliyuncs.com", db.db_instance_id),
                port: "3306".to_string(),
                vpc_id: db.vpc_id.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn describe_net_info(&self, db_instance_id: &str) -> Result<Vec<DbNetInfo>> {
        Ok(self
            .state()
            .net_info
            .get(db_instance_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_accounts(&self, db_instance_id: &str) -> Result<Vec<AccountRecord>> {
        Ok(self
            .state()
            .accounts
            .iter()
            .filter(|(id, _)| id == db_instance_id)
            .map(|(_, account)| AccountRecord {
                account_name: account.account_name.clone(),
                account_type: account.account_type.clone(),
                status: "Available".to_string(),
            })
            .collect())
    }

    async fn create_account(&self, request: &CreateAccount) -> Result<()> {
        self.record(format!("create_account {}", request.account_name));
        self.state()
            .accounts
            .push((request.db_instance_id.clone(), request.clone()));
        Ok(())
    }

    async fn grant_privilege(&self, request: &GrantPrivilege) -> Result<()> {
        self.record(format!("grant_privilege {} {}", request.account_name, request.db_name));
        self.state().grants.push(request.clone());
        Ok(())
    }

    async fn allocate_public_connection(&self, request: &AllocatePublicConnection) -> Result<()> {
        self.record(format!("allocate_public_connection {}", request.connection_prefix));
        self.state()
            .net_info
            .entry(request.db_instance_id.clone())
            .or_default()
            .push(DbNetInfo {
                ip_type: "Public".to_string(),
                connection_string: format!("{}.mysql.rds.aliyuncs.com", request.connection_prefix),
                ip_address: "47.1.1.1".to_string(),
                port: request.port.clone(),
            });
        Ok(())
    }

    async fn release_public_connection(
        &self,
        db_instance_id: &str,
        connection_string: &str,
    ) -> Result<()> {
        self.record(format!("release_public_connection {connection_string}"));
        if let Some(infos) = self.state().net_info.get_mut(db_instance_id) {
            infos.retain(|info| info.connection_string != connection_string);
        }
        Ok(())
    }
}

#[async_trait]
impl SlbApi for FakeCloud {
    async fn list_load_balancers(&self, region_id: &str) -> Result<Vec<LoadBalancerRecord>> {
        Ok(self
            .state()
            .balancers
            .iter()
            .filter(|lb| lb.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn create_load_balancer(&self, request: &CreateLoadBalancer) -> Result<String> {
        self.record(format!("create_load_balancer {}", request.name));
        let state = &mut *self.state();
        let id = state.next_id("lb");
        state.balancers.push(LoadBalancerRecord {
            load_balancer_id: id.clone(),
            name: request.name.clone(),
            address: format!("47.0.0.{}", state.next_id),
            address_type: request.address_type.clone(),
            vpc_id: request.vpc_id.clone().unwrap_or_default(),
            vswitch_id: request.vswitch_id.clone().unwrap_or_default(),
            status: "active".to_string(),
            region_id: request.region_id.clone(),
        });
        Ok(id)
    }

    async fn delete_load_balancer(&self, load_balancer_id: &str) -> Result<()> {
        self.record(format!("delete_load_balancer {load_balancer_id}"));
        self.check("delete_load_balancer", load_balancer_id)?;
        let mut state = self.state();
        let before = state.balancers.len();
        state.balancers.retain(|lb| lb.load_balancer_id != load_balancer_id);
        if state.balancers.len() == before {
            return Err(CloudError::provider("InvalidLoadBalancerId.NotFound", load_balancer_id));
        }
        Ok(())
    }

    async fn listener_ports(&self, load_balancer_id: &str) -> Result<Vec<i64>> {
        Ok(self
            .state()
            .listeners
            .iter()
            .filter(|l| l.load_balancer_id == load_balancer_id)
            .map(|l| l.port)
            .collect())
    }

    async fn create_listener(&self, request: &CreateListener) -> Result<()> {
        self.record(format!(
            "create_listener {} {}",
            request.protocol, request.listen_port
        ));
        self.check("create_listener", &request.listen_port.to_string())?;
        self.state().listeners.push(Listener {
            load_balancer_id: request.load_balancer_id.clone(),
            port: request.listen_port,
            protocol: request.protocol,
            status: "stopped".to_string(),
            request: request.clone(),
        });
        Ok(())
    }

    async fn start_listener(&self, load_balancer_id: &str, port: i64) -> Result<()> {
        self.record(format!("start_listener {port}"));
        self.check("start_listener", &port.to_string())?;
        let mut state = self.state();
        if let Some(listener) = state
            .listeners
            .iter_mut()
            .find(|l| l.load_balancer_id == load_balancer_id && l.port == port)
        {
            listener.status = "running".to_string();
        }
        Ok(())
    }

    async fn listener_status(&self, load_balancer_id: &str, port: i64) -> Result<Option<String>> {
        Ok(self
            .state()
            .listeners
            .iter()
            .find(|l| l.load_balancer_id == load_balancer_id && l.port == port)
            .map(|l| l.status.clone()))
    }

    async fn list_server_certificates(&self, _region_id: &str) -> Result<Vec<CertificateRecord>> {
        Ok(self.state().certificates.clone())
    }

    async fn list_ca_certificates(&self, _region_id: &str) -> Result<Vec<CertificateRecord>> {
        Ok(self.state().ca_certificates.clone())
    }

    async fn list_vserver_groups(&self, load_balancer_id: &str) -> Result<Vec<VServerGroupRecord>> {
        Ok(self
            .state()
            .groups
            .iter()
            .filter(|g| g.load_balancer_id == load_balancer_id)
            .map(|g| g.record.clone())
            .collect())
    }

    async fn create_vserver_group(
        &self,
        load_balancer_id: &str,
        name: &str,
        backends: &[BackendServer],
    ) -> Result<String> {
        self.record(format!("create_vserver_group {name}"));
        let mut state = self.state();
        let id = state.next_id("rsp");
        state.groups.push(Group {
            load_balancer_id: load_balancer_id.to_string(),
            record: VServerGroupRecord {
                vserver_group_id: id.clone(),
                name: name.to_string(),
            },
            backends: backends.to_vec(),
        });
        Ok(id)
    }

    async fn list_rules(&self, load_balancer_id: &str, port: i64) -> Result<Vec<RuleRecord>> {
        Ok(self
            .state()
            .rules
            .iter()
            .filter(|(lb, p, _)| lb == load_balancer_id && *p == port)
            .map(|(_, _, rule)| rule.clone())
            .collect())
    }

    async fn create_rules(&self, load_balancer_id: &str, port: i64, rules: &[RuleSpec]) -> Result<()> {
        self.record(format!("create_rules {port} {}", rules.len()));
        let mut state = self.state();
        for spec in rules {
            let id = state.next_id("rule");
            state.rules.push((
                load_balancer_id.to_string(),
                port,
                RuleRecord {
                    rule_id: id,
                    name: spec.name.clone(),
                    domain: spec.domain.clone(),
                    url: spec.url.clone().unwrap_or_default(),
                    vserver_group_id: spec.vserver_group_id.clone(),
                },
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CsApi for FakeCloud {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        Ok(self.state().clusters.clone())
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<Option<ClusterRecord>> {
        let cluster = self
            .state()
            .clusters
            .iter()
            .find(|c| c.cluster_id == cluster_id)
            .cloned();
        Ok(cluster.map(|mut c| {
            c.state = self.poll(cluster_id, c.state);
            c
        }))
    }

    async fn create_cluster(&self, _region_id: &str, request: &CreateCluster) -> Result<String> {
        self.record(format!("create_cluster {}", request.name));
        let mut state = self.state();
        let id = state.next_id("c");
        state.clusters.push(ClusterRecord {
            cluster_id: id.clone(),
            name: request.name.clone(),
            state: "running".to_string(),
            vpc_id: request.vpc_id.clone(),
            vswitch_id: request.vswitch_id.clone(),
            size: request.size,
        });
        Ok(id)
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<()> {
        self.record(format!("delete_cluster {cluster_id}"));
        let mut state = self.state();
        let before = state.clusters.len();
        state.clusters.retain(|c| c.cluster_id != cluster_id);
        if state.clusters.len() == before {
            return Err(CloudError::provider("ErrorClusterNotFound", cluster_id));
        }
        Ok(())
    }

    async fn list_volumes(&self, cluster_id: &str) -> Result<Vec<VolumeRecord>> {
        Ok(self
            .state()
            .volumes
            .iter()
            .filter(|(c, _)| c == cluster_id)
            .map(|(_, v)| VolumeRecord {
                name: v.name.clone(),
                driver: String::new(),
            })
            .collect())
    }

    async fn create_volume(&self, cluster_id: &str, request: &CreateVolume) -> Result<()> {
        self.record(format!("create_volume {}", request.name));
        self.state()
            .volumes
            .push((cluster_id.to_string(), request.clone()));
        Ok(())
    }

    async fn list_projects(&self, cluster_id: &str) -> Result<Vec<ProjectRecord>> {
        Ok(self
            .state()
            .projects
            .iter()
            .filter(|p| p.cluster_id == cluster_id)
            .map(|p| p.record.clone())
            .collect())
    }

    async fn describe_project(&self, cluster_id: &str, name: &str) -> Result<Option<ProjectRecord>> {
        let project = self
            .state()
            .projects
            .iter()
            .find(|p| p.cluster_id == cluster_id && p.record.name == name)
            .map(|p| p.record.clone());
        Ok(project.map(|mut p| {
            p.current_state = self.poll(name, p.current_state);
            p
        }))
    }

    async fn create_project(&self, cluster_id: &str, request: &CreateProject) -> Result<()> {
        self.record(format!("create_project {}", request.name));
        self.state().projects.push(Project {
            cluster_id: cluster_id.to_string(),
            record: ProjectRecord {
                name: request.name.clone(),
                current_state: "running".to_string(),
                version: request.version.clone(),
            },
            request: request.clone(),
        });
        Ok(())
    }

    async fn delete_project(&self, cluster_id: &str, name: &str) -> Result<()> {
        self.record(format!("delete_project {name}"));
        self.check("delete_project", name)?;
        self.state()
            .projects
            .retain(|p| !(p.cluster_id == cluster_id && p.record.name == name));
        Ok(())
    }
}

#[async_trait]
impl DnsApi for FakeCloud {
    async fn describe_domain_records(&self, domain_name: &str) -> Result<Vec<DomainRecord>> {
        Ok(self
            .state()
            .records
            .iter()
            .filter(|(domain, _)| domain == domain_name)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn add_domain_record(&self, spec: &DomainRecordSpec) -> Result<String> {
        self.record(format!("add_domain_record {}", spec.rr));
        let mut state = self.state();
        if state.records.iter().any(|(domain, r)| {
            *domain == spec.domain_name
                && r.rr == spec.rr
                && r.record_type == spec.record_type
                && r.value == spec.value
        }) {
            return Err(CloudError::provider("DomainRecordDuplicate", &spec.rr));
        }

        let id = state.next_id("rec");
        state.records.push((
            spec.domain_name.clone(),
            DomainRecord {
                record_id: id.clone(),
                rr: spec.rr.clone(),
                record_type: spec.record_type.clone(),
                value: spec.value.clone(),
                ttl: spec.ttl,
                priority: if spec.uses_priority() { spec.priority } else { 0 },
                line: spec.line.clone(),
            },
        ));
        Ok(id)
    }

    async fn update_domain_record(&self, record_id: &str, spec: &DomainRecordSpec) -> Result<()> {
        self.record(format!("update_domain_record {record_id}"));
        let mut state = self.state();
        let (_, record) = state
            .records
            .iter_mut()
            .find(|(_, r)| r.record_id == record_id)
            .ok_or_else(|| CloudError::provider("DomainRecordNotBelongToUser", record_id))?;
        record.value = spec.value.clone();
        record.ttl = spec.ttl;
        record.line = spec.line.clone();
        Ok(())
    }

    async fn delete_domain_record(&self, record_id: &str) -> Result<()> {
        self.record(format!("delete_domain_record {record_id}"));
        self.state().records.retain(|(_, r)| r.record_id != record_id);
        Ok(())
    }
}

#[async_trait]
impl OssApi for FakeCloud {
    async fn list_buckets(&self) -> Result<Vec<BucketRecord>> {
        Ok(self.state().buckets.iter().map(|(b, _)| b.clone()).collect())
    }

    async fn create_bucket(&self, name: &str, acl: &str) -> Result<()> {
        self.record(format!("create_bucket {name}"));
        self.state().buckets.push((
            BucketRecord {
                name: name.to_string(),
                location: format!("oss-{REGION}"),
            },
            acl.to_string(),
        ));
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.record(format!("delete_bucket {name}"));
        let mut state = self.state();
        let before = state.buckets.len();
        state.buckets.retain(|(b, _)| b.name != name);
        if state.buckets.len() == before {
            return Err(CloudError::provider("NoSuchBucket", name));
        }
        Ok(())
    }
}

/// Serves every session from one fake account
pub struct FakeFactory(pub Arc<FakeCloud>);

impl ClientFactory for FakeFactory {
    fn clients(&self, _credentials: &Credentials) -> AliyunClients {
        AliyunClients::uniform(self.0.clone())
    }
}

/// Answers prompts from a fixed script and remembers what was asked
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&self, prompt: &str, _secret: bool) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CloudError::EnvFunction("no scripted answer left".to_string()))
    }
}

/// Configuration with the test credentials merged in
pub fn config(yaml: &str) -> Config {
    let mut root: serde_json::Value = yaml_value(CREDENTIALS);
    let body: serde_json::Value = yaml_value(yaml);

    if let (Some(root_map), Some(body_map)) = (root.as_object_mut(), body.as_object()) {
        for (key, value) in body_map {
            match (root_map.get_mut(key), value) {
                (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(extra)) => {
                    existing.extend(extra.clone());
                }
                _ => {
                    root_map.insert(key.clone(), value.clone());
                }
            }
        }
    }

    Config::new(root)
}

fn yaml_value(yaml: &str) -> serde_json::Value {
    Config::from_yaml_str(yaml).unwrap().as_value().clone()
}

/// A provider over `cloud` that never touches a terminal
pub fn provider(cloud: &Arc<FakeCloud>) -> AliyunProvider {
    AliyunProvider::new(Arc::new(FakeFactory(cloud.clone())))
        .with_prompter(ScriptedPrompter::new(&[]))
}

/// Open a session for `code`
#[allow(dead_code)]
pub fn session(cloud: &Arc<FakeCloud>, code: &str, yaml: &str) -> (Aliyun, HandlerContext) {
    session_with(cloud, code, yaml, ScriptedPrompter::new(&[]))
}

/// Open a session for `code` answering prompts from `prompter`
#[allow(dead_code)]
pub fn session_with(
    cloud: &Arc<FakeCloud>,
    code: &str,
    yaml: &str,
    prompter: Arc<ScriptedPrompter>,
) -> (Aliyun, HandlerContext) {
    let ctx = HandlerContext::new().with_code(code);
    let aliyun = provider(cloud)
        .with_prompter(prompter)
        .connect(ctx.clone(), config(yaml))
        .unwrap();
    (aliyun, ctx)
}

/// Signed VPC and VSwitch for `code`, returning their ids
#[allow(dead_code)]
pub fn network(cloud: &FakeCloud, code: &str) -> (String, String) {
    let vpc_id = cloud.add_vpc("main", "172.16.0.0/16", &format!("[{code}]"));
    let vswitch_id = cloud.add_vswitch(&vpc_id, "web", &format!("[{code}]"));
    (vpc_id, vswitch_id)
}
