//! Per-service API boundary
//!
//! Each Alibaba Cloud product the families touch is reached through one
//! narrow trait. The production implementation drives the `aliyun` CLI
//! (see [`crate::cli`]); tests substitute an in-memory fake.

use async_trait::async_trait;
use provflow_cloud::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// VPC
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcRecord {
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    #[serde(rename = "VpcName", default)]
    pub name: String,
    #[serde(rename = "CidrBlock", default)]
    pub cidr_block: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "RegionId", default)]
    pub region_id: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VSwitchRecord {
    #[serde(rename = "VSwitchId")]
    pub vswitch_id: String,
    #[serde(rename = "VpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "VSwitchName", default)]
    pub name: String,
    #[serde(rename = "CidrBlock", default)]
    pub cidr_block: String,
    #[serde(rename = "ZoneId", default)]
    pub zone_id: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVpc {
    pub region_id: String,
    pub name: String,
    pub cidr_block: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVSwitch {
    pub vpc_id: String,
    pub zone_id: String,
    pub name: String,
    pub cidr_block: String,
    pub description: String,
}

#[async_trait]
pub trait VpcApi: Send + Sync {
    async fn list_vpcs(&self, region_id: &str) -> Result<Vec<VpcRecord>>;
    async fn describe_vpc(&self, vpc_id: &str) -> Result<Option<VpcRecord>>;
    async fn create_vpc(&self, request: &CreateVpc) -> Result<String>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<()>;

    async fn list_vswitches(&self, vpc_id: &str) -> Result<Vec<VSwitchRecord>>;
    async fn describe_vswitch(&self, vswitch_id: &str) -> Result<Option<VSwitchRecord>>;
    async fn create_vswitch(&self, request: &CreateVSwitch) -> Result<String>;
    async fn delete_vswitch(&self, vswitch_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// ECS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub instance_name: String,
    pub zone_id: String,
    pub network_type: String,
    pub vpc_id: String,
    pub vswitch_id: String,
    pub status: String,
    pub tags: BTreeMap<String, String>,
}

/// Search criteria for compute instances; empty fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceQuery {
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub network_type: Option<String>,
    pub zone_id: Option<String>,
    pub vpc_id: Option<String>,
    pub vswitch_id: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl InstanceQuery {
    pub fn matches(&self, instance: &InstanceRecord) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        eq(&self.instance_id, &instance.instance_id)
            && eq(&self.instance_name, &instance.instance_name)
            && eq(&self.network_type, &instance.network_type)
            && eq(&self.zone_id, &instance.zone_id)
            && eq(&self.vpc_id, &instance.vpc_id)
            && eq(&self.vswitch_id, &instance.vswitch_id)
            && self
                .tags
                .iter()
                .all(|(k, v)| instance.tags.get(k) == Some(v))
    }
}

#[async_trait]
pub trait EcsApi: Send + Sync {
    async fn describe_instances(
        &self,
        region_id: &str,
        query: &InstanceQuery,
    ) -> Result<Vec<InstanceRecord>>;
}

// ---------------------------------------------------------------------------
// RDS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInstanceRecord {
    pub db_instance_id: String,
    pub description: String,
    pub engine: String,
    pub engine_version: String,
    pub vpc_id: String,
    pub vswitch_id: String,
    pub status: String,
    pub tags: BTreeMap<String, String>,
}

impl DbInstanceRecord {
    /// Declared name carried by the `name` tag
    pub fn name(&self) -> &str {
        self.tags
            .get("name")
            .map(String::as_str)
            .unwrap_or(&self.description)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstanceAttribute {
    #[serde(rename = "DBInstanceId")]
    pub db_instance_id: String,
    #[serde(rename = "DBInstanceDescription", default)]
    pub description: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: String,
    #[serde(rename = "DBInstanceClass", default)]
    pub instance_class: String,
    #[serde(rename = "DBInstanceStatus", default)]
    pub status: String,
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub zone_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbNetInfo {
    #[serde(rename = "IPType", default)]
    pub ip_type: String,
    #[serde(default)]
    pub connection_string: String,
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
    #[serde(default)]
    pub port: String,
}

/// Net info of one instance, as published to outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInstanceNetInfo {
    pub instance_id: String,
    pub instance_name: String,
    pub net_info: Vec<DbNetInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDbInstance {
    pub region_id: String,
    pub zone_id: String,
    pub engine: String,
    pub engine_version: String,
    pub pay_type: String,
    pub instance_class: String,
    pub storage: i64,
    pub net_type: String,
    pub network_type: String,
    pub vpc_id: String,
    pub vswitch_id: String,
    pub description: String,
    pub used_time: Option<String>,
    pub period: Option<String>,
    pub connection_mode: String,
    pub security_ip_list: String,
    pub private_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "AccountName")]
    pub account_name: String,
    #[serde(rename = "AccountType", default)]
    pub account_type: String,
    #[serde(rename = "AccountStatus", default)]
    pub status: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct CreateAccount {
    pub db_instance_id: String,
    pub account_name: String,
    pub password: String,
    pub description: String,
    pub account_type: String,
}

impl std::fmt::Debug for CreateAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateAccount")
            .field("db_instance_id", &self.db_instance_id)
            .field("account_name", &self.account_name)
            .field("password", &"<redacted>")
            .field("account_type", &self.account_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantPrivilege {
    pub db_instance_id: String,
    pub account_name: String,
    pub db_name: String,
    pub privilege: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatePublicConnection {
    pub db_instance_id: String,
    pub connection_prefix: String,
    pub port: String,
}

#[async_trait]
pub trait RdsApi: Send + Sync {
    /// Instances carrying every tag in `tags`
    async fn list_instances(
        &self,
        region_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Vec<DbInstanceRecord>>;
    async fn describe_instance(&self, db_instance_id: &str) -> Result<Option<DbInstanceRecord>>;
    async fn create_instance(&self, request: &CreateDbInstance) -> Result<String>;
    async fn add_tags(
        &self,
        region_id: &str,
        db_instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<()>;
    async fn delete_instance(&self, db_instance_id: &str) -> Result<()>;

    async fn describe_attributes(&self, db_instance_ids: &[String]) -> Result<Vec<DbInstanceAttribute>>;
    async fn describe_net_info(&self, db_instance_id: &str) -> Result<Vec<DbNetInfo>>;

    async fn list_accounts(&self, db_instance_id: &str) -> Result<Vec<AccountRecord>>;
    async fn create_account(&self, request: &CreateAccount) -> Result<()>;
    async fn grant_privilege(&self, request: &GrantPrivilege) -> Result<()>;

    async fn allocate_public_connection(&self, request: &AllocatePublicConnection) -> Result<()>;
    async fn release_public_connection(
        &self,
        db_instance_id: &str,
        connection_string: &str,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SLB
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerRecord {
    #[serde(rename = "LoadBalancerId")]
    pub load_balancer_id: String,
    #[serde(rename = "LoadBalancerName", default)]
    pub name: String,
    #[serde(rename = "Address", default)]
    pub address: String,
    #[serde(rename = "AddressType", default)]
    pub address_type: String,
    #[serde(rename = "VpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "VSwitchId", default)]
    pub vswitch_id: String,
    #[serde(rename = "LoadBalancerStatus", default)]
    pub status: String,
    #[serde(rename = "RegionId", default)]
    pub region_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLoadBalancer {
    pub region_id: String,
    pub name: String,
    pub address_type: String,
    pub charge_type: String,
    pub bandwidth: i64,
    pub vpc_id: Option<String>,
    pub vswitch_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerProtocol {
    Http,
    Https,
    Tcp,
    Udp,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl std::fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheck {
    /// `on` or `off`
    pub check: String,
    /// `tcp` or `http`; TCP listeners only
    pub check_type: Option<String>,
    pub domain: Option<String>,
    pub uri: Option<String>,
    pub connect_port: Option<i64>,
    pub healthy_threshold: i64,
    pub unhealthy_threshold: i64,
    pub timeout: i64,
    pub interval: i64,
    pub http_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpOptions {
    pub gzip: String,
    pub sticky_session: String,
    pub sticky_session_type: String,
    pub cookie_timeout: i64,
    pub cookie: Option<String>,
    pub x_forwarded_for_slb_id: String,
    pub x_forwarded_for_slb_ip: String,
    pub x_forwarded_for_proto: String,
    pub server_certificate_id: Option<String>,
    pub ca_certificate_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateListener {
    pub load_balancer_id: String,
    pub protocol: ListenerProtocol,
    pub listen_port: i64,
    pub backend_port: Option<i64>,
    pub bandwidth: i64,
    pub scheduler: String,
    /// `on` or `off`
    pub vserver_group: String,
    pub vserver_group_id: Option<String>,
    pub persistence_timeout: Option<i64>,
    pub health_check: HealthCheck,
    pub http: Option<HttpOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VServerGroupRecord {
    #[serde(rename = "VServerGroupId")]
    pub vserver_group_id: String,
    #[serde(rename = "VServerGroupName", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendServer {
    #[serde(rename = "ServerId")]
    pub server_id: String,
    #[serde(rename = "Port")]
    pub port: i64,
    #[serde(rename = "Weight")]
    pub weight: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(rename = "RuleId")]
    pub rule_id: String,
    #[serde(rename = "RuleName", default)]
    pub name: String,
    #[serde(rename = "Domain", default)]
    pub domain: String,
    #[serde(rename = "Url", default)]
    pub url: String,
    #[serde(rename = "VServerGroupId", default)]
    pub vserver_group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(rename = "RuleName")]
    pub name: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "VServerGroupId")]
    pub vserver_group_id: String,
}

#[async_trait]
pub trait SlbApi: Send + Sync {
    async fn list_load_balancers(&self, region_id: &str) -> Result<Vec<LoadBalancerRecord>>;
    async fn create_load_balancer(&self, request: &CreateLoadBalancer) -> Result<String>;
    async fn delete_load_balancer(&self, load_balancer_id: &str) -> Result<()>;

    /// Front-end ports already listened on the balancer
    async fn listener_ports(&self, load_balancer_id: &str) -> Result<Vec<i64>>;
    async fn create_listener(&self, request: &CreateListener) -> Result<()>;
    async fn start_listener(&self, load_balancer_id: &str, port: i64) -> Result<()>;
    async fn listener_status(&self, load_balancer_id: &str, port: i64) -> Result<Option<String>>;

    async fn list_server_certificates(&self, region_id: &str) -> Result<Vec<CertificateRecord>>;
    async fn list_ca_certificates(&self, region_id: &str) -> Result<Vec<CertificateRecord>>;

    async fn list_vserver_groups(&self, load_balancer_id: &str) -> Result<Vec<VServerGroupRecord>>;
    async fn create_vserver_group(
        &self,
        load_balancer_id: &str,
        name: &str,
        backends: &[BackendServer],
    ) -> Result<String>;

    async fn list_rules(&self, load_balancer_id: &str, port: i64) -> Result<Vec<RuleRecord>>;
    async fn create_rules(&self, load_balancer_id: &str, port: i64, rules: &[RuleSpec]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Container service (swarm clusters)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_id: String,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub vswitch_id: String,
    #[serde(default)]
    pub size: i64,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CreateCluster {
    pub name: String,
    pub size: i64,
    pub network_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_cidr: Option<String>,
    pub instance_type: String,
    pub vpc_id: String,
    pub vswitch_id: String,
    pub password: String,
    pub data_disk_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_disk_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecs_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_optimized: Option<String>,
}

impl std::fmt::Debug for CreateCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateCluster")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("instance_type", &self.instance_type)
            .field("vpc_id", &self.vpc_id)
            .field("vswitch_id", &self.vswitch_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub name: String,
    #[serde(default)]
    pub driver: String,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum VolumeDriver {
    Ossfs {
        bucket: String,
        url: String,
        ak_id: String,
        ak_secret: String,
        no_stat_cache: String,
        other_opts: Option<String>,
    },
    Nas {
        disk_id: Option<String>,
        host: Option<String>,
        path: Option<String>,
        mode: Option<String>,
    },
}

impl std::fmt::Debug for VolumeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ossfs { bucket, url, .. } => f
                .debug_struct("Ossfs")
                .field("bucket", bucket)
                .field("url", url)
                .finish_non_exhaustive(),
            Self::Nas { host, path, .. } => f
                .debug_struct("Nas")
                .field("host", host)
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVolume {
    pub name: String,
    #[serde(flatten)]
    pub driver: VolumeDriver,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateProject {
    pub name: String,
    pub description: String,
    pub template: String,
    pub version: String,
    pub latest_image: bool,
    pub environment: BTreeMap<String, String>,
}

#[async_trait]
pub trait CsApi: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>>;
    async fn describe_cluster(&self, cluster_id: &str) -> Result<Option<ClusterRecord>>;
    async fn create_cluster(&self, region_id: &str, request: &CreateCluster) -> Result<String>;
    async fn delete_cluster(&self, cluster_id: &str) -> Result<()>;

    async fn list_volumes(&self, cluster_id: &str) -> Result<Vec<VolumeRecord>>;
    async fn create_volume(&self, cluster_id: &str, request: &CreateVolume) -> Result<()>;

    async fn list_projects(&self, cluster_id: &str) -> Result<Vec<ProjectRecord>>;
    async fn describe_project(&self, cluster_id: &str, name: &str) -> Result<Option<ProjectRecord>>;
    async fn create_project(&self, cluster_id: &str, request: &CreateProject) -> Result<()>;
    async fn delete_project(&self, cluster_id: &str, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DNS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    #[serde(rename = "RecordId")]
    pub record_id: String,
    #[serde(rename = "RR", default)]
    pub rr: String,
    #[serde(rename = "Type", default)]
    pub record_type: String,
    #[serde(rename = "Value", default)]
    pub value: String,
    #[serde(rename = "TTL", default)]
    pub ttl: i64,
    #[serde(rename = "Priority", default)]
    pub priority: i64,
    #[serde(rename = "Line", default)]
    pub line: String,
}

/// Desired state of one domain record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecordSpec {
    pub domain_name: String,
    pub rr: String,
    pub record_type: String,
    pub value: String,
    pub ttl: i64,
    pub priority: i64,
    pub line: String,
}

impl DomainRecordSpec {
    /// Priority only applies to MX records
    pub fn uses_priority(&self) -> bool {
        self.record_type.eq_ignore_ascii_case("MX")
    }

    /// Whether `record` already carries every declared field
    pub fn is_satisfied_by(&self, record: &DomainRecord) -> bool {
        record.rr == self.rr
            && record.record_type == self.record_type
            && record.value == self.value
            && record.ttl == self.ttl
            && (!self.uses_priority() || record.priority == self.priority)
            && record.line == self.line
    }
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn describe_domain_records(&self, domain_name: &str) -> Result<Vec<DomainRecord>>;
    async fn add_domain_record(&self, spec: &DomainRecordSpec) -> Result<String>;
    async fn update_domain_record(&self, record_id: &str, spec: &DomainRecordSpec) -> Result<()>;
    async fn delete_domain_record(&self, record_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// OSS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

#[async_trait]
pub trait OssApi: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketRecord>>;
    async fn create_bucket(&self, name: &str, acl: &str) -> Result<()>;
    async fn delete_bucket(&self, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Client set
// ---------------------------------------------------------------------------

/// One client per product, built once per handler invocation
#[derive(Clone)]
pub struct AliyunClients {
    pub vpc: Arc<dyn VpcApi>,
    pub ecs: Arc<dyn EcsApi>,
    pub rds: Arc<dyn RdsApi>,
    pub slb: Arc<dyn SlbApi>,
    pub cs: Arc<dyn CsApi>,
    pub dns: Arc<dyn DnsApi>,
    pub oss: Arc<dyn OssApi>,
}

impl AliyunClients {
    /// Every product served by the same implementation
    pub fn uniform<T>(client: Arc<T>) -> Self
    where
        T: VpcApi + EcsApi + RdsApi + SlbApi + CsApi + DnsApi + OssApi + 'static,
    {
        Self {
            vpc: client.clone(),
            ecs: client.clone(),
            rds: client.clone(),
            slb: client.clone(),
            cs: client.clone(),
            dns: client.clone(),
            oss: client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_query_matches() {
        let instance = InstanceRecord {
            instance_id: "i-1".into(),
            instance_name: "web".into(),
            vpc_id: "vpc-1".into(),
            vswitch_id: "vsw-1".into(),
            tags: BTreeMap::from([("role".to_string(), "web".to_string())]),
            ..Default::default()
        };

        let mut query = InstanceQuery {
            vpc_id: Some("vpc-1".into()),
            ..Default::default()
        };
        assert!(query.matches(&instance));

        query.tags.insert("role".into(), "db".into());
        assert!(!query.matches(&instance));
    }

    #[test]
    fn test_rule_spec_omits_empty_url() {
        let rule = RuleSpec {
            name: "api".into(),
            domain: "api.example.com".into(),
            url: None,
            vserver_group_id: "rsp-1".into(),
        };

        let json = serde_json::to_string(&[rule]).unwrap();
        assert_eq!(
            json,
            r#"[{"RuleName":"api","Domain":"api.example.com","VServerGroupId":"rsp-1"}]"#
        );
    }
}
