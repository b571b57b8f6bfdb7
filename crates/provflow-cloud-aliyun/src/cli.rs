//! aliyun CLI wrapper
//!
//! Implements every per-service API trait by shelling out to the `aliyun`
//! command-line client. RPC-style products are called as
//! `aliyun <product> <Action> --Key value`, the container service through its
//! ROA paths and buckets through the bundled `oss` subcommand.

use crate::api::*;
use crate::credentials::Credentials;
use crate::error::AliyunError;
use async_trait::async_trait;
use provflow_cloud::{CloudError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

const PAGE_SIZE: usize = 50;

/// Ordered `--Key value` parameters
#[derive(Debug, Default, Clone)]
struct Params(Vec<(String, String)>);

impl Params {
    fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    fn opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    fn args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(k, v)| [format!("--{k}"), v.clone()])
            .collect()
    }
}

/// aliyun CLI wrapper
#[derive(Clone)]
pub struct AliyunCli {
    binary: String,
    credentials: Credentials,
}

impl AliyunCli {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            binary: "aliyun".to_string(),
            credentials,
        }
    }

    /// Use another executable, e.g. an absolute path
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check that the CLI can be spawned
    pub async fn check_installed(&self) -> std::result::Result<String, AliyunError> {
        let output = Command::new(&self.binary)
            .arg("version")
            .output()
            .await
            .map_err(|_| AliyunError::CliNotFound)?;

        if !output.status.success() {
            return Err(AliyunError::CliNotFound);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run an aliyun command and return stdout
    async fn run_command(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.env("ALIBABA_CLOUD_ACCESS_KEY_ID", &self.credentials.access_key_id);
        cmd.env(
            "ALIBABA_CLOUD_ACCESS_KEY_SECRET",
            &self.credentials.access_key_secret,
        );
        cmd.env("ALIBABA_CLOUD_REGION_ID", &self.credentials.region);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.binary, redacted(args).join(" "));

        let output = cmd.output().await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                CloudError::CommandFailed(format!("{} not found in PATH", self.binary))
            } else {
                CloudError::Io(err)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(parse_error(&format!("{stderr}\n{stdout}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// RPC call: `aliyun <product> <Action> --Key value ...`
    async fn call(&self, product: &str, action: &str, params: Params) -> Result<Value> {
        let mut args = vec![product.to_string(), action.to_string()];
        args.extend(params.args());

        let output = self.run_command(&args).await?;
        if output.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// Collect every page of a list action
    async fn paged<T: DeserializeOwned>(
        &self,
        product: &str,
        action: &str,
        params: Params,
        path: &[&str],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let response = self
                .call(
                    product,
                    action,
                    params
                        .clone()
                        .set("PageSize", PAGE_SIZE)
                        .set("PageNumber", page),
                )
                .await?;

            let batch: Vec<T> = extract(&response, path)?;
            let fetched = batch.len();
            items.extend(batch);

            let total = response
                .get("TotalCount")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            if fetched < PAGE_SIZE || items.len() >= total {
                return Ok(items);
            }
            page += 1;
        }
    }

    /// ROA call: `aliyun <product> <METHOD> <path> [--body json]`
    async fn roa(&self, product: &str, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let mut args = vec![product.to_string(), method.to_string(), path.to_string()];
        if let Some(body) = body {
            args.push("--body".to_string());
            args.push(body.to_string());
        }

        let output = self.run_command(&args).await?;
        if output.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    fn oss_endpoint(&self) -> String {
        format!("oss-{}.aliyuncs.com", self.credentials.region)
    }
}

/// Command line with secret values masked, for logging
fn redacted(args: &[String]) -> Vec<String> {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;

    for arg in args {
        if hide_next {
            masked.push("***".to_string());
            hide_next = false;
            continue;
        }
        hide_next = arg == "--body" || arg.to_ascii_lowercase().contains("password");
        masked.push(arg.clone());
    }

    masked
}

/// Pull `ErrorCode` and `Message` out of the CLI's error report
fn parse_error(text: &str) -> CloudError {
    let field = |name: &str| {
        text.lines().find_map(|line| {
            let line = line.trim();
            line.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix(':').or_else(|| rest.strip_prefix('=')))
                .map(|value| value.trim().to_string())
        })
    };

    match field("ErrorCode") {
        Some(code) => {
            let message = field("Message").unwrap_or_else(|| text.trim().to_string());
            CloudError::provider(code, message)
        }
        None => {
            // ossutil reports `ErrorCode=X` inline
            let inline = text.split_whitespace().find_map(|token| {
                token
                    .trim_matches(|c: char| c == ',' || c == '(' || c == ')')
                    .strip_prefix("ErrorCode=")
                    .map(str::to_string)
            });
            match inline {
                Some(code) => CloudError::provider(code, text.trim()),
                None => CloudError::CommandFailed(text.trim().to_string()),
            }
        }
    }
}

/// Deserialize the array found at `path`; a missing path is an empty list
fn extract<T: DeserializeOwned>(value: &Value, path: &[&str]) -> Result<Vec<T>> {
    let node = path.iter().try_fold(value, |node, key| node.get(key));
    match node {
        Some(Value::Array(items)) => Ok(serde_json::from_value(Value::Array(items.clone()))?),
        _ => Ok(Vec::new()),
    }
}

fn string_field(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| CloudError::CommandFailed(format!("response has no {key}: {value}")))
}

fn is_not_found(err: &CloudError) -> bool {
    err.code().is_some_and(|code| code.contains("NotFound"))
}

// ---------------------------------------------------------------------------
// VPC
// ---------------------------------------------------------------------------

#[async_trait]
impl VpcApi for AliyunCli {
    async fn list_vpcs(&self, region_id: &str) -> Result<Vec<VpcRecord>> {
        self.paged(
            "vpc",
            "DescribeVpcs",
            Params::new().set("RegionId", region_id),
            &["Vpcs", "Vpc"],
        )
        .await
    }

    async fn describe_vpc(&self, vpc_id: &str) -> Result<Option<VpcRecord>> {
        let response = self
            .call(
                "vpc",
                "DescribeVpcs",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("VpcId", vpc_id),
            )
            .await?;
        Ok(extract(&response, &["Vpcs", "Vpc"])?.into_iter().next())
    }

    async fn create_vpc(&self, request: &CreateVpc) -> Result<String> {
        let response = self
            .call(
                "vpc",
                "CreateVpc",
                Params::new()
                    .set("RegionId", &request.region_id)
                    .set("VpcName", &request.name)
                    .set("CidrBlock", &request.cidr_block)
                    .set("Description", &request.description),
            )
            .await?;
        string_field(&response, "VpcId")
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        self.call("vpc", "DeleteVpc", Params::new().set("VpcId", vpc_id))
            .await?;
        Ok(())
    }

    async fn list_vswitches(&self, vpc_id: &str) -> Result<Vec<VSwitchRecord>> {
        self.paged(
            "vpc",
            "DescribeVSwitches",
            Params::new()
                .set("RegionId", &self.credentials.region)
                .set("VpcId", vpc_id),
            &["VSwitches", "VSwitch"],
        )
        .await
    }

    async fn describe_vswitch(&self, vswitch_id: &str) -> Result<Option<VSwitchRecord>> {
        let response = self
            .call(
                "vpc",
                "DescribeVSwitches",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("VSwitchId", vswitch_id),
            )
            .await?;
        Ok(extract(&response, &["VSwitches", "VSwitch"])?
            .into_iter()
            .next())
    }

    async fn create_vswitch(&self, request: &CreateVSwitch) -> Result<String> {
        let response = self
            .call(
                "vpc",
                "CreateVSwitch",
                Params::new()
                    .set("VpcId", &request.vpc_id)
                    .set("ZoneId", &request.zone_id)
                    .set("VSwitchName", &request.name)
                    .set("CidrBlock", &request.cidr_block)
                    .set("Description", &request.description),
            )
            .await?;
        string_field(&response, "VSwitchId")
    }

    async fn delete_vswitch(&self, vswitch_id: &str) -> Result<()> {
        self.call("vpc", "DeleteVSwitch", Params::new().set("VSwitchId", vswitch_id))
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ECS
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInstance {
    instance_id: String,
    #[serde(default)]
    instance_name: String,
    #[serde(default)]
    zone_id: String,
    #[serde(default)]
    instance_network_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    vpc_attributes: RawVpcAttributes,
    #[serde(default)]
    tags: RawTags,
}

#[derive(Deserialize, Default)]
struct RawVpcAttributes {
    #[serde(rename = "VpcId", default)]
    vpc_id: String,
    #[serde(rename = "VSwitchId", default)]
    vswitch_id: String,
}

#[derive(Deserialize, Default)]
struct RawTags {
    #[serde(rename = "Tag", default)]
    tag: Vec<RawTag>,
}

#[derive(Deserialize)]
struct RawTag {
    #[serde(rename = "TagKey")]
    key: String,
    #[serde(rename = "TagValue", default)]
    value: String,
}

impl From<RawInstance> for InstanceRecord {
    fn from(raw: RawInstance) -> Self {
        Self {
            instance_id: raw.instance_id,
            instance_name: raw.instance_name,
            zone_id: raw.zone_id,
            network_type: raw.instance_network_type,
            vpc_id: raw.vpc_attributes.vpc_id,
            vswitch_id: raw.vpc_attributes.vswitch_id,
            status: raw.status,
            tags: raw.tags.tag.into_iter().map(|t| (t.key, t.value)).collect(),
        }
    }
}

#[async_trait]
impl EcsApi for AliyunCli {
    async fn describe_instances(
        &self,
        region_id: &str,
        query: &InstanceQuery,
    ) -> Result<Vec<InstanceRecord>> {
        let mut params = Params::new()
            .set("RegionId", region_id)
            .opt(
                "InstanceIds",
                query
                    .instance_id
                    .as_ref()
                    .map(|id| serde_json::json!([id]).to_string()),
            )
            .opt("InstanceName", query.instance_name.as_ref())
            .opt("InstanceNetworkType", query.network_type.as_ref())
            .opt("ZoneId", query.zone_id.as_ref())
            .opt("VpcId", query.vpc_id.as_ref())
            .opt("VSwitchId", query.vswitch_id.as_ref());

        for (i, (key, value)) in query.tags.iter().enumerate() {
            params = params
                .set(&format!("Tag.{}.Key", i + 1), key)
                .set(&format!("Tag.{}.Value", i + 1), value);
        }

        let raw: Vec<RawInstance> = self
            .paged("ecs", "DescribeInstances", params, &["Instances", "Instance"])
            .await?;
        Ok(raw.into_iter().map(InstanceRecord::from).collect())
    }
}

// ---------------------------------------------------------------------------
// RDS
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawDbInstance {
    #[serde(rename = "DBInstanceId")]
    id: String,
    #[serde(rename = "DBInstanceDescription", default)]
    description: String,
    #[serde(rename = "Engine", default)]
    engine: String,
    #[serde(rename = "EngineVersion", default)]
    engine_version: String,
    #[serde(rename = "VpcId", default)]
    vpc_id: String,
    #[serde(rename = "VSwitchId", default)]
    vswitch_id: String,
    #[serde(rename = "DBInstanceStatus", default)]
    status: String,
}

impl RawDbInstance {
    fn into_record(self, tags: BTreeMap<String, String>) -> DbInstanceRecord {
        DbInstanceRecord {
            db_instance_id: self.id,
            description: self.description,
            engine: self.engine,
            engine_version: self.engine_version,
            vpc_id: self.vpc_id,
            vswitch_id: self.vswitch_id,
            status: self.status,
            tags,
        }
    }
}

impl AliyunCli {
    async fn db_instance_tags(&self, db_instance_id: &str) -> Result<BTreeMap<String, String>> {
        let response = self
            .call(
                "rds",
                "DescribeTags",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("DBInstanceId", db_instance_id),
            )
            .await?;
        let tags: Vec<RawTag> = extract(&response, &["Items", "TagInfos"])?;
        Ok(tags.into_iter().map(|t| (t.key, t.value)).collect())
    }
}

#[async_trait]
impl RdsApi for AliyunCli {
    async fn list_instances(
        &self,
        region_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Vec<DbInstanceRecord>> {
        let raw: Vec<RawDbInstance> = self
            .paged(
                "rds",
                "DescribeDBInstances",
                Params::new()
                    .set("RegionId", region_id)
                    .set("Tags", serde_json::to_string(tags)?),
                &["Items", "DBInstance"],
            )
            .await?;

        let mut records = Vec::with_capacity(raw.len());
        for instance in raw {
            let tags = self.db_instance_tags(&instance.id).await?;
            records.push(instance.into_record(tags));
        }
        Ok(records)
    }

    async fn describe_instance(&self, db_instance_id: &str) -> Result<Option<DbInstanceRecord>> {
        let response = self
            .call(
                "rds",
                "DescribeDBInstances",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("DBInstanceId", db_instance_id),
            )
            .await?;
        let raw: Vec<RawDbInstance> = extract(&response, &["Items", "DBInstance"])?;
        Ok(raw
            .into_iter()
            .next()
            .map(|r| r.into_record(BTreeMap::new())))
    }

    async fn create_instance(&self, request: &CreateDbInstance) -> Result<String> {
        let response = self
            .call(
                "rds",
                "CreateDBInstance",
                Params::new()
                    .set("RegionId", &request.region_id)
                    .set("ZoneId", &request.zone_id)
                    .set("Engine", &request.engine)
                    .set("EngineVersion", &request.engine_version)
                    .set("PayType", &request.pay_type)
                    .set("DBInstanceClass", &request.instance_class)
                    .set("DBInstanceStorage", request.storage)
                    .set("DBInstanceNetType", &request.net_type)
                    .set("InstanceNetworkType", &request.network_type)
                    .set("VPCId", &request.vpc_id)
                    .set("VSwitchId", &request.vswitch_id)
                    .set("DBInstanceDescription", &request.description)
                    .opt("UsedTime", request.used_time.as_ref())
                    .opt("Period", request.period.as_ref())
                    .set("ConnectionMode", &request.connection_mode)
                    .set("SecurityIPList", &request.security_ip_list)
                    .opt("PrivateIpAddress", request.private_ip_address.as_ref()),
            )
            .await?;
        string_field(&response, "DBInstanceId")
    }

    async fn add_tags(
        &self,
        region_id: &str,
        db_instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.call(
            "rds",
            "AddTagsToResource",
            Params::new()
                .set("RegionId", region_id)
                .set("DBInstanceId", db_instance_id)
                .set("Tags", serde_json::to_string(tags)?),
        )
        .await?;
        Ok(())
    }

    async fn delete_instance(&self, db_instance_id: &str) -> Result<()> {
        self.call(
            "rds",
            "DeleteDBInstance",
            Params::new().set("DBInstanceId", db_instance_id),
        )
        .await?;
        Ok(())
    }

    async fn describe_attributes(&self, db_instance_ids: &[String]) -> Result<Vec<DbInstanceAttribute>> {
        if db_instance_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .call(
                "rds",
                "DescribeDBInstanceAttribute",
                Params::new().set("DBInstanceId", db_instance_ids.join(",")),
            )
            .await?;
        extract(&response, &["Items", "DBInstanceAttribute"])
    }

    async fn describe_net_info(&self, db_instance_id: &str) -> Result<Vec<DbNetInfo>> {
        let response = self
            .call(
                "rds",
                "DescribeDBInstanceNetInfo",
                Params::new().set("DBInstanceId", db_instance_id),
            )
            .await?;
        extract(&response, &["DBInstanceNetInfos", "DBInstanceNetInfo"])
    }

    async fn list_accounts(&self, db_instance_id: &str) -> Result<Vec<AccountRecord>> {
        let response = self
            .call(
                "rds",
                "DescribeAccounts",
                Params::new().set("DBInstanceId", db_instance_id),
            )
            .await?;
        extract(&response, &["Accounts", "DBInstanceAccount"])
    }

    async fn create_account(&self, request: &CreateAccount) -> Result<()> {
        self.call(
            "rds",
            "CreateAccount",
            Params::new()
                .set("DBInstanceId", &request.db_instance_id)
                .set("AccountName", &request.account_name)
                .set("AccountPassword", &request.password)
                .set("AccountDescription", &request.description)
                .set("AccountType", &request.account_type),
        )
        .await?;
        Ok(())
    }

    async fn grant_privilege(&self, request: &GrantPrivilege) -> Result<()> {
        self.call(
            "rds",
            "GrantAccountPrivilege",
            Params::new()
                .set("DBInstanceId", &request.db_instance_id)
                .set("AccountName", &request.account_name)
                .set("DBName", &request.db_name)
                .set("AccountPrivilege", &request.privilege),
        )
        .await?;
        Ok(())
    }

    async fn allocate_public_connection(&self, request: &AllocatePublicConnection) -> Result<()> {
        self.call(
            "rds",
            "AllocateInstancePublicConnection",
            Params::new()
                .set("DBInstanceId", &request.db_instance_id)
                .set("ConnectionStringPrefix", &request.connection_prefix)
                .set("Port", &request.port),
        )
        .await?;
        Ok(())
    }

    async fn release_public_connection(
        &self,
        db_instance_id: &str,
        connection_string: &str,
    ) -> Result<()> {
        self.call(
            "rds",
            "ReleaseInstancePublicConnection",
            Params::new()
                .set("DBInstanceId", db_instance_id)
                .set("CurrentConnectionString", connection_string),
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SLB
// ---------------------------------------------------------------------------

fn listener_params(request: &CreateListener) -> Params {
    let health = &request.health_check;
    let mut params = Params::new()
        .set("LoadBalancerId", &request.load_balancer_id)
        .set("ListenerPort", request.listen_port)
        .opt("BackendServerPort", request.backend_port)
        .set("Bandwidth", request.bandwidth)
        .set("Scheduler", &request.scheduler)
        .set("VServerGroup", &request.vserver_group)
        .opt("VServerGroupId", request.vserver_group_id.as_ref())
        .opt("PersistenceTimeout", request.persistence_timeout)
        .set("HealthCheck", &health.check)
        .opt("HealthCheckType", health.check_type.as_ref())
        .opt("HealthCheckDomain", health.domain.as_ref())
        .opt("HealthCheckURI", health.uri.as_ref())
        .opt("HealthCheckConnectPort", health.connect_port)
        .set("HealthyThreshold", health.healthy_threshold)
        .set("UnhealthyThreshold", health.unhealthy_threshold)
        .set("HealthCheckInterval", health.interval)
        .opt("HealthCheckHttpCode", health.http_code.as_ref());

    params = if request.protocol.is_http() {
        params.set("HealthCheckTimeout", health.timeout)
    } else {
        params.set("HealthCheckConnectTimeout", health.timeout)
    };

    if let Some(http) = &request.http {
        params = params
            .set("Gzip", &http.gzip)
            .set("StickySession", &http.sticky_session)
            .set("StickySessionType", &http.sticky_session_type)
            .set("CookieTimeout", http.cookie_timeout)
            .opt("Cookie", http.cookie.as_ref())
            .set("XForwardedFor_SLBID", &http.x_forwarded_for_slb_id)
            .set("XForwardedFor_SLBIP", &http.x_forwarded_for_slb_ip)
            .set("XForwardedFor_proto", &http.x_forwarded_for_proto)
            .opt("ServerCertificateId", http.server_certificate_id.as_ref())
            .opt("CACertificateId", http.ca_certificate_id.as_ref());
    }

    params
}

#[derive(Deserialize)]
struct RawCertificate {
    #[serde(alias = "ServerCertificateId", alias = "CACertificateId")]
    id: String,
    #[serde(alias = "ServerCertificateName", alias = "CACertificateName", default)]
    name: String,
}

#[async_trait]
impl SlbApi for AliyunCli {
    async fn list_load_balancers(&self, region_id: &str) -> Result<Vec<LoadBalancerRecord>> {
        self.paged(
            "slb",
            "DescribeLoadBalancers",
            Params::new().set("RegionId", region_id),
            &["LoadBalancers", "LoadBalancer"],
        )
        .await
    }

    async fn create_load_balancer(&self, request: &CreateLoadBalancer) -> Result<String> {
        let response = self
            .call(
                "slb",
                "CreateLoadBalancer",
                Params::new()
                    .set("RegionId", &request.region_id)
                    .set("LoadBalancerName", &request.name)
                    .set("AddressType", &request.address_type)
                    .set("InternetChargeType", &request.charge_type)
                    .set("Bandwidth", request.bandwidth)
                    .opt("VpcId", request.vpc_id.as_ref())
                    .opt("VSwitchId", request.vswitch_id.as_ref()),
            )
            .await?;
        string_field(&response, "LoadBalancerId")
    }

    async fn delete_load_balancer(&self, load_balancer_id: &str) -> Result<()> {
        self.call(
            "slb",
            "DeleteLoadBalancer",
            Params::new().set("LoadBalancerId", load_balancer_id),
        )
        .await?;
        Ok(())
    }

    async fn listener_ports(&self, load_balancer_id: &str) -> Result<Vec<i64>> {
        let response = self
            .call(
                "slb",
                "DescribeLoadBalancerAttribute",
                Params::new().set("LoadBalancerId", load_balancer_id),
            )
            .await?;
        extract(&response, &["ListenerPorts", "ListenerPort"])
    }

    async fn create_listener(&self, request: &CreateListener) -> Result<()> {
        let action = match request.protocol {
            ListenerProtocol::Http => "CreateLoadBalancerHTTPListener",
            ListenerProtocol::Https => "CreateLoadBalancerHTTPSListener",
            ListenerProtocol::Tcp => "CreateLoadBalancerTCPListener",
            ListenerProtocol::Udp => "CreateLoadBalancerUDPListener",
        };
        self.call("slb", action, listener_params(request)).await?;
        Ok(())
    }

    async fn start_listener(&self, load_balancer_id: &str, port: i64) -> Result<()> {
        self.call(
            "slb",
            "StartLoadBalancerListener",
            Params::new()
                .set("LoadBalancerId", load_balancer_id)
                .set("ListenerPort", port),
        )
        .await?;
        Ok(())
    }

    async fn listener_status(&self, load_balancer_id: &str, port: i64) -> Result<Option<String>> {
        let response = self
            .call(
                "slb",
                "DescribeLoadBalancerListeners",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("LoadBalancerId.1", load_balancer_id)
                    .set("ListenerPort", port),
            )
            .await?;

        let listeners: Vec<Value> = extract(&response, &["Listeners"])?;
        Ok(listeners
            .iter()
            .find(|l| l.get("ListenerPort").and_then(Value::as_i64) == Some(port))
            .and_then(|l| l.get("Status"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn list_server_certificates(&self, region_id: &str) -> Result<Vec<CertificateRecord>> {
        let response = self
            .call(
                "slb",
                "DescribeServerCertificates",
                Params::new().set("RegionId", region_id),
            )
            .await?;
        let raw: Vec<RawCertificate> =
            extract(&response, &["ServerCertificates", "ServerCertificate"])?;
        Ok(raw
            .into_iter()
            .map(|c| CertificateRecord { id: c.id, name: c.name })
            .collect())
    }

    async fn list_ca_certificates(&self, region_id: &str) -> Result<Vec<CertificateRecord>> {
        let response = self
            .call(
                "slb",
                "DescribeCACertificates",
                Params::new().set("RegionId", region_id),
            )
            .await?;
        let raw: Vec<RawCertificate> = extract(&response, &["CACertificates", "CACertificate"])?;
        Ok(raw
            .into_iter()
            .map(|c| CertificateRecord { id: c.id, name: c.name })
            .collect())
    }

    async fn list_vserver_groups(&self, load_balancer_id: &str) -> Result<Vec<VServerGroupRecord>> {
        let response = self
            .call(
                "slb",
                "DescribeVServerGroups",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("LoadBalancerId", load_balancer_id),
            )
            .await?;
        extract(&response, &["VServerGroups", "VServerGroup"])
    }

    async fn create_vserver_group(
        &self,
        load_balancer_id: &str,
        name: &str,
        backends: &[BackendServer],
    ) -> Result<String> {
        let response = self
            .call(
                "slb",
                "CreateVServerGroup",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("LoadBalancerId", load_balancer_id)
                    .set("VServerGroupName", name)
                    .set("BackendServers", serde_json::to_string(backends)?),
            )
            .await?;
        string_field(&response, "VServerGroupId")
    }

    async fn list_rules(&self, load_balancer_id: &str, port: i64) -> Result<Vec<RuleRecord>> {
        let response = self
            .call(
                "slb",
                "DescribeRules",
                Params::new()
                    .set("RegionId", &self.credentials.region)
                    .set("LoadBalancerId", load_balancer_id)
                    .set("ListenerPort", port),
            )
            .await?;
        extract(&response, &["Rules", "Rule"])
    }

    async fn create_rules(&self, load_balancer_id: &str, port: i64, rules: &[RuleSpec]) -> Result<()> {
        self.call(
            "slb",
            "CreateRules",
            Params::new()
                .set("RegionId", &self.credentials.region)
                .set("LoadBalancerId", load_balancer_id)
                .set("ListenerPort", port)
                .set("RuleList", serde_json::to_string(rules)?),
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Container service
// ---------------------------------------------------------------------------

#[async_trait]
impl CsApi for AliyunCli {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        let response = self.roa("cs", "GET", "/clusters", None).await?;
        Ok(serde_json::from_value(match response {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        })?)
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<Option<ClusterRecord>> {
        match self
            .roa("cs", "GET", &format!("/clusters/{cluster_id}"), None)
            .await
        {
            Ok(response) => Ok(Some(serde_json::from_value(response)?)),
            Err(err) if err.is_code("ErrorClusterNotFound") || is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_cluster(&self, region_id: &str, request: &CreateCluster) -> Result<String> {
        let mut body = serde_json::to_value(request)?;
        if let Value::Object(map) = &mut body {
            map.insert("region_id".to_string(), Value::String(region_id.to_string()));
        }
        let response = self.roa("cs", "POST", "/clusters", Some(body)).await?;
        string_field(&response, "cluster_id")
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<()> {
        self.roa("cs", "DELETE", &format!("/clusters/{cluster_id}"), None)
            .await?;
        Ok(())
    }

    async fn list_volumes(&self, cluster_id: &str) -> Result<Vec<VolumeRecord>> {
        let response = self
            .roa("cs", "GET", &format!("/clusters/{cluster_id}/volumes"), None)
            .await?;
        extract(&response, &["Volumes"])
    }

    async fn create_volume(&self, cluster_id: &str, request: &CreateVolume) -> Result<()> {
        self.roa(
            "cs",
            "POST",
            &format!("/clusters/{cluster_id}/volumes"),
            Some(serde_json::to_value(request)?),
        )
        .await?;
        Ok(())
    }

    async fn list_projects(&self, cluster_id: &str) -> Result<Vec<ProjectRecord>> {
        let response = self
            .roa("cs", "GET", &format!("/clusters/{cluster_id}/projects"), None)
            .await?;
        Ok(serde_json::from_value(match response {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        })?)
    }

    async fn describe_project(&self, cluster_id: &str, name: &str) -> Result<Option<ProjectRecord>> {
        match self
            .roa(
                "cs",
                "GET",
                &format!("/clusters/{cluster_id}/projects/{name}"),
                None,
            )
            .await
        {
            Ok(response) => Ok(Some(serde_json::from_value(response)?)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_project(&self, cluster_id: &str, request: &CreateProject) -> Result<()> {
        self.roa(
            "cs",
            "POST",
            &format!("/clusters/{cluster_id}/projects"),
            Some(serde_json::to_value(request)?),
        )
        .await?;
        Ok(())
    }

    async fn delete_project(&self, cluster_id: &str, name: &str) -> Result<()> {
        self.roa(
            "cs",
            "DELETE",
            &format!("/clusters/{cluster_id}/projects/{name}?force=true&volume=true"),
            None,
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DNS
// ---------------------------------------------------------------------------

fn record_params(spec: &DomainRecordSpec) -> Params {
    Params::new()
        .set("RR", &spec.rr)
        .set("Type", &spec.record_type)
        .set("Value", &spec.value)
        .set("TTL", spec.ttl)
        .opt("Priority", spec.uses_priority().then_some(spec.priority))
        .set("Line", &spec.line)
}

#[async_trait]
impl DnsApi for AliyunCli {
    async fn describe_domain_records(&self, domain_name: &str) -> Result<Vec<DomainRecord>> {
        self.paged(
            "alidns",
            "DescribeDomainRecords",
            Params::new().set("DomainName", domain_name),
            &["DomainRecords", "Record"],
        )
        .await
    }

    async fn add_domain_record(&self, spec: &DomainRecordSpec) -> Result<String> {
        let mut params = Params::new().set("DomainName", &spec.domain_name);
        params.0.extend(record_params(spec).0);

        let response = self.call("alidns", "AddDomainRecord", params).await?;
        string_field(&response, "RecordId")
    }

    async fn update_domain_record(&self, record_id: &str, spec: &DomainRecordSpec) -> Result<()> {
        let mut params = Params::new().set("RecordId", record_id);
        params.0.extend(record_params(spec).0);

        self.call("alidns", "UpdateDomainRecord", params).await?;
        Ok(())
    }

    async fn delete_domain_record(&self, record_id: &str) -> Result<()> {
        self.call(
            "alidns",
            "DeleteDomainRecord",
            Params::new().set("RecordId", record_id),
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OSS
// ---------------------------------------------------------------------------

#[async_trait]
impl OssApi for AliyunCli {
    async fn list_buckets(&self) -> Result<Vec<BucketRecord>> {
        let output = self
            .run_command(&[
                "oss".to_string(),
                "ls".to_string(),
                "-s".to_string(),
                "-e".to_string(),
                self.oss_endpoint(),
            ])
            .await?;

        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("oss://"))
            .map(|name| BucketRecord {
                name: name.trim_end_matches('/').to_string(),
                location: String::new(),
            })
            .collect())
    }

    async fn create_bucket(&self, name: &str, acl: &str) -> Result<()> {
        self.run_command(&[
            "oss".to_string(),
            "mb".to_string(),
            format!("oss://{name}"),
            "--acl".to_string(),
            acl.to_string(),
            "-e".to_string(),
            self.oss_endpoint(),
        ])
        .await?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.run_command(&[
            "oss".to_string(),
            "rm".to_string(),
            format!("oss://{name}"),
            "-b".to_string(),
            "-f".to_string(),
            "-e".to_string(),
            self.oss_endpoint(),
        ])
        .await?;
        Ok(())
    }
}
