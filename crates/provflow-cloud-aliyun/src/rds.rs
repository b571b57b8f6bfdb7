//! ApsaraDB RDS instances, accounts and connections
//!
//! ```yaml
//! aliyun:
//!   rds:
//!     orders:
//!       vpc-name: main
//!       vswitch-name: db
//!       engine: MySQL
//!       engine-version: "5.7"
//!       accounts:
//!         app:
//!           password: func://pwgen?len=16&set_env=ORDERS_DB_PASSWORD
//!           databases:
//!             orders:
//!               privilege: ReadWrite
//! ```
//!
//! Instances carry `{creator, code, name}` tags; the instance description is
//! the signed declared name.

use crate::api::{
    AccountRecord, AllocatePublicConnection, CreateAccount, CreateDbInstance, DbInstanceNetInfo,
    DbInstanceRecord, GrantPrivilege, VSwitchRecord,
};
use crate::provider::Aliyun;
use provflow_cloud::ownership::CREATOR;
use provflow_cloud::{
    Action, ApplyResult, CloudError, Executor, Plan, Result, WaitConfig, WhenMissing,
    diff, list_existing, wait_all,
};
use provflow_config::Config;
use std::collections::{BTreeMap, HashMap};

pub const SECTION: &str = "aliyun.rds";

pub const OUTPUT_INSTANCES: &str = "ALIYUN_RDS_INSTANCES";
pub const OUTPUT_NET_INFO: &str = "ALIYUN_RDS_INSTANCES_NET_INFO";

/// Net-info entry type of the internet-facing endpoint
pub const PUBLIC_IP_TYPE: &str = "Public";

const DEFAULT_ENGINE: &str = "MySQL";
const DEFAULT_PRIVILEGE: &str = "ReadWrite";
const DEFAULT_PUBLIC_PORT: &str = "3306";

fn running_wait() -> WaitConfig {
    WaitConfig::secs(20 * 60, 10).when_missing(WhenMissing::Retry)
}

/// One declared instance with its resolved VSwitch
struct DeclaredDb {
    name: String,
    entry: Config,
    vswitch: Option<VSwitchRecord>,
}

impl DeclaredDb {
    fn engine(&self) -> String {
        self.entry.get_string_or("engine", DEFAULT_ENGINE)
    }

    fn is_postgres(&self) -> bool {
        self.engine().eq_ignore_ascii_case("PostgreSQL")
    }

    /// Whether `record` sits in this entry's VSwitch and runs its engine
    fn is_placed(&self, record: &DbInstanceRecord) -> bool {
        self.vswitch.as_ref().is_some_and(|sw| {
            record.vpc_id == sw.vpc_id
                && record.vswitch_id == sw.vswitch_id
                && record.engine.eq_ignore_ascii_case(&self.engine())
        })
    }
}

/// One step of account reconciliation
#[derive(Debug, Clone)]
enum AccountStep {
    Create(CreateAccount),
    Grant(GrantPrivilege),
}

impl Aliyun {
    fn owner_filter(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("creator".to_string(), CREATOR.to_string()),
            ("code".to_string(), self.code().to_string()),
        ])
    }

    /// Every instance tagged for this deployment
    pub async fn owned_db_instances(&self) -> Result<Vec<DbInstanceRecord>> {
        let instances = self
            .clients
            .rds
            .list_instances(&self.region, &self.owner_filter())
            .await?;

        Ok(instances
            .into_iter()
            .filter(|db| self.ownership.owns_tags(&db.tags))
            .collect())
    }

    /// Declared instances with their VSwitches.
    ///
    /// With `strict`, an unresolvable VSwitch is `NotFound`; otherwise the
    /// entry is kept without one.
    async fn declared_dbs(&self, strict: bool) -> Result<Vec<DeclaredDb>> {
        let section = self.section(SECTION);
        let mut declared = Vec::new();

        for name in section.keys() {
            let entry = section.get_config(&name);
            let (Some(vpc_name), Some(vswitch_name)) =
                (entry.get_string("vpc-name"), entry.get_string("vswitch-name"))
            else {
                return Err(CloudError::invalid(
                    format!("rds {name}"),
                    "vpc-name and vswitch-name are required",
                ));
            };

            let vswitch = match self.find_vswitch(&vpc_name, &vswitch_name).await {
                Ok(Some(vswitch)) => Some(vswitch),
                Ok(None) | Err(CloudError::NotFound(_)) if !strict => {
                    tracing::info!(code = self.code(), rds = %name, "VSwitch not found, skipping");
                    None
                }
                Ok(None) => {
                    return Err(CloudError::NotFound(format!(
                        "vswitch {vswitch_name} in vpc {vpc_name} for rds {name}"
                    )));
                }
                Err(err) => return Err(err),
            };

            declared.push(DeclaredDb {
                name,
                entry,
                vswitch,
            });
        }

        Ok(declared)
    }

    async fn existing_dbs(&self, declared: &[DeclaredDb]) -> Result<HashMap<String, DbInstanceRecord>> {
        let names: Vec<String> = declared.iter().map(|db| db.name.clone()).collect();

        list_existing(
            "rds",
            &names,
            || self.owned_db_instances(),
            |record: &DbInstanceRecord| {
                declared
                    .iter()
                    .find(|db| db.name == record.name())
                    .filter(|db| db.is_placed(record))
                    .map(|db| db.name.clone())
            },
        )
        .await
    }

    fn create_db_request(&self, db: &DeclaredDb, vswitch: &VSwitchRecord) -> CreateDbInstance {
        let entry = &db.entry;

        CreateDbInstance {
            region_id: self.region.clone(),
            zone_id: entry.get_string_or("zone-id", &vswitch.zone_id),
            engine: db.engine(),
            engine_version: entry.get_string_or("engine-version", "5.6"),
            pay_type: entry.get_string_or("pay-type", "Postpaid"),
            instance_class: entry.get_string_or("instance-class", "rds.mys2.small"),
            storage: entry.get_i64_or("instance-storage", 5),
            net_type: entry.get_string_or("instance-net-type", "Internet"),
            network_type: entry.get_string_or("instance-network-type", "VPC"),
            vpc_id: vswitch.vpc_id.clone(),
            vswitch_id: vswitch.vswitch_id.clone(),
            description: self.ownership.sign(&db.name),
            used_time: entry.get_string("used-time"),
            period: entry.get_string("period"),
            connection_mode: entry.get_string_or("connection-mode", "Performance"),
            security_ip_list: entry.get_string_or("security-ip-list", "172.18.0.0/24"),
            private_ip_address: entry.get_string("private-ip-address"),
        }
    }

    pub async fn create_db_instances(&self) -> Result<ApplyResult> {
        let declared = self.declared_dbs(true).await?;
        let names: Vec<String> = declared.iter().map(|db| db.name.clone()).collect();
        let existing = self.existing_dbs(&declared).await?;

        let diff = diff("rds", &names, &existing, |_| Ok(()))?;

        let mut plan = Plan::new();
        for name in diff.already_exists {
            plan.keep(name);
        }
        for db in declared.iter().filter(|db| diff.to_create.contains(&db.name)) {
            let vswitch = db
                .vswitch
                .as_ref()
                .ok_or_else(|| CloudError::NotFound(format!("vswitch for rds {}", db.name)))?;
            plan.push(Action::create(
                "rds",
                &db.name,
                (db.name.clone(), self.create_db_request(db, vswitch)),
            ));
        }

        tracing::info!(code = self.code(), "RDS plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |(name, request)| async move {
                let id = self
                    .call("create rds instance", || self.clients.rds.create_instance(&request))
                    .await?;
                let tags = self.ownership.tags(&name).to_map();
                self.call("tag rds instance", || {
                    self.clients.rds.add_tags(&self.region, &id, &tags)
                })
                .await?;
                tracing::info!(code = self.code(), rds = %name, db_instance_id = %id, "RDS instance created");
                Ok::<_, CloudError>(id)
            })
            .await
    }

    pub async fn delete_db_instances(&self) -> Result<ApplyResult> {
        let declared = self.declared_dbs(false).await?;
        let existing = self.existing_dbs(&declared).await?;

        let plan: Plan<String> = declared
            .iter()
            .filter_map(|db| {
                existing
                    .get(&db.name)
                    .map(|record| Action::delete("rds", &db.name, record.db_instance_id.clone()))
            })
            .collect();

        Executor::new()
            .benign("InvalidDBInstanceId.NotFound")
            .execute(plan, |id| async move {
                self.call("delete rds instance", || self.clients.rds.delete_instance(&id))
                    .await?;
                tracing::info!(code = self.code(), db_instance_id = %id, "RDS instance deleted");
                Ok::<_, CloudError>(id)
            })
            .await
    }

    /// Wait for every owned instance to reach `Running`
    pub async fn wait_db_instances_running(&self) -> Result<()> {
        let instances = self.owned_db_instances().await?;
        let waiter = self.waiter(running_wait());
        let waiter = &waiter;

        wait_all(
            instances.into_iter().map(|db| db.db_instance_id),
            |db_instance_id| async move {
                let id = db_instance_id.as_str();
                waiter
                    .wait_for_status(id, "Running", || async move {
                        let db = self.clients.rds.describe_instance(id).await?;
                        Ok::<_, CloudError>(db.map(|db| db.status))
                    })
                    .await
            },
        )
        .await
        .into_result()
    }

    fn rds_output_tags(&self, instances: &[DbInstanceRecord]) -> Vec<String> {
        instances
            .iter()
            .map(|db| db.name().to_string())
            .chain(["aliyun".to_string(), "rds".to_string(), self.code().to_string()])
            .collect()
    }

    /// Publish instance attributes and export `RDS_DB_<NAME>_HOST/PORT`
    pub async fn describe_db_attributes(&self) -> Result<()> {
        let instances = self.owned_db_instances().await?;
        if instances.is_empty() {
            tracing::info!(code = self.code(), "No RDS instance to describe");
            return Ok(());
        }

        let names: HashMap<&str, &str> = instances
            .iter()
            .map(|db| (db.db_instance_id.as_str(), db.name()))
            .collect();
        let ids: Vec<String> = instances.iter().map(|db| db.db_instance_id.clone()).collect();

        let attributes = self.clients.rds.describe_attributes(&ids).await?;
        for attr in &attributes {
            let Some(name) = names.get(attr.db_instance_id.as_str()) else {
                continue;
            };
            self.export(&format!("rds_db_{name}_host"), &attr.connection_string);
            self.export(&format!("rds_db_{name}_port"), &attr.port);
        }

        self.ctx
            .outputs()
            .append(OUTPUT_INSTANCES, &attributes, self.rds_output_tags(&instances))
    }

    /// Publish net info and export `RDS_DB_<NAME>_<IPTYPE>_HOST/PORT`
    pub async fn describe_db_net_info(&self) -> Result<()> {
        let instances = self.owned_db_instances().await?;
        if instances.is_empty() {
            tracing::info!(code = self.code(), "No RDS instance to describe");
            return Ok(());
        }

        let mut all = Vec::with_capacity(instances.len());
        for db in &instances {
            let net_info = self.clients.rds.describe_net_info(&db.db_instance_id).await?;
            for info in &net_info {
                let prefix = format!("rds_db_{}_{}", db.name(), info.ip_type);
                self.export(&format!("{prefix}_host"), &info.connection_string);
                self.export(&format!("{prefix}_port"), &info.port);
            }

            all.push(DbInstanceNetInfo {
                instance_id: db.db_instance_id.clone(),
                instance_name: db.name().to_string(),
                net_info,
            });
        }

        self.ctx
            .outputs()
            .append(OUTPUT_NET_INFO, &all, self.rds_output_tags(&instances))
    }

    /// Declared instances paired with their existing records; a declared
    /// instance that does not exist is `NotFound`
    async fn require_dbs(&self) -> Result<Vec<(DeclaredDb, DbInstanceRecord)>> {
        let declared = self.declared_dbs(true).await?;
        let mut existing = self.existing_dbs(&declared).await?;

        declared
            .into_iter()
            .map(|db| match existing.remove(&db.name) {
                Some(record) => Ok((db, record)),
                None => Err(CloudError::NotFound(format!("rds instance {}", db.name))),
            })
            .collect()
    }

    fn account_steps(
        &self,
        db: &DeclaredDb,
        record: &DbInstanceRecord,
        existing: &[AccountRecord],
    ) -> Result<Plan<AccountStep>> {
        let accounts = db.entry.get_config("accounts");
        let names = accounts.keys();

        if db.is_postgres() {
            if names.len() > 1 {
                return Err(CloudError::invalid(
                    format!("rds {}", db.name),
                    "PostgreSQL supports exactly one account",
                ));
            }
            if names
                .iter()
                .any(|acct| !accounts.get_config(&format!("{acct}.databases")).is_empty())
            {
                return Err(CloudError::invalid(
                    format!("rds {}", db.name),
                    "PostgreSQL accounts take no database grants",
                ));
            }
        }

        let mut plan = Plan::new();
        for acct in names {
            if existing.iter().any(|a| a.account_name == acct) {
                tracing::info!(code = self.code(), rds = %db.name, account = %acct, "Account already exists");
                plan.keep(acct);
                continue;
            }

            let entry = accounts.get_config(&acct);
            let expr = entry.get_string("password").ok_or_else(|| {
                CloudError::invalid(format!("rds {}.accounts.{acct}", db.name), "password is empty")
            })?;
            let password = self.resolve_value(
                &format!("rds.{}.accounts.{acct}.password", db.name),
                &expr,
            )?;

            plan.push(Action::create(
                "rds-account",
                &acct,
                AccountStep::Create(CreateAccount {
                    db_instance_id: record.db_instance_id.clone(),
                    account_name: acct.clone(),
                    password,
                    description: self
                        .ownership
                        .sign(&entry.get_string("description").unwrap_or_default()),
                    account_type: entry.get_string_or("type", "Normal"),
                }),
            ));

            let databases = entry.get_config("databases");
            for db_name in databases.keys() {
                plan.push(Action::create(
                    "rds-grant",
                    format!("{acct}/{db_name}"),
                    AccountStep::Grant(GrantPrivilege {
                        db_instance_id: record.db_instance_id.clone(),
                        account_name: acct.clone(),
                        privilege: databases
                            .get_string_or(&format!("{db_name}.privilege"), DEFAULT_PRIVILEGE),
                        db_name,
                    }),
                ));
            }
        }

        Ok(plan)
    }

    pub async fn create_db_accounts(&self) -> Result<ApplyResult> {
        let mut total = ApplyResult::new();

        for (db, record) in self.require_dbs().await? {
            let existing = self.clients.rds.list_accounts(&record.db_instance_id).await?;
            let plan = self.account_steps(&db, &record, &existing)?;
            tracing::info!(code = self.code(), rds = %db.name, "Account plan: {}", plan.summary());

            let result = Executor::new()
                .execute(plan, |step| async move {
                    match step {
                        AccountStep::Create(request) => {
                            self.call("create rds account", || {
                                self.clients.rds.create_account(&request)
                            })
                            .await?;
                            Ok::<_, CloudError>(request.account_name)
                        }
                        AccountStep::Grant(request) => {
                            self.call("grant rds privilege", || {
                                self.clients.rds.grant_privilege(&request)
                            })
                            .await?;
                            Ok(format!("{} on {}", request.privilege, request.db_name))
                        }
                    }
                })
                .await?;

            total.succeeded.extend(result.succeeded);
            total.skipped.extend(result.skipped);
            total.duration_ms += result.duration_ms;
        }

        Ok(total)
    }

    pub async fn allocate_public_connections(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (db, record) in self.require_dbs().await? {
            let net_info = self.clients.rds.describe_net_info(&record.db_instance_id).await?;
            if net_info.iter().any(|info| info.ip_type == PUBLIC_IP_TYPE) {
                tracing::info!(code = self.code(), rds = %db.name, "Public connection already allocated");
                plan.keep(&db.name);
                continue;
            }

            plan.push(Action::create(
                "rds-public-connection",
                &db.name,
                AllocatePublicConnection {
                    db_instance_id: record.db_instance_id.clone(),
                    connection_prefix: db
                        .entry
                        .get_string_or("public-connection.prefix", &format!("{}-public", db.name)),
                    port: db
                        .entry
                        .get_string_or("public-connection.port", DEFAULT_PUBLIC_PORT),
                },
            ));
        }

        Executor::new()
            .execute(plan, |request| async move {
                self.call("allocate rds public connection", || {
                    self.clients.rds.allocate_public_connection(&request)
                })
                .await?;
                Ok::<_, CloudError>(request.connection_prefix)
            })
            .await
    }

    pub async fn release_public_connections(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (db, record) in self.require_dbs().await? {
            let net_info = self.clients.rds.describe_net_info(&record.db_instance_id).await?;
            match net_info.into_iter().find(|info| info.ip_type == PUBLIC_IP_TYPE) {
                Some(info) => plan.push(Action::delete(
                    "rds-public-connection",
                    &db.name,
                    (record.db_instance_id.clone(), info.connection_string),
                )),
                None => tracing::info!(code = self.code(), rds = %db.name, "No public connection"),
            }
        }

        Executor::new()
            .execute(plan, |(id, connection)| async move {
                self.call("release rds public connection", || {
                    self.clients.rds.release_public_connection(&id, &connection)
                })
                .await?;
                Ok::<_, CloudError>(connection)
            })
            .await
    }
}
