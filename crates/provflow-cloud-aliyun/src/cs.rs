//! Container service swarm clusters, volumes and projects
//!
//! ```yaml
//! aliyun:
//!   cs:
//!     swarm:
//!       apps:
//!         vpc-name: main
//!         vswitch-name: apps
//!         password: func://pwgen?len=16
//!         volumes:
//!           assets:
//!             driver: ossfs
//!             options:
//!               bucket: shop-assets
//!               url: oss-cn-beijing-internal.aliyuncs.com
//!               ak-id: LTAI5tExampleKeyId
//!               ak-secret: ExampleKeySecret
//!         projects:
//!           web:
//!             template: compose/web.yml
//!             wait:
//!               projects: [db]
//! ```

use crate::api::{
    ClusterRecord, CreateCluster, CreateProject, CreateVolume, VSwitchRecord, VolumeDriver,
};
use crate::provider::Aliyun;
use provflow_cloud::{
    Action, ApplyResult, CloudError, Executor, Plan, Result, WaitConfig, WhenMissing, diff,
    wait_all,
};
use provflow_config::Config;
use std::collections::{BTreeMap, HashMap};

pub const SECTION: &str = "aliyun.cs.swarm";

const STATE_RUNNING: &str = "running";
const STATE_DELETING: &str = "deleting";
const STATE_DELETED: &str = "deleted";

fn cluster_running() -> WaitConfig {
    WaitConfig::secs(600, 10).when_missing(WhenMissing::Done)
}

fn cluster_deleted() -> WaitConfig {
    WaitConfig::secs(300, 10).when_missing(WhenMissing::Done)
}

fn sibling_running() -> WaitConfig {
    WaitConfig::secs(600, 5).when_missing(WhenMissing::Retry)
}

/// Parse `volumes.<name>.{driver, options.*}`
pub fn volume_driver(entry_name: &str, entry: &Config) -> Result<VolumeDriver> {
    let options = entry.get_config("options");
    let required = |key: &str| {
        options
            .get_string(key)
            .ok_or_else(|| CloudError::invalid(entry_name, format!("options.{key} is empty")))
    };

    match entry.get_string("driver").as_deref() {
        Some("ossfs") => Ok(VolumeDriver::Ossfs {
            bucket: required("bucket")?,
            url: required("url")?,
            ak_id: required("ak-id")?,
            ak_secret: required("ak-secret")?,
            no_stat_cache: options.get_string_or("no_stat_cache", "false"),
            other_opts: options.get_string("other_opts"),
        }),
        Some("nas") => Ok(VolumeDriver::Nas {
            disk_id: options.get_string("disk-id"),
            host: options.get_string("host"),
            path: options.get_string("path"),
            mode: options.get_string("mode"),
        }),
        Some(other) => Err(CloudError::invalid(entry_name, format!("unknown driver {other}"))),
        None => Err(CloudError::invalid(entry_name, "driver is empty")),
    }
}

/// One project to create, with the siblings it waits for
#[derive(Debug, Clone)]
struct ProjectStep {
    cluster_id: String,
    wait_for: Vec<String>,
    request: CreateProject,
}

/// One declared cluster with its resolved VSwitch
struct DeclaredCluster {
    name: String,
    entry: Config,
    vswitch: Option<VSwitchRecord>,
}

impl DeclaredCluster {
    fn is_placed(&self, cluster: &ClusterRecord) -> bool {
        self.vswitch.as_ref().is_some_and(|sw| {
            cluster.name == self.name
                && cluster.vpc_id == sw.vpc_id
                && cluster.vswitch_id == sw.vswitch_id
        })
    }
}

fn is_gone(cluster: &ClusterRecord) -> bool {
    cluster.state == STATE_DELETING || cluster.state == STATE_DELETED
}

impl Aliyun {
    async fn declared_clusters(&self, strict: bool) -> Result<Vec<DeclaredCluster>> {
        let section = self.section(SECTION);
        let mut declared = Vec::new();

        for name in section.keys() {
            let entry = section.get_config(&name);
            let (Some(vpc_name), Some(vswitch_name)) =
                (entry.get_string("vpc-name"), entry.get_string("vswitch-name"))
            else {
                return Err(CloudError::invalid(
                    format!("cs cluster {name}"),
                    "vpc-name or vswitch-name is empty",
                ));
            };

            let vswitch = match self.find_vswitch(&vpc_name, &vswitch_name).await {
                Ok(Some(vswitch)) => Some(vswitch),
                Ok(None) | Err(CloudError::NotFound(_)) if !strict => None,
                Ok(None) => {
                    return Err(CloudError::NotFound(format!(
                        "vswitch {vswitch_name} in vpc {vpc_name} for cluster {name}"
                    )));
                }
                Err(err) => return Err(err),
            };

            declared.push(DeclaredCluster {
                name,
                entry,
                vswitch,
            });
        }

        Ok(declared)
    }

    /// Live clusters of `declared`, keyed by cluster name
    async fn existing_clusters(
        &self,
        declared: &[DeclaredCluster],
    ) -> Result<HashMap<String, ClusterRecord>> {
        if declared.is_empty() {
            return Ok(HashMap::new());
        }

        let clusters = self.clients.cs.list_clusters().await?;
        let mut existing = HashMap::new();
        for cluster in clusters {
            if is_gone(&cluster) || !declared.iter().any(|c| c.is_placed(&cluster)) {
                continue;
            }
            if existing.insert(cluster.name.clone(), cluster).is_some() {
                return Err(CloudError::AmbiguousMatch(
                    "more than one live cluster shares a name in the same vswitch".to_string(),
                ));
            }
        }

        Ok(existing)
    }

    /// Existing cluster for every declared entry that has `child` configured
    async fn clusters_with(&self, child: &str) -> Result<Vec<(DeclaredCluster, ClusterRecord)>> {
        let declared: Vec<DeclaredCluster> = self
            .declared_clusters(true)
            .await?
            .into_iter()
            .filter(|c| !c.entry.get_config(child).is_empty())
            .collect();
        let mut existing = self.existing_clusters(&declared).await?;

        declared
            .into_iter()
            .map(|c| match existing.remove(&c.name) {
                Some(cluster) => Ok((c, cluster)),
                None => Err(CloudError::NotFound(format!("cluster {} not exist", c.name))),
            })
            .collect()
    }

    fn create_cluster_request(
        &self,
        cluster: &DeclaredCluster,
        vswitch: &VSwitchRecord,
    ) -> Result<CreateCluster> {
        let entry = &cluster.entry;
        let expr = entry.get_string("password").ok_or_else(|| {
            CloudError::invalid(format!("cs cluster {}", cluster.name), "password is empty")
        })?;

        Ok(CreateCluster {
            name: cluster.name.clone(),
            size: entry.get_i64_or("size", 1),
            network_mode: entry.get_string_or("network-mode", "vpc"),
            subnet_cidr: entry.get_string("subnet-cidr"),
            instance_type: entry.get_string_or("instance-type", "ecs.n4.large"),
            vpc_id: vswitch.vpc_id.clone(),
            vswitch_id: vswitch.vswitch_id.clone(),
            password: self.resolve_value(&format!("cs.swarm.{}.password", cluster.name), &expr)?,
            data_disk_size: entry.get_i64_or("data-disk-size", 100),
            data_disk_category: entry.get_string("data-disk-category"),
            ecs_image_id: entry.get_string("ecs-image-id"),
            io_optimized: entry.get_string("io-optimized"),
        })
    }

    pub async fn create_clusters(&self) -> Result<ApplyResult> {
        let declared = self.declared_clusters(true).await?;
        let names: Vec<String> = declared.iter().map(|c| c.name.clone()).collect();
        let existing = self.existing_clusters(&declared).await?;
        let diff = diff("cs-cluster", &names, &existing, |_| Ok(()))?;

        let mut plan = Plan::new();
        for name in diff.already_exists {
            plan.keep(name);
        }
        for cluster in declared.iter().filter(|c| diff.to_create.contains(&c.name)) {
            let vswitch = cluster.vswitch.as_ref().ok_or_else(|| {
                CloudError::NotFound(format!("vswitch for cluster {}", cluster.name))
            })?;
            plan.push(Action::create(
                "cs-cluster",
                &cluster.name,
                self.create_cluster_request(cluster, vswitch)?,
            ));
        }

        tracing::info!(code = self.code(), "Cluster plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |request| async move {
                let id = self
                    .call("create cs cluster", || {
                        self.clients.cs.create_cluster(&self.region, &request)
                    })
                    .await?;
                tracing::info!(code = self.code(), cluster = %request.name, cluster_id = %id, "Cluster created");
                Ok::<_, CloudError>(id)
            })
            .await
    }

    pub async fn delete_clusters(&self) -> Result<ApplyResult> {
        let declared = self.declared_clusters(false).await?;
        let existing = self.existing_clusters(&declared).await?;

        let plan: Plan<String> = declared
            .iter()
            .filter_map(|c| {
                existing
                    .get(&c.name)
                    .map(|cluster| Action::delete("cs-cluster", &c.name, cluster.cluster_id.clone()))
            })
            .collect();

        Executor::new()
            .benign("ErrorClusterNotFound")
            .execute(plan, |id| async move {
                self.call("delete cs cluster", || self.clients.cs.delete_cluster(&id))
                    .await?;
                tracing::info!(code = self.code(), cluster_id = %id, "Cluster deletion requested");
                Ok::<_, CloudError>(id)
            })
            .await
    }

    /// Wait for every declared cluster to reach `running`
    pub async fn wait_clusters_running(&self) -> Result<()> {
        let declared = self.declared_clusters(true).await?;
        let existing = self.existing_clusters(&declared).await?;
        let waiter = self.waiter(cluster_running());
        let waiter = &waiter;

        wait_all(
            existing.into_values().map(|c| c.cluster_id),
            |cluster_id| async move {
                let id = cluster_id.as_str();
                waiter
                    .wait_for_status(id, STATE_RUNNING, || async move {
                        let cluster = self.clients.cs.describe_cluster(id).await?;
                        Ok::<_, CloudError>(cluster.map(|c| c.state))
                    })
                    .await
            },
        )
        .await
        .into_result()
    }

    /// Wait for every declared cluster to disappear
    pub async fn wait_clusters_deleted(&self) -> Result<()> {
        let declared = self.declared_clusters(false).await?;
        let clusters = self.clients.cs.list_clusters().await?;
        let ids: Vec<String> = clusters
            .into_iter()
            .filter(|cluster| declared.iter().any(|c| c.is_placed(cluster)))
            .map(|cluster| cluster.cluster_id)
            .collect();

        let waiter = self.waiter(cluster_deleted());
        let waiter = &waiter;

        wait_all(ids, |cluster_id| async move {
            let id = cluster_id.as_str();
            waiter
                .wait_for(
                    id,
                    || async move { self.clients.cs.describe_cluster(id).await },
                    |cluster: &ClusterRecord| cluster.state == STATE_DELETED,
                )
                .await
                .map(|_| ())
        })
        .await
        .into_result()
    }

    pub async fn create_volumes(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (declared, cluster) in self.clusters_with("volumes").await? {
            let volumes = declared.entry.get_config("volumes");
            let names = volumes.keys();
            let existing: HashMap<String, ()> = self
                .clients
                .cs
                .list_volumes(&cluster.cluster_id)
                .await?
                .into_iter()
                .filter(|volume| names.contains(&volume.name))
                .map(|volume| (volume.name, ()))
                .collect();

            let diff = diff("cs-volume", &names, &existing, |name| {
                volume_driver(
                    &format!("{}.volumes.{name}", declared.name),
                    &volumes.get_config(name),
                )
                .map(|_| ())
            })?;

            for name in diff.already_exists {
                plan.keep(format!("{}/{name}", declared.name));
            }
            for name in diff.to_create {
                let driver = volume_driver(
                    &format!("{}.volumes.{name}", declared.name),
                    &volumes.get_config(&name),
                )?;
                plan.push(Action::create(
                    "cs-volume",
                    format!("{}/{name}", declared.name),
                    (cluster.cluster_id.clone(), CreateVolume { name, driver }),
                ));
            }
        }

        tracing::info!(code = self.code(), "Volume plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |(cluster_id, request)| async move {
                self.call("create cs volume", || {
                    self.clients.cs.create_volume(&cluster_id, &request)
                })
                .await?;
                Ok::<_, CloudError>(request.name)
            })
            .await
    }

    async fn create_project_request(
        &self,
        cluster: &str,
        name: &str,
        entry: &Config,
    ) -> Result<CreateProject> {
        let path = format!("{cluster}.projects.{name}");
        let template_path = entry
            .get_string("template")
            .ok_or_else(|| CloudError::invalid(&path, "template file not set"))?;
        let template = tokio::fs::read_to_string(&template_path).await.map_err(|err| {
            CloudError::invalid(&path, format!("read template {template_path}: {err}"))
        })?;

        let env = entry.get_config("environment");
        let mut environment = BTreeMap::new();
        for key in env.keys() {
            let expr = env.get_string(&key).unwrap_or_default();
            let value =
                self.resolve_value(&format!("cs.swarm.{path}.environment.{key}"), &expr)?;
            environment.insert(key, value);
        }

        Ok(CreateProject {
            name: name.to_string(),
            description: self
                .ownership
                .sign(&entry.get_string("description").unwrap_or_default()),
            template,
            version: entry.get_string_or("version", "1.0.0"),
            latest_image: entry.get_bool_or("latest-image", true),
            environment,
        })
    }

    /// Wait for `projects` on `cluster_id` to reach `running`
    async fn wait_projects_running(&self, cluster_id: &str, projects: Vec<String>) -> Result<()> {
        let waiter = self.waiter(sibling_running());
        let waiter = &waiter;

        wait_all(projects, |project| async move {
            let name = project.as_str();
            waiter
                .wait_for_status(name, STATE_RUNNING, || async move {
                    let project = self.clients.cs.describe_project(cluster_id, name).await?;
                    Ok::<_, CloudError>(project.map(|p| p.current_state))
                })
                .await
        })
        .await
        .into_result()
    }

    pub async fn create_projects(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (declared, cluster) in self.clusters_with("projects").await? {
            let projects = declared.entry.get_config("projects");
            let names = projects.keys();
            let existing: HashMap<String, ()> = self
                .clients
                .cs
                .list_projects(&cluster.cluster_id)
                .await?
                .into_iter()
                .filter(|project| names.contains(&project.name))
                .map(|project| (project.name, ()))
                .collect();

            let diff = diff("cs-project", &names, &existing, |_| Ok(()))?;
            for name in diff.already_exists {
                plan.keep(format!("{}/{name}", declared.name));
            }
            for name in diff.to_create {
                let entry = projects.get_config(&name);
                if entry.is_empty() {
                    tracing::warn!(code = self.code(), cluster = %declared.name, project = %name, "Project config is empty, skipping");
                    continue;
                }

                let wait_for = entry
                    .get_string_list("wait.projects")
                    .into_iter()
                    .filter(|sibling| *sibling != name)
                    .collect();
                let request = self
                    .create_project_request(&declared.name, &name, &entry)
                    .await?;

                plan.push(Action::create(
                    "cs-project",
                    format!("{}/{name}", declared.name),
                    ProjectStep {
                        cluster_id: cluster.cluster_id.clone(),
                        wait_for,
                        request,
                    },
                ));
            }
        }

        tracing::info!(code = self.code(), "Project plan: {}", plan.summary());

        Executor::new()
            .execute(plan, |step| async move {
                if !step.wait_for.is_empty() {
                    self.wait_projects_running(&step.cluster_id, step.wait_for.clone())
                        .await?;
                }
                self.call("create cs project", || {
                    self.clients.cs.create_project(&step.cluster_id, &step.request)
                })
                .await?;
                tracing::info!(code = self.code(), project = %step.request.name, "Project created");
                Ok::<_, CloudError>(step.request.name)
            })
            .await
    }

    /// Delete every declared project concurrently
    pub async fn delete_projects(&self) -> Result<()> {
        let declared: Vec<DeclaredCluster> = self
            .declared_clusters(false)
            .await?
            .into_iter()
            .filter(|c| !c.entry.get_config("projects").is_empty())
            .collect();
        let existing = self.existing_clusters(&declared).await?;

        let mut targets = Vec::new();
        for c in &declared {
            let Some(cluster) = existing.get(&c.name) else {
                tracing::info!(code = self.code(), cluster = %c.name, "Cluster not exist");
                continue;
            };

            let names = c.entry.get_config("projects").keys();
            for project in self.clients.cs.list_projects(&cluster.cluster_id).await? {
                if names.contains(&project.name) {
                    targets.push(format!("{}/{}", cluster.cluster_id, project.name));
                }
            }
        }

        wait_all(targets, |target| async move {
            let (cluster_id, name) = target.split_once('/').unwrap_or((target.as_str(), ""));
            self.call("delete cs project", || {
                self.clients.cs.delete_project(cluster_id, name)
            })
            .await?;
            tracing::info!(code = self.code(), project = %name, "Project deleted");
            Ok::<(), CloudError>(())
        })
        .await
        .into_result()
    }
}
