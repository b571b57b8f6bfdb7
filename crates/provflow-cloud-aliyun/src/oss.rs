//! OSS buckets

use crate::api::BucketRecord;
use crate::provider::Aliyun;
use provflow_cloud::{Action, ApplyResult, CloudError, Executor, Plan, Result, diff, list_existing};
use std::collections::HashMap;

pub const SECTION: &str = "aliyun.oss";

const ACLS: [&str; 3] = ["private", "public-read", "public-read-write"];

/// Bucket name and ACL of one declared entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct BucketSpec {
    name: String,
    acl: String,
}

impl Aliyun {
    /// Declared buckets keyed by declared key; `name` defaults to the key
    fn declared_buckets(&self) -> Result<Vec<(String, BucketSpec)>> {
        let section = self.section(SECTION);

        section
            .keys()
            .into_iter()
            .map(|key| {
                let entry = section.get_config(&key);
                let acl = entry.get_string_or("perm", "private");
                if !ACLS.contains(&acl.as_str()) {
                    return Err(CloudError::invalid(
                        format!("oss {key}"),
                        format!("perm must be one of {}", ACLS.join(", ")),
                    ));
                }

                let spec = BucketSpec {
                    name: entry.get_string_or("name", &key),
                    acl,
                };
                Ok((key, spec))
            })
            .collect()
    }

    async fn existing_buckets(&self, names: &[String]) -> Result<HashMap<String, ()>> {
        list_existing(
            "oss-bucket",
            names,
            || self.clients.oss.list_buckets(),
            |bucket: &BucketRecord| Some(bucket.name.clone()),
        )
        .await
        .map(|found| found.into_keys().map(|name| (name, ())).collect())
    }

    pub async fn create_buckets(&self) -> Result<ApplyResult> {
        let declared = self.declared_buckets()?;
        let names: Vec<String> = declared.iter().map(|(_, spec)| spec.name.clone()).collect();
        let existing = self.existing_buckets(&names).await?;
        let diff = diff("oss-bucket", &names, &existing, |_| Ok(()))?;

        let mut plan = Plan::new();
        for name in diff.already_exists {
            plan.keep(name);
        }
        for (key, spec) in declared {
            if diff.to_create.contains(&spec.name) {
                plan.push(Action::create("oss-bucket", key, spec));
            }
        }

        Executor::new()
            .execute(plan, |spec| async move {
                self.call("create oss bucket", || {
                    self.clients.oss.create_bucket(&spec.name, &spec.acl)
                })
                .await?;
                tracing::info!(code = self.code(), bucket = %spec.name, acl = %spec.acl, "Bucket created");
                Ok::<_, CloudError>(spec.name)
            })
            .await
    }

    pub async fn delete_buckets(&self) -> Result<ApplyResult> {
        let plan: Plan<String> = self
            .declared_buckets()?
            .into_iter()
            .map(|(key, spec)| Action::delete("oss-bucket", key, spec.name))
            .collect();

        Executor::new()
            .benign("NoSuchBucket")
            .execute(plan, |name| async move {
                match self
                    .call("delete oss bucket", || self.clients.oss.delete_bucket(&name))
                    .await
                {
                    Ok(()) => Ok(name),
                    Err(err) if err.is_code("NoSuchBucket") => Err(err),
                    Err(CloudError::Provider { code, message }) => Err(CloudError::provider(
                        code,
                        format!("delete bucket '{name}' failure: {message}"),
                    )),
                    Err(err) => Err(err),
                }
            })
            .await
    }
}
