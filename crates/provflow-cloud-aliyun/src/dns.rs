//! Alibaba Cloud DNS records

use crate::api::{DomainRecord, DomainRecordSpec};
use crate::provider::Aliyun;
use provflow_cloud::{Action, ApplyResult, CloudError, Executor, Plan, Result, single};
use provflow_config::Config;

pub const SECTION: &str = "aliyun.dns";

/// Parse one declared record; `None` for an empty entry
pub fn record_spec(name: &str, entry: &Config) -> Result<Option<DomainRecordSpec>> {
    if entry.is_empty() {
        return Ok(None);
    }

    let required = |key: &str| {
        entry
            .get_string(key)
            .ok_or_else(|| CloudError::invalid(format!("dns {name}"), format!("{key} is empty")))
    };

    Ok(Some(DomainRecordSpec {
        domain_name: required("domain-name")?,
        rr: required("rr")?,
        record_type: required("type")?,
        value: required("value")?,
        ttl: entry.get_i64_or("ttl", 600),
        priority: entry.get_i64_or("priority", 10),
        line: entry.get_string_or("line", "default"),
    }))
}

impl Aliyun {
    fn declared_records(&self) -> Result<Vec<(String, DomainRecordSpec)>> {
        let section = self.section(SECTION);
        let mut records = Vec::new();

        for name in section.keys() {
            match record_spec(&name, &section.get_config(&name))? {
                Some(spec) => records.push((name, spec)),
                None => tracing::warn!(code = self.code(), dns = %name, "DNS config is empty, skipping"),
            }
        }

        Ok(records)
    }

    /// The remote record addressed by `spec`'s (rr, type)
    async fn find_record(&self, spec: &DomainRecordSpec) -> Result<Option<DomainRecord>> {
        let records = self
            .clients
            .dns
            .describe_domain_records(&spec.domain_name)
            .await?;

        single(
            &format!("{} record {}.{}", spec.record_type, spec.rr, spec.domain_name),
            records
                .into_iter()
                .filter(|r| r.rr == spec.rr && r.record_type.eq_ignore_ascii_case(&spec.record_type)),
        )
    }

    pub async fn add_domain_records(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (name, spec) in self.declared_records()? {
            let records = self
                .clients
                .dns
                .describe_domain_records(&spec.domain_name)
                .await?;
            if records.iter().any(|r| spec.is_satisfied_by(r)) {
                tracing::info!(code = self.code(), dns = %name, "Domain record already exists");
                plan.keep(name);
                continue;
            }
            plan.push(Action::create("dns-record", name, spec));
        }

        Executor::new()
            .benign("DomainRecordDuplicate")
            .execute(plan, |spec| async move {
                let id = self
                    .call("add dns record", || self.clients.dns.add_domain_record(&spec))
                    .await?;
                tracing::info!(
                    code = self.code(),
                    record = %format!("{}.{}", spec.rr, spec.domain_name),
                    record_id = %id,
                    "Domain record added"
                );
                Ok::<_, CloudError>(id)
            })
            .await
    }

    pub async fn update_domain_records(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (name, spec) in self.declared_records()? {
            let record = self.find_record(&spec).await?.ok_or_else(|| {
                CloudError::NotFound(format!(
                    "{} record {}.{} for dns {name}",
                    spec.record_type, spec.rr, spec.domain_name
                ))
            })?;

            if spec.is_satisfied_by(&record) {
                tracing::info!(code = self.code(), dns = %name, "Domain record unchanged");
                plan.keep(name);
                continue;
            }
            plan.push(Action::update("dns-record", name, (record.record_id, spec)));
        }

        Executor::new()
            .execute(plan, |(record_id, spec)| async move {
                self.call("update dns record", || {
                    self.clients.dns.update_domain_record(&record_id, &spec)
                })
                .await?;
                Ok::<_, CloudError>(record_id)
            })
            .await
    }

    pub async fn delete_domain_records(&self) -> Result<ApplyResult> {
        let mut plan = Plan::new();

        for (name, spec) in self.declared_records()? {
            match self.find_record(&spec).await? {
                Some(record) => plan.push(Action::delete("dns-record", name, record.record_id)),
                None => tracing::info!(code = self.code(), dns = %name, "Domain record not exist"),
            }
        }

        Executor::new()
            .execute(plan, |record_id| async move {
                self.call("delete dns record", || {
                    self.clients.dns.delete_domain_record(&record_id)
                })
                .await?;
                Ok::<_, CloudError>(record_id)
            })
            .await
    }
}
