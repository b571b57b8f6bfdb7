use crate::api::CertificateRecord;
use crate::provider::Aliyun;
use provflow_cloud::{CloudError, Result, single};

fn by_name(name: &str, certificates: Vec<CertificateRecord>) -> Result<String> {
    single(
        &format!("certificate named {name}"),
        certificates.into_iter().filter(|cert| cert.name == name),
    )?
    .map(|cert| cert.id)
    .ok_or_else(|| CloudError::NotFound(format!("cert not found: {name}")))
}

impl Aliyun {
    /// Id of the server certificate uploaded as `name`
    pub(super) async fn server_certificate_id(&self, name: &str) -> Result<String> {
        by_name(name, self.clients.slb.list_server_certificates(&self.region).await?)
    }

    /// Id of the CA certificate uploaded as `name`
    pub(super) async fn ca_certificate_id(&self, name: &str) -> Result<String> {
        by_name(name, self.clients.slb.list_ca_certificates(&self.region).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(id: &str, name: &str) -> CertificateRecord {
        CertificateRecord {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_by_name() {
        let certs = vec![cert("c-1", "www"), cert("c-2", "api")];
        assert_eq!(by_name("api", certs.clone()).unwrap(), "c-2");

        let err = by_name("admin", certs).unwrap_err();
        assert_eq!(err.to_string(), "Not found: cert not found: admin");
    }

    #[test]
    fn test_duplicate_names_are_ambiguous() {
        let certs = vec![cert("c-1", "www"), cert("c-2", "www")];
        assert!(matches!(by_name("www", certs), Err(CloudError::AmbiguousMatch(_))));
    }
}
