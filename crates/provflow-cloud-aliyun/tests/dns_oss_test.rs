mod common;

use common::{FakeCloud, session};
use provflow_cloud::CloudError;

const RECORDS: &str = r#"
aliyun:
  dns:
    www:
      domain-name: example.com
      rr: www
      type: A
      value: 47.0.0.1
    mail:
      domain-name: example.com
      rr: "@"
      type: MX
      value: mx.example.com
      priority: 5
    blank: {}
"#;

#[tokio::test]
async fn test_add_domain_records_is_idempotent() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", RECORDS);

    let result = aliyun.add_domain_records().await.unwrap();
    assert_eq!(result.succeeded.len(), 2);

    {
        let state = cloud.state();
        let (_, mx) = state.records.iter().find(|(_, r)| r.record_type == "MX").unwrap();
        assert_eq!(mx.priority, 5);
        let (_, a) = state.records.iter().find(|(_, r)| r.record_type == "A").unwrap();
        assert_eq!(a.ttl, 600);
        assert_eq!(a.line, "default");
    }

    let again = aliyun.add_domain_records().await.unwrap();
    assert!(again.succeeded.is_empty());
    assert_eq!(cloud.count_calls("add_domain_record"), 2);
}

#[tokio::test]
async fn test_duplicate_record_is_skipped() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", RECORDS);
    aliyun.add_domain_records().await.unwrap();

    // Same value, different TTL: the provider rejects it as a duplicate
    let yaml = RECORDS.replace("value: 47.0.0.1", "value: 47.0.0.1\n      ttl: 60");
    let (aliyun, _) = session(&cloud, "shop", &yaml);

    let result = aliyun.add_domain_records().await.unwrap();
    assert!(result.succeeded.is_empty());
    assert_eq!(result.skipped.len(), 1);
}

#[tokio::test]
async fn test_update_domain_records() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", RECORDS);

    let err = aliyun.update_domain_records().await.unwrap_err();
    assert!(matches!(err, CloudError::NotFound(_)));

    aliyun.add_domain_records().await.unwrap();
    let unchanged = aliyun.update_domain_records().await.unwrap();
    assert!(unchanged.succeeded.is_empty());

    let yaml = RECORDS.replace("value: 47.0.0.1", "value: 47.0.0.2");
    let (aliyun, _) = session(&cloud, "shop", &yaml);
    let result = aliyun.update_domain_records().await.unwrap();
    assert_eq!(result.succeeded.len(), 1);
    assert_eq!(result.succeeded[0].action_id, "dns-record:www");

    let state = cloud.state();
    let (_, a) = state.records.iter().find(|(_, r)| r.rr == "www").unwrap();
    assert_eq!(a.value, "47.0.0.2");
    assert_eq!(state.records.len(), 2);
}

#[tokio::test]
async fn test_delete_domain_records() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", RECORDS);
    aliyun.add_domain_records().await.unwrap();

    let result = aliyun.delete_domain_records().await.unwrap();
    assert_eq!(result.succeeded.len(), 2);
    assert!(cloud.state().records.is_empty());

    let again = aliyun.delete_domain_records().await.unwrap();
    assert!(again.succeeded.is_empty());
}

#[tokio::test]
async fn test_incomplete_record_is_rejected() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(
        &cloud,
        "shop",
        "aliyun:\n  dns:\n    www:\n      domain-name: example.com\n      rr: www\n      type: A",
    );

    let err = aliyun.add_domain_records().await.unwrap_err();
    assert!(matches!(err, CloudError::InvalidConfig { ref entry, .. } if entry == "dns www"));
    assert!(cloud.calls().is_empty());
}

const BUCKETS: &str = r#"
aliyun:
  oss:
    assets:
      perm: public-read
    backups:
      name: shop-backups
"#;

#[tokio::test]
async fn test_create_buckets_is_idempotent() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", BUCKETS);

    let result = aliyun.create_buckets().await.unwrap();
    assert_eq!(result.messages(), vec!["assets", "shop-backups"]);

    {
        let state = cloud.state();
        let acls: Vec<(&str, &str)> = state
            .buckets
            .iter()
            .map(|(b, acl)| (b.name.as_str(), acl.as_str()))
            .collect();
        assert_eq!(acls, vec![("assets", "public-read"), ("shop-backups", "private")]);
    }

    let again = aliyun.create_buckets().await.unwrap();
    assert!(again.succeeded.is_empty());
    assert_eq!(cloud.count_calls("create_bucket"), 2);
}

#[tokio::test]
async fn test_invalid_bucket_acl() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", "aliyun:\n  oss:\n    assets:\n      perm: world");

    let err = aliyun.create_buckets().await.unwrap_err();
    assert!(err.to_string().contains("perm must be one of"));
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_delete_buckets_tolerates_missing() {
    let cloud = FakeCloud::new();
    let (aliyun, _) = session(&cloud, "shop", BUCKETS);
    aliyun.create_buckets().await.unwrap();
    cloud.state().buckets.retain(|(b, _)| b.name != "assets");

    let result = aliyun.delete_buckets().await.unwrap();
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.messages(), vec!["shop-backups"]);
    assert!(cloud.state().buckets.is_empty());
}
