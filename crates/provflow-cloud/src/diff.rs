//! Listing and diffing declared entries against remote records

use crate::error::{CloudError, Result};
use std::collections::HashMap;
use std::future::Future;

/// Outcome of comparing declared names with existing records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Declared names missing remotely, in declaration order
    pub to_create: Vec<String>,

    /// Declared names already present remotely
    pub already_exists: Vec<String>,
}

/// Split `declared` into missing and existing entries.
///
/// Every missing entry is passed to `validate` before it is accepted; the
/// first validation failure aborts the diff.
pub fn diff<V, F>(
    kind: &str,
    declared: &[String],
    existing: &HashMap<String, V>,
    mut validate: F,
) -> Result<Diff>
where
    F: FnMut(&str) -> Result<()>,
{
    let mut result = Diff::default();

    for name in declared {
        if existing.contains_key(name) {
            tracing::info!(kind, name = %name, "Already exists");
            result.already_exists.push(name.clone());
            continue;
        }

        validate(name)?;
        result.to_create.push(name.clone());
    }

    Ok(result)
}

/// Index remote records by identity key, keeping only declared keys.
///
/// `key` returns `None` for records outside this deployment's ownership.
/// Two records sharing a key are rejected rather than picking one.
pub fn index_existing<T, K>(
    kind: &str,
    declared: &[String],
    records: impl IntoIterator<Item = T>,
    key: K,
) -> Result<HashMap<String, T>>
where
    K: Fn(&T) -> Option<String>,
{
    let mut indexed = HashMap::new();

    for record in records {
        let Some(id) = key(&record) else {
            continue;
        };
        if !declared.contains(&id) {
            continue;
        }
        if indexed.insert(id.clone(), record).is_some() {
            return Err(CloudError::AmbiguousMatch(format!(
                "more than one {kind} is named {id}"
            )));
        }
    }

    Ok(indexed)
}

/// List remote records for `declared` names. An empty declaration returns
/// immediately without calling the provider; provider errors propagate
/// unchanged.
pub async fn list_existing<T, F, Fut, K>(
    kind: &str,
    declared: &[String],
    fetch: F,
    key: K,
) -> Result<HashMap<String, T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    K: Fn(&T) -> Option<String>,
{
    if declared.is_empty() {
        return Ok(HashMap::new());
    }

    let records = fetch().await?;
    tracing::debug!(kind, count = records.len(), "Listed remote records");
    index_existing(kind, declared, records, key)
}

/// At most one match; more than one is an error
pub fn single<T>(what: &str, matches: impl IntoIterator<Item = T>) -> Result<Option<T>> {
    let mut iter = matches.into_iter();
    let first = iter.next();

    if iter.next().is_some() {
        return Err(CloudError::AmbiguousMatch(format!(
            "find more than one {what}"
        )));
    }

    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_keeps_declaration_order() {
        let declared = names(&["web", "db", "cache"]);
        let existing = HashMap::from([("db".to_string(), ())]);

        let result = diff("vswitch", &declared, &existing, |_| Ok(())).unwrap();

        assert_eq!(result.to_create, names(&["web", "cache"]));
        assert_eq!(result.already_exists, names(&["db"]));
    }

    #[test]
    fn test_diff_validation_fails_fast() {
        let declared = names(&["web", "db"]);
        let existing: HashMap<String, ()> = HashMap::new();
        let mut seen = Vec::new();

        let err = diff("vswitch", &declared, &existing, |name| {
            seen.push(name.to_string());
            Err(CloudError::invalid(name, "vpc-name is empty"))
        })
        .unwrap_err();

        assert!(err.to_string().contains("web"));
        assert_eq!(seen, names(&["web"]));
    }

    #[test]
    fn test_index_existing_rejects_duplicates() {
        let declared = names(&["main"]);
        let records = vec![("main", 1), ("main", 2), ("other", 3)];

        let err = index_existing("vpc", &declared, records, |r| Some(r.0.to_string()))
            .unwrap_err();
        assert!(matches!(err, CloudError::AmbiguousMatch(_)));
    }

    #[test]
    fn test_index_existing_skips_unowned() {
        let declared = names(&["main"]);
        let records = vec![("main", false), ("main", true)];

        let indexed =
            index_existing("vpc", &declared, records, |r| r.1.then(|| r.0.to_string())).unwrap();
        assert_eq!(indexed.len(), 1);
        assert!(indexed["main"].1);
    }

    #[tokio::test]
    async fn test_list_existing_empty_declaration_skips_provider() {
        let result: HashMap<String, u32> = list_existing(
            "vpc",
            &[],
            || async { Err::<Vec<u32>, _>(CloudError::NotFound("provider called".to_string())) },
            |_| None,
        )
        .await
        .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_list_existing_propagates_errors() {
        let result: Result<HashMap<String, u32>> = list_existing(
            "vpc",
            &names(&["main"]),
            || async { Err::<Vec<u32>, _>(CloudError::provider("Forbidden.RAM", "denied")) },
            |_| None,
        )
        .await;

        assert!(result.unwrap_err().is_code("Forbidden.RAM"));
    }

    #[test]
    fn test_single() {
        assert_eq!(single("instance", Vec::<u8>::new()).unwrap(), None);
        assert_eq!(single("instance", vec![1]).unwrap(), Some(1));
        assert!(matches!(
            single("instance", vec![1, 2]),
            Err(CloudError::AmbiguousMatch(_))
        ));
    }
}
