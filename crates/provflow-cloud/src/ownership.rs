//! Ownership markers and tags
//!
//! Resources created by provflow carry the deployment code either as a
//! bracketed marker at the end of their description (`web tier [shop]`) or,
//! where the provider supports first-class tags, as a `{creator, code, name}`
//! tag set.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of the `creator` tag on tagged resources
pub const CREATOR: &str = "provflow";

/// Ownership scope of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ownership {
    code: String,
    marker: String,
}

impl Ownership {
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        let code = code.trim();

        if code.is_empty() {
            return Err(CloudError::invalid("code", "the deployment code is empty"));
        }
        if code.contains(['[', ']']) {
            return Err(CloudError::invalid(
                "code",
                format!("'{code}' must not contain brackets"),
            ));
        }

        Ok(Self {
            marker: format!("[{code}]"),
            code: code.to_string(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The bracketed marker, e.g. `[shop]`
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Append the marker to free text
    pub fn sign(&self, description: &str) -> String {
        let description = description.trim();
        if description.is_empty() {
            self.marker.clone()
        } else {
            format!("{} {}", description, self.marker)
        }
    }

    /// Whether `description` was signed for this code.
    ///
    /// The marker must terminate the text and stand on its own, so a
    /// description signed for `app2` is never owned by `app`.
    pub fn is_owned(&self, description: &str) -> bool {
        let Some(head) = description.trim_end().strip_suffix(self.marker.as_str()) else {
            return false;
        };

        head.is_empty() || head.ends_with(char::is_whitespace)
    }

    pub fn tags(&self, name: &str) -> OwnerTags {
        OwnerTags {
            creator: CREATOR.to_string(),
            code: self.code.clone(),
            name: name.to_string(),
        }
    }

    /// Whether a provider tag map carries this code's creator/code pair
    pub fn owns_tags(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get("creator").map(String::as_str) == Some(CREATOR)
            && tags.get("code") == Some(&self.code)
    }
}

/// Structured ownership tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerTags {
    pub creator: String,
    pub code: String,
    pub name: String,
}

impl OwnerTags {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("creator".to_string(), self.creator.clone()),
            ("code".to_string(), self.code.clone()),
            ("name".to_string(), self.name.clone()),
        ])
    }

    /// Whether `tags` contain every pair of this set
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        self.to_map()
            .iter()
            .all(|(key, value)| tags.get(key) == Some(value))
    }
}
