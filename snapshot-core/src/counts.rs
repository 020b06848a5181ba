//! Conversion of repository version content summaries into count mappings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata the backend reports for one content type in one summary section.
pub type ContentTypeMetadata = serde_json::Map<String, serde_json::Value>;

/// Content-type name to non-negative number of items.
pub type ContentCountsType = BTreeMap<String, i64>;

/// Content summary of a repository version, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    #[serde(default)]
    pub present: HashMap<String, ContentTypeMetadata>,
    #[serde(default)]
    pub added: HashMap<String, ContentTypeMetadata>,
    #[serde(default)]
    pub removed: HashMap<String, ContentTypeMetadata>,
}

/// Item counts of a repository version relative to its predecessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCounts {
    pub present: ContentCountsType,
    pub added: ContentCountsType,
    pub removed: ContentCountsType,
}

impl ContentCounts {
    /// Extract counts from a content summary.
    ///
    /// A content type is omitted from a mapping when its metadata has no
    /// numeric `count` entry. A missing summary yields empty mappings.
    pub fn from_summary(summary: Option<&ContentSummary>) -> Self {
        let Some(summary) = summary else {
            return Self::default();
        };
        Self {
            present: section_counts(&summary.present),
            added: section_counts(&summary.added),
            removed: section_counts(&summary.removed),
        }
    }
}

// Truncation matches how the backend's float counts are stored.
#[allow(clippy::cast_possible_truncation)]
fn section_counts(section: &HashMap<String, ContentTypeMetadata>) -> ContentCountsType {
    section
        .iter()
        .filter_map(|(content_type, metadata)| {
            let count = metadata.get("count")?.as_f64()?;
            (count >= 0.0).then(|| (content_type.clone(), count as i64))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(value: serde_json::Value) -> ContentSummary {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_omits_types_without_count() {
        let summary = summary(json!({
            "present": {"rpm": {"count": 5.0}, "errata": {}},
        }));
        let counts = ContentCounts::from_summary(Some(&summary));

        assert_eq!(counts.present, BTreeMap::from([("rpm".to_string(), 5)]));
        assert!(!counts.present.contains_key("errata"));
        assert!(counts.added.is_empty());
        assert!(counts.removed.is_empty());
    }

    #[test]
    fn test_reads_all_sections() {
        let summary = summary(json!({
            "present": {"rpm": {"count": 12, "href": "/content/rpm/"}, "modulemd": {"count": 2}},
            "added": {"rpm": {"count": 3}},
            "removed": {"rpm": {"count": 1}, "errata": {"count": 4.0}},
        }));
        let counts = ContentCounts::from_summary(Some(&summary));

        assert_eq!(counts.present.get("rpm"), Some(&12));
        assert_eq!(counts.present.get("modulemd"), Some(&2));
        assert_eq!(counts.added, BTreeMap::from([("rpm".to_string(), 3)]));
        assert_eq!(counts.removed.len(), 2);
        assert_eq!(counts.removed.get("errata"), Some(&4));
    }

    #[test]
    fn test_non_numeric_count_is_skipped() {
        let summary = summary(json!({
            "added": {"rpm": {"count": "7"}, "errata": {"count": null}},
        }));
        let counts = ContentCounts::from_summary(Some(&summary));
        assert!(counts.added.is_empty());
    }

    #[test]
    fn test_missing_summary_yields_empty_counts() {
        assert_eq!(ContentCounts::from_summary(None), ContentCounts::default());
    }

    #[test]
    fn test_omits_negative_counts() {
        let counts = ContentCounts::from_summary(Some(&summary(json!({
            "present": {"rpm": {"count": -2.0}, "erratum": {"count": 0.0}}
        }))));
        assert!(!counts.present.contains_key("rpm"));
        assert_eq!(counts.present.get("erratum"), Some(&0));
    }
}
