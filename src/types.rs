use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Fields of an upstream document the extractor does not interpret.
///
/// Kept verbatim (in their original order) so the saved snapshot matches what
/// the API returned apart from the obfuscated fields.
pub type Passthrough = Map<String, Value>;

/// A CI pipeline, the root of every extracted tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Pipeline identifier as assigned by the API
    pub id: String,
    /// Commits that triggered the latest build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<Vec<GitCommit>>,
    /// Release targets with their currently active releases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_targets: Option<Vec<ReleaseTarget>>,
    /// Events that trigger this pipeline
    #[serde(rename = "triggerEvents", default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

/// A single build of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<Vec<GitCommit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_targets: Option<Vec<ReleaseTarget>>,
    #[serde(rename = "triggerEvents", default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

/// A single release of a pipeline to one of its release targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    #[serde(rename = "triggerEvents", default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_releases: Option<Vec<Release>>,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitCommit {
    #[serde(default)]
    pub author: GitAuthor,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitAuthor {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

/// Trigger event attached to pipelines, builds and releases.
///
/// The API encodes the variant as whichever key is present (`git`, `pipeline`,
/// `release`, `cron`, `manual`, ...). Only the manual case carries a person and
/// is modelled; every other case rides along in `passthrough`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualEvent>,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEvent {
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default)]
    pub total_items: usize,
}

impl Pagination {
    /// Page size the API uses for the pipelines overview.
    pub const OVERVIEW_PAGE_SIZE: usize = 12;

    /// Pagination for a locally assembled list that fits on a single page.
    pub fn single_page(total_items: usize) -> Self {
        Self {
            page: 1,
            size: Self::OVERVIEW_PAGE_SIZE,
            total_pages: 1,
            total_items,
        }
    }
}

/// The `{items, pagination}` envelope of every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ListResponse<T> {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<T> ListResponse<T> {
    /// Aggregates `items` into a single-page list.
    pub fn single_page(items: Vec<T>) -> Self {
        let pagination = Pagination::single_page(items.len());
        Self { items, pagination }
    }

    /// Rewrites the totals so they describe the items actually held.
    ///
    /// The upstream totals reflect the server's full history, while the saved
    /// snapshot only ever contains the first page.
    pub fn normalize_pagination(&mut self) {
        self.pagination.total_items = self.items.len();
        self.pagination.total_pages = 1;
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pipeline_keeps_unmodelled_fields() {
        let raw = json!({
            "id": "42",
            "repoSource": "github.com",
            "repoOwner": "group",
            "repoName": "app",
            "commits": [
                {"message": "fix", "author": {"email": "a@b.c", "name": "A", "username": "a", "avatarURL": "x"}}
            ],
            "triggerEvents": [{"git": {"event": "push"}}]
        });

        let pipeline: Pipeline = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(pipeline.id, "42");
        assert_eq!(pipeline.passthrough["repoName"], "app");
        assert!(pipeline.release_targets.is_none());

        let commit = &pipeline.commits.as_ref().unwrap()[0];
        assert_eq!(commit.author.email, "a@b.c");
        assert_eq!(commit.author.passthrough["avatarURL"], "x");
        assert!(pipeline.events.as_ref().unwrap()[0].manual.is_none());

        assert_eq!(serde_json::to_value(&pipeline).unwrap(), raw);
    }

    #[test]
    fn test_null_body_decodes_to_no_pipeline() {
        let pipeline: Option<Pipeline> = serde_json::from_str("null").unwrap();
        assert!(pipeline.is_none());
    }

    #[test]
    fn test_null_items_decode_as_empty_list() {
        let list: ListResponse<Build> =
            serde_json::from_str(r#"{"items": null, "pagination": {"page": 1, "size": 10, "totalPages": 0, "totalItems": 0}}"#)
                .unwrap();
        assert!(list.items.is_empty());
        assert_eq!(list.pagination.size, 10);
    }

    #[test]
    fn test_normalize_pagination_uses_local_count() {
        let mut list: ListResponse<Release> = serde_json::from_value(json!({
            "items": [{"id": "1"}, {"id": "2"}, {"id": "3"}],
            "pagination": {"page": 1, "size": 10, "totalPages": 17, "totalItems": 168}
        }))
        .unwrap();

        list.normalize_pagination();

        assert_eq!(list.pagination.total_items, 3);
        assert_eq!(list.pagination.total_pages, 1);
        assert_eq!(list.pagination.page, 1);
        assert_eq!(list.pagination.size, 10);
    }

    #[test]
    fn test_single_page_aggregate() {
        let list = ListResponse::single_page(vec![1, 2]);
        assert_eq!(
            list.pagination,
            Pagination {
                page: 1,
                size: 12,
                total_pages: 1,
                total_items: 2
            }
        );
    }
}
