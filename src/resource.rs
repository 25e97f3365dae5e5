use std::fmt;

/// Sub-resources of a pipeline that are saved as-is, without decoding.
pub const AUXILIARY_PATHS: [&str; 7] = [
    "warnings",
    "stats/buildsdurations",
    "stats/buildscpu",
    "stats/buildsmemory",
    "stats/releasesdurations",
    "stats/releasescpu",
    "stats/releasesmemory",
];

const PIPELINES_ROOT: &str = "/api/pipelines";

/// Logical API path of a resource, e.g. `/api/pipelines/group/app/builds/7/logs`.
///
/// The same value addresses the resource on the API and names its directory in
/// the snapshot, so every constructor here is the single source of both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The top-level pipelines overview.
    pub fn pipelines() -> Self {
        Self(PIPELINES_ROOT.to_string())
    }

    pub fn pipeline(pipeline: &str) -> Self {
        Self(format!("{PIPELINES_ROOT}/{}", trim_pipeline(pipeline)))
    }

    pub fn builds(pipeline: &str) -> Self {
        Self::pipeline(pipeline).child("builds")
    }

    pub fn build(pipeline: &str, build_id: &str) -> Self {
        Self::builds(pipeline).child(build_id)
    }

    pub fn build_logs(pipeline: &str, build_id: &str) -> Self {
        Self::build(pipeline, build_id).child("logs")
    }

    pub fn releases(pipeline: &str) -> Self {
        Self::pipeline(pipeline).child("releases")
    }

    pub fn release(pipeline: &str, release_id: &str) -> Self {
        Self::releases(pipeline).child(release_id)
    }

    pub fn release_logs(pipeline: &str, release_id: &str) -> Self {
        Self::release(pipeline, release_id).child("logs")
    }

    /// One of the [`AUXILIARY_PATHS`] below a pipeline.
    pub fn auxiliary(pipeline: &str, sub_path: &str) -> Self {
        Self::pipeline(pipeline).child(sub_path.trim_matches('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments below the API root, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty() && *s != ".")
    }

    fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{segment}", self.0))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn trim_pipeline(pipeline: &str) -> &str {
    pipeline.trim().trim_matches('/')
}
