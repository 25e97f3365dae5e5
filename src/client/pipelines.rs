use log::debug;

use super::core::ApiClient;
use crate::auth::Token;
use crate::error::Result;
use crate::resource::ResourcePath;
use crate::types::{Build, ListResponse, Pipeline, Release};

/// Only the first page of builds and releases is ever extracted.
const PAGE_NUMBER: usize = 1;
const PAGE_SIZE: usize = 10;

impl ApiClient {
    /// Fetches a pipeline; `Ok(None)` when the API answers with `null`.
    pub async fn get_pipeline(&self, token: &Token, pipeline: &str) -> Result<Option<Pipeline>> {
        let path = ResourcePath::pipeline(pipeline);
        let pipeline: Option<Pipeline> = self.get_json(token, path.as_str()).await?;
        debug!(
            "Fetched pipeline {path} (found: {})",
            pipeline.is_some()
        );
        Ok(pipeline)
    }

    /// Fetches the first page of a pipeline's builds.
    pub async fn get_pipeline_builds(
        &self,
        token: &Token,
        pipeline: &str,
    ) -> Result<ListResponse<Build>> {
        let path = ResourcePath::builds(pipeline);
        self.get_json(token, &first_page(&path)).await
    }

    pub async fn get_pipeline_build(&self, token: &Token, path: &ResourcePath) -> Result<Build> {
        self.get_json(token, path.as_str()).await
    }

    /// Fetches the first page of a pipeline's releases.
    pub async fn get_pipeline_releases(
        &self,
        token: &Token,
        pipeline: &str,
    ) -> Result<ListResponse<Release>> {
        let path = ResourcePath::releases(pipeline);
        self.get_json(token, &first_page(&path)).await
    }

    pub async fn get_pipeline_release(
        &self,
        token: &Token,
        path: &ResourcePath,
    ) -> Result<Release> {
        self.get_json(token, path.as_str()).await
    }

    /// Fetches any resource as raw bytes, unmodified.
    pub async fn get_raw_bytes(&self, token: &Token, path: &ResourcePath) -> Result<Vec<u8>> {
        self.get_bytes(token, path.as_str()).await
    }
}

fn first_page(path: &ResourcePath) -> String {
    format!("{path}?page[number]={PAGE_NUMBER}&page[size]={PAGE_SIZE}")
}
