//! Image builder and cache manager

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::deploy::assembler::{BuildContext, Manifest};
use crate::deploy::runtime::ContainerRuntime;
use crate::deploy::scaffold::BASE_DOCKERFILE;
use crate::errors::EngineError;
use crate::models::project::ProjectId;

/// Hex chars of the digest kept in an image tag
pub const TAG_DIGEST_LEN: usize = 16;

/// Image options
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Shared base serving image
    pub base_image: String,

    /// Repository prefix of app images (`{prefix}-{id}`)
    pub prefix: String,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            base_image: "shipyard-base:node20".to_string(),
            prefix: "shipyard-app".to_string(),
        }
    }
}

/// Result of an image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    /// Content-addressed tag
    pub tag: String,

    /// `:latest` alias of the project's last successful build
    pub latest_tag: String,

    pub digest: String,

    /// The tag already existed and no build was issued
    pub cache_hit: bool,
}

/// Builds content-addressed app images
pub struct ImageBuilder {
    runtime: Arc<dyn ContainerRuntime>,
    options: ImageOptions,
    base_ready: OnceCell<()>,
}

impl ImageBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, options: ImageOptions) -> Self {
        Self {
            runtime,
            options,
            base_ready: OnceCell::new(),
        }
    }

    /// Repository of a project's images
    pub fn repository(&self, project_id: ProjectId) -> String {
        format!("{}-{}", self.options.prefix, project_id)
    }

    /// Tag for a build context digest
    pub fn tag_for(&self, project_id: ProjectId, digest: &str) -> String {
        let short = &digest[..digest.len().min(TAG_DIGEST_LEN)];
        format!("{}:{}", self.repository(project_id), short)
    }

    /// Make sure the shared base image exists. Runs at most once per process
    /// unless it fails, in which case the next build tries again.
    pub async fn ensure_base_image(&self) -> Result<(), EngineError> {
        self.base_ready
            .get_or_try_init(|| async {
                if self.runtime.image_exists(&self.options.base_image).await? {
                    debug!("Base image {} present", self.options.base_image);
                    return Ok::<(), EngineError>(());
                }

                info!("Building base image {}...", self.options.base_image);
                let mut files = BTreeMap::new();
                files.insert("Dockerfile".to_string(), BASE_DOCKERFILE.to_string());
                let context = BuildContext::from_files(files, Manifest::default());
                self.runtime
                    .build_image(&context, &self.options.base_image, None)
                    .await
            })
            .await
            .map(|_| ())
    }

    /// Build (or reuse) the image of a build context
    pub async fn build(
        &self,
        project_id: ProjectId,
        context: &BuildContext,
    ) -> Result<BuiltImage, EngineError> {
        self.ensure_base_image().await?;

        let digest = context.digest();
        let tag = self.tag_for(project_id, &digest);
        let latest_tag = format!("{}:latest", self.repository(project_id));

        let cache_hit = self.runtime.image_exists(&tag).await?;
        if cache_hit {
            info!("Image cache hit for project {}: {}", project_id, tag);
        } else {
            info!("Building image {} for project {}", tag, project_id);
            self.runtime
                .build_image(context, &tag, Some(&latest_tag))
                .await?;
        }

        self.runtime.tag_image(&tag, &latest_tag).await?;

        Ok(BuiltImage {
            tag,
            latest_tag,
            digest,
            cache_hit,
        })
    }
}
