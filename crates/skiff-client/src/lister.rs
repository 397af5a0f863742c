//! Object-store listing with include/exclude filters and prefix discovery.
//!
//! The lister is generic over the `object_store` crate's [`ObjectStore`]
//! trait: production builds an S3 store from the environment
//! ([`store_from_env`]), tests use `object_store::memory::InMemory`.
//! Listings stream — large buckets are never materialized — and pagination
//! at every level is handled inside the store's own stream.
//!
//! Errors from the store surface directly; this layer does not retry.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use object_store::path::Path as StorePath;
use object_store::{ObjectMeta, ObjectStore};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjMeta {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Parameters for [`Lister::stream_objects`].
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Prefix to list under (or an exact key; exact keys are listed as a
    /// prefix of themselves).
    pub prefix: String,
    /// Walk the whole subtree; false takes one `/`-delimited level.
    pub recursive: bool,
    /// Keys must match at least one of these globs (when non-empty).
    pub include: Vec<String>,
    /// Keys must match none of these globs.
    pub exclude: Vec<String>,
    /// Stop emitting once this many objects matched.
    pub max_files: Option<usize>,
}

/// Compiled include/exclude filter over full object keys.
///
/// Globs use `*` within one path component and `**` across components, so
/// `**/*.jpg` matches `a.jpg` as well as `raw/2024/a.jpg`.
pub(crate) struct KeyFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl KeyFilter {
    pub(crate) fn new(include: &[String], exclude: &[String]) -> ClientResult<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(key) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(key) {
                return false;
            }
        }
        true
    }
}

fn compile(patterns: &[String]) -> ClientResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| ClientError::InvalidArgument(format!("bad glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| ClientError::InvalidArgument(format!("bad glob set: {e}")))?;
    Ok(Some(set))
}

/// Paginated lister over one bucket of an [`ObjectStore`].
pub struct Lister {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl Lister {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Stream the objects under `request.prefix`.
    ///
    /// Recursive listings walk the store's paginated object stream;
    /// non-recursive listings take a single `/`-delimited level. The
    /// include/exclude filter and the `max_files` cap apply to both.
    pub async fn stream_objects(
        &self,
        request: ListRequest,
    ) -> ClientResult<BoxStream<'_, ClientResult<ObjMeta>>> {
        let filter = KeyFilter::new(&request.include, &request.exclude)?;
        let prefix = store_prefix(&request.prefix);

        let base: BoxStream<'_, ClientResult<ObjMeta>> = if request.recursive {
            let bucket = self.bucket.clone();
            self.store
                .list(prefix.as_ref())
                .map_err(ClientError::from)
                .map_ok(move |meta| to_obj(&bucket, meta))
                .boxed()
        } else {
            let page = self.store.list_with_delimiter(prefix.as_ref()).await?;
            debug!(
                objects = page.objects.len(),
                prefixes = page.common_prefixes.len(),
                "delimited listing"
            );
            let bucket = self.bucket.clone();
            stream::iter(
                page.objects
                    .into_iter()
                    .map(move |meta| Ok(to_obj(&bucket, meta))),
            )
            .boxed()
        };

        let filtered =
            base.try_filter(move |obj| futures::future::ready(filter.matches(&obj.key)));
        Ok(match request.max_files {
            Some(cap) => filtered.take(cap).boxed(),
            None => filtered.boxed(),
        })
    }

    /// Child prefixes `depth` levels below `base`, breadth-first.
    ///
    /// Each level expands the previous level's prefixes through
    /// `/`-delimited listings. A level that yields no children keeps the
    /// previous level (graceful truncation on shallow trees). Returned
    /// prefixes carry a trailing `/`.
    pub async fn prefixes_at_depth(&self, base: &str, depth: u32) -> ClientResult<Vec<String>> {
        let mut level: Vec<String> = vec![base.to_string()];
        for _ in 0..depth {
            let mut next = Vec::new();
            for prefix in &level {
                let page = self
                    .store
                    .list_with_delimiter(store_prefix(prefix).as_ref())
                    .await?;
                next.extend(
                    page.common_prefixes
                        .into_iter()
                        .map(|child| format!("{child}/")),
                );
            }
            if next.is_empty() {
                break;
            }
            level = next;
        }
        Ok(level)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn to_obj(bucket: &str, meta: ObjectMeta) -> ObjMeta {
    ObjMeta {
        bucket: bucket.to_string(),
        key: meta.location.to_string(),
        size: meta.size as u64,
        etag: meta.e_tag,
    }
}

fn store_prefix(prefix: &str) -> Option<StorePath> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(StorePath::from(trimmed))
    }
}

/// Build an S3-compatible store for `bucket` from the environment.
///
/// Honors `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
/// `AWS_DEFAULT_REGION`, `AWS_ENDPOINT` (unset means the default public
/// endpoint), and `AWS_VIRTUAL_HOSTED_STYLE_REQUEST`.
pub fn store_from_env(bucket: &str) -> ClientResult<Arc<dyn ObjectStore>> {
    let store = object_store::aws::AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .build()?;
    Ok(Arc::new(store))
}
