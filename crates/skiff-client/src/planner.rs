//! Batch planner — expands a manifest spec into a lazy plan-item sequence.
//!
//! Dispatch:
//!
//! 1. Batching disabled (or no `io` at all) — exactly one single-mode item.
//! 2. Grouping `prefix` — one item per child prefix at `prefixDepth`.
//! 3. Grouping `object` — objects are streamed, packed `maxPerTask` at a
//!    time, and each pack becomes one item with staged basenames and a
//!    templated argument vector.
//!
//! Items are produced through a stream backed by paginated listings, so a
//! large bucket is never materialized ahead of submission. Ordering follows
//! the store's listing order.
//!
//! Only `io.inputs[0]` drives the listing; additional inputs are ignored
//! (a known limitation of the manifest format).

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;

use skiff_types::{
    basename, render_args, Grouping, IoInput, LocalInput, PlanInput, PlanItem, PlanSource, Spec,
};

use crate::error::{ClientError, ClientResult};
use crate::lister::{ListRequest, Lister, ObjMeta};
use crate::s3url::{parse_s3_url, S3Location};

/// A lazy sequence of plan items.
pub type PlanStream<'a> = BoxStream<'a, ClientResult<PlanItem>>;

pub(crate) fn no_inputs_error() -> ClientError {
    ClientError::InvalidArgument(
        "batch submission requires at least one io.inputs entry (EBATCH_NO_INPUTS)".to_string(),
    )
}

/// The plan item for a non-batch submission: the manifest describes one
/// task whose inputs are the declared locations verbatim.
pub fn single_item(spec: &Spec) -> ClientResult<PlanItem> {
    let mut inputs = Vec::with_capacity(spec.io_inputs().len());
    for input in spec.io_inputs() {
        inputs.push(plan_input_from(input)?);
    }
    Ok(PlanItem {
        inputs,
        local_inputs: Vec::new(),
        args: spec.args.clone(),
        source: PlanSource::single(),
    })
}

/// Expand `spec` into plan items, listing through `lister` when batching.
pub fn plan<'a>(spec: &Spec, lister: &'a Lister) -> PlanStream<'a> {
    if !spec.batch_enabled() {
        return stream::once(future::ready(single_item(spec))).boxed();
    }
    let Some(base) = spec.io_inputs().first().cloned() else {
        return err_stream(no_inputs_error());
    };
    let location = match parse_s3_url(&base.url) {
        Ok(location) => location,
        Err(err) => return err_stream(err),
    };

    let batch = spec.batch_options();
    let args = spec.args.clone();
    match batch.grouping {
        Grouping::Prefix => plan_prefixes(
            args,
            lister,
            base,
            location,
            batch.prefix_depth.unwrap_or(1),
        ),
        Grouping::Object => plan_objects(
            args,
            lister,
            base,
            location,
            batch.max_per_task.unwrap_or(1).max(1),
        ),
    }
}

fn plan_input_from(input: &IoInput) -> ClientResult<PlanInput> {
    let location = parse_s3_url(&input.url)?;
    Ok(PlanInput {
        bucket: location.bucket,
        prefix: location.prefix,
        key: location.key,
        recursive: input.recursive,
        include: input.include.clone(),
        exclude: input.exclude.clone(),
    })
}

/// One item per child prefix at `depth` below the base prefix.
fn plan_prefixes<'a>(
    args: Vec<Value>,
    lister: &'a Lister,
    base: IoInput,
    location: S3Location,
    depth: u32,
) -> PlanStream<'a> {
    let expand = async move {
        let base_prefix = location.listing_prefix().to_string();
        let prefixes = lister.prefixes_at_depth(&base_prefix, depth).await?;
        let bucket = location.bucket;
        Ok::<_, ClientError>(stream::iter(prefixes.into_iter().map(move |prefix| {
            Ok(PlanItem {
                inputs: vec![PlanInput {
                    bucket: bucket.clone(),
                    prefix: Some(prefix.clone()),
                    key: None,
                    recursive: Some(true),
                    include: base.include.clone(),
                    exclude: base.exclude.clone(),
                }],
                local_inputs: Vec::new(),
                args: args.clone(),
                source: PlanSource::prefix(prefix),
            })
        })))
    };
    stream::once(expand).try_flatten().boxed()
}

/// Stream objects and pack them `pack_size` at a time; the trailing
/// partial pack is emitted too.
fn plan_objects<'a>(
    args: Vec<Value>,
    lister: &'a Lister,
    base: IoInput,
    location: S3Location,
    pack_size: usize,
) -> PlanStream<'a> {
    let expand = async move {
        let request = ListRequest {
            prefix: location.listing_prefix().to_string(),
            recursive: base.recursive.unwrap_or(true),
            include: base.include.clone(),
            exclude: base.exclude.clone(),
            max_files: base.max_files,
        };
        let objects = lister.stream_objects(request).await?;
        Ok::<_, ClientError>(objects.try_chunks(pack_size).map(move |chunk| match chunk {
            Ok(pack) => Ok(pack_item(&args, pack)),
            Err(err) => Err(err.1),
        }))
    };
    stream::once(expand).try_flatten().boxed()
}

fn pack_item(args: &[Value], pack: Vec<ObjMeta>) -> PlanItem {
    let basenames: Vec<String> = pack
        .iter()
        .map(|obj| basename(&obj.key).to_string())
        .collect();
    let keys: Vec<String> = pack.iter().map(|obj| obj.key.clone()).collect();
    PlanItem {
        inputs: pack
            .into_iter()
            .map(|obj| PlanInput {
                bucket: obj.bucket,
                prefix: None,
                key: Some(obj.key),
                recursive: None,
                include: Vec::new(),
                exclude: Vec::new(),
            })
            .collect(),
        local_inputs: basenames
            .iter()
            .map(|name| LocalInput {
                name: name.clone(),
                workflow_input: true,
            })
            .collect(),
        args: render_args(args, &basenames),
        source: PlanSource::keys(keys),
    }
}

fn err_stream<'a>(err: ClientError) -> PlanStream<'a> {
    stream::once(future::ready(Err(err))).boxed()
}
