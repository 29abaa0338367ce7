use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_select::SelectionIndex;
use tracing::info;

use crate::context::ReweightContext;
use crate::reader::TableReader;

/// Accumulates `files` on `threads` workers.
///
/// The file list is split into contiguous chunks, each read into a private
/// context derived from `template`, and the partial contexts are merged into
/// `template` in chunk order. For a fixed thread count the result does not
/// depend on scheduling. An index built over another schema is an error.
pub fn accumulate_parallel<R, S>(
    template: ReweightContext,
    reader: &R,
    files: &[S],
    index: &SelectionIndex,
    threads: usize,
) -> Result<ReweightContext, NusysError>
where
    R: TableReader,
    S: AsRef<str> + Sync,
{
    index.ensure_schema(template.schema())?;
    let threads = threads.max(1);
    if threads == 1 || files.len() <= 1 {
        let mut context = template;
        context.accumulate_files(reader, files, index);
        return Ok(context);
    }
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|err| {
            NusysError::Io(
                ErrorInfo::new("thread_pool", "failed to build worker pool")
                    .with_hint(err.to_string()),
            )
        })?;
    let chunk = files.len().div_ceil(threads);
    let partials: Vec<ReweightContext> = pool.install(|| {
        files
            .par_chunks(chunk)
            .map(|chunk| {
                let mut context = template.empty_like();
                context.accumulate_files(reader, chunk, index);
                context
            })
            .collect()
    });
    let chunks = partials.len();
    let mut merged = template;
    for partial in partials {
        merged.merge(partial)?;
    }
    info!(
        files = files.len(),
        chunks,
        pot = merged.total_pot(),
        "parallel accumulation merged"
    );
    Ok(merged)
}
