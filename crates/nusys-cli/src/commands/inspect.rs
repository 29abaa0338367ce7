use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use nusys_hist::{Artifact, StoreFile};
use serde_json::json;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Store file written by `nusys run`.
    #[arg(long)]
    pub store: PathBuf,
}

/// Verifies a store and prints a JSON summary of its contents.
pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let file = StoreFile::read(&args.store)?;
    let artifacts: Vec<_> = file
        .artifacts
        .names()
        .filter_map(|name| file.artifacts.get(name))
        .map(|artifact| {
            let (kind, shape) = match artifact {
                Artifact::Hist1d(h) => ("hist1d", vec![h.bins()]),
                Artifact::Hist2d(h) => ("hist2d", vec![h.nx(), h.ny()]),
                Artifact::Covariance(m) => ("covariance", vec![m.dim(), m.dim()]),
                Artifact::Cholesky(m) => ("cholesky", vec![m.dim(), m.dim()]),
            };
            json!({ "name": artifact.name(), "kind": kind, "shape": shape })
        })
        .collect();
    let summary = json!({
        "content_hash": file.content_hash,
        "seed": file.provenance.seed,
        "total_pot": file.total_pot,
        "diagnostics": file.diagnostics.len(),
        "artifacts": artifacts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
