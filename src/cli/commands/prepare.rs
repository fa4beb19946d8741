use atpkg::lexicon::Record;
use atpkg::publish::{apply_overrides, PackageDraft};
use atpkg::syntax::RecordKey;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub(super) struct Args {
    /// Path to the package.json of the package
    #[arg(long, value_name = "FILE")]
    manifest: PathBuf,

    /// Path to the packed tarball
    #[arg(long, value_name = "FILE")]
    tarball: PathBuf,

    /// Record key of the package [default: the unscoped manifest name]
    #[arg(long)]
    name: Option<RecordKey>,
}

pub(super) async fn run(args: Args) -> anyhow::Result<()> {
    let manifest = tokio::fs::read(&args.manifest).await?;
    let mut manifest: serde_json::Value = serde_json::from_slice(&manifest)?;
    apply_overrides(&mut manifest);
    let tarball = tokio::fs::read(&args.tarball).await?;

    let draft = PackageDraft::from_manifest(&manifest, &tarball)?;
    let name = args
        .name
        .or_else(|| draft.default_name())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "`{}` is not usable as a record key, pass --name",
                draft.manifest_name
            )
        })?;
    tracing::info!(
        package = %name,
        version = %draft.version,
        cid = %draft.cid(),
        size = draft.dist.size,
        "prepared version record"
    );

    let record = draft.to_record(&name).to_value()?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
