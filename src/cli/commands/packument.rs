use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
pub(super) struct Args {
    /// An `@atpkgs/…` package name
    package: String,

    /// Print only this version, given as a version or a dist-tag
    #[arg(long, value_name = "VERSION")]
    version: Option<String>,
}

pub(super) async fn run(args: Args) -> anyhow::Result<()> {
    let registry = super::registry()?;
    let json = match &args.version {
        Some(version) => {
            let cancel = CancellationToken::new();
            let version = registry
                .fetch_version(&args.package, version, &cancel)
                .await?;
            serde_json::to_string_pretty(&version)?
        }
        None => serde_json::to_string_pretty(&registry.fetch_packument(&args.package).await?)?,
    };
    println!("{json}");
    Ok(())
}
