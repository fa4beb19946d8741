use atpkg::identity::IdentityResolver;
use atpkg::uri::HandleName;
use clap::Parser;

#[derive(Parser, Debug)]
pub(super) struct Args {
    /// A package reference such as `@alice.example.com/left-pad@^1.0.0`
    #[arg(value_name = "REF")]
    reference: HandleName,
}

pub(super) async fn run(args: Args) -> anyhow::Result<()> {
    let resolver = super::resolver(super::http_client())?;
    let doc = resolver.resolve(args.reference.handle.as_str()).await?;
    tracing::info!(handle = %doc.handle, did = %doc.did, "resolved handle");
    println!("{}", args.reference.alias(doc.did)?);
    Ok(())
}
