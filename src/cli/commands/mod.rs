mod alias;
mod codec;
mod packument;
mod prepare;
mod serve;

use super::Args;

use atpkg::identity::{IdentityResolver, Memoized, XrpcResolver};
use atpkg::repo::XrpcConnector;
use atpkg::Registry;
use clap::Subcommand;
use config::CONFIG;
use std::sync::Arc;
use url::Url;

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Run the npm-compatible registry.
    ///
    /// Every request is answered from the package records in the
    /// owner's repository, verified against the CIDs of the package
    /// index before anything is returned. Point a package manager
    /// at it with:
    ///
    ///   npm config set @atpkgs:registry http://127.0.0.1:8787
    #[command(verbatim_doc_comment)]
    Serve(serve::Args),
    /// Encode or decode a name segment
    #[command(subcommand)]
    Name(codec::NameCommand),
    /// Translate between package names and at:// URIs
    #[command(subcommand)]
    Uri(codec::UriCommand),
    /// Print the install alias for an `@handle/name[@range]` reference
    Alias(alias::Args),
    /// Fetch, verify and print the packument of a package
    Packument(packument::Args),
    /// Print the version record a manifest and tarball would publish
    Prepare(prepare::Args),
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::Serve(args) => serve::run(args).await?,
        Commands::Name(cmd) => codec::name(cmd)?,
        Commands::Uri(cmd) => codec::uri(cmd)?,
        Commands::Alias(args) => alias::run(args).await?,
        Commands::Packument(args) => packument::run(args).await?,
        Commands::Prepare(args) => prepare::run(args).await?,
    }
    Ok(())
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

fn resolver(http: reqwest::Client) -> anyhow::Result<Arc<dyn IdentityResolver>> {
    let service = Url::parse(&CONFIG.identity.resolver)?;
    Ok(Arc::new(Memoized::new(XrpcResolver::new(http, service))))
}

/// A registry reading from the live network, as configured.
fn registry() -> anyhow::Result<Registry> {
    let http = http_client();
    let registry = Registry::new(resolver(http.clone())?, Arc::new(XrpcConnector::new(http)))
        .with_time(&CONFIG.registry.fake_time);
    Ok(registry)
}
