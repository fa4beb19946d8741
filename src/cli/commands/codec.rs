use atpkg::uri::{self, ResourceUri};
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub(super) enum NameCommand {
    /// Encode raw text (a DID or record key) as a package name segment
    Encode { raw: String },
    /// Decode a package name segment back into the text it encodes
    Decode { encoded: String },
}

#[derive(Subcommand, Debug)]
pub(super) enum UriCommand {
    /// Print the at:// URI of the index behind an `@atpkgs/…` package name
    ToUri { package: String },
    /// Print the `@atpkgs/…` package name of a package index URI
    FromUri { uri: ResourceUri },
}

pub(super) fn name(cmd: NameCommand) -> anyhow::Result<()> {
    match cmd {
        NameCommand::Encode { raw } => println!("{}", atpkg::name::encode(&raw)),
        NameCommand::Decode { encoded } => println!("{}", atpkg::name::decode(&encoded)?),
    }
    Ok(())
}

pub(super) fn uri(cmd: UriCommand) -> anyhow::Result<()> {
    match cmd {
        UriCommand::ToUri { package } => println!("{}", uri::to_resource_uri(&package)?),
        UriCommand::FromUri { uri } => println!("{}", uri::from_resource_uri(&uri)?),
    }
    Ok(())
}
