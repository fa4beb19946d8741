use crate::server;

use clap::Parser;
use config::CONFIG;
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
pub(super) struct Args {
    /// Address to listen on [default: `server.listen` from the config]
    #[arg(long, short, value_name = "ADDR")]
    listen: Option<SocketAddr>,
}

pub(super) async fn run(args: Args) -> anyhow::Result<()> {
    let addr = args.listen.unwrap_or(CONFIG.server.listen);
    let registry = super::registry()?;
    let listener = TcpListener::bind(addr).await?;
    server::serve(listener, registry).await?;
    Ok(())
}
