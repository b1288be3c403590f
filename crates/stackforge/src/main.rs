use clap::Parser;
use stackforge::prelude::*;
use stackforge_session::{MAX_ID_LENGTH, MIN_ID_LENGTH};
use tracing_subscriber::EnvFilter;

/// Command line arguments. Each one can also come from the environment.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, env = "STACKFORGE_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Port to listen on
    #[clap(short, long, env = "STACKFORGE_PORT", default_value = "8080")]
    port: u16,
    /// Length of generated session ids
    #[clap(
        long,
        env = "STACKFORGE_ID_LENGTH",
        default_value = "6",
        value_parser = clap::value_parser!(u8).range(MIN_ID_LENGTH as i64..=MAX_ID_LENGTH as i64)
    )]
    id_length: u8,
    /// Log filter, used when RUST_LOG is unset
    #[clap(long, env = "STACKFORGE_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), StackforgeError> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let address = format!("{}:{}", args.host, args.port);
    let server = StackforgeServer::builder()
        .bind(&address)
        .directory_config(DirectoryConfig {
            id_length: usize::from(args.id_length),
            ..DirectoryConfig::default()
        })
        .build()
        .await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
