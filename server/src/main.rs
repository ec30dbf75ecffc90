use clap::Parser;
use log::info;
use server::{Delivery, Responder, ResponderConfig, ServerProfile};
use std::path::PathBuf;

/// Parses command-line arguments, starts the responder and runs until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about = "Answer game server queries on a local UDP port")]
    struct Args {
        /// IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[clap(short, long, default_value = "27015")]
        port: u16,
        /// Largest message chunk per datagram; longer answers are split
        #[clap(short, long, default_value = "1248")]
        max_payload: usize,
        /// How fragments of split answers are sent
        #[clap(short, long, value_enum, default_value = "in-order")]
        delivery: Delivery,
        /// Flag split answers as compressed
        #[clap(long)]
        compressed: bool,
        /// JSON file with the server profile to report
        #[clap(long)]
        profile: Option<PathBuf>,
    }

    env_logger::init();
    let args = Args::parse();

    let profile: ServerProfile = match &args.profile {
        Some(path) => {
            info!("Loading profile from {}", path.display());
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        }
        None => ServerProfile::default(),
    };

    let config = ResponderConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        profile,
        max_payload: args.max_payload,
        delivery: args.delivery,
        compressed: args.compressed,
    };

    let responder = Responder::bind(config).await?;
    info!("Answering queries on {}, Ctrl-C to stop", responder.local_addr());

    tokio::signal::ctrl_c().await?;
    responder.shutdown().await;

    Ok(())
}
