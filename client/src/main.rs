use clap::Parser;
use client::network::Client;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Rock-paper-scissors game client")]
struct Args {
    /// Server address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server lobby port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut client = Client::new(&args.host, args.port).await?;
    client.run().await
}
