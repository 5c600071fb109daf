use clap::Parser;
use server::network::Server;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Rock-paper-scissors game server")]
struct Args {
    /// Address to bind the lobby and room endpoints on
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Lobby port; room N listens on port + N
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Number of game rooms
    #[arg(short, long, default_value_t = 3)]
    rooms: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut server = Server::new(&args.host, args.port, args.rooms).await?;
    server.run().await
}
