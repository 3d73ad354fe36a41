use clap::Parser;
use log::info;
use server::network::Server;
use shared::{Direction, GameConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the game socket on
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "9000")]
    port: u16,

    /// Master player display name
    #[arg(short, long, default_value = "master")]
    name: String,

    /// Grid width in cells
    #[arg(long, default_value = "40")]
    width: i32,

    /// Grid height in cells
    #[arg(long, default_value = "30")]
    height: i32,

    /// Food kept on the field regardless of player count
    #[arg(long, default_value = "1")]
    food_static: i32,

    /// Extra food per online player
    #[arg(long, default_value = "1.0")]
    food_per_player: f32,

    /// Tick period in milliseconds
    #[arg(long, default_value = "1000")]
    state_delay_ms: u64,

    /// Probability a dead snake cell turns into food
    #[arg(long, default_value = "0.1")]
    dead_food_prob: f64,

    /// Ping period in milliseconds
    #[arg(long, default_value = "100")]
    ping_delay_ms: u64,

    /// Peer silence timeout in milliseconds
    #[arg(long, default_value = "800")]
    node_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = GameConfig {
        width: args.width,
        height: args.height,
        food_static: args.food_static,
        food_per_player: args.food_per_player,
        state_delay_ms: args.state_delay_ms,
        dead_food_prob: args.dead_food_prob,
        ping_delay_ms: args.ping_delay_ms,
        node_timeout_ms: args.node_timeout_ms,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, config, &args.name).await?;

    // stdin steers the master's own snake; the game UI is a separate
    // consumer of the session and not part of this binary
    let session = server.session();
    let local_id = server.local_id();
    info!("steer with w/a/s/d + enter, ctrl-c to quit");
    let input_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let direction = match line.trim() {
                "w" => Direction::Up,
                "s" => Direction::Down,
                "a" => Direction::Left,
                "d" => Direction::Right,
                _ => continue,
            };
            session.write().await.queue_steer(local_id, direction);
        }
    });

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }
    input_task.abort();
    Ok(())
}
