use clap::Parser;
use client::discovery;
use client::network::Client;
use log::{error, info};
use shared::{Direction, GameConfig};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master address to join; discovered via multicast when omitted
    #[arg(short, long)]
    master: Option<SocketAddr>,

    /// Display name
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Join as a viewer (no snake)
    #[arg(long)]
    view: bool,

    /// Only list discovered games, then exit
    #[arg(long)]
    list: bool,

    /// How long to listen for announcements, in seconds
    #[arg(long, default_value = "3")]
    discover_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    if args.list {
        let (games, task) = discovery::spawn_listener().await?;
        sleep(Duration::from_secs(args.discover_secs)).await;
        task.abort();
        for game in games.read().await.values() {
            println!(
                "{}  {}x{}  players={}  joinable={}",
                game.master,
                game.config.width,
                game.config.height,
                game.players.len(),
                game.can_join
            );
        }
        return Ok(());
    }

    let (master, config) = match args.master {
        Some(addr) => (addr, GameConfig::default()),
        None => {
            info!("no master given, listening for announcements...");
            let (games, task) = discovery::spawn_listener().await?;
            sleep(Duration::from_secs(args.discover_secs)).await;
            task.abort();
            let games = games.read().await;
            match games.values().find(|game| game.can_join) {
                Some(game) => (game.master, game.config.clone()),
                None => return Err("no joinable game announced".into()),
            }
        }
    };

    let (mut client, steer) = Client::join(master, &args.name, args.view, config).await?;
    info!("steer with w/a/s/d + enter, ctrl-c to quit");

    // stdin steering stands in for the game UI, which is a separate
    // consumer of the snapshot view
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
            if steer.send(direction).is_err() {
                break;
            }
        }
    });

    tokio::select! {
        result = client.run() => {
            if let Err(e) = result {
                error!("session ended: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    input_task.abort();
    Ok(())
}
