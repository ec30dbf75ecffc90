use clap::Parser;
use client::{QueryConfig, ServerQuery};
use log::info;
use shared::{PlayerEntry, Rules, ServerInfo};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Query a game server over UDP", long_about = None)]
struct Args {
    /// Server host name or IP address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server query port
    #[arg(short, long, default_value = "27015")]
    port: u16,

    /// Per-request timeout in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout: u64,

    /// Query server info (the default when nothing else is selected)
    #[arg(long)]
    info: bool,

    /// Query the player list
    #[arg(long)]
    players: bool,

    /// Query the server rules
    #[arg(long)]
    rules: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn wants_info(&self) -> bool {
        self.info || !(self.players || self.rules)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = QueryConfig::default().with_timeout(Duration::from_millis(args.timeout));

    info!("Querying {}:{}", args.host, args.port);
    let query = ServerQuery::open(&args.host, args.port, config).await?;

    // Run every query before giving up so the socket is always closed
    let outcome = run_queries(&query, &args).await;
    query.close().await?;
    outcome
}

async fn run_queries(query: &ServerQuery, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.wants_info() {
        let info = query.info().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print_info(&info);
        }
    }

    if args.players {
        let players = query.players().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&players)?);
        } else {
            print_players(&players);
        }
    }

    if args.rules {
        let rules = query.rules().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&rules)?);
        } else {
            print_rules(&rules);
        }
    }

    Ok(())
}

fn print_info(info: &ServerInfo) {
    println!("Name:     {}", info.name);
    println!("Map:      {}", info.map);
    println!("Game:     {} ({}, app {})", info.game, info.folder, info.app_id);
    println!(
        "Players:  {}/{} ({} bots)",
        info.players, info.max_players, info.bots
    );
    println!("Type:     {} / {}", info.server_type, info.environment);
    println!("Password: {}  VAC: {}", info.password, info.vac_secured);
    println!("Version:  {}", info.version);

    if let Some(ship) = &info.the_ship {
        println!(
            "The Ship: mode {} witnesses {} duration {}",
            ship.mode, ship.witnesses, ship.duration
        );
    }
    if let Some(port) = info.extra.port {
        println!("Port:     {}", port);
    }
    if let Some(steam_id) = &info.extra.steam_id {
        println!("SteamID:  {}", steam_id.as_u64());
    }
    if let Some(spectator) = &info.extra.spectator {
        println!("SourceTV: {} on port {}", spectator.name, spectator.port);
    }
    if let Some(keywords) = &info.extra.keywords {
        println!("Keywords: {}", keywords);
    }
    if let Some(game_id) = info.extra.game_id {
        println!("Game ID:  {}", game_id);
    }
}

fn print_players(players: &[PlayerEntry]) {
    println!("{} players", players.len());
    for player in players {
        println!(
            "  {:>3} {:<32} {:>6} {:>8.0}s",
            player.index, player.name, player.score, player.duration
        );
    }
}

fn print_rules(rules: &Rules) {
    let mut names: Vec<_> = rules.keys().collect();
    names.sort();
    println!("{} rules", names.len());
    for name in names {
        println!("  {} = {}", name, rules[name]);
    }
}
