use clap::Parser;
use client::command::{Command, HELP};
use client::console::{chat_refused, render_board, ConsoleObserver};
use client::{ChatClient, GameHub, InviteState, Phase};
use log::info;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay server address to connect to
    #[arg(short = 's', long, default_value = shared::DEFAULT_SERVER_ADDR)]
    server: String,

    /// Display name, sent as the handshake line
    #[arg(short = 'n', long)]
    name: String,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,
}

fn list_games(hub: &GameHub) {
    let invites = hub.invites();
    let sessions = hub.sessions();
    if invites.is_empty() && sessions.is_empty() {
        println!("No games.");
        return;
    }

    for invite in invites {
        let state = match invite.state {
            InviteState::Open => "open",
            InviteState::Requested => "join requested",
            InviteState::Joined => "joined",
        };
        println!(
            "[{}] {} by {} ({})",
            invite.game_id, invite.kind, invite.initiator, state
        );
    }

    for session in sessions {
        let status = match session.phase() {
            Phase::Active if session.is_local_turn() => "your turn".to_string(),
            Phase::Active => "opponent's turn".to_string(),
            Phase::Terminal(outcome) => format!("finished ({:?})", outcome),
            Phase::Closed => "closed".to_string(),
        };
        println!(
            "[{}] {} vs {}: {}",
            session.game_id(),
            session.kind(),
            session.opponent_name(),
            status
        );
        print!("{}", render_board(session.board()));
    }
}

/// Runs one command. Returns false when the user asked to quit.
fn execute(client: &ChatClient, command: Command) -> bool {
    let hub = client.hub();
    let result = match command {
        Command::Chat(text) => {
            if !client.send_chat(&text) {
                eprintln!("{}", chat_refused(client.is_connected()));
            }
            Ok(())
        }
        Command::NewGame(kind) => {
            hub.request_new_game(kind);
            Ok(())
        }
        Command::Join(game_id) => hub.request_join(&game_id),
        Command::Move { game_id, row, col } => hub.make_move(&game_id, row, col),
        Command::Drop { game_id, col } => hub.make_move(&game_id, 0, col),
        Command::Reset(game_id) => hub.request_reset(&game_id),
        Command::Exit(game_id) => hub.exit_game(&game_id),
        Command::Games => {
            list_games(hub);
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        eprintln!("{}", e);
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to {} as {}", args.server, args.name);

    let observer = Arc::new(ConsoleObserver::new(args.json));
    let client = ChatClient::new(&args.server, &args.name, observer.clone())?;
    observer.attach(client.hub());
    client.connect().await?;

    if !args.json {
        println!("Connected as {}. Type /help for commands.", args.name);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if !execute(&client, command) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
                if !client.is_connected() {
                    eprintln!("Connection to the server was lost.");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    client.shutdown().await;
    info!("Client stopped");
    Ok(())
}
