mod config;
mod input;
mod logging;
mod view;

use std::{
    error::Error,
    io::{self, Write},
    process::ExitCode,
};

use chat_client::{
    ChatClientHandle, LocalIdentityStore, WebSocketConnector, read_attachment, scoped_storage,
    spawn_client,
};
use chat_core::{ChatCommand, DisplayName};
use chat_platform::FileKeyValueStore;
use chrono::Utc;
use config::CliConfig;
use input::{HELP, InputCommand, JoinTarget, parse_line};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, error, info, warn};
use view::SessionView;

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("chat-cli: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "chat-cli failed");
            eprintln!("chat-cli: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: CliConfig) -> Result<(), Box<dyn Error>> {
    info!(
        server = %config.client.server_url,
        data_dir = %config.data_dir.display(),
        "starting chat-cli"
    );
    let storage = scoped_storage(&config.client, FileKeyValueStore::new(&config.data_dir));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let saved = LocalIdentityStore::new(storage.clone()).load();
    let name = match saved {
        Some(name) => {
            debug!(display_name = %name.as_str(), "using saved display name");
            name
        }
        None => match resolve_name(config.username.as_deref(), &mut lines).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let handle = spawn_client(config.client.clone(), WebSocketConnector, storage)?;
    let mut events = handle.subscribe();
    handle
        .send(ChatCommand::AnnounceIdentity {
            name,
            avatar: config.avatar.clone(),
        })
        .await?;
    println!("Type /help for commands.");

    let mut view = SessionView::default();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&handle, &view, &line).await? {
                        break;
                    }
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let rendered = view.apply(event, Utc::now());
                    for line in rendered.lines {
                        println!("{line}");
                    }
                    if rendered.logged_out {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    info!("chat-cli stopped");
    Ok(())
}

/// Pick a display name from the environment or prompt until one validates.
///
/// Returns `None` when stdin closes first.
async fn resolve_name(
    from_env: Option<&str>,
    lines: &mut StdinLines,
) -> Result<Option<DisplayName>, Box<dyn Error>> {
    if let Some(raw) = from_env {
        match DisplayName::parse(raw) {
            Ok(name) => return Ok(Some(name)),
            Err(err) => warn!(error = %err, "ignoring CHAT_USERNAME"),
        }
    }

    loop {
        print!("Display name: ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        match DisplayName::parse(&line) {
            Ok(name) => return Ok(Some(name)),
            Err(err) => println!("! {}", err.message),
        }
    }
}

/// Dispatch one input line. Returns `false` when the session should end.
async fn handle_line(
    handle: &ChatClientHandle,
    view: &SessionView,
    line: &str,
) -> Result<bool, Box<dyn Error>> {
    let command = match parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(true),
        Err(err) => {
            println!("! {err}");
            return Ok(true);
        }
    };

    let chat_command = match command {
        InputCommand::Help => {
            println!("{HELP}");
            return Ok(true);
        }
        InputCommand::Users => {
            for line in view.roster_lines() {
                println!("{line}");
            }
            ChatCommand::RequestRoster
        }
        InputCommand::Join(target) => {
            let peer_connection_id = match target {
                JoinTarget::ConnectionId(id) => id,
                JoinTarget::Index(index) => match view.peer_at(index) {
                    Some(peer) => peer.connection_id.clone(),
                    None => {
                        println!("! no roster entry {index}; try /users");
                        return Ok(true);
                    }
                },
            };
            ChatCommand::JoinConversation { peer_connection_id }
        }
        InputCommand::Leave => ChatCommand::LeaveConversation,
        InputCommand::Emoji(glyph) => ChatCommand::SendEmoji { glyph },
        InputCommand::File(path) => match read_attachment(&path).await {
            Ok(attachment) => ChatCommand::SendFile(attachment),
            Err(err) => {
                println!("! {}", err.message);
                return Ok(true);
            }
        },
        InputCommand::Image(path) => match read_attachment(&path).await {
            Ok(attachment) => ChatCommand::SendImage(attachment),
            Err(err) => {
                println!("! {}", err.message);
                return Ok(true);
            }
        },
        InputCommand::History => {
            for line in view.history_lines(Utc::now()) {
                println!("{line}");
            }
            return Ok(true);
        }
        InputCommand::Logout => ChatCommand::Logout,
        InputCommand::Quit => return Ok(false),
        InputCommand::Text(body) => {
            if view.active().is_none() {
                println!("! join a conversation first; try /users and /join <n>");
                return Ok(true);
            }
            ChatCommand::SendText { body }
        }
    };

    handle.send(chat_command).await?;
    Ok(true)
}
