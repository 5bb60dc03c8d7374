//! murmur - direct messages against the local provider.
//!
//! ## Usage
//!
//! ```bash
//! murmur register ann --first Ann --last Smith
//! murmur --as ann users --search bo
//! murmur --as ann send bob "hi"
//! murmur --as bob history ann
//! murmur --as ann attach bob --kind document ./report.pdf
//! murmur --as ann record bob --seconds 5
//! murmur --as ann delete <message-id>
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use murmur_client::{init_tracing, ClientConfig, ClientContext, Messenger};
use murmur_media::AudioSource;
use murmur_shared::constants::{APP_NAME, MAX_RECORDING_SECS};
use murmur_shared::{AttachmentKind, Identity, Message, MessageId};
use murmur_store::{LocalBackend, NewProfile};

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Direct messages, files and voice notes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides MURMUR_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Username to act as
    #[arg(long = "as", global = true)]
    user: Option<String>,

    /// Print messages as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a profile
    Register {
        username: String,
        #[arg(long, default_value = "")]
        first: String,
        #[arg(long, default_value = "")]
        last: String,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// List contacts
    Users {
        /// Match against username, first or last name
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show the conversation with a contact (marks it read)
    History { peer: String },
    /// Send a text message
    Send { peer: String, text: String },
    /// Send a file
    Attach {
        peer: String,
        #[arg(short, long)]
        kind: AttachmentKind,
        path: PathBuf,
    },
    /// Record and send a voice message
    Record {
        peer: String,
        #[arg(short, long, default_value_t = 3)]
        seconds: u64,
    },
    /// Delete a message you sent
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(db) = cli.db.clone() {
        config.database_path = Some(db);
    }

    let path = config.resolve_database_path()?;
    let backend = LocalBackend::open_at(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    info!(app = APP_NAME, db = %path.display(), "Starting");

    if let Commands::Register {
        username,
        first,
        last,
        avatar,
    } = &cli.command
    {
        let identity = backend.register_profile(&NewProfile {
            username: username.clone(),
            first_name: first.clone(),
            last_name: last.clone(),
            avatar_url: avatar.clone(),
        })?;
        println!("Registered {} ({})", identity.username, identity.id);
        return Ok(());
    }

    let Some(username) = cli.user.as_deref() else {
        bail!("--as <username> is required for this command");
    };
    let session = backend.connect();
    session.sign_in(username)?;
    let ctx = ClientContext::new(Arc::new(session), config);

    let messenger = Messenger::open(&ctx, audio_source())
        .await
        .context("Failed to open messenger")?;
    let result = run(&messenger, cli.command, cli.json).await;
    messenger.close().await;
    result
}

async fn run(messenger: &Messenger, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Register { .. } => Ok(()),
        Commands::Users { search } => {
            let contacts = messenger.directory().filter(search.as_deref().unwrap_or(""));
            if contacts.is_empty() {
                println!("No contacts");
            }
            for contact in contacts {
                println!("{:<16} {}", contact.username, contact.display_name());
            }
            Ok(())
        }
        Commands::History { peer } => {
            let peer = open_peer(messenger, &peer).await?;
            let messages = messenger.messages();
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else if messages.is_empty() {
                println!("No messages with {}", peer.username);
            } else {
                for message in &messages {
                    println!("{}", render(messenger.me(), &peer, message));
                }
            }
            Ok(())
        }
        Commands::Send { peer, text } => {
            let peer = open_peer(messenger, &peer).await?;
            messenger.set_draft(text);
            let message = messenger.send_draft().await?;
            print_sent(messenger.me(), &peer, &message, json)
        }
        Commands::Attach { peer, kind, path } => {
            let peer = open_peer(messenger, &peer).await?;
            let message = messenger
                .send_file(&path, kind)
                .await
                .with_context(|| format!("Upload of {} failed", path.display()))?;
            print_sent(messenger.me(), &peer, &message, json)
        }
        Commands::Record { peer, seconds } => {
            let peer = open_peer(messenger, &peer).await?;
            let seconds = seconds.clamp(1, u64::from(MAX_RECORDING_SECS));
            messenger.press_record().await?;
            println!("Recording for {seconds}s...");
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            match messenger.release_record().await? {
                Some(message) => print_sent(messenger.me(), &peer, &message, json),
                None => bail!("Nothing was recorded"),
            }
        }
        Commands::Delete { id } => {
            let id = MessageId::parse(&id)?;
            if messenger.delete(&id).await? {
                println!("Deleted {id}");
            } else {
                println!("Nothing deleted (not found or not yours)");
            }
            Ok(())
        }
    }
}

async fn open_peer(messenger: &Messenger, username: &str) -> Result<Identity> {
    let peer = messenger
        .directory()
        .find_by_username(username)
        .cloned()
        .with_context(|| format!("Unknown contact '{username}'"))?;
    messenger.select_peer(peer.id).await?;
    Ok(peer)
}

fn print_sent(me: &Identity, peer: &Identity, message: &Message, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(message)?);
    } else {
        println!("{}", render(me, peer, message));
    }
    Ok(())
}

fn render(me: &Identity, peer: &Identity, message: &Message) -> String {
    let from = if message.sender_id == me.id {
        &me.username
    } else {
        &peer.username
    };
    let mut line = format!(
        "{} {} [{}] {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        if message.read { " " } else { "*" },
        from,
        message.content
    );
    if let Some(attachment) = &message.attachment {
        let reference = if attachment.url.starts_with("data:") {
            format!("{} bytes inline", attachment.url.len())
        } else {
            attachment.url.clone()
        };
        line.push_str(&format!(" <{} {} ({})>", attachment.kind, attachment.name, reference));
    }
    line.push_str(&format!("  {}", message.id));
    line
}

#[cfg(feature = "cpal")]
fn audio_source() -> Arc<dyn AudioSource> {
    Arc::new(murmur_media::CpalSource::new())
}

#[cfg(not(feature = "cpal"))]
fn audio_source() -> Arc<dyn AudioSource> {
    Arc::new(murmur_media::SyntheticSource::default())
}
