//! Messenger CLI - chats, messages and read positions over a local database

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use messenger_core::application::{
    ChatLifecycleManager, ChatValidator, MessageDeliveryManager, MessageValidator,
};
use messenger_core::config::Config;
use messenger_core::domain::{
    Attachment, AttachmentKind, Chat, ChatCreationInfo, DirectoryClient, Message, NewMessage,
    UploadFile,
};
use messenger_core::infrastructure::{
    ChatRepository, HttpDirectoryClient, LocalFileUploader, MessageRepository, StaticDirectory,
};
use messenger_core::storage::Database;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;


#[derive(Parser)]
#[command(name = "messenger")]
#[command(author, version, about = "Chats and messages over a local database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $MESSENGER_CONFIG_DIR/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage chats and membership
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Send and read messages
    Message {
        #[command(subcommand)]
        action: MessageAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ChatAction {
    /// Create a chat (a group when --name is given, otherwise private)
    Create {
        /// Group name
        #[arg(short, long)]
        name: Option<String>,
        /// Group avatar image
        #[arg(short, long, requires = "name")]
        avatar: Option<PathBuf>,
    },
    /// List a user's chats
    List {
        #[arg(short, long)]
        user: Uuid,
    },
    /// Show a chat
    Get { id: Uuid },
    /// Show the private chat of two users
    Private { first: Uuid, second: Uuid },
    /// Delete a chat with its messages
    Delete { id: Uuid },
    /// Add a user to a chat
    Join {
        id: Uuid,
        #[arg(short, long)]
        user: Uuid,
    },
    /// Remove a user from a chat
    Leave {
        id: Uuid,
        #[arg(short, long)]
        user: Uuid,
    },
    /// List chat members
    Participants { id: Uuid },
    /// Count a user's chats with unread messages
    Unread {
        #[arg(short, long)]
        user: Uuid,
    },
}

#[derive(Subcommand)]
enum MessageAction {
    /// Send a message into a chat or to a user
    Send {
        /// Sender
        #[arg(short, long)]
        from: Uuid,
        /// Target chat
        #[arg(short, long, conflicts_with = "to", required_unless_present = "to")]
        chat: Option<Uuid>,
        /// Receiver, opening a private chat if needed
        #[arg(short, long)]
        to: Option<Uuid>,
        /// Attachment URL (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<String>,
        /// Message text
        #[arg(default_value = "")]
        text: String,
    },
    /// Page through a chat's history, newest first
    History {
        chat: Uuid,
        #[arg(short, long)]
        user: Uuid,
        #[arg(short, long, default_value_t = 20, allow_negative_numbers = true)]
        limit: i64,
        /// Only messages before this RFC 3339 time (defaults to now)
        #[arg(short, long, value_parser = parse_timestamp)]
        before: Option<DateTime<Utc>>,
    },
    /// Show a message
    Get { id: Uuid },
    /// Show the latest message of a chat
    Last { chat: Uuid },
    /// Delete a message
    Delete { id: Uuid },
    /// Move a user's read position
    Read {
        chat: Uuid,
        #[arg(short, long)]
        user: Uuid,
        /// RFC 3339 time (defaults to now)
        #[arg(short, long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },
    /// Show read positions of a user and of the other members
    ReadStatus {
        chat: Uuid,
        #[arg(short, long)]
        user: Uuid,
    },
    /// Count unread messages of a user in a chat
    Unread {
        chat: Uuid,
        #[arg(short, long)]
        user: Uuid,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// Infer an attachment's kind from its URL's extension
fn attachment_from_url(url: &str) -> Attachment {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let kind = match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => AttachmentKind::Image,
        "mp4" | "webm" | "mov" | "mkv" => AttachmentKind::Video,
        "mp3" | "ogg" | "wav" | "flac" | "m4a" => AttachmentKind::Audio,
        _ => AttachmentKind::File,
    };
    Attachment::new(url, kind)
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Wired managers over one database
struct App {
    db: Database,
    chats: ChatLifecycleManager,
    messages: MessageDeliveryManager,
}

impl App {
    async fn open(config: &Config) -> anyhow::Result<Self> {
        let db = Database::new(config.database.to_database_config()).await?;

        let directory: Arc<dyn DirectoryClient> = match &config.directory.base_url {
            Some(url) => Arc::new(HttpDirectoryClient::new(url.clone(), config.directory.timeout())?),
            None => Arc::new(StaticDirectory::new()),
        };
        let uploader = Arc::new(LocalFileUploader::new(
            config.uploads.resolved_dir(),
            config.uploads.public_base_url.clone(),
        ));

        let chat_store = Arc::new(ChatRepository::new(db.pool().clone()));
        let message_store = Arc::new(MessageRepository::new(db.pool().clone()));

        let chats = ChatLifecycleManager::new(
            chat_store.clone(),
            message_store.clone(),
            directory,
            uploader,
            Arc::new(ChatValidator::from_limits(&config.limits)),
        );
        let messages = MessageDeliveryManager::new(
            chat_store,
            message_store,
            Arc::new(MessageValidator::from_limits(&config.limits)),
        );

        Ok(Self {
            db,
            chats,
            messages,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("messenger=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;
    let out = Output::new(cli.format, cli.quiet);

    match cli.command {
        Commands::Chat { action } => {
            let app = App::open(&config).await?;
            let result = cmd_chat(&app, action, &out).await;
            app.db.close().await;
            result
        }
        Commands::Message { action } => {
            let app = App::open(&config).await?;
            let result = cmd_message(&app, action, &out).await;
            app.db.close().await;
            result
        }
        Commands::Config { action } => cmd_config(action, cli.config.as_deref(), &out),
        Commands::Doctor => cmd_doctor(&config, cli.config.as_deref(), &out).await,
    }
}

fn load_config(path: Option<&Path>, db_override: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = db_override {
        config.database.path = Some(db.to_path_buf());
    }
    Ok(config)
}

// ============================================================================
// Output
// ============================================================================

struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Print `value` as JSON, or through `text` in text mode
    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Text => text(value),
        }
        Ok(())
    }

    /// Confirmation line for mutations
    fn done(&self, message: &str) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "ok": true, "message": message })),
            OutputFormat::Text => println!("{}", message),
        }
    }
}

fn print_chat(chat: &Chat) {
    let name = if chat.name.is_empty() { "(unnamed)" } else { chat.name.as_str() };
    println!("{}  {:<7}  {}", chat.id, chat.chat_type, name);
    if !chat.avatar_url.is_empty() {
        println!("    avatar: {}", chat.avatar_url);
    }
    if let Some(last) = &chat.last_message {
        println!("    last: [{}] {}", last.created_at.to_rfc3339(), last.text);
    }
}

fn print_message(message: &Message) {
    println!(
        "{}  {}  {}: {}",
        message.created_at.to_rfc3339(),
        message.id,
        message.sender_id,
        message.text
    );
    for attachment in &message.attachments {
        println!("    [{}] {}", attachment.kind.as_str(), attachment.url);
    }
}

fn print_ts(label: &str, ts: Option<DateTime<Utc>>) {
    match ts {
        Some(ts) => println!("{}: {}", label, ts.to_rfc3339()),
        None => println!("{}: never", label),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_chat(app: &App, action: ChatAction, out: &Output) -> anyhow::Result<()> {
    match action {
        ChatAction::Create { name, avatar } => {
            let info = match name {
                Some(name) => {
                    let mut info = ChatCreationInfo::group(name);
                    if let Some(path) = avatar {
                        let bytes = tokio::fs::read(&path)
                            .await
                            .with_context(|| format!("Failed to read avatar: {}", path.display()))?;
                        let file_name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| "avatar".to_string());
                        info = info.with_avatar(UploadFile::new(file_name, content_type_for(&path), bytes));
                    }
                    info
                }
                None => ChatCreationInfo::private(),
            };
            let chat = app.chats.create_chat(info).await?;
            info!(chat_id = %chat.id, "Chat created from CLI");
            out.emit(&chat, print_chat)?;
        }
        ChatAction::List { user } => {
            let chats = app.chats.get_user_chats(user).await?;
            out.emit(&chats, |chats| {
                if chats.is_empty() {
                    println!("No chats.");
                }
                chats.iter().for_each(print_chat);
            })?;
        }
        ChatAction::Get { id } => {
            let chat = app.chats.get_chat(id).await?;
            out.emit(&chat, print_chat)?;
        }
        ChatAction::Private { first, second } => {
            let chat = app.chats.get_private_chat(first, second).await?;
            out.emit(&chat, print_chat)?;
        }
        ChatAction::Delete { id } => {
            app.chats.delete_chat(id).await?;
            out.done(&format!("Deleted chat {}", id));
        }
        ChatAction::Join { id, user } => {
            app.chats.join_chat(id, user).await?;
            out.done(&format!("User {} joined chat {}", user, id));
        }
        ChatAction::Leave { id, user } => {
            app.chats.leave_chat(id, user).await?;
            out.done(&format!("User {} left chat {}", user, id));
        }
        ChatAction::Participants { id } => {
            let participants = app.chats.get_chat_participants(id).await?;
            out.emit(&participants, |ids| ids.iter().for_each(|id| println!("{}", id)))?;
        }
        ChatAction::Unread { user } => {
            let count = app.chats.get_num_unread_chats(user).await?;
            out.emit(&count, |count| println!("{}", count))?;
        }
    }
    Ok(())
}

async fn cmd_message(app: &App, action: MessageAction, out: &Output) -> anyhow::Result<()> {
    match action {
        MessageAction::Send {
            from,
            chat,
            to,
            attachments,
            text,
        } => {
            let mut message = match (chat, to) {
                (Some(chat), _) => NewMessage::to_chat(chat, from, text),
                (None, Some(to)) => NewMessage::to_user(from, to, text),
                (None, None) => anyhow::bail!("either --chat or --to is required"),
            };
            for url in &attachments {
                message = message.with_attachment(attachment_from_url(url));
            }
            let sent = app.messages.send_message(message).await?;
            out.emit(&sent, print_message)?;
        }
        MessageAction::History {
            chat,
            user,
            limit,
            before,
        } => {
            let before = before.unwrap_or_else(Utc::now);
            let messages = app
                .messages
                .get_messages_for_chat_older(chat, user, limit, before)
                .await?;
            out.emit(&messages, |messages| {
                if messages.is_empty() {
                    println!("No messages.");
                }
                messages.iter().for_each(print_message);
            })?;
        }
        MessageAction::Get { id } => {
            let message = app.messages.get_message_by_id(id).await?;
            out.emit(&message, print_message)?;
        }
        MessageAction::Last { chat } => {
            let message = app.messages.get_last_chat_message(chat).await?;
            out.emit(&message, |message| match message {
                Some(message) => print_message(message),
                None => println!("No messages."),
            })?;
        }
        MessageAction::Delete { id } => {
            app.messages.delete_message(id).await?;
            out.done(&format!("Deleted message {}", id));
        }
        MessageAction::Read { chat, user, at } => {
            let at = at.unwrap_or_else(Utc::now);
            app.messages.update_last_read_ts(chat, user, at).await?;
            out.done(&format!("Read position of {} in {} set to {}", user, chat, at.to_rfc3339()));
        }
        MessageAction::ReadStatus { chat, user } => {
            #[derive(Serialize)]
            struct ReadStatus {
                last_read_by_me: Option<DateTime<Utc>>,
                last_read_by_other: Option<DateTime<Utc>>,
            }

            let (mine, others) = tokio::try_join!(
                app.messages.get_last_read_ts(chat, user),
                app.messages.get_last_read_by_others(chat, user),
            )?;
            let status = ReadStatus {
                last_read_by_me: mine,
                last_read_by_other: others,
            };
            out.emit(&status, |status| {
                print_ts("read by me", status.last_read_by_me);
                print_ts("read by others", status.last_read_by_other);
            })?;
        }
        MessageAction::Unread { chat, user } => {
            let count = app.messages.get_num_unread_messages(chat, user).await?;
            out.emit(&count, |count| println!("{}", count))?;
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, path: Option<&Path>, out: &Output) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    match action {
        ConfigAction::Get { key } => {
            let config = Config::load_from(&path)?;
            let value = config.get(&key)?;
            out.emit(&value, |value| println!("{}", value))?;
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(&path)?;
            config.set(&key, &value)?;
            config.save_to(&path)?;
            out.done(&format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load_from(&path)?;
            let items = config.list()?;
            out.emit(&items, |items| {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
            })?;
        }
        ConfigAction::Reset => {
            Config::reset_at(&path)?;
            out.done("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let shown = path.display().to_string();
            out.emit(&shown, |shown| println!("{}", shown))?;
        }
    }
    Ok(())
}

async fn cmd_doctor(config: &Config, config_path: Option<&Path>, out: &Output) -> anyhow::Result<()> {
    let quiet = out.quiet;
    if !quiet {
        println!("Messenger Health Check");
        println!("======================");
        println!();
    }

    let mut all_ok = true;

    // Check configuration
    match config.validate() {
        Ok(()) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
        }
    }

    // Check config file location
    if !quiet {
        let path = match config_path {
            Some(path) => Ok(path.to_path_buf()),
            None => Config::config_path(),
        };
        match path {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    // Check database
    match Database::new(config.database.to_database_config()).await {
        Ok(db) => {
            match db.migration_status().await {
                Ok(status) if !status.needs_migration => {
                    if !quiet {
                        println!(
                            "[OK] Database: {} (schema v{})",
                            db.path().display(),
                            status.current_version
                        );
                        match db.stats().await {
                            Ok(stats) => println!(
                                "     {} chats, {} memberships, {} messages",
                                stats.chats, stats.memberships, stats.messages
                            ),
                            Err(e) => println!("[!!] Database stats: Error - {:#}", e),
                        }
                    }
                }
                Ok(status) => {
                    all_ok = false;
                    if !quiet {
                        println!(
                            "[!!] Database: schema v{} needs migration to v{}",
                            status.current_version, status.target_version
                        );
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: Error - {}", e);
                    }
                }
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Error - {:#}", e);
            }
        }
    }

    // Check directory service
    if !quiet {
        match &config.directory.base_url {
            Some(url) => println!("[OK] Directory: {}", url),
            None => {
                warn!("Directory service not configured");
                println!("[--] Directory: not configured (chat names of private chats stay blank)");
            }
        }
        println!("[OK] Uploads: {}", config.uploads.resolved_dir().display());
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed.");
        } else {
            println!("Some checks failed.");
        }
    }

    if !all_ok {
        anyhow::bail!("health check failed");
    }
    Ok(())
}
