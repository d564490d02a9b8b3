use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use chatwire::session::{Author, HistoryStore, JsonFileStore, Message};

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct HistoryCommand {
    #[clap(subcommand)]
    pub command: HistorySubcommand,
}

#[derive(Subcommand)]
pub enum HistorySubcommand {
    #[clap(about = "List stored messages")]
    List(ListArgs),

    #[clap(about = "Show one message in full")]
    Show(ShowArgs),

    #[clap(about = "Delete the stored history")]
    Clear(ClearArgs),

    #[clap(about = "Write the stored history as JSON")]
    Export(ExportArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of messages to display (most recent)"
    )]
    pub limit: usize,

    #[clap(long, short, help = "Filter by author (user, assistant)")]
    pub author: Option<String>,

    #[clap(long, help = "Show only user messages whose send failed")]
    pub failed: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Message ID (full UUID or unique prefix)")]
    pub id: String,
}

#[derive(Parser)]
pub struct ClearArgs {
    #[clap(long, short, help = "Do not ask for confirmation")]
    pub yes: bool,
}

#[derive(Parser)]
pub struct ExportArgs {
    #[clap(long, short, help = "Output file (stdout if omitted)")]
    pub output: Option<PathBuf>,
}

impl HistoryCommand {
    pub fn execute(&self, store: &JsonFileStore, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            HistorySubcommand::List(args) => Self::list(store, args, format),
            HistorySubcommand::Show(args) => Self::show(store, args, format),
            HistorySubcommand::Clear(args) => Self::clear(store, args, format),
            HistorySubcommand::Export(args) => Self::export(store, args),
        }
    }

    fn list(store: &JsonFileStore, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let messages = filter_messages(store.load()?, args)?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            }
            OutputFormat::Table => {
                if messages.is_empty() {
                    println!("No messages found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Author", "Provider", "Content", "Time"]);

                for message in &messages {
                    let content = match &message.error {
                        Some(error) => format!("{} [failed: {error}]", message.content),
                        None => message.content.clone(),
                    };
                    table.add_row([
                        truncate_string(&message.id.to_string(), 8),
                        message.author.to_string(),
                        message
                            .provider
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        truncate_string(&content, 60),
                        format_timestamp(&message.timestamp),
                    ]);
                }

                println!("{table}");
                println!("\nShowing {} messages", messages.len());
            }
        }

        Ok(())
    }

    fn show(store: &JsonFileStore, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let messages = store.load()?;
        let message = find_message(&messages, &args.id)?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(message)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID", &message.id.to_string()]);
                table.add_row(["Author", &message.author.to_string()]);
                table.add_row([
                    "Provider",
                    &message
                        .provider
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
                table.add_row(["Model", message.model.as_deref().unwrap_or("-")]);
                table.add_row(["Time", &message.timestamp.to_rfc3339()]);
                table.add_row(["Error", message.error.as_deref().unwrap_or("-")]);
                table.add_row(["Content", &message.content]);

                println!("{table}");
            }
        }

        Ok(())
    }

    fn clear(store: &JsonFileStore, args: &ClearArgs, format: OutputFormat) -> CliResult<()> {
        let count = store.load()?.len();

        if !args.yes && format == OutputFormat::Table && !confirm(count)? {
            println!("Aborted.");
            return Ok(());
        }

        store.clear()?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "path": store.path().display().to_string(),
                    "cleared": count,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Cleared {count} messages from {}", store.path().display());
            }
        }

        Ok(())
    }

    fn export(store: &JsonFileStore, args: &ExportArgs) -> CliResult<()> {
        let messages = store.load()?;
        let json = serde_json::to_string_pretty(&messages)?;

        match &args.output {
            Some(path) => {
                std::fs::write(path, json)?;
                eprintln!("Exported {} messages to {}", messages.len(), path.display());
            }
            None => println!("{json}"),
        }

        Ok(())
    }
}

fn confirm(count: usize) -> CliResult<bool> {
    use std::io::Write;

    print!("Delete {count} messages? [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Apply the list filters, keeping the most recent `limit` messages in order
fn filter_messages(mut messages: Vec<Message>, args: &ListArgs) -> CliResult<Vec<Message>> {
    let author = match args.author.as_deref() {
        Some("user") => Some(Author::User),
        Some("assistant") => Some(Author::Assistant),
        Some(a) => {
            return Err(CliError::UnknownAuthor(a.to_string()));
        }
        None => None,
    };

    if let Some(author) = author {
        messages.retain(|m| m.author == author);
    }
    if args.failed {
        messages.retain(|m| m.error.is_some());
    }

    let skip = messages.len().saturating_sub(args.limit);
    Ok(messages.split_off(skip))
}

/// Look a message up by full id or unique id prefix
fn find_message<'a>(messages: &'a [Message], id: &str) -> CliResult<&'a Message> {
    let id = id.to_lowercase();
    let found: Vec<&Message> = messages
        .iter()
        .filter(|m| m.id.to_string().starts_with(&id))
        .collect();

    match found.as_slice() {
        [message] => Ok(*message),
        [] => Err(CliError::MessageNotFound(id)),
        _ => Err(CliError::AmbiguousId(id)),
    }
}
