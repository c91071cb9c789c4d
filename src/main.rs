use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result};
use kanstore::{Category, CategoryPatch, Config, Persister, Store, Task, TaskPatch};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kanstore")]
#[command(about = "kanstore CLI - Kanban board store with JSON snapshot persistence")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snapshot file (overrides config)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every column with its tasks
    Show,

    /// Add a task to the end of a column
    Add {
        #[arg(short, long)]
        title: String,
        #[arg(short = 'C', long)]
        column: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Change fields of a task; omitted flags are left as they are
    Update {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        /// New description; pass an empty string to clear it
        #[arg(short, long)]
        description: Option<String>,
        /// New category id; pass an empty string to clear it
        #[arg(long)]
        category: Option<String>,
    },

    /// Move a task to a position in a column
    Move {
        id: String,
        #[arg(short = 'C', long)]
        column: String,
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        index: i64,
    },

    /// Delete a task
    Delete { id: String },

    /// Delete every task in a column
    Empty { column: String },

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Print the snapshot JSON to stdout
    Export,

    /// Keep the store open and persist periodically until stdin closes
    Run {
        /// Persist interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Add a category
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        color: String,
    },

    /// Rename or recolor a category
    Update {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        color: Option<String>,
    },

    /// List categories
    List,

    /// Delete a category and detach it from its tasks
    Delete { id: String },
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(snapshot) = cli.snapshot {
        config.snapshot_path = snapshot;
    }

    let store = Store::open(&config);

    match cli.command {
        Commands::Show => print_board(&store),
        Commands::Add {
            title,
            column,
            description,
            category,
        } => {
            let mut task = Task::new(title);
            task.description = description;
            task.category_id = category;
            let id = task.id.clone();
            store.add_task(task, &column).context("Failed to add task")?;
            println!("Added task {}", id.green());
        }
        Commands::Update {
            id,
            title,
            description,
            category,
        } => {
            let patch = TaskPatch {
                title,
                description: description.map(non_empty),
                category_id: category.map(non_empty),
            };
            if patch.is_empty() {
                eyre::bail!("Nothing to update; pass --title, --description or --category");
            }
            let task = store.update_task(&id, patch).context("Failed to update task")?;
            println!("Updated task {}", task.id.green());
        }
        Commands::Move { id, column, index } => {
            store.move_task(&id, &column, index).context("Failed to move task")?;
            let (column, position) = store.locate_task(&id)?;
            println!("Moved task {} to {}[{}]", id.green(), column.cyan(), position);
        }
        Commands::Delete { id } => {
            let task = store.delete_task(&id).context("Failed to delete task")?;
            println!("Deleted task {} ({})", task.id.red(), task.title);
        }
        Commands::Empty { column } => {
            let removed = store.empty_column(&column);
            println!("Removed {} task(s) from {}", removed, column.cyan());
        }
        Commands::Category(command) => run_category(&store, command)?,
        Commands::Export => {
            let snapshot = store.export_snapshot().stamped();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Run { interval } => {
            if let Some(secs) = interval {
                config.persist_interval = Duration::from_secs(secs.max(1));
            }
            run_persister(store, config.persist_interval)?;
            return Ok(());
        }
    }

    store.save_to_file();
    Ok(())
}

fn run_category(store: &Store, command: CategoryCommands) -> Result<()> {
    match command {
        CategoryCommands::Add { name, color } => {
            let category = Category::new(name, color);
            let id = category.id.clone();
            store.add_category(category);
            println!("Added category {}", id.green());
        }
        CategoryCommands::Update { id, name, color } => {
            let category = store
                .update_category(&id, CategoryPatch { name, color })
                .context("Failed to update category")?;
            println!("Updated category {} ({})", category.id.green(), category.name);
        }
        CategoryCommands::List => {
            for category in store.get_all_categories().values() {
                println!("{}  {} [{}]", category.id.dimmed(), category.name.bold(), category.color);
            }
        }
        CategoryCommands::Delete { id } => {
            let detached = store.delete_category(&id).context("Failed to delete category")?;
            println!("Deleted category {} ({} task(s) detached)", id.red(), detached);
        }
    }
    Ok(())
}

fn print_board(store: &Store) {
    let categories = store.get_all_categories();
    for (column, tasks) in store.serialize() {
        println!("{} ({})", column.bold().cyan(), tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let tag = task
                .category_id
                .as_ref()
                .and_then(|id| categories.get(id))
                .map(|c| format!(" [{}]", c.name).yellow().to_string())
                .unwrap_or_default();
            println!("  {:>2}. {}{}  {}", index, task.title, tag, task.id.dimmed());
            if let Some(description) = &task.description {
                println!("      {}", description.dimmed());
            }
        }
    }
}

fn run_persister(store: Store, interval: Duration) -> Result<()> {
    let store = Arc::new(store);
    let persister = Persister::spawn(Arc::clone(&store), interval).context("Failed to start persister")?;
    info!("Persisting every {}s; close stdin to stop", interval.as_secs());

    // Any input line forces an immediate flush
    for line in io::stdin().lock().lines() {
        line?;
        persister.flush_now();
    }

    persister.stop();
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
