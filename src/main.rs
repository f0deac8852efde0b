use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use std::process;
use todostore::{
    BackendKind, Config, ListQuery, NewTask, Page, Priority, SortKey, Task, TaskFilter, TaskStatus, TaskStore,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Todo list manager - tasks with priorities, tags and due dates")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Task file (default: from config, else tasks.json / tasks.db)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Storage backend
    #[arg(short, long, global = true, value_enum)]
    backend: Option<BackendKind>,

    /// Config file (default: <config dir>/todostore/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// pending or completed
    #[arg(short, long)]
    status: Option<String>,

    /// high, medium or low
    #[arg(short, long)]
    priority: Option<String>,

    /// Exact tag
    #[arg(short, long)]
    tag: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        description: String,

        /// high, medium or low (default: medium)
        #[arg(short, long)]
        priority: Option<String>,

        /// Tag to attach; repeat or separate with commas
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Due date, YYYY-MM-DD
        #[arg(short, long)]
        due: Option<String>,
    },

    /// List tasks
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// id, description, priority, due_date or status
        #[arg(long)]
        sort: Option<String>,

        #[arg(short, long)]
        reverse: bool,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Change a task's description
    Update { id: u64, description: String },

    /// Delete a task
    Delete { id: u64 },

    /// Mark a task complete
    Done { id: u64 },

    /// Mark a task pending again
    Reopen { id: u64 },

    /// Flip a task between pending and completed
    Toggle { id: u64 },

    /// Set a task's priority
    Priority { id: u64, priority: String },

    /// Add, remove or replace tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Set or clear a task's due date
    Due {
        id: u64,

        /// YYYY-MM-DD
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        date: Option<String>,

        #[arg(long)]
        clear: bool,
    },

    /// Search descriptions and tags (case-insensitive)
    Search { keyword: String },

    /// Show tasks matching every given filter
    Filter {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show all tasks sorted by a key
    Sort {
        /// id, description, priority, due_date or status
        #[arg(default_value = "id")]
        key: String,

        #[arg(short, long)]
        reverse: bool,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// Add tags to a task
    Add {
        id: u64,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a task
    Remove {
        id: u64,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Replace every tag on a task; no tags clears them
    Set { id: u64, tags: Vec<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(file) = cli.file {
        config.data_file = Some(file);
    }

    let path = config.data_file();
    let mut store = match config.backend {
        BackendKind::Json => TaskStore::open_json(&path),
        BackendKind::Sqlite => TaskStore::open_sqlite(&path),
    };
    report_warnings(&mut store);

    let result = run(cli.command, &mut store, &config);
    report_warnings(&mut store);

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands, store: &mut TaskStore, config: &Config) -> Result<()> {
    match command {
        Commands::Add {
            description,
            priority,
            tags,
            due,
        } => {
            let id = store.add(NewTask {
                description,
                priority,
                tags: split_tags(&tags),
                due_date: due,
            })?;
            println!("{} Task {} added", "✓".green(), id);
        }
        Commands::List {
            filter,
            sort,
            reverse,
            offset,
            limit,
        } => {
            let sort = match sort {
                Some(key) => key.parse::<SortKey>()?,
                None => config.sort_key()?,
            };
            let query = ListQuery {
                filter: filter.into_filter()?,
                sort,
                reverse,
                page: Page::new(offset, limit.unwrap_or(config.default_limit)),
            };
            print_tasks("Current Tasks", &store.list(&query));
        }
        Commands::Update { id, description } => {
            store.update_description(id, &description)?;
            println!("Task {} updated", id);
        }
        Commands::Delete { id } => {
            let task = store.delete(id)?;
            println!("Task {} deleted ({})", id, task.description);
        }
        Commands::Done { id } => {
            store.mark_complete(id)?;
            println!("{} Task {} marked as complete", "✓".green(), id);
        }
        Commands::Reopen { id } => {
            store.set_status(id, TaskStatus::Pending)?;
            println!("Task {} marked as pending", id);
        }
        Commands::Toggle { id } => {
            let status = store.toggle_status(id)?;
            println!("Task {} marked as {}", id, status);
        }
        Commands::Priority { id, priority } => {
            store.set_priority(id, &priority)?;
            println!("Task {} priority set to {}", id, priority.trim().to_lowercase());
        }
        Commands::Tag { action } => match action {
            TagAction::Add { id, tags } => {
                store.add_tags(id, split_tags(&tags).as_slice())?;
                println!("Tags added to task {}", id);
            }
            TagAction::Remove { id, tags } => {
                store.remove_tags(id, split_tags(&tags).as_slice())?;
                println!("Tags removed from task {}", id);
            }
            TagAction::Set { id, tags } => {
                store.set_tags(id, split_tags(&tags).as_slice())?;
                println!("Tags replaced on task {}", id);
            }
        },
        Commands::Due { id, date, clear } => {
            if clear {
                store.clear_due_date(id)?;
                println!("Due date cleared for task {}", id);
            } else {
                let date = date.ok_or_else(|| eyre!("A date or --clear is required"))?;
                store.set_due_date(id, &date)?;
                println!("Due date set for task {}", id);
            }
        }
        Commands::Search { keyword } => {
            if keyword.trim().is_empty() {
                return Err(eyre!("Search keyword cannot be empty"));
            }
            let results = store.search(&keyword);
            print_tasks(&format!("{} task(s) matching '{}'", results.len(), keyword), &results);
        }
        Commands::Filter { filter } => {
            let results = store.filter(&filter.into_filter()?);
            print_tasks(&format!("{} task(s)", results.len()), &results);
        }
        Commands::Sort { key, reverse } => {
            let key: SortKey = key.parse()?;
            print_tasks(&format!("Tasks sorted by {}", key), &store.sort(key, reverse));
        }
    }

    Ok(())
}

impl FilterArgs {
    fn into_filter(self) -> Result<TaskFilter> {
        Ok(TaskFilter {
            status: self.status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
            priority: self.priority.as_deref().map(str::parse::<Priority>).transpose()?,
            tag: self.tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        })
    }
}

/// Accept both `-t a -t b` and `-t a,b`
fn split_tags(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn report_warnings(store: &mut TaskStore) {
    for warning in store.take_warnings() {
        eprintln!("{} {}", "Warning:".yellow().bold(), warning);
    }
}

fn print_tasks(heading: &str, tasks: &[&Task]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let rule = "=".repeat(80);
    println!("{}", rule);
    println!("{}", heading.bold());
    println!("{}", rule);
    for task in tasks {
        println!("{}", format_task(task));
    }
    println!("{}", rule);
}

fn format_task(task: &Task) -> String {
    let status = if task.is_completed() {
        "✓".green()
    } else {
        "○".normal()
    };
    let priority = match task.priority {
        Priority::High => "●".red(),
        Priority::Medium => "●".yellow(),
        Priority::Low => "●".green(),
    };
    let description = if task.is_completed() {
        task.description.dimmed()
    } else {
        task.description.normal()
    };

    let mut line = format!("  {} {} ID: {:3} | {}", status, priority, task.id, description);
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        line.push_str(&format!(" [{}]", tags.join(", ")).cyan().to_string());
    }
    if let Some(due) = task.due_date {
        line.push_str(&format!(" | Due: {}", due));
    }
    line
}
