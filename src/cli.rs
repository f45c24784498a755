//! CLI module
//!
//! This module provides the command-line interface for the tasker tool.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;

use crate::{
    api::{serve, Client, ClientConfig, ServerConfig},
    models::{TaskId, TaskNode, TaskStatus, TaskWithSubtasks, UserId},
    policy::{SchedulingPolicy, DEFAULT_DURATION_SECS},
    service::{RescheduleResponse, Service, ServiceConfig},
    store::{HttpStore, MemoryStore, StoreConfig, TaskStore},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(
        short,
        long,
        env = "TASKER_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tasker API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Base URL of the data-access service; tasks are kept in memory when omitted
        #[arg(long, env = "TASKER_STORE_URL", conflicts_with = "example")]
        store_url: Option<String>,

        /// Populate the in-memory store with an example task tree
        #[arg(long)]
        example: bool,

        /// Seconds a store write may take before the request fails
        #[arg(long, env = "TASKER_COMMIT_TIMEOUT_SECS", default_value_t = 30)]
        commit_timeout_secs: u64,

        /// Duration assumed for tasks without an estimate, in seconds
        #[arg(long, env = "TASKER_DEFAULT_DURATION_SECS", default_value_t = DEFAULT_DURATION_SECS)]
        default_duration_secs: i64,
    },

    /// Reschedule all open tasks of a user
    Reschedule {
        /// User whose tasks are rescheduled
        user: UserId,

        /// Start of the schedule (RFC 3339); defaults to now
        #[arg(short, long)]
        anchor: Option<DateTime<Utc>>,
    },

    /// Make a task a subtask of another
    Attach {
        parent: TaskId,
        child: TaskId,
    },

    /// Turn a subtask back into a root task
    Detach {
        parent: TaskId,
        child: TaskId,
    },

    /// Delete a task together with all of its subtasks
    Delete {
        id: TaskId,
    },

    /// Show a task and its subtasks
    Tree {
        id: TaskId,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            store_url,
            example,
            commit_timeout_secs,
            default_duration_secs,
        } => {
            tracing_subscriber::fmt().with_writer(io::stderr).init();

            let store: Arc<dyn TaskStore> = match store_url {
                Some(base_url) => {
                    println!("Using data-access service at {}", base_url);
                    Arc::new(HttpStore::new(StoreConfig {
                        base_url: base_url.clone(),
                        ..StoreConfig::default()
                    })?)
                }
                None if *example => {
                    println!("Populating in-memory store with an example task tree...");
                    Arc::new(MemoryStore::example(Utc::now())?)
                }
                None => Arc::new(MemoryStore::new()),
            };

            let service_config = ServiceConfig {
                commit_timeout: Duration::from_secs(*commit_timeout_secs),
                policy: SchedulingPolicy::with_default_duration_secs(*default_duration_secs)?,
            };

            println!("Starting tasker API server on port {}...", port);
            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };
            serve(Service::new(store, service_config), config).await?;
            Ok(())
        }

        Commands::Reschedule { user, anchor } => {
            let client = create_client(&cli.server);
            let response = client.reschedule(*user, *anchor).await?;
            print_schedule(&response);
            Ok(())
        }

        Commands::Attach { parent, child } => {
            let client = create_client(&cli.server);
            let task = client.attach(*parent, *child).await?;
            println!("Attached task {} \"{}\" under task {}", task.id(), task.title(), parent);
            Ok(())
        }

        Commands::Detach { parent, child } => {
            let client = create_client(&cli.server);
            if client.detach(*parent, *child).await? {
                println!("Detached task {} from task {}", child, parent);
            } else {
                println!("Task {} is not a subtask of task {}; nothing changed", child, parent);
            }
            Ok(())
        }

        Commands::Delete { id } => {
            let client = create_client(&cli.server);
            let deleted = client.delete_task(*id).await?;
            let ids: Vec<String> = deleted.iter().map(ToString::to_string).collect();
            println!("Deleted {} task(s): {}", deleted.len(), ids.join(", "));
            Ok(())
        }

        Commands::Tree { id } => {
            let client = create_client(&cli.server);
            let tree = client.subtree(*id).await?;
            print_task_tree(&tree, 0);
            Ok(())
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(server_url: &str) -> Client {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    Client::with_config(config)
}

fn format_window(task: &TaskNode) -> String {
    match task.planned_window() {
        Some((start, end)) => format!(
            "{} - {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%H:%M")
        ),
        None => "unscheduled".to_string(),
    }
}

fn print_schedule(response: &RescheduleResponse) {
    if response.scheduled.is_empty() {
        println!("Nothing to schedule");
        return;
    }

    println!("Schedule:");
    for task in &response.scheduled {
        let line = format!(
            "  [{}] {} {} (priority {:.2})",
            format_window(task),
            task.id(),
            task.title(),
            task.priority()
        );
        if response.overdue_ids.contains(&task.id()) {
            println!("{} {}", line.red(), "OVERDUE".red().bold());
        } else {
            println!("{}", line);
        }
    }

    if !response.overdue_ids.is_empty() {
        println!(
            "\n{} task(s) finish after their deadline",
            response.overdue_ids.len().to_string().red()
        );
    }
}

fn colored_status(status: TaskStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        TaskStatus::Pending => label.normal(),
        TaskStatus::InProgress => label.yellow(),
        TaskStatus::Completed => label.green(),
        TaskStatus::Failed => label.red(),
        TaskStatus::Cancelled => label.dimmed(),
    }
}

fn print_task_tree(node: &TaskWithSubtasks, indent: usize) {
    let task = &node.task;
    println!(
        "{}{} {} [{}] {}",
        "  ".repeat(indent),
        task.id().to_string().bold(),
        task.title(),
        colored_status(task.status()),
        format_window(task).dimmed()
    );
    for subtask in &node.subtasks {
        print_task_tree(subtask, indent + 1);
    }
}
