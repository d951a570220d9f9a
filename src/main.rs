use std::collections::BTreeMap;

use clap::{Parser, Subcommand};

use kanri::config::Config;
use kanri::core::graph::EdgeKind;
use kanri::core::task::{Priority, TaskId};
use kanri::store::{NewTask, TaskPatch};
use kanri::trigger::TriggerId;
use kanri::{Engine, Result};

/// Kanri - task dependency orchestration core
#[derive(Parser, Debug)]
#[command(name = "kanri")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    KANRI_DEBUG=1   Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.kanri/kanri.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Override the data directory holding the state snapshot
    #[arg(long)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a task from a natural-language description
    Add {
        /// The task description in natural language
        text: String,

        /// Extra free-form context considered during parsing
        #[arg(long)]
        context: Option<String>,
    },

    /// Create a task from explicit fields
    New {
        /// Task title
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// low, medium, high or critical
        #[arg(long)]
        priority: Option<Priority>,

        /// Estimated effort in hours
        #[arg(long)]
        hours: Option<f64>,
    },

    /// Update a task's status
    Status {
        /// Task ID
        task_id: String,

        /// pending, in_progress, blocked, completed or cancelled
        status: String,
    },

    /// Add a dependency between two tasks
    Dep {
        /// The dependent task ID
        task_id: String,

        /// The task it depends on
        depends_on: String,

        /// blocks, blocked_by or related
        #[arg(long, default_value = "blocked_by")]
        kind: EdgeKind,
    },

    /// Remove a dependency between two tasks
    Undep {
        task_id: String,
        depends_on: String,

        #[arg(long, default_value = "blocked_by")]
        kind: EdgeKind,
    },

    /// List tasks that are ready to start
    Ready,

    /// Compute the critical path (JSON output)
    Analyze,

    /// List all tasks
    List,

    /// Search tasks by substring
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show task statistics (JSON output)
    Stats,

    /// Dry-run the requirement parser (JSON output)
    Parse {
        text: String,

        #[arg(long)]
        context: Option<String>,
    },

    /// Create a workflow trigger for a task
    Trigger {
        /// Task ID
        task_id: String,

        /// Trigger type, e.g. codegen or webhook
        trigger_type: String,

        /// Configuration entries as key=value pairs
        #[arg(long = "config", value_name = "KEY=VALUE")]
        config: Vec<String>,
    },

    /// Cancel a pending workflow trigger
    CancelTrigger {
        /// Trigger ID
        trigger_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    kanri::log::init_with_debug(cli.debug);

    let mut config = Config::load()?;
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    let engine = Engine::open(&config)?;

    match cli.command {
        Command::Add { text, context } => {
            let parsed = engine.parse_natural_language(&text, context.as_deref());
            let task = engine.create_task_from_text(&text, context.as_deref())?;
            println!(
                "Created task {} [{}] priority={} complexity={}",
                task.id.short(),
                task.title,
                task.priority,
                parsed.complexity.score
            );
        }
        Command::New {
            title,
            description,
            priority,
            hours,
        } => {
            let task = engine.create_task(NewTask {
                title,
                description,
                priority,
                estimated_hours: hours,
                ..NewTask::default()
            })?;
            println!("Created task {} [{}]", task.id.short(), task.title);
        }
        Command::Status { task_id, status } => {
            let id = parse_task_id(&task_id)?;
            let status = status
                .parse()
                .map_err(|e: String| kanri::Error::validation("status", &e))?;
            let current = engine.get_task(&id)?;
            let updated = engine.update_task(
                &id,
                current.version,
                TaskPatch {
                    status: Some(status),
                    ..TaskPatch::default()
                },
            )?;
            println!("Task {} is now {}", updated.id.short(), updated.status);
        }
        Command::Dep {
            task_id,
            depends_on,
            kind,
        } => {
            let task = parse_task_id(&task_id)?;
            let depends = parse_task_id(&depends_on)?;
            let edge = engine.add_dependency(&task, &depends, kind)?;
            println!(
                "Added dependency: {} {} {}",
                edge.from.short(),
                edge.kind,
                edge.to.short()
            );
        }
        Command::Undep {
            task_id,
            depends_on,
            kind,
        } => {
            let task = parse_task_id(&task_id)?;
            let depends = parse_task_id(&depends_on)?;
            if engine.remove_dependency(&task, &depends, kind)? {
                println!("Dependency removed");
            } else {
                println!("No such dependency");
            }
        }
        Command::Ready => {
            let ready = engine.get_ready_tasks();
            if ready.is_empty() {
                println!("No ready tasks");
            }
            for task in ready {
                println!("{}  {}  [{}]", task.id.short(), task.priority, task.title);
            }
        }
        Command::Analyze => {
            let analysis = engine.analyze_dependencies();
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::List => {
            for task in engine.list_tasks() {
                println!(
                    "{}  {:<12} {:<8} [{}]",
                    task.id.short(),
                    task.status.to_string(),
                    task.priority.to_string(),
                    task.title
                );
            }
        }
        Command::Search { query, limit } => {
            for task in engine.search_tasks(&query, limit) {
                println!("{}  [{}]", task.id.short(), task.title);
            }
        }
        Command::Stats => {
            let stats = engine.get_task_statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Parse { text, context } => {
            let parsed = engine.parse_natural_language(&text, context.as_deref());
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Command::Trigger {
            task_id,
            trigger_type,
            config,
        } => {
            let id = parse_task_id(&task_id)?;
            let mut configuration = BTreeMap::new();
            for entry in config {
                match entry.split_once('=') {
                    Some((key, value)) => {
                        configuration.insert(key.to_string(), value.to_string());
                    }
                    None => {
                        return Err(kanri::Error::validation(
                            "config",
                            "expected KEY=VALUE",
                        ))
                    }
                }
            }
            let created =
                engine.create_workflow_trigger(&id, trigger_type.as_str().into(), configuration)?;
            if created.already_exists {
                println!(
                    "Trigger already active: {} ({})",
                    created.trigger.id.short(),
                    created.trigger.status
                );
            } else {
                println!("Created trigger {}", created.trigger.id.short());
            }
        }
        Command::CancelTrigger { trigger_id } => {
            let id = TriggerId(
                trigger_id
                    .parse()
                    .map_err(|_| kanri::Error::validation("trigger_id", "not a valid UUID"))?,
            );
            let cancelled = engine.cancel_trigger(&id)?;
            println!("Trigger {} cancelled", cancelled.id.short());
        }
    }

    engine.save()?;
    Ok(())
}

fn parse_task_id(raw: &str) -> Result<TaskId> {
    raw.parse()
        .map_err(|_| kanri::Error::validation("task_id", "not a valid UUID"))
}
