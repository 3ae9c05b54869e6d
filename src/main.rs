use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use focusai::config::FocusConfig;
use focusai::core::chat::{ChatMessage, Conversation};
use focusai::core::overview::{
    CompletionStats, FocusTime, PriorityFilter, Score, TaskOverview, agenda, filter_active, matching,
    upcoming,
};
use focusai::core::task::{NewTask, Priority, Task, TaskId, TaskPatch, UserId};
use focusai::core::urgency::Urgency;
use focusai::session::{DemoSession, RemoteSession, Session};
use focusai::sync::coach::{CoachClient, ReplySource};
use focusai::sync::keyring;
use focusai::sync::store::{AttachmentStore, TaskStore};

#[derive(Parser)]
#[command(name = "focusai", version, about = "FocusAI tasks and coach from the terminal")]
struct Cli {
    /// Signed-in user identifier
    #[arg(long, global = true, env = "FOCUSAI_USER")]
    user: Option<String>,

    /// Access token issued by the auth provider
    #[arg(long, global = true, env = "FOCUSAI_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Work against an in-memory store seeded with sample tasks
    #[arg(long, global = true)]
    demo: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List active tasks
    List {
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        /// Case-insensitive title filter
        #[arg(long, default_value = "")]
        search: String,
        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },
    /// Create a task
    Add {
        title: String,
        #[arg(long)]
        due: NaiveDate,
        #[arg(long, value_parser = parse_priority, default_value = "medium")]
        priority: Priority,
        #[arg(long, default_value = "work")]
        category: String,
        /// Estimated minutes
        #[arg(long, default_value_t = 60)]
        estimate: u32,
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
    },
    /// Change fields of a task
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        estimate: Option<u32>,
    },
    /// Flip a task between done and not done
    Toggle { id: i64 },
    /// Set progress percentage
    Progress { id: i64, value: i64 },
    /// Delete a task
    Delete { id: i64 },
    /// Attach a file to a task
    Attach { id: i64, path: PathBuf },
    /// Completion stats and urgency buckets
    Overview {
        /// Date to treat as today
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Focus sprints completed so far
        #[arg(long, default_value_t = 0)]
        sprints: u32,
    },
    /// Ask the AI coach
    Coach {
        message: String,
        #[arg(long)]
        goal: Option<String>,
    },
    /// Manage the coach API key in the system keyring
    CoachKey {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    Set { key: String },
    Clear,
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse(s).map_err(|e| e.to_string())
}

fn init_logging(debug: bool) {
    // Journal logging (`journalctl --user -t focusai -f`). The focusai crate
    // logs at info, or debug when toggled; everything else at warn.
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("focusai") {
                let max = if focusai::debug_logging() { log::LevelFilter::Debug } else { log::LevelFilter::Info };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    focusai::set_debug_logging(debug);

    if debug && !systemd_journal_logger::connected_to_journal() {
        eprintln!("focusai: stderr is not the journal, logs go to `journalctl --user -t focusai`");
    }
    match systemd_journal_logger::JournalLog::new() {
        Ok(journal) => {
            let journal = journal.with_syslog_identifier("focusai".to_string());
            if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
                // Global max must be Debug so debug logs pass when toggled
                log::set_max_level(log::LevelFilter::Debug);
            }
        }
        Err(e) => eprintln!("focusai: journal logging unavailable: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = FocusConfig::load()?;
    init_logging(cli.debug || config.debug_logging);

    match cli.command {
        Command::CoachKey { action } => {
            match action {
                KeyAction::Set { key } => {
                    let client = CoachClient::new(Some(key.clone()), &config.coach_model, config.request_timeout())?;
                    client.check_key().await?;
                    keyring::store_api_key(&key).await?;
                    println!("Coach API key verified and stored.");
                }
                KeyAction::Clear => {
                    keyring::delete_api_key().await?;
                    println!("Coach API key removed.");
                }
            }
            return Ok(());
        }
        command => {
            let user = cli
                .user
                .clone()
                .or_else(|| config.user_id.clone())
                .unwrap_or_else(|| "demo-user@example.com".to_string());
            let user = UserId::new(user);

            if cli.demo {
                let session = DemoSession::demo(user).await?;
                run(&session, command, &config).await?;
                session.sign_out().await;
            } else {
                let session = RemoteSession::sign_in(&config, user, cli.token.clone()).await?;
                run(&session, command, &config).await?;
                session.sign_out().await;
            }
        }
    }

    Ok(())
}

async fn run<S: TaskStore, A: AttachmentStore>(
    session: &Session<S, A>,
    command: Command,
    config: &FocusConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let sync = session.tasks();
    let today = Local::now().date_naive();

    match command {
        Command::List { priority, search, all } => {
            let tasks = sync.tasks().await;
            let filter = priority.map(PriorityFilter::Only).unwrap_or_default();
            let shown = if all {
                agenda(&matching(&tasks, filter, &search))
            } else {
                upcoming(&filter_active(&tasks, filter, &search))
            };
            if shown.is_empty() {
                println!("No tasks.");
            }
            for task in &shown {
                println!("{}", format_task(task, today));
            }
        }
        Command::Add { title, due, priority, category, estimate, subtasks } => {
            let task = NewTask::new(title, due)?
                .priority(priority)
                .category(category)
                .time_estimate(estimate)
                .subtasks(subtasks);
            let created = sync.add_task(task).await?;
            println!("Added {}", format_task(&created, today));
        }
        Command::Edit { id, title, due, priority, category, estimate } => {
            let mut patch = TaskPatch::new();
            if let Some(title) = title {
                patch = patch.title(title)?;
            }
            if let Some(due) = due {
                patch = patch.due_date(due);
            }
            if let Some(priority) = priority {
                patch = patch.priority(priority);
            }
            if let Some(category) = category {
                patch = patch.category(category);
            }
            if let Some(estimate) = estimate {
                patch = patch.time_estimate(estimate);
            }
            let task = sync.update_task(TaskId(id), patch).await?;
            println!("Updated {}", format_task(&task, today));
        }
        Command::Toggle { id } => {
            let task = sync.toggle_complete(TaskId(id)).await?;
            println!("{}", format_task(&task, today));
        }
        Command::Progress { id, value } => {
            let task = sync.update_progress(TaskId(id), value).await?;
            println!("{}", format_task(&task, today));
        }
        Command::Delete { id } => {
            sync.delete_task(TaskId(id)).await?;
            println!("Deleted #{}", id);
        }
        Command::Attach { id, path } => {
            let bytes = tokio::fs::read(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());
            let task = sync.upload_file(TaskId(id), &name, bytes).await?;
            println!(
                "Attached {} -> {}",
                task.file_name.as_deref().unwrap_or_default(),
                task.file_url.as_deref().unwrap_or_default()
            );
        }
        Command::Overview { today: at, sprints } => {
            let today = at.unwrap_or(today);
            let overview = TaskOverview::build(&sync.tasks().await, today);
            print_stats(&overview.stats, FocusTime::from_sprints(sprints));
            println!(
                "Urgent (next 3 days): {}  This week: {}  Completed: {}",
                overview.deadlines.urgent, overview.deadlines.this_week, overview.deadlines.completed
            );
            for urgency in Urgency::ALL {
                let bucket = overview.bucket(urgency);
                if bucket.is_empty() {
                    continue;
                }
                println!("\n{} ({})", urgency, bucket.len());
                for task in bucket {
                    println!("  {}", format_task(task, today));
                }
            }
        }
        Command::Coach { message, goal } => {
            let key = match config.coach_api_key.clone() {
                Some(key) => Some(key),
                None => keyring::load_api_key().await.unwrap_or_else(|e| {
                    log::warn!("Could not read coach key from keyring: {}", e);
                    None
                }),
            };
            let coach = CoachClient::new(key, &config.coach_model, config.request_timeout())?;
            let mut conversation = Conversation::new();
            if let Some(goal) = goal {
                conversation.set_goal(goal);
            }
            let reply = coach
                .chat(&mut conversation, ChatMessage::user(message), &sync.tasks().await)
                .await;
            if reply.source == ReplySource::Fallback {
                println!("(offline coach)");
            }
            println!("{}", reply.text);
        }
        // Handled before sign-in.
        Command::CoachKey { .. } => {}
    }

    Ok(())
}

fn print_stats(stats: &CompletionStats, focus: FocusTime) {
    let score = Score::new(stats, focus);
    println!(
        "{} of {} tasks done ({}%)",
        stats.completed,
        stats.total,
        stats.percent()
    );
    println!(
        "Focus: {}h {}m  Points: {}  Level: {}",
        focus.minutes() / 60,
        focus.minutes() % 60,
        score.points,
        score.level
    );
}

fn format_task(task: &Task, today: NaiveDate) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!(
        "[{}] #{} {} ({}, {}) due {} [{}] {}",
        mark,
        task.id,
        task.title,
        task.priority,
        task.category,
        task.due_date,
        Urgency::classify(task.due_date, today),
        task.progress
    );
    if !task.subtasks().is_empty() {
        line.push_str(&format!(" | {}", task.subtasks().join(", ")));
    }
    if let Some(ref name) = task.file_name {
        line.push_str(&format!(" 📎 {}", name));
    }
    line
}
