//! lifeledger - tasks, mood journal and expenses from the terminal
//!
//! Every command opens the store, applies at most one change, refreshes
//! streak and achievement state, and announces anything newly unlocked.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use lifeledger_core::analytics::{
    record_theme_toggle, refresh_profile, AchievementDefinition, Clock, Dashboard, SystemClock,
};
use lifeledger_core::config::AnalyticsConfig;
use lifeledger_core::snapshot::{self, ImportMode};
use lifeledger_core::{
    Category, Config, Database, EventStore, Mood, MoodEntry, Priority, Record, StaticIdentity,
    Task, Transaction,
};

#[derive(Parser, Debug)]
#[command(name = "lifeledger")]
#[command(about = "Tasks, mood journal and expenses with streaks and analytics")]
#[command(version)]
struct Cli {
    /// Act as this user (default: [storage] user from config, else guest)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Database file to use instead of the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Log and review moods
    #[command(subcommand)]
    Mood(MoodCommand),

    /// Track income and spending
    #[command(subcommand)]
    Expense(ExpenseCommand),

    /// Display theme
    #[command(subcommand)]
    Theme(ThemeCommand),

    /// Show productivity, mood and expense statistics
    Dashboard {
        /// Print the dashboard as JSON
        #[arg(long)]
        json: bool,
    },

    /// List achievements and progress
    Achievements,

    /// Write a JSON backup of all records
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore records from a JSON backup
    Import {
        /// Snapshot file written by `export`
        file: PathBuf,

        /// merge (keep existing, incoming wins by id) or replace
        #[arg(long, default_value = "merge")]
        mode: ImportMode,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Add a task
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// low, medium or high
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Mark a task complete
    Done { id: String },
    /// Reopen a completed task
    Reopen { id: String },
    /// Delete a task
    Rm { id: String },
    /// List tasks
    List {
        /// Only open tasks
        #[arg(long)]
        open: bool,
    },
}

#[derive(Subcommand, Debug)]
enum MoodCommand {
    /// Log a mood (terrible, bad, okay, good, great or 1-5)
    Log {
        mood: Mood,
        /// Day the mood is for (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        note: Option<String>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Replace the entry already logged for that day
        #[arg(long)]
        overwrite: bool,
    },
    /// List logged moods, newest first
    List,
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    /// Record a transaction
    Add {
        amount: f64,
        /// income, food, transport, shopping, entertainment, bills, health, education, other
        category: Category,
        /// Day of the transaction (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a transaction
    Rm { id: String },
    /// List transactions, newest first
    List,
}

#[derive(Subcommand, Debug)]
enum ThemeCommand {
    /// Switch between light and dark
    Toggle,
}

struct App {
    store: Arc<EventStore>,
    analytics: AnalyticsConfig,
    clock: SystemClock,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        lifeledger_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.resolved_database_path());
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let identity = match cli.user.clone().or_else(|| config.storage.user.clone()) {
        Some(user) => StaticIdentity::user(user),
        None => StaticIdentity::guest(),
    };
    let store = Arc::new(EventStore::open(Arc::new(db), Arc::new(identity)));
    tracing::debug!(owner = %store.owner(), db = %db_path.display(), "Store opened");

    let app = App {
        store,
        analytics: config.analytics,
        clock: SystemClock,
    };

    match cli.command {
        Command::Task(cmd) => app.task(cmd)?,
        Command::Mood(cmd) => app.mood(cmd)?,
        Command::Expense(cmd) => app.expense(cmd)?,
        Command::Theme(ThemeCommand::Toggle) => {
            let unlocked = record_theme_toggle(&app.store, &app.analytics, &app.clock)
                .context("failed to record theme toggle")?;
            let toggles = app.store.profile()?.theme_toggles;
            let theme = if toggles % 2 == 1 { "dark" } else { "light" };
            println!("Theme: {}", theme);
            announce(&unlocked);
        }
        Command::Dashboard { json } => app.dashboard(json)?,
        Command::Achievements => app.achievements()?,
        Command::Export { output } => app.export(output)?,
        Command::Import { file, mode } => app.import(&file, mode)?,
    }

    if app.store.is_stale() {
        eprintln!("warning: some changes could not be saved; see the log for details");
    }

    Ok(())
}

impl App {
    fn owner(&self) -> String {
        self.store.owner()
    }

    /// Refresh streak and achievements after a change and print unlocks.
    fn after_change(&self) -> Result<()> {
        let unlocked = refresh_profile(&self.store, &self.analytics, &self.clock)
            .context("failed to update achievements")?;
        announce(&unlocked);
        Ok(())
    }

    fn task(&self, cmd: TaskCommand) -> Result<()> {
        match cmd {
            TaskCommand::Add {
                title,
                description,
                priority,
                due,
            } => {
                let mut task = Task::new(&self.owner(), &title, self.clock.now());
                task.description = description;
                task.priority = priority;
                task.due_date = due;
                let id = task.id.clone();
                self.store.append(task).context("failed to add task")?;
                println!("Added task {}", short_id(&id));
            }
            TaskCommand::Done { id } => {
                let id = resolve_id::<Task>(&self.store, &id)?;
                let now = self.clock.now();
                let task = self.store.modify::<Task>(&id, |t| t.complete(now))?;
                println!("Completed: {}", task.title);
            }
            TaskCommand::Reopen { id } => {
                let id = resolve_id::<Task>(&self.store, &id)?;
                let task = self.store.modify::<Task>(&id, Task::reopen)?;
                println!("Reopened: {}", task.title);
            }
            TaskCommand::Rm { id } => {
                let id = resolve_id::<Task>(&self.store, &id)?;
                self.store.remove_by_id::<Task>(&id)?;
                println!("Removed task {}", short_id(&id));
            }
            TaskCommand::List { open } => {
                let today = self.clock.today();
                let tasks = self.store.get_all::<Task>()?;
                let shown: Vec<&Task> = tasks.iter().filter(|t| !open || !t.completed).collect();
                if shown.is_empty() {
                    println!("No tasks.");
                }
                for task in shown {
                    let mark = if task.completed { "x" } else { " " };
                    let due = match task.due_date {
                        Some(due) if task.is_overdue(today) => format!("  due {} (overdue)", due),
                        Some(due) => format!("  due {}", due),
                        None => String::new(),
                    };
                    println!(
                        "[{}] {}  {:<6} {}{}",
                        mark,
                        short_id(&task.id),
                        task.priority.as_str(),
                        task.title,
                        due
                    );
                }
                return Ok(());
            }
        }
        self.after_change()
    }

    fn mood(&self, cmd: MoodCommand) -> Result<()> {
        match cmd {
            MoodCommand::Log {
                mood,
                date,
                note,
                tags,
                overwrite,
            } => {
                let date = date.unwrap_or_else(|| self.clock.today());
                match self.store.mood_for_date(date)? {
                    Some(existing) if !overwrite => {
                        anyhow::bail!(
                            "Mood already logged for {} ({} {}); use --overwrite to replace it",
                            date,
                            existing.mood.emoji(),
                            existing.mood
                        );
                    }
                    Some(existing) => {
                        self.store.modify::<MoodEntry>(&existing.id, |entry| {
                            entry.mood = mood;
                            entry.note = note;
                            entry.tags = tags;
                        })?;
                        println!("Updated mood for {}: {} {}", date, mood.emoji(), mood);
                    }
                    None => {
                        let mut entry = MoodEntry::new(&self.owner(), date, mood, self.clock.now());
                        entry.note = note;
                        entry.tags = tags;
                        self.store.append(entry).context("failed to log mood")?;
                        println!("Logged mood for {}: {} {}", date, mood.emoji(), mood);
                    }
                }
            }
            MoodCommand::List => {
                let mut moods = self.store.get_all::<MoodEntry>()?;
                moods.sort_by(|a, b| b.date.cmp(&a.date));
                if moods.is_empty() {
                    println!("No moods logged.");
                }
                for entry in moods {
                    let note = entry.note.as_deref().unwrap_or("");
                    println!("{}  {} {:<8} {}", entry.date, entry.mood.emoji(), entry.mood, note);
                }
                return Ok(());
            }
        }
        self.after_change()
    }

    fn expense(&self, cmd: ExpenseCommand) -> Result<()> {
        match cmd {
            ExpenseCommand::Add {
                amount,
                category,
                date,
                description,
            } => {
                if !amount.is_finite() {
                    anyhow::bail!("Amount must be a number");
                }
                let date = date.unwrap_or_else(|| self.clock.today());
                let mut tx =
                    Transaction::new(&self.owner(), category, amount, date, self.clock.now());
                tx.description = description;
                let id = tx.id.clone();
                self.store.append(tx).context("failed to add transaction")?;
                println!("Added {} {:.2} ({})", category, amount.abs(), short_id(&id));
            }
            ExpenseCommand::Rm { id } => {
                let id = resolve_id::<Transaction>(&self.store, &id)?;
                self.store.remove_by_id::<Transaction>(&id)?;
                println!("Removed transaction {}", short_id(&id));
            }
            ExpenseCommand::List => {
                let mut transactions = self.store.get_all::<Transaction>()?;
                transactions.sort_by(|a, b| b.date.cmp(&a.date));
                if transactions.is_empty() {
                    println!("No transactions.");
                }
                for tx in transactions {
                    println!(
                        "{}  {}  {:<13} {:>10.2}  {}",
                        tx.date,
                        short_id(&tx.id),
                        tx.category,
                        tx.signed_amount(),
                        tx.description.as_deref().unwrap_or("")
                    );
                }
                return Ok(());
            }
        }
        self.after_change()
    }

    fn compute_dashboard(&self) -> Result<Dashboard> {
        refresh_profile(&self.store, &self.analytics, &self.clock)?;
        Ok(Dashboard::compute(
            &self.store.data()?,
            &self.store.profile()?,
            self.clock.today(),
            &self.analytics,
            self.store.is_stale(),
        ))
    }

    fn dashboard(&self, json: bool) -> Result<()> {
        let dashboard = self.compute_dashboard()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        } else {
            print_dashboard(&dashboard);
        }
        Ok(())
    }

    fn achievements(&self) -> Result<()> {
        let dashboard = self.compute_dashboard()?;
        println!(
            "Level {}  ({} XP, {} to next level)",
            dashboard.level.level, dashboard.level.xp, dashboard.level.xp_to_next_level
        );
        println!(
            "{}/{} achievements unlocked",
            dashboard.unlocked_count(),
            dashboard.achievements.len()
        );
        println!();
        for status in &dashboard.achievements {
            let def = &status.definition;
            if status.progress.unlocked {
                let when = status
                    .progress
                    .unlocked_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("  {} {:<20} unlocked {}", def.icon, def.name, when);
            } else {
                println!(
                    "  {} {:<20} {}/{}  {}",
                    def.icon,
                    def.name,
                    status.progress.progress.min(def.target),
                    def.target,
                    def.description
                );
            }
        }
        Ok(())
    }

    fn export(&self, output: Option<PathBuf>) -> Result<()> {
        let json = snapshot::export(&self.store, self.clock.now())?.to_json()?;
        match output {
            Some(path) => {
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Exported to {}", path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }

    fn import(&self, file: &Path, mode: ImportMode) -> Result<()> {
        let json = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let report = snapshot::import(&self.store, &json, mode).context("import failed")?;
        println!(
            "Imported {} tasks, {} moods, {} transactions ({})",
            report.tasks,
            report.moods,
            report.transactions,
            mode.as_str()
        );
        if report.excluded > 0 {
            println!("Skipped {} malformed records", report.excluded);
        }
        self.after_change()
    }
}

/// Accept a full id or an unambiguous prefix of one.
fn resolve_id<R: Record>(store: &EventStore, id: &str) -> Result<String> {
    let records = store.get_all::<R>()?;
    if records.iter().any(|r| r.id() == id) {
        return Ok(id.to_string());
    }

    let matches: Vec<&R> = records.iter().filter(|r| r.id().starts_with(id)).collect();
    match matches.as_slice() {
        [] => anyhow::bail!("No {} record matching '{}'", R::COLLECTION, id),
        [one] => Ok(one.id().to_string()),
        _ => anyhow::bail!(
            "'{}' matches {} {} records; use more characters",
            id,
            matches.len(),
            R::COLLECTION
        ),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn announce(unlocked: &[&AchievementDefinition]) {
    for def in unlocked {
        println!(
            "🏆 Achievement unlocked: {} {} (+{} XP)",
            def.icon, def.name, def.reward_xp
        );
    }
}

fn print_dashboard(dashboard: &Dashboard) {
    let title = format!("LIFELEDGER  {}", dashboard.date);
    println!();
    println!("╭{}╮", "─".repeat(50));
    println!("│{:^50}│", title);
    println!("╰{}╯", "─".repeat(50));
    println!();

    let p = &dashboard.productivity;
    println!("📋 TASKS");
    println!(
        "   Total: {:<6} Done: {:<6} Pending: {:<6} Overdue: {}",
        p.total, p.completed, p.pending, p.overdue
    );
    println!(
        "   Completion: {:.0}%   Done today: {}",
        p.completion_rate, p.completed_today
    );
    println!(
        "   Last {} days: {}",
        p.daily_completions.len(),
        sparkline(p.daily_completions.iter().map(|pt| pt.value))
    );
    println!();

    println!("🔥 STREAK");
    println!(
        "   Current: {} days   Longest: {} days",
        dashboard.streak.current, dashboard.streak.longest
    );
    println!(
        "   Level {} ({} XP, {} to next)",
        dashboard.level.level, dashboard.level.xp, dashboard.level.xp_to_next_level
    );
    println!();

    let m = &dashboard.mood;
    println!("🙂 MOOD");
    match m.average {
        Some(avg) => println!("   Entries: {:<6} Average: {:.1}", m.entries, avg),
        None => println!("   No moods logged yet"),
    }
    if let Some(mood) = m.most_frequent {
        println!("   Most frequent: {} {}", mood.emoji(), mood);
    }
    println!(
        "   Trend: {} {} ({:.1} vs {:.1})",
        m.trend.trend.arrow(),
        m.trend.trend.as_str(),
        m.trend.recent_mean,
        m.trend.previous_mean
    );
    println!();

    let e = &dashboard.expenses;
    println!("💰 MONEY");
    println!(
        "   Income: {:.2}   Expenses: {:.2}   Balance: {:.2}",
        e.total_income, e.total_expense, e.balance
    );
    println!(
        "   This month: +{:.2} / -{:.2}",
        e.month_income, e.month_expense
    );
    for slice in e.breakdown.iter().take(5) {
        println!(
            "   {:<13} {:>10.2}  {:>3}%",
            slice.category,
            slice.amount,
            slice.rounded_percentage()
        );
    }
    println!();

    println!(
        "🏆 {}/{} achievements unlocked",
        dashboard.unlocked_count(),
        dashboard.achievements.len()
    );
    if dashboard.stale {
        println!();
        println!("⚠ Some data could not be loaded or saved; numbers may be out of date.");
    }
    println!();
}

fn sparkline(values: impl Iterator<Item = f64>) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let values: Vec<f64> = values.collect();
    let max = values.iter().copied().fold(0.0, f64::max);
    values
        .iter()
        .map(|v| {
            if max <= 0.0 {
                BARS[0]
            } else {
                let idx = ((v / max) * (BARS.len() - 1) as f64).round() as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect()
}
