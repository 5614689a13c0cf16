//! # Course Reconciler CLI (`courserec`)
//!
//! ## Usage
//!
//! ```bash
//! courserec --config ./config/courserec.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `courserec init` | Create the SQLite database and run schema migrations |
//! | `courserec course create` | Register a course |
//! | `courserec course show <id>` | Print a course outline (`--json` for the editable document) |
//! | `courserec assignment add <course>` | Attach a quiz assignment to a unit |
//! | `courserec assignment list <course>` | List assignments and where they point |
//! | `courserec reconcile <course> --file <path>` | Save an edited outline |
//! | `courserec validate <course>` | Integrity report without changing anything |
//! | `courserec serve` | Start the HTTP server |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=debug`) to change the level.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use course_reconciler::{config, course_cmd, migrate, reconcile_cmd, server};

/// Course Reconciler CLI. Saves edited course outlines while keeping quiz
/// assignments attached.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/courserec.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "courserec",
    about = "Course Reconciler: save course outlines without losing quiz assignments",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/courserec.toml`.
    #[arg(long, global = true, default_value = "./config/courserec.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (courses, modules, lessons, units, assignments, course_locks).
    /// Safe to run repeatedly.
    Init,

    /// Manage courses.
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },

    /// Manage quiz assignments.
    Assignment {
        #[command(subcommand)]
        action: AssignmentAction,
    },

    /// Save an edited outline.
    ///
    /// Snapshots assignments, writes metadata, replaces the content tree
    /// with the chosen strategy, re-attaches assignments by title path and
    /// scores the result. Exits non-zero if content could not be replaced.
    Reconcile {
        /// Course ID.
        course: String,

        /// JSON submission (`{"metadata": {...}, "tree": [...]}`).
        #[arg(long)]
        file: PathBuf,

        /// `destructive` or `incremental`. Defaults to `[reconcile].default_strategy`.
        #[arg(long)]
        strategy: Option<String>,

        /// Reject the save if the stored outline no longer has this version.
        #[arg(long)]
        expect_version: Option<String>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Score the stored outline and list suggestions. Changes nothing.
    Validate {
        /// Course ID.
        course: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CourseAction {
    /// Register a new course.
    Create {
        /// Course ID (random UUID if omitted).
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        title: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Show a course and its outline.
    Show {
        /// Course ID.
        id: String,

        /// Print the editable JSON document instead.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AssignmentAction {
    /// Attach a quiz assignment to a unit.
    Add {
        /// Course ID.
        course: String,

        /// Unit ID the assignment points at.
        #[arg(long)]
        unit: String,

        #[arg(long)]
        title: String,

        /// Assignment ID (random UUID if omitted).
        #[arg(long)]
        id: Option<String>,
    },

    /// List a course's assignments with their title paths.
    List {
        /// Course ID.
        course: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Course { action } => match action {
            CourseAction::Create {
                id,
                title,
                description,
            } => {
                course_cmd::run_course_create(&cfg, id, &title, description).await?;
            }
            CourseAction::Show { id, json } => {
                course_cmd::run_course_show(&cfg, &id, json).await?;
            }
        },
        Commands::Assignment { action } => match action {
            AssignmentAction::Add {
                course,
                unit,
                title,
                id,
            } => {
                course_cmd::run_assignment_add(&cfg, &course, &unit, &title, id).await?;
            }
            AssignmentAction::List { course } => {
                course_cmd::run_assignment_list(&cfg, &course).await?;
            }
        },
        Commands::Reconcile {
            course,
            file,
            strategy,
            expect_version,
            json,
        } => {
            reconcile_cmd::run_reconcile(&cfg, &course, &file, strategy, expect_version, json)
                .await?;
        }
        Commands::Validate { course, json } => {
            reconcile_cmd::run_validate(&cfg, &course, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
