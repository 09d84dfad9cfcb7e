mod app;
mod render;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tasksync_core::Config;
use tasksync_services::{SyncOutcome, TaskFilter, Theme};

use crate::app::AppState;

#[derive(Parser)]
#[command(name = "tasksync", about = "Task list that syncs with a remote task service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and fetch tasks from the server
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "TASKSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and discard local tasks
    Logout,

    /// Show tasks
    List {
        #[arg(long, short, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,

        /// Replace local tasks with the server snapshot first
        #[arg(long)]
        sync: bool,
    },

    /// Add a task
    Add {
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Flip completion of one or more tasks (position or id)
    Toggle {
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Replace a task's text
    Edit {
        task: String,
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Delete a task
    Delete { task: String },

    /// Delete every completed task
    ClearCompleted,

    /// Clear all local tasks (server data is untouched)
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show or change the theme
    Theme {
        #[arg(value_enum)]
        choice: Option<ThemeArg>,
    },

    /// Fetch the server snapshot
    Sync,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Active,
    Completed,
}

impl From<FilterArg> for TaskFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => TaskFilter::All,
            FilterArg::Active => TaskFilter::Active,
            FilterArg::Completed => TaskFilter::Completed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
    Toggle,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = tasksync_core::init() {
        eprintln!("Error: {:#}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (config, _) = Config::load_validated()?;
    let mut app = AppState::new(config)?;

    let refresh = refreshes_first(&cli.command);
    let mut filter = TaskFilter::All;
    match cli.command {
        Commands::Login { email, password } => {
            if let Err(e) = app.login(&email, &password).await {
                bail!("Login failed: {}", e);
            }
            println!("Signed in as {}", email.trim());
        }
        Commands::Register {
            email,
            username,
            password,
        } => {
            if let Err(e) = app.register(&email, &password, &username).await {
                bail!("Registration failed: {}", e);
            }
            println!("Registered and signed in as {}", username.trim());
        }
        Commands::Logout => {
            app.logout();
            println!("Signed out");
            return Ok(());
        }
        Commands::List { filter: f, .. } => {
            if refresh {
                app.initialize().await;
            }
            filter = f.into();
        }
        Commands::Add { text } => {
            if !app.dispatch(app.engine().create(&text.join(" "))) {
                bail!("Task text cannot be empty");
            }
        }
        Commands::Toggle { tasks } => {
            for target in tasks {
                let id = target_id(&app, &target)?;
                app.dispatch(app.engine().toggle(&id));
            }
        }
        Commands::Edit { task, text } => {
            let id = target_id(&app, &task)?;
            if !app.dispatch(app.engine().edit(&id, &text.join(" "))) {
                bail!("Task text cannot be empty");
            }
        }
        Commands::Delete { task } => {
            let id = target_id(&app, &task)?;
            app.dispatch(app.engine().delete(&id));
        }
        Commands::ClearCompleted => {
            if !app.dispatch(app.engine().clear_completed()) {
                println!("No completed tasks");
            }
        }
        Commands::Reset { yes } => {
            if !app.engine().reset(yes) {
                bail!("Reset clears every local task; pass --yes to confirm");
            }
            println!("Local tasks cleared");
        }
        Commands::Theme { choice } => {
            let theme = match choice {
                Some(ThemeArg::Dark) => Some(Theme::Dark),
                Some(ThemeArg::Light) => Some(Theme::Light),
                Some(ThemeArg::Toggle) => Some(app.theme().toggled()),
                None => None,
            };
            if let Some(theme) = theme {
                app.set_theme(theme);
            }
            println!("{}", render::theme(app.theme()));
            return Ok(());
        }
        Commands::Sync => match app.initialize().await {
            SyncOutcome::Replaced { count } => println!("Synced {} task(s)", count),
            SyncOutcome::NothingToSync => println!("Server returned no task list"),
            SyncOutcome::NotAuthenticated => bail!("Not signed in"),
            SyncOutcome::SignedOut => bail!("Session expired; please sign in again"),
            SyncOutcome::Failed(_) | SyncOutcome::Superseded => {}
        },
    }

    app.shutdown().await;

    print!("{}", render::task_list(&app.tasks(), filter));
    if let Some(line) = render::notice(app.engine().notice().as_ref()) {
        println!("{}", line);
    }
    if let Some(reason) = app.session().last_error() {
        if !app.session().is_authenticated() {
            println!("! {}", reason);
        }
    }
    Ok(())
}

/// Runs work from the local mirror. Only `sync`, `list --sync`, and a fresh
/// login or registration replace it with the server snapshot.
fn refreshes_first(command: &Commands) -> bool {
    matches!(command, Commands::List { sync: true, .. })
}

fn target_id(app: &AppState, target: &str) -> Result<String> {
    match app.resolve_target(target) {
        Some(id) => Ok(id),
        None => bail!("No task matches '{}'", target),
    }
}
