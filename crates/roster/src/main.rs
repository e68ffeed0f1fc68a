use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use fastrace::collector::Config as FastraceConfig;
use fastrace::prelude::*;
use roster_config::{get_config_path, Config};
use roster_output::*;
use roster_registry::UserRegistry;
use roster_types::*;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod profiling;
mod script;

use profiling::{format_function_stats, CollectingReporter};

static PROFILING_ENABLED: AtomicBool = AtomicBool::new(false);

fn profile_start(name: &str) -> (Instant, &str) {
    (Instant::now(), name)
}

fn profile_end((start, name): (Instant, &str)) {
    if PROFILING_ENABLED.load(Ordering::Relaxed) {
        let elapsed = start.elapsed();
        eprintln!(
            "[profile] {:>8.2}ms  {}",
            elapsed.as_secs_f64() * 1000.0,
            name
        );
    }
}

const MAIN_HELP: &str = r#"Roster keeps an in-memory registry of users and answers questions about it.

Users have a name, an email address and one of three roles: admin, user or
moderator. Ids are assigned in order starting at 1.

The registry lives only as long as the process. Seed users listed in the
config file are added before every command, and `roster script` runs many
commands against one registry:

    roster script <<EOF
    add-user "Alice Smith" alice@example.com admin
    add-user "Bob Johnson" bob@gmail.com
    find-users --name ali
    report
    EOF

See `roster COMMAND --help` for command-specific options."#;

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = MAIN_HELP)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Output as JSON")]
    json: bool,

    #[arg(long, global = true, help = "Print timing information for profiling")]
    profile: bool,

    #[arg(
        long,
        global = true,
        env = "ROSTER_CONFIG",
        help = "Config file (default: ~/.config/roster/config.toml)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    #[command(about = "Add a user and print the created record.")]
    AddUser {
        #[arg(help = "Display name")]
        name: String,
        #[arg(help = "Email address")]
        email: String,
        #[arg(help = "Role: admin, user or moderator (default: user)")]
        role: Option<String>,
    },

    #[command(about = "Print users matching every given criterion.")]
    FindUsers {
        #[arg(long, help = "Exact user id")]
        id: Option<UserId>,
        #[arg(long, help = "Case-insensitive substring of the name")]
        name: Option<String>,
        #[arg(long, help = "Exact email address (case-sensitive)")]
        email: Option<String>,
        #[arg(long, help = "Exact role")]
        role: Option<Role>,
    },

    #[command(about = "Print role and email domain statistics.")]
    Report,

    #[command(about = "Run one command per line against a single registry.")]
    Script {
        #[arg(help = "Script file (default: stdin)")]
        file: Option<PathBuf>,
    },

    #[command(about = "Add the sample users and print their report.")]
    Demo,

    #[command(about = "Print config file location and contents.")]
    Config,
}

fn main() -> Result<()> {
    let total_start = profile_start("total");
    let cli = Cli::parse();

    if cli.profile {
        PROFILING_ENABLED.store(true, Ordering::Relaxed);
    }

    let config_path = cli.config.clone().unwrap_or_else(get_config_path);
    let config = Config::load_from(&config_path)?;
    init_logging(&config);

    let mut session = Session::new(config, cli.json);
    let result = if cli.profile {
        run_with_profiling(&mut session, cli.command, &config_path, cli.json)
    } else {
        dispatch(&mut session, cli.command, &config_path, cli.json)
    };

    profile_end(total_start);
    result
}

fn dispatch(
    session: &mut Session,
    command: Commands,
    config_path: &Path,
    json_output: bool,
) -> Result<()> {
    match command {
        Commands::Config => handle_config(&session.config, config_path, json_output),
        Commands::Script { file } => handle_script(session, file),
        command => session.run(command),
    }
}

/// Runs the command under a root span and prints per-function timings of
/// everything traced beneath it.
fn run_with_profiling(
    session: &mut Session,
    command: Commands,
    config_path: &Path,
    json_output: bool,
) -> Result<()> {
    let (reporter, collector) = CollectingReporter::new();
    fastrace::set_reporter(reporter, FastraceConfig::default());

    let result = {
        let root = Span::root("command", SpanContext::random());
        let _guard = root.set_local_parent();
        dispatch(session, command, config_path, json_output)
    };

    fastrace::flush();

    let functions = collector.collect_and_aggregate();
    if !functions.is_empty() {
        eprintln!("\n{}", format_function_stats(&functions));
    }
    result
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// One registry plus the settings every command shares.
pub(crate) struct Session {
    config: Config,
    registry: UserRegistry,
    json_output: bool,
}

impl Session {
    fn new(config: Config, json_output: bool) -> Self {
        let mut registry = UserRegistry::with_default_role(config.registry.default_role);
        for seed in &config.seed {
            let role = seed.role.unwrap_or(registry.default_role());
            registry.insert(seed.name.clone(), seed.email.clone(), role);
        }
        if !config.seed.is_empty() {
            debug!("Seeded registry with {} user(s)", registry.len());
        }

        Self {
            config,
            registry,
            json_output,
        }
    }

    #[trace]
    pub(crate) fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::AddUser { name, email, role } => self.handle_add_user(name, email, role),
            Commands::FindUsers {
                id,
                name,
                email,
                role,
            } => self.handle_find_users(Criteria {
                id,
                name,
                email,
                role,
            }),
            Commands::Report => self.handle_report(),
            Commands::Demo => self.handle_demo(),
            Commands::Config | Commands::Script { .. } => {
                Err(anyhow!("this command cannot be used inside a script"))
            }
        }
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json_output {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text(value));
        }
        Ok(())
    }

    fn handle_add_user(&mut self, name: String, email: String, role: Option<String>) -> Result<()> {
        let timer = profile_start("add-user");
        let user = self
            .registry
            .add_user(name, email, role.as_deref())?
            .clone();
        profile_end(timer);

        self.print(&AddUserResult { user }, format_add_user_result)
    }

    fn handle_find_users(&self, criteria: Criteria) -> Result<()> {
        let timer = profile_start("find-users");
        let users: Vec<User> = self
            .registry
            .find_users(&criteria)
            .into_iter()
            .cloned()
            .collect();
        profile_end(timer);

        self.print(&FindUsersResult { users }, format_find_users_result)
    }

    fn handle_report(&self) -> Result<()> {
        let timer = profile_start("report");
        let report = self
            .registry
            .report_with_limit(self.config.report.top_domains);
        profile_end(timer);

        self.print(&report, format_user_report)
    }

    fn handle_demo(&mut self) -> Result<()> {
        self.registry = UserRegistry::with_default_role(self.config.registry.default_role);
        for (name, email, role) in [
            ("Alice Smith", "alice@example.com", Role::Admin),
            ("Bob Johnson", "bob@gmail.com", Role::User),
            ("Carol Davis", "carol@example.com", Role::Moderator),
            ("David Wilson", "david@yahoo.com", Role::User),
        ] {
            self.registry.insert(name, email, role);
        }
        self.handle_report()
    }
}

fn handle_config(config: &Config, config_path: &Path, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Config file: {}", config_path.display());
    println!();

    if config_path.exists() {
        println!("{}", std::fs::read_to_string(config_path)?);
    } else {
        println!("(file does not exist, using defaults)");
        println!();
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

fn handle_script(session: &mut Session, file: Option<PathBuf>) -> Result<()> {
    let source = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read script {}: {}", path.display(), e))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    run_script(session, &source)
}

/// Runs every command line in `source`, carrying on past failures.
fn run_script(session: &mut Session, source: &str) -> Result<()> {
    let timer = profile_start("script");
    let mut failed = 0;
    let mut executed = 0;

    for (line_no, line) in script::lines(source) {
        executed += 1;
        let outcome = script::parse_line(line).and_then(|command| session.run(command));
        if let Err(e) = outcome {
            debug!("Script line {} failed: {}", line_no, e);
            eprintln!("line {}: {}", line_no, e);
            failed += 1;
        }
    }
    profile_end(timer);

    if failed > 0 {
        return Err(anyhow!("{} of {} script line(s) failed", failed, executed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEEDED: &str = r#"
[registry]
default_role = "moderator"

[[seed]]
name = "Alice Smith"
email = "alice@example.com"
role = "admin"

[[seed]]
name = "Bob Johnson"
email = "bob@gmail.com"
"#;

    fn seeded_session() -> Session {
        Session::new(Config::parse(SEEDED).unwrap(), false)
    }

    #[test]
    fn test_seed_users_use_configured_default_role() {
        let session = seeded_session();
        let roles: Vec<Role> = session.registry.iter().map(|u| u.role).collect();
        assert_eq!(roles, vec![Role::Admin, Role::Moderator]);
        assert_eq!(session.registry.next_id(), 3);
    }

    #[test]
    fn test_add_user_with_invalid_role_fails() {
        let mut session = seeded_session();
        let err = session
            .run(Commands::AddUser {
                name: "Mallory".to_string(),
                email: "mallory@example.com".to_string(),
                role: Some("superadmin".to_string()),
            })
            .unwrap_err();
        assert!(err.to_string().contains("invalid role 'superadmin'"));
        assert_eq!(session.registry.len(), 2);
        assert_eq!(session.registry.next_id(), 3);
    }

    #[test]
    fn test_add_user_without_role_uses_default() {
        let mut session = seeded_session();
        session
            .run(Commands::AddUser {
                name: "Carol Davis".to_string(),
                email: "carol@example.com".to_string(),
                role: None,
            })
            .unwrap();
        let carol = session.registry.get(3).unwrap();
        assert_eq!(carol.role, Role::Moderator);
    }

    #[test]
    fn test_demo_replaces_registry_with_sample_users() {
        let mut session = seeded_session();
        session.run(Commands::Demo).unwrap();

        let names: Vec<&str> = session.registry.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Alice Smith", "Bob Johnson", "Carol Davis", "David Wilson"]
        );
        assert_eq!(session.registry.next_id(), 5);
    }

    #[test]
    fn test_script_and_config_rejected_inside_script() {
        let mut session = seeded_session();
        assert!(session.run(Commands::Config).is_err());
        assert!(session.run(Commands::Script { file: None }).is_err());
    }

    #[test]
    fn test_script_continues_after_failed_line() {
        let mut session = Session::new(Config::default(), false);
        let source = r#"
# a bad role in the middle must not stop the script
add-user "Alice Smith" alice@example.com admin
add-user x y superadmin
add-user "Bob Johnson" bob@gmail.com
find-users --name ali
report
"#;

        let err = run_script(&mut session, source).unwrap_err();
        assert_eq!(err.to_string(), "1 of 5 script line(s) failed");

        let users: Vec<(UserId, &str, Role)> = session
            .registry
            .iter()
            .map(|u| (u.id, u.name.as_str(), u.role))
            .collect();
        assert_eq!(
            users,
            vec![(1, "Alice Smith", Role::Admin), (2, "Bob Johnson", Role::User)]
        );
    }

    #[test]
    fn test_script_without_failures_succeeds() {
        let mut session = Session::new(Config::default(), true);
        let source = "add-user A a@example.com\nreport\nfind-users --role user\n";
        run_script(&mut session, source).unwrap();
        assert_eq!(session.registry.len(), 1);
    }

    #[test]
    fn test_script_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "add-user A a@example.com").unwrap();
        writeln!(file, "add-user B b@example.com moderator").unwrap();

        let mut session = Session::new(Config::default(), false);
        handle_script(&mut session, Some(file.path().to_path_buf())).unwrap();
        assert_eq!(session.registry.len(), 2);
    }

    #[test]
    fn test_missing_script_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(Config::default(), false);
        let err = handle_script(&mut session, Some(dir.path().join("absent.txt"))).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read script"));
    }
}
