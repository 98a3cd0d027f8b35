//! Manuscript CLI - inspect and seed novel project databases

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use manuscript::config::{self, ManuscriptConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "manuscript")]
#[command(version)]
#[command(about = "Typed object-graph store for novel projects")]
#[command(long_about = r#"
Manuscript keeps a self-describing schema (element, field, value and project
types) and the instance data typed by it in a single SQLite file.

Example usage:
  manuscript init --database moby.db --author ada
  manuscript add-type field title --allowed string --max 1
  manuscript add-type element chapter --child title
  manuscript types
  manuscript show 1 --json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Path to manuscript.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the project database and its root project
    Init {
        /// Author stamped on every save
        #[arg(short, long)]
        author: Option<String>,

        /// Also write manuscript.toml
        #[arg(long)]
        write_config: bool,

        /// Overwrite an existing manuscript.toml
        #[arg(long)]
        force: bool,
    },

    /// Show row counts per kind
    Stats,

    /// List the schema
    Types,

    /// Create a named schema node
    AddType {
        kind: TypeKind,

        name: String,

        /// Child type names, in order (field types of an element or project
        /// type, value types of a field type)
        #[arg(short, long = "child")]
        children: Vec<String>,

        /// Allowed value kinds of a field type, in preference order
        #[arg(long)]
        allowed: Vec<String>,

        /// Minimum number of values (field types)
        #[arg(long)]
        min: Option<i32>,

        /// Maximum number of values, -1 for unbounded (field types)
        #[arg(long, allow_hyphen_values = true)]
        max: Option<i32>,
    },

    /// Print a node and everything it owns
    Show {
        /// Row id of the node
        id: i64,
    },

    /// Show version info
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeKind {
    Element,
    Field,
    Value,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a `{ ok, command, data }` envelope in JSON mode
pub fn emit_success(
    output_mode: OutputMode,
    command: &str,
    data: serde_json::Value,
) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "ok": true,
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

/// Database path and author after merging flags, config and defaults
pub struct Settings {
    pub database: PathBuf,
    pub author: Option<String>,
}

fn resolve_settings(
    database: Option<PathBuf>,
    config: Option<&ManuscriptConfig>,
    cwd: &Path,
) -> Settings {
    let database = database
        .or_else(|| config.and_then(|c| c.database.as_ref()).map(PathBuf::from))
        .unwrap_or_else(|| config::default_database_path_in(cwd));
    Settings {
        database,
        author: config.and_then(|c| c.author.clone()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let loaded = config::load_config(cli.config.as_deref())?;
    let cwd = std::env::current_dir()?;
    let settings = resolve_settings(cli.database, loaded.as_ref(), &cwd);

    let result = match cli.command {
        Commands::Init {
            author,
            write_config,
            force,
        } => {
            let config_path = cli.config.unwrap_or_else(config::default_config_path);
            let write_to = write_config.then_some(config_path.as_path());
            commands::run_init(output_mode, &settings, author, write_to, force)
        }
        Commands::Stats => commands::run_stats(output_mode, &settings),
        Commands::Types => commands::run_types(output_mode, &settings),
        Commands::AddType {
            kind,
            name,
            children,
            allowed,
            min,
            max,
        } => commands::run_add_type(
            output_mode,
            &settings,
            commands::NewType {
                kind,
                name,
                children,
                allowed,
                min,
                max,
            },
        ),
        Commands::Show { id } => commands::run_show(output_mode, &settings, id),
        Commands::Version => commands::run_version(output_mode),
    };

    if let Err(e) = &result {
        if output_mode.is_human() {
            manuscript::ui::error(&format!("{:#}", e));
        } else {
            let envelope = serde_json::json!({ "ok": false, "error": format!("{:#}", e) });
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_beats_config() {
        let config = ManuscriptConfig {
            database: Some("from-config.db".to_string()),
            author: Some("ada".to_string()),
        };
        let flag = Some(PathBuf::from("flag.db"));
        let settings = resolve_settings(flag, Some(&config), Path::new("/work"));
        assert_eq!(settings.database, PathBuf::from("flag.db"));
        assert_eq!(settings.author.as_deref(), Some("ada"));

        let settings = resolve_settings(None, Some(&config), Path::new("/work"));
        assert_eq!(settings.database, PathBuf::from("from-config.db"));

        let settings = resolve_settings(None, None, Path::new("/work"));
        assert_eq!(settings.database, PathBuf::from("/work/.manuscript/work.db"));
        assert!(settings.author.is_none());
    }

    #[test]
    fn test_cli_parses_add_type() {
        let cli = Cli::try_parse_from([
            "manuscript", "add-type", "field", "title", "--allowed", "string", "--max", "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::AddType { kind, name, allowed, max, .. } => {
                assert_eq!(kind, TypeKind::Field);
                assert_eq!(name, "title");
                assert_eq!(allowed, vec!["string"]);
                assert_eq!(max, Some(-1));
            }
            _ => panic!("expected add-type"),
        }
    }
}
