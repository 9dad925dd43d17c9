use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "devpulse", version)]
#[command(about = "Import GitHub activity into a local store and explore it")]
pub struct Cli {
    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Database file (default: ~/.devpulse/data.db)
    #[arg(long, global = true, env = "DEVPULSE_DB")]
    pub db: Option<PathBuf>,

    /// Output document format
    #[arg(long, global = true, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a GitHub token for later runs
    Auth(AuthArgs),
    /// Import repository activity, then enrich and score developers
    Import(ImportArgs),
    /// Record an entity substitution and apply it
    Substitute(SubstituteArgs),
    /// Read-only queries against the store
    #[command(subcommand)]
    Query(QueryCommand),
    /// Delete the database and start over
    Reset(ResetArgs),
    /// Serve the read-only dashboard
    Server(ServerArgs),
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    /// Token value; read from stdin when omitted
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[arg(long)]
    pub org: Option<String>,

    /// Repository in `--org`; repeat for several
    #[arg(long = "repo", requires = "org")]
    pub repos: Vec<String>,

    /// Months of history to import
    #[arg(long)]
    pub months: Option<u32>,

    /// Ignore saved cursors and start over
    #[arg(long)]
    pub fresh: bool,

    /// Skip roster affiliation merge
    #[arg(long)]
    pub no_enrich: bool,
}

#[derive(Debug, Args)]
pub struct SubstituteArgs {
    #[arg(long = "type", default_value = "entity")]
    pub kind: String,

    #[arg(long)]
    pub old: String,

    #[arg(long)]
    pub new: String,
}

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    #[command(subcommand)]
    Developers(DeveloperQuery),
    #[command(subcommand)]
    Entities(EntityQuery),
    #[command(subcommand)]
    Org(OrgQuery),
    Events(EventArgs),
}

#[derive(Debug, Subcommand)]
pub enum DeveloperQuery {
    List {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        entity: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    Details {
        username: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum EntityQuery {
    List {
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    Details {
        entity: String,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum OrgQuery {
    Repos {
        org: String,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[derive(Debug, Args)]
pub struct EventArgs {
    #[arg(long)]
    pub org: Option<String>,
    #[arg(long)]
    pub repo: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub entity: Option<String>,
    #[arg(long = "type")]
    pub event_type: Option<String>,
    /// Earliest event date, `YYYY-MM-DD`
    #[arg(long = "from")]
    pub from_date: Option<String>,
    #[arg(long)]
    pub mention: Option<String>,
    #[arg(long)]
    pub label: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub page: i64,
    #[arg(long, default_value_t = 100)]
    pub limit: i64,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct ServerArgs {
    #[arg(long)]
    pub port: Option<u16>,

    /// Do not open the dashboard in a browser
    #[arg(long)]
    pub no_browser: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn import_accepts_repeated_repos() {
        let cli = Cli::try_parse_from([
            "devpulse", "--format", "yaml", "import", "--org", "acme", "--repo", "a", "--repo", "b",
            "--months", "12",
        ])
        .unwrap();
        assert_eq!(cli.format, Format::Yaml);
        match cli.command {
            Command::Import(args) => {
                assert_eq!(args.org.as_deref(), Some("acme"));
                assert_eq!(args.repos, vec!["a", "b"]);
                assert_eq!(args.months, Some(12));
                assert!(!args.fresh);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repo_requires_org() {
        assert!(Cli::try_parse_from(["devpulse", "import", "--repo", "a"]).is_err());
    }

    #[test]
    fn nested_query_commands() {
        let cli = Cli::try_parse_from(["devpulse", "query", "entities", "details", "ACME", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::Query(QueryCommand::Entities(EntityQuery::Details { ref entity, limit: 100 })) if entity == "ACME"
        ));
    }
}
