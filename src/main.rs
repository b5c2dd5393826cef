use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use leap::index::{CommandIndexer, InProcessIndexer, IndexConfig, Indexer, build_index};
use leap::output::print_entries;
use leap::query::{ParsedQuery, QueryEngine, parse};
use leap::server::{
    LeapClient, LeapServer, RemoteContentSearcher, ServerConfig, TransferTarget, reindex_and_transfer,
    with_default_port,
};
use leap::utils::config::{GlobalConfiguration, Project, config_path};
use leap::utils::logging::{roll_logs, setup_logging};
use leap::utils::plumb::{SENTINEL_DIR, clear_sentinel_dir, encoded_to_file, encoded_to_number, encoded_to_plumb};
use simplelog::LevelFilter;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "leap")]
#[command(about = "Fuzzy file and content search over a trigram index, with remote index sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.leaprc)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the current project: `path`, `path:line`, `path:/text`, `path#regexp`, `path@symbol`
    Query {
        /// Print a colored listing instead of Alfred JSON
        #[arg(long)]
        plain: bool,

        /// Query input (joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        input: Vec<String>,
    },
    /// Build an index file over the given roots
    Index {
        /// Index file (default: the current project's)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Skip files ignored by .gitignore
        #[arg(long)]
        gitignore: bool,

        /// Directories to index
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// Serve the current project to remote clients
    Serve {
        /// Listen address (default: 0.0.0.0:1234)
        #[arg(long)]
        addr: Option<String>,

        /// External program to rebuild the index (LEAP_INDEX names the file)
        #[arg(long)]
        indexer: Option<String>,
    },
    /// Have the server rebuild its index and copy it here
    Sync,
    /// Ask the server to exit
    Shutdown,
    /// Check the server is answering
    Ping {
        #[arg(default_value = "hello")]
        greeting: String,
    },
    /// Turn an encoded result path into `file:line`
    Decode {
        encoded: String,

        /// Print only the file
        #[arg(long, conflicts_with = "number")]
        file: bool,

        /// Print only the line number
        #[arg(long)]
        number: bool,
    },
    /// Show or change the configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Make this project current, creating it if needed
    #[arg(long = "proj")]
    project: Option<String>,

    /// List project names
    #[arg(long = "lsproj", conflicts_with = "project")]
    list: bool,

    /// Server host for the current project
    #[arg(long)]
    host: Option<String>,

    /// Local index file
    #[arg(long, conflicts_with = "resetpath")]
    indexpath: Option<String>,

    /// Clear the local index path (use the default)
    #[arg(long)]
    resetpath: bool,

    /// Query through the server
    #[arg(long, conflicts_with = "local")]
    remote: bool,

    /// Query locally
    #[arg(long)]
    local: bool,

    /// Path prefixes trimmed from results (none clears them)
    #[arg(long, num_args = 0..)]
    setprefix: Option<Vec<String>>,

    /// Index file on the server
    #[arg(long)]
    remotepath: Option<String>,

    /// Project name on the server
    #[arg(long)]
    remoteproject: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_file = match cli.config {
        Some(path) => path,
        None => config_path()?,
    };
    let mut config = GlobalConfiguration::load(&config_file)?;

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let term_level = matches!(cli.command, Commands::Serve { .. }).then_some(level);
    match leap::utils::config::log_dir() {
        Ok(dir) => match setup_logging(&dir, level, term_level) {
            Ok(_) => roll_logs(&dir),
            Err(e) => eprintln!("leap: logging disabled: {}", e),
        },
        Err(e) => eprintln!("leap: logging disabled: {}", e),
    }

    match cli.command {
        Commands::Query { plain, input } => {
            let project = config.current()?;
            run_query(project, &input.join(" "), plain)?;
        }
        Commands::Index { index, gitignore, roots } => {
            let index_path = match index {
                Some(path) => path,
                None => config.current()?.index_path(),
            };
            let index_config = IndexConfig {
                respect_gitignore: gitignore,
                ..IndexConfig::default()
            };
            let summary = build_index(&roots, &index_path, &index_config, false)
                .with_context(|| format!("Failed to build {}", index_path.display()))?;
            println!("{}", summary);
        }
        Commands::Serve { addr, indexer } => {
            let project = config.current()?;
            let indexer: Box<dyn Indexer> = match indexer {
                Some(program) => Box::new(CommandIndexer::new(program)),
                None => Box::new(InProcessIndexer::default()),
            };
            let server = LeapServer::new(ServerConfig::new(project.index_path(), project.prefixes(), indexer));
            let addr = addr.unwrap_or_else(|| with_default_port("0.0.0.0"));
            let listener = TcpListener::bind(&addr).with_context(|| format!("Failed to listen on {}", addr))?;
            server.run(listener)?;
        }
        Commands::Sync => {
            let project = config.current()?;
            let mut client = connect(project)?;
            let target = TransferTarget {
                remote_project_name: project.remoteproject.clone(),
                remote_path: project.remote_index_path(),
                local_path: project.index_path(),
            };
            let summary = reindex_and_transfer(&mut client, &target)?;
            println!(
                "{}: {} bytes, {} blocks reused, {} fetched",
                target.local_path.display(),
                summary.file_size,
                summary.stats.reused_blocks,
                summary.stats.fetched_blocks
            );
        }
        Commands::Shutdown => {
            connect(config.current()?)?.shutdown()?;
        }
        Commands::Ping { greeting } => {
            println!("{}", connect(config.current()?)?.ping(&greeting)?);
        }
        Commands::Decode { encoded, file, number } => {
            let decoded = if file {
                encoded_to_file(&encoded)
            } else if number {
                encoded_to_number(&encoded)
            } else {
                encoded_to_plumb(&encoded)
            };
            println!("{}", decoded);
        }
        Commands::Config(args) => {
            update_config(&mut config, &config_file, args)?;
        }
    }

    Ok(())
}

fn connect(project: &Project) -> Result<LeapClient> {
    if project.host.is_empty() {
        bail!("No server host configured; set one with `leap config --host`");
    }
    Ok(LeapClient::connect_with_retry(&with_default_port(&project.host))?)
}

fn run_query(project: &Project, input: &str, plain: bool) -> Result<()> {
    if let Err(e) = clear_sentinel_dir(Path::new(SENTINEL_DIR)) {
        log::warn!("can't clear {}: {}", SENTINEL_DIR, e);
    }

    let ParsedQuery {
        patterns,
        query_type,
        suffix,
    } = parse(input);
    let entries = if project.remote && project.remotepath.is_empty() {
        // No synced copy here, so the server runs the whole query.
        let mut client = connect(project)?;
        client.leap(patterns, query_type.marker(), suffix)?
    } else {
        let engine = QueryEngine::open(&project.index_path(), project.prefixes())?;
        let suffixes = [suffix];
        if project.remote {
            let searcher = RemoteContentSearcher::new(connect(project)?, project.remotepath.clone(), project.prefixes());
            engine.query(&patterns, query_type, &suffixes, &searcher)?
        } else {
            engine.query(&patterns, query_type, &suffixes, &engine)?
        }
    };

    print_entries(&entries, plain, true)?;
    Ok(())
}

fn update_config(config: &mut GlobalConfiguration, path: &Path, args: ConfigArgs) -> Result<()> {
    if args.list {
        println!("{}", config.project_names().collect::<Vec<_>>().join(", "));
        return Ok(());
    }

    let changes = args.project.is_some()
        || args.host.is_some()
        || args.indexpath.is_some()
        || args.resetpath
        || args.remote
        || args.local
        || args.setprefix.is_some()
        || args.remotepath.is_some()
        || args.remoteproject.is_some();

    if let Some(name) = &args.project {
        config.switch_project(name);
    }
    let project = config.current_mut()?;
    if let Some(host) = args.host {
        project.host = host;
    }
    if args.resetpath {
        project.indexpath.clear();
    }
    if let Some(indexpath) = args.indexpath {
        project.indexpath = indexpath;
    }
    if args.remote {
        project.remote = true;
    }
    if args.local {
        project.remote = false;
    }
    if let Some(prefixes) = args.setprefix {
        project.prefixes = prefixes;
    }
    if let Some(remotepath) = args.remotepath {
        project.remotepath = remotepath;
    }
    if let Some(remoteproject) = args.remoteproject {
        project.remoteproject = remoteproject;
    }

    if changes {
        config.save(path)?;
    }
    println!("{}", serde_json::to_string_pretty(&*config)?);
    Ok(())
}
