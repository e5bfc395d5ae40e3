use archivist::compliance::Checker;
use archivist::config::{self, ArchiveConfig};
use archivist::discover::{FieldFilter, Query, Walker};
use archivist::formats::FormatRegistry;
use archivist::generate::{BuildOptions, BuildOutcome, Builder};
use archivist::output;
use archivist::types::Source;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Validate and render self-describing archive trees")]
#[command(long_about = "\
Validate and render self-describing archive trees

Every directory in an archive carries a README and some durable data files.
Directories nest; the whole tree renders into one self-contained page.

Archive structure:

  archive/
  ├── README.md                    # Name/description (front-matter or heading + paragraph)
  ├── manifest.yaml                # Optional: how children are listed (name, icon, order)
  ├── archivist.toml               # Optional: scan depth, build output, colors
  ├── notes/                       # A source: README + durable data
  │   ├── README.md
  │   └── 2023.jsonl
  └── photos/
      ├── README.md                # front-matter `contents:` curates children
      ├── site/index.html          # Pre-rendered site (linked, or copied with --bundle)
      └── albums/...

Durable formats: .db .sqlite .sqlite3 .json .jsonl .md .markdown .txt .text
.rst .zip .jpg .jpeg .png .webp .gif .csv .tsv .xml .yaml .yml

Name resolution (first available wins):
  Name:        front-matter `name` → first README heading → directory name
  Description: front-matter `description` → first README paragraph → empty

Run 'archivist gen-config' to generate a documented archivist.toml.")]
#[command(version)]
struct Cli {
    /// Log level filter (RUST_LOG overrides)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a directory is a compliant source (exit 1 if not)
    Check {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Show the resolved name, description, and formats
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the sources under a directory
    Query {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Maximum depth below the starting directory
        #[arg(short, long)]
        depth: Option<usize>,
        /// Case-insensitive substring of name or description
        #[arg(short, long)]
        search: Option<String>,
        /// Front-matter filter KEY=GLOB (repeatable, all must match)
        #[arg(short, long = "filter", value_name = "KEY=GLOB")]
        filters: Vec<FieldFilter>,
        /// Start at a nested source by dotted name (e.g. letters.1990s)
        #[arg(long, value_name = "DOTTED")]
        at: Option<String>,
        #[arg(long, value_enum, default_value_t = QueryFormat::Text)]
        format: QueryFormat,
    },
    /// Render the archive into one self-contained site
    Build {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Output directory (default: <path>/site, or [build] output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Copy children's pre-rendered sites into the output instead of linking
        #[arg(long)]
        bundle: bool,
    },
    /// List the durable format allow-list
    Formats,
    /// Print a stock archivist.toml with all options documented
    GenConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum QueryFormat {
    Text,
    Tree,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Check { path, verbose } => {
            let config = config::load_config(&path)?;
            let verdict = checker(&config).check(&path);
            output::print_check(&verdict, verbose);
            if !verdict.is_compliant() {
                std::process::exit(1);
            }
        }
        Command::Query {
            path,
            depth,
            search,
            filters,
            at,
            format,
        } => {
            let config = config::load_config(&path)?;
            let walker = Walker::new(checker(&config));
            let base = match at {
                Some(dotted) => walker.navigate(&path, &dotted)?.path,
                None => path,
            };
            let query = Query {
                max_depth: depth,
                search,
                fields: filters,
            };
            match format {
                QueryFormat::Text => {
                    let sources: Vec<Source> = walker.discover(&base, &query).collect();
                    output::print_lines(&output::format_query_list(&sources, &base));
                }
                QueryFormat::Tree => {
                    let nodes = walker.tree(&base, &query);
                    output::print_lines(&output::format_query_tree(&nodes, &base));
                }
                QueryFormat::Json => {
                    let sources: Vec<Source> = walker.discover(&base, &query).collect();
                    println!("{}", output::format_query_json(&sources)?);
                }
            }
        }
        Command::Build {
            path,
            output: out_dir,
            bundle,
        } => {
            let config = config::load_config(&path)?;
            init_thread_pool(&config.processing);
            let mut options = BuildOptions::from_config(&config);
            if let Some(out_dir) = out_dir {
                options.output_dir = resolve_cli_output(&out_dir)?;
            }
            options.bundle |= bundle;

            let outcome = BuildOutcome::from(Builder::new(checker(&config), options).build(&path));
            if outcome.success {
                output::print_build(&outcome);
            } else {
                for line in output::format_build(&outcome) {
                    eprintln!("{}", line);
                }
                std::process::exit(1);
            }
        }
        Command::Formats => {
            output::print_formats(&FormatRegistry::default());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr subscriber; stdout is reserved for command output.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn checker(config: &ArchiveConfig) -> Checker {
    Checker::new(FormatRegistry::default(), config.scan.depth)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// `--output` is relative to the working directory, unlike `[build] output_dir`.
fn resolve_cli_output(output: &Path) -> std::io::Result<PathBuf> {
    if output.is_absolute() {
        Ok(output.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(output))
    }
}
