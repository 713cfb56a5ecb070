use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hostverify::{builtin_names, HostSpec, HostVerifyError, Inventory, Suite, SuiteLoader, Verifier, VerifyReport};
use hostverify::{render_console, render_json, render_table, render_yaml, Totals};

#[derive(Parser)]
#[command(name = "hostverify")]
#[command(about = "Verify the end state of provisioned hosts against declarative check suites")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suite files, directories or built-in suite names
    #[arg(short, long, global = true, env = "HOSTVERIFY_SUITE", value_delimiter = ',')]
    suite: Vec<String>,

    /// Per-command timeout in seconds
    #[arg(short, long, global = true, env = "HOSTVERIFY_TIMEOUT", default_value = "60")]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run check suites against every target host
    Run {
        #[command(flatten)]
        targets: Targets,

        /// Only run checks whose name contains this text
        #[arg(short, long)]
        check: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "console")]
        output: OutputFormat,

        /// Timeout in seconds for direct HTTP probes
        #[arg(long, default_value = "30")]
        http_timeout: u64,
    },

    /// List suites and their expanded checks
    List {
        /// Show each check's kind and target
        #[arg(short, long)]
        detailed: bool,
    },

    /// Validate suite definitions without touching any host
    Validate,

    /// Show the hosts a run would verify
    Hosts {
        #[command(flatten)]
        targets: Targets,
    },
}

#[derive(clap::Args)]
struct Targets {
    /// Host URI (local://, ssh://[user@]host[:port], docker://name, podman://name)
    #[arg(long = "host")]
    hosts: Vec<String>,

    /// Ansible YAML inventory, as written by Molecule
    #[arg(short, long, env = "MOLECULE_INVENTORY_FILE")]
    inventory: Option<PathBuf>,

    /// Run every host query through sudo
    #[arg(long)]
    sudo: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Console,
    Table,
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("hostverify=debug,info")
    } else {
        EnvFilter::new("hostverify=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: Box<dyn std::error::Error>) {
    if let Some(HostVerifyError::Unreachable(target)) = err.downcast_ref::<HostVerifyError>() {
        eprintln!("\x1b[31m✗ Unreachable:\x1b[0m {}", target);
        return;
    }

    eprintln!("\x1b[31m✗ Error:\x1b[0m {}", err);
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let loader = SuiteLoader::new();
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Run { targets, check, output, http_timeout } => {
            let suites = load_suites(&loader, &cli.suite)?;
            let inventory = resolve_inventory(&targets)?;
            cmd_run(suites, &inventory, timeout, check, output, Duration::from_secs(http_timeout)).await
        }
        Commands::List { detailed } => cmd_list(&loader, &cli.suite, detailed),
        Commands::Validate => cmd_validate(&loader, &cli.suite),
        Commands::Hosts { targets } => cmd_hosts(&resolve_inventory(&targets)?),
    }
}

fn load_suites(loader: &SuiteLoader, references: &[String]) -> Result<Vec<Suite>, Box<dyn std::error::Error>> {
    if references.is_empty() {
        return Err(format!(
            "No suite specified. Use --suite or HOSTVERIFY_SUITE (built-in: {})",
            builtin_names().collect::<Vec<_>>().join(", ")
        )
        .into());
    }

    let mut suites = Vec::new();
    for reference in references {
        suites.extend(loader.load_any(reference)?);
    }
    Ok(suites)
}

fn resolve_inventory(targets: &Targets) -> Result<Inventory, Box<dyn std::error::Error>> {
    let mut hosts = targets
        .hosts
        .iter()
        .map(|uri| HostSpec::parse_uri(uri))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(path) = &targets.inventory {
        info!("Reading inventory {}", path.display());
        hosts.extend(Inventory::load_ansible(path)?.hosts().iter().cloned());
    }

    if hosts.is_empty() {
        return Err("No hosts given. Use --host or --inventory (MOLECULE_INVENTORY_FILE)".into());
    }

    let inventory = Inventory::from_hosts(hosts)?;
    Ok(if targets.sudo { inventory.with_become() } else { inventory })
}

async fn cmd_run(
    mut suites: Vec<Suite>,
    inventory: &Inventory,
    timeout: Duration,
    check_filter: Option<String>,
    output: OutputFormat,
    http_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(needle) = &check_filter {
        for suite in &mut suites {
            suite.retain_matching(needle);
        }
        suites.retain(|s| !s.checks.is_empty());
        if suites.is_empty() {
            return Err(format!("No checks match '{}'", needle).into());
        }
    }

    let mut reports: Vec<VerifyReport> = Vec::new();

    for spec in inventory.hosts() {
        info!("Verifying {} via {}", spec.name, spec.transport);
        let host = spec.connect(timeout);
        let verifier = Verifier::new(&host).with_http_timeout(http_timeout);

        for suite in &suites {
            let report = verifier.verify(&suite.checks).await.with_suite(&suite.name);
            if matches!(output, OutputFormat::Console) {
                print!("{}", render_console(&report));
            }
            reports.push(report);
        }
    }

    let totals = Totals::of(&reports);

    match output {
        OutputFormat::Console => {
            println!();
            if totals.all_passed() {
                println!("✓ {}", totals);
            } else {
                println!("✗ {}", totals);
            }
        }
        OutputFormat::Table => {
            println!("{}", render_table(&reports));
            println!();
            println!("{}", totals);
        }
        OutputFormat::Json => println!("{}", render_json(&reports)?),
        OutputFormat::Yaml => print!("{}", render_yaml(&reports)?),
    }

    if totals.all_passed() {
        Ok(())
    } else {
        Err(format!("{} of {} checks did not pass", totals.failed + totals.errors,
            totals.passed + totals.failed + totals.errors).into())
    }
}

fn cmd_list(loader: &SuiteLoader, references: &[String], detailed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if references.is_empty() {
        println!("Built-in suites:");
        for name in builtin_names() {
            println!("  {}", name);
        }
        return Ok(());
    }

    for suite in load_suites(loader, references)? {
        println!("{} ({} checks)", suite.name, suite.checks.len());

        if detailed {
            if let Some(desc) = &suite.description {
                println!("  description: {}", desc);
            }
            if let Some(source) = &suite.source {
                println!("  source: {}", source);
            }
        }

        for check in &suite.checks {
            if detailed {
                println!("  {:<40} {:<16} {}", check.name, check.check.kind_name(), check.check.target());
            } else {
                println!("  {}", check.name);
            }
        }
        println!();
    }

    Ok(())
}

fn cmd_validate(loader: &SuiteLoader, references: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if references.is_empty() {
        return Err("No suite specified. Use --suite or HOSTVERIFY_SUITE".into());
    }

    let mut failed = Vec::new();
    let mut total_checks = 0;

    for reference in references {
        match loader.load_any(reference) {
            Ok(suites) => {
                for suite in suites {
                    println!("✓ {} ({} checks)", suite.name, suite.checks.len());
                    total_checks += suite.checks.len();
                }
            }
            Err(e) => {
                println!("✗ {}", reference);
                println!("    \x1b[31m✗\x1b[0m {}", e);
                failed.push(reference.clone());
            }
        }
    }

    println!();

    if !failed.is_empty() {
        println!("✗ Validation failed for {} of {} suites", failed.len(), references.len());
        println!("  Failed: {}", failed.join(", "));
        return Err("Validation failed".into());
    }

    println!("✓ {} checks validated successfully", total_checks);
    Ok(())
}

fn cmd_hosts(inventory: &Inventory) -> Result<(), Box<dyn std::error::Error>> {
    for spec in inventory.hosts() {
        let sudo = if spec.become_root { " (sudo)" } else { "" };
        println!("{:<30} {}{}", spec.name, spec.transport, sudo);
    }

    Ok(())
}
