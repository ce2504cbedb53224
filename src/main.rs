use clap::{Parser, ValueEnum};
use prenatal_tree_core::display::format_trace;
use prenatal_tree_core::scenario::{self, PrenatalParams, PrenatalTree, ScenarioError, SweepPoint};
use std::path::PathBuf;
use std::process;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

/// Expected cost of CVS testing vs no testing, by maternal age.
#[derive(Parser, Debug)]
#[command(name = "prenatal-sweep", version, about)]
struct Cli {
    /// First maternal age
    #[arg(long, default_value_t = 16)]
    from: u32,

    /// Last maternal age (inclusive)
    #[arg(long, default_value_t = 55)]
    to: u32,

    /// JSON file overriding model probabilities and costs
    #[arg(long)]
    params: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Print the rollback trace for a single age instead of the sweep
    #[arg(long)]
    trace: Option<u32>,

    /// Verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count)]
    debug: u8,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), ScenarioError> {
    let params = match &cli.params {
        Some(path) => PrenatalParams::from_json_file(path)?,
        None => PrenatalParams::default(),
    };
    tracing::debug!(?params, "model parameters");

    if let Some(age) = cli.trace {
        let tree = PrenatalTree::for_age(age as f64, &params);
        let result = tree.evaluate()?;
        println!("age {} (risk {:.6})", age, tree.risk());
        print!("{}", format_trace(tree.registry(), &result));
        return Ok(());
    }

    let points = scenario::sweep(cli.from..=cli.to, &params)?;
    match cli.format {
        Format::Table => print_table(&points),
        Format::Json => println!("{}", serde_json::to_string_pretty(&points)?),
    }
    Ok(())
}

fn print_table(points: &[SweepPoint]) {
    println!("Data for Maternal Age by Cost");
    println!("{:>5} {:>12} {:>18} {:>20}", "age", "risk", "Diagnostic Test", "No Diagnostic Test");
    for p in points {
        println!(
            "{:>5} {:>12.6} {:>18.2} {:>20.2}",
            p.age, p.risk, p.diagnostic.cost, p.no_diagnostic.cost
        );
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    // RUST_LOG wins over -d when set.
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry().with(fmt_layer).with(filter).init();
}
