mod commands;
mod output;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "skumatch",
    version,
    about = "Put pricebook PDF product images into spreadsheet rows by product code"
)]
struct Cli {
    /// Log matching decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options that tune recognition, matching and image output.
#[derive(Args, Clone, Default)]
pub struct MatchArgs {
    /// JSON config file (fields not given keep their defaults)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads for page processing
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Target image width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Target image height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Crop images to fill the target size instead of padding
    #[arg(long)]
    pub crop: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the codes and images found on each page (no matching)
    Scan {
        /// Path to the pricebook PDF
        pdf: PathBuf,

        #[command(flatten)]
        args: MatchArgs,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Pair every product code with its image
    Match {
        /// Path to the pricebook PDF
        pdf: PathBuf,

        #[command(flatten)]
        args: MatchArgs,

        /// Write each matched image as <CODE>.png into this directory
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Place matched images into the rows of a workbook
    Fill {
        /// Path to the pricebook PDF
        pdf: PathBuf,

        /// Workbook (.xlsx or .xlsm; .xls and .ods with --images-dir) with a CODE column
        workbook: PathBuf,

        /// Write into <name>_with_images beside the workbook instead of the original
        #[arg(long)]
        save_as_new: bool,

        /// Write PNGs and a placement manifest to DIR instead of embedding them
        #[arg(long, value_name = "DIR", conflicts_with = "save_as_new")]
        images_dir: Option<PathBuf>,

        #[command(flatten)]
        args: MatchArgs,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Compare the codes in a PDF with those in a workbook
    Compare {
        /// Path to the pricebook PDF
        pdf: PathBuf,

        /// Workbook with a CODE column
        workbook: PathBuf,

        #[command(flatten)]
        args: MatchArgs,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Inspect and check configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show {
        #[command(flatten)]
        args: MatchArgs,
    },
    /// Validate a config file
    Validate {
        /// Path to JSON config file
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Scan { pdf, args, output } => commands::scan::run(pdf, &args, &output),
        Commands::Match {
            pdf,
            args,
            export,
            output,
        } => commands::matching::run(pdf, &args, export, &output),
        Commands::Fill {
            pdf,
            workbook,
            save_as_new,
            images_dir,
            args,
            output,
        } => commands::fill::run(pdf, workbook, save_as_new, images_dir, &args, &output),
        Commands::Compare {
            pdf,
            workbook,
            args,
            output,
        } => commands::compare::run(pdf, workbook, &args, &output),
        Commands::Config { action } => match action {
            ConfigAction::Show { args } => commands::config::show(&args),
            ConfigAction::Validate { file } => commands::config::validate(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
