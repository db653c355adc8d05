//! FailFixer - Resume failed 3D prints from a chosen layer
//!
//! # Usage
//!
//! ```bash
//! # Resume a failed print at layer 42 (nozzle still over the part)
//! failfixer resume benchy.gcode --layer 42
//!
//! # Resume at a measured height on a fresh plate
//! failfixer resume benchy.gcode --z 12.6 --mode from-plate
//!
//! # Show the layers FailFixer detects
//! failfixer inspect benchy.gcode --layers
//!
//! # Check a generated file before printing it
//! failfixer validate In-Place_benchy_resume_layer0042.gcode
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use clap_mangen::Man;
use console::style;
use failfixer_core::{ResumeMode, Settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// FailFixer - Resume failed 3D prints from a chosen layer or Z height
#[derive(Parser)]
#[command(name = "failfixer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Suppress ALL output (implies --quiet and --yes)
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a resume file from a failed print's G-code
    Resume {
        /// Original G-code file
        file: PathBuf,

        /// Layer number to resume at
        #[arg(short, long, allow_negative_numbers = true, conflicts_with = "z")]
        #[arg(required_unless_present = "z")]
        layer: Option<i64>,

        /// Measured Z height of the failed print in mm
        #[arg(short, long, value_name = "MM")]
        z: Option<f64>,

        /// Z offset in mm added to the resume height
        #[arg(long, value_name = "MM", allow_negative_numbers = true)]
        offset: Option<f64>,

        /// Resume mode (in-air, from-plate)
        #[arg(short, long)]
        mode: Option<ResumeMode>,

        /// Directory for the generated file (defaults to the input's directory)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Exact output file (overrides the generated name)
        #[arg(short, long, value_name = "FILE", conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Printer profile name, or "auto" to detect the firmware
        #[arg(short, long)]
        profile: Option<String>,

        /// Directory containing printer profiles
        #[arg(long, value_name = "DIR", env = "FAILFIXER_PROFILES_DIR")]
        profiles_dir: Option<PathBuf>,

        /// Park position while heating, as X,Y
        #[arg(long, value_name = "X,Y", value_delimiter = ',', num_args = 2)]
        park: Option<Vec<f64>>,

        /// Run every check but do not write the file
        #[arg(long)]
        dry_run: bool,

        /// Overwrite an existing output file without asking
        #[arg(short = 'y', long)]
        yes: bool,

        /// Output the result in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the layers and printer state detected in a G-code file
    Inspect {
        /// G-code file to inspect
        file: PathBuf,

        /// List every detected layer
        #[arg(short, long)]
        layers: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the safety checks on a G-code file
    Validate {
        /// G-code file to check (usually a generated resume file)
        file: PathBuf,

        /// Resume height in mm (read from the resume header when omitted)
        #[arg(long, value_name = "MM")]
        resume_z: Option<f64>,

        /// Safe lift height in mm
        #[arg(long, value_name = "MM")]
        safe_lift: Option<f64>,

        /// Resume mode (read from the resume header when omitted)
        #[arg(short, long)]
        mode: Option<ResumeMode>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List available printer profiles
    Profiles {
        /// Directory containing printer profiles
        #[arg(long, value_name = "DIR", env = "FAILFIXER_PROFILES_DIR")]
        profiles_dir: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize the configuration file
    Config {
        /// Create a configuration file with default values
        #[arg(long)]
        init: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Use a specific configuration file
        #[arg(long, value_name = "FILE")]
        config_file: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man pages
    Mangen {
        /// Output directory for man pages
        #[arg(short, long, default_value = ".")]
        out_dir: String,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {}", style("Error:").red().bold(), e);

        // Show cause chain in verbose mode
        if std::env::var("RUST_BACKTRACE").is_ok() {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", style("Caused by:").yellow(), cause);
                source = cause.source();
            }
        }

        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load();

    // --silent implies --quiet (no logs at all, not even errors to tracing)
    let quiet = cli.quiet || cli.silent || settings.behavior.quiet;
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let silent = cli.silent;

    match cli.command {
        Commands::Resume {
            file,
            layer,
            z,
            offset,
            mode,
            output_dir,
            output,
            profile,
            profiles_dir,
            park,
            dry_run,
            yes,
            json,
        } => commands::resume::execute(commands::resume::ResumeArgs {
            file,
            layer,
            z,
            z_offset: offset.unwrap_or(settings.resume.z_offset),
            mode: mode.unwrap_or(settings.resume.mode),
            output_dir,
            output,
            profile: profile.unwrap_or_else(|| settings.resume.profile.clone()),
            profiles_dir: profiles_dir.or_else(|| settings.profiles.dir.clone()),
            park: park.and_then(|p| Some((*p.first()?, *p.get(1)?))),
            dry_run,
            // --silent implies --yes
            skip_confirm: yes || silent || settings.behavior.skip_confirmation,
            json,
            silent,
        }),
        Commands::Inspect { file, layers, json } => {
            commands::inspect::execute(&file, layers, json, silent)
        }
        Commands::Validate {
            file,
            resume_z,
            safe_lift,
            mode,
            json,
        } => commands::validate::execute(commands::validate::ValidateArgs {
            file,
            resume_z,
            safe_lift,
            mode,
            json,
            silent,
        }),
        Commands::Profiles { profiles_dir, json } => commands::profiles::execute(
            profiles_dir.or_else(|| settings.profiles.dir.clone()),
            json,
            silent,
        ),
        Commands::Config {
            init,
            path,
            json,
            config_file,
        } => commands::config::execute(commands::config::ConfigArgs {
            init,
            path,
            json,
            silent,
            config_file,
        }),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        Commands::Mangen { out_dir } => {
            let cmd = Cli::command();
            let out_path = std::path::Path::new(&out_dir);
            std::fs::create_dir_all(out_path)?;

            // Generate main man page
            let man = Man::new(cmd.clone());
            let mut buffer = Vec::new();
            man.render(&mut buffer)?;
            std::fs::write(out_path.join("failfixer.1"), buffer)?;
            if !silent {
                println!("Generated: {}/failfixer.1", out_dir);
            }

            for subcommand in cmd.get_subcommands() {
                let name = subcommand.get_name();
                if subcommand.is_hide_set()
                    || name == "completions"
                    || name == "mangen"
                    || name == "help"
                {
                    continue;
                }

                let man = Man::new(subcommand.clone());
                let mut buffer = Vec::new();
                man.render(&mut buffer)?;
                let filename = format!("failfixer-{}.1", name);
                std::fs::write(out_path.join(&filename), buffer)?;
                if !silent {
                    println!("Generated: {}/{}", out_dir, filename);
                }
            }

            if !silent {
                println!(
                    "\nInstall with: sudo cp {}/*.1 /usr/local/share/man/man1/",
                    out_dir
                );
            }
            Ok(())
        }
    }
}
