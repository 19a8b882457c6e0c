use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "revpk",
    about = "Read, verify, unpack, and repack Respawn VPK archives",
    version
)]
struct Cli {
    /// Show more output (repeat for more verbosity)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// VPK locale prefix of the _dir file
    #[arg(short = 'p', long, default_value = "english", global = true)]
    vpk_prefix: String,

    #[command(subcommand)]
    command: Commands,
}

/// The last one or two positional arguments of most subcommands: either a
/// directory plus an archive name, or the path of any member file.
#[derive(Args)]
struct ArchiveArgs {
    /// (vpk_dir vpk_name) or vpk_path
    #[arg(value_name = "VPK", num_args = 1..=2, required = true)]
    vpk: Vec<String>,
}

impl ArchiveArgs {
    fn resolve(&self, prefix: &str) -> Result<revpk::VpkRef, revpk::Error> {
        match self.vpk.as_slice() {
            [dir, name] => Ok(revpk::VpkRef::new(dir.as_str(), prefix, name.as_str())),
            [path] => revpk::VpkRef::from_path(std::path::Path::new(path), prefix),
            _ => unreachable!("clap enforces 1..=2 arguments"),
        }
    }
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Exclude files or directories matching the glob (anchor with /)
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Shortcut for --exclude to remove NNNN.bsp_lump by lump number
    #[arg(long, value_name = "LUMP")]
    exclude_bsp_lump: Vec<u32>,

    /// Negate --exclude for files or directories matching the glob
    #[arg(long, value_name = "GLOB")]
    include: Vec<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> revpk_util::IncludeExclude {
        revpk_util::IncludeExclude {
            exclude: self.exclude.clone(),
            exclude_bsp_lump: self.exclude_bsp_lump.clone(),
            include: self.include.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the files in an archive
    List {
        #[command(flatten)]
        vpk: ArchiveArgs,

        /// Show per-chunk detail
        #[arg(short, long)]
        long: bool,
    },

    /// Write one archived file to stdout or a path
    Get {
        /// Path inside the archive
        file: String,

        #[command(flatten)]
        vpk: ArchiveArgs,

        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read every file in full and verify sizes and checksums
    Verify {
        #[command(flatten)]
        vpk: ArchiveArgs,

        /// Decompression look-ahead per file
        #[arg(short = 'j', long, default_value_t = default_threads())]
        threads: usize,
    },

    /// Unpack an archive into a directory for editing and repacking
    Unpack {
        /// Output directory (must be empty or missing)
        output: PathBuf,

        #[command(flatten)]
        vpk: ArchiveArgs,

        /// Generate one .vpkflags rule per file instead of inheriting
        #[arg(long)]
        vpkflags_explicit: bool,

        /// Do not seed .vpkignore with the default entries
        #[arg(long)]
        vpkignore_no_default: bool,

        /// Decompression look-ahead per file
        #[arg(short = 'j', long, default_value_t = default_threads())]
        threads: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Initialize an empty working directory for a new archive
    Init {
        /// Output directory (must be empty or missing)
        output: PathBuf,
    },

    /// Repack archives, deduplicating chunks and dropping excluded files
    Optimize {
        /// Input directory holding the archives
        vpk_dir: PathBuf,

        /// Archive names (all archives in the directory when omitted)
        #[arg(value_name = "VPK_NAME")]
        names: Vec<String>,

        /// Output directory (must differ from the input directory)
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Merge all blocks into _000.vpk
        #[arg(long)]
        merge: bool,

        /// Don't write output files
        #[arg(short = 'n', long)]
        dry_run: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Work with .vpkflags rules
    #[command(subcommand)]
    Flags(FlagsCommands),
}

#[derive(Subcommand)]
enum FlagsCommands {
    /// Generate a .vpkflags rule set for an archive
    Generate {
        #[command(flatten)]
        vpk: ArchiveArgs,

        /// Generate one rule per file instead of inheriting
        #[arg(long)]
        explicit: bool,

        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a .vpkflags file against an archive
    Test {
        /// Path of the .vpkflags file
        vpkflags: PathBuf,

        #[command(flatten)]
        vpk: ArchiveArgs,
    },
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let prefix = cli.vpk_prefix.clone();
    let result = match cli.command {
        Commands::List { vpk, long } => vpk
            .resolve(&prefix)
            .map_err(Into::into)
            .and_then(|vpk| commands::list::handle(&vpk, long)),
        Commands::Get { vpk, file, output } => vpk
            .resolve(&prefix)
            .map_err(Into::into)
            .and_then(|vpk| commands::get::handle(&vpk, &file, output.as_deref())),
        Commands::Verify { vpk, threads } => vpk
            .resolve(&prefix)
            .map_err(Into::into)
            .and_then(|vpk| commands::verify::handle(&vpk, threads)),
        Commands::Unpack {
            output,
            vpk,
            vpkflags_explicit,
            vpkignore_no_default,
            threads,
            filter,
        } => vpk.resolve(&prefix).map_err(Into::into).and_then(|vpk| {
            commands::unpack::handle(
                &vpk,
                &output,
                commands::unpack::Options {
                    vpkflags_explicit,
                    vpkignore_no_default,
                    threads,
                    filter: filter.to_filter(),
                },
            )
        }),
        Commands::Init { output } => commands::init::handle(&output),
        Commands::Optimize {
            vpk_dir,
            names,
            output,
            merge,
            dry_run,
            filter,
        } => commands::optimize::handle(
            &vpk_dir,
            &names,
            &output,
            &prefix,
            revpk_util::OptimizeOptions {
                merge,
                dry_run,
                filter: filter.to_filter(),
                cancel: revpk_util::CancelToken::new(),
            },
        ),
        Commands::Flags(cmd) => match cmd {
            FlagsCommands::Generate {
                vpk,
                explicit,
                output,
            } => vpk
                .resolve(&prefix)
                .map_err(Into::into)
                .and_then(|vpk| commands::flags::generate(&vpk, explicit, output.as_deref())),
            FlagsCommands::Test { vpkflags, vpk } => vpk
                .resolve(&prefix)
                .map_err(Into::into)
                .and_then(|vpk| commands::flags::test(&vpkflags, &vpk)),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
