//! pitcount command line front end.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use pitcount::results::{DialogPicker, FolderPicker, NoPicker, OutputOutcome};
use pitcount::segmentation::ThresholdSegmenter;
use pitcount::{LayerStack, Session, SettingsStore};

#[derive(Parser, Debug)]
#[command(name = "pitcount", version, about = "Count cells and pits in microscopy images")]
struct Cli {
    /// Folder holding the settings file (defaults to the user config dir)
    #[arg(long, global = true, value_name = "DIR")]
    settings: Option<PathBuf>,

    /// Folder to load images from, skipping the folder prompt
    #[arg(short, long, global = true, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Folder to write results to, skipping the folder prompt
    #[arg(short, long, global = true, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Maximum concurrent segmentation workers (0 = one per CPU)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Debug logging regardless of the settings file
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Never open folder dialogs
    #[arg(long, global = true)]
    no_dialogs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load images, segment them and export the results (default)
    Run,
    /// Print the settings file location and contents
    Settings,
    /// Open the settings file in the default editor
    EditSettings,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is configured from the settings, so the store is opened first.
    let store = match SettingsStore::open(cli.settings.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        store.current().log_filter()
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    match run(cli, store) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, store: SettingsStore) -> pitcount::Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Settings => {
            println!("# {}", store.file_path().display());
            print!("{}", store.current().to_yaml().map_err(pitcount::SettingsError::from)?);
            Ok(())
        }
        Command::EditSettings => Ok(store.open_in_editor()?),
        Command::Run => {
            let picker: Arc<dyn FolderPicker> = if cli.no_dialogs {
                Arc::new(NoPicker)
            } else {
                Arc::new(DialogPicker)
            };
            let mut session =
                Session::new(store, LayerStack::new(), Arc::new(ThresholdSegmenter), picker);

            if let Some(workers) = cli.workers {
                session.set_max_workers(workers);
            }
            if let Some(output) = cli.output {
                session.results_mut().set_output_path(output)?;
                session.results_mut().set_prompt_for_folder(false);
            }

            match session.load_folder(cli.input)? {
                Some(count) => log::info!("Loaded {} images", count),
                None => return Ok(()),
            }

            let summary = session.run_segmentation()?;
            println!(
                "Segmented {}/{} images",
                summary.delivered.len(),
                summary.total
            );
            for (name, error) in &summary.failed {
                println!("  failed: {} ({})", name, error);
            }

            match session.export_results()? {
                OutputOutcome::Written(paths) => {
                    for path in paths {
                        println!("  wrote {}", path.display());
                    }
                }
                OutputOutcome::Cancelled => println!("Export cancelled"),
            }
            Ok(())
        }
    }
}
