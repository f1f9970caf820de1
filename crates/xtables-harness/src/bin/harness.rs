//! CLI entrypoint for the xtables test harness.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use xtables_harness::privilege::{NOT_ROOT_MESSAGE, is_root};
use xtables_harness::{
    HarnessConfig, LogEmitter, RunReport, RunTarget, Session, missing_tests, run_suite,
};

/// Runs the declarative rule tests shipped next to the extensions.
#[derive(Debug, Parser)]
#[command(name = "xtables-test")]
#[command(about = "Insert, verify and remove every rule listed in the extension test files")]
struct Cli {
    /// Run only this test file instead of the whole directory.
    file: Option<PathBuf>,
    /// List extensions that have no test file, then exit.
    #[arg(short, long, conflicts_with = "file")]
    missing: bool,
    /// Directory holding the extension sources and test files.
    #[arg(long)]
    extensions: Option<PathBuf>,
    /// Write structured JSONL events to this path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Output report path (markdown; a `.json` sibling is written too).
    #[arg(long)]
    report: Option<PathBuf>,
}

fn run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{nanos}", std::process::id())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = HarnessConfig::from_env().with_extensions_dir(cli.extensions);

    if cli.missing {
        for name in missing_tests(&config.extensions_dir)? {
            println!("{name}");
        }
        return Ok(());
    }

    if !is_root() {
        println!("{NOT_ROOT_MESSAGE}");
        return Ok(());
    }

    let run_id = run_id();
    let mut log = match &cli.log {
        Some(path) => LogEmitter::to_file(path, &run_id)?,
        None => LogEmitter::disabled(&run_id),
    };
    let mut backend = config.backend();
    let mut stdout = std::io::stdout().lock();
    let target = match cli.file {
        Some(file) => RunTarget::File(file),
        None => RunTarget::Directory(config.extensions_dir.clone()),
    };

    let outcome = {
        let mut session = Session::new(&mut backend, &mut stdout, &mut log);
        run_suite(&mut session, &target)?
    };
    log.flush()?;

    if let Some(report_path) = cli.report {
        let report_doc = RunReport::new("xtables test run", run_id, outcome);
        eprintln!("Writing report to {}", report_path.display());
        std::fs::write(&report_path, report_doc.to_markdown())?;
        let json_path = report_path.with_extension("json");
        std::fs::write(&json_path, report_doc.to_json())?;
    }

    Ok(())
}
