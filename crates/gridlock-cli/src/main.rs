use std::{env, fs, io, process::ExitCode, time::Instant};

use gridlock::{MemorySettings, MemoryWorkbook, StableIdMapper, ToolConfig, execute};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: gridlock <snippet.js> [workbook.json] [--save]";

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("GRIDLOCK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let save = args.iter().any(|arg| arg == "--save");
    let mut positional = args.iter().filter(|arg| !arg.starts_with("--"));
    let Some(snippet_path) = positional.next() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let workbook_path = positional.next();

    let code = match read_file(snippet_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut workbook = match workbook_path {
        Some(path) => match MemoryWorkbook::load(path) {
            Ok(workbook) => workbook,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => MemoryWorkbook::new(),
    };
    let mut mapper = match StableIdMapper::open(MemorySettings::new()) {
        Ok(mapper) => mapper,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let outcome = execute(&mut workbook, &mut mapper, &code, &ToolConfig::default());
    let elapsed = start.elapsed();

    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("error: could not serialize outcome: {err}"),
    }
    if !outcome.dirty_ranges.is_empty() {
        let ids = mapper.all();
        let summary = outcome.summary(|scope_id| {
            ids.iter()
                .find(|(_, id)| i64::from(**id) == scope_id)
                .and_then(|(guid, _)| workbook.sheet_name(guid))
                .map(str::to_owned)
        });
        eprintln!("modified: {summary}");
    }

    if save && let Some(path) = workbook_path {
        if let Err(err) = workbook.save(path) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
        eprintln!("saved {path}");
    }

    if outcome.success {
        eprintln!("success after: {elapsed:?}");
        ExitCode::SUCCESS
    } else {
        eprintln!("error after: {elapsed:?}");
        ExitCode::FAILURE
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("reading {file_path}: {err}"));
        }
    }
    fs::read_to_string(file_path).map_err(|err| format!("reading {file_path}: {err}"))
}
