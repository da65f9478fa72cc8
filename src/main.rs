//! Thin CLI layer: parse args, styled output, and call into kiln-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use kiln_core::{
    build_cache_root, check, materialize, persistent_cache_root, CacheStore, ConsoleSink,
    HttpClient, KilnConfig, PartsManifest, PublishConfig, PublishDecision, PublishGuard,
    PublishNotifier, PublishSession, StatsSnapshot,
};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal()
        && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Run a long-running task; in quiet mode show a spinner until done.
fn run_with_spinner<T, F>(message: &str, quiet: bool, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    if !quiet {
        return f();
    }
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
            .template("{spinner:.dim} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    let tick = Duration::from_millis(80);
    loop {
        match rx.try_recv() {
            Ok(result) => {
                spinner.finish_and_clear();
                return result;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                spinner.finish_and_clear();
                return Err("Operation failed.".to_string());
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }
        spinner.tick();
        thread::sleep(tick);
    }
}

fn run() -> Result<(), String> {
    let manifest_arg = Arg::new("manifest")
        .long("manifest")
        .required(true)
        .value_name("FILE")
        .help("Compile-parts manifest (JSON: files, prefix, server-url)");
    let cache_dir_arg = Arg::new("cache-dir")
        .long("cache-dir")
        .value_name("DIR")
        .help("Cache directory (default: ./.kiln-cache, or ~/.kiln-cache with --persistent-cache)");
    let persistent_arg = Arg::new("persistent-cache")
        .long("persistent-cache")
        .action(ArgAction::SetTrue)
        .help("Cache is owned and retained externally; skip per-build retention cleanup");

    let matches = Command::new("kiln")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build accelerator — fetch, verify, and unpack compiled class archives")
        .after_help(
            "Examples:\n  kiln materialize --manifest parts.json --output out/classes\n  kiln verify --manifest parts.json\n  kiln publish-check out/artifacts/app.jar --artifacts-root out/artifacts",
        )
        .arg_required_else_help(true)
        .subcommand(
            Command::new("materialize")
                .about("Fetch, verify, and unpack every part in the manifest")
                .arg(manifest_arg.clone())
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_name("DIR")
                        .help("Output tree; cleared in full before unpacking"),
                )
                .arg(cache_dir_arg.clone())
                .arg(persistent_arg.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output machine-readable JSON statistics"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Minimal output; show spinner when busy"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Repair the local cache and report what is missing; no network")
                .arg(manifest_arg.clone())
                .arg(cache_dir_arg.clone())
                .arg(persistent_arg.clone()),
        )
        .subcommand(
            Command::new("publish-check")
                .about("One-shot early-publish decision for a produced artifact")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_name("PATH")
                        .help("Path of the produced artifact"),
                )
                .arg(
                    Arg::new("artifacts-root")
                        .long("artifacts-root")
                        .required(true)
                        .value_name("DIR")
                        .help("Final artifacts directory"),
                )
                .arg(
                    Arg::new("produced")
                        .long("produced")
                        .value_name("BYTES")
                        .default_value("0")
                        .help("Bytes already produced this build"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("materialize", sub)) => {
            let manifest_path = PathBuf::from(sub.get_one::<String>("manifest").unwrap());
            let output = PathBuf::from(sub.get_one::<String>("output").unwrap());
            let cache_dir = sub.get_one::<String>("cache-dir").map(PathBuf::from);
            let persistent = sub.get_flag("persistent-cache");
            let json = sub.get_flag("json");
            let quiet = sub.get_flag("quiet");
            cmd_materialize(manifest_path, output, cache_dir, persistent, json, quiet)
        }
        Some(("verify", sub)) => {
            let manifest_path = PathBuf::from(sub.get_one::<String>("manifest").unwrap());
            let cache_dir = sub.get_one::<String>("cache-dir").map(PathBuf::from);
            let persistent = sub.get_flag("persistent-cache");
            cmd_verify(manifest_path, cache_dir, persistent)
        }
        Some(("publish-check", sub)) => {
            let path = PathBuf::from(sub.get_one::<String>("path").unwrap());
            let artifacts_root = PathBuf::from(sub.get_one::<String>("artifacts-root").unwrap());
            let produced = sub
                .get_one::<String>("produced")
                .unwrap()
                .parse::<u64>()
                .map_err(|e| format!("invalid --produced value: {}", e))?;
            cmd_publish_check(path, artifacts_root, produced)
        }
        _ => Err("Unknown command. Run `kiln --help`.".to_string()),
    }
}

fn cmd_materialize(
    manifest_path: PathBuf,
    output: PathBuf,
    cache_dir: Option<PathBuf>,
    persistent: bool,
    json: bool,
    quiet: bool,
) -> Result<(), String> {
    let manifest = PartsManifest::load(&manifest_path).map_err(|e| e.to_string())?;
    let part_count = manifest.len();
    let config = KilnConfig::resolve(cache_dir, persistent, output.clone());

    let snap: StatsSnapshot = run_with_spinner(
        &format!("Materializing {} compile parts …", part_count),
        quiet && !json,
        move || {
            let store = CacheStore::new(config.cache_root.clone(), config.persistent_cache);
            let client = HttpClient::new(config.network_concurrency);
            let sink = ConsoleSink::new().with_quiet(quiet || json);
            materialize(&manifest, &store, &client, &config.output_root, &sink)
                .map_err(|e| e.to_string())
        },
    )?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snap).map_err(|e| e.to_string())?
        );
    } else {
        success(&format!(
            "Materialized {} compile parts into {} ({} downloaded, {} reused)",
            snap.total_count,
            output.display(),
            snap.downloaded_count,
            snap.reused_count
        ));
    }
    Ok(())
}

fn cmd_verify(
    manifest_path: PathBuf,
    cache_dir: Option<PathBuf>,
    persistent: bool,
) -> Result<(), String> {
    let manifest = PartsManifest::load(&manifest_path).map_err(|e| e.to_string())?;
    let cache_root = cache_dir.unwrap_or_else(|| {
        if persistent {
            persistent_cache_root()
        } else {
            build_cache_root(Path::new("."))
        }
    });
    let store = CacheStore::new(cache_root, persistent);
    let sink = ConsoleSink::new();

    let summary = check(&manifest, &store, &sink).map_err(|e| e.to_string())?;
    if summary.is_complete() {
        success(&format!(
            "All {} compile parts are cached and verified",
            summary.intact
        ));
        Ok(())
    } else {
        for path in &summary.missing {
            dim(&format!("  missing {}", path));
        }
        Err(format!(
            "{} of {} compile parts missing from the cache ({} stale files deleted)",
            summary.missing.len(),
            manifest.len(),
            summary.repaired
        ))
    }
}

struct PrintNotifier;

impl PublishNotifier for PrintNotifier {
    fn notify(&self, message: &str) {
        info(message);
    }
}

fn cmd_publish_check(
    path: PathBuf,
    artifacts_root: PathBuf,
    produced: u64,
) -> Result<(), String> {
    let guard = PublishGuard::new(artifacts_root, PublishConfig::from_env());
    let session = PublishSession::with_produced(produced);

    match guard.offer(&session, &path, &PrintNotifier) {
        PublishDecision::Published => success("publish"),
        PublishDecision::Skipped => dim("skip (space reservation not met)"),
    }
    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
