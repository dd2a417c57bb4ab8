//! orthodsf - compiles DSF terrain tiles from upstream meshes.
//!
//! Usage: orthodsf --tile <LAT,LON> [--tile <LAT,LON> ...] [OPTIONS]
//!
//! Options:
//!   --tile <LAT,LON>    Tile to compile, south-west corner (repeatable)
//!   --build-dir <DIR>   Build directory holding the meshes (default: "Tiles")
//!   --config <FILE>     JSON compile configuration (default: built-in)
//!   --jobs <N>          Tiles compiled in parallel (default: 1)
//!   --fetch-jobs <N>    Concurrent texture fetches (default: 4)
//!
//! Input:
//!   <build-dir>/Data+LL+LLL.mesh
//!
//! Output:
//!   <build-dir>/
//!     Earth nav data/+40+000/+45+005.dsf
//!     terrain/*.ter
//!     textures/pending_textures.json   # textures still to fetch

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use orthodsf::compile::{CompileConfig, CompileReport, TileCompiler};
use orthodsf::core::{logging, CancelToken, Result};
use orthodsf::fetch::{ManifestSource, TextureDownloader, MANIFEST_FILE};
use orthodsf::geo::TileCoord;

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let tiles = parse_tiles(&args);
    if tiles.is_empty() {
        eprintln!("Usage: orthodsf --tile <LAT,LON> [--tile ...] [--build-dir DIR] [--config FILE] [--jobs N]");
        return ExitCode::from(2);
    }
    let build_dir = PathBuf::from(parse_str_arg(&args, "--build-dir").unwrap_or_else(|| "Tiles".to_string()));
    let jobs = parse_usize_arg(&args, "--jobs").unwrap_or(1).max(1);
    let fetch_jobs = parse_usize_arg(&args, "--fetch-jobs").unwrap_or(4);

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => match CompileConfig::load(&PathBuf::from(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Cannot load config {}: {}", path, e);
                return ExitCode::from(2);
            }
        },
        None => CompileConfig::default(),
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build_global()
        .expect("Failed to configure thread pool");

    println!("=== orthodsf ===");
    println!("Tiles:  {}", tiles.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" "));
    println!("Build:  {}", build_dir.display());
    println!("Jobs:   {} parallel", jobs);
    println!();

    match run(&tiles, &build_dir, &config, fetch_jobs) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Compile every tile; `Ok(false)` if any tile failed.
fn run(tiles: &[TileCoord], build_dir: &Path, config: &CompileConfig, fetch_jobs: usize) -> Result<bool> {
    let manifest = Arc::new(ManifestSource::new());
    let downloader = TextureDownloader::spawn(manifest.clone(), fetch_jobs, tiles.len())?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    downloader.runtime().spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping after the current stage");
            on_interrupt.cancel();
        }
    });

    let start = Instant::now();
    let queue = downloader.queue();
    let results: Vec<(TileCoord, Result<CompileReport>)> = tiles
        .par_iter()
        .map(|&tile| {
            let compiler = TileCompiler::new(config, build_dir, queue.clone(), cancel.clone());
            (tile, compiler.compile(tile))
        })
        .collect();
    drop(queue);

    let fetch = downloader.join()?;
    manifest.write(&build_dir.join("textures").join(MANIFEST_FILE))?;

    let mut ok = true;
    for (tile, result) in &results {
        match result {
            Ok(report) => println!(
                "  {} -> {} ({} terrains, {} pools, {} bytes)",
                tile,
                report.dsf_path.display(),
                report.terrains,
                report.point_pools,
                report.atoms.total
            ),
            Err(e) => {
                ok = false;
                println!("  {} FAILED: {}", tile, e);
            }
        }
    }
    println!();
    println!(
        "Done in {:.1}s, {} textures pending ({} duplicate requests)",
        start.elapsed().as_secs_f64(),
        fetch.fetched,
        fetch.duplicates
    );
    Ok(ok)
}

/// Every `--tile LAT,LON` value.
fn parse_tiles(args: &[String]) -> Vec<TileCoord> {
    args.windows(2)
        .filter(|w| w[0] == "--tile")
        .filter_map(|w| {
            let (lat, lon) = w[1].split_once(',')?;
            match (lat.trim().parse(), lon.trim().parse()) {
                (Ok(lat), Ok(lon)) => Some(TileCoord::new(lat, lon)),
                _ => {
                    eprintln!("Ignoring malformed tile `{}`", w[1]);
                    None
                }
            }
        })
        .collect()
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
