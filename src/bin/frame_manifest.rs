use chainpulse::data::{analyze_table, write_manifest};
use chainpulse::export::read_frame;
use std::env;
use std::path::PathBuf;

/// Re-validates an exported table and rewrites its manifest.
fn main() {
    let Some(path) = env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: frame_manifest <table.csv>");
        std::process::exit(1);
    };

    let now_ts = chrono::Utc::now().timestamp();
    let manifest = match analyze_table(&path, now_ts) {
        Ok(m) => m,
        Err(err) => {
            eprintln!("analysis failed: {:#}", err);
            std::process::exit(3);
        }
    };

    // Only time-indexed frames re-read; other tables just get the manifest.
    let is_frame = manifest
        .columns
        .first()
        .map_or(false, |c| c == "timestamp" || c.starts_with("since_origin_"));
    if is_frame {
        match read_frame(&path) {
            Ok(frame) => println!(
                "frame ok: {} rows x {} columns",
                frame.rows(),
                frame.columns.len()
            ),
            Err(err) => {
                eprintln!("frame unreadable: {:#}", err);
                std::process::exit(2);
            }
        }
    }

    let out = match write_manifest(&manifest, &path) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("failed to write manifest: {:#}", err);
            std::process::exit(4);
        }
    };

    println!(
        "rows={} absent_cells={} gaps={} warnings={}",
        manifest.row_count,
        manifest.absent_cells,
        manifest.gaps.len(),
        manifest.warnings.len()
    );
    println!("sha256={}", manifest.hash_sha256);
    println!("manifest written: {}", out.display());
}
