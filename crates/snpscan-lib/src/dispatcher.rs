//! Round-based parallel scan over many input files.
//!
//! Workers are plain OS threads sharing the read-only database; they are
//! dispatched in rounds of at most `n_threads`, with a join barrier between
//! rounds. Each worker streams one input file and writes its own output, so
//! no synchronization exists on the hot path. The first worker failure
//! fails the whole run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::scanner::{scan_file, write_rows};
use crate::store::Database;

/// Scan every input, writing `<out_prefix>.<channel>.tsv` per input, where
/// `channel` is the input's 0-based position in `inputs`.
pub fn run(db: &Database, inputs: &[PathBuf], out_prefix: &str, n_threads: usize) -> Result<()> {
    let n_threads = n_threads.max(1);

    for (round, batch) in inputs.chunks(n_threads).enumerate() {
        info!("dispatching round {} ({} worker(s))", round, batch.len());
        let first_channel = round * n_threads;

        std::thread::scope(|scope| {
            let workers: Vec<_> = batch
                .iter()
                .enumerate()
                .map(|(i, input)| {
                    let channel = first_channel + i;
                    scope.spawn(move || scan_one(db, input, out_prefix, channel))
                })
                .collect();

            for worker in workers {
                worker.join().expect("scanner thread panicked")?;
            }
            Ok::<(), Error>(())
        })?;
    }

    Ok(())
}

fn scan_one(db: &Database, input: &Path, out_prefix: &str, channel: usize) -> Result<()> {
    let report = scan_file(db, input)?;
    if report.rows.is_empty() {
        info!("zero hits in {}", input.display());
    }

    let out_path = PathBuf::from(format!("{out_prefix}.{channel}.tsv"));
    let file = File::create(&out_path).map_err(|source| Error::Write {
        path: out_path.clone(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    write_rows(&report.rows, &mut out)
        .and_then(|_| out.flush())
        .map_err(|source| Error::Write { path: out_path.clone(), source })?;

    info!(
        "{}: {} SNPs from {} matches ({} windows, {} bloom hits) -> {}",
        input.display(),
        report.rows.len(),
        report.stats.matches,
        report.stats.positions,
        report.stats.bloom_hits,
        out_path.display()
    );
    Ok(())
}
