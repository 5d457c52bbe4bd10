//! Record-oriented splitting and line-wise merging shared by units.
//!
//! A record starts at a header line and runs until the next header. Lines
//! before the first header (the preamble) travel with the first partition.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::WorkUnitError;

/// Lines written between two flushes while merging.
pub const FLUSH_EVERY: usize = 50;

/// Splits `source` into `targets.len()` files of whole records. Each file
/// but the last receives `ceil(records / partitions)` records; trailing
/// files may be empty. Returns the record count written to each file.
///
/// # Errors
///
/// Returns [`WorkUnitError::PartitionMismatch`] for zero targets and
/// [`WorkUnitError::Io`] when a file cannot be accessed.
pub fn split_records(
    source: &Path,
    targets: &[PathBuf],
    is_header: impl Fn(&str) -> bool,
) -> Result<Vec<usize>, WorkUnitError> {
    if targets.is_empty() {
        return Err(WorkUnitError::PartitionMismatch {
            expected: 1,
            actual: 0,
        });
    }
    let file = File::open(source).map_err(|err| WorkUnitError::io(source, &err))?;
    let lines = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| WorkUnitError::io(source, &err))?;
    let headers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_header(line))
        .map(|(index, _)| index)
        .collect();

    let total = headers.len();
    let per_partition = total.div_ceil(targets.len()).max(1);
    let mut counts = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        let first = index * per_partition;
        let end = (first + per_partition).min(total);
        let from = if index == 0 {
            0
        } else {
            headers.get(first).copied().unwrap_or(lines.len())
        };
        let to = headers.get(end).copied().unwrap_or(lines.len());
        let slice = lines.get(from..to.max(from)).unwrap_or_default();
        write_lines(target, slice)?;
        counts.push(end.saturating_sub(first));
    }
    Ok(counts)
}

fn write_lines(target: &Path, lines: &[String]) -> Result<(), WorkUnitError> {
    let file = File::create(target).map_err(|err| WorkUnitError::io(target, &err))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{line}").map_err(|err| WorkUnitError::io(target, &err))?;
    }
    writer.flush().map_err(|err| WorkUnitError::io(target, &err))
}

/// Appends every line of `sources`, in order, to a new `destination`,
/// flushing every [`FLUSH_EVERY`] lines. Returns the number of lines written.
///
/// # Errors
///
/// Returns [`WorkUnitError::Io`] naming the file that failed.
pub fn concatenate_lines(destination: &Path, sources: &[PathBuf]) -> Result<usize, WorkUnitError> {
    let file = File::create(destination).map_err(|err| WorkUnitError::io(destination, &err))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0_usize;
    let mut since_flush = 0_usize;
    for source in sources {
        let input = File::open(source).map_err(|err| WorkUnitError::io(source, &err))?;
        for line in BufReader::new(input).lines() {
            let text = line.map_err(|err| WorkUnitError::io(source, &err))?;
            writeln!(writer, "{text}").map_err(|err| WorkUnitError::io(destination, &err))?;
            written += 1;
            since_flush += 1;
            if since_flush == FLUSH_EVERY {
                writer
                    .flush()
                    .map_err(|err| WorkUnitError::io(destination, &err))?;
                since_flush = 0;
            }
        }
    }
    writer
        .flush()
        .map_err(|err| WorkUnitError::io(destination, &err))?;
    Ok(written)
}
