use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result, bail};

pub const DEFAULT_WINDOW_LINES: usize = 50;

const READ_CHUNK_BYTES: u64 = 8 * 1024;

/// Last `window` lines of `path` in file order, or `None` if it does not exist.
pub fn read_window(path: &Path, window: usize) -> Result<Option<Vec<String>>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open log {}", path.display()));
        }
    };
    let metadata = file
        .metadata()
        .with_context(|| format!("failed to stat log {}", path.display()))?;
    if metadata.is_dir() {
        bail!("log path {} is a directory", path.display());
    }
    if window == 0 {
        return Ok(Some(Vec::new()));
    }

    let tail = read_tail_bytes(&mut file, window)
        .with_context(|| format!("failed to read log {}", path.display()))?;
    Ok(Some(split_window(&tail, window)))
}

fn read_tail_bytes(file: &mut File, window: usize) -> io::Result<Vec<u8>> {
    let len = file.seek(SeekFrom::End(0))?;
    let mut start = len;
    let mut tail: Vec<u8> = Vec::new();

    // One extra break covers a trailing newline and the partial line in front.
    while start > 0 && count_breaks(&tail) <= window {
        let step = READ_CHUNK_BYTES.min(start);
        start -= step;
        file.seek(SeekFrom::Start(start))?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
    }

    Ok(tail)
}

fn count_breaks(bytes: &[u8]) -> usize {
    bytes.iter().filter(|byte| **byte == b'\n').count()
}

fn split_window(bytes: &[u8], window: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(window);
    lines[skip..].iter().map(ToString::to_string).collect()
}
