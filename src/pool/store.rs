//! Flat-file backing store: one credential per line.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::credential::Credential;

/// Parse store content into credentials.
///
/// Lines are trimmed; blank lines are skipped. Order is preserved.
pub(crate) fn parse(content: &str) -> Vec<Credential> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Credential::from)
        .collect()
}

pub(crate) fn read(path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path)
}

/// Append `token` as one complete line and flush it to disk.
///
/// The line is emitted with a single `write_all` on an `O_APPEND` handle.
/// A store whose last line lacks its newline gets one first, so the token
/// never fuses with the previous entry.
pub(crate) fn append_line(path: &Path, token: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let mut line = String::with_capacity(token.len() + 2);
    if !ends_with_newline(&mut file)? {
        line.push('\n');
    }
    line.push_str(token);
    line.push('\n');

    file.write_all(line.as_bytes())?;
    file.sync_data()
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Truncate the store to zero length.
pub(crate) fn truncate(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.sync_data()
}
