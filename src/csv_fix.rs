//! Repair of CSV exports whose quoted fields contain raw line breaks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{AppError, Result};

/// Lines after the header inspected by [`looks_like_csv`].
const VALIDATION_SAMPLE: usize = 4;

/// Replaces `\n` and `\r` inside quoted fields with the two-character
/// escapes `\\n` and `\\r`. Doubled quotes inside a field are kept as is.
pub fn fix_quoted_newlines(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                out.push_str("\"\"");
            }
            '"' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '\n' if in_quotes => out.push_str("\\n"),
            '\r' if in_quotes => out.push_str("\\r"),
            _ => out.push(c),
        }
    }

    out
}

/// Rough structural check: the header has commas and the first few rows
/// have a comma count within half of the header's.
pub fn looks_like_csv(content: &str) -> bool {
    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return false;
    };

    let header_commas = header.matches(',').count();
    if header_commas == 0 {
        return false;
    }

    let tolerance = header_commas as f64 * 0.5;
    lines.take(VALIDATION_SAMPLE).all(|line| {
        let commas = line.matches(',').count();
        (commas as f64 - header_commas as f64).abs() <= tolerance
    })
}

/// UTF-8 when valid, otherwise each byte is read as a Latin-1 code point.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| AppError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(decode(bytes))
}

/// Options for [`fix_csv_file`].
#[derive(Debug, Clone, Default)]
pub struct FixOptions {
    /// Destination; defaults to overwriting the input
    pub output: Option<PathBuf>,
    /// Rename the input to `<input>.backup` before writing
    pub backup: bool,
    pub validate: bool,
}

/// Fixes `input` and returns the path that was written.
pub fn fix_csv_file(input: &Path, options: &FixOptions) -> Result<PathBuf> {
    let (source, target) = if options.backup {
        let mut backup = input.as_os_str().to_owned();
        backup.push(".backup");
        let backup = PathBuf::from(backup);
        fs::rename(input, &backup).map_err(|e| AppError::WriteFile {
            path: backup.display().to_string(),
            source: e,
        })?;
        tracing::info!("Backup created: {}", backup.display());
        let target = options.output.clone().unwrap_or_else(|| input.to_path_buf());
        (backup, target)
    } else {
        let target = options.output.clone().unwrap_or_else(|| input.to_path_buf());
        (input.to_path_buf(), target)
    };

    let fixed = fix_quoted_newlines(&read_text(&source)?);
    fs::write(&target, &fixed).map_err(|e| AppError::WriteFile {
        path: target.display().to_string(),
        source: e,
    })?;
    tracing::info!("Fixed CSV saved to: {}", target.display());

    if options.validate {
        if !looks_like_csv(&fixed) {
            return Err(AppError::CsvValidation(target.display().to_string()));
        }
        tracing::info!("CSV structure validation passed");
    }

    Ok(target)
}
