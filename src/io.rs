//! Point-set text files
//!
//! One point per line, coordinates separated by whitespace or commas.
//! Blank lines and `#` comments are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

/// Errors raised while reading a point file
#[derive(Debug, Error)]
pub enum PointFileError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Token that is not a finite number
    #[error("line {line}: invalid coordinate {token:?}")]
    InvalidCoordinate {
        /// 1-based line number
        line: usize,
        /// Offending token
        token: String,
    },

    /// Point with a different dimension than the first one
    #[error("line {line}: expected {expected} coordinates, found {found}")]
    DimensionMismatch {
        /// 1-based line number
        line: usize,
        /// Dimension of the first point
        expected: usize,
        /// Dimension on this line
        found: usize,
    },

    /// File holds no points
    #[error("no points found")]
    Empty,
}

/// Read points from `path`.
pub fn read_points(path: &Path) -> Result<Vec<Vec<f64>>, PointFileError> {
    let file = File::open(path)?;
    parse_points(BufReader::new(file))
}

/// Parse points from any buffered reader.
pub fn parse_points<R: BufRead>(reader: R) -> Result<Vec<Vec<f64>>, PointFileError> {
    let mut points: Vec<Vec<f64>> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }

        let point = content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| match token.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(PointFileError::InvalidCoordinate {
                    line: idx + 1,
                    token: token.to_string(),
                }),
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if let Some(first) = points.first() {
            if first.len() != point.len() {
                return Err(PointFileError::DimensionMismatch {
                    line: idx + 1,
                    expected: first.len(),
                    found: point.len(),
                });
            }
        }
        points.push(point);
    }

    if points.is_empty() {
        return Err(PointFileError::Empty);
    }
    Ok(points)
}
