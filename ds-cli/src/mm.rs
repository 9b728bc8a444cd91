//! Minimal matrix-market reader: banner and size line only. The pipeline
//! needs the sparse shape, not the values.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::banded::MatrixInfo;

fn bad(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub fn read_info(path: impl AsRef<Path>) -> io::Result<MatrixInfo> {
    let mut lines = BufReader::new(File::open(path)?).lines();

    let banner = lines.next().ok_or_else(|| bad("empty file"))??;
    if !banner.starts_with("%%MatrixMarket matrix coordinate") {
        return Err(bad(format!("not a coordinate matrix-market file: {banner}")));
    }

    for line in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let rows = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| bad("bad size line"))?;
        let cols = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| bad("bad size line"))?;
        let nnz = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| bad("bad size line"))?;
        return Ok(MatrixInfo { rows, cols, nnz });
    }
    Err(bad("missing size line"))
}
