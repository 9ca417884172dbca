use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::tile::TilePosition;

/// `{slide}_tile_positions.tsv`
pub fn positions_file_name(slide: &str) -> String {
    format!("{slide}_tile_positions.tsv")
}

/// Write one `y<TAB>x` row per tile, in tile order.
pub fn write_positions(outdir: &Path, slide: &str, positions: &[TilePosition]) -> Result<PathBuf> {
    let path = outdir.join(positions_file_name(slide));
    let mut out = BufWriter::new(File::create(&path)?);
    for p in positions {
        writeln!(out, "{:.18e}\t{:.18e}", p.y, p.x)?;
    }
    out.flush()?;
    info!(path = %path.display(), tiles = positions.len(), "Wrote tile positions");
    Ok(path)
}

/// Parse a positions file written by [`write_positions`].
pub fn read_positions(path: &Path) -> Result<Vec<TilePosition>> {
    let text = std::fs::read_to_string(path)?;
    let mut positions = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split('\t').map(|c| c.trim().parse::<f64>());
        match (cols.next(), cols.next()) {
            (Some(Ok(y)), Some(Ok(x))) => positions.push(TilePosition { y, x }),
            _ => {
                return Err(crate::error::StitchError::Config(format!(
                    "{}:{}: expected two numeric columns",
                    path.display(),
                    lineno + 1
                )))
            }
        }
    }
    Ok(positions)
}
