//! Sparse 2D co-occurrence counter, tiled into per-region hash tables.
//!
//! [`TileMatrix`] is the mutable accumulator used during a corpus build:
//! cells are created on first insert, counts only grow, and pruning clears
//! low-count cells in place to bound memory. [`TileMatrix::finalize`]
//! consumes the accumulator and produces a [`NeighborMatrix`] whose tiles
//! are sorted for row queries; the read-only type carries no insert or
//! prune API, so the mutable-after-finalize mistake does not compile.
//!
//! A matrix cell `(x, y)` counts how often lexicon entry `x` occurred in
//! the window around entry `y`; `row(y)` therefore lists the neighborhood
//! of `y`. Tiles are `tile_side × tile_side` regions, allocated lazily —
//! co-occurrence data is heavily skewed and most tiles of a large grid
//! stay empty.
//!
//! The on-disk format is fixed (magic `HQUA`, little-endian header, then
//! per-tile live-cell runs in row-major tile order); see `read_binary` and
//! `write_binary`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::tile::{Cell, Tile};

/// Default tile edge length. Both local coordinates must fit in 16 bits.
pub const DEFAULT_TILE_SIDE: u16 = 8192;

const MAGIC: &[u8; 4] = b"HQUA";

fn pack(rx: u32, ry: u32) -> u32 {
    rx | (ry << 16)
}

/// Shared geometry of the mutable and finalized matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    tile_side: u16,
    w_tiles: u32,
    h_tiles: u32,
}

impl Geometry {
    fn new(tile_side: u16, width: u32, height: u32) -> Self {
        let side = tile_side as u32;
        Self {
            tile_side,
            w_tiles: width.saturating_sub(1) / side + 1,
            h_tiles: height.saturating_sub(1) / side + 1,
        }
    }

    fn tile_count(&self) -> usize {
        self.w_tiles as usize * self.h_tiles as usize
    }

    fn locate(&self, x: u32, y: u32) -> Option<(usize, u32)> {
        let side = self.tile_side as u32;
        let (qx, qy) = (x / side, y / side);
        if qx >= self.w_tiles || qy >= self.h_tiles {
            return None;
        }
        let idx = (qy * self.w_tiles + qx) as usize;
        Some((idx, pack(x % side, y % side)))
    }
}

/// Mutable co-occurrence accumulator.
#[derive(Debug)]
pub struct TileMatrix {
    geom: Geometry,
    used: u32,
    tiles: Vec<Option<Tile>>,
}

impl TileMatrix {
    /// Create a matrix covering `width × height` logical coordinates.
    pub fn new(tile_side: u16, width: u32, height: u32) -> Self {
        let geom = Geometry::new(tile_side, width, height);
        Self {
            geom,
            used: 0,
            tiles: vec![None; geom.tile_count()],
        }
    }

    /// Live (nonzero) cell count across all tiles.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Add `delta` to cell `(x, y)`. Returns true when the insert created a
    /// fresh cell. Coordinates outside the configured geometry are an
    /// error; the build pipeline treats that case as a skip.
    pub fn set(&mut self, x: u32, y: u32, delta: u32) -> Result<bool> {
        let Some((idx, coord)) = self.geom.locate(x, y) else {
            return Err(Error::OutOfRange { x, y });
        };
        let tile = self.tiles[idx].get_or_insert_with(Tile::new);
        let fresh = tile.add(coord, delta);
        if fresh {
            self.used += 1;
        }
        Ok(fresh)
    }

    /// Current count of cell `(x, y)`, zero when absent or out of range.
    pub fn get(&self, x: u32, y: u32) -> u32 {
        match self.geom.locate(x, y) {
            Some((idx, coord)) => self.tiles[idx].as_ref().map_or(0, |t| t.find(coord)),
            None => 0,
        }
    }

    /// Clear every cell with `count <= threshold`. Returns the number of
    /// cells removed.
    pub fn prune(&mut self, threshold: u32) -> u64 {
        let mut removed = 0u64;
        for tile in self.tiles.iter_mut().flatten() {
            let r = tile.prune(threshold);
            self.used -= r;
            removed += u64::from(r);
        }
        info!(removed, used = self.used, "pruned low-count cells");
        removed
    }

    /// Sort every tile into row-query order and seal the matrix. One-way:
    /// the result answers queries and serializes, but admits no inserts.
    pub fn finalize(mut self) -> NeighborMatrix {
        for tile in self.tiles.iter_mut().flatten() {
            tile.finalize();
        }
        debug!(used = self.used, "matrix finalized");
        NeighborMatrix {
            geom: self.geom,
            used: self.used,
            tiles: self.tiles,
        }
    }
}

/// Finalized, row-queryable matrix.
#[derive(Debug)]
pub struct NeighborMatrix {
    geom: Geometry,
    used: u32,
    tiles: Vec<Option<Tile>>,
}

impl NeighborMatrix {
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn tile_side(&self) -> u16 {
        self.geom.tile_side
    }

    /// Count of cell `(x, y)`, zero when absent. Row-scan based; the hash
    /// layout is gone after finalization.
    pub fn get(&self, x: u32, y: u32) -> u32 {
        let side = self.geom.tile_side as u32;
        let Some((idx, coord)) = self.geom.locate(x, y) else {
            return 0;
        };
        let Some(tile) = self.tiles[idx].as_ref() else {
            return 0;
        };
        tile.row_cells(y % side)
            .iter()
            .find(|c| c.coord == coord)
            .map_or(0, |c| c.count)
    }

    /// Collect the neighborhood of row `y` into `out` as `(x, count)`
    /// pairs, at most `max_elements` of them. Pairs arrive grouped by tile
    /// column left to right, count-descending within each tile's portion.
    /// Returns the number of pairs collected.
    pub fn row_into(&self, y: u32, max_elements: usize, out: &mut Vec<(u32, u32)>) -> usize {
        out.clear();
        let side = self.geom.tile_side as u32;
        let qy = y / side;
        if qy >= self.geom.h_tiles {
            return 0;
        }
        let local_y = y % side;
        for qx in 0..self.geom.w_tiles {
            let idx = (qy * self.geom.w_tiles + qx) as usize;
            let Some(tile) = self.tiles[idx].as_ref() else {
                continue;
            };
            for cell in tile.row_cells(local_y) {
                out.push(((cell.coord & 0xFFFF) + qx * side, cell.count));
                if out.len() >= max_elements {
                    return out.len();
                }
            }
        }
        out.len()
    }

    /// Convenience wrapper over [`NeighborMatrix::row_into`].
    pub fn row(&self, y: u32, max_elements: usize) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        self.row_into(y, max_elements, &mut out);
        out
    }

    /// Serialize to the binary matrix format. The file appears under
    /// `path` only after a fully successful write (temp file + rename).
    pub fn write_binary(&self, path: &Path) -> Result<()> {
        let tmp = temp_sibling(path);
        let result = (|| -> Result<()> {
            let file = File::create(&tmp).map_err(|e| Error::Open {
                path: tmp.clone(),
                source: e,
            })?;
            let mut out = BufWriter::new(file);
            out.write_all(MAGIC)?;
            out.write_all(&self.geom.w_tiles.to_le_bytes())?;
            out.write_all(&self.geom.h_tiles.to_le_bytes())?;
            out.write_all(&self.geom.tile_side.to_le_bytes())?;
            out.write_all(&self.used.to_le_bytes())?;
            for tile in &self.tiles {
                match tile {
                    Some(t) => {
                        out.write_all(&t.num().to_le_bytes())?;
                        for cell in t.cells() {
                            out.write_all(&cell.coord.to_le_bytes())?;
                            out.write_all(&cell.count.to_le_bytes())?;
                        }
                    }
                    // Unallocated and fully pruned tiles look the same on
                    // disk: a zero cell run.
                    None => out.write_all(&0u32.to_le_bytes())?,
                }
            }
            out.flush()?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                std::fs::rename(&tmp, path)?;
                info!(path = %path.display(), used = self.used, "matrix written");
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    /// Load a matrix previously written by [`NeighborMatrix::write_binary`].
    pub fn read_binary(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut input = BufReader::new(file);

        let mut magic = [0u8; 4];
        read_exact(&mut input, &mut magic, path)?;
        if &magic != MAGIC {
            return Err(Error::CorruptMagic {
                path: path.to_path_buf(),
            });
        }
        let w_tiles = read_u32(&mut input, path)?;
        let h_tiles = read_u32(&mut input, path)?;
        let tile_side = read_u16(&mut input, path)?;
        let used = read_u32(&mut input, path)?;
        let geom = Geometry {
            tile_side,
            w_tiles,
            h_tiles,
        };
        let mut tiles = Vec::with_capacity(geom.tile_count());
        for _ in 0..geom.tile_count() {
            let num = read_u32(&mut input, path)? as usize;
            if num == 0 {
                tiles.push(None);
                continue;
            }
            let mut cells = Vec::with_capacity(num);
            for _ in 0..num {
                let coord = read_u32(&mut input, path)?;
                let count = read_u32(&mut input, path)?;
                cells.push(Cell { coord, count });
            }
            tiles.push(Some(Tile::from_cells(cells)));
        }
        Ok(Self { geom, used, tiles })
    }

    /// Emit the matrix as text, one line per lexicon entry with a non-empty
    /// neighborhood: `text: n1_c1, n2_c2, ...` with at most `area`
    /// neighbors.
    pub fn write_text(&self, path: &Path, lexicon: &Lexicon, area: usize) -> Result<()> {
        let tmp = temp_sibling(path);
        let result = (|| -> Result<()> {
            let file = File::create(&tmp).map_err(|e| Error::Open {
                path: tmp.clone(),
                source: e,
            })?;
            let mut out = BufWriter::new(file);
            let mut row = Vec::with_capacity(area);
            for y in 0..lexicon.len() as u32 {
                if self.row_into(y, area, &mut row) == 0 {
                    continue;
                }
                out.write_all(lexicon.text(y).as_bytes())?;
                out.write_all(b": ")?;
                for (i, (x, count)) in row.iter().enumerate() {
                    if i > 0 {
                        out.write_all(b", ")?;
                    }
                    write!(out, "{}_{}", lexicon.text(*x), count)?;
                }
                out.write_all(b"\r\n")?;
                if y % 1024 == 0 {
                    debug!(rows = y, "emitting neighborhoods");
                }
            }
            out.flush()?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                std::fs::rename(&tmp, path)?;
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(e)
            }
        }
    }
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_exact<R: Read>(input: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(e)
        }
    })
}

fn read_u32<R: Read>(input: &mut R, path: &Path) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(input, &mut buf, path)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16<R: Read>(input: &mut R, path: &Path) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(input, &mut buf, path)?;
    Ok(u16::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut m = TileMatrix::new(DEFAULT_TILE_SIDE, 100, 100);
        assert!(m.set(3, 7, 2).unwrap());
        assert!(!m.set(3, 7, 1).unwrap());
        assert_eq!(m.get(3, 7), 3);
        assert_eq!(m.get(7, 3), 0);
        assert_eq!(m.used(), 1);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut m = TileMatrix::new(16, 16, 16);
        assert!(matches!(
            m.set(16, 0, 1),
            Err(Error::OutOfRange { x: 16, y: 0 })
        ));
        assert_eq!(m.get(99, 99), 0);
    }

    #[test]
    fn prune_drops_singletons_only() {
        let mut m = TileMatrix::new(DEFAULT_TILE_SIDE, 10, 10);
        m.set(1, 0, 1).unwrap();
        m.set(1, 0, 1).unwrap();
        m.set(2, 0, 1).unwrap();
        let removed = m.prune(1);
        assert_eq!(removed, 1);
        assert_eq!(m.get(1, 0), 2);
        assert_eq!(m.get(2, 0), 0);
        assert_eq!(m.used(), 1);
    }

    #[test]
    fn rows_cross_tile_boundaries_in_column_blocks() {
        // Tiny tiles so one logical row spans several tile columns.
        let mut m = TileMatrix::new(4, 12, 12);
        m.set(1, 2, 5).unwrap();
        m.set(2, 2, 9).unwrap();
        m.set(6, 2, 7).unwrap();
        m.set(11, 2, 1).unwrap();
        m.set(1, 3, 8).unwrap();
        let nm = m.finalize();
        let row = nm.row(2, usize::MAX);
        // First tile block count-descending, then the next blocks.
        assert_eq!(row, vec![(2, 9), (1, 5), (6, 7), (11, 1)]);
        // Column ids never decrease across tile boundaries.
        let mut last_block = 0;
        for (x, _) in &row {
            let block = x / 4;
            assert!(block >= last_block);
            last_block = block;
        }
        assert_eq!(nm.row(3, usize::MAX), vec![(1, 8)]);
        assert_eq!(nm.get(6, 2), 7);
        assert_eq!(nm.get(6, 3), 0);
    }

    #[test]
    fn row_respects_max_elements() {
        let mut m = TileMatrix::new(DEFAULT_TILE_SIDE, 64, 64);
        for x in 0..10 {
            m.set(x, 5, x + 1).unwrap();
        }
        let nm = m.finalize();
        let row = nm.row(5, 4);
        assert_eq!(row.len(), 4);
    }

    #[test]
    fn binary_roundtrip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("m1.neighbors");
        let p2 = dir.path().join("m2.neighbors");

        let mut m = TileMatrix::new(4, 12, 12);
        m.set(1, 2, 5).unwrap();
        m.set(2, 2, 9).unwrap();
        m.set(6, 2, 7).unwrap();
        m.set(3, 9, 2).unwrap();
        let nm = m.finalize();
        nm.write_binary(&p1).unwrap();

        let back = NeighborMatrix::read_binary(&p1).unwrap();
        assert_eq!(back.used(), nm.used());
        assert_eq!(back.row(2, usize::MAX), nm.row(2, usize::MAX));
        assert_eq!(back.row(9, usize::MAX), nm.row(9, usize::MAX));

        back.write_binary(&p2).unwrap();
        assert_eq!(
            std::fs::read(&p1).unwrap(),
            std::fs::read(&p2).unwrap(),
            "write -> read -> write must reproduce the file"
        );
    }

    #[test]
    fn corrupt_magic_and_truncation_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.neighbors");
        std::fs::write(&bad, b"NOPE").unwrap();
        assert!(matches!(
            NeighborMatrix::read_binary(&bad),
            Err(Error::CorruptMagic { .. })
        ));

        let short = dir.path().join("short.neighbors");
        std::fs::write(&short, b"HQUA\x01\x00").unwrap();
        assert!(matches!(
            NeighborMatrix::read_binary(&short),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn text_output_lists_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut lex = Lexicon::new();
        for w in ["sun", "moon", "star"] {
            lex.add(w, 0, 1).unwrap();
        }
        let mut m = TileMatrix::new(DEFAULT_TILE_SIDE, 3, 3);
        m.set(1, 0, 4).unwrap();
        m.set(2, 0, 2).unwrap();
        m.set(0, 1, 4).unwrap();
        let nm = m.finalize();
        nm.write_text(&path, &lex, 64).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("sun: moon_4, star_2\r\n"));
        assert!(text.contains("moon: sun_4\r\n"));
        assert!(!text.contains("star:"));
    }
}
