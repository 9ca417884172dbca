use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;
use ndarray::{ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{Result, StitchError};

/// Memory-mapped `(channel, y, x)` u16 mosaic storage.
///
/// The backing file lives in a private temporary directory owned by the
/// buffer. Dropping the buffer unmaps the data and removes the directory,
/// so scratch space is reclaimed on every exit path.
pub struct MosaicBuffer {
    // Field order matters: the map must be dropped before its directory.
    mmap: MmapMut,
    shape: (usize, usize, usize),
    dir: TempDir,
}

impl MosaicBuffer {
    /// Allocate a zero-filled buffer backed by a scratch directory under `parent`.
    pub fn create_in(parent: &Path, shape: (usize, usize, usize)) -> Result<Self> {
        let (c, h, w) = shape;
        let bytes = c
            .checked_mul(h)
            .and_then(|v| v.checked_mul(w))
            .and_then(|v| v.checked_mul(std::mem::size_of::<u16>()))
            .ok_or_else(|| StitchError::Config(format!("Mosaic {c}x{h}x{w} is too large")))?;
        if bytes == 0 {
            return Err(StitchError::Config(format!(
                "Mosaic shape {c}x{h}x{w} is empty"
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix(".tilestitch-")
            .tempdir_in(parent)?;
        let path = dir.path().join("mosaic.u16");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(bytes as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        check_layout(&mmap, shape)?;
        debug!(path = %path.display(), bytes, "Allocated mosaic buffer");

        Ok(Self { mmap, shape, dir })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Scratch directory holding the backing file.
    pub fn scratch_dir(&self) -> &Path {
        self.dir.path()
    }

    // The mapping is never resized, so the layout checked in `create_in` holds for every view.
    pub fn view(&self) -> ArrayView3<'_, u16> {
        let data: &[u16] = bytemuck::cast_slice(&self.mmap[..]);
        ArrayView3::from_shape(self.shape, data).expect("layout checked at creation")
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, u16> {
        let data: &mut [u16] = bytemuck::cast_slice_mut(&mut self.mmap[..]);
        ArrayViewMut3::from_shape(self.shape, data).expect("layout checked at creation")
    }

    pub fn plane(&self, channel: usize) -> ArrayView2<'_, u16> {
        self.view().index_axis_move(Axis(0), channel)
    }

    pub fn plane_mut(&mut self, channel: usize) -> ArrayViewMut2<'_, u16> {
        self.view_mut().index_axis_move(Axis(0), channel)
    }
}

/// Confirm the mapping reinterprets as a `(c, h, w)` u16 array.
fn check_layout(mmap: &MmapMut, shape: (usize, usize, usize)) -> Result<()> {
    let data: &[u16] = bytemuck::try_cast_slice(&mmap[..]).map_err(|e| {
        StitchError::Config(format!("Mosaic mapping is not a u16 buffer: {e}"))
    })?;
    ArrayView3::from_shape(shape, data).map_err(|e| {
        StitchError::Config(format!(
            "Mosaic mapping of {} bytes does not fit {}x{}x{}: {e}",
            mmap.len(),
            shape.0,
            shape.1,
            shape.2
        ))
    })?;
    Ok(())
}
