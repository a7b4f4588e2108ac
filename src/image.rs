use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::types::{BlockIndex, Geometry, ImageError};

/// Raw flash image held in memory, addressed as fixed-size blocks.
///
/// Files shorter than `block_size * block_count` are zero-filled to the
/// full geometry: zeros are neither blank nor printable, so a truncated
/// tail surfaces as binary orphans rather than being silently skipped.
pub struct ImageStore {
    data: Vec<u8>,
    geometry: Geometry,
}

impl ImageStore {
    pub fn load(path: impl AsRef<Path>, geometry: Geometry) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|source| ImageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut data = vec![0u8; geometry.image_len()];
        let mut filled = 0;
        while filled < data.len() {
            let n = file
                .read(&mut data[filled..])
                .map_err(|source| ImageError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(Self { data, geometry })
    }

    pub fn from_bytes(bytes: Vec<u8>, geometry: Geometry) -> Self {
        let mut data = bytes;
        data.resize(geometry.image_len(), 0);
        Self { data, geometry }
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.geometry.block_count
    }

    pub fn block(&self, index: BlockIndex) -> Result<&[u8], ImageError> {
        if index >= self.geometry.block_count {
            return Err(ImageError::OutOfRange {
                index,
                count: self.geometry.block_count,
            });
        }
        let bs = self.geometry.block_size as usize;
        let start = index as usize * bs;
        Ok(&self.data[start..start + bs])
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockIndex, &[u8])> {
        let bs = self.geometry.block_size as usize;
        self.data
            .chunks_exact(bs)
            .enumerate()
            .map(|(i, chunk)| (i as BlockIndex, chunk))
    }
}
