//! Firmware images prepared for OTA transfer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Images are padded to a multiple of this many bytes.
pub const ALIGNMENT: usize = 32;
pub const PAD_BYTE: u8 = 0xFF;

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("firmware image {0:?} not found")]
    SourceMissing(PathBuf),
    #[error("failed to read firmware image {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("firmware image of {0} bytes does not fit a 32-bit length")]
    TooLarge(usize),
}

#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    source_len: usize,
}

impl FirmwareImage {
    pub fn load(path: &Path) -> Result<Self, FirmwareError> {
        if !path.is_file() {
            return Err(FirmwareError::SourceMissing(path.to_path_buf()));
        }

        let data = fs::read(path).map_err(|source| FirmwareError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self, FirmwareError> {
        let source_len = data.len();
        pad(&mut data);

        if u32::try_from(data.len()).is_err() {
            return Err(FirmwareError::TooLarge(data.len()));
        }
        Ok(Self { data, source_len })
    }

    /// Padded length, as announced to the device.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length of the image before padding.
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn chunks(&self, size: usize) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        chunks(&self.data, size)
    }
}

/// Pads `data` with 0xFF up to the next multiple of [`ALIGNMENT`].
pub fn pad(data: &mut Vec<u8>) {
    let remainder = data.len() % ALIGNMENT;
    if remainder != 0 {
        data.resize(data.len() + ALIGNMENT - remainder, PAD_BYTE);
    }
}

/// Splits `data` into `size`-byte chunks tagged with their byte offset. Only
/// the last chunk may be shorter.
///
/// # Panics
///
/// Panics if `size` is 0.
pub fn chunks(data: &[u8], size: usize) -> impl Iterator<Item = (u32, &[u8])> + '_ {
    data.chunks(size)
        .enumerate()
        .map(move |(i, chunk)| ((i * size) as u32, chunk))
}
