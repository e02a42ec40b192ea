//! File-backed flash image
//!
//! ## Image Format
//! ```text
//! ┌──────────┬───────────────────────────────────┬─────────┬─────────────────┐
//! │ "SKVI"   │ bincode(FlashParameters, size)    │ padding │ device bytes... │
//! └──────────┴───────────────────────────────────┴─────────┴─────────────────┘
//!   0          4                                    ..64      64
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{check_bounds, Flash, FlashError, FlashParameters};

const IMAGE_MAGIC: &[u8; 4] = b"SKVI";
const IMAGE_HEADER_SIZE: u64 = 64;

#[derive(Debug, Serialize, Deserialize)]
struct ImageHeader {
    params: FlashParameters,
    size: u64,
}

/// Flash device persisted in a regular file
#[derive(Debug)]
pub struct FileFlash {
    file: Mutex<File>,
    path: PathBuf,
    params: FlashParameters,
    size: u64,
}

impl FileFlash {
    /// Create (or truncate) an image of `size` erased bytes
    pub fn create(
        path: impl AsRef<Path>,
        size: u64,
        params: FlashParameters,
    ) -> Result<Self, FlashError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let encoded = bincode::serialize(&ImageHeader { params, size }).map_err(invalid_data)?;
        let mut header = [0u8; IMAGE_HEADER_SIZE as usize];
        if IMAGE_MAGIC.len() + encoded.len() > header.len() {
            return Err(invalid_data("image header does not fit"));
        }
        header[..4].copy_from_slice(IMAGE_MAGIC);
        header[4..4 + encoded.len()].copy_from_slice(&encoded);
        file.write_all(&header)?;

        let chunk = vec![params.erase_value; 4096];
        let mut remaining = size;
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        file.sync_all()?;

        tracing::debug!(path = %path.display(), size, "Created flash image");

        Ok(Self {
            file: Mutex::new(file),
            path,
            params,
            size,
        })
    }

    /// Open an existing image
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlashError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; IMAGE_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[..4] != IMAGE_MAGIC {
            return Err(invalid_data("not a sectorkv flash image"));
        }
        let ImageHeader { params, size } =
            bincode::deserialize(&header[4..]).map_err(invalid_data)?;

        if file.metadata()?.len() < IMAGE_HEADER_SIZE + size {
            return Err(invalid_data("flash image is truncated"));
        }

        Ok(Self {
            file: Mutex::new(file),
            path,
            params,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush written bytes to stable storage
    pub fn sync(&self) -> Result<(), FlashError> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        file.seek(SeekFrom::Start(IMAGE_HEADER_SIZE + offset))?;
        file.read_exact(buf)
    }

    fn write_at(file: &mut File, offset: u64, data: &[u8]) -> io::Result<()> {
        file.seek(SeekFrom::Start(IMAGE_HEADER_SIZE + offset))?;
        file.write_all(data)
    }
}

impl Flash for FileFlash {
    fn parameters(&self) -> FlashParameters {
        self.params
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), FlashError> {
        check_bounds(self.size, offset, buf.len())?;
        let mut file = self.file.lock();
        Self::read_at(&mut file, offset, buf)?;
        Ok(())
    }

    fn program(&mut self, offset: u64, data: &[u8]) -> Result<(), FlashError> {
        check_bounds(self.size, offset, data.len())?;
        let block = self.params.write_block_size as u64;
        if offset % block != 0 || data.len() as u64 % block != 0 {
            return Err(FlashError::Misaligned {
                offset,
                len: data.len(),
            });
        }

        let file = self.file.get_mut();
        if self.params.explicit_erase {
            // NOR cells only go 1 -> 0
            let mut cells = vec![0u8; data.len()];
            Self::read_at(file, offset, &mut cells)?;
            for (cell, byte) in cells.iter_mut().zip(data) {
                *cell &= *byte;
            }
            Self::write_at(file, offset, &cells)?;
        } else {
            Self::write_at(file, offset, data)?;
        }
        Ok(())
    }

    fn erase(&mut self, offset: u64, len: usize) -> Result<(), FlashError> {
        check_bounds(self.size, offset, len)?;
        let page = self.params.erase_page_size as u64;
        if offset % page != 0 || len as u64 % page != 0 {
            return Err(FlashError::Misaligned { offset, len });
        }

        let fill = vec![self.params.erase_value; len];
        Self::write_at(self.file.get_mut(), offset, &fill)?;
        Ok(())
    }
}

fn invalid_data(err: impl ToString) -> FlashError {
    FlashError::Io(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
