//! Versioned serialization header.
//!
//! Every index file written by this library starts with:
//!
//! ```text
//! +------------------+------+
//! | magic "VOYA"     | 4 B  |
//! +------------------+------+
//! | version (i32 LE) | 4 B  |
//! +------------------+------+
//! | per-version body | …    |
//! +------------------+------+
//! ```
//!
//! followed by the HNSW graph body. Legacy (V0) files carry no magic: they
//! begin directly with the graph body, whose first field is an 8-byte
//! little-endian offset, and the caller must supply the space,
//! dimensionality, and storage type out-of-band. Load therefore peeks four
//! bytes before committing to either path.

use crate::error::{Error, Result};
use crate::spaces::SpaceType;
use crate::storage::StorageDataType;
use crate::streams::{
    read_f32_le, read_i32_le, read_u8, write_f32_le, write_i32_le, write_u8, InputStream,
    OutputStream,
};

/// File magic introducing a versioned header.
pub(crate) const MAGIC: [u8; 4] = *b"VOYA";

/// Current header version.
pub(crate) const CURRENT_VERSION: i32 = 1;

/// Parsed V1 metadata block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Metadata {
    pub(crate) num_dimensions: usize,
    pub(crate) space: SpaceType,
    pub(crate) storage: StorageDataType,
    pub(crate) max_norm: f32,
    pub(crate) use_order_preserving_transform: bool,
}

impl Metadata {
    /// Writes the magic, version, and V1 fields.
    ///
    /// # Errors
    ///
    /// Surfaces stream failures.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn write(&self, out: &mut dyn OutputStream) -> Result<()> {
        out.write(&MAGIC)?;
        write_i32_le(out, CURRENT_VERSION)?;
        write_i32_le(out, self.num_dimensions as i32)?;
        write_u8(out, self.space.to_wire())?;
        write_u8(out, self.storage.to_wire())?;
        write_f32_le(out, self.max_norm)?;
        write_u8(out, u8::from(self.use_order_preserving_transform))?;
        Ok(())
    }

    /// Peeks for the magic and, when present, consumes and parses the
    /// header. Returns `None` for legacy V0 files, leaving the stream
    /// position untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedVersion`] for versions other than 1, with a
    ///   message that distinguishes "library too old" (version < 20) from
    ///   likely corruption (version ≥ 20);
    /// - [`Error::Corruption`] for unknown space or storage enum values.
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn read(input: &mut dyn InputStream) -> Result<Option<Self>> {
        let mut magic = [0u8; 4];
        let got = input.peek(&mut magic)?;
        if got < 4 || magic != MAGIC {
            return Ok(None);
        }

        let mut consumed = [0u8; 4];
        input.read_exact_bytes(&mut consumed)?;
        let version = read_i32_le(input)?;
        if version != CURRENT_VERSION {
            return Err(Error::UnsupportedVersion { version });
        }

        let num_dimensions = read_i32_le(input)?;
        if num_dimensions <= 0 {
            return Err(Error::Corruption(format!(
                "non-positive dimension count {num_dimensions}"
            )));
        }
        let space_byte = read_u8(input)?;
        let space = SpaceType::from_wire(space_byte)
            .ok_or_else(|| Error::Corruption(format!("unknown space type {space_byte:#04x}")))?;
        let storage_byte = read_u8(input)?;
        let storage = StorageDataType::from_wire(storage_byte).ok_or_else(|| {
            Error::Corruption(format!("unknown storage data type {storage_byte:#04x}"))
        })?;
        let max_norm = read_f32_le(input)?;
        let use_order_preserving_transform = read_u8(input)? != 0;

        Ok(Some(Self {
            num_dimensions: num_dimensions as usize,
            space,
            storage,
            max_norm,
            use_order_preserving_transform,
        }))
    }
}
