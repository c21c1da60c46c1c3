//! Binary image serialization
//!
//! Layout on disk:
//!
//! ```text
//! +0   magic bytes 0x7E 'N' 'J'
//! +3   u32 little-endian header-table length
//! +7   header table: {name: 6 bytes incl. NUL, u32 offset, u32 length}+
//!      ".data" appears iff the data segment is non-empty; ".text" always.
//! +... data bytes
//! +... text: each operation as a little-endian u64
//! ```

use crate::codegen::Image;
use crate::opcode::MAGIC;
use log::debug;
use std::fs;
use std::io;
use std::path::Path;

/// One header-table entry: a NUL-padded 6-byte name plus offset and length.
const HEADER_ENTRY_SIZE: usize = 6 + 4 + 4;

impl Image {
    /// Serialize the image. Section offsets are patched into the header
    /// once the section locations are known.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        let entry_count = 1 + usize::from(!self.data().is_empty());
        let header_len = entry_count * HEADER_ENTRY_SIZE;

        let mut out = Vec::with_capacity(3 + 4 + header_len);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&(header_len as u32).to_le_bytes());

        // Reserve the table; offsets are back-patched below.
        let table_start = out.len();
        out.resize(table_start + header_len, 0);

        let mut entry = table_start;
        let patch = |out: &mut Vec<u8>, entry: usize, name: &str, offset: u32, length: u32| {
            out[entry..entry + name.len()].copy_from_slice(name.as_bytes());
            out[entry + 6..entry + 10].copy_from_slice(&offset.to_le_bytes());
            out[entry + 10..entry + 14].copy_from_slice(&length.to_le_bytes());
        };

        if !self.data().is_empty() {
            let offset = out.len() as u32;
            let length = self.section_length(self.data().len(), ".data");
            patch(&mut out, entry, ".data", offset, length);
            entry += HEADER_ENTRY_SIZE;
            out.extend_from_slice(self.data());
        }

        let text_offset = out.len() as u32;
        let text_bytes = self.text().len() * 8;
        let text_length = self.section_length(text_bytes, ".text");
        patch(&mut out, entry, ".text", text_offset, text_length);
        for op in self.text() {
            out.extend_from_slice(&op.encode().to_le_bytes());
        }

        out
    }

    /// Write the image to disk.
    pub fn write_to(&mut self, path: &Path) -> io::Result<()> {
        let bytes = self.to_bytes();
        debug!("writing {} bytes to {}", bytes.len(), path.display());
        fs::write(path, bytes)
    }

    fn section_length(&mut self, length: usize, name: &str) -> u32 {
        match u32::try_from(length) {
            Ok(length) => length,
            Err(_) => {
                self.oversize_section(name, length);
                u32::MAX
            }
        }
    }
}
