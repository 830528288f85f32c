//! ESP application image layout.
//!
//! A firmware image starts with a 24 byte `esp_image_header_t`, followed by
//! the first segment header (8 bytes) and the 256 byte `esp_app_desc_t`
//! that carries version and build information. The download pipeline holds
//! back writes until this whole region has arrived.

pub const IMAGE_HEADER_LEN: usize = 24;
pub const SEGMENT_HEADER_LEN: usize = 8;
pub const APP_DESC_LEN: usize = 256;

/// Offset of the app descriptor inside the image
pub const APP_DESC_OFFSET: usize = IMAGE_HEADER_LEN + SEGMENT_HEADER_LEN;

/// Bytes needed before the header gate opens
pub const HEADER_REGION_LEN: usize = APP_DESC_OFFSET + APP_DESC_LEN;

pub const IMAGE_MAGIC: u8 = 0xE9;
pub const APP_DESC_MAGIC: u32 = 0xABCD_5432;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub magic: u32,
    pub secure_version: u32,
    pub version: String,
    pub project_name: String,
    pub build_time: String,
    pub build_date: String,
    pub idf_version: String,
    /// Both the image magic and the descriptor magic were present
    pub header_valid: bool,
}

impl AppDescriptor {
    /// Decode a raw `esp_app_desc_t`
    pub fn parse(desc: &[u8]) -> Option<Self> {
        if desc.len() < APP_DESC_LEN {
            return None;
        }
        let magic = read_u32(desc, 0);
        Some(Self {
            magic,
            secure_version: read_u32(desc, 4),
            version: c_string(&desc[16..48]),
            project_name: c_string(&desc[48..80]),
            build_time: c_string(&desc[80..96]),
            build_date: c_string(&desc[96..112]),
            idf_version: c_string(&desc[112..144]),
            header_valid: magic == APP_DESC_MAGIC,
        })
    }

    /// Decode the descriptor from the first bytes of a firmware image
    pub fn from_image_prefix(prefix: &[u8]) -> Option<Self> {
        if prefix.len() < HEADER_REGION_LEN {
            return None;
        }
        let mut desc = Self::parse(&prefix[APP_DESC_OFFSET..HEADER_REGION_LEN])?;
        desc.header_valid &= prefix[0] == IMAGE_MAGIC;
        Some(desc)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

// Fixed-size, NUL padded C string
fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Build an image prefix with a well-formed descriptor (used by tests)
#[cfg(test)]
pub(crate) fn fake_image_prefix(version: &str, project: &str) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_REGION_LEN];
    buf[0] = IMAGE_MAGIC;
    buf[1] = 4; // segment count
    let desc = &mut buf[APP_DESC_OFFSET..];
    desc[0..4].copy_from_slice(&APP_DESC_MAGIC.to_le_bytes());
    desc[4..8].copy_from_slice(&1u32.to_le_bytes());
    desc[16..16 + version.len()].copy_from_slice(version.as_bytes());
    desc[48..48 + project.len()].copy_from_slice(project.as_bytes());
    desc[80..88].copy_from_slice(b"12:00:00");
    desc[96..107].copy_from_slice(b"Oct 18 2026");
    desc[112..118].copy_from_slice(b"v5.3.1");
    buf
}
