//! Artifact inspector.
//!
//! Parses an AKM v2 header back out of a byte slice and renders a
//! human-readable report. Used for `--info` and as the reverse
//! contract of the writer: every field the writer lays down reads
//! back here.

use thiserror::Error;

use crate::caps;
use crate::format::{self, offset};

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("file too short for an AKM header: {0} bytes")]
    TooShort(usize),
    #[error("bad magic: expected 0x{expected:08X}, found 0x{found:08X}")]
    BadMagic { expected: u32, found: u32 },
}

/// Parsed header fields.
#[derive(Debug, Clone)]
pub struct HeaderInfo {
    pub format_version: u16,
    pub flags: u16,
    pub header_size: u32,
    pub total_size: u32,
    pub name: String,
    pub version: String,
    pub author: String,
    pub api_version: u16,
    pub kernel_min: u32,
    pub kernel_max: u32,
    pub capabilities: u32,
    pub code_offset: u32,
    pub code_size: u32,
    pub data_offset: u32,
    pub data_size: u32,
    pub init_offset: u32,
    pub cleanup_offset: u32,
    pub symtab_offset: u32,
    pub symtab_size: u32,
    pub strtab_offset: u32,
    pub strtab_size: u32,
    pub dependencies: Vec<String>,
    pub security_level: u8,
    pub signature_type: u8,
    pub header_checksum: u32,
    pub content_checksum: u32,
}

/// Parse and validate a header. Magic mismatch and short input are the
/// only fatal conditions.
pub fn parse_header(bytes: &[u8]) -> Result<HeaderInfo, InspectError> {
    if bytes.len() < format::HEADER_SIZE {
        return Err(InspectError::TooShort(bytes.len()));
    }
    let magic = read_u32(bytes, offset::MAGIC);
    if magic != format::MAGIC {
        return Err(InspectError::BadMagic {
            expected: format::MAGIC,
            found: magic,
        });
    }
    let dep_count = bytes[offset::DEP_COUNT].min(format::DEP_MAX as u8) as usize;
    let dependencies = (0..dep_count)
        .map(|i| {
            let at = offset::DEPENDENCIES + i * format::DEP_SLOT;
            read_cstr(&bytes[at..at + format::DEP_SLOT])
        })
        .collect();
    Ok(HeaderInfo {
        format_version: read_u16(bytes, offset::FORMAT_VERSION),
        flags: read_u16(bytes, offset::FLAGS),
        header_size: read_u32(bytes, offset::HEADER_SIZE),
        total_size: read_u32(bytes, offset::TOTAL_SIZE),
        name: read_cstr(&bytes[offset::NAME..offset::NAME + 32]),
        version: read_cstr(&bytes[offset::VERSION..offset::VERSION + 16]),
        author: read_cstr(&bytes[offset::AUTHOR..offset::AUTHOR + 32]),
        api_version: read_u16(bytes, offset::API_VERSION),
        kernel_min: read_u32(bytes, offset::KERNEL_MIN),
        kernel_max: read_u32(bytes, offset::KERNEL_MAX),
        capabilities: read_u32(bytes, offset::CAPABILITIES),
        code_offset: read_u32(bytes, offset::CODE_OFFSET),
        code_size: read_u32(bytes, offset::CODE_SIZE),
        data_offset: read_u32(bytes, offset::DATA_OFFSET),
        data_size: read_u32(bytes, offset::DATA_SIZE),
        init_offset: read_u32(bytes, offset::INIT_OFFSET),
        cleanup_offset: read_u32(bytes, offset::CLEANUP_OFFSET),
        symtab_offset: read_u32(bytes, offset::SYMTAB_OFFSET),
        symtab_size: read_u32(bytes, offset::SYMTAB_SIZE),
        strtab_offset: read_u32(bytes, offset::STRTAB_OFFSET),
        strtab_size: read_u32(bytes, offset::STRTAB_SIZE),
        dependencies,
        security_level: bytes[offset::SECURITY_LEVEL],
        signature_type: bytes[offset::SIGNATURE_TYPE],
        header_checksum: read_u32(bytes, offset::HEADER_CHECKSUM),
        content_checksum: read_u32(bytes, offset::CONTENT_CHECKSUM),
    })
}

impl HeaderInfo {
    /// `major.minor` from the packed API version.
    pub fn api_version_string(&self) -> String {
        format!("{}.{}", self.api_version >> 8, self.api_version & 0xFF)
    }

    fn kernel_version_string(v: u32) -> String {
        if v == format::KERNEL_MAX_ANY {
            return "any".to_string();
        }
        let (major, minor, patch) = format::unpack_kernel_version(v);
        format!("{major}.{minor}.{patch}")
    }

    fn flag_names(&self) -> Vec<&'static str> {
        format::FLAG_NAMES
            .iter()
            .filter(|(_, bit)| self.flags & bit != 0)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Render the full report for an artifact.
pub fn report(bytes: &[u8]) -> Result<String, InspectError> {
    let header = parse_header(bytes)?;
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line(format!("AKM module: {}", header.name));
    line(format!("  version:         {}", header.version));
    line(format!(
        "  author:          {}",
        if header.author.is_empty() { "-" } else { &header.author }
    ));
    line(format!("  format version:  {}", header.format_version));
    line(format!(
        "  flags:           0x{:04X} [{}]",
        header.flags,
        header.flag_names().join(", ")
    ));
    line(format!("  api version:     {}", header.api_version_string()));
    line(format!(
        "  kernel min/max:  {} / {}",
        HeaderInfo::kernel_version_string(header.kernel_min),
        HeaderInfo::kernel_version_string(header.kernel_max)
    ));
    line(format!(
        "  capabilities:    0x{:08X} [{}]",
        header.capabilities,
        caps::cap_names(header.capabilities).join(", ")
    ));
    line(format!("  security level:  {}", header.security_level));
    line(format!(
        "  dependencies:    {}",
        if header.dependencies.is_empty() {
            "-".to_string()
        } else {
            header.dependencies.join(", ")
        }
    ));
    line(format!(
        "  code:            offset {:>6}, size {:>6}",
        header.code_offset, header.code_size
    ));
    line(format!(
        "  data:            offset {:>6}, size {:>6}",
        header.data_offset, header.data_size
    ));
    line(format!(
        "  symtab:          offset {:>6}, size {:>6}",
        header.symtab_offset, header.symtab_size
    ));
    line(format!(
        "  strtab:          offset {:>6}, size {:>6}",
        header.strtab_offset, header.strtab_size
    ));
    line(format!(
        "  init/cleanup:    0x{:08X} / 0x{:08X}",
        header.init_offset, header.cleanup_offset
    ));
    line(format!("  total size:      {}", header.total_size));

    let content_ok = bytes
        .len()
        .checked_sub(format::HEADER_SIZE)
        .map(|_| format::checksum(&bytes[format::HEADER_SIZE..]) == header.content_checksum)
        .unwrap_or(false);
    let mut elided = Vec::with_capacity(format::HEADER_SIZE - 4);
    elided.extend_from_slice(&bytes[..offset::HEADER_CHECKSUM]);
    elided.extend_from_slice(&bytes[offset::CONTENT_CHECKSUM..format::HEADER_SIZE]);
    let header_ok = format::checksum(&elided) == header.header_checksum;
    line(format!(
        "  header checksum: 0x{:08X} ({})",
        header.header_checksum,
        if header_ok { "ok" } else { "MISMATCH" }
    ));
    line(format!(
        "  content checksum: 0x{:08X} ({})",
        header.content_checksum,
        if content_ok { "ok" } else { "MISMATCH" }
    ));

    if header.total_size as usize != bytes.len() {
        line(format!(
            "  warning: total_size {} disagrees with actual length {}",
            header.total_size,
            bytes.len()
        ));
    }
    for (name, off, size) in [
        ("code", header.code_offset, header.code_size),
        ("data", header.data_offset, header.data_size),
        ("symtab", header.symtab_offset, header.symtab_size),
        ("strtab", header.strtab_offset, header.strtab_size),
    ] {
        if (off as usize).saturating_add(size as usize) > bytes.len() {
            line(format!("  warning: {name} section overruns the artifact"));
        }
    }
    Ok(out)
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(buf[at..at + 2].try_into().unwrap_or([0; 2]))
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap_or([0; 4]))
}

fn read_cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_artifact() -> Vec<u8> {
        let mut bytes = vec![0u8; format::HEADER_SIZE];
        bytes[offset::MAGIC..offset::MAGIC + 4].copy_from_slice(&format::MAGIC.to_le_bytes());
        bytes[offset::NAME..offset::NAME + 4].copy_from_slice(b"abc\0");
        bytes[offset::TOTAL_SIZE..offset::TOTAL_SIZE + 4]
            .copy_from_slice(&(format::HEADER_SIZE as u32).to_le_bytes());
        bytes
    }

    #[test]
    fn test_rejects_short_input() {
        let err = parse_header(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, InspectError::TooShort(100)));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = minimal_artifact();
        bytes[0] ^= 0xFF;
        let err = parse_header(&bytes).unwrap_err();
        let InspectError::BadMagic { found, .. } = err else {
            panic!("expected BadMagic");
        };
        assert_ne!(found, format::MAGIC);
        // The report must mention the observed magic in hex.
        assert!(format!("{}", InspectError::BadMagic { expected: format::MAGIC, found })
            .contains(&format!("{found:08X}")));
    }

    #[test]
    fn test_parses_name() {
        let header = parse_header(&minimal_artifact()).unwrap();
        assert_eq!(header.name, "abc");
    }

    #[test]
    fn test_api_version_string() {
        let mut bytes = minimal_artifact();
        bytes[offset::API_VERSION..offset::API_VERSION + 2]
            .copy_from_slice(&0x0200u16.to_le_bytes());
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.api_version_string(), "2.0");
    }

    #[test]
    fn test_report_flags_and_warnings() {
        let mut bytes = minimal_artifact();
        bytes[offset::FLAGS] = 0x01;
        bytes[offset::TOTAL_SIZE..offset::TOTAL_SIZE + 4].copy_from_slice(&999u32.to_le_bytes());
        let text = report(&bytes).unwrap();
        assert!(text.contains("DEBUG"));
        assert!(text.contains("disagrees"));
    }

    #[test]
    fn test_dep_count_clamped() {
        let mut bytes = minimal_artifact();
        bytes[offset::DEP_COUNT] = 200;
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.dependencies.len(), format::DEP_MAX);
    }
}
