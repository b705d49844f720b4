//! AKM v2 binary writer.
//!
//! Assembles header ⧺ code ⧺ data ⧺ symtab ⧺ strtab. The header is a
//! 512-byte zero buffer filled with per-field writes at the offsets in
//! [`crate::format::offset`]; reserved regions and the signature stay
//! zeroed, which the host loader requires. The strtab carries the IR
//! strings, then the module name, then the symbol names, and symbol
//! records point at their name by absolute strtab offset.

use tracing::debug;

use crate::codegen::CodeImage;
use crate::format::{self, offset};
use crate::frontend::extract::ModuleInfo;

/// Assemble the final artifact.
pub fn write_artifact(info: &ModuleInfo, image: &CodeImage, flags: u16) -> Vec<u8> {
    let (symtab, strtab) = build_symtab_strtab(info, image);
    let code_size = image.code.len() as u32;
    let data_size = image.data.len() as u32;

    let code_offset = format::HEADER_SIZE as u32;
    let data_offset = code_offset + code_size;
    let symtab_offset = data_offset + data_size;
    let strtab_offset = symtab_offset + symtab.len() as u32;
    let total_size = strtab_offset + strtab.len() as u32;

    let mut header = vec![0u8; format::HEADER_SIZE];
    write_u32(&mut header, offset::MAGIC, format::MAGIC);
    write_u16(&mut header, offset::FORMAT_VERSION, format::FORMAT_VERSION);
    write_u16(&mut header, offset::FLAGS, flags);
    write_u32(&mut header, offset::HEADER_SIZE, format::HEADER_SIZE as u32);
    write_u32(&mut header, offset::TOTAL_SIZE, total_size);
    write_str(&mut header, offset::NAME, &info.name, format::NAME_MAX);
    write_str(&mut header, offset::VERSION, &info.version, format::VERSION_MAX);
    write_str(&mut header, offset::AUTHOR, &info.author, format::AUTHOR_MAX);
    write_u16(&mut header, offset::API_VERSION, format::API_VERSION_DEFAULT);
    write_u32(&mut header, offset::KERNEL_MIN, format::KERNEL_MIN_DEFAULT);
    write_u32(&mut header, offset::KERNEL_MAX, format::KERNEL_MAX_ANY);
    write_u32(&mut header, offset::CAPABILITIES, info.capabilities);
    write_u32(&mut header, offset::CODE_OFFSET, code_offset);
    write_u32(&mut header, offset::CODE_SIZE, code_size);
    write_u32(&mut header, offset::DATA_OFFSET, data_offset);
    write_u32(&mut header, offset::DATA_SIZE, data_size);
    // rodata and bss fields stay zero.
    let init_offset = image.function_offset("init").unwrap_or(0);
    let exit_offset = image.function_offset("exit").unwrap_or(0);
    write_u32(&mut header, offset::INIT_OFFSET, init_offset);
    write_u32(&mut header, offset::CLEANUP_OFFSET, exit_offset);
    write_u32(&mut header, offset::SYMTAB_OFFSET, symtab_offset);
    write_u32(&mut header, offset::SYMTAB_SIZE, symtab.len() as u32);
    write_u32(&mut header, offset::STRTAB_OFFSET, strtab_offset);
    write_u32(&mut header, offset::STRTAB_SIZE, strtab.len() as u32);
    header[offset::DEP_COUNT] = info.dependencies.len().min(format::DEP_MAX) as u8;
    for (i, dep) in info.dependencies.iter().take(format::DEP_MAX).enumerate() {
        let at = offset::DEPENDENCIES + i * format::DEP_SLOT;
        write_str(&mut header, at, dep, format::DEP_SLOT - 1);
    }
    header[offset::SECURITY_LEVEL] = info.security_level;
    header[offset::SIGNATURE_TYPE] = 0;

    let mut content = Vec::with_capacity((total_size as usize) - format::HEADER_SIZE);
    content.extend_from_slice(&image.code);
    content.extend_from_slice(&image.data);
    content.extend_from_slice(&symtab);
    content.extend_from_slice(&strtab);
    let content_checksum = format::checksum(&content);
    write_u32(&mut header, offset::CONTENT_CHECKSUM, content_checksum);

    // The header checksum covers the header with its own slot elided.
    let mut elided = Vec::with_capacity(format::HEADER_SIZE - 4);
    elided.extend_from_slice(&header[..offset::HEADER_CHECKSUM]);
    elided.extend_from_slice(&header[offset::CONTENT_CHECKSUM..]);
    let header_checksum = format::checksum(&elided);
    write_u32(&mut header, offset::HEADER_CHECKSUM, header_checksum);

    debug!(
        total_size,
        code_size,
        data_size,
        symtab = symtab.len(),
        strtab = strtab.len(),
        "artifact assembled"
    );

    let mut artifact = header;
    artifact.extend_from_slice(&content);
    artifact
}

/// Build the symbol table and the strtab. Each function becomes a
/// 12-byte record: name offset, code offset, size 0, type function,
/// binding global.
fn build_symtab_strtab(info: &ModuleInfo, image: &CodeImage) -> (Vec<u8>, Vec<u8>) {
    let mut strtab = image.string_blob();
    append_cstr(&mut strtab, &info.name);

    let mut symtab = Vec::with_capacity(image.function_offsets.len() * format::SYMBOL_SIZE);
    for (name, code_offset) in &image.function_offsets {
        let name_offset = strtab.len() as u32;
        append_cstr(&mut strtab, name);
        symtab.extend_from_slice(&name_offset.to_le_bytes());
        symtab.extend_from_slice(&code_offset.to_le_bytes());
        symtab.extend_from_slice(&0u16.to_le_bytes());
        symtab.push(format::SYM_TYPE_FUNCTION);
        symtab.push(format::SYM_BIND_GLOBAL);
    }
    (symtab, strtab)
}

fn append_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn write_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// NUL-padded fixed-width string write, truncated to `max` bytes at a
/// character boundary.
fn write_str(buf: &mut [u8], at: usize, s: &str, max: usize) {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf[at..at + end].copy_from_slice(&s.as_bytes()[..end]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;
    use crate::ir::{Instr, IrFunction, IrModule, Opcode};

    fn sample_image() -> CodeImage {
        let module = IrModule {
            functions: vec![
                IrFunction {
                    instrs: vec![Instr::push_int(0), Instr::new(Opcode::Ret)],
                    ..IrFunction::new("init", vec![])
                },
                IrFunction {
                    instrs: vec![Instr::new(Opcode::Ret)],
                    ..IrFunction::new("exit", vec![])
                },
            ],
            strings: vec![],
        };
        generate(&module, &[]).unwrap()
    }

    fn sample_info() -> ModuleInfo {
        ModuleInfo {
            name: "a".to_string(),
            ..ModuleInfo::default()
        }
    }

    fn read_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_artifact_layout() {
        let image = sample_image();
        let artifact = write_artifact(&sample_info(), &image, 0);
        assert_eq!(read_u32(&artifact, offset::MAGIC), format::MAGIC);
        assert_eq!(read_u32(&artifact, offset::HEADER_SIZE), 512);
        assert_eq!(read_u32(&artifact, offset::TOTAL_SIZE) as usize, artifact.len());
        // init: nop push ret (7 bytes), exit: nop ret (2 bytes)
        assert_eq!(read_u32(&artifact, offset::CODE_SIZE), 9);
        assert_eq!(read_u32(&artifact, offset::DATA_SIZE), 0);
        assert_eq!(read_u32(&artifact, offset::SYMTAB_SIZE), 24);
        // strtab: "a\0" + "init\0" + "exit\0"
        assert_eq!(read_u32(&artifact, offset::STRTAB_SIZE), 12);
        assert_eq!(artifact.len(), 512 + 9 + 24 + 12);
    }

    #[test]
    fn test_section_offsets_monotonic() {
        let image = sample_image();
        let artifact = write_artifact(&sample_info(), &image, 0);
        let code = read_u32(&artifact, offset::CODE_OFFSET);
        let data = read_u32(&artifact, offset::DATA_OFFSET);
        let symtab = read_u32(&artifact, offset::SYMTAB_OFFSET);
        let strtab = read_u32(&artifact, offset::STRTAB_OFFSET);
        assert_eq!(code, 512);
        assert_eq!(data, code + read_u32(&artifact, offset::CODE_SIZE));
        assert_eq!(symtab, data + read_u32(&artifact, offset::DATA_SIZE));
        assert_eq!(strtab, symtab + read_u32(&artifact, offset::SYMTAB_SIZE));
    }

    #[test]
    fn test_name_truncated_with_nul_padding() {
        let mut info = sample_info();
        info.name = "x".repeat(40);
        let artifact = write_artifact(&info, &sample_image(), 0);
        let field = &artifact[offset::NAME..offset::NAME + 32];
        assert_eq!(&field[..31], "x".repeat(31).as_bytes());
        assert_eq!(field[31], 0);
    }

    #[test]
    fn test_utf8_truncation_respects_char_boundary() {
        let mut buf = [0u8; 8];
        write_str(&mut buf, 0, "aé", 2); // 'é' is two bytes; must not split
        assert_eq!(&buf[..2], b"a\0");
    }

    #[test]
    fn test_dependencies_written_in_slots() {
        let mut info = sample_info();
        info.dependencies = vec!["vfs".to_string(), "net".to_string()];
        let artifact = write_artifact(&info, &sample_image(), 0);
        assert_eq!(artifact[offset::DEP_COUNT], 2);
        assert_eq!(&artifact[offset::DEPENDENCIES..offset::DEPENDENCIES + 4], b"vfs\0");
        let slot1 = offset::DEPENDENCIES + format::DEP_SLOT;
        assert_eq!(&artifact[slot1..slot1 + 4], b"net\0");
    }

    #[test]
    fn test_checksums_verify() {
        let artifact = write_artifact(&sample_info(), &sample_image(), 0);
        let content = &artifact[format::HEADER_SIZE..];
        assert_eq!(
            read_u32(&artifact, offset::CONTENT_CHECKSUM),
            format::checksum(content)
        );
        let mut elided = Vec::new();
        elided.extend_from_slice(&artifact[..offset::HEADER_CHECKSUM]);
        elided.extend_from_slice(&artifact[offset::CONTENT_CHECKSUM..format::HEADER_SIZE]);
        assert_eq!(
            read_u32(&artifact, offset::HEADER_CHECKSUM),
            format::checksum(&elided)
        );
    }

    #[test]
    fn test_symtab_records() {
        let image = sample_image();
        let artifact = write_artifact(&sample_info(), &image, 0);
        let symtab_off = read_u32(&artifact, offset::SYMTAB_OFFSET) as usize;
        let strtab_off = read_u32(&artifact, offset::STRTAB_OFFSET) as usize;
        let rec = &artifact[symtab_off..symtab_off + format::SYMBOL_SIZE];
        let name_off = u32::from_le_bytes(rec[0..4].try_into().unwrap()) as usize;
        let value = u32::from_le_bytes(rec[4..8].try_into().unwrap());
        assert_eq!(&artifact[strtab_off + name_off..strtab_off + name_off + 5], b"init\0");
        assert_eq!(value, image.function_offset("init").unwrap());
        assert_eq!(rec[10], format::SYM_TYPE_FUNCTION);
        assert_eq!(rec[11], format::SYM_BIND_GLOBAL);
    }

    #[test]
    fn test_flags_and_security_written() {
        let mut info = sample_info();
        info.security_level = 2;
        let artifact = write_artifact(&info, &sample_image(), format::flag::DEBUG);
        assert_eq!(
            u16::from_le_bytes(artifact[offset::FLAGS..offset::FLAGS + 2].try_into().unwrap()),
            format::flag::DEBUG
        );
        assert_eq!(artifact[offset::SECURITY_LEVEL], 2);
    }

    #[test]
    fn test_reserved_regions_zeroed() {
        let artifact = write_artifact(&sample_info(), &sample_image(), 0);
        assert!(artifact[offset::SIGNATURE..offset::SIGNATURE + 64]
            .iter()
            .all(|&b| b == 0));
        assert!(artifact[448..512].iter().all(|&b| b == 0));
    }
}
