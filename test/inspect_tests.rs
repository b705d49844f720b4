//! Inspector tests: round-trip against the writer and rejection of
//! corrupt artifacts.

use akmc::compiler::{compile, CompilerConfig};
use akmc::format;
use akmc::inspect::{parse_header, report, InspectError};

const SOURCE: &str = r#"
    AKM.module({
        name: "sensors",
        version: "3.2.1",
        author: "kestrel hw team",
        description: "temperature polling",
        capabilities: AKM.CAPS.PCI | AKM.CAPS.IO_PORTS,
        dependencies: ["pci-core", "hwmon"],
        security_level: 2,
    });

    function poll() {
        AKM.inb(0x60);
    }

    function init() {
        AKM.info("sensors up");
        AKM.setInterval(poll, 1000);
        return 0;
    }

    function exit() {
        AKM.info("sensors down");
    }

    export { init, exit };
"#;

fn build() -> Vec<u8> {
    let config = CompilerConfig {
        optimize: true,
        ..CompilerConfig::default()
    };
    compile(SOURCE, &config).unwrap().artifact
}

// ============================================================================
// Round-trip
// ============================================================================

#[test]
fn test_roundtrip_identity_fields() {
    let artifact = build();
    let header = parse_header(&artifact).unwrap();
    assert_eq!(header.name, "sensors");
    assert_eq!(header.version, "3.2.1");
    assert_eq!(header.author, "kestrel hw team");
    assert_eq!(header.security_level, 2);
    assert_eq!(header.dependencies, vec!["pci-core", "hwmon"]);
}

#[test]
fn test_roundtrip_capabilities() {
    use akmc::caps::cap;
    let header = parse_header(&build()).unwrap();
    // Declared PCI|IO_PORTS, inferred LOG (info), TIMERS (setInterval),
    // and IO_PORTS again from inb.
    assert_eq!(
        header.capabilities,
        cap::PCI | cap::IO_PORTS | cap::LOG | cap::TIMERS
    );
}

#[test]
fn test_roundtrip_section_geometry() {
    let artifact = build();
    let header = parse_header(&artifact).unwrap();
    assert_eq!(header.code_offset, 512);
    assert_eq!(header.data_offset, header.code_offset + header.code_size);
    assert_eq!(header.symtab_offset, header.data_offset + header.data_size);
    assert_eq!(header.strtab_offset, header.symtab_offset + header.symtab_size);
    assert_eq!(
        header.total_size,
        header.strtab_offset + header.strtab_size
    );
    assert_eq!(header.total_size as usize, artifact.len());
}

#[test]
fn test_roundtrip_defaults() {
    let header = parse_header(&build()).unwrap();
    assert_eq!(header.api_version_string(), "2.0");
    assert_eq!(header.kernel_min, format::KERNEL_MIN_DEFAULT);
    assert_eq!(header.kernel_max, format::KERNEL_MAX_ANY);
    assert_eq!(header.signature_type, 0);
}

#[test]
fn test_report_renders_names() {
    let text = report(&build()).unwrap();
    assert!(text.contains("sensors"));
    assert!(text.contains("PCI"));
    assert!(text.contains("LOG"));
    assert!(text.contains("2.0"));
    assert!(text.contains("(ok)"));
    assert!(!text.contains("MISMATCH"));
}

// ============================================================================
// Corruption
// ============================================================================

#[test]
fn test_flipped_magic_byte_rejected() {
    let mut artifact = build();
    artifact[0] ^= 0xFF;
    let err = report(&artifact).unwrap_err();
    let InspectError::BadMagic { found, .. } = &err else {
        panic!("expected BadMagic, got {err:?}");
    };
    // The message carries the observed magic in hexadecimal.
    let msg = err.to_string();
    assert!(msg.contains(&format!("{found:08X}")));
    assert!(msg.contains("324D4B41"));
}

#[test]
fn test_truncated_file_rejected() {
    let artifact = build();
    let err = parse_header(&artifact[..256]).unwrap_err();
    assert!(matches!(err, InspectError::TooShort(256)));
}

#[test]
fn test_corrupt_content_flagged_by_report() {
    let mut artifact = build();
    let last = artifact.len() - 1;
    artifact[last] ^= 0xFF;
    let text = report(&artifact).unwrap();
    assert!(text.contains("MISMATCH"));
}

#[test]
fn test_debug_flag_reported() {
    let config = CompilerConfig {
        debug: true,
        ..CompilerConfig::default()
    };
    let artifact = compile(SOURCE, &config).unwrap().artifact;
    let header = parse_header(&artifact).unwrap();
    assert_eq!(header.flags & format::flag::DEBUG, format::flag::DEBUG);
    assert!(report(&artifact).unwrap().contains("DEBUG"));
}
