//! Capability registry and the host-API table.
//!
//! A module's capability mask is a u32 bitmask over the 21 bits defined
//! here. Every host-API method carries the capability bit the kernel
//! enforces for it and its declared argument count; a method's position
//! in [`API_TABLE`] is the API index encoded into `CALL_API` operands.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

/// Capability bit positions.
pub mod cap {
    pub const COMMAND: u32 = 1 << 0;
    pub const FS: u32 = 1 << 1;
    pub const NETWORK: u32 = 1 << 2;
    pub const PROCESS: u32 = 1 << 3;
    pub const MEMORY: u32 = 1 << 4;
    pub const IRQ: u32 = 1 << 5;
    pub const IO_PORTS: u32 = 1 << 6;
    pub const PCI: u32 = 1 << 7;
    pub const TIMERS: u32 = 1 << 8;
    pub const IPC: u32 = 1 << 9;
    pub const ENV: u32 = 1 << 10;
    pub const LOG: u32 = 1 << 11;
    pub const SYSINFO: u32 = 1 << 12;
    pub const CRYPTO: u32 = 1 << 13;
    pub const DRIVERS: u32 = 1 << 14;
    pub const USERS: u32 = 1 << 15;
    pub const KERNEL: u32 = 1 << 16;
    pub const HARDWARE: u32 = 1 << 17;
    pub const SCHED: u32 = 1 << 18;
    pub const POWER: u32 = 1 << 19;
    pub const MODULES: u32 = 1 << 20;
}

/// Capability names in bit order.
pub const CAP_NAMES: [(&str, u32); 21] = [
    ("COMMAND", cap::COMMAND),
    ("FS", cap::FS),
    ("NETWORK", cap::NETWORK),
    ("PROCESS", cap::PROCESS),
    ("MEMORY", cap::MEMORY),
    ("IRQ", cap::IRQ),
    ("IO_PORTS", cap::IO_PORTS),
    ("PCI", cap::PCI),
    ("TIMERS", cap::TIMERS),
    ("IPC", cap::IPC),
    ("ENV", cap::ENV),
    ("LOG", cap::LOG),
    ("SYSINFO", cap::SYSINFO),
    ("CRYPTO", cap::CRYPTO),
    ("DRIVERS", cap::DRIVERS),
    ("USERS", cap::USERS),
    ("KERNEL", cap::KERNEL),
    ("HARDWARE", cap::HARDWARE),
    ("SCHED", cap::SCHED),
    ("POWER", cap::POWER),
    ("MODULES", cap::MODULES),
];

/// Names of all capability bits set in `mask`, in bit order.
pub fn cap_names(mask: u32) -> Vec<&'static str> {
    CAP_NAMES
        .iter()
        .filter(|(_, bit)| mask & bit != 0)
        .map(|(name, _)| *name)
        .collect()
}

/// Look up a capability bit by name, case-insensitive.
pub fn cap_by_name(name: &str) -> Option<u32> {
    CAP_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, bit)| *bit)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapError {
    #[error("unknown capability name: {0}")]
    UnknownName(String),
    #[error("invalid capability mask: {0}")]
    InvalidMask(String),
}

/// Parse a capability specification: a hex mask (`0x802`) or a
/// comma-separated list of bit names (`fs,network`).
pub fn parse_cap_spec(spec: &str) -> Result<u32, CapError> {
    let spec = spec.trim();
    if let Some(hex) = spec.strip_prefix("0x").or_else(|| spec.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .map_err(|_| CapError::InvalidMask(spec.to_string()));
    }
    let mut mask = 0u32;
    for name in spec.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        mask |= cap_by_name(name).ok_or_else(|| CapError::UnknownName(name.to_string()))?;
    }
    Ok(mask)
}

/// One host-API method: its wire name, the capability bit the kernel
/// checks before dispatching it, and its declared argument count.
#[derive(Debug, Clone, Copy)]
pub struct ApiEntry {
    pub name: &'static str,
    pub cap: u32,
    pub argc: u8,
}

const fn api(name: &'static str, cap: u32, argc: u8) -> ApiEntry {
    ApiEntry { name, cap, argc }
}

/// API index encoded for methods absent from [`API_TABLE`].
pub const API_UNKNOWN: u8 = 0xFF;

/// The command-registration method injected into `init`.
pub const API_REGISTER_COMMAND: &str = "registerCommand";

/// The host-API table. Position is the wire API index; keep appends at
/// the end of a domain group to preserve existing indices.
pub static API_TABLE: [ApiEntry; 69] = [
    // Logging
    api("log", cap::LOG, 1),
    api("info", cap::LOG, 1),
    api("warn", cap::LOG, 1),
    api("error", cap::LOG, 1),
    api("debug", cap::LOG, 1),
    // Memory
    api("alloc", cap::MEMORY, 1),
    api("free", cap::MEMORY, 1),
    api("memset", cap::MEMORY, 3),
    api("memcpy", cap::MEMORY, 3),
    api("memstat", cap::MEMORY, 0),
    // Environment
    api("getenv", cap::ENV, 1),
    api("setenv", cap::ENV, 2),
    api("unsetenv", cap::ENV, 1),
    api("envlist", cap::ENV, 0),
    // Timers
    api("setTimeout", cap::TIMERS, 2),
    api("setInterval", cap::TIMERS, 2),
    api("clearTimer", cap::TIMERS, 1),
    api("sleep", cap::TIMERS, 1),
    api("uptime", cap::TIMERS, 0),
    // PCI
    api("pciScan", cap::PCI, 0),
    api("pciRead", cap::PCI, 3),
    api("pciWrite", cap::PCI, 4),
    api("pciDevice", cap::PCI, 2),
    // I/O ports
    api("inb", cap::IO_PORTS, 1),
    api("outb", cap::IO_PORTS, 2),
    api("inw", cap::IO_PORTS, 1),
    api("outw", cap::IO_PORTS, 2),
    api("inl", cap::IO_PORTS, 1),
    api("outl", cap::IO_PORTS, 2),
    // IRQ
    api("irqRequest", cap::IRQ, 2),
    api("irqRelease", cap::IRQ, 1),
    api("irqMask", cap::IRQ, 1),
    api("irqUnmask", cap::IRQ, 1),
    // System info
    api("sysinfo", cap::SYSINFO, 0),
    api("cpuinfo", cap::SYSINFO, 0),
    api("meminfo", cap::SYSINFO, 0),
    api("kernelVersion", cap::SYSINFO, 0),
    api("hostname", cap::SYSINFO, 0),
    // Processes
    api("spawn", cap::PROCESS, 2),
    api("kill", cap::PROCESS, 1),
    api("processList", cap::PROCESS, 0),
    api("exec", cap::PROCESS, 2),
    api("wait", cap::PROCESS, 1),
    // IPC
    api("ipcSend", cap::IPC, 2),
    api("ipcReceive", cap::IPC, 1),
    api("ipcOpen", cap::IPC, 1),
    api("ipcClose", cap::IPC, 1),
    // Crypto
    api("random", cap::CRYPTO, 0),
    api("randomBytes", cap::CRYPTO, 1),
    api("hash", cap::CRYPTO, 2),
    // Drivers
    api("registerDriver", cap::DRIVERS, 2),
    api("unregisterDriver", cap::DRIVERS, 1),
    // Filesystem
    api("open", cap::FS, 2),
    api("read", cap::FS, 3),
    api("write", cap::FS, 3),
    api("close", cap::FS, 1),
    api("stat", cap::FS, 1),
    api("mkdir", cap::FS, 1),
    api("remove", cap::FS, 1),
    api("readdir", cap::FS, 1),
    // Network
    api("netOpen", cap::NETWORK, 2),
    api("netSend", cap::NETWORK, 2),
    api("netReceive", cap::NETWORK, 1),
    api("netClose", cap::NETWORK, 1),
    api("resolve", cap::NETWORK, 1),
    // Users
    api("currentUser", cap::USERS, 0),
    api("userInfo", cap::USERS, 1),
    // Commands
    api("registerCommand", cap::COMMAND, 5),
    api("unregisterCommand", cap::COMMAND, 1),
];

static API_INDEX: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    API_TABLE
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.name, i as u8))
        .collect()
});

/// Look up a host-API method by name. Returns its wire index and entry.
pub fn api_lookup(name: &str) -> Option<(u8, &'static ApiEntry)> {
    let idx = *API_INDEX.get(name)?;
    Some((idx, &API_TABLE[idx as usize]))
}

/// Wire index for a method name, [`API_UNKNOWN`] when absent.
pub fn api_index(name: &str) -> u8 {
    API_INDEX.get(name).copied().unwrap_or(API_UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_bit_value() {
        assert_eq!(cap::LOG, 0x800);
        assert_eq!(cap::COMMAND, 0x1);
    }

    #[test]
    fn test_cap_names_round_trip() {
        for (name, bit) in CAP_NAMES {
            assert_eq!(cap_by_name(name), Some(bit));
        }
        assert_eq!(cap_by_name("fs"), Some(cap::FS));
        assert_eq!(cap_by_name("nosuch"), None);
    }

    #[test]
    fn test_cap_names_decode() {
        assert_eq!(cap_names(cap::LOG | cap::FS), vec!["FS", "LOG"]);
        assert!(cap_names(0).is_empty());
    }

    #[test]
    fn test_parse_cap_spec_hex() {
        assert_eq!(parse_cap_spec("0x802"), Ok(cap::LOG | cap::FS));
        assert!(parse_cap_spec("0xzz").is_err());
    }

    #[test]
    fn test_parse_cap_spec_names() {
        assert_eq!(parse_cap_spec("fs,network"), Ok(cap::FS | cap::NETWORK));
        assert_eq!(
            parse_cap_spec("fs,bogus"),
            Err(CapError::UnknownName("bogus".to_string()))
        );
    }

    #[test]
    fn test_api_table_indices_fit_u8() {
        assert!(API_TABLE.len() < API_UNKNOWN as usize);
    }

    #[test]
    fn test_api_table_names_unique() {
        assert_eq!(API_INDEX.len(), API_TABLE.len());
    }

    #[test]
    fn test_api_lookup() {
        let (idx, entry) = api_lookup("registerCommand").unwrap();
        assert_eq!(entry.argc, 5);
        assert_eq!(entry.cap, cap::COMMAND);
        assert_eq!(api_index("registerCommand"), idx);
        assert_eq!(api_index("frobnicate"), API_UNKNOWN);
    }

    #[test]
    fn test_api_caps_are_defined_bits() {
        for entry in &API_TABLE {
            assert_eq!(cap_names(entry.cap).len(), 1, "{}", entry.name);
        }
    }
}
