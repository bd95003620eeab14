use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::parse::{parse_int, parse_unsigned, RawValue};

/// Name of the configuration section describing one MAC.
pub const ETHERNET_SECTION: &str = "ethernet";

/// Which host transport a MAC uses for its packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Length-prefixed packet records in a pair of files.
    #[default]
    File,
    /// Raw link-layer socket bound to a host interface.
    Socket,
}

impl BackendKind {
    fn from_selector(value: i64) -> Option<Self> {
        match value {
            0 => Some(BackendKind::File),
            1 => Some(BackendKind::Socket),
            _ => None,
        }
    }
}

/// A 48-bit Ethernet address in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| format!("`{s}` has fewer than six octets"))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| format!("`{part}` is not a hex octet"))?;
        }
        if parts.next().is_some() {
            return Err(format!("`{s}` has more than six octets"));
        }
        Ok(MacAddress(octets))
    }
}

/// Parsed `ethernet` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthConfig {
    pub enabled: bool,
    /// Physical base address of the register window.
    pub base_addr: u64,
    /// Interrupt controller input driven by the MAC.
    pub irq: u32,
    pub backend: BackendKind,
    /// Packet records replayed into the receive engine.
    pub rx_file: PathBuf,
    /// Packet records captured from the transmit engine.
    pub tx_file: PathBuf,
    /// Host interface name for the socket backend.
    pub sock_if: String,
    pub mac: MacAddress,
    /// First id of the two-id external instrumentation range; 0 disables it.
    pub vapi_id: u32,
}

impl Default for EthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_addr: 0,
            irq: 0,
            backend: BackendKind::File,
            rx_file: PathBuf::from("eth_rx"),
            tx_file: PathBuf::from("eth_tx"),
            sock_if: "ethsim0".to_string(),
            mac: MacAddress::default(),
            vapi_id: 0,
        }
    }
}

/// Value kinds a parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Addr,
    Str,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Int => "an integer",
            ParamKind::Addr => "an address",
            ParamKind::Str => "a quoted string",
        })
    }
}

/// A parameter value that already matches its declared [`ParamKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Addr(u64),
    Str(String),
}

type Setter = fn(&mut EthConfig, ParamValue) -> std::result::Result<(), String>;

/// One entry of a section schema.
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    setter: Setter,
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Schema of the `ethernet` section.
pub const ETHERNET_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "enabled",
        kind: ParamKind::Int,
        setter: set_enabled,
    },
    ParamSpec {
        name: "baseaddr",
        kind: ParamKind::Addr,
        setter: set_base_addr,
    },
    ParamSpec {
        name: "dma",
        kind: ParamKind::Int,
        setter: warn_external_dma,
    },
    ParamSpec {
        name: "irq",
        kind: ParamKind::Int,
        setter: set_irq,
    },
    ParamSpec {
        name: "rtx_type",
        kind: ParamKind::Int,
        setter: set_backend,
    },
    ParamSpec {
        name: "rx_channel",
        kind: ParamKind::Int,
        setter: warn_external_dma,
    },
    ParamSpec {
        name: "tx_channel",
        kind: ParamKind::Int,
        setter: warn_external_dma,
    },
    ParamSpec {
        name: "rxfile",
        kind: ParamKind::Str,
        setter: set_rx_file,
    },
    ParamSpec {
        name: "txfile",
        kind: ParamKind::Str,
        setter: set_tx_file,
    },
    ParamSpec {
        name: "sockif",
        kind: ParamKind::Str,
        setter: set_sock_if,
    },
    ParamSpec {
        name: "mac",
        kind: ParamKind::Str,
        setter: set_mac,
    },
    ParamSpec {
        name: "vapi_id",
        kind: ParamKind::Int,
        setter: set_vapi_id,
    },
];

fn int(value: ParamValue) -> std::result::Result<i64, String> {
    match value {
        ParamValue::Int(v) => Ok(v),
        other => Err(format!("expected integer, got {other:?}")),
    }
}

fn string(value: ParamValue) -> std::result::Result<String, String> {
    match value {
        ParamValue::Str(s) => Ok(s),
        other => Err(format!("expected string, got {other:?}")),
    }
}

fn non_negative_u32(value: ParamValue) -> std::result::Result<u32, String> {
    let v = int(value)?;
    u32::try_from(v).map_err(|_| format!("{v} is out of range"))
}

fn set_enabled(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    cfg.enabled = int(value)? != 0;
    Ok(())
}

fn set_base_addr(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    match value {
        ParamValue::Addr(addr) => {
            cfg.base_addr = addr;
            Ok(())
        }
        other => Err(format!("expected address, got {other:?}")),
    }
}

fn set_irq(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    cfg.irq = non_negative_u32(value)?;
    Ok(())
}

fn set_backend(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    let selector = int(value)?;
    let kind = BackendKind::from_selector(selector)
        .ok_or_else(|| format!("{selector} is not a backend (0 = file, 1 = socket)"))?;
    if kind == BackendKind::Socket && !cfg!(target_os = "linux") {
        tracing::warn!("raw socket backend is not available on this host; keeping file backend");
        return Ok(());
    }
    cfg.backend = kind;
    Ok(())
}

fn warn_external_dma(_cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    let value = int(value)?;
    tracing::warn!(value, "external Ethernet DMA is not supported; parameter ignored");
    Ok(())
}

fn set_rx_file(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    cfg.rx_file = PathBuf::from(string(value)?);
    Ok(())
}

fn set_tx_file(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    cfg.tx_file = PathBuf::from(string(value)?);
    Ok(())
}

fn set_sock_if(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    let name = string(value)?;
    if name.is_empty() {
        return Err("interface name is empty".to_string());
    }
    cfg.sock_if = name;
    Ok(())
}

fn set_mac(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    cfg.mac = string(value)?.parse()?;
    Ok(())
}

fn set_vapi_id(cfg: &mut EthConfig, value: ParamValue) -> std::result::Result<(), String> {
    cfg.vapi_id = non_negative_u32(value)?;
    Ok(())
}

fn convert(spec: &ParamSpec, raw: RawValue) -> Option<ParamValue> {
    match (spec.kind, raw) {
        (ParamKind::Str, RawValue::Quoted(s)) => Some(ParamValue::Str(s)),
        (ParamKind::Int, RawValue::Bare(text)) => parse_int(&text).map(ParamValue::Int),
        (ParamKind::Addr, RawValue::Bare(text)) => parse_unsigned(&text).map(ParamValue::Addr),
        _ => None,
    }
}

/// Apply one `key = value` line of an `ethernet` section to `cfg`.
pub(crate) fn apply(cfg: &mut EthConfig, line: usize, key: &str, raw: RawValue) -> Result<()> {
    let Some(spec) = ETHERNET_PARAMS.iter().find(|spec| spec.name == key) else {
        return Err(ConfigError::UnknownParam {
            line,
            section: ETHERNET_SECTION,
            name: key.to_string(),
        });
    };
    let value = convert(spec, raw).ok_or_else(|| ConfigError::WrongKind {
        line,
        name: key.to_string(),
        expected: spec.kind,
    })?;
    (spec.setter)(cfg, value).map_err(|reason| ConfigError::InvalidValue {
        line,
        name: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_addresses_parse_and_display() {
        let mac: MacAddress = "52:54:00:12:34:5a".parse().unwrap();
        assert_eq!(mac.octets(), [0x52, 0x54, 0x00, 0x12, 0x34, 0x5A]);
        assert_eq!(mac.to_string(), "52:54:00:12:34:5A");
        assert_eq!(
            "02-00-00-00-00-01".parse::<MacAddress>().unwrap().octets(),
            [2, 0, 0, 0, 0, 1]
        );
        assert!("52:54:00".parse::<MacAddress>().is_err());
        assert!("52:54:00:12:34:56:78".parse::<MacAddress>().is_err());
        assert!("zz:54:00:12:34:56".parse::<MacAddress>().is_err());
    }

    #[test]
    fn schema_names_are_unique() {
        for (i, spec) in ETHERNET_PARAMS.iter().enumerate() {
            assert!(
                ETHERNET_PARAMS[i + 1..].iter().all(|o| o.name != spec.name),
                "duplicate parameter {}",
                spec.name
            );
        }
    }

    #[test]
    fn string_parameters_reject_bare_words() {
        let mut cfg = EthConfig::default();
        let err = apply(&mut cfg, 3, "rxfile", RawValue::Bare("eth_rx".into())).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WrongKind {
                line: 3,
                expected: ParamKind::Str,
                ..
            }
        ));
    }
}
