//! Simulator configuration files.
//!
//! The format is a sequence of sections:
//!
//! ```text
//! section ethernet
//!   baseaddr = 0x92000000
//!   irq      = 4
//!   rtx_type = 0        /* 0 = file, 1 = socket */
//!   rxfile   = "eth_rx"
//!   txfile   = "eth_tx"
//! end
//! ```
//!
//! Each known section has a static schema ([`ETHERNET_PARAMS`]) mapping parameter names to a
//! value kind and a setter; every line is validated against it once, at load time. Sections this
//! crate does not model are skipped with a warning so a full simulator configuration can be fed
//! in unchanged.
#![forbid(unsafe_code)]

mod error;
mod ethernet;
mod parse;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, Result};
pub use ethernet::{
    BackendKind, EthConfig, MacAddress, ParamKind, ParamSpec, ParamValue, ETHERNET_PARAMS,
    ETHERNET_SECTION,
};

use parse::StatementKind;

/// Everything the simulator needs from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Enabled MACs, in file order.
    pub ethernet: Vec<EthConfig>,
}

enum OpenSection {
    Ethernet { line: usize, cfg: EthConfig },
    Skipped { line: usize, name: String },
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut config = SimConfig::default();
        let mut open: Option<OpenSection> = None;

        for stmt in parse::statements(text)? {
            let line = stmt.line;
            match stmt.kind {
                StatementKind::Section(name) => {
                    if let Some(section) = &open {
                        let (outer, _) = section.describe();
                        return Err(ConfigError::Syntax {
                            line,
                            message: format!("section `{name}` opened inside `{outer}`"),
                        });
                    }
                    open = Some(if name == ETHERNET_SECTION {
                        OpenSection::Ethernet {
                            line,
                            cfg: EthConfig::default(),
                        }
                    } else {
                        tracing::warn!(section = %name, line, "skipping unmodelled config section");
                        OpenSection::Skipped { line, name }
                    });
                }
                StatementKind::End => match open.take() {
                    Some(OpenSection::Ethernet { cfg, .. }) if cfg.enabled => {
                        config.ethernet.push(cfg);
                    }
                    Some(OpenSection::Ethernet { cfg, .. }) => {
                        tracing::debug!(base_addr = cfg.base_addr, "ethernet section disabled");
                    }
                    Some(OpenSection::Skipped { .. }) => {}
                    None => {
                        return Err(ConfigError::Syntax {
                            line,
                            message: "`end` without an open section".to_string(),
                        });
                    }
                },
                StatementKind::Param { key, value } => match open.as_mut() {
                    Some(OpenSection::Ethernet { cfg, .. }) => {
                        ethernet::apply(cfg, line, &key, value)?;
                    }
                    Some(OpenSection::Skipped { .. }) => {}
                    None => {
                        return Err(ConfigError::Syntax {
                            line,
                            message: format!("parameter `{key}` outside of a section"),
                        });
                    }
                },
            }
        }

        if let Some(section) = open {
            let (name, line) = section.describe();
            return Err(ConfigError::UnterminatedSection {
                name: name.to_string(),
                line,
            });
        }

        Ok(config)
    }
}

impl OpenSection {
    fn describe(&self) -> (&str, usize) {
        match self {
            OpenSection::Ethernet { line, .. } => (ETHERNET_SECTION, *line),
            OpenSection::Skipped { line, name } => (name, *line),
        }
    }
}
