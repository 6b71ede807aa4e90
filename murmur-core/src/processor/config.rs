//! Processor configuration: physical layer selection plus the ambient AGC.

use serde::{Deserialize, Serialize};

use crate::config::{AgcConfig, DsssConfig, FramerConfig, FskConfig, SyncConfig};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub agc: AgcConfig,
    #[serde(default = "default_agc_enabled")]
    pub agc_enabled: bool,
}

fn default_agc_enabled() -> bool {
    true
}

/// Which physical layer the processor runs, with its wire parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BackendConfig {
    Fsk {
        tx: FskConfig,
        rx: FskConfig,
    },
    Dsss {
        dsss: DsssConfig,
        #[serde(default)]
        sync: SyncConfig,
        #[serde(default)]
        framer: FramerConfig,
    },
}

impl ProcessorConfig {
    /// FSK with the same tone pair both ways (single-direction tests).
    pub fn fsk_loopback() -> Self {
        Self {
            backend: BackendConfig::Fsk {
                tx: FskConfig::low_channel(),
                rx: FskConfig::low_channel(),
            },
            agc: AgcConfig::default(),
            agc_enabled: true,
        }
    }

    /// Duplex FSK endpoint. The originating side transmits on the low tone
    /// pair and listens on the high pair; the answering side is mirrored.
    pub fn fsk_duplex(originate: bool) -> Self {
        let (tx, rx) = if originate {
            (FskConfig::low_channel(), FskConfig::high_channel())
        } else {
            (FskConfig::high_channel(), FskConfig::low_channel())
        };
        Self {
            backend: BackendConfig::Fsk { tx, rx },
            agc: AgcConfig::default(),
            agc_enabled: true,
        }
    }

    /// DSSS with default wire parameters and framing.
    pub fn dsss() -> Self {
        Self {
            backend: BackendConfig::Dsss {
                dsss: DsssConfig::default(),
                sync: SyncConfig::default(),
                framer: FramerConfig::default(),
            },
            agc: AgcConfig::default(),
            agc_enabled: true,
        }
    }

    pub fn sample_rate(&self) -> usize {
        match &self.backend {
            BackendConfig::Fsk { rx, .. } => rx.sample_rate,
            BackendConfig::Dsss { dsss, .. } => dsss.sample_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agc.validate()?;
        match &self.backend {
            BackendConfig::Fsk { tx, rx } => {
                tx.validate()?;
                rx.validate()
            }
            BackendConfig::Dsss { dsss, .. } => dsss.validate(),
        }
    }
}
