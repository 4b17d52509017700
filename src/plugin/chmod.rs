//! Permission override.

use serde::Deserialize;

use crate::builder::BuildConfig;
use crate::event::{BeforeSetPath, DEFAULT_PRIORITY, EventBus, Subscriber};
use crate::{Error, Result};

const PLUGIN: &str = "Chmod";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModeValue {
    Number(u32),
    Octal(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChmodSettings {
    Bare(ModeValue),
    Table { mode: ModeValue },
}

impl ModeValue {
    fn resolve(self) -> Result<u32> {
        let mode = match self {
            ModeValue::Number(mode) => mode,
            ModeValue::Octal(text) => {
                let digits = text.trim();
                let digits = digits.strip_prefix("0o").unwrap_or(digits);
                u32::from_str_radix(digits, 8).map_err(|_| {
                    Error::configuration(PLUGIN, format!("'{}' is not an octal mode", text))
                })?
            }
        };
        if mode > 0o7777 {
            return Err(Error::configuration(
                PLUGIN,
                format!("mode {:o} has bits outside 0o7777", mode),
            ));
        }
        Ok(mode)
    }
}

/// Sets every entry's permission bits to a fixed mode.
#[derive(Debug, Clone, Copy)]
pub struct ChmodSubscriber {
    mode: u32,
}

impl ChmodSubscriber {
    /// Creates a subscriber applying `mode`.
    pub fn new(mode: u32) -> Self {
        Self { mode }
    }

    /// The mode applied to entries.
    pub fn mode(&self) -> u32 {
        self.mode
    }
}

impl Subscriber for ChmodSubscriber {
    fn name(&self) -> &str {
        "chmod"
    }

    fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
        event.entry_mut().set_permissions(self.mode);
        Ok(())
    }
}

pub(super) fn register(bus: &mut EventBus, config: &BuildConfig) -> Result<()> {
    let settings: ChmodSettings = config.settings.require("chmod")?;
    let mode = match settings {
        ChmodSettings::Bare(mode) | ChmodSettings::Table { mode } => mode.resolve()?,
    };
    bus.subscribe(ChmodSubscriber::new(mode), DEFAULT_PRIORITY);
    Ok(())
}
