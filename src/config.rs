//! Engine and batch configuration.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Forward,
    #[default]
    Backward,
}

impl Strategy {
    /// File name prefix a batch run looks for when none is given.
    pub fn default_prefix(self) -> &'static str {
        match self {
            Strategy::Forward => "fc",
            Strategy::Backward => "bc",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Forward => write!(f, "forward"),
            Strategy::Backward => write!(f, "backward"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub strategy: Strategy,
}

impl EngineConfig {
    pub fn forward() -> Self {
        EngineConfig {
            strategy: Strategy::Forward,
        }
    }

    pub fn backward() -> Self {
        EngineConfig {
            strategy: Strategy::Backward,
        }
    }
}

/// Which files a batch run picks up and how each one is solved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub engine: EngineConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        BatchConfig {
            dir: PathBuf::from("."),
            prefix: engine.strategy.default_prefix().to_string(),
            engine,
        }
    }
}
