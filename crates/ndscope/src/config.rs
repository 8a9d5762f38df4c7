//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::env;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Route `Engine::run_kernel` through the attached profiler.
    pub profile: bool,
    /// Reject allocations made outside any user scope.
    pub strict_scopes: bool,
    /// Report profiled float results that contain NaN.
    pub check_numerics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: false,
            strict_scopes: false,
            check_numerics: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NDSCOPE_PROFILE`, `NDSCOPE_STRICT_SCOPES` and
    /// `NDSCOPE_CHECK_NUMERICS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env::flag(env::PROFILE_ENV) {
            config.profile = value;
        }
        if let Some(value) = env::flag(env::STRICT_SCOPES_ENV) {
            config.strict_scopes = value;
        }
        if let Some(value) = env::flag(env::CHECK_NUMERICS_ENV) {
            config.check_numerics = value;
        }
        config
    }

    pub fn from_json_str(src: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(src)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
