pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Per-root engine settings, fixed at [`create_root_with`](crate::create_root_with).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct EngineConfig {
    /// Consecutive drains allowed to leave work behind before the manager
    /// gives up with [`ArborError::PossibleInfiniteLoop`](crate::ArborError).
    pub max_iterations: u32,
    /// Catch listener panics during the notify phase and keep draining.
    pub contain_listener_panics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            contain_listener_panics: true,
        }
    }
}

impl EngineConfig {
    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    pub fn with_contain_listener_panics(mut self, contain: bool) -> Self {
        self.contain_listener_panics = contain;
        self
    }
}
