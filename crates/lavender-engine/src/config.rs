//! Engine configuration.

use std::time::Duration;

use thiserror::Error;

/// What the frame pipeline does when a fence wait times out.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FenceWaitPolicy {
    /// Log and keep rendering.
    BestEffort,
    /// Fail the frame after this many consecutive timeouts.
    FailAfter(u32),
}

/// How the per-instance constant arenas react to a frame with more draws
/// than they hold.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InstanceGrowth {
    /// Reject the frame.
    Fixed,
    /// Reallocate the slot being recorded with doubled capacity.
    Amortized,
}

/// Camera input tuning.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InputSettings {
    /// World units per second.
    pub translation_speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    pub scroll_sensitivity: f32,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            translation_speed: 2.0,
            mouse_sensitivity: 0.008,
            scroll_sensitivity: 0.12,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub frames_in_flight: usize,

    /// Instance blocks per frame slot when the scene is first set up.
    pub max_draws_per_frame: usize,

    /// Element start alignment for every constant arena. Power of two.
    pub constants_alignment: u64,

    pub material_capacity: usize,

    /// Bound on a single fence wait.
    pub fence_timeout: Duration,
    pub fence_policy: FenceWaitPolicy,
    pub instance_growth: InstanceGrowth,

    pub input: InputSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            max_draws_per_frame: 128 * 1024,
            constants_alignment: 256,
            material_capacity: 128,
            fence_timeout: Duration::from_millis(10),
            fence_policy: FenceWaitPolicy::BestEffort,
            instance_growth: InstanceGrowth::Fixed,
            input: InputSettings::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("frames_in_flight must be at least 1")]
    NoFramesInFlight,
    #[error("constants_alignment {0} is not a power of two")]
    Alignment(u64),
    #[error("max_draws_per_frame must be at least 1")]
    NoDrawCapacity,
    #[error("material_capacity must be at least 1")]
    NoMaterialCapacity,
    #[error("FailAfter(0) would fail every frame")]
    ZeroFailureThreshold,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::NoFramesInFlight);
        }
        if !self.constants_alignment.is_power_of_two() {
            return Err(ConfigError::Alignment(self.constants_alignment));
        }
        if self.max_draws_per_frame == 0 {
            return Err(ConfigError::NoDrawCapacity);
        }
        if self.material_capacity == 0 {
            return Err(ConfigError::NoMaterialCapacity);
        }
        if self.fence_policy == FenceWaitPolicy::FailAfter(0) {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }
}
