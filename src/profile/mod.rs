//! Profile adapter: the hook surface between the pipeline and the
//! classification policy.
//!
//! The pipeline never interprets tags itself; it hands every node and way
//! to a `ProfileRuntime` and consumes the filled-in extraction records. A
//! runtime is stateful and not reentrant, so parallel parsing creates one
//! instance per worker thread through a `ProfileFactory`.

pub mod car;

use anyhow::{bail, Result};

use crate::reader::{RawNode, RawWay};
use crate::types::TravelMode;

/// Per-node profile output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionNode {
    pub barrier: bool,
    pub traffic_light: bool,
}

impl ExtractionNode {
    pub fn clear(&mut self) {
        *self = ExtractionNode::default();
    }
}

/// Per-way profile output. A direction is enabled iff its speed is > 0.
/// `duration` overrides the speed metric for the whole way when >= 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionWay {
    pub forward_speed: f64,
    pub backward_speed: f64,
    pub duration: f64,
    pub name: String,
    pub roundabout: bool,
    pub is_access_restricted: bool,
    pub is_startpoint: bool,
    pub forward_travel_mode: TravelMode,
    pub backward_travel_mode: TravelMode,
    pub road_classification: u32,
}

impl Default for ExtractionWay {
    fn default() -> Self {
        Self {
            forward_speed: -1.0,
            backward_speed: -1.0,
            duration: -1.0,
            name: String::new(),
            roundabout: false,
            is_access_restricted: false,
            is_startpoint: true,
            forward_travel_mode: TravelMode::Driving,
            backward_travel_mode: TravelMode::Driving,
            road_classification: 0,
        }
    }
}

impl ExtractionWay {
    pub fn clear(&mut self) {
        *self = ExtractionWay::default();
    }

    pub fn forward_enabled(&self) -> bool {
        self.forward_speed > 0.0 && self.forward_travel_mode != TravelMode::Inaccessible
    }

    pub fn backward_enabled(&self) -> bool {
        self.backward_speed > 0.0 && self.backward_travel_mode != TravelMode::Inaccessible
    }
}

/// Scalar constants extracted from the profile at setup time. Penalties
/// are deci-seconds (script value times ten).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileProperties {
    pub traffic_signal_penalty: i32,
    pub u_turn_penalty: i32,
    pub has_turn_function: bool,
}

/// The callable hooks of a loaded profile. Not reentrant; one instance per
/// thread.
pub trait ProfileRuntime {
    fn properties(&self) -> ProfileProperties;

    /// Optional setup hook, run once on a designated instance before the
    /// parallel phase starts.
    fn source_function(&mut self) -> Result<()> {
        Ok(())
    }

    fn node_function(&mut self, node: &RawNode, out: &mut ExtractionNode) -> Result<()>;

    fn way_function(&mut self, way: &RawWay, out: &mut ExtractionWay) -> Result<()>;

    /// Turn penalty in deci-seconds for a signed deviation angle in
    /// (-180, 180], 0 meaning straight on. Only consulted when
    /// `properties().has_turn_function` is set.
    fn turn_function(&mut self, _angle: f64) -> i32 {
        0
    }

    /// Mode-transition policy at turns; the default allows everything
    /// except entering or leaving inaccessible segments.
    fn mode_transition_allowed(&self, from: TravelMode, to: TravelMode) -> bool {
        from != TravelMode::Inaccessible && to != TravelMode::Inaccessible
    }
}

/// Produces independent runtime instances, one per worker thread.
pub trait ProfileFactory: Sync {
    fn create(&self) -> Box<dyn ProfileRuntime>;
}

/// Resolve a profile by name. Unknown names are a configuration error.
pub fn load_profile(name: &str) -> Result<Box<dyn ProfileFactory>> {
    match name {
        "car" => Ok(Box::new(car::CarProfileFactory)),
        other => bail!("Unknown profile '{}' (available: car)", other),
    }
}
