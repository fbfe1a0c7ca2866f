//! Turn admissibility and penalty: one decision function over the
//! capability set {restrictions, barrier turn-back, u-turn policy, mode
//! transitions, angle penalty}.

use std::collections::HashSet;

use crate::geo;
use crate::profile::{ProfileProperties, ProfileRuntime};
use crate::restriction_map::RestrictionMap;
use crate::types::{FixedPointCoordinate, NodeID, TravelMode};

pub struct TurnContext<'a> {
    pub from: NodeID,
    pub via: NodeID,
    pub to: NodeID,
    /// Undirected degree of the via node.
    pub via_degree: usize,
    pub from_mode: TravelMode,
    pub to_mode: TravelMode,
    pub from_coord: FixedPointCoordinate,
    pub via_coord: FixedPointCoordinate,
    pub to_coord: FixedPointCoordinate,
    pub restriction_map: &'a RestrictionMap,
    pub barrier_nodes: &'a HashSet<NodeID>,
    pub traffic_signals: &'a HashSet<NodeID>,
    pub properties: ProfileProperties,
}

/// Decide a candidate movement `from -> via -> to`. Returns the weight
/// delta to add on top of the traversed edge's weight, or `None` when the
/// turn is inadmissible.
pub fn evaluate_turn(ctx: &TurnContext, runtime: &mut dyn ProfileRuntime) -> Option<i32> {
    if ctx
        .restriction_map
        .is_restricted(ctx.from, ctx.via, ctx.to)
    {
        return None;
    }

    let is_uturn = ctx.from == ctx.to;
    if ctx.barrier_nodes.contains(&ctx.via) {
        // A barrier blocks through traffic; turning back is the only move.
        if !is_uturn {
            return None;
        }
    } else if is_uturn && ctx.via_degree > 1 {
        return None;
    }

    if !runtime.mode_transition_allowed(ctx.from_mode, ctx.to_mode) {
        return None;
    }

    let mut delta = 0;
    if ctx.traffic_signals.contains(&ctx.via) {
        delta += ctx.properties.traffic_signal_penalty;
    }
    if is_uturn {
        delta += ctx.properties.u_turn_penalty;
    } else if ctx.properties.has_turn_function {
        let angle = geo::turn_angle(ctx.from_coord, ctx.via_coord, ctx.to_coord);
        delta += runtime.turn_function(geo::signed_deviation(angle));
    }

    Some(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ExtractionNode, ExtractionWay};
    use crate::reader::{RawNode, RawWay};
    use crate::types::TurnRestriction;
    use anyhow::Result;

    struct FlatProfile {
        properties: ProfileProperties,
    }

    impl ProfileRuntime for FlatProfile {
        fn properties(&self) -> ProfileProperties {
            self.properties
        }

        fn node_function(&mut self, _: &RawNode, _: &mut ExtractionNode) -> Result<()> {
            Ok(())
        }

        fn way_function(&mut self, _: &RawWay, _: &mut ExtractionWay) -> Result<()> {
            Ok(())
        }

        fn turn_function(&mut self, _angle: f64) -> i32 {
            7
        }
    }

    fn context<'a>(
        from: NodeID,
        to: NodeID,
        via_degree: usize,
        restriction_map: &'a RestrictionMap,
        barriers: &'a HashSet<NodeID>,
        signals: &'a HashSet<NodeID>,
        properties: ProfileProperties,
    ) -> TurnContext<'a> {
        TurnContext {
            from,
            via: 1,
            to,
            via_degree,
            from_mode: TravelMode::Driving,
            to_mode: TravelMode::Driving,
            from_coord: FixedPointCoordinate::from_degrees(0.0, 0.0),
            via_coord: FixedPointCoordinate::from_degrees(0.0, 0.001),
            to_coord: FixedPointCoordinate::from_degrees(0.001, 0.001),
            restriction_map,
            barrier_nodes: barriers,
            traffic_signals: signals,
            properties,
        }
    }

    #[test]
    fn test_restricted_turn_is_rejected() {
        let map = RestrictionMap::new(&[TurnRestriction::new(0, 1, 2, false)]);
        let (barriers, signals) = (HashSet::new(), HashSet::new());
        let props = ProfileProperties::default();
        let mut runtime = FlatProfile { properties: props };

        let ctx = context(0, 2, 3, &map, &barriers, &signals, props);
        assert!(evaluate_turn(&ctx, &mut runtime).is_none());

        let ctx = context(0, 3, 3, &map, &barriers, &signals, props);
        assert!(evaluate_turn(&ctx, &mut runtime).is_some());
    }

    #[test]
    fn test_uturn_only_at_dead_end() {
        let map = RestrictionMap::new(&[]);
        let (barriers, signals) = (HashSet::new(), HashSet::new());
        let props = ProfileProperties {
            u_turn_penalty: 200,
            ..Default::default()
        };
        let mut runtime = FlatProfile { properties: props };

        let ctx = context(0, 0, 3, &map, &barriers, &signals, props);
        assert!(evaluate_turn(&ctx, &mut runtime).is_none());

        let ctx = context(0, 0, 1, &map, &barriers, &signals, props);
        assert_eq!(evaluate_turn(&ctx, &mut runtime), Some(200));
    }

    #[test]
    fn test_barrier_allows_only_turn_back() {
        let map = RestrictionMap::new(&[]);
        let signals = HashSet::new();
        let barriers: HashSet<NodeID> = [1].into_iter().collect();
        let props = ProfileProperties::default();
        let mut runtime = FlatProfile { properties: props };

        let through = context(0, 2, 3, &map, &barriers, &signals, props);
        assert!(evaluate_turn(&through, &mut runtime).is_none());

        let back = context(0, 0, 3, &map, &barriers, &signals, props);
        assert!(evaluate_turn(&back, &mut runtime).is_some());
    }

    #[test]
    fn test_signal_and_turn_penalties_accumulate() {
        let map = RestrictionMap::new(&[]);
        let barriers = HashSet::new();
        let signals: HashSet<NodeID> = [1].into_iter().collect();
        let props = ProfileProperties {
            traffic_signal_penalty: 20,
            has_turn_function: true,
            ..Default::default()
        };
        let mut runtime = FlatProfile { properties: props };

        let ctx = context(0, 2, 3, &map, &barriers, &signals, props);
        assert_eq!(evaluate_turn(&ctx, &mut runtime), Some(27));
    }

    #[test]
    fn test_mode_transition_hook() {
        struct NoFerry;
        impl ProfileRuntime for NoFerry {
            fn properties(&self) -> ProfileProperties {
                ProfileProperties::default()
            }
            fn node_function(&mut self, _: &RawNode, _: &mut ExtractionNode) -> Result<()> {
                Ok(())
            }
            fn way_function(&mut self, _: &RawWay, _: &mut ExtractionWay) -> Result<()> {
                Ok(())
            }
            fn mode_transition_allowed(&self, from: TravelMode, to: TravelMode) -> bool {
                from == to
            }
        }

        let map = RestrictionMap::new(&[]);
        let (barriers, signals) = (HashSet::new(), HashSet::new());
        let props = ProfileProperties::default();
        let mut runtime = NoFerry;

        let mut ctx = context(0, 2, 3, &map, &barriers, &signals, props);
        ctx.to_mode = TravelMode::Ferry;
        assert!(evaluate_turn(&ctx, &mut runtime).is_none());

        ctx.to_mode = TravelMode::Driving;
        assert!(evaluate_turn(&ctx, &mut runtime).is_some());
    }
}
