//! Built-in car profile: tag semantics for automobile routing.
//!
//! Access rules, speed limits, oneway handling and the sigmoid turn-cost
//! curve. Kept deliberately close to common automobile tagging practice;
//! anything it does not recognize is simply not routable.

use anyhow::Result;

use super::{ExtractionNode, ExtractionWay, ProfileFactory, ProfileProperties, ProfileRuntime};
use crate::reader::{RawNode, RawWay};
use crate::types::TravelMode;

// Script-level constants: penalties in seconds, stored as deci-seconds.
const TRAFFIC_SIGNAL_PENALTY_S: i32 = 2;
const U_TURN_PENALTY_S: i32 = 20;

const TURN_PENALTY_DS: f64 = 75.0;
const TURN_BIAS: f64 = 1.075;

const FERRY_SPEED_KMH: f64 = 5.0;

/// Barrier values a car can pass without special access tags.
const BARRIER_WHITELIST: &[&str] = &[
    "cattle_grid",
    "border_control",
    "toll_booth",
    "sally_port",
    "gate",
    "entrance",
    "no",
];

fn highway_speed(highway: &str) -> Option<f64> {
    let speed = match highway {
        "motorway" => 90.0,
        "motorway_link" => 45.0,
        "trunk" => 85.0,
        "trunk_link" => 40.0,
        "primary" => 65.0,
        "primary_link" => 30.0,
        "secondary" => 55.0,
        "secondary_link" => 25.0,
        "tertiary" => 40.0,
        "tertiary_link" => 20.0,
        "unclassified" => 25.0,
        "residential" => 25.0,
        "living_street" => 10.0,
        "service" => 15.0,
        _ => return None,
    };
    Some(speed)
}

fn road_classification(highway: &str) -> u32 {
    match highway {
        "motorway" => 1,
        "motorway_link" => 2,
        "trunk" => 3,
        "trunk_link" => 4,
        "primary" => 5,
        "primary_link" => 6,
        "secondary" => 7,
        "secondary_link" => 8,
        "tertiary" => 9,
        "tertiary_link" => 10,
        "unclassified" => 11,
        "residential" => 12,
        "living_street" => 13,
        "service" => 14,
        _ => 0,
    }
}

fn is_denied(value: Option<&str>) -> bool {
    matches!(value, Some("no") | Some("private") | Some("agricultural") | Some("forestry"))
}

/// Parse a duration tag: `H:M`, `H:M:S`, or a plain number of minutes.
/// Returns seconds.
fn parse_duration(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.split(':').collect();
    match parts.as_slice() {
        [minutes] => minutes.trim().parse::<f64>().ok().map(|m| m * 60.0),
        [hours, minutes] => {
            let h = hours.trim().parse::<f64>().ok()?;
            let m = minutes.trim().parse::<f64>().ok()?;
            Some(h * 3600.0 + m * 60.0)
        }
        [hours, minutes, seconds] => {
            let h = hours.trim().parse::<f64>().ok()?;
            let m = minutes.trim().parse::<f64>().ok()?;
            let s = seconds.trim().parse::<f64>().ok()?;
            Some(h * 3600.0 + m * 60.0 + s)
        }
        _ => None,
    }
}

pub struct CarProfile;

impl ProfileRuntime for CarProfile {
    fn properties(&self) -> ProfileProperties {
        ProfileProperties {
            traffic_signal_penalty: TRAFFIC_SIGNAL_PENALTY_S * 10,
            u_turn_penalty: U_TURN_PENALTY_S * 10,
            has_turn_function: true,
        }
    }

    fn node_function(&mut self, node: &RawNode, out: &mut ExtractionNode) -> Result<()> {
        if let Some(barrier) = node.tag("barrier") {
            let exempted = BARRIER_WHITELIST.contains(&barrier)
                || matches!(node.tag("access"), Some("yes") | Some("permissive") | Some("designated"));
            if !exempted {
                out.barrier = true;
            }
        }
        if node.tag("highway") == Some("traffic_signals") {
            out.traffic_light = true;
        }
        Ok(())
    }

    fn way_function(&mut self, way: &RawWay, out: &mut ExtractionWay) -> Result<()> {
        let is_ferry = way.tag("route") == Some("ferry");

        let base_speed = if is_ferry {
            FERRY_SPEED_KMH
        } else {
            match way.tag("highway").and_then(highway_speed) {
                Some(speed) => speed,
                None => return Ok(()), // not routable, both directions stay disabled
            }
        };

        if is_denied(way.tag("access"))
            || is_denied(way.tag("vehicle"))
            || is_denied(way.tag("motor_vehicle"))
            || is_denied(way.tag("motorcar"))
        {
            return Ok(());
        }

        out.forward_speed = base_speed;
        out.backward_speed = base_speed;
        let mode = if is_ferry {
            TravelMode::Ferry
        } else {
            TravelMode::Driving
        };
        out.forward_travel_mode = mode;
        out.backward_travel_mode = mode;

        // Respect a maxspeed tag when it lowers the class default.
        if let Some(maxspeed) = way.tag("maxspeed").and_then(|v| v.trim().parse::<f64>().ok()) {
            if maxspeed > 0.0 && maxspeed < base_speed {
                out.forward_speed = maxspeed;
                out.backward_speed = maxspeed;
            }
        }

        match way.tag("oneway") {
            Some("yes") | Some("1") | Some("true") => out.backward_speed = -1.0,
            Some("-1") | Some("reverse") => out.forward_speed = -1.0,
            _ => {
                let highway = way.tag("highway").unwrap_or("");
                if highway == "motorway" || way.tag("junction") == Some("roundabout") {
                    out.backward_speed = -1.0;
                }
            }
        }

        if way.tag("junction") == Some("roundabout") {
            out.roundabout = true;
        }

        if matches!(way.tag("access"), Some("destination") | Some("delivery")) {
            out.is_access_restricted = true;
        }

        // Ferries are not useful as route start points.
        out.is_startpoint = !is_ferry;

        if is_ferry {
            if let Some(duration) = way.tag("duration").and_then(parse_duration) {
                out.duration = duration;
            }
        }

        if let Some(name) = way.tag("name") {
            out.name = name.to_string();
        } else if let Some(reference) = way.tag("ref") {
            out.name = reference.to_string();
        }

        if let Some(highway) = way.tag("highway") {
            out.road_classification = road_classification(highway);
        }

        Ok(())
    }

    fn turn_function(&mut self, angle: f64) -> i32 {
        // Sigmoid turn cost: near zero going straight or turning right,
        // climbing towards the cap for hard left turns. Right-hand traffic.
        let exponent = -((13.0 / TURN_BIAS) * (-angle / 180.0) - 6.5 * TURN_BIAS);
        let sigmoid = 1.0 / (1.0 + exponent.exp());
        (TURN_PENALTY_DS * sigmoid).round() as i32
    }
}

pub struct CarProfileFactory;

impl ProfileFactory for CarProfileFactory {
    fn create(&self) -> Box<dyn ProfileRuntime> {
        Box::new(CarProfile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(tags: &[(&str, &str)]) -> RawWay {
        RawWay {
            id: 1,
            node_refs: vec![1, 2],
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn node(tags: &[(&str, &str)]) -> RawNode {
        RawNode {
            id: 1,
            lat: 0.0,
            lon: 0.0,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_residential_is_bidirectional() {
        let mut out = ExtractionWay::default();
        CarProfile
            .way_function(&way(&[("highway", "residential"), ("name", "Main St")]), &mut out)
            .unwrap();
        assert!(out.forward_enabled());
        assert!(out.backward_enabled());
        assert_eq!(out.name, "Main St");
    }

    #[test]
    fn test_oneway_disables_backward() {
        let mut out = ExtractionWay::default();
        CarProfile
            .way_function(&way(&[("highway", "primary"), ("oneway", "yes")]), &mut out)
            .unwrap();
        assert!(out.forward_enabled());
        assert!(!out.backward_enabled());
    }

    #[test]
    fn test_footway_is_not_routable() {
        let mut out = ExtractionWay::default();
        CarProfile
            .way_function(&way(&[("highway", "footway")]), &mut out)
            .unwrap();
        assert!(!out.forward_enabled());
        assert!(!out.backward_enabled());
    }

    #[test]
    fn test_private_access_denied() {
        let mut out = ExtractionWay::default();
        CarProfile
            .way_function(&way(&[("highway", "residential"), ("access", "private")]), &mut out)
            .unwrap();
        assert!(!out.forward_enabled());
    }

    #[test]
    fn test_ferry_sets_duration_and_mode() {
        let mut out = ExtractionWay::default();
        CarProfile
            .way_function(
                &way(&[("route", "ferry"), ("duration", "1:30")]),
                &mut out,
            )
            .unwrap();
        assert!(out.forward_enabled());
        assert_eq!(out.forward_travel_mode, TravelMode::Ferry);
        assert_eq!(out.duration, 5400.0);
        assert!(!out.is_startpoint);
    }

    #[test]
    fn test_barrier_and_signal_nodes() {
        let mut out = ExtractionNode::default();
        CarProfile
            .node_function(&node(&[("barrier", "bollard")]), &mut out)
            .unwrap();
        assert!(out.barrier);

        out.clear();
        CarProfile
            .node_function(&node(&[("barrier", "gate")]), &mut out)
            .unwrap();
        assert!(!out.barrier);

        out.clear();
        CarProfile
            .node_function(&node(&[("highway", "traffic_signals")]), &mut out)
            .unwrap();
        assert!(out.traffic_light);
    }

    #[test]
    fn test_turn_function_shape() {
        let mut profile = CarProfile;
        let straight = profile.turn_function(0.0);
        let right = profile.turn_function(90.0);
        let left = profile.turn_function(-90.0);
        assert!(straight <= 1, "straight should be ~free, got {}", straight);
        assert!(right <= 1, "right turn should be ~free, got {}", right);
        assert!(left > right, "left {} should cost more than right {}", left, right);
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("20"), Some(1200.0));
        assert_eq!(parse_duration("1:30"), Some(5400.0));
        assert_eq!(parse_duration("0:01:30"), Some(90.0));
        assert_eq!(parse_duration("x"), None);
    }
}
