//! Extraction staging containers and the sort/merge/join that turns way
//! references into concrete node-based edges.
//!
//! The containers are filled single-threaded by the post-pass after each
//! parallel parsing round, then `prepare_data` runs the external-memory
//! join: nodes sorted by OSM id, edges joined once by source and once by
//! target, metrics computed, restrictions resolved.

use anyhow::Result;

use super::names::NameTable;
use super::spill::{self, SpillRecord};
use crate::geo;
use crate::profile::{ExtractionNode, ExtractionWay};
use crate::reader::{RawNode, RawWay};
use crate::types::{
    FixedPointCoordinate, InputRestriction, NodeBasedEdge, NodeID, QueryNode, TravelMode,
    OSMNodeID, OSMWayID, SPECIAL_NODEID,
};

/// A node as staged for the join: external id, position, profile flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalMemoryNode {
    pub osm_id: OSMNodeID,
    pub lat: i32,
    pub lon: i32,
    pub barrier: bool,
    pub traffic_light: bool,
}

impl SpillRecord for ExternalMemoryNode {
    const ENCODED_SIZE: usize = 18;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.osm_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.lat.to_le_bytes());
        buf[12..16].copy_from_slice(&self.lon.to_le_bytes());
        buf[16] = self.barrier as u8;
        buf[17] = self.traffic_light as u8;
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            osm_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            lat: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            lon: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            barrier: buf[16] != 0,
            traffic_light: buf[17] != 0,
        }
    }
}

/// Metric source for an edge segment, fixed per parent way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightData {
    /// Speed in km/h; weight derives from segment length.
    Speed(f64),
    /// Pre-divided duration share in seconds for this segment.
    Duration(f64),
}

/// One staged edge segment, one per consecutive node pair of a way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalExtractorEdge {
    pub source_osm: OSMNodeID,
    pub target_osm: OSMNodeID,
    pub name_id: u32,
    pub weight_data: WeightData,
    pub forward: bool,
    pub backward: bool,
    pub roundabout: bool,
    pub access_restricted: bool,
    pub startpoint: bool,
    pub travel_mode: TravelMode,
    // Filled during the join.
    pub source_internal: NodeID,
    pub target_internal: NodeID,
    pub source_coord: FixedPointCoordinate,
    pub weight: i32,
}

impl InternalExtractorEdge {
    #[allow(clippy::too_many_arguments)]
    fn new(
        source_osm: OSMNodeID,
        target_osm: OSMNodeID,
        name_id: u32,
        weight_data: WeightData,
        forward: bool,
        backward: bool,
        way: &ExtractionWay,
        travel_mode: TravelMode,
    ) -> Self {
        Self {
            source_osm,
            target_osm,
            name_id,
            weight_data,
            forward,
            backward,
            roundabout: way.roundabout,
            access_restricted: way.is_access_restricted,
            startpoint: way.is_startpoint,
            travel_mode,
            source_internal: SPECIAL_NODEID,
            target_internal: SPECIAL_NODEID,
            source_coord: FixedPointCoordinate::new(0, 0),
            weight: 0,
        }
    }

    fn pack_flags(&self) -> u8 {
        (self.forward as u8)
            | (self.backward as u8) << 1
            | (self.roundabout as u8) << 2
            | (self.access_restricted as u8) << 3
            | (self.startpoint as u8) << 4
    }
}

impl SpillRecord for InternalExtractorEdge {
    const ENCODED_SIZE: usize = 51;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.source_osm.to_le_bytes());
        buf[8..16].copy_from_slice(&self.target_osm.to_le_bytes());
        buf[16..20].copy_from_slice(&self.name_id.to_le_bytes());
        let (tag, value) = match self.weight_data {
            WeightData::Speed(v) => (1u8, v),
            WeightData::Duration(v) => (2u8, v),
        };
        buf[20] = tag;
        buf[21..29].copy_from_slice(&value.to_le_bytes());
        buf[29] = self.pack_flags();
        buf[30] = self.travel_mode as u8;
        buf[31..35].copy_from_slice(&self.source_internal.to_le_bytes());
        buf[35..39].copy_from_slice(&self.target_internal.to_le_bytes());
        buf[39..43].copy_from_slice(&self.source_coord.lat.to_le_bytes());
        buf[43..47].copy_from_slice(&self.source_coord.lon.to_le_bytes());
        buf[47..51].copy_from_slice(&self.weight.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        let value = f64::from_le_bytes(buf[21..29].try_into().unwrap());
        let weight_data = match buf[20] {
            2 => WeightData::Duration(value),
            _ => WeightData::Speed(value),
        };
        let flags = buf[29];
        Self {
            source_osm: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            target_osm: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            name_id: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            weight_data,
            forward: flags & 1 != 0,
            backward: flags & 2 != 0,
            roundabout: flags & 4 != 0,
            access_restricted: flags & 8 != 0,
            startpoint: flags & 16 != 0,
            travel_mode: TravelMode::from_u8(buf[30]),
            source_internal: u32::from_le_bytes(buf[31..35].try_into().unwrap()),
            target_internal: u32::from_le_bytes(buf[35..39].try_into().unwrap()),
            source_coord: FixedPointCoordinate::new(
                i32::from_le_bytes(buf[39..43].try_into().unwrap()),
                i32::from_le_bytes(buf[43..47].try_into().unwrap()),
            ),
            weight: i32::from_le_bytes(buf[47..51].try_into().unwrap()),
        }
    }
}

/// First two and last two node ids of a way, enough to identify the edge
/// incident to a restriction's via node.
#[derive(Debug, Clone, Copy)]
pub struct WaySegmentEndpoints {
    pub way_id: OSMWayID,
    pub first: OSMNodeID,
    pub second: OSMNodeID,
    pub penultimate: OSMNodeID,
    pub last: OSMNodeID,
}

/// Result of `prepare_data`: everything the serializers need.
pub struct PreparedData {
    pub nodes: Vec<QueryNode>,
    pub barriers: Vec<NodeID>,
    pub traffic_signals: Vec<NodeID>,
    pub edges: Vec<NodeBasedEdge>,
    pub restrictions: Vec<crate::types::TurnRestriction>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PrepareStats {
    pub dropped_source_edges: u64,
    pub dropped_target_edges: u64,
    pub dropped_restrictions: u64,
}

pub struct ExtractionContainers {
    pub all_nodes: Vec<ExternalMemoryNode>,
    pub all_edges: Vec<InternalExtractorEdge>,
    pub way_start_end_list: Vec<WaySegmentEndpoints>,
    pub restrictions: Vec<InputRestriction>,
    pub names: NameTable,
}

impl ExtractionContainers {
    pub fn new() -> Self {
        Self {
            all_nodes: Vec::new(),
            all_edges: Vec::new(),
            way_start_end_list: Vec::new(),
            restrictions: Vec::new(),
            names: NameTable::new(),
        }
    }

    pub fn process_node(&mut self, node: &RawNode, result: &ExtractionNode) {
        let coord = FixedPointCoordinate::from_degrees(node.lat, node.lon);
        self.all_nodes.push(ExternalMemoryNode {
            osm_id: node.id,
            lat: coord.lat,
            lon: coord.lon,
            barrier: result.barrier,
            traffic_light: result.traffic_light,
        });
    }

    pub fn process_way(&mut self, way: &RawWay, result: &ExtractionWay) {
        if way.node_refs.len() < 2 {
            return;
        }
        let forward = result.forward_enabled();
        let backward = result.backward_enabled();
        if !forward && !backward {
            return;
        }

        let name_id = self.names.intern(&result.name);
        let segment_count = (way.node_refs.len() - 1) as f64;

        let duration_per_segment = if result.duration >= 0.0 {
            Some(result.duration / segment_count)
        } else {
            None
        };

        // A way stays one bidirectional edge per segment only when both
        // directions share metric and mode; otherwise it splits into two
        // directed edge sets.
        let bidirectional = forward
            && backward
            && result.forward_travel_mode == result.backward_travel_mode
            && (duration_per_segment.is_some() || result.forward_speed == result.backward_speed);

        for pair in way.node_refs.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if bidirectional {
                let weight_data = duration_per_segment
                    .map(WeightData::Duration)
                    .unwrap_or(WeightData::Speed(result.forward_speed));
                self.all_edges.push(InternalExtractorEdge::new(
                    a,
                    b,
                    name_id,
                    weight_data,
                    true,
                    true,
                    result,
                    result.forward_travel_mode,
                ));
            } else {
                if forward {
                    let weight_data = duration_per_segment
                        .map(WeightData::Duration)
                        .unwrap_or(WeightData::Speed(result.forward_speed));
                    self.all_edges.push(InternalExtractorEdge::new(
                        a,
                        b,
                        name_id,
                        weight_data,
                        true,
                        false,
                        result,
                        result.forward_travel_mode,
                    ));
                }
                if backward {
                    let weight_data = duration_per_segment
                        .map(WeightData::Duration)
                        .unwrap_or(WeightData::Speed(result.backward_speed));
                    self.all_edges.push(InternalExtractorEdge::new(
                        b,
                        a,
                        name_id,
                        weight_data,
                        true,
                        false,
                        result,
                        result.backward_travel_mode,
                    ));
                }
            }
        }

        let refs = &way.node_refs;
        self.way_start_end_list.push(WaySegmentEndpoints {
            way_id: way.id,
            first: refs[0],
            second: refs[1],
            penultimate: refs[refs.len() - 2],
            last: refs[refs.len() - 1],
        });
    }

    pub fn process_restriction(&mut self, restriction: Option<InputRestriction>) {
        if let Some(restriction) = restriction {
            self.restrictions.push(restriction);
        }
    }

    /// The core join. Consumes the staged sequences and produces the
    /// node-based graph inputs.
    pub fn prepare_data(&mut self, spill_threshold: usize) -> Result<(PreparedData, PrepareStats)> {
        let mut stats = PrepareStats::default();

        // 1. Nodes by OSM id; duplicates keep the first occurrence so the
        // dense NodeID stays the position in this sequence.
        spill::sort_by_key(&mut self.all_nodes, spill_threshold, |n| n.osm_id)?;
        self.all_nodes.dedup_by_key(|n| n.osm_id);

        // 2. + 3. Edges by source, merge against the node sequence.
        spill::sort_by_key(&mut self.all_edges, spill_threshold, |e| e.source_osm)?;
        {
            let mut cursor = 0usize;
            for edge in self.all_edges.iter_mut() {
                while cursor < self.all_nodes.len()
                    && self.all_nodes[cursor].osm_id < edge.source_osm
                {
                    cursor += 1;
                }
                match self.all_nodes.get(cursor) {
                    Some(node) if node.osm_id == edge.source_osm => {
                        edge.source_internal = cursor as NodeID;
                        edge.source_coord = FixedPointCoordinate::new(node.lat, node.lon);
                    }
                    _ => {
                        stats.dropped_source_edges += 1;
                    }
                }
            }
        }

        // 4. Edges by target, second merge; the metric is computed here
        // because both endpoint coordinates are now at hand.
        spill::sort_by_key(&mut self.all_edges, spill_threshold, |e| e.target_osm)?;
        {
            let mut cursor = 0usize;
            for edge in self.all_edges.iter_mut() {
                if edge.source_internal == SPECIAL_NODEID {
                    continue;
                }
                while cursor < self.all_nodes.len()
                    && self.all_nodes[cursor].osm_id < edge.target_osm
                {
                    cursor += 1;
                }
                match self.all_nodes.get(cursor) {
                    Some(node) if node.osm_id == edge.target_osm => {
                        edge.target_internal = cursor as NodeID;
                        let target_coord = FixedPointCoordinate::new(node.lat, node.lon);
                        edge.weight = match edge.weight_data {
                            WeightData::Duration(seconds) => {
                                ((seconds * 10.0).round() as i32).max(1)
                            }
                            WeightData::Speed(speed_kmh) => {
                                let distance =
                                    geo::great_circle_distance(edge.source_coord, target_coord);
                                geo::distance_weight(distance, speed_kmh)
                            }
                        };
                    }
                    _ => {
                        stats.dropped_target_edges += 1;
                    }
                }
            }
        }

        // 5. Materialize surviving edges. Self-loops (ways repeating a
        // node ref) cannot be expanded and are discarded here.
        let mut edges: Vec<NodeBasedEdge> = self
            .all_edges
            .iter()
            .filter(|e| {
                e.source_internal != SPECIAL_NODEID
                    && e.target_internal != SPECIAL_NODEID
                    && e.source_internal != e.target_internal
            })
            .map(|e| {
                NodeBasedEdge::new(
                    e.source_internal,
                    e.target_internal,
                    e.name_id,
                    e.weight,
                    e.forward,
                    e.backward,
                    e.roundabout,
                    e.access_restricted,
                    e.startpoint,
                    e.travel_mode,
                )
            })
            .collect();
        {
            use rayon::prelude::*;
            edges.par_sort_unstable_by_key(|e| (e.source, e.target));
        }

        // 6. Barrier and signal nodes as dense ids.
        let mut barriers = Vec::new();
        let mut traffic_signals = Vec::new();
        for (idx, node) in self.all_nodes.iter().enumerate() {
            if node.barrier {
                barriers.push(idx as NodeID);
            }
            if node.traffic_light {
                traffic_signals.push(idx as NodeID);
            }
        }

        // 7. Restriction resolution.
        self.way_start_end_list.sort_unstable_by_key(|w| w.way_id);
        let restrictions = self.resolve_restrictions(&mut stats);

        let nodes = self
            .all_nodes
            .iter()
            .map(|n| QueryNode {
                osm_id: n.osm_id,
                lat: n.lat,
                lon: n.lon,
            })
            .collect();

        Ok((
            PreparedData {
                nodes,
                barriers,
                traffic_signals,
                edges,
                restrictions,
            },
            stats,
        ))
    }

    fn node_internal_id(&self, osm_id: OSMNodeID) -> Option<NodeID> {
        self.all_nodes
            .binary_search_by_key(&osm_id, |n| n.osm_id)
            .ok()
            .map(|idx| idx as NodeID)
    }

    /// The OSM node adjacent to `via` along a way, looking at the way's
    /// first or last segment. None if `via` is not an endpoint.
    fn adjacent_on_way(&self, way_id: OSMWayID, via: OSMNodeID) -> Option<OSMNodeID> {
        let idx = self
            .way_start_end_list
            .binary_search_by_key(&way_id, |w| w.way_id)
            .ok()?;
        let way = &self.way_start_end_list[idx];
        if way.first == via {
            Some(way.second)
        } else if way.last == via {
            Some(way.penultimate)
        } else {
            None
        }
    }

    fn resolve_restrictions(&self, stats: &mut PrepareStats) -> Vec<crate::types::TurnRestriction> {
        let mut resolved = Vec::with_capacity(self.restrictions.len());
        for restriction in &self.restrictions {
            let via_internal = self.node_internal_id(restriction.via_node);
            let from_osm = self.adjacent_on_way(restriction.from_way, restriction.via_node);
            let to_osm = self.adjacent_on_way(restriction.to_way, restriction.via_node);

            let entry = match (via_internal, from_osm, to_osm) {
                (Some(via), Some(from_osm), Some(to_osm)) => {
                    match (self.node_internal_id(from_osm), self.node_internal_id(to_osm)) {
                        (Some(from), Some(to)) => Some(crate::types::TurnRestriction::new(
                            from,
                            via,
                            to,
                            restriction.is_only,
                        )),
                        _ => None,
                    }
                }
                _ => None,
            };

            match entry {
                Some(restriction) => resolved.push(restriction),
                None => stats.dropped_restrictions += 1,
            }
        }
        resolved
    }
}

impl Default for ExtractionContainers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_node(id: u64, lat: f64, lon: f64) -> RawNode {
        RawNode {
            id,
            lat,
            lon,
            tags: Vec::new(),
        }
    }

    fn raw_way(id: u64, refs: &[u64]) -> RawWay {
        RawWay {
            id,
            node_refs: refs.to_vec(),
            tags: Vec::new(),
        }
    }

    fn bidirectional_way() -> ExtractionWay {
        ExtractionWay {
            forward_speed: 50.0,
            backward_speed: 50.0,
            ..ExtractionWay::default()
        }
    }

    fn feed_nodes(containers: &mut ExtractionContainers, nodes: &[(u64, f64, f64)]) {
        for &(id, lat, lon) in nodes {
            containers.process_node(&raw_node(id, lat, lon), &ExtractionNode::default());
        }
    }

    #[test]
    fn test_two_node_way_produces_one_bidirectional_edge() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(&mut containers, &[(1, 0.0, 0.0), (2, 0.0, 0.001)]);
        containers.process_way(&raw_way(10, &[1, 2]), &bidirectional_way());

        let (data, stats) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(data.nodes.len(), 2);
        assert_eq!(data.edges.len(), 1);
        assert!(data.edges[0].forward() && data.edges[0].backward());
        assert!(data.edges[0].weight >= 1);
        assert_eq!(stats.dropped_source_edges, 0);
        assert_eq!(stats.dropped_target_edges, 0);
    }

    #[test]
    fn test_disabled_way_produces_no_edges() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(&mut containers, &[(1, 0.0, 0.0), (2, 0.0, 0.001)]);
        containers.process_way(&raw_way(10, &[1, 2]), &ExtractionWay::default());

        let (data, _) = containers.prepare_data(usize::MAX).unwrap();
        assert!(data.edges.is_empty());
    }

    #[test]
    fn test_asymmetric_speeds_split_the_way() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(&mut containers, &[(1, 0.0, 0.0), (2, 0.0, 0.001)]);
        let way = ExtractionWay {
            forward_speed: 50.0,
            backward_speed: 30.0,
            ..ExtractionWay::default()
        };
        containers.process_way(&raw_way(10, &[1, 2]), &way);

        let (data, _) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(data.edges.len(), 2);
        let slow = data.edges.iter().find(|e| e.source == 1).unwrap();
        let fast = data.edges.iter().find(|e| e.source == 0).unwrap();
        assert!(slow.weight > fast.weight);
        assert!(data.edges.iter().all(|e| e.forward() && !e.backward()));
    }

    #[test]
    fn test_edge_with_unknown_endpoint_is_dropped() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(&mut containers, &[(1, 0.0, 0.0), (2, 0.0, 0.001)]);
        containers.process_way(&raw_way(10, &[1, 2, 999]), &bidirectional_way());

        let (data, stats) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(data.edges.len(), 1);
        assert_eq!(stats.dropped_target_edges, 1);
    }

    #[test]
    fn test_duration_overrides_speed() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(
            &mut containers,
            &[(1, 0.0, 0.0), (2, 0.0, 0.001), (3, 0.0, 0.002)],
        );
        let way = ExtractionWay {
            forward_speed: 5.0,
            backward_speed: 5.0,
            duration: 100.0,
            ..ExtractionWay::default()
        };
        containers.process_way(&raw_way(10, &[1, 2, 3]), &way);

        let (data, _) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(data.edges.len(), 2);
        // 100 s over two segments: 50 s = 500 deci-seconds each.
        assert!(data.edges.iter().all(|e| e.weight == 500));
    }

    #[test]
    fn test_barriers_and_signals_are_collected() {
        let mut containers = ExtractionContainers::new();
        containers.process_node(
            &raw_node(5, 0.0, 0.0),
            &ExtractionNode {
                barrier: true,
                traffic_light: false,
            },
        );
        containers.process_node(
            &raw_node(6, 0.0, 0.001),
            &ExtractionNode {
                barrier: false,
                traffic_light: true,
            },
        );

        let (data, _) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(data.barriers, vec![0]);
        assert_eq!(data.traffic_signals, vec![1]);
    }

    #[test]
    fn test_restriction_resolution() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(
            &mut containers,
            &[(1, 0.0, 0.0), (2, 0.0, 0.001), (3, 0.001, 0.001)],
        );
        containers.process_way(&raw_way(10, &[1, 2]), &bidirectional_way());
        containers.process_way(&raw_way(20, &[2, 3]), &bidirectional_way());
        containers.process_restriction(Some(InputRestriction {
            from_way: 10,
            via_node: 2,
            to_way: 20,
            is_only: false,
        }));

        let (data, stats) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(stats.dropped_restrictions, 0);
        assert_eq!(data.restrictions.len(), 1);
        let r = data.restrictions[0];
        assert_eq!(r.from, 0);
        assert_eq!(r.via, 1);
        assert_eq!(r.to, 2);
    }

    #[test]
    fn test_restriction_with_unresolvable_way_is_dropped() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(&mut containers, &[(1, 0.0, 0.0), (2, 0.0, 0.001)]);
        containers.process_way(&raw_way(10, &[1, 2]), &bidirectional_way());
        containers.process_restriction(Some(InputRestriction {
            from_way: 10,
            via_node: 2,
            to_way: 999,
            is_only: false,
        }));

        let (data, stats) = containers.prepare_data(usize::MAX).unwrap();
        assert!(data.restrictions.is_empty());
        assert_eq!(stats.dropped_restrictions, 1);
    }

    #[test]
    fn test_duplicate_nodes_keep_first() {
        let mut containers = ExtractionContainers::new();
        feed_nodes(&mut containers, &[(7, 1.0, 1.0), (7, 2.0, 2.0)]);
        let (data, _) = containers.prepare_data(usize::MAX).unwrap();
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(
            data.nodes[0].coordinate(),
            FixedPointCoordinate::from_degrees(1.0, 1.0)
        );
    }
}
