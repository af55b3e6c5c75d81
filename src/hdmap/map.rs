//! Lanelet network topology and geometric queries
//!
//! The map provider hands the core a [`LaneletNetworkData`] value (typically
//! deserialized from JSON produced by an external lanelet2 exporter). The
//! core builds a [`LaneletMap`] from it once; after that the map is immutable
//! and freely shared for reads.
//!
//! Lanelets without a custom centerline get one synthesized at a 2 m segment
//! resolution as the average of the resampled left and right bounds. All
//! centerline sampling goes through natural cubic splines over accumulated
//! Euclidean distance.

use crate::error::{Error, Result};
use crate::hdmap::geometry::{
    accumulated_lengths, polyline_length, segment_polygon_intersections_2d, Point, Pose, Vector3,
};
use crate::hdmap::hermite::HermiteCurve;
use crate::hdmap::spline::CenterlineSpline;
use indexmap::IndexMap;
use pathfinding::prelude::dijkstra;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Segment resolution for synthesized centerlines, in meters
const CENTERLINE_RESOLUTION: f64 = 2.0;

/// Candidate step along the target lanelet when searching lane-change goals
const LANE_CHANGE_CANDIDATE_STEP: f64 = 1.0;

/// Lane-change curves with a planar curvature at or above this are discarded
const LANE_CHANGE_CURVATURE_LIMIT: f64 = 1.0;

/// Preferred lane-change curve arc length, in meters
const LANE_CHANGE_PREFERRED_LENGTH: f64 = 40.0;

/// Speed limit assumed when the map carries none, in m/s (50 km/h)
const DEFAULT_SPEED_LIMIT: f64 = 50.0 / 3.6;

/// Turn direction attribute of a lanelet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnDirection {
    Left,
    Right,
    Straight,
    #[default]
    Else,
}

/// Direction of a relative lane change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneChangeDirection {
    Left,
    Right,
}

/// Regulatory element attached to a lanelet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegulatoryElement {
    /// Traffic sign with its reference stop lines
    TrafficSign {
        sign_type: String,
        #[serde(default)]
        stop_lines: Vec<Vec<Point>>,
    },
    /// Reference to a traffic light controlling this lanelet
    TrafficLight { light_id: i64 },
    /// Lanelets that have right of way over this one
    RightOfWay {
        #[serde(default)]
        yield_to: Vec<i64>,
    },
}

fn default_true() -> bool {
    true
}

/// One lanelet as delivered by the map provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneletData {
    pub id: i64,
    pub left_bound: Vec<Point>,
    pub right_bound: Vec<Point>,
    /// Custom centerline; synthesized from the bounds when empty
    #[serde(default)]
    pub centerline: Vec<Point>,
    #[serde(default)]
    pub turn_direction: TurnDirection,
    #[serde(default)]
    pub following: Vec<i64>,
    #[serde(default)]
    pub previous: Vec<i64>,
    /// Adjacent lanelet reachable by a left lane change
    #[serde(default)]
    pub left: Option<i64>,
    /// Adjacent lanelet reachable by a right lane change
    #[serde(default)]
    pub right: Option<i64>,
    /// Lanelets whose area conflicts with this one (crosswalks, crossings)
    #[serde(default)]
    pub conflicting: Vec<i64>,
    #[serde(default = "default_true")]
    pub allows_vehicles: bool,
    #[serde(default)]
    pub allows_pedestrians: bool,
    /// Regulated speed in m/s
    #[serde(default)]
    pub speed_limit: Option<f64>,
    #[serde(default)]
    pub regulatory_elements: Vec<RegulatoryElement>,
}

/// The whole network as delivered by the map provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneletNetworkData {
    pub lanelets: Vec<LaneletData>,
}

/// A loaded lanelet with its resampled centerline and spline
#[derive(Debug)]
pub struct Lanelet {
    pub id: i64,
    pub left_bound: Vec<Point>,
    pub right_bound: Vec<Point>,
    pub centerline: Vec<Point>,
    pub length: f64,
    pub turn_direction: TurnDirection,
    pub following: Vec<i64>,
    pub previous: Vec<i64>,
    pub left: Option<i64>,
    pub right: Option<i64>,
    pub conflicting: Vec<i64>,
    pub allows_vehicles: bool,
    pub allows_pedestrians: bool,
    pub speed_limit: Option<f64>,
    pub regulatory_elements: Vec<RegulatoryElement>,
    spline: CenterlineSpline,
}

impl Lanelet {
    /// Closed outline of the lanelet: left bound followed by the reversed
    /// right bound
    pub fn polygon(&self) -> Vec<Point> {
        let mut outline = self.left_bound.clone();
        outline.extend(self.right_bound.iter().rev().copied());
        outline
    }

    /// Stop lines of any stop-sign regulatory element on this lanelet
    pub fn stop_lines(&self) -> Vec<&Vec<Point>> {
        self.regulatory_elements
            .iter()
            .filter_map(|element| match element {
                RegulatoryElement::TrafficSign {
                    sign_type,
                    stop_lines,
                } if sign_type == "stop_sign" => Some(stop_lines.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Ids of traffic lights regulating this lanelet
    pub fn traffic_light_ids(&self) -> Vec<i64> {
        self.regulatory_elements
            .iter()
            .filter_map(|element| match element {
                RegulatoryElement::TrafficLight { light_id } => Some(*light_id),
                _ => None,
            })
            .collect()
    }
}

/// Immutable lanelet network with topological and geometric queries
#[derive(Debug)]
pub struct LaneletMap {
    lanelets: IndexMap<i64, Lanelet>,
}

impl LaneletMap {
    /// Build the map from provider data, synthesizing missing centerlines and
    /// validating the graph
    pub fn from_data(data: LaneletNetworkData) -> Result<Self> {
        let known: std::collections::HashSet<i64> =
            data.lanelets.iter().map(|l| l.id).collect();
        let mut lanelets = IndexMap::new();
        for lanelet in data.lanelets {
            if lanelet.left_bound.len() < 2 || lanelet.right_bound.len() < 2 {
                return Err(Error::map(format!(
                    "lanelet {} bounds must contain at least two points",
                    lanelet.id
                )));
            }
            for neighbor in lanelet
                .following
                .iter()
                .chain(&lanelet.previous)
                .chain(&lanelet.conflicting)
                .chain(lanelet.left.iter())
                .chain(lanelet.right.iter())
            {
                if !known.contains(neighbor) {
                    return Err(Error::map(format!(
                        "lanelet {} references unknown lanelet {}",
                        lanelet.id, neighbor
                    )));
                }
            }
            let centerline = if lanelet.centerline.len() >= 2 {
                lanelet.centerline.clone()
            } else {
                generate_fine_centerline(
                    &lanelet.left_bound,
                    &lanelet.right_bound,
                    CENTERLINE_RESOLUTION,
                )?
            };
            let length = polyline_length(&centerline);
            let spline = CenterlineSpline::new(&centerline)
                .map_err(|e| e.with_context(&format!("lanelet {}", lanelet.id)))?;
            if lanelets
                .insert(
                    lanelet.id,
                    Lanelet {
                        id: lanelet.id,
                        left_bound: lanelet.left_bound,
                        right_bound: lanelet.right_bound,
                        centerline,
                        length,
                        turn_direction: lanelet.turn_direction,
                        following: lanelet.following,
                        previous: lanelet.previous,
                        left: lanelet.left,
                        right: lanelet.right,
                        conflicting: lanelet.conflicting,
                        allows_vehicles: lanelet.allows_vehicles,
                        allows_pedestrians: lanelet.allows_pedestrians,
                        speed_limit: lanelet.speed_limit,
                        regulatory_elements: lanelet.regulatory_elements,
                        spline,
                    },
                )
                .is_some()
            {
                return Err(Error::map(format!("duplicate lanelet id {}", lanelet.id)));
            }
        }
        if lanelets.is_empty() {
            return Err(Error::map("lanelet network contains no lanelets"));
        }
        tracing::info!(lanelets = lanelets.len(), "lanelet map loaded");
        Ok(LaneletMap { lanelets })
    }

    /// Load the network from a JSON file written by the map provider
    pub fn load_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::map(format!(
                "failed to read map file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let data: LaneletNetworkData = serde_json::from_str(&content).map_err(|e| {
            Error::map(format!(
                "failed to parse map file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_data(data)
    }

    /// Lanelet by id
    pub fn lanelet(&self, id: i64) -> Result<&Lanelet> {
        self.lanelets
            .get(&id)
            .ok_or_else(|| Error::map(format!("no such lanelet: {}", id)))
    }

    /// All lanelets in load order
    pub fn lanelets(&self) -> impl Iterator<Item = &Lanelet> {
        self.lanelets.values()
    }

    /// Centerline arc length of a lanelet
    pub fn lanelet_length(&self, id: i64) -> Result<f64> {
        Ok(self.lanelet(id)?.length)
    }

    /// True iff s lies within the lanelet's arc-length range
    pub fn is_in_lanelet(&self, id: i64, s: f64) -> bool {
        self.lanelet(id)
            .map(|lanelet| (0.0..=lanelet.length).contains(&s))
            .unwrap_or(false)
    }

    /// Ids of all traffic lights referenced anywhere in the map
    pub fn traffic_light_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .lanelets()
            .flat_map(|lanelet| lanelet.traffic_light_ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Shortest path between two lanelets under vehicle rules; includes both
    /// endpoints, empty when unreachable
    pub fn route(&self, from_id: i64, to_id: i64) -> Vec<i64> {
        if self.lanelet(from_id).is_err() || self.lanelet(to_id).is_err() {
            return Vec::new();
        }
        if from_id == to_id {
            return vec![from_id];
        }
        let found = dijkstra(
            &from_id,
            |&id| {
                let successors: Vec<(i64, u64)> = self
                    .lanelet(id)
                    .map(|lanelet| {
                        lanelet
                            .following
                            .iter()
                            .filter(|next| {
                                self.lanelet(**next)
                                    .map(|l| l.allows_vehicles)
                                    .unwrap_or(false)
                            })
                            .map(|&next| {
                                let cost = self
                                    .lanelet(next)
                                    .map(|l| (l.length * 1000.0) as u64)
                                    .unwrap_or(u64::MAX);
                                (next, cost)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                successors
            },
            |&id| id == to_id,
        );
        found.map(|(path, _)| path).unwrap_or_default()
    }

    /// Longitudinal distance between two lanelet positions along the shortest
    /// path. `None` when no path exists or when from == to with from_s > to_s.
    pub fn longitudinal_distance(&self, from: (i64, f64), to: (i64, f64)) -> Option<f64> {
        let (from_id, from_s) = from;
        let (to_id, to_s) = to;
        if from_id == to_id {
            if from_s > to_s {
                return None;
            }
            return Some(to_s - from_s);
        }
        let path = self.route(from_id, to_id);
        if path.is_empty() {
            return None;
        }
        let mut distance = 0.0;
        for id in &path {
            if *id == from_id {
                distance += self.lanelet_length(from_id).ok()? - from_s;
            } else if *id == to_id {
                distance += to_s;
            } else {
                distance += self.lanelet_length(*id).ok()?;
            }
        }
        Some(distance)
    }

    /// Following lanelet ids, optionally filtered by turn direction
    pub fn next_lanelet_ids(&self, id: i64) -> Vec<i64> {
        self.lanelet(id)
            .map(|lanelet| lanelet.following.clone())
            .unwrap_or_default()
    }

    pub fn next_lanelet_ids_by_turn(&self, id: i64, turn: TurnDirection) -> Vec<i64> {
        self.next_lanelet_ids(id)
            .into_iter()
            .filter(|next| {
                self.lanelet(*next)
                    .map(|l| l.turn_direction == turn)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn previous_lanelet_ids(&self, id: i64) -> Vec<i64> {
        self.lanelet(id)
            .map(|lanelet| lanelet.previous.clone())
            .unwrap_or_default()
    }

    pub fn previous_lanelet_ids_by_turn(&self, id: i64, turn: TurnDirection) -> Vec<i64> {
        self.previous_lanelet_ids(id)
            .into_iter()
            .filter(|previous| {
                self.lanelet(*previous)
                    .map(|l| l.turn_direction == turn)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// The follower an entity drifts into when overrunning a lanelet:
    /// straight continuation when one exists, else the first follower
    pub fn next_straight_or_first(&self, id: i64) -> Option<i64> {
        let straight = self.next_lanelet_ids_by_turn(id, TurnDirection::Straight);
        straight
            .first()
            .copied()
            .or_else(|| self.next_lanelet_ids(id).first().copied())
    }

    /// Expand forward from a lanelet, preferring straight continuations,
    /// until `distance` is covered. Includes the starting lanelet.
    pub fn following_lanelets(&self, id: i64, distance: f64) -> Vec<i64> {
        self.expand(id, distance, true)
    }

    /// Expand backwards from a lanelet until `distance` is covered
    pub fn previous_lanelets(&self, id: i64, distance: f64) -> Vec<i64> {
        self.expand(id, distance, false)
    }

    fn expand(&self, mut id: i64, distance: f64, forward: bool) -> Vec<i64> {
        let mut result = vec![id];
        let mut total = 0.0;
        while total < distance {
            let straight = if forward {
                self.next_lanelet_ids_by_turn(id, TurnDirection::Straight)
            } else {
                self.previous_lanelet_ids_by_turn(id, TurnDirection::Straight)
            };
            let next = straight.first().copied().or_else(|| {
                let all = if forward {
                    self.next_lanelet_ids(id)
                } else {
                    self.previous_lanelet_ids(id)
                };
                all.first().copied()
            });
            match next {
                Some(next_id) => {
                    id = next_id;
                    total += self.lanelet_length(id).unwrap_or(0.0);
                    result.push(id);
                }
                None => break,
            }
        }
        result
    }

    fn extended_spline(&self, id: i64) -> Result<CenterlineSpline> {
        let lanelet = self.lanelet(id)?;
        let mut points = lanelet.centerline.clone();
        if let Some(next_id) = self.next_straight_or_first(id) {
            if let Ok(next) = self.lanelet(next_id) {
                points.extend(next.centerline.iter().skip(1).copied());
            }
        }
        CenterlineSpline::new(&points)
    }

    /// World pose of a lanelet position. The centerline is extended into the
    /// straight (or first) follower so s slightly beyond the lanelet length
    /// still resolves. Lateral offset displaces along the left normal; rpy is
    /// applied on top of the tangent frame.
    pub fn to_map_pose(&self, id: i64, s: f64, offset: f64, rpy: Vector3) -> Option<Pose> {
        let spline = self.extended_spline(id).ok()?;
        let position = spline.position(s)?;
        let tangent = spline.tangent(s)?;
        let yaw = tangent.y.atan2(tangent.x);
        Some(Pose::new(
            Point::new(
                position.x - yaw.sin() * offset,
                position.y + yaw.cos() * offset,
                position.z,
            ),
            Vector3::new(rpy.x, rpy.y, yaw + rpy.z),
        ))
    }

    /// Normalized centerline tangent at arc length s
    pub fn tangent_vector(&self, id: i64, s: f64) -> Option<Vector3> {
        let lanelet = self.lanelet(id).ok()?;
        lanelet.spline.tangent(s)
    }

    /// Adjacent lanelet for a relative lane change
    pub fn lane_changeable_lanelet(
        &self,
        id: i64,
        direction: LaneChangeDirection,
    ) -> Option<i64> {
        let lanelet = self.lanelet(id).ok()?;
        match direction {
            LaneChangeDirection::Left => lanelet.left,
            LaneChangeDirection::Right => lanelet.right,
        }
    }

    /// True iff the two lanelets are lane-change adjacent
    pub fn can_change_lane(&self, from_id: i64, to_id: i64) -> bool {
        self.lanelet(from_id)
            .map(|lanelet| lanelet.left == Some(to_id) || lanelet.right == Some(to_id))
            .unwrap_or(false)
    }

    /// Search a lane-change trajectory from a world pose onto a target
    /// lanelet. Candidates are taken at 1 m steps along the target; curves
    /// with planar curvature >= 1.0 are discarded and the survivor closest to
    /// a 40 m arc length wins. Returns the curve and the target arc length.
    pub fn lane_change_trajectory(
        &self,
        from_pose: &Pose,
        to_id: i64,
    ) -> Option<(HermiteCurve, f64)> {
        let to_length = self.lanelet_length(to_id).ok()?;
        let mut best: Option<(f64, HermiteCurve, f64)> = None;
        let mut to_s = 0.0;
        while to_s < to_length {
            if let Some(goal_pose) = self.to_map_pose(to_id, to_s, 0.0, Vector3::default()) {
                let distance = from_pose.position.distance(&goal_pose.position);
                if let Some(curve) =
                    self.lane_change_curve(from_pose, to_id, to_s, distance * 0.5)
                {
                    if curve.max_2d_curvature() < LANE_CHANGE_CURVATURE_LIMIT {
                        let evaluation = (LANE_CHANGE_PREFERRED_LENGTH - curve.length()).abs();
                        let better = best
                            .as_ref()
                            .map(|(eval, _, _)| evaluation < *eval)
                            .unwrap_or(true);
                        if better {
                            best = Some((evaluation, curve, to_s));
                        }
                    }
                }
            }
            to_s += LANE_CHANGE_CANDIDATE_STEP;
        }
        best.map(|(_, curve, target_s)| (curve, target_s))
    }

    fn lane_change_curve(
        &self,
        from_pose: &Pose,
        to_id: i64,
        to_s: f64,
        tangent_magnitude: f64,
    ) -> Option<HermiteCurve> {
        let goal_tangent = self.tangent_vector(to_id, to_s)?;
        let goal_pose = self.to_map_pose(to_id, to_s, 0.0, Vector3::default())?;
        let start_vector = from_pose.direction_vector(tangent_magnitude);
        let goal_vector = goal_tangent.scaled(tangent_magnitude);
        Some(HermiteCurve::new(
            from_pose,
            &goal_pose,
            start_vector,
            goal_vector,
        ))
    }

    /// Longitudinal distance from a lanelet position to the first stop line
    /// on the given following lanelets. Within one centerline segment the
    /// crossing nearest to the segment start wins.
    pub fn distance_to_stop_line(
        &self,
        following_lanelets: &[i64],
        from: (i64, f64),
    ) -> Option<f64> {
        let (stop_lanelet_id, stop_lines) = following_lanelets.iter().find_map(|id| {
            let lanelet = self.lanelet(*id).ok()?;
            let stop_lines: Vec<Vec<Point>> =
                lanelet.stop_lines().into_iter().cloned().collect();
            if stop_lines.is_empty() {
                None
            } else {
                Some((*id, stop_lines))
            }
        })?;
        let centerline = &self.lanelet(stop_lanelet_id).ok()?.centerline;
        if centerline.len() < 2 {
            return None;
        }
        let mut intersection_s = 0.0;
        let mut found = false;
        for window in centerline.windows(2) {
            let (c0, c1) = (&window[0], &window[1]);
            let mut nearest_in_segment: Option<f64> = None;
            for stop_line in &stop_lines {
                for stop_segment in stop_line.windows(2) {
                    if let Some(crossing) = crate::hdmap::geometry::segment_intersection_2d(
                        c0,
                        c1,
                        &stop_segment[0],
                        &stop_segment[1],
                    ) {
                        let s_in_segment = crossing.distance_2d(c0);
                        nearest_in_segment = Some(match nearest_in_segment {
                            Some(current) if current <= s_in_segment => current,
                            _ => s_in_segment,
                        });
                    }
                }
            }
            match nearest_in_segment {
                Some(s_in_segment) => {
                    intersection_s += s_in_segment;
                    found = true;
                    break;
                }
                None => intersection_s += c0.distance_2d(c1),
            }
        }
        if !found {
            return None;
        }
        self.longitudinal_distance(from, (stop_lanelet_id, intersection_s))
    }

    /// Arc length on `lanelet_id` where its centerline first crosses the
    /// outline of `crossing_id` (a conflicting crosswalk)
    pub fn collision_point_on_lanelet(&self, lanelet_id: i64, crossing_id: i64) -> Option<f64> {
        let centerline = &self.lanelet(lanelet_id).ok()?.centerline;
        let polygon = self.lanelet(crossing_id).ok()?.polygon();
        let mut s_along = 0.0;
        for window in centerline.windows(2) {
            let (c0, c1) = (&window[0], &window[1]);
            let segment_length = c0.distance(c1);
            let crossings = segment_polygon_intersections_2d(c0, c1, &polygon);
            if let Some(nearest) = crossings
                .iter()
                .map(|p| p.distance_2d(c0))
                .min_by(|a, b| a.total_cmp(b))
            {
                let fraction = if segment_length > 0.0 {
                    nearest / c0.distance_2d(c1).max(f64::EPSILON)
                } else {
                    0.0
                };
                return Some(s_along + fraction.min(1.0) * segment_length);
            }
            s_along += segment_length;
        }
        None
    }

    /// Conflicting pedestrian lanelets (crosswalks) for each given lanelet
    pub fn conflicting_crosswalk_ids(&self, lanelet_ids: &[i64]) -> Vec<i64> {
        let mut result = Vec::new();
        for id in lanelet_ids {
            if let Ok(lanelet) = self.lanelet(*id) {
                for conflicting in &lanelet.conflicting {
                    if self
                        .lanelet(*conflicting)
                        .map(|l| l.allows_pedestrians)
                        .unwrap_or(false)
                    {
                        result.push(*conflicting);
                    }
                }
            }
        }
        result
    }

    /// Lanelets holding right of way over the given lanelet
    pub fn right_of_way_lanelet_ids(&self, id: i64) -> Vec<i64> {
        self.lanelet(id)
            .map(|lanelet| {
                lanelet
                    .regulatory_elements
                    .iter()
                    .filter_map(|element| match element {
                        RegulatoryElement::RightOfWay { yield_to } => Some(yield_to.iter()),
                        _ => None,
                    })
                    .flatten()
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Minimum regulated speed across the given lanelets, in m/s
    pub fn speed_limit(&self, lanelet_ids: &[i64]) -> Result<f64> {
        if lanelet_ids.is_empty() {
            return Err(Error::map(
                "speed limit query requires at least one lanelet id",
            ));
        }
        let mut minimum = f64::INFINITY;
        for id in lanelet_ids {
            let limit = self.lanelet(*id)?.speed_limit.unwrap_or(DEFAULT_SPEED_LIMIT);
            minimum = minimum.min(limit);
        }
        Ok(minimum)
    }

    /// Forward polyline along a route, sampled at 1 m steps, starting at
    /// (lanelet_id, s) and covering `forward_distance`
    pub fn clip_trajectory(
        &self,
        lanelet_id: i64,
        s: f64,
        route: &[i64],
        forward_distance: f64,
    ) -> Vec<Point> {
        let mut points = Vec::new();
        let mut on_route = false;
        let mut rest = forward_distance;
        for id in route {
            let length = match self.lanelet_length(*id) {
                Ok(length) => length,
                Err(_) => return points,
            };
            let start_s = if *id == lanelet_id && !on_route {
                on_route = true;
                s
            } else if on_route {
                0.0
            } else {
                continue;
            };
            let available = length - start_s;
            let span = rest.min(available);
            let mut sample = start_s;
            while sample < start_s + span {
                if let Some(pose) = self.to_map_pose(*id, sample, 0.0, Vector3::default()) {
                    points.push(pose.position);
                }
                sample += 1.0;
            }
            if rest < available {
                break;
            }
            rest -= available;
        }
        points
    }
}

/// Bracketing indices for a target arc length within a monotone accumulated
/// length table
fn find_nearest_index_pair(accumulated: &[f64], target: f64) -> Result<(usize, usize)> {
    let n = accumulated.len();
    if n < 2 {
        return Err(Error::map("accumulated length table is degenerate"));
    }
    if target < accumulated[1] {
        return Ok((0, 1));
    }
    if target > accumulated[n - 2] {
        return Ok((n - 2, n - 1));
    }
    for i in 1..n {
        if accumulated[i - 1] <= target && target <= accumulated[i] {
            return Ok((i - 1, i));
        }
    }
    Err(Error::map("no nearest index pair found"))
}

fn resample_points(points: &[Point], num_segments: usize) -> Result<Vec<Point>> {
    let accumulated = accumulated_lengths(points);
    let total = *accumulated.last().unwrap_or(&0.0);
    let mut resampled = Vec::with_capacity(num_segments + 1);
    for i in 0..=num_segments {
        let target = (i as f64 / num_segments as f64) * total;
        let (back, front) = find_nearest_index_pair(&accumulated, target)?;
        let segment_length = accumulated[front] - accumulated[back];
        let ratio = if segment_length > 0.0 {
            (target - accumulated[back]) / segment_length
        } else {
            0.0
        };
        let p0 = &points[back];
        let p1 = &points[front];
        resampled.push(Point::new(
            p0.x + (p1.x - p0.x) * ratio,
            p0.y + (p1.y - p0.y) * ratio,
            p0.z + (p1.z - p0.z) * ratio,
        ));
    }
    Ok(resampled)
}

/// Synthesize a centerline as the average of both bounds resampled to the
/// same segment count
fn generate_fine_centerline(
    left_bound: &[Point],
    right_bound: &[Point],
    resolution: f64,
) -> Result<Vec<Point>> {
    let longer = polyline_length(left_bound).max(polyline_length(right_bound));
    let num_segments = ((longer / resolution).ceil() as usize).max(1);
    let left = resample_points(left_bound, num_segments)?;
    let right = resample_points(right_bound, num_segments)?;
    Ok(left
        .iter()
        .zip(right.iter())
        .map(|(l, r)| Point::new((l.x + r.x) / 2.0, (l.y + r.y) / 2.0, (l.z + r.z) / 2.0))
        .collect())
}


#[cfg(test)]
mod tests {
    use super::test_support::straight_lanelet;
    use super::*;

    fn two_lane_map() -> LaneletMap {
        let mut first = straight_lanelet(100, 0.0, 40.0, 0.0);
        let mut second = straight_lanelet(200, 40.0, 40.0, 0.0);
        first.following = vec![200];
        second.previous = vec![100];
        LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![first, second],
        })
        .unwrap()
    }

    #[test]
    fn lanelet_length_matches_centerline() {
        let map = two_lane_map();
        assert!((map.lanelet_length(100).unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn route_follows_graph() {
        let map = two_lane_map();
        assert_eq!(map.route(100, 200), vec![100, 200]);
        assert_eq!(map.route(200, 100), Vec::<i64>::new());
        assert_eq!(map.route(100, 100), vec![100]);
    }

    #[test]
    fn longitudinal_distance_spans_lanelets() {
        let map = two_lane_map();
        // S2: ego at (100, 35), target (200, 10) -> 15.
        let d = map.longitudinal_distance((100, 35.0), (200, 10.0)).unwrap();
        assert!((d - 15.0).abs() < 1e-9);
    }

    #[test]
    fn longitudinal_distance_same_lanelet_backwards_is_none() {
        let map = two_lane_map();
        assert!(map.longitudinal_distance((100, 30.0), (100, 10.0)).is_none());
    }

    #[test]
    fn route_sum_identity() {
        let map = two_lane_map();
        let route = map.route(100, 200);
        let sum: f64 = route
            .iter()
            .map(|id| map.lanelet_length(*id).unwrap())
            .sum();
        let d = map
            .longitudinal_distance((100, 0.0), (200, map.lanelet_length(200).unwrap()))
            .unwrap();
        assert!((d - sum).abs() < 1e-9);
    }

    #[test]
    fn to_map_pose_applies_left_offset() {
        let map = two_lane_map();
        let pose = map
            .to_map_pose(100, 10.0, 1.0, Vector3::default())
            .unwrap();
        assert!((pose.position.x - 10.0).abs() < 1e-6);
        assert!((pose.position.y - 1.0).abs() < 1e-6);
        assert!(pose.yaw().abs() < 1e-6);
    }

    #[test]
    fn to_map_pose_extends_into_follower() {
        let map = two_lane_map();
        // s slightly beyond lanelet 100 reaches into 200.
        let pose = map
            .to_map_pose(100, 41.0, 0.0, Vector3::default())
            .unwrap();
        assert!((pose.position.x - 41.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_graph_pose_is_none() {
        let map = two_lane_map();
        assert!(map.to_map_pose(200, 90.0, 0.0, Vector3::default()).is_none());
    }

    #[test]
    fn following_lanelets_accumulate_distance() {
        let map = two_lane_map();
        assert_eq!(map.following_lanelets(100, 50.0), vec![100, 200]);
        assert_eq!(map.previous_lanelets(200, 10.0), vec![200, 100]);
    }

    #[test]
    fn lane_change_trajectory_respects_curvature_bound() {
        let mut from = straight_lanelet(100, 0.0, 100.0, 0.0);
        let mut to = straight_lanelet(101, 0.0, 100.0, 3.5);
        from.left = Some(101);
        to.right = Some(100);
        let map = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![from, to],
        })
        .unwrap();
        let start = map.to_map_pose(100, 10.0, 0.0, Vector3::default()).unwrap();
        let (curve, target_s) = map.lane_change_trajectory(&start, 101).unwrap();
        assert!(curve.max_2d_curvature() < 1.0);
        assert!(target_s > 10.0);
        // The winning curve is the one closest to the 40 m preferred length.
        assert!((curve.length() - 40.0).abs() < 5.0);
        assert!(map.can_change_lane(100, 101));
        assert_eq!(
            map.lane_changeable_lanelet(100, LaneChangeDirection::Left),
            Some(101)
        );
    }

    #[test]
    fn distance_to_stop_line_walks_centerline() {
        let mut first = straight_lanelet(100, 0.0, 40.0, 0.0);
        let mut second = straight_lanelet(200, 40.0, 40.0, 0.0);
        first.following = vec![200];
        second.previous = vec![100];
        second.regulatory_elements = vec![RegulatoryElement::TrafficSign {
            sign_type: "stop_sign".to_string(),
            stop_lines: vec![vec![
                Point::new(50.0, -3.0, 0.0),
                Point::new(50.0, 3.0, 0.0),
            ]],
        }];
        let map = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![first, second],
        })
        .unwrap();
        let following = map.following_lanelets(100, 60.0);
        let d = map.distance_to_stop_line(&following, (100, 35.0)).unwrap();
        // 5 m to the end of 100 plus 10 m into 200.
        assert!((d - 15.0).abs() < 1e-6);
    }

    #[test]
    fn collision_point_finds_first_crossing() {
        let mut road = straight_lanelet(100, 0.0, 40.0, 0.0);
        // Crosswalk perpendicular to the road at x in [18, 22].
        let crosswalk = LaneletData {
            id: 300,
            left_bound: vec![Point::new(18.0, -5.0, 0.0), Point::new(18.0, 5.0, 0.0)],
            right_bound: vec![Point::new(22.0, -5.0, 0.0), Point::new(22.0, 5.0, 0.0)],
            centerline: vec![Point::new(20.0, -5.0, 0.0), Point::new(20.0, 5.0, 0.0)],
            turn_direction: TurnDirection::Else,
            following: Vec::new(),
            previous: Vec::new(),
            left: None,
            right: None,
            conflicting: Vec::new(),
            allows_vehicles: false,
            allows_pedestrians: true,
            speed_limit: None,
            regulatory_elements: Vec::new(),
        };
        road.conflicting = vec![300];
        let map = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![road, crosswalk],
        })
        .unwrap();
        let s = map.collision_point_on_lanelet(100, 300).unwrap();
        assert!((s - 18.0).abs() < 1e-6);
        assert_eq!(map.conflicting_crosswalk_ids(&[100]), vec![300]);
    }

    #[test]
    fn speed_limit_takes_minimum() {
        let mut first = straight_lanelet(100, 0.0, 40.0, 0.0);
        let mut second = straight_lanelet(200, 40.0, 40.0, 0.0);
        first.following = vec![200];
        second.previous = vec![100];
        first.speed_limit = Some(16.7);
        second.speed_limit = Some(8.3);
        let map = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![first, second],
        })
        .unwrap();
        assert!((map.speed_limit(&[100, 200]).unwrap() - 8.3).abs() < 1e-9);
        assert!(map.speed_limit(&[]).is_err());
    }

    #[test]
    fn synthesized_centerline_averages_bounds() {
        let mut lanelet = straight_lanelet(100, 0.0, 40.0, 0.0);
        lanelet.centerline = Vec::new();
        let map = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![lanelet],
        })
        .unwrap();
        let lanelet = map.lanelet(100).unwrap();
        assert!(lanelet.centerline.len() >= 2);
        for point in &lanelet.centerline {
            assert!(point.y.abs() < 1e-9);
        }
        assert!((lanelet.length - 40.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_reference_is_map_error() {
        let mut lanelet = straight_lanelet(100, 0.0, 40.0, 0.0);
        lanelet.following = vec![999];
        let err = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![lanelet],
        })
        .unwrap_err();
        assert!(matches!(err, Error::Map { .. }));
    }

    #[test]
    fn is_in_lanelet_checks_arc_length_range() {
        let map = two_lane_map();
        assert!(map.is_in_lanelet(100, 0.0));
        assert!(map.is_in_lanelet(100, 40.0));
        assert!(!map.is_in_lanelet(100, 40.1));
        assert!(!map.is_in_lanelet(100, -0.1));
    }

    #[test]
    fn clip_trajectory_samples_along_route() {
        let map = two_lane_map();
        let points = map.clip_trajectory(100, 35.0, &[100, 200], 10.0);
        assert!(!points.is_empty());
        let first = points.first().unwrap();
        assert!((first.x - 35.0).abs() < 1e-6);
        let last = points.last().unwrap();
        assert!(last.x < 45.5);
    }
}
