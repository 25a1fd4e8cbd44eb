//! Balanced bounding-box tree (R-tree) over live agent positions.
//!
//! Each agent is stored as a degenerate rectangle: its point padded by
//! [`POINT_EPSILON`] on every side, since nodes need non-empty bounding
//! volumes. Insertion follows Guttman's algorithm (least-enlargement
//! descent, quadratic split on overflow). Deletion condenses the tree by
//! dissolving underfull nodes and reinserting their entries, so every leaf
//! stays at the same depth.
//!
//! The tree indexes a *copy* of the position taken at insertion time. A
//! moved agent must be deleted at its old position and reinserted at the
//! new one; [`SpatialIndex::delete`] reports `false` when handed a position
//! that no longer matches what was indexed.
//!
//! Nearest-neighbour search is best-first: a min-heap ordered by the
//! minimum possible distance from the query point to each node's box.
//! Distances are planar (latitude and longitude as Cartesian axes).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use dispatch_types::{AgentId, Location};

use crate::config::{DEFAULT_MAX_CHILDREN, DEFAULT_MIN_CHILDREN};
use crate::error::StoreError;

/// Padding, in degrees, applied around each indexed point.
pub const POINT_EPSILON: f64 = 1e-7;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle in (latitude, longitude) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Southern edge.
    pub min_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl Rect {
    /// The identity for [`union`](Self::union); bounds nothing.
    pub const EMPTY: Self = Self {
        min_lat: f64::INFINITY,
        min_lon: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
        max_lon: f64::NEG_INFINITY,
    };

    /// The padded box used to index a point.
    pub fn around(location: &Location) -> Self {
        Self {
            min_lat: location.latitude - POINT_EPSILON,
            min_lon: location.longitude - POINT_EPSILON,
            max_lat: location.latitude + POINT_EPSILON,
            max_lon: location.longitude + POINT_EPSILON,
        }
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    /// Area in square degrees; zero for [`EMPTY`](Self::EMPTY).
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (self.max_lat - self.min_lat) * (self.max_lon - self.min_lon)
    }

    /// Whether this rectangle bounds nothing.
    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    /// Area growth needed to also cover `other`.
    pub fn enlargement(&self, other: &Self) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &Self) -> bool {
        self.min_lat <= other.min_lat
            && self.min_lon <= other.min_lon
            && self.max_lat >= other.max_lat
            && self.max_lon >= other.max_lon
    }

    /// Squared distance from `point` to the nearest edge; zero inside.
    pub fn min_distance_squared(&self, point: &Location) -> f64 {
        let d_lat = (self.min_lat - point.latitude)
            .max(point.latitude - self.max_lat)
            .max(0.0);
        let d_lon = (self.min_lon - point.longitude)
            .max(point.longitude - self.max_lon)
            .max(0.0);
        d_lat.mul_add(d_lat, d_lon * d_lon)
    }
}

// ---------------------------------------------------------------------------
// Tree nodes
// ---------------------------------------------------------------------------

/// An indexed agent position.
#[derive(Debug, Clone, Copy)]
struct Item {
    id: AgentId,
    location: Location,
    bbox: Rect,
}

impl Item {
    fn new(id: AgentId, location: Location) -> Self {
        Self {
            id,
            location,
            bbox: Rect::around(&location),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    bbox: Rect,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Vec<Item>),
    Branch(Vec<Node>),
}

trait Bounded {
    fn bbox(&self) -> Rect;
}

impl Bounded for Item {
    fn bbox(&self) -> Rect {
        self.bbox
    }
}

impl Bounded for Node {
    fn bbox(&self) -> Rect {
        self.bbox
    }
}

fn bounds<T: Bounded>(entries: &[T]) -> Rect {
    entries
        .iter()
        .fold(Rect::EMPTY, |acc, e| acc.union(&e.bbox()))
}

impl Node {
    const fn empty_leaf() -> Self {
        Self {
            bbox: Rect::EMPTY,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    fn leaf(items: Vec<Item>) -> Self {
        Self {
            bbox: bounds(&items),
            kind: NodeKind::Leaf(items),
        }
    }

    fn branch(children: Vec<Self>) -> Self {
        Self {
            bbox: bounds(&children),
            kind: NodeKind::Branch(children),
        }
    }

    fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(items) => items.len(),
            NodeKind::Branch(children) => children.len(),
        }
    }

    fn recompute_bbox(&mut self) {
        self.bbox = match &self.kind {
            NodeKind::Leaf(items) => bounds(items),
            NodeKind::Branch(children) => bounds(children),
        };
    }

    /// Move every item under this node into `out`.
    fn drain_items(self, out: &mut Vec<Item>) {
        match self.kind {
            NodeKind::Leaf(items) => out.extend(items),
            NodeKind::Branch(children) => {
                for child in children {
                    child.drain_items(out);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public index
// ---------------------------------------------------------------------------

/// One result of a nearest-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// The agent found.
    pub id: AgentId,
    /// The position the agent is indexed at.
    pub location: Location,
    /// Planar distance from the query point, in degrees.
    pub distance: f64,
}

/// R-tree of agent positions.
///
/// Callers must insert each agent at most once between deletes; the index
/// does not detect duplicates.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    root: Node,
    len: usize,
    min_children: usize,
    max_children: usize,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self {
            root: Node::empty_leaf(),
            len: 0,
            min_children: DEFAULT_MIN_CHILDREN,
            max_children: DEFAULT_MAX_CHILDREN,
        }
    }
}

/// Fan-out accepted by [`SpatialIndex::new`]: `1 <= min <= max / 2`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidFanout`] otherwise.
pub(crate) const fn check_fanout(min: usize, max: usize) -> Result<(), StoreError> {
    if min == 0 || min > max / 2 {
        return Err(StoreError::InvalidFanout { min, max });
    }
    Ok(())
}

impl SpatialIndex {
    /// Create an empty index with the given node fan-out.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFanout`] unless
    /// `1 <= min_children <= max_children / 2`.
    pub fn new(min_children: usize, max_children: usize) -> Result<Self, StoreError> {
        check_fanout(min_children, max_children)?;
        Ok(Self {
            root: Node::empty_leaf(),
            len: 0,
            min_children,
            max_children,
        })
    }

    /// Number of indexed agents.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index `id` at `location`.
    pub fn insert(&mut self, id: AgentId, location: Location) {
        self.place(Item::new(id, location));
        self.len = self.len.saturating_add(1);
    }

    /// Remove the entry for `id` indexed at `location`.
    ///
    /// Returns `false` if no entry for `id` sits at exactly that position,
    /// e.g. when `location` is newer than what was indexed.
    pub fn delete(&mut self, id: AgentId, location: &Location) -> bool {
        let target = Rect::around(location);
        let mut orphans = Vec::new();
        if !remove_item(&mut self.root, id, &target, self.min_children, &mut orphans) {
            return false;
        }
        self.len = self.len.saturating_sub(1);
        self.condense_root();
        for item in orphans {
            self.place(item);
        }
        true
    }

    /// Up to `k` agents ordered by ascending distance from `point`.
    ///
    /// Ties come out in traversal order, which is not stable across
    /// inserts and deletes.
    pub fn nearest(&self, point: &Location, k: usize) -> Vec<Neighbor> {
        self.nearest_within(point, k, f64::INFINITY)
    }

    /// Like [`nearest`](Self::nearest), restricted to agents no further
    /// than `max_distance` from `point`.
    pub fn nearest_within(&self, point: &Location, k: usize, max_distance: f64) -> Vec<Neighbor> {
        let mut out = Vec::with_capacity(k.min(self.len));
        if k == 0 || self.len == 0 || max_distance.is_nan() || max_distance < 0.0 {
            return out;
        }
        let limit = max_distance * max_distance;

        let mut heap = BinaryHeap::new();
        heap.push(Candidate {
            dist: self.root.bbox.min_distance_squared(point),
            target: Target::Node(&self.root),
        });

        while let Some(Candidate { dist, target }) = heap.pop() {
            if dist > limit {
                break;
            }
            match target {
                Target::Node(node) => match &node.kind {
                    NodeKind::Leaf(items) => {
                        for item in items {
                            heap.push(Candidate {
                                dist: item.location.distance_squared(point),
                                target: Target::Item(item),
                            });
                        }
                    }
                    NodeKind::Branch(children) => {
                        for child in children {
                            heap.push(Candidate {
                                dist: child.bbox.min_distance_squared(point),
                                target: Target::Node(child),
                            });
                        }
                    }
                },
                Target::Item(item) => {
                    out.push(Neighbor {
                        id: item.id,
                        location: item.location,
                        distance: dist.sqrt(),
                    });
                    if out.len() >= k {
                        break;
                    }
                }
            }
        }
        out
    }

    /// Insert an item without touching the count.
    fn place(&mut self, item: Item) {
        if let Some(sibling) =
            insert_item(&mut self.root, item, self.min_children, self.max_children)
        {
            let old_root = std::mem::replace(&mut self.root, Node::empty_leaf());
            self.root = Node::branch(vec![old_root, sibling]);
        }
    }

    /// Collapse single-child branch roots after a deletion.
    fn condense_root(&mut self) {
        loop {
            let collapsed = match &mut self.root.kind {
                NodeKind::Branch(children) if children.len() <= 1 => {
                    Some(children.pop().unwrap_or_else(Node::empty_leaf))
                }
                _ => None,
            };
            match collapsed {
                Some(node) => self.root = node,
                None => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Insertion
// ---------------------------------------------------------------------------

/// Insert below `node`; returns the new sibling if `node` had to split.
fn insert_item(node: &mut Node, item: Item, min: usize, max: usize) -> Option<Node> {
    node.bbox = node.bbox.union(&item.bbox);
    let sibling = match &mut node.kind {
        NodeKind::Leaf(items) => {
            items.push(item);
            if items.len() <= max {
                return None;
            }
            let (keep, moved) = quadratic_split(std::mem::take(items), min);
            *items = keep;
            Node::leaf(moved)
        }
        NodeKind::Branch(children) => {
            let best = choose_subtree(children, &item.bbox);
            let split = children
                .get_mut(best)
                .and_then(|child| insert_item(child, item, min, max))?;
            children.push(split);
            if children.len() <= max {
                return None;
            }
            let (keep, moved) = quadratic_split(std::mem::take(children), min);
            *children = keep;
            Node::branch(moved)
        }
    };
    node.recompute_bbox();
    Some(sibling)
}

/// Child needing the least area enlargement; ties go to the smaller child.
fn choose_subtree(children: &[Node], bbox: &Rect) -> usize {
    let mut best = 0;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let cost = (child.bbox.enlargement(bbox), child.bbox.area());
        if cost.0 < best_cost.0 || (cost.0 <= best_cost.0 && cost.1 < best_cost.1) {
            best = i;
            best_cost = cost;
        }
    }
    best
}

/// Guttman's quadratic split of an overflowing node.
fn quadratic_split<T: Bounded>(mut entries: Vec<T>, min: usize) -> (Vec<T>, Vec<T>) {
    let (first, second) = pick_seeds(&entries);
    // Remove the higher index first so the lower one stays valid.
    let seed_b = entries.swap_remove(second);
    let seed_a = entries.swap_remove(first);

    let mut bbox_a = seed_a.bbox();
    let mut bbox_b = seed_b.bbox();
    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];

    while !entries.is_empty() {
        let remaining = entries.len();
        if group_a.len().saturating_add(remaining) <= min {
            group_a.append(&mut entries);
            break;
        }
        if group_b.len().saturating_add(remaining) <= min {
            group_b.append(&mut entries);
            break;
        }

        let next = pick_next(&entries, &bbox_a, &bbox_b);
        let entry = entries.swap_remove(next);
        let bbox = entry.bbox();
        let grow_a = bbox_a.enlargement(&bbox);
        let grow_b = bbox_b.enlargement(&bbox);

        let to_a = match grow_a.total_cmp(&grow_b) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => match bbox_a.area().total_cmp(&bbox_b.area()) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => group_a.len() <= group_b.len(),
            },
        };
        if to_a {
            bbox_a = bbox_a.union(&bbox);
            group_a.push(entry);
        } else {
            bbox_b = bbox_b.union(&bbox);
            group_b.push(entry);
        }
    }

    (group_a, group_b)
}

/// The pair wasting the most area if grouped together; `first < second`.
fn pick_seeds<T: Bounded>(entries: &[T]) -> (usize, usize) {
    let mut seeds = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for (i, a) in entries.iter().enumerate() {
        let a_box = a.bbox();
        for (j, b) in entries.iter().enumerate().skip(i.saturating_add(1)) {
            let b_box = b.bbox();
            let waste = a_box.union(&b_box).area() - a_box.area() - b_box.area();
            if waste > worst {
                worst = waste;
                seeds = (i, j);
            }
        }
    }
    seeds
}

/// The entry with the strongest preference for one group.
fn pick_next<T: Bounded>(entries: &[T], bbox_a: &Rect, bbox_b: &Rect) -> usize {
    let mut best = 0;
    let mut best_diff = f64::NEG_INFINITY;
    for (i, entry) in entries.iter().enumerate() {
        let bbox = entry.bbox();
        let diff = (bbox_a.enlargement(&bbox) - bbox_b.enlargement(&bbox)).abs();
        if diff > best_diff {
            best_diff = diff;
            best = i;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

/// Remove the item matching `id` and `target` below `node`.
///
/// Children left underfull are dissolved and their items pushed to
/// `orphans` for reinsertion.
fn remove_item(
    node: &mut Node,
    id: AgentId,
    target: &Rect,
    min: usize,
    orphans: &mut Vec<Item>,
) -> bool {
    if !node.bbox.contains(target) {
        return false;
    }
    let removed = match &mut node.kind {
        NodeKind::Leaf(items) => {
            match items.iter().position(|it| it.id == id && it.bbox == *target) {
                Some(pos) => {
                    items.swap_remove(pos);
                    true
                }
                None => false,
            }
        }
        NodeKind::Branch(children) => {
            let hit = children
                .iter_mut()
                .position(|child| remove_item(child, id, target, min, orphans));
            match hit {
                Some(pos) => {
                    if children.get(pos).is_some_and(|c| c.child_count() < min) {
                        children.swap_remove(pos).drain_items(orphans);
                    }
                    true
                }
                None => false,
            }
        }
    };
    if removed {
        node.recompute_bbox();
    }
    removed
}

// ---------------------------------------------------------------------------
// Best-first search frontier
// ---------------------------------------------------------------------------

enum Target<'a> {
    Node(&'a Node),
    Item(&'a Item),
}

struct Candidate<'a> {
    dist: f64,
    target: Target<'a>,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    // Reversed: BinaryHeap is a max-heap and we want the closest first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    /// Walk the tree checking structural invariants; returns leaf depth.
    fn check_node(node: &Node, is_root: bool, min: usize, max: usize, count: &mut usize) -> usize {
        if !is_root {
            assert!(node.child_count() >= min, "underfull node");
        }
        assert!(node.child_count() <= max, "overfull node");
        match &node.kind {
            NodeKind::Leaf(items) => {
                for item in items {
                    assert!(node.bbox.contains(&item.bbox));
                }
                *count += items.len();
                0
            }
            NodeKind::Branch(children) => {
                let depths: Vec<usize> = children
                    .iter()
                    .map(|c| {
                        assert!(node.bbox.contains(&c.bbox));
                        check_node(c, false, min, max, count)
                    })
                    .collect();
                assert!(depths.windows(2).all(|w| w[0] == w[1]), "unbalanced");
                depths.first().copied().unwrap_or(0) + 1
            }
        }
    }

    fn check_invariants(index: &SpatialIndex) {
        let mut count = 0;
        check_node(&index.root, true, index.min_children, index.max_children, &mut count);
        assert_eq!(count, index.len());
    }

    fn brute_force(points: &[(AgentId, Location)], query: &Location, k: usize) -> Vec<f64> {
        let mut dists: Vec<f64> = points.iter().map(|(_, l)| l.distance(query)).collect();
        dists.sort_by(f64::total_cmp);
        dists.truncate(k);
        dists
    }

    #[test]
    fn rejects_unsplittable_fanout() {
        assert!(SpatialIndex::new(0, 4).is_err());
        assert!(SpatialIndex::new(3, 4).is_err());
        assert!(SpatialIndex::new(2, 4).is_ok());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = SpatialIndex::default();
        assert!(index.nearest(&Location::new(0.0, 0.0), 5).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn nearest_orders_by_distance_and_caps_at_population() {
        let mut index = SpatialIndex::default();
        index.insert(AgentId(1), Location::new(0.0, 3.0));
        index.insert(AgentId(2), Location::new(0.0, 1.0));
        index.insert(AgentId(3), Location::new(0.0, 2.0));

        let found = index.nearest(&Location::new(0.0, 0.0), 10);
        let ids: Vec<AgentId> = found.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![AgentId(2), AgentId(3), AgentId(1)]);
        assert!((found[0].distance - 1.0).abs() < 1e-12);

        assert_eq!(index.nearest(&Location::new(0.0, 0.0), 2).len(), 2);
        assert!(index.nearest(&Location::new(0.0, 0.0), 0).is_empty());
    }

    #[test]
    fn nearest_within_respects_radius() {
        let mut index = SpatialIndex::default();
        index.insert(AgentId(1), Location::new(0.0, 1.0));
        index.insert(AgentId(2), Location::new(0.0, 5.0));

        let found = index.nearest_within(&Location::new(0.0, 0.0), 10, 2.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, AgentId(1));

        assert!(index.nearest_within(&Location::new(0.0, 0.0), 10, -1.0).is_empty());
        assert!(index.nearest_within(&Location::new(0.0, 0.0), 10, f64::NAN).is_empty());
    }

    #[test]
    fn delete_requires_matching_position() {
        let mut index = SpatialIndex::default();
        let original = Location::new(10.0, 10.0);
        index.insert(AgentId(7), original);

        assert!(!index.delete(AgentId(7), &Location::new(10.5, 10.0)));
        assert!(!index.delete(AgentId(8), &original));
        assert_eq!(index.len(), 1);

        assert!(index.delete(AgentId(7), &original));
        assert!(index.is_empty());
        assert!(!index.delete(AgentId(7), &original));
    }

    #[test]
    fn splits_and_condenses_stay_balanced() {
        let mut index = SpatialIndex::new(2, 4).unwrap();
        let mut points = Vec::new();
        for i in 0..200_i64 {
            let loc = Location::new((i % 17) as f64, (i / 17) as f64);
            index.insert(AgentId(i), loc);
            points.push((AgentId(i), loc));
            check_invariants(&index);
        }
        for (id, loc) in points.iter().step_by(2) {
            assert!(index.delete(*id, loc));
            check_invariants(&index);
        }
        assert_eq!(index.len(), 100);
        for (id, loc) in points.iter().skip(1).step_by(2) {
            assert!(index.delete(*id, loc));
        }
        check_invariants(&index);
        assert!(index.is_empty());
        assert!(index.nearest(&Location::new(0.0, 0.0), 3).is_empty());
    }

    #[test]
    fn matches_brute_force_under_churn() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut index = SpatialIndex::new(4, 10).unwrap();
        let mut live: Vec<(AgentId, Location)> = Vec::new();

        for i in 0..1_500_i64 {
            let loc = Location::new(rng.random_range(42.80..42.95), rng.random_range(74.50..74.70));
            index.insert(AgentId(i), loc);
            live.push((AgentId(i), loc));
        }

        // Remove a third, move a third.
        for _ in 0..500 {
            let pos = rng.random_range(0..live.len());
            let (id, loc) = live.swap_remove(pos);
            assert!(index.delete(id, &loc));
        }
        for slot in live.iter_mut().take(300) {
            let moved =
                Location::new(rng.random_range(42.80..42.95), rng.random_range(74.50..74.70));
            assert!(index.delete(slot.0, &slot.1));
            index.insert(slot.0, moved);
            slot.1 = moved;
        }
        check_invariants(&index);
        assert_eq!(index.len(), live.len());

        for _ in 0..50 {
            let query = Location::new(rng.random_range(42.75..43.0), rng.random_range(74.45..74.75));
            let k = rng.random_range(1..40);
            let got: Vec<f64> = index.nearest(&query, k).iter().map(|n| n.distance).collect();
            let want = brute_force(&live, &query, k);
            assert_eq!(got.len(), want.len());
            for (g, w) in got.iter().zip(&want) {
                assert!((g - w).abs() < 1e-12, "got {g}, want {w}");
            }
        }
    }

    #[test]
    fn rect_distance_is_zero_inside() {
        let rect = Rect::around(&Location::new(1.0, 1.0));
        assert!(rect.min_distance_squared(&Location::new(1.0, 1.0)) < f64::EPSILON);
        assert!(rect.min_distance_squared(&Location::new(2.0, 1.0)) > 0.99);
        assert!(Rect::EMPTY.is_empty());
        assert!(Rect::EMPTY.area().abs() < f64::EPSILON);
    }
}
