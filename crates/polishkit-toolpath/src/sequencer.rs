//! Travel-reducing point ordering
//!
//! Greedy nearest-neighbour tour construction, optionally followed by 2-opt
//! refinement. Neither is optimal. The greedy pass is quadratic in the number
//! of points; callers sequencing very large bands pay that cost.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tour construction heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourStrategy {
    /// Greedy nearest neighbour from the first point.
    NearestNeighbor,
    /// Greedy tour improved by segment reversals until no pass gains or
    /// `max_passes` is reached.
    NearestNeighborTwoOpt { max_passes: usize },
}

impl Default for TourStrategy {
    fn default() -> Self {
        Self::NearestNeighbor
    }
}

/// Orders points to shorten the travelled distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathSequencer {
    strategy: TourStrategy,
}

impl PathSequencer {
    pub fn new(strategy: TourStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> TourStrategy {
        self.strategy
    }

    /// Reordered copy of `points`.
    pub fn sequence(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        self.order(points).into_iter().map(|i| points[i]).collect()
    }

    /// Visiting order as a permutation of `0..points.len()`.
    ///
    /// The tour starts at index 0; on distance ties the lowest index wins.
    /// Inputs of two points or fewer come back unchanged.
    pub fn order(&self, points: &[Point3<f64>]) -> Vec<usize> {
        if points.len() <= 2 {
            return (0..points.len()).collect();
        }

        let mut tour = nearest_neighbor_tour(points, 0);
        if let TourStrategy::NearestNeighborTwoOpt { max_passes } = self.strategy {
            let passes = two_opt(points, &mut tour, max_passes);
            debug!("2-opt finished after {} passes on {} points", passes, points.len());
        }
        tour
    }
}

/// Total polyline length when visiting `points` in `order`.
pub fn tour_length(points: &[Point3<f64>], order: &[usize]) -> f64 {
    order
        .windows(2)
        .map(|w| (points[w[1]] - points[w[0]]).norm())
        .sum()
}

fn nearest_neighbor_tour(points: &[Point3<f64>], start: usize) -> Vec<usize> {
    let mut visited = vec![false; points.len()];
    let mut tour = Vec::with_capacity(points.len());

    let mut current = start;
    visited[current] = true;
    tour.push(current);

    while tour.len() < points.len() {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in points.iter().enumerate() {
            if visited[i] {
                continue;
            }
            let d = (p - points[current]).norm_squared();
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }
        let Some((next, _)) = best else { break };
        visited[next] = true;
        tour.push(next);
        current = next;
    }

    tour
}

/// Open-path 2-opt. The first point stays fixed; returns passes run.
fn two_opt(points: &[Point3<f64>], tour: &mut [usize], max_passes: usize) -> usize {
    const MIN_GAIN: f64 = 1e-9;
    let n = tour.len();
    let mut passes = 0;
    while passes < max_passes {
        passes += 1;
        let mut improved = false;
        for i in 0..n - 2 {
            for j in i + 2..n {
                let a = points[tour[i]];
                let b = points[tour[i + 1]];
                let c = points[tour[j]];
                let before = (b - a).norm()
                    + if j + 1 < n {
                        (points[tour[j + 1]] - c).norm()
                    } else {
                        0.0
                    };
                let after = (c - a).norm()
                    + if j + 1 < n {
                        (points[tour[j + 1]] - b).norm()
                    } else {
                        0.0
                    };
                if before - after > MIN_GAIN {
                    tour[i + 1..=j].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }
    passes
}
