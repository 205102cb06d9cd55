//! Debug layers exposed by the planners
//!
//! A layer is a named view on an algorithm's internal state. The algorithm
//! decides which layers exist and what data they carry; renderers decide
//! whether a layer is shown for the current zoom factor.

use crate::common::GridNode;

/// What a layer visualises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Cells touched by the last search
    Visited,
    /// Open / closed list membership
    Lists,
    Backpointers,
    /// g and rhs values
    Costs,
}

/// Per-cell state shown by [`LayerKind::Visited`] and [`LayerKind::Lists`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellMark {
    #[default]
    None,
    Visited,
    Open,
    /// Open cell whose cost is going up (raise wave in flight)
    OpenRaise,
    Closed,
    /// Open cell whose cached priority belongs to an older robot position
    OpenStale,
    /// Closed cell whose cached priority belongs to an older robot position
    ClosedStale,
    /// Touched in the last call and consistent (g == rhs)
    TouchedConsistent,
    /// Touched in the last call and still inconsistent
    TouchedInconsistent,
    /// Root of the open list
    Next,
}

/// g / rhs pair; `None` stands for an infinite value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostPair {
    pub g: Option<u32>,
    pub rhs: Option<u32>,
}

/// Row-major layer data, one entry per cell
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Marks(Vec<CellMark>),
    Backpointers(Vec<Option<GridNode>>),
    Costs(Vec<CostPair>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugLayer {
    name: String,
    importance: i32,
    minimum_zoom_factor: f64,
    maximum_zoom_factor: f64,
    kind: LayerKind,
}

impl DebugLayer {
    pub fn new(name: &str, importance: i32, kind: LayerKind) -> Self {
        Self {
            name: name.to_string(),
            importance,
            minimum_zoom_factor: 0.0,
            maximum_zoom_factor: f64::INFINITY,
            kind,
        }
    }

    pub fn with_minimum_zoom_factor(mut self, factor: f64) -> Self {
        self.set_minimum_zoom_factor(factor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn importance(&self) -> i32 {
        self.importance
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn minimum_zoom_factor(&self) -> f64 {
        self.minimum_zoom_factor
    }

    pub fn maximum_zoom_factor(&self) -> f64 {
        self.maximum_zoom_factor
    }

    /// Clamped at zero; raises the maximum if it would fall below
    pub fn set_minimum_zoom_factor(&mut self, factor: f64) {
        self.minimum_zoom_factor = factor.max(0.0);
        if self.maximum_zoom_factor < self.minimum_zoom_factor {
            self.maximum_zoom_factor = self.minimum_zoom_factor;
        }
    }

    /// Clamped at zero; lowers the minimum if it would rise above
    pub fn set_maximum_zoom_factor(&mut self, factor: f64) {
        self.maximum_zoom_factor = factor.max(0.0);
        if self.minimum_zoom_factor > self.maximum_zoom_factor {
            self.minimum_zoom_factor = self.maximum_zoom_factor;
        }
    }

    /// Bounds in either order
    pub fn set_zoom_factor_range(&mut self, a: f64, b: f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.minimum_zoom_factor = lo.max(0.0);
        self.maximum_zoom_factor = hi.max(0.0);
    }

    pub fn is_visible_at(&self, zoom_factor: f64) -> bool {
        zoom_factor >= self.minimum_zoom_factor && zoom_factor <= self.maximum_zoom_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_clamping() {
        let mut layer = DebugLayer::new("Backpointers", 1, LayerKind::Backpointers);
        assert!(layer.is_visible_at(0.5));
        assert!(layer.is_visible_at(1e9));

        layer.set_maximum_zoom_factor(4.0);
        layer.set_minimum_zoom_factor(6.0);
        assert_eq!(layer.maximum_zoom_factor(), 6.0);

        layer.set_maximum_zoom_factor(2.0);
        assert_eq!(layer.minimum_zoom_factor(), 2.0);

        layer.set_minimum_zoom_factor(-3.0);
        assert_eq!(layer.minimum_zoom_factor(), 0.0);

        layer.set_zoom_factor_range(16.0, 6.0);
        assert_eq!((layer.minimum_zoom_factor(), layer.maximum_zoom_factor()), (6.0, 16.0));
        assert!(!layer.is_visible_at(5.0));
        assert!(layer.is_visible_at(10.0));
    }
}
