//! Visualization utilities for raster_planner
//!
//! Renders occupancy grids, planned paths and debug-layer data with
//! gnuplot. Grid rows grow downwards, so the y axis is drawn reversed.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{GridNode, GridPath, Point2D};
use crate::path_planning::debug_layer::{CellMark, LayerData};
use crate::utils::grid_map::OccupancyGrid;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00C800";
    pub const BLUE: &str = "#2020FF";
    pub const YELLOW: &str = "#FFD700";
    pub const CYAN: &str = "#00FFFF";
    pub const MAGENTA: &str = "#FF00FF";
    pub const ORANGE: &str = "#FF8000";
    pub const GRAY: &str = "#808080";

    // Semantic colors
    pub const OBSTACLE: &str = BLACK;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;
    pub const OPEN: &str = CYAN;
    pub const CLOSED: &str = YELLOW;
    pub const INCONSISTENT: &str = MAGENTA;
    pub const BACKPOINTER: &str = ORANGE;
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::new(colors::PATH, "Path")
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Series {
    Lines { x: Vec<f64>, y: Vec<f64>, style: PathStyle },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

/// Collects grid, path and layer series and draws them on one set of axes
pub struct Visualizer {
    figure: Figure,
    title: String,
    extent: Option<(usize, usize)>,
    series: Vec<Series>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            extent: None,
            series: Vec::new(),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    /// Number of series queued for drawing
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    fn push_points(&mut self, cells: &[(f64, f64)], style: PointStyle) {
        if cells.is_empty() {
            return;
        }
        let (x, y) = cells.iter().copied().unzip();
        self.series.push(Series::Points { x, y, style });
    }

    /// Blocked cells as filled squares; fixes the axis range to the grid
    pub fn plot_grid(&mut self, grid: &OccupancyGrid) -> &mut Self {
        self.extent = Some((grid.width(), grid.height()));
        let cells: Vec<(f64, f64)> = grid
            .blocked_cells()
            .map(|c| (c.x as f64, c.y as f64))
            .collect();
        self.push_points(
            &cells,
            PointStyle::new(colors::OBSTACLE, "Obstacles").with_symbol('S').with_size(0.8),
        );
        self
    }

    pub fn plot_path(&mut self, path: &GridPath, style: &PathStyle) -> &mut Self {
        if path.is_empty() {
            return self;
        }
        self.series.push(Series::Lines {
            x: path.cells.iter().map(|c| c.x as f64).collect(),
            y: path.cells.iter().map(|c| c.y as f64).collect(),
            style: style.clone(),
        });
        self
    }

    pub fn plot_point(&mut self, point: Point2D, style: &PointStyle) -> &mut Self {
        self.push_points(&[(point.x, point.y)], style.clone());
        self
    }

    pub fn plot_start(&mut self, node: GridNode) -> &mut Self {
        self.plot_point(node.into(), &PointStyle::new(colors::START, "Start").with_size(1.5))
    }

    pub fn plot_goal(&mut self, node: GridNode) -> &mut Self {
        self.plot_point(node.into(), &PointStyle::new(colors::GOAL, "Goal").with_size(1.5))
    }

    /// Draw one debug layer of a `width` cells wide grid
    pub fn plot_layer(&mut self, data: &LayerData, width: usize) -> &mut Self {
        if width == 0 {
            return self;
        }
        let center = |i: usize| ((i % width) as f64, (i / width) as f64);
        match data {
            LayerData::Marks(marks) => {
                let groups = [
                    (&[CellMark::Visited, CellMark::Closed, CellMark::TouchedConsistent][..], colors::CLOSED, "Closed"),
                    (&[CellMark::Open][..], colors::OPEN, "Open"),
                    (
                        &[
                            CellMark::OpenRaise,
                            CellMark::OpenStale,
                            CellMark::ClosedStale,
                            CellMark::TouchedInconsistent,
                        ][..],
                        colors::INCONSISTENT,
                        "Raise / stale",
                    ),
                    (&[CellMark::Next][..], colors::GREEN, "Next"),
                ];
                for (members, color, caption) in groups {
                    let cells: Vec<(f64, f64)> = marks
                        .iter()
                        .enumerate()
                        .filter(|(_, m)| members.contains(m))
                        .map(|(i, _)| center(i))
                        .collect();
                    self.push_points(&cells, PointStyle::new(color, caption).with_size(0.6));
                }
            }
            LayerData::Backpointers(pointers) => {
                // a tick a third of the way towards the successor
                let ticks: Vec<(f64, f64)> = pointers
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| {
                        let (x, y) = center(i);
                        p.map(|n| (x + (n.x as f64 - x) / 3.0, y + (n.y as f64 - y) / 3.0))
                    })
                    .collect();
                self.push_points(
                    &ticks,
                    PointStyle::new(colors::BACKPOINTER, "Backpointers").with_symbol('.'),
                );
            }
            LayerData::Costs(costs) => {
                let inconsistent: Vec<(f64, f64)> = costs
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.g != c.rhs)
                    .map(|(i, _)| center(i))
                    .collect();
                self.push_points(
                    &inconsistent,
                    PointStyle::new(colors::INCONSISTENT, "g != rhs").with_symbol('x'),
                );
            }
        }
        self
    }

    fn render(&mut self) {
        self.figure.clear_axes();
        let axes = self.figure.axes2d();
        for series in &self.series {
            match series {
                Series::Lines { x, y, style } => {
                    axes.lines(x, y, &[
                        Caption(&style.caption),
                        Color(&style.color),
                        LineWidth(style.line_width),
                    ]);
                }
                Series::Points { x, y, style } => {
                    axes.points(x, y, &[
                        Caption(&style.caption),
                        Color(&style.color),
                        PointSymbol(style.symbol),
                        PointSize(style.size),
                    ]);
                }
            }
        }
        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        if let Some((width, height)) = self.extent {
            axes.set_x_range(AutoOption::Fix(-0.5), AutoOption::Fix(width as f64 - 0.5));
            axes.set_y_range(AutoOption::Fix(height as f64 - 0.5), AutoOption::Fix(-0.5));
        }
        axes.set_aspect_ratio(AutoOption::Fix(1.0));
    }

    pub fn show(&mut self) -> Result<(), String> {
        self.render();
        self.figure.show().map_err(|e| e.to_string()).map(|_| ())
    }

    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> Result<(), String> {
        self.render();
        self.figure.save_to_png(path, width, height).map_err(|e| e.to_string())
    }

    pub fn save_svg(&mut self, path: &str, width: u32, height: u32) -> Result<(), String> {
        self.render();
        self.figure.save_to_svg(path, width, height).map_err(|e| e.to_string())
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}
