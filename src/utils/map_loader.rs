//! Map loading for the planner boundary
//!
//! Raster images are thresholded against a free-space colour; MovingAI
//! `.map` files are read as-is.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use image::DynamicImage;
use log::info;
use serde::{Deserialize, Serialize};

use crate::common::{PlanningError, PlanningResult};
use crate::utils::grid_map::OccupancyGrid;

/// Thresholding applied to raster maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapLoaderConfig {
    /// RGB colour of free space
    pub free_color: [u8; 3],
    /// Largest per-channel difference still treated as free
    pub tolerance: u8,
}

impl Default for MapLoaderConfig {
    fn default() -> Self {
        Self {
            free_color: [255, 255, 255],
            tolerance: 64,
        }
    }
}

/// Convert an image into an occupancy grid.
///
/// A pixel is blocked when any colour channel differs from the free colour
/// by more than the tolerance.
pub fn grid_from_image(image: &DynamicImage, config: &MapLoaderConfig) -> OccupancyGrid {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    OccupancyGrid::from_fn(width as usize, height as usize, |node| {
        let pixel = rgb.get_pixel(node.x as u32, node.y as u32).0;
        let delta = pixel
            .iter()
            .zip(config.free_color.iter())
            .map(|(&c, &free)| c.abs_diff(free))
            .max()
            .unwrap_or(0);
        delta > config.tolerance
    })
}

/// Load a raster map (png, bmp, jpg, ...)
pub fn load_image<P: AsRef<Path>>(path: P, config: &MapLoaderConfig) -> PlanningResult<OccupancyGrid> {
    let path = path.as_ref();
    let image = image::open(path)?;
    let grid = grid_from_image(&image, config);
    info!(
        "Loaded map {} ({}x{}, {} blocked)",
        path.display(),
        grid.width(),
        grid.height(),
        grid.blocked_count()
    );
    Ok(grid)
}

fn header_field<'a>(line: Option<&'a str>, name: &str) -> PlanningResult<&'a str> {
    let line = line.ok_or_else(|| PlanningError::InvalidMap("unexpected end of file".to_string()))?;
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(key), Some(value), None) if key == name => Ok(value),
        _ => Err(PlanningError::InvalidMap(format!("expected {} line, got {:?}", name, line))),
    }
}

fn parse_dimension(value: &str) -> PlanningResult<usize> {
    // grid coordinates are i32
    value
        .parse::<i32>()
        .ok()
        .filter(|&v| v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| PlanningError::InvalidMap(format!("invalid dimension {:?}", value)))
}

/// Read a MovingAI benchmark map (`type octile` header, `.`/`G`/`S` free)
pub fn read_movingai_map<R: Read>(reader: R) -> PlanningResult<OccupancyGrid> {
    let mut lines = BufReader::new(reader).lines();
    let mut next_line = || lines.next().transpose();

    let type_line = next_line()?;
    if header_field(type_line.as_deref(), "type")? != "octile" {
        return Err(PlanningError::InvalidMap("expected type to be octile".to_string()));
    }
    let height = parse_dimension(header_field(next_line()?.as_deref(), "height")?)?;
    let width = parse_dimension(header_field(next_line()?.as_deref(), "width")?)?;
    if next_line()?.as_deref().map(str::trim) != Some("map") {
        return Err(PlanningError::InvalidMap("expected map token".to_string()));
    }

    if width.checked_mul(height).is_none() {
        return Err(PlanningError::InvalidMap(format!("map of {}x{} cells is too large", width, height)));
    }

    // filled row by row, the header alone does not size the buffer
    let mut blocked = Vec::new();
    let mut rows = 0;
    while let Some(row) = next_line()? {
        let row = row.trim_end();
        if row.is_empty() {
            continue;
        }
        if rows >= height {
            return Err(PlanningError::InvalidMap("too many lines of map".to_string()));
        }
        if row.chars().count() != width {
            return Err(PlanningError::InvalidMap(format!("row {} has wrong width", rows)));
        }
        blocked.extend(row.chars().map(|cell| !matches!(cell, '.' | 'G' | 'S')));
        rows += 1;
    }
    if rows != height {
        return Err(PlanningError::InvalidMap(format!("expected {} rows, got {}", height, rows)));
    }
    OccupancyGrid::from_cells(width, height, blocked)
}

pub fn load_movingai_map<P: AsRef<Path>>(path: P) -> PlanningResult<OccupancyGrid> {
    let path = path.as_ref();
    let grid = read_movingai_map(File::open(path)?)?;
    info!("Loaded map {} ({}x{})", path.display(), grid.width(), grid.height());
    Ok(grid)
}

/// Load a map, picking the format from the file extension
pub fn load_map<P: AsRef<Path>>(path: P, config: &MapLoaderConfig) -> PlanningResult<OccupancyGrid> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("map") => load_movingai_map(path),
        _ => load_image(path, config),
    }
}
