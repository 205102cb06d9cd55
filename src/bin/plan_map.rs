// Plan a path on a map file (or a random obstacle field), optionally
// blocking rectangles afterwards to exercise incremental replanning.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, warn};
use rand::prelude::*;

use raster_planner::path_planning::PlannerEvent;
use raster_planner::utils::{load_map, PathStyle, Visualizer};
use raster_planner::{
    AlgorithmKind, GridNode, GridPlanner, GridRect, OccupancyGrid, PlannerConfig, PlanningError,
    PlanningResult, Pose2D,
};

/// Grid path planning from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Map file: an image (png, bmp, ...) or a MovingAI .map file
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Algorithm (a-star, d-star, focused-d-star, focused-d-star-full-init, d-star-lite)
    #[arg(short, long)]
    algorithm: Option<AlgorithmKind>,

    /// Start cell "x,y"
    #[arg(short, long, value_parser = parse_node)]
    start: Option<GridNode>,

    /// Goal cell "x,y"
    #[arg(short, long, value_parser = parse_node)]
    goal: Option<GridNode>,

    /// Rectangle "x,y,w,h" to block after the first plan (repeatable)
    #[arg(short, long, value_parser = parse_rect)]
    block: Vec<GridRect>,

    /// Size of the random map when no map file is given
    #[arg(long, default_value_t = 64)]
    width: usize,

    #[arg(long, default_value_t = 48)]
    height: usize,

    /// Share of blocked cells in the random map
    #[arg(long, default_value_t = 0.25)]
    density: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write a PNG of the final state (requires gnuplot)
    #[arg(long)]
    png: Option<String>,

    /// Include every debug layer in the PNG
    #[arg(long)]
    layers: bool,
}

fn parse_numbers(text: &str, count: usize) -> Result<Vec<i32>, String> {
    let values: Vec<i32> = text
        .split(',')
        .map(|v| v.trim().parse::<i32>().map_err(|e| format!("{:?}: {}", v, e)))
        .collect::<Result<_, _>>()?;
    if values.len() != count {
        return Err(format!("expected {} comma separated numbers", count));
    }
    Ok(values)
}

fn parse_node(text: &str) -> Result<GridNode, String> {
    let v = parse_numbers(text, 2)?;
    Ok(GridNode::new(v[0], v[1]))
}

fn parse_rect(text: &str) -> Result<GridRect, String> {
    let v = parse_numbers(text, 4)?;
    Ok(GridRect::new(v[0], v[1], v[2], v[3]))
}

fn random_map(width: usize, height: usize, density: f64, seed: u64) -> OccupancyGrid {
    let mut rng = StdRng::seed_from_u64(seed);
    OccupancyGrid::from_fn(width, height, |_| rng.gen_bool(density.clamp(0.0, 1.0)))
}

/// First free cell scanning from `corner` along rows
fn free_cell_near(grid: &OccupancyGrid, corner: GridNode) -> Option<GridNode> {
    let (w, h) = (grid.width() as i32, grid.height() as i32);
    let xs: Vec<i32> = if corner.x == 0 { (0..w).collect() } else { (0..w).rev().collect() };
    let ys: Vec<i32> = if corner.y == 0 { (0..h).collect() } else { (0..h).rev().collect() };
    itertools::iproduct!(ys, xs)
        .map(|(y, x)| GridNode::new(x, y))
        .find(|&n| !grid.is_blocked(n))
}

fn run_to_completion(planner: &mut GridPlanner) {
    while matches!(planner.last_failure(), Some(PlanningError::ComputationIncomplete)) {
        planner.step(1000);
    }
}

fn report(planner: &GridPlanner, label: &str) {
    let path = planner.path();
    if path.is_empty() {
        warn!("{}: {} ({} ms)", label, planner.last_error(), planner.calc_time_ms());
    } else {
        info!(
            "{}: {} cells, cost {}, {} ms",
            label,
            path.len(),
            path.cost(),
            planner.calc_time_ms()
        );
    }
}

fn main() -> PlanningResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => PlannerConfig::load(path)?,
        None => PlannerConfig::default(),
    };
    if let Some(kind) = args.algorithm {
        config.algorithm = kind;
    }

    let grid = match &args.map {
        Some(path) => load_map(path, &config.map)?,
        None => random_map(args.width, args.height, args.density, args.seed),
    };
    if grid.is_empty() {
        return Err(PlanningError::InvalidMap("map has no cells".to_string()));
    }

    let start = match args.start {
        Some(node) => node,
        None => free_cell_near(&grid, GridNode::new(0, 0)).ok_or(PlanningError::NoPathFound)?,
    };
    let far = GridNode::new(grid.width() as i32 - 1, grid.height() as i32 - 1);
    let goal = match args.goal {
        Some(node) => node,
        None => free_cell_near(&grid, far).ok_or(PlanningError::NoPathFound)?,
    };

    let mut planner = GridPlanner::from_config(&config);
    planner.subscribe(|event| {
        if let PlannerEvent::DebugLayerAdded { index, name } = event {
            debug!("debug layer {} added: {}", index, name);
        }
    });
    info!("Planning with {} from {:?} to {:?}", config.algorithm.display_name(), start, goal);
    planner.set_map(grid);
    planner.set_start_goal(Pose2D::from(start), Pose2D::from(goal));
    run_to_completion(&mut planner);
    report(&planner, "initial plan");

    for rect in &args.block {
        planner.edit_region(*rect, true);
        run_to_completion(&mut planner);
        report(&planner, &format!("after blocking {:?}", rect));
    }

    if let Some(png) = &args.png {
        let mut vis = Visualizer::new();
        vis.set_title(config.algorithm.display_name());
        vis.plot_grid(planner.grid());
        if args.layers {
            for index in 0..planner.debug_layers().len() {
                if let Some(data) = planner.debug_layer_data(index) {
                    vis.plot_layer(&data, planner.grid().width());
                }
            }
        }
        vis.plot_path(planner.path(), &PathStyle::default())
            .plot_start(start)
            .plot_goal(goal);
        match vis.save_png(png, 1024, 768) {
            Ok(()) => info!("Saved {}", png),
            Err(e) => warn!("Could not write {}: {}", png, e),
        }
    }
    Ok(())
}
