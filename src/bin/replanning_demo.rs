// Replanning demo: a robot crosses a random obstacle field it only
// partially knows. Obstacles within sensor range are added to the map
// while it walks, and the planner repairs its path after every step.

use std::io::Write;

use clap::Parser;
use log::{debug, info, warn};
use rand::prelude::*;

use raster_planner::utils::{colors, PathStyle, Visualizer};
use raster_planner::{
    AlgorithmKind, GridNode, GridPath, GridPlanner, GridRect, OccupancyGrid, PlannerConfig,
    PlanningResult, Pose2D,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental replanning on a partially known map", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "d-star-lite")]
    algorithm: AlgorithmKind,

    #[arg(long, default_value_t = 80)]
    width: usize,

    #[arg(long, default_value_t = 50)]
    height: usize,

    /// Share of blocked cells in the hidden world
    #[arg(long, default_value_t = 0.3)]
    density: f64,

    /// Sensor radius in cells
    #[arg(long, default_value_t = 2)]
    range: i32,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Write a PNG of the travelled path (requires gnuplot)
    #[arg(long)]
    png: Option<String>,
}

fn hidden_world(width: usize, height: usize, density: f64, seed: u64, keep_free: &[GridNode]) -> OccupancyGrid {
    let mut rng = StdRng::seed_from_u64(seed);
    OccupancyGrid::from_fn(width, height, |node| {
        let blocked = rng.gen_bool(density.clamp(0.0, 0.9));
        blocked && !keep_free.iter().any(|f| f.is_adjacent(&node) || *f == node)
    })
}

/// Copy what the robot sees at `at` into `known`; returns the sensed
/// window if anything new was discovered
fn sense(world: &OccupancyGrid, known: &mut OccupancyGrid, at: GridNode, range: i32) -> Option<GridRect> {
    let window = GridRect::from_corners(
        GridNode::new((at.x - range).max(0), (at.y - range).max(0)),
        GridNode::new(
            (at.x + range).min(world.width() as i32 - 1),
            (at.y + range).min(world.height() as i32 - 1),
        ),
    );
    let discovered = window
        .cells()
        .filter(|&c| world.is_blocked(c) && !known.is_blocked(c))
        .count();
    if discovered == 0 {
        return None;
    }
    known.copy_region(world, window);
    Some(window)
}

fn main() -> PlanningResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    let args = Args::parse();
    let start = GridNode::new(0, 0);
    let goal = GridNode::new(args.width as i32 - 1, args.height as i32 - 1);
    let world = hidden_world(args.width, args.height, args.density, args.seed, &[start, goal]);
    info!(
        "World {}x{} with {} hidden obstacles, algorithm {}",
        args.width,
        args.height,
        world.blocked_count(),
        args.algorithm.display_name()
    );

    let config = PlannerConfig { algorithm: args.algorithm, ..PlannerConfig::default() };
    let mut planner = GridPlanner::from_config(&config);
    let mut known = OccupancyGrid::new(args.width, args.height);
    planner.set_map(known.clone());
    planner.set_start_goal(Pose2D::from(start), Pose2D::from(goal));

    let mut robot = start;
    let mut travelled = vec![robot];
    let mut replans = 0usize;
    let mut total_ms = 0i64;
    let max_moves = args.width * args.height;

    while robot != goal && travelled.len() <= max_moves {
        if let Some(window) = sense(&world, &mut known, robot, args.range) {
            planner.update_map(&known, window);
            replans += 1;
            total_ms += planner.calc_time_ms().max(0);
            debug!("obstacles discovered around {:?}", robot);
        }
        let Some(next) = planner.path().cells.get(1).copied() else {
            warn!("Robot stuck at {:?}: {}", robot, planner.last_error());
            break;
        };
        robot = next;
        travelled.push(robot);
        planner.set_start(Pose2D::from(robot));
        replans += 1;
        total_ms += planner.calc_time_ms().max(0);
    }

    let travelled = GridPath::from_cells(travelled);
    if robot == goal {
        info!(
            "Goal reached after {} moves, travelled cost {}, {} planner calls, {} ms planning",
            travelled.len() - 1,
            travelled.cost(),
            replans,
            total_ms
        );
    }

    let mut hindsight = GridPlanner::new(AlgorithmKind::AStar);
    hindsight.set_map(world.clone());
    hindsight.set_start_goal(Pose2D::from(start), Pose2D::from(goal));
    if !hindsight.path().is_empty() {
        info!("Optimal cost with full knowledge: {}", hindsight.path().cost());
    }

    if let Some(png) = &args.png {
        let mut vis = Visualizer::new();
        vis.set_title("Replanning with partial knowledge")
            .plot_grid(&world)
            .plot_path(hindsight.path(), &PathStyle::new(colors::GRAY, "Optimal"))
            .plot_path(&travelled, &PathStyle::default().with_line_width(2.5))
            .plot_start(start)
            .plot_goal(goal);
        if let Err(e) = vis.save_png(png, 1024, 768) {
            warn!("Could not write {}: {}", png, e);
        }
    }
    Ok(())
}
