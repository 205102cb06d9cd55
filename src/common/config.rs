//! Planner configuration loaded from TOML

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{PlanningError, PlanningResult};
use crate::path_planning::a_star::AStarConfig;
use crate::path_planning::focused_d_star::FocusedDStarConfig;
use crate::utils::map_loader::MapLoaderConfig;

/// Selectable search algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmKind {
    AStar,
    DStar,
    FocusedDStar,
    /// Focused D* that expands the whole reachable map on the first run
    FocusedDStarFullInit,
    #[default]
    DStarLite,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 5] = [
        AlgorithmKind::AStar,
        AlgorithmKind::DStar,
        AlgorithmKind::FocusedDStar,
        AlgorithmKind::FocusedDStarFullInit,
        AlgorithmKind::DStarLite,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            AlgorithmKind::AStar => "A*",
            AlgorithmKind::DStar => "D*",
            AlgorithmKind::FocusedDStar => "Focused D*",
            AlgorithmKind::FocusedDStarFullInit => "Focused D* (full init)",
            AlgorithmKind::DStarLite => "D* Lite",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            AlgorithmKind::AStar => "a-star",
            AlgorithmKind::DStar => "d-star",
            AlgorithmKind::FocusedDStar => "focused-d-star",
            AlgorithmKind::FocusedDStarFullInit => "focused-d-star-full-init",
            AlgorithmKind::DStarLite => "d-star-lite",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AlgorithmKind {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        AlgorithmKind::ALL
            .into_iter()
            .find(|kind| kind.key() == wanted)
            .ok_or_else(|| PlanningError::Config(format!("unknown algorithm '{}'", s)))
    }
}

/// Top-level planner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Algorithm created by [`crate::GridPlanner::from_config`]
    pub algorithm: AlgorithmKind,
    /// Start in interactive stepping mode
    pub stepping: bool,
    pub a_star: AStarConfig,
    pub focused_d_star: FocusedDStarConfig,
    /// Raster image thresholding
    pub map: MapLoaderConfig,
}

impl PlannerConfig {
    pub fn from_toml_str(content: &str) -> PlanningResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> PlanningResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_planning::a_star::Heuristic;

    #[test]
    fn test_default_config() {
        let config = PlannerConfig::from_toml_str("").unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::DStarLite);
        assert!(!config.stepping);
        assert_eq!(config.a_star.heuristic, Heuristic::Octile);
        assert!(!config.focused_d_star.full_init);
    }

    #[test]
    fn test_partial_config() {
        let config = PlannerConfig::from_toml_str(
            r#"
            algorithm = "focused-d-star"
            stepping = true

            [a_star]
            heuristic = "manhattan"

            [map]
            tolerance = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::FocusedDStar);
        assert!(config.stepping);
        assert_eq!(config.a_star.heuristic, Heuristic::Manhattan);
        assert_eq!(config.map.tolerance, 10);
        assert_eq!(config.map.free_color, [255, 255, 255]);
    }

    #[test]
    fn test_invalid_config() {
        let result = PlannerConfig::from_toml_str("algorithm = \"dijkstra\"");
        assert!(matches!(result, Err(PlanningError::Toml(_))));
    }

    #[test]
    fn test_algorithm_kind_from_str() {
        assert_eq!("d_star_lite".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::DStarLite);
        assert_eq!("A-Star".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::AStar);
        assert!("bfs".parse::<AlgorithmKind>().is_err());
        for kind in AlgorithmKind::ALL {
            assert_eq!(kind.to_string().parse::<AlgorithmKind>().unwrap(), kind);
        }
    }
}
