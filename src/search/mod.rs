mod elite;
mod fls;
mod path_relink;
mod tabu;

pub use elite::{EliteArchive, MIN_DISTANCE, solution_distance};
pub use fls::{ImprovementMode, NeighborhoodMemo, focused_local_search};
pub use path_relink::{elite_relinking, path_relink};
pub use tabu::{memetic_intensify, tabu_refine};
