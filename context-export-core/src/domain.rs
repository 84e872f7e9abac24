pub mod content;
pub mod export_state;
pub mod ids;

pub use content::*;
pub use export_state::*;
pub use ids::*;
