mod assets;
pub mod dto;
pub mod response;
mod router;
pub mod validation;

pub use assets::assets_router;
pub use router::{AppState, create_router};
