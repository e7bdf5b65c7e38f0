pub mod handlers;
pub mod routes;
pub mod settings;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
