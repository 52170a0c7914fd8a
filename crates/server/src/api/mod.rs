pub mod handlers;
pub mod middleware;
pub mod playback;
pub mod routes;

pub use routes::create_router;
