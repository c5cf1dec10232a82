pub mod handlers;
pub mod middleware;
pub mod pipelines;
pub mod routes;
pub mod ws;

pub use routes::create_router;
