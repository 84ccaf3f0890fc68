// Ingest API (C7): Axum router, middleware, and route handlers.
pub mod app;
pub mod error;
pub mod middleware;
pub mod routes;
