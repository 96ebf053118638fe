pub mod info_routes;
pub mod ingest_routes;
