pub mod info_routes;
pub mod stateframe_routes;
