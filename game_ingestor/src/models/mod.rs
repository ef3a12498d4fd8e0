pub mod batch;
pub mod game;
pub mod request_params;
