pub mod cli {
    pub mod generate_status;
}
pub mod config;
pub mod status;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
}
