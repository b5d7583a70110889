pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod filter;
pub mod output;
pub mod pipeline;
pub mod pose;
pub mod tracking;
pub mod triangulation;
pub mod vision;
