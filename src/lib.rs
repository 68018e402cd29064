pub mod app;
pub mod bucket;
pub mod checksum;
pub mod config;
pub mod domain;
pub mod ega;
pub mod error;
pub mod manifest;
pub mod output;
pub mod process;
pub mod score;
pub mod song;
pub mod tracker;
