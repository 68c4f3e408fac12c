pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod launcher;
pub mod output;
pub mod runner;
pub mod sbatch;
pub mod token;
pub mod trains;
