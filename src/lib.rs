pub mod commands;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod fs_utils;
pub mod paths;
pub mod registry;
pub mod settings;
pub mod strategy;
pub mod sync;
pub mod ui;
pub mod watcher;

#[cfg(test)]
pub mod test_utils;
