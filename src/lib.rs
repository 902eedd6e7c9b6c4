pub mod actions;
pub mod catalog;
pub mod config;
pub mod doctor;
pub mod local;
pub mod naming;
pub mod natsort;
pub mod navigation;
pub mod picker;
pub mod player;

#[cfg(test)]
mod testing;
