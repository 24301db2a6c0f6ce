pub mod classifier;
pub mod pages;
