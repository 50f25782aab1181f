// Incremental crawler for bike, pedestrian and bus counter data
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
