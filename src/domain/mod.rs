// Domain layer - Counters, directions and normalized points
pub mod counter;
pub mod point;
