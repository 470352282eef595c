// Business domains
pub mod backup;
