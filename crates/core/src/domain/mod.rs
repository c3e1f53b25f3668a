pub mod plan;
pub mod selection;
pub mod stock;
