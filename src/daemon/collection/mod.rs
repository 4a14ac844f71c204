pub mod afk;
pub mod collector;
pub mod observation;
