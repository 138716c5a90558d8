pub mod afk;
pub mod apm;
pub mod collector;
pub mod sanitizer;
