pub mod exec;
pub mod languages;
pub mod run;
