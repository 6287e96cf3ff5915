pub mod probe;
pub mod rank;
pub mod run;
pub mod source;
