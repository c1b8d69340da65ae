pub mod error;
pub mod logfile;
pub mod source;
pub mod sql;
