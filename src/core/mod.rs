pub mod cancel;
pub mod compose;
pub mod csv2lp;
pub mod encoding;
pub mod error;
pub mod format;
pub mod rejects;
pub mod source;
pub mod track;
pub mod write;
