pub mod allocate;
pub mod coverage;
pub mod irr;
pub mod status;
pub mod summarize;
