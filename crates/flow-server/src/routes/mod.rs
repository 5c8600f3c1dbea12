pub mod agents;
pub mod downloads;
pub mod form;
pub mod orchestrate;
pub mod status;
