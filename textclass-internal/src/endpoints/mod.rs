pub mod classify;
pub mod fallback;
pub mod status;
