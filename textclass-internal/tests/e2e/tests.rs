mod classify;
mod common;
mod status;
