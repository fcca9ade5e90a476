// Job board data: postings and applications.
// Reads go to the backend while LIVE and fall back to the seed dataset on any error.

pub mod handlers;
pub mod service;
