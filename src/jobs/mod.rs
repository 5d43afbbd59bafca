pub(crate) mod render_job;
pub(crate) mod store;
