pub(crate) mod persist;
pub(crate) mod scan;
pub(crate) mod state;
