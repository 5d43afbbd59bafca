pub(crate) mod cache;
pub(crate) mod instruction;
pub(crate) mod key;
pub(crate) mod scheduler;
pub(crate) mod synthesis;
