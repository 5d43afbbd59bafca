pub(crate) mod bake;
pub(crate) mod store;
pub(crate) mod texture;
