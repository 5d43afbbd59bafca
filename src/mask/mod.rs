pub(crate) mod builder;
pub(crate) mod overrides;
pub(crate) mod raster;
pub(crate) mod segment;
