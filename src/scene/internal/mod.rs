pub(crate) mod rendering;
pub(crate) mod transforms;
