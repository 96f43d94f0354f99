pub(crate) mod result;
