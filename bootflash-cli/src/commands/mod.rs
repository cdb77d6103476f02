pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod profile;
pub(crate) mod simulate;
