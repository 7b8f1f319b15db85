pub(crate) mod preflight;
