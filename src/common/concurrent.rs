pub(crate) mod constants;
pub(crate) mod stamped_lock;
