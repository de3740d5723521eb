//! The fixed capability set a VIO backend advertises to the engine.

/// Capabilities the engine queries once via `get_capabilities` before deciding how
/// to drive a backend (e.g. whether it can skip a post-copy stat).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub atomar_copy: bool,
    pub do_post_copy_stat: bool,
    pub time_sync_required: bool,
    pub unix_extensions: u32,
    pub propagate_on_fd: bool,
}
