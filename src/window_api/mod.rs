//! Contract for pulling the active window state out of the environment.
//! The daemon only ever talks to [WindowManager]; concrete backends are
//! registered in [GenericWindowManager].

use std::sync::Arc;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct ActiveWindowData {
    /// Title of the focused window. For example 'bash in hello' or
    /// 'Document 1' or 'Vibing in YouTube - Chrome'
    pub window_title: Arc<str>,
    /// Name or full path of the executable owning the window. For example
    /// /home/etc/nvim
    pub process_name: Arc<str>,
}

/// Contract every platform backend must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData>;

    /// Retrieve amount of time user has been inactive in milliseconds
    fn get_idle_time(&mut self) -> Result<u32>;
}

/// Cross-compatible WindowManager implementation. Delegates to whichever
/// backend was compiled in.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        anyhow::bail!("no window backend was compiled into this build")
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        self.inner.get_active_window_data()
    }

    fn get_idle_time(&mut self) -> Result<u32> {
        self.inner.get_idle_time()
    }
}
