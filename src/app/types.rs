/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
    /// The mode's work finished on its own
    Completed,
}

/// What the binary runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Live gallery viewer; `tiles` selects the multi-tile layout
    Gallery { tiles: bool },
    /// One capture/process run
    Capture,
    /// Selfie kiosk: session, capture wait, then processing
    Kiosk,
}

impl RunMode {
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            RunMode::Gallery { .. } => &["gallery", "keyboard"],
            RunMode::Capture => &["pipeline"],
            RunMode::Kiosk => &["kiosk", "pipeline"],
        }
    }
}
