use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Too many inputs: profile requires {requested}, at most {max} are supported")]
    TooManyInputs { requested: usize, max: usize },

    #[error("Renderer has not been started")]
    NotStarted,

    #[error("Input slot {slot} out of range ({count} slots)")]
    BadSlot { slot: usize, count: usize },

    #[error("Render context error: {0}")]
    Context(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture method '{0}' is not supported on this system")]
    Unsupported(&'static str),

    #[error("Capture backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("Render thread is already running")]
    AlreadyRunning,

    #[error("Unable to create render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Unknown shader parameter '{0}'")]
    Unknown(String),

    #[error("Invalid value '{value}' for shader parameter '{name}'")]
    Invalid { name: String, value: String },
}

/// Anything the render loop can trip over during one iteration.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Render loop panicked: {0}")]
    Panic(String),
}
