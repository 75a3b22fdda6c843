use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebautoError {
    #[error("Node.js runtime not found: {0}")]
    NodeNotFound(String),

    #[error("Playwright is not installed: {0}")]
    PlaywrightNotInstalled(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser connection lost: {0}")]
    BrowserConnectionLost(String),

    #[error("Page load failed: {0}")]
    PageLoadFailed(String),

    #[error("Page timeout: {0}")]
    PageTimeout(String),

    #[error("Timeout exceeded: {0}")]
    TimeoutExceeded(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("max sessions reached ({0})")]
    SessionLimitReached(usize),

    /// Internal marker for a worker whose connection has been torn down.
    /// Never surfaces on stdout; adapters report it as a lost connection.
    #[error("session worker closed")]
    SessionClosed,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element not clickable: {0}")]
    ElementNotClickable(String),

    #[error("Form validation failed: {0}")]
    FormValidationFailed(String),

    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractFailed(String),

    #[error("illegal archive entry path: {0}")]
    InvalidArchivePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebautoError {
    /// Stable external error code emitted in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "NODE_NOT_FOUND",
            Self::PlaywrightNotInstalled(_) => "PLAYWRIGHT_NOT_INSTALLED",
            Self::BrowserLaunchFailed(_) => "BROWSER_LAUNCH_FAILED",
            Self::BrowserConnectionLost(_) | Self::SessionClosed => "BROWSER_CONNECTION_LOST",
            Self::PageLoadFailed(_) => "PAGE_LOAD_FAILED",
            Self::PageTimeout(_) => "PAGE_TIMEOUT",
            Self::TimeoutExceeded(_) => "TIMEOUT_EXCEEDED",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionLimitReached(_) => "SESSION_LIMIT_REACHED",
            Self::ElementNotFound(_) => "ELEMENT_NOT_FOUND",
            Self::ElementNotVisible(_) => "ELEMENT_NOT_VISIBLE",
            Self::ElementNotClickable(_) => "ELEMENT_NOT_CLICKABLE",
            Self::FormValidationFailed(_) => "FORM_VALIDATION_FAILED",
            Self::ScriptExecutionFailed(_) => "SCRIPT_EXECUTION_FAILED",
            Self::DownloadFailed(_) => "DOWNLOAD_FAILED",
            Self::ExtractFailed(_) => "EXTRACT_FAILED",
            Self::InvalidArchivePath(_) => "INVALID_ARCHIVE_PATH",
            Self::Io(_) => "IO_ERROR",
            Self::Http(_) => "NETWORK_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Default recovery hint shown alongside the error code.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NodeNotFound(_) => {
                Some("Retry to trigger the automatic runtime setup, or set PLAYWRIGHT_NODE_PATH")
            }
            Self::PlaywrightNotInstalled(_) => {
                Some("Retry to re-run the Playwright install, or clear the cache directory")
            }
            Self::BrowserLaunchFailed(_) => {
                Some("Check Playwright installation and browser binaries")
            }
            Self::BrowserConnectionLost(_) | Self::SessionClosed => {
                Some("Retry the command; the session reattaches automatically if the browser is alive")
            }
            Self::SessionNotFound(_) => Some("Verify the session ID with session-list"),
            Self::SessionLimitReached(_) => {
                Some("Close unused sessions with browser-close or raise SESSION_MAX_COUNT")
            }
            Self::TimeoutExceeded(_) | Self::PageTimeout(_) => {
                Some("Increase the timeout or verify the page is responsive")
            }
            Self::DownloadFailed(_) => Some("Check your internet connection and retry"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebautoError>;
