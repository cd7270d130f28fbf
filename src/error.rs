use thiserror::Error;

/// Errors surfaced by the chat core to the command layer.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No profile is selected, or the selected one no longer exists.
    #[error("no active profile (run `deepchat add` or `deepchat switch`)")]
    NoActiveProfile,

    /// The request could not be established, or the stream broke off.
    #[error("{message}")]
    Transport { message: String },
}

impl ChatError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        // Display of reqwest::Error omits the source chain (DNS, refused, ...).
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(s) = source {
            message.push_str(": ");
            message.push_str(&s.to_string());
            source = s.source();
        }
        Self::Transport { message }
    }
}
