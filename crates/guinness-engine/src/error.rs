use thiserror::Error;

/// Everything that can stop a generate action, from startup to decode.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("OpenRouter API key not configured")]
    MissingCredential,
    #[error("Please upload a photo first!")]
    MissingInput,
    #[error("unsupported upload '{0}': expected a png, jpg or jpeg file")]
    UnsupportedUpload(String),
    #[error("OpenRouter request failed ({endpoint}): {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{}", vendor_message(.status, .message))]
    Vendor { status: Option<u16>, message: String },
    #[error("generated image could not be decoded: {0}")]
    Decode(String),
    #[error("generation cancelled")]
    Cancelled,
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    /// Transport and vendor-side failures get the troubleshooting checklist.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            GenerationError::Network { .. }
                | GenerationError::Vendor { .. }
                | GenerationError::Decode(_)
        )
    }
}

fn vendor_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("OpenRouter request failed ({code}): {message}"),
        None => format!("OpenRouter request failed: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::GenerationError;

    #[test]
    fn vendor_errors_render_status_when_known() {
        let with_status = GenerationError::Vendor {
            status: Some(402),
            message: "insufficient credits".to_string(),
        };
        assert_eq!(
            with_status.to_string(),
            "OpenRouter request failed (402): insufficient credits"
        );

        let without = GenerationError::Vendor {
            status: None,
            message: "provider error".to_string(),
        };
        assert_eq!(without.to_string(), "OpenRouter request failed: provider error");
        assert!(without.is_remote());
        assert!(!GenerationError::MissingInput.is_remote());
    }
}
