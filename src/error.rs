use reqwest::StatusCode;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Config(String),
    #[error("API request failed ({status}): {body}")]
    Transport { status: StatusCode, body: String },
    #[error(transparent)]
    ResponseShape(#[from] ResponseShapeError),
    #[error("No images were generated successfully")]
    AggregateFailure,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode/encode error: {0}")]
    Image(#[from] image::ImageError),
}

impl AppError {
    pub fn msg<T: Into<String>>(message: T) -> Self {
        Self::Message(message.into())
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config(message.into())
    }

    /// Errors that only sink a single angle request. The orchestrator
    /// swallows these and moves on to the next angle.
    pub fn is_angle_scoped(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ResponseShape(_) | Self::Http(_) | Self::Serde(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please describe how you want the 3D output to look.")]
    MissingPrompt,
    #[error("{}", no_images_message(.refinement))]
    NoImages { refinement: bool },
    #[error("Please select a model for image generation.")]
    NoModelSelected,
    #[error("Model {0} is not in the list of available models.")]
    UnknownModel(String),
    #[error("A generation is already in progress.")]
    Busy,
}

impl ValidationError {
    pub fn title(&self) -> &'static str {
        match self {
            Self::MissingPrompt => "Prompt Required",
            Self::NoImages { .. } => "No Images",
            Self::NoModelSelected => "No Model Selected",
            Self::UnknownModel(_) => "Unknown Model",
            Self::Busy => "Generation In Progress",
        }
    }
}

fn no_images_message(refinement: &bool) -> &'static str {
    if *refinement {
        "Please upload at least one reference image or ensure you have uploaded initial sketches."
    } else {
        "Please upload at least one sketch image."
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseShapeError {
    #[error("No image generated. API returned: {excerpt}...")]
    TextOnly { excerpt: String },
    #[error("No image or content received from API")]
    NoContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_images_message_depends_on_run_kind() {
        let initial = ValidationError::NoImages { refinement: false };
        let refine = ValidationError::NoImages { refinement: true };

        assert_eq!(initial.to_string(), "Please upload at least one sketch image.");
        assert!(refine.to_string().contains("reference image"));
        assert_eq!(initial.title(), refine.title());
    }

    #[test]
    fn transport_errors_are_angle_scoped() {
        let transport = AppError::Transport {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".into(),
        };
        assert!(transport.is_angle_scoped());
        assert_eq!(
            transport.to_string(),
            "API request failed (500 Internal Server Error): boom"
        );

        assert!(AppError::from(ResponseShapeError::NoContent).is_angle_scoped());
        assert!(!AppError::config("missing key").is_angle_scoped());
        assert!(!AppError::AggregateFailure.is_angle_scoped());
    }
}
