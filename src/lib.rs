//! Sketch to 3D studio: upload a 2D sketch, send it with a prompt to an
//! OpenAI-compatible chat endpoint, and collect renders from several fixed
//! viewing angles. Markup and widgets live outside this crate and drive it
//! through [`Studio`].

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod openrouter;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod session;
pub mod storage;

use std::sync::Arc;

pub use commands::{FormInputs, NullPresenter, Presenter, Studio};
pub use config::{
    ConfigProvider, ConfigQuery, EnvConfigProvider, ExecutionStrategy, OrchestratorSettings,
    ProviderConfig, RefinementSource, StaticConfigProvider,
};
pub use error::{AppError, AppResult, ResponseShapeError, ValidationError};
pub use models::{
    GenerationRequest, GenerationResult, ImagePreview, ImageRole, ResultSet, UploadedImage,
    ViewingAngle, VIEWING_ANGLES,
};
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier, Severity};
pub use openrouter::{Endpoint, ImageGenerator, MessageOutcome, OpenRouterClient};
pub use orchestrator::{AngleOrchestrator, RunRequest};
pub use session::{GenerationGuard, Phase, SessionState, SharedSession};

/// Studio wired to `.env`/environment credentials, the OpenRouter client
/// and log-backed notifications.
pub fn default_studio(presenter: Arc<dyn Presenter>, settings: OrchestratorSettings) -> Studio {
    Studio::with_openrouter(
        Arc::new(EnvConfigProvider::new()),
        Arc::new(LogNotifier),
        presenter,
        settings,
    )
}
