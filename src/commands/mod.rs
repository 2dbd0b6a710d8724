use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use log::{info, warn};

use crate::{
    config::{ConfigProvider, ConfigQuery, OrchestratorSettings},
    error::AppResult,
    models::{GenerationResult, ImagePreview, ImageRole, ResultSet, UploadedImage},
    notify::{Notification, Notifier, Severity},
    openrouter::{ImageGenerator, OpenRouterClient},
    orchestrator::{AngleOrchestrator, RunRequest},
    registry,
    session::{Phase, SessionState, SharedSession},
    storage,
};

/// Rendering side of the studio. Result cards, comparison views and the
/// loading overlay live behind this.
pub trait Presenter: Send + Sync {
    fn show_results(&self, result_set: &ResultSet, index: usize);

    fn progress(&self, _message: &str) {}

    fn clear(&self) {}
}

#[derive(Debug, Clone, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn show_results(&self, _result_set: &ResultSet, _index: usize) {}
}

/// The editable fields a submission reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInputs {
    pub user_prompt: String,
    pub refinement_prompt: String,
    pub system_prompt: String,
    pub multiple_angles: bool,
}

/// Top-level controller. Routes UI events into the registry and
/// orchestrator. Handlers take `&self`, so an upload, removal or model change
/// can land while a generation is awaiting the API.
pub struct Studio {
    session: SharedSession,
    form: Mutex<FormInputs>,
    orchestrator: AngleOrchestrator,
    provider: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn Notifier>,
    presenter: Arc<dyn Presenter>,
    http_client: reqwest::Client,
}

impl Studio {
    pub fn new(
        provider: Arc<dyn ConfigProvider>,
        generator: Arc<dyn ImageGenerator>,
        notifier: Arc<dyn Notifier>,
        presenter: Arc<dyn Presenter>,
        settings: OrchestratorSettings,
    ) -> Self {
        let orchestrator =
            AngleOrchestrator::new(generator, provider.clone(), notifier.clone(), settings);

        Self {
            session: SharedSession::new(),
            form: Mutex::new(FormInputs::default()),
            orchestrator,
            provider,
            notifier,
            presenter,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_openrouter(
        provider: Arc<dyn ConfigProvider>,
        notifier: Arc<dyn Notifier>,
        presenter: Arc<dyn Presenter>,
        settings: OrchestratorSettings,
    ) -> Self {
        let http_client = reqwest::Client::new();
        let generator = Arc::new(OpenRouterClient::new(http_client.clone()));
        let mut studio = Self::new(provider, generator, notifier, presenter, settings);
        studio.http_client = http_client;
        studio
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    fn lock_form(&self) -> MutexGuard<'_, FormInputs> {
        match self.form.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn form(&self) -> FormInputs {
        self.lock_form().clone()
    }

    pub fn update_form<R>(&self, edit: impl FnOnce(&mut FormInputs) -> R) -> R {
        edit(&mut self.lock_form())
    }

    pub fn phase(&self) -> Phase {
        self.session.read(SessionState::phase)
    }

    pub fn has_generated(&self) -> bool {
        self.session.read(SessionState::has_generated)
    }

    pub fn selected_model(&self) -> Option<String> {
        self.session
            .read(|state| state.selected_model().map(str::to_string))
    }

    pub fn result_sets(&self) -> Vec<ResultSet> {
        self.session.read(|state| state.result_sets().to_vec())
    }

    pub async fn initialize(&self) -> bool {
        let loaded = self.load_models(&ConfigQuery::default()).await;
        info!("sketch to 3D studio initialized");
        loaded
    }

    /// Opens the provider's configuration surface, then reloads models.
    pub async fn configure(&self) -> bool {
        self.load_models(&ConfigQuery::interactive()).await
    }

    async fn load_models(&self, query: &ConfigQuery) -> bool {
        registry::load_models(
            &self.session,
            self.provider.as_ref(),
            query,
            self.notifier.as_ref(),
        )
        .await
    }

    pub fn model_options(&self) -> Vec<(String, String)> {
        self.session.read(|state| {
            state
                .available_models()
                .iter()
                .map(|model| (model.clone(), registry::label(model)))
                .collect()
        })
    }

    pub fn select_model(&self, model: &str) -> AppResult<()> {
        self.session
            .write(|state| registry::select_model(state, model))?;
        Ok(())
    }

    /// Accepts a batch of picked or dropped files. Non-images are skipped.
    pub fn upload(&self, role: ImageRole, files: Vec<UploadedImage>) -> usize {
        self.session.write(|state| {
            let mut accepted = 0;
            for file in files {
                if state.add_image(role, file) {
                    accepted += 1;
                }
            }
            accepted
        })
    }

    pub fn upload_paths(&self, role: ImageRole, paths: &[PathBuf]) -> AppResult<usize> {
        let files = paths
            .iter()
            .map(|path| storage::load_image_file(path))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(self.upload(role, files))
    }

    pub fn remove_image(&self, role: ImageRole, name: &str) -> bool {
        self.session.write(|state| state.remove_image(role, name))
    }

    /// Thumbnails reuse the encoding taken when the upload was accepted, the
    /// same string the API payload carries.
    pub fn previews(&self, role: ImageRole) -> Vec<ImagePreview> {
        self.session.read(|state| {
            state
                .images(role)
                .iter()
                .map(|image| ImagePreview {
                    name: image.name.clone(),
                    size_kb: format!("{:.1}", image.size() as f64 / 1024.0),
                    data_uri: image.data_uri(),
                    is_reference: role == ImageRole::Reference,
                })
                .collect()
        })
    }

    pub async fn generate(&self) -> AppResult<ResultSet> {
        self.run_submission(false).await
    }

    pub async fn refine(&self) -> AppResult<ResultSet> {
        self.run_submission(true).await
    }

    /// Single-button flow: once something has been generated, submissions
    /// become refinements when the settings ask for it.
    pub async fn submit(&self) -> AppResult<ResultSet> {
        let refinement = self.orchestrator.settings().auto_refine && self.has_generated();
        self.run_submission(refinement).await
    }

    async fn run_submission(&self, refinement: bool) -> AppResult<ResultSet> {
        let uses_refinement_field = refinement && !self.orchestrator.settings().auto_refine;
        let request = self.update_form(|form| RunRequest {
            user_prompt: if uses_refinement_field {
                form.refinement_prompt.clone()
            } else {
                form.user_prompt.clone()
            },
            system_prompt: form.system_prompt.clone(),
            multi_angle: form.multiple_angles,
            refinement,
        });

        let presenter = self.presenter.clone();
        let on_progress = move |message: &str| presenter.progress(message);
        let result_set = self
            .orchestrator
            .run(&self.session, &request, &on_progress)
            .await?;

        self.update_form(|form| {
            if uses_refinement_field {
                form.refinement_prompt.clear();
            } else {
                form.user_prompt.clear();
            }
        });

        let index = self
            .session
            .read(|state| state.result_sets().len().saturating_sub(1));
        self.presenter.show_results(&result_set, index);
        Ok(result_set)
    }

    pub fn clear_results(&self) {
        self.session.write(SessionState::clear_results);
        self.presenter.clear();
    }

    pub fn compare(&self, set_index: usize) -> Option<ResultSet> {
        self.session
            .read(|state| state.result_sets().get(set_index).cloned())
    }

    pub async fn download(&self, result: &GenerationResult, dir: &Path) -> AppResult<PathBuf> {
        let artifact = storage::fetch_artifact(
            &self.http_client,
            result,
            &result.angle,
            Utc::now().timestamp_millis(),
        )
        .await?;
        storage::write_artifact(dir, &artifact)
    }

    /// Saves every result of every set, oldest first. A failed item is
    /// reported and skipped.
    pub async fn download_all(&self, dir: &Path) -> AppResult<Vec<PathBuf>> {
        let mut saved = Vec::new();
        let results: Vec<GenerationResult> = self.session.read(|state| {
            state
                .result_sets()
                .iter()
                .flat_map(|set| set.results.iter().cloned())
                .collect()
        });

        for (index, result) in results.iter().enumerate() {
            let label = format!("{}-{index}", result.angle);
            let timestamp = Utc::now().timestamp_millis();
            match storage::fetch_artifact(&self.http_client, result, &label, timestamp).await {
                Ok(artifact) => saved.push(storage::write_artifact(dir, &artifact)?),
                Err(error) => {
                    warn!("failed to download {label}: {error}");
                    self.notifier.notify(Notification::new(
                        "Download Error",
                        format!("Could not download {}: {error}", result.angle),
                        Severity::Warning,
                    ));
                }
            }
        }

        Ok(saved)
    }
}
