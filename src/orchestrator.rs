use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use log::{debug, error, info, warn};

use crate::{
    config::{ConfigProvider, ConfigQuery, ExecutionStrategy, OrchestratorSettings},
    error::{AppError, AppResult, ValidationError},
    models::{GenerationRequest, GenerationResult, ImageRole, ResultSet, ViewingAngle},
    notify::{Notification, Notifier, Severity},
    openrouter::{Endpoint, ImageGenerator},
    prompt,
    session::{SessionState, SharedSession},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub user_prompt: String,
    pub system_prompt: String,
    pub multi_angle: bool,
    pub refinement: bool,
}

struct RunInputs {
    model: String,
    image_data_uri: String,
}

/// Drives the generator across the viewing angles of one run.
pub struct AngleOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    provider: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn Notifier>,
    settings: OrchestratorSettings,
}

impl AngleOrchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        provider: Arc<dyn ConfigProvider>,
        notifier: Arc<dyn Notifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            generator,
            provider,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn angles_for(&self, request: &RunRequest) -> Vec<ViewingAngle> {
        let expand = request.refinement && self.settings.expand_refinement_angles;
        prompt::select_angles(request.multi_angle || expand)
    }

    /// Validates, fans out, and records the run. The session lock is only
    /// held while inputs are snapshotted and while the result is recorded, so
    /// other handlers keep working during the angle requests. The busy phase
    /// is held by a guard and cleared even if this future is dropped.
    pub async fn run(
        &self,
        session: &SharedSession,
        request: &RunRequest,
        on_progress: &(dyn Fn(&str) + Send + Sync),
    ) -> AppResult<ResultSet> {
        let inputs = match session.read(|state| self.prepare(state, request)) {
            Ok(inputs) => inputs,
            Err(invalid) => {
                self.notifier.notify(Notification::new(
                    invalid.title(),
                    invalid.to_string(),
                    Severity::Warning,
                ));
                return Err(invalid.into());
            }
        };

        let _busy = match session.begin_generation() {
            Ok(guard) => guard,
            Err(busy) => {
                debug!("ignoring submission while a generation is running");
                return Err(busy.into());
            }
        };

        match self.execute(inputs, request, on_progress).await {
            Ok(result_set) => {
                session.write(|state| state.push_result_set(result_set.clone()));
                let count = result_set.len();
                let plural = if count > 1 { "s" } else { "" };
                self.notifier.notify(Notification::new(
                    "Success",
                    format!("Generated {count} 3D image{plural} successfully!"),
                    Severity::Success,
                ));
                Ok(result_set)
            }
            Err(failure) => {
                error!("generation error: {failure}");
                self.notifier.notify(Notification::new(
                    "Generation Error",
                    failure.to_string(),
                    Severity::Danger,
                ));
                Err(failure)
            }
        }
    }

    /// Everything a run needs from the session, taken in one pass so later
    /// uploads or removals cannot change what this run sends.
    fn prepare(
        &self,
        state: &SessionState,
        request: &RunRequest,
    ) -> Result<RunInputs, ValidationError> {
        validate(state, request)?;

        let model = state
            .selected_model()
            .ok_or(ValidationError::NoModelSelected)?
            .to_string();
        let source = state
            .source_image(request.refinement, self.settings.refinement_source)
            .ok_or(ValidationError::NoImages {
                refinement: request.refinement,
            })?;
        if request.refinement && state.images(ImageRole::Reference).contains(source) {
            info!("using reference image for refinement: {}", source.name);
        } else {
            info!("using uploaded image: {}", source.name);
        }

        Ok(RunInputs {
            model,
            image_data_uri: source.data_uri(),
        })
    }

    async fn execute(
        &self,
        inputs: RunInputs,
        request: &RunRequest,
        on_progress: &(dyn Fn(&str) + Send + Sync),
    ) -> AppResult<ResultSet> {
        let config = self.provider.get_config(&ConfigQuery::default()).await?;
        let endpoint = Endpoint::from_config(&config)?;

        let angles = self.angles_for(request);
        let template = GenerationRequest {
            model: inputs.model,
            prompt: request.user_prompt.trim().to_string(),
            image_data_uri: inputs.image_data_uri,
            system_prompt: request.system_prompt.trim().to_string(),
            angle: ViewingAngle::front(),
        };

        let results = match self.settings.strategy {
            ExecutionStrategy::Sequential { pacing } => {
                self.run_sequential(&endpoint, &template, &angles, pacing, on_progress)
                    .await
            }
            ExecutionStrategy::Concurrent => {
                on_progress(&format!("Generating {} views...", angles.len()));
                self.run_concurrent(&endpoint, &template, &angles).await
            }
        };

        if results.is_empty() {
            return Err(AppError::AggregateFailure);
        }

        Ok(ResultSet::new(results, request.refinement))
    }

    async fn run_sequential(
        &self,
        endpoint: &Endpoint,
        template: &GenerationRequest,
        angles: &[ViewingAngle],
        pacing: Duration,
        on_progress: &(dyn Fn(&str) + Send + Sync),
    ) -> Vec<GenerationResult> {
        let mut results = Vec::with_capacity(angles.len());

        for (index, angle) in angles.iter().enumerate() {
            on_progress(&prompt::progress_message(angle, index, angles.len()));

            if let Some(result) = self.attempt(endpoint, template, *angle).await {
                results.push(result);
            }

            if index + 1 < angles.len() {
                tokio::time::sleep(pacing).await;
            }
        }

        results
    }

    /// Dispatches in catalog order and keeps catalog order in the output,
    /// whatever order the responses land in.
    async fn run_concurrent(
        &self,
        endpoint: &Endpoint,
        template: &GenerationRequest,
        angles: &[ViewingAngle],
    ) -> Vec<GenerationResult> {
        let attempts = angles
            .iter()
            .map(|angle| self.attempt(endpoint, template, *angle));

        join_all(attempts).await.into_iter().flatten().collect()
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        template: &GenerationRequest,
        angle: ViewingAngle,
    ) -> Option<GenerationResult> {
        let request = GenerationRequest {
            angle,
            ..template.clone()
        };

        match self.generator.generate_one(endpoint, &request).await {
            Ok(image_url) => Some(GenerationResult {
                image_url,
                angle: angle.name.to_string(),
                prompt: request.prompt,
            }),
            Err(failure) if failure.is_angle_scoped() => {
                warn!("failed to generate {}: {failure}", angle.name);
                None
            }
            Err(failure) => {
                error!("failed to generate {}: {failure}", angle.name);
                None
            }
        }
    }
}

fn validate(state: &SessionState, request: &RunRequest) -> Result<(), ValidationError> {
    if request.user_prompt.trim().is_empty() {
        return Err(ValidationError::MissingPrompt);
    }

    if !state.has_source_image(request.refinement) {
        return Err(ValidationError::NoImages {
            refinement: request.refinement,
        });
    }

    if state.selected_model().is_none() {
        return Err(ValidationError::NoModelSelected);
    }

    Ok(())
}
