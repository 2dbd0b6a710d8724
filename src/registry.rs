use log::warn;

use crate::{
    config::{ConfigProvider, ConfigQuery},
    error::{AppResult, ValidationError},
    notify::{Notification, Notifier, Severity},
    session::{SessionState, SharedSession},
};

pub const RECOMMENDED_MODEL: &str = "google/gemini-2.5-flash-image-preview";
const RECOMMENDED_MARKER: &str = "gemini-2.5-flash-image-preview";
const USABLE_FAMILIES: [&str; 3] = ["gemini", "gpt-4", "claude"];

pub fn is_recommended(model: &str) -> bool {
    model.to_lowercase().contains(RECOMMENDED_MARKER)
}

pub fn filter_models(models: &[String]) -> Vec<String> {
    models
        .iter()
        .filter(|model| {
            let lowered = model.to_lowercase();
            USABLE_FAMILIES
                .iter()
                .any(|family| lowered.contains(family))
        })
        .cloned()
        .collect()
}

/// Recommended model first, everything else in source order.
pub fn rank_models(mut models: Vec<String>) -> Vec<String> {
    models.sort_by_key(|model| !is_recommended(model));
    models
}

pub fn label(model: &str) -> String {
    if is_recommended(model) {
        format!("{model} (Recommended)")
    } else {
        model.to_string()
    }
}

/// Picks a model when none is selected: the recommended one, else the
/// first listed.
pub fn auto_select(state: &mut SessionState) {
    if state.selected_model.is_some() {
        return;
    }

    state.selected_model = state
        .available_models
        .iter()
        .find(|model| is_recommended(model))
        .or_else(|| state.available_models.first())
        .cloned();
}

pub fn select_model(state: &mut SessionState, model: &str) -> Result<(), ValidationError> {
    let known = if state.available_models.is_empty() {
        model == RECOMMENDED_MODEL
    } else {
        state.available_models.iter().any(|m| m == model)
    };

    if !known {
        return Err(ValidationError::UnknownModel(model.to_string()));
    }

    state.selected_model = Some(model.to_string());
    Ok(())
}

/// Replaces the model list with the filtered, ranked list. An empty result
/// leaves the state alone and reports `false`.
pub fn apply_models(state: &mut SessionState, models: &[String]) -> bool {
    let ranked = rank_models(filter_models(models));
    if ranked.is_empty() {
        return false;
    }

    if let Some(selected) = &state.selected_model {
        if !ranked.contains(selected) {
            state.selected_model = None;
        }
    }

    state.available_models = ranked;
    auto_select(state);
    true
}

/// Fetches without holding the session, then applies the list in one step.
pub async fn load_models(
    session: &SharedSession,
    provider: &dyn ConfigProvider,
    query: &ConfigQuery,
    notifier: &dyn Notifier,
) -> bool {
    let loaded = match fetch_models(provider, query).await {
        Ok(Some(models)) => session.write(|state| apply_models(state, &models)),
        Ok(None) => false,
        Err(error) => {
            warn!("failed to load models: {error}");
            false
        }
    };

    if !loaded {
        notifier.notify(Notification::new(
            "Model Loading Error",
            "Failed to load available models. Please check your API configuration.",
            Severity::Warning,
        ));
    }

    loaded
}

async fn fetch_models(
    provider: &dyn ConfigProvider,
    query: &ConfigQuery,
) -> AppResult<Option<Vec<String>>> {
    let config = provider.get_config(query).await?;
    Ok(config.models.filter(|models| !models.is_empty()))
}
