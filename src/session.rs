use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    config::RefinementSource,
    error::ValidationError,
    models::{ImageRole, ResultSet, UploadedImage},
    storage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Generating,
}

/// Page-lifetime store, never persisted. Shared between the controller and
/// any in-flight run through [`SharedSession`].
#[derive(Debug, Default)]
pub struct SessionState {
    primary_images: Vec<UploadedImage>,
    reference_images: Vec<UploadedImage>,
    result_sets: Vec<ResultSet>,
    pub(crate) available_models: Vec<String>,
    pub(crate) selected_model: Option<String>,
    phase: Phase,
    has_generated: bool,
    next_seq: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an upload to its role's collection. Anything without an
    /// `image/*` type is dropped and `false` returned.
    pub fn add_image(&mut self, role: ImageRole, mut image: UploadedImage) -> bool {
        if !image.is_image() {
            return false;
        }

        self.next_seq += 1;
        image.seq = self.next_seq;
        image.data_uri = Some(storage::image_to_data_url(&image));
        self.images_mut(role).push(image);
        true
    }

    /// Removes every image called `name` from the role's collection. Unknown
    /// names leave the collection untouched.
    pub fn remove_image(&mut self, role: ImageRole, name: &str) -> bool {
        let images = self.images_mut(role);
        let before = images.len();
        images.retain(|image| image.name != name);
        images.len() != before
    }

    pub fn images(&self, role: ImageRole) -> &[UploadedImage] {
        match role {
            ImageRole::Primary => &self.primary_images,
            ImageRole::Reference => &self.reference_images,
        }
    }

    fn images_mut(&mut self, role: ImageRole) -> &mut Vec<UploadedImage> {
        match role {
            ImageRole::Primary => &mut self.primary_images,
            ImageRole::Reference => &mut self.reference_images,
        }
    }

    pub fn has_source_image(&self, refinement: bool) -> bool {
        if refinement {
            !self.reference_images.is_empty() || !self.primary_images.is_empty()
        } else {
            !self.primary_images.is_empty()
        }
    }

    pub fn source_image(
        &self,
        refinement: bool,
        policy: RefinementSource,
    ) -> Option<&UploadedImage> {
        if !refinement {
            return self.primary_images.first();
        }

        match policy {
            RefinementSource::ReferenceFirst => self
                .reference_images
                .last()
                .or_else(|| self.primary_images.first()),
            RefinementSource::MostRecentUpload => self
                .primary_images
                .iter()
                .chain(self.reference_images.iter())
                .max_by_key(|image| image.seq),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_generating(&self) -> bool {
        self.phase == Phase::Generating
    }

    pub fn begin_generation(&mut self) -> Result<(), ValidationError> {
        if self.is_generating() {
            return Err(ValidationError::Busy);
        }

        self.phase = Phase::Generating;
        Ok(())
    }

    pub fn finish_generation(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Records a successful run. Empty sets are refused.
    pub fn push_result_set(&mut self, result_set: ResultSet) -> bool {
        if result_set.is_empty() {
            return false;
        }

        self.result_sets.push(result_set);
        self.has_generated = true;
        true
    }

    pub fn result_sets(&self) -> &[ResultSet] {
        &self.result_sets
    }

    pub fn has_generated(&self) -> bool {
        self.has_generated
    }

    pub fn clear_results(&mut self) {
        self.result_sets.clear();
        self.reference_images.clear();
        self.has_generated = false;
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }
}

/// Handle to the session shared by the controller and any in-flight run.
/// The lock is only taken for short synchronous sections, never across an
/// await, so upload and removal handlers can interleave with a generation.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Enters `Generating`. The phase returns to `Idle` when the guard is
    /// dropped, including when the run's future is dropped or unwinds.
    pub fn begin_generation(&self) -> Result<GenerationGuard, ValidationError> {
        self.write(SessionState::begin_generation)?;
        Ok(GenerationGuard {
            session: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct GenerationGuard {
    session: SharedSession,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.session.write(SessionState::finish_generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationResult;

    fn png(name: &str) -> UploadedImage {
        UploadedImage::new(name, "image/png", vec![0; 4])
    }

    fn names(images: &[UploadedImage]) -> Vec<&str> {
        images.iter().map(|image| image.name.as_str()).collect()
    }

    #[test]
    fn drops_non_image_uploads() {
        let mut state = SessionState::new();
        assert!(state.add_image(ImageRole::Primary, png("a.png")));
        assert!(!state.add_image(
            ImageRole::Primary,
            UploadedImage::new("notes.txt", "text/plain", vec![1])
        ));
        assert_eq!(names(state.images(ImageRole::Primary)), vec!["a.png"]);
    }

    #[test]
    fn removing_unknown_name_is_a_no_op() {
        let mut state = SessionState::new();
        for name in ["a.png", "b.png", "c.png"] {
            state.add_image(ImageRole::Primary, png(name));
        }

        assert!(!state.remove_image(ImageRole::Primary, "zzz.png"));
        assert!(!state.remove_image(ImageRole::Reference, "a.png"));
        assert_eq!(
            names(state.images(ImageRole::Primary)),
            vec!["a.png", "b.png", "c.png"]
        );

        assert!(state.remove_image(ImageRole::Primary, "b.png"));
        assert!(!state.remove_image(ImageRole::Primary, "b.png"));
        assert_eq!(names(state.images(ImageRole::Primary)), vec!["a.png", "c.png"]);
    }

    #[test]
    fn initial_run_uses_first_sketch() {
        let mut state = SessionState::new();
        state.add_image(ImageRole::Primary, png("first.png"));
        state.add_image(ImageRole::Primary, png("second.png"));
        state.add_image(ImageRole::Reference, png("ref.png"));

        for policy in [RefinementSource::ReferenceFirst, RefinementSource::MostRecentUpload] {
            assert_eq!(state.source_image(false, policy).unwrap().name, "first.png");
        }
    }

    #[test]
    fn reference_first_prefers_latest_reference() {
        let mut state = SessionState::new();
        state.add_image(ImageRole::Primary, png("sketch.png"));
        assert_eq!(
            state
                .source_image(true, RefinementSource::ReferenceFirst)
                .unwrap()
                .name,
            "sketch.png"
        );

        state.add_image(ImageRole::Reference, png("ref-1.png"));
        state.add_image(ImageRole::Reference, png("ref-2.png"));
        state.add_image(ImageRole::Primary, png("later-sketch.png"));
        assert_eq!(
            state
                .source_image(true, RefinementSource::ReferenceFirst)
                .unwrap()
                .name,
            "ref-2.png"
        );
    }

    #[test]
    fn most_recent_upload_spans_both_roles() {
        let mut state = SessionState::new();
        state.add_image(ImageRole::Primary, png("sketch.png"));
        state.add_image(ImageRole::Reference, png("ref.png"));
        state.add_image(ImageRole::Primary, png("newest.png"));

        let source = state
            .source_image(true, RefinementSource::MostRecentUpload)
            .unwrap();
        assert_eq!(source.name, "newest.png");

        state.remove_image(ImageRole::Primary, "newest.png");
        let source = state
            .source_image(true, RefinementSource::MostRecentUpload)
            .unwrap();
        assert_eq!(source.name, "ref.png");
    }

    #[test]
    fn refinement_may_use_reference_without_sketch() {
        let mut state = SessionState::new();
        assert!(!state.has_source_image(true));
        state.add_image(ImageRole::Reference, png("ref.png"));
        assert!(state.has_source_image(true));
        assert!(!state.has_source_image(false));
    }

    #[test]
    fn busy_flag_blocks_second_run() {
        let mut state = SessionState::new();
        state.begin_generation().unwrap();
        assert_eq!(state.begin_generation(), Err(ValidationError::Busy));
        state.finish_generation();
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn accepted_uploads_cache_their_encoding() {
        let mut state = SessionState::new();
        let image = png("a.png");
        assert_eq!(image.cached_data_uri(), None);
        let expected = storage::image_to_data_url(&image);

        state.add_image(ImageRole::Primary, image);
        let stored = &state.images(ImageRole::Primary)[0];
        assert_eq!(stored.cached_data_uri(), Some(expected.as_str()));
        assert_eq!(stored.data_uri(), expected);
    }

    #[test]
    fn guard_returns_phase_to_idle_on_drop() {
        let session = SharedSession::new();
        let guard = session.begin_generation().unwrap();
        assert!(session.read(SessionState::is_generating));
        assert_eq!(
            session.begin_generation().unwrap_err(),
            ValidationError::Busy
        );

        drop(guard);
        assert_eq!(session.read(SessionState::phase), Phase::Idle);
        assert!(session.begin_generation().is_ok());
    }

    #[test]
    fn guard_clears_phase_when_unwinding() {
        let session = SharedSession::new();
        let inner = session.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _guard = inner.begin_generation().unwrap();
            panic!("generator blew up");
        });

        assert!(outcome.is_err());
        assert_eq!(session.read(SessionState::phase), Phase::Idle);
    }

    #[test]
    fn empty_result_sets_are_refused() {
        let mut state = SessionState::new();
        assert!(!state.push_result_set(ResultSet::new(Vec::new(), false)));
        assert!(state.result_sets().is_empty());
        assert!(!state.has_generated());

        let result = GenerationResult {
            image_url: "data:image/png;base64,AA==".into(),
            angle: "Front View".into(),
            prompt: "p".into(),
        };
        assert!(state.push_result_set(ResultSet::new(vec![result], false)));
        assert!(state.has_generated());

        state.add_image(ImageRole::Reference, png("ref.png"));
        state.clear_results();
        assert!(state.result_sets().is_empty());
        assert!(state.images(ImageRole::Reference).is_empty());
        assert!(!state.has_generated());
    }
}
