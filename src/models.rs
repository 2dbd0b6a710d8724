use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewingAngle {
    pub name: &'static str,
    pub prompt_fragment: &'static str,
}

/// Catalog order matters: Front is the single-angle default and always
/// leads a multi-angle batch.
pub const VIEWING_ANGLES: [ViewingAngle; 4] = [
    ViewingAngle {
        name: "Front View",
        prompt_fragment: "front view, straight-on perspective",
    },
    ViewingAngle {
        name: "Side View",
        prompt_fragment: "side view, profile perspective",
    },
    ViewingAngle {
        name: "Top View",
        prompt_fragment: "top-down view, bird's eye perspective",
    },
    ViewingAngle {
        name: "45° Perspective",
        prompt_fragment: "45-degree angle perspective view, three-quarter view",
    },
];

impl ViewingAngle {
    pub fn front() -> Self {
        VIEWING_ANGLES[0]
    }

    /// Lowercased name with whitespace runs collapsed to single hyphens.
    pub fn slug(&self) -> String {
        slugify(self.name)
    }
}

pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Primary,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Upload order across both roles, assigned by the session.
    pub seq: u64,
    /// Encoded once when the session accepts the upload.
    pub(crate) data_uri: Option<String>,
}

impl UploadedImage {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
            seq: 0,
            data_uri: None,
        }
    }

    pub fn cached_data_uri(&self) -> Option<&str> {
        self.data_uri.as_deref()
    }

    /// The payload and preview source. Falls back to encoding on the spot for
    /// images that never went through a session.
    pub fn data_uri(&self) -> String {
        match &self.data_uri {
            Some(uri) => uri.clone(),
            None => crate::storage::image_to_data_url(self),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePreview {
    pub name: String,
    pub size_kb: String,
    pub data_uri: String,
    pub is_reference: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub image_data_uri: String,
    pub system_prompt: String,
    pub angle: ViewingAngle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub image_url: String,
    pub angle: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub refinement: bool,
    pub results: Vec<GenerationResult>,
}

impl ResultSet {
    pub fn new(results: Vec<GenerationResult>, refinement: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            refinement,
            results,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn angles(&self) -> Vec<&str> {
        self.results.iter().map(|result| result.angle.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_leads_the_catalog() {
        assert_eq!(ViewingAngle::front().name, "Front View");
        assert_eq!(VIEWING_ANGLES.len(), 4);
        assert_eq!(VIEWING_ANGLES[3].name, "45° Perspective");
    }

    #[test]
    fn slug_collapses_whitespace_runs() {
        assert_eq!(VIEWING_ANGLES[0].slug(), "front-view");
        assert_eq!(VIEWING_ANGLES[3].slug(), "45°-perspective");
        assert_eq!(slugify("Side   View\t2"), "side-view-2");
    }

    #[test]
    fn result_serializes_in_camel_case() {
        let result = GenerationResult {
            image_url: "data:image/png;base64,AAAA".into(),
            angle: "Front View".into(),
            prompt: "a wooden chair".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["imageUrl"], "data:image/png;base64,AAAA");
        assert_eq!(json["angle"], "Front View");
    }

    #[test]
    fn only_image_mime_types_count_as_images() {
        assert!(UploadedImage::new("a.png", "image/png", vec![1]).is_image());
        assert!(!UploadedImage::new("a.txt", "text/plain", vec![1]).is_image());
        assert!(!UploadedImage::new("a", "", vec![1]).is_image());
    }
}
