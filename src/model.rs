use serde::{Deserialize, Serialize};

/// Literal some producers write into `imgUrl` instead of a real null.
pub const ABSENT_IMAGE_SENTINEL: &str = "null";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: String,
    pub book_id: String,
    pub owner_id: String,
    pub text: String,
    pub location: String,
    pub img_url: Option<String>,
    pub created_at: String,
}

impl Highlight {
    pub fn has_image(&self) -> bool {
        image_exists(self.img_url.as_deref())
    }

    pub fn image_key(&self) -> String {
        image_key(&self.owner_id, &self.book_id, &self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHighlight {
    pub text: String,
    pub location: String,
    pub book_id: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub highlights: Vec<Highlight>,
}

impl BookDocument {
    pub fn highlight(&self, highlight_id: &str) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.id == highlight_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageAction {
    Generated,
    Regenerated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOutcome {
    pub action: ImageAction,
    pub highlight_id: String,
    pub img_url: String,
    pub image_existed: bool,
}

impl ImageOutcome {
    pub fn message(&self) -> &'static str {
        match self.action {
            ImageAction::Regenerated => "Image successfully regenerated and overwritten in storage.",
            ImageAction::Generated => "Image successfully generated and uploaded to storage.",
        }
    }
}

/// Bucket coordinates used to build public image URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    pub bucket: String,
    pub region: String,
}

impl ImageLocation {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        crate::object_url(&self.bucket, &self.region, key)
    }
}

/// Whether `img_url` points at a stored image. `None`, the literal `"null"`
/// and whitespace-only strings all mean "no image".
pub fn image_exists(img_url: Option<&str>) -> bool {
    match img_url {
        None => false,
        Some(ABSENT_IMAGE_SENTINEL) => false,
        Some(url) => !url.trim().is_empty(),
    }
}

pub fn image_key(owner_id: &str, book_id: &str, highlight_id: &str) -> String {
    format!("{}/{}/images/{}.png", owner_id, book_id, highlight_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_exists() {
        assert!(!image_exists(None));
        assert!(!image_exists(Some("null")));
        assert!(!image_exists(Some("")));
        assert!(!image_exists(Some("   \t\n")));
        assert!(image_exists(Some("https://b.s3.r.amazonaws.com/u/b/images/h.png")));
        // only the exact sentinel is treated as absent
        assert!(image_exists(Some("NULL")));
    }

    #[test]
    fn test_image_key_layout() {
        assert_eq!(image_key("u1", "b1", "h1"), "u1/b1/images/h1.png");
    }

    #[test]
    fn test_image_key_changes_per_identifier() {
        let base = image_key("u1", "b1", "h1");
        let keys = [
            image_key("u2", "b1", "h1"),
            image_key("u1", "b2", "h1"),
            image_key("u1", "b1", "h2"),
        ];
        for key in &keys {
            assert_ne!(&base, key);
        }
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn test_highlight_serializes_camel_case() {
        let highlight = Highlight {
            id: "h1".into(),
            book_id: "b1".into(),
            owner_id: "u1".into(),
            text: "A dark forest".into(),
            location: "epubcfi(/6/4)".into(),
            img_url: None,
            created_at: "2024-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&highlight).unwrap();
        assert_eq!(value["bookId"], "b1");
        assert_eq!(value["ownerId"], "u1");
        assert!(value["imgUrl"].is_null());
        assert!(!highlight.has_image());
        assert_eq!(highlight.image_key(), "u1/b1/images/h1.png");
    }

    #[test]
    fn test_highlight_accepts_sentinel_string() {
        let raw = r#"{"id":"h1","bookId":"b1","ownerId":"u1","text":"t","location":"l","imgUrl":"null","createdAt":""}"#;
        let highlight: Highlight = serde_json::from_str(raw).unwrap();
        assert_eq!(highlight.img_url.as_deref(), Some("null"));
        assert!(!highlight.has_image());
    }
}
