use tracing::warn;
use uuid::Uuid;

use crate::llm::media::{detect_mime_type, is_image_mime, MediaFile};

/// One user-supplied reference: raw encoded bytes plus a free-text
/// annotation. Ordering inside a collection is prompt priority.
#[derive(Debug, Clone)]
pub struct ReferenceItem {
    pub id: String,
    pub image: MediaFile,
    pub description: String,
}

impl ReferenceItem {
    pub fn from_parts(image: MediaFile, description: &str) -> Self {
        ReferenceItem {
            id: Uuid::new_v4().to_string(),
            image,
            description: description.to_string(),
        }
    }
}

/// Validates and decodes one uploaded file. Non-image files and files that
/// fail to decode are dropped without surfacing an error per file; the only
/// trace is a warning in the log.
fn normalize_file(bytes: Vec<u8>, display_name: Option<String>) -> Option<ReferenceItem> {
    let name = display_name.clone().unwrap_or_else(|| "upload".to_string());

    let Some(mime_type) = detect_mime_type(&bytes) else {
        warn!("Skipping upload {name}: unrecognized file type");
        return None;
    };
    if !is_image_mime(&mime_type) {
        warn!("Skipping upload {name}: not an image ({mime_type})");
        return None;
    }
    if image::load_from_memory(&bytes).is_err() {
        warn!("Skipping upload {name}: image failed to decode");
        return None;
    }

    Some(ReferenceItem::from_parts(
        MediaFile::new(bytes, mime_type, display_name),
        "",
    ))
}

/// Ordered, user-prioritized set of reference images.
#[derive(Debug, Default)]
pub struct ReferenceCollection {
    items: Vec<ReferenceItem>,
}

#[allow(dead_code)]
impl ReferenceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ReferenceItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Multi-value semantics: accepted files are appended in upload order.
    /// Returns how many were accepted.
    pub fn append_files(
        &mut self,
        files: impl IntoIterator<Item = (Vec<u8>, Option<String>)>,
    ) -> usize {
        let mut accepted = 0;
        for (bytes, display_name) in files {
            if let Some(item) = normalize_file(bytes, display_name) {
                self.items.push(item);
                accepted += 1;
            }
        }
        accepted
    }

    /// Single-value semantics: a newly accepted file replaces the whole
    /// collection. A rejected file leaves the existing value untouched.
    pub fn replace_with_file(&mut self, bytes: Vec<u8>, display_name: Option<String>) -> bool {
        match normalize_file(bytes, display_name) {
            Some(item) => {
                self.items = vec![item];
                true
            }
            None => false,
        }
    }

    pub fn set_description(&mut self, id: &str, description: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.description = description.to_string();
                true
            }
            None => false,
        }
    }

    pub fn move_up(&mut self, id: &str) -> bool {
        match self.items.iter().position(|item| item.id == id) {
            Some(index) if index > 0 => {
                self.items.swap(index, index - 1);
                true
            }
            _ => false,
        }
    }

    pub fn move_down(&mut self, id: &str) -> bool {
        match self.items.iter().position(|item| item.id == id) {
            Some(index) if index + 1 < self.items.len() => {
                self.items.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn tiny_png(shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(2, 2, image::Rgb([shade, shade, shade]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn non_image_files_are_dropped_silently() {
        let mut collection = ReferenceCollection::new();
        let accepted = collection.append_files([
            (b"%PDF-1.4 not an image".to_vec(), Some("doc.pdf".to_string())),
            (tiny_png(10), Some("ok.png".to_string())),
            (vec![0u8; 16], None),
        ]);

        assert_eq!(accepted, 1);
        assert_eq!(collection.items().len(), 1);
    }

    #[test]
    fn truncated_image_fails_decode_and_is_dropped() {
        let mut truncated = tiny_png(10);
        truncated.truncate(20);

        let mut collection = ReferenceCollection::new();
        assert_eq!(collection.append_files([(truncated, None)]), 0);
        assert!(collection.is_empty());
    }

    #[test]
    fn append_preserves_upload_order_and_reorder_moves_priority() {
        let mut collection = ReferenceCollection::new();
        collection.append_files([
            (tiny_png(1), Some("a".to_string())),
            (tiny_png(2), Some("b".to_string())),
            (tiny_png(3), Some("c".to_string())),
        ]);

        let names = |collection: &ReferenceCollection| -> Vec<String> {
            collection
                .items()
                .iter()
                .map(|item| item.image.display_name.clone().unwrap())
                .collect()
        };
        assert_eq!(names(&collection), vec!["a", "b", "c"]);

        let last_id = collection.items()[2].id.clone();
        assert!(collection.move_up(&last_id));
        assert_eq!(names(&collection), vec!["a", "c", "b"]);

        let first_id = collection.items()[0].id.clone();
        assert!(!collection.move_up(&first_id));
    }

    #[test]
    fn replace_keeps_single_value_semantics() {
        let mut collection = ReferenceCollection::new();
        collection.append_files([(tiny_png(1), None), (tiny_png(2), None)]);

        assert!(collection.replace_with_file(tiny_png(3), Some("only.png".to_string())));
        assert_eq!(collection.items().len(), 1);

        // A rejected replacement leaves the current value in place.
        assert!(!collection.replace_with_file(vec![1, 2, 3], None));
        assert_eq!(collection.items().len(), 1);
    }
}
