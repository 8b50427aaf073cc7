// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::Error;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

/// Unique identifier for a training project.
///
/// Projects own every tag and image in the training store; a store handle is
/// always bound to exactly one project.
///
/// # Examples
///
/// ```rust
/// use synthsync::ProjectId;
/// use std::str::FromStr;
///
/// let project_id = ProjectId::from_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap();
/// assert_eq!(project_id.to_string(), "1b4e28ba-2fa1-11d2-883f-0016d3cca427");
/// ```
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectId(Uuid);

impl Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ProjectId {
    fn from(id: Uuid) -> Self {
        ProjectId(id)
    }
}

impl ProjectId {
    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl FromStr for ProjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProjectId(Uuid::parse_str(s.trim())?))
    }
}

impl TryFrom<&str> for ProjectId {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        ProjectId::from_str(s)
    }
}

/// Opaque identifier of a tag in the training store.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(Uuid);

impl Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TagId {
    fn from(id: Uuid) -> Self {
        TagId(id)
    }
}

impl FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TagId(Uuid::parse_str(s.trim())?))
    }
}

/// Opaque identifier of an image in the training store.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(Uuid);

impl Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ImageId {
    fn from(id: Uuid) -> Self {
        ImageId(id)
    }
}

/// A label known to the training store.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Tag {
    id: TagId,
    name: String,
    #[serde(default, rename = "imageCount")]
    image_count: u64,
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

impl Tag {
    pub fn new(id: TagId, name: &str) -> Self {
        Tag {
            id,
            name: name.to_owned(),
            image_count: 0,
        }
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_count(&self) -> u64 {
        self.image_count
    }
}

/// An image stored in the training project, as returned by image listing.
#[derive(Deserialize, Clone, Debug)]
pub struct Image {
    id: ImageId,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

impl Image {
    pub fn new(id: ImageId, width: u32, height: u32) -> Self {
        Image {
            id,
            created: Some(Utc::now()),
            width,
            height,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// A bounding box attached to a tag, normalized to the image size.
///
/// Every coordinate lies in `[0, 1]` and the box never extends past the right
/// or bottom edge: `left + width <= 1` and `top + height <= 1`.  Values are
/// produced by [`normalize`](crate::normalize).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct NormalizedRegion {
    #[serde(rename = "tagId")]
    pub tag_id: TagId,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One image ready to be sent in a create-images batch.
///
/// Built once per capture by the
/// [`UploadRecordBuilder`](crate::UploadRecordBuilder) and consumed by the
/// [`BatchUploader`](crate::BatchUploader).  The image bytes are by far the
/// largest part of the record, so records are moved, never cloned, through
/// the pipeline.
#[derive(Serialize, Clone, Debug)]
pub struct UploadRecord {
    pub name: String,
    #[serde(rename = "contents", serialize_with = "serialize_base64")]
    pub image_bytes: Vec<u8>,
    #[serde(rename = "tagIds")]
    pub tag_ids: Vec<TagId>,
    pub regions: Vec<NormalizedRegion>,
}

fn serialize_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[derive(Serialize)]
pub(crate) struct ImageCreateBatch<'a> {
    pub images: &'a [UploadRecord],
}

/// Per-image outcome of a create-images call.
#[derive(Deserialize, Clone, Debug)]
pub struct ImageCreateResult {
    #[serde(default, rename = "sourceUrl")]
    pub source_url: Option<String>,
    pub status: String,
    #[serde(default)]
    pub image: Option<Image>,
}

impl ImageCreateResult {
    /// Duplicates of an existing image count as uploaded.
    pub fn is_uploaded(&self) -> bool {
        self.status == "OK" || self.status == "OKDuplicate"
    }
}

/// Result of a create-images call.
#[derive(Deserialize, Clone, Debug)]
pub struct ImageCreateSummary {
    #[serde(rename = "isBatchSuccessful")]
    pub is_batch_successful: bool,
    #[serde(default)]
    pub images: Vec<ImageCreateResult>,
}

impl ImageCreateSummary {
    pub fn uploaded(&self) -> usize {
        self.images.iter().filter(|img| img.is_uploaded()).count()
    }

    /// Statuses of the images the service rejected, in submission order.
    pub fn rejected(&self) -> Vec<&str> {
        self.images
            .iter()
            .filter(|img| !img.is_uploaded())
            .map(|img| img.status.as_str())
            .collect()
    }
}

/// Error body returned by the training service.
#[derive(Deserialize, Debug)]
pub(crate) struct ServiceError {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_parse() {
        let id: ProjectId = " 1b4e28ba-2fa1-11d2-883f-0016d3cca427 ".parse().unwrap();
        assert_eq!(id.to_string(), "1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        assert!(ProjectId::from_str("p-123").is_err());
    }

    #[test]
    fn test_upload_record_wire_format() {
        let tag = TagId::from(Uuid::nil());
        let record = UploadRecord {
            name: "rgb_2.png".to_string(),
            image_bytes: vec![1, 2, 3],
            tag_ids: vec![tag],
            regions: vec![NormalizedRegion {
                tag_id: tag,
                left: 0.25,
                top: 0.5,
                width: 0.5,
                height: 0.25,
            }],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["contents"], "AQID");
        assert_eq!(json["tagIds"][0], Uuid::nil().to_string());
        assert_eq!(json["regions"][0]["tagId"], Uuid::nil().to_string());
        assert_eq!(json["regions"][0]["left"], 0.25);
    }

    #[test]
    fn test_summary_counts_duplicates_as_uploaded() {
        let summary: ImageCreateSummary = serde_json::from_str(
            r#"{
                "isBatchSuccessful": false,
                "images": [
                    {"sourceUrl": "a.png", "status": "OK"},
                    {"sourceUrl": "b.png", "status": "OKDuplicate"},
                    {"sourceUrl": "c.png", "status": "ErrorImageFormat"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(summary.uploaded(), 2);
        assert_eq!(summary.rejected(), vec!["ErrorImageFormat"]);
    }
}
