//! Book identity, shared upload metadata and normalization rules.
//!
//! Every text value that is stored or compared goes through the same
//! normalization so searches match what ingestion wrote:
//! - `title`, `author`, `category`: lowercased, nothing else
//! - file names: final path component, lowercased, spaces -> underscores

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The only media type accepted for upload.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Unique identifier for a stored book record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(Uuid);

impl BookId {
    /// Generate a new random book ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidBookId(format!("{s}: {e}")))
    }

    /// Consume into the underlying UUID.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BookId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BookId({})", self.0)
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a searchable text value (title, author, category).
pub fn normalize_text(value: &str) -> String {
    value.to_lowercase()
}

/// Longest normalized file name, in bytes. Longer names are shortened,
/// keeping their extension.
pub const MAX_FILE_NAME_BYTES: usize = 128;

/// Extensions longer than this are treated as part of the stem.
const MAX_EXTENSION_BYTES: usize = 16;

/// Normalize a client-supplied file name into its storage-side form.
///
/// Only the final path component is kept, so a name such as
/// `C:\Books\My Book.PDF` becomes `my_book.pdf`.
pub fn normalize_file_name(original: &str) -> crate::Result<String> {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if base.is_empty() || base == "." || base == ".." {
        return Err(crate::Error::InvalidFileName(format!(
            "'{original}' has no usable file name"
        )));
    }

    Ok(truncate_file_name(base.replace(' ', "_").to_lowercase()))
}

fn truncate_file_name(name: String) -> String {
    if name.len() <= MAX_FILE_NAME_BYTES {
        return name;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name.as_str(), ""),
    };
    let mut end = MAX_FILE_NAME_BYTES - ext.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &stem[..end])
}

/// Check whether a declared content type is a PDF.
///
/// Only the essence is compared; parameters such as `; charset=binary` are ignored.
pub fn is_pdf_media_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_MEDIA_TYPE))
}

/// Metadata shared by every file of one upload request, already normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookMetadata {
    title: String,
    author: String,
    category: String,
    isbn: Option<String>,
}

impl BookMetadata {
    /// Validate and normalize raw form values.
    ///
    /// Title, author and category are required and must not be blank. A blank
    /// ISBN is treated as absent.
    pub fn new(
        title: Option<&str>,
        author: Option<&str>,
        category: Option<&str>,
        isbn: Option<&str>,
    ) -> crate::Result<Self> {
        let title = required(title, "title")?;
        let author = required(author, "author")?;
        let category = required(category, "category")?;
        let isbn = isbn
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            title: normalize_text(title),
            author: normalize_text(author),
            category: normalize_text(category),
            isbn,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn isbn(&self) -> Option<&str> {
        self.isbn.as_deref()
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> crate::Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(crate::Error::MissingField(format!(
            "missing required field: {field}"
        ))),
    }
}

/// Search input: any non-empty subset of the three searchable fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookQuery {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl BookQuery {
    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn by_author(author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..Default::default()
        }
    }

    pub fn by_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    /// Return a copy with blank values dropped and the rest normalized.
    pub fn normalized(&self) -> Self {
        let norm = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(normalize_text)
        };
        Self {
            title: norm(&self.title),
            author: norm(&self.author),
            category: norm(&self.category),
        }
    }

    /// True when no field carries a non-blank value.
    pub fn is_empty(&self) -> bool {
        [&self.title, &self.author, &self.category]
            .iter()
            .all(|v| v.as_deref().is_none_or(|s| s.trim().is_empty()))
    }
}
