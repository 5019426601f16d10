//! Upload and selection checks shared by the document routes.

use std::{collections::HashSet, path::Path};

use crate::{
    config::UploadConfig,
    error::{AppError, AppResult},
};

/// Lowercased extension without the leading dot.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
}

pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

pub fn sanitize_filename(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Filename cannot be empty"));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(AppError::validation(format!("Invalid filename '{trimmed}'")));
    }
    Ok(trimmed.to_string())
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_size: u64,
    extensions: HashSet<String>,
    mime_types: HashSet<String>,
}

impl UploadValidator {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_size: config.max_file_size_bytes,
            extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            mime_types: config
                .allowed_mime_types
                .iter()
                .map(|mime| mime.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_supported_extension(&self, filename: &str) -> bool {
        file_extension(filename).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Browsers often send `application/octet-stream` for unknown types;
    /// that and a missing type fall back to the extension check alone.
    pub fn is_supported_mime(&self, content_type: Option<&str>) -> bool {
        let Some(raw) = content_type else {
            return true;
        };
        let essence = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence.is_empty()
            || essence == "application/octet-stream"
            || self.mime_types.contains(&essence)
    }

    /// Returns the sanitized filename when the upload is acceptable.
    pub fn validate(&self, filename: &str, content_type: Option<&str>, size: u64) -> AppResult<String> {
        let filename = sanitize_filename(filename)?;

        if size == 0 {
            return Err(AppError::validation("File is empty"));
        }
        if size > self.max_size {
            return Err(AppError::validation(format!(
                "File size {} exceeds maximum of {}",
                format_size(size),
                format_size(self.max_size)
            )));
        }
        if !self.is_supported_extension(&filename) {
            let mut allowed: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
            allowed.sort_unstable();
            return Err(AppError::validation(format!(
                "Unsupported file type. Allowed extensions: {}",
                allowed.join(", ")
            )));
        }
        if !self.is_supported_mime(content_type) {
            return Err(AppError::validation(format!(
                "Unsupported content type '{}'",
                content_type.unwrap_or_default()
            )));
        }
        Ok(filename)
    }
}

/// Zep limits how many custom types one graph can carry.
pub fn validate_type_selection(
    entity_count: usize,
    edge_count: usize,
    max_entity_types: usize,
    max_edge_types: usize,
) -> AppResult<()> {
    if entity_count > max_entity_types {
        return Err(AppError::validation(format!(
            "Maximum {max_entity_types} entity types allowed"
        )));
    }
    if edge_count > max_edge_types {
        return Err(AppError::validation(format!(
            "Maximum {max_edge_types} edge types allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> UploadValidator {
        UploadValidator::new(&UploadConfig {
            max_file_size_bytes: 1024,
            ..Default::default()
        })
    }

    fn message(err: AppError) -> String {
        err.to_string()
    }

    #[test]
    fn accepts_known_extension_and_mime() {
        let name = validator()
            .validate(" notes.MD ", Some("text/markdown; charset=utf-8"), 10)
            .unwrap();
        assert_eq!(name, "notes.MD");
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        let err = validator().validate("a.pdf", None, 2048).unwrap_err();
        assert_eq!(message(err), "File size 2.0 KB exceeds maximum of 1.0 KB");
        assert!(validator().validate("a.pdf", None, 0).is_err());
    }

    #[test]
    fn rejects_unknown_extension_and_mime() {
        let err = validator().validate("run.exe", None, 10).unwrap_err();
        assert!(message(err).starts_with("Unsupported file type"));

        let err = validator()
            .validate("a.pdf", Some("image/png"), 10)
            .unwrap_err();
        assert!(message(err).contains("image/png"));

        assert!(validator()
            .validate("a.pdf", Some("application/octet-stream"), 10)
            .is_ok());
    }

    #[test]
    fn path_traversal_is_rejected() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("..").is_err());
        assert_eq!(sanitize_filename("report..v2.pdf").unwrap(), "report..v2.pdf");
        assert!(sanitize_filename("dir\\file.txt").is_err());
        assert!(sanitize_filename("   ").is_err());
    }

    #[test]
    fn extension_helpers() {
        assert_eq!(file_extension("Report.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(normalize_extension(".Md"), "md");
        assert_eq!(format_size(512), "512 B");
    }

    #[test]
    fn type_selection_limits() {
        assert!(validate_type_selection(10, 10, 10, 10).is_ok());
        assert_eq!(
            message(validate_type_selection(11, 0, 10, 10).unwrap_err()),
            "Maximum 10 entity types allowed"
        );
        assert_eq!(
            message(validate_type_selection(1, 12, 10, 10).unwrap_err()),
            "Maximum 10 edge types allowed"
        );
    }
}
