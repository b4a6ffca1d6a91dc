//! Lifecycle errors and their client-facing taxonomy.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::capability::StrategyId;
use crate::db::DatabaseError;
use crate::error::{ConversionError, StorageError};

/// Public error classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unsupported,
    Conflict,
    DecodeError,
    EncodeError,
    LayoutError,
    ExternalToolError,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::EncodeError => "encode_error",
            ErrorKind::LayoutError => "layout_error",
            ErrorKind::ExternalToolError => "external_tool_error",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP-style status code for a request-handling collaborator.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Unsupported => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::DecodeError | ErrorKind::EncodeError | ErrorKind::LayoutError => 422,
            ErrorKind::ExternalToolError => 502,
            ErrorKind::Forbidden => 403,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the job lifecycle manager.
///
/// `Display` carries internal detail for logs. Callers only ever see
/// [`JobError::public_message`].
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Conversion {0} not found")]
    NotFound(i64),

    #[error("Source file of conversion {0} is missing from storage")]
    SourceMissing(i64),

    #[error("Conversion {0} has no downloadable output")]
    ArtifactMissing(i64),

    #[error("Unsupported conversion from '{from}' to '{to}'")]
    Unsupported { from: String, to: String },

    #[error("Unsupported upload format '{0}'")]
    UnknownFormat(String),

    #[error("Conversion {0} is already in progress")]
    InProgress(i64),

    #[error("Stored path of conversion {0} escapes its artifact directory")]
    PathViolation(i64),

    #[error("Strategy {strategy} failed: {source}")]
    Conversion {
        strategy: StrategyId,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::NotFound(_) | JobError::SourceMissing(_) | JobError::ArtifactMissing(_) => {
                ErrorKind::NotFound
            }
            JobError::Unsupported { .. } | JobError::UnknownFormat(_) => ErrorKind::Unsupported,
            JobError::InProgress(_) => ErrorKind::Conflict,
            JobError::PathViolation(_) => ErrorKind::Forbidden,
            JobError::Conversion { source, .. } => match source {
                ConversionError::Decode(_) => ErrorKind::DecodeError,
                ConversionError::Encode(_) => ErrorKind::EncodeError,
                ConversionError::Layout(_) => ErrorKind::LayoutError,
                ConversionError::ExternalTool { .. } => ErrorKind::ExternalToolError,
                ConversionError::Io { .. } => ErrorKind::Internal,
            },
            JobError::Storage(StorageError::PathViolation) => ErrorKind::Forbidden,
            JobError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            JobError::Storage(_) | JobError::Database(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message safe to return to a client: no paths, tool output or SQL.
    pub fn public_message(&self) -> String {
        match self {
            JobError::NotFound(_) => "Conversion not found".to_string(),
            JobError::SourceMissing(_) => "Original file not found".to_string(),
            JobError::ArtifactMissing(_) => "Converted file not found".to_string(),
            JobError::Unsupported { from, to } => format!(
                "Conversion from {} to {} is not supported",
                display_token(from),
                display_token(to)
            ),
            JobError::UnknownFormat(token) => {
                format!("Files of type {} are not supported", display_token(token))
            }
            JobError::InProgress(_) => "Conversion is already in progress".to_string(),
            JobError::PathViolation(_) | JobError::Storage(StorageError::PathViolation) => {
                "Access denied".to_string()
            }
            JobError::Conversion { strategy, .. } => strategy.failure_message().to_string(),
            JobError::Storage(StorageError::NotFound(_)) => "File not found".to_string(),
            JobError::Storage(_) | JobError::Database(_) => "Internal error".to_string(),
        }
    }
}

/// Format tokens come from clients; keep them short and printable.
fn display_token(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolId;

    #[test]
    fn test_status_codes() {
        assert_eq!(JobError::NotFound(1).status_code(), 404);
        assert_eq!(JobError::SourceMissing(1).status_code(), 404);
        assert_eq!(
            JobError::Unsupported {
                from: "docx".into(),
                to: "gif".into()
            }
            .status_code(),
            400
        );
        assert_eq!(JobError::InProgress(1).status_code(), 409);
        assert_eq!(JobError::PathViolation(1).status_code(), 403);
    }

    #[test]
    fn test_conversion_kinds() {
        let cases = [
            (ConversionError::Decode("x".into()), ErrorKind::DecodeError, 422),
            (ConversionError::Encode("x".into()), ErrorKind::EncodeError, 422),
            (ConversionError::Layout("x".into()), ErrorKind::LayoutError, 422),
            (
                ConversionError::ExternalTool {
                    tool: ToolId::Office,
                    reason: "x".into(),
                },
                ErrorKind::ExternalToolError,
                502,
            ),
        ];
        for (source, kind, code) in cases {
            let err = JobError::Conversion {
                strategy: StrategyId::OfficeToPdf,
                source,
            };
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status_code(), code);
            assert_eq!(err.public_message(), "Office conversion failed");
        }
    }

    #[test]
    fn test_public_message_hides_paths() {
        let err = JobError::Conversion {
            strategy: StrategyId::PdfToImage,
            source: ConversionError::Io {
                path: "/srv/docshift/work/job-1/page-1.png".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk"),
            },
        };
        assert!(err.to_string().contains("/srv/docshift"));
        assert!(!err.public_message().contains("/srv"));
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err = JobError::Storage(StorageError::WriteFile {
            path: "/srv/docshift/converted/x.pdf".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk"),
        });
        assert_eq!(err.public_message(), "Internal error");
    }

    #[test]
    fn test_unsupported_message_sanitizes_tokens() {
        let err = JobError::Unsupported {
            from: "docx".into(),
            to: "../../<script>".into(),
        };
        assert_eq!(
            err.public_message(),
            "Conversion from docx to script is not supported"
        );

        let err = JobError::Unsupported {
            from: "docx".into(),
            to: "".into(),
        };
        assert!(err.public_message().ends_with("to unknown is not supported"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ExternalToolError).unwrap(),
            "\"external_tool_error\""
        );
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }
}
