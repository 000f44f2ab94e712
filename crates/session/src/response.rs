use serde::{Deserialize, Serialize};
use timeline::ErrorKind;

use crate::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SessionError> for ErrorBody {
    fn from(err: &SessionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Uniform result of every command entry point: `{success, data?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &SessionError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn into_result(self) -> std::result::Result<T, ErrorBody> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(ErrorBody {
                kind: ErrorKind::StateConflict,
                message: "response carried no data".to_string(),
            }),
        }
    }
}

impl<T> From<crate::Result<T>> for CommandResponse<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::{ClipId, TimelineError};

    #[test]
    fn failure_serializes_kind_and_message() {
        let err = SessionError::from(TimelineError::ClipNotFound(ClipId::from("c9")));
        let response: CommandResponse<()> = CommandResponse::failure(&err);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "not_found");
        assert_eq!(json["error"]["message"], "clip not found: c9");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn success_carries_data() {
        let response = CommandResponse::from(Ok::<u32, SessionError>(7));
        assert!(response.success);
        assert_eq!(response.into_result(), Ok(7));
    }
}
