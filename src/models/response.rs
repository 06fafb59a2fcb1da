use serde::Serialize;

pub const MESSAGE_OK: &str = "Operation successful";
pub const MESSAGE_FAILED: &str = "Operation not successful";

/// Envelope for every read endpoint. Failures still go out with HTTP 200,
/// callers check `success`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub success: bool,
    pub message: &'static str,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data,
            success: true,
            message: MESSAGE_OK,
        }
    }

    pub fn failed(data: T) -> Self {
        Self {
            data,
            success: false,
            message: MESSAGE_FAILED,
        }
    }
}
