use std::collections::BTreeSet;

use garde::Validate;
use serde::{Deserialize, Serialize};

/// The user-entered part of an attendance submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct AttendanceForm {
    #[garde(custom(not_blank))]
    pub full_name: String,
    #[garde(custom(not_blank))]
    pub phone_number: String,
    #[garde(custom(not_blank), email)]
    pub email: String,
    #[garde(custom(not_blank))]
    pub branch: String,
    #[garde(custom(not_blank))]
    pub section: String,
    #[garde(custom(not_blank))]
    pub roll_number: String,
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("is required"));
    }
    Ok(())
}

impl AttendanceForm {
    /// Checks every required field, naming the offending ones on failure.
    pub fn check(&self) -> crate::error::Result<()> {
        self.validate().map_err(|report| {
            let fields: BTreeSet<String> = report.iter().map(|(path, _)| path.to_string()).collect();
            crate::error::AppError::Validation(format!(
                "Please fill in all required fields correctly: {}",
                fields.into_iter().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

/// Body of `POST /api/attendance/submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSubmission {
    pub session_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub branch: String,
    pub section: String,
    pub roll_number: String,
    pub device_info: String,
    /// Selfie as a `data:<mime>;base64,...` URI.
    pub selfie_data: String,
}

impl AttendanceSubmission {
    pub fn new(
        form: &AttendanceForm,
        session_id: &str,
        device_info: String,
        selfie_data: String,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            full_name: form.full_name.trim().to_string(),
            phone_number: form.phone_number.trim().to_string(),
            email: form.email.trim().to_string(),
            branch: form.branch.trim().to_string(),
            section: form.section.trim().to_string(),
            roll_number: form.roll_number.trim().to_string(),
            device_info,
            selfie_data,
        }
    }
}

/// Response of `GET /api/qr/session/{id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub valid: bool,
}
