use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::response::ApiResponse;
use crate::StoreError;

/// Error type for HTTP handlers.
///
/// Wraps [`StoreError`] and adds the request-level failures. Every variant
/// renders as the `{success: false, message, error}` envelope with a Persian
/// `message` for the buyer and the diagnostic text in `error`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body failed its field rules.
    #[error("Invalid input: {0}")]
    Invalid(validator::ValidationErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self { Self::Invalid(errors) }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Store(err) => match err {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::Upstream(_) | StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            AppError::BadRequest(_) | AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Buyer-facing message.
    pub fn message(&self) -> String {
        match self {
            AppError::Store(err) => match err {
                StoreError::Validation(detail) => format!("اطلاعات ارسالی نامعتبر است: {detail}"),
                StoreError::NotFound { entity, .. } => format!("{} یافت نشد", entity_label(entity)),
                StoreError::InsufficientStock { available, .. } => {
                    format!("موجودی کافی نیست. موجودی فعلی: {available}")
                }
                StoreError::BelowQuantityMinimum { minimum, .. } => format!("حداقل تعداد سفارش {minimum} عدد است"),
                StoreError::AboveQuantityMaximum { maximum, .. } => format!("حداکثر تعداد سفارش {maximum} عدد است"),
                StoreError::BelowMinimumOrder { minimum, .. } => format!("حداقل مبلغ سفارش {minimum} تومان است"),
                StoreError::EmptyCart => "سبد خرید خالی است".into(),
                StoreError::PriceUnavailable { .. } => "قیمت این محصول در دسترس نیست".into(),
                StoreError::InvalidTransition { from, to } => {
                    format!("تغییر وضعیت سفارش از {from} به {to} مجاز نیست")
                }
                StoreError::Conflict(_) => "درخواست با وضعیت فعلی مغایرت دارد".into(),
                StoreError::Upstream(_) => "خطا در ارتباط با سیستم کارا".into(),
                StoreError::Storage(_) => "خطای داخلی سرور".into(),
            },
            AppError::BadRequest(_) => "درخواست نامعتبر است".into(),
            AppError::Invalid(errors) => format!("اطلاعات ارسالی نامعتبر است: {}", invalid_fields(errors)),
            AppError::Unauthorized(_) => "دسترسی غیرمجاز".into(),
        }
    }
}

/// Offending field names, sorted.
fn invalid_fields(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<&str> = errors.field_errors().into_keys().collect();
    fields.sort_unstable();
    fields.join(", ")
}

fn entity_label(entity: &str) -> &'static str {
    match entity {
        "Product" => "محصول",
        "Order" => "سفارش",
        "Cart item" => "آیتم سبد خرید",
        "Category" => "دسته‌بندی",
        "Brand" => "برند",
        _ => "مورد درخواستی",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }
        let body = ApiResponse::failure(self.message(), self.to_string());
        (status, Json(body)).into_response()
    }
}
