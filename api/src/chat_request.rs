use axum::extract::multipart::{Multipart, MultipartError};
use pdf_rag::PdfUpload;

use crate::error::ApiError;

/// Fields of the `POST /chat` form. Unknown fields are ignored.
#[derive(Debug, Default)]
pub struct ChatForm {
    pub pdf: Option<PdfUpload>,
    pub query: Option<String>,
}

impl ChatForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ChatForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_owned);

            match name.as_deref() {
                // A `pdf` part only counts as an upload when it carries a filename.
                Some("pdf") if form.pdf.is_none() => {
                    let Some(filename) = field.file_name().map(str::to_owned) else {
                        continue;
                    };
                    let data = field.bytes().await.map_err(multipart_error)?;
                    form.pdf = Some(PdfUpload::new(filename, data.to_vec()));
                }
                Some("query") if form.query.is_none() => {
                    form.query = Some(field.text().await.map_err(multipart_error)?);
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// Checks the upload first, then the question; an empty question counts as missing.
    pub fn into_parts(self) -> Result<(PdfUpload, String), ApiError> {
        let pdf = self.pdf.ok_or(ApiError::MissingPdf)?;
        let query = self
            .query
            .filter(|q| !q.is_empty())
            .ok_or(ApiError::MissingQuery)?;
        Ok((pdf, query))
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::Multipart {
        status: err.status(),
        message: err.body_text(),
    }
}
