//! One synchronous completion over an asset's views, with bounded retries

use std::path::Path;

use log::info;

use crate::batch::client::ChatService;
use crate::batch::request::{RequestBuilder, list_views};
use crate::error::BatchError;
use crate::utils::RetryPolicy;

/// Accept only answers made of ASCII digits, like a view index or a 0/1 flag
pub fn is_numeric(answer: &str) -> bool {
    let answer = answer.trim();
    !answer.is_empty() && answer.bytes().all(|b| b.is_ascii_digit())
}

/// Ask about the views in `view_dir`; with `numeric`, a non-numeric answer counts as a failed attempt
pub async fn ask<C: ChatService + ?Sized>(
    service: &C,
    builder: &RequestBuilder,
    view_dir: &Path,
    policy: &RetryPolicy,
    numeric: bool,
) -> Result<String, BatchError> {
    let views = list_views(view_dir).map_err(|e| BatchError::Service(format!("{:#}", e)))?;
    let images = builder.task.select_images(views);
    let body = builder.body(&images).map_err(|e| BatchError::Service(format!("{:#}", e)))?;
    info!("asking {} about {} views of {}", body.model, images.len(), view_dir.display());

    policy
        .run("chat completion", |_| async {
            let answer = service.complete(&body).await?;
            if numeric && !is_numeric(&answer) {
                return Err(BatchError::Service(format!("answer `{}` is not a number", answer)));
            }
            Ok::<_, BatchError>(answer.trim().to_string())
        })
        .await
        .map_err(|(attempts, last)| BatchError::RetriesExhausted { attempts, last: last.to_string() })
}
