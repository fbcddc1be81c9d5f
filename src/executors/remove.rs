//! `fs.rm`: recursive, idempotent deletion.

use async_trait::async_trait;

use super::{RemoveExecutor, StepContext};
use crate::core::resolver::RemoveRequest;
use crate::error::StepError;

pub struct FsRemoveExecutor;

#[async_trait]
impl RemoveExecutor for FsRemoveExecutor {
    async fn remove(
        &self,
        request: &RemoveRequest,
        ctx: &StepContext<'_>,
    ) -> Result<(), StepError> {
        let removed = ctx.registry().purge(&request.path).await?;
        if removed {
            tracing::info!(path = %request.path.display(), "removed");
        } else {
            tracing::debug!(path = %request.path.display(), "nothing to remove");
        }
        Ok(())
    }
}
