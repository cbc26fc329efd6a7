use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::providers::{LoadContext, Provider};
use crate::transport::BoxFuture;

/// Configured groups: their children are already in the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticGroupProvider;

impl Provider for StaticGroupProvider {
    fn load<'a>(
        &'a self,
        _ctx: &'a LoadContext<'a>,
        _request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async { Ok(LoadOutcome::Unchanged) })
    }
}
