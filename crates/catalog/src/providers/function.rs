//! Function items: remote processing services that take parameters and
//! return new catalog items.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::node::{NodeSpec, Source};
use crate::providers::{LoadContext, Provider};
use crate::transport::BoxFuture;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionParameter {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<FunctionParameter>,
}

impl FunctionDescription {
    /// Ids of required parameters absent (or null) in `inputs`.
    pub fn missing_inputs(&self, inputs: &Map<String, Value>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required && inputs.get(&p.id).is_none_or(Value::is_null))
            .map(|p| p.id.clone())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct InvocationReply {
    #[serde(default)]
    results: Vec<NodeSpec>,
}

/// Items produced by an invocation, in reply order.
pub fn parse_results(url: &str, reply: Value) -> Result<Vec<NodeSpec>, LoadError> {
    let reply: InvocationReply =
        serde_json::from_value(reply).map_err(|e| LoadError::format(url, e.to_string()))?;
    Ok(reply.results)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionProvider;

impl Provider for FunctionProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let Source::Function { url } = &request.source else {
                return Err(LoadError::format("", format!("{} is not a function", request.id)));
            };
            let value = ctx.transport.fetch_json(&ctx.outbound(request, url)).await?;
            let description: FunctionDescription = serde_json::from_value(value)
                .map_err(|e| LoadError::format(url.as_str(), e.to_string()))?;
            Ok(LoadOutcome::Function(description))
        })
    }
}
