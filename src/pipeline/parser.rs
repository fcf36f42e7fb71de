//! Multi-call specification parser
//!
//! ```text
//! spec  := call (',' call)*
//! call  := name ['@' alias] [':' dep ('/' dep)*]
//! ```
//!
//! A dependency names an earlier call by its key (`name@alias`, or `name`
//! when unaliased) or by its bare alias. References to later calls are
//! rejected, which keeps every parsed graph acyclic.
//!
//! Per-call parameters are read from the request as `name` when `_mt` names
//! a single call, and as `{index}_{name}` (0-based) otherwise.

use std::collections::HashMap;

use super::error::RequestParseError;
use super::node::{CallDag, ExecutionId};
use crate::rpc::SchemaRegistry;

/// Request parameter holding the call specification
pub const MULTI_CALL_PARAM: &str = "_mt";

struct RawCall<'s> {
    name: &'s str,
    alias: Option<&'s str>,
    deps: Vec<&'s str>,
}

impl<'s> RawCall<'s> {
    fn key(&self) -> String {
        match self.alias {
            Some(alias) => format!("{}@{}", self.name, alias),
            None => self.name.to_string(),
        }
    }
}

pub struct CallGraphParser<'a> {
    schema: &'a dyn SchemaRegistry,
}

impl<'a> CallGraphParser<'a> {
    pub fn new(schema: &'a dyn SchemaRegistry) -> Self {
        Self { schema }
    }

    /// Number of calls in a spec without validating it
    pub fn count_calls(spec: &str) -> usize {
        spec.split(',').filter(|s| !s.trim().is_empty()).count()
    }

    /// Parse `spec` into a call graph, reading call parameters from `params`
    pub fn parse(
        &self,
        spec: &str,
        params: &HashMap<String, String>,
    ) -> Result<CallDag, RequestParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RequestParseError::EmptySpec);
        }

        let raw: Vec<RawCall<'_>> = spec
            .split(',')
            .map(|text| parse_call(text.trim()))
            .collect::<Result<_, _>>()?;
        let single = raw.len() == 1;

        let mut dag = CallDag::new();
        let mut by_key: HashMap<String, ExecutionId> = HashMap::new();
        let mut by_alias: HashMap<&str, ExecutionId> = HashMap::new();

        for (index, call) in raw.iter().enumerate() {
            let method = self
                .schema
                .resolve(call.name)
                .ok_or_else(|| RequestParseError::MethodNotFound(call.name.to_string()))?;
            let key = call.key();
            if by_key.contains_key(&key) {
                return Err(RequestParseError::DuplicateAlias(key));
            }
            // A bare alias must name exactly one call
            if let Some(alias) = call.alias.filter(|a| by_alias.contains_key(a)) {
                return Err(RequestParseError::DuplicateAlias(alias.to_string()));
            }

            let mut values = Vec::with_capacity(method.params.len());
            for param in &method.params {
                let name = if single {
                    param.name.clone()
                } else {
                    format!("{}_{}", index, param.name)
                };
                let value = params.get(&name).cloned();
                if value.is_none() && param.required {
                    return Err(RequestParseError::MissingParameter {
                        call: key,
                        param: name,
                    });
                }
                values.push(value);
            }

            let id = dag.add_call(key.clone(), method, values);
            by_key.insert(key, id);
            if let Some(alias) = call.alias {
                by_alias.insert(alias, id);
            }
        }

        for (id, call) in raw.iter().enumerate() {
            for dep in &call.deps {
                let target = by_key
                    .get(*dep)
                    .or_else(|| by_alias.get(dep))
                    .copied()
                    .filter(|target| *target < id)
                    .ok_or_else(|| RequestParseError::UnknownDependentMethod {
                        call: call.key(),
                        dependency: dep.to_string(),
                    })?;
                dag.add_dependency(id, target);
            }
        }

        Ok(dag)
    }
}

fn parse_call(text: &str) -> Result<RawCall<'_>, RequestParseError> {
    let malformed = || RequestParseError::MalformedSpec(text.to_string());

    let (head, deps) = match text.split_once(':') {
        Some((head, deps)) => {
            let deps: Vec<&str> = deps.split('/').map(str::trim).collect();
            if deps.iter().any(|d| d.is_empty()) {
                return Err(malformed());
            }
            (head.trim(), deps)
        }
        None => (text, Vec::new()),
    };

    let (name, alias) = match head.split_once('@') {
        Some((name, alias)) => (name.trim(), Some(alias.trim())),
        None => (head, None),
    };

    if !is_identifier(name) || alias.is_some_and(|a| !is_identifier(a)) {
        return Err(malformed());
    }

    Ok(RawCall { name, alias, deps })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
